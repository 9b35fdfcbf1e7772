// crates/axelis-server/src/tools/banking.rs
// Client of the external mobile-money banking API
//
// The assistant is a read/verify client of the banking platform; transfer
// initiation and cancellation are forwarded, never settled here.

use anyhow::{Context, Result};
use serde_json::Value;
use std::time::Duration;
use tracing::warn;

const TIMEOUT_SECS: u64 = 30;

pub struct BankingApiClient {
    base_url: String,
    http_client: reqwest::Client,
}

impl BankingApiClient {
    pub fn new(base_url: String, api_key: String) -> Self {
        let mut headers = reqwest::header::HeaderMap::new();
        if let Ok(value) =
            reqwest::header::HeaderValue::from_str(&format!("Bearer {api_key}"))
        {
            headers.insert(reqwest::header::AUTHORIZATION, value);
        }

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .default_headers(headers)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client,
        }
    }

    /// Fetch a user's profile.
    pub async fn user_profile(&self, user_id: &str) -> Result<Value> {
        self.get(&format!("/users/{user_id}")).await
    }

    /// Forward a transfer initiation.
    pub async fn initiate_transfer(&self, user_id: &str, transfer: Value) -> Result<Value> {
        let mut body = transfer;
        if let Some(obj) = body.as_object_mut() {
            obj.insert("user_id".into(), Value::String(user_id.to_string()));
        }
        self.post("/transfers", &body).await
    }

    /// Forward a transfer cancellation.
    pub async fn cancel_transfer(&self, transfer_id: &str, user_id: &str) -> Result<Value> {
        self.post(
            &format!("/transfers/{transfer_id}/cancel"),
            &serde_json::json!({"user_id": user_id}),
        )
        .await
    }

    async fn get(&self, path: &str) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .context("Banking API request failed")?;

        Self::decode(response).await
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http_client
            .post(&url)
            .json(body)
            .send()
            .await
            .context("Banking API request failed")?;

        Self::decode(response).await
    }

    async fn decode(response: reqwest::Response) -> Result<Value> {
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(%status, "Banking API error");
            anyhow::bail!("Banking API error {}: {}", status, text);
        }
        response
            .json()
            .await
            .context("Invalid banking API response")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_normalization() {
        let client = BankingApiClient::new("https://api.example.com/".into(), "key".into());
        assert_eq!(client.base_url, "https://api.example.com");
    }
}
