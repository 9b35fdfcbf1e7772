// crates/axelis-server/src/tools/mod.rs
// Pack-gated tool functions exposed to reasoning agents

pub mod banking;

pub use banking::BankingApiClient;

use serde_json::{Value, json};

use crate::APPLICATION_ID;
use crate::error::{AxelisError, Result};
use crate::knowledge::{KnowledgeHit, KnowledgeStore};
use crate::packs::PackManager;

/// Search the tenant's FAQ knowledge base. Requires the `faq_search`
/// feature on the tenant's pack.
pub async fn faq_search(
    knowledge: &KnowledgeStore,
    packs: &PackManager,
    tenant_id: &str,
    query: &str,
    category: Option<&str>,
) -> Result<Vec<KnowledgeHit>> {
    if !packs.allow_feature(tenant_id, APPLICATION_ID, "faq_search") {
        return Err(AxelisError::PermissionDenied(
            "faq_search requires the basic pack or higher".into(),
        ));
    }

    knowledge
        .query(APPLICATION_ID, tenant_id, query, 5, category)
        .await
}

/// Compute transfer fees: 500 XOF base plus 2%, capped per destination
/// class. Requires the `account_info` feature.
pub fn transfer_fees(
    packs: &PackManager,
    tenant_id: &str,
    amount: f64,
    destination: &str,
) -> Result<Value> {
    if !packs.allow_feature(tenant_id, APPLICATION_ID, "account_info") {
        return Err(AxelisError::PermissionDenied(
            "transfer_fees requires the advanced pack or higher".into(),
        ));
    }

    let base_fee = 500.0;
    let percentage_fee = amount * 0.02;
    let total = base_fee + percentage_fee;

    let cap = match destination_class(destination) {
        "regional" => 5000.0,
        "international" => 10000.0,
        _ => 2000.0,
    };
    let final_fee = total.min(cap);

    Ok(json!({
        "amount": amount,
        "destination": destination,
        "base_fee": base_fee,
        "percentage_fee": percentage_fee,
        "total_fee": final_fee,
        "currency": "XOF",
    }))
}

/// Check per-user transfer caps. Requires the `account_operations` feature.
pub fn transfer_limits(
    packs: &PackManager,
    tenant_id: &str,
    _user_id: &str,
    amount: f64,
) -> Result<Value> {
    if !packs.allow_feature(tenant_id, APPLICATION_ID, "account_operations") {
        return Err(AxelisError::PermissionDenied(
            "transfer_limits requires the premium pack".into(),
        ));
    }

    let single_transfer_limit = 500_000.0;
    let limits = json!({
        "daily_limit": 1_000_000,
        "monthly_limit": 5_000_000,
        "single_transfer_limit": single_transfer_limit,
    });

    let single_ok = amount <= single_transfer_limit;
    Ok(json!({
        "single_transfer_ok": single_ok,
        "user_limits": limits,
        "requested_amount": amount,
        "all_checks_passed": single_ok,
    }))
}

/// Destination classes recognised by the fee schedule.
fn destination_class(destination: &str) -> &'static str {
    const REGIONAL: &[&str] = &["bf", "ml", "sn", "tg", "bj", "ne", "gw"];
    let lower = destination.to_lowercase();
    if lower == "domestic" || lower == "ci" {
        "domestic"
    } else if REGIONAL.contains(&lower.as_str()) || lower == "regional" {
        "regional"
    } else {
        "international"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packs::PackManager;
    use std::path::Path;

    fn packs_with_premium_tenant(dir: &Path) -> PackManager {
        std::fs::create_dir_all(dir.join("apps/mobile_money/tenants")).unwrap();
        std::fs::write(
            dir.join("base_packs.yaml"),
            r#"
base_packs:
  basic:
    features: [basic_chat, faq_search]
  premium:
    features: [basic_chat, faq_search, account_info, account_operations]
"#,
        )
        .unwrap();
        std::fs::write(
            dir.join("apps/mobile_money/tenants/t_ci.yaml"),
            r#"
filiale:
  id: t_ci
applications:
  mobile_money:
    pack_souscrit: premium
"#,
        )
        .unwrap();
        PackManager::load(dir).unwrap()
    }

    #[test]
    fn test_transfer_fees_formula() {
        let dir = tempfile::tempdir().unwrap();
        let packs = packs_with_premium_tenant(dir.path());

        let fees = transfer_fees(&packs, "t_ci", 10_000.0, "domestic").unwrap();
        // 500 + 2% of 10k = 700
        assert_eq!(fees["total_fee"], serde_json::json!(700.0));
        assert_eq!(fees["currency"], serde_json::json!("XOF"));

        // Cap kicks in: 500 + 2% of 200k = 4500, capped at 2000 domestic
        let capped = transfer_fees(&packs, "t_ci", 200_000.0, "domestic").unwrap();
        assert_eq!(capped["total_fee"], serde_json::json!(2000.0));
    }

    #[test]
    fn test_destination_classes() {
        assert_eq!(destination_class("ci"), "domestic");
        assert_eq!(destination_class("BF"), "regional");
        assert_eq!(destination_class("fr"), "international");
    }

    #[test]
    fn test_feature_gates() {
        let dir = tempfile::tempdir().unwrap();
        let packs = packs_with_premium_tenant(dir.path());

        // Premium tenant passes every gate
        assert!(transfer_fees(&packs, "t_ci", 1000.0, "ci").is_ok());
        assert!(transfer_limits(&packs, "t_ci", "u1", 1000.0).is_ok());

        // Default-pack tenant is denied the gated tools
        let denied = transfer_fees(&packs, "t_unknown", 1000.0, "ci");
        assert!(matches!(denied, Err(AxelisError::PermissionDenied(_))));
        let denied = transfer_limits(&packs, "t_unknown", "u1", 1000.0);
        assert!(matches!(denied, Err(AxelisError::PermissionDenied(_))));
    }

    #[test]
    fn test_transfer_limits_checks() {
        let dir = tempfile::tempdir().unwrap();
        let packs = packs_with_premium_tenant(dir.path());

        let ok = transfer_limits(&packs, "t_ci", "u1", 100_000.0).unwrap();
        assert_eq!(ok["all_checks_passed"], serde_json::json!(true));

        let too_big = transfer_limits(&packs, "t_ci", "u1", 900_000.0).unwrap();
        assert_eq!(too_big["all_checks_passed"], serde_json::json!(false));
    }
}
