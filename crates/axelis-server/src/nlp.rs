// crates/axelis-server/src/nlp.rs
// Language detection, intent classification and sentiment analysis
//
// Intent and sentiment go through the LLM when one is configured; both
// degrade to safe neutral defaults so the pipeline never stalls on an NLP
// failure.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::llm::{LlmClient, Message};

/// Default language for the francophone deployment footprint.
pub const DEFAULT_LANGUAGE: &str = "fr";

/// Classified intent of a user message.
#[derive(Debug, Clone, Deserialize)]
pub struct IntentResult {
    pub intent: String,
    /// 0-100
    #[serde(default)]
    pub confidence: u8,
    #[serde(default)]
    pub entities: Value,
    #[serde(default = "neutral")]
    pub sentiment: String,
}

impl Default for IntentResult {
    fn default() -> Self {
        Self {
            intent: "unknown".into(),
            confidence: 0,
            entities: Value::Object(Default::default()),
            sentiment: neutral(),
        }
    }
}

/// Sentiment of a user message.
#[derive(Debug, Clone, Deserialize)]
pub struct SentimentResult {
    #[serde(default = "neutral")]
    pub sentiment: String,
    #[serde(default = "normal")]
    pub urgency: String,
}

impl Default for SentimentResult {
    fn default() -> Self {
        Self {
            sentiment: neutral(),
            urgency: normal(),
        }
    }
}

fn neutral() -> String {
    "neutre".into()
}

fn normal() -> String {
    "normale".into()
}

/// Detect the message language by keyword scoring. Supported: fr, en;
/// defaults to [`DEFAULT_LANGUAGE`].
pub fn detect_language(message: &str) -> String {
    const FRENCH_KEYWORDS: &[&str] = &[
        "bonjour", "salut", "merci", "comment", "pourquoi", "transfert", "argent", "solde",
    ];
    const ENGLISH_KEYWORDS: &[&str] = &[
        "hello", "hi", "thank", "how", "why", "transfer", "money", "balance",
    ];

    let lower = message.to_lowercase();
    let french_score = FRENCH_KEYWORDS.iter().filter(|kw| lower.contains(*kw)).count();
    let english_score = ENGLISH_KEYWORDS.iter().filter(|kw| lower.contains(*kw)).count();

    if french_score > english_score {
        DEFAULT_LANGUAGE.to_string()
    } else if english_score > 0 {
        "en".to_string()
    } else {
        DEFAULT_LANGUAGE.to_string()
    }
}

/// Classify the intent of a message against the available intent names.
pub async fn classify_intent(
    llm: Option<&Arc<dyn LlmClient>>,
    message: &str,
    available_intents: &[&str],
) -> IntentResult {
    let Some(client) = llm else {
        return IntentResult::default();
    };

    let system_prompt = format!(
        "Tu es un classificateur d'intentions pour un assistant bancaire.\n\
         Intentions disponibles: {}.\n\
         Analyse le message utilisateur et réponds au format JSON uniquement:\n\
         {{\"intent\": \"...\", \"confidence\": 0-100, \"entities\": {{}}, \
         \"sentiment\": \"positif|neutre|negative|urgent\"}}",
        available_intents.join(", ")
    );

    let messages = vec![Message::system(system_prompt), Message::user(message)];
    match client.chat(messages).await {
        Ok(result) => match parse_json_reply::<IntentResult>(&result.content) {
            Some(parsed) => {
                debug!(intent = %parsed.intent, confidence = parsed.confidence, "Intent classified");
                parsed
            }
            None => IntentResult::default(),
        },
        Err(e) => {
            debug!("Intent classification failed: {}", e);
            IntentResult::default()
        }
    }
}

/// Analyze sentiment; returns neutral defaults on any failure.
pub async fn analyze_sentiment(
    llm: Option<&Arc<dyn LlmClient>>,
    message: &str,
) -> SentimentResult {
    let Some(client) = llm else {
        return SentimentResult::default();
    };

    let messages = vec![
        Message::system(
            "Analyse le sentiment de ce message. Réponds au format JSON uniquement: \
             {\"sentiment\": \"positif|neutre|negative|urgent\", \"urgency\": \"normale|haute\"}",
        ),
        Message::user(message),
    ];

    match client.chat(messages).await {
        Ok(result) => {
            parse_json_reply::<SentimentResult>(&result.content).unwrap_or_default()
        }
        Err(e) => {
            debug!("Sentiment analysis failed: {}", e);
            SentimentResult::default()
        }
    }
}

/// Extract a JSON object from an LLM reply, tolerating code fences.
fn parse_json_reply<T: for<'de> Deserialize<'de>>(content: &str) -> Option<T> {
    let trimmed = content.trim();
    let stripped = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|s| s.trim_end_matches("```"))
        .unwrap_or(trimmed)
        .trim();
    serde_json::from_str(stripped).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_language_french() {
        assert_eq!(detect_language("Bonjour, comment consulter mon solde ?"), "fr");
    }

    #[test]
    fn test_detect_language_english() {
        assert_eq!(detect_language("Hello, how do I transfer money?"), "en");
    }

    #[test]
    fn test_detect_language_defaults_to_french() {
        assert_eq!(detect_language("xyz"), "fr");
    }

    #[test]
    fn test_parse_json_reply_with_fences() {
        let fenced = "```json\n{\"sentiment\": \"urgent\", \"urgency\": \"haute\"}\n```";
        let parsed: SentimentResult = parse_json_reply(fenced).unwrap();
        assert_eq!(parsed.sentiment, "urgent");
        assert_eq!(parsed.urgency, "haute");
    }

    #[test]
    fn test_parse_json_reply_garbage() {
        assert!(parse_json_reply::<SentimentResult>("not json at all").is_none());
    }

    #[tokio::test]
    async fn test_fallbacks_without_llm() {
        let intent = classify_intent(None, "bonjour", &["greeting"]).await;
        assert_eq!(intent.intent, "unknown");
        assert_eq!(intent.sentiment, "neutre");

        let sentiment = analyze_sentiment(None, "bonjour").await;
        assert_eq!(sentiment.sentiment, "neutre");
        assert_eq!(sentiment.urgency, "normale");
    }
}
