// crates/axelis-server/src/escalation/detector.rs
// Deterministic escalation detection
//
// Pure rule evaluation: same input, same (should_escalate, reasons,
// priority). Rules are hot-swappable behind a lock; evaluation never takes
// the lock across I/O.

use std::fmt;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::info;

/// Escalation priority, ordered low to urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "urgent" => Some(Self::Urgent),
            _ => None,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hot-swappable rule configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationRules {
    pub failed_attempts_threshold: u32,
    pub urgent_keywords: Vec<String>,
    pub complex_query_indicators: Vec<String>,
    pub explicit_request_phrases: Vec<String>,
}

impl Default for EscalationRules {
    fn default() -> Self {
        Self {
            failed_attempts_threshold: 3,
            urgent_keywords: to_strings(&[
                "urgent",
                "immédiat",
                "emergency",
                "bloqué",
                "problème grave",
            ]),
            complex_query_indicators: to_strings(&[
                "plusieurs",
                "complexe",
                "ne comprends pas",
                "confusion",
            ]),
            explicit_request_phrases: to_strings(&[
                "agent humain",
                "conseiller",
                "responsable",
                "manager",
                "supervisor",
            ]),
        }
    }
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

/// Detector input, assembled per turn by the pipeline.
#[derive(Debug, Clone, Default)]
pub struct EscalationInput {
    pub user_message: String,
    /// Maintained by the orchestrator across non-success tiers
    pub failed_attempts: u32,
    pub sentiment: String,
    pub complaint_priority: Option<String>,
    pub technical_error: bool,
}

/// Detection result.
#[derive(Debug, Clone)]
pub struct EscalationAssessment {
    pub should_escalate: bool,
    pub reasons: Vec<String>,
    pub priority: Priority,
}

impl EscalationAssessment {
    /// Reasons joined for storage/logging; `no_escalation_needed` when empty.
    pub fn reasons_str(&self) -> String {
        if self.reasons.is_empty() {
            "no_escalation_needed".to_string()
        } else {
            self.reasons.join(" | ")
        }
    }
}

/// Rule-based escalation detector.
pub struct EscalationDetector {
    rules: RwLock<EscalationRules>,
}

impl Default for EscalationDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl EscalationDetector {
    pub fn new() -> Self {
        Self {
            rules: RwLock::new(EscalationRules::default()),
        }
    }

    pub fn with_rules(rules: EscalationRules) -> Self {
        Self {
            rules: RwLock::new(rules),
        }
    }

    /// Swap the rule configuration.
    pub fn update_rules(&self, rules: EscalationRules) {
        #[allow(clippy::unwrap_used)]
        {
            *self.rules.write().unwrap() = rules;
        }
        info!("Escalation rules updated");
    }

    /// Evaluate all rules against the input, accumulating reasons.
    /// Order-insensitive: every rule is checked, none short-circuits.
    pub fn evaluate(&self, input: &EscalationInput) -> EscalationAssessment {
        #[allow(clippy::unwrap_used)]
        let rules = self.rules.read().unwrap().clone();
        let message = input.user_message.to_lowercase();
        let mut reasons = Vec::new();

        if input.failed_attempts >= rules.failed_attempts_threshold {
            reasons.push(format!("multiple_failures({})", input.failed_attempts));
        }

        let urgent_found: Vec<&str> = rules
            .urgent_keywords
            .iter()
            .filter(|kw| message.contains(kw.as_str()))
            .map(String::as_str)
            .collect();
        if !urgent_found.is_empty() {
            reasons.push(format!("urgent_keywords({})", urgent_found.join(",")));
        }

        if input.sentiment == "negative" || input.sentiment == "urgent" {
            reasons.push("negative_sentiment".to_string());
        }

        let complex_found: Vec<&str> = rules
            .complex_query_indicators
            .iter()
            .filter(|ind| message.contains(ind.as_str()))
            .map(String::as_str)
            .collect();
        if !complex_found.is_empty() {
            reasons.push(format!("complex_query({})", complex_found.join(",")));
        }

        if input.complaint_priority.as_deref() == Some("URGENT") {
            reasons.push("urgent_complaint".to_string());
        }

        if rules
            .explicit_request_phrases
            .iter()
            .any(|phrase| message.contains(phrase.as_str()))
        {
            reasons.push("explicit_human_request".to_string());
        }

        if input.technical_error {
            reasons.push("technical_error".to_string());
        }

        let should_escalate = !reasons.is_empty();
        let priority = Self::assess_priority(&reasons);

        if should_escalate {
            info!(
                reasons = %reasons.join(" | "),
                priority = %priority,
                "Escalation detected"
            );
        }

        EscalationAssessment {
            should_escalate,
            reasons,
            priority,
        }
    }

    /// Priority from accumulated reasons: urgent beats high beats medium.
    fn assess_priority(reasons: &[String]) -> Priority {
        let has = |prefix: &str| reasons.iter().any(|r| r.starts_with(prefix));

        if has("urgent_complaint") || has("urgent_keywords") || has("technical_error") {
            Priority::Urgent
        } else if has("multiple_failures") || has("negative_sentiment") {
            Priority::High
        } else if has("explicit_human_request") {
            Priority::Medium
        } else {
            Priority::Low
        }
    }
}
