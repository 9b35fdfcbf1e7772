// packs/config.rs
// YAML shapes for base packs, per-application packs and tenant subscriptions

use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

/// `base_packs.yaml` top level.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BasePacksFile {
    #[serde(default)]
    pub base_packs: HashMap<String, PackDefinition>,
}

/// One pack definition (base or application-level; app packs additionally
/// carry `inherits_base` and `automation_level`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PackDefinition {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub inherits_base: Vec<String>,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub agents: Vec<String>,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default)]
    pub automation_level: Option<u8>,
    #[serde(default)]
    pub limits: BTreeMap<String, i64>,
}

/// Per-application packs file: `{<app>_packs: {...}}` or `{packs: {...}}`.
/// Deserialized as a generic map and resolved by key at load time.
pub type AppPacksFile = HashMap<String, HashMap<String, PackDefinition>>;

/// One tenant's configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TenantFile {
    #[serde(default)]
    pub filiale: TenantIdentity,
    #[serde(default)]
    pub applications: HashMap<String, TenantApplication>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TenantIdentity {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TenantApplication {
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub pack_souscrit: Option<String>,
    #[serde(default)]
    pub knowledge_base: HashMap<String, String>,
    #[serde(default)]
    pub databases: HashMap<String, String>,
}

fn default_active() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_packs_yaml_shape() {
        let yaml = r#"
base_packs:
  basic:
    name: "Basic"
    features: [basic_chat, faq_search]
    agents: [general_assistant]
    limits:
      tokens_per_day: 10000
"#;
        let parsed: BasePacksFile = serde_yaml::from_str(yaml).unwrap();
        let basic = &parsed.base_packs["basic"];
        assert_eq!(basic.features, vec!["basic_chat", "faq_search"]);
        assert_eq!(basic.limits["tokens_per_day"], 10000);
        assert!(basic.inherits_base.is_empty());
    }

    #[test]
    fn test_app_packs_yaml_shape() {
        let yaml = r#"
mobile_money_packs:
  advanced:
    inherits_base: [infrastructure]
    features: [account_info]
    agents: [banking_assistant]
    automation_level: 70
"#;
        let parsed: AppPacksFile = serde_yaml::from_str(yaml).unwrap();
        let packs = &parsed["mobile_money_packs"];
        assert_eq!(packs["advanced"].automation_level, Some(70));
        assert_eq!(packs["advanced"].inherits_base, vec!["infrastructure"]);
    }

    #[test]
    fn test_tenant_yaml_shape() {
        let yaml = r#"
filiale:
  id: t_ci
  name: "Côte d'Ivoire"
applications:
  mobile_money:
    active: true
    pack_souscrit: advanced
    knowledge_base:
      collection_prefix: mobile_money
"#;
        let parsed: TenantFile = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(parsed.filiale.id, "t_ci");
        let app = &parsed.applications["mobile_money"];
        assert!(app.active);
        assert_eq!(app.pack_souscrit.as_deref(), Some("advanced"));
    }
}
