// packs/mod.rs
// Tenant capability resolver: tenant -> pack -> {features, agents, quotas}
//
// Resolution is a pure function of the loaded configuration, so results can
// be snapshotted into session metadata. Base packs compose by inheritance:
// set fields union-merge (inherited base packs, then a same-named base pack,
// then the app pack itself), scalars are last-writer-wins.

pub mod config;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::error::{AxelisError, Result};
use config::{AppPacksFile, BasePacksFile, PackDefinition, TenantFile};

/// Pack a tenant falls back to when its subscription is missing.
pub const DEFAULT_PACK: &str = "basic";

/// Automation level when the app pack does not declare one.
pub const DEFAULT_AUTOMATION_LEVEL: u8 = 30;

/// Fully resolved capabilities for one `(tenant, application)` pair.
#[derive(Debug, Clone, Serialize)]
pub struct TenantCapabilities {
    pub tenant_id: String,
    pub application: String,
    pub pack_name: String,
    pub features: Vec<String>,
    pub agents: Vec<String>,
    pub tools: Vec<String>,
    pub channels: Vec<String>,
    pub limits: BTreeMap<String, i64>,
    pub automation_level: u8,
}

impl TenantCapabilities {
    /// Pack snapshot stored as session metadata at creation time.
    pub fn snapshot(&self) -> serde_json::Value {
        json!({
            "pack_level": self.pack_name,
            "features_available": self.features,
            "agents_available": self.agents,
            "limits": self.limits,
            "automation_level": self.automation_level,
        })
    }
}

/// Immutable pack configuration snapshot, swapped wholesale on reload.
#[derive(Debug, Default)]
struct PackConfig {
    base_packs: HashMap<String, PackDefinition>,
    app_packs: HashMap<String, HashMap<String, PackDefinition>>,
}

/// Per-tenant capability resolver with lazy tenant-config caching.
pub struct PackManager {
    config_dir: PathBuf,
    packs: RwLock<Arc<PackConfig>>,
    tenant_cache: RwLock<HashMap<String, Arc<TenantFile>>>,
}

impl PackManager {
    /// Load pack configuration from `config_dir`.
    ///
    /// Missing files fall back to a built-in default so the resolver never
    /// fails at this level; `Fatal` is reserved for the caller when even the
    /// defaults would leave zero packs (cannot happen with the built-ins).
    pub fn load(config_dir: &Path) -> Result<Self> {
        let packs = Self::load_packs(config_dir)?;
        if packs.base_packs.is_empty() && packs.app_packs.values().all(|p| p.is_empty()) {
            return Err(AxelisError::Config(
                "no packs loaded — base pack configuration is empty".into(),
            ));
        }

        info!(
            base_packs = packs.base_packs.len(),
            applications = packs.app_packs.len(),
            "Pack manager initialized"
        );

        Ok(Self {
            config_dir: config_dir.to_path_buf(),
            packs: RwLock::new(Arc::new(packs)),
            tenant_cache: RwLock::new(HashMap::new()),
        })
    }

    fn load_packs(config_dir: &Path) -> Result<PackConfig> {
        let base_path = config_dir.join("base_packs.yaml");
        let base_packs = if base_path.exists() {
            let raw = std::fs::read_to_string(&base_path)?;
            let file: BasePacksFile = serde_yaml::from_str(&raw)?;
            info!(packs = ?file.base_packs.keys().collect::<Vec<_>>(), "Loaded base packs");
            file.base_packs
        } else {
            warn!(path = %base_path.display(), "Base packs file not found, using defaults");
            Self::default_base_packs()
        };

        let mut app_packs = HashMap::new();
        let apps_dir = config_dir.join("apps");
        if apps_dir.exists() {
            for entry in std::fs::read_dir(&apps_dir)? {
                let entry = entry?;
                if !entry.file_type()?.is_dir() {
                    continue;
                }
                let app_name = entry.file_name().to_string_lossy().to_string();
                let packs_path = entry.path().join("packs.yaml");
                let packs = Self::load_app_packs(&app_name, &packs_path);
                info!(
                    application = %app_name,
                    packs = ?packs.keys().collect::<Vec<_>>(),
                    "Loaded application packs"
                );
                app_packs.insert(app_name, packs);
            }
        }

        Ok(PackConfig {
            base_packs,
            app_packs,
        })
    }

    /// Read one application's packs file. The packs live under
    /// `<app>_packs`, or `packs`, or a single top-level key.
    fn load_app_packs(app_name: &str, path: &Path) -> HashMap<String, PackDefinition> {
        if !path.exists() {
            debug!(application = app_name, "No app packs file");
            return HashMap::new();
        }
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(application = app_name, error = %e, "Failed to read app packs");
                return HashMap::new();
            }
        };
        let parsed: AppPacksFile = match serde_yaml::from_str(&raw) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(application = app_name, error = %e, "Invalid app packs YAML");
                return HashMap::new();
            }
        };

        let preferred = format!("{app_name}_packs");
        if let Some(packs) = parsed.get(&preferred) {
            return packs.clone();
        }
        if let Some(packs) = parsed.get("packs") {
            return packs.clone();
        }
        if parsed.len() == 1 {
            if let Some(packs) = parsed.into_values().next() {
                return packs;
            }
        }
        warn!(application = app_name, "No packs key found in app packs file");
        HashMap::new()
    }

    /// Built-in defaults used when no base packs file is present.
    fn default_base_packs() -> HashMap<String, PackDefinition> {
        let yaml = r#"
basic:
  name: "Basic"
  description: "Entry-level subscription"
  features: [basic_chat, faq_search]
  agents: [general_assistant]
  channels: [mobile]
  limits:
    tokens_per_day: 10000
advanced:
  name: "Advanced"
  description: "Extended subscription"
  features: [basic_chat, faq_search, account_info, advanced_analytics]
  agents: [general_assistant, banking_assistant]
  channels: [mobile, web]
  limits:
    tokens_per_day: 50000
"#;
        serde_yaml::from_str(yaml).unwrap_or_default()
    }

    /// The pack a tenant subscribed for an application. Defaults to
    /// [`DEFAULT_PACK`] whenever the tenant or field is missing; never fails.
    pub fn pack_of(&self, tenant_id: &str, application: &str) -> String {
        let tenant = self.tenant_config(tenant_id, application);
        tenant
            .applications
            .get(application)
            .and_then(|app| app.pack_souscrit.clone())
            .unwrap_or_else(|| DEFAULT_PACK.to_string())
    }

    /// Resolved feature set for a pack (inherited bases ⊕ app pack).
    pub fn features_of(&self, pack_name: &str, application: &str) -> BTreeSet<String> {
        self.resolve(pack_name, application, |p| &p.features)
            .into_iter()
            .collect()
    }

    /// Resolved agent list (order-preserving, deduplicated).
    pub fn agents_of(&self, pack_name: &str, application: &str) -> Vec<String> {
        dedup_preserving(self.resolve(pack_name, application, |p| &p.agents))
    }

    /// Resolved tool list (order-preserving, deduplicated).
    pub fn tools_of(&self, pack_name: &str, application: &str) -> Vec<String> {
        dedup_preserving(self.resolve(pack_name, application, |p| &p.tools))
    }

    /// Resolved channel list (order-preserving, deduplicated).
    pub fn channels_of(&self, pack_name: &str, application: &str) -> Vec<String> {
        dedup_preserving(self.resolve(pack_name, application, |p| &p.channels))
    }

    /// Resolved usage limits. Base limits first, app pack keys override.
    pub fn limits_of(&self, pack_name: &str, application: &str) -> BTreeMap<String, i64> {
        let packs = self.packs();
        let mut limits = BTreeMap::new();
        for def in self.resolution_chain(&packs, pack_name, application) {
            for (key, value) in &def.limits {
                limits.insert(key.clone(), *value);
            }
        }
        limits
    }

    /// Automation level: from the app pack, else the inherited chain,
    /// else [`DEFAULT_AUTOMATION_LEVEL`]. Last writer wins.
    pub fn automation_level_of(&self, pack_name: &str, application: &str) -> u8 {
        let packs = self.packs();
        self.resolution_chain(&packs, pack_name, application)
            .into_iter()
            .filter_map(|def| def.automation_level)
            .next_back()
            .unwrap_or(DEFAULT_AUTOMATION_LEVEL)
    }

    /// Can this tenant use a feature?
    pub fn allow_feature(&self, tenant_id: &str, application: &str, feature: &str) -> bool {
        let pack = self.pack_of(tenant_id, application);
        self.features_of(&pack, application).contains(feature)
    }

    /// Can this tenant use a reasoning agent?
    pub fn allow_agent(&self, tenant_id: &str, application: &str, agent_name: &str) -> bool {
        let pack = self.pack_of(tenant_id, application);
        self.agents_of(&pack, application)
            .iter()
            .any(|a| a == agent_name)
    }

    /// `current <= limit` for a declared resource; undeclared resources are
    /// unlimited.
    pub fn within_quota(
        &self,
        tenant_id: &str,
        application: &str,
        resource: &str,
        current: i64,
    ) -> bool {
        let pack = self.pack_of(tenant_id, application);
        match self.limits_of(&pack, application).get(resource) {
            Some(limit) => current <= *limit,
            None => true,
        }
    }

    /// Full capability view for one tenant.
    pub fn capabilities_of(&self, tenant_id: &str, application: &str) -> TenantCapabilities {
        let pack_name = self.pack_of(tenant_id, application);
        TenantCapabilities {
            tenant_id: tenant_id.to_string(),
            application: application.to_string(),
            features: self.features_of(&pack_name, application).into_iter().collect(),
            agents: self.agents_of(&pack_name, application),
            tools: self.tools_of(&pack_name, application),
            channels: self.channels_of(&pack_name, application),
            limits: self.limits_of(&pack_name, application),
            automation_level: self.automation_level_of(&pack_name, application),
            pack_name,
        }
    }

    /// Reload all configuration. The swap is atomic: in-flight readers keep
    /// the previous snapshot, new readers observe the full new one.
    pub fn reload(&self) -> Result<()> {
        info!("Reloading pack configurations");
        let fresh = Self::load_packs(&self.config_dir)?;

        #[allow(clippy::unwrap_used)]
        {
            *self.packs.write().unwrap() = Arc::new(fresh);
            self.tenant_cache.write().unwrap().clear();
        }
        info!("Pack configurations reloaded");
        Ok(())
    }

    /// Counts for the monitoring surface.
    pub fn statistics(&self) -> serde_json::Value {
        let packs = self.packs();
        #[allow(clippy::unwrap_used)]
        let cached_tenants = self.tenant_cache.read().unwrap().len();
        json!({
            "base_packs_count": packs.base_packs.len(),
            "applications_count": packs.app_packs.len(),
            "total_app_packs": packs.app_packs.values().map(|p| p.len()).sum::<usize>(),
            "cached_tenants": cached_tenants,
            "applications": packs.app_packs.keys().collect::<Vec<_>>(),
        })
    }

    fn packs(&self) -> Arc<PackConfig> {
        #[allow(clippy::unwrap_used)]
        let snapshot = self.packs.read().unwrap().clone();
        snapshot
    }

    /// The ordered chain of pack definitions contributing to a resolution:
    /// inherited base packs, a same-named base pack, then the app pack.
    fn resolution_chain<'a>(
        &self,
        packs: &'a PackConfig,
        pack_name: &str,
        application: &str,
    ) -> Vec<&'a PackDefinition> {
        let mut chain = Vec::new();
        let app_pack = packs
            .app_packs
            .get(application)
            .and_then(|app| app.get(pack_name));

        if let Some(app_def) = app_pack {
            for base_name in &app_def.inherits_base {
                if let Some(base) = packs.base_packs.get(base_name) {
                    chain.push(base);
                } else {
                    warn!(pack = pack_name, base = %base_name, "Unknown inherited base pack");
                }
            }
        }
        if let Some(base) = packs.base_packs.get(pack_name) {
            chain.push(base);
        }
        if let Some(app_def) = app_pack {
            chain.push(app_def);
        }
        chain
    }

    fn resolve(
        &self,
        pack_name: &str,
        application: &str,
        field: impl Fn(&PackDefinition) -> &Vec<String>,
    ) -> Vec<String> {
        let packs = self.packs();
        let mut values = Vec::new();
        for def in self.resolution_chain(&packs, pack_name, application) {
            values.extend(field(def).iter().cloned());
        }
        values
    }

    /// Lazily load and cache one tenant's configuration. Missing or invalid
    /// files resolve to a default subscription on [`DEFAULT_PACK`].
    fn tenant_config(&self, tenant_id: &str, application: &str) -> Arc<TenantFile> {
        let cache_key = format!("{application}_{tenant_id}");
        #[allow(clippy::unwrap_used)]
        {
            if let Some(cached) = self.tenant_cache.read().unwrap().get(&cache_key) {
                return cached.clone();
            }
        }

        let path = self
            .config_dir
            .join("apps")
            .join(application)
            .join("tenants")
            .join(format!("{tenant_id}.yaml"));

        let config = if path.exists() {
            match std::fs::read_to_string(&path)
                .map_err(AxelisError::from)
                .and_then(|raw| serde_yaml::from_str::<TenantFile>(&raw).map_err(AxelisError::from))
            {
                Ok(config) => config,
                Err(e) => {
                    warn!(tenant_id, error = %e, "Invalid tenant config, using defaults");
                    Self::default_tenant(tenant_id, application)
                }
            }
        } else {
            debug!(tenant_id, path = %path.display(), "Tenant config not found, using defaults");
            Self::default_tenant(tenant_id, application)
        };

        let config = Arc::new(config);
        #[allow(clippy::unwrap_used)]
        self.tenant_cache
            .write()
            .unwrap()
            .insert(cache_key, config.clone());
        config
    }

    fn default_tenant(tenant_id: &str, application: &str) -> TenantFile {
        let yaml = format!(
            r#"
filiale:
  id: {tenant_id}
  name: "Tenant {tenant_id}"
applications:
  {application}:
    active: true
    pack_souscrit: {DEFAULT_PACK}
"#
        );
        serde_yaml::from_str(&yaml).unwrap_or_default()
    }
}

fn dedup_preserving(values: Vec<String>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    values
        .into_iter()
        .filter(|v| seen.insert(v.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_config(dir: &Path) {
        fs::create_dir_all(dir.join("apps/mobile_money/tenants")).unwrap();
        fs::write(
            dir.join("base_packs.yaml"),
            r#"
base_packs:
  infrastructure:
    features: [vector_search, conversation_store]
    agents: [core_customer_service]
    tools: [knowledge_query]
  basic:
    features: [basic_chat, faq_search]
    agents: [general_assistant]
    channels: [mobile]
    limits:
      tokens_per_day: 10000
"#,
        )
        .unwrap();
        fs::write(
            dir.join("apps/mobile_money/packs.yaml"),
            r#"
mobile_money_packs:
  basic:
    inherits_base: [infrastructure]
    features: [balance_lookup]
    agents: [banking_assistant]
    automation_level: 70
    limits:
      requests_per_minute: 30
  premium:
    inherits_base: [infrastructure, basic]
    features: [account_operations]
    agents: [operations_specialist]
    automation_level: 95
"#,
        )
        .unwrap();
        fs::write(
            dir.join("apps/mobile_money/tenants/t_ci.yaml"),
            r#"
filiale:
  id: t_ci
  name: "Côte d'Ivoire"
applications:
  mobile_money:
    active: true
    pack_souscrit: premium
"#,
        )
        .unwrap();
    }

    fn manager() -> (tempfile::TempDir, PackManager) {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path());
        let manager = PackManager::load(dir.path()).unwrap();
        (dir, manager)
    }

    #[test]
    fn test_pack_of_subscribed_tenant() {
        let (_dir, manager) = manager();
        assert_eq!(manager.pack_of("t_ci", "mobile_money"), "premium");
    }

    #[test]
    fn test_pack_of_unknown_tenant_defaults() {
        let (_dir, manager) = manager();
        assert_eq!(manager.pack_of("t_unknown", "mobile_money"), DEFAULT_PACK);
    }

    #[test]
    fn test_inheritance_union_merge() {
        let (_dir, manager) = manager();
        let features = manager.features_of("basic", "mobile_money");
        // From the inherited base, the same-named base pack, and the app pack
        assert!(features.contains("vector_search"));
        assert!(features.contains("basic_chat"));
        assert!(features.contains("balance_lookup"));

        let agents = manager.agents_of("basic", "mobile_money");
        assert!(agents.contains(&"core_customer_service".to_string()));
        assert!(agents.contains(&"general_assistant".to_string()));
        assert!(agents.contains(&"banking_assistant".to_string()));
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let (_dir, manager) = manager();
        let first = manager.capabilities_of("t_ci", "mobile_money");
        let second = manager.capabilities_of("t_ci", "mobile_money");
        assert_eq!(first.features, second.features);
        assert_eq!(first.agents, second.agents);
        assert_eq!(first.limits, second.limits);
        assert_eq!(first.automation_level, second.automation_level);
    }

    #[test]
    fn test_automation_level_last_writer_wins() {
        let (_dir, manager) = manager();
        assert_eq!(manager.automation_level_of("basic", "mobile_money"), 70);
        assert_eq!(manager.automation_level_of("premium", "mobile_money"), 95);
        // Unknown pack falls back to the default
        assert_eq!(
            manager.automation_level_of("nonexistent", "mobile_money"),
            DEFAULT_AUTOMATION_LEVEL
        );
    }

    #[test]
    fn test_limits_merge_and_quota() {
        let (_dir, manager) = manager();
        let limits = manager.limits_of("basic", "mobile_money");
        assert_eq!(limits["tokens_per_day"], 10000);
        assert_eq!(limits["requests_per_minute"], 30);

        // Tenant defaults to `basic` via its missing config
        assert!(manager.within_quota("t_unknown", "mobile_money", "tokens_per_day", 10000));
        assert!(!manager.within_quota("t_unknown", "mobile_money", "tokens_per_day", 10001));
        assert!(manager.within_quota("t_unknown", "mobile_money", "undeclared", i64::MAX));
    }

    #[test]
    fn test_allow_feature_and_agent() {
        let (_dir, manager) = manager();
        assert!(manager.allow_feature("t_ci", "mobile_money", "account_operations"));
        assert!(manager.allow_agent("t_ci", "mobile_money", "operations_specialist"));

        // Default-pack tenant has neither
        assert!(!manager.allow_feature("t_unknown", "mobile_money", "account_operations"));
        assert!(!manager.allow_agent("t_unknown", "mobile_money", "operations_specialist"));
        assert!(manager.allow_agent("t_unknown", "mobile_money", "general_assistant"));
    }

    #[test]
    fn test_reload_matches_fresh_boot() {
        let (_dir, manager) = manager();
        let before = manager.capabilities_of("t_ci", "mobile_money");
        manager.reload().unwrap();
        let after = manager.capabilities_of("t_ci", "mobile_money");
        assert_eq!(before.features, after.features);
        assert_eq!(before.agents, after.agents);
        assert_eq!(before.pack_name, after.pack_name);
    }

    #[test]
    fn test_defaults_without_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let manager = PackManager::load(dir.path()).unwrap();
        // Built-in defaults carry the two entry packs
        assert!(manager.features_of("basic", "mobile_money").contains("basic_chat"));
        assert!(
            manager
                .features_of("advanced", "mobile_money")
                .contains("advanced_analytics")
        );
    }

    #[test]
    fn test_statistics_shape() {
        let (_dir, manager) = manager();
        let stats = manager.statistics();
        assert_eq!(stats["applications_count"], json!(1));
        assert_eq!(stats["total_app_packs"], json!(2));
    }
}
