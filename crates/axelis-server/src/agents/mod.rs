// crates/axelis-server/src/agents/mod.rs
// Role-typed reasoning agent descriptors
//
// Agents are data, not code: a registry of descriptors loaded from YAML,
// indexed by name. The orchestrator consumes descriptors to build a crew
// for each turn; tool sets are passed by value, never inherited.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info, warn};

/// One reasoning agent definition.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentDescriptor {
    pub role: String,
    pub goal: String,
    pub backstory: String,
    #[serde(default = "default_max_iter")]
    pub max_iter: u32,
    #[serde(default = "default_true")]
    pub memory: bool,
    #[serde(default)]
    pub verbose: bool,
    #[serde(default)]
    pub allow_delegation: bool,
    #[serde(default)]
    pub tools: Vec<String>,
    /// Minimum pack required to use this agent (None = any pack that
    /// lists it).
    #[serde(default)]
    pub required_pack: Option<String>,
}

fn default_max_iter() -> u32 {
    3
}

fn default_true() -> bool {
    true
}

impl AgentDescriptor {
    /// Synthesized definition for agents missing from configuration.
    pub fn default_for(name: &str, tenant_id: &str) -> Self {
        Self {
            role: format!("Assistant {name}"),
            goal: "Aider les utilisateurs avec leurs questions".into(),
            backstory: format!("Assistant spécialisé pour la filiale {tenant_id}"),
            max_iter: default_max_iter(),
            memory: true,
            verbose: false,
            allow_delegation: false,
            tools: Vec::new(),
            required_pack: None,
        }
    }
}

/// One task definition executed by a crew.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskDescriptor {
    pub description: String,
    #[serde(default = "default_expected_output")]
    pub expected_output: String,
}

fn default_expected_output() -> String {
    "Réponse claire et utile à la question de l'utilisateur".into()
}

#[derive(Debug, Default, Deserialize)]
struct AgentsFile {
    #[serde(default)]
    agents: HashMap<String, AgentDescriptor>,
}

#[derive(Debug, Default, Deserialize)]
struct TasksFile {
    #[serde(default)]
    tasks: HashMap<String, TaskDescriptor>,
}

/// Registry of agent and task descriptors indexed by name.
pub struct AgentRegistry {
    agents: HashMap<String, AgentDescriptor>,
    tasks: HashMap<String, TaskDescriptor>,
}

impl AgentRegistry {
    /// Load `agents.yaml` and `tasks.yaml` from the configuration directory.
    /// Missing or invalid files leave the registry empty — unknown agents
    /// get synthesized defaults at lookup time.
    pub fn load(config_dir: &Path) -> Self {
        let agents = Self::load_file::<AgentsFile>(&config_dir.join("agents.yaml"))
            .map(|f| f.agents)
            .unwrap_or_default();
        let tasks = Self::load_file::<TasksFile>(&config_dir.join("tasks.yaml"))
            .map(|f| f.tasks)
            .unwrap_or_default();

        info!(
            agents = agents.len(),
            tasks = tasks.len(),
            "Agent registry loaded"
        );
        Self { agents, tasks }
    }

    fn load_file<T: for<'de> Deserialize<'de>>(path: &Path) -> Option<T> {
        if !path.exists() {
            debug!(path = %path.display(), "Agent config file not found");
            return None;
        }
        match std::fs::read_to_string(path) {
            Ok(raw) => match serde_yaml::from_str(&raw) {
                Ok(parsed) => Some(parsed),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Invalid agent config YAML");
                    None
                }
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read agent config");
                None
            }
        }
    }

    /// Empty registry (tests, minimal deployments).
    pub fn empty() -> Self {
        Self {
            agents: HashMap::new(),
            tasks: HashMap::new(),
        }
    }

    pub fn agent_names(&self) -> Vec<&str> {
        self.agents.keys().map(String::as_str).collect()
    }

    /// Descriptor for a named agent, synthesizing a default when missing.
    pub fn get_or_default(&self, name: &str, tenant_id: &str) -> AgentDescriptor {
        match self.agents.get(name) {
            Some(descriptor) => descriptor.clone(),
            None => {
                debug!(agent = name, "Using default config for agent");
                AgentDescriptor::default_for(name, tenant_id)
            }
        }
    }

    pub fn task(&self, name: &str) -> Option<&TaskDescriptor> {
        self.tasks.get(name)
    }

    /// The subset of `allowed` agents usable on `pack_level`: descriptors
    /// whose `required_pack` is unset or at most the tenant's tier.
    pub fn authorized(
        &self,
        allowed: &[String],
        pack_level: &str,
        tenant_id: &str,
    ) -> Vec<(String, AgentDescriptor)> {
        allowed
            .iter()
            .map(|name| (name.clone(), self.get_or_default(name, tenant_id)))
            .filter(|(_, descriptor)| match &descriptor.required_pack {
                // Custom pack names fall back to exact matching, so a gated
                // agent never leaks to a tier it does not name.
                Some(required) => match (pack_rank(pack_level), pack_rank(required)) {
                    (_, 0) => required == pack_level,
                    (have, need) => have >= need,
                },
                None => true,
            })
            .collect()
    }
}

/// Ordering of the standard subscription tiers; 0 = not a standard tier.
fn pack_rank(pack_name: &str) -> u8 {
    match pack_name {
        "premium" => 3,
        "advanced" => 2,
        "basic" => 1,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn registry_from(yaml_agents: &str) -> AgentRegistry {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("agents.yaml"), yaml_agents).unwrap();
        fs::write(
            dir.path().join("tasks.yaml"),
            r#"
tasks:
  respond_to_query:
    description: "Réponds à la question de l'utilisateur"
"#,
        )
        .unwrap();
        AgentRegistry::load(dir.path())
    }

    const AGENTS_YAML: &str = r#"
agents:
  general_assistant:
    role: "Agent de Service Client"
    goal: "Accueillir et orienter les clients avec professionnalisme"
    backstory: "Agent expérimenté du service client"
    tools: [faq_search]
  banking_assistant:
    role: "Assistant Bancaire"
    goal: "Aider les clients avec leurs opérations"
    backstory: "Spécialiste des services bancaires"
    tools: [faq_search, transfer_fees]
    required_pack: advanced
"#;

    #[test]
    fn test_load_and_lookup() {
        let registry = registry_from(AGENTS_YAML);
        let agent = registry.get_or_default("general_assistant", "t_ci");
        assert_eq!(agent.role, "Agent de Service Client");
        assert_eq!(agent.max_iter, 3);
        assert!(agent.memory);
        assert_eq!(agent.tools, vec!["faq_search"]);

        let task = registry.task("respond_to_query").unwrap();
        assert_eq!(
            task.expected_output,
            "Réponse claire et utile à la question de l'utilisateur"
        );
    }

    #[test]
    fn test_unknown_agent_gets_default() {
        let registry = registry_from(AGENTS_YAML);
        let agent = registry.get_or_default("mystery_agent", "t_ci");
        assert_eq!(agent.role, "Assistant mystery_agent");
        assert!(agent.backstory.contains("t_ci"));
        assert!(agent.tools.is_empty());
    }

    #[test]
    fn test_authorized_filters_by_required_pack() {
        let registry = registry_from(AGENTS_YAML);
        let allowed = vec![
            "general_assistant".to_string(),
            "banking_assistant".to_string(),
        ];

        let basic = registry.authorized(&allowed, "basic", "t_ci");
        assert_eq!(basic.len(), 1);
        assert_eq!(basic[0].0, "general_assistant");

        let advanced = registry.authorized(&allowed, "advanced", "t_ci");
        assert_eq!(advanced.len(), 2);

        // Higher tiers keep lower-tier agents
        let premium = registry.authorized(&allowed, "premium", "t_ci");
        assert_eq!(premium.len(), 2);
    }

    #[test]
    fn test_missing_files_leave_registry_empty() {
        let dir = tempfile::tempdir().unwrap();
        let registry = AgentRegistry::load(dir.path());
        assert!(registry.agent_names().is_empty());
        assert!(registry.task("anything").is_none());
    }
}
