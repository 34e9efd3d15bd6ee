//! CLI configuration file.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use docflow_config::AgentName;
use docflow_engine::EngineConfig;
use docflow_orchestrator::{AgentRegistry, CommandAgent, DriverConfig};
use serde::Deserialize;

/// Contents of `<data-dir>/config.json`. Every section is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CliConfig {
  pub engine: EngineConfig,
  pub driver: DriverConfig,
  /// Command bound to each agent.
  pub agents: HashMap<AgentName, CommandAgent>,
}

impl CliConfig {
  /// Load the config file, falling back to defaults when it does not exist.
  pub fn load(path: &Path) -> Result<Self> {
    if !path.exists() {
      return Ok(Self::default());
    }
    let content = std::fs::read_to_string(path)
      .with_context(|| format!("failed to read config file: {}", path.display()))?;
    serde_json::from_str(&content)
      .with_context(|| format!("failed to parse config file: {}", path.display()))
  }

  pub fn agent_registry(&self) -> AgentRegistry {
    self
      .agents
      .iter()
      .fold(AgentRegistry::new(), |registry, (agent, command)| {
        registry.with(*agent, Arc::new(command.clone()))
      })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_missing_file_is_default() {
    let dir = tempfile::tempdir().unwrap();
    let config = CliConfig::load(&dir.path().join("config.json")).unwrap();
    assert_eq!(config.engine, EngineConfig::default());
    assert!(config.agents.is_empty());
  }

  #[test]
  fn test_load_agents_and_overrides() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(
      &path,
      r#"{
        "engine": { "max_retries": 5 },
        "driver": { "max_parallel_steps": 2 },
        "agents": {
          "regdata": { "program": "python3", "args": ["agents/regdata.py"] },
          "writer": { "program": "./writer" }
        }
      }"#,
    )
    .unwrap();

    let config = CliConfig::load(&path).unwrap();
    assert_eq!(config.engine.max_retries, 5);
    assert_eq!(config.engine.retry_delay_ms, 1000);
    assert_eq!(config.driver.max_parallel_steps, 2);
    assert_eq!(config.agents[&AgentName::Regdata].args, vec!["agents/regdata.py"]);
    assert!(config.agents[&AgentName::Writer].args.is_empty());

    let registry = config.agent_registry();
    assert_eq!(registry.len(), 2);
    assert!(registry.get(AgentName::Composer).is_none());
  }

  #[test]
  fn test_unknown_agent_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{ "agents": { "summarizer": { "program": "x" } } }"#).unwrap();
    assert!(CliConfig::load(&path).is_err());
  }
}
