use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::workflow::WorkflowDefinition;

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
  One(Box<WorkflowDefinition>),
  Many(Vec<WorkflowDefinition>),
}

/// Parse a JSON document holding either a single definition or an array.
pub fn parse_definitions(json: &str) -> Result<Vec<WorkflowDefinition>, ConfigError> {
  let parsed: OneOrMany = serde_json::from_str(json)?;
  Ok(match parsed {
    OneOrMany::One(def) => vec![*def],
    OneOrMany::Many(defs) => defs,
  })
}

/// Read and parse a definition file.
pub fn load_definitions(path: &Path) -> Result<Vec<WorkflowDefinition>, ConfigError> {
  let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
    path: path.to_path_buf(),
    source,
  })?;
  parse_definitions(&content)
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  const SINGLE: &str = r#"{
    "name": "ib-generation",
    "version": "1",
    "document_type": "ib",
    "steps": [{ "name": "enrich", "agent": "regdata" }]
  }"#;

  #[test]
  fn test_parse_single_definition() {
    let defs = parse_definitions(SINGLE).unwrap();
    assert_eq!(defs.len(), 1);
    assert_eq!(defs[0].name, "ib-generation");
  }

  #[test]
  fn test_parse_array_of_definitions() {
    let json = format!("[{SINGLE}, {}]", SINGLE.replace("\"1\"", "\"2\""));
    let defs = parse_definitions(&json).unwrap();
    assert_eq!(defs.len(), 2);
    assert_eq!(defs[1].version, "2");
  }

  #[test]
  fn test_unknown_agent_rejected() {
    let json = SINGLE.replace("regdata", "summarizer");
    assert!(matches!(
      parse_definitions(&json),
      Err(ConfigError::Parse(_))
    ));
  }

  #[test]
  fn test_load_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(SINGLE.as_bytes()).unwrap();

    let defs = load_definitions(file.path()).unwrap();
    assert_eq!(defs[0].steps[0].name, "enrich");
  }

  #[test]
  fn test_missing_file() {
    let err = load_definitions(Path::new("/nonexistent/defs.json")).unwrap_err();
    assert!(matches!(err, ConfigError::Read { .. }));
  }

  #[test]
  fn test_bundled_definitions_parse() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../definitions/default.json");
    let defs = load_definitions(&path).unwrap();
    assert_eq!(defs.len(), 3);
    for def in &defs {
      assert_eq!(def.name, def.document_type.default_workflow_name());
      assert!(def.is_active);
    }
  }
}
