use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Kind of regulatory document a workflow produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
pub enum DocumentType {
  /// Investigator Brochure
  Ib,
  /// Clinical Study Protocol
  Protocol,
  /// Informed Consent Form
  Icf,
  /// Clinical Study Report
  Csr,
  /// Statistical Analysis Plan
  Sap,
}

impl DocumentType {
  pub const ALL: [DocumentType; 5] = [
    DocumentType::Ib,
    DocumentType::Protocol,
    DocumentType::Icf,
    DocumentType::Csr,
    DocumentType::Sap,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      DocumentType::Ib => "ib",
      DocumentType::Protocol => "protocol",
      DocumentType::Icf => "icf",
      DocumentType::Csr => "csr",
      DocumentType::Sap => "sap",
    }
  }

  /// Name of the workflow used when a caller does not pick one,
  /// e.g. `ib-generation`.
  pub fn default_workflow_name(&self) -> String {
    format!("{}-generation", self.as_str())
  }
}

impl fmt::Display for DocumentType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for DocumentType {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    DocumentType::ALL
      .into_iter()
      .find(|d| d.as_str() == s)
      .ok_or_else(|| format!("unknown document type: {s}"))
  }
}

/// Pipeline phase an agent works in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
  Enrichment,
  Composition,
  Writing,
  Validation,
  Assembly,
  Export,
}

/// Agents known to the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
pub enum AgentName {
  /// Regulatory data enrichment
  Regdata,
  Composer,
  Writer,
  Validator,
  Assembler,
  Export,
  ComposerProtocol,
  WriterProtocol,
  ValidatorProtocol,
  AssemblerProtocol,
  ComposerIcf,
  WriterIcf,
  ValidatorIcf,
  AssemblerIcf,
}

impl AgentName {
  pub const ALL: [AgentName; 14] = [
    AgentName::Regdata,
    AgentName::Composer,
    AgentName::Writer,
    AgentName::Validator,
    AgentName::Assembler,
    AgentName::Export,
    AgentName::ComposerProtocol,
    AgentName::WriterProtocol,
    AgentName::ValidatorProtocol,
    AgentName::AssemblerProtocol,
    AgentName::ComposerIcf,
    AgentName::WriterIcf,
    AgentName::ValidatorIcf,
    AgentName::AssemblerIcf,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      AgentName::Regdata => "regdata",
      AgentName::Composer => "composer",
      AgentName::Writer => "writer",
      AgentName::Validator => "validator",
      AgentName::Assembler => "assembler",
      AgentName::Export => "export",
      AgentName::ComposerProtocol => "composer_protocol",
      AgentName::WriterProtocol => "writer_protocol",
      AgentName::ValidatorProtocol => "validator_protocol",
      AgentName::AssemblerProtocol => "assembler_protocol",
      AgentName::ComposerIcf => "composer_icf",
      AgentName::WriterIcf => "writer_icf",
      AgentName::ValidatorIcf => "validator_icf",
      AgentName::AssemblerIcf => "assembler_icf",
    }
  }

  /// The pipeline stage this agent belongs to. Document-specific variants
  /// share the stage of their generic counterpart.
  pub fn stage(&self) -> Stage {
    match self {
      AgentName::Regdata => Stage::Enrichment,
      AgentName::Composer | AgentName::ComposerProtocol | AgentName::ComposerIcf => {
        Stage::Composition
      }
      AgentName::Writer | AgentName::WriterProtocol | AgentName::WriterIcf => Stage::Writing,
      AgentName::Validator | AgentName::ValidatorProtocol | AgentName::ValidatorIcf => {
        Stage::Validation
      }
      AgentName::Assembler | AgentName::AssemblerProtocol | AgentName::AssemblerIcf => {
        Stage::Assembly
      }
      AgentName::Export => Stage::Export,
    }
  }
}

impl fmt::Display for AgentName {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for AgentName {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    AgentName::ALL
      .into_iter()
      .find(|a| a.as_str() == s)
      .ok_or_else(|| format!("unknown agent: {s}"))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_document_type_round_trips_through_str() {
    for doc in DocumentType::ALL {
      assert_eq!(doc.as_str().parse::<DocumentType>().unwrap(), doc);
    }
    assert!("memo".parse::<DocumentType>().is_err());
  }

  #[test]
  fn test_default_workflow_name() {
    assert_eq!(DocumentType::Ib.default_workflow_name(), "ib-generation");
    assert_eq!(DocumentType::Csr.default_workflow_name(), "csr-generation");
  }

  #[test]
  fn test_agent_serde_matches_as_str() {
    for agent in AgentName::ALL {
      let json = serde_json::to_value(agent).unwrap();
      assert_eq!(json, serde_json::Value::String(agent.as_str().to_string()));
    }
  }

  #[test]
  fn test_document_specific_agents_share_stage() {
    assert_eq!(AgentName::WriterIcf.stage(), Stage::Writing);
    assert_eq!(AgentName::ValidatorProtocol.stage(), Stage::Validation);
    assert_eq!(AgentName::Regdata.stage(), Stage::Enrichment);
    assert_eq!(AgentName::Export.stage(), Stage::Export);
  }
}
