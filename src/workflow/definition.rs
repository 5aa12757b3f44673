use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::policy::FieldRule;
use crate::error::{Result, WorkflowError};
use crate::state_machine::DocumentKind;

const WIRE_WORKFLOW: &str = include_str!("wire.toml");

fn default_true() -> bool {
    true
}

fn default_reject_message() -> String {
    "A rejection reason is required.".to_string()
}

/// How many documents a stage may link.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    #[default]
    One,
    Many,
}

/// Where a rejection sends the process, and what it demands of the actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectRule {
    pub target_step: u32,
    #[serde(default = "default_true")]
    pub require_comment: bool,
    /// Advisory text returned when the comment is missing.
    #[serde(default = "default_reject_message")]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepConfig {
    #[serde(rename = "step")]
    pub step_number: u32,
    #[serde(rename = "role")]
    pub required_role: String,
    #[serde(rename = "action")]
    pub action_description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_reject: Option<RejectRule>,
    /// Field rules keyed by role.
    #[serde(default, rename = "fields", skip_serializing_if = "BTreeMap::is_empty")]
    pub field_policy: BTreeMap<String, FieldRule>,
}

impl StepConfig {
    pub fn field_rule(&self, role: &str) -> Option<&FieldRule> {
        self.field_policy.get(role)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Document kind produced by the document collaborator for this stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<DocumentKind>,
    #[serde(default)]
    pub cardinality: Cardinality,
    /// Only this role may create the stage's document, whatever the step says.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator_role: Option<String>,
    pub steps: Vec<StepConfig>,
}

impl StageConfig {
    pub fn step_count(&self) -> u32 {
        self.steps.len() as u32
    }
}

#[derive(Deserialize)]
struct DefinitionFile {
    stages: Vec<StageConfig>,
}

/// The fixed stage/step graph every process instance walks through.
///
/// Stage order is progression order. Constructed once and validated up
/// front, so lookups on a known position never fail at runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowDefinition {
    stages: Vec<StageConfig>,
    by_name: HashMap<String, usize>,
}

impl WorkflowDefinition {
    pub fn new(stages: Vec<StageConfig>) -> Result<Self> {
        let mut by_name = HashMap::with_capacity(stages.len());
        for (idx, stage) in stages.iter().enumerate() {
            if by_name.insert(stage.name.clone(), idx).is_some() {
                return Err(WorkflowError::Config(format!(
                    "duplicate stage name '{}'",
                    stage.name
                )));
            }
        }
        let definition = Self { stages, by_name };
        definition.validate()?;
        Ok(definition)
    }

    /// The wire-production workflow shipped with the crate.
    pub fn wire() -> Result<Self> {
        Self::from_toml_str(WIRE_WORKFLOW)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let file: DefinitionFile =
            toml::from_str(contents).map_err(|e| WorkflowError::Config(e.to_string()))?;
        Self::new(file.stages)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    fn validate(&self) -> Result<()> {
        if self.stages.is_empty() {
            return Err(WorkflowError::Config("workflow has no stages".into()));
        }

        let mut kinds = HashSet::new();
        for stage in &self.stages {
            let name = &stage.name;
            if stage.steps.is_empty() {
                return Err(WorkflowError::Config(format!("stage '{name}' has no steps")));
            }
            if let Some(kind) = stage.document
                && !kinds.insert(kind)
            {
                return Err(WorkflowError::Config(format!(
                    "document kind {kind} is linked to more than one stage"
                )));
            }

            for (idx, step) in stage.steps.iter().enumerate() {
                let expected = idx as u32 + 1;
                if step.step_number != expected {
                    return Err(WorkflowError::Config(format!(
                        "stage '{name}': expected step {expected}, found {}",
                        step.step_number
                    )));
                }
                if let Some(rule) = &step.on_reject
                    && (rule.target_step == 0 || rule.target_step >= step.step_number)
                {
                    return Err(WorkflowError::Config(format!(
                        "stage '{name}' step {expected}: reject target {} must be in 1..{expected}",
                        rule.target_step
                    )));
                }
                if let Some(role) = step.field_policy.keys().find(|r| **r != step.required_role) {
                    return Err(WorkflowError::Config(format!(
                        "stage '{name}' step {expected}: field rule for '{role}' but step requires '{}'",
                        step.required_role
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn stages(&self) -> &[StageConfig] {
        &self.stages
    }

    pub fn stages_in_order(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn first_stage(&self) -> &StageConfig {
        // Validation guarantees at least one stage.
        &self.stages[0]
    }

    pub fn stage(&self, name: &str) -> Result<&StageConfig> {
        self.by_name
            .get(name)
            .map(|&idx| &self.stages[idx])
            .ok_or_else(|| WorkflowError::StageNotFound(name.to_string()))
    }

    pub fn contains_stage(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn step_config(&self, stage: &str, step: u32) -> Result<&StepConfig> {
        self.stage(stage)?
            .steps
            .iter()
            .find(|s| s.step_number == step)
            .ok_or_else(|| WorkflowError::StepNotFound {
                stage: stage.to_string(),
                step,
            })
    }

    pub fn is_last_step(&self, stage: &str, step: u32) -> Result<bool> {
        let config = self.stage(stage)?;
        if step == 0 || step > config.step_count() {
            return Err(WorkflowError::StepNotFound {
                stage: stage.to_string(),
                step,
            });
        }
        Ok(step == config.step_count())
    }

    pub fn next_stage(&self, stage: &str) -> Result<Option<&str>> {
        let idx = *self
            .by_name
            .get(stage)
            .ok_or_else(|| WorkflowError::StageNotFound(stage.to_string()))?;
        Ok(self.stages.get(idx + 1).map(|s| s.name.as_str()))
    }

    pub fn stage_for_document(&self, kind: DocumentKind) -> Option<&StageConfig> {
        self.stages.iter().find(|s| s.document == Some(kind))
    }
}
