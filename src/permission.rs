//! Authorization checks for workflow actions and document mutations.
//!
//! [`PermissionGate`] is pure: it looks at an [`Actor`], the workflow
//! definition and a process snapshot, and either admits or refuses.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, WorkflowError};
use crate::state_machine::ProcessInstance;
use crate::workflow::{Cardinality, StageConfig, StepConfig, WorkflowDefinition};

/// Someone acting on a process: an id, the roles (groups) they hold, and
/// whether they carry the override capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    #[serde(default)]
    pub roles: BTreeSet<String>,
    #[serde(default)]
    pub is_superuser: bool,
}

impl Actor {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            roles: BTreeSet::new(),
            is_superuser: false,
        }
    }

    pub fn superuser(id: impl Into<String>) -> Self {
        Self {
            is_superuser: true,
            ..Self::new(id)
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.insert(role.into());
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

pub struct PermissionGate;

impl PermissionGate {
    /// Role admission: the actor holds the step's required role, or overrides.
    pub fn admit(actor: &Actor, step: &StepConfig) -> Result<()> {
        if actor.is_superuser || actor.has_role(&step.required_role) {
            Ok(())
        } else {
            Err(WorkflowError::Forbidden {
                required_role: step.required_role.clone(),
            })
        }
    }

    /// Field-level policy for a document patch at `step`.
    ///
    /// Assumes [`PermissionGate::admit`] already passed. The rule consulted
    /// is the one registered for the step's required role; override actors
    /// and steps without a rule are unrestricted.
    pub fn check_fields(actor: &Actor, step: &StepConfig, patch: &Map<String, Value>) -> Result<()> {
        if actor.is_superuser {
            return Ok(());
        }
        match step.field_rule(&step.required_role) {
            Some(rule) => rule.check(patch),
            None => Ok(()),
        }
    }

    /// May `actor` create the linked document for `stage` right now?
    ///
    /// Checked in order: the process is still open, the stage's blanket
    /// creator role, the process is in that stage, the slot is free (never
    /// enforced for many-document stages), and role admission for the
    /// current step.
    pub fn admit_document_creation(
        definition: &WorkflowDefinition,
        process: &ProcessInstance,
        actor: &Actor,
        stage: &str,
    ) -> Result<()> {
        let target = definition.stage(stage)?;
        if process.is_completed {
            return Err(WorkflowError::AlreadyCompleted);
        }
        Self::admit_creator(actor, target)?;
        Self::require_current_stage(process, stage)?;

        if target.cardinality == Cardinality::One
            && process.link_state(stage, target.cardinality).is_present()
        {
            return Err(WorkflowError::DocumentAlreadyLinked(stage.to_string()));
        }

        let step = definition
            .step_config(&process.stage, process.current_step)
            .map_err(WorkflowError::stored_position)?;
        Self::admit(actor, step)
    }

    /// May `actor` apply `patch` to the document linked to `stage`?
    ///
    /// Completed processes only accept override actors. Otherwise the
    /// process must be in `stage`, the actor must pass role admission for
    /// the current step, and the patch must satisfy the step's field rule.
    pub fn admit_document_update(
        definition: &WorkflowDefinition,
        process: &ProcessInstance,
        actor: &Actor,
        stage: &str,
        patch: &Map<String, Value>,
    ) -> Result<()> {
        definition.stage(stage)?;
        if process.is_completed {
            return if actor.is_superuser {
                Ok(())
            } else {
                Err(WorkflowError::AlreadyCompleted)
            };
        }
        if actor.is_superuser {
            return Ok(());
        }
        Self::require_current_stage(process, stage)?;

        let step = definition
            .step_config(&process.stage, process.current_step)
            .map_err(WorkflowError::stored_position)?;
        Self::admit(actor, step)?;
        Self::check_fields(actor, step, patch)
    }

    fn admit_creator(actor: &Actor, stage: &StageConfig) -> Result<()> {
        match &stage.creator_role {
            Some(role) if !actor.is_superuser && !actor.has_role(role) => {
                Err(WorkflowError::Forbidden {
                    required_role: role.clone(),
                })
            }
            _ => Ok(()),
        }
    }

    fn require_current_stage(process: &ProcessInstance, stage: &str) -> Result<()> {
        if process.stage == stage {
            Ok(())
        } else {
            Err(WorkflowError::WrongStage {
                current: process.stage.clone(),
                requested: stage.to_string(),
            })
        }
    }
}
