use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::error::{Result, WorkflowError};
use crate::permission::{Actor, PermissionGate};
use crate::state_machine::{
    Action, AuditEntry, DocumentRef, LinkState, Position, ProcessId, ProcessInstance,
    ProcessView, Replayed, TransitionEngine,
};
use crate::store::ProcessStore;
use crate::workflow::WorkflowDefinition;

const EVENT_CAPACITY: usize = 64;

/// Notifications published alongside audit entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessEvent {
    Started {
        process_id: ProcessId,
        actor_id: String,
    },
    /// Fired exactly once per successful rejection.
    Rejected {
        process_id: ProcessId,
        actor_id: String,
        from: Position,
        to: Position,
        comment: Option<String>,
    },
    Completed {
        process_id: ProcessId,
        actor_id: String,
    },
}

/// Drives process instances through the workflow definition.
///
/// Combines [`PermissionGate`], [`TransitionEngine`] and a [`ProcessStore`].
/// Each action is a load/check/transition/commit sequence guarded by the
/// store's optimistic version check; a lost race is retried against fresh
/// state up to `max_conflict_retries` times.
pub struct ManufacturingWorkflowService<S> {
    definition: Arc<WorkflowDefinition>,
    store: S,
    events: broadcast::Sender<ProcessEvent>,
    max_conflict_retries: u32,
}

impl<S: ProcessStore> ManufacturingWorkflowService<S> {
    pub fn new(definition: Arc<WorkflowDefinition>, store: S) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            definition,
            store,
            events,
            max_conflict_retries: 3,
        }
    }

    pub fn with_conflict_retries(mut self, retries: u32) -> Self {
        self.max_conflict_retries = retries;
        self
    }

    pub fn definition(&self) -> &WorkflowDefinition {
        &self.definition
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProcessEvent> {
        self.events.subscribe()
    }

    /// Create a process at step 1 of the first stage and log its start.
    pub async fn start_process(&self, actor: &Actor) -> Result<ProcessView> {
        let process = ProcessInstance::new(&self.definition, actor.id.clone());
        let entry = AuditEntry::start(&process, &actor.id);
        let process = self.store.insert(process, entry).await?;

        info!(process_id = %process.id, stage = %process.stage, actor = %actor.id, "process started");
        self.publish(ProcessEvent::Started {
            process_id: process.id,
            actor_id: actor.id.clone(),
        });
        self.view(process).await
    }

    pub async fn get_process(&self, id: ProcessId) -> Result<ProcessView> {
        let process = self.load(id).await?;
        self.view(process).await
    }

    /// Approve or reject the current step of a process.
    ///
    /// Fails with `AlreadyCompleted` on finished processes, `Forbidden` when
    /// the actor lacks the step's role, and propagates transition errors
    /// unchanged. Nothing is written unless every check passes.
    pub async fn approve_or_reject_step(
        &self,
        id: ProcessId,
        actor: &Actor,
        action: Action,
        comment: Option<&str>,
    ) -> Result<ProcessView> {
        let mut attempt = 0;
        loop {
            let process = self.load(id).await?;
            if process.is_completed {
                return Err(WorkflowError::AlreadyCompleted);
            }

            let from = process.position();
            let step = self
                .definition
                .step_config(&from.stage, from.step)
                .map_err(WorkflowError::stored_position)?;
            PermissionGate::admit(actor, step)?;

            let transition = TransitionEngine::next(&self.definition, &from, action, comment)?;
            let to = transition.position().clone();

            let mut next = process;
            next.stage = to.stage.clone();
            next.current_step = to.step;
            next.is_completed = transition.is_complete();

            let entry = AuditEntry::transition(id, &actor.id, action.into(), &from, &to, comment);
            match self.store.commit(next, entry).await {
                Ok(committed) => {
                    info!(
                        process_id = %id,
                        actor = %actor.id,
                        %action,
                        from = %from,
                        to = %to,
                        completed = committed.is_completed,
                        "transition committed"
                    );
                    self.announce(&committed, actor, action, from, to, comment);
                    return self.view(committed).await;
                }
                Err(WorkflowError::Conflict(_)) if attempt < self.max_conflict_retries => {
                    attempt += 1;
                    warn!(process_id = %id, attempt, "concurrent update, retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Hard-delete a process and its audit trail.
    ///
    /// Callers are responsible for restricting this to privileged actors.
    pub async fn delete_process(&self, id: ProcessId) -> Result<()> {
        self.store.delete(id).await?;
        info!(process_id = %id, "process deleted");
        Ok(())
    }

    /// Linkage state for a stage: presence for single-document stages,
    /// a count for many-document ones.
    pub async fn linked_documents(&self, id: ProcessId, stage: &str) -> Result<LinkState> {
        let cardinality = self.definition.stage(stage)?.cardinality;
        let process = self.load(id).await?;
        Ok(process.link_state(stage, cardinality))
    }

    pub async fn has_linked_document(&self, id: ProcessId, stage: &str) -> Result<bool> {
        Ok(self.linked_documents(id, stage).await?.is_present())
    }

    pub async fn authorize_document_creation(
        &self,
        id: ProcessId,
        actor: &Actor,
        stage: &str,
    ) -> Result<()> {
        let process = self.load(id).await?;
        PermissionGate::admit_document_creation(&self.definition, &process, actor, stage)
    }

    pub async fn authorize_document_update(
        &self,
        id: ProcessId,
        actor: &Actor,
        stage: &str,
        patch: &Map<String, Value>,
    ) -> Result<()> {
        let process = self.load(id).await?;
        PermissionGate::admit_document_update(&self.definition, &process, actor, stage, patch)
    }

    /// Attach a document the collaborator has just created.
    ///
    /// Performs no actor check. Callers acting for a user must pass
    /// [`Self::authorize_document_creation`] first.
    pub async fn link_document(
        &self,
        id: ProcessId,
        stage: &str,
        doc: DocumentRef,
    ) -> Result<ProcessView> {
        let config = self.definition.stage(stage)?;
        if let Some(expected) = config.document
            && expected != doc.kind
        {
            return Err(WorkflowError::DocumentKindMismatch {
                stage: stage.to_string(),
                expected,
                found: doc.kind,
            });
        }
        let cardinality = config.cardinality;
        let process = self
            .store
            .link_document(id, stage, cardinality, doc)
            .await?;
        debug!(process_id = %id, %stage, kind = %doc.kind, doc_id = doc.id, "document linked");
        self.view(process).await
    }

    /// Replay the audit trail and check it lands on the stored position.
    pub async fn verify_process(&self, id: ProcessId) -> Result<Replayed> {
        let process = self.load(id).await?;
        let trail = self.store.audit_log(id).await?;
        let replayed = TransitionEngine::replay(&self.definition, &trail)?;
        if replayed.position != process.position() || replayed.completed != process.is_completed {
            return Err(WorkflowError::Config(format!(
                "process {id} is stored at {} but its audit trail yields {}",
                process.position(),
                replayed.position
            )));
        }
        Ok(replayed)
    }

    async fn load(&self, id: ProcessId) -> Result<ProcessInstance> {
        self.store
            .load(id)
            .await?
            .ok_or(WorkflowError::ProcessNotFound(id))
    }

    async fn view(&self, process: ProcessInstance) -> Result<ProcessView> {
        let trail = self.store.audit_log(process.id).await?;
        Ok(ProcessView::new(process, trail))
    }

    fn announce(
        &self,
        process: &ProcessInstance,
        actor: &Actor,
        action: Action,
        from: Position,
        to: Position,
        comment: Option<&str>,
    ) {
        if action == Action::Reject {
            self.publish(ProcessEvent::Rejected {
                process_id: process.id,
                actor_id: actor.id.clone(),
                from,
                to,
                comment: comment.map(str::to_string),
            });
        } else if process.is_completed {
            info!(process_id = %process.id, "process completed");
            self.publish(ProcessEvent::Completed {
                process_id: process.id,
                actor_id: actor.id.clone(),
            });
        }
    }

    fn publish(&self, event: ProcessEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }
}
