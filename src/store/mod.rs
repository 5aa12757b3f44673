//! Persistence seam for process instances and their audit trails.
//!
//! Every mutating call is atomic with respect to a single process: commits
//! compare the caller's [`ProcessInstance::version`] against the stored one
//! and fail with [`WorkflowError::Conflict`] when another writer got there
//! first.

mod file;
mod memory;

use std::collections::BTreeMap;
use std::future::Future;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WorkflowError};
use crate::state_machine::{AuditEntry, DocumentRef, ProcessId, ProcessInstance};
use crate::workflow::Cardinality;

pub use file::FileStore;
pub use memory::MemoryStore;

pub trait ProcessStore: Send + Sync {
    /// Persist a freshly started process together with its start entry.
    fn insert(
        &self,
        process: ProcessInstance,
        entry: AuditEntry,
    ) -> impl Future<Output = Result<ProcessInstance>> + Send;

    fn load(&self, id: ProcessId) -> impl Future<Output = Result<Option<ProcessInstance>>> + Send;

    fn audit_log(&self, id: ProcessId) -> impl Future<Output = Result<Vec<AuditEntry>>> + Send;

    /// Store the new position and append its audit entry in one step.
    ///
    /// `process.version` must equal the stored version. The returned
    /// instance carries the bumped version.
    fn commit(
        &self,
        process: ProcessInstance,
        entry: AuditEntry,
    ) -> impl Future<Output = Result<ProcessInstance>> + Send;

    /// Attach `doc` to `stage`. Completed processes accept no new links.
    fn link_document(
        &self,
        id: ProcessId,
        stage: &str,
        cardinality: Cardinality,
        doc: DocumentRef,
    ) -> impl Future<Output = Result<ProcessInstance>> + Send;

    /// Remove a process and its whole audit trail.
    fn delete(&self, id: ProcessId) -> impl Future<Output = Result<()>> + Send;
}

/// Store contents shared by the in-memory and file-backed stores.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct StoreState {
    processes: BTreeMap<ProcessId, ProcessInstance>,
    audit: BTreeMap<ProcessId, Vec<AuditEntry>>,
}

impl StoreState {
    fn insert(&mut self, process: ProcessInstance, entry: AuditEntry) -> ProcessInstance {
        self.audit.insert(process.id, vec![entry]);
        self.processes.insert(process.id, process.clone());
        process
    }

    fn load(&self, id: ProcessId) -> Option<ProcessInstance> {
        self.processes.get(&id).cloned()
    }

    fn audit_log(&self, id: ProcessId) -> Result<Vec<AuditEntry>> {
        self.audit
            .get(&id)
            .cloned()
            .ok_or(WorkflowError::ProcessNotFound(id))
    }

    fn commit(&mut self, mut process: ProcessInstance, entry: AuditEntry) -> Result<ProcessInstance> {
        let id = process.id;
        let stored = self
            .processes
            .get_mut(&id)
            .ok_or(WorkflowError::ProcessNotFound(id))?;
        if stored.version != process.version {
            return Err(WorkflowError::Conflict(id));
        }
        process.version += 1;
        process.updated_at = Utc::now();
        *stored = process.clone();
        self.audit.entry(id).or_default().push(entry);
        Ok(process)
    }

    fn link_document(
        &mut self,
        id: ProcessId,
        stage: &str,
        cardinality: Cardinality,
        doc: DocumentRef,
    ) -> Result<ProcessInstance> {
        let stored = self
            .processes
            .get_mut(&id)
            .ok_or(WorkflowError::ProcessNotFound(id))?;
        if stored.is_completed {
            return Err(WorkflowError::AlreadyCompleted);
        }
        stored.attach(stage, cardinality, doc)?;
        stored.version += 1;
        Ok(stored.clone())
    }

    fn delete(&mut self, id: ProcessId) -> Result<()> {
        self.processes
            .remove(&id)
            .ok_or(WorkflowError::ProcessNotFound(id))?;
        self.audit.remove(&id);
        Ok(())
    }
}
