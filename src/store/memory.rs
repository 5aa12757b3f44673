use tokio::sync::Mutex;

use super::{ProcessStore, StoreState};
use crate::error::Result;
use crate::state_machine::{AuditEntry, DocumentRef, ProcessId, ProcessInstance};
use crate::workflow::Cardinality;

/// Volatile store, used in tests and for one-shot embedding.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProcessStore for MemoryStore {
    async fn insert(&self, process: ProcessInstance, entry: AuditEntry) -> Result<ProcessInstance> {
        Ok(self.state.lock().await.insert(process, entry))
    }

    async fn load(&self, id: ProcessId) -> Result<Option<ProcessInstance>> {
        Ok(self.state.lock().await.load(id))
    }

    async fn audit_log(&self, id: ProcessId) -> Result<Vec<AuditEntry>> {
        self.state.lock().await.audit_log(id)
    }

    async fn commit(&self, process: ProcessInstance, entry: AuditEntry) -> Result<ProcessInstance> {
        self.state.lock().await.commit(process, entry)
    }

    async fn link_document(
        &self,
        id: ProcessId,
        stage: &str,
        cardinality: Cardinality,
        doc: DocumentRef,
    ) -> Result<ProcessInstance> {
        self.state
            .lock()
            .await
            .link_document(id, stage, cardinality, doc)
    }

    async fn delete(&self, id: ProcessId) -> Result<()> {
        self.state.lock().await.delete(id)
    }
}
