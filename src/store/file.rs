use std::ffi::OsString;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fd_lock::RwLock;
use tracing::debug;

use super::{ProcessStore, StoreState};
use crate::error::{Result, WorkflowError};
use crate::state_machine::{AuditEntry, DocumentRef, ProcessId, ProcessInstance};
use crate::workflow::Cardinality;

/// JSON snapshot store shared by every process that opens the same path.
///
/// Each call re-reads the file under an advisory lock on a sibling
/// `.lock` file: shared for reads, exclusive for the whole
/// read-modify-write of a mutation. The snapshot is rewritten through a
/// temporary file and a rename so a crash never leaves a torn file.
#[derive(Debug, Clone)]
pub struct FileStore {
    paths: Arc<StorePaths>,
}

#[derive(Debug)]
struct StorePaths {
    data: PathBuf,
    lock: PathBuf,
    tmp: PathBuf,
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

impl StorePaths {
    fn open_lock(&self) -> Result<RwLock<File>> {
        let file = File::options()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock)?;
        Ok(RwLock::new(file))
    }

    fn read_state(&self) -> Result<StoreState> {
        match std::fs::read_to_string(&self.data) {
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StoreState::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn snapshot(&self) -> Result<StoreState> {
        let lock = self.open_lock()?;
        let _guard = lock.read()?;
        self.read_state()
    }

    fn mutate<T>(&self, f: impl FnOnce(&mut StoreState) -> Result<T>) -> Result<T> {
        let mut lock = self.open_lock()?;
        let _guard = lock.write()?;
        let mut state = self.read_state()?;
        let out = f(&mut state)?;
        self.persist(&state)?;
        Ok(out)
    }

    fn persist(&self, state: &StoreState) -> Result<()> {
        let json = serde_json::to_string_pretty(state)?;
        std::fs::write(&self.tmp, json)?;
        std::fs::rename(&self.tmp, &self.data)?;
        debug!(path = %self.data.display(), processes = state.processes.len(), "store persisted");
        Ok(())
    }
}

impl FileStore {
    /// Open the store at `path`, starting empty if the file does not exist.
    ///
    /// The file is parsed once here so a corrupt store is reported early.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let data = path.into();
        let store = Self {
            paths: Arc::new(StorePaths {
                lock: sibling(&data, ".lock"),
                tmp: sibling(&data, ".tmp"),
                data,
            }),
        };
        store.blocking(|paths| paths.snapshot().map(drop)).await?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.paths.data
    }

    /// Run file I/O and lock waits off the async workers.
    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&StorePaths) -> Result<T> + Send + 'static,
    {
        let paths = Arc::clone(&self.paths);
        tokio::task::spawn_blocking(move || f(&paths))
            .await
            .map_err(|e| WorkflowError::Io(std::io::Error::other(e)))?
    }
}

impl ProcessStore for FileStore {
    async fn insert(&self, process: ProcessInstance, entry: AuditEntry) -> Result<ProcessInstance> {
        self.blocking(move |paths| paths.mutate(|state| Ok(state.insert(process, entry))))
            .await
    }

    async fn load(&self, id: ProcessId) -> Result<Option<ProcessInstance>> {
        self.blocking(move |paths| Ok(paths.snapshot()?.load(id))).await
    }

    async fn audit_log(&self, id: ProcessId) -> Result<Vec<AuditEntry>> {
        self.blocking(move |paths| paths.snapshot()?.audit_log(id))
            .await
    }

    async fn commit(&self, process: ProcessInstance, entry: AuditEntry) -> Result<ProcessInstance> {
        self.blocking(move |paths| paths.mutate(|state| state.commit(process, entry)))
            .await
    }

    async fn link_document(
        &self,
        id: ProcessId,
        stage: &str,
        cardinality: Cardinality,
        doc: DocumentRef,
    ) -> Result<ProcessInstance> {
        let stage = stage.to_string();
        self.blocking(move |paths| {
            paths.mutate(|state| state.link_document(id, &stage, cardinality, doc))
        })
        .await
    }

    async fn delete(&self, id: ProcessId) -> Result<()> {
        self.blocking(move |paths| paths.mutate(|state| state.delete(id)))
            .await
    }
}
