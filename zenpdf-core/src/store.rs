use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tracing::{instrument, warn};

use crate::{DocumentId, LayoutMode, NavigationState};

pub trait StateStore: Send + Sync {
    fn load(&self, id: &DocumentId) -> Result<Option<NavigationState>>;
    fn save(&self, state: &NavigationState) -> Result<()>;
}

/// One pretty-printed JSON file per document, named after its id.
pub struct FileStateStore {
    root: PathBuf,
}

impl FileStateStore {
    pub fn new(root: PathBuf) -> Result<Self> {
        fs::create_dir_all(&root)
            .with_context(|| format!("failed to create state directory at {:?}", root))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn state_path(&self, id: &DocumentId) -> PathBuf {
        self.root.join(format!("{}.json", id))
    }
}

impl StateStore for FileStateStore {
    fn load(&self, id: &DocumentId) -> Result<Option<NavigationState>> {
        let path = self.state_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let mut file =
            File::open(&path).with_context(|| format!("failed to open state file {:?}", path))?;
        let mut buf = String::new();
        file.read_to_string(&mut buf)?;
        let state = serde_json::from_str(&buf)
            .with_context(|| format!("failed to decode state file {:?}", path))?;
        Ok(Some(state))
    }

    fn save(&self, state: &NavigationState) -> Result<()> {
        let path = self.state_path(&state.document_id());
        let tmp = path.with_extension("json.tmp");
        let payload = serde_json::to_string_pretty(state)?;
        let mut file = File::create(&tmp)
            .with_context(|| format!("failed to open temp state file {:?}", tmp))?;
        file.write_all(payload.as_bytes())?;
        file.flush()?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("failed to move state file into place at {:?}", path))?;
        Ok(())
    }
}

pub struct MemoryStateStore {
    inner: Mutex<HashMap<DocumentId, NavigationState>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl Default for MemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self, id: &DocumentId) -> Result<Option<NavigationState>> {
        Ok(self.inner.lock().get(id).cloned())
    }

    fn save(&self, state: &NavigationState) -> Result<()> {
        self.inner.lock().insert(state.document_id(), state.clone());
        Ok(())
    }
}

/// Store front end with create and lookup-or-create.
///
/// Lookup-or-create holds a lock across load and create so two windows
/// opening the same document concurrently end up with one record.
pub struct StateRepository {
    store: Arc<dyn StateStore>,
    lock: Mutex<()>,
}

impl StateRepository {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            store,
            lock: Mutex::new(()),
        }
    }

    pub fn save(&self, state: &NavigationState) -> Result<()> {
        self.store.save(state)
    }

    pub fn create(
        &self,
        id: DocumentId,
        total_pages: usize,
        layout_mode: LayoutMode,
    ) -> Result<NavigationState> {
        let state = NavigationState::new(id, total_pages, layout_mode);
        self.store.save(&state)?;
        Ok(state)
    }

    /// Returns the stored state for `id`, or a fresh one when there is none
    /// or the stored one cannot be used.
    #[instrument(skip(self))]
    pub fn lookup_or_create(
        &self,
        id: DocumentId,
        total_pages: usize,
        layout_mode: LayoutMode,
    ) -> Result<NavigationState> {
        let _guard = self.lock.lock();
        let stored = match self.store.load(&id) {
            Ok(stored) => stored,
            Err(err) => {
                warn!(?err, document = %id, "unreadable navigation state replaced");
                None
            }
        };

        if let Some(state) = stored {
            match state.validate() {
                Ok(()) if state.total_pages() == total_pages.max(1) => {
                    return Ok(state.upgrade());
                }
                Ok(()) => warn!(
                    document = %id,
                    stored_pages = state.total_pages(),
                    total_pages,
                    "page count changed, navigation state replaced"
                ),
                Err(err) => warn!(%err, "corrupt navigation state replaced"),
            }
        }

        self.create(id, total_pages, layout_mode)
    }
}
