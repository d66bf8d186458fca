use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod config;
pub mod dialog;
pub mod overlay;
pub mod scale;
pub mod session;
pub mod state;
pub mod store;
pub mod surface;
pub mod sync;

#[cfg(test)]
mod test_support;

pub use config::ViewerConfig;
pub use dialog::{DialogOutcome, GoToPageDialog};
pub use overlay::{OverlayPhase, OverlayTiming, PageOverlay};
pub use scale::ScaleConversion;
pub use session::{Command, DocumentWindow, Session, SessionEvent, WindowId};
pub use state::{LayoutMode, NavigationState, ParseLayoutModeError, StateError};
pub use store::{FileStateStore, MemoryStateStore, StateRepository, StateStore};
pub use surface::{NotificationHub, RenderingSurface, Subscription, SubscriptionId, SurfaceEvent};
pub use sync::{SyncDirection, SyncOutcome, SyncPhase, ViewSyncCoordinator};

pub type DocumentId = Uuid;

static DOCUMENT_NAMESPACE: Lazy<Uuid> = Lazy::new(|| {
    Uuid::parse_str("3f0c9a52-6d1e-5b8a-9e47-1c2d8b6f0a13").expect("valid namespace UUID")
});

static CONTENT_NAMESPACE: Lazy<Uuid> = Lazy::new(|| {
    Uuid::parse_str("a81d4e07-2b9c-5f36-8c15-7e90d3b2c4f8").expect("valid namespace UUID")
});

pub fn document_id_for_path(path: &Path) -> DocumentId {
    let resolved = path
        .canonicalize()
        .or_else(|_| {
            if path.is_absolute() {
                Ok(path.to_path_buf())
            } else {
                std::env::current_dir().map(|cwd| cwd.join(path))
            }
        })
        .unwrap_or_else(|_| path.to_path_buf());
    let rendered = resolved.to_string_lossy();
    Uuid::new_v5(&*DOCUMENT_NAMESPACE, rendered.as_bytes())
}

/// Identity for documents without a backing file (e.g. read from stdin).
pub fn document_id_for_bytes(bytes: &[u8]) -> DocumentId {
    Uuid::new_v5(&*CONTENT_NAMESPACE, bytes)
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentInfo {
    pub id: DocumentId,
    /// `None` when the document was not read from a file.
    pub path: Option<PathBuf>,
    pub page_count: usize,
    pub metadata: DocumentMetadata,
}

impl DocumentInfo {
    pub fn display_name(&self) -> String {
        if let Some(title) = self.metadata.title.as_deref().filter(|t| !t.trim().is_empty()) {
            return title.to_owned();
        }
        self.path
            .as_deref()
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "untitled".to_owned())
    }
}

/// Page size in PDF points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

impl PageSize {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RenderRequest {
    pub page_index: usize,
    pub scale: f32,
}

#[derive(Debug, Clone)]
pub struct RenderImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

pub trait DocumentBackend: Send + Sync {
    fn info(&self) -> &DocumentInfo;
    fn page_size(&self, page_index: usize) -> Option<PageSize>;
    fn render_page(&self, request: RenderRequest) -> Result<RenderImage>;
}

#[async_trait::async_trait]
pub trait DocumentProvider: Send + Sync {
    async fn open(&self, path: &Path) -> Result<Arc<dyn DocumentBackend>>;
    async fn open_bytes(&self, bytes: Vec<u8>) -> Result<Arc<dyn DocumentBackend>>;
}
