use std::convert::TryFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use pdfium_render::prelude::*;
use tracing::{debug, instrument, warn};
use zenpdf_core::{
    document_id_for_bytes, document_id_for_path, DocumentBackend, DocumentInfo, DocumentMetadata,
    DocumentProvider, PageSize, RenderImage, RenderRequest,
};

/// Overrides the pdfium library location at runtime.
pub const PDFIUM_LIBRARY_ENV: &str = "ZENPDF_PDFIUM_LIBRARY_PATH";

pub struct PdfiumProvider {
    pdfium: Arc<Pdfium>,
}

impl PdfiumProvider {
    pub fn new() -> Result<Self> {
        let pdfium = match bind_pdfium_from_env() {
            Some(pdfium) => pdfium,
            None => bind_pdfium_default()?,
        };
        Ok(Self {
            pdfium: Arc::new(pdfium),
        })
    }
}

#[async_trait]
impl DocumentProvider for PdfiumProvider {
    async fn open(&self, path: &Path) -> Result<Arc<dyn DocumentBackend>> {
        let absolute = path
            .canonicalize()
            .with_context(|| format!("failed to resolve path for {:?}", path))?;
        let source = Source::File(absolute);
        let (info, page_sizes) = inspect(&self.pdfium, &source)?;
        Ok(Arc::new(PdfiumDocument::new(
            Arc::clone(&self.pdfium),
            source,
            info,
            page_sizes,
        )))
    }

    async fn open_bytes(&self, bytes: Vec<u8>) -> Result<Arc<dyn DocumentBackend>> {
        let source = Source::Bytes(bytes);
        let (info, page_sizes) = inspect(&self.pdfium, &source)?;
        Ok(Arc::new(PdfiumDocument::new(
            Arc::clone(&self.pdfium),
            source,
            info,
            page_sizes,
        )))
    }
}

enum Source {
    File(PathBuf),
    Bytes(Vec<u8>),
}

impl Source {
    fn load<'a>(&'a self, pdfium: &'a Pdfium) -> Result<PdfDocument<'a>> {
        match self {
            Source::File(path) => pdfium
                .load_pdf_from_file(path, None)
                .with_context(|| format!("failed to open {:?}", path)),
            Source::Bytes(bytes) => pdfium
                .load_pdf_from_byte_slice(bytes, None)
                .context("failed to open document from memory"),
        }
    }
}

struct PdfiumDocument {
    pdfium: Arc<Pdfium>,
    source: Source,
    info: DocumentInfo,
    page_sizes: Vec<PageSize>,
    cache: Mutex<Option<RenderCacheEntry>>,
}

struct RenderCacheEntry {
    page_index: usize,
    scale: f32,
    image: RenderImage,
}

impl PdfiumDocument {
    fn new(pdfium: Arc<Pdfium>, source: Source, info: DocumentInfo, page_sizes: Vec<PageSize>) -> Self {
        Self {
            pdfium,
            source,
            info,
            page_sizes,
            cache: Mutex::new(None),
        }
    }

    fn render_internal(&self, request: &RenderRequest) -> Result<RenderImage> {
        let document = self.source.load(&self.pdfium)?;
        let page_index: PdfPageIndex = request
            .page_index
            .try_into()
            .map_err(|_| anyhow!("page {} is out of supported range", request.page_index))?;
        let page = document
            .pages()
            .get(page_index)
            .with_context(|| format!("page {} out of range", request.page_index))?;

        let config = PdfRenderConfig::new().scale_page_by_factor(request.scale.max(0.05));
        let bitmap = page
            .render_with_config(&config)
            .with_context(|| format!("failed to render page {}", request.page_index))?;
        let image = bitmap.as_image().to_rgba8();

        Ok(RenderImage {
            width: image.width(),
            height: image.height(),
            pixels: image.into_raw(),
        })
    }
}

impl DocumentBackend for PdfiumDocument {
    fn info(&self) -> &DocumentInfo {
        &self.info
    }

    fn page_size(&self, page_index: usize) -> Option<PageSize> {
        self.page_sizes.get(page_index).copied()
    }

    #[instrument(skip(self))]
    fn render_page(&self, request: RenderRequest) -> Result<RenderImage> {
        {
            let cache = self.cache.lock();
            if let Some(entry) = cache.as_ref() {
                if entry.page_index == request.page_index
                    && (entry.scale - request.scale).abs() < f32::EPSILON
                {
                    return Ok(entry.image.clone());
                }
            }
        }

        let image = self.render_internal(&request)?;

        let mut cache = self.cache.lock();
        *cache = Some(RenderCacheEntry {
            page_index: request.page_index,
            scale: request.scale,
            image: image.clone(),
        });

        Ok(image)
    }
}

fn inspect(pdfium: &Pdfium, source: &Source) -> Result<(DocumentInfo, Vec<PageSize>)> {
    let document = source.load(pdfium)?;
    let page_sizes: Vec<PageSize> = document
        .pages()
        .iter()
        .map(|page| PageSize::new(page.width().value, page.height().value))
        .collect();
    let page_count = usize::try_from(document.pages().len()).unwrap_or_default();
    if page_count == 0 {
        warn!("document has no pages");
    }

    let metadata = document.metadata();
    let title = metadata
        .get(PdfDocumentMetadataTagType::Title)
        .map(|t| t.value().to_owned());
    let author = metadata
        .get(PdfDocumentMetadataTagType::Author)
        .map(|t| t.value().to_owned());

    let (id, path) = match source {
        Source::File(path) => (document_id_for_path(path), Some(path.clone())),
        Source::Bytes(bytes) => (document_id_for_bytes(bytes), None),
    };
    debug!(%id, page_count, "document inspected");

    let info = DocumentInfo {
        id,
        path,
        page_count,
        metadata: DocumentMetadata { title, author },
    };
    Ok((info, page_sizes))
}

fn bind_pdfium_from_env() -> Option<Pdfium> {
    match std::env::var(PDFIUM_LIBRARY_ENV) {
        Ok(path) if !path.is_empty() => match Pdfium::bind_to_library(&path) {
            Ok(bindings) => Some(Pdfium::new(bindings)),
            Err(err) => {
                warn!("failed to load Pdfium from {} ({}): {}", path, PDFIUM_LIBRARY_ENV, err);
                None
            }
        },
        _ => None,
    }
}

fn bind_pdfium_default() -> Result<Pdfium> {
    let mut errors = Vec::new();

    let cwd_path = Pdfium::pdfium_platform_library_name_at_path("./");

    match Pdfium::bind_to_library(&cwd_path) {
        Ok(bindings) => return Ok(Pdfium::new(bindings)),
        Err(err) => {
            errors.push(format!("{}: {}", cwd_path.display(), err));
        }
    }

    match Pdfium::bind_to_system_library() {
        Ok(bindings) => Ok(Pdfium::new(bindings)),
        Err(err) => {
            errors.push(format!("system: {err}"));
            Err(anyhow!(
                "failed to bind to a pdfium library; install it or set {} ({})",
                PDFIUM_LIBRARY_ENV,
                errors.join(", ")
            ))
        }
    }
}
