//! Rendering side of the viewer: the page surface the sync coordinator
//! drives, and the pdfium-backed document provider.

#[cfg(feature = "pdf")]
mod pdfium;
mod surface;

#[cfg(feature = "pdf")]
pub use pdfium::{PdfiumProvider, PDFIUM_LIBRARY_ENV};
pub use surface::{PageSurface, Viewport};
