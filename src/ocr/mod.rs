//! OCR and rasterization collaborator seams.
//!
//! The pipeline only depends on these traits; the HTTP sidecar backend
//! lives in [`sidecar`] and tests substitute stubs.

pub mod sidecar;

pub use sidecar::SidecarClient;

/// Marker inserted between recognized pages of a multi-page document.
pub fn page_boundary(page_num: usize) -> String {
    format!("--- Page {} ---", page_num)
}

/// Converts image pixels to text.
#[async_trait::async_trait]
pub trait OcrEngine: Send + Sync {
    /// Recognize a single image.
    async fn image_to_text(&self, image: &[u8]) -> anyhow::Result<String>;

    /// Recognize a batch of page images, preserving page boundaries in the
    /// concatenated output.
    async fn images_to_text(&self, images: &[Vec<u8>]) -> anyhow::Result<String>;
}

/// Renders PDF pages to images, one per page. Used only for scanned PDFs.
#[async_trait::async_trait]
pub trait PageRasterizer: Send + Sync {
    async fn rasterize(&self, pdf: &[u8]) -> anyhow::Result<Vec<Vec<u8>>>;
}
