//! HTTP OCR sidecar backend.
//!
//! Talks to a local sidecar over multipart: `POST /ocr` recognizes one
//! image, `POST /rasterize` renders a PDF to per-page PNGs. Base URL comes
//! from settings (`OCR_SIDECAR_URL`).

use super::{page_boundary, OcrEngine, PageRasterizer};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Deserialize)]
struct OcrSidecarResponse {
    text: String,
}

#[derive(Debug, Deserialize)]
struct RasterizeResponse {
    /// Base64-encoded PNG per page, in document order.
    pages: Vec<String>,
}

#[derive(Clone)]
pub struct SidecarClient {
    base_url: String,
    client: reqwest::Client,
}

impl SidecarClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client,
        }
    }

    async fn post_multipart<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        field: &str,
        filename: &str,
        mime: &str,
        data: Vec<u8>,
    ) -> anyhow::Result<T> {
        let part = Part::bytes(data).file_name(filename.to_string()).mime_str(mime)?;
        let form = Form::new().part(field.to_string(), part);

        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("OCR sidecar error ({}): {}", status, error_text);
        }

        Ok(response.json().await?)
    }
}

#[async_trait::async_trait]
impl OcrEngine for SidecarClient {
    async fn image_to_text(&self, image: &[u8]) -> anyhow::Result<String> {
        info!("SidecarClient: OCR on single image ({} bytes)", image.len());
        let resp: OcrSidecarResponse = self
            .post_multipart("/ocr", "file", "page.png", "image/png", image.to_vec())
            .await?;
        Ok(resp.text)
    }

    async fn images_to_text(&self, images: &[Vec<u8>]) -> anyhow::Result<String> {
        info!("SidecarClient: OCR on {} page images", images.len());
        let mut out = String::new();
        for (i, image) in images.iter().enumerate() {
            let resp: OcrSidecarResponse = self
                .post_multipart("/ocr", "file", "page.png", "image/png", image.clone())
                .await?;
            if i > 0 {
                out.push('\n');
            }
            out.push_str(&page_boundary(i + 1));
            out.push('\n');
            out.push_str(&resp.text);
        }
        Ok(out)
    }
}

#[async_trait::async_trait]
impl PageRasterizer for SidecarClient {
    async fn rasterize(&self, pdf: &[u8]) -> anyhow::Result<Vec<Vec<u8>>> {
        info!("SidecarClient: rasterizing PDF ({} bytes)", pdf.len());
        let resp: RasterizeResponse = self
            .post_multipart(
                "/rasterize",
                "file",
                "document.pdf",
                "application/pdf",
                pdf.to_vec(),
            )
            .await?;

        resp.pages
            .iter()
            .map(|b64| {
                BASE64
                    .decode(b64)
                    .map_err(|e| anyhow::anyhow!("Invalid base64 page from sidecar: {}", e))
            })
            .collect()
    }
}
