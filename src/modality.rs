//! Document modality classification from raw bytes.
//!
//! Uploaded filenames and MIME headers are adversarial-unreliable, so the
//! modality is always decided by content sniffing: PDF magic first, then
//! the image crate's format detection.

use image::ImageFormat;

/// What kind of document the raw bytes are.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Modality {
    /// Raster image, with the MIME type detected from magic bytes.
    Image { mime: &'static str },
    Pdf,
    /// Neither image nor PDF; carries a best-effort label for diagnostics.
    Unsupported(String),
}

/// Classify raw bytes into a modality by content only.
pub fn classify(data: &[u8]) -> Modality {
    if data.starts_with(b"%PDF-") {
        return Modality::Pdf;
    }

    if let Ok(format) = image::guess_format(data) {
        if let Some(mime) = image_mime(format) {
            return Modality::Image { mime };
        }
    }

    Modality::Unsupported(sniff_label(data))
}

fn image_mime(format: ImageFormat) -> Option<&'static str> {
    match format {
        ImageFormat::Png => Some("image/png"),
        ImageFormat::Jpeg => Some("image/jpeg"),
        ImageFormat::Gif => Some("image/gif"),
        ImageFormat::Bmp => Some("image/bmp"),
        ImageFormat::Tiff => Some("image/tiff"),
        ImageFormat::WebP => Some("image/webp"),
        _ => None,
    }
}

/// Crude label for unsupported content, used only in error details.
fn sniff_label(data: &[u8]) -> String {
    if data.is_empty() {
        "empty".to_string()
    } else if data.starts_with(b"PK") {
        "zip-archive".to_string()
    } else if std::str::from_utf8(data).is_ok() {
        "plain-text".to_string()
    } else {
        "unknown-binary".to_string()
    }
}
