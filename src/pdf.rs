//! PDF page extraction via lopdf.
//!
//! Produces per-page text, the whole-document text, and a scanned-PDF
//! signal. A scanned PDF has no usable embedded text layer, so its pages
//! must go through rasterization + OCR instead.

use anyhow::{Context, Result};
use lopdf::Document;
use std::io::Cursor;
use tracing::debug;

/// Average non-whitespace chars per page below which a PDF is treated as
/// scanned. Real text-native statements run into the thousands per page.
const SCANNED_TEXT_THRESHOLD: usize = 64;

#[derive(Debug, Clone)]
pub struct PdfPage {
    pub number: u32,
    pub text: String,
}

/// Extraction output for one PDF document.
#[derive(Debug, Clone)]
pub struct PdfText {
    pub pages: Vec<PdfPage>,
    pub full_text: String,
    pub is_scanned: bool,
}

/// Extract per-page text from a PDF and decide whether it is scanned.
pub fn parse_pdf(data: &[u8]) -> Result<PdfText> {
    let doc = Document::load_from(Cursor::new(data)).context("Failed to load PDF")?;

    let mut pages = Vec::new();
    let mut full_text = String::new();
    let mut text_chars = 0usize;

    for (page_num, _) in doc.get_pages() {
        let text = doc.extract_text(&[page_num]).unwrap_or_default();
        text_chars += non_whitespace_chars(&text);
        full_text.push_str(&text);
        full_text.push('\n');
        pages.push(PdfPage {
            number: page_num,
            text,
        });
    }

    if pages.is_empty() {
        anyhow::bail!("PDF has no pages");
    }

    let is_scanned = text_chars / pages.len() < SCANNED_TEXT_THRESHOLD;
    debug!(
        "Parsed PDF: {} pages, {} text chars, scanned={}",
        pages.len(),
        text_chars,
        is_scanned
    );

    Ok(PdfText {
        pages,
        full_text,
        is_scanned,
    })
}

fn non_whitespace_chars(text: &str) -> usize {
    text.chars().filter(|c| !c.is_whitespace()).count()
}
