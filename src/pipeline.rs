//! Extraction orchestrator.
//!
//! Routes a document through one of three strategy chains based on content
//! modality and scan status, then applies the best-effort refinement pass:
//!
//! ```text
//! CLASSIFY -> { IMAGE_OCR | PDF_TEXT | PDF_SCANNED_OCR } -> [LLM_REFINE] -> DONE
//! ```
//!
//! Collaborators come in through traits so every branch is testable with
//! stubs. All state is request-scoped; nothing here is shared mutably.

use crate::decode::decode_model_response;
use crate::error::ExtractError;
use crate::modality::{classify, Modality};
use crate::normalize::{normalize_text, NormalizeResult};
use crate::ocr::{OcrEngine, PageRasterizer};
use crate::pdf::{parse_pdf, PdfText};
use crate::refine::Refiner;
use crate::schema::{ExtractionMethod, PipelineResult};
use crate::validate::{claimed_confidence, coerce_rows};
use crate::vision::VisionClient;
use std::sync::Arc;
use tracing::{info, warn};

pub struct Pipeline {
    ocr: Arc<dyn OcrEngine>,
    rasterizer: Arc<dyn PageRasterizer>,
    refiner: Arc<dyn Refiner>,
    vision: VisionClient,
}

impl Pipeline {
    pub fn new(
        ocr: Arc<dyn OcrEngine>,
        rasterizer: Arc<dyn PageRasterizer>,
        refiner: Arc<dyn Refiner>,
        vision: VisionClient,
    ) -> Self {
        Self {
            ocr,
            rasterizer,
            refiner,
            vision,
        }
    }

    /// Text-based pipeline: classify by content, extract text, normalize,
    /// refine. Zero extracted transactions is a valid outcome, not an error.
    pub async fn process(&self, data: &[u8]) -> Result<PipelineResult, ExtractError> {
        match classify(data) {
            Modality::Image { .. } => {
                let raw_text = self.ocr.image_to_text(data).await?;
                let result = normalize_text(&raw_text);
                self.finish(result, raw_text, 1, ExtractionMethod::Ocr).await
            }
            Modality::Pdf => {
                let pdf = parse_pdf(data)?;
                self.process_pdf(data, pdf).await
            }
            Modality::Unsupported(label) => Err(ExtractError::UnsupportedMedia(label)),
        }
    }

    /// PDF routing: scanned pages go through rasterize + OCR, text-native
    /// pages use the embedded text layer directly.
    async fn process_pdf(&self, data: &[u8], pdf: PdfText) -> Result<PipelineResult, ExtractError> {
        let pages_processed = pdf.pages.len();

        if pdf.is_scanned {
            info!("Scanned PDF detected ({} pages), rasterizing for OCR", pages_processed);
            let images = self.rasterizer.rasterize(data).await?;
            let raw_text = self.ocr.images_to_text(&images).await?;
            let result = normalize_text(&raw_text);
            self.finish(result, raw_text, pages_processed, ExtractionMethod::Ocr)
                .await
        } else {
            info!("Text-native PDF ({} pages), using embedded text layer", pages_processed);
            let result = normalize_text(&pdf.full_text);
            self.finish(result, pdf.full_text, pages_processed, ExtractionMethod::Pdfplumber)
                .await
        }
    }

    /// Vision pipeline: one image through the multimodal model, decoded and
    /// validated row by row. Decode failures abort the request.
    pub async fn process_vision(&self, data: &[u8]) -> Result<PipelineResult, ExtractError> {
        let mime = match classify(data) {
            Modality::Image { mime } => mime,
            Modality::Pdf => {
                return Err(ExtractError::UnsupportedMedia(
                    "pdf (vision path accepts images only)".to_string(),
                ))
            }
            Modality::Unsupported(label) => return Err(ExtractError::UnsupportedMedia(label)),
        };

        let completion = self.vision.extract_image(data, mime).await?;
        let decoded = decode_model_response(&completion)?;
        let transactions = coerce_rows(&decoded.transactions);
        let confidence = claimed_confidence(decoded.confidence.as_ref());

        info!(
            "Vision extraction complete: {} transactions (confidence={})",
            transactions.len(),
            confidence
        );

        Ok(PipelineResult {
            transactions,
            confidence,
            pages_processed: 1,
            extraction_method: ExtractionMethod::GeminiVision.tag(false),
        })
    }

    /// Refinement plus result assembly. Refinement runs only when there is
    /// something to refine and raw text to reconcile against; any failure
    /// keeps the unrefined list.
    async fn finish(
        &self,
        mut result: NormalizeResult,
        raw_text: String,
        pages_processed: usize,
        method: ExtractionMethod,
    ) -> Result<PipelineResult, ExtractError> {
        let mut refined = false;

        if !result.transactions.is_empty() && !raw_text.trim().is_empty() {
            match self.refiner.refine(&raw_text, &result.transactions).await {
                Ok(corrected) if corrected != result.transactions => {
                    info!(
                        "Refinement changed the list: {} -> {} transactions",
                        result.transactions.len(),
                        corrected.len()
                    );
                    result.transactions = corrected;
                    refined = true;
                }
                Ok(_) => {}
                Err(e) => warn!("Refinement failed, keeping unrefined list: {:#}", e),
            }
        }

        if result.transactions.is_empty() {
            warn!("No transactions extracted, returning empty result");
        }

        info!(
            "Pipeline complete: {} transactions | confidence={} | method={}",
            result.transactions.len(),
            result.confidence,
            method.tag(refined)
        );

        Ok(PipelineResult {
            transactions: result.transactions,
            confidence: result.confidence,
            pages_processed,
            extraction_method: method.tag(refined),
        })
    }
}
