//! Gemini vision client.
//!
//! One call per request, zero temperature, bounded output, inline base64
//! image. A missing API key fails fast with a service-unavailable signal
//! before any network traffic; the 90 second timeout and non-success
//! statuses surface as gateway signals.

use crate::config::Settings;
use crate::decode::excerpt;
use crate::error::ExtractError;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const MAX_OUTPUT_TOKENS: u32 = 8192;

/// Fixed, versioned extraction instruction sent with every statement image.
pub const EXTRACT_PROMPT: &str = r#"You are a bank statement data extraction engine. You process both SCREENSHOT images and PDF-exported statements.

Extract EVERY transaction row. Return ONLY a raw JSON object - absolutely no markdown, no fences, no commentary.

JSON schema (one object per transaction):
{
  "transactions": [
    {
      "date": "YYYY-MM-DD or null if not visible",
      "description": "<copy the ENTIRE narration line exactly character-by-character>",
      "upi_ref": "<12-15 digit numeric UPI reference number, or null>",
      "source": "<the FULL NAME of the person or merchant - see rules below>",
      "amount": 0.00,
      "type": "debit or credit",
      "balance": 0.00
    }
  ],
  "confidence": 0.95
}

=== FULL NAME EXTRACTION (most important rule) ===
UPI narrations follow the format: UPI/DR-or-CR/REFNO/NAME/BANKIFSC/VPA
The NAME segment is often abbreviated in the storage key, but the ACTUAL name of the sender/receiver
may be spelled out more completely elsewhere in that same narration or in adjacent columns.

Rules for "source" field:
1. Scan ALL slash-separated segments in the narration for human names or merchant names.
2. Pick the LONGEST and most complete name segment as the source.
3. If the name looks like a VPA suffix (e.g. "chandra@okicici", "john.doe@ybl"), extract the full part before @ as the name.
4. NEVER abbreviate: use "CHANDRA KUMAR" not "CHANDRAK", "INDSTOCKS INDIA" not "INDSTK".
5. If you see both a short code and a full name in the narration (e.g. "INDSTOCKS" and "IndiaStocks Ltd"), use the longer full form.
6. For wallet payments (PPE, PAYTM, PHONEPE): the name comes before the wallet code - use it.
7. Copy the source EXACTLY as written in the statement - no guessing, no expanding abbreviations yourself.

=== STRICT FIELD RULES ===
- description: Verbatim entire narration. NEVER truncate. Every slash. Every character.
  CORRECT: "UPI/DR/978584154770/CHANDRA KUMAR/HDFC0000240/chandrk@paytm"
  WRONG:   "UPI/DR/978584154770/CHANDRA KUMAR/HDFC"  <- truncated
- upi_ref: ONLY the numeric reference (12-15 digits). null for non-UPI rows.
- date: YYYY-MM-DD. Convert DD-MM-YY, DD/MM/YYYY, etc. null if date column is blank/missing.
- amount: Positive number from the non-zero Debit or Credit column. null if completely unreadable.
- type: "debit" = money out (UPI/DR, withdrawal). "credit" = money in (UPI/CR, deposit, salary).
- balance: Running balance after this row. null if column absent.
- SKIP: column headers, opening balance, closing balance, subtotal/summary rows.
- Include ALL individual transaction rows without exception."#;

/// Gemini REST client for vision extraction and text correction.
#[derive(Clone)]
pub struct VisionClient {
    client: reqwest::Client,
    api_base: String,
    api_key: Option<String>,
    model: String,
    timeout: Duration,
}

impl VisionClient {
    pub fn new(client: reqwest::Client, settings: &Settings) -> Self {
        Self {
            client,
            api_base: GEMINI_API_BASE.to_string(),
            api_key: settings.gemini_api_key.clone(),
            model: settings.vision_model.clone(),
            timeout: settings.vision_timeout,
        }
    }

    #[cfg(test)]
    fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    /// Send one statement image through the model, returning the raw
    /// textual completion.
    pub async fn extract_image(&self, image: &[u8], mime: &str) -> Result<String, ExtractError> {
        info!(
            "VisionClient: extracting image ({} KB, {})",
            image.len() / 1024,
            mime
        );
        let parts = vec![
            RequestPart::text(EXTRACT_PROMPT),
            RequestPart::inline_image(mime, image),
        ];
        self.generate(parts).await
    }

    /// Text-only completion, used by the refinement pass.
    pub async fn complete_text(&self, prompt: &str) -> Result<String, ExtractError> {
        self.generate(vec![RequestPart::text(prompt)]).await
    }

    async fn generate(&self, parts: Vec<RequestPart>) -> Result<String, ExtractError> {
        // Fail fast, before any network call.
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(ExtractError::MissingCredentials("GEMINI_API_KEY"))?;

        let url = format!(
            "{}/{}:generateContent?key={}",
            self.api_base, self.model, api_key
        );

        let request = GenerateRequest {
            contents: vec![RequestContent { parts }],
            generation_config: GenerationConfig {
                temperature: 0.0,
                max_output_tokens: MAX_OUTPUT_TOKENS,
            },
        };

        // One budget for the whole exchange: connect, headers, and body.
        // A trickling response body must expire, not hang.
        let exchange = async {
            let response = self
                .client
                .post(&url)
                .json(&request)
                .send()
                .await
                .map_err(map_transport)?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                error!("VisionClient: API error {}: {}", status, excerpt(&body, 300));
                return Err(ExtractError::Upstream {
                    status: status.as_u16(),
                    body: excerpt(&body, 200),
                });
            }

            response
                .json::<GenerateResponse>()
                .await
                .map_err(map_transport)
        };

        let parsed = match tokio::time::timeout(self.timeout, exchange).await {
            Ok(result) => result?,
            Err(_) => return Err(ExtractError::UpstreamTimeout),
        };

        let text = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .and_then(|p| p.text)
            .ok_or_else(|| ExtractError::BadUpstreamResponse {
                message: "no candidate text in response".to_string(),
                excerpt: String::new(),
            })?;

        debug!("VisionClient: completion length {} chars", text.len());
        Ok(text.trim().to_string())
    }
}

fn map_transport(e: reqwest::Error) -> ExtractError {
    if e.is_timeout() {
        ExtractError::UpstreamTimeout
    } else {
        ExtractError::UpstreamUnreachable(e.to_string())
    }
}

// ── Gemini generateContent request/response types ─────────────────────────

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<RequestContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct RequestContent {
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum RequestPart {
    Text {
        text: String,
    },
    InlineData {
        inline_data: InlineData,
    },
}

impl RequestPart {
    fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    fn inline_image(mime: &str, data: &[u8]) -> Self {
        Self::InlineData {
            inline_data: InlineData {
                mime_type: mime.to_string(),
                data: BASE64.encode(data),
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}
