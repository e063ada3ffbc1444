//! Best-effort LLM refinement pass.
//!
//! Reconciles the regex-derived transaction list against the raw source
//! text using a correction model with broader context. The orchestrator
//! treats any failure here as "keep the original list"; nothing in this
//! module is allowed to fail a request.

use crate::decode::decode_model_response;
use crate::schema::Transaction;
use crate::validate::coerce_rows;
use crate::vision::VisionClient;
use tracing::debug;

const MAX_RAW_CHARS: usize = 150_000;

const REFINE_PROMPT: &str = r#"You are a bank statement reconciliation engine.

Below is the RAW TEXT of a statement and a DRAFT list of transactions
extracted from it by deterministic pattern matching. Correct the draft:
fix misread dates, merged or split rows, wrong amounts, wrong debit/credit
direction. Keep every description verbatim from the raw text. Do not add
transactions that are not in the raw text. Do not drop real transactions.

Return ONLY a raw JSON object, no markdown, no commentary:
{"transactions": [{"date": "YYYY-MM-DD or null", "description": "...", "amount": 0.00, "type": "debit or credit", "balance": 0.00}], "confidence": 0.95}"#;

/// Correction collaborator. Semantically idempotent: re-applying to its own
/// output should not change it.
#[async_trait::async_trait]
pub trait Refiner: Send + Sync {
    async fn refine(
        &self,
        raw_text: &str,
        transactions: &[Transaction],
    ) -> anyhow::Result<Vec<Transaction>>;
}

/// Refiner backed by the Gemini text endpoint.
pub struct LlmRefiner {
    vision: VisionClient,
}

impl LlmRefiner {
    pub fn new(vision: VisionClient) -> Self {
        Self { vision }
    }
}

#[async_trait::async_trait]
impl Refiner for LlmRefiner {
    async fn refine(
        &self,
        raw_text: &str,
        transactions: &[Transaction],
    ) -> anyhow::Result<Vec<Transaction>> {
        let draft = serde_json::to_string(transactions)?;
        let prompt = format!(
            "{}\n\n--- RAW TEXT START ---\n{}\n--- RAW TEXT END ---\n\n--- DRAFT TRANSACTIONS ---\n{}",
            REFINE_PROMPT,
            truncate_for_context(raw_text, MAX_RAW_CHARS),
            draft
        );

        let completion = self.vision.complete_text(&prompt).await?;
        let decoded = decode_model_response(&completion)?;
        let refined = coerce_rows(&decoded.transactions);

        debug!(
            "Refinement returned {} transactions (draft had {})",
            refined.len(),
            transactions.len()
        );
        Ok(refined)
    }
}

fn truncate_for_context(text: &str, max_chars: usize) -> &str {
    if text.len() <= max_chars {
        text
    } else {
        let mut end = max_chars;
        while !text.is_char_boundary(end) && end > 0 {
            end -= 1;
        }
        &text[..end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let text = "ab£cd";
        let cut = truncate_for_context(text, 3);
        assert!(cut.len() <= 3);
        assert!(text.starts_with(cut));
    }

    #[test]
    fn test_truncate_noop_for_short_text() {
        assert_eq!(truncate_for_context("short", 100), "short");
    }
}
