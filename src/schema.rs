//! Response schema: transactions and per-document pipeline results.

use serde::{Deserialize, Serialize};

/// Direction of a money movement. Sign lives here, not on the amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxnType {
    Debit,
    Credit,
}

/// One financial movement extracted from a statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// ISO calendar date, or empty string when the source date is unreadable.
    pub date: String,
    /// Verbatim narration text, never truncated.
    pub description: String,
    /// Non-negative magnitude; direction is carried by `txn_type`.
    pub amount: f64,
    #[serde(rename = "type")]
    pub txn_type: TxnType,
    /// Running balance after this row, if the source has a balance column.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance: Option<f64>,
    /// UPI reference number (vision path only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upi_ref: Option<String>,
    /// Counterparty name (vision path only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Strategy chain that produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionMethod {
    Ocr,
    Pdfplumber,
    GeminiVision,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ocr => "ocr",
            Self::Pdfplumber => "pdfplumber",
            Self::GeminiVision => "gemini-vision",
        }
    }

    /// Method tag as reported to the caller; refinement appends `+llm`.
    pub fn tag(&self, refined: bool) -> String {
        if refined {
            format!("{}+llm", self.as_str())
        } else {
            self.as_str().to_string()
        }
    }
}

/// One document's outcome, created fresh per request and never mutated
/// after being returned.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub transactions: Vec<Transaction>,
    pub confidence: f64,
    pub pages_processed: usize,
    pub extraction_method: String,
}
