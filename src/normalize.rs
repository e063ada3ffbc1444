//! Deterministic text normalizer.
//!
//! Pure functions, no network. Turns raw statement text (from the PDF text
//! layer or OCR) into transactions using compiled regex patterns: a leading
//! date anchors a row, the narration is kept verbatim, and amount / DR-CR
//! marker / balance are read from the tail of the line.

use crate::schema::{Transaction, TxnType};
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

static ROW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)^\s*
          (?P<date>\d{4}-\d{2}-\d{2}|\d{1,2}[/-]\d{1,2}[/-]\d{2,4})\s+
          (?P<desc>.*?)\s+
          (?P<amount>\d{1,3}(?:,\d{3})*(?:\.\d{1,2})?|\d+(?:\.\d{1,2})?)\s*
          (?P<marker>(?i:CR|DR|credit|debit))?\s*
          (?P<balance>\d{1,3}(?:,\d{3})*(?:\.\d{1,2})?|\d+(?:\.\d{1,2})?)?\s*$",
    )
    .unwrap()
});

/// Header, summary, and carry-forward lines that are not transactions.
static NON_TXN_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(opening\s+balance|closing\s+balance|total|subtotal|brought\s+forward|carried\s+forward|b/f|c/f|page\s+\d+|statement\s+of\s+account)\b",
    )
    .unwrap()
});

static CREDIT_HINT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)UPI/CR\b|\b(credit|deposit|salary|refund)\b").unwrap());

#[derive(Debug, Clone)]
pub struct NormalizeResult {
    pub transactions: Vec<Transaction>,
    pub confidence: f64,
}

/// Normalize raw statement text into transactions plus a confidence score.
pub fn normalize_text(text: &str) -> NormalizeResult {
    let mut transactions = Vec::new();
    let mut with_balance = 0usize;
    let mut with_marker = 0usize;
    let mut with_iso_date = 0usize;

    for line in text.lines() {
        if NON_TXN_LINE.is_match(line) {
            continue;
        }
        let Some(caps) = ROW.captures(line) else {
            continue;
        };

        let date = to_iso_date(&caps["date"]).unwrap_or_default();
        if !date.is_empty() {
            with_iso_date += 1;
        }

        let amount = match parse_decimal(&caps["amount"]) {
            Some(a) => a,
            None => continue,
        };

        let balance = caps.name("balance").and_then(|m| parse_decimal(m.as_str()));
        if balance.is_some() {
            with_balance += 1;
        }

        let marker = caps.name("marker").map(|m| m.as_str());
        if marker.is_some() {
            with_marker += 1;
        }

        let description = caps["desc"].to_string();
        let txn_type = direction(marker, &description);

        transactions.push(Transaction {
            date,
            description,
            amount,
            txn_type,
            balance,
            upi_ref: None,
            source: None,
        });
    }

    let confidence = score(&transactions, with_balance, with_marker, with_iso_date);
    debug!(
        "Normalized {} transactions (confidence={:.2})",
        transactions.len(),
        confidence
    );

    NormalizeResult {
        transactions,
        confidence,
    }
}

/// 0.75 baseline plus 0.05 per structural signal, capped at 0.95.
fn score(rows: &[Transaction], with_balance: usize, with_marker: usize, with_iso: usize) -> f64 {
    if rows.is_empty() {
        return 0.0;
    }
    let half = rows.len().div_ceil(2);
    let mut confidence: f64 = 0.75;
    if with_balance >= half {
        confidence += 0.05;
    }
    if with_marker >= half {
        confidence += 0.05;
    }
    if with_iso == rows.len() {
        confidence += 0.05;
    }
    if rows.len() >= 5 {
        confidence += 0.05;
    }
    confidence.min(0.95)
}

fn direction(marker: Option<&str>, description: &str) -> TxnType {
    if let Some(m) = marker {
        let m = m.to_ascii_lowercase();
        if m == "cr" || m == "credit" {
            return TxnType::Credit;
        }
        return TxnType::Debit;
    }
    if CREDIT_HINT.is_match(description) {
        TxnType::Credit
    } else {
        TxnType::Debit
    }
}

fn parse_decimal(raw: &str) -> Option<f64> {
    raw.replace(',', "").parse().ok()
}

/// Re-emit a recognized date as YYYY-MM-DD. Day-first for slash/dash
/// forms (DD/MM/YYYY, DD-MM-YY); two-digit years land in the 2000s.
/// Returns `None` rather than inventing a date for implausible fields.
fn to_iso_date(raw: &str) -> Option<String> {
    if let Some((y, rest)) = raw.split_once('-') {
        if y.len() == 4 {
            let (m, d) = rest.split_once('-')?;
            let (year, month, day): (u32, u32, u32) =
                (y.parse().ok()?, m.parse().ok()?, d.parse().ok()?);
            return plausible(year, month, day);
        }
    }

    let sep = if raw.contains('/') { '/' } else { '-' };
    let mut parts = raw.split(sep);
    let day: u32 = parts.next()?.parse().ok()?;
    let month: u32 = parts.next()?.parse().ok()?;
    let year_raw = parts.next()?;
    let mut year: u32 = year_raw.parse().ok()?;
    if year_raw.len() == 2 {
        year += 2000;
    }
    plausible(year, month, day)
}

fn plausible(year: u32, month: u32, day: u32) -> Option<String> {
    if (1900..=2100).contains(&year) && (1..=12).contains(&month) && (1..=31).contains(&day) {
        Some(format!("{:04}-{:02}-{:02}", year, month, day))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATEMENT: &str = "\
HDFC BANK Statement of Account
Opening Balance 15,000.00
01/02/2024 UPI/DR/978584154770/CHANDRA KUMAR/HDFC0000240/chandrk@paytm 450.00 DR 14,550.00
02/02/2024 UPI/CR/978600112233/ACME SALARY 52,000.00 CR 66,550.00
2024-02-03 ATM WDL MG ROAD 2,000.00 DR 64,550.00
Closing Balance 64,550.00
";

    #[test]
    fn test_rows_extracted_in_source_order() {
        let result = normalize_text(STATEMENT);
        assert_eq!(result.transactions.len(), 3);
        assert_eq!(result.transactions[0].date, "2024-02-01");
        assert_eq!(
            result.transactions[0].description,
            "UPI/DR/978584154770/CHANDRA KUMAR/HDFC0000240/chandrk@paytm"
        );
        assert_eq!(result.transactions[0].amount, 450.0);
        assert_eq!(result.transactions[0].txn_type, TxnType::Debit);
        assert_eq!(result.transactions[0].balance, Some(14550.0));
        assert_eq!(result.transactions[1].txn_type, TxnType::Credit);
        assert_eq!(result.transactions[2].date, "2024-02-03");
    }

    #[test]
    fn test_summary_lines_skipped() {
        let result = normalize_text("Opening Balance 5,000.00\nClosing Balance 5,000.00\n");
        assert!(result.transactions.is_empty());
    }

    #[test]
    fn test_empty_text_zero_confidence() {
        let result = normalize_text("");
        assert!(result.transactions.is_empty());
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn test_confidence_within_bounds() {
        let result = normalize_text(STATEMENT);
        assert!(result.confidence >= 0.75 && result.confidence <= 0.95);
    }

    #[test]
    fn test_two_digit_year_lands_in_2000s() {
        let result = normalize_text("05-03-24 NEFT TRANSFER 1,200.00 CR\n");
        assert_eq!(result.transactions[0].date, "2024-03-05");
        assert_eq!(result.transactions[0].txn_type, TxnType::Credit);
        assert_eq!(result.transactions[0].balance, None);
    }

    #[test]
    fn test_implausible_date_not_invented() {
        assert_eq!(to_iso_date("45/99/2024"), None);
        let result = normalize_text("45/99/2024 GHOST ROW 10.00 DR\n");
        assert_eq!(result.transactions.len(), 1);
        assert_eq!(result.transactions[0].date, "");
    }

    #[test]
    fn test_credit_inferred_from_narration_without_marker() {
        let result = normalize_text("04/02/2024 UPI/CR/123456789012/REFUND STORE 99.00\n");
        assert_eq!(result.transactions[0].txn_type, TxnType::Credit);
    }

    #[test]
    fn test_lines_without_amounts_ignored() {
        let result = normalize_text("01/02/2024 narration only no figures\n");
        assert!(result.transactions.is_empty());
    }
}
