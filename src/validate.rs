//! Row validation and coercion for untrusted transaction objects.
//!
//! The vision model and the refinement model both emit loosely-typed JSON:
//! nulls, numbers as strings, the literal sentinel text "null". Every field
//! is coerced explicitly, and a malformed row is dropped on its own; one bad
//! row never aborts the batch.

use crate::schema::{Transaction, TxnType};
use serde_json::Value;
use tracing::warn;

/// Fallback confidence when the producer's claim is absent or non-numeric.
pub const DEFAULT_CONFIDENCE: f64 = 0.93;

/// Coerce a batch of raw rows, skipping and logging any row whose required
/// conversions fail. Output length is always <= input length.
pub fn coerce_rows(rows: &[Value]) -> Vec<Transaction> {
    let mut clean = Vec::with_capacity(rows.len());
    for row in rows {
        match coerce_row(row) {
            Some(txn) => clean.push(txn),
            None => warn!("Skipping malformed transaction row: {}", row),
        }
    }
    clean
}

/// Coerce one raw row. Returns `None` when a required conversion fails
/// (e.g. a non-numeric amount or balance).
pub fn coerce_row(row: &Value) -> Option<Transaction> {
    let amount = match row.get("amount") {
        None | Some(Value::Null) => 0.0,
        Some(v) => to_f64(v)?.abs(),
    };

    let balance = match row.get("balance") {
        None | Some(Value::Null) => None,
        Some(v) if is_null_sentinel(v) => None,
        Some(v) => Some(to_f64(v)?),
    };

    let txn_type = match string_form(row.get("type")) {
        Some(s) if s.eq_ignore_ascii_case("credit") => TxnType::Credit,
        _ => TxnType::Debit,
    };

    let date = string_form(row.get("date"))
        .filter(|s| !s.trim().eq_ignore_ascii_case("null"))
        .unwrap_or_default();

    let description = string_form(row.get("description"))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "Transaction".to_string());

    let upi_ref =
        string_form(row.get("upi_ref")).filter(|s| !s.trim().eq_ignore_ascii_case("null"));

    let source = string_form(row.get("source"))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("null"));

    Some(Transaction {
        date,
        description,
        amount,
        txn_type,
        balance,
        upi_ref,
        source,
    })
}

/// Producer-claimed confidence, defaulted and clamped. Never recomputed
/// from row-level success rate.
pub fn claimed_confidence(value: Option<&Value>) -> f64 {
    value
        .and_then(to_f64)
        .unwrap_or(DEFAULT_CONFIDENCE)
        .clamp(0.0, 1.0)
}

/// String form of a scalar JSON value; `None` for null/absent/composite.
fn string_form(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn is_null_sentinel(value: &Value) -> bool {
    matches!(value, Value::String(s) if s.trim().eq_ignore_ascii_case("null"))
}

fn to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', "").parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_one_bad_row_does_not_sink_the_batch() {
        let rows = vec![
            json!({"date": "2024-01-01", "description": "A", "amount": 10.0, "type": "debit"}),
            json!({"date": "2024-01-02", "description": "B", "amount": "not-a-number", "type": "credit"}),
            json!({"date": "2024-01-03", "description": "C", "amount": 30.0, "type": "credit"}),
        ];
        let clean = coerce_rows(&rows);
        assert_eq!(clean.len(), 2);
        assert_eq!(clean[0].description, "A");
        assert_eq!(clean[1].description, "C");
    }

    #[test]
    fn test_sentinel_null_date_becomes_empty() {
        let row = json!({"date": "null", "amount": 5.0});
        assert_eq!(coerce_row(&row).unwrap().date, "");
        let row = json!({"date": "NULL", "amount": 5.0});
        assert_eq!(coerce_row(&row).unwrap().date, "");
    }

    #[test]
    fn test_true_null_balance_is_none() {
        let row = json!({"amount": 5.0, "balance": null});
        assert_eq!(coerce_row(&row).unwrap().balance, None);
        let row = json!({"amount": 5.0, "balance": "null"});
        assert_eq!(coerce_row(&row).unwrap().balance, None);
    }

    #[test]
    fn test_missing_description_gets_placeholder() {
        let row = json!({"amount": 5.0});
        assert_eq!(coerce_row(&row).unwrap().description, "Transaction");
        let row = json!({"amount": 5.0, "description": ""});
        assert_eq!(coerce_row(&row).unwrap().description, "Transaction");
    }

    #[test]
    fn test_missing_amount_is_zero_not_error() {
        let row = json!({"description": "fee reversal"});
        assert_eq!(coerce_row(&row).unwrap().amount, 0.0);
    }

    #[test]
    fn test_amount_as_string_is_parsed() {
        let row = json!({"amount": "1,250.75"});
        assert_eq!(coerce_row(&row).unwrap().amount, 1250.75);
    }

    #[test]
    fn test_negative_amount_normalizes_to_magnitude() {
        let row = json!({"amount": -42.5, "type": "debit"});
        assert_eq!(coerce_row(&row).unwrap().amount, 42.5);
    }

    #[test]
    fn test_type_mapping_defaults_to_debit() {
        assert_eq!(
            coerce_row(&json!({"amount": 1.0, "type": "CREDIT"})).unwrap().txn_type,
            TxnType::Credit
        );
        assert_eq!(
            coerce_row(&json!({"amount": 1.0, "type": "withdrawal"})).unwrap().txn_type,
            TxnType::Debit
        );
        assert_eq!(coerce_row(&json!({"amount": 1.0})).unwrap().txn_type, TxnType::Debit);
    }

    #[test]
    fn test_source_trimmed_and_sentinel_dropped() {
        let row = json!({"amount": 1.0, "source": "  CHANDRA KUMAR  "});
        assert_eq!(coerce_row(&row).unwrap().source.as_deref(), Some("CHANDRA KUMAR"));
        let row = json!({"amount": 1.0, "source": "null"});
        assert_eq!(coerce_row(&row).unwrap().source, None);
        let row = json!({"amount": 1.0, "source": ""});
        assert_eq!(coerce_row(&row).unwrap().source, None);
    }

    #[test]
    fn test_upi_ref_number_becomes_string() {
        let row = json!({"amount": 1.0, "upi_ref": 978584154770u64});
        assert_eq!(coerce_row(&row).unwrap().upi_ref.as_deref(), Some("978584154770"));
    }

    #[test]
    fn test_confidence_default_and_clamp() {
        assert_eq!(claimed_confidence(None), DEFAULT_CONFIDENCE);
        assert_eq!(claimed_confidence(Some(&json!("high"))), DEFAULT_CONFIDENCE);
        assert_eq!(claimed_confidence(Some(&json!(0.5))), 0.5);
        assert_eq!(claimed_confidence(Some(&json!(7.0))), 1.0);
        assert_eq!(claimed_confidence(Some(&json!("0.8"))), 0.8);
    }
}
