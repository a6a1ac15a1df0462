//! Schema validation for inbound [`Transaction`] payloads (spec §3).
//!
//! This is the single source of truth for "what counts as a valid
//! transaction" — both the HTTP handler and the test suite validate
//! against it, so there is no second, drifting copy of the rules.

use rust_decimal::Decimal;
use thiserror::Error;

use super::models::{FieldIssue, Transaction};

#[derive(Debug, Error)]
pub enum TransactionValidationError {
    #[error("validation failed")]
    Invalid(Vec<FieldIssue>),
}

/// Validates a transaction against the schema in spec §3.
///
/// Collects every violation instead of failing on the first one, so
/// clients get the complete list of field issues in one round trip.
pub fn validate_transaction(tx: &Transaction) -> Result<(), TransactionValidationError> {
    let mut issues = Vec::new();

    if tx.id.trim().is_empty() {
        issues.push(FieldIssue {
            path: "id".to_string(),
            message: "must be a non-empty string".to_string(),
        });
    }

    if tx.amount <= Decimal::ZERO {
        issues.push(FieldIssue {
            path: "amount".to_string(),
            message: "must be strictly positive".to_string(),
        });
    }

    if tx.currency.chars().count() != 3 {
        issues.push(FieldIssue {
            path: "currency".to_string(),
            message: "must be exactly three characters".to_string(),
        });
    }

    if tx.description.trim().is_empty() {
        issues.push(FieldIssue {
            path: "description".to_string(),
            message: "must be non-empty".to_string(),
        });
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(TransactionValidationError::Invalid(issues))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::str::FromStr;

    fn sample() -> Transaction {
        Transaction {
            id: "t1".to_string(),
            amount: Decimal::from_str("10.50").unwrap(),
            currency: "USD".to_string(),
            description: "a widget".to_string(),
            timestamp: Utc::now(),
            metadata: None,
        }
    }

    #[test]
    fn accepts_valid_transaction() {
        assert!(validate_transaction(&sample()).is_ok());
    }

    #[test]
    fn rejects_empty_id() {
        let mut tx = sample();
        tx.id = "".to_string();
        let err = validate_transaction(&tx).unwrap_err();
        let TransactionValidationError::Invalid(issues) = err;
        assert_eq!(issues[0].path, "id");
    }

    #[test]
    fn rejects_non_positive_amount() {
        let mut tx = sample();
        tx.amount = Decimal::ZERO;
        assert!(validate_transaction(&tx).is_err());

        let mut tx = sample();
        tx.amount = Decimal::from_str("-5").unwrap();
        assert!(validate_transaction(&tx).is_err());
    }

    #[test]
    fn rejects_bad_currency_length() {
        let mut tx = sample();
        tx.currency = "US".to_string();
        assert!(validate_transaction(&tx).is_err());

        let mut tx = sample();
        tx.currency = "USDD".to_string();
        assert!(validate_transaction(&tx).is_err());
    }

    #[test]
    fn rejects_empty_description() {
        let mut tx = sample();
        tx.description = "   ".to_string();
        assert!(validate_transaction(&tx).is_err());
    }

    #[test]
    fn collects_multiple_issues() {
        let tx = Transaction {
            id: "".to_string(),
            amount: Decimal::ZERO,
            currency: "X".to_string(),
            description: "".to_string(),
            timestamp: Utc::now(),
            metadata: None,
        };
        let err = validate_transaction(&tx).unwrap_err();
        let TransactionValidationError::Invalid(issues) = err;
        assert_eq!(issues.len(), 4);
    }
}
