//! Validation utilities

use bigdecimal::BigDecimal;

use crate::amount;
use crate::traits::*;
use crate::types::*;

/// Longest concept Contasol accepts without truncation on import
pub const MAX_CONCEPT_LEN: usize = 500;

/// Validate that an amount is at least one cent once rounded
pub fn validate_positive_amount(amount: &BigDecimal) -> LedgerResult<()> {
    amount::checked_amount(amount).map(|_| ())
}

/// Validate a PGC account code: digits, optionally split by dots ("472", "4751.01")
pub fn validate_account_code(account_code: &str) -> LedgerResult<()> {
    if account_code.trim().is_empty() {
        return Err(LedgerError::Validation(
            "Account code cannot be empty".to_string(),
        ));
    }

    if account_code.len() > 12 {
        return Err(LedgerError::Validation(
            "Account code cannot exceed 12 characters".to_string(),
        ));
    }

    let valid = account_code
        .split('.')
        .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()));
    if !valid {
        return Err(LedgerError::Validation(format!(
            "Account code '{account_code}' can only contain digits and dots"
        )));
    }

    Ok(())
}

/// Validate that a row concept is valid
pub fn validate_concept(concept: &str) -> LedgerResult<()> {
    if concept.trim().is_empty() {
        return Err(LedgerError::Validation(
            "Concept cannot be empty".to_string(),
        ));
    }

    if concept.chars().count() > MAX_CONCEPT_LEN {
        return Err(LedgerError::Validation(format!(
            "Concept cannot exceed {MAX_CONCEPT_LEN} characters"
        )));
    }

    Ok(())
}

/// Stricter validator also checking account codes, concepts and dates
pub struct EnhancedAsientoValidator;

impl AsientoValidator for EnhancedAsientoValidator {
    fn validate_asiento(&self, asiento: &Asiento) -> LedgerResult<()> {
        // Basic validation
        asiento.validate()?;

        for entry in &asiento.entries {
            validate_account_code(&entry.account_code)?;
            validate_concept(&entry.concept)?;
        }

        // All rows of an asiento share the posting date
        if let Some(first) = asiento.entries.first() {
            if asiento.entries.iter().any(|e| e.date != first.date) {
                return Err(LedgerError::Validation(
                    "All rows of an asiento must share the same date".to_string(),
                ));
            }
        }

        Ok(())
    }
}
