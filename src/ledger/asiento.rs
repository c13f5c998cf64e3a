//! Asiento construction

use bigdecimal::BigDecimal;
use chrono::NaiveDate;

use crate::types::*;

/// Builder for asientos whose rows all share one posting date
#[derive(Debug)]
pub struct AsientoBuilder {
    date: NaiveDate,
    asiento: Asiento,
}

impl AsientoBuilder {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            asiento: Asiento::default(),
        }
    }

    /// Add a debit row
    pub fn debit(self, account_code: &str, concept: &str, amount: BigDecimal) -> Self {
        self.entry(EntryType::Debit, account_code, concept, amount)
    }

    /// Add a credit row
    pub fn credit(self, account_code: &str, concept: &str, amount: BigDecimal) -> Self {
        self.entry(EntryType::Credit, account_code, concept, amount)
    }

    /// Add a row on the given side
    pub fn entry(
        mut self,
        side: EntryType,
        account_code: &str,
        concept: &str,
        amount: BigDecimal,
    ) -> Self {
        self.asiento.add_entry(LedgerEntry::new(
            self.date,
            account_code.to_string(),
            concept.to_string(),
            side,
            amount,
        ));
        self
    }

    /// Build the asiento, checking the double-entry structure
    pub fn build(self) -> LedgerResult<Asiento> {
        self.asiento.validate()?;
        Ok(self.asiento)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_builder_creates_balanced_asiento() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let asiento = AsientoBuilder::new(date)
            .debit("629", "Hosting", BigDecimal::from_str("10.00").unwrap())
            .debit("472", "IVA Soportado", BigDecimal::from_str("2.10").unwrap())
            .credit("572", "Pago banco", BigDecimal::from_str("12.10").unwrap())
            .build()
            .unwrap();

        assert_eq!(asiento.len(), 3);
        assert!(asiento.entries.iter().all(|e| e.date == date));
        assert_eq!(asiento.total_debits(), asiento.total_credits());
    }

    #[test]
    fn test_builder_rejects_unbalanced_rows() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let result = AsientoBuilder::new(date)
            .debit("629", "Hosting", BigDecimal::from(10))
            .credit("572", "Pago banco", BigDecimal::from(11))
            .build();

        assert!(matches!(result, Err(LedgerError::Unbalanced { .. })));
    }
}
