//! IRPF withholding (retención) on professional services and rents

use bigdecimal::BigDecimal;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::amount::round_half_up;
use crate::types::{LedgerError, LedgerResult, OperationKind};

/// Withholding computed on the taxable base of an invoice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Withholding {
    /// Base the retention applies to
    pub base_amount: BigDecimal,
    /// Rate as a fraction (0.15 = 15%)
    pub rate: BigDecimal,
    /// Amount withheld, rounded half-up to cents
    pub amount: BigDecimal,
}

impl Withholding {
    /// Calculate the retention on a base amount
    pub fn calculate(base_amount: &BigDecimal, rate: &BigDecimal) -> LedgerResult<Self> {
        if *rate < BigDecimal::from(0) || *rate >= BigDecimal::from(1) {
            return Err(LedgerError::InvalidTaxRate(format!(
                "IRPF rate must be within [0, 1), got {rate}"
            )));
        }

        Ok(Self {
            base_amount: base_amount.clone(),
            rate: rate.clone(),
            amount: round_half_up(&(base_amount * rate)),
        })
    }

    /// Read the withholding rate from a treatment label such as "IRPF (15%)",
    /// "Retención Alquiler (19%)", "15" or "0.15"
    pub fn parse_rate(label: &str) -> Option<BigDecimal> {
        let labelled = Regex::new(r"(?i)(?:irpf|retenci[oó]n)[^\d]*(\d{1,2}(?:[.,]\d{1,2})?)\s*%?").ok()?;
        let percent = Regex::new(r"(\d{1,2}(?:[.,]\d{1,2})?)\s*%").ok()?;
        if let Some(caps) = labelled.captures(label).or_else(|| percent.captures(label)) {
            let value = BigDecimal::from_str(&caps[1].replace(',', ".")).ok()?;
            return Some(value / BigDecimal::from(100));
        }

        // Bare number: a fraction below 1, a percentage otherwise
        let value = BigDecimal::from_str(&label.trim().replace(',', ".")).ok()?;
        if value < BigDecimal::from(1) {
            Some(value)
        } else {
            Some(value / BigDecimal::from(100))
        }
    }
}

/// What the withheld amount is for; rents and professional fees are
/// declared on different forms and kept on separate subaccounts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WithholdingKind {
    #[default]
    Professional,
    Rent,
}

impl WithholdingKind {
    /// Rent when the label mentions "alquiler" or "arrendamiento"
    pub fn from_label(label: &str) -> Self {
        let lowered = label.to_lowercase();
        if lowered.contains("alquiler") || lowered.contains("arrendamiento") {
            WithholdingKind::Rent
        } else {
            WithholdingKind::Professional
        }
    }
}

/// Accounts used for withheld IRPF
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithholdingAccounts {
    /// H.P. acreedora por retenciones practicadas on professional fees
    pub withheld: String,
    /// H.P. acreedora por retenciones practicadas on rents
    pub rent: String,
    /// H.P. retenciones y pagos a cuenta (a customer withholds from us)
    pub prepaid: String,
}

impl Default for WithholdingAccounts {
    fn default() -> Self {
        Self {
            withheld: "4751.01".to_string(),
            rent: "4751.02".to_string(),
            prepaid: "473".to_string(),
        }
    }
}

impl WithholdingAccounts {
    pub fn account_for(&self, kind: OperationKind, withholding: WithholdingKind) -> &str {
        match (kind, withholding) {
            (OperationKind::Income, _) => &self.prepaid,
            (_, WithholdingKind::Rent) => &self.rent,
            (_, WithholdingKind::Professional) => &self.withheld,
        }
    }
}
