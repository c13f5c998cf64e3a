//! VAT (IVA / IGIC) calculation engine for Spanish invoices

use bigdecimal::BigDecimal;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::amount::round_half_up;
use crate::types::{LedgerError, LedgerResult, OperationKind};

/// Indirect tax scheme printed on the invoice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TaxScheme {
    /// Impuesto sobre el Valor Añadido (mainland Spain)
    #[default]
    Iva,
    /// Impuesto General Indirecto Canario (Canary Islands)
    Igic,
}

impl TaxScheme {
    /// Code used by Contasol account listings (1 = IVA, 2 = IGIC)
    pub fn code(&self) -> u8 {
        match self {
            TaxScheme::Iva => 1,
            TaxScheme::Igic => 2,
        }
    }
}

/// Standard IVA categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VatCategory {
    /// General rate - 21%
    General,
    /// Reduced rate - 10%
    Reduced,
    /// Super-reduced rate - 4%
    SuperReduced,
    /// Exempt operations - 0%
    Exempt,
    /// Operations outside the scope of IVA - 0%
    NotSubject,
}

impl VatCategory {
    /// Get the rate for this category
    pub fn rate(&self) -> VatRate {
        let percent = match self {
            VatCategory::General => 21,
            VatCategory::Reduced => 10,
            VatCategory::SuperReduced => 4,
            VatCategory::Exempt | VatCategory::NotSubject => 0,
        };
        VatRate(BigDecimal::from(percent) / BigDecimal::from(100))
    }

    /// Label as written in rule sheets
    pub fn label(&self) -> &'static str {
        match self {
            VatCategory::General => "General (21%)",
            VatCategory::Reduced => "Reducido (10%)",
            VatCategory::SuperReduced => "Superreducido (4%)",
            VatCategory::Exempt => "Exento",
            VatCategory::NotSubject => "No Sujeto",
        }
    }

    /// Match a category label case-insensitively
    pub fn from_label(label: &str) -> Option<Self> {
        let lowered = label.trim().to_lowercase();
        [
            VatCategory::General,
            VatCategory::Reduced,
            VatCategory::SuperReduced,
            VatCategory::Exempt,
            VatCategory::NotSubject,
        ]
        .into_iter()
        .find(|category| {
            let name = category.label().to_lowercase();
            lowered == name || name.starts_with(&format!("{lowered} "))
        })
    }
}

/// Tax rate expressed as a fraction of the net amount (0.21 = 21%).
/// Always within `[0, 1)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Serialize, Deserialize)]
pub struct VatRate(BigDecimal);

impl VatRate {
    /// Create a rate from a fraction, rejecting values outside `[0, 1)`
    pub fn new(fraction: BigDecimal) -> LedgerResult<Self> {
        if fraction < BigDecimal::from(0) || fraction >= BigDecimal::from(1) {
            return Err(LedgerError::InvalidTaxRate(format!(
                "rate must be within [0, 1), got {fraction}"
            )));
        }
        Ok(Self(fraction))
    }

    /// Create a rate from a whole percentage (21 -> 0.21)
    pub fn from_percent(percent: BigDecimal) -> LedgerResult<Self> {
        Self::new(percent / BigDecimal::from(100))
    }

    pub fn zero() -> Self {
        Self(BigDecimal::from(0))
    }

    /// Parse rates written as a category label ("Reducido (10%)", "Exento"),
    /// a percentage ("21%", "21") or a fraction ("0.21")
    pub fn parse(raw: &str) -> LedgerResult<Self> {
        if let Some(category) = VatCategory::from_label(raw) {
            return Ok(category.rate());
        }

        let invalid = || LedgerError::InvalidTaxRate(format!("cannot read a rate from '{raw}'"));
        let lowered = raw.trim().to_lowercase();
        if lowered.contains("exento") || lowered.contains("no sujeto") {
            return Ok(Self::zero());
        }

        let re = Regex::new(r"(\d{1,2}(?:[.,]\d+)?)\s*%").map_err(|_| invalid())?;
        if let Some(caps) = re.captures(&lowered) {
            let percent = BigDecimal::from_str(&caps[1].replace(',', ".")).map_err(|_| invalid())?;
            return Self::from_percent(percent);
        }

        let value = BigDecimal::from_str(&lowered.replace(',', ".")).map_err(|_| invalid())?;
        if value >= BigDecimal::from(1) {
            Self::from_percent(value)
        } else {
            Self::new(value)
        }
    }

    pub fn fraction(&self) -> &BigDecimal {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == BigDecimal::from(0)
    }
}

/// Net/tax breakdown of an amount
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VatCalculation {
    /// Taxable base (base imponible)
    pub base_amount: BigDecimal,
    /// Rate used for the calculation
    pub rate: VatRate,
    /// Tax amount (cuota)
    pub tax_amount: BigDecimal,
    /// Total amount including tax
    pub total_amount: BigDecimal,
}

impl VatCalculation {
    /// Calculate the tax due on a net amount
    pub fn calculate(base_amount: &BigDecimal, rate: VatRate) -> Self {
        let base_amount = round_half_up(base_amount);
        let tax_amount = round_half_up(&(&base_amount * rate.fraction()));
        let total_amount = &base_amount + &tax_amount;

        Self {
            base_amount,
            rate,
            tax_amount,
            total_amount,
        }
    }

    /// Split a gross amount into net and tax. The tax is derived as
    /// `total - net`, so both parts always add up to the rounded total.
    pub fn reverse_calculate(total_amount: &BigDecimal, rate: VatRate) -> Self {
        let total_amount = round_half_up(total_amount);
        let divisor = BigDecimal::from(1) + rate.fraction();
        let base_amount = round_half_up(&(&total_amount / divisor));
        let tax_amount = &total_amount - &base_amount;

        Self {
            base_amount,
            rate,
            tax_amount,
            total_amount,
        }
    }
}

/// Accounts receiving input and output VAT
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VatAccounts {
    /// H.P. IVA soportado
    pub input: String,
    /// H.P. IVA repercutido
    pub output: String,
}

impl Default for VatAccounts {
    fn default() -> Self {
        Self {
            input: "472".to_string(),
            output: "477".to_string(),
        }
    }
}

impl VatAccounts {
    /// Input VAT for purchases and investments, output VAT for sales
    pub fn account_for(&self, kind: OperationKind) -> &str {
        match kind {
            OperationKind::Expense | OperationKind::Asset => &self.input,
            OperationKind::Income => &self.output,
        }
    }

    /// Row concept for the tax line
    pub fn concept_for(kind: OperationKind) -> &'static str {
        match kind {
            OperationKind::Expense | OperationKind::Asset => "IVA Soportado",
            OperationKind::Income => "IVA Repercutido",
        }
    }
}
