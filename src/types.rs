//! Core types and data structures for invoice classification and ledger entries

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::amount;

/// Direction of an invoice, deciding which side the classified account lands on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Purchases and services received (groups 6 of the PGC)
    Expense,
    /// Sales and services rendered (group 7)
    Income,
    /// Fixed asset acquisitions (group 2)
    Asset,
}

impl OperationKind {
    /// Returns the side the classified account is posted to.
    /// Expenses and assets are debited, income is credited
    pub fn normal_side(&self) -> EntryType {
        match self {
            OperationKind::Expense | OperationKind::Asset => EntryType::Debit,
            OperationKind::Income => EntryType::Credit,
        }
    }

    /// Spanish label used in rule files ("gasto", "ingreso", "activo")
    pub fn label(&self) -> &'static str {
        match self {
            OperationKind::Expense => "gasto",
            OperationKind::Income => "ingreso",
            OperationKind::Asset => "activo",
        }
    }

    /// Parse a Spanish or English label
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "gasto" | "compra" | "expense" => Some(OperationKind::Expense),
            "ingreso" | "venta" | "income" => Some(OperationKind::Income),
            "activo" | "inversion" | "inversión" | "asset" => Some(OperationKind::Asset),
            _ => None,
        }
    }
}

/// Side of a ledger row in double-entry bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryType {
    /// Debit (debe)
    Debit,
    /// Credit (haber)
    Credit,
}

impl EntryType {
    pub fn opposite(&self) -> EntryType {
        match self {
            EntryType::Debit => EntryType::Credit,
            EntryType::Credit => EntryType::Debit,
        }
    }
}

/// Normalized invoice data consumed by the entry generator
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceLine {
    date: NaiveDate,
    concept: String,
    amount: BigDecimal,
    tax_rate: Option<BigDecimal>,
    withholding: Option<BigDecimal>,
    reference: Option<String>,
    counterparty: Option<String>,
    review: Vec<ReviewReason>,
}

impl InvoiceLine {
    /// Create an invoice line, rejecting blank concepts and amounts that do
    /// not round to a positive number of cents
    pub fn new(date: NaiveDate, concept: impl Into<String>, amount: BigDecimal) -> LedgerResult<Self> {
        let concept = concept.into().trim().to_string();
        if concept.is_empty() {
            return Err(LedgerError::Validation(
                "Invoice concept cannot be empty".to_string(),
            ));
        }
        amount::checked_amount(&amount)?;

        Ok(Self {
            date,
            concept,
            amount,
            tax_rate: None,
            withholding: None,
            reference: None,
            counterparty: None,
            review: Vec::new(),
        })
    }

    /// Attach the tax rate printed on the document (a fraction, 0.21 = 21%)
    pub fn with_tax_rate(mut self, tax_rate: BigDecimal) -> Self {
        self.tax_rate = Some(tax_rate);
        self
    }

    /// Attach the IRPF amount printed on the document. It replaces the
    /// withholding computed from the matched rule.
    pub fn with_withholding(mut self, withholding: BigDecimal) -> Self {
        self.withholding = Some(withholding);
        self
    }

    /// Invoice number, available to concept templates
    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    /// Supplier or customer name, available to concept templates
    pub fn with_counterparty(mut self, counterparty: impl Into<String>) -> Self {
        self.counterparty = Some(counterparty.into());
        self
    }

    /// Flag the line for manual review before posting
    pub fn with_review(mut self, reason: ReviewReason) -> Self {
        if !self.review.contains(&reason) {
            self.review.push(reason);
        }
        self
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn concept(&self) -> &str {
        &self.concept
    }

    /// Gross amount, taxes included
    pub fn amount(&self) -> &BigDecimal {
        &self.amount
    }

    pub fn tax_rate(&self) -> Option<&BigDecimal> {
        self.tax_rate.as_ref()
    }

    pub fn withholding(&self) -> Option<&BigDecimal> {
        self.withholding.as_ref()
    }

    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref()
    }

    pub fn counterparty(&self) -> Option<&str> {
        self.counterparty.as_deref()
    }

    pub fn review(&self) -> &[ReviewReason] {
        &self.review
    }
}

/// Why a generated asiento should be checked by hand before it is booked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewReason {
    /// Posted without VAT
    ZeroVat,
    /// Printed base, VAT and withholding do not add up to the printed total
    TotalMismatch,
    /// No rule matched; the fallback account was used
    FallbackAccount,
}

impl std::fmt::Display for ReviewReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ReviewReason::ZeroVat => "IVA 0%",
            ReviewReason::TotalMismatch => "total no cuadra",
            ReviewReason::FallbackAccount => "cuenta por defecto",
        };
        f.write_str(label)
    }
}

/// One row (apunte) of an accounting entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    #[serde(rename = "fecha")]
    pub date: NaiveDate,
    #[serde(rename = "cuenta")]
    pub account_code: String,
    #[serde(rename = "concepto")]
    pub concept: String,
    #[serde(rename = "debe", with = "amount::serde_number")]
    pub debit: BigDecimal,
    #[serde(rename = "haber", with = "amount::serde_number")]
    pub credit: BigDecimal,
}

impl LedgerEntry {
    /// Create a new row posting `amount` on the given side
    pub fn new(
        date: NaiveDate,
        account_code: String,
        concept: String,
        entry_type: EntryType,
        amount: BigDecimal,
    ) -> Self {
        let zero = BigDecimal::from(0).with_scale(amount::MONEY_SCALE);
        let amount = amount::round_half_up(&amount);
        let (debit, credit) = match entry_type {
            EntryType::Debit => (amount, zero),
            EntryType::Credit => (zero, amount),
        };
        Self {
            date,
            account_code,
            concept,
            debit,
            credit,
        }
    }

    /// Create a debit row
    pub fn debit(date: NaiveDate, account_code: String, concept: String, amount: BigDecimal) -> Self {
        Self::new(date, account_code, concept, EntryType::Debit, amount)
    }

    /// Create a credit row
    pub fn credit(date: NaiveDate, account_code: String, concept: String, amount: BigDecimal) -> Self {
        Self::new(date, account_code, concept, EntryType::Credit, amount)
    }

    /// Side this row posts to; rows with a debit amount count as debits
    pub fn entry_type(&self) -> EntryType {
        if self.debit > BigDecimal::from(0) {
            EntryType::Debit
        } else {
            EntryType::Credit
        }
    }
}

/// Balanced group of rows generated from one invoice line
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Asiento {
    /// Rows in posting order
    pub entries: Vec<LedgerEntry>,
    /// Reasons to check the asiento by hand; not part of the wire format
    #[serde(skip)]
    pub review: Vec<ReviewReason>,
}

impl Asiento {
    pub fn new(entries: Vec<LedgerEntry>) -> Self {
        Self {
            entries,
            review: Vec::new(),
        }
    }

    /// Whether any review reason was raised while generating
    pub fn needs_review(&self) -> bool {
        !self.review.is_empty()
    }

    /// Review reasons joined for logs and response headers
    pub fn review_summary(&self) -> String {
        self.review
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Add a row to the asiento
    pub fn add_entry(&mut self, entry: LedgerEntry) {
        self.entries.push(entry);
    }

    /// Calculate total debits
    pub fn total_debits(&self) -> BigDecimal {
        self.entries.iter().map(|e| &e.debit).sum()
    }

    /// Calculate total credits
    pub fn total_credits(&self) -> BigDecimal {
        self.entries.iter().map(|e| &e.credit).sum()
    }

    /// Check if debits equal credits within the rounding tolerance
    pub fn is_balanced(&self) -> bool {
        (self.total_debits() - self.total_credits()).abs() <= amount::tolerance()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Validate the double-entry structure of the asiento
    pub fn validate(&self) -> LedgerResult<()> {
        if self.entries.len() < 2 {
            return Err(LedgerError::Validation(
                "Asiento must have at least two rows for double-entry bookkeeping".to_string(),
            ));
        }

        let zero = BigDecimal::from(0);
        for entry in &self.entries {
            if entry.debit < zero || entry.credit < zero {
                return Err(LedgerError::Validation(format!(
                    "Row for account '{}' has a negative amount",
                    entry.account_code
                )));
            }
            if entry.debit > zero && entry.credit > zero {
                return Err(LedgerError::Validation(format!(
                    "Row for account '{}' posts to both debit and credit",
                    entry.account_code
                )));
            }
        }

        if !self.is_balanced() {
            return Err(LedgerError::Unbalanced {
                debit: self.total_debits(),
                credit: self.total_credits(),
            });
        }

        Ok(())
    }
}

impl IntoIterator for Asiento {
    type Item = LedgerEntry;
    type IntoIter = std::vec::IntoIter<LedgerEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Errors that can occur while classifying, generating or exporting entries
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Unclassified concept: no rule matches '{0}'")]
    UnclassifiedConcept(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Invalid tax rate: {0}")]
    InvalidTaxRate(String),
    #[error("Invalid date: {0}")]
    InvalidDate(String),
    #[error("Malformed document: {0}")]
    MalformedDocument(String),
    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),
    #[error("Asiento is not balanced: debits = {debit}, credits = {credit}")]
    Unbalanced { debit: BigDecimal, credit: BigDecimal },
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("OCR error: {0}")]
    Ocr(String),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Excel error: {0}")]
    Excel(#[from] rust_xlsxwriter::XlsxError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LedgerError {
    /// Stable name of the error kind, reported to API clients
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerError::UnclassifiedConcept(_) => "UnclassifiedConcept",
            LedgerError::InvalidAmount(_) => "InvalidAmount",
            LedgerError::InvalidTaxRate(_) => "InvalidTaxRate",
            LedgerError::InvalidDate(_) => "InvalidDate",
            LedgerError::MalformedDocument(_) => "MalformedDocument",
            LedgerError::UnsupportedFileType(_) => "UnsupportedFileType",
            LedgerError::Unbalanced { .. } => "Unbalanced",
            LedgerError::Validation(_) => "Validation",
            LedgerError::Ocr(_) => "Ocr",
            LedgerError::Csv(_) => "Csv",
            LedgerError::Json(_) => "Json",
            LedgerError::Excel(_) => "Excel",
            LedgerError::Io(_) => "Io",
        }
    }

    /// Whether the error was caused by the caller's input rather than by the service
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            LedgerError::UnclassifiedConcept(_)
                | LedgerError::InvalidAmount(_)
                | LedgerError::InvalidTaxRate(_)
                | LedgerError::InvalidDate(_)
                | LedgerError::MalformedDocument(_)
                | LedgerError::UnsupportedFileType(_)
                | LedgerError::Validation(_)
                | LedgerError::Csv(_)
                | LedgerError::Json(_)
        )
    }
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;
