//! Ledger entry generation from classified invoice lines

use bigdecimal::BigDecimal;
use tracing::{info, warn};

use crate::amount;
use crate::ledger::{render_concept, AsientoBuilder, LedgerAccounts};
use crate::rules::{ClassificationRule, RuleTable};
use crate::tax::{VatAccounts, VatCalculation, VatRate, Withholding, WithholdingKind};
use crate::traits::*;
use crate::types::*;
use crate::utils::{validate_account_code, validate_positive_amount};

const WITHHOLDING_CONCEPT: &str = "Retención IRPF";
const REVERSE_CHARGE_INPUT_CONCEPT: &str = "IVA Soportado ISP";
const REVERSE_CHARGE_OUTPUT_CONCEPT: &str = "IVA Repercutido ISP";

/// Turns invoice lines into balanced asientos
pub struct EntryGenerator<C: Classifier = RuleTable> {
    classifier: C,
    accounts: LedgerAccounts,
    fallback: Option<ClassificationRule>,
    validator: Box<dyn AsientoValidator>,
}

impl<C: Classifier> EntryGenerator<C> {
    /// Create a generator with the default accounts and validator
    pub fn new(classifier: C) -> Self {
        Self {
            classifier,
            accounts: LedgerAccounts::default(),
            fallback: None,
            validator: Box::new(DefaultAsientoValidator),
        }
    }

    /// Use custom bank, VAT and withholding accounts
    pub fn with_accounts(mut self, accounts: LedgerAccounts) -> Self {
        self.accounts = accounts;
        self
    }

    /// Post unclassified concepts as expenses on `account_code` instead of failing.
    /// Asientos posted this way are flagged for review.
    pub fn with_fallback_account(
        mut self,
        account_code: &str,
        vat_rate: BigDecimal,
    ) -> LedgerResult<Self> {
        validate_account_code(account_code)?;
        VatRate::new(vat_rate.clone())?;

        self.fallback = Some(ClassificationRule {
            keywords: Vec::new(),
            account_code: account_code.to_string(),
            kind: OperationKind::Expense,
            vat_rate,
            irpf_rate: None,
            withholding_kind: WithholdingKind::Professional,
            reverse_charge: false,
            concept_template: None,
            depreciable: false,
            priority: i32::MIN,
        });
        Ok(self)
    }

    /// Replace the validator run on every generated asiento
    pub fn with_validator(mut self, validator: Box<dyn AsientoValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn accounts(&self) -> &LedgerAccounts {
        &self.accounts
    }

    pub fn classifier(&self) -> &C {
        &self.classifier
    }

    /// Classify a concept, falling back to the configured account if any
    pub fn classify(&self, concept: &str) -> LedgerResult<&ClassificationRule> {
        self.resolve(concept).map(|(rule, _)| rule)
    }

    /// Generate the asiento for a line at an explicit tax rate (a fraction)
    pub fn generate(&self, line: &InvoiceLine, tax_rate: &BigDecimal) -> LedgerResult<Asiento> {
        validate_positive_amount(line.amount())?;
        let rate = VatRate::new(tax_rate.clone())?;
        let (rule, fallback) = self.resolve(line.concept())?;
        self.post(line, rule, rate, fallback)
    }

    /// Generate using the line's own rate, or the matched rule's rate when the
    /// line carries none
    pub fn generate_auto(&self, line: &InvoiceLine) -> LedgerResult<Asiento> {
        validate_positive_amount(line.amount())?;
        let (rule, fallback) = self.resolve(line.concept())?;
        let rate = VatRate::new(line.tax_rate().unwrap_or(&rule.vat_rate).clone())?;
        self.post(line, rule, rate, fallback)
    }

    /// Generate every line; any failure aborts the whole batch
    pub fn generate_all(&self, lines: &[InvoiceLine]) -> LedgerResult<Vec<Asiento>> {
        lines.iter().map(|line| self.generate_auto(line)).collect()
    }

    /// Matched rule, and whether it is the fallback
    fn resolve(&self, concept: &str) -> LedgerResult<(&ClassificationRule, bool)> {
        match self.classifier.classify(concept) {
            Err(LedgerError::UnclassifiedConcept(concept)) => match &self.fallback {
                Some(rule) => {
                    warn!(%concept, account = %rule.account_code, "no rule matched, using fallback account");
                    Ok((rule, true))
                }
                None => Err(LedgerError::UnclassifiedConcept(concept)),
            },
            other => other.map(|rule| (rule, false)),
        }
    }

    fn post(
        &self,
        line: &InvoiceLine,
        rule: &ClassificationRule,
        rate: VatRate,
        fallback: bool,
    ) -> LedgerResult<Asiento> {
        let kind = rule.kind;
        let side = kind.normal_side();
        let zero = BigDecimal::from(0);

        let mut review = line.review().to_vec();
        if fallback {
            review.push(ReviewReason::FallbackAccount);
        }
        if rate.is_zero() && !review.contains(&ReviewReason::ZeroVat) {
            review.push(ReviewReason::ZeroVat);
        }

        let concept = match &rule.concept_template {
            Some(template) => render_concept(template, line),
            None => line.concept().to_string(),
        };

        // Reverse charge: the invoice carries no VAT, the buyer books both sides
        let split = if rule.reverse_charge {
            VatCalculation::calculate(line.amount(), rate)
        } else {
            VatCalculation::reverse_calculate(line.amount(), rate)
        };

        let mut builder = AsientoBuilder::new(line.date()).entry(
            side,
            &rule.account_code,
            &concept,
            split.base_amount.clone(),
        );

        let mut settlement = split.total_amount.clone();
        if split.tax_amount > zero {
            if rule.reverse_charge {
                builder = builder
                    .debit(&self.accounts.vat.input, REVERSE_CHARGE_INPUT_CONCEPT, split.tax_amount.clone())
                    .credit(&self.accounts.vat.output, REVERSE_CHARGE_OUTPUT_CONCEPT, split.tax_amount.clone());
                settlement = split.base_amount.clone();
            } else {
                builder = builder.entry(
                    side,
                    self.accounts.vat.account_for(kind),
                    VatAccounts::concept_for(kind),
                    split.tax_amount.clone(),
                );
            }
        }

        // A withholding printed on the document wins over the rule's rate
        let withholding = match (line.withholding(), &rule.irpf_rate) {
            (Some(printed), _) => Some(amount::round_half_up(printed)),
            (None, Some(irpf_rate)) => Some(Withholding::calculate(&split.base_amount, irpf_rate)?.amount),
            (None, None) => None,
        };
        if let Some(withheld) = withholding.filter(|withheld| *withheld > zero) {
            if withheld >= settlement {
                return Err(LedgerError::InvalidAmount(format!(
                    "withholding {withheld} leaves nothing to settle out of {settlement}"
                )));
            }
            builder = builder.entry(
                side.opposite(),
                self.accounts.withholding.account_for(kind, rule.withholding_kind),
                WITHHOLDING_CONCEPT,
                withheld.clone(),
            );
            settlement -= &withheld;
        }

        let mut asiento = builder
            .entry(
                side.opposite(),
                &self.accounts.bank,
                LedgerAccounts::settlement_concept(kind),
                settlement,
            )
            .build()?;
        self.validator.validate_asiento(&asiento)?;

        let debit = asiento.total_debits();
        let credit = asiento.total_credits();
        let tolerance = amount::tolerance();
        if (&debit - &split.total_amount).abs() > tolerance
            || (&credit - &split.total_amount).abs() > tolerance
        {
            return Err(LedgerError::Unbalanced { debit, credit });
        }

        asiento.review = review;
        if asiento.needs_review() {
            warn!(
                concept = line.concept(),
                reasons = %asiento.review_summary(),
                "asiento needs manual review"
            );
        }

        info!(
            concept = line.concept(),
            account = %rule.account_code,
            kind = kind.label(),
            rows = asiento.len(),
            total = %split.total_amount,
            reverse_charge = rule.reverse_charge,
            "asiento generated"
        );
        Ok(asiento)
    }
}

impl Default for EntryGenerator<RuleTable> {
    fn default() -> Self {
        Self::new(RuleTable::pgc_default())
    }
}
