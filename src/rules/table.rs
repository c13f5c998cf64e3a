//! Ordered keyword rules mapping invoice concepts to PGC accounts

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::tax::WithholdingKind;
use crate::traits::Classifier;
use crate::types::{LedgerError, LedgerResult, OperationKind};
use crate::utils::validate_account_code;

/// A single classification rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationRule {
    /// Lowercased keywords; any of them appearing in the concept matches
    pub keywords: Vec<String>,
    /// PGC account receiving the net amount
    pub account_code: String,
    /// Direction of the operation
    pub kind: OperationKind,
    /// VAT rate as a fraction (0.21 = 21%)
    pub vat_rate: BigDecimal,
    /// IRPF withholding rate as a fraction, if the operation carries one
    pub irpf_rate: Option<BigDecimal>,
    /// Professional fees or rent; picks the withholding subaccount
    #[serde(default)]
    pub withholding_kind: WithholdingKind,
    /// Inversión del sujeto pasivo: the buyer self-assesses the VAT
    #[serde(default)]
    pub reverse_charge: bool,
    /// Pattern for the classified row's concept, e.g. "Alquiler {fecha_corta}"
    #[serde(default)]
    pub concept_template: Option<String>,
    /// Whether the classified account is a depreciable fixed asset
    pub depreciable: bool,
    /// Higher values are evaluated first when loading from a file
    pub priority: i32,
}

impl ClassificationRule {
    /// Create a rule with a whole VAT percentage
    pub fn new(keywords: &[&str], account_code: &str, kind: OperationKind, vat_percent: u32) -> Self {
        Self {
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
            account_code: account_code.to_string(),
            kind,
            vat_rate: BigDecimal::from(vat_percent) / BigDecimal::from(100),
            irpf_rate: None,
            withholding_kind: WithholdingKind::Professional,
            reverse_charge: false,
            concept_template: None,
            depreciable: false,
            priority: 0,
        }
    }

    /// Add an IRPF withholding percentage on professional fees
    pub fn with_irpf(mut self, percent: u32) -> Self {
        self.irpf_rate = Some(BigDecimal::from(percent) / BigDecimal::from(100));
        self
    }

    /// Add an IRPF withholding percentage on a rent
    pub fn with_rent_withholding(mut self, percent: u32) -> Self {
        self.withholding_kind = WithholdingKind::Rent;
        self.with_irpf(percent)
    }

    /// Post the VAT under the reverse-charge scheme (ISP)
    pub fn reverse_charge(mut self) -> Self {
        self.reverse_charge = true;
        self
    }

    /// Build the classified row's concept from a pattern
    pub fn with_concept_template(mut self, template: &str) -> Self {
        self.concept_template = Some(template.to_string());
        self
    }

    /// Mark the account as a depreciable asset
    pub fn depreciable(mut self) -> Self {
        self.depreciable = true;
        self
    }

    /// Check a concept that has already been lowercased
    pub fn matches(&self, lowered_concept: &str) -> bool {
        self.keywords
            .iter()
            .any(|keyword| !keyword.is_empty() && lowered_concept.contains(keyword.as_str()))
    }

    fn validate(&self) -> LedgerResult<()> {
        if self.keywords.iter().all(|k| k.trim().is_empty()) {
            return Err(LedgerError::Validation(format!(
                "Rule for account '{}' has no keywords",
                self.account_code
            )));
        }
        validate_account_code(&self.account_code)?;

        let zero = BigDecimal::from(0);
        let one = BigDecimal::from(1);
        if self.vat_rate < zero || self.vat_rate >= one {
            return Err(LedgerError::InvalidTaxRate(format!(
                "rule for account '{}' has VAT rate {}",
                self.account_code, self.vat_rate
            )));
        }
        if self.reverse_charge && self.kind == OperationKind::Income {
            return Err(LedgerError::Validation(format!(
                "rule for account '{}' applies reverse charge to income; only purchases self-assess VAT",
                self.account_code
            )));
        }
        if let Some(irpf) = &self.irpf_rate {
            if *irpf < zero || *irpf >= one {
                return Err(LedgerError::InvalidTaxRate(format!(
                    "rule for account '{}' has IRPF rate {irpf}",
                    self.account_code
                )));
            }
        }
        Ok(())
    }
}

/// Ordered rule list evaluated first-match
#[derive(Debug, Clone, PartialEq)]
pub struct RuleTable {
    rules: Vec<ClassificationRule>,
}

impl RuleTable {
    /// Build a table keeping the given order; keywords are lowercased
    pub fn new(rules: Vec<ClassificationRule>) -> LedgerResult<Self> {
        let rules = rules
            .into_iter()
            .map(|mut rule| {
                rule.keywords = rule
                    .keywords
                    .iter()
                    .map(|k| k.trim().to_lowercase())
                    .filter(|k| !k.is_empty())
                    .collect();
                rule
            })
            .collect::<Vec<_>>();

        for rule in &rules {
            rule.validate()?;
        }

        Ok(Self { rules })
    }

    /// Rules for a small Spanish business following the PGC
    pub fn pgc_default() -> Self {
        use OperationKind::*;

        let rules = vec![
            ClassificationRule::new(&["publicidad", "ads", "google", "facebook"], "627", Expense, 21),
            ClassificationRule::new(&["asesoría", "freelance", "abogado"], "622", Expense, 21),
            ClassificationRule::new(&["electricidad", "luz", "iberdrola"], "628", Expense, 21),
            ClassificationRule::new(&["hosting", "software", "suscripción"], "629", Expense, 21),
            ClassificationRule::new(&["gasolina", "diesel", "repsol"], "629", Expense, 21),
            ClassificationRule::new(&["chatarra", "desperdicios"], "600", Expense, 21).reverse_charge(),
            ClassificationRule::new(&["amazon", "compra", "mercancía"], "600", Expense, 21),
            ClassificationRule::new(&["alquiler", "arrendamiento"], "621", Expense, 21).with_rent_withholding(19),
            ClassificationRule::new(&["formación", "curso"], "629", Expense, 21),
            ClassificationRule::new(&["notaría", "registro"], "623", Expense, 21),
            ClassificationRule::new(&["autónomo", "retención", "irpf"], "622", Expense, 21).with_irpf(15),
            ClassificationRule::new(&["coche", "vehículo", "leasing"], "217", Asset, 21).depreciable(),
            ClassificationRule::new(&["inversión", "activo", "maquinaria"], "218", Asset, 21).depreciable(),
            ClassificationRule::new(&["venta", "ingreso"], "700", Income, 21),
        ];

        Self { rules }
    }

    /// Find the first rule whose keywords appear in the concept
    pub fn lookup(&self, concept: &str) -> LedgerResult<&ClassificationRule> {
        let lowered = concept.to_lowercase();
        let rule = self
            .rules
            .iter()
            .find(|rule| rule.matches(&lowered))
            .ok_or_else(|| LedgerError::UnclassifiedConcept(concept.to_string()))?;

        debug!(concept, account = %rule.account_code, kind = rule.kind.label(), "concept classified");
        Ok(rule)
    }

    pub fn rules(&self) -> &[ClassificationRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Default for RuleTable {
    fn default() -> Self {
        Self::pgc_default()
    }
}

impl Classifier for RuleTable {
    fn classify(&self, concept: &str) -> LedgerResult<&ClassificationRule> {
        self.lookup(concept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_lookup_is_case_insensitive() {
        let table = RuleTable::pgc_default();
        assert_eq!(table.lookup("Servicios de ASESORÍA fiscal").unwrap().account_code, "622");
        assert_eq!(table.lookup("Factura IBERDROLA octubre").unwrap().account_code, "628");
        assert_eq!(table.lookup("Venta de mercaderías").unwrap().kind, OperationKind::Income);
    }

    #[test]
    fn test_first_match_wins() {
        // "compra" (600) is declared before "venta" (700) and "publicidad"
        // (627) before both
        let table = RuleTable::pgc_default();
        assert_eq!(table.lookup("Compra para venta").unwrap().account_code, "600");
        assert_eq!(table.lookup("Publicidad en Amazon").unwrap().account_code, "627");
    }

    #[test]
    fn test_unclassified_concept() {
        let table = RuleTable::pgc_default();
        let err = table.lookup("Donativo parroquia").unwrap_err();
        assert!(matches!(err, LedgerError::UnclassifiedConcept(ref c) if c == "Donativo parroquia"));
    }

    #[test]
    fn test_lookup_is_deterministic() {
        let table = RuleTable::pgc_default();
        let first = table.lookup("Curso de formación online").unwrap().account_code.clone();
        for _ in 0..10 {
            assert_eq!(table.lookup("Curso de formación online").unwrap().account_code, first);
        }
    }

    #[test]
    fn test_special_rules() {
        let table = RuleTable::pgc_default();
        let irpf = table.lookup("Factura autónomo diseño").unwrap();
        assert_eq!(irpf.irpf_rate, Some(BigDecimal::from_str("0.15").unwrap()));

        let vehicle = table.lookup("Leasing furgoneta").unwrap();
        assert_eq!(vehicle.kind, OperationKind::Asset);
        assert!(vehicle.depreciable);

        let rent = table.lookup("Alquiler local comercial").unwrap();
        assert_eq!(rent.irpf_rate, Some(BigDecimal::from_str("0.19").unwrap()));
        assert_eq!(rent.withholding_kind, WithholdingKind::Rent);

        let scrap = table.lookup("Compra de chatarra").unwrap();
        assert_eq!(scrap.account_code, "600");
        assert!(scrap.reverse_charge);
    }

    #[test]
    fn test_new_validates_rules() {
        let rule = ClassificationRule::new(&["  "], "622", OperationKind::Expense, 21);
        assert!(RuleTable::new(vec![rule]).is_err());

        let rule = ClassificationRule::new(&["hosting"], "6x2", OperationKind::Expense, 21);
        assert!(RuleTable::new(vec![rule]).is_err());

        let rule = ClassificationRule::new(&["Hosting"], "629", OperationKind::Expense, 100);
        assert!(matches!(RuleTable::new(vec![rule]), Err(LedgerError::InvalidTaxRate(_))));

        let rule = ClassificationRule::new(&["chatarra"], "700", OperationKind::Income, 21).reverse_charge();
        assert!(matches!(RuleTable::new(vec![rule]), Err(LedgerError::Validation(_))));

        let rule = ClassificationRule::new(&["Hosting "], "629", OperationKind::Expense, 21);
        let table = RuleTable::new(vec![rule]).unwrap();
        assert_eq!(table.lookup("hosting anual").unwrap().keywords, vec!["hosting"]);
    }
}
