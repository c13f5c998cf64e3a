//! Loading rule tables from `;`-separated rule sheets

use bigdecimal::BigDecimal;
use csv::{ReaderBuilder, Trim};
use serde::Deserialize;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::info;

use crate::rules::{ClassificationRule, RuleTable};
use crate::tax::{VatCategory, VatRate, Withholding, WithholdingKind};
use crate::types::{LedgerError, LedgerResult, OperationKind};

/// Header: `palabras_clave;cuenta;tipo;iva;irpf;amortizable;prioridad[;concepto_patron]`
#[derive(Debug, Deserialize)]
struct RuleRow {
    palabras_clave: String,
    cuenta: String,
    tipo: String,
    iva: String,
    #[serde(default)]
    irpf: Option<String>,
    #[serde(default)]
    amortizable: Option<String>,
    #[serde(default)]
    prioridad: Option<i32>,
    #[serde(default)]
    concepto_patron: Option<String>,
}

impl RuleRow {
    fn into_rule(self, line: usize) -> LedgerResult<ClassificationRule> {
        let kind = OperationKind::from_label(&self.tipo).ok_or_else(|| {
            LedgerError::Validation(format!("line {line}: unknown operation type '{}'", self.tipo))
        })?;
        let (vat_rate, reverse_charge) = parse_vat_column(&self.iva)?;
        let (irpf_rate, withholding_kind) = match self.irpf.as_deref().map(str::trim) {
            None | Some("") => (None, WithholdingKind::Professional),
            Some(raw) => {
                let rate = Withholding::parse_rate(raw).ok_or_else(|| {
                    LedgerError::InvalidTaxRate(format!("line {line}: cannot read an IRPF rate from '{raw}'"))
                })?;
                (Some(rate), WithholdingKind::from_label(raw))
            }
        };
        let depreciable = matches!(
            self.amortizable.as_deref().map(|v| v.trim().to_lowercase()).as_deref(),
            Some("si" | "sí" | "true" | "1" | "x")
        );

        Ok(ClassificationRule {
            keywords: self.palabras_clave.split('|').map(str::to_string).collect(),
            account_code: self.cuenta.trim().to_string(),
            kind,
            vat_rate,
            irpf_rate: irpf_rate.filter(|rate: &BigDecimal| *rate > BigDecimal::from(0)),
            withholding_kind,
            reverse_charge,
            concept_template: self.concepto_patron.filter(|pattern| !pattern.trim().is_empty()),
            depreciable,
            priority: self.prioridad.unwrap_or(0),
        })
    }
}

/// `ISP`, `ISP (21%)` or `Inversión sujeto pasivo 10%` mark a reverse-charge
/// rule; a bare `ISP` self-assesses at the general rate
fn parse_vat_column(raw: &str) -> LedgerResult<(BigDecimal, bool)> {
    let lowered = raw.to_lowercase();
    let reverse_charge = lowered.split(|c: char| !c.is_alphanumeric()).any(|word| word == "isp")
        || lowered.contains("sujeto pasivo");
    if !reverse_charge {
        return Ok((VatRate::parse(raw)?.fraction().clone(), false));
    }

    let rate = match VatRate::parse(raw) {
        Ok(rate) => rate,
        Err(_) => VatCategory::General.rate(),
    };
    Ok((rate.fraction().clone(), true))
}

impl RuleTable {
    /// Read a rule sheet. Rows are ordered by descending priority; rows with
    /// the same priority keep their order in the sheet.
    pub fn from_csv_reader<R: Read>(reader: R) -> LedgerResult<Self> {
        let mut rdr = ReaderBuilder::new()
            .delimiter(b';')
            .trim(Trim::All)
            .flexible(true)
            .from_reader(reader);

        let mut rules = Vec::new();
        for (index, record) in rdr.deserialize::<RuleRow>().enumerate() {
            // header is line 1
            rules.push(record?.into_rule(index + 2)?);
        }

        if rules.is_empty() {
            return Err(LedgerError::Validation("Rule sheet has no rules".to_string()));
        }

        rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        RuleTable::new(rules)
    }

    /// Read a rule sheet from disk
    pub fn from_csv_path(path: impl AsRef<Path>) -> LedgerResult<Self> {
        let path = path.as_ref();
        let table = Self::from_csv_reader(File::open(path)?)?;
        info!(path = %path.display(), rules = table.len(), "rule table loaded");
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::str::FromStr;

    const SHEET: &str = "\
palabras_clave;cuenta;tipo;iva;irpf;amortizable;prioridad
hosting|software;629;gasto;21%;;;0
abogado;622;gasto;21;15;;5
furgoneta;218;activo;General (21%);;si;0
libros;600;gasto;Superreducido (4%);;;0
";

    #[test]
    fn test_sheet_is_sorted_by_priority() {
        let table = RuleTable::from_csv_reader(SHEET.as_bytes()).unwrap();
        assert_eq!(table.len(), 4);
        assert_eq!(table.rules()[0].account_code, "622");
        assert_eq!(table.rules()[1].account_code, "629");
        assert_eq!(table.rules()[2].account_code, "218");
    }

    #[test]
    fn test_sheet_columns_are_parsed() {
        let table = RuleTable::from_csv_reader(SHEET.as_bytes()).unwrap();

        let lawyer = table.lookup("Minuta abogado").unwrap();
        assert_eq!(lawyer.irpf_rate, Some(BigDecimal::from_str("0.15").unwrap()));

        let van = table.lookup("Compra furgoneta").unwrap();
        assert!(van.depreciable);
        assert_eq!(van.kind, OperationKind::Asset);

        let books = table.lookup("Libros técnicos").unwrap();
        assert_eq!(books.vat_rate, BigDecimal::from_str("0.04").unwrap());
        assert_eq!(table.lookup("SOFTWARE contable").unwrap().keywords, vec!["hosting", "software"]);
    }

    #[test]
    fn test_treatment_columns() {
        let sheet = "\
palabras_clave;cuenta;tipo;iva;irpf;amortizable;prioridad;concepto_patron
alquiler;621;gasto;21;Retención Alquiler (19%);;0;Alquiler local {fecha_corta}
chatarra;600;gasto;ISP;;;0;
cobre;600;gasto;ISP (10%);;;0;
consultor;623;gasto;General (21%);IRPF (7%);;0;
";
        let table = RuleTable::from_csv_reader(sheet.as_bytes()).unwrap();

        let rent = table.lookup("Alquiler nave").unwrap();
        assert_eq!(rent.irpf_rate, Some(BigDecimal::from_str("0.19").unwrap()));
        assert_eq!(rent.withholding_kind, WithholdingKind::Rent);
        assert_eq!(rent.concept_template.as_deref(), Some("Alquiler local {fecha_corta}"));

        let scrap = table.lookup("Chatarra de hierro").unwrap();
        assert!(scrap.reverse_charge);
        assert_eq!(scrap.vat_rate, BigDecimal::from_str("0.21").unwrap());
        assert_eq!(scrap.concept_template, None);

        let copper = table.lookup("Cobre reciclado").unwrap();
        assert!(copper.reverse_charge);
        assert_eq!(copper.vat_rate, BigDecimal::from_str("0.10").unwrap());

        let consultant = table.lookup("Consultor externo").unwrap();
        assert_eq!(consultant.irpf_rate, Some(BigDecimal::from_str("0.07").unwrap()));
        assert_eq!(consultant.withholding_kind, WithholdingKind::Professional);
        assert!(!consultant.reverse_charge);
    }

    #[test]
    fn test_unreadable_irpf_column_is_reported() {
        let sheet = "palabras_clave;cuenta;tipo;iva;irpf\nabogado;622;gasto;21;recargo\n";
        let err = RuleTable::from_csv_reader(sheet.as_bytes()).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidTaxRate(ref m) if m.contains("line 2")));
    }

    #[test]
    fn test_unknown_operation_type_is_reported() {
        let sheet = "palabras_clave;cuenta;tipo;iva\nluz;628;suministro;21\n";
        let err = RuleTable::from_csv_reader(sheet.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_empty_sheet_is_rejected() {
        let sheet = "palabras_clave;cuenta;tipo;iva\n";
        assert!(RuleTable::from_csv_reader(sheet.as_bytes()).is_err());
    }

    #[test]
    fn test_from_csv_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SHEET.as_bytes()).unwrap();
        let table = RuleTable::from_csv_path(file.path()).unwrap();
        assert_eq!(table.len(), 4);
    }
}
