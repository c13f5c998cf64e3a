//! Contasol ledger CSV export

use std::path::Path;

use chrono::NaiveDate;
use csv::{ReaderBuilder, Trim, WriterBuilder};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::amount::{format_amount, parse_amount};
use crate::types::*;

/// Column layout of the import file
pub const CONTASOL_HEADER: [&str; 6] = ["fecha", "diario", "cuenta", "concepto", "debe", "haber"];

/// Date layout Contasol uses in its own exports (DDMMYYYY)
pub const CONTASOL_DATE_FORMAT: &str = "%d%m%Y";

/// Concept width of the Contasol journal screen
pub const CONTASOL_CONCEPT_LEN: usize = 38;

/// Formatting knobs for the exported file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    /// Journal number written on every row
    pub diario: String,
    /// Write `1234,56` instead of `1234.56`
    pub decimal_comma: bool,
    /// chrono format string for the `fecha` column
    pub date_format: String,
    /// Truncate concepts to this many characters
    pub max_concept_len: Option<usize>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            diario: "1".to_string(),
            decimal_comma: false,
            date_format: "%Y-%m-%d".to_string(),
            max_concept_len: None,
        }
    }
}

impl ExportOptions {
    /// Layout matching what Contasol writes itself
    pub fn contasol_native() -> Self {
        Self {
            decimal_comma: true,
            date_format: CONTASOL_DATE_FORMAT.to_string(),
            max_concept_len: Some(CONTASOL_CONCEPT_LEN),
            ..Self::default()
        }
    }
}

/// Serializes asientos into the `;`-separated ledger file
#[derive(Debug, Clone, Default)]
pub struct ContasolExporter {
    options: ExportOptions,
}

impl ContasolExporter {
    pub fn new(options: ExportOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ExportOptions {
        &self.options
    }

    /// Flatten the asientos, in order, into CSV bytes with a header row
    pub fn export(&self, asientos: &[Asiento]) -> LedgerResult<Vec<u8>> {
        let mut writer = WriterBuilder::new().delimiter(b';').from_writer(Vec::new());
        writer.write_record(CONTASOL_HEADER)?;

        let mut rows = 0usize;
        for entry in asientos.iter().flat_map(|asiento| asiento.entries.iter()) {
            let date = entry.date.format(&self.options.date_format).to_string();
            let concept = match self.options.max_concept_len {
                Some(max) => entry.concept.chars().take(max).collect(),
                None => entry.concept.clone(),
            };
            writer.write_record([
                date.as_str(),
                self.options.diario.as_str(),
                entry.account_code.as_str(),
                concept.as_str(),
                format_amount(&entry.debit, self.options.decimal_comma).as_str(),
                format_amount(&entry.credit, self.options.decimal_comma).as_str(),
            ])?;
            rows += 1;
        }

        let bytes = writer.into_inner().map_err(|e| LedgerError::Io(e.into_error()))?;
        info!(asientos = asientos.len(), rows, bytes = bytes.len(), "ledger exported");
        Ok(bytes)
    }

    /// Export straight to a file
    pub fn export_to_path(&self, asientos: &[Asiento], path: impl AsRef<Path>) -> LedgerResult<()> {
        let bytes = self.export(asientos)?;
        std::fs::write(path.as_ref(), bytes)?;
        info!(path = %path.as_ref().display(), "ledger file written");
        Ok(())
    }

    /// Parse an exported file back into ledger rows
    pub fn read(&self, bytes: &[u8]) -> LedgerResult<Vec<LedgerEntry>> {
        let mut reader = ReaderBuilder::new()
            .delimiter(b';')
            .trim(Trim::All)
            .from_reader(bytes);

        let headers = reader.headers()?.clone();
        if !headers.iter().map(str::to_lowercase).eq(CONTASOL_HEADER.iter().map(|h| h.to_string())) {
            return Err(LedgerError::MalformedDocument(format!(
                "expected header '{}', found '{}'",
                CONTASOL_HEADER.join(";"),
                headers.iter().collect::<Vec<_>>().join(";")
            )));
        }

        let mut entries = Vec::new();
        for record in reader.records() {
            let record = record?;
            let field = |index: usize| record.get(index).unwrap_or_default();

            let date = NaiveDate::parse_from_str(field(0), &self.options.date_format)
                .map_err(|e| LedgerError::InvalidDate(format!("'{}': {e}", field(0))))?;
            entries.push(LedgerEntry {
                date,
                account_code: field(2).to_string(),
                concept: field(3).to_string(),
                debit: parse_amount(field(4))?,
                credit: parse_amount(field(5))?,
            });
        }

        Ok(entries)
    }
}

/// File name for a client's monthly export: `{client}_{period}.csv`.
/// Characters other than letters, digits, `_` and `-` become `_`.
pub fn export_file_name(client: &str, period: &str) -> String {
    let sanitize = |raw: &str| -> String {
        raw.trim()
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
            .collect()
    };
    format!("{}_{}.csv", sanitize(client), sanitize(period))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use pretty_assertions::assert_eq;
    use std::str::FromStr;

    fn dec(value: &str) -> BigDecimal {
        BigDecimal::from_str(value).unwrap()
    }

    fn sample() -> Vec<Asiento> {
        let date = NaiveDate::from_ymd_opt(2023, 10, 27).unwrap();
        vec![
            Asiento::new(vec![
                LedgerEntry::debit(date, "622".into(), "Servicios de asesoría fiscal".into(), dec("200")),
                LedgerEntry::debit(date, "472".into(), "IVA Soportado".into(), dec("42")),
                LedgerEntry::credit(date, "572".into(), "Pago banco".into(), dec("242")),
            ]),
            Asiento::new(vec![
                LedgerEntry::debit(date, "628".into(), "Luz; octubre".into(), dec("10.5")),
                LedgerEntry::credit(date, "572".into(), "Pago banco".into(), dec("10.5")),
            ]),
        ]
    }

    #[test]
    fn test_export_layout() {
        let bytes = ContasolExporter::default().export(&sample()).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 6);
        assert_eq!(lines[0], "fecha;diario;cuenta;concepto;debe;haber");
        assert_eq!(lines[1], "2023-10-27;1;622;Servicios de asesoría fiscal;200.00;0.00");
        assert_eq!(lines[3], "2023-10-27;1;572;Pago banco;0.00;242.00");
        assert_eq!(lines[4], "2023-10-27;1;628;\"Luz; octubre\";10.50;0.00");
    }

    #[test]
    fn test_empty_export_has_header_only() {
        let bytes = ContasolExporter::default().export(&[]).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "fecha;diario;cuenta;concepto;debe;haber\n");
    }

    #[test]
    fn test_round_trip() {
        let exporter = ContasolExporter::default();
        let asientos = sample();
        let rows = exporter.read(&exporter.export(&asientos).unwrap()).unwrap();

        let expected: Vec<LedgerEntry> = asientos.into_iter().flatten().collect();
        assert_eq!(rows, expected);
    }

    #[test]
    fn test_contasol_native_options() {
        let exporter = ContasolExporter::new(ExportOptions::contasol_native());
        let text = String::from_utf8(exporter.export(&sample()).unwrap()).unwrap();
        let first = text.lines().nth(1).unwrap();

        assert_eq!(first, "27102023;1;622;Servicios de asesoría fiscal;200,00;0,00");

        let rows = exporter.read(text.as_bytes()).unwrap();
        assert_eq!(rows[0].debit, dec("200"));
        assert_eq!(rows.len(), 5);
    }

    #[test]
    fn test_concept_truncation() {
        let options = ExportOptions {
            max_concept_len: Some(9),
            ..ExportOptions::default()
        };
        let text = String::from_utf8(ContasolExporter::new(options).export(&sample()).unwrap()).unwrap();
        assert!(text.lines().nth(1).unwrap().contains(";Servicios;"));
    }

    #[test]
    fn test_read_rejects_foreign_header() {
        let result = ContasolExporter::default().read(b"date,account,amount\n2023-01-01,572,10\n");
        assert!(matches!(result, Err(LedgerError::MalformedDocument(_))));
    }

    #[test]
    fn test_export_file_name() {
        assert_eq!(export_file_name("Acme S.L.", "202311"), "Acme_S_L__202311.csv");
    }

    #[test]
    fn test_export_to_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export_contasol.csv");
        ContasolExporter::default().export_to_path(&sample(), &path).unwrap();
        assert!(std::fs::read_to_string(path).unwrap().starts_with("fecha;diario"));
    }
}
