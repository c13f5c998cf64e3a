//! JSON and CSV invoice payloads

use chrono::NaiveDate;
use csv::{ReaderBuilder, Trim};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::amount;
use crate::ingest::extractor::parse_date;
use crate::tax::VatRate;
use crate::types::{InvoiceLine, LedgerError, LedgerResult};

/// Wire shape of one invoice:
/// `{fecha, concepto, importe[, tipo_iva, numero_factura, proveedor]}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvoiceRequest {
    pub fecha: Option<String>,
    pub concepto: Option<String>,
    pub importe: Option<Value>,
    /// Fraction (0.21), percentage (21, "21%") or category label ("Reducido")
    #[serde(default)]
    pub tipo_iva: Option<Value>,
    #[serde(default)]
    pub numero_factura: Option<String>,
    #[serde(default)]
    pub proveedor: Option<String>,
}

impl InvoiceRequest {
    /// Validate the request and convert it into an invoice line
    pub fn into_line(self) -> LedgerResult<InvoiceLine> {
        let fecha = required(self.fecha, "fecha")?;
        let concepto = required(self.concepto, "concepto")?;
        let importe = self
            .importe
            .filter(|v| !v.is_null())
            .ok_or_else(|| missing("importe"))?;

        let date = parse_request_date(&fecha)?;
        let mut line = InvoiceLine::new(date, concepto, amount::from_json(&importe)?)?;

        if let Some(rate) = self.tipo_iva.as_ref().map(parse_rate).transpose()? {
            line = line.with_tax_rate(rate.fraction().clone());
        }
        if let Some(number) = optional(self.numero_factura) {
            line = line.with_reference(number);
        }
        if let Some(name) = optional(self.proveedor) {
            line = line.with_counterparty(name);
        }
        Ok(line)
    }
}

fn missing(field: &str) -> LedgerError {
    LedgerError::Validation(format!("missing field '{field}'"))
}

fn optional(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn required(value: Option<String>, field: &str) -> LedgerResult<String> {
    optional(value).ok_or_else(|| missing(field))
}

/// ISO dates first, then the formats printed on invoices
pub fn parse_request_date(raw: &str) -> LedgerResult<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .ok()
        .or_else(|| parse_date(raw))
        .ok_or_else(|| LedgerError::InvalidDate(format!("'{raw}' is not a valid date")))
}

fn parse_rate(value: &Value) -> LedgerResult<VatRate> {
    match value {
        Value::Number(number) => VatRate::parse(&number.to_string()),
        Value::String(text) => VatRate::parse(text),
        other => Err(LedgerError::InvalidTaxRate(format!(
            "expected a number or label, found {other}"
        ))),
    }
}

/// A single request object or an array of them
pub fn parse_json(bytes: &[u8]) -> LedgerResult<Vec<InvoiceLine>> {
    let value: Value = serde_json::from_slice(bytes)?;
    let requests: Vec<InvoiceRequest> = match value {
        Value::Array(items) => items
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<_, _>>()?,
        Value::Object(_) => vec![serde_json::from_value(value)?],
        _ => {
            return Err(LedgerError::MalformedDocument(
                "expected an invoice object or an array of invoices".to_string(),
            ))
        }
    };

    if requests.is_empty() {
        return Err(LedgerError::Validation("no invoices in document".to_string()));
    }
    requests.into_iter().map(InvoiceRequest::into_line).collect()
}

/// Spreadsheet export with a `fecha;concepto;importe[;tipo_iva;numero_factura;proveedor]` header.
/// `,` is accepted as separator when the header has no `;`.
pub fn parse_csv(bytes: &[u8]) -> LedgerResult<Vec<InvoiceLine>> {
    let header_line = bytes.split(|b| *b == b'\n').next().unwrap_or_default();
    let delimiter = if header_line.contains(&b';') { b';' } else { b',' };

    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .trim(Trim::All)
        .flexible(true)
        .from_reader(bytes);

    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_lowercase()).collect();
    let column = |name: &str| headers.iter().position(|h| h == name);
    let (fecha, concepto, importe) = match (column("fecha"), column("concepto"), column("importe")) {
        (Some(f), Some(c), Some(i)) => (f, c, i),
        _ => {
            return Err(LedgerError::MalformedDocument(
                "CSV header must contain fecha, concepto and importe".to_string(),
            ))
        }
    };
    let tipo_iva = column("tipo_iva");
    let numero_factura = column("numero_factura");
    let proveedor = column("proveedor");

    let mut lines = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        let text = |index: usize| record.get(index).map(str::to_string);

        let request = InvoiceRequest {
            fecha: text(fecha),
            concepto: text(concepto),
            importe: text(importe).map(Value::String),
            tipo_iva: tipo_iva
                .and_then(text)
                .filter(|v| !v.is_empty())
                .map(Value::String),
            numero_factura: numero_factura.and_then(text),
            proveedor: proveedor.and_then(text),
        };
        lines.push(request.into_line()?);
    }

    if lines.is_empty() {
        return Err(LedgerError::Validation("no invoices in document".to_string()));
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use serde_json::json;
    use std::str::FromStr;

    fn dec(value: &str) -> BigDecimal {
        BigDecimal::from_str(value).unwrap()
    }

    #[test]
    fn test_single_json_invoice() {
        let body = json!({"fecha": "2023-10-27", "concepto": "Servicios de asesoría fiscal", "importe": 242.00});
        let lines = parse_json(body.to_string().as_bytes()).unwrap();

        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].date(), NaiveDate::from_ymd_opt(2023, 10, 27).unwrap());
        assert_eq!(lines[0].amount(), &dec("242"));
        assert_eq!(lines[0].tax_rate(), None);
    }

    #[test]
    fn test_json_array_with_rates() {
        let body = json!([
            {"fecha": "2024-01-15", "concepto": "Hosting", "importe": "12,10", "tipo_iva": 21},
            {"fecha": "15/01/2024", "concepto": "Libros", "importe": 104, "tipo_iva": "Superreducido"},
            {"fecha": "2024-01-15", "concepto": "Seguro", "importe": 50, "tipo_iva": 0.0}
        ]);
        let lines = parse_json(body.to_string().as_bytes()).unwrap();

        assert_eq!(lines[0].amount(), &dec("12.10"));
        assert_eq!(lines[0].tax_rate(), Some(&dec("0.21")));
        assert_eq!(lines[1].tax_rate(), Some(&dec("0.04")));
        assert_eq!(lines[2].tax_rate(), Some(&dec("0")));
    }

    #[test]
    fn test_missing_fields_are_reported() {
        let body = json!({"fecha": "2023-10-27", "importe": 10});
        let err = parse_json(body.to_string().as_bytes()).unwrap_err();
        assert!(matches!(&err, LedgerError::Validation(msg) if msg.contains("concepto")));

        let body = json!({"fecha": "2023-10-27", "concepto": "Luz"});
        let err = parse_json(body.to_string().as_bytes()).unwrap_err();
        assert!(matches!(&err, LedgerError::Validation(msg) if msg.contains("importe")));
    }

    #[test]
    fn test_invalid_values() {
        let bad_date = json!({"fecha": "2023-13-45", "concepto": "Luz", "importe": 10});
        assert!(matches!(
            parse_json(bad_date.to_string().as_bytes()),
            Err(LedgerError::InvalidDate(_))
        ));

        let negative = json!({"fecha": "2023-10-27", "concepto": "Luz", "importe": -10});
        assert!(matches!(
            parse_json(negative.to_string().as_bytes()),
            Err(LedgerError::InvalidAmount(_))
        ));

        assert!(matches!(parse_json(b"[]"), Err(LedgerError::Validation(_))));
        assert!(matches!(parse_json(b"42"), Err(LedgerError::MalformedDocument(_))));
        assert!(matches!(parse_json(b"{not json"), Err(LedgerError::Json(_))));
    }

    #[test]
    fn test_amounts_rounding_to_zero_or_out_of_range() {
        let tiny = json!({"fecha": "2023-10-27", "concepto": "Hosting", "importe": 0.004});
        assert!(matches!(
            parse_json(tiny.to_string().as_bytes()),
            Err(LedgerError::InvalidAmount(_))
        ));

        let huge = json!({"fecha": "2023-10-27", "concepto": "Hosting", "importe": "1e400"});
        assert!(matches!(
            parse_json(huge.to_string().as_bytes()),
            Err(LedgerError::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_reference_and_supplier_fields() {
        let body = json!({
            "fecha": "2023-11-01", "concepto": "Alquiler local", "importe": 1210,
            "numero_factura": " R-11 ", "proveedor": "Fincas Sol"
        });
        let lines = parse_json(body.to_string().as_bytes()).unwrap();
        assert_eq!(lines[0].reference(), Some("R-11"));
        assert_eq!(lines[0].counterparty(), Some("Fincas Sol"));

        let csv = "fecha;concepto;importe;numero_factura;proveedor\n2024-02-01;Luz;60,50;F-9;\n";
        let lines = parse_csv(csv.as_bytes()).unwrap();
        assert_eq!(lines[0].reference(), Some("F-9"));
        assert_eq!(lines[0].counterparty(), None);
    }

    #[test]
    fn test_sub_cent_json_amount_keeps_its_digits() {
        let lines = parse_json(br#"{"fecha":"2023-10-27","concepto":"Hosting","importe":10.005}"#).unwrap();
        assert_eq!(lines[0].amount(), &dec("10.005"));
    }

    #[test]
    fn test_csv_with_semicolons() {
        let csv = "fecha;concepto;importe;tipo_iva\n2024-02-01;Luz Iberdrola;60,50;21%\n\n2024-02-03;Google Ads;30,25;\n";
        let lines = parse_csv(csv.as_bytes()).unwrap();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].amount(), &dec("60.50"));
        assert_eq!(lines[0].tax_rate(), Some(&dec("0.21")));
        assert_eq!(lines[1].tax_rate(), None);
    }

    #[test]
    fn test_csv_with_commas_and_wrong_header() {
        let lines = parse_csv(b"Fecha,Concepto,Importe\n2024-02-01,Hosting,12.10\n").unwrap();
        assert_eq!(lines[0].concept(), "Hosting");

        assert!(matches!(
            parse_csv(b"date,description,amount\n2024-02-01,Hosting,12.10\n"),
            Err(LedgerError::MalformedDocument(_))
        ));
    }
}
