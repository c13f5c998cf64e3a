//! Keyword-anchored field extraction from OCR or PDF text

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::amount::parse_amount;
use crate::tax::TaxScheme;
use crate::types::{InvoiceLine, LedgerError, LedgerResult, ReviewReason};
use crate::utils::MAX_CONCEPT_LEN;

/// Amount as printed on Spanish and English invoices: `1.234,56`, `1,234.56`, `12,50`
const AMOUNT: &str = r"([-+]?\d{1,3}(?:[.,\s]\d{3})*[.,]\d{2}|[-+]?\d+[.,]\d{2})";

/// Fields read off an invoice; anything not found stays `None`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InvoiceDetails {
    pub invoice_date: Option<NaiveDate>,
    pub invoice_number: Option<String>,
    pub supplier_tax_id: Option<String>,
    pub supplier_name: Option<String>,
    pub concept: Option<String>,
    pub taxable_base: Option<BigDecimal>,
    /// Printed VAT percentage as a fraction
    pub vat_rate: Option<BigDecimal>,
    pub vat_amount: Option<BigDecimal>,
    /// Withheld IRPF, always positive
    pub irpf_amount: Option<BigDecimal>,
    pub total: Option<BigDecimal>,
    pub tax_scheme: TaxScheme,
    /// Whitespace-collapsed document text
    #[serde(skip)]
    pub text: String,
}

/// Extract every known field from the document text
pub fn extract(text: &str) -> InvoiceDetails {
    let details = InvoiceDetails {
        invoice_date: extract_invoice_date(text),
        invoice_number: extract_invoice_number(text),
        supplier_tax_id: extract_supplier_tax_id(text),
        supplier_name: extract_supplier_name(text),
        concept: extract_concept(text),
        taxable_base: extract_taxable_base(text),
        vat_rate: extract_vat_rate(text),
        vat_amount: extract_vat_amount(text),
        irpf_amount: extract_irpf_amount(text),
        total: extract_total(text),
        tax_scheme: extract_tax_scheme(text),
        text: flatten(text),
    };
    details.check_consistency();
    debug!(date = ?details.invoice_date, total = ?details.total, supplier = ?details.supplier_name, "invoice fields extracted");
    details
}

impl InvoiceDetails {
    /// Gross amount the ledger entry is built from. `Total a pagar` is net of
    /// withholding, so the withheld IRPF is added back.
    pub fn gross_amount(&self) -> Option<BigDecimal> {
        let total = self.total.clone()?;
        Some(match &self.irpf_amount {
            Some(irpf) => total + irpf,
            None => total,
        })
    }

    /// Concept for classification: the printed concept, else the supplier, else the text
    pub fn concept_or_fallback(&self) -> String {
        self.concept
            .clone()
            .or_else(|| self.supplier_name.clone())
            .unwrap_or_else(|| self.text.chars().take(MAX_CONCEPT_LEN).collect())
    }

    /// Convert into an invoice line; date and total are required. The
    /// printed rate, withholding, number and supplier travel as hints.
    pub fn to_invoice_line(&self) -> LedgerResult<InvoiceLine> {
        let date = self.invoice_date.ok_or_else(|| {
            LedgerError::MalformedDocument("no invoice date found in document".to_string())
        })?;
        let amount = self.gross_amount().ok_or_else(|| {
            LedgerError::MalformedDocument("no invoice total found in document".to_string())
        })?;

        let mut line = InvoiceLine::new(date, self.concept_or_fallback(), amount)?;
        if let Some(rate) = &self.vat_rate {
            line = line.with_tax_rate(rate.clone());
        }
        if let Some(irpf) = &self.irpf_amount {
            line = line.with_withholding(irpf.clone());
        }
        if let Some(number) = &self.invoice_number {
            line = line.with_reference(number.clone());
        }
        if let Some(name) = &self.supplier_name {
            line = line.with_counterparty(name.clone());
        }
        if !self.check_consistency() {
            line = line.with_review(ReviewReason::TotalMismatch);
        }
        Ok(line)
    }

    /// False when the printed base, VAT and withholding miss the printed
    /// total by more than five cents
    pub fn check_consistency(&self) -> bool {
        if let (Some(base), Some(vat), Some(total)) = (&self.taxable_base, &self.vat_amount, &self.total) {
            let mut expected = base + vat;
            if let Some(irpf) = &self.irpf_amount {
                expected -= irpf;
            }
            if (&expected - total).abs() > BigDecimal::new(5.into(), 2) {
                warn!(%base, %vat, %total, "base and VAT do not add up to the invoice total");
                return false;
            }
        }
        true
    }
}

/// Parse `dd/mm/yyyy`, `dd-mm-yy`, `dd.mm.yyyy` or `yyyy-mm-dd`.
/// Two-digit years map to 1969-2068.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let normalized: String = raw
        .trim()
        .chars()
        .map(|c| if matches!(c, '/' | '.' | ' ') { '-' } else { c })
        .collect();
    let parts: Vec<&str> = normalized.split('-').filter(|p| !p.is_empty()).collect();
    let [first, _, last] = parts.as_slice() else {
        return None;
    };
    let joined = parts.join("-");

    if first.len() == 4 {
        NaiveDate::parse_from_str(&joined, "%Y-%m-%d").ok()
    } else if last.len() == 4 {
        NaiveDate::parse_from_str(&joined, "%d-%m-%Y")
            .or_else(|_| NaiveDate::parse_from_str(&joined, "%m-%d-%Y"))
            .ok()
    } else if last.len() == 2 {
        NaiveDate::parse_from_str(&joined, "%d-%m-%y").ok()
    } else {
        None
    }
}

fn flatten(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn first_amount(text: &str, keywords: &str) -> Option<BigDecimal> {
    let re = Regex::new(&format!(r"(?i)(?:{keywords})[:\s€$£%]*{AMOUNT}")).ok()?;
    let found = re.captures_iter(text).find_map(|c| parse_amount(&c[1]).ok());
    found
}

fn extract_invoice_date(text: &str) -> Option<NaiveDate> {
    let date = r"(\d{1,2}[-/.]\d{1,2}[-/.]\d{2,4}|\d{4}[-/.]\d{1,2}[-/.]\d{1,2})";
    let anchored = Regex::new(&format!(
        r"(?i)(?:fecha(?: de(?: la)?)? factura|factura de fecha|fecha de emisi[oó]n|invoice date|date of invoice|fecha)[:\s]*{date}"
    ))
    .ok()?;
    if let Some(found) = anchored.captures_iter(text).find_map(|c| parse_date(&c[1])) {
        return Some(found);
    }

    // Any date in the document
    let re = Regex::new(date).ok()?;
    let found = re.captures_iter(text).find_map(|c| parse_date(&c[1]));
    found
}

fn extract_invoice_number(text: &str) -> Option<String> {
    let re = Regex::new(
        r"(?i)(?:n[uú]mero de factura|factura\s*n[ºo°.]*|invoice\s+no\.?|fra\.?\s*n[ºo°.]*)\s*:?\s*([A-Z0-9][A-Z0-9/-]*[A-Z0-9])",
    )
    .ok()?;
    re.captures(text).map(|c| c[1].to_uppercase())
}

fn extract_supplier_tax_id(text: &str) -> Option<String> {
    let re = Regex::new(
        r"(?i)(?:N\.I\.F\.|NIF|CIF|VAT\s+ID|VAT\s+No)(\s*cliente)?[:\s]*([A-Z][\s-]?\d{7,8}[\s-]?[A-Z\d]|[A-Z]{2}[\s-]?[A-Z]?\d{8,9}|\d{8}[\s-]?[A-Z])\b",
    )
    .ok()?;
    let found = re
        .captures_iter(text)
        .find(|c| c.get(1).is_none())
        .map(|c| {
            c[2].chars()
                .filter(|ch| !ch.is_whitespace() && *ch != '-')
                .collect::<String>()
                .to_uppercase()
        });
    found
}

fn extract_supplier_name(text: &str) -> Option<String> {
    let anchored = Regex::new(
        r"(?i)(?:datos del emisor|emisor|proveedor|raz[oó]n social|supplier|issued by)\s*:\s*([^\n]{2,99})",
    )
    .ok()?;
    if let Some(caps) = anchored.captures(text) {
        let name = flatten(&caps[1]).trim_matches(|c: char| c == '.' || c == ',' || c == ':').to_string();
        if !name.is_empty() {
            return Some(name);
        }
    }

    // First company-like line before the customer block
    let customer_at = text.to_lowercase().find("cliente").unwrap_or(text.len());
    let head = text.get(..customer_at).unwrap_or(text);
    let company = Regex::new(r"(?m)^\s*([A-ZÁÉÍÓÚÑ0-9][A-ZÁÉÍÓÚÑ0-9 .,&'-]*?\s+S\.?\s?[LAC]\.?(?:[UP]\.?)?)\s*$").ok()?;
    company.captures(head).map(|c| flatten(&c[1]))
}

fn extract_concept(text: &str) -> Option<String> {
    let re = Regex::new(r"(?im)^\s*(?:conceptos?|descripci[oó]n|description)\s*:\s*([^\n]+)").ok()?;
    let trailing_amount = Regex::new(r"[:\s]*[-+]?\d[\d.,]*\s*(?:€|EUR)?\s*$").ok()?;

    let raw = re.captures(text)?;
    let cleaned = raw[1].trim().trim_start_matches(['-', '*', '•', ' ']);
    let concept = trailing_amount.replace(cleaned, "").trim().to_string();
    (!concept.is_empty()).then_some(concept)
}

fn extract_taxable_base(text: &str) -> Option<BigDecimal> {
    first_amount(text, r"base imponible|importe base|base gravable|\bsubtotal|net amount|taxable amount")
}

fn extract_vat_rate(text: &str) -> Option<BigDecimal> {
    let re = Regex::new(r"(?i)\b(?:IVA|IGIC|VAT)\s*\(?\s*(\d{1,2}(?:[.,]\d{1,2})?)\s*%").ok()?;
    let caps = re.captures(text)?;
    let percent = parse_amount(&caps[1]).ok()?;
    Some(percent / BigDecimal::from(100))
}

fn extract_vat_amount(text: &str) -> Option<BigDecimal> {
    first_amount(
        text,
        r"total iva|cuota(?: de)? iva|cuota igic|\b(?:iva|igic)\s*\(\s*\d{1,2}(?:[.,]\d{1,2})?\s*%\s*\)|iva repercutido|iva soportado|vat amount",
    )
}

fn extract_irpf_amount(text: &str) -> Option<BigDecimal> {
    first_amount(
        text,
        r"retenci[oó]n(?:\s+s/)?\s*irpf(?:\s*\(\s*\d{1,2}(?:[.,]\d+)?\s*%\s*\))?|irpf retenido|ret\.\s*irpf|withholding tax",
    )
    .map(|amount| amount.abs())
}

fn extract_total(text: &str) -> Option<BigDecimal> {
    // The grand total is usually the last one printed
    let re = Regex::new(&format!(
        r"(?i)(?:total factura|total a pagar|importe total|invoice total|total amount|\btotal)[:\s€$£]*{AMOUNT}"
    ))
    .ok()?;
    re.captures_iter(text)
        .filter_map(|c| parse_amount(&c[1]).ok())
        .last()
}

fn extract_tax_scheme(text: &str) -> TaxScheme {
    if text.to_uppercase().contains("IGIC") {
        TaxScheme::Igic
    } else {
        TaxScheme::Iva
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    const ELECTRICITY: &str = "
    FACTURA ELECTRÓNICA
    Número de factura: FE2023/00815-A
    Fecha factura: 25-10-2023

    Datos del emisor:
    ELECTRA ENERGIA S.A.U.
    NIF: A-12345678

    Datos del cliente:
    MI EMPRESA S.L.
    NIF Cliente: B-87654321

    Concepto: Suministro de luz octubre: 150,00 €

    Base Imponible: 155,50 EUR
    IVA (21%): 32,66 EUR
    Total Factura: 188,16 EUR
    ";

    const FREELANCE: &str = "
    FREELANCER AUTONOMO
    NIF: 12345678Z
    Factura Nº: FRA-2023-10-005
    Fecha: 28/10/23

    Cliente:
    SERVICIOS PROFESIONALES INTEGRALES S.L.U.

    Subtotal: 1.000,00
    IVA (21%): 210,00
    Retención IRPF (15%): -150,00
    TOTAL A PAGAR: 1.060,00 €
    ";

    const RENT_RECEIPT: &str = "
    RECIBO ALQUILER LOCAL
    Arrendador: Inmuebles Centro S.L.
    Fecha: 01/11/2023
    Recibo Nº: ALQ-2023-11
    Concepto: Alquiler local comercial Calle Mayor 1, Madrid, mes Noviembre 2023.
    Base Imponible: 1.000,00 EUR
    IVA (21%): 210,00 EUR
    Retención IRPF (19%): -190,00 EUR
    Total a pagar: 1.020,00 EUR
    ";

    fn dec(value: &str) -> BigDecimal {
        BigDecimal::from_str(value).unwrap()
    }

    #[test]
    fn test_extracts_utility_invoice() {
        let details = extract(ELECTRICITY);

        assert_eq!(details.invoice_date, NaiveDate::from_ymd_opt(2023, 10, 25));
        assert_eq!(details.invoice_number.as_deref(), Some("FE2023/00815-A"));
        assert_eq!(details.supplier_tax_id.as_deref(), Some("A12345678"));
        assert_eq!(details.supplier_name.as_deref(), Some("ELECTRA ENERGIA S.A.U"));
        assert_eq!(details.concept.as_deref(), Some("Suministro de luz octubre"));
        assert_eq!(details.taxable_base, Some(dec("155.50")));
        assert_eq!(details.vat_rate, Some(dec("0.21")));
        assert_eq!(details.vat_amount, Some(dec("32.66")));
        assert_eq!(details.total, Some(dec("188.16")));
        assert_eq!(details.tax_scheme, TaxScheme::Iva);
    }

    #[test]
    fn test_extracts_withholding_and_adds_it_back() {
        let details = extract(FREELANCE);

        assert_eq!(details.invoice_date, NaiveDate::from_ymd_opt(2023, 10, 28));
        assert_eq!(details.supplier_tax_id.as_deref(), Some("12345678Z"));
        assert_eq!(details.taxable_base, Some(dec("1000.00")));
        assert_eq!(details.irpf_amount, Some(dec("150.00")));
        assert_eq!(details.total, Some(dec("1060.00")));
        assert_eq!(details.gross_amount(), Some(dec("1210.00")));
        assert_eq!(details.supplier_name, None);
    }

    #[test]
    fn test_invoice_line_from_details() {
        let line = extract(ELECTRICITY).to_invoice_line().unwrap();
        assert_eq!(line.concept(), "Suministro de luz octubre");
        assert_eq!(line.amount(), &dec("188.16"));
        assert_eq!(line.tax_rate(), Some(&dec("0.21")));
    }

    #[test]
    fn test_printed_withholding_travels_with_the_line() {
        let details = extract(RENT_RECEIPT);
        assert_eq!(details.irpf_amount, Some(dec("190.00")));
        assert!(details.check_consistency());

        let line = details.to_invoice_line().unwrap();
        assert_eq!(line.amount(), &dec("1210.00"));
        assert_eq!(line.withholding(), Some(&dec("190.00")));
        assert_eq!(line.tax_rate(), Some(&dec("0.21")));
        assert!(line.review().is_empty());

        let freelance = extract(FREELANCE).to_invoice_line().unwrap();
        assert_eq!(freelance.withholding(), Some(&dec("150.00")));
        assert_eq!(freelance.reference(), Some("FRA-2023-10-005"));
    }

    #[test]
    fn test_reference_and_supplier_hints() {
        let line = extract(ELECTRICITY).to_invoice_line().unwrap();
        assert_eq!(line.reference(), Some("FE2023/00815-A"));
        assert_eq!(line.counterparty(), Some("ELECTRA ENERGIA S.A.U"));
        assert_eq!(line.withholding(), None);
    }

    #[test]
    fn test_total_mismatch_flags_the_line() {
        // 155,50 + 32,66 = 188,16, not 200,00
        let text = ELECTRICITY.replace("Total Factura: 188,16", "Total Factura: 200,00");
        let details = extract(&text);
        assert!(!details.check_consistency());

        let line = details.to_invoice_line().unwrap();
        assert_eq!(line.review(), &[ReviewReason::TotalMismatch]);
    }

    #[test]
    fn test_missing_date_or_total_is_malformed() {
        let no_date = extract("Concepto: Hosting\nTotal: 12,10 €");
        assert!(matches!(no_date.to_invoice_line(), Err(LedgerError::MalformedDocument(_))));

        let no_total = extract("Fecha: 01/02/2024\nConcepto: Hosting");
        assert!(matches!(no_total.to_invoice_line(), Err(LedgerError::MalformedDocument(_))));
    }

    #[test]
    fn test_concept_falls_back_to_text() {
        let details = extract("Fecha: 01/02/2024\nHosting   anual\nTotal: 12,10");
        assert_eq!(details.concept_or_fallback(), "Fecha: 01/02/2024 Hosting anual Total: 12,10");
    }

    #[test]
    fn test_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2023, 10, 25);
        assert_eq!(parse_date("25/10/2023"), expected);
        assert_eq!(parse_date("25-10-2023"), expected);
        assert_eq!(parse_date("25.10.2023"), expected);
        assert_eq!(parse_date("2023-10-25"), expected);
        assert_eq!(parse_date("25/10/23"), expected);
        assert_eq!(parse_date("10/25/2023"), expected);
        assert_eq!(parse_date("October 25"), None);
    }

    #[test]
    fn test_igic_invoices() {
        let details = extract("Fecha: 02/03/2024\nIGIC (7%): 7,00\nTotal: 107,00");
        assert_eq!(details.tax_scheme, TaxScheme::Igic);
        assert_eq!(details.vat_rate, Some(dec("0.07")));
    }
}
