//! Concept patterns for the classified row of an asiento

use regex::{Captures, Regex};

use crate::amount::format_amount;
use crate::types::InvoiceLine;

/// Written in place of a placeholder with no value
pub const MISSING_FIELD: &str = "[n/d]";

const SHORT_NAME_LEN: usize = 20;

/// Fill the `{placeholder}` fields of a concept pattern from an invoice line.
///
/// Placeholders: `concepto`, `fecha` (dd/mm/yyyy), `fecha_corta` (dd/mm/yy),
/// `mes`, `ano`, `numero_factura`, `proveedor`, `proveedor_corto` (first 20
/// characters) and `importe`. Unknown placeholders and values the line does
/// not carry render as `[n/d]`. A pattern that renders blank falls back to
/// the invoice concept.
pub fn render_concept(template: &str, line: &InvoiceLine) -> String {
    let Ok(re) = Regex::new(r"\{(\w+)\}") else {
        return line.concept().to_string();
    };
    let rendered = re
        .replace_all(template, |caps: &Captures| {
            placeholder(&caps[1], line).unwrap_or_else(|| MISSING_FIELD.to_string())
        })
        .into_owned();

    let collapsed = rendered.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        line.concept().to_string()
    } else {
        collapsed
    }
}

fn placeholder(name: &str, line: &InvoiceLine) -> Option<String> {
    let date = line.date();
    match name {
        "concepto" => Some(line.concept().to_string()),
        "fecha" => Some(date.format("%d/%m/%Y").to_string()),
        "fecha_corta" => Some(date.format("%d/%m/%y").to_string()),
        "mes" => Some(date.format("%m").to_string()),
        "ano" | "año" => Some(date.format("%Y").to_string()),
        "numero_factura" => line.reference().map(str::to_string),
        "proveedor" => line.counterparty().map(str::to_string),
        "proveedor_corto" => line
            .counterparty()
            .map(|name| name.chars().take(SHORT_NAME_LEN).collect::<String>().trim_end().to_string()),
        "importe" => Some(format_amount(line.amount(), true)),
        _ => None,
    }
}
