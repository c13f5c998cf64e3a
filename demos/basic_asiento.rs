//! Classify a few invoices, print their asientos and the Contasol file

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use iafiscal_asientos::{ContasolExporter, EntryGenerator, InvoiceLine};
use std::str::FromStr;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("IAFiscal - Asientos de ejemplo\n");

    let generator: EntryGenerator = EntryGenerator::default();
    let date = NaiveDate::from_ymd_opt(2023, 10, 27).ok_or("invalid date")?;

    let invoices = [
        ("Servicios de asesoría fiscal", "242.00"),
        ("Factura Iberdrola luz octubre", "60.50"),
        ("Venta de servicios web", "1210.00"),
        ("Freelance autónomo diseño IRPF", "121.00"),
    ];

    let mut asientos = Vec::new();
    for (concept, amount) in invoices {
        let line = InvoiceLine::new(date, concept, BigDecimal::from_str(amount)?)?;
        let asiento = generator.generate_auto(&line)?;

        println!("{concept} ({amount} EUR)");
        for entry in &asiento.entries {
            println!(
                "  {:<6} {:<32} {:>10} {:>10}",
                entry.account_code, entry.concept, entry.debit, entry.credit
            );
        }
        println!();
        asientos.push(asiento);
    }

    // Unknown concepts are rejected unless a fallback account is configured
    let dinner = InvoiceLine::new(date, "Cena con clientes", BigDecimal::from(80))?;
    if let Err(e) = generator.generate_auto(&dinner) {
        println!("Rechazada: {e}\n");
    }

    let csv = ContasolExporter::default().export(&asientos)?;
    println!("export_contasol.csv:\n{}", String::from_utf8(csv)?);

    Ok(())
}
