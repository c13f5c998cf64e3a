//! IVA categories, gross/net splits and IRPF withholding

use bigdecimal::BigDecimal;
use iafiscal_asientos::{VatCalculation, VatCategory, VatRate, Withholding};
use std::str::FromStr;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("IAFiscal - Cálculos de IVA\n");

    let gross = BigDecimal::from_str("242.00")?;
    for category in [
        VatCategory::General,
        VatCategory::Reduced,
        VatCategory::SuperReduced,
        VatCategory::Exempt,
    ] {
        let split = VatCalculation::reverse_calculate(&gross, category.rate());
        println!(
            "{:<20} base {:>8}  cuota {:>7}  total {:>8}",
            category.label(),
            split.base_amount,
            split.tax_amount,
            split.total_amount
        );
    }
    println!();

    // Sub-cent totals are rounded half-up before the split
    let split = VatCalculation::reverse_calculate(&BigDecimal::from_str("10.005")?, VatRate::parse("21%")?);
    println!(
        "10.005 al 21%: base {} + cuota {} = {}\n",
        split.base_amount, split.tax_amount, split.total_amount
    );

    let base = BigDecimal::from(100);
    let forward = VatCalculation::calculate(&base, VatRate::parse("General (21%)")?);
    let rate = Withholding::parse_rate("IRPF (15%)").ok_or("no IRPF rate")?;
    let withholding = Withholding::calculate(&base, &rate)?;
    println!(
        "Profesional: base {} IVA {} retención {} a pagar {}",
        forward.base_amount,
        forward.tax_amount,
        withholding.amount,
        &forward.total_amount - &withholding.amount
    );

    Ok(())
}
