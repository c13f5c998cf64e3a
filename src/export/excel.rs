//! Legacy Excel account listing (one row per third-party account)

use bigdecimal::{BigDecimal, ToPrimitive};
use rust_xlsxwriter::{Format, Workbook};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::ingest::InvoiceDetails;
use crate::ledger::account_title;
use crate::tax::TaxScheme;
use crate::types::LedgerResult;

/// Header row of the listing
pub const ACCOUNT_LISTING_COLUMNS: [&str; 17] = [
    "Cuenta",
    "Título de la cuenta",
    "Saldo",
    "Tipo de identificación fiscal",
    "Número de identificación fiscal",
    "Tipo de impuesto (1=IVA, 2=IGIC)",
    "Nombre comercial",
    "Domicilio, Tipo de vía",
    "Domicilio, Nombre vía",
    "Domicilio, Número",
    "C.Postal",
    "Población",
    "Provincia",
    "Código de país (España=724)",
    "Teléfono",
    "Móvil",
    "Fax",
];

/// ISO 3166 numeric code for Spain
pub const SPAIN_COUNTRY_CODE: &str = "724";

const SUPPLIER_ACCOUNT: &str = "400";

/// One row of the account listing
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AccountRecord {
    pub account_code: String,
    pub title: String,
    pub balance: BigDecimal,
    pub tax_id_type: String,
    pub tax_id: String,
    pub tax_scheme: Option<TaxScheme>,
    pub trade_name: String,
    pub street_type: String,
    pub street_name: String,
    pub street_number: String,
    pub postal_code: String,
    pub city: String,
    pub province: String,
    pub country_code: String,
    pub phone: String,
    pub mobile: String,
    pub fax: String,
}

impl AccountRecord {
    /// Supplier account for an extracted invoice; the balance is the invoice total
    pub fn supplier(details: &InvoiceDetails) -> Self {
        let trade_name = details.supplier_name.clone().unwrap_or_default();
        let title = if trade_name.is_empty() {
            account_title(SUPPLIER_ACCOUNT).unwrap_or_default().to_string()
        } else {
            trade_name.clone()
        };

        Self {
            account_code: SUPPLIER_ACCOUNT.to_string(),
            title,
            balance: details.total.clone().unwrap_or_default(),
            tax_id_type: if details.supplier_tax_id.is_some() { "NIF".to_string() } else { String::new() },
            tax_id: details.supplier_tax_id.clone().unwrap_or_default(),
            tax_scheme: Some(details.tax_scheme),
            trade_name,
            country_code: SPAIN_COUNTRY_CODE.to_string(),
            ..Self::default()
        }
    }

    /// Text cells keyed by column; balance and tax scheme are numeric
    fn text_columns(&self) -> [(u16, &str); 15] {
        [
            (0, self.account_code.as_str()),
            (1, self.title.as_str()),
            (3, self.tax_id_type.as_str()),
            (4, self.tax_id.as_str()),
            (6, self.trade_name.as_str()),
            (7, self.street_type.as_str()),
            (8, self.street_name.as_str()),
            (9, self.street_number.as_str()),
            (10, self.postal_code.as_str()),
            (11, self.city.as_str()),
            (12, self.province.as_str()),
            (13, self.country_code.as_str()),
            (14, self.phone.as_str()),
            (15, self.mobile.as_str()),
            (16, self.fax.as_str()),
        ]
    }
}

/// Render the records as an `.xlsx` workbook
pub fn write_account_listing(records: &[AccountRecord]) -> LedgerResult<Vec<u8>> {
    let mut workbook = Workbook::new();
    let header = Format::new().set_bold();
    let money = Format::new().set_num_format("#,##0.00");

    let sheet = workbook.add_worksheet();
    sheet.set_name("Cuentas")?;
    for (col, title) in ACCOUNT_LISTING_COLUMNS.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *title, &header)?;
    }

    for (index, record) in records.iter().enumerate() {
        let row = index as u32 + 1;
        for (col, value) in record.text_columns() {
            sheet.write_string(row, col, value)?;
        }
        sheet.write_number_with_format(row, 2, record.balance.to_f64().unwrap_or_default(), &money)?;
        if let Some(scheme) = record.tax_scheme {
            sheet.write_number(row, 5, scheme.code())?;
        }
    }
    sheet.autofit();

    let bytes = workbook.save_to_buffer()?;
    info!(records = records.len(), bytes = bytes.len(), "account listing written");
    Ok(bytes)
}
