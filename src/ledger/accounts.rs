//! PGC chart of accounts used by the generator and the account listing

use serde::{Deserialize, Serialize};

use crate::tax::{VatAccounts, WithholdingAccounts};
use crate::types::OperationKind;

/// Standard PGC accounts the service knows a title for. Titles are the
/// official PGC ones; the default rule table posts advisory and freelance
/// fees to 622 as well, so 622 in a listing does not imply repairs.
pub const PGC_ACCOUNTS: &[(&str, &str)] = &[
    ("217", "Equipos para procesos de información"),
    ("218", "Elementos de transporte"),
    ("400", "Proveedores"),
    ("410", "Acreedores por prestaciones de servicios"),
    ("430", "Clientes"),
    ("472", "Hacienda Pública, IVA soportado"),
    ("473", "Hacienda Pública, retenciones y pagos a cuenta"),
    ("4751", "Hacienda Pública, acreedora por retenciones practicadas"),
    ("477", "Hacienda Pública, IVA repercutido"),
    ("570", "Caja, euros"),
    ("572", "Bancos e instituciones de crédito c/c vista, euros"),
    ("600", "Compras de mercaderías"),
    ("621", "Arrendamientos y cánones"),
    ("622", "Reparaciones y conservación"),
    ("623", "Servicios de profesionales independientes"),
    ("627", "Publicidad, propaganda y relaciones públicas"),
    ("628", "Suministros"),
    ("629", "Otros servicios"),
    ("640", "Sueldos y salarios"),
    ("700", "Ventas de mercaderías"),
];

/// Title of an account or of the closest parent account.
/// Subaccounts resolve through their prefix: "4300001" -> "Clientes".
pub fn account_title(account_code: &str) -> Option<&'static str> {
    let digits: String = account_code.chars().filter(|c| c.is_ascii_digit()).collect();
    (3..=digits.len()).rev().find_map(|len| {
        PGC_ACCOUNTS
            .iter()
            .find(|(code, _)| *code == &digits[..len])
            .map(|(_, title)| *title)
    })
}

/// Counterpart and tax accounts injected into the generator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerAccounts {
    /// Bank account settling the invoice
    pub bank: String,
    /// Input/output VAT accounts
    pub vat: VatAccounts,
    /// IRPF withholding accounts
    pub withholding: WithholdingAccounts,
}

impl Default for LedgerAccounts {
    fn default() -> Self {
        Self {
            bank: "572".to_string(),
            vat: VatAccounts::default(),
            withholding: WithholdingAccounts::default(),
        }
    }
}

impl LedgerAccounts {
    /// Concept written on the bank row
    pub fn settlement_concept(kind: OperationKind) -> &'static str {
        match kind {
            OperationKind::Expense | OperationKind::Asset => "Pago banco",
            OperationKind::Income => "Cobro banco",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_titles() {
        assert_eq!(account_title("572"), Some("Bancos e instituciones de crédito c/c vista, euros"));
        assert_eq!(account_title("4300001"), Some("Clientes"));
        assert_eq!(account_title("4751.01"), Some("Hacienda Pública, acreedora por retenciones practicadas"));
        assert_eq!(account_title("4751.02"), Some("Hacienda Pública, acreedora por retenciones practicadas"));
        assert_eq!(account_title("622"), Some("Reparaciones y conservación"));
        assert_eq!(account_title("999"), None);
        assert_eq!(account_title("47"), None);
    }

    #[test]
    fn test_default_accounts() {
        let accounts = LedgerAccounts::default();
        assert_eq!(accounts.bank, "572");
        assert_eq!(accounts.vat.input, "472");
        assert_eq!(accounts.withholding.withheld, "4751.01");
        assert_eq!(accounts.withholding.rent, "4751.02");
        assert_eq!(LedgerAccounts::settlement_concept(OperationKind::Income), "Cobro banco");
    }
}
