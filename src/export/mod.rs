//! Output formats: the Contasol ledger CSV and the legacy Excel account listing

pub mod contasol;
pub mod excel;

pub use contasol::*;
pub use excel::*;
