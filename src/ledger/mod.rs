//! Ledger module containing the chart of accounts and asiento generation

pub mod accounts;
pub mod asiento;
pub mod concept;
pub mod generator;

pub use accounts::*;
pub use asiento::*;
pub use concept::*;
pub use generator::*;
