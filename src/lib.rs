//! # IAFiscal asientos
//!
//! Turns invoices into double-entry ledger entries (asientos) following the
//! Spanish chart of accounts (PGC) and exports them for Contasol.
//!
//! ## Features
//!
//! - **Classification**: keyword rules mapping invoice concepts to PGC accounts
//! - **Entry generation**: VAT split, IRPF withholding and bank settlement rows
//! - **Export**: `;`-separated Contasol CSV and an Excel account listing
//! - **Ingestion**: PDF text, OCR on images, JSON and CSV payloads
//! - **HTTP service**: blocking tiny_http server exposing the pipeline
//!
//! ## Quick Start
//!
//! ```rust
//! use iafiscal_asientos::{EntryGenerator, InvoiceLine};
//! use bigdecimal::BigDecimal;
//! use chrono::NaiveDate;
//!
//! let generator: EntryGenerator = EntryGenerator::default();
//! let date = NaiveDate::from_ymd_opt(2023, 10, 27).unwrap();
//! let line = InvoiceLine::new(date, "Servicios de asesoría fiscal", BigDecimal::from(242)).unwrap();
//!
//! let asiento = generator.generate_auto(&line).unwrap();
//! assert_eq!(asiento.len(), 3);
//! assert!(asiento.is_balanced());
//! ```

pub mod amount;
pub mod config;
pub mod export;
pub mod ingest;
pub mod ledger;
pub mod rules;
pub mod server;
pub mod tax;
pub mod traits;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use export::{ContasolExporter, ExportOptions};
pub use ledger::*;
pub use rules::{ClassificationRule, RuleTable};
pub use tax::*;
pub use traits::*;
pub use types::*;
