//! Spanish indirect tax (IVA/IGIC) and IRPF withholding calculations

pub mod irpf;
pub mod vat;

pub use irpf::*;
pub use vat::*;
