//! Text layer extraction for PDF invoices

use tracing::{info, warn};

use crate::types::{LedgerError, LedgerResult};

/// Fewest non-whitespace characters expected from a PDF with a real text layer
pub const MIN_TEXT_CHARS: usize = 30;

/// Extract the text of a PDF. Scanned documents, with little or no text,
/// are rejected as malformed.
pub fn extract_text(bytes: &[u8], min_chars: usize) -> LedgerResult<String> {
    let text = pdf_extract::extract_text_from_mem(bytes).map_err(|e| {
        warn!(error = %e, "pdf-extract failed");
        LedgerError::MalformedDocument(format!("unreadable PDF: {e}"))
    })?;

    let meaningful = text.chars().filter(|c| !c.is_whitespace()).count();
    if meaningful < min_chars {
        info!(chars = meaningful, "PDF text too short, likely scanned");
        return Err(LedgerError::MalformedDocument(
            "PDF has no text layer; scanned invoices must be uploaded as images".to_string(),
        ));
    }

    info!(chars = meaningful, "PDF text extracted");
    Ok(text)
}
