//! OCR through the Tesseract command-line tool

use std::io::{ErrorKind, Write};
use std::process::Command;

use tracing::{debug, info};

use crate::traits::TextRecognizer;
use crate::types::{LedgerError, LedgerResult};

/// Runs `tesseract <image> stdout -l <language>` on a temporary copy of the image
#[derive(Debug, Clone)]
pub struct TesseractCli {
    command: String,
    language: String,
}

impl Default for TesseractCli {
    fn default() -> Self {
        Self::new("tesseract", "spa")
    }
}

impl TesseractCli {
    pub fn new(command: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            language: language.into(),
        }
    }
}

impl TextRecognizer for TesseractCli {
    fn recognize(&self, image: &[u8], extension: &str) -> LedgerResult<String> {
        let mut file = tempfile::Builder::new()
            .prefix("factura-")
            .suffix(&format!(".{extension}"))
            .tempfile()?;
        file.write_all(image)?;
        file.flush()?;

        debug!(command = %self.command, path = %file.path().display(), "running OCR");
        let output = Command::new(&self.command)
            .arg(file.path())
            .arg("stdout")
            .args(["-l", self.language.as_str()])
            .output()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => {
                    LedgerError::Ocr(format!("OCR binary '{}' not found", self.command))
                }
                _ => LedgerError::Ocr(format!("failed to run '{}': {e}", self.command)),
            })?;

        if !output.status.success() {
            return Err(LedgerError::Ocr(format!(
                "'{}' exited with {}: {}",
                self.command,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        info!(chars = text.len(), "OCR finished");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_binary_is_an_ocr_error() {
        let ocr = TesseractCli::new("definitely-not-tesseract-xyz", "spa");
        let result = ocr.recognize(b"\x89PNG", "png");
        assert!(matches!(result, Err(LedgerError::Ocr(msg)) if msg.contains("not found")));
    }
}
