//! Document ingestion: turns uploaded files into invoice lines

pub mod extractor;
pub mod ocr;
pub mod pdf;
pub mod structured;

pub use extractor::{extract, parse_date, InvoiceDetails};
pub use ocr::TesseractCli;
pub use structured::{parse_csv, parse_json, InvoiceRequest};

use std::path::Path;

use tracing::info;

use crate::traits::TextRecognizer;
use crate::types::{InvoiceLine, LedgerError, LedgerResult};

/// Uploaded file
#[derive(Debug, Clone, Default)]
pub struct Document {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl Document {
    pub fn new(file_name: impl Into<String>, content_type: Option<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type,
            bytes,
        }
    }

    /// Lowercased file extension without the dot
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
    }
}

/// Document types the service can read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    /// Image with the extension passed to the OCR engine
    Image(String),
    Json,
    Csv,
}

impl DocumentKind {
    /// Detect the kind from the MIME type, falling back to the file extension
    pub fn detect(document: &Document) -> LedgerResult<Self> {
        let mime = document
            .content_type
            .as_deref()
            .and_then(|ct| ct.split(';').next())
            .map(|ct| ct.trim().to_lowercase());

        let by_mime = match mime.as_deref() {
            Some("application/pdf") => Some(DocumentKind::Pdf),
            Some("image/png") => Some(DocumentKind::Image("png".to_string())),
            Some("image/jpeg") | Some("image/jpg") => Some(DocumentKind::Image("jpg".to_string())),
            Some("application/json") => Some(DocumentKind::Json),
            Some("text/csv") => Some(DocumentKind::Csv),
            _ => None,
        };
        if let Some(kind) = by_mime {
            return Ok(kind);
        }

        match document.extension().as_deref() {
            Some("pdf") => Ok(DocumentKind::Pdf),
            Some(ext @ ("png" | "jpg" | "jpeg")) => Ok(DocumentKind::Image(ext.to_string())),
            Some("json") => Ok(DocumentKind::Json),
            Some("csv") => Ok(DocumentKind::Csv),
            other => Err(LedgerError::UnsupportedFileType(format!(
                "'{}' ({}) is not a PDF, image, JSON or CSV document",
                document.file_name,
                mime.or_else(|| other.map(str::to_string))
                    .unwrap_or_else(|| "unknown type".to_string())
            ))),
        }
    }
}

/// Reads documents, running OCR on images through the injected recognizer
pub struct Ingestor {
    recognizer: Box<dyn TextRecognizer>,
    min_pdf_chars: usize,
}

impl Default for Ingestor {
    fn default() -> Self {
        Self::new(Box::new(TesseractCli::default()))
    }
}

impl Ingestor {
    pub fn new(recognizer: Box<dyn TextRecognizer>) -> Self {
        Self {
            recognizer,
            min_pdf_chars: pdf::MIN_TEXT_CHARS,
        }
    }

    /// Minimum text a PDF must carry before it is considered scanned
    pub fn with_min_pdf_chars(mut self, min_pdf_chars: usize) -> Self {
        self.min_pdf_chars = min_pdf_chars;
        self
    }

    /// Text content of a PDF or image document
    pub fn text_of(&self, document: &Document) -> LedgerResult<String> {
        match DocumentKind::detect(document)? {
            DocumentKind::Pdf => pdf::extract_text(&document.bytes, self.min_pdf_chars),
            DocumentKind::Image(extension) => self.recognizer.recognize(&document.bytes, &extension),
            DocumentKind::Json | DocumentKind::Csv => Err(LedgerError::UnsupportedFileType(format!(
                "'{}' is structured data, not a scanned invoice",
                document.file_name
            ))),
        }
    }

    /// Invoice lines contained in a document
    pub fn ingest(&self, document: &Document) -> LedgerResult<Vec<InvoiceLine>> {
        let kind = DocumentKind::detect(document)?;
        info!(file = %document.file_name, ?kind, bytes = document.bytes.len(), "ingesting document");

        match kind {
            DocumentKind::Json => parse_json(&document.bytes),
            DocumentKind::Csv => parse_csv(&document.bytes),
            DocumentKind::Pdf | DocumentKind::Image(_) => {
                let details = extract(&self.text_of(document)?);
                Ok(vec![details.to_invoice_line()?])
            }
        }
    }

    /// Extracted invoice fields, one set per invoice in the document
    pub fn extract_details(&self, document: &Document) -> LedgerResult<Vec<InvoiceDetails>> {
        match DocumentKind::detect(document)? {
            DocumentKind::Json | DocumentKind::Csv => Ok(self
                .ingest(document)?
                .into_iter()
                .map(|line| InvoiceDetails {
                    invoice_date: Some(line.date()),
                    concept: Some(line.concept().to_string()),
                    vat_rate: line.tax_rate().cloned(),
                    total: Some(line.amount().clone()),
                    ..InvoiceDetails::default()
                })
                .collect()),
            DocumentKind::Pdf | DocumentKind::Image(_) => Ok(vec![extract(&self.text_of(document)?)]),
        }
    }
}
