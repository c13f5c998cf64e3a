//! Traits for the seams between classification, generation and ingestion

use crate::rules::ClassificationRule;
use crate::types::*;

/// Maps an invoice concept to the rule that classifies it
///
/// The default implementation is [`crate::rules::RuleTable`]; the generator
/// accepts any classifier so rule sources can be swapped without touching
/// the posting logic.
pub trait Classifier: Send + Sync {
    /// Classify a concept, failing with `UnclassifiedConcept` when nothing matches
    fn classify(&self, concept: &str) -> LedgerResult<&ClassificationRule>;
}

/// Trait for implementing custom asiento validation rules
pub trait AsientoValidator: Send + Sync {
    /// Validate a generated asiento before it is handed to the caller
    fn validate_asiento(&self, asiento: &Asiento) -> LedgerResult<()>;
}

/// Default validator with the basic double-entry rules
pub struct DefaultAsientoValidator;

impl AsientoValidator for DefaultAsientoValidator {
    fn validate_asiento(&self, asiento: &Asiento) -> LedgerResult<()> {
        asiento.validate()
    }
}

/// Turns an image into text
pub trait TextRecognizer: Send + Sync {
    /// Recognize the text in an encoded image; `extension` is the image
    /// format without the dot ("png", "jpg")
    fn recognize(&self, image: &[u8], extension: &str) -> LedgerResult<String>;
}
