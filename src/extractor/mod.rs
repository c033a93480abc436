//! Turns page content and a location rule into a price. No I/O.

pub mod price;
pub mod xpath;

pub use price::DigitPolicy;
pub use xpath::LocationRule;

use scraper::Html;

use crate::utils::error::ExtractionError;

#[derive(Debug, Clone, Copy, Default)]
pub struct Extractor {
    policy: DigitPolicy,
}

impl Extractor {
    pub fn new(policy: DigitPolicy) -> Self {
        Self { policy }
    }

    pub fn extract(&self, content: &str, rule: &str) -> Result<u64, ExtractionError> {
        let document = parse_document(content)?;
        let rule = LocationRule::parse(rule)?;
        self.extract_from(&document, &rule)
    }

    /// Same as [`Extractor::extract`] for an already parsed document and rule.
    pub fn extract_from(&self, document: &Html, rule: &LocationRule) -> Result<u64, ExtractionError> {
        let matches = rule.select_text(document);
        let first = matches.first().ok_or_else(|| ExtractionError::RuleNotFound {
            rule: rule.to_string(),
        })?;

        let text = first.trim();
        match self.policy.parse_price(text)? {
            0 => Err(ExtractionError::NonPositivePrice { text: text.to_string() }),
            price => Ok(price),
        }
    }
}

/// Extracts with the default (digit-concatenating) policy.
pub fn extract(content: &str, rule: &str) -> Result<u64, ExtractionError> {
    Extractor::default().extract(content, rule)
}

// html5ever recovers from any markup, so the only unusable input is an
// empty one.
fn parse_document(content: &str) -> Result<Html, ExtractionError> {
    if content.trim().is_empty() {
        return Err(ExtractionError::MalformedDocument {
            reason: "document is empty".to_string(),
        });
    }
    Ok(Html::parse_document(content))
}
