use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use crate::utils::error::ExtractionError;

// A digit, a decimal separator, one or two fraction digits, then a non-digit
// or the end of the text. `\d` is Unicode aware here.
static FRACTION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d[.,．，]\d{1,2}(?:\D|$)").expect("fraction pattern is valid"));

static DECIMAL_DIGIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\p{Nd}$").expect("digit pattern is valid"));

fn is_decimal_digit(c: char) -> bool {
    let mut buf = [0u8; 4];
    c.is_ascii_digit() || (!c.is_ascii() && DECIMAL_DIGIT.is_match(c.encode_utf8(&mut buf)))
}

/// Value of a Unicode decimal digit (general category Nd). Nd digits come in
/// contiguous runs of ten starting at zero, so the value is the offset from
/// the start of the run modulo ten.
fn decimal_value(c: char) -> Option<u32> {
    if let Some(value) = c.to_digit(10) {
        return Some(value);
    }
    if !is_decimal_digit(c) {
        return None;
    }

    let mut start = c as u32;
    while let Some(prev) = start.checked_sub(1).and_then(char::from_u32) {
        if !is_decimal_digit(prev) {
            break;
        }
        start -= 1;
    }
    Some((c as u32 - start) % 10)
}

/// How matched text is turned into an integer price.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DigitPolicy {
    /// Every digit in the text, concatenated in order. "12.50" reads as 1250.
    #[default]
    Concatenate,
    /// A trailing one- or two-digit fraction is dropped first. "12.50" reads
    /// as 12, "1,234" still reads as 1234.
    IntegerPart,
}

impl DigitPolicy {
    pub fn parse_price(self, text: &str) -> Result<u64, ExtractionError> {
        let relevant = match self {
            DigitPolicy::Concatenate => text,
            DigitPolicy::IntegerPart => match FRACTION_REGEX.find(text) {
                // keep the digit in front of the separator
                Some(m) => {
                    let first = text[m.start()..].chars().next().map_or(0, char::len_utf8);
                    &text[..m.start() + first]
                }
                None => text,
            },
        };

        let digits: String = relevant
            .chars()
            .filter_map(decimal_value)
            .filter_map(|value| char::from_digit(value, 10))
            .collect();
        if digits.is_empty() {
            return Err(ExtractionError::NoDigitsFound {
                text: text.to_string(),
            });
        }

        digits
            .parse::<u64>()
            .map_err(|_| ExtractionError::PriceOutOfRange { digits })
    }
}

impl fmt::Display for DigitPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DigitPolicy::Concatenate => write!(f, "concatenate"),
            DigitPolicy::IntegerPart => write!(f, "integer_part"),
        }
    }
}

impl FromStr for DigitPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "concatenate" => Ok(DigitPolicy::Concatenate),
            "integer_part" => Ok(DigitPolicy::IntegerPart),
            other => Err(format!("unknown digit policy '{}'", other)),
        }
    }
}
