use serde::{Deserialize, Serialize};
use std::fmt;

/// Digits kept from a document number once normalized.
pub const DOCUMENT_NUMBER_DIGITS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    /// Delivery note (DDT, printed as `DT`).
    Ddt,
    /// Invoice (printed as `FT`).
    Invoice,
}

impl DocumentKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            DocumentKind::Ddt => "DT",
            DocumentKind::Invoice => "FT",
        }
    }
}

/// A delivery note or invoice number cited on an invoice row, in the form
/// shared with the reference sheet: the last six digits, zero padded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentRef {
    pub kind: DocumentKind,
    pub number: String,
}

impl DocumentRef {
    /// `None` when `raw` carries no digit at all.
    pub fn new(kind: DocumentKind, raw: &str) -> Option<Self> {
        normalize_document_number(raw).map(|number| Self { kind, number })
    }
}

impl fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind.prefix(), self.number)
    }
}

/// Keep the digits, then the last six of them, left padded with zeros:
/// `"DT 132"` → `"000132"`, `"2025/0001234"` → `"001234"`.
pub fn normalize_document_number(raw: &str) -> Option<String> {
    let digits: Vec<char> = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }
    let tail: String = digits[digits.len().saturating_sub(DOCUMENT_NUMBER_DIGITS)..].iter().collect();
    Some(format!("{tail:0>width$}", width = DOCUMENT_NUMBER_DIGITS))
}
