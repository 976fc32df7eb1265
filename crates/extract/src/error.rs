use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("cannot parse PDF: {0}")]
    Parse(String),
    #[error("PDF has no pages")]
    NoPages,
}

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("{document}: not a readable PDF ({reason})")]
    InvalidPdf { document: String, reason: String },
    #[error("{document}: no invoice rows found on any page")]
    NoRowsFound { document: String },
    #[error("{document}: ambiguous number '{token}' on page {page}, row {row}")]
    AmbiguousNumericToken {
        document: String,
        page: usize,
        row: usize,
        token: String,
    },
}

impl ExtractionError {
    pub fn document(&self) -> &str {
        match self {
            ExtractionError::InvalidPdf { document, .. }
            | ExtractionError::NoRowsFound { document }
            | ExtractionError::AmbiguousNumericToken { document, .. } => document,
        }
    }
}
