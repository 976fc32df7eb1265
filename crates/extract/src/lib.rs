pub mod error;
pub mod extract;
pub mod hash;
pub mod layout;
pub mod source;
pub mod strategy;
pub mod types;

pub use error::{ExtractionError, SourceError};
pub use extract::{ExtractOptions, Extractor};
pub use hash::sha256_hex;
pub use source::{LopdfSource, MockSource, PageSource};
pub use strategy::{ColumnStrategy, StrategyContext, TableCandidate, TableStrategy, TrailingNumbersStrategy};
pub use types::{ExtractedField, ExtractedInvoice, PageLayout, TextLine, TextSpan};
