pub mod catalog;
pub mod error;
pub mod loader;
pub mod match_engine;
pub mod reference;
mod sheet;
pub(crate) mod util;

pub use catalog::{Catalog, LoadStats, SkipReason, SkippedRow};
pub use error::CatalogError;
pub use loader::{load, CatalogLoader, CatalogSource, HEADER_SCAN_ROWS};
pub use match_engine::{CatalogMatch, LineMatcher, MatchMethod, MatchSettings, MatchedLine};
pub use reference::{load_reference, ReferenceError, ReferenceSheet, ReferenceValue};
