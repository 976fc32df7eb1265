pub mod docref;
pub mod entry;
pub mod headers;
pub mod line;
pub mod money;
pub mod year;

pub use docref::{normalize_document_number, DocumentKind, DocumentRef};
pub use entry::{normalize_code, CatalogEntry};
pub use headers::{normalize_header, ColumnMap, ColumnRole, HeaderAliases};
pub use line::{LineFlag, RawLine};
pub use money::{format_amount_it, format_eur, parse_amount_it, Ambiguity, AmountError, ParsedAmount};
pub use year::{CatalogYear, YearError};
