use fatture_core::ColumnRole;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("cannot read {}: {reason}", .path.display())]
    Unreadable { path: PathBuf, reason: String },
    #[error("unsupported spreadsheet format: {}", .path.display())]
    UnsupportedFormat { path: PathBuf },
    #[error("catalog {} is missing required columns: {}", .path.display(), roles(.missing))]
    MissingColumns { path: PathBuf, missing: Vec<ColumnRole> },
    #[error("no header row in the first {scanned} rows of {}", .path.display())]
    NoHeader { path: PathBuf, scanned: usize },
    #[error(
        "catalog {}: {skipped} of {total} rows skipped ({:.1}%), limit is {:.1}%",
        .path.display(), .rate * 100.0, .max_rate * 100.0
    )]
    Integrity {
        path: PathBuf,
        skipped: usize,
        total: usize,
        rate: f64,
        max_rate: f64,
    },
}

impl CatalogError {
    /// True for failures of the load family (the file itself could not be
    /// used), false for integrity failures on an otherwise readable table.
    pub fn is_load_error(&self) -> bool {
        !matches!(self, CatalogError::Integrity { .. })
    }
}

fn roles(missing: &[ColumnRole]) -> String {
    missing.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}
