use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Price list edition. Each catalog is valid for one calendar year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CatalogYear(pub u16);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum YearError {
    #[error("invalid year: '{0}'")]
    Invalid(String),
    #[error("no price list for {0} (supported: 2025, 2026)")]
    Unsupported(u16),
}

impl fmt::Display for CatalogYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl CatalogYear {
    /// Editions shipped with the tool, oldest first.
    pub const SUPPORTED: [CatalogYear; 2] = [CatalogYear(2025), CatalogYear(2026)];

    pub fn new(year: u16) -> Self {
        CatalogYear(year)
    }

    pub fn year(self) -> u16 {
        self.0
    }

    pub fn is_supported(self) -> bool {
        Self::SUPPORTED.contains(&self)
    }

    pub fn latest() -> Self {
        Self::SUPPORTED[Self::SUPPORTED.len() - 1]
    }

    pub fn earliest() -> Self {
        Self::SUPPORTED[0]
    }

    /// Edition in force on `date`, clamped to the supported range.
    pub fn for_date(date: NaiveDate) -> Self {
        let y = date.year();
        if y <= i32::from(Self::earliest().0) {
            Self::earliest()
        } else if y >= i32::from(Self::latest().0) {
            Self::latest()
        } else {
            CatalogYear(y as u16)
        }
    }

    /// File name of the price list distributed for this edition.
    pub fn bundled_file_name(self) -> String {
        format!("prezzi_vainieri_{}.xlsx", self.0)
    }
}

impl FromStr for CatalogYear {
    type Err = YearError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let year: u16 = s.trim().parse().map_err(|_| YearError::Invalid(s.to_string()))?;
        let year = CatalogYear(year);
        if year.is_supported() {
            Ok(year)
        } else {
            Err(YearError::Unsupported(year.0))
        }
    }
}
