use crate::year::CatalogYear;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One priced product in a year's list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub product_code: String,
    pub description: String,
    pub unit_price: Decimal,
    pub effective_year: CatalogYear,
}

impl CatalogEntry {
    pub fn new(
        product_code: impl Into<String>,
        description: impl Into<String>,
        unit_price: Decimal,
        effective_year: CatalogYear,
    ) -> Self {
        Self {
            product_code: product_code.into(),
            description: description.into(),
            unit_price,
            effective_year,
        }
    }

    /// Lookup key for this entry's code.
    pub fn key(&self) -> String {
        normalize_code(&self.product_code)
    }
}

/// Codes compare case-insensitively with surrounding whitespace ignored.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}
