use fatture_core::{normalize_code, CatalogEntry, CatalogYear};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::util::normalize_description;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    EmptyCode,
    InvalidPrice,
    NonPositivePrice,
    DuplicateCode,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::EmptyCode => write!(f, "empty_code"),
            SkipReason::InvalidPrice => write!(f, "invalid_price"),
            SkipReason::NonPositivePrice => write!(f, "non_positive_price"),
            SkipReason::DuplicateCode => write!(f, "duplicate_code"),
        }
    }
}

impl SkipReason {
    pub fn label(&self) -> &'static str {
        match self {
            SkipReason::EmptyCode => "codice vuoto",
            SkipReason::InvalidPrice => "prezzo non leggibile",
            SkipReason::NonPositivePrice => "prezzo non positivo",
            SkipReason::DuplicateCode => "codice duplicato",
        }
    }
}

/// A source row left out of the catalog. `row` is the 1-based row number
/// as a spreadsheet user would see it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedRow {
    pub row: usize,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadStats {
    /// Sheet the table was read from; `None` for CSV.
    pub sheet: Option<String>,
    /// 1-based row of the detected header.
    pub header_row: usize,
    /// Non-blank data rows below the header.
    pub rows_read: usize,
    pub loaded: usize,
    pub skipped: Vec<SkippedRow>,
}

impl LoadStats {
    pub fn skip_rate(&self) -> f64 {
        if self.rows_read == 0 {
            return 0.0;
        }
        self.skipped.len() as f64 / self.rows_read as f64
    }

    pub fn skipped_by_reason(&self) -> BTreeMap<SkipReason, usize> {
        let mut counts = BTreeMap::new();
        for s in &self.skipped {
            *counts.entry(s.reason).or_insert(0) += 1;
        }
        counts
    }
}

/// One year's price list, keyed by product code. Immutable once built and
/// safe to share across threads.
#[derive(Debug, Clone)]
pub struct Catalog {
    year: CatalogYear,
    source: String,
    entries: Vec<CatalogEntry>,
    by_code: HashMap<String, usize>,
    search_keys: Vec<String>,
    stats: LoadStats,
}

impl Catalog {
    /// Build from entries in order. Later duplicates of a code are dropped
    /// and recorded as skipped.
    pub fn from_entries<I>(year: CatalogYear, source: impl Into<String>, entries: I) -> Self
    where
        I: IntoIterator<Item = CatalogEntry>,
    {
        let mut builder = CatalogBuilder::new(year, source);
        for (idx, entry) in entries.into_iter().enumerate() {
            builder.stats.rows_read += 1;
            if builder.push(entry).is_err() {
                builder.skip(idx + 1, SkipReason::DuplicateCode);
            }
        }
        builder.finish()
    }

    pub fn year(&self) -> CatalogYear {
        self.year
    }

    /// File name or label the catalog was read from.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn get(&self, code: &str) -> Option<&CatalogEntry> {
        self.by_code.get(&normalize_code(code)).map(|&i| &self.entries[i])
    }

    /// Entries in insertion order.
    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// Entries paired with their normalized description, insertion order.
    pub(crate) fn search_keys(&self) -> impl Iterator<Item = (&CatalogEntry, &str)> {
        self.entries.iter().zip(self.search_keys.iter().map(String::as_str))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> &LoadStats {
        &self.stats
    }
}

pub(crate) struct CatalogBuilder {
    year: CatalogYear,
    source: String,
    entries: Vec<CatalogEntry>,
    by_code: HashMap<String, usize>,
    pub(crate) stats: LoadStats,
}

impl CatalogBuilder {
    pub(crate) fn new(year: CatalogYear, source: impl Into<String>) -> Self {
        Self {
            year,
            source: source.into(),
            entries: Vec::new(),
            by_code: HashMap::new(),
            stats: LoadStats::default(),
        }
    }

    /// Add an entry unless its code is already present. Returns the entry
    /// back on conflict.
    pub(crate) fn push(&mut self, entry: CatalogEntry) -> Result<(), CatalogEntry> {
        let key = entry.key();
        if self.by_code.contains_key(&key) {
            return Err(entry);
        }
        self.by_code.insert(key, self.entries.len());
        self.entries.push(entry);
        Ok(())
    }

    pub(crate) fn skip(&mut self, row: usize, reason: SkipReason) {
        self.stats.skipped.push(SkippedRow { row, reason });
    }

    pub(crate) fn finish(mut self) -> Catalog {
        self.stats.loaded = self.entries.len();
        let search_keys = self.entries.iter().map(|e| normalize_description(&e.description)).collect();
        Catalog {
            year: self.year,
            source: self.source,
            entries: self.entries,
            by_code: self.by_code,
            search_keys,
            stats: self.stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn entry(code: &str, desc: &str, cents: i64) -> CatalogEntry {
        CatalogEntry::new(code, desc, Decimal::new(cents, 2), CatalogYear(2025))
    }

    #[test]
    fn lookup_ignores_case() {
        let c = Catalog::from_entries(CatalogYear(2025), "test", vec![entry("A100", "Olio 1L", 500)]);
        assert_eq!(c.get("a100").map(|e| e.unit_price), Some(Decimal::new(500, 2)));
        assert!(c.get("A101").is_none());
    }

    #[test]
    fn first_duplicate_wins() {
        let c = Catalog::from_entries(
            CatalogYear(2025),
            "test",
            vec![entry("A100", "Olio 1L", 500), entry("a100", "Olio 1L bis", 900), entry("B200", "Aceto", 300)],
        );
        assert_eq!(c.len(), 2);
        assert_eq!(c.get("A100").map(|e| e.description.as_str()), Some("Olio 1L"));
        assert_eq!(c.stats().skipped, vec![SkippedRow { row: 2, reason: SkipReason::DuplicateCode }]);
        assert_eq!(c.stats().loaded, 2);
    }

    #[test]
    fn skip_rate_counts_rows_read() {
        let stats = LoadStats {
            rows_read: 10,
            skipped: vec![
                SkippedRow { row: 3, reason: SkipReason::EmptyCode },
                SkippedRow { row: 4, reason: SkipReason::EmptyCode },
            ],
            ..Default::default()
        };
        assert!((stats.skip_rate() - 0.2).abs() < 1e-9);
        assert_eq!(stats.skipped_by_reason()[&SkipReason::EmptyCode], 2);
        assert_eq!(SkipReason::EmptyCode.label(), "codice vuoto");
    }

    #[test]
    fn catalog_is_send_and_sync() {
        fn assert_shareable<T: Send + Sync>() {}
        assert_shareable::<Catalog>();
    }
}
