use fatture_core::{CatalogEntry, RawLine};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

use crate::catalog::Catalog;
use crate::util::{normalize_description, similarity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    ExactCode,
    FuzzyDescription,
    None,
}

impl fmt::Display for MatchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchMethod::ExactCode => write!(f, "exact_code"),
            MatchMethod::FuzzyDescription => write!(f, "fuzzy_description"),
            MatchMethod::None => write!(f, "none"),
        }
    }
}

impl MatchMethod {
    pub fn label(&self) -> &'static str {
        match self {
            MatchMethod::ExactCode => "codice",
            MatchMethod::FuzzyDescription => "descrizione",
            MatchMethod::None => "-",
        }
    }
}

/// How a line resolved against the catalog. An entry is present exactly
/// when a method other than `None` applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CatalogMatch<'c> {
    Exact(&'c CatalogEntry),
    Fuzzy { entry: &'c CatalogEntry, score: f64 },
    Unmatched,
}

impl<'c> CatalogMatch<'c> {
    pub fn entry(&self) -> Option<&'c CatalogEntry> {
        match self {
            CatalogMatch::Exact(e) => Some(e),
            CatalogMatch::Fuzzy { entry, .. } => Some(entry),
            CatalogMatch::Unmatched => None,
        }
    }

    pub fn method(&self) -> MatchMethod {
        match self {
            CatalogMatch::Exact(_) => MatchMethod::ExactCode,
            CatalogMatch::Fuzzy { .. } => MatchMethod::FuzzyDescription,
            CatalogMatch::Unmatched => MatchMethod::None,
        }
    }

    pub fn confidence(&self) -> f64 {
        match self {
            CatalogMatch::Exact(_) => 1.0,
            CatalogMatch::Fuzzy { score, .. } => *score,
            CatalogMatch::Unmatched => 0.0,
        }
    }
}

/// An invoice line with its catalog resolution. Borrows the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedLine<'c> {
    pub line: RawLine,
    pub outcome: CatalogMatch<'c>,
}

impl<'c> MatchedLine<'c> {
    pub fn matched_entry(&self) -> Option<&'c CatalogEntry> {
        self.outcome.entry()
    }

    pub fn match_method(&self) -> MatchMethod {
        self.outcome.method()
    }

    pub fn match_confidence(&self) -> f64 {
        self.outcome.confidence()
    }
}

impl Serialize for MatchedLine<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("MatchedLine", 4)?;
        s.serialize_field("line", &self.line)?;
        s.serialize_field("matched_entry", &self.matched_entry())?;
        s.serialize_field("match_method", &self.match_method())?;
        s.serialize_field("match_confidence", &self.match_confidence())?;
        s.end()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MatchSettings {
    /// Minimum fuzzy score accepted, on a 0..1 scale. Inclusive: a score
    /// equal to the threshold matches.
    pub min_similarity: f64,
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self { min_similarity: 0.75 }
    }
}

/// Resolves invoice lines to catalog entries. Strategies are tried in
/// order: exact code, fuzzy description, none.
#[derive(Debug, Clone, Default)]
pub struct LineMatcher {
    pub settings: MatchSettings,
}

impl LineMatcher {
    pub fn new(settings: MatchSettings) -> Self {
        Self { settings }
    }

    pub fn match_lines<'c, I>(&self, lines: I, catalog: &'c Catalog) -> Vec<MatchedLine<'c>>
    where
        I: IntoIterator<Item = RawLine>,
    {
        lines
            .into_iter()
            .map(|line| {
                let outcome = self.match_line(&line, catalog);
                MatchedLine { line, outcome }
            })
            .collect()
    }

    pub fn match_line<'c>(&self, line: &RawLine, catalog: &'c Catalog) -> CatalogMatch<'c> {
        if let Some(entry) = exact_code(&line.raw_description, catalog) {
            return CatalogMatch::Exact(entry);
        }
        match self.best_fuzzy(&line.raw_description, catalog) {
            Some((entry, score)) => CatalogMatch::Fuzzy { entry, score },
            None => CatalogMatch::Unmatched,
        }
    }

    fn best_fuzzy<'c>(&self, description: &str, catalog: &'c Catalog) -> Option<(&'c CatalogEntry, f64)> {
        let needle = normalize_description(description);
        let mut best: Option<(&'c CatalogEntry, f64)> = None;

        for (entry, key) in catalog.search_keys() {
            let score = similarity(&needle, key);
            if score < self.settings.min_similarity {
                continue;
            }
            let better = match best {
                None => true,
                Some((held, held_score)) => {
                    score > held_score
                        || (score == held_score
                            && entry.description.chars().count() < held.description.chars().count())
                }
            };
            if better {
                best = Some((entry, score));
            }
        }

        if let Some((entry, score)) = best {
            tracing::debug!(description, code = %entry.product_code, score, "fuzzy match");
        }
        best
    }
}

/// Whole description first, then each word, against the code index.
fn exact_code<'c>(description: &str, catalog: &'c Catalog) -> Option<&'c CatalogEntry> {
    let whole = description.trim();
    if !whole.is_empty() {
        if let Some(entry) = catalog.get(whole) {
            return Some(entry);
        }
    }
    description
        .split_whitespace()
        .map(|t| t.trim_matches(|c: char| matches!(c, ',' | ';' | ':' | '(' | ')' | '[' | ']' | '"')))
        .filter(|t| !t.is_empty())
        .find_map(|t| catalog.get(t))
}
