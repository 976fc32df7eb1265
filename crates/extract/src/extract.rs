use std::sync::OnceLock;

use chrono::NaiveDate;
use fatture_core::{DocumentKind, DocumentRef, HeaderAliases, LineFlag, RawLine};
use regex::Regex;
use rust_decimal::Decimal;

use crate::error::ExtractionError;
use crate::hash::sha256_hex;
use crate::source::{LopdfSource, PageSource};
use crate::strategy::{ColumnStrategy, StrategyContext, TableCandidate, TableStrategy, TrailingNumbersStrategy};
use crate::types::{ExtractedField, ExtractedInvoice, PageLayout};

// ── Compiled regex cache ─────────────────────────────────────────────────────

macro_rules! re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static Regex {
            static R: OnceLock<Regex> = OnceLock::new();
            R.get_or_init(|| Regex::new($pat).expect("invalid regex"))
        }
    };
}

re!(re_number_labeled,
    r"(?i)\b(?:fattura|invoice|documento|doc\.)(?:\s+(?:accompagnatoria|differita|immediata|elettronica))?\s*(?:n\.|nr\.?|num\.|numero|n°|nº|no\.|#)\s*:?\s*([A-Z]{0,4}\d[\w/\-]*)");
re!(re_number_loose,
    r"(?i)(?:\bn\.|\bnr\.|\bnumero|\bn°|\bnº)\s*(?:fattura|documento|doc\.)?\s*:?\s*([A-Z]{0,4}\d[\w/\-]*)");

re!(re_date_labeled,
    r"(?i)\b(?:data(?:\s+(?:documento|fattura|doc\.?))?|del|date)\s*:?\s*(\d{1,2})[/.\-](\d{1,2})[/.\-](\d{2,4})\b");
re!(re_date_iso,
    r"\b(\d{4})-(\d{2})-(\d{2})\b");
re!(re_date_dmy,
    r"\b(\d{1,2})[/.\-](\d{1,2})[/.\-](\d{4})\b");

re!(re_document_ref,
    r"(?i)\b(DDT|DT|FT)\b\.?\s*(?:n[r°º]?\.?\s*)?:?\s*(\d+)");

// ── Options ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtractOptions {
    /// Allowed gap between `qty × price` and the printed line total.
    pub total_tolerance: Decimal,
    /// Fail on the first ambiguous number instead of flagging the row.
    pub strict_numbers: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self { total_tolerance: Decimal::new(1, 2), strict_numbers: false }
    }
}

// ── Extractor ────────────────────────────────────────────────────────────────

/// Reads invoice rows out of PDF bytes. Pages come from a [`PageSource`];
/// each page is offered to every [`TableStrategy`] and the most confident
/// proposal is kept (earlier strategies win ties).
pub struct Extractor<S = LopdfSource> {
    source: S,
    options: ExtractOptions,
    aliases: HeaderAliases,
    strategies: Vec<Box<dyn TableStrategy>>,
}

impl Extractor<LopdfSource> {
    pub fn new(options: ExtractOptions) -> Self {
        Self::with_source(LopdfSource, options)
    }
}

impl Default for Extractor<LopdfSource> {
    fn default() -> Self {
        Self::new(ExtractOptions::default())
    }
}

impl<S: PageSource> Extractor<S> {
    pub fn with_source(source: S, options: ExtractOptions) -> Self {
        Self {
            source,
            options,
            aliases: HeaderAliases::default(),
            strategies: vec![Box::new(ColumnStrategy), Box::new(TrailingNumbersStrategy)],
        }
    }

    pub fn with_aliases(mut self, aliases: HeaderAliases) -> Self {
        self.aliases = aliases;
        self
    }

    /// Append a strategy; it loses ties against the built-in ones.
    pub fn with_strategy(mut self, strategy: Box<dyn TableStrategy>) -> Self {
        self.strategies.push(strategy);
        self
    }

    pub fn options(&self) -> &ExtractOptions {
        &self.options
    }

    /// Rows only, for callers that do not need the header fields.
    pub fn extract(&self, pdf: &[u8]) -> Result<Vec<RawLine>, ExtractionError> {
        Ok(self.extract_invoice("invoice.pdf", pdf)?.lines)
    }

    pub fn extract_invoice(&self, document: &str, pdf: &[u8]) -> Result<ExtractedInvoice, ExtractionError> {
        let digest = sha256_hex(pdf);
        let pages = self.source.pages(pdf).map_err(|e| ExtractionError::InvalidPdf {
            document: document.to_string(),
            reason: e.to_string(),
        })?;

        let ctx = StrategyContext { aliases: &self.aliases, total_tolerance: self.options.total_tolerance };
        let mut lines = Vec::new();
        let mut empty_pages = Vec::new();

        for page in &pages {
            match self.best_candidate(page, &ctx) {
                Some(found) => {
                    tracing::debug!(
                        document,
                        page = page.number,
                        strategy = found.strategy,
                        confidence = found.confidence,
                        rows = found.lines.len(),
                        "page rows"
                    );
                    lines.extend(found.lines);
                }
                None => {
                    tracing::warn!(document, page = page.number, "no invoice rows on page");
                    empty_pages.push(page.number);
                }
            }
        }

        if lines.is_empty() {
            return Err(ExtractionError::NoRowsFound { document: document.to_string() });
        }
        if self.options.strict_numbers {
            if let Some(err) = first_ambiguity(document, &lines) {
                return Err(err);
            }
        }

        let text = pages.iter().map(PageLayout::text).collect::<Vec<_>>().join("\n");
        let invoice = ExtractedInvoice {
            document: document.to_string(),
            digest,
            number: extract_number(&text),
            date: extract_date(&text),
            page_count: pages.len(),
            empty_pages,
            lines,
        };
        tracing::info!(
            document,
            pages = invoice.page_count,
            rows = invoice.lines.len(),
            flagged = invoice.flagged_rows(),
            "invoice extracted"
        );
        Ok(invoice)
    }

    fn best_candidate(&self, page: &PageLayout, ctx: &StrategyContext<'_>) -> Option<TableCandidate> {
        let mut best: Option<TableCandidate> = None;
        for strategy in &self.strategies {
            let candidate = strategy.detect(page, ctx);
            tracing::trace!(page = page.number, strategy = candidate.strategy, confidence = candidate.confidence);
            if candidate.lines.is_empty() {
                continue;
            }
            if best.as_ref().map_or(true, |b| candidate.confidence > b.confidence) {
                best = Some(candidate);
            }
        }
        best
    }
}

fn first_ambiguity(document: &str, lines: &[RawLine]) -> Option<ExtractionError> {
    lines.iter().find_map(|line| {
        line.flags.iter().find_map(|flag| match flag {
            LineFlag::AmbiguousNumber { token, .. } => Some(ExtractionError::AmbiguousNumericToken {
                document: document.to_string(),
                page: line.source_page,
                row: line.source_row,
                token: token.clone(),
            }),
            _ => None,
        })
    })
}

// ── Row references ───────────────────────────────────────────────────────────

/// First `DDT`/`DT`/`FT` number cited in a row's text.
pub(crate) fn find_document_ref(text: &str) -> Option<DocumentRef> {
    let caps = re_document_ref().captures(text)?;
    let kind = match caps[1].to_ascii_uppercase().as_str() {
        "FT" => DocumentKind::Invoice,
        _ => DocumentKind::Ddt,
    };
    DocumentRef::new(kind, &caps[2])
}

// ── Header fields ────────────────────────────────────────────────────────────

pub(crate) fn extract_number(text: &str) -> Option<ExtractedField<String>> {
    if let Some(c) = re_number_labeled().captures(text) {
        return Some(ExtractedField::new(c.get(1)?.as_str().to_string(), 0.85));
    }
    let c = re_number_loose().captures(text)?;
    Some(ExtractedField::new(c.get(1)?.as_str().to_string(), 0.55))
}

/// Italian invoices print day first.
pub(crate) fn extract_date(text: &str) -> Option<ExtractedField<NaiveDate>> {
    if let Some(d) = re_date_labeled().captures_iter(text).find_map(|c| dmy(&c[1], &c[2], &c[3])) {
        return Some(ExtractedField::new(d, 0.90));
    }
    if let Some(d) = re_date_iso().captures_iter(text).find_map(|c| ymd(&c[1], &c[2], &c[3])) {
        return Some(ExtractedField::new(d, 0.70));
    }
    re_date_dmy()
        .captures_iter(text)
        .find_map(|c| dmy(&c[1], &c[2], &c[3]))
        .map(|d| ExtractedField::new(d, 0.60))
}

fn dmy(day: &str, month: &str, year: &str) -> Option<NaiveDate> {
    let mut y: i32 = year.parse().ok()?;
    if year.len() == 2 {
        y += 2000;
    } else if year.len() != 4 {
        return None;
    }
    NaiveDate::from_ymd_opt(y, month.parse().ok()?, day.parse().ok()?)
}

fn ymd(year: &str, month: &str, day: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)
}
