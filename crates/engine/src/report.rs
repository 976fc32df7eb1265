use chrono::NaiveDate;
use fatture_core::CatalogYear;
use fatture_extract::ExtractedInvoice;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::reconcile::{ReconciliationResult, Status};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub ok: usize,
    pub discrepancy: usize,
    pub unmatched: usize,
}

impl StatusCounts {
    pub fn total(&self) -> usize {
        self.ok + self.discrepancy + self.unmatched
    }

    fn add(&mut self, status: Status) {
        match status {
            Status::Ok => self.ok += 1,
            Status::Discrepancy => self.discrepancy += 1,
            Status::Unmatched => self.unmatched += 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Clean,
    /// Something on the invoice needs a person to look at it.
    NeedsReview,
}

/// Reconciliation outcome for one invoice. Results keep extraction order.
#[derive(Debug, Clone, Serialize)]
pub struct Report<'c> {
    pub document: Option<String>,
    pub digest: Option<String>,
    pub invoice_number: Option<String>,
    pub invoice_date: Option<NaiveDate>,
    pub catalog_year: Option<CatalogYear>,
    pub results: Vec<ReconciliationResult<'c>>,
    pub counts: StatusCounts,
    /// Sum of `price_delta` over DISCREPANCY lines.
    pub total_delta: Decimal,
    /// Sum of `line_delta` over DISCREPANCY lines.
    pub total_line_delta: Decimal,
    pub flagged_rows: usize,
    /// Lines whose quantity check against the reference sheet failed.
    pub reference_issues: usize,
    /// Sum of the printed line totals.
    pub invoiced_total: Decimal,
    pub verdict: Verdict,
}

pub fn build(results: Vec<ReconciliationResult<'_>>) -> Report<'_> {
    let mut counts = StatusCounts::default();
    let mut total_delta = Decimal::ZERO;
    let mut total_line_delta = Decimal::ZERO;
    let mut flagged_rows = 0;
    let mut reference_issues = 0;
    let mut invoiced_total = Decimal::ZERO;

    for r in &results {
        counts.add(r.status);
        if r.status == Status::Discrepancy {
            total_delta = total_delta.saturating_add(r.price_delta.unwrap_or_default());
            total_line_delta = total_line_delta.saturating_add(r.line_delta.unwrap_or_default());
        }
        if r.is_flagged() {
            flagged_rows += 1;
        }
        if r.has_reference_issue() {
            reference_issues += 1;
        }
        invoiced_total = invoiced_total.saturating_add(r.line().line_total);
    }

    let verdict = if counts.discrepancy + counts.unmatched + flagged_rows + reference_issues == 0 {
        Verdict::Clean
    } else {
        Verdict::NeedsReview
    };

    Report {
        document: None,
        digest: None,
        invoice_number: None,
        invoice_date: None,
        catalog_year: None,
        results,
        counts,
        total_delta,
        total_line_delta,
        flagged_rows,
        reference_issues,
        invoiced_total,
        verdict,
    }
}

impl<'c> Report<'c> {
    /// Attach the identifying fields of the invoice the results came from.
    pub fn for_invoice(mut self, invoice: &ExtractedInvoice) -> Self {
        self.document = Some(invoice.document.clone());
        self.digest = Some(invoice.digest.clone());
        self.invoice_number = invoice.number.as_ref().map(|f| f.value.clone());
        self.invoice_date = invoice.date.as_ref().map(|f| f.value);
        self
    }

    pub fn with_catalog_year(mut self, year: CatalogYear) -> Self {
        self.catalog_year = Some(year);
        self
    }

    pub fn is_clean(&self) -> bool {
        self.verdict == Verdict::Clean
    }

    pub fn headline(&self) -> &'static str {
        match self.verdict {
            Verdict::Clean => "Nessun errore: tutte le righe risultano fatturate correttamente.",
            Verdict::NeedsReview => "Risultano degli errori, controllare le righe evidenziate.",
        }
    }

    pub fn with_status(&self, status: Status) -> impl Iterator<Item = &ReconciliationResult<'c>> + '_ {
        self.results.iter().filter(move |r| r.status == status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crosscheck::{apply_reference, QuantityRule};
    use crate::reconcile::{reconcile, TolerancePolicy};
    use fatture_catalog::{Catalog, LineMatcher, ReferenceSheet};
    use fatture_core::{CatalogEntry, DocumentKind, DocumentRef, LineFlag, RawLine};

    fn d(units: i64, scale: u32) -> Decimal {
        Decimal::new(units, scale)
    }

    fn catalog() -> Catalog {
        Catalog::from_entries(
            CatalogYear(2025),
            "test",
            vec![
                CatalogEntry::new("A100", "Olio 1L", d(500, 2), CatalogYear(2025)),
                CatalogEntry::new("B200", "Aceto balsamico", d(320, 2), CatalogYear(2025)),
            ],
        )
    }

    fn line(desc: &str, qty: i64, price_cents: i64) -> RawLine {
        RawLine::new(1, 1, desc, Decimal::from(qty), d(price_cents, 2), d(qty * price_cents, 2))
    }

    fn report(c: &Catalog, lines: Vec<RawLine>) -> Report<'_> {
        build(reconcile(LineMatcher::default().match_lines(lines, c), &TolerancePolicy::default()))
    }

    #[test]
    fn counts_and_delta_cover_discrepancies_only() {
        let c = catalog();
        let r = report(
            &c,
            vec![
                line("A100", 2, 500),
                line("Olio 1L", 1, 550),
                line("B200", 2, 300),
                line("Trasporto", 1, 1500),
            ],
        );
        assert_eq!(r.counts, StatusCounts { ok: 1, discrepancy: 2, unmatched: 1 });
        assert_eq!(r.counts.total(), 4);
        // 0.50 - 0.20
        assert_eq!(r.total_delta, d(30, 2));
        // 0.50 × 1 - 0.20 × 2
        assert_eq!(r.total_line_delta, d(10, 2));
        assert_eq!(r.invoiced_total, d(1000 + 550 + 600 + 1500, 2));
        assert_eq!(r.verdict, Verdict::NeedsReview);
    }

    #[test]
    fn total_delta_recomputes_from_results() {
        let c = catalog();
        let r = report(&c, vec![line("A100", 1, 510), line("B200", 1, 330), line("A100", 1, 500)]);
        let recomputed: Decimal = r.with_status(Status::Discrepancy).filter_map(|x| x.price_delta).sum();
        assert_eq!(r.total_delta, recomputed);
        assert_eq!(r.with_status(Status::Ok).count(), 1);
    }

    #[test]
    fn clean_report_headline() {
        let c = catalog();
        let r = report(&c, vec![line("A100 Olio 1L", 2, 500)]);
        assert!(r.is_clean());
        assert_eq!(r.headline(), "Nessun errore: tutte le righe risultano fatturate correttamente.");
    }

    #[test]
    fn flagged_rows_need_review() {
        let c = catalog();
        let flagged = line("A100", 1, 500).with_flag(LineFlag::TotalMismatch { computed: d(500, 2), printed: d(600, 2) });
        let r = report(&c, vec![flagged]);
        assert_eq!(r.counts.ok, 1);
        assert_eq!(r.flagged_rows, 1);
        assert_eq!(r.verdict, Verdict::NeedsReview);
        assert_eq!(r.headline(), "Risultano degli errori, controllare le righe evidenziate.");
    }

    #[test]
    fn reference_issue_needs_review() {
        let c = catalog();
        let ddt = |n: &str| DocumentRef::new(DocumentKind::Ddt, n);
        let lines = vec![
            line("A100", 2, 500).with_document_ref(ddt("10")),
            line("B200", 1, 320).with_document_ref(ddt("11")),
        ];
        let mut results = reconcile(LineMatcher::default().match_lines(lines, &c), &TolerancePolicy::default());
        let sheet = ReferenceSheet::from_measures("volumi.csv", [(ddt("10").unwrap(), d(2, 0))]);
        apply_reference(&mut results, &sheet, &QuantityRule::default());

        let r = build(results);
        assert_eq!(r.counts.ok, 2);
        assert_eq!(r.flagged_rows, 0);
        // DT 000011 is not on the sheet.
        assert_eq!(r.reference_issues, 1);
        assert_eq!(r.verdict, Verdict::NeedsReview);
    }

    #[test]
    fn sums_saturate_instead_of_overflowing() {
        let c = catalog();
        let huge = RawLine::new(1, 1, "Trasporto", Decimal::ONE, Decimal::MAX, Decimal::MAX);
        let r = report(&c, vec![huge.clone(), huge]);
        assert_eq!(r.invoiced_total, Decimal::MAX);
        assert_eq!(r.counts.unmatched, 2);
    }

    #[test]
    fn order_is_preserved() {
        let c = catalog();
        let r = report(&c, vec![line("Trasporto", 1, 100), line("B200", 1, 320), line("A100", 1, 500)]);
        let descs: Vec<&str> = r.results.iter().map(|x| x.line().raw_description.as_str()).collect();
        assert_eq!(descs, vec!["Trasporto", "B200", "A100"]);
    }

    #[test]
    fn empty_report_is_clean() {
        let r = build(Vec::new());
        assert_eq!(r.counts.total(), 0);
        assert_eq!(r.total_delta, Decimal::ZERO);
        assert!(r.is_clean());
    }
}
