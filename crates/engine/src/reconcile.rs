use fatture_catalog::MatchedLine;
use fatture_core::money::CURRENCY_SCALE;
use fatture_core::RawLine;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crosscheck::ReferenceCheck;

/// When an invoiced price counts as matching the list price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TolerancePolicy {
    #[serde(rename = "absolute")]
    pub absolute_tolerance: Decimal,
    /// Fraction of the expected price; zero disables the relative check.
    #[serde(rename = "relative")]
    pub relative_tolerance: Decimal,
}

impl Default for TolerancePolicy {
    fn default() -> Self {
        Self { absolute_tolerance: Decimal::new(1, 2), relative_tolerance: Decimal::ZERO }
    }
}

impl TolerancePolicy {
    pub fn accepts(&self, delta: Decimal, expected: Decimal) -> bool {
        let delta = delta.abs();
        if delta <= self.absolute_tolerance {
            return true;
        }
        self.relative_tolerance > Decimal::ZERO
            && delta
                .checked_div(expected.abs())
                .is_some_and(|ratio| ratio <= self.relative_tolerance)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Ok,
    Discrepancy,
    Unmatched,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Ok => write!(f, "OK"),
            Status::Discrepancy => write!(f, "DISCREPANCY"),
            Status::Unmatched => write!(f, "UNMATCHED"),
        }
    }
}

impl Status {
    /// Italian label used in printed and exported reports.
    pub fn label(&self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::Discrepancy => "ERRORE PREZZO",
            Status::Unmatched => "NON IN LISTINO",
        }
    }
}

/// A matched line judged against its list price. `expected_price` is
/// `None` exactly when the line is unmatched; the derived fields are also
/// `None` when they fall outside the `Decimal` range.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciliationResult<'c> {
    #[serde(flatten)]
    pub matched: MatchedLine<'c>,
    pub expected_price: Option<Decimal>,
    /// Invoiced minus expected unit price.
    pub price_delta: Option<Decimal>,
    /// `price_delta` as a percentage of the expected price.
    pub delta_percent: Option<Decimal>,
    /// `price_delta × quantity`, rounded to cents.
    pub line_delta: Option<Decimal>,
    pub status: Status,
    pub total_consistent: bool,
    /// Quantity check against the reference sheet, when one was given.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<ReferenceCheck>,
}

impl ReconciliationResult<'_> {
    pub fn line(&self) -> &RawLine {
        &self.matched.line
    }

    pub fn is_flagged(&self) -> bool {
        self.matched.line.is_flagged()
    }

    pub fn has_reference_issue(&self) -> bool {
        self.reference.as_ref().is_some_and(ReferenceCheck::is_issue)
    }
}

pub fn reconcile<'c, I>(matched: I, policy: &TolerancePolicy) -> Vec<ReconciliationResult<'c>>
where
    I: IntoIterator<Item = MatchedLine<'c>>,
{
    matched.into_iter().map(|m| reconcile_line(m, policy)).collect()
}

fn reconcile_line<'c>(matched: MatchedLine<'c>, policy: &TolerancePolicy) -> ReconciliationResult<'c> {
    let total_consistent = matched.line.total_consistent();
    let Some(entry) = matched.matched_entry() else {
        return ReconciliationResult {
            matched,
            expected_price: None,
            price_delta: None,
            delta_percent: None,
            line_delta: None,
            status: Status::Unmatched,
            total_consistent,
            reference: None,
        };
    };

    let expected = entry.unit_price;
    let Some(delta) = matched.line.unit_price.checked_sub(expected) else {
        tracing::warn!(
            page = matched.line.source_page,
            row = matched.line.source_row,
            code = %entry.product_code,
            "price delta out of range"
        );
        return ReconciliationResult {
            matched,
            expected_price: Some(expected),
            price_delta: None,
            delta_percent: None,
            line_delta: None,
            status: Status::Discrepancy,
            total_consistent,
            reference: None,
        };
    };
    let percent = delta
        .checked_div(expected)
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        .map(|p| p.round_dp(CURRENCY_SCALE));
    let line_delta = delta.checked_mul(matched.line.quantity).map(|d| d.round_dp(CURRENCY_SCALE));
    let status = if policy.accepts(delta, expected) { Status::Ok } else { Status::Discrepancy };

    if status == Status::Discrepancy {
        tracing::debug!(
            page = matched.line.source_page,
            row = matched.line.source_row,
            code = %entry.product_code,
            invoiced = %matched.line.unit_price,
            expected = %expected,
            "price discrepancy"
        );
    }

    ReconciliationResult {
        matched,
        expected_price: Some(expected),
        price_delta: Some(delta),
        delta_percent: percent,
        line_delta,
        status,
        total_consistent,
        reference: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fatture_catalog::{Catalog, LineMatcher};
    use fatture_core::{CatalogEntry, CatalogYear};

    fn d(units: i64, scale: u32) -> Decimal {
        Decimal::new(units, scale)
    }

    fn catalog() -> Catalog {
        Catalog::from_entries(
            CatalogYear(2026),
            "test",
            vec![
                CatalogEntry::new("A100", "Olio 1L", d(500, 2), CatalogYear(2026)),
                CatalogEntry::new("B200", "Aceto balsamico", d(320, 2), CatalogYear(2026)),
            ],
        )
    }

    fn run<'c>(catalog: &'c Catalog, lines: Vec<RawLine>, policy: &TolerancePolicy) -> Vec<ReconciliationResult<'c>> {
        reconcile(LineMatcher::default().match_lines(lines, catalog), policy)
    }

    fn line(desc: &str, qty: i64, price_cents: i64) -> RawLine {
        let total = d(qty * price_cents, 2);
        RawLine::new(1, 1, desc, Decimal::from(qty), d(price_cents, 2), total)
    }

    #[test]
    fn exact_code_at_list_price_is_ok() {
        let c = catalog();
        let r = &run(&c, vec![line("A100 Olio 1L", 2, 500)], &TolerancePolicy::default())[0];
        assert_eq!(r.status, Status::Ok);
        assert_eq!(r.price_delta, Some(Decimal::ZERO));
        assert_eq!(r.line_delta, Some(Decimal::ZERO));
        assert!(r.total_consistent);
    }

    #[test]
    fn fuzzy_match_overpriced_is_discrepancy() {
        let c = catalog();
        let r = &run(&c, vec![line("Olio 1L", 1, 550)], &TolerancePolicy::default())[0];
        assert_eq!(r.status, Status::Discrepancy);
        assert_eq!(r.expected_price, Some(d(500, 2)));
        assert_eq!(r.price_delta, Some(d(50, 2)));
        assert_eq!(r.delta_percent, Some(d(1000, 2)));
    }

    #[test]
    fn unmatched_line_has_no_prices() {
        let c = catalog();
        let r = &run(&c, vec![line("Spese di trasporto", 1, 1500)], &TolerancePolicy::default())[0];
        assert_eq!(r.status, Status::Unmatched);
        assert_eq!(r.expected_price, None);
        assert_eq!(r.price_delta, None);
        assert_eq!(r.line_delta, None);
    }

    #[test]
    fn absolute_tolerance_is_inclusive() {
        let c = catalog();
        let results = run(&c, vec![line("A100", 1, 501), line("A100", 1, 502)], &TolerancePolicy::default());
        assert_eq!(results[0].status, Status::Ok);
        assert_eq!(results[1].status, Status::Discrepancy);
    }

    #[test]
    fn delta_one_cent_past_tolerance_is_discrepancy() {
        let c = catalog();
        let policy = TolerancePolicy { absolute_tolerance: d(5, 2), relative_tolerance: Decimal::ZERO };
        let results = run(&c, vec![line("A100", 1, 505), line("A100", 1, 495), line("A100", 1, 506)], &policy);
        assert_eq!(results[0].status, Status::Ok);
        assert_eq!(results[1].status, Status::Ok);
        assert_eq!(results[2].status, Status::Discrepancy);
        assert_eq!(results[2].price_delta, Some(d(6, 2)));
    }

    #[test]
    fn huge_line_reconciles_without_panicking() {
        let c = catalog();
        let huge = Decimal::new(1_000_000_000_000_000, 0);
        let raw = RawLine::new(1, 1, "A100", huge, huge, huge).verify_total(d(1, 2));
        let r = &run(&c, vec![raw], &TolerancePolicy { absolute_tolerance: d(1, 2), relative_tolerance: d(5, 2) })[0];
        assert_eq!(r.status, Status::Discrepancy);
        assert_eq!(r.expected_price, Some(d(500, 2)));
        assert_eq!(r.line_delta, None);
        assert!(!r.total_consistent);
        assert!(r.is_flagged());
    }

    #[test]
    fn delta_outside_decimal_range_is_discrepancy() {
        let c = catalog();
        let raw = RawLine::new(1, 1, "A100", Decimal::ONE, Decimal::MIN, Decimal::MIN);
        let r = &run(&c, vec![raw], &TolerancePolicy::default())[0];
        assert_eq!(r.status, Status::Discrepancy);
        assert_eq!(r.price_delta, None);
        assert_eq!(r.delta_percent, None);
    }

    #[test]
    fn relative_tolerance_widens_acceptance() {
        let c = catalog();
        let policy = TolerancePolicy { absolute_tolerance: d(1, 2), relative_tolerance: d(5, 2) };
        let results = run(&c, vec![line("A100", 1, 520), line("A100", 1, 530)], &policy);
        // 0.20 / 5.00 = 4%, 0.30 / 5.00 = 6%.
        assert_eq!(results[0].status, Status::Ok);
        assert_eq!(results[1].status, Status::Discrepancy);
    }

    #[test]
    fn underpriced_delta_is_negative() {
        let c = catalog();
        let r = &run(&c, vec![line("B200", 3, 300)], &TolerancePolicy::default())[0];
        assert_eq!(r.price_delta, Some(d(-20, 2)));
        assert_eq!(r.line_delta, Some(d(-60, 2)));
        assert_eq!(r.status, Status::Discrepancy);
    }

    #[test]
    fn status_follows_match_outcome() {
        let c = catalog();
        let lines = vec![line("A100", 1, 500), line("Olio 1L", 1, 900), line("Nulla da vedere", 1, 100)];
        for r in run(&c, lines, &TolerancePolicy::default()) {
            let matched = r.matched.matched_entry().is_some();
            assert_eq!(r.status == Status::Unmatched, !matched);
            if r.status == Status::Discrepancy {
                assert!(r.price_delta.unwrap().abs() > d(1, 2));
            }
        }
    }

    #[test]
    fn total_mismatch_is_reported_not_corrected() {
        let c = catalog();
        let raw = RawLine::new(1, 4, "A100", d(2, 0), d(500, 2), d(1200, 2)).verify_total(d(1, 2));
        let r = &run(&c, vec![raw], &TolerancePolicy::default())[0];
        assert_eq!(r.status, Status::Ok);
        assert!(!r.total_consistent);
        assert_eq!(r.line().line_total, d(1200, 2));
    }

    #[test]
    fn serializes_flat_with_status() {
        let c = catalog();
        let r = &run(&c, vec![line("A100", 1, 500)], &TolerancePolicy::default())[0];
        let json = serde_json::to_value(r).unwrap();
        assert_eq!(json["status"], "OK");
        assert_eq!(json["match_method"], "exact_code");
        assert_eq!(json["matched_entry"]["product_code"], "A100");
        assert_eq!(r.status.label(), "OK");
        assert_eq!(Status::Unmatched.label(), "NON IN LISTINO");
    }
}
