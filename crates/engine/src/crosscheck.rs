//! Billed quantities against a reference sheet of measures, row by row via
//! the delivery note (or invoice) number printed on the row.

use fatture_catalog::{ReferenceSheet, ReferenceValue};
use fatture_core::{format_amount_it, DocumentRef, RawLine};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::reconcile::{ReconciliationResult, Status};

/// How a measure turns into the quantity that should be billed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QuantityRule {
    /// Measures are rounded up to a multiple of this; zero compares as is.
    pub step: Decimal,
    /// Allowed gap between billed and expected quantity, inclusive.
    pub tolerance: Decimal,
}

impl Default for QuantityRule {
    fn default() -> Self {
        Self { step: Decimal::new(1, 1), tolerance: Decimal::new(1, 2) }
    }
}

impl QuantityRule {
    /// `measure` rounded up to the next multiple of `step`: 1,21 → 1,3.
    pub fn expected_quantity(&self, measure: Decimal) -> Option<Decimal> {
        if self.step <= Decimal::ZERO {
            return Some(measure);
        }
        measure.checked_div(self.step)?.ceil().checked_mul(self.step)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReferenceCheck {
    Confirmed {
        document: DocumentRef,
        measured: Decimal,
        expected_quantity: Decimal,
    },
    QuantityMismatch {
        document: DocumentRef,
        measured: Decimal,
        expected_quantity: Decimal,
        billed: Decimal,
    },
    /// The row cites no delivery note or invoice number.
    NoDocumentRef,
    NotListed { document: DocumentRef },
    MissingMeasure { document: DocumentRef },
    ConflictingMeasures { document: DocumentRef, measures: Vec<Decimal> },
}

impl ReferenceCheck {
    pub fn is_issue(&self) -> bool {
        !matches!(self, ReferenceCheck::Confirmed { .. })
    }
}

fn qty(value: Decimal) -> String {
    let value = value.normalize();
    format_amount_it(value, value.scale())
}

impl fmt::Display for ReferenceCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceCheck::Confirmed { document, expected_quantity, .. } => {
                write!(f, "{document}: quantità {} confermata", qty(*expected_quantity))
            }
            ReferenceCheck::QuantityMismatch { document, measured, expected_quantity, billed } => write!(
                f,
                "{document}: quantità fatturata {}, attesa {} (misura {})",
                qty(*billed),
                qty(*expected_quantity),
                qty(*measured)
            ),
            ReferenceCheck::NoDocumentRef => write!(f, "numero DDT non presente nella fattura"),
            ReferenceCheck::NotListed { document } => write!(f, "{document} non presente nel foglio di riferimento"),
            ReferenceCheck::MissingMeasure { document } => {
                write!(f, "{document}: misura mancante nel foglio di riferimento")
            }
            ReferenceCheck::ConflictingMeasures { document, measures } => {
                let listed: Vec<String> = measures.iter().map(|m| qty(*m)).collect();
                write!(f, "{document}: misure diverse nel foglio di riferimento ({})", listed.join(", "))
            }
        }
    }
}

pub fn check_line(line: &RawLine, sheet: &ReferenceSheet, rule: &QuantityRule) -> ReferenceCheck {
    let Some(document) = line.document_ref.clone() else {
        return ReferenceCheck::NoDocumentRef;
    };
    let measured = match sheet.get(&document) {
        None => return ReferenceCheck::NotListed { document },
        Some(ReferenceValue::Missing) => return ReferenceCheck::MissingMeasure { document },
        Some(ReferenceValue::Conflicting(measures)) => {
            return ReferenceCheck::ConflictingMeasures { document, measures: measures.clone() }
        }
        Some(ReferenceValue::Measured(m)) => *m,
    };

    let expected_quantity = rule.expected_quantity(measured).unwrap_or(measured);
    let within = line
        .quantity
        .checked_sub(expected_quantity)
        .is_some_and(|gap| gap.abs() <= rule.tolerance);
    if within {
        ReferenceCheck::Confirmed { document, measured, expected_quantity }
    } else {
        ReferenceCheck::QuantityMismatch { document, measured, expected_quantity, billed: line.quantity }
    }
}

/// Attach a reference check to every catalog line and to unmatched lines
/// that cite a document. Unmatched lines without one (fees, notes) are left
/// alone.
pub fn apply_reference(results: &mut [ReconciliationResult<'_>], sheet: &ReferenceSheet, rule: &QuantityRule) {
    for result in results.iter_mut() {
        if result.status == Status::Unmatched && result.line().document_ref.is_none() {
            continue;
        }
        let check = check_line(result.line(), sheet, rule);
        if check.is_issue() {
            tracing::debug!(
                page = result.line().source_page,
                row = result.line().source_row,
                check = %check,
                "reference check failed"
            );
        }
        result.reference = Some(check);
    }
}
