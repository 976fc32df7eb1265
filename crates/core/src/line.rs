use crate::docref::DocumentRef;
use crate::headers::ColumnRole;
use crate::money::{format_amount_it, Ambiguity, CURRENCY_SCALE};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Annotation attached to a row at extraction time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LineFlag {
    /// A numeric token was read by locale convention rather than shape.
    AmbiguousNumber {
        column: ColumnRole,
        token: String,
        ambiguity: Ambiguity,
    },
    /// `quantity × unit_price` disagrees with the printed line total.
    TotalMismatch { computed: Decimal, printed: Decimal },
    /// The printed amounts are too large to multiply or compare.
    ArithmeticOverflow,
}

impl fmt::Display for LineFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineFlag::AmbiguousNumber { column, token, ambiguity } => {
                write!(f, "{} '{token}': {ambiguity}", column.label())
            }
            LineFlag::TotalMismatch { computed, printed } => write!(
                f,
                "importo stampato {}, calcolato {}",
                format_amount_it(*printed, CURRENCY_SCALE),
                format_amount_it(*computed, CURRENCY_SCALE)
            ),
            LineFlag::ArithmeticOverflow => write!(f, "importi troppo grandi per il controllo"),
        }
    }
}

/// One invoice row as printed. Built once by the extractor and never changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLine {
    /// 1-based page number.
    pub source_page: usize,
    /// 1-based line index on the page.
    pub source_row: usize,
    pub raw_description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub line_total: Decimal,
    /// Delivery note or invoice cited in the row text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_ref: Option<DocumentRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<LineFlag>,
}

impl RawLine {
    pub fn new(
        source_page: usize,
        source_row: usize,
        raw_description: impl Into<String>,
        quantity: Decimal,
        unit_price: Decimal,
        line_total: Decimal,
    ) -> Self {
        Self {
            source_page,
            source_row,
            raw_description: raw_description.into(),
            quantity,
            unit_price,
            line_total,
            document_ref: None,
            flags: Vec::new(),
        }
    }

    pub fn with_document_ref(mut self, document_ref: Option<DocumentRef>) -> Self {
        self.document_ref = document_ref;
        self
    }

    pub fn with_flag(mut self, flag: LineFlag) -> Self {
        self.flags.push(flag);
        self
    }

    /// Cross-check the printed total and record a [`LineFlag::TotalMismatch`]
    /// when it is off by more than `tolerance`, or [`LineFlag::ArithmeticOverflow`]
    /// when the check cannot be computed. The printed values are kept.
    pub fn verify_total(self, tolerance: Decimal) -> Self {
        let printed = self.line_total;
        let Some(computed) = self.computed_total() else {
            return self.with_flag(LineFlag::ArithmeticOverflow);
        };
        match computed.checked_sub(printed) {
            Some(gap) if gap.abs() <= tolerance => self,
            Some(_) => self.with_flag(LineFlag::TotalMismatch { computed, printed }),
            None => self.with_flag(LineFlag::ArithmeticOverflow),
        }
    }

    /// `quantity × unit_price` in cents, `None` past the `Decimal` range.
    pub fn computed_total(&self) -> Option<Decimal> {
        self.quantity
            .checked_mul(self.unit_price)
            .map(|total| total.round_dp(CURRENCY_SCALE))
    }

    /// False when the printed total disagrees or could not be checked.
    pub fn total_consistent(&self) -> bool {
        !self
            .flags
            .iter()
            .any(|f| matches!(f, LineFlag::TotalMismatch { .. } | LineFlag::ArithmeticOverflow))
    }

    pub fn is_flagged(&self) -> bool {
        !self.flags.is_empty()
    }
}
