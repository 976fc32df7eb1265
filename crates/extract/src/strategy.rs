//! Table detection strategies. Each one proposes the rows of a page with a
//! confidence; the extractor keeps the most confident proposal.

use fatture_core::money::{CURRENCY_SCALE, PRICE_SCALE};
use fatture_core::{parse_amount_it, Ambiguity, ColumnRole, HeaderAliases, LineFlag, RawLine};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

use crate::extract::find_document_ref;
use crate::types::{PageLayout, TextLine};

/// Inputs shared by all strategies for one extraction run.
#[derive(Debug, Clone, Copy)]
pub struct StrategyContext<'a> {
    pub aliases: &'a HeaderAliases,
    pub total_tolerance: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableCandidate {
    pub strategy: &'static str,
    pub lines: Vec<RawLine>,
    /// 0.0 when nothing was found.
    pub confidence: f32,
}

impl TableCandidate {
    fn scored(strategy: &'static str, lines: Vec<RawLine>, base: f32, span: f32) -> Self {
        let confidence = if lines.is_empty() {
            0.0
        } else {
            let consistent = lines.iter().filter(|l| l.total_consistent()).count();
            base + span * consistent as f32 / lines.len() as f32
        };
        Self { strategy, lines, confidence }
    }
}

pub trait TableStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn detect(&self, page: &PageLayout, ctx: &StrategyContext<'_>) -> TableCandidate;
}

// ── Shared helpers ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Anchor {
    role: Option<ColumnRole>,
    x: f32,
    end: f32,
}

/// A header line names at least three roles, including the description
/// and a price or total column.
fn header_anchors(line: &TextLine, aliases: &HeaderAliases) -> Option<Vec<Anchor>> {
    let anchors: Vec<Anchor> = line
        .cells
        .iter()
        .map(|c| Anchor { role: aliases.role_of(&c.text), x: c.x, end: c.end() })
        .collect();
    let roles: Vec<ColumnRole> = anchors.iter().filter_map(|a| a.role).collect();
    let has = |r: ColumnRole| roles.contains(&r);
    let mut distinct = roles.clone();
    distinct.sort();
    distinct.dedup();

    let is_header = distinct.len() >= 3
        && has(ColumnRole::Description)
        && (has(ColumnRole::UnitPrice) || has(ColumnRole::LineTotal));
    is_header.then_some(anchors)
}

/// A number as printed in a given column.
#[derive(Debug, Clone)]
struct Reading {
    value: Decimal,
    flag: Option<LineFlag>,
}

fn read_number(column: ColumnRole, token: &str) -> Option<Reading> {
    let parsed = parse_amount_it(token).ok()?;
    let flag = match (column, parsed.ambiguity) {
        (_, None) => None,
        // Whole quantities are normal.
        (ColumnRole::Quantity, Some(Ambiguity::NoDecimalSeparator)) => None,
        (_, Some(ambiguity)) => Some(LineFlag::AmbiguousNumber { column, token: token.trim().to_string(), ambiguity }),
    };
    Some(Reading { value: parsed.value, flag })
}

fn finish_line(
    page: usize,
    row: usize,
    description: String,
    readings: [Reading; 3],
    tolerance: Decimal,
) -> Option<RawLine> {
    let [qty, price, total] = readings;
    if qty.value < Decimal::ZERO || !description.chars().any(char::is_alphanumeric) {
        return None;
    }
    let document_ref = find_document_ref(&description);
    let mut line = RawLine::new(page, row, description, qty.value, price.value, total.value).with_document_ref(document_ref);
    for flag in [qty.flag, price.flag, total.flag].into_iter().flatten() {
        line = line.with_flag(flag);
    }
    Some(line.verify_total(tolerance))
}

fn exact(value: Decimal) -> Reading {
    Reading { value, flag: None }
}

// ── Column strategy ────────────────────────────────────────────────────────

/// Finds a header line, projects the cells of the following lines onto the
/// header columns, and stops the table when the vertical rhythm breaks.
/// Lines with only description text continue the previous row.
#[derive(Debug, Clone, Copy, Default)]
pub struct ColumnStrategy;

/// Gap, in row pitches, after which the table is considered over.
const REGION_BREAK_PITCHES: f32 = 3.0;
/// Gap, in row pitches, within which a description-only line continues a row.
const CONTINUATION_PITCHES: f32 = 1.6;
/// Line height as a multiple of font size, until a pitch is measured.
const LINE_HEIGHT_FACTOR: f32 = 1.2;
/// Lines allowed between a header and the first row.
const HEADER_GAP_LINES: f32 = 4.0;

struct Region {
    anchors: Vec<Anchor>,
    roles: Vec<ColumnRole>,
    last_y: f32,
    gaps: Vec<f32>,
    rows: usize,
}

enum Parsed {
    Row { description: String, readings: [Reading; 3] },
    Continuation(String),
    Other,
}

struct Draft {
    row: usize,
    description: String,
    readings: [Reading; 3],
}

impl Region {
    fn new(anchors: Vec<Anchor>, header_y: f32) -> Self {
        let roles = anchors.iter().filter_map(|a| a.role).collect();
        Self { anchors, roles, last_y: header_y, gaps: Vec::new(), rows: 0 }
    }

    fn pitch(&self) -> Option<f32> {
        if self.gaps.is_empty() {
            return None;
        }
        let mut sorted = self.gaps.clone();
        sorted.sort_by(f32::total_cmp);
        Some(sorted[sorted.len() / 2])
    }

    fn record(&mut self, y: f32, measured: bool) {
        if measured {
            self.gaps.push(self.last_y - y);
        }
        self.last_y = y;
    }

    fn has(&self, role: ColumnRole) -> bool {
        self.roles.contains(&role)
    }

    /// Index of the header column a cell falls under: most horizontal
    /// overlap, else nearest.
    fn column_of(&self, x: f32, end: f32) -> Option<usize> {
        let overlap = |a: &Anchor| (end.min(a.end) - x.max(a.x)).max(0.0);
        let distance = |a: &Anchor| if end < a.x { a.x - end } else { (x - a.end).max(0.0) };

        let best_overlap = self
            .anchors
            .iter()
            .enumerate()
            .map(|(i, a)| (i, overlap(a)))
            .filter(|(_, o)| *o > 0.0)
            .fold(None, |best: Option<(usize, f32)>, (i, o)| match best {
                Some((_, bo)) if bo >= o => best,
                _ => Some((i, o)),
            });
        if let Some((i, _)) = best_overlap {
            return Some(i);
        }
        self.anchors
            .iter()
            .enumerate()
            .map(|(i, a)| (i, distance(a)))
            .fold(None, |best: Option<(usize, f32)>, (i, d)| match best {
                Some((_, bd)) if bd <= d => best,
                _ => Some((i, d)),
            })
            .map(|(i, _)| i)
    }

    /// Cells under unnamed header columns are dropped.
    fn cells_by_role(&self, line: &TextLine) -> BTreeMap<ColumnRole, String> {
        let mut cells: BTreeMap<ColumnRole, String> = BTreeMap::new();
        for cell in &line.cells {
            if let Some(role) = self.column_of(cell.x, cell.end()).and_then(|i| self.anchors[i].role) {
                let slot = cells.entry(role).or_default();
                if !slot.is_empty() {
                    slot.push(' ');
                }
                slot.push_str(&cell.text);
            }
        }
        cells
    }

    fn parse(&self, line: &TextLine) -> Parsed {
        let cells = self.cells_by_role(line);
        let text = |r: ColumnRole| cells.get(&r).map(String::as_str).unwrap_or("");

        let numeric = [ColumnRole::Quantity, ColumnRole::UnitPrice, ColumnRole::LineTotal];
        let any_numeric = numeric.iter().any(|r| !text(*r).is_empty());

        let description = [text(ColumnRole::Code), text(ColumnRole::Description)]
            .iter()
            .filter(|s| !s.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(" ");

        if !any_numeric {
            if text(ColumnRole::Code).is_empty() && !text(ColumnRole::Description).is_empty() {
                return Parsed::Continuation(text(ColumnRole::Description).to_string());
            }
            return Parsed::Other;
        }

        let read = |role: ColumnRole| -> Option<Option<Reading>> {
            if self.has(role) {
                read_number(role, text(role)).map(Some)
            } else {
                Some(None)
            }
        };
        let (Some(qty), Some(price), Some(total)) =
            (read(ColumnRole::Quantity), read(ColumnRole::UnitPrice), read(ColumnRole::LineTotal))
        else {
            return Parsed::Other;
        };

        let qty = qty.unwrap_or_else(|| exact(Decimal::ONE));
        let readings = match (price, total) {
            (Some(p), Some(t)) => [qty, p, t],
            (Some(p), None) => match qty.value.checked_mul(p.value) {
                Some(t) => [qty, p, exact(t.round_dp(CURRENCY_SCALE))],
                None => {
                    tracing::warn!(description = %description, "row skipped: total out of range");
                    return Parsed::Other;
                }
            },
            (None, Some(t)) => match t.value.checked_div(qty.value) {
                Some(p) => [qty, exact(p.round_dp(PRICE_SCALE)), t],
                None => return Parsed::Other,
            },
            (None, None) => return Parsed::Other,
        };
        Parsed::Row { description, readings }
    }
}

impl TableStrategy for ColumnStrategy {
    fn name(&self) -> &'static str {
        "columns"
    }

    fn detect(&self, page: &PageLayout, ctx: &StrategyContext<'_>) -> TableCandidate {
        let mut out = Vec::new();
        let mut region: Option<Region> = None;
        let mut draft: Option<Draft> = None;

        let flush = |draft: &mut Option<Draft>, out: &mut Vec<RawLine>| {
            if let Some(d) = draft.take() {
                if let Some(line) = finish_line(page.number, d.row, d.description, d.readings, ctx.total_tolerance) {
                    out.push(line);
                }
            }
        };

        for (idx, line) in page.lines.iter().enumerate() {
            if let Some(anchors) = header_anchors(line, ctx.aliases) {
                flush(&mut draft, &mut out);
                region = Some(Region::new(anchors, line.y));
                continue;
            }
            let Some(reg) = region.as_mut() else { continue };

            let line_height = line.font_size.max(1.0) * LINE_HEIGHT_FACTOR;
            let gap = reg.last_y - line.y;
            let limit = match reg.pitch() {
                Some(p) => p * REGION_BREAK_PITCHES,
                None => line_height * HEADER_GAP_LINES,
            };
            if gap > limit {
                flush(&mut draft, &mut out);
                region = None;
                continue;
            }

            match reg.parse(line) {
                Parsed::Row { description, readings } => {
                    flush(&mut draft, &mut out);
                    let measured = reg.rows > 0;
                    reg.record(line.y, measured);
                    reg.rows += 1;
                    draft = Some(Draft { row: idx + 1, description, readings });
                }
                Parsed::Continuation(text) => {
                    let pitch = reg.pitch().unwrap_or(line_height);
                    match draft.as_mut() {
                        Some(d) if gap <= pitch * CONTINUATION_PITCHES => {
                            d.description.push(' ');
                            d.description.push_str(&text);
                            reg.record(line.y, false);
                        }
                        _ => {}
                    }
                }
                Parsed::Other => {}
            }
        }
        flush(&mut draft, &mut out);

        TableCandidate::scored(self.name(), out, 0.6, 0.4)
    }
}

// ── Trailing numbers strategy ──────────────────────────────────────────────

/// Treats any line ending in `qty price total [vat]` as a row. Works without
/// a header; the `qty × price ≈ total` check picks the alignment when a
/// trailing number could be a VAT rate.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrailingNumbersStrategy;

const UNIT_TOKENS: &[&str] = &["pz", "pz.", "nr", "nr.", "n.", "kg", "lt", "l", "mt", "m", "cf", "conf", "conf.", "cad", "cad."];

fn is_vat_marker(token: &str) -> bool {
    if let Some(rate) = token.strip_suffix('%') {
        return parse_amount_it(rate).is_ok();
    }
    token.len() <= 3
        && token.chars().all(|c| c.is_ascii_alphanumeric())
        && token.chars().any(|c| c.is_ascii_uppercase())
        && !token.chars().any(|c| c.is_ascii_lowercase())
}

impl TrailingNumbersStrategy {
    fn parse_line(&self, page: usize, row: usize, line: &TextLine, tolerance: Decimal) -> Option<RawLine> {
        let text = line.text();
        let tokens: Vec<&str> = text.split_whitespace().collect();

        let mut end = tokens.len();
        if end > 0 && is_vat_marker(tokens[end - 1]) {
            end -= 1;
        }
        let mut start = end;
        while start > 0 && parse_amount_it(tokens[start - 1]).is_ok() {
            start -= 1;
        }
        if end - start < 3 {
            return None;
        }

        let read_at = |at: usize| -> Option<[Reading; 3]> {
            Some([
                read_number(ColumnRole::Quantity, tokens[at])?,
                read_number(ColumnRole::UnitPrice, tokens[at + 1])?,
                read_number(ColumnRole::LineTotal, tokens[at + 2])?,
            ])
        };
        let consistent = |r: &[Reading; 3]| {
            r[0].value
                .checked_mul(r[1].value)
                .and_then(|t| t.round_dp(CURRENCY_SCALE).checked_sub(r[2].value))
                .is_some_and(|gap| gap.abs() <= tolerance)
        };

        // Last three first, then shifted left by a trailing VAT rate.
        let mut alignments = vec![end - 3];
        if end - start >= 4 {
            alignments.push(end - 4);
        }
        let (at, readings) = alignments
            .iter()
            .find_map(|&at| read_at(at).filter(|r| consistent(r)).map(|r| (at, r)))
            .or_else(|| read_at(end - 3).map(|r| (end - 3, r)))?;

        let mut words = &tokens[..at];
        if let Some(last) = words.last() {
            if UNIT_TOKENS.contains(&last.to_lowercase().as_str()) {
                words = &words[..words.len() - 1];
            }
        }
        finish_line(page, row, words.join(" "), readings, tolerance)
    }
}

impl TableStrategy for TrailingNumbersStrategy {
    fn name(&self) -> &'static str {
        "trailing_numbers"
    }

    fn detect(&self, page: &PageLayout, ctx: &StrategyContext<'_>) -> TableCandidate {
        let lines = page
            .lines
            .iter()
            .enumerate()
            .filter(|(_, line)| header_anchors(line, ctx.aliases).is_none())
            .filter_map(|(idx, line)| self.parse_line(page.number, idx + 1, line, ctx.total_tolerance))
            .collect();
        TableCandidate::scored(self.name(), lines, 0.3, 0.5)
    }
}
