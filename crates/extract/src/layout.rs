//! Positioned text from PDF content streams, and span-to-line grouping.
//!
//! ```text
//! content ops  ->  TextSpan[]  ->  TextLine[] (cells)  ->  PageLayout
//! ```

use lopdf::content::Operation;
use lopdf::Object;

use crate::types::{PageLayout, TextLine, TextSpan};

/// Spans whose baselines differ by at most this many points share a line.
pub const Y_TOLERANCE: f32 = 2.0;

/// Glyph width as a fraction of font size when no metrics are read.
const APPROX_CHAR_WIDTH_RATIO: f32 = 0.5;

/// Below this gap (points) adjacent spans are glued without a space.
const MIN_WORD_GAP: f32 = 1.5;

/// Gaps up to this multiple of the font size join words of one cell;
/// anything wider starts a new cell.
const CELL_GAP_FACTOR: f32 = 1.0;

/// Share of control or replacement chars above which page text is treated
/// as undecodable (CID fonts without a simple encoding).
const UNREADABLE_RATIO: f32 = 0.2;

const IDENTITY_MATRIX: [f32; 6] = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

#[derive(Debug, Clone)]
struct TextState {
    font_size: f32,
    text_matrix: [f32; 6],
    line_matrix: [f32; 6],
    horiz_scale: f32,
    char_spacing: f32,
    word_spacing: f32,
    text_rise: f32,
    leading: f32,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            font_size: 0.0,
            text_matrix: IDENTITY_MATRIX,
            line_matrix: IDENTITY_MATRIX,
            horiz_scale: 1.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            text_rise: 0.0,
            leading: 0.0,
        }
    }
}

impl TextState {
    fn x(&self) -> f32 {
        self.text_matrix[4]
    }

    fn y(&self) -> f32 {
        self.text_matrix[5] + self.text_rise
    }

    fn effective_font_size(&self) -> f32 {
        let scale = (self.text_matrix[1].powi(2) + self.text_matrix[3].powi(2)).sqrt();
        (self.font_size * scale).abs()
    }

    fn char_width(&self) -> f32 {
        self.effective_font_size() * APPROX_CHAR_WIDTH_RATIO * self.horiz_scale
    }

    fn advance_x(&mut self, dx: f32) {
        self.text_matrix[4] += dx * self.text_matrix[0];
        self.text_matrix[5] += dx * self.text_matrix[1];
    }

    fn translate_line(&mut self, tx: f32, ty: f32) {
        let new_tx = self.line_matrix[0] * tx + self.line_matrix[2] * ty + self.line_matrix[4];
        let new_ty = self.line_matrix[1] * tx + self.line_matrix[3] * ty + self.line_matrix[5];
        self.line_matrix[4] = new_tx;
        self.line_matrix[5] = new_ty;
        self.text_matrix = self.line_matrix;
    }

    fn next_line(&mut self) {
        self.translate_line(0.0, -self.leading);
    }

    fn advance_after_show(&mut self, text: &str) {
        let mut dx = 0.0;
        for ch in text.chars() {
            dx += self.font_size * APPROX_CHAR_WIDTH_RATIO * self.horiz_scale + self.char_spacing;
            if ch == ' ' {
                dx += self.word_spacing;
            }
        }
        self.advance_x(dx);
    }
}

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}

fn numbers<const N: usize>(operands: &[Object]) -> Option<[f32; N]> {
    let mut out = [0.0; N];
    for (slot, obj) in out.iter_mut().zip(operands) {
        *slot = number(obj)?;
    }
    (operands.len() >= N).then_some(out)
}

/// Decode a PDF string operand. UTF-16BE when it carries a BOM, otherwise
/// single-byte WinAnsi (Latin-1 plus the euro sign at 0x80).
pub fn decode_pdf_string(bytes: &[u8]) -> String {
    if let Some(body) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = body.chunks_exact(2).map(|c| u16::from_be_bytes([c[0], c[1]])).collect();
        return String::from_utf16_lossy(&units);
    }
    bytes
        .iter()
        .map(|&b| match b {
            0x80 => '€',
            _ => char::from(b),
        })
        .collect()
}

fn show(text: String, state: &mut TextState, spans: &mut Vec<TextSpan>) {
    if text.is_empty() {
        return;
    }
    let width = text.chars().count() as f32 * state.char_width();
    spans.push(TextSpan {
        x: state.x(),
        y: state.y(),
        width,
        font_size: state.effective_font_size(),
        text: text.clone(),
    });
    state.advance_after_show(&text);
}

fn show_array(items: &[Object], state: &mut TextState, spans: &mut Vec<TextSpan>) {
    let mut buf = String::new();
    let start_x = state.x();
    let start_y = state.y();

    for item in items {
        match item {
            Object::String(bytes, _) => {
                let fragment = decode_pdf_string(bytes);
                buf.push_str(&fragment);
                state.advance_after_show(&fragment);
            }
            other => {
                if let Some(adj) = number(other) {
                    let dx = -adj / 1000.0 * state.font_size * state.horiz_scale;
                    if dx > state.char_width() * 0.3 && !buf.is_empty() && !buf.ends_with(' ') {
                        buf.push(' ');
                    }
                    state.advance_x(dx);
                }
            }
        }
    }

    let text = buf.trim_end();
    if !text.is_empty() {
        spans.push(TextSpan {
            text: text.to_string(),
            x: start_x,
            y: start_y,
            width: (state.x() - start_x).max(0.0),
            font_size: state.effective_font_size(),
        });
    }
}

/// Walk a page's content operations and collect positioned spans.
///
/// | op | effect |
/// |----|--------|
/// | `BT` | reset text and line matrices |
/// | `Tf` | font size |
/// | `Tm` | set text matrix |
/// | `Td` / `TD` | move (TD also sets leading) |
/// | `T*` / `TL` | next line / leading |
/// | `Tc` `Tw` `Tz` `Ts` | spacing, scaling, rise |
/// | `Tj` `TJ` `'` `"` | show text |
pub fn spans_from_operations(operations: &[Operation]) -> Vec<TextSpan> {
    let mut state = TextState::default();
    let mut spans = Vec::new();

    for op in operations {
        let ops = op.operands.as_slice();
        match op.operator.as_str() {
            "BT" => {
                state.text_matrix = IDENTITY_MATRIX;
                state.line_matrix = IDENTITY_MATRIX;
            }
            "Tf" => {
                if let Some(size) = ops.get(1).and_then(number) {
                    state.font_size = size;
                }
            }
            "Tm" => {
                if let Some(m) = numbers::<6>(ops) {
                    state.text_matrix = m;
                    state.line_matrix = m;
                }
            }
            "Td" => {
                if let Some([tx, ty]) = numbers::<2>(ops) {
                    state.translate_line(tx, ty);
                }
            }
            "TD" => {
                if let Some([tx, ty]) = numbers::<2>(ops) {
                    state.leading = -ty;
                    state.translate_line(tx, ty);
                }
            }
            "T*" => state.next_line(),
            "TL" => {
                if let Some(v) = ops.first().and_then(number) {
                    state.leading = v;
                }
            }
            "Tc" => {
                if let Some(v) = ops.first().and_then(number) {
                    state.char_spacing = v;
                }
            }
            "Tw" => {
                if let Some(v) = ops.first().and_then(number) {
                    state.word_spacing = v;
                }
            }
            "Tz" => {
                if let Some(v) = ops.first().and_then(number) {
                    state.horiz_scale = v / 100.0;
                }
            }
            "Ts" => {
                if let Some(v) = ops.first().and_then(number) {
                    state.text_rise = v;
                }
            }
            "Tj" => {
                if let Some(Object::String(bytes, _)) = ops.first() {
                    show(decode_pdf_string(bytes), &mut state, &mut spans);
                }
            }
            "TJ" => {
                if let Some(Object::Array(items)) = ops.first() {
                    show_array(items, &mut state, &mut spans);
                }
            }
            "'" => {
                state.next_line();
                if let Some(Object::String(bytes, _)) = ops.first() {
                    show(decode_pdf_string(bytes), &mut state, &mut spans);
                }
            }
            "\"" => {
                if let (Some(aw), Some(ac)) = (ops.first().and_then(number), ops.get(1).and_then(number)) {
                    state.word_spacing = aw;
                    state.char_spacing = ac;
                }
                state.next_line();
                if let Some(Object::String(bytes, _)) = ops.get(2) {
                    show(decode_pdf_string(bytes), &mut state, &mut spans);
                }
            }
            _ => {}
        }
    }

    spans
}

/// True when too much of the decoded text is control or replacement chars.
pub fn looks_unreadable(spans: &[TextSpan]) -> bool {
    let (mut bad, mut total) = (0usize, 0usize);
    for ch in spans.iter().flat_map(|s| s.text.chars()) {
        total += 1;
        if ch == char::REPLACEMENT_CHARACTER || (ch.is_control() && !ch.is_whitespace()) {
            bad += 1;
        }
    }
    total > 0 && bad as f32 / total as f32 > UNREADABLE_RATIO
}

/// Group spans into lines (top first) and merge neighbours into cells.
pub fn group_spans_into_lines(mut spans: Vec<TextSpan>) -> Vec<TextLine> {
    spans.retain(|s| !s.text.trim().is_empty());
    if spans.is_empty() {
        return Vec::new();
    }

    spans.sort_by(|a, b| b.y.total_cmp(&a.y).then(a.x.total_cmp(&b.x)));

    let mut lines = Vec::new();
    let mut current: Vec<TextSpan> = Vec::new();
    let mut current_y = spans[0].y;

    for span in spans {
        if (span.y - current_y).abs() <= Y_TOLERANCE {
            current.push(span);
        } else {
            lines.push(assemble_line(std::mem::take(&mut current)));
            current_y = span.y;
            current.push(span);
        }
    }
    if !current.is_empty() {
        lines.push(assemble_line(current));
    }
    lines
}

fn assemble_line(mut spans: Vec<TextSpan>) -> TextLine {
    spans.sort_by(|a, b| a.x.total_cmp(&b.x));

    let mut cells: Vec<TextSpan> = Vec::with_capacity(spans.len());
    for mut span in spans {
        span.text = span.text.trim().to_string();
        if let Some(prev) = cells.last_mut() {
            let gap = span.x - prev.end();
            let size = prev.font_size.max(span.font_size).max(1.0);
            if gap < MIN_WORD_GAP && gap > -size {
                prev.text.push_str(&span.text);
                prev.width = span.end() - prev.x;
                continue;
            }
            if gap >= MIN_WORD_GAP && gap <= size * CELL_GAP_FACTOR {
                prev.text.push(' ');
                prev.text.push_str(&span.text);
                prev.width = span.end() - prev.x;
                continue;
            }
        }
        cells.push(span);
    }

    let y = cells.first().map_or(0.0, |c| c.y);
    let font_size = cells.iter().map(|c| c.font_size).fold(0.0, f32::max);
    TextLine { y, font_size, cells }
}

/// Nominal metrics for text laid out from plain strings.
const TEXT_FONT_SIZE: f32 = 10.0;
const TEXT_CHAR_WIDTH: f32 = TEXT_FONT_SIZE * APPROX_CHAR_WIDTH_RATIO;
const TEXT_LINE_HEIGHT: f32 = 12.0;

/// Lay out plain text as a page: one line per text line, cells split on
/// runs of two or more spaces, X taken from the character column.
pub fn layout_from_text(number: usize, text: &str) -> PageLayout {
    let mut lines = Vec::new();
    let mut y = 800.0;

    for raw in text.lines() {
        let cells = split_cells(raw)
            .into_iter()
            .map(|(col, cell)| TextSpan {
                text: cell.to_string(),
                x: col as f32 * TEXT_CHAR_WIDTH,
                y,
                width: cell.chars().count() as f32 * TEXT_CHAR_WIDTH,
                font_size: TEXT_FONT_SIZE,
            })
            .collect::<Vec<_>>();
        if !cells.is_empty() {
            lines.push(TextLine { y, font_size: TEXT_FONT_SIZE, cells });
        }
        y -= TEXT_LINE_HEIGHT;
    }

    PageLayout { number, lines }
}

/// `(char column, text)` of each cell in a line.
fn split_cells(line: &str) -> Vec<(usize, &str)> {
    let chars: Vec<(usize, char)> = line.char_indices().collect();
    let mut cells = Vec::new();
    let mut start: Option<usize> = None;
    let mut spaces = 0;

    for (col, &(byte, ch)) in chars.iter().enumerate() {
        if ch == ' ' {
            spaces += 1;
            if spaces == 2 {
                if let Some(s) = start.take() {
                    let (s_byte, _) = chars[s];
                    cells.push((s, line[s_byte..byte - 1].trim_end()));
                }
            }
            continue;
        }
        if start.is_none() {
            start = Some(col);
        }
        spaces = 0;
    }
    if let Some(s) = start {
        let (s_byte, _) = chars[s];
        cells.push((s, line[s_byte..].trim_end()));
    }
    cells.retain(|(_, c)| !c.is_empty());
    cells
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::StringFormat;

    fn op(operator: &str, operands: Vec<Object>) -> Operation {
        Operation::new(operator, operands)
    }

    fn lit(s: &str) -> Object {
        Object::String(s.as_bytes().to_vec(), StringFormat::Literal)
    }

    fn span(text: &str, x: f32, y: f32) -> TextSpan {
        TextSpan { text: text.into(), x, y, width: text.len() as f32 * 5.0, font_size: 10.0 }
    }

    #[test]
    fn td_positions_spans() {
        let ops = vec![
            op("BT", vec![]),
            op("Tf", vec![Object::Name(b"F1".to_vec()), Object::Integer(10)]),
            op("Td", vec![Object::Integer(50), Object::Integer(700)]),
            op("Tj", vec![lit("A100")]),
            op("ET", vec![]),
            op("BT", vec![]),
            op("Td", vec![Object::Integer(300), Object::Integer(700)]),
            op("Tj", vec![lit("5,00")]),
            op("ET", vec![]),
        ];
        let spans = spans_from_operations(&ops);
        assert_eq!(spans.len(), 2);
        assert_eq!((spans[0].x, spans[0].y), (50.0, 700.0));
        assert_eq!(spans[0].width, 20.0);
        assert_eq!((spans[1].x, spans[1].y), (300.0, 700.0));
    }

    #[test]
    fn leading_moves_lines_down() {
        let ops = vec![
            op("BT", vec![]),
            op("Tf", vec![Object::Name(b"F1".to_vec()), Object::Integer(10)]),
            op("TL", vec![Object::Integer(14)]),
            op("Td", vec![Object::Integer(40), Object::Integer(500)]),
            op("Tj", vec![lit("uno")]),
            op("T*", vec![]),
            op("Tj", vec![lit("due")]),
            op("'", vec![lit("tre")]),
            op("ET", vec![]),
        ];
        let ys: Vec<f32> = spans_from_operations(&ops).iter().map(|s| s.y).collect();
        assert_eq!(ys, vec![500.0, 486.0, 472.0]);
    }

    #[test]
    fn tj_array_kerning_inserts_space() {
        let ops = vec![
            op("BT", vec![]),
            op("Tf", vec![Object::Name(b"F1".to_vec()), Object::Integer(10)]),
            op(
                "TJ",
                vec![Object::Array(vec![lit("Olio"), Object::Integer(-300), lit("1L")])],
            ),
            op("ET", vec![]),
        ];
        let spans = spans_from_operations(&ops);
        assert_eq!(spans[0].text, "Olio 1L");
    }

    #[test]
    fn winansi_euro_sign() {
        assert_eq!(decode_pdf_string(b"\x80 5,00"), "€ 5,00");
        assert_eq!(decode_pdf_string(&[0xFE, 0xFF, 0x00, 0x41, 0x00, 0xE0]), "Aà");
    }

    #[test]
    fn groups_by_baseline_and_splits_cells() {
        let lines = group_spans_into_lines(vec![
            span("5,00", 300.0, 700.0),
            span("Olio", 90.0, 700.5),
            span("1L", 112.0, 699.0),
            span("A100", 40.0, 700.0),
            span("B200", 40.0, 686.0),
        ]);
        assert_eq!(lines.len(), 2);
        let texts: Vec<&str> = lines[0].cells.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["A100", "Olio 1L", "5,00"]);
        assert_eq!(lines[1].text(), "B200");
    }

    #[test]
    fn control_heavy_text_is_unreadable() {
        assert!(looks_unreadable(&[span("\u{1}\u{2}\u{3}a", 0.0, 0.0)]));
        assert!(!looks_unreadable(&[span("Fattura 12", 0.0, 0.0)]));
        assert!(!looks_unreadable(&[]));
    }

    #[test]
    fn text_layout_splits_on_double_space() {
        let page = layout_from_text(2, "Codice  Descrizione    Prezzo\n\nA100    Olio 1L        5,00");
        assert_eq!(page.number, 2);
        assert_eq!(page.lines.len(), 2);
        let cells: Vec<&str> = page.lines[1].cells.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(cells, vec!["A100", "Olio 1L", "5,00"]);
        assert_eq!(page.lines[1].cells[1].x, 8.0 * 5.0);
        assert!(page.lines[0].y > page.lines[1].y);
    }
}
