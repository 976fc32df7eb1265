//! Workbook export. Layout: headline on row 1, colour legend on row 2,
//! column titles on row 4, one row per invoice line below.

use fatture_catalog::MatchMethod;
use fatture_engine::{ReconciliationResult, Report, Status};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_xlsxwriter::{Color, Format, Workbook, Worksheet, XlsxError};
use std::path::Path;

const SHEET_NAME: &str = "Controllo";
const HEADER_ROW: u32 = 3;

const RED: u32 = 0xFFC7CE;
const YELLOW: u32 = 0xFFEB9C;
const BLUE: u32 = 0xC6E0FF;

const COLUMNS: &[(&str, f64)] = &[
    ("Documento", 22.0),
    ("Fattura", 12.0),
    ("Data", 11.0),
    ("Pag.", 6.0),
    ("Riga", 6.0),
    ("Descrizione", 45.0),
    ("Q.tà", 8.0),
    ("Prezzo", 11.0),
    ("Importo", 11.0),
    ("Codice", 10.0),
    ("Descrizione listino", 40.0),
    ("Prezzo listino", 11.0),
    ("Differenza", 10.0),
    ("Diff. %", 9.0),
    ("Impatto riga", 11.0),
    ("Abbinamento", 14.0),
    ("Affidabilità", 10.0),
    ("Stato", 16.0),
    ("Note", 50.0),
    ("Controllo riferimento", 50.0),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fill {
    Plain,
    /// Price discrepancy.
    Error,
    /// Unmatched line, a row the extractor flagged, or a failed
    /// reference check.
    Note,
    /// Matched by description only.
    Fuzzy,
}

fn fill_for(result: &ReconciliationResult<'_>) -> Fill {
    match result.status {
        Status::Discrepancy => Fill::Error,
        Status::Unmatched => Fill::Note,
        Status::Ok if result.is_flagged() || result.has_reference_issue() => Fill::Note,
        Status::Ok if result.matched.match_method() == MatchMethod::FuzzyDescription => Fill::Fuzzy,
        Status::Ok => Fill::Plain,
    }
}

struct Palette {
    text: Format,
    money: Format,
    price: Format,
    ratio: Format,
}

impl Palette {
    fn new(fill: Fill) -> Self {
        let base = match fill {
            Fill::Plain => Format::new(),
            Fill::Error => Format::new().set_background_color(Color::RGB(RED)),
            Fill::Note => Format::new().set_background_color(Color::RGB(YELLOW)),
            Fill::Fuzzy => Format::new().set_background_color(Color::RGB(BLUE)),
        };
        Self {
            money: base.clone().set_num_format("#,##0.00"),
            price: base.clone().set_num_format("#,##0.00##"),
            ratio: base.clone().set_num_format("0.00"),
            text: base,
        }
    }
}

fn number(value: Decimal) -> f64 {
    value.to_f64().unwrap_or_default()
}

/// One sheet covering every report, in the order given.
pub fn write_xlsx(path: &Path, reports: &[&Report<'_>]) -> Result<(), XlsxError> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME)?;

    let headline = reports
        .iter()
        .find(|r| !r.is_clean())
        .or(reports.first())
        .map(|r| r.headline())
        .unwrap_or("Nessuna fattura elaborata.");
    let bold = Format::new().set_bold();
    sheet.merge_range(0, 0, 0, (COLUMNS.len() - 1) as u16, headline, &bold)?;

    sheet.write_string_with_format(1, 0, "Legenda:", &bold)?;
    sheet.write_string_with_format(1, 1, "Errore prezzo (rosso)", &Palette::new(Fill::Error).text)?;
    sheet.write_string_with_format(1, 2, "Nota / riga non riconosciuta (giallo)", &Palette::new(Fill::Note).text)?;
    sheet.write_string_with_format(1, 3, "Abbinata per descrizione (blu)", &Palette::new(Fill::Fuzzy).text)?;

    for (col, (title, width)) in COLUMNS.iter().enumerate() {
        sheet.write_string_with_format(HEADER_ROW, col as u16, *title, &bold)?;
        sheet.set_column_width(col as u16, *width)?;
    }
    sheet.set_freeze_panes(HEADER_ROW + 1, 0)?;

    // Indexed by `Fill as usize`.
    let palettes = [Fill::Plain, Fill::Error, Fill::Note, Fill::Fuzzy].map(Palette::new);

    let mut row = HEADER_ROW + 1;
    for report in reports {
        for result in &report.results {
            write_result(sheet, row, report, result, &palettes[fill_for(result) as usize])?;
            row += 1;
        }
    }

    workbook.save(path)?;
    Ok(())
}

fn write_result(
    sheet: &mut Worksheet,
    row: u32,
    report: &Report<'_>,
    result: &ReconciliationResult<'_>,
    p: &Palette,
) -> Result<(), XlsxError> {
    let line = result.line();
    let entry = result.matched.matched_entry();

    let texts: [(u16, String); 9] = [
        (0, report.document.clone().unwrap_or_default()),
        (1, report.invoice_number.clone().unwrap_or_default()),
        (2, report.invoice_date.map(|d| d.format("%d/%m/%Y").to_string()).unwrap_or_default()),
        (5, line.raw_description.clone()),
        (9, entry.map(|e| e.product_code.clone()).unwrap_or_default()),
        (10, entry.map(|e| e.description.clone()).unwrap_or_default()),
        (15, result.matched.match_method().label().to_string()),
        (17, result.status.label().to_string()),
        (19, result.reference.as_ref().map(ToString::to_string).unwrap_or_default()),
    ];
    for (col, value) in &texts {
        sheet.write_string_with_format(row, *col, value, &p.text)?;
    }

    sheet.write_number_with_format(row, 3, line.source_page as f64, &p.text)?;
    sheet.write_number_with_format(row, 4, line.source_row as f64, &p.text)?;
    sheet.write_number_with_format(row, 6, number(line.quantity), &p.text)?;
    sheet.write_number_with_format(row, 7, number(line.unit_price), &p.price)?;
    sheet.write_number_with_format(row, 8, number(line.line_total), &p.money)?;

    let optional = [
        (11, result.expected_price, &p.price),
        (12, result.price_delta, &p.price),
        (13, result.delta_percent, &p.ratio),
        (14, result.line_delta, &p.money),
    ];
    for (col, value, format) in optional {
        match value {
            Some(v) => sheet.write_number_with_format(row, col, number(v), format)?,
            None => sheet.write_blank(row, col, format)?,
        };
    }
    sheet.write_number_with_format(row, 16, result.matched.match_confidence(), &p.ratio)?;

    let notes: Vec<String> = line.flags.iter().map(ToString::to_string).collect();
    sheet.write_string_with_format(row, 18, notes.join("; "), &p.text)?;
    Ok(())
}
