//! Reference sheet of measured quantities, keyed by delivery note (DDT) or
//! invoice number. Billed quantities are cross-checked against it.

use fatture_core::{normalize_header, DocumentKind, DocumentRef};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::error::CatalogError;
use crate::loader::{detect_format, Format, HEADER_SCAN_ROWS};
use crate::sheet::{self, Cell, Table};

/// Spreadsheet floats carry binary noise past this scale.
const MEASURE_SCALE: u32 = 6;

const DDT_HEADERS: &[&str] = &["ddt", "n.ddt", "nddt", "numeroddt", "ddtn.", "dt", "bolla"];
const INVOICE_HEADERS: &[&str] = &["fattura", "n.fattura", "nfattura", "numerofattura", "ft"];
const MEASURE_HEADERS: &[&str] = &[
    "volume", "volumem3", "volume(m3)", "volume(m³)", "m3", "m³", "mc", "misura", "misurato",
    "quantitàmisurata", "quantitamisurata",
];

#[derive(Debug, Error)]
pub enum ReferenceError {
    #[error(transparent)]
    Read(#[from] CatalogError),
    #[error(
        "reference sheet {}: no DDT or invoice column with a measure column in the first {scanned} rows",
        .path.display()
    )]
    NoHeader { path: PathBuf, scanned: usize },
}

/// What the sheet says about one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceValue {
    Measured(Decimal),
    /// Listed, but no row carries a readable measure.
    Missing,
    /// Listed more than once with different measures, in sheet order.
    Conflicting(Vec<Decimal>),
}

#[derive(Debug, Clone, Default)]
pub struct ReferenceSheet {
    source: String,
    values: HashMap<DocumentRef, ReferenceValue>,
    rows_read: usize,
}

/// Load a reference sheet (xlsx, xls, ods or csv).
pub fn load_reference(path: &Path) -> Result<ReferenceSheet, ReferenceError> {
    let tables = match detect_format(path) {
        Some(Format::Workbook) => sheet::read_workbook(path)?,
        Some(Format::Csv) => vec![sheet::read_csv(path)?],
        None => return Err(CatalogError::UnsupportedFormat { path: path.to_path_buf() }.into()),
    };
    ReferenceSheet::from_tables(path, &tables)
}

struct Columns {
    ddt: Option<usize>,
    invoice: Option<usize>,
    measure: usize,
}

fn find_columns(cells: &[Cell]) -> Option<Columns> {
    let names: Vec<String> = cells.iter().map(|c| normalize_header(&c.text())).collect();
    let position = |aliases: &[&str]| names.iter().position(|n| aliases.contains(&n.as_str()));
    let columns = Columns {
        ddt: position(DDT_HEADERS),
        invoice: position(INVOICE_HEADERS),
        measure: position(MEASURE_HEADERS)?,
    };
    (columns.ddt.is_some() || columns.invoice.is_some()).then_some(columns)
}

impl ReferenceSheet {
    /// Build from known measures; later duplicates follow the same rules as
    /// sheet rows.
    pub fn from_measures<I>(source: impl Into<String>, measures: I) -> Self
    where
        I: IntoIterator<Item = (DocumentRef, Decimal)>,
    {
        let mut sheet = Self { source: source.into(), ..Self::default() };
        for (document, measure) in measures {
            sheet.rows_read += 1;
            sheet.record(document, Some(measure));
        }
        sheet
    }

    /// Read a CSV reference sheet from memory. `label` stands in for the file name.
    pub fn from_csv_bytes(label: &str, bytes: &[u8]) -> Result<Self, ReferenceError> {
        let path = Path::new(label);
        let table = sheet::parse_csv(path, bytes)?;
        Self::from_tables(path, &[table])
    }

    fn from_tables(path: &Path, tables: &[Table]) -> Result<Self, ReferenceError> {
        let source = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        for table in tables {
            let header = table
                .rows
                .iter()
                .take(HEADER_SCAN_ROWS)
                .enumerate()
                .find_map(|(index, row)| find_columns(row).map(|columns| (index, columns)));
            if let Some((index, columns)) = header {
                let mut sheet = Self { source, ..Self::default() };
                sheet.read_rows(table, index, &columns);
                tracing::info!(
                    source = %sheet.source,
                    header_row = table.first_row + index,
                    documents = sheet.len(),
                    rows = sheet.rows_read,
                    "reference sheet loaded"
                );
                return Ok(sheet);
            }
        }
        Err(ReferenceError::NoHeader { path: path.to_path_buf(), scanned: HEADER_SCAN_ROWS })
    }

    fn read_rows(&mut self, table: &Table, header: usize, columns: &Columns) {
        let empty = Cell::Empty;
        for (offset, row) in table.rows.iter().enumerate().skip(header + 1) {
            if row.iter().all(Cell::is_empty) {
                continue;
            }
            self.rows_read += 1;
            let cell = |i: usize| row.get(i).unwrap_or(&empty);
            let measure = cell(columns.measure).amount().map(|m| m.round_dp(MEASURE_SCALE));

            let documents: Vec<DocumentRef> = [(columns.ddt, DocumentKind::Ddt), (columns.invoice, DocumentKind::Invoice)]
                .into_iter()
                .filter_map(|(col, kind)| DocumentRef::new(kind, &cell(col?).text()))
                .collect();
            if documents.is_empty() {
                tracing::warn!(row = table.first_row + offset, "reference row skipped: no document number");
                continue;
            }
            for document in documents {
                self.record(document, measure);
            }
        }
    }

    fn record(&mut self, document: DocumentRef, measure: Option<Decimal>) {
        let value = self.values.entry(document).or_insert(ReferenceValue::Missing);
        let Some(m) = measure else { return };
        match *value {
            ReferenceValue::Missing => *value = ReferenceValue::Measured(m),
            ReferenceValue::Measured(held) if held == m => {}
            ReferenceValue::Measured(held) => *value = ReferenceValue::Conflicting(vec![held, m]),
            ReferenceValue::Conflicting(ref mut seen) => {
                if !seen.contains(&m) {
                    seen.push(m);
                }
            }
        }
    }

    pub fn get(&self, document: &DocumentRef) -> Option<&ReferenceValue> {
        self.values.get(document)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Distinct documents listed.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn rows_read(&self) -> usize {
        self.rows_read
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_xlsxwriter::Workbook;

    fn ddt(n: &str) -> DocumentRef {
        DocumentRef::new(DocumentKind::Ddt, n).unwrap()
    }

    fn d(units: i64, scale: u32) -> Decimal {
        Decimal::new(units, scale)
    }

    const SHEET: &str = "\
Volumi spedizioni febbraio;;;
;;;
DDT;Fattura;Cliente;Volume
132;;Rossi;1,25
DDT 133;FT 90;Bianchi;0,4
134;;Verdi;
135;;Neri;2,0
135;;Neri;2,5
136;;Gialli;3
136;;Gialli;3,0
;;Senza numero;1,0
";

    #[test]
    fn reads_measures_below_title_rows() {
        let sheet = ReferenceSheet::from_csv_bytes("volumi.csv", SHEET.as_bytes()).unwrap();
        assert_eq!(sheet.source(), "volumi.csv");
        assert_eq!(sheet.rows_read(), 8);
        assert_eq!(sheet.get(&ddt("000132")), Some(&ReferenceValue::Measured(d(125, 2))));
        assert_eq!(sheet.get(&ddt("133")), Some(&ReferenceValue::Measured(d(4, 1))));
        let invoice = DocumentRef::new(DocumentKind::Invoice, "90").unwrap();
        assert_eq!(sheet.get(&invoice), Some(&ReferenceValue::Measured(d(4, 1))));
        assert!(sheet.get(&ddt("999")).is_none());
    }

    #[test]
    fn missing_and_conflicting_measures_are_kept_apart() {
        let sheet = ReferenceSheet::from_csv_bytes("volumi.csv", SHEET.as_bytes()).unwrap();
        assert_eq!(sheet.get(&ddt("134")), Some(&ReferenceValue::Missing));
        assert_eq!(sheet.get(&ddt("135")), Some(&ReferenceValue::Conflicting(vec![d(20, 1), d(25, 1)])));
        // Same value written twice is not a conflict.
        assert_eq!(sheet.get(&ddt("136")), Some(&ReferenceValue::Measured(d(3, 0))));
    }

    #[test]
    fn sheet_without_measure_column_is_rejected() {
        let err = ReferenceSheet::from_csv_bytes("x.csv", b"DDT;Cliente\n132;Rossi\n").unwrap_err();
        assert!(matches!(err, ReferenceError::NoHeader { scanned: HEADER_SCAN_ROWS, .. }));
    }

    #[test]
    fn unsupported_extension() {
        let err = load_reference(Path::new("volumi.pdf")).unwrap_err();
        assert!(matches!(err, ReferenceError::Read(CatalogError::UnsupportedFormat { .. })));
    }

    #[test]
    fn reads_numeric_cells_from_xlsx() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("volumi.xlsx");

        let mut workbook = Workbook::new();
        let ws = workbook.add_worksheet();
        ws.write_string(7, 0, "DDT").unwrap();
        ws.write_string(7, 1, "Volume").unwrap();
        ws.write_number(8, 0, 132.0).unwrap();
        ws.write_number(8, 1, 1.2).unwrap();
        workbook.save(&path).unwrap();

        let sheet = load_reference(&path).unwrap();
        assert_eq!(sheet.get(&ddt("132")), Some(&ReferenceValue::Measured(d(12, 1))));
    }

    #[test]
    fn from_measures_flags_disagreement() {
        let sheet = ReferenceSheet::from_measures("mem", [(ddt("1"), d(10, 1)), (ddt("1"), d(11, 1))]);
        assert_eq!(sheet.len(), 1);
        assert_eq!(sheet.get(&ddt("1")), Some(&ReferenceValue::Conflicting(vec![d(10, 1), d(11, 1)])));
    }
}
