//! Raw tabular readers: spreadsheets through calamine, CSV through csv.

use calamine::{open_workbook_auto, Data, Reader, Sheets};
use fatture_core::parse_amount_it;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::path::Path;

use crate::error::CatalogError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Cell {
    Empty,
    Text(String),
    Number(Decimal),
}

impl Cell {
    pub(crate) fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            Cell::Number(_) => false,
        }
    }

    /// Numeric cells as is, text cells read as Italian amounts.
    pub(crate) fn amount(&self) -> Option<Decimal> {
        match self {
            Cell::Number(d) => Some(*d),
            Cell::Text(s) => parse_amount_it(s).ok().map(|p| p.value),
            Cell::Empty => None,
        }
    }

    pub(crate) fn text(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(s) => s.trim().to_string(),
            Cell::Number(d) => d.normalize().to_string(),
        }
    }
}

impl From<&Data> for Cell {
    fn from(data: &Data) -> Self {
        match data {
            Data::Empty => Cell::Empty,
            Data::String(s) => Cell::Text(s.clone()),
            Data::Int(n) => Cell::Number(Decimal::from(*n)),
            Data::Float(n) => match Decimal::from_f64(*n) {
                Some(d) => Cell::Number(d),
                None => Cell::Text(n.to_string()),
            },
            other => Cell::Text(other.to_string()),
        }
    }
}

/// One sheet (or one CSV file) as a grid of cells.
#[derive(Debug, Clone)]
pub(crate) struct Table {
    pub name: Option<String>,
    /// 1-based row number of `rows[0]` in the source.
    pub first_row: usize,
    pub rows: Vec<Vec<Cell>>,
}

pub(crate) fn read_workbook(path: &Path) -> Result<Vec<Table>, CatalogError> {
    let unreadable = |reason: String| CatalogError::Unreadable { path: path.to_path_buf(), reason };

    let mut workbook: Sheets<_> = open_workbook_auto(path).map_err(|e| unreadable(e.to_string()))?;
    let sheet_names: Vec<String> = workbook.sheet_names().to_vec();
    if sheet_names.is_empty() {
        return Err(unreadable("workbook contains no sheets".to_string()));
    }

    let mut tables = Vec::with_capacity(sheet_names.len());
    for name in sheet_names {
        let range = workbook
            .worksheet_range(&name)
            .map_err(|e| unreadable(format!("sheet '{name}': {e}")))?;
        let (start_row, _) = range.start().unwrap_or((0, 0));
        let rows = range.rows().map(|row| row.iter().map(Cell::from).collect()).collect();
        tables.push(Table {
            name: Some(name),
            first_row: start_row as usize + 1,
            rows,
        });
    }
    Ok(tables)
}

pub(crate) fn read_csv(path: &Path) -> Result<Table, CatalogError> {
    let bytes = std::fs::read(path).map_err(|e| CatalogError::Unreadable {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    parse_csv(path, &bytes)
}

pub(crate) fn parse_csv(path: &Path, bytes: &[u8]) -> Result<Table, CatalogError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(sniff_delimiter(bytes))
        .from_reader(bytes);

    let mut rows = Vec::new();
    for record in reader.byte_records() {
        let record = record.map_err(|e| CatalogError::Unreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        // The reader drops blank lines; keep row numbers aligned with the file.
        if let Some(line) = record.position().map(|p| p.line() as usize) {
            while rows.len() + 1 < line {
                rows.push(Vec::new());
            }
        }
        let row = record
            .iter()
            .map(|field| {
                let text = String::from_utf8_lossy(field);
                if text.trim().is_empty() {
                    Cell::Empty
                } else {
                    Cell::Text(text.trim().to_string())
                }
            })
            .collect();
        rows.push(row);
    }

    Ok(Table { name: None, first_row: 1, rows })
}

/// Italian exports separate with `;` because `,` is the decimal mark.
/// Falls back to tab, then comma.
pub(crate) fn sniff_delimiter(bytes: &[u8]) -> u8 {
    let head: Vec<&[u8]> = bytes.split(|&b| b == b'\n').take(25).collect();
    let has = |d: u8| head.iter().any(|line| line.contains(&d));
    if has(b';') {
        b';'
    } else if has(b'\t') {
        b'\t'
    } else {
        b','
    }
}
