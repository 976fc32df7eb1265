use fatture_core::money::PRICE_SCALE;
use fatture_core::{CatalogEntry, CatalogYear, ColumnMap, ColumnRole, HeaderAliases};
use rust_decimal::Decimal;
use std::path::{Path, PathBuf};

use crate::catalog::{Catalog, CatalogBuilder, SkipReason};
use crate::error::CatalogError;
use crate::sheet::{self, Cell, Table};

/// Rows scanned from the top of each sheet when looking for the header.
pub const HEADER_SCAN_ROWS: usize = 25;

const REQUIRED: [ColumnRole; 3] = [ColumnRole::Code, ColumnRole::Description, ColumnRole::UnitPrice];

/// Where the caller wants the price list to come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogSource {
    /// The list shipped with the application for that year.
    Bundled(CatalogYear),
    /// An explicit file, read as the given year's list.
    Path { path: PathBuf, year: CatalogYear },
}

impl CatalogSource {
    pub fn year(&self) -> CatalogYear {
        match self {
            CatalogSource::Bundled(year) => *year,
            CatalogSource::Path { year, .. } => *year,
        }
    }

    /// Resolve to a file path; bundled lists live in `bundle_dir`.
    pub fn resolve(&self, bundle_dir: &Path) -> PathBuf {
        match self {
            CatalogSource::Bundled(year) => bundle_dir.join(year.bundled_file_name()),
            CatalogSource::Path { path, .. } => path.clone(),
        }
    }
}

/// Load with default aliases and a 20% skip limit.
pub fn load(path: &Path, year: CatalogYear) -> Result<Catalog, CatalogError> {
    CatalogLoader::default().load(path, year)
}

#[derive(Debug, Clone)]
pub struct CatalogLoader {
    aliases: HeaderAliases,
    max_skip_rate: f64,
}

impl Default for CatalogLoader {
    fn default() -> Self {
        Self {
            aliases: HeaderAliases::default(),
            max_skip_rate: 0.20,
        }
    }
}

pub(crate) enum Format {
    Workbook,
    Csv,
}

pub(crate) fn detect_format(path: &Path) -> Option<Format> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" => Some(Format::Workbook),
        "csv" | "txt" => Some(Format::Csv),
        _ => None,
    }
}

impl CatalogLoader {
    pub fn new(aliases: HeaderAliases, max_skip_rate: f64) -> Self {
        Self { aliases, max_skip_rate }
    }

    pub fn max_skip_rate(&self) -> f64 {
        self.max_skip_rate
    }

    pub fn load(&self, path: &Path, year: CatalogYear) -> Result<Catalog, CatalogError> {
        let tables = match detect_format(path) {
            Some(Format::Workbook) => sheet::read_workbook(path)?,
            Some(Format::Csv) => vec![sheet::read_csv(path)?],
            None => return Err(CatalogError::UnsupportedFormat { path: path.to_path_buf() }),
        };
        self.load_tables(path, year, &tables)
    }

    /// Read a CSV catalog from memory. `label` stands in for the file name.
    pub fn load_csv_bytes(&self, label: &str, bytes: &[u8], year: CatalogYear) -> Result<Catalog, CatalogError> {
        let path = Path::new(label);
        let table = sheet::parse_csv(path, bytes)?;
        self.load_tables(path, year, &[table])
    }

    fn load_tables(&self, path: &Path, year: CatalogYear, tables: &[Table]) -> Result<Catalog, CatalogError> {
        let mut best_partial: Option<ColumnMap> = None;

        for table in tables {
            match self.find_header(table) {
                HeaderScan::Found { index, columns } => {
                    let catalog = self.read_rows(path, year, table, index, &columns);
                    return self.check_integrity(path, catalog);
                }
                HeaderScan::Partial(columns) => {
                    if best_partial.as_ref().map_or(true, |b| columns.len() > b.len()) {
                        best_partial = Some(columns);
                    }
                }
                HeaderScan::Nothing => {}
            }
        }

        match best_partial {
            Some(columns) => Err(CatalogError::MissingColumns {
                path: path.to_path_buf(),
                missing: columns.missing(&REQUIRED),
            }),
            None => Err(CatalogError::NoHeader {
                path: path.to_path_buf(),
                scanned: HEADER_SCAN_ROWS,
            }),
        }
    }

    fn find_header(&self, table: &Table) -> HeaderScan {
        let mut partial: Option<ColumnMap> = None;
        for (index, row) in table.rows.iter().take(HEADER_SCAN_ROWS).enumerate() {
            let cells: Vec<String> = row.iter().map(Cell::text).collect();
            let columns = self.aliases.locate(&cells);
            if columns.has_all(&REQUIRED) {
                return HeaderScan::Found { index, columns };
            }
            let recognized = REQUIRED.len() - columns.missing(&REQUIRED).len();
            let best = partial.as_ref().map_or(0, |p| REQUIRED.len() - p.missing(&REQUIRED).len());
            if recognized > best {
                partial = Some(columns);
            }
        }
        partial.map_or(HeaderScan::Nothing, HeaderScan::Partial)
    }

    fn read_rows(&self, path: &Path, year: CatalogYear, table: &Table, header: usize, columns: &ColumnMap) -> Catalog {
        let source = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let mut builder = CatalogBuilder::new(year, source);
        builder.stats.sheet = table.name.clone();
        builder.stats.header_row = table.first_row + header;

        let col = |role| columns.get(role).unwrap_or(usize::MAX);
        let (code_col, desc_col, price_col) =
            (col(ColumnRole::Code), col(ColumnRole::Description), col(ColumnRole::UnitPrice));
        let empty = Cell::Empty;

        for (offset, row) in table.rows.iter().enumerate().skip(header + 1) {
            if row.iter().all(Cell::is_empty) {
                continue;
            }
            let row_no = table.first_row + offset;
            builder.stats.rows_read += 1;

            let cell = |i: usize| row.get(i).unwrap_or(&empty);
            let code = cell(code_col).text();
            if code.is_empty() {
                tracing::warn!(row = row_no, "catalog row skipped: empty code");
                builder.skip(row_no, SkipReason::EmptyCode);
                continue;
            }

            let price = match price_of(cell(price_col)) {
                Some(p) => p,
                None => {
                    tracing::warn!(row = row_no, code = %code, value = %cell(price_col).text(), "catalog row skipped: invalid price");
                    builder.skip(row_no, SkipReason::InvalidPrice);
                    continue;
                }
            };
            if price <= Decimal::ZERO {
                tracing::warn!(row = row_no, code = %code, price = %price, "catalog row skipped: non-positive price");
                builder.skip(row_no, SkipReason::NonPositivePrice);
                continue;
            }

            let entry = CatalogEntry::new(code, cell(desc_col).text(), price, year);
            if let Err(dup) = builder.push(entry) {
                tracing::warn!(row = row_no, code = %dup.product_code, "catalog row skipped: duplicate code");
                builder.skip(row_no, SkipReason::DuplicateCode);
            }
        }

        builder.finish()
    }

    fn check_integrity(&self, path: &Path, catalog: Catalog) -> Result<Catalog, CatalogError> {
        let stats = catalog.stats();
        let rate = if catalog.is_empty() { 1.0 } else { stats.skip_rate() };

        if catalog.is_empty() || rate > self.max_skip_rate {
            return Err(CatalogError::Integrity {
                path: path.to_path_buf(),
                skipped: stats.skipped.len(),
                total: stats.rows_read,
                rate,
                max_rate: self.max_skip_rate,
            });
        }

        tracing::info!(
            source = %catalog.source(),
            year = %catalog.year(),
            sheet = stats.sheet.as_deref().unwrap_or("-"),
            header_row = stats.header_row,
            loaded = stats.loaded,
            skipped = stats.skipped.len(),
            "catalog loaded"
        );
        Ok(catalog)
    }
}

enum HeaderScan {
    Found { index: usize, columns: ColumnMap },
    Partial(ColumnMap),
    Nothing,
}

fn price_of(cell: &Cell) -> Option<Decimal> {
    cell.amount().map(|d| d.round_dp(PRICE_SCALE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SkippedRow;
    use rust_xlsxwriter::Workbook;
    use std::io::Write;

    fn csv_file(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn loads_semicolon_csv_with_italian_prices() {
        let f = csv_file("Codice;Descrizione;Prezzo\nA100;Olio 1L;5,00\nB200;Aceto balsamico;1.234,50\n");
        let catalog = load(f.path(), CatalogYear(2025)).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get("B200").unwrap().unit_price, Decimal::new(123450, 2));
        assert_eq!(catalog.year(), CatalogYear(2025));
        assert_eq!(catalog.stats().header_row, 1);
    }

    #[test]
    fn renamed_headers_load_through_aliases() {
        let f = csv_file("Cod.;Desc.;Prz.\nA100;Olio 1L;5,00\n");
        let catalog = load(f.path(), CatalogYear(2026)).unwrap();
        assert_eq!(catalog.get("A100").unwrap().description, "Olio 1L");
    }

    #[test]
    fn header_found_below_title_rows() {
        let f = csv_file("Listino prezzi Vainieri;;\nValido dal 01/01/2025;;\n\nCodice;Descrizione;Prezzo\nA100;Olio 1L;5,00\n");
        let catalog = load(f.path(), CatalogYear(2025)).unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.stats().header_row, 4);
    }

    #[test]
    fn missing_price_column_is_reported() {
        let f = csv_file("Codice;Descrizione;Note\nA100;Olio 1L;x\n");
        match load(f.path(), CatalogYear(2025)) {
            Err(CatalogError::MissingColumns { missing, .. }) => assert_eq!(missing, vec![ColumnRole::UnitPrice]),
            other => panic!("expected MissingColumns, got {other:?}"),
        }
    }

    #[test]
    fn no_header_at_all() {
        let f = csv_file("1;2;3\n4;5;6\n");
        assert!(matches!(load(f.path(), CatalogYear(2025)), Err(CatalogError::NoHeader { .. })));
    }

    #[test]
    fn unsupported_extension() {
        let f = tempfile::Builder::new().suffix(".pdf").tempfile().unwrap();
        let err = load(f.path(), CatalogYear(2025)).unwrap_err();
        assert!(matches!(err, CatalogError::UnsupportedFormat { .. }));
        assert!(err.is_load_error());
    }

    #[test]
    fn unreadable_file() {
        let err = load(Path::new("/nonexistent/prezzi.csv"), CatalogYear(2025)).unwrap_err();
        assert!(matches!(err, CatalogError::Unreadable { .. }));
    }

    #[test]
    fn bad_rows_are_skipped_and_counted() {
        let mut body = String::from("Codice;Descrizione;Prezzo\n");
        for i in 0..9 {
            body.push_str(&format!("C{i};Articolo {i};1,00\n"));
        }
        body.push_str(";Senza codice;2,00\n");
        let f = csv_file(&body);
        let catalog = load(f.path(), CatalogYear(2025)).unwrap();
        assert_eq!(catalog.len(), 9);
        assert_eq!(catalog.stats().skipped, vec![SkippedRow { row: 11, reason: SkipReason::EmptyCode }]);
    }

    #[test]
    fn skip_rate_above_limit_fails() {
        let f = csv_file("Codice;Descrizione;Prezzo\nA1;Uno;1,00\nA2;Due;0,00\nA3;Tre;abc\nA1;Uno bis;3,00\n");
        match load(f.path(), CatalogYear(2025)) {
            Err(CatalogError::Integrity { skipped, total, .. }) => {
                assert_eq!(skipped, 3);
                assert_eq!(total, 4);
            }
            other => panic!("expected Integrity, got {other:?}"),
        }
    }

    #[test]
    fn skip_rate_equal_to_limit_loads() {
        // 1 of 5 rows
        let at_limit = csv_file("Codice;Descrizione;Prezzo\nA1;Uno;1,00\nA2;Due;2,00\nA3;Tre;3,00\nA4;Quattro;4,00\n;Senza codice;5,00\n");
        let catalog = load(at_limit.path(), CatalogYear(2025)).unwrap();
        assert_eq!(catalog.len(), 4);
        assert_eq!(catalog.stats().skip_rate(), 0.20);

        // 1 of 4 rows
        let over = csv_file("Codice;Descrizione;Prezzo\nA1;Uno;1,00\nA2;Due;2,00\nA3;Tre;3,00\n;Senza codice;5,00\n");
        assert!(matches!(load(over.path(), CatalogYear(2025)), Err(CatalogError::Integrity { skipped: 1, total: 4, .. })));
    }

    #[test]
    fn skip_limit_is_configurable() {
        let f = csv_file("Codice;Descrizione;Prezzo\nA1;Uno;1,00\nA2;Due;0,00\n");
        let loader = CatalogLoader::new(HeaderAliases::default(), 0.5);
        let catalog = loader.load(f.path(), CatalogYear(2025)).unwrap();
        assert_eq!(catalog.stats().skipped_by_reason()[&SkipReason::NonPositivePrice], 1);
    }

    #[test]
    fn extra_aliases_reach_the_loader() {
        let aliases = HeaderAliases::default().with_extra(ColumnRole::UnitPrice, ["Listino 2026"]);
        let loader = CatalogLoader::new(aliases, 0.2);
        let catalog = loader
            .load_csv_bytes("mem.csv", b"Codice;Descrizione;Listino 2026\nA1;Uno;1,00\n", CatalogYear(2026))
            .unwrap();
        assert_eq!(catalog.source(), "mem.csv");
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn loading_twice_is_identical() {
        let f = csv_file("Codice;Descrizione;Prezzo\nA100;Olio 1L;5,00\nA100;Olio dup;6,00\nB1;Sale;0,80\n");
        let loader = CatalogLoader::new(HeaderAliases::default(), 0.5);
        let a = loader.load(f.path(), CatalogYear(2025)).unwrap();
        let b = loader.load(f.path(), CatalogYear(2025)).unwrap();
        assert_eq!(a.entries(), b.entries());
        assert_eq!(a.stats(), b.stats());
    }

    #[test]
    fn loads_xlsx_with_numeric_cells() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prezzi_vainieri_2026.xlsx");

        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, "Listino 2026").unwrap();
        sheet.write_string(2, 0, "Cod.").unwrap();
        sheet.write_string(2, 1, "Desc.").unwrap();
        sheet.write_string(2, 2, "Prz.").unwrap();
        sheet.write_string(3, 0, "A100").unwrap();
        sheet.write_string(3, 1, "Olio 1L").unwrap();
        sheet.write_number(3, 2, 5.5).unwrap();
        sheet.write_number(4, 0, 4711.0).unwrap();
        sheet.write_string(4, 1, "Colla").unwrap();
        sheet.write_string(4, 2, "2,30").unwrap();
        workbook.save(&path).unwrap();

        let catalog = load(&path, CatalogYear(2026)).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get("A100").unwrap().unit_price, Decimal::new(55, 1));
        assert_eq!(catalog.get("4711").unwrap().unit_price, Decimal::new(230, 2));
        assert_eq!(catalog.stats().header_row, 3);
        assert_eq!(catalog.stats().sheet.as_deref(), Some("Sheet1"));
    }

    #[test]
    fn source_resolves_bundled_name() {
        let src = CatalogSource::Bundled(CatalogYear(2025));
        assert_eq!(src.resolve(Path::new("/opt/cf")), PathBuf::from("/opt/cf/prezzi_vainieri_2025.xlsx"));
        let explicit = CatalogSource::Path { path: "x.csv".into(), year: CatalogYear(2026) };
        assert_eq!(explicit.year(), CatalogYear(2026));
        assert_eq!(explicit.resolve(Path::new("/opt/cf")), PathBuf::from("x.csv"));
    }
}
