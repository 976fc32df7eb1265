use chrono::NaiveDate;
use fatture_catalog::{Catalog, CatalogError, CatalogLoader, CatalogSource, LineMatcher, ReferenceSheet};
use fatture_core::CatalogYear;
use fatture_extract::{sha256_hex, ExtractedInvoice, ExtractionError, Extractor, LopdfSource, PageSource};
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::EngineConfig;
use crate::crosscheck::{apply_reference, QuantityRule};
use crate::reconcile::{reconcile, TolerancePolicy};
use crate::report::{build, Report};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error("no catalog loaded for {0}")]
    NoCatalog(CatalogYear),
}

// ── Catalogs ─────────────────────────────────────────────────────────────────

/// Loaded price lists, at most one per year. Read-only once built, so a
/// batch can share it across threads.
#[derive(Debug, Default)]
pub struct CatalogSet {
    catalogs: BTreeMap<CatalogYear, Catalog>,
}

impl CatalogSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(catalog: Catalog) -> Self {
        let mut set = Self::new();
        set.insert(catalog);
        set
    }

    /// Returns the catalog previously held for the same year.
    pub fn insert(&mut self, catalog: Catalog) -> Option<Catalog> {
        self.catalogs.insert(catalog.year(), catalog)
    }

    pub fn load(&mut self, loader: &CatalogLoader, source: &CatalogSource, bundle_dir: &Path) -> Result<&Catalog, CatalogError> {
        let year = source.year();
        let catalog = loader.load(&source.resolve(bundle_dir), year)?;
        self.catalogs.insert(year, catalog);
        Ok(&self.catalogs[&year])
    }

    pub fn get(&self, year: CatalogYear) -> Option<&Catalog> {
        self.catalogs.get(&year)
    }

    pub fn years(&self) -> impl Iterator<Item = CatalogYear> + '_ {
        self.catalogs.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.catalogs.is_empty()
    }

    /// An explicit year must be loaded. Otherwise the invoice date picks the
    /// year, falling back to the latest loaded list.
    pub fn select(&self, year: Option<CatalogYear>, invoice_date: Option<NaiveDate>) -> Result<&Catalog, PipelineError> {
        if let Some(year) = year {
            return self.get(year).ok_or(PipelineError::NoCatalog(year));
        }
        let wanted = invoice_date.map(CatalogYear::for_date).unwrap_or_else(CatalogYear::latest);
        if let Some(catalog) = self.get(wanted) {
            return Ok(catalog);
        }
        match self.catalogs.values().next_back() {
            Some(catalog) => {
                tracing::warn!(wanted = %wanted, using = %catalog.year(), "catalog for invoice year not loaded");
                Ok(catalog)
            }
            None => Err(PipelineError::NoCatalog(wanted)),
        }
    }
}

// ── Pipeline ─────────────────────────────────────────────────────────────────

/// One entry of a batch run, in input order.
#[derive(Debug)]
pub enum BatchItem<'c> {
    Done(Report<'c>),
    /// Same bytes as an earlier input; not processed again.
    Duplicate { document: String, first: String },
    Failed { document: String, error: PipelineError },
}

impl BatchItem<'_> {
    pub fn document(&self) -> &str {
        match self {
            BatchItem::Done(report) => report.document.as_deref().unwrap_or_default(),
            BatchItem::Duplicate { document, .. } | BatchItem::Failed { document, .. } => document,
        }
    }
}

/// Extract → match → reconcile → report, for one invoice at a time.
pub struct InvoicePipeline<S = LopdfSource> {
    extractor: Extractor<S>,
    matcher: LineMatcher,
    policy: TolerancePolicy,
    year: Option<CatalogYear>,
    reference: Option<ReferenceSheet>,
    quantity_rule: QuantityRule,
}

impl InvoicePipeline<LopdfSource> {
    pub fn new(config: &EngineConfig) -> Self {
        Self::with_source(LopdfSource, config)
    }
}

impl<S: PageSource> InvoicePipeline<S> {
    pub fn with_source(source: S, config: &EngineConfig) -> Self {
        Self {
            extractor: Extractor::with_source(source, config.extract_options()).with_aliases(config.aliases()),
            matcher: config.line_matcher(),
            policy: config.tolerance,
            year: None,
            reference: None,
            quantity_rule: config.reference,
        }
    }

    /// Use this year's catalog for every invoice instead of choosing by date.
    pub fn with_year(mut self, year: Option<CatalogYear>) -> Self {
        self.year = year;
        self
    }

    /// Check billed quantities against this sheet on every invoice.
    pub fn with_reference(mut self, sheet: Option<ReferenceSheet>) -> Self {
        self.reference = sheet;
        self
    }

    pub fn process_file<'c>(&self, path: &Path, catalogs: &'c CatalogSet) -> Result<Report<'c>, PipelineError> {
        let bytes = read_pdf(path)?;
        self.process_bytes(&document_label(path), &bytes, catalogs)
    }

    pub fn process_bytes<'c>(&self, document: &str, pdf: &[u8], catalogs: &'c CatalogSet) -> Result<Report<'c>, PipelineError> {
        let invoice = self.extractor.extract_invoice(document, pdf)?;
        let catalog = catalogs.select(self.year, invoice.date.as_ref().map(|f| f.value))?;
        Ok(self.reconcile_invoice(invoice, catalog))
    }

    pub fn reconcile_invoice<'c>(&self, mut invoice: ExtractedInvoice, catalog: &'c Catalog) -> Report<'c> {
        let lines = std::mem::take(&mut invoice.lines);
        let matched = self.matcher.match_lines(lines, catalog);
        let mut results = reconcile(matched, &self.policy);
        if let Some(sheet) = &self.reference {
            apply_reference(&mut results, sheet, &self.quantity_rule);
        }
        let report = build(results)
            .for_invoice(&invoice)
            .with_catalog_year(catalog.year());

        tracing::info!(
            document = %invoice.document,
            catalog = %catalog.year(),
            ok = report.counts.ok,
            discrepancy = report.counts.discrepancy,
            unmatched = report.counts.unmatched,
            total_delta = %report.total_delta,
            reference_issues = report.reference_issues,
            "invoice reconciled"
        );
        report
    }

    /// Read and process files in parallel. Output order follows `paths`.
    pub fn process_batch<'c, P>(&self, paths: &[P], catalogs: &'c CatalogSet) -> Vec<BatchItem<'c>>
    where
        P: AsRef<Path> + Sync,
    {
        let loaded: Vec<(String, Result<Vec<u8>, PipelineError>)> = paths
            .par_iter()
            .map(|p| (document_label(p.as_ref()), read_pdf(p.as_ref())))
            .collect();

        let mut items = Vec::with_capacity(loaded.len());
        let mut owned = Vec::new();
        for (document, read) in loaded {
            match read {
                Ok(bytes) => {
                    owned.push((items.len(), document, bytes));
                    items.push(None);
                }
                Err(error) => items.push(Some(BatchItem::Failed { document, error })),
            }
        }
        let pending = owned.iter().map(|(slot, d, b)| (*slot, d.as_str(), b.as_slice())).collect();
        self.run_batch(items, pending, catalogs)
    }

    /// Like [`process_batch`](Self::process_batch) for documents already in memory.
    pub fn process_batch_bytes<'c>(&self, inputs: &[(&str, &[u8])], catalogs: &'c CatalogSet) -> Vec<BatchItem<'c>> {
        let items = inputs.iter().map(|_| None).collect();
        let pending = inputs.iter().enumerate().map(|(slot, (d, b))| (slot, *d, *b)).collect();
        self.run_batch(items, pending, catalogs)
    }

    fn run_batch<'c>(
        &self,
        mut items: Vec<Option<BatchItem<'c>>>,
        pending: Vec<(usize, &str, &[u8])>,
        catalogs: &'c CatalogSet,
    ) -> Vec<BatchItem<'c>> {
        let mut seen: HashMap<String, String> = HashMap::new();
        let mut unique = Vec::with_capacity(pending.len());
        for (slot, document, bytes) in pending {
            let digest = sha256_hex(bytes);
            match seen.get(&digest) {
                Some(first) => {
                    tracing::warn!(document, first = %first, "duplicate invoice skipped");
                    items[slot] = Some(BatchItem::Duplicate { document: document.to_string(), first: first.clone() });
                }
                None => {
                    seen.insert(digest, document.to_string());
                    unique.push((slot, document, bytes));
                }
            }
        }

        let done: Vec<(usize, BatchItem<'c>)> = unique
            .par_iter()
            .map(|&(slot, document, bytes)| {
                let item = match self.process_bytes(document, bytes, catalogs) {
                    Ok(report) => BatchItem::Done(report),
                    Err(error) => {
                        tracing::error!(document, error = %error, "invoice failed");
                        BatchItem::Failed { document: document.to_string(), error }
                    }
                };
                (slot, item)
            })
            .collect();
        for (slot, item) in done {
            items[slot] = Some(item);
        }
        items.into_iter().flatten().collect()
    }
}

fn read_pdf(path: &Path) -> Result<Vec<u8>, PipelineError> {
    std::fs::read(path).map_err(|source| PipelineError::Io { path: path.to_path_buf(), source })
}

fn document_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
