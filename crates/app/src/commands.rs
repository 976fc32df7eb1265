use anyhow::{bail, Context, Result};
use fatture_catalog::{load_reference, CatalogLoader, CatalogSource};
use fatture_core::{format_amount_it, format_eur, CatalogYear};
use fatture_engine::{BatchItem, CatalogSet, EngineConfig, InvoicePipeline, Report, Status};
use rust_decimal::Decimal;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::export;
use crate::{CheckArgs, EXIT_CLEAN, EXIT_FAILURE, EXIT_NEEDS_REVIEW};

// ── Configuration ───────────────────────────────────────────────────────────

/// `--config`, else `config.toml` in the user config directory, else defaults.
fn load_config(explicit: Option<&Path>) -> Result<EngineConfig> {
    if let Some(path) = explicit {
        return EngineConfig::from_file(path).with_context(|| format!("loading {}", path.display()));
    }
    let user = directories::ProjectDirs::from("it", "vainieri", "controllo-fatture")
        .map(|dirs| dirs.config_dir().join("config.toml"))
        .filter(|path| path.is_file());
    match user {
        Some(path) => {
            tracing::debug!(path = %path.display(), "using user config");
            EngineConfig::from_file(&path).with_context(|| format!("loading {}", path.display()))
        }
        None => Ok(EngineConfig::default()),
    }
}

fn parse_decimal(flag: &str, raw: &str) -> Result<Decimal> {
    let normalized = raw.trim().replace(',', ".");
    Decimal::from_str(&normalized).with_context(|| format!("{flag}: '{raw}' is not a number"))
}

fn apply_overrides(config: &mut EngineConfig, args: &CheckArgs) -> Result<()> {
    if let Some(raw) = &args.abs_tol {
        config.tolerance.absolute_tolerance = parse_decimal("--abs-tol", raw)?;
    }
    if let Some(raw) = &args.rel_tol {
        config.tolerance.relative_tolerance = parse_decimal("--rel-tol", raw)?;
    }
    if let Some(min) = args.min_similarity {
        config.matching.min_similarity = min;
    }
    if args.strict_numbers {
        config.extraction.strict_numbers = true;
    }
    config.validate()?;
    Ok(())
}

/// Bundled lists ship next to the executable.
fn bundle_dir(explicit: Option<&Path>) -> PathBuf {
    if let Some(dir) = explicit {
        return dir.to_path_buf();
    }
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn load_catalogs(args: &CheckArgs, loader: &CatalogLoader) -> Result<CatalogSet> {
    let dir = bundle_dir(args.catalog_dir.as_deref());
    let mut set = CatalogSet::new();

    if let (Some(path), Some(year)) = (&args.catalog, args.catalog_year) {
        let source = CatalogSource::Path { path: path.clone(), year };
        set.load(loader, &source, &dir)?;
        return Ok(set);
    }
    if let Some(year) = args.year {
        set.load(loader, &CatalogSource::Bundled(year), &dir)?;
        return Ok(set);
    }

    // Chosen per invoice by date: load every year we can.
    let mut first_error = None;
    for year in CatalogYear::SUPPORTED {
        if let Err(e) = set.load(loader, &CatalogSource::Bundled(year), &dir) {
            tracing::warn!(year = %year, error = %e, "bundled catalog not loaded");
            first_error.get_or_insert(e);
        }
    }
    match first_error {
        Some(e) if set.is_empty() => Err(e).context("no price list could be loaded"),
        _ => Ok(set),
    }
}

// ── check ───────────────────────────────────────────────────────────────────

pub fn check(args: CheckArgs) -> Result<u8> {
    let mut config = load_config(args.config.as_deref())?;
    apply_overrides(&mut config, &args)?;

    let catalogs = load_catalogs(&args, &config.catalog_loader())?;
    let fixed_year = args.year.or(args.catalog_year);
    let reference = args
        .reference
        .as_deref()
        .map(|path| load_reference(path).with_context(|| format!("loading reference sheet {}", path.display())))
        .transpose()?;
    let pipeline = InvoicePipeline::new(&config).with_year(fixed_year).with_reference(reference);

    let items = pipeline.process_batch(&args.pdfs, &catalogs);

    if args.json {
        let json = serde_json::Value::Array(items.iter().map(item_json).collect::<Result<_>>()?);
        println!("{}", serde_json::to_string_pretty(&json)?);
    } else {
        for item in &items {
            print_item(item);
        }
    }

    let reports: Vec<&Report<'_>> = items
        .iter()
        .filter_map(|item| match item {
            BatchItem::Done(report) => Some(report),
            _ => None,
        })
        .collect();

    if let Some(path) = &args.export {
        export::write_xlsx(path, &reports).with_context(|| format!("writing {}", path.display()))?;
        tracing::info!(path = %path.display(), rows = reports.iter().map(|r| r.results.len()).sum::<usize>(), "report exported");
    }

    Ok(exit_code(&items))
}

fn exit_code(items: &[BatchItem<'_>]) -> u8 {
    if items.iter().any(|i| matches!(i, BatchItem::Failed { .. })) {
        EXIT_FAILURE
    } else if items.iter().any(|i| matches!(i, BatchItem::Done(r) if !r.is_clean())) {
        EXIT_NEEDS_REVIEW
    } else {
        EXIT_CLEAN
    }
}

fn item_json(item: &BatchItem<'_>) -> Result<serde_json::Value> {
    Ok(match item {
        BatchItem::Done(report) => serde_json::to_value(report)?,
        BatchItem::Duplicate { document, first } => serde_json::json!({
            "document": document,
            "duplicate_of": first,
        }),
        BatchItem::Failed { document, error } => serde_json::json!({
            "document": document,
            "error": error.to_string(),
        }),
    })
}

fn print_item(item: &BatchItem<'_>) {
    match item {
        BatchItem::Done(report) => print_report(report),
        BatchItem::Duplicate { document, first } => println!("{document}: stesso file di {first}, ignorato\n"),
        BatchItem::Failed { document, error } => println!("{document}: ERRORE: {error}\n"),
    }
}

fn print_report(report: &Report<'_>) {
    let document = report.document.as_deref().unwrap_or("fattura");
    let number = report.invoice_number.as_deref().map(|n| format!(" n. {n}")).unwrap_or_default();
    let date = report.invoice_date.map(|d| format!(" del {}", d.format("%d/%m/%Y"))).unwrap_or_default();
    let year = report.catalog_year.map(|y| format!(", listino {y}")).unwrap_or_default();

    println!("{document}{number}{date}{year}");
    println!("  {}", report.headline());
    println!(
        "  {} OK, {} errori prezzo, {} non in listino, {} righe da verificare, {} errori di quantità",
        report.counts.ok,
        report.counts.discrepancy,
        report.counts.unmatched,
        report.flagged_rows,
        report.reference_issues
    );
    println!(
        "  fatturato {}, differenza prezzi {}, impatto {}",
        format_eur(report.invoiced_total),
        format_eur(report.total_delta),
        format_eur(report.total_line_delta)
    );

    for r in report
        .results
        .iter()
        .filter(|r| r.status != Status::Ok || r.is_flagged() || r.has_reference_issue())
    {
        let line = r.line();
        let expected = r.expected_price.map(|p| format_amount_it(p, 2)).unwrap_or_else(|| "-".into());
        let mut notes: Vec<String> = line.flags.iter().map(ToString::to_string).collect();
        if let Some(entry) = r.matched.matched_entry() {
            notes.insert(0, format!("{} per {}", entry.product_code, r.matched.match_method().label()));
        }
        if let Some(check) = r.reference.as_ref().filter(|c| c.is_issue()) {
            notes.push(check.to_string());
        }
        println!(
            "  p.{} r.{:<3} {:<14} {:<40} {:>10} vs {:>10}  {}",
            line.source_page,
            line.source_row,
            r.status.label(),
            truncate(&line.raw_description, 40),
            format_amount_it(line.unit_price, 2),
            expected,
            notes.join("; ")
        );
    }
    println!();
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max - 1).collect();
        format!("{cut}…")
    }
}

// ── catalog ─────────────────────────────────────────────────────────────────

pub fn catalog(path: &Path, year: CatalogYear, config: Option<&Path>) -> Result<()> {
    let config = load_config(config)?;
    let catalog = config.catalog_loader().load(path, year)?;
    let stats = catalog.stats();

    println!("{} ({year})", catalog.source());
    if let Some(sheet) = &stats.sheet {
        println!("  foglio: {sheet}");
    }
    println!("  intestazione alla riga {}", stats.header_row);
    println!("  {} articoli da {} righe", catalog.len(), stats.rows_read);
    if stats.skipped.is_empty() {
        println!("  nessuna riga scartata");
    } else {
        println!("  {} righe scartate ({:.1}%):", stats.skipped.len(), stats.skip_rate() * 100.0);
        for (reason, count) in stats.skipped_by_reason() {
            println!("    {}: {count}", reason.label());
        }
    }
    if catalog.is_empty() {
        bail!("{} has no usable rows", path.display());
    }
    Ok(())
}
