use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use fatture_core::CatalogYear;
use tracing_subscriber::EnvFilter;

mod commands;
mod export;

pub const EXIT_CLEAN: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_NEEDS_REVIEW: u8 = 2;

#[derive(Parser)]
#[command(name = "controllo-fatture")]
#[command(about = "Check supplier invoices against the Vainieri price list")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile one or more PDF invoices against a price list
    #[command(after_help = "\
Examples:
  controllo-fatture check fattura_12.pdf
  controllo-fatture check *.pdf --year 2025 --export controllo.xlsx
  controllo-fatture check fattura.pdf --catalog listino.xlsx --catalog-year 2026 --json
  controllo-fatture check fatture/*.pdf --reference volumi_febbraio.xlsx

Exit status: 0 when every invoice is clean, 2 when any needs review, 1 on failure.")]
    Check(CheckArgs),

    /// Load a price list and summarize what was read
    Catalog {
        /// Catalog file (xlsx, xls, ods or csv)
        path: PathBuf,

        /// Year the list applies to
        #[arg(long)]
        year: CatalogYear,

        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Args)]
pub struct CheckArgs {
    /// Invoice PDFs
    #[arg(required = true)]
    pub pdfs: Vec<PathBuf>,

    /// Use the bundled list for this year instead of choosing by invoice date
    #[arg(long, conflicts_with = "catalog")]
    pub year: Option<CatalogYear>,

    /// Use this price list file
    #[arg(long, requires = "catalog_year")]
    pub catalog: Option<PathBuf>,

    /// Year of the file given with --catalog
    #[arg(long, requires = "catalog")]
    pub catalog_year: Option<CatalogYear>,

    /// Directory holding the bundled yearly lists (default: next to the executable)
    #[arg(long)]
    pub catalog_dir: Option<PathBuf>,

    /// Engine configuration (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Absolute price tolerance, in euro
    #[arg(long, value_name = "EURO")]
    pub abs_tol: Option<String>,

    /// Relative price tolerance, as a fraction (0.02 = 2%)
    #[arg(long, value_name = "FRACTION")]
    pub rel_tol: Option<String>,

    /// Minimum description similarity for a fuzzy match (0..1)
    #[arg(long)]
    pub min_similarity: Option<f64>,

    /// Fail on numbers that could be read more than one way
    #[arg(long)]
    pub strict_numbers: bool,

    /// Cross-check billed quantities against this sheet of measures, by
    /// the DDT or invoice number printed on each row (xlsx, xls, ods or csv)
    #[arg(long, value_name = "FILE")]
    pub reference: Option<PathBuf>,

    /// Print the reports as JSON on stdout
    #[arg(long)]
    pub json: bool,

    /// Write all results to an xlsx workbook
    #[arg(long, value_name = "FILE.xlsx")]
    pub export: Option<PathBuf>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Check(args) => commands::check(args),
        Commands::Catalog { path, year, config } => commands::catalog(&path, year, config.as_deref()).map(|()| EXIT_CLEAN),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}
