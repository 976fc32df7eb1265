pub mod config;
pub mod crosscheck;
pub mod pipeline;
pub mod reconcile;
pub mod report;

pub use config::{CatalogSettings, ConfigError, EngineConfig, ExtractionSettings};
pub use crosscheck::{apply_reference, check_line, QuantityRule, ReferenceCheck};
pub use pipeline::{BatchItem, CatalogSet, InvoicePipeline, PipelineError};
pub use reconcile::{reconcile, ReconciliationResult, Status, TolerancePolicy};
pub use report::{build, Report, StatusCounts, Verdict};
