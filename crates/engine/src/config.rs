use fatture_catalog::{CatalogLoader, LineMatcher, MatchSettings};
use fatture_core::{ColumnRole, HeaderAliases};
use fatture_extract::ExtractOptions;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::crosscheck::QuantityRule;
use crate::reconcile::TolerancePolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Every setting the engine reads. All sections are optional in TOML.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub tolerance: TolerancePolicy,
    pub matching: MatchSettings,
    pub catalog: CatalogSettings,
    pub extraction: ExtractionSettings,
    /// Quantity check against a reference sheet, when one is given.
    pub reference: QuantityRule,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CatalogSettings {
    /// Largest fraction of data rows a catalog may skip and still load.
    pub max_skip_rate: f64,
    /// Extra header names per role (`code`, `description`, `quantity`,
    /// `unit_price`, `line_total`).
    pub extra_aliases: BTreeMap<String, Vec<String>>,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self { max_skip_rate: 0.20, extra_aliases: BTreeMap::new() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExtractionSettings {
    pub total_tolerance: Decimal,
    pub strict_numbers: bool,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        let defaults = ExtractOptions::default();
        Self { total_tolerance: defaults.total_tolerance, strict_numbers: defaults.strict_numbers }
    }
}

fn role_named(name: &str) -> Option<ColumnRole> {
    match name {
        "code" => Some(ColumnRole::Code),
        "description" => Some(ColumnRole::Description),
        "quantity" => Some(ColumnRole::Quantity),
        "unit_price" => Some(ColumnRole::UnitPrice),
        "line_total" => Some(ColumnRole::LineTotal),
        _ => None,
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid { field, reason: reason.into() }
}

impl EngineConfig {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tolerance.absolute_tolerance < Decimal::ZERO {
            return Err(invalid("tolerance.absolute", "must not be negative"));
        }
        if self.tolerance.relative_tolerance < Decimal::ZERO {
            return Err(invalid("tolerance.relative", "must not be negative"));
        }
        if !(0.0..=1.0).contains(&self.matching.min_similarity) {
            return Err(invalid("matching.min_similarity", "must be between 0 and 1"));
        }
        if !(0.0..=1.0).contains(&self.catalog.max_skip_rate) {
            return Err(invalid("catalog.max_skip_rate", "must be between 0 and 1"));
        }
        if self.extraction.total_tolerance < Decimal::ZERO {
            return Err(invalid("extraction.total_tolerance", "must not be negative"));
        }
        if self.reference.step <= Decimal::ZERO {
            return Err(invalid("reference.step", "must be positive"));
        }
        if self.reference.tolerance < Decimal::ZERO {
            return Err(invalid("reference.tolerance", "must not be negative"));
        }
        if let Some(name) = self.catalog.extra_aliases.keys().find(|k| role_named(k).is_none()) {
            return Err(invalid("catalog.extra_aliases", format!("unknown column '{name}'")));
        }
        Ok(())
    }

    /// Built-in header names plus the configured extras.
    pub fn aliases(&self) -> HeaderAliases {
        self.catalog
            .extra_aliases
            .iter()
            .filter_map(|(name, extra)| role_named(name).map(|role| (role, extra)))
            .fold(HeaderAliases::default(), |aliases, (role, extra)| aliases.with_extra(role, extra))
    }

    pub fn catalog_loader(&self) -> CatalogLoader {
        CatalogLoader::new(self.aliases(), self.catalog.max_skip_rate)
    }

    pub fn line_matcher(&self) -> LineMatcher {
        LineMatcher::new(self.matching)
    }

    pub fn extract_options(&self) -> ExtractOptions {
        ExtractOptions {
            total_tolerance: self.extraction.total_tolerance,
            strict_numbers: self.extraction.strict_numbers,
        }
    }
}
