//! Tunable limits and thresholds for the ingestion pipeline.
//!
//! Every section defaults to the values the upload service has always shipped
//! with, so a YAML override file only needs to name what it changes:
//!
//! ```yaml
//! security:
//!   max_file_size: 10485760
//! quality:
//!   memory_warning_mb: 250
//! ```

use std::{fs::File, io::BufReader, path::Path};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_FILE_SIZE: usize = 50 * 1024 * 1024;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IngestConfig {
    pub security: SecurityLimits,
    pub mapping: MappingSettings,
    pub quality: QualitySettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SecurityLimits {
    pub max_file_size: usize,
    pub allowed_extensions: Vec<String>,
    pub allowed_mime_types: Vec<String>,
    /// Rows parsed during the structural preview.
    pub preview_rows: usize,
    pub max_columns: usize,
    /// Row cap for a full parse.
    pub max_rows: usize,
    pub max_json_depth: usize,
    pub max_control_char_ratio: f64,
}

impl Default for SecurityLimits {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            allowed_extensions: vec![".csv".into(), ".json".into(), ".txt".into()],
            allowed_mime_types: vec![
                "text/csv".into(),
                "text/plain".into(),
                "application/csv".into(),
                "application/json".into(),
                "text/json".into(),
            ],
            preview_rows: 1000,
            max_columns: 1000,
            max_rows: 1_000_000,
            max_json_depth: 10,
            max_control_char_ratio: 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MappingSettings {
    /// Scores at or below this value are never auto-assigned.
    pub min_score: f64,
    /// Keyword similarity must exceed this to contribute to a score.
    pub fuzzy_threshold: f64,
    /// Cutoff for name-based close-match suggestions.
    pub close_match_cutoff: f64,
    pub long_header_len: usize,
    pub cache_capacity: usize,
}

impl Default for MappingSettings {
    fn default() -> Self {
        Self {
            min_score: 0.3,
            fuzzy_threshold: 0.7,
            close_match_cutoff: 0.6,
            long_header_len: 50,
            cache_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QualitySettings {
    pub missing_drop_percentage: f64,
    pub duplicate_percentage: f64,
    pub categorical_ratio: f64,
    pub categorical_max_unique: usize,
    pub memory_warning_mb: f64,
    pub small_dataset_rows: usize,
}

impl Default for QualitySettings {
    fn default() -> Self {
        Self {
            missing_drop_percentage: 50.0,
            duplicate_percentage: 5.0,
            categorical_ratio: 0.1,
            categorical_max_unique: 50,
            memory_warning_mb: 100.0,
            small_dataset_rows: 10,
        }
    }
}

impl IngestConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening config file {path:?}"))?;
        let reader = BufReader::new(file);
        let config: IngestConfig =
            serde_yaml::from_reader(reader).context("Parsing ingest config YAML")?;
        config.ensure_valid()?;
        Ok(config)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let config: IngestConfig =
            serde_yaml::from_str(raw).context("Parsing ingest config YAML")?;
        config.ensure_valid()?;
        Ok(config)
    }

    pub fn ensure_valid(&self) -> Result<()> {
        ensure!(
            self.security.max_file_size > 0,
            "security.max_file_size must be greater than zero"
        );
        ensure!(
            !self.security.allowed_extensions.is_empty(),
            "security.allowed_extensions must list at least one extension"
        );
        ensure!(
            self.security.max_columns > 0,
            "security.max_columns must be greater than zero"
        );
        ensure!(
            (0.0..=1.0).contains(&self.mapping.min_score),
            "mapping.min_score must lie within [0, 1]"
        );
        ensure!(
            self.mapping.cache_capacity > 0,
            "mapping.cache_capacity must be greater than zero"
        );
        Ok(())
    }
}
