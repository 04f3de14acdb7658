use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::fields::CanonicalField;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Screen, map and profile access-control event log uploads",
    long_about = None
)]
pub struct Cli {
    /// YAML file overriding the default limits and thresholds
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the security screen on an upload and print the report
    Scan(ScanArgs),
    /// Suggest how the upload's headers map onto the canonical fields
    Suggest(SuggestArgs),
    /// Validate a header mapping and remember it when valid
    Confirm(ConfirmArgs),
    /// Produce a data-quality report for an upload
    Quality(QualityArgs),
    /// Run screening, mapping, verification and quality analysis in one pass
    Ingest(IngestArgs),
}

#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Uploaded file (.csv, .json or .txt)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
}

#[derive(Debug, Args)]
pub struct SuggestArgs {
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Mapping preference store (JSON); learned mappings are reused
    #[arg(short = 'p', long = "preferences")]
    pub preferences: Option<PathBuf>,
    /// Use name-based close matching instead of keyword scoring
    #[arg(long = "by-name")]
    pub by_name: bool,
    /// Emit JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ConfirmArgs {
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Mapping preference store to update
    #[arg(short = 'p', long = "preferences")]
    pub preferences: PathBuf,
    /// Header assignments of the form `header=Field` (Timestamp, UserID, DoorID, EventType)
    #[arg(short = 'm', long = "map", value_parser = parse_assignment, action = clap::ArgAction::Append)]
    pub assignments: Vec<(String, CanonicalField)>,
}

#[derive(Debug, Args)]
pub struct QualityArgs {
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Rename mapped columns before analysis, `header=Field`
    #[arg(short = 'm', long = "map", value_parser = parse_assignment, action = clap::ArgAction::Append)]
    pub assignments: Vec<(String, CanonicalField)>,
    /// Emit JSON instead of a summary table
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct IngestArgs {
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    #[arg(short = 'p', long = "preferences")]
    pub preferences: Option<PathBuf>,
    /// Explicit header assignments; without them the proposed mapping is used
    #[arg(short = 'm', long = "map", value_parser = parse_assignment, action = clap::ArgAction::Append)]
    pub assignments: Vec<(String, CanonicalField)>,
}

pub fn parse_assignment(value: &str) -> Result<(String, CanonicalField), String> {
    let (header, field) = value
        .rsplit_once('=')
        .ok_or_else(|| format!("Expected `header=Field`, got '{value}'"))?;
    let header = header.trim();
    if header.is_empty() {
        return Err("Header cannot be empty".to_string());
    }
    let field = field.parse::<CanonicalField>()?;
    Ok((header.to_string(), field))
}
