pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod fields;
pub mod fuzzy;
pub mod io_utils;
pub mod mapping;
pub mod metadata;
pub mod parse;
pub mod pipeline;
pub mod preferences;
pub mod quality;
pub mod security;
pub mod table;
pub mod validate;
pub mod verify;

use std::{
    env, fs,
    path::Path,
    sync::OnceLock,
};

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use log::{LevelFilter, debug, info, warn};
use serde::Serialize;

use crate::{
    cli::{Cli, Commands},
    config::IngestConfig,
    mapping::{FieldMapping, SuggestedMapping},
    pipeline::{IngestPipeline, MappingProposal, MappingSource},
    preferences::MappingPreferenceStore,
    quality::QualityAnalysis,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("access_ingest", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => IngestConfig::load(path)?,
        None => IngestConfig::default(),
    };
    match cli.command {
        Commands::Scan(args) => handle_scan(&config, &args),
        Commands::Suggest(args) => handle_suggest(&config, &args),
        Commands::Confirm(args) => handle_confirm(&config, &args),
        Commands::Quality(args) => handle_quality(&config, &args),
        Commands::Ingest(args) => handle_ingest(&config, &args),
    }
}

fn handle_scan(config: &IngestConfig, args: &cli::ScanArgs) -> Result<()> {
    let (bytes, filename) = read_upload(&args.input)?;
    let validator = security::SecurityValidator::new(config.security.clone());
    let report = validator.validate(&bytes, &filename);
    print_json(&report)?;
    if !report.is_valid() {
        bail!("Upload '{filename}' rejected by security screen");
    }
    Ok(())
}

fn handle_suggest(config: &IngestConfig, args: &cli::SuggestArgs) -> Result<()> {
    let store = load_store(args.preferences.as_deref())?;
    let pipeline = IngestPipeline::from_config(config, store);
    let (bytes, filename) = read_upload(&args.input)?;
    let inspection = pipeline.inspect(&bytes, &filename)?;
    let headers = inspection.table.headers();

    let proposal = if args.by_name {
        let mapping = pipeline.mapper().suggest_by_name(headers);
        MappingProposal {
            source: MappingSource::Suggested,
            suggestions: annotate(&pipeline, headers, &mapping),
        }
    } else {
        pipeline.propose(headers)
    };
    debug!("{}", table::render_cache_stats(&pipeline.mapper().cache_stats()));

    if args.json {
        print_json(&proposal)?;
    } else {
        print!("{}", table::render_suggestions(&proposal.suggestions));
    }
    info!(
        "Proposed {} of {} header(s) from {:?} mapping",
        proposal.suggestions.len(),
        headers.len(),
        proposal.source
    );
    Ok(())
}

fn handle_confirm(config: &IngestConfig, args: &cli::ConfirmArgs) -> Result<()> {
    let store = MappingPreferenceStore::load_from_path(&args.preferences)?;
    let pipeline = IngestPipeline::from_config(config, store);
    let (bytes, filename) = read_upload(&args.input)?;
    let inspection = pipeline.inspect(&bytes, &filename)?;
    let mapping = mapping_from_assignments(&args.assignments);

    let report = pipeline.confirm(inspection.table.headers(), &mapping);
    print_json(&report)?;
    if !report.is_valid() {
        bail!("Mapping not saved: {}", report.message);
    }
    pipeline.preferences().save_to_path(&args.preferences)?;
    Ok(())
}

fn handle_quality(config: &IngestConfig, args: &cli::QualityArgs) -> Result<()> {
    let pipeline = IngestPipeline::from_config(config, MappingPreferenceStore::new());
    let (bytes, filename) = read_upload(&args.input)?;
    let inspection = pipeline.inspect(&bytes, &filename)?;
    for warning in &inspection.warnings {
        warn!("{warning}");
    }

    let profiled = if args.assignments.is_empty() {
        inspection.table
    } else {
        let mapping = mapping_from_assignments(&args.assignments);
        let (mapped, verification) = pipeline.apply(inspection.table, &mapping)?;
        for issue in verification.issues.iter().chain(&verification.warnings) {
            warn!("{issue}");
        }
        mapped
    };

    let analysis = pipeline.analyze(&profiled);
    if args.json {
        return print_json(&analysis);
    }
    match &analysis {
        QualityAnalysis::Report(report) => {
            print!("{}", table::render_missing_summary(report));
            println!(
                "rows: {}  duplicates: {} ({:.1}%)  memory: {:.2} MB",
                report.basic_stats.rows,
                report.duplicate_stats.total_duplicate_rows,
                report.duplicate_stats.duplicate_percentage,
                report.basic_stats.memory_usage_mb
            );
            for recommendation in &report.recommendations {
                println!("- {recommendation}");
            }
            Ok(())
        }
        QualityAnalysis::Empty { error } => Err(anyhow!("{error}")),
    }
}

fn handle_ingest(config: &IngestConfig, args: &cli::IngestArgs) -> Result<()> {
    let store = load_store(args.preferences.as_deref())?;
    let pipeline = IngestPipeline::from_config(config, store);
    let (bytes, filename) = read_upload(&args.input)?;
    let confirmed =
        (!args.assignments.is_empty()).then(|| mapping_from_assignments(&args.assignments));

    let outcome = pipeline.ingest(&bytes, &filename, confirmed.as_ref())?;
    print_json(&outcome)?;
    if !outcome.mapping_report.is_valid() {
        bail!("Mapping incomplete: {}", outcome.mapping_report.message);
    }
    match (&args.preferences, confirmed.is_some()) {
        (Some(path), true) => pipeline.preferences().save_to_path(path)?,
        (Some(_), false) => {
            info!("Proposed mapping used as-is; confirm it to remember it for this header set")
        }
        (None, _) => {}
    }
    Ok(())
}

fn read_upload(path: &Path) -> Result<(Vec<u8>, String)> {
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| anyhow!("Input path {path:?} has no usable file name"))?
        .to_string();
    let bytes = fs::read(path).with_context(|| format!("Reading upload {path:?}"))?;
    Ok((bytes, filename))
}

fn load_store(path: Option<&Path>) -> Result<MappingPreferenceStore> {
    match path {
        Some(path) => MappingPreferenceStore::load_from_path(path),
        None => Ok(MappingPreferenceStore::new()),
    }
}

fn mapping_from_assignments(assignments: &[(String, fields::CanonicalField)]) -> FieldMapping {
    let mut mapping = FieldMapping::new();
    for (header, field) in assignments {
        if let Some(previous) = mapping.insert(header.clone(), *field) {
            warn!("Header '{header}' assigned twice; {previous} replaced by {field}");
        }
    }
    mapping
}

fn annotate(pipeline: &IngestPipeline, headers: &[String], mapping: &FieldMapping) -> SuggestedMapping {
    SuggestedMapping::from_entries(
        headers
            .iter()
            .filter_map(|header| {
                let field = mapping.get(header)?;
                Some((header.clone(), pipeline.mapper().confidence(header, field)))
            })
            .collect(),
    )
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("Serializing JSON output")?;
    println!("{rendered}");
    Ok(())
}
