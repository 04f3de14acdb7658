//! End-to-end ingestion: screen, parse, propose a mapping, confirm it and
//! analyze the mapped table.
//!
//! Every component is handed in at construction, so tests can run isolated
//! pipelines with their own preference store and match cache.

use log::{info, warn};
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::{
    config::IngestConfig,
    error::{IngestError, ProcessingError},
    mapping::{FieldMapping, SchemaMapper, SuggestedMapping, apply_mapping},
    parse::{ParsedTable, TableParser},
    preferences::MappingPreferenceStore,
    quality::{DataQualityAnalyzer, QualityAnalysis},
    security::{FileInfo, SecurityValidator},
    validate::{MappingReport, MappingValidator},
    verify::{VerificationReport, verify_mapped_table},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingSource {
    /// Reused from the preference store.
    Learned,
    Suggested,
    /// Supplied by the caller.
    Confirmed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingProposal {
    pub source: MappingSource,
    pub suggestions: SuggestedMapping,
}

#[derive(Debug, Clone)]
pub struct Inspection {
    pub file_info: FileInfo,
    pub warnings: Vec<String>,
    pub table: ParsedTable,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestOutcome {
    pub file_info: FileInfo,
    pub warnings: Vec<String>,
    pub mapping_source: MappingSource,
    pub mapping: FieldMapping,
    pub mapping_report: MappingReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification: Option<VerificationReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<QualityAnalysis>,
}

#[derive(Debug)]
pub struct IngestPipeline {
    security: SecurityValidator,
    parser: TableParser,
    mapper: SchemaMapper,
    preferences: MappingPreferenceStore,
    analyzer: DataQualityAnalyzer,
    small_dataset_rows: usize,
}

impl IngestPipeline {
    pub fn new(
        security: SecurityValidator,
        parser: TableParser,
        mapper: SchemaMapper,
        preferences: MappingPreferenceStore,
        analyzer: DataQualityAnalyzer,
        small_dataset_rows: usize,
    ) -> Self {
        Self {
            security,
            parser,
            mapper,
            preferences,
            analyzer,
            small_dataset_rows,
        }
    }

    pub fn from_config(config: &IngestConfig, preferences: MappingPreferenceStore) -> Self {
        Self::new(
            SecurityValidator::new(config.security.clone()),
            TableParser::new(&config.security),
            SchemaMapper::new(config.mapping.clone()),
            preferences,
            DataQualityAnalyzer::new(config.quality.clone()),
            config.quality.small_dataset_rows,
        )
    }

    pub fn security(&self) -> &SecurityValidator {
        &self.security
    }

    pub fn mapper(&self) -> &SchemaMapper {
        &self.mapper
    }

    pub fn preferences(&self) -> &MappingPreferenceStore {
        &self.preferences
    }

    /// Screens the upload and parses it in full. Nothing past this point may
    /// run on an upload that failed here.
    pub fn inspect(&self, bytes: &[u8], filename: &str) -> Result<Inspection, IngestError> {
        let screened = self.security.screen(bytes, filename)?;
        let table = self.parser.parse(bytes, filename)?;
        let mut warnings = screened.warnings;
        warnings.extend(table.warnings().iter().cloned());
        info!(
            "Parsed '{filename}': {} row(s), {} column(s)",
            table.row_count(),
            table.column_count()
        );
        Ok(Inspection {
            file_info: screened.info,
            warnings,
            table,
        })
    }

    /// The learned mapping for this header set when one exists, otherwise a
    /// fresh suggestion.
    pub fn propose(&self, headers: &[String]) -> MappingProposal {
        let learned = self.preferences.load(headers).restricted_to(headers);
        if learned.is_empty() {
            return MappingProposal {
                source: MappingSource::Suggested,
                suggestions: self.mapper.suggest(headers),
            };
        }
        info!("Reusing learned mapping for {} header(s)", learned.len());
        let suggestions = headers
            .iter()
            .filter_map(|header| {
                let field = learned.get(header)?;
                Some((header.clone(), self.mapper.confidence(header, field)))
            })
            .collect();
        MappingProposal {
            source: MappingSource::Learned,
            suggestions: SuggestedMapping::from_entries(suggestions),
        }
    }

    /// Validates a confirmed mapping and remembers it when valid.
    pub fn confirm(&self, headers: &[String], mapping: &FieldMapping) -> MappingReport {
        let report = MappingValidator::new(headers).validate(mapping);
        if report.is_valid() {
            self.preferences.save(headers, mapping);
            info!("Confirmed mapping saved for {} header(s)", headers.len());
        } else {
            warn!("Confirmed mapping rejected: {}", report.message);
        }
        report
    }

    /// Like [`confirm`](Self::confirm) for an untyped mapping object. Field
    /// names are resolved once, and the resolved mapping is what gets saved.
    pub fn confirm_json(
        &self,
        headers: &[String],
        raw: &JsonValue,
    ) -> Result<MappingReport, IngestError> {
        let (report, mapping) = MappingValidator::new(headers).resolve_json(raw)?;
        if report.is_valid() {
            self.preferences.save(headers, &mapping);
            info!("Confirmed mapping saved for {} header(s)", headers.len());
        } else {
            warn!("Confirmed mapping rejected: {}", report.message);
        }
        Ok(report)
    }

    pub fn analyze(&self, table: &ParsedTable) -> QualityAnalysis {
        self.analyzer.analyze(table)
    }

    /// Renames mapped columns, then verifies the result.
    pub fn apply(
        &self,
        table: ParsedTable,
        mapping: &FieldMapping,
    ) -> Result<(ParsedTable, VerificationReport), IngestError> {
        let mapped = apply_mapping(table, mapping).map_err(|err| {
            ProcessingError::wrap("Applying confirmed mapping", &anyhow::Error::from(err))
        })?;
        let verification = verify_mapped_table(&mapped, self.small_dataset_rows);
        Ok((mapped, verification))
    }

    /// Runs every stage. A caller-supplied mapping takes precedence over the
    /// proposal and is remembered when valid; a proposal is only validated.
    /// Analysis only runs once the mapping validates.
    pub fn ingest(
        &self,
        bytes: &[u8],
        filename: &str,
        confirmed: Option<&FieldMapping>,
    ) -> Result<IngestOutcome, IngestError> {
        let inspection = self.inspect(bytes, filename)?;
        let headers = inspection.table.headers().to_vec();

        let (mapping_source, mapping, mapping_report) = match confirmed {
            Some(mapping) => {
                let report = self.confirm(&headers, mapping);
                (MappingSource::Confirmed, mapping.clone(), report)
            }
            None => {
                let proposal = self.propose(&headers);
                let mapping = proposal.suggestions.to_field_mapping();
                let report = MappingValidator::new(&headers).validate(&mapping);
                (proposal.source, mapping, report)
            }
        };

        if !mapping_report.is_valid() {
            return Ok(IngestOutcome {
                file_info: inspection.file_info,
                warnings: inspection.warnings,
                mapping_source,
                mapping,
                mapping_report,
                verification: None,
                quality: None,
            });
        }

        let (mapped, verification) = self.apply(inspection.table, &mapping)?;
        let quality = self.analyze(&mapped);
        Ok(IngestOutcome {
            file_info: inspection.file_info,
            warnings: inspection.warnings,
            mapping_source,
            mapping,
            mapping_report,
            verification: Some(verification),
            quality: Some(quality),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::CanonicalField;
    use serde_json::json;

    fn owned(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    const CSV: &[u8] = b"when,badge,reader,outcome\n\
2023-01-01 10:00:00,u1,d1,granted\n\
2023-01-01 10:05:00,u2,d2,denied\n";

    fn pipeline() -> IngestPipeline {
        IngestPipeline::from_config(&IngestConfig::default(), MappingPreferenceStore::new())
    }

    #[test]
    fn proposal_switches_to_learned_after_confirmation() {
        let pipeline = pipeline();
        let inspection = pipeline.inspect(CSV, "events.csv").unwrap();
        let headers = inspection.table.headers().to_vec();
        assert_eq!(pipeline.propose(&headers).source, MappingSource::Suggested);

        let mut mapping = FieldMapping::new();
        mapping.insert("when", CanonicalField::Timestamp);
        mapping.insert("badge", CanonicalField::UserId);
        mapping.insert("reader", CanonicalField::DoorId);
        mapping.insert("outcome", CanonicalField::EventType);
        assert!(pipeline.confirm(&headers, &mapping).is_valid());

        let proposal = pipeline.propose(&headers);
        assert_eq!(proposal.source, MappingSource::Learned);
        assert_eq!(proposal.suggestions.to_field_mapping(), mapping);
    }

    #[test]
    fn ingest_runs_analysis_for_valid_mapping() {
        let outcome = pipeline().ingest(CSV, "events.csv", None).unwrap();
        assert!(outcome.mapping_report.is_valid(), "{:?}", outcome.mapping_report);
        assert_eq!(outcome.mapping_source, MappingSource::Suggested);
        assert!(outcome.verification.unwrap().success);
        assert!(outcome.quality.unwrap().report().is_some());
    }

    #[test]
    fn unconfirmed_proposal_is_not_remembered() {
        let pipeline = pipeline();
        let outcome = pipeline.ingest(CSV, "events.csv", None).unwrap();
        assert!(outcome.mapping_report.is_valid());
        let headers = owned(&["when", "badge", "reader", "outcome"]);
        assert!(!pipeline.preferences().contains(&headers));
        assert_eq!(pipeline.propose(&headers).source, MappingSource::Suggested);
    }

    #[test]
    fn confirmed_ingest_mapping_is_remembered() {
        let pipeline = pipeline();
        let mut mapping = FieldMapping::new();
        mapping.insert("when", CanonicalField::Timestamp);
        mapping.insert("badge", CanonicalField::UserId);
        mapping.insert("reader", CanonicalField::DoorId);
        mapping.insert("outcome", CanonicalField::EventType);
        let outcome = pipeline.ingest(CSV, "events.csv", Some(&mapping)).unwrap();
        assert_eq!(outcome.mapping_source, MappingSource::Confirmed);
        let headers = owned(&["when", "badge", "reader", "outcome"]);
        assert_eq!(pipeline.preferences().load(&headers), mapping);
    }

    #[test]
    fn confirm_json_saves_mapping_given_by_display_name() {
        let pipeline = pipeline();
        let headers = owned(&["when", "badge", "reader", "outcome"]);
        let report = pipeline
            .confirm_json(
                &headers,
                &json!({
                    "when": "Timestamp (Event Time)",
                    "badge": "UserID",
                    "reader": "doorid",
                    "outcome": "EventType",
                }),
            )
            .unwrap();
        assert!(report.is_valid(), "{:?}", report.report.errors);
        let saved = pipeline.preferences().load(&headers);
        assert_eq!(saved.get("when"), Some(CanonicalField::Timestamp));
        assert_eq!(saved.get("reader"), Some(CanonicalField::DoorId));
        assert_eq!(saved.len(), 4);
    }

    #[test]
    fn confirm_json_rejects_without_saving() {
        let pipeline = pipeline();
        let headers = owned(&["when", "badge", "reader", "outcome"]);
        let report = pipeline
            .confirm_json(&headers, &json!({"when": "Timestamp", "badge": "Badge"}))
            .unwrap();
        assert!(!report.is_valid());
        assert!(pipeline.preferences().is_empty());
        assert!(matches!(
            pipeline.confirm_json(&headers, &json!(["when"])),
            Err(IngestError::MappingType(_))
        ));
    }

    #[test]
    fn invalid_mapping_stops_before_analysis() {
        let mut partial = FieldMapping::new();
        partial.insert("when", CanonicalField::Timestamp);
        let outcome = pipeline().ingest(CSV, "events.csv", Some(&partial)).unwrap();
        assert!(!outcome.mapping_report.is_valid());
        assert!(outcome.quality.is_none());
        assert!(outcome.verification.is_none());
    }

    #[test]
    fn rejected_upload_is_a_security_error() {
        let err = pipeline().inspect(CSV, "events.exe").unwrap_err();
        assert!(matches!(err, IngestError::Security(_)));
    }
}
