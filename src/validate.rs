//! Checks a confirmed mapping before it is applied or remembered.
//!
//! Unlike the security screen, every check runs and every finding is
//! reported, so a caller can show the user the complete list at once.

use std::collections::HashSet;

use itertools::Itertools;
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::{
    data::json_kind,
    error::MappingTypeError,
    fields::CanonicalField,
    mapping::FieldMapping,
};

/// Outcome shared by the security screen and the mapping validator. Valid
/// exactly when `errors` is empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn from_findings(errors: Vec<String>, warnings: Vec<String>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
            warnings,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateTarget {
    pub field: CanonicalField,
    pub headers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingReport {
    #[serde(flatten)]
    pub report: ValidationReport,
    /// Display names of canonical fields no header maps to.
    pub missing_columns: Vec<String>,
    pub duplicate_targets: Vec<DuplicateTarget>,
    pub unknown_headers: Vec<String>,
    pub message: String,
}

impl MappingReport {
    pub fn is_valid(&self) -> bool {
        self.report.is_valid
    }
}

#[derive(Debug, Clone)]
pub struct MappingValidator {
    headers: Vec<String>,
}

impl MappingValidator {
    /// `headers` is the header list of the upload the mapping belongs to.
    pub fn new(headers: &[String]) -> Self {
        Self {
            headers: headers.to_vec(),
        }
    }

    pub fn validate(&self, mapping: &FieldMapping) -> MappingReport {
        let entries = mapping
            .iter()
            .map(|(header, field)| (header.to_string(), field.key().to_string()))
            .collect::<Vec<_>>();
        self.check(&entries).0
    }

    /// Validates an untyped mapping as received from a caller. Shape problems
    /// are an `Err`; content problems land in the report.
    pub fn validate_json(&self, raw: &JsonValue) -> Result<MappingReport, MappingTypeError> {
        self.resolve_json(raw).map(|(report, _)| report)
    }

    /// Like [`validate_json`](Self::validate_json), also returning the entries
    /// whose field name resolved. The mapping is only complete when the report
    /// is valid.
    pub fn resolve_json(
        &self,
        raw: &JsonValue,
    ) -> Result<(MappingReport, FieldMapping), MappingTypeError> {
        let object = match raw {
            JsonValue::Object(object) => object,
            other => return Err(MappingTypeError::NotAnObject(json_kind(other))),
        };
        let mut entries = Vec::with_capacity(object.len());
        for (header, value) in object {
            let JsonValue::String(field) = value else {
                return Err(MappingTypeError::NonStringValue {
                    header: header.clone(),
                    found: json_kind(value),
                });
            };
            if header.trim().is_empty() {
                return Err(MappingTypeError::BlankHeader);
            }
            if field.trim().is_empty() {
                return Err(MappingTypeError::BlankValue(header.clone()));
            }
            entries.push((header.clone(), field.clone()));
        }
        Ok(self.check(&entries))
    }

    pub fn validate_single(
        &self,
        header: &str,
        field_key: &str,
    ) -> Result<ValidationReport, MappingTypeError> {
        if header.trim().is_empty() {
            return Err(MappingTypeError::BlankHeader);
        }
        if field_key.trim().is_empty() {
            return Err(MappingTypeError::BlankValue(header.to_string()));
        }
        let mut errors = Vec::new();
        if CanonicalField::resolve(field_key).is_none() {
            errors.push(format!(
                "Invalid field key \"{field_key}\". Valid keys: {}",
                CanonicalField::keys().join(", ")
            ));
        }
        if !self.headers.iter().any(|h| h == header) {
            errors.push(format!("Unknown header '{header}'"));
        }
        Ok(ValidationReport::from_findings(errors, Vec::new()))
    }

    fn check(&self, entries: &[(String, String)]) -> (MappingReport, FieldMapping) {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        let mut resolved = Vec::with_capacity(entries.len());
        let mut unknown_fields = Vec::new();
        for (header, value) in entries {
            match CanonicalField::resolve(value) {
                Some(field) => resolved.push((header.as_str(), field)),
                None => unknown_fields.push(format!("{header} -> {value}")),
            }
        }

        let mapped = resolved.iter().map(|(_, f)| *f).collect::<HashSet<_>>();
        let missing_columns = CanonicalField::ALL
            .into_iter()
            .filter(|field| !mapped.contains(field))
            .map(|field| field.display_name().to_string())
            .collect::<Vec<_>>();
        if !missing_columns.is_empty() {
            errors.push(format!(
                "Missing required mappings: {}",
                missing_columns.join(", ")
            ));
        }

        let duplicate_targets = CanonicalField::ALL
            .into_iter()
            .filter_map(|field| {
                let headers = resolved
                    .iter()
                    .filter(|(_, f)| *f == field)
                    .map(|(h, _)| h.to_string())
                    .collect::<Vec<_>>();
                (headers.len() > 1).then_some(DuplicateTarget { field, headers })
            })
            .collect::<Vec<_>>();
        for duplicate in &duplicate_targets {
            errors.push(format!(
                "Duplicate mappings for {}: {}",
                duplicate.field.display_name(),
                duplicate.headers.join(", ")
            ));
        }

        let known = self.headers.iter().map(String::as_str).collect::<HashSet<_>>();
        let unknown_headers = entries
            .iter()
            .map(|(h, _)| h.as_str())
            .filter(|h| !known.contains(h))
            .map(str::to_string)
            .collect::<Vec<_>>();
        if !unknown_headers.is_empty() {
            errors.push(format!(
                "Invalid headers (not in uploaded file): {}",
                unknown_headers.join(", ")
            ));
        }

        if !unknown_fields.is_empty() {
            errors.push(format!(
                "Unknown field names: {}. Valid keys: {}",
                unknown_fields.join(", "),
                CanonicalField::keys().join(", ")
            ));
        }

        let mapped_headers = entries.iter().map(|(h, _)| h.as_str()).collect::<HashSet<_>>();
        let unmapped = self
            .headers
            .iter()
            .filter(|h| !mapped_headers.contains(h.as_str()))
            .collect::<Vec<_>>();
        if !unmapped.is_empty() {
            warnings.push(format!(
                "Columns left unmapped: {}",
                unmapped.iter().join(", ")
            ));
        }

        let message = if errors.is_empty() {
            "All required columns mapped successfully".to_string()
        } else {
            errors.join("; ")
        };
        debug!(
            "Mapping validation finished with {} error(s) and {} warning(s)",
            errors.len(),
            warnings.len()
        );
        let resolved = resolved
            .into_iter()
            .map(|(header, field)| (header.to_string(), field))
            .collect();
        let report = MappingReport {
            report: ValidationReport::from_findings(errors, warnings),
            missing_columns,
            duplicate_targets,
            unknown_headers,
            message,
        };
        (report, resolved)
    }
}
