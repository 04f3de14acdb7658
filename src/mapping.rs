//! Header to canonical-field suggestion.
//!
//! [`SchemaMapper::suggest`] runs in two passes. Headers that already *are* a
//! canonical field (its key or display name, verbatim or after normalization)
//! are pinned first with a score of 1.0. The remaining fields are then filled
//! greedily, one field at a time in [`CanonicalField::ALL`] order, by picking
//! the unused header with the highest keyword/pattern/similarity score. A
//! header is never assigned twice and ties go to the earlier header.

use std::collections::{BTreeMap, HashSet};

use log::debug;
use serde::{Deserialize, Serialize, Serializer};

use crate::{
    config::MappingSettings,
    data::normalize_header,
    error::ParseError,
    fields::{CanonicalField, ConfidenceBucket},
    fuzzy::{CacheStats, CloseMatcher},
    parse::ParsedTable,
};

const EXACT_SCORE: f64 = 1.0;
const CONTAINED_SCORE: f64 = 0.8;
const RAW_CONTAINED_SCORE: f64 = 0.6;
const PATTERN_SCORE: f64 = 0.5;
const SIMILARITY_WEIGHT: f64 = 0.4;
const LONG_HEADER_PENALTY: f64 = 0.8;

/// Confirmed or learned assignment of source headers to canonical fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldMapping(BTreeMap<String, CanonicalField>);

impl FieldMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, header: impl Into<String>, field: CanonicalField) -> Option<CanonicalField> {
        self.0.insert(header.into(), field)
    }

    pub fn get(&self, header: &str) -> Option<CanonicalField> {
        self.0.get(header).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, CanonicalField)> + '_ {
        self.0.iter().map(|(header, field)| (header.as_str(), *field))
    }

    /// The first header (in key order) assigned to `field`.
    pub fn header_for(&self, field: CanonicalField) -> Option<&str> {
        self.iter().find(|(_, f)| *f == field).map(|(h, _)| h)
    }

    pub fn fields(&self) -> HashSet<CanonicalField> {
        self.0.values().copied().collect()
    }

    /// Drops entries whose header is not in `headers`.
    pub fn restricted_to(&self, headers: &[String]) -> Self {
        let present = headers.iter().map(String::as_str).collect::<HashSet<_>>();
        Self(
            self.0
                .iter()
                .filter(|(header, _)| present.contains(header.as_str()))
                .map(|(header, field)| (header.clone(), *field))
                .collect(),
        )
    }
}

impl FromIterator<(String, CanonicalField)> for FieldMapping {
    fn from_iter<I: IntoIterator<Item = (String, CanonicalField)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSuggestion {
    pub field: CanonicalField,
    pub confidence_score: f64,
    pub confidence_bucket: ConfidenceBucket,
}

impl FieldSuggestion {
    fn new(field: CanonicalField, score: f64) -> Self {
        Self {
            field,
            confidence_score: score,
            confidence_bucket: ConfidenceBucket::from_score(score),
        }
    }
}

/// Suggested assignments keyed by header, in source header order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SuggestedMapping {
    entries: Vec<(String, FieldSuggestion)>,
}

impl SuggestedMapping {
    pub fn from_entries(entries: Vec<(String, FieldSuggestion)>) -> Self {
        Self { entries }
    }

    pub fn get(&self, header: &str) -> Option<&FieldSuggestion> {
        self.entries
            .iter()
            .find(|(h, _)| h == header)
            .map(|(_, suggestion)| suggestion)
    }

    pub fn header_for(&self, field: CanonicalField) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, s)| s.field == field)
            .map(|(h, _)| h.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldSuggestion)> + '_ {
        self.entries.iter().map(|(h, s)| (h.as_str(), s))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_field_mapping(&self) -> FieldMapping {
        self.entries
            .iter()
            .map(|(header, suggestion)| (header.clone(), suggestion.field))
            .collect()
    }
}

impl Serialize for SuggestedMapping {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_map(self.entries.iter().map(|(h, s)| (h, s)))
    }
}

#[derive(Debug)]
pub struct SchemaMapper {
    settings: MappingSettings,
    matcher: CloseMatcher,
}

impl SchemaMapper {
    pub fn new(settings: MappingSettings) -> Self {
        let matcher = CloseMatcher::new(settings.cache_capacity);
        Self { settings, matcher }
    }

    pub fn settings(&self) -> &MappingSettings {
        &self.settings
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.matcher.stats()
    }

    pub fn clear_cache(&self) {
        self.matcher.clear();
    }

    /// Keyword, pattern and similarity score of `header` against `field`,
    /// clamped to `[0, 1]`. Contributions from every keyword and pattern add up.
    pub fn score(&self, header: &str, field: CanonicalField) -> f64 {
        let lowered = header.trim().to_lowercase();
        let normalized = normalize_header(header);
        let mut score = 0.0;

        for keyword in field.keywords() {
            if *keyword == normalized {
                score += EXACT_SCORE;
            } else if normalized.contains(keyword) {
                score += CONTAINED_SCORE;
            } else if lowered.contains(keyword) {
                score += RAW_CONTAINED_SCORE;
            }
        }

        score += field
            .patterns()
            .iter()
            .filter(|pattern| pattern.is_match(&lowered))
            .count() as f64
            * PATTERN_SCORE;

        let keywords = field
            .keywords()
            .iter()
            .map(|k| k.to_string())
            .collect::<Vec<_>>();
        score += self
            .matcher
            .close_matches(&normalized, &keywords, self.settings.fuzzy_threshold)
            .iter()
            .filter(|m| m.similarity > self.settings.fuzzy_threshold)
            .map(|m| m.similarity * SIMILARITY_WEIGHT)
            .sum::<f64>();

        if header.chars().count() > self.settings.long_header_len {
            score *= LONG_HEADER_PENALTY;
        }
        score.clamp(0.0, 1.0)
    }

    /// Score and bucket for an arbitrary header/field pair. Blank headers score 0.
    pub fn confidence(&self, header: &str, field: CanonicalField) -> FieldSuggestion {
        if header.trim().is_empty() {
            return FieldSuggestion::new(field, 0.0);
        }
        if is_exact_match(header, field) {
            return FieldSuggestion::new(field, EXACT_SCORE);
        }
        FieldSuggestion::new(field, self.score(header, field))
    }

    pub fn suggest(&self, headers: &[String]) -> SuggestedMapping {
        let mut assigned: BTreeMap<usize, FieldSuggestion> = BTreeMap::new();
        let mut pending = Vec::new();

        for field in CanonicalField::ALL {
            let exact = headers
                .iter()
                .position(|h| h == field.key() || h == field.display_name())
                .or_else(|| headers.iter().position(|h| is_exact_match(h, field)))
                .filter(|idx| !assigned.contains_key(idx));
            match exact {
                Some(idx) => {
                    debug!("Header '{}' is an exact match for {field}", headers[idx]);
                    assigned.insert(idx, FieldSuggestion::new(field, EXACT_SCORE));
                }
                None => pending.push(field),
            }
        }

        for field in pending {
            let mut best: Option<(usize, f64)> = None;
            for (idx, header) in headers.iter().enumerate() {
                if assigned.contains_key(&idx) {
                    continue;
                }
                let score = self.score(header, field);
                let beats_best = best.is_none_or(|(_, best_score)| score > best_score);
                if score > self.settings.min_score && beats_best {
                    best = Some((idx, score));
                }
            }
            if let Some((idx, score)) = best {
                debug!("Header '{}' scored {score:.3} for {field}", headers[idx]);
                assigned.insert(idx, FieldSuggestion::new(field, score));
            }
        }

        SuggestedMapping {
            entries: assigned
                .into_iter()
                .map(|(idx, suggestion)| (headers[idx].clone(), suggestion))
                .collect(),
        }
    }

    /// Name-based suggestion: exact display name, exact key, then the closest
    /// lower-cased header to the display name and finally to the key.
    pub fn suggest_by_name(&self, headers: &[String]) -> FieldMapping {
        let cutoff = self.settings.close_match_cutoff;
        let mut mapping = FieldMapping::new();
        let mut used = HashSet::new();

        for field in CanonicalField::ALL {
            let available = headers
                .iter()
                .filter(|h| !used.contains(h.as_str()))
                .cloned()
                .collect::<Vec<_>>();
            let lowered = available.iter().map(|h| h.to_lowercase()).collect::<Vec<_>>();

            let chosen = available
                .iter()
                .find(|h| h.as_str() == field.display_name())
                .or_else(|| available.iter().find(|h| h.as_str() == field.key()))
                .cloned()
                .or_else(|| {
                    [field.display_name(), field.key()].into_iter().find_map(|target| {
                        let found = self
                            .matcher
                            .best_match(&target.to_lowercase(), &lowered, cutoff)?;
                        lowered
                            .iter()
                            .position(|l| *l == found.candidate)
                            .map(|idx| available[idx].clone())
                    })
                });

            if let Some(header) = chosen {
                used.insert(header.clone());
                mapping.insert(header, field);
            }
        }
        mapping
    }
}

impl Default for SchemaMapper {
    fn default() -> Self {
        Self::new(MappingSettings::default())
    }
}

fn is_exact_match(header: &str, field: CanonicalField) -> bool {
    let trimmed = header.trim();
    if trimmed == field.key() || trimmed == field.display_name() {
        return true;
    }
    let normalized = normalize_header(trimmed);
    !normalized.is_empty()
        && (normalized == normalize_header(field.key())
            || normalized == normalize_header(field.display_name()))
}

/// Renames mapped columns to their canonical display names. Unmapped columns
/// keep their original header.
pub fn apply_mapping(table: ParsedTable, mapping: &FieldMapping) -> Result<ParsedTable, ParseError> {
    let renamed = table
        .headers()
        .iter()
        .map(|header| match mapping.get(header) {
            Some(field) => field.display_name().to_string(),
            None => header.clone(),
        })
        .collect();
    table.with_headers(renamed)
}
