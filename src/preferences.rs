//! Learned header mappings keyed by header signature.
//!
//! The serialized store is a JSON object whose keys are header signatures and
//! whose values are flat `{header: fieldKey}` objects. Entries are kept as raw
//! JSON so one corrupt entry does not poison the rest of the store.

use std::{
    collections::BTreeMap,
    fmt::Write as _,
    fs,
    io::{ErrorKind, Write},
    path::Path,
    sync::{PoisonError, RwLock},
};

use anyhow::{Context, Result};
use itertools::Itertools;
use log::{debug, info, warn};
use serde_json::Value as JsonValue;
use tempfile::NamedTempFile;

use crate::{data::json_kind, mapping::FieldMapping};

/// Order-independent identity of a header set: the sorted headers as an
/// ASCII-only JSON array, e.g. `["door", "time", "user"]`. Characters outside
/// printable ASCII are written as `\uXXXX` UTF-16 escapes, so signatures match
/// those in payloads written by the existing upload service.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HeaderSignature(String);

impl HeaderSignature {
    pub fn from_headers(headers: &[String]) -> Self {
        let encoded = headers
            .iter()
            .sorted()
            .map(|h| ascii_json_string(h))
            .join(", ");
        Self(format!("[{encoded}]"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn ascii_json_string(value: &str) -> String {
    let quoted = JsonValue::from(value).to_string();
    let mut escaped = String::with_capacity(quoted.len());
    for ch in quoted.chars() {
        if ch.is_ascii() && ch != '\u{7f}' {
            escaped.push(ch);
            continue;
        }
        let mut units = [0u16; 2];
        for unit in ch.encode_utf16(&mut units) {
            let _ = write!(escaped, "\\u{unit:04x}");
        }
    }
    escaped
}

#[derive(Debug, Default)]
pub struct MappingPreferenceStore {
    entries: RwLock<BTreeMap<String, JsonValue>>,
}

impl MappingPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from a serialized payload. A payload that is not a JSON
    /// object yields an empty store.
    pub fn from_json(raw: &str) -> Self {
        if raw.trim().is_empty() {
            return Self::new();
        }
        match serde_json::from_str::<JsonValue>(raw) {
            Ok(JsonValue::Object(map)) => Self {
                entries: RwLock::new(map.into_iter().collect()),
            },
            Ok(other) => {
                warn!(
                    "Ignoring mapping preferences: expected a JSON object, found {}",
                    json_kind(&other)
                );
                Self::new()
            }
            Err(err) => {
                warn!("Ignoring corrupt mapping preferences: {err}");
                Self::new()
            }
        }
    }

    /// Missing files give an empty store; unreadable files are an error.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(raw) => {
                let store = Self::from_json(&raw);
                info!("Loaded {} mapping preference(s) from {path:?}", store.len());
                Ok(store)
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("No mapping preferences at {path:?}; starting empty");
                Ok(Self::new())
            }
            Err(err) => Err(err).with_context(|| format!("Reading mapping preferences {path:?}")),
        }
    }

    /// Writes to a sibling temp file, then renames it over `path`.
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).with_context(|| format!("Creating directory {dir:?}"))?;
        let payload = self.to_json()?;
        let mut staged = NamedTempFile::new_in(dir)
            .with_context(|| format!("Creating temp file in {dir:?}"))?;
        staged
            .write_all(payload.as_bytes())
            .context("Writing mapping preferences")?;
        staged.flush().context("Flushing mapping preferences")?;
        staged
            .persist(path)
            .map_err(|err| err.error)
            .with_context(|| format!("Replacing mapping preferences {path:?}"))?;
        info!("Saved {} mapping preference(s) to {path:?}", self.len());
        Ok(())
    }

    /// The stored mapping for this header set, or an empty mapping when the
    /// entry is absent or unreadable.
    pub fn load(&self, headers: &[String]) -> FieldMapping {
        let signature = HeaderSignature::from_headers(headers);
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let Some(raw) = entries.get(signature.as_str()) else {
            return FieldMapping::new();
        };
        match serde_json::from_value::<FieldMapping>(raw.clone()) {
            Ok(mapping) => mapping,
            Err(err) => {
                warn!(
                    "Discarding corrupt mapping preference for {}: {err}",
                    signature.as_str()
                );
                FieldMapping::new()
            }
        }
    }

    /// Replaces any existing entry for this header set in full.
    pub fn save(&self, headers: &[String], mapping: &FieldMapping) {
        let signature = HeaderSignature::from_headers(headers);
        let value = mapping
            .iter()
            .map(|(header, field)| (header.to_string(), JsonValue::from(field.key())))
            .collect::<serde_json::Map<_, _>>();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let replaced = entries
            .insert(signature.0, JsonValue::Object(value))
            .is_some();
        debug!(
            "Stored mapping preference ({} header(s), replaced: {replaced})",
            mapping.len()
        );
    }

    pub fn contains(&self, headers: &[String]) -> bool {
        let signature = HeaderSignature::from_headers(headers);
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(signature.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Full serialized payload, ready to hand back to the caller.
    pub fn to_json(&self) -> Result<String> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        serde_json::to_string_pretty(&*entries).context("Serializing mapping preferences")
    }
}
