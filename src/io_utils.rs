//! Byte decoding, CSV reader construction, and filename helpers.
//!
//! Uploads arrive as undecoded bytes. Decoding walks a fixed fallback list of
//! encodings (`utf-8`, `latin-1`, `cp1252`, `iso-8859-1`) via `encoding_rs`
//! and keeps the first that decodes without errors. A UTF-8 byte-order mark is
//! stripped before decoding.

use std::{borrow::Cow, io::Read};

use encoding_rs::{Encoding, UTF_8};

use crate::error::ParseError;

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DECODE_FALLBACKS: &[&str] = &["utf-8", "latin-1", "cp1252", "iso-8859-1"];

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Resolves an encoding label, accepting the Python-style aliases used in
/// the fallback list.
pub fn resolve_encoding(label: &str) -> Option<&'static Encoding> {
    let normalized = match label.trim().to_ascii_lowercase().as_str() {
        "latin-1" | "latin_1" => "latin1".to_string(),
        "cp1252" => "windows-1252".to_string(),
        other => other.to_string(),
    };
    Encoding::for_label(normalized.as_bytes())
}

pub fn decode_bytes<'a>(bytes: &'a [u8], encoding: &'static Encoding) -> Option<Cow<'a, str>> {
    let payload = if encoding == UTF_8 {
        bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes)
    } else {
        bytes
    };
    encoding.decode_without_bom_handling_and_without_replacement(payload)
}

/// Decodes with the first encoding in [`DECODE_FALLBACKS`] that succeeds.
pub fn decode_with_fallback(bytes: &[u8]) -> Result<(Cow<'_, str>, &'static Encoding), ParseError> {
    for label in DECODE_FALLBACKS {
        let Some(encoding) = resolve_encoding(label) else {
            continue;
        };
        if let Some(text) = decode_bytes(bytes, encoding) {
            return Ok((text, encoding));
        }
    }
    Err(ParseError::Undecodable {
        tried: DECODE_FALLBACKS.iter().map(|s| s.to_string()).collect(),
    })
}

pub fn open_csv_reader<R>(reader: R, delimiter: u8) -> csv::Reader<R>
where
    R: Read,
{
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(true)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(true);
    builder.from_reader(reader)
}

/// Lower-cased extension including the leading dot, e.g. `.csv`.
pub fn extension_of(filename: &str) -> Option<String> {
    let name = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let idx = name.rfind('.')?;
    if idx == 0 && name.len() == 1 {
        return None;
    }
    Some(name[idx..].to_ascii_lowercase())
}

pub fn has_allowed_extension(filename: &str, allowed: &[String]) -> bool {
    let lowered = filename.to_ascii_lowercase();
    allowed
        .iter()
        .any(|ext| lowered.ends_with(&ext.to_ascii_lowercase()))
}

pub fn is_json_filename(filename: &str) -> bool {
    extension_of(filename).as_deref() == Some(".json")
}

pub fn format_bytes(size: usize) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut value = size as f64;
    let mut unit = 0usize;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{size} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use encoding_rs::WINDOWS_1252;

    #[test]
    fn utf8_bom_is_stripped() {
        let bytes = b"\xEF\xBB\xBFid,name\n";
        let (text, encoding) = decode_with_fallback(bytes).unwrap();
        assert_eq!(encoding, UTF_8);
        assert!(text.starts_with("id"));
    }

    #[test]
    fn falls_back_to_latin1_for_invalid_utf8() {
        let (encoded, _, _) = WINDOWS_1252.encode("id,name\n1,Caf\u{e9}\n");
        let (text, encoding) = decode_with_fallback(&encoded).unwrap();
        assert_ne!(encoding, UTF_8);
        assert!(text.contains("Caf\u{e9}"));
    }

    #[test]
    fn python_aliases_resolve() {
        assert!(resolve_encoding("latin-1").is_some());
        assert!(resolve_encoding("cp1252").is_some());
        assert!(resolve_encoding("iso-8859-1").is_some());
        assert!(resolve_encoding("no-such-charset").is_none());
    }

    #[test]
    fn extension_is_lowercased_and_dotted() {
        assert_eq!(extension_of("Events.CSV").as_deref(), Some(".csv"));
        assert_eq!(extension_of("dir/archive.tar.json").as_deref(), Some(".json"));
        assert_eq!(extension_of("README"), None);
        assert!(has_allowed_extension("LOG.JSON", &[".json".to_string()]));
        assert!(!has_allowed_extension("test.exe", &[".csv".to_string()]));
    }

    #[test]
    fn bytes_format_with_units() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(50 * 1024 * 1024), "50.0 MB");
    }
}
