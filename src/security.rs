//! Upload screening that runs before any parsed content is trusted.
//!
//! Checks run in a fixed order and stop at the first failing stage:
//!
//! 1. size against [`SecurityLimits::max_file_size`]
//! 2. filename extension against the allow-list (case-insensitive)
//! 3. content sniffing via `infer` (a mismatch is only a warning)
//! 4. structural parse of a bounded preview through [`TableParser::preview`]
//! 5. malicious-pattern scan, which reports every threat it finds
//!
//! The structural parse reads the upload back from a staged temporary file;
//! the file is removed when the handle drops, on success and on every error
//! path.

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use encoding_rs::{UTF_8, WINDOWS_1252};
use log::{debug, info, warn};
use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use crate::{
    config::SecurityLimits,
    error::{ProcessingError, SecurityError},
    io_utils,
    parse::{ParsedTable, TableParser},
    validate::ValidationReport,
};

const THREAT_PATTERNS: &[(&str, &str)] = &[
    ("script tag", r"(?i)<script[^>]*>"),
    ("javascript URI", r"(?i)javascript:"),
    ("vbscript URI", r"(?i)vbscript:"),
    ("inline onload handler", r"(?i)onload\s*="),
    ("inline onerror handler", r"(?i)onerror\s*="),
    ("eval call", r"(?i)eval\s*\("),
    ("setTimeout call", r"(?i)setTimeout\s*\("),
    ("setInterval call", r"(?i)setInterval\s*\("),
    ("document.cookie access", r"(?i)document\.cookie"),
    ("document.write call", r"(?i)document\.write"),
    ("window.location access", r"(?i)window\.location"),
    ("directory traversal", r"\.\.[/\\].*\.\.[/\\]"),
    ("python __import__ call", r"(?i)__import__\s*\("),
    ("exec call", r"(?i)exec\s*\("),
    ("system call", r"(?i)system\s*\("),
    ("shell_exec call", r"(?i)shell_exec\s*\("),
    ("server-side template tag", r"<%.*%>"),
    ("prototype pollution key", r#"(?i)"__proto__"\s*:"#),
    ("constructor key", r#"(?i)"constructor"\s*:"#),
    ("NoSQL $where operator", r#"(?i)"\$where"\s*:"#),
    ("NoSQL $regex operator", r#"(?i)"\$regex"\s*:"#),
    ("eval key", r#"(?i)"eval"\s*:"#),
];

const PREVIEW_COLUMN_NAMES: usize = 10;
const HASH_PREFIX_LEN: usize = 16;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub size_bytes: usize,
    pub row_count: usize,
    pub column_count: usize,
    pub column_names: Vec<String>,
    pub file_hash: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SecurityReport {
    #[serde(flatten)]
    pub report: ValidationReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_info: Option<FileInfo>,
}

impl SecurityReport {
    pub fn is_valid(&self) -> bool {
        self.report.is_valid
    }
}

/// Outcome of a successful screen.
#[derive(Debug, Clone)]
pub struct Screened {
    pub info: FileInfo,
    pub warnings: Vec<String>,
}

#[derive(Debug)]
struct ThreatPattern {
    label: &'static str,
    regex: Regex,
}

#[derive(Debug)]
pub struct SecurityValidator {
    limits: SecurityLimits,
    threats: Vec<ThreatPattern>,
    /// Where uploads are staged; the system temp directory when unset.
    staging_dir: Option<PathBuf>,
}

impl SecurityValidator {
    pub fn new(limits: SecurityLimits) -> Self {
        let threats = THREAT_PATTERNS
            .iter()
            .filter_map(|&(label, source)| match Regex::new(source) {
                Ok(regex) => Some(ThreatPattern { label, regex }),
                Err(err) => {
                    warn!("Skipping threat pattern '{label}': {err}");
                    None
                }
            })
            .collect();
        Self {
            limits,
            threats,
            staging_dir: None,
        }
    }

    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = Some(dir.into());
        self
    }

    pub fn limits(&self) -> &SecurityLimits {
        &self.limits
    }

    /// Screens an upload and folds the outcome into a report.
    pub fn validate(&self, bytes: &[u8], filename: &str) -> SecurityReport {
        info!("Starting security validation for '{filename}'");
        match self.screen(bytes, filename) {
            Ok(screened) => {
                info!("Security validation passed for '{filename}'");
                SecurityReport {
                    report: ValidationReport::from_findings(Vec::new(), screened.warnings),
                    file_info: Some(screened.info),
                }
            }
            Err(err) => {
                warn!("Security validation failed for '{filename}': {err}");
                SecurityReport {
                    report: ValidationReport::from_findings(err.messages(), Vec::new()),
                    file_info: None,
                }
            }
        }
    }

    pub fn screen(&self, bytes: &[u8], filename: &str) -> Result<Screened, SecurityError> {
        if bytes.len() > self.limits.max_file_size {
            return Err(SecurityError::FileTooLarge {
                size: bytes.len(),
                max: self.limits.max_file_size,
            });
        }

        if !io_utils::has_allowed_extension(filename, &self.limits.allowed_extensions) {
            return Err(SecurityError::DisallowedExtension {
                filename: filename.to_string(),
                allowed: self.limits.allowed_extensions.clone(),
            });
        }

        let mut warnings = Vec::new();
        if let Some(warning) = self.sniff_content_type(bytes) {
            info!("MIME type warning for '{filename}': {warning}");
            warnings.push(warning);
        }

        let preview = self.check_structure(bytes, filename)?;

        let threats = self.scan_threats(bytes);
        if !threats.is_empty() {
            return Err(SecurityError::MaliciousContent { threats });
        }

        Ok(Screened {
            info: FileInfo {
                size_bytes: bytes.len(),
                row_count: preview.row_count(),
                column_count: preview.column_count(),
                column_names: preview
                    .headers()
                    .iter()
                    .take(PREVIEW_COLUMN_NAMES)
                    .cloned()
                    .collect(),
                file_hash: content_hash(bytes),
            },
            warnings,
        })
    }

    /// Returns a warning when a binary signature is recognised that is not an
    /// allowed type. Text formats carry no signature and pass silently.
    fn sniff_content_type(&self, bytes: &[u8]) -> Option<String> {
        let detected = infer::get(bytes)?;
        let mime = detected.mime_type();
        if self.limits.allowed_mime_types.iter().any(|m| m == mime) {
            return None;
        }
        Some(format!(
            "Detected MIME type: {mime}. Expected CSV or JSON format."
        ))
    }

    fn check_structure(&self, bytes: &[u8], filename: &str) -> Result<ParsedTable, SecurityError> {
        let staged = stage_upload(bytes, self.staging_dir.as_deref()).map_err(|err| {
            SecurityError::from(ProcessingError::wrap("Staging upload for structural parse", &err))
        })?;
        let contents = fs::read(staged.path()).map_err(|err| {
            SecurityError::from(ProcessingError::wrap(
                "Reading staged upload",
                &anyhow::Error::from(err),
            ))
        })?;
        let table = TableParser::preview(&self.limits).parse(&contents, filename)?;
        debug!(
            "Structural preview of '{filename}': {} row(s), {} column(s)",
            table.row_count(),
            table.column_count()
        );
        Ok(table)
    }

    /// Every matching threat is reported, not just the first.
    pub fn scan_threats(&self, bytes: &[u8]) -> Vec<String> {
        let text = match io_utils::decode_bytes(bytes, UTF_8) {
            Some(text) => text,
            None => WINDOWS_1252.decode_without_bom_handling(bytes).0,
        };
        let mut threats = self
            .threats
            .iter()
            .filter(|pattern| pattern.regex.is_match(&text))
            .map(|pattern| format!("Suspicious pattern detected: {}", pattern.label))
            .collect::<Vec<_>>();

        let trimmed = text.trim_start();
        if trimmed.starts_with('{') || trimmed.starts_with('[') {
            let depth = json_nesting_depth(&text);
            if depth > self.limits.max_json_depth {
                threats.push(format!("Excessive JSON nesting detected: {depth} levels"));
            }
        }

        let ratio = control_char_ratio(&text);
        if ratio > self.limits.max_control_char_ratio {
            threats.push(format!(
                "High ratio of control characters detected ({:.1}%)",
                ratio * 100.0
            ));
        }
        threats
    }
}

fn stage_upload(bytes: &[u8], dir: Option<&Path>) -> anyhow::Result<NamedTempFile> {
    let mut staged = match dir {
        Some(dir) => NamedTempFile::new_in(dir)?,
        None => NamedTempFile::new()?,
    };
    staged.write_all(bytes)?;
    staged.flush()?;
    Ok(staged)
}

pub fn content_hash(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut hex = format!("{digest:x}");
    hex.truncate(HASH_PREFIX_LEN);
    hex
}

/// Maximum bracket depth outside of string literals.
pub fn json_nesting_depth(text: &str) -> usize {
    let mut max_depth = 0usize;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for ch in text.chars() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' | '[' => {
                depth += 1;
                max_depth = max_depth.max(depth);
            }
            '}' | ']' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    max_depth
}

/// Share of characters below 0x20 other than tab, CR and LF.
pub fn control_char_ratio(text: &str) -> f64 {
    let mut total = 0usize;
    let mut control = 0usize;
    for ch in text.chars() {
        total += 1;
        if (ch as u32) < 0x20 && !matches!(ch, '\r' | '\n' | '\t') {
            control += 1;
        }
    }
    if total == 0 {
        0.0
    } else {
        control as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> SecurityValidator {
        SecurityValidator::new(SecurityLimits::default())
    }

    #[test]
    fn all_threat_patterns_compile() {
        assert_eq!(validator().threats.len(), THREAT_PATTERNS.len());
    }

    #[test]
    fn nesting_ignores_brackets_inside_strings() {
        assert_eq!(json_nesting_depth(r#"{"a": "[[[[{{{{"}"#), 1);
        assert_eq!(json_nesting_depth(r#"[{"a": [1, 2]}]"#), 3);
        assert_eq!(json_nesting_depth(r#"{"a": "\"{"}"#), 1);
    }

    #[test]
    fn control_ratio_skips_whitespace() {
        assert_eq!(control_char_ratio("a\tb\r\n"), 0.0);
        assert!((control_char_ratio("\u{1}\u{2}ab") - 0.5).abs() < 1e-9);
        assert_eq!(control_char_ratio(""), 0.0);
    }

    #[test]
    fn scan_reports_every_threat() {
        let threats =
            validator().scan_threats(b"id,note\n1,<script>eval(x)</script>\n2,../../etc/passwd\n");
        assert!(threats.iter().any(|t| t.ends_with("script tag")));
        assert!(threats.iter().any(|t| t.ends_with("eval call")));
        assert!(threats.iter().any(|t| t.ends_with("directory traversal")));
    }

    #[test]
    fn hash_is_sixteen_hex_chars() {
        let hash = content_hash(b"user_id\n1\n");
        assert_eq!(hash.len(), 16);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn executable_signature_warns_then_fails_structure() {
        let mut bytes = vec![0x4D, 0x5A, 0x90, 0x00];
        bytes.extend_from_slice(b"fake data");
        assert!(validator().sniff_content_type(&bytes).is_some());
        let report = validator().validate(&bytes, "fake.csv");
        assert!(!report.is_valid());
    }
}
