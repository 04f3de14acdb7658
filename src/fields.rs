//! The four canonical fields every uploaded event log maps onto.
//!
//! Each [`CanonicalField`] carries a stable key (used in persisted mappings),
//! a display name (used in user-facing messages and as the renamed column
//! header after mapping), a keyword synonym list and a set of regex patterns
//! consumed by the schema mapper.

use std::{fmt, str::FromStr, sync::OnceLock};

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CanonicalField {
    Timestamp,
    UserId,
    DoorId,
    EventType,
}

impl CanonicalField {
    /// Fixed field order; suggestion ties resolve in this order.
    pub const ALL: [CanonicalField; 4] = [
        CanonicalField::Timestamp,
        CanonicalField::UserId,
        CanonicalField::DoorId,
        CanonicalField::EventType,
    ];

    pub fn key(self) -> &'static str {
        match self {
            CanonicalField::Timestamp => "Timestamp",
            CanonicalField::UserId => "UserID",
            CanonicalField::DoorId => "DoorID",
            CanonicalField::EventType => "EventType",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            CanonicalField::Timestamp => "Timestamp (Event Time)",
            CanonicalField::UserId => "UserID (Person Identifier)",
            CanonicalField::DoorId => "DoorID (Device Name)",
            CanonicalField::EventType => "EventType (Access Result)",
        }
    }

    pub fn keywords(self) -> &'static [&'static str] {
        match self {
            CanonicalField::Timestamp => &[
                "timestamp",
                "time",
                "datetime",
                "date",
                "event_time",
                "eventtime",
                "access_time",
                "accesstime",
                "log_time",
                "logtime",
                "created",
                "occurred",
                "when",
                "ts",
                "dt",
                "event_dt",
                "access_dt",
            ],
            CanonicalField::UserId => &[
                "userid",
                "user_id",
                "user",
                "person",
                "employee",
                "badge",
                "card",
                "identifier",
                "id",
                "person_id",
                "personid",
                "emp_id",
                "empid",
                "badge_id",
                "badgeid",
                "card_id",
                "cardid",
                "user_code",
                "usercode",
                "person_identifier",
                "employee_id",
                "employeeid",
                "credential",
                "credentials",
                "token_holder",
                "holder",
            ],
            CanonicalField::DoorId => &[
                "doorid",
                "door_id",
                "door",
                "device",
                "reader",
                "access_point",
                "accesspoint",
                "panel",
                "controller",
                "gate",
                "entrance",
                "device_name",
                "devicename",
                "reader_id",
                "readerid",
                "door_name",
                "doorname",
                "panel_id",
                "panelid",
                "location",
                "point",
                "device_id",
                "terminal",
                "scanner",
                "barrier",
            ],
            CanonicalField::EventType => &[
                "eventtype",
                "event_type",
                "event",
                "result",
                "status",
                "action",
                "access_result",
                "accessresult",
                "outcome",
                "response",
                "access_status",
                "accessstatus",
                "access_type",
                "accesstype",
                "entry_type",
                "entrytype",
                "authorization",
                "auth_result",
                "authresult",
                "grant",
                "deny",
                "success",
                "failure",
                "verdict",
            ],
        }
    }

    fn pattern_sources(self) -> &'static [&'static str] {
        match self {
            CanonicalField::Timestamp => &[
                r"^.*time.*", r"^.*date.*", r"^.*ts.*", r"^.*dt.*", r"^.*when.*",
                r"^.*created.*", r"^.*occurred.*", r"^.*log.*time.*",
            ],
            CanonicalField::UserId => &[
                r"^.*user.*", r"^.*person.*", r"^.*employee.*", r"^.*badge.*",
                r"^.*card.*", r"^.*id.*", r"^.*credential.*", r"^.*holder.*",
            ],
            CanonicalField::DoorId => &[
                r"^.*door.*", r"^.*device.*", r"^.*reader.*", r"^.*panel.*",
                r"^.*gate.*", r"^.*entrance.*", r"^.*point.*", r"^.*terminal.*",
            ],
            CanonicalField::EventType => &[
                r"^.*event.*", r"^.*result.*", r"^.*status.*", r"^.*action.*",
                r"^.*access.*", r"^.*outcome.*", r"^.*auth.*", r"^.*grant.*",
            ],
        }
    }

    /// Compiled regex patterns, anchored at the start of the lower-cased header.
    pub fn patterns(self) -> &'static [Regex] {
        static COMPILED: OnceLock<[Vec<Regex>; 4]> = OnceLock::new();
        let all = COMPILED.get_or_init(|| {
            CanonicalField::ALL.map(|field| {
                field
                    .pattern_sources()
                    .iter()
                    .filter_map(|source| Regex::new(source).ok())
                    .collect()
            })
        });
        &all[self.index()]
    }

    fn index(self) -> usize {
        match self {
            CanonicalField::Timestamp => 0,
            CanonicalField::UserId => 1,
            CanonicalField::DoorId => 2,
            CanonicalField::EventType => 3,
        }
    }

    pub fn keys() -> Vec<&'static str> {
        CanonicalField::ALL.iter().map(|f| f.key()).collect()
    }

    /// The one rule for reading a field name from user input: surrounding
    /// whitespace is ignored and either the key or the display name matches,
    /// ASCII case-insensitively.
    pub fn resolve(value: &str) -> Option<Self> {
        let trimmed = value.trim();
        CanonicalField::ALL.into_iter().find(|field| {
            field.key().eq_ignore_ascii_case(trimmed)
                || field.display_name().eq_ignore_ascii_case(trimmed)
        })
    }
}

impl fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for CanonicalField {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        CanonicalField::resolve(value).ok_or_else(|| {
            format!(
                "Unknown canonical field '{value}'. Valid keys: {}",
                CanonicalField::keys().join(", ")
            )
        })
    }
}

impl Serialize for CanonicalField {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.key())
    }
}

impl<'de> Deserialize<'de> for CanonicalField {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        CanonicalField::from_str(&raw).map_err(de::Error::custom)
    }
}

/// Coarse classification of a continuous mapping score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceBucket {
    High,
    Medium,
    Low,
    None,
}

impl ConfidenceBucket {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            ConfidenceBucket::High
        } else if score >= 0.5 {
            ConfidenceBucket::Medium
        } else if score >= 0.3 {
            ConfidenceBucket::Low
        } else {
            ConfidenceBucket::None
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConfidenceBucket::High => "high",
            ConfidenceBucket::Medium => "medium",
            ConfidenceBucket::Low => "low",
            ConfidenceBucket::None => "none",
        }
    }
}

impl fmt::Display for ConfidenceBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
