use serde::{Deserialize, Serialize};

use crate::data::{parse_boolean, parse_number, parse_timestamp};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Integer,
    Float,
    Boolean,
    DateTime,
    Text,
}

impl ColumnKind {
    pub fn is_numeric(self) -> bool {
        matches!(self, ColumnKind::Integer | ColumnKind::Float)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ColumnKind::Integer => "integer",
            ColumnKind::Float => "float",
            ColumnKind::Boolean => "boolean",
            ColumnKind::DateTime => "datetime",
            ColumnKind::Text => "text",
        }
    }
}

#[derive(Debug, Clone)]
struct TypeCandidate {
    observed: usize,
    possible_integer: bool,
    possible_float: bool,
    possible_boolean: bool,
    possible_datetime: bool,
}

impl TypeCandidate {
    fn new() -> Self {
        Self {
            observed: 0,
            possible_integer: true,
            possible_float: true,
            possible_boolean: true,
            possible_datetime: true,
        }
    }

    fn update(&mut self, value: &str) {
        self.observed += 1;
        let trimmed = value.trim();
        if self.possible_integer && trimmed.parse::<i64>().is_err() {
            self.possible_integer = false;
        }
        if self.possible_float && parse_number(trimmed).is_none() {
            self.possible_float = false;
        }
        if self.possible_boolean && parse_boolean(trimmed).is_none() {
            self.possible_boolean = false;
        }
        if self.possible_datetime && parse_timestamp(trimmed).is_none() {
            self.possible_datetime = false;
        }
    }

    fn decide(&self) -> ColumnKind {
        // An all-missing column holds only NaN, which is a float column.
        if self.observed == 0 {
            return ColumnKind::Float;
        }
        if self.possible_integer {
            ColumnKind::Integer
        } else if self.possible_float {
            ColumnKind::Float
        } else if self.possible_boolean {
            ColumnKind::Boolean
        } else if self.possible_datetime {
            ColumnKind::DateTime
        } else {
            ColumnKind::Text
        }
    }
}

pub fn infer_column_kind<'a, I>(values: I) -> ColumnKind
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    let mut candidate = TypeCandidate::new();
    for value in values.into_iter().flatten() {
        candidate.update(value);
        if !candidate.possible_integer
            && !candidate.possible_float
            && !candidate.possible_boolean
            && !candidate.possible_datetime
        {
            break;
        }
    }
    candidate.decide()
}
