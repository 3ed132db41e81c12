//! Statement and result data models.
//!
//! This module defines the command types handed to a session and the
//! loosely-typed row representation handed back.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::time::Duration;

use crate::error::{DbError, DbResult};

/// Default command timeout in seconds.
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 30;

/// Maximum command timeout in seconds.
pub const MAX_COMMAND_TIMEOUT_SECS: u64 = 3600;

/// A loosely-typed value, used for statement parameters and result fields.
///
/// JSON form: scalars map to their JSON counterparts, bytes are written as
/// `{"$bytes": "<base64>"}` so they stay distinct from text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DbValue {
    /// NULL value
    Null,
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    Float(f64),
    Text(String),
    /// Binary data, tagged base64 in JSON
    #[serde(with = "base64_bytes")]
    Bytes(Vec<u8>),
}

impl DbValue {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name of this value for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
        }
    }

    /// Integer view; text is parsed, floats are truncated, booleans are 0/1.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Bool(v) => Some(i64::from(*v)),
            Self::Float(v) => Some(*v as i64),
            Self::Text(s) => s.trim().parse().ok(),
            Self::Null | Self::Bytes(_) => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            Self::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            Self::Int(v) => Some(*v != 0),
            Self::Text(s) if s.eq_ignore_ascii_case("true") => Some(true),
            Self::Text(s) if s.eq_ignore_ascii_case("false") => Some(false),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Plain JSON view used for record mapping; bytes become bare base64
    /// text, unlike the tagged serde form.
    pub fn to_json(&self) -> JsonValue {
        use base64::{Engine as _, engine::general_purpose::STANDARD};

        match self {
            Self::Null => JsonValue::Null,
            Self::Bool(v) => JsonValue::Bool(*v),
            Self::Int(v) => JsonValue::Number((*v).into()),
            Self::Float(v) => serde_json::Number::from_f64(*v)
                .map(JsonValue::Number)
                .unwrap_or_else(|| JsonValue::String(v.to_string())),
            Self::Text(s) => JsonValue::String(s.clone()),
            Self::Bytes(b) => JsonValue::String(STANDARD.encode(b)),
        }
    }
}

impl From<bool> for DbValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for DbValue {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<i64> for DbValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for DbValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for DbValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for DbValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Vec<u8>> for DbValue {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl<T: Into<DbValue>> From<Option<T>> for DbValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

/// Binary data as `{"$bytes": "<base64>"}`.
mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    #[serde(deny_unknown_fields)]
    struct Tagged {
        #[serde(rename = "$bytes")]
        bytes: String,
    }

    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        Tagged {
            bytes: STANDARD.encode(bytes),
        }
        .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let tagged = Tagged::deserialize(deserializer)?;
        STANDARD.decode(&tagged.bytes).map_err(serde::de::Error::custom)
    }
}

/// How the statement text is interpreted by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    /// Plain SQL text.
    #[default]
    Text,
    /// The text is a procedure name; parameters become its arguments.
    StoredProcedure,
}

/// A statement plus its positional parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub sql: String,
    #[serde(default)]
    pub params: Vec<DbValue>,
    /// Default: the session's command timeout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub kind: CommandKind,
}

impl Command {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
            timeout_secs: None,
            kind: CommandKind::Text,
        }
    }

    /// Shorthand for a stored procedure call.
    pub fn procedure(name: impl Into<String>) -> Self {
        Self::new(name).with_kind(CommandKind::StoredProcedure)
    }

    /// Add a parameter to this command.
    pub fn bind(mut self, param: impl Into<DbValue>) -> Self {
        self.params.push(param.into());
        self
    }

    /// Set the timeout.
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = Some(timeout_secs);
        self
    }

    pub fn with_kind(mut self, kind: CommandKind) -> Self {
        self.kind = kind;
        self
    }

    /// Get the effective timeout (with bounds checking).
    pub fn effective_timeout(&self, default: Duration) -> Duration {
        self.timeout_secs
            .map(|t| Duration::from_secs(t.clamp(1, MAX_COMMAND_TIMEOUT_SECS)))
            .unwrap_or(default)
    }
}

impl From<&str> for Command {
    fn from(sql: &str) -> Self {
        Self::new(sql)
    }
}

impl From<String> for Command {
    fn from(sql: String) -> Self {
        Self::new(sql)
    }
}

/// One write statement of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchCommand {
    #[serde(flatten)]
    pub command: Command,
    /// Roll the whole batch back when this statement changes nothing.
    #[serde(default)]
    pub require_nonzero_rows: bool,
    /// Filled in after execution.
    #[serde(default, skip_deserializing)]
    pub affected_rows: Option<u64>,
}

impl BatchCommand {
    pub fn new(command: impl Into<Command>) -> Self {
        Self {
            command: command.into(),
            require_nonzero_rows: false,
            affected_rows: None,
        }
    }

    /// Add a parameter to the underlying command.
    pub fn bind(mut self, param: impl Into<DbValue>) -> Self {
        self.command.params.push(param.into());
        self
    }

    pub fn require_rows(mut self) -> Self {
        self.require_nonzero_rows = true;
        self
    }

    pub fn sql(&self) -> &str {
        &self.command.sql
    }
}

/// One named field of a row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub value: DbValue,
}

/// An ordered list of named, loosely-typed values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    fields: Vec<Field>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: DbValue) {
        self.fields.push(Field {
            name: name.into(),
            value,
        });
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<DbValue>) -> Self {
        self.push(name, value.into());
        self
    }

    /// Field by name, ignoring case. The first match wins.
    pub fn get(&self, name: &str) -> Option<&DbValue> {
        self.fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
            .map(|f| &f.value)
    }

    pub fn get_index(&self, index: usize) -> Option<&DbValue> {
        self.fields.get(index).map(|f| &f.value)
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn column_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn to_json(&self) -> JsonValue {
        JsonValue::Object(
            self.fields
                .iter()
                .map(|f| (f.name.clone(), f.value.to_json()))
                .collect(),
        )
    }

    /// Map the row onto a typed record through its JSON form.
    ///
    /// Unlike [`get`](Self::get), field matching is exact: column names must
    /// equal the record's field names (alias the columns in SQL or use
    /// `#[serde(rename)]`/`#[serde(alias)]` on the record).
    pub fn to_record<T: DeserializeOwned>(&self) -> DbResult<T> {
        serde_json::from_value(self.to_json())
            .map_err(|e| DbError::execution(format!("Cannot map row: {}", e), None))
    }
}

/// Column names plus rows, in driver order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl ResultSet {
    /// Result set whose columns are taken from the first row. Without rows
    /// the column list is empty; use [`with_columns`](Self::with_columns)
    /// when the names are known.
    pub fn from_rows(rows: Vec<Row>) -> Self {
        let columns = rows.first().map(Row::column_names).unwrap_or_default();
        Self { columns, rows }
    }

    pub fn with_columns(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    /// Get the number of rows in the result.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// First column of the first row.
    pub fn scalar(&self) -> Option<&DbValue> {
        self.rows.first().and_then(|r| r.get_index(0))
    }
}

impl IntoIterator for ResultSet {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}
