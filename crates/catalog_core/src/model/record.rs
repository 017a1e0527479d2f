//! Record domain model.
//!
//! # Responsibility
//! - Give every catalog object a stable id plus creation/update timestamps.
//! - Convert records to and from the flat key/value mapping used for persistence.
//! - Hook fresh records and saves into a `Storage` collaborator.
//!
//! # Invariants
//! - `id` and `created_at` never change after construction.
//! - `created_at <= updated_at`; `save()` strictly advances `updated_at`.
//! - Reconstruction from a mapping never registers with storage.
//! - Reserved keys (`id`, `created_at`, `updated_at`, `__class__`) never live
//!   in the attribute map.

use crate::model::timestamp::{self, format_timestamp, parse_timestamp, TimestampError};
use crate::storage::{Storage, StorageResult};
use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Mapping key carrying the concrete type name in exported records.
pub const CLASS_KEY: &str = "__class__";
pub const ID_KEY: &str = "id";
pub const CREATED_AT_KEY: &str = "created_at";
pub const UPDATED_AT_KEY: &str = "updated_at";

const RESERVED_KEYS: [&str; 4] = [ID_KEY, CREATED_AT_KEY, UPDATED_AT_KEY, CLASS_KEY];

/// Concrete type name of a record, e.g. `BaseModel`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClassName(String);

impl ClassName {
    /// Name of the base record type.
    pub const BASE_MODEL: &'static str = "BaseModel";

    /// Validates `name` as `[A-Za-z][A-Za-z0-9_]*`.
    pub fn new(name: impl Into<String>) -> Result<Self, RecordError> {
        let name = name.into();
        let mut chars = name.chars();
        let valid = chars.next().is_some_and(|first| first.is_ascii_alphabetic())
            && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_');
        if !valid {
            return Err(RecordError::InvalidClassName(name));
        }
        Ok(Self(name))
    }

    pub fn base_model() -> Self {
        Self(Self::BASE_MODEL.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ClassName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Record identifier. Fresh records use UUID v4 text; restored ones keep
/// whatever non-empty string was stored.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordId(String);

impl RecordId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RecordId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Errors raised while building or mutating a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    /// A required key was absent from the reconstruction mapping.
    MissingField(&'static str),
    /// A reserved key held a value of the wrong shape.
    InvalidField { field: &'static str, reason: String },
    /// A timestamp key held text outside the wire format.
    Timestamp {
        field: &'static str,
        source: TimestampError,
    },
    InvalidClassName(String),
    /// Attempt to assign a reserved key as a plain attribute.
    ReservedField(String),
}

impl Display for RecordError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingField(field) => write!(f, "record mapping is missing `{field}`"),
            Self::InvalidField { field, reason } => {
                write!(f, "invalid record field `{field}`: {reason}")
            }
            Self::Timestamp { field, source } => {
                write!(f, "invalid record field `{field}`: {source}")
            }
            Self::InvalidClassName(name) => write!(
                f,
                "invalid class name `{name}`; expected [A-Za-z][A-Za-z0-9_]*"
            ),
            Self::ReservedField(key) => {
                write!(f, "`{key}` is reserved and cannot be set as an attribute")
            }
        }
    }
}

impl Error for RecordError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Timestamp { source, .. } => Some(source),
            Self::MissingField(_)
            | Self::InvalidField { .. }
            | Self::InvalidClassName(_)
            | Self::ReservedField(_) => None,
        }
    }
}

/// Base persistable entity.
///
/// Serialized through its exported mapping (`to_dict`), so serde output and
/// the storage body are the same document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct Record {
    class: ClassName,
    id: RecordId,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
    attributes: BTreeMap<String, Value>,
}

impl Record {
    /// Creates a fresh record and registers it with `storage`.
    ///
    /// # Errors
    /// Returns whatever `Storage::register` returns, unchanged.
    pub fn new<S: Storage + ?Sized>(class: ClassName, storage: &S) -> StorageResult<Self> {
        let created_at = timestamp::now();
        let record = Self {
            class,
            id: RecordId::generate(),
            created_at,
            updated_at: created_at,
            attributes: BTreeMap::new(),
        };
        storage.register(&record)?;
        Ok(record)
    }

    /// Rebuilds a record of `class` from a stored mapping.
    ///
    /// `__class__` is skipped; the caller already chose the type. Keys other
    /// than the reserved ones land in the attribute map verbatim. A mapping
    /// whose `updated_at` precedes `created_at` is rejected.
    pub fn reconstruct(class: ClassName, map: &Map<String, Value>) -> Result<Self, RecordError> {
        let mut id = None;
        let mut created_at = None;
        let mut updated_at = None;
        let mut attributes = BTreeMap::new();

        for (key, value) in map {
            match key.as_str() {
                CLASS_KEY => {}
                ID_KEY => id = Some(parse_id(value)?),
                CREATED_AT_KEY => created_at = Some(parse_time_field(CREATED_AT_KEY, value)?),
                UPDATED_AT_KEY => updated_at = Some(parse_time_field(UPDATED_AT_KEY, value)?),
                _ => {
                    attributes.insert(key.clone(), value.clone());
                }
            }
        }

        let id = id.ok_or(RecordError::MissingField(ID_KEY))?;
        let created_at = created_at.ok_or(RecordError::MissingField(CREATED_AT_KEY))?;
        let updated_at = updated_at.ok_or(RecordError::MissingField(UPDATED_AT_KEY))?;
        if updated_at < created_at {
            return Err(RecordError::InvalidField {
                field: UPDATED_AT_KEY,
                reason: format!(
                    "{} is earlier than created_at {}",
                    format_timestamp(&updated_at),
                    format_timestamp(&created_at)
                ),
            });
        }

        Ok(Self {
            class,
            id,
            created_at,
            updated_at,
            attributes,
        })
    }

    /// Rebuilds a record whose class comes from the mapping's `__class__` entry.
    pub fn from_dict(map: &Map<String, Value>) -> Result<Self, RecordError> {
        let class = match map.get(CLASS_KEY) {
            Some(Value::String(name)) => ClassName::new(name.as_str())?,
            Some(other) => {
                return Err(RecordError::InvalidField {
                    field: CLASS_KEY,
                    reason: format!("expected a string, got {other}"),
                })
            }
            None => return Err(RecordError::MissingField(CLASS_KEY)),
        };
        Self::reconstruct(class, map)
    }

    /// Exports the record as a flat mapping with text timestamps and the
    /// `__class__` tag.
    pub fn to_dict(&self) -> Map<String, Value> {
        let mut map: Map<String, Value> = self
            .attributes
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        map.insert(ID_KEY.to_string(), Value::String(self.id.0.clone()));
        map.insert(
            CREATED_AT_KEY.to_string(),
            Value::String(format_timestamp(&self.created_at)),
        );
        map.insert(
            UPDATED_AT_KEY.to_string(),
            Value::String(format_timestamp(&self.updated_at)),
        );
        map.insert(CLASS_KEY.to_string(), Value::String(self.class.0.clone()));
        map
    }

    /// Bumps `updated_at` and asks `storage` to flush its whole collection.
    ///
    /// # Errors
    /// Storage failures are returned unchanged; `updated_at` stays bumped.
    pub fn save<S: Storage + ?Sized>(&mut self, storage: &S) -> StorageResult<()> {
        self.touch();
        storage.refresh(self)?;
        storage.persist_all()
    }

    pub fn class(&self) -> &ClassName {
        &self.class
    }

    pub fn id(&self) -> &RecordId {
        &self.id
    }

    pub fn created_at(&self) -> NaiveDateTime {
        self.created_at
    }

    pub fn updated_at(&self) -> NaiveDateTime {
        self.updated_at
    }

    /// Key under which storage tracks this record: `<class>.<id>`.
    pub fn storage_key(&self) -> String {
        format!("{}.{}", self.class, self.id)
    }

    pub fn attributes(&self) -> &BTreeMap<String, Value> {
        &self.attributes
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Assigns a non-reserved attribute, returning the previous value.
    pub fn set_attribute(
        &mut self,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<Option<Value>, RecordError> {
        let key = key.into();
        if RESERVED_KEYS.contains(&key.as_str()) {
            return Err(RecordError::ReservedField(key));
        }
        Ok(self.attributes.insert(key, value.into()))
    }

    pub fn remove_attribute(&mut self, key: &str) -> Option<Value> {
        self.attributes.remove(key)
    }

    fn touch(&mut self) {
        // Clock steps backwards must not break created_at <= updated_at.
        let floor = self.updated_at + Duration::microseconds(1);
        self.updated_at = timestamp::now().max(floor);
    }
}

impl Display for Record {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] ({}) {{\"id\": {:?}, \"created_at\": {:?}, \"updated_at\": {:?}",
            self.class, self.id, self.id.0, self.created_at, self.updated_at
        )?;
        for (key, value) in &self.attributes {
            write!(f, ", {key:?}: {value}")?;
        }
        f.write_str("}")
    }
}

impl TryFrom<Map<String, Value>> for Record {
    type Error = RecordError;

    fn try_from(value: Map<String, Value>) -> Result<Self, Self::Error> {
        Self::from_dict(&value)
    }
}

impl From<Record> for Map<String, Value> {
    fn from(value: Record) -> Self {
        value.to_dict()
    }
}

fn parse_id(value: &Value) -> Result<RecordId, RecordError> {
    match value {
        Value::String(text) if !text.is_empty() => Ok(RecordId(text.clone())),
        Value::String(_) => Err(RecordError::InvalidField {
            field: ID_KEY,
            reason: "id cannot be empty".to_string(),
        }),
        other => Err(RecordError::InvalidField {
            field: ID_KEY,
            reason: format!("expected a string, got {other}"),
        }),
    }
}

fn parse_time_field(field: &'static str, value: &Value) -> Result<NaiveDateTime, RecordError> {
    match value {
        Value::String(text) => {
            parse_timestamp(text).map_err(|source| RecordError::Timestamp { field, source })
        }
        other => Err(RecordError::InvalidField {
            field,
            reason: format!("expected timestamp text, got {other}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::{ClassName, RecordError};

    #[test]
    fn class_name_accepts_identifiers() {
        assert_eq!(ClassName::new("Place").unwrap().as_str(), "Place");
        assert_eq!(ClassName::new("user_2").unwrap().as_str(), "user_2");
    }

    #[test]
    fn class_name_rejects_non_identifiers() {
        for name in ["", "2Fast", "Base Model", "Base.Model"] {
            assert_eq!(
                ClassName::new(name).unwrap_err(),
                RecordError::InvalidClassName(name.to_string())
            );
        }
    }
}
