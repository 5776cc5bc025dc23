//! Entity domain model.
//!
//! # Responsibility
//! - Define the record shape shared by storage, manager and entity types.
//! - Define runtime identity and primary-key value types.
//!
//! # Invariants
//! - `EntityId` values are assigned by one manager and never persisted.
//! - `PrimaryKey` is the string form of a scalar primary field value;
//!   numerically equal integral values share one key.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{Display, Formatter};

pub mod entity;
pub mod inventory;

/// Attribute record of one entity: field name -> value, ordered by name.
pub type Record = serde_json::Map<String, Value>;

/// Runtime identity assigned by an `EntityManager`, starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId(u64);

impl EntityId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl Display for EntityId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Business primary key value, normalized to its string form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrimaryKey(String);

impl PrimaryKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Converts a primary field value; only strings and numbers qualify.
    ///
    /// Integral floats map to their integer form, so `1` and `1.0` name the
    /// same key.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(text) => Some(Self(text.clone())),
            Value::Number(number) => Some(Self(normalize_number(number))),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn normalize_number(number: &serde_json::Number) -> String {
    match number.as_f64() {
        Some(float) if number.is_f64() && float.fract() == 0.0 && float.abs() < 9.0e15 => {
            format!("{}", float as i64)
        }
        _ => number.to_string(),
    }
}

impl Display for PrimaryKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PrimaryKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}
