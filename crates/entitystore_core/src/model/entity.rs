//! Entity type contract and typed entity handles.
//!
//! # Responsibility
//! - Declare, per business type, its persisted members, primary field and
//!   change-event payload shape.
//! - Provide `Entity<T>`, a copyable handle that routes every read and write
//!   through the owning `EntityManager`.
//!
//! # Invariants
//! - A handle never caches data; every read resolves against the manager.
//! - A handle whose entity was deleted is a tombstone: all calls return
//!   `ManagerError::EntityNotFound`.

use crate::manager::{EntityManager, ManagerError, ManagerResult};
use crate::model::{EntityId, PrimaryKey, Record};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt::{Debug, Formatter};
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Contract implemented by every concrete business entity.
pub trait EntityType: Serialize + DeserializeOwned + 'static {
    /// Type name, also the first-level key in the data store.
    const NAME: &'static str;
    /// Persisted field names. Records hold exactly these fields.
    const MEMBERS: &'static [&'static str];
    /// Member acting as the business primary key.
    const PRIMARY: &'static str;
    /// Non-persisted instance properties reachable through `get`/`set`.
    const PROPERTIES: &'static [&'static str] = &[];

    /// Builds the observer payload for a change from `old` to `new`.
    fn change_payload(old: &Self, new: &Self) -> Value {
        let encode = |entity: &Self| serde_json::to_value(entity).unwrap_or(Value::Null);
        json!({ "old": encode(old), "new": encode(new) })
    }
}

/// Typed handle to one live (or tombstoned) entity.
pub struct Entity<T> {
    id: EntityId,
    _kind: PhantomData<fn() -> T>,
}

impl<T> Clone for Entity<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Entity<T> {}

impl<T> PartialEq for Entity<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Entity<T> {}

impl<T> Hash for Entity<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<T: EntityType> Debug for Entity<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Entity<{}>({})", T::NAME, self.id)
    }
}

impl<T: EntityType> Entity<T> {
    pub(crate) fn from_id(id: EntityId) -> Self {
        Self {
            id,
            _kind: PhantomData,
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Creates and registers a new entity against `manager`.
    pub fn create(manager: &mut EntityManager, data: &T) -> ManagerResult<Self> {
        manager.get_entity(data)
    }

    /// Returns the current record decoded as `T`, straight from the manager's cache.
    pub fn read(&self, manager: &EntityManager) -> ManagerResult<T> {
        decode_record(manager.record(self.id)?)
    }

    /// Replaces the whole record through `EntityManager::update`.
    pub fn update(&self, manager: &mut EntityManager, data: &T) -> ManagerResult<()> {
        let record = encode_record(data)?;
        manager.update(self.id, record)
    }

    pub fn delete(self, manager: &mut EntityManager) -> ManagerResult<()> {
        manager.delete(self.id)
    }

    /// Reads one member or declared property by name.
    pub fn get(&self, manager: &EntityManager, name: &str) -> ManagerResult<Value> {
        manager.get_attr(self.id, name)
    }

    /// Writes one member (routed through `update`) or declared property.
    pub fn set(
        &self,
        manager: &mut EntityManager,
        name: &str,
        value: impl Into<Value>,
    ) -> ManagerResult<()> {
        manager.set_attr(self.id, name, value.into())
    }

    pub fn primary(&self, manager: &EntityManager) -> ManagerResult<PrimaryKey> {
        manager.primary_of(self.id)
    }

    pub fn is_live(&self, manager: &EntityManager) -> bool {
        manager.is_live(self.id)
    }
}

pub(crate) fn encode_record<T: EntityType>(entity: &T) -> ManagerResult<Record> {
    match serde_json::to_value(entity) {
        Ok(Value::Object(record)) => Ok(record),
        Ok(other) => Err(ManagerError::Codec {
            entity_type: T::NAME.to_string(),
            message: format!("expected an object, got `{other}`"),
        }),
        Err(err) => Err(ManagerError::Codec {
            entity_type: T::NAME.to_string(),
            message: err.to_string(),
        }),
    }
}

pub(crate) fn decode_record<T: EntityType>(record: &Record) -> ManagerResult<T> {
    serde_json::from_value(Value::Object(record.clone())).map_err(|err| ManagerError::Codec {
        entity_type: T::NAME.to_string(),
        message: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::{decode_record, encode_record, EntityType};
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Tag {
        name: String,
        color: String,
    }

    impl EntityType for Tag {
        const NAME: &'static str = "Tag";
        const MEMBERS: &'static [&'static str] = &["name", "color"];
        const PRIMARY: &'static str = "name";
    }

    #[test]
    fn default_payload_carries_old_and_new_records() {
        let old = Tag {
            name: "urgent".to_string(),
            color: "red".to_string(),
        };
        let new = Tag {
            color: "orange".to_string(),
            ..old.clone()
        };

        let payload = Tag::change_payload(&old, &new);
        assert_eq!(payload["old"]["color"], "red");
        assert_eq!(payload["new"]["color"], "orange");
    }

    #[test]
    fn record_codec_keeps_field_names() {
        let tag = Tag {
            name: "later".to_string(),
            color: "grey".to_string(),
        };
        let record = encode_record(&tag).unwrap();
        assert_eq!(record.get("name"), Some(&json!("later")));

        let decoded: Tag = decode_record(&record).unwrap();
        assert_eq!(decoded, tag);
    }
}
