//! Type-erased entity schemas keyed by entity type name.
//!
//! The manager stores plain records, so everything it needs to know about a
//! concrete `EntityType` (members, primary field, payload builder) is
//! captured here when the type is registered.

use super::{ManagerError, ManagerResult};
use crate::model::entity::{decode_record, EntityType};
use crate::model::{PrimaryKey, Record};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};

type PayloadFn = fn(&Record, &Record) -> ManagerResult<Value>;
type CheckFn = fn(&Record) -> ManagerResult<()>;

/// Shape and behaviour of one registered entity type.
#[derive(Clone, Copy)]
pub struct EntitySchema {
    name: &'static str,
    members: &'static [&'static str],
    primary: &'static str,
    properties: &'static [&'static str],
    payload: PayloadFn,
    check: CheckFn,
}

impl Debug for EntitySchema {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntitySchema")
            .field("name", &self.name)
            .field("members", &self.members)
            .field("primary", &self.primary)
            .field("properties", &self.properties)
            .finish_non_exhaustive()
    }
}

impl EntitySchema {
    pub fn of<T: EntityType>() -> Self {
        Self {
            name: T::NAME,
            members: T::MEMBERS,
            primary: T::PRIMARY,
            properties: T::PROPERTIES,
            payload: payload_of::<T>,
            check: check_of::<T>,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn members(&self) -> &'static [&'static str] {
        self.members
    }

    pub fn primary(&self) -> &'static str {
        self.primary
    }

    pub fn properties(&self) -> &'static [&'static str] {
        self.properties
    }

    pub fn is_member(&self, name: &str) -> bool {
        self.members.contains(&name)
    }

    pub fn is_property(&self, name: &str) -> bool {
        self.properties.contains(&name)
    }

    /// Checks that `record` holds exactly the declared members, decodes into
    /// the registered type, and returns its primary key.
    pub(crate) fn validate(&self, record: &Record) -> ManagerResult<PrimaryKey> {
        let primary_value = match record.get(self.primary) {
            None | Some(Value::Null) => {
                return Err(ManagerError::PrimaryKeyMissing {
                    entity_type: self.name.to_string(),
                    field: self.primary.to_string(),
                });
            }
            Some(value) => value,
        };

        if let Some(unknown) = record.keys().find(|field| !self.is_member(field)) {
            return Err(ManagerError::MemberNotFound {
                entity_type: self.name.to_string(),
                member: unknown.clone(),
            });
        }

        let missing: Vec<String> = self
            .members
            .iter()
            .filter(|member| !record.contains_key(**member))
            .map(|member| member.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ManagerError::MissingMembers {
                entity_type: self.name.to_string(),
                members: missing,
            });
        }

        let primary =
            PrimaryKey::from_value(primary_value).ok_or_else(|| ManagerError::InvalidPrimaryKey {
                entity_type: self.name.to_string(),
                field: self.primary.to_string(),
            })?;
        (self.check)(record)?;
        Ok(primary)
    }

    pub(crate) fn change_payload(&self, old: &Record, new: &Record) -> ManagerResult<Value> {
        (self.payload)(old, new)
    }
}

fn payload_of<T: EntityType>(old: &Record, new: &Record) -> ManagerResult<Value> {
    let old: T = decode_record(old)?;
    let new: T = decode_record(new)?;
    Ok(T::change_payload(&old, &new))
}

fn check_of<T: EntityType>(record: &Record) -> ManagerResult<()> {
    decode_record::<T>(record).map(|_| ())
}

/// Registered entity types available to one manager.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: BTreeMap<&'static str, EntitySchema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of `register`.
    pub fn with<T: EntityType>(mut self) -> Self {
        self.register::<T>();
        self
    }

    /// Registers `T`; returns `false` when it was already registered.
    pub fn register<T: EntityType>(&mut self) -> bool {
        if self.schemas.contains_key(T::NAME) {
            return false;
        }
        self.schemas.insert(T::NAME, EntitySchema::of::<T>());
        true
    }

    pub fn get(&self, entity_type: &str) -> Option<&EntitySchema> {
        self.schemas.get(entity_type)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.schemas.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{EntitySchema, SchemaRegistry};
    use crate::manager::ManagerError;
    use crate::model::inventory::InventoryItem;
    use crate::model::{PrimaryKey, Record};
    use serde_json::json;

    fn record(value: serde_json::Value) -> Record {
        value.as_object().cloned().expect("test record must be an object")
    }

    #[test]
    fn validate_returns_primary_key_for_complete_record() {
        let schema = EntitySchema::of::<InventoryItem>();
        let key = schema
            .validate(&record(json!({
                "sku": "abc-4589", "qoh": 0, "cost": 5.67, "salePrice": 7.27
            })))
            .unwrap();
        assert_eq!(key, PrimaryKey::new("abc-4589"));
    }

    #[test]
    fn validate_reports_missing_primary_before_other_problems() {
        let schema = EntitySchema::of::<InventoryItem>();
        let err = schema
            .validate(&record(json!({ "qoh": 0, "bogus": true })))
            .unwrap_err();
        assert!(matches!(err, ManagerError::PrimaryKeyMissing { ref field, .. } if field == "sku"));
    }

    #[test]
    fn validate_rejects_unknown_and_missing_members() {
        let schema = EntitySchema::of::<InventoryItem>();

        let unknown = schema
            .validate(&record(json!({
                "sku": "a", "qoh": 0, "cost": 1.0, "salePrice": 1.0, "color": "red"
            })))
            .unwrap_err();
        assert!(matches!(unknown, ManagerError::MemberNotFound { ref member, .. } if member == "color"));

        let missing = schema
            .validate(&record(json!({ "sku": "a", "qoh": 0 })))
            .unwrap_err();
        assert!(matches!(
            missing,
            ManagerError::MissingMembers { ref members, .. }
                if members == &vec!["cost".to_string(), "salePrice".to_string()]
        ));
    }

    #[test]
    fn validate_rejects_non_scalar_primary() {
        let schema = EntitySchema::of::<InventoryItem>();
        let err = schema
            .validate(&record(json!({
                "sku": ["a"], "qoh": 0, "cost": 1.0, "salePrice": 1.0
            })))
            .unwrap_err();
        assert!(matches!(err, ManagerError::InvalidPrimaryKey { .. }));
    }

    #[test]
    fn validate_rejects_member_values_of_the_wrong_type() {
        let schema = EntitySchema::of::<InventoryItem>();
        let err = schema
            .validate(&record(json!({
                "sku": "abc-4589", "qoh": 0, "cost": "5.67", "salePrice": "7.27"
            })))
            .unwrap_err();
        assert!(matches!(err, ManagerError::Codec { ref entity_type, .. } if entity_type == "InventoryItem"));
    }

    #[test]
    fn register_is_idempotent() {
        let mut registry = SchemaRegistry::new();
        assert!(registry.register::<InventoryItem>());
        assert!(!registry.register::<InventoryItem>());
        assert_eq!(registry.names(), vec!["InventoryItem"]);
    }
}
