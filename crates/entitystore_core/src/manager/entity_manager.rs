//! Entity manager implementation.
//!
//! # Responsibility
//! - Create, update, delete and look up entities by runtime id or primary key.
//! - Track dirty entities and flush them to the data store in one save.
//! - Publish one `ChangeEvent` per effective update to attached observers.
//!
//! # Invariants
//! - Every live id has exactly one index entry and vice versa.
//! - An `update` with an equal record neither dirties nor notifies.
//! - A primary-key change removes the old storage entry immediately.
//! - The dirty-list is cleared only after a successful save.

use super::{ManagerConfig, ManagerError, ManagerResult, NotifyPolicy, SchemaRegistry};
use crate::manager::EntitySchema;
use crate::model::entity::{encode_record, Entity, EntityType};
use crate::model::{EntityId, PrimaryKey, Record};
use crate::observer::{ChangeEvent, Observer};
use crate::store::DataStore;
use log::{debug, error, info, warn};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt::{Debug, Formatter};
use std::path::Path;
use std::rc::Rc;
use std::time::Instant;

type IndexKey = (&'static str, PrimaryKey);

#[derive(Debug)]
struct EntityState {
    entity_type: &'static str,
    data: Record,
    properties: BTreeMap<String, Value>,
}

/// Mediator between entities, the data store and observers.
pub struct EntityManager {
    store: DataStore,
    schemas: SchemaRegistry,
    entities: HashMap<EntityId, EntityState>,
    id_to_primary: HashMap<EntityId, IndexKey>,
    primary_to_id: HashMap<IndexKey, EntityId>,
    dirty: Vec<EntityId>,
    next_id: u64,
    observers: Vec<Rc<dyn Observer>>,
    notify_policy: NotifyPolicy,
}

impl Debug for EntityManager {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityManager")
            .field("store", &self.store.path())
            .field("entities", &self.entities.len())
            .field("dirty", &self.dirty)
            .field("observers", &self.observers.len())
            .field("notify_policy", &self.notify_policy)
            .finish()
    }
}

impl EntityManager {
    /// Opens the data store and rehydrates every persisted record.
    ///
    /// Rehydrated entities are registered without being marked dirty.
    ///
    /// # Errors
    /// - `ManagerError::Store` when the backing file is unavailable or corrupt.
    /// - `ManagerError::UnknownEntityType` when the file holds a type missing
    ///   from `schemas`.
    /// - Any create validation error for a persisted record.
    pub fn open(config: ManagerConfig, schemas: SchemaRegistry) -> ManagerResult<Self> {
        let started_at = Instant::now();
        let store = DataStore::open(&config.store_path)?;

        let mut manager = Self {
            store,
            schemas,
            entities: HashMap::new(),
            id_to_primary: HashMap::new(),
            primary_to_id: HashMap::new(),
            dirty: Vec::new(),
            next_id: 1,
            observers: Vec::new(),
            notify_policy: config.notify_policy,
        };

        if let Err(err) = manager.rehydrate() {
            error!(
                "event=manager_open module=manager status=error duration_ms={} error={}",
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err);
        }

        info!(
            "event=manager_open module=manager status=ok entities={} notify_policy={} duration_ms={}",
            manager.entities.len(),
            manager.notify_policy.as_str(),
            started_at.elapsed().as_millis()
        );
        Ok(manager)
    }

    /// Opens with default settings for the store at `store_path`.
    pub fn open_path(store_path: impl AsRef<Path>, schemas: SchemaRegistry) -> ManagerResult<Self> {
        Self::open(ManagerConfig::new(store_path.as_ref()), schemas)
    }

    fn rehydrate(&mut self) -> ManagerResult<()> {
        let mut persisted = Vec::new();
        for entity_type in self.store.item_types() {
            for primary in self.store.item_keys(entity_type) {
                if let Some(record) = self.store.get(entity_type, primary) {
                    persisted.push((entity_type.to_string(), record.clone()));
                }
            }
        }

        for (entity_type, record) in persisted {
            self.create(&entity_type, record, true)?;
        }
        Ok(())
    }

    /// Subscribes `observer`; the same observer may be attached twice.
    pub fn attach(&mut self, observer: Rc<dyn Observer>) {
        self.observers.push(observer);
        debug!(
            "event=observer_attach module=manager status=ok observers={}",
            self.observers.len()
        );
    }

    /// Removes the first subscription of this exact observer allocation.
    ///
    /// Returns `false` when it was not attached.
    pub fn detach<O: Observer + ?Sized>(&mut self, observer: &Rc<O>) -> bool {
        let target = Rc::as_ptr(observer).cast::<()>();
        let Some(position) = self
            .observers
            .iter()
            .position(|attached| Rc::as_ptr(attached).cast::<()>() == target)
        else {
            return false;
        };
        self.observers.remove(position);
        true
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Delivers `event` to every observer in subscription order.
    pub fn notify(&self, event: &ChangeEvent) -> ManagerResult<()> {
        match self.notify_policy {
            NotifyPolicy::Propagate => {
                for observer in &self.observers {
                    if let Err(err) = observer.receive_update(self, event) {
                        error!(
                            "event=notify module=manager status=error entity_id={} error={}",
                            event.entity_id, err
                        );
                        return Err(ManagerError::Observer(err));
                    }
                }
                Ok(())
            }
            NotifyPolicy::Continue => {
                let failures: Vec<_> = self
                    .observers
                    .iter()
                    .filter_map(|observer| observer.receive_update(self, event).err())
                    .collect();
                if failures.is_empty() {
                    return Ok(());
                }
                for err in &failures {
                    warn!(
                        "event=notify module=manager status=error entity_id={} error={}",
                        event.entity_id, err
                    );
                }
                Err(ManagerError::Observers(failures))
            }
        }
    }

    /// Registers a new entity from `data` and returns its runtime id.
    ///
    /// `from_store` is set only while rehydrating; such entities are not
    /// added to the dirty-list.
    pub fn create(
        &mut self,
        entity_type: &str,
        data: Record,
        from_store: bool,
    ) -> ManagerResult<EntityId> {
        let schema = *self.schema(entity_type)?;
        let primary = schema.validate(&data)?;
        let key = (schema.name(), primary);
        if self.primary_to_id.contains_key(&key) {
            return Err(ManagerError::DuplicatePrimaryKey {
                entity_type: schema.name().to_string(),
                primary: key.1.to_string(),
            });
        }

        let id = EntityId::new(self.next_id);
        self.next_id += 1;

        let properties = schema
            .properties()
            .iter()
            .map(|name| (name.to_string(), Value::Null))
            .collect();
        self.entities.insert(
            id,
            EntityState {
                entity_type: schema.name(),
                data,
                properties,
            },
        );
        self.id_to_primary.insert(id, key.clone());
        self.primary_to_id.insert(key, id);
        if !from_store {
            self.dirty.push(id);
        }

        debug!(
            "event=entity_create module=manager status=ok entity_type={} entity_id={} from_store={}",
            schema.name(),
            id,
            from_store
        );
        Ok(id)
    }

    /// Typed factory: encodes `data` and registers it as a new `T`.
    ///
    /// Registers `T`'s schema on first use.
    pub fn get_entity<T: EntityType>(&mut self, data: &T) -> ManagerResult<Entity<T>> {
        if self.schemas.register::<T>() {
            debug!(
                "event=schema_register module=manager status=ok entity_type={}",
                T::NAME
            );
        }
        let record = encode_record(data)?;
        let id = self.create(T::NAME, record, false)?;
        Ok(Entity::from_id(id))
    }

    /// Replaces the record of `id` with `new_data` and notifies observers.
    ///
    /// The record is live before observers run, so an observer failure is
    /// returned after the change has been applied.
    pub fn update(&mut self, id: EntityId, new_data: Record) -> ManagerResult<()> {
        let state = self.state(id)?;
        if state.data == new_data {
            debug!(
                "event=entity_update module=manager status=skip reason=unchanged entity_id={id}"
            );
            return Ok(());
        }

        let schema = *self.schema(state.entity_type)?;
        let new_primary = schema.validate(&new_data)?;
        let payload = schema.change_payload(&state.data, &new_data)?;
        let old_key = self
            .id_to_primary
            .get(&id)
            .cloned()
            .ok_or(ManagerError::EntityNotFound(id))?;
        let new_key = (schema.name(), new_primary);

        if new_key != old_key {
            if self.primary_to_id.contains_key(&new_key) {
                return Err(ManagerError::DuplicatePrimaryKey {
                    entity_type: schema.name().to_string(),
                    primary: new_key.1.to_string(),
                });
            }
            self.store.delete(old_key.0, old_key.1.as_str());
            self.primary_to_id.remove(&old_key);
            self.id_to_primary.insert(id, new_key.clone());
            self.primary_to_id.insert(new_key.clone(), id);
            info!(
                "event=primary_rekey module=manager status=ok entity_type={} entity_id={} old={} new={}",
                schema.name(),
                id,
                old_key.1,
                new_key.1
            );
        }

        self.dirty.push(id);
        if let Some(state) = self.entities.get_mut(&id) {
            state.data = new_data;
        }

        debug!(
            "event=entity_update module=manager status=ok entity_type={} entity_id={}",
            schema.name(),
            id
        );

        let event = ChangeEvent {
            entity_id: id,
            entity_type: schema.name().to_string(),
            primary: new_key.1,
            payload,
        };
        self.notify(&event)
    }

    /// Deletes `id` from storage and the index; its handles become tombstones.
    ///
    /// A pending dirty entry for `id` stays in the dirty-list and is skipped
    /// at flush time.
    pub fn delete(&mut self, id: EntityId) -> ManagerResult<()> {
        let state = self
            .entities
            .remove(&id)
            .ok_or(ManagerError::EntityNotFound(id))?;
        if let Some(key) = self.id_to_primary.remove(&id) {
            self.primary_to_id.remove(&key);
            self.store.delete(key.0, key.1.as_str());
        }

        info!(
            "event=entity_delete module=manager status=ok entity_type={} entity_id={}",
            state.entity_type, id
        );
        Ok(())
    }

    /// O(1) lookup of a live entity by type and primary key.
    pub fn find_by_primary(&self, entity_type: &str, primary: &str) -> Option<EntityId> {
        let schema = self.schemas.get(entity_type)?;
        self.primary_to_id
            .get(&(schema.name(), PrimaryKey::new(primary)))
            .copied()
    }

    /// Typed form of `find_by_primary`.
    pub fn find<T: EntityType>(&self, primary: &str) -> Option<Entity<T>> {
        self.primary_to_id
            .get(&(T::NAME, PrimaryKey::new(primary)))
            .copied()
            .map(Entity::from_id)
    }

    /// Reads one member (from the cached record) or declared property.
    pub fn get_attr(&self, id: EntityId, name: &str) -> ManagerResult<Value> {
        let state = self.state(id)?;
        let schema = self.schema(state.entity_type)?;
        if schema.is_member(name) {
            return Ok(state.data.get(name).cloned().unwrap_or(Value::Null));
        }
        if let Some(value) = state.properties.get(name) {
            return Ok(value.clone());
        }
        Err(ManagerError::MemberNotFound {
            entity_type: schema.name().to_string(),
            member: name.to_string(),
        })
    }

    /// Writes one member through `update`, or one declared property in place.
    pub fn set_attr(&mut self, id: EntityId, name: &str, value: Value) -> ManagerResult<()> {
        let state = self.state(id)?;
        let schema = *self.schema(state.entity_type)?;
        if schema.is_member(name) {
            let mut record = state.data.clone();
            record.insert(name.to_string(), value);
            return self.update(id, record);
        }
        if schema.is_property(name) {
            if let Some(state) = self.entities.get_mut(&id) {
                state.properties.insert(name.to_string(), value);
            }
            return Ok(());
        }
        Err(ManagerError::MemberNotFound {
            entity_type: schema.name().to_string(),
            member: name.to_string(),
        })
    }

    /// Writes every dirty entity to storage, then saves once.
    ///
    /// Returns the number of records written. Ids deleted since they were
    /// dirtied are skipped.
    pub fn update_store(&mut self) -> ManagerResult<usize> {
        let started_at = Instant::now();
        let mut written = 0;
        for id in &self.dirty {
            let (Some(state), Some(key)) = (self.entities.get(id), self.id_to_primary.get(id))
            else {
                debug!("event=store_flush module=manager status=skip reason=deleted entity_id={id}");
                continue;
            };
            self.store.set(key.0, key.1.as_str(), state.data.clone());
            written += 1;
        }

        self.store.save()?;
        let pending = self.dirty.len();
        self.dirty.clear();

        info!(
            "event=store_flush module=manager status=ok pending={} written={} duration_ms={}",
            pending,
            written,
            started_at.elapsed().as_millis()
        );
        Ok(written)
    }

    /// Cached record of a live entity.
    pub fn record(&self, id: EntityId) -> ManagerResult<&Record> {
        Ok(&self.state(id)?.data)
    }

    pub fn entity_type_of(&self, id: EntityId) -> ManagerResult<&'static str> {
        Ok(self.state(id)?.entity_type)
    }

    pub fn primary_of(&self, id: EntityId) -> ManagerResult<PrimaryKey> {
        self.id_to_primary
            .get(&id)
            .map(|(_, primary)| primary.clone())
            .ok_or(ManagerError::EntityNotFound(id))
    }

    pub fn is_live(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Pending ids in dirty order; may contain duplicates and deleted ids.
    pub fn dirty_ids(&self) -> &[EntityId] {
        &self.dirty
    }

    pub fn store(&self) -> &DataStore {
        &self.store
    }

    pub fn schemas(&self) -> &SchemaRegistry {
        &self.schemas
    }

    pub fn notify_policy(&self) -> NotifyPolicy {
        self.notify_policy
    }

    fn state(&self, id: EntityId) -> ManagerResult<&EntityState> {
        self.entities
            .get(&id)
            .ok_or(ManagerError::EntityNotFound(id))
    }

    fn schema(&self, entity_type: &str) -> ManagerResult<&EntitySchema> {
        self.schemas
            .get(entity_type)
            .ok_or_else(|| ManagerError::UnknownEntityType(entity_type.to_string()))
    }
}
