//! Change notification protocol.
//!
//! # Responsibility
//! - Define the one-method observer capability invoked by `EntityManager::notify`.
//! - Define the change event handed to every observer.
//!
//! # Invariants
//! - Observers run synchronously, in subscription order.
//! - The payload shape is owned by the entity type that changed.

use crate::manager::EntityManager;
use crate::model::entity::EntityType;
use crate::model::{EntityId, PrimaryKey};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod change_log;
pub mod low_stock;

/// One committed entity change, built by `EntityManager::update`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub entity_id: EntityId,
    pub entity_type: String,
    /// Primary key after the change.
    pub primary: PrimaryKey,
    /// Type-defined payload from `EntityType::change_payload`.
    pub payload: Value,
}

impl ChangeEvent {
    pub fn is<T: EntityType>(&self) -> bool {
        self.entity_type == T::NAME
    }

    /// Decodes the payload into a concrete shape.
    pub fn decode<P: DeserializeOwned>(&self) -> Result<P, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

/// Failure reported by an observer; aborts the mutating call under
/// `NotifyPolicy::Propagate`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObserverError {
    pub observer: String,
    pub message: String,
}

impl ObserverError {
    pub fn new(observer: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            observer: observer.into(),
            message: message.into(),
        }
    }
}

impl Display for ObserverError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "observer `{}` failed: {}", self.observer, self.message)
    }
}

impl Error for ObserverError {}

/// Receiver of change notifications.
pub trait Observer {
    fn receive_update(&self, subject: &EntityManager, event: &ChangeEvent)
        -> Result<(), ObserverError>;
}

impl<F> Observer for F
where
    F: Fn(&EntityManager, &ChangeEvent) -> Result<(), ObserverError>,
{
    fn receive_update(
        &self,
        subject: &EntityManager,
        event: &ChangeEvent,
    ) -> Result<(), ObserverError> {
        self(subject, event)
    }
}
