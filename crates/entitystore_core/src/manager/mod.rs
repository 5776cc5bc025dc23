//! Entity manager: identity, indexing, dirty tracking and change notification.
//!
//! # Responsibility
//! - Mediate every entity mutation between callers, storage and observers.
//! - Keep the primary-key index and the dirty-list consistent with live state.
//!
//! # Invariants
//! - `id -> primary` and `primary -> id` maps are inverse for live entities.
//! - Primary keys are unique per entity type.
//! - Rehydrated entities are never dirty.

use crate::model::EntityId;
use crate::observer::ObserverError;
use crate::store::StoreError;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::str::FromStr;

mod entity_manager;
mod schema;

pub use entity_manager::EntityManager;
pub use schema::{EntitySchema, SchemaRegistry};

pub type ManagerResult<T> = Result<T, ManagerError>;

#[derive(Debug)]
pub enum ManagerError {
    Store(StoreError),
    UnknownEntityType(String),
    MemberNotFound {
        entity_type: String,
        member: String,
    },
    MissingMembers {
        entity_type: String,
        members: Vec<String>,
    },
    PrimaryKeyMissing {
        entity_type: String,
        field: String,
    },
    InvalidPrimaryKey {
        entity_type: String,
        field: String,
    },
    DuplicatePrimaryKey {
        entity_type: String,
        primary: String,
    },
    /// The entity was deleted or never belonged to this manager.
    EntityNotFound(EntityId),
    /// Record could not be converted to or from its typed entity.
    Codec {
        entity_type: String,
        message: String,
    },
    /// Arithmetic on a member would leave its value range.
    ValueOutOfRange {
        entity_type: String,
        member: String,
    },
    Observer(ObserverError),
    /// Every failure collected under `NotifyPolicy::Continue`.
    Observers(Vec<ObserverError>),
}

impl Display for ManagerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store(err) => write!(f, "{err}"),
            Self::UnknownEntityType(name) => write!(f, "unknown entity type `{name}`"),
            Self::MemberNotFound {
                entity_type,
                member,
            } => write!(f, "{entity_type} does not have a member named `{member}`"),
            Self::MissingMembers {
                entity_type,
                members,
            } => write!(
                f,
                "{entity_type} record is missing members: {}",
                members.join(", ")
            ),
            Self::PrimaryKeyMissing { entity_type, field } => {
                write!(f, "{entity_type} record lacks primary key field `{field}`")
            }
            Self::InvalidPrimaryKey { entity_type, field } => write!(
                f,
                "{entity_type} primary key field `{field}` must be a string or number"
            ),
            Self::DuplicatePrimaryKey {
                entity_type,
                primary,
            } => write!(f, "{entity_type} with primary key `{primary}` already exists"),
            Self::EntityNotFound(id) => write!(f, "entity {id} not found"),
            Self::Codec {
                entity_type,
                message,
            } => write!(f, "invalid {entity_type} record: {message}"),
            Self::ValueOutOfRange {
                entity_type,
                member,
            } => write!(f, "{entity_type} member `{member}` is out of range"),
            Self::Observer(err) => write!(f, "{err}"),
            Self::Observers(errors) => {
                write!(f, "{} observer(s) failed", errors.len())?;
                for err in errors {
                    write!(f, "; {err}")?;
                }
                Ok(())
            }
        }
    }
}

impl Error for ManagerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::Observer(err) => Some(err),
            Self::Observers(errors) => errors.first().map(|err| err as &(dyn Error + 'static)),
            _ => None,
        }
    }
}

impl From<StoreError> for ManagerError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<ObserverError> for ManagerError {
    fn from(value: ObserverError) -> Self {
        Self::Observer(value)
    }
}

/// How `notify` treats a failing observer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NotifyPolicy {
    /// Stop at the first failure and return it to the mutating caller.
    #[default]
    Propagate,
    /// Run every observer, then report all failures together.
    Continue,
}

impl NotifyPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Propagate => "propagate",
            Self::Continue => "continue",
        }
    }
}

impl FromStr for NotifyPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "propagate" => Ok(Self::Propagate),
            "continue" => Ok(Self::Continue),
            other => Err(format!(
                "unsupported notify policy `{other}`; expected propagate|continue"
            )),
        }
    }
}

/// Settings for opening an `EntityManager`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    pub store_path: PathBuf,
    pub notify_policy: NotifyPolicy,
}

impl ManagerConfig {
    pub fn new(store_path: impl Into<PathBuf>) -> Self {
        Self {
            store_path: store_path.into(),
            notify_policy: NotifyPolicy::default(),
        }
    }

    pub fn with_notify_policy(mut self, notify_policy: NotifyPolicy) -> Self {
        self.notify_policy = notify_policy;
        self
    }
}
