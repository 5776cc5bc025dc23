//! Core of the entity store.
//! Entities, their manager, the flat-file data store and change observers.

pub mod logging;
pub mod manager;
pub mod model;
pub mod observer;
pub mod store;

pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use manager::{
    EntityManager, EntitySchema, ManagerConfig, ManagerError, ManagerResult, NotifyPolicy,
    SchemaRegistry,
};
pub use model::entity::{Entity, EntityType};
pub use model::inventory::{InventoryItem, QohChange};
pub use model::{EntityId, PrimaryKey, Record};
pub use observer::change_log::ChangeLogObserver;
pub use observer::low_stock::{LowStockAlert, LowStockAlertObserver, DEFAULT_LOW_STOCK_THRESHOLD};
pub use observer::{ChangeEvent, Observer, ObserverError};
pub use store::{DataStore, StoreAction, StoreError, StoreResult, StoreSnapshot};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
