//! Observer raising an alert when an inventory item runs low.

use super::{ChangeEvent, Observer, ObserverError};
use crate::manager::EntityManager;
use crate::model::inventory::{InventoryItem, QohChange};
use log::warn;
use std::cell::RefCell;

pub const DEFAULT_LOW_STOCK_THRESHOLD: i64 = 5;

const OBSERVER_NAME: &str = "low_stock_alert";

/// One low-stock alert as it would be mailed out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LowStockAlert {
    pub sku: String,
    pub qoh: i64,
}

impl LowStockAlert {
    pub fn message(&self) -> String {
        format!(
            "Warning! Product with sku {} has {} quantity on hand",
            self.sku, self.qoh
        )
    }
}

/// Alerts when `new_qoh` drops below the threshold and actually changed.
///
/// Events for other entity types are ignored.
#[derive(Debug)]
pub struct LowStockAlertObserver {
    threshold: i64,
    alerts: RefCell<Vec<LowStockAlert>>,
}

impl LowStockAlertObserver {
    pub fn new(threshold: i64) -> Self {
        Self {
            threshold,
            alerts: RefCell::new(Vec::new()),
        }
    }

    pub fn threshold(&self) -> i64 {
        self.threshold
    }

    /// Alerts raised so far, oldest first.
    pub fn alerts(&self) -> Vec<LowStockAlert> {
        self.alerts.borrow().clone()
    }

    pub fn alert_count(&self) -> usize {
        self.alerts.borrow().len()
    }
}

impl Default for LowStockAlertObserver {
    fn default() -> Self {
        Self::new(DEFAULT_LOW_STOCK_THRESHOLD)
    }
}

impl Observer for LowStockAlertObserver {
    fn receive_update(
        &self,
        _subject: &EntityManager,
        event: &ChangeEvent,
    ) -> Result<(), ObserverError> {
        if !event.is::<InventoryItem>() {
            return Ok(());
        }

        let change: QohChange = event
            .decode()
            .map_err(|err| ObserverError::new(OBSERVER_NAME, format!("bad payload: {err}")))?;
        if change.new_qoh >= self.threshold || change.new_qoh == change.old_qoh {
            return Ok(());
        }

        let alert = LowStockAlert {
            sku: change.sku,
            qoh: change.new_qoh,
        };
        warn!(
            "event=low_stock module=observer status=alert sku={} qoh={} threshold={}",
            alert.sku, alert.qoh, self.threshold
        );
        self.alerts.borrow_mut().push(alert);
        Ok(())
    }
}
