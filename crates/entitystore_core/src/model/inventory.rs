//! Inventory item entity and its stock operations.
//!
//! # Invariants
//! - `sku` is the primary key.
//! - Every unit of stock movement is its own `update`, so observers see one
//!   event per unit.

use crate::manager::{EntityManager, ManagerError, ManagerResult};
use crate::model::entity::{Entity, EntityType};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Stocked product tracked by quantity on hand (`qoh`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub sku: String,
    pub qoh: i64,
    pub cost: f64,
    #[serde(rename = "salePrice")]
    pub sale_price: f64,
}

impl InventoryItem {
    pub fn new(sku: impl Into<String>, qoh: i64, cost: f64, sale_price: f64) -> Self {
        Self {
            sku: sku.into(),
            qoh,
            cost,
            sale_price,
        }
    }
}

impl EntityType for InventoryItem {
    const NAME: &'static str = "InventoryItem";
    const MEMBERS: &'static [&'static str] = &["sku", "qoh", "cost", "salePrice"];
    const PRIMARY: &'static str = "sku";

    /// Quantity change keyed by the sku the item had before the update.
    fn change_payload(old: &Self, new: &Self) -> Value {
        json!({
            "sku": old.sku,
            "new_qoh": new.qoh,
            "old_qoh": old.qoh,
        })
    }
}

/// Decoded `InventoryItem` change payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QohChange {
    pub sku: String,
    pub new_qoh: i64,
    pub old_qoh: i64,
}

impl Entity<InventoryItem> {
    pub fn sku(&self, manager: &EntityManager) -> ManagerResult<String> {
        Ok(self.read(manager)?.sku)
    }

    pub fn qoh(&self, manager: &EntityManager) -> ManagerResult<i64> {
        Ok(self.read(manager)?.qoh)
    }

    pub fn sale_price(&self, manager: &EntityManager) -> ManagerResult<f64> {
        Ok(self.read(manager)?.sale_price)
    }

    pub fn set_sku(&self, manager: &mut EntityManager, sku: impl Into<String>) -> ManagerResult<()> {
        self.set(manager, "sku", sku.into())
    }

    pub fn set_qoh(&self, manager: &mut EntityManager, qoh: i64) -> ManagerResult<()> {
        self.set(manager, "qoh", qoh)
    }

    /// Adds `count` units, one update per unit.
    pub fn items_received(&self, manager: &mut EntityManager, count: u32) -> ManagerResult<()> {
        self.adjust_qoh(manager, count, 1)
    }

    /// Removes `count` units, one update per unit.
    pub fn items_have_shipped(&self, manager: &mut EntityManager, count: u32) -> ManagerResult<()> {
        self.adjust_qoh(manager, count, -1)
    }

    pub fn change_sale_price(&self, manager: &mut EntityManager, sale_price: f64) -> ManagerResult<()> {
        let mut item = self.read(manager)?;
        item.sale_price = sale_price;
        self.update(manager, &item)
    }

    fn adjust_qoh(&self, manager: &mut EntityManager, count: u32, step: i64) -> ManagerResult<()> {
        let mut item = self.read(manager)?;
        for _ in 0..count {
            item.qoh = item
                .qoh
                .checked_add(step)
                .ok_or_else(|| ManagerError::ValueOutOfRange {
                    entity_type: InventoryItem::NAME.to_string(),
                    member: "qoh".to_string(),
                })?;
            self.update(manager, &item)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{InventoryItem, QohChange};
    use crate::model::entity::EntityType;

    #[test]
    fn payload_uses_previous_sku_and_both_quantities() {
        let old = InventoryItem::new("abc-4589", 3, 5.67, 7.27);
        let new = InventoryItem {
            sku: "abc-0000".to_string(),
            qoh: 2,
            ..old.clone()
        };

        let change: QohChange =
            serde_json::from_value(InventoryItem::change_payload(&old, &new)).unwrap();
        assert_eq!(
            change,
            QohChange {
                sku: "abc-4589".to_string(),
                new_qoh: 2,
                old_qoh: 3,
            }
        );
    }

    #[test]
    fn sale_price_serializes_with_camel_case_member_name() {
        let item = InventoryItem::new("qws-6783", 0, 3.0, 4.97);
        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(value["salePrice"], 4.97);
        assert!(value.get("sale_price").is_none());
    }
}
