use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Inventory settings attached to a product.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InventoryInfo {
    pub manage_batches: bool,
    /// Shelf life in days; `Some` means batches of this product carry an expiration day.
    pub expiration_days: Option<i32>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub is_active: bool,
    /// Ratio from this product's own unit to the unit it is consumed in by production.
    pub unit_conversion_rate: Decimal,
    pub inventory: InventoryInfo,
}

impl Product {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            is_active: true,
            unit_conversion_rate: Decimal::ONE,
            inventory: InventoryInfo::default(),
        }
    }

    pub fn with_conversion_rate(mut self, rate: Decimal) -> Self {
        self.unit_conversion_rate = rate;
        self
    }

    pub fn with_batches(mut self, expiration_days: Option<i32>) -> Self {
        self.inventory.manage_batches = true;
        self.inventory.expiration_days = expiration_days;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    pub fn manages_batches(&self) -> bool {
        self.inventory.manage_batches
    }

    pub fn tracks_expiration(&self) -> bool {
        self.inventory.manage_batches && self.inventory.expiration_days.is_some()
    }
}
