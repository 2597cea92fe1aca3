use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use super::availability::LEDGER_TOLERANCE;
use super::StockLocation;
use crate::errors::ServiceError;
use crate::quantity::Quantity;

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum ProductionOrderStatus {
    Open,
    PartialBooked,
    Booked,
    InProgress,
    Closed,
    Cancelled,
}

impl ProductionOrderStatus {
    /// Only open and partially booked orders accept new reservations.
    pub fn accepts_reservations(&self) -> bool {
        matches!(self, Self::Open | Self::PartialBooked)
    }
}

/// Order-side mirror of one availability reservation, keyed by location.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialReserve {
    #[serde(flatten)]
    pub location: StockLocation,
    /// Quantity in the order's unit.
    pub quantity: Quantity,
}

/// One required material and its reservation progress.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Material {
    /// The material's product id.
    pub product_id: Uuid,
    pub name: String,
    /// Required quantity in the order's unit.
    pub quantity: Quantity,
    pub total_reserved: Quantity,
    pub reserves: Vec<MaterialReserve>,
}

impl Material {
    pub fn new(product_id: Uuid, name: impl Into<String>, quantity: Quantity) -> Self {
        Self {
            product_id,
            name: name.into(),
            quantity,
            total_reserved: Quantity::ZERO,
            reserves: Vec::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.total_reserved >= self.quantity
    }

    /// Unreserved remainder in the order's unit.
    pub fn outstanding(&self) -> Quantity {
        (self.quantity - self.total_reserved).non_negative()
    }

    pub fn reserve_at(&self, location: &StockLocation) -> Option<&MaterialReserve> {
        self.reserves.iter().find(|r| &r.location == location)
    }

    /// Adds `quantity` at `location`, creating the entry if needed.
    pub fn add_reserve(&mut self, location: StockLocation, quantity: Quantity) {
        match self.reserves.iter_mut().find(|r| r.location == location) {
            Some(reserve) => reserve.quantity += quantity,
            None => self.reserves.push(MaterialReserve { location, quantity }),
        }
        self.total_reserved += quantity;
    }

    /// Moves the whole entry at `from` to `to`, merging into an existing
    /// destination entry when the order already reserved there. Returns the
    /// quantity moved.
    pub fn relocate_reserve(&mut self, from: &StockLocation, to: StockLocation) -> Quantity {
        let Some(index) = self.reserves.iter().position(|r| &r.location == from) else {
            return Quantity::ZERO;
        };
        let moved = self.reserves[index].quantity;
        match self.reserves.iter().position(|r| r.location == to) {
            Some(dest) => {
                self.reserves[dest].quantity += moved;
                self.reserves.remove(index);
            }
            None => self.reserves[index].location = to,
        }
        moved
    }

    /// Moves up to `quantity` from the entry at `from` to `to`. Returns the
    /// quantity moved.
    pub fn split_reserve(
        &mut self,
        from: &StockLocation,
        to: StockLocation,
        quantity: Quantity,
    ) -> Quantity {
        let Some(index) = self.reserves.iter().position(|r| &r.location == from) else {
            return Quantity::ZERO;
        };
        let moved = self.reserves[index].quantity.min(quantity);
        if moved == self.reserves[index].quantity {
            return self.relocate_reserve(from, to);
        }
        self.reserves[index].quantity -= moved;
        match self.reserves.iter_mut().find(|r| r.location == to) {
            Some(reserve) => reserve.quantity += moved,
            None => self.reserves.push(MaterialReserve {
                location: to,
                quantity: moved,
            }),
        }
        moved
    }

    pub fn clear_reserves(&mut self) {
        self.total_reserved = Quantity::ZERO;
        self.reserves.clear();
    }

    pub fn check_ledger(&self) -> Result<(), ServiceError> {
        let sum: Quantity = self.reserves.iter().map(|r| r.quantity).sum();
        if (sum - self.total_reserved).as_decimal().abs() > LEDGER_TOLERANCE {
            return Err(ServiceError::InternalError(format!(
                "Material {} reserves sum to {} but total_reserved is {}",
                self.product_id, sum, self.total_reserved
            )));
        }
        if self.total_reserved.is_negative() || self.total_reserved > self.quantity {
            return Err(ServiceError::InternalError(format!(
                "Material {} reserves {} of {}",
                self.product_id, self.total_reserved, self.quantity
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Production {
    /// Product being manufactured.
    pub product_id: Uuid,
    pub quantity: Quantity,
    pub materials: Vec<Material>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionOrder {
    pub id: Uuid,
    pub code: String,
    pub status: ProductionOrderStatus,
    pub warehouse_id: Uuid,
    pub production: Production,
    pub updated_at: DateTime<Utc>,
}

impl ProductionOrder {
    pub fn new(
        code: impl Into<String>,
        warehouse_id: Uuid,
        product_id: Uuid,
        quantity: Quantity,
        materials: Vec<Material>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            code: code.into(),
            status: ProductionOrderStatus::Open,
            warehouse_id,
            production: Production {
                product_id,
                quantity,
                materials,
            },
            updated_at: Utc::now(),
        }
    }

    pub fn materials(&self) -> &[Material] {
        &self.production.materials
    }

    /// Materials of `product_id` holding a reserve at `location`, in ledger order.
    pub fn materials_reserved_at_mut<'a>(
        &'a mut self,
        product_id: Uuid,
        location: &'a StockLocation,
    ) -> impl Iterator<Item = &'a mut Material> + 'a {
        self.production
            .materials
            .iter_mut()
            .filter(move |m| m.product_id == product_id && m.reserve_at(location).is_some())
    }

    pub fn reset_reservations(&mut self) {
        for material in &mut self.production.materials {
            material.clear_reserves();
        }
        self.status = ProductionOrderStatus::Open;
        self.updated_at = Utc::now();
    }

    pub fn check_ledger(&self) -> Result<(), ServiceError> {
        self.production
            .materials
            .iter()
            .try_for_each(Material::check_ledger)
    }
}

/// Booking status after a reservation pass, as a function of the ledger.
///
/// All materials complete gives `Booked`; an allocation on an open order gives
/// `PartialBooked`; a partially booked order never regresses; anything else
/// stays `Open`.
pub fn derive_status(
    previous: ProductionOrderStatus,
    materials: &[Material],
    allocated_this_pass: bool,
) -> ProductionOrderStatus {
    if materials.iter().all(Material::is_complete) {
        ProductionOrderStatus::Booked
    } else if allocated_this_pass || previous == ProductionOrderStatus::PartialBooked {
        ProductionOrderStatus::PartialBooked
    } else {
        ProductionOrderStatus::Open
    }
}
