use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Batch, StockLocation};
use crate::errors::ServiceError;
use crate::quantity::Quantity;

/// Largest drift tolerated between a reserve collection and its running total.
pub const LEDGER_TOLERANCE: Decimal = dec!(0.0001);

/// Identity of an availability row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AvailabilityKey {
    pub product_id: Uuid,
    pub stock_id: Uuid,
    pub warehouse_id: Uuid,
    pub batch_id: Option<Uuid>,
}

impl AvailabilityKey {
    pub fn new(product_id: Uuid, location: StockLocation) -> Self {
        Self {
            product_id,
            stock_id: location.stock_id,
            warehouse_id: location.warehouse_id,
            batch_id: location.batch_id,
        }
    }

    pub fn location(&self) -> StockLocation {
        StockLocation::new(self.stock_id, self.warehouse_id, self.batch_id)
    }
}

/// Quantity held at an availability on behalf of one production order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveEntry {
    pub production_order_id: Uuid,
    pub quantity: Quantity,
}

/// On-hand and reserved quantity of one product at one stock/warehouse/batch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Availability {
    pub id: Uuid,
    pub product_id: Uuid,
    pub stock_id: Uuid,
    pub warehouse_id: Uuid,
    pub batch_id: Option<Uuid>,
    pub quantity: Quantity,
    /// Unit cost at entrance time.
    pub price: Decimal,
    pub total_reserved: Quantity,
    pub reserves: Vec<ReserveEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Availability {
    pub fn new(key: AvailabilityKey, quantity: Quantity, price: Decimal) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            product_id: key.product_id,
            stock_id: key.stock_id,
            warehouse_id: key.warehouse_id,
            batch_id: key.batch_id,
            quantity,
            price,
            total_reserved: Quantity::ZERO,
            reserves: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> AvailabilityKey {
        AvailabilityKey {
            product_id: self.product_id,
            stock_id: self.stock_id,
            warehouse_id: self.warehouse_id,
            batch_id: self.batch_id,
        }
    }

    pub fn location(&self) -> StockLocation {
        self.key().location()
    }

    /// Quantity not yet claimed by any production order.
    pub fn free(&self) -> Quantity {
        self.quantity - self.total_reserved
    }

    pub fn reserved_by(&self, production_order_id: Uuid) -> Quantity {
        self.reserves
            .iter()
            .filter(|entry| entry.production_order_id == production_order_id)
            .map(|entry| entry.quantity)
            .sum()
    }

    pub fn has_reservation_for(&self, production_order_id: Uuid) -> bool {
        self.reserves
            .iter()
            .any(|entry| entry.production_order_id == production_order_id)
    }

    /// Adds `quantity` to the order's entry, appending one if absent.
    pub fn add_reservation(&mut self, production_order_id: Uuid, quantity: Quantity) {
        match self
            .reserves
            .iter_mut()
            .find(|entry| entry.production_order_id == production_order_id)
        {
            Some(entry) => entry.quantity += quantity,
            None => self.reserves.push(ReserveEntry {
                production_order_id,
                quantity,
            }),
        }
        self.total_reserved += quantity;
        self.touch();
    }

    /// Removes up to `quantity` from the order's entry, dropping the entry when
    /// it empties. Returns the quantity actually removed.
    pub fn take_reservation(&mut self, production_order_id: Uuid, quantity: Quantity) -> Quantity {
        let Some(index) = self
            .reserves
            .iter()
            .position(|entry| entry.production_order_id == production_order_id)
        else {
            return Quantity::ZERO;
        };
        let taken = self.reserves[index].quantity.min(quantity);
        self.reserves[index].quantity -= taken;
        if self.reserves[index].quantity.is_zero() {
            self.reserves.remove(index);
        }
        self.total_reserved -= taken;
        self.touch();
        taken
    }

    /// Drops every entry held by the order and returns their combined quantity.
    pub fn release_order(&mut self, production_order_id: Uuid) -> Quantity {
        let released = self.reserved_by(production_order_id);
        self.reserves
            .retain(|entry| entry.production_order_id != production_order_id);
        self.total_reserved -= released;
        self.touch();
        released
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Verifies `0 <= total_reserved <= quantity` and that the reserve entries
    /// sum to `total_reserved`.
    pub fn check_invariants(&self) -> Result<(), ServiceError> {
        if self.quantity.is_negative() {
            return Err(ServiceError::InternalError(format!(
                "Availability {} has negative quantity {}",
                self.id, self.quantity
            )));
        }
        if self.total_reserved.is_negative() || self.total_reserved > self.quantity {
            return Err(ServiceError::InternalError(format!(
                "Availability {} reserves {} out of {}",
                self.id, self.total_reserved, self.quantity
            )));
        }
        let sum: Quantity = self.reserves.iter().map(|entry| entry.quantity).sum();
        if (sum - self.total_reserved).as_decimal().abs() > LEDGER_TOLERANCE {
            return Err(ServiceError::InternalError(format!(
                "Availability {} reserve entries sum to {} but total_reserved is {}",
                self.id, sum, self.total_reserved
            )));
        }
        Ok(())
    }
}

/// Query over availabilities; every populated field must match.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AvailabilityFilter {
    pub product_id: Option<Uuid>,
    pub stock_id: Option<Uuid>,
    pub warehouse_id: Option<Uuid>,
    /// Excludes rows whose batch expired before this day.
    pub usable_on: Option<NaiveDate>,
    pub reserved_by: Option<Uuid>,
}

impl AvailabilityFilter {
    pub fn matches(&self, availability: &Availability, batch: Option<&Batch>) -> bool {
        self.product_id.map_or(true, |id| availability.product_id == id)
            && self.stock_id.map_or(true, |id| availability.stock_id == id)
            && self
                .warehouse_id
                .map_or(true, |id| availability.warehouse_id == id)
            && self
                .usable_on
                .map_or(true, |day| batch.map_or(true, |b| b.is_usable_on(day)))
            && self
                .reserved_by
                .map_or(true, |order| availability.has_reservation_for(order))
    }
}

/// An availability together with its batch, as returned by filtered lookups.
#[derive(Clone, Debug, PartialEq)]
pub struct AvailabilityCandidate {
    pub availability: Availability,
    pub batch: Option<Batch>,
}

impl AvailabilityCandidate {
    pub fn expiration_day(&self) -> Option<NaiveDate> {
        self.batch.as_ref().and_then(|batch| batch.expiration_day)
    }
}
