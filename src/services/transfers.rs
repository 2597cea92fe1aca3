//! Transfer Service
//!
//! Moves on-hand quantity between two locations of the same product and
//! carries the production-order reservations attached to it.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::{debug_check, EngineContext};
use crate::errors::ServiceError;
use crate::events::Event;
use crate::metrics;
use crate::models::{Availability, AvailabilityKey, ProductionOrder, StockLocation};
use crate::quantity::{from_standard_unit, Quantity};
use crate::store::{InventoryStore, InventoryStoreExt};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TransferRequest {
    #[validate(custom = "positive_quantity")]
    pub quantity: Quantity,
    pub product_id: Uuid,
    pub stock_out: Uuid,
    pub stock_in: Uuid,
    pub warehouse_out: Uuid,
    pub warehouse_in: Uuid,
    pub batch_id: Option<Uuid>,
}

impl TransferRequest {
    pub fn from_location(&self) -> StockLocation {
        StockLocation::new(self.stock_out, self.warehouse_out, self.batch_id)
    }

    pub fn to_location(&self) -> StockLocation {
        StockLocation::new(self.stock_in, self.warehouse_in, self.batch_id)
    }
}

pub(crate) fn positive_quantity(quantity: &Quantity) -> Result<(), ValidationError> {
    if quantity.is_positive() {
        Ok(())
    } else {
        let mut err = ValidationError::new("quantity");
        err.message = Some("quantity must be greater than 0".into());
        Err(err)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferOutcome {
    pub source: Option<Availability>,
    pub destination: Availability,
    /// Reserve entries moved whole or in part.
    pub moved_reservations: usize,
    pub updated_orders: Vec<Uuid>,
}

#[derive(Clone)]
pub struct TransferService {
    ctx: EngineContext,
}

impl TransferService {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    #[instrument(skip(self, request), fields(product_id = %request.product_id, quantity = %request.quantity))]
    pub async fn transfer(&self, request: TransferRequest) -> Result<TransferOutcome, ServiceError> {
        let result = self.transfer_inner(&request).await;
        match &result {
            Ok(_) => metrics::STOCK_TRANSFERS.inc(),
            Err(e) => metrics::record_failure("transfer", e),
        }
        result
    }

    async fn validate(&self, request: &TransferRequest) -> Result<Decimal, ServiceError> {
        request.validate()?;
        if request.from_location() == request.to_location() {
            return Err(ServiceError::ValidationError(
                "Transfer source and destination are the same location".into(),
            ));
        }

        let store = self.ctx.store.as_ref();
        let product = store.require_product(request.product_id).await?;
        match (product.manages_batches(), request.batch_id) {
            (true, None) => {
                return Err(ServiceError::ValidationError(format!(
                    "Product {} is managed by batches; a batch is required",
                    product.id
                )))
            }
            (false, Some(_)) => {
                return Err(ServiceError::ValidationError(format!(
                    "Product {} does not manage batches",
                    product.id
                )))
            }
            (true, Some(batch_id)) => {
                let batch = store
                    .get_batch(batch_id)
                    .await?
                    .ok_or_else(|| ServiceError::not_found("Batch", batch_id))?;
                if batch.product_id != product.id {
                    return Err(ServiceError::ValidationError(format!(
                        "Batch {} belongs to another product",
                        batch.name
                    )));
                }
            }
            (false, None) => {}
        }

        for (warehouse_id, stock_id) in [
            (request.warehouse_out, request.stock_out),
            (request.warehouse_in, request.stock_in),
        ] {
            store.require_stock(stock_id).await?;
            let warehouse = store.require_warehouse(warehouse_id).await?;
            if !warehouse.has_stock(stock_id) {
                return Err(ServiceError::ValidationError(format!(
                    "Stock {} is not assigned to warehouse {}",
                    stock_id, warehouse_id
                )));
            }
        }
        Ok(product.unit_conversion_rate)
    }

    async fn transfer_inner(&self, request: &TransferRequest) -> Result<TransferOutcome, ServiceError> {
        let rate = self.validate(request).await?;
        let store = self.ctx.store.as_ref();
        let from_location = request.from_location();
        let to_location = request.to_location();
        let from_key = AvailabilityKey::new(request.product_id, from_location);
        let to_key = AvailabilityKey::new(request.product_id, to_location);

        // Orders are locked before availability keys. The set of orders
        // holding the source can change between the peek and the locks, in
        // which case the locks are dropped and taken again.
        let (_order_guards, _key_guards, mut source) = loop {
            let peek = store
                .find_availability(&from_key)
                .await?
                .ok_or_else(|| not_found_at(request, &from_location))?;
            let orders = reserving_orders(&peek);
            let order_guards = self
                .ctx
                .order_locks
                .lock_many(&orders.iter().copied().collect::<Vec<_>>())
                .await;
            let key_guards = self
                .ctx
                .availability_locks
                .lock_many(&[from_key, to_key])
                .await;

            let source = store
                .find_availability(&from_key)
                .await?
                .ok_or_else(|| not_found_at(request, &from_location))?;
            if reserving_orders(&source).is_subset(&orders) {
                break (order_guards, key_guards, source);
            }
            debug!("Reserving orders changed while locking; retrying");
        };

        if source.quantity < request.quantity {
            return Err(ServiceError::InsufficientStock {
                context: format!("availability {}", source.id),
                requested: request.quantity,
                available: source.quantity,
            });
        }

        let mut destination = store
            .find_availability(&to_key)
            .await?
            .unwrap_or_else(|| Availability::new(to_key, Quantity::ZERO, source.price));

        let mut orders: HashMap<Uuid, ProductionOrder> = HashMap::new();
        let mut remaining = request.quantity;
        let mut moved_reservations = 0;

        for entry in source.reserves.clone() {
            if !remaining.is_positive() {
                break;
            }
            let whole = remaining >= entry.quantity;
            let moved = source.take_reservation(entry.production_order_id, remaining.min(entry.quantity));
            destination.add_reservation(entry.production_order_id, moved);
            remaining -= moved;
            moved_reservations += 1;

            let order = match orders.entry(entry.production_order_id) {
                std::collections::hash_map::Entry::Occupied(slot) => slot.into_mut(),
                std::collections::hash_map::Entry::Vacant(slot) => {
                    match store.get_production_order(entry.production_order_id).await? {
                        Some(order) => slot.insert(order),
                        None => {
                            warn!(
                                production_order_id = %entry.production_order_id,
                                "Reserving production order no longer exists"
                            );
                            continue;
                        }
                    }
                }
            };
            let order_id = order.id;
            let mut order_moved = Quantity::ZERO;
            let mut carried = false;
            let mut left = if whole {
                None
            } else {
                Some(from_standard_unit(moved, rate)?)
            };
            // One availability entry may back several materials of the same product.
            for material in order.materials_reserved_at_mut(request.product_id, &from_location) {
                carried = true;
                order_moved += match left.as_mut() {
                    None => material.relocate_reserve(&from_location, to_location),
                    Some(budget) if budget.is_positive() => {
                        let split = material.split_reserve(&from_location, to_location, *budget);
                        *budget -= split;
                        split
                    }
                    Some(_) => break,
                };
            }
            if !carried {
                warn!(
                    production_order_id = %order_id,
                    "Order ledger has no reserve at the transfer source"
                );
                continue;
            }
            debug!(
                production_order_id = %order_id,
                %moved,
                %order_moved,
                whole,
                "Carried reservation to destination"
            );
            if !whole {
                break;
            }
        }

        source.quantity -= request.quantity;
        source.touch();
        destination.quantity += request.quantity;
        destination.touch();

        debug_check(destination.check_invariants())?;
        let source_after = if source.quantity.is_zero() && source.reserves.is_empty() {
            store.delete_availability(source.id).await?;
            metrics::AVAILABILITIES_DEPLETED.inc();
            self.ctx
                .events
                .publish(Event::AvailabilityDepleted {
                    availability_id: source.id,
                    product_id: source.product_id,
                })
                .await;
            None
        } else {
            if !self.ctx.config.allow_exit_below_reserved {
                debug_check(source.check_invariants())?;
            }
            store.save_availability(&source).await?;
            Some(source)
        };
        store.save_availability(&destination).await?;

        let updated_orders = save_orders(store, orders).await?;

        self.ctx
            .events
            .publish(Event::StockTransferred {
                product_id: request.product_id,
                from: from_location,
                to: to_location,
                quantity: request.quantity,
                moved_reservations,
            })
            .await;

        info!(
            moved_reservations,
            updated_orders = updated_orders.len(),
            "Stock transferred"
        );
        Ok(TransferOutcome {
            source: source_after,
            destination,
            moved_reservations,
            updated_orders,
        })
    }
}

fn reserving_orders(availability: &Availability) -> BTreeSet<Uuid> {
    availability
        .reserves
        .iter()
        .map(|entry| entry.production_order_id)
        .collect()
}

fn not_found_at(request: &TransferRequest, location: &StockLocation) -> ServiceError {
    ServiceError::NotFound(format!(
        "No availability of product {} at stock {} in warehouse {}",
        request.product_id, location.stock_id, location.warehouse_id
    ))
}

async fn save_orders(
    store: &dyn InventoryStore,
    orders: HashMap<Uuid, ProductionOrder>,
) -> Result<Vec<Uuid>, ServiceError> {
    let mut ids = Vec::with_capacity(orders.len());
    for (id, mut order) in orders {
        order.updated_at = Utc::now();
        debug_check(order.check_ledger())?;
        store.save_production_order(&order).await?;
        ids.push(id);
    }
    ids.sort();
    Ok(ids)
}
