//! Reservation Service
//!
//! Reserves a production order's materials against warehouse availabilities,
//! releases those reservations, and reports what is still missing.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::allocation::{allocation_amount, order_side_delta, rank_candidates};
use super::stock_priority::resolve_stock_order;
use super::{debug_check, EngineContext};
use crate::errors::ServiceError;
use crate::events::Event;
use crate::metrics;
use crate::models::{
    derive_status, AvailabilityFilter, ProductionOrder, ProductionOrderStatus,
};
use crate::quantity::{from_standard_unit, to_standard_unit, Quantity};
use crate::store::InventoryStoreExt;

/// Result of one reservation pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationOutcome {
    /// Materials that received at least one allocation in this pass.
    pub reserved_items: usize,
    /// Materials whose reservation is complete after this pass.
    pub completed_items: usize,
    pub status: ProductionOrderStatus,
    pub order: ProductionOrder,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseOutcome {
    /// Availability reserve entries removed.
    pub released_entries: usize,
    pub order: ProductionOrder,
}

/// What a material still lacks, in the order's unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialShortage {
    pub product_id: Uuid,
    pub name: String,
    pub required: Quantity,
    pub reserved: Quantity,
    pub outstanding: Quantity,
    /// Unreserved, unexpired stock of the material in the order's warehouse.
    pub free_in_warehouse: Quantity,
}

#[derive(Clone)]
pub struct ReservationService {
    ctx: EngineContext,
}

impl ReservationService {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    /// Allocates every incomplete material of the order, walking the
    /// warehouse's stocks in priority order.
    #[instrument(skip(self), fields(production_order_id = %production_order_id))]
    pub async fn reserve(
        &self,
        production_order_id: Uuid,
    ) -> Result<ReservationOutcome, ServiceError> {
        let result = self.reserve_inner(production_order_id).await;
        if let Err(e) = &result {
            metrics::record_failure("reserve", e);
        }
        result
    }

    async fn reserve_inner(
        &self,
        production_order_id: Uuid,
    ) -> Result<ReservationOutcome, ServiceError> {
        let store = self.ctx.store.as_ref();
        let _order_guard = self.ctx.order_locks.lock(&production_order_id).await;

        let mut order = store.require_production_order(production_order_id).await?;
        if !order.status.accepts_reservations() {
            return Err(ServiceError::InvalidStatus(format!(
                "Production order {} is {} and cannot reserve materials",
                order.id, order.status
            )));
        }

        let stocks = resolve_stock_order(store, order.warehouse_id).await?;
        let today = self.ctx.clock.today();
        let non_expiring_last = self.ctx.config.reserve_non_expiring_last;

        let mut reserved_items = 0;
        let mut completed_items = 0;

        for index in 0..order.production.materials.len() {
            if order.production.materials[index].is_complete() {
                completed_items += 1;
                continue;
            }

            let product_id = order.production.materials[index].product_id;
            let product = store.require_product(product_id).await?;
            let rate = product.unit_conversion_rate;
            let standard = to_standard_unit(order.production.materials[index].quantity, rate)?;
            let already =
                to_standard_unit(order.production.materials[index].total_reserved, rate)?;

            let mut reserved_now = Quantity::ZERO;
            'stocks: for stock_id in &stocks {
                let filter = AvailabilityFilter {
                    product_id: Some(product_id),
                    stock_id: Some(*stock_id),
                    warehouse_id: Some(order.warehouse_id),
                    usable_on: Some(today),
                    reserved_by: None,
                };
                let candidates =
                    rank_candidates(store.find_availabilities(&filter).await?, non_expiring_last);

                for candidate in candidates {
                    let needed = standard - already - reserved_now;
                    if !needed.is_positive() {
                        break 'stocks;
                    }

                    let key = candidate.availability.key();
                    let _key_guard = self.ctx.availability_locks.lock(&key).await;
                    // Re-read under the lock; the candidate list may be stale.
                    let Some(mut availability) = store.find_availability(&key).await? else {
                        continue;
                    };
                    let Some(taken) = allocation_amount(availability.free(), needed) else {
                        continue;
                    };

                    availability.add_reservation(order.id, taken);
                    debug_check(availability.check_invariants())?;
                    store.save_availability(&availability).await?;

                    reserved_now += taken;
                    let completes = already + reserved_now >= standard;
                    let material = &mut order.production.materials[index];
                    let delta = order_side_delta(material, taken, completes, rate)?;
                    material.add_reserve(availability.location(), delta);

                    debug!(
                        availability_id = %availability.id,
                        material = %product_id,
                        %taken,
                        %delta,
                        "Allocated availability"
                    );
                }
            }

            let material = &order.production.materials[index];
            if reserved_now.is_positive() {
                reserved_items += 1;
            }
            if material.is_complete() {
                completed_items += 1;
            } else {
                warn!(
                    material = %product_id,
                    outstanding = %material.outstanding(),
                    "Material only partially reserved"
                );
            }
        }

        let status = derive_status(order.status, order.materials(), reserved_items > 0);
        order.status = status;
        order.updated_at = Utc::now();
        debug_check(order.check_ledger())?;
        store.save_production_order(&order).await?;

        metrics::RESERVATION_PASSES
            .with_label_values(&[status.as_ref()])
            .inc();
        metrics::RESERVED_MATERIALS.inc_by(reserved_items as u64);
        self.ctx
            .events
            .publish(Event::MaterialsReserved {
                production_order_id: order.id,
                reserved_items,
                completed_items,
                status,
            })
            .await;

        info!(
            reserved_items,
            completed_items,
            status = %status,
            "Reservation pass finished"
        );
        Ok(ReservationOutcome {
            reserved_items,
            completed_items,
            status,
            order,
        })
    }

    /// Removes every reservation the order holds and reopens it. Running it
    /// again finds nothing to release.
    #[instrument(skip(self), fields(production_order_id = %production_order_id))]
    pub async fn unreserve(
        &self,
        production_order_id: Uuid,
    ) -> Result<ReleaseOutcome, ServiceError> {
        let result = self.unreserve_inner(production_order_id).await;
        if let Err(e) = &result {
            metrics::record_failure("unreserve", e);
        }
        result
    }

    async fn unreserve_inner(
        &self,
        production_order_id: Uuid,
    ) -> Result<ReleaseOutcome, ServiceError> {
        let store = self.ctx.store.as_ref();
        let _order_guard = self.ctx.order_locks.lock(&production_order_id).await;

        let mut order = store.require_production_order(production_order_id).await?;
        let holders = store.availabilities_reserved_by(order.id).await?;

        let mut released_entries = 0;
        for holder in holders {
            let key = holder.key();
            let _key_guard = self.ctx.availability_locks.lock(&key).await;
            let Some(mut availability) = store.find_availability(&key).await? else {
                continue;
            };
            if !availability.has_reservation_for(order.id) {
                continue;
            }
            let released = availability.release_order(order.id);
            debug_check(availability.check_invariants())?;
            store.save_availability(&availability).await?;
            released_entries += 1;
            debug!(availability_id = %availability.id, %released, "Released reservation");
        }

        order.reset_reservations();
        store.save_production_order(&order).await?;

        metrics::RESERVATION_RELEASES.inc();
        self.ctx
            .events
            .publish(Event::MaterialsUnreserved {
                production_order_id: order.id,
                released_entries,
            })
            .await;

        info!(released_entries, "Reservations released");
        Ok(ReleaseOutcome {
            released_entries,
            order,
        })
    }

    /// Per-material outstanding quantities and the free stock that could
    /// cover them. Read-only.
    #[instrument(skip(self))]
    pub async fn shortages(
        &self,
        production_order_id: Uuid,
    ) -> Result<Vec<MaterialShortage>, ServiceError> {
        let store = self.ctx.store.as_ref();
        let order = store.require_production_order(production_order_id).await?;
        let today = self.ctx.clock.today();

        let mut shortages = Vec::with_capacity(order.materials().len());
        for material in order.materials() {
            let product = store.require_product(material.product_id).await?;
            let filter = AvailabilityFilter {
                product_id: Some(material.product_id),
                warehouse_id: Some(order.warehouse_id),
                usable_on: Some(today),
                ..Default::default()
            };
            let free: Quantity = store
                .find_availabilities(&filter)
                .await?
                .iter()
                .map(|candidate| candidate.availability.free().non_negative())
                .sum();

            shortages.push(MaterialShortage {
                product_id: material.product_id,
                name: material.name.clone(),
                required: material.quantity,
                reserved: material.total_reserved,
                outstanding: material.outstanding(),
                free_in_warehouse: from_standard_unit(free, product.unit_conversion_rate)?,
            });
        }
        Ok(shortages)
    }
}
