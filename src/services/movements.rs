//! Movement Service
//!
//! Entrances, exits and signed adjustments of on-hand stock, with and
//! without batches.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use super::transfers::positive_quantity;
use super::{debug_check, EngineContext};
use crate::errors::ServiceError;
use crate::events::Event;
use crate::metrics;
use crate::models::{
    Availability, AvailabilityFilter, AvailabilityKey, Batch, NewBatch, Product, StockLocation,
    Warehouse,
};
use crate::quantity::Quantity;
use crate::store::InventoryStoreExt;

/// Batch named by a movement. The expiration day is only used when the
/// batch has to be created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct BatchRef {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    pub expiration_day: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct EntranceCommand {
    pub product_id: Uuid,
    pub stock_id: Uuid,
    pub warehouse_id: Uuid,
    #[validate(custom = "positive_quantity")]
    pub quantity: Quantity,
    /// Unit cost; required when a new availability or batch is opened.
    pub price: Option<Decimal>,
    #[validate]
    pub batch: Option<BatchRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ExitCommand {
    pub product_id: Uuid,
    pub stock_id: Uuid,
    pub warehouse_id: Uuid,
    #[validate(custom = "positive_quantity")]
    pub quantity: Quantity,
    #[validate]
    pub batch: Option<BatchRef>,
}

/// Signed correction: positive enters stock, negative removes it.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AdjustmentCommand {
    pub product_id: Uuid,
    pub stock_id: Uuid,
    pub warehouse_id: Uuid,
    pub quantity: Quantity,
    pub price: Option<Decimal>,
    #[validate]
    pub batch: Option<BatchRef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovementKind {
    Entrance,
    Exit,
    Adjustment,
}

/// Checks a movement against the product's inventory configuration and the
/// warehouse topology.
pub fn validate_movement(
    product: &Product,
    warehouse: &Warehouse,
    stock_id: Uuid,
    batch: Option<&BatchRef>,
    kind: MovementKind,
) -> Result<(), ServiceError> {
    if !warehouse.has_stock(stock_id) {
        return Err(ServiceError::ValidationError(format!(
            "Stock {} is not assigned to warehouse {}",
            stock_id, warehouse.id
        )));
    }
    if kind != MovementKind::Exit && !product.is_active {
        return Err(ServiceError::ValidationError(format!(
            "Product {} is inactive",
            product.id
        )));
    }
    match (product.manages_batches(), batch) {
        (true, None) => Err(ServiceError::ValidationError(format!(
            "Product {} is managed by batches; a batch is required",
            product.id
        ))),
        (false, Some(_)) => Err(ServiceError::ValidationError(format!(
            "Product {} does not manage batches",
            product.id
        ))),
        (true, Some(batch)) if batch.expiration_day.is_some() && !product.tracks_expiration() => {
            Err(ServiceError::ValidationError(format!(
                "Product {} does not track expiration; batch {} cannot carry an expiration day",
                product.id, batch.name
            )))
        }
        _ => Ok(()),
    }
}

/// On-hand totals of one product in one warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockSummary {
    pub product_id: Uuid,
    pub warehouse_id: Uuid,
    pub quantity: Quantity,
    pub reserved: Quantity,
    pub free: Quantity,
    pub lines: Vec<StockLine>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLine {
    pub availability_id: Uuid,
    pub location: StockLocation,
    pub quantity: Quantity,
    pub reserved: Quantity,
}

#[derive(Clone)]
pub struct MovementService {
    ctx: EngineContext,
}

impl MovementService {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    async fn load_context(
        &self,
        product_id: Uuid,
        warehouse_id: Uuid,
        stock_id: Uuid,
    ) -> Result<(Product, Warehouse), ServiceError> {
        let store = self.ctx.store.as_ref();
        let product = store.require_product(product_id).await?;
        let warehouse = store.require_warehouse(warehouse_id).await?;
        store.require_stock(stock_id).await?;
        Ok((product, warehouse))
    }

    async fn find_or_create_batch(
        &self,
        product: &Product,
        batch: &BatchRef,
        price: Option<Decimal>,
    ) -> Result<Batch, ServiceError> {
        let store = self.ctx.store.as_ref();
        if let Some(existing) = store.find_batch(&batch.name, product.id).await? {
            return Ok(existing);
        }
        let price = price.ok_or_else(|| {
            ServiceError::ValidationError(format!(
                "A price is required to create batch {}",
                batch.name
            ))
        })?;
        if product.tracks_expiration() && batch.expiration_day.is_none() {
            return Err(ServiceError::ValidationError(format!(
                "Product {} tracks expiration; batch {} needs an expiration day",
                product.id, batch.name
            )));
        }
        let created = store
            .create_batch(NewBatch {
                name: batch.name.clone(),
                product_id: product.id,
                price,
                expiration_day: batch.expiration_day,
            })
            .await?;
        info!(batch_id = %created.id, name = %created.name, "Created batch");
        Ok(created)
    }

    #[instrument(skip(self, command), fields(product_id = %command.product_id, quantity = %command.quantity))]
    pub async fn entrance(&self, command: EntranceCommand) -> Result<Availability, ServiceError> {
        let result = self.entrance_inner(&command, MovementKind::Entrance).await;
        if let Err(e) = &result {
            metrics::record_failure("entrance", e);
        }
        result
    }

    async fn entrance_inner(
        &self,
        command: &EntranceCommand,
        kind: MovementKind,
    ) -> Result<Availability, ServiceError> {
        command.validate()?;
        let (product, warehouse) = self
            .load_context(command.product_id, command.warehouse_id, command.stock_id)
            .await?;
        validate_movement(
            &product,
            &warehouse,
            command.stock_id,
            command.batch.as_ref(),
            kind,
        )?;

        let batch = match &command.batch {
            Some(batch) => Some(self.find_or_create_batch(&product, batch, command.price).await?),
            None => None,
        };
        let location = StockLocation::new(
            command.stock_id,
            command.warehouse_id,
            batch.as_ref().map(|b| b.id),
        );
        let key = AvailabilityKey::new(product.id, location);

        let store = self.ctx.store.as_ref();
        let _key_guard = self.ctx.availability_locks.lock(&key).await;
        let availability = match store.find_availability(&key).await? {
            Some(mut existing) => {
                existing.quantity += command.quantity;
                existing.touch();
                existing
            }
            None => {
                let price = command
                    .price
                    .or_else(|| batch.as_ref().map(|b| b.price))
                    .ok_or_else(|| {
                        ServiceError::ValidationError(
                            "A price is required to open a new availability".into(),
                        )
                    })?;
                Availability::new(key, command.quantity, price)
            }
        };
        debug_check(availability.check_invariants())?;
        store.save_availability(&availability).await?;

        metrics::STOCK_MOVEMENTS.with_label_values(&["entrance"]).inc();
        self.ctx
            .events
            .publish(Event::StockEntered {
                availability_id: availability.id,
                product_id: product.id,
                location,
                quantity: command.quantity,
            })
            .await;
        info!(availability_id = %availability.id, on_hand = %availability.quantity, "Stock entered");
        Ok(availability)
    }

    /// Removes stock. Returns the remaining availability, or `None` when the
    /// row drained to zero and was deleted.
    #[instrument(skip(self, command), fields(product_id = %command.product_id, quantity = %command.quantity))]
    pub async fn exit(&self, command: ExitCommand) -> Result<Option<Availability>, ServiceError> {
        let result = self.exit_inner(&command, MovementKind::Exit).await;
        if let Err(e) = &result {
            metrics::record_failure("exit", e);
        }
        result
    }

    async fn exit_inner(
        &self,
        command: &ExitCommand,
        kind: MovementKind,
    ) -> Result<Option<Availability>, ServiceError> {
        command.validate()?;
        let (product, warehouse) = self
            .load_context(command.product_id, command.warehouse_id, command.stock_id)
            .await?;
        validate_movement(
            &product,
            &warehouse,
            command.stock_id,
            command.batch.as_ref(),
            kind,
        )?;

        let store = self.ctx.store.as_ref();
        let batch_id = match &command.batch {
            Some(batch) => Some(
                store
                    .find_batch(&batch.name, product.id)
                    .await?
                    .ok_or_else(|| ServiceError::not_found("Batch", &batch.name))?
                    .id,
            ),
            None => None,
        };
        let location = StockLocation::new(command.stock_id, command.warehouse_id, batch_id);
        let key = AvailabilityKey::new(product.id, location);

        let _key_guard = self.ctx.availability_locks.lock(&key).await;
        let mut availability = store.find_availability(&key).await?.ok_or_else(|| {
            ServiceError::NotFound(format!(
                "No availability of product {} at stock {} in warehouse {}",
                product.id, command.stock_id, command.warehouse_id
            ))
        })?;

        if availability.quantity < command.quantity {
            return Err(ServiceError::InsufficientStock {
                context: format!("availability {}", availability.id),
                requested: command.quantity,
                available: availability.quantity,
            });
        }
        let unreserved = availability.free();
        let allow_below_reserved = self.ctx.config.allow_exit_below_reserved;
        if command.quantity > unreserved {
            if !allow_below_reserved {
                return Err(ServiceError::ReservedStock {
                    availability_id: availability.id,
                    requested: command.quantity,
                    unreserved,
                });
            }
            warn!(
                availability_id = %availability.id,
                requested = %command.quantity,
                %unreserved,
                "Exit reduces quantity below reserved total"
            );
        }

        availability.quantity -= command.quantity;
        availability.touch();

        let remaining = if availability.quantity.is_zero() && availability.reserves.is_empty() {
            store.delete_availability(availability.id).await?;
            metrics::AVAILABILITIES_DEPLETED.inc();
            self.ctx
                .events
                .publish(Event::AvailabilityDepleted {
                    availability_id: availability.id,
                    product_id: product.id,
                })
                .await;
            None
        } else {
            if !allow_below_reserved {
                debug_check(availability.check_invariants())?;
            }
            store.save_availability(&availability).await?;
            Some(availability.clone())
        };

        metrics::STOCK_MOVEMENTS.with_label_values(&["exit"]).inc();
        self.ctx
            .events
            .publish(Event::StockExited {
                availability_id: availability.id,
                product_id: product.id,
                location,
                quantity: command.quantity,
            })
            .await;
        info!(
            availability_id = %availability.id,
            on_hand = %availability.quantity,
            "Stock exited"
        );
        Ok(remaining)
    }

    /// Routes a positive quantity to an entrance and a negative one to an exit.
    #[instrument(skip(self, command), fields(product_id = %command.product_id, quantity = %command.quantity))]
    pub async fn adjust(
        &self,
        command: AdjustmentCommand,
    ) -> Result<Option<Availability>, ServiceError> {
        let result = self.adjust_inner(command).await;
        if let Err(e) = &result {
            metrics::record_failure("adjustment", e);
        }
        result
    }

    async fn adjust_inner(
        &self,
        command: AdjustmentCommand,
    ) -> Result<Option<Availability>, ServiceError> {
        command.validate()?;
        if command.quantity.is_positive() {
            let entrance = EntranceCommand {
                product_id: command.product_id,
                stock_id: command.stock_id,
                warehouse_id: command.warehouse_id,
                quantity: command.quantity,
                price: command.price,
                batch: command.batch,
            };
            self.entrance_inner(&entrance, MovementKind::Adjustment)
                .await
                .map(Some)
        } else if command.quantity.is_negative() {
            let exit = ExitCommand {
                product_id: command.product_id,
                stock_id: command.stock_id,
                warehouse_id: command.warehouse_id,
                quantity: -command.quantity,
                batch: command.batch,
            };
            self.exit_inner(&exit, MovementKind::Adjustment).await
        } else {
            Err(ServiceError::ValidationError(
                "Adjustment quantity must not be zero".into(),
            ))
        }
    }

    /// On-hand, reserved and free totals of a product across a warehouse.
    #[instrument(skip(self))]
    pub async fn stock_summary(
        &self,
        product_id: Uuid,
        warehouse_id: Uuid,
    ) -> Result<StockSummary, ServiceError> {
        let store = self.ctx.store.as_ref();
        store.require_product(product_id).await?;
        store.require_warehouse(warehouse_id).await?;

        let filter = AvailabilityFilter {
            product_id: Some(product_id),
            warehouse_id: Some(warehouse_id),
            ..Default::default()
        };
        let mut lines: Vec<StockLine> = store
            .find_availabilities(&filter)
            .await?
            .into_iter()
            .map(|candidate| StockLine {
                availability_id: candidate.availability.id,
                location: candidate.availability.location(),
                quantity: candidate.availability.quantity,
                reserved: candidate.availability.total_reserved,
            })
            .collect();
        lines.sort_by_key(|line| line.location);

        let quantity: Quantity = lines.iter().map(|line| line.quantity).sum();
        let reserved: Quantity = lines.iter().map(|line| line.reserved).sum();
        Ok(StockSummary {
            product_id,
            warehouse_id,
            quantity,
            reserved,
            free: quantity - reserved,
            lines,
        })
    }
}
