//! Storage adapter consumed by the engine.
//!
//! The engine never talks to a database directly; it goes through
//! [`InventoryStore`], which has an in-memory implementation for tests and
//! embedding and a sea-orm implementation for Postgres.

use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::{
    Availability, AvailabilityCandidate, AvailabilityFilter, AvailabilityKey, Batch, NewBatch,
    Product, ProductionOrder, Stock, StocksPriority, Warehouse,
};

pub mod memory;
pub mod sql;

pub use memory::InMemoryStore;
pub use sql::SeaOrmStore;

pub type DynStore = Arc<dyn InventoryStore>;

#[async_trait]
pub trait InventoryStore: Send + Sync {
    async fn get_product(&self, id: Uuid) -> Result<Option<Product>, ServiceError>;

    async fn get_stock(&self, id: Uuid) -> Result<Option<Stock>, ServiceError>;

    async fn get_warehouse(&self, id: Uuid) -> Result<Option<Warehouse>, ServiceError>;

    async fn get_stocks_priority(
        &self,
        warehouse_id: Uuid,
    ) -> Result<Option<StocksPriority>, ServiceError>;

    /// Availabilities matching `filter`, each with its batch. No particular order.
    async fn find_availabilities(
        &self,
        filter: &AvailabilityFilter,
    ) -> Result<Vec<AvailabilityCandidate>, ServiceError>;

    async fn find_availability(
        &self,
        key: &AvailabilityKey,
    ) -> Result<Option<Availability>, ServiceError>;

    /// Inserts or replaces the row with `availability.id`, including its reserve entries.
    async fn save_availability(&self, availability: &Availability) -> Result<(), ServiceError>;

    async fn delete_availability(&self, id: Uuid) -> Result<(), ServiceError>;

    async fn get_production_order(
        &self,
        id: Uuid,
    ) -> Result<Option<ProductionOrder>, ServiceError>;

    /// Persists the order's status and its full materials ledger.
    async fn save_production_order(&self, order: &ProductionOrder) -> Result<(), ServiceError>;

    async fn find_batch(
        &self,
        name: &str,
        product_id: Uuid,
    ) -> Result<Option<Batch>, ServiceError>;

    async fn get_batch(&self, id: Uuid) -> Result<Option<Batch>, ServiceError>;

    async fn create_batch(&self, batch: NewBatch) -> Result<Batch, ServiceError>;
}

/// Convenience lookups that turn a missing row into [`ServiceError::NotFound`].
#[async_trait]
pub trait InventoryStoreExt: InventoryStore {
    async fn require_product(&self, id: Uuid) -> Result<Product, ServiceError> {
        self.get_product(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Product", id))
    }

    async fn require_warehouse(&self, id: Uuid) -> Result<Warehouse, ServiceError> {
        self.get_warehouse(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Warehouse", id))
    }

    async fn require_stock(&self, id: Uuid) -> Result<Stock, ServiceError> {
        self.get_stock(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Stock", id))
    }

    async fn require_production_order(&self, id: Uuid) -> Result<ProductionOrder, ServiceError> {
        self.get_production_order(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Production order", id))
    }

    /// Every availability holding a reserve entry for the order.
    async fn availabilities_reserved_by(
        &self,
        production_order_id: Uuid,
    ) -> Result<Vec<Availability>, ServiceError> {
        let filter = AvailabilityFilter {
            reserved_by: Some(production_order_id),
            ..Default::default()
        };
        Ok(self
            .find_availabilities(&filter)
            .await?
            .into_iter()
            .map(|candidate| candidate.availability)
            .collect())
    }
}

impl<T: InventoryStore + ?Sized> InventoryStoreExt for T {}
