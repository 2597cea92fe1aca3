use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use super::InventoryStore;
use crate::errors::ServiceError;
use crate::models::{
    Availability, AvailabilityCandidate, AvailabilityFilter, AvailabilityKey, Batch, NewBatch,
    Product, ProductionOrder, Stock, StocksPriority, Warehouse,
};

/// Process-local store backed by concurrent maps.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    products: DashMap<Uuid, Product>,
    stocks: DashMap<Uuid, Stock>,
    warehouses: DashMap<Uuid, Warehouse>,
    priorities: DashMap<Uuid, StocksPriority>,
    batches: DashMap<Uuid, Batch>,
    availabilities: DashMap<Uuid, Availability>,
    production_orders: DashMap<Uuid, ProductionOrder>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_product(&self, product: Product) -> Uuid {
        let id = product.id;
        self.products.insert(id, product);
        id
    }

    pub fn insert_stock(&self, stock: Stock) -> Uuid {
        let id = stock.id;
        self.stocks.insert(id, stock);
        id
    }

    pub fn insert_warehouse(&self, warehouse: Warehouse) -> Uuid {
        let id = warehouse.id;
        self.warehouses.insert(id, warehouse);
        id
    }

    pub fn set_stocks_priority(&self, warehouse_id: Uuid, stocks: Vec<Uuid>) {
        self.priorities.insert(
            warehouse_id,
            StocksPriority {
                warehouse_id,
                stocks,
            },
        );
    }

    pub fn insert_batch(&self, batch: Batch) -> Uuid {
        let id = batch.id;
        self.batches.insert(id, batch);
        id
    }

    pub fn insert_availability(&self, availability: Availability) -> Uuid {
        let id = availability.id;
        self.availabilities.insert(id, availability);
        id
    }

    pub fn insert_production_order(&self, order: ProductionOrder) -> Uuid {
        let id = order.id;
        self.production_orders.insert(id, order);
        id
    }

    pub fn availability(&self, id: Uuid) -> Option<Availability> {
        self.availabilities.get(&id).map(|entry| entry.value().clone())
    }

    pub fn production_order(&self, id: Uuid) -> Option<ProductionOrder> {
        self.production_orders
            .get(&id)
            .map(|entry| entry.value().clone())
    }

    /// Snapshot of every availability row.
    pub fn all_availabilities(&self) -> Vec<Availability> {
        self.availabilities
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    fn batch_of(&self, availability: &Availability) -> Option<Batch> {
        availability
            .batch_id
            .and_then(|id| self.batches.get(&id).map(|entry| entry.value().clone()))
    }
}

#[async_trait]
impl InventoryStore for InMemoryStore {
    async fn get_product(&self, id: Uuid) -> Result<Option<Product>, ServiceError> {
        Ok(self.products.get(&id).map(|entry| entry.value().clone()))
    }

    async fn get_stock(&self, id: Uuid) -> Result<Option<Stock>, ServiceError> {
        Ok(self.stocks.get(&id).map(|entry| entry.value().clone()))
    }

    async fn get_warehouse(&self, id: Uuid) -> Result<Option<Warehouse>, ServiceError> {
        Ok(self.warehouses.get(&id).map(|entry| entry.value().clone()))
    }

    async fn get_stocks_priority(
        &self,
        warehouse_id: Uuid,
    ) -> Result<Option<StocksPriority>, ServiceError> {
        Ok(self
            .priorities
            .get(&warehouse_id)
            .map(|entry| entry.value().clone()))
    }

    async fn find_availabilities(
        &self,
        filter: &AvailabilityFilter,
    ) -> Result<Vec<AvailabilityCandidate>, ServiceError> {
        let rows: Vec<Availability> = self
            .availabilities
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        Ok(rows
            .into_iter()
            .filter_map(|availability| {
                let batch = self.batch_of(&availability);
                filter
                    .matches(&availability, batch.as_ref())
                    .then_some(AvailabilityCandidate {
                        availability,
                        batch,
                    })
            })
            .collect())
    }

    async fn find_availability(
        &self,
        key: &AvailabilityKey,
    ) -> Result<Option<Availability>, ServiceError> {
        Ok(self
            .availabilities
            .iter()
            .find(|entry| &entry.value().key() == key)
            .map(|entry| entry.value().clone()))
    }

    async fn save_availability(&self, availability: &Availability) -> Result<(), ServiceError> {
        self.availabilities
            .insert(availability.id, availability.clone());
        Ok(())
    }

    async fn delete_availability(&self, id: Uuid) -> Result<(), ServiceError> {
        self.availabilities.remove(&id);
        Ok(())
    }

    async fn get_production_order(
        &self,
        id: Uuid,
    ) -> Result<Option<ProductionOrder>, ServiceError> {
        Ok(self.production_order(id))
    }

    async fn save_production_order(&self, order: &ProductionOrder) -> Result<(), ServiceError> {
        self.production_orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn find_batch(
        &self,
        name: &str,
        product_id: Uuid,
    ) -> Result<Option<Batch>, ServiceError> {
        Ok(self
            .batches
            .iter()
            .find(|entry| entry.value().name == name && entry.value().product_id == product_id)
            .map(|entry| entry.value().clone()))
    }

    async fn get_batch(&self, id: Uuid) -> Result<Option<Batch>, ServiceError> {
        Ok(self.batches.get(&id).map(|entry| entry.value().clone()))
    }

    async fn create_batch(&self, batch: NewBatch) -> Result<Batch, ServiceError> {
        if self
            .batches
            .iter()
            .any(|entry| entry.value().name == batch.name && entry.value().product_id == batch.product_id)
        {
            return Err(ServiceError::Conflict(format!(
                "Batch {} already exists for product {}",
                batch.name, batch.product_id
            )));
        }
        let batch = Batch::from(batch);
        self.batches.insert(batch.id, batch.clone());
        Ok(batch)
    }
}
