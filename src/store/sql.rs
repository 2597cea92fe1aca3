use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, instrument};
use uuid::Uuid;

use super::InventoryStore;
use crate::entities::{
    availability, availability_reserve, batch, material, material_reserve, product,
    production_order, stock, warehouse, warehouse_stock,
};
use crate::errors::ServiceError;
use crate::models::{
    Availability, AvailabilityCandidate, AvailabilityFilter, AvailabilityKey, Batch, Material,
    MaterialReserve, NewBatch, Product, Production, ProductionOrder, ProductionOrderStatus,
    ReserveEntry, Stock, StockLocation, StocksPriority, Warehouse,
};
use crate::quantity::Quantity;

/// [`InventoryStore`] over a sea-orm connection (Postgres or SQLite).
#[derive(Clone, Debug)]
pub struct SeaOrmStore {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Registers a product row. Used by seeding and the CLI.
    pub async fn insert_product(&self, product: &Product) -> Result<(), ServiceError> {
        product::ActiveModel {
            id: Set(product.id),
            name: Set(product.name.clone()),
            is_active: Set(product.is_active),
            unit_conversion_rate: Set(product.unit_conversion_rate),
            manage_batches: Set(product.inventory.manage_batches),
            expiration_days: Set(product.inventory.expiration_days),
        }
        .insert(&*self.db)
        .await?;
        Ok(())
    }

    pub async fn insert_stock(&self, stock: &Stock) -> Result<(), ServiceError> {
        stock::ActiveModel {
            id: Set(stock.id),
            name: Set(stock.name.clone()),
        }
        .insert(&*self.db)
        .await?;
        Ok(())
    }

    /// Registers a warehouse with its assigned stocks. `priority` lists the
    /// stocks in allocation order and may be a subset of `warehouse.stocks`.
    pub async fn insert_warehouse(
        &self,
        warehouse: &Warehouse,
        priority: &[Uuid],
    ) -> Result<(), ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        warehouse::ActiveModel {
            id: Set(warehouse.id),
            name: Set(warehouse.name.clone()),
        }
        .insert(&txn)
        .await?;

        for stock_id in &warehouse.stocks {
            let rank = priority.iter().position(|id| id == stock_id);
            warehouse_stock::ActiveModel {
                id: Set(Uuid::new_v4()),
                warehouse_id: Set(warehouse.id),
                stock_id: Set(*stock_id),
                priority: Set(rank.map(|r| r as i32)),
            }
            .insert(&txn)
            .await?;
        }
        txn.commit().await.map_err(ServiceError::db_error)?;
        Ok(())
    }

    async fn reserves_for<C: ConnectionTrait>(
        conn: &C,
        availability_ids: Vec<Uuid>,
    ) -> Result<HashMap<Uuid, Vec<ReserveEntry>>, ServiceError> {
        let mut grouped: HashMap<Uuid, Vec<ReserveEntry>> = HashMap::new();
        if availability_ids.is_empty() {
            return Ok(grouped);
        }
        let rows = availability_reserve::Entity::find()
            .filter(availability_reserve::Column::AvailabilityId.is_in(availability_ids))
            .order_by_asc(availability_reserve::Column::Position)
            .all(conn)
            .await?;
        for row in rows {
            grouped
                .entry(row.availability_id)
                .or_default()
                .push(ReserveEntry {
                    production_order_id: row.production_order_id,
                    quantity: Quantity::new(row.quantity),
                });
        }
        Ok(grouped)
    }

    async fn hydrate_availabilities<C: ConnectionTrait>(
        conn: &C,
        rows: Vec<availability::Model>,
    ) -> Result<Vec<Availability>, ServiceError> {
        let ids = rows.iter().map(|row| row.id).collect();
        let mut reserves = Self::reserves_for(conn, ids).await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let entries = reserves.remove(&row.id).unwrap_or_default();
                availability_from_row(row, entries)
            })
            .collect())
    }

    async fn write_availability<C: ConnectionTrait>(
        conn: &C,
        availability: &Availability,
    ) -> Result<(), ServiceError> {
        let model = availability::ActiveModel {
            id: Set(availability.id),
            product_id: Set(availability.product_id),
            stock_id: Set(availability.stock_id),
            warehouse_id: Set(availability.warehouse_id),
            batch_id: Set(availability.batch_id),
            quantity: Set(availability.quantity.as_decimal()),
            price: Set(availability.price),
            total_reserved: Set(availability.total_reserved.as_decimal()),
            created_at: Set(availability.created_at),
            updated_at: Set(availability.updated_at),
        };
        if availability::Entity::find_by_id(availability.id)
            .one(conn)
            .await?
            .is_some()
        {
            model.update(conn).await?;
        } else {
            model.insert(conn).await?;
        }

        availability_reserve::Entity::delete_many()
            .filter(availability_reserve::Column::AvailabilityId.eq(availability.id))
            .exec(conn)
            .await?;
        for (position, entry) in availability.reserves.iter().enumerate() {
            availability_reserve::ActiveModel {
                id: Set(Uuid::new_v4()),
                availability_id: Set(availability.id),
                production_order_id: Set(entry.production_order_id),
                position: Set(position as i32),
                quantity: Set(entry.quantity.as_decimal()),
            }
            .insert(conn)
            .await?;
        }
        Ok(())
    }

    async fn load_materials<C: ConnectionTrait>(
        conn: &C,
        production_order_id: Uuid,
    ) -> Result<Vec<Material>, ServiceError> {
        let rows = material::Entity::find()
            .filter(material::Column::ProductionOrderId.eq(production_order_id))
            .order_by_asc(material::Column::Position)
            .all(conn)
            .await?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let material_ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();
        let mut reserves: HashMap<Uuid, Vec<MaterialReserve>> = HashMap::new();
        for row in material_reserve::Entity::find()
            .filter(material_reserve::Column::MaterialId.is_in(material_ids))
            .order_by_asc(material_reserve::Column::Position)
            .all(conn)
            .await?
        {
            reserves
                .entry(row.material_id)
                .or_default()
                .push(MaterialReserve {
                    location: StockLocation::new(row.stock_id, row.warehouse_id, row.batch_id),
                    quantity: Quantity::new(row.quantity),
                });
        }

        Ok(rows
            .into_iter()
            .map(|row| Material {
                product_id: row.product_id,
                name: row.name,
                quantity: Quantity::new(row.quantity),
                total_reserved: Quantity::new(row.total_reserved),
                reserves: reserves.remove(&row.id).unwrap_or_default(),
            })
            .collect())
    }
}

fn availability_from_row(row: availability::Model, reserves: Vec<ReserveEntry>) -> Availability {
    Availability {
        id: row.id,
        product_id: row.product_id,
        stock_id: row.stock_id,
        warehouse_id: row.warehouse_id,
        batch_id: row.batch_id,
        quantity: Quantity::new(row.quantity),
        price: row.price,
        total_reserved: Quantity::new(row.total_reserved),
        reserves,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

#[async_trait]
impl InventoryStore for SeaOrmStore {
    async fn get_product(&self, id: Uuid) -> Result<Option<Product>, ServiceError> {
        Ok(product::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .map(Product::from))
    }

    async fn get_stock(&self, id: Uuid) -> Result<Option<Stock>, ServiceError> {
        Ok(stock::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .map(Stock::from))
    }

    async fn get_warehouse(&self, id: Uuid) -> Result<Option<Warehouse>, ServiceError> {
        let Some(row) = warehouse::Entity::find_by_id(id).one(&*self.db).await? else {
            return Ok(None);
        };
        let stocks = warehouse_stock::Entity::find()
            .filter(warehouse_stock::Column::WarehouseId.eq(id))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|assignment| assignment.stock_id)
            .collect();
        Ok(Some(Warehouse {
            id: row.id,
            name: row.name,
            stocks,
        }))
    }

    async fn get_stocks_priority(
        &self,
        warehouse_id: Uuid,
    ) -> Result<Option<StocksPriority>, ServiceError> {
        let rows = warehouse_stock::Entity::find()
            .filter(warehouse_stock::Column::WarehouseId.eq(warehouse_id))
            .filter(warehouse_stock::Column::Priority.is_not_null())
            .order_by_asc(warehouse_stock::Column::Priority)
            .all(&*self.db)
            .await?;
        if rows.is_empty() {
            return Ok(None);
        }
        Ok(Some(StocksPriority {
            warehouse_id,
            stocks: rows.into_iter().map(|row| row.stock_id).collect(),
        }))
    }

    #[instrument(skip(self))]
    async fn find_availabilities(
        &self,
        filter: &AvailabilityFilter,
    ) -> Result<Vec<AvailabilityCandidate>, ServiceError> {
        let mut query = availability::Entity::find();
        if let Some(product_id) = filter.product_id {
            query = query.filter(availability::Column::ProductId.eq(product_id));
        }
        if let Some(stock_id) = filter.stock_id {
            query = query.filter(availability::Column::StockId.eq(stock_id));
        }
        if let Some(warehouse_id) = filter.warehouse_id {
            query = query.filter(availability::Column::WarehouseId.eq(warehouse_id));
        }
        if let Some(order_id) = filter.reserved_by {
            let held: Vec<Uuid> = availability_reserve::Entity::find()
                .filter(availability_reserve::Column::ProductionOrderId.eq(order_id))
                .all(&*self.db)
                .await?
                .into_iter()
                .map(|row| row.availability_id)
                .collect();
            if held.is_empty() {
                return Ok(Vec::new());
            }
            query = query.filter(availability::Column::Id.is_in(held));
        }

        let rows = query.all(&*self.db).await.map_err(|e| {
            error!("Failed to query availabilities: {}", e);
            ServiceError::db_error(e)
        })?;
        let availabilities = Self::hydrate_availabilities(&*self.db, rows).await?;

        let batch_ids: Vec<Uuid> = availabilities.iter().filter_map(|a| a.batch_id).collect();
        let batches: HashMap<Uuid, Batch> = if batch_ids.is_empty() {
            HashMap::new()
        } else {
            batch::Entity::find()
                .filter(batch::Column::Id.is_in(batch_ids))
                .all(&*self.db)
                .await?
                .into_iter()
                .map(|row| (row.id, Batch::from(row)))
                .collect()
        };

        Ok(availabilities
            .into_iter()
            .filter_map(|availability| {
                let batch = availability
                    .batch_id
                    .and_then(|id| batches.get(&id).cloned());
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
        let batch_filter = match key.batch_id {
            Some(batch_id) => availability::Column::BatchId.eq(batch_id),
            None => availability::Column::BatchId.is_null(),
        };
        let row = availability::Entity::find()
            .filter(availability::Column::ProductId.eq(key.product_id))
            .filter(availability::Column::StockId.eq(key.stock_id))
            .filter(availability::Column::WarehouseId.eq(key.warehouse_id))
            .filter(batch_filter)
            .one(&*self.db)
            .await?;
        match row {
            Some(row) => Ok(Self::hydrate_availabilities(&*self.db, vec![row])
                .await?
                .pop()),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, availability), fields(availability_id = %availability.id))]
    async fn save_availability(&self, availability: &Availability) -> Result<(), ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        Self::write_availability(&txn, availability).await?;
        txn.commit().await.map_err(|e| {
            error!("Failed to commit availability {}: {}", availability.id, e);
            ServiceError::db_error(e)
        })
    }

    async fn delete_availability(&self, id: Uuid) -> Result<(), ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;
        availability_reserve::Entity::delete_many()
            .filter(availability_reserve::Column::AvailabilityId.eq(id))
            .exec(&txn)
            .await?;
        availability::Entity::delete_by_id(id).exec(&txn).await?;
        txn.commit().await.map_err(ServiceError::db_error)
    }

    async fn get_production_order(
        &self,
        id: Uuid,
    ) -> Result<Option<ProductionOrder>, ServiceError> {
        let Some(row) = production_order::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
        else {
            return Ok(None);
        };
        let status = ProductionOrderStatus::from_str(&row.status).map_err(|_| {
            ServiceError::InternalError(format!(
                "Production order {} has unknown status {}",
                row.id, row.status
            ))
        })?;
        let materials = Self::load_materials(&*self.db, row.id).await?;
        Ok(Some(ProductionOrder {
            id: row.id,
            code: row.code,
            status,
            warehouse_id: row.warehouse_id,
            production: Production {
                product_id: row.product_id,
                quantity: Quantity::new(row.quantity),
                materials,
            },
            updated_at: row.updated_at,
        }))
    }

    #[instrument(skip(self, order), fields(production_order_id = %order.id))]
    async fn save_production_order(&self, order: &ProductionOrder) -> Result<(), ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::db_error)?;

        let model = production_order::ActiveModel {
            id: Set(order.id),
            code: Set(order.code.clone()),
            status: Set(order.status.to_string()),
            warehouse_id: Set(order.warehouse_id),
            product_id: Set(order.production.product_id),
            quantity: Set(order.production.quantity.as_decimal()),
            updated_at: Set(order.updated_at),
        };
        if production_order::Entity::find_by_id(order.id)
            .one(&txn)
            .await?
            .is_some()
        {
            model.update(&txn).await?;
        } else {
            model.insert(&txn).await?;
        }

        // The materials ledger is rewritten wholesale.
        let stale: Vec<Uuid> = material::Entity::find()
            .filter(material::Column::ProductionOrderId.eq(order.id))
            .all(&txn)
            .await?
            .into_iter()
            .map(|row| row.id)
            .collect();
        if !stale.is_empty() {
            material_reserve::Entity::delete_many()
                .filter(material_reserve::Column::MaterialId.is_in(stale.clone()))
                .exec(&txn)
                .await?;
            material::Entity::delete_many()
                .filter(material::Column::Id.is_in(stale))
                .exec(&txn)
                .await?;
        }

        for (position, item) in order.materials().iter().enumerate() {
            let material_id = Uuid::new_v4();
            material::ActiveModel {
                id: Set(material_id),
                production_order_id: Set(order.id),
                position: Set(position as i32),
                product_id: Set(item.product_id),
                name: Set(item.name.clone()),
                quantity: Set(item.quantity.as_decimal()),
                total_reserved: Set(item.total_reserved.as_decimal()),
            }
            .insert(&txn)
            .await?;

            for (slot, reserve) in item.reserves.iter().enumerate() {
                material_reserve::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    material_id: Set(material_id),
                    position: Set(slot as i32),
                    stock_id: Set(reserve.location.stock_id),
                    warehouse_id: Set(reserve.location.warehouse_id),
                    batch_id: Set(reserve.location.batch_id),
                    quantity: Set(reserve.quantity.as_decimal()),
                }
                .insert(&txn)
                .await?;
            }
        }

        txn.commit().await.map_err(|e| {
            error!("Failed to commit production order {}: {}", order.id, e);
            ServiceError::db_error(e)
        })
    }

    async fn find_batch(
        &self,
        name: &str,
        product_id: Uuid,
    ) -> Result<Option<Batch>, ServiceError> {
        Ok(batch::Entity::find()
            .filter(batch::Column::Name.eq(name))
            .filter(batch::Column::ProductId.eq(product_id))
            .one(&*self.db)
            .await?
            .map(Batch::from))
    }

    async fn get_batch(&self, id: Uuid) -> Result<Option<Batch>, ServiceError> {
        Ok(batch::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .map(Batch::from))
    }

    async fn create_batch(&self, new: NewBatch) -> Result<Batch, ServiceError> {
        if self.find_batch(&new.name, new.product_id).await?.is_some() {
            return Err(ServiceError::Conflict(format!(
                "Batch {} already exists for product {}",
                new.name, new.product_id
            )));
        }
        let batch = Batch::from(new);
        batch::ActiveModel {
            id: Set(batch.id),
            name: Set(batch.name.clone()),
            product_id: Set(batch.product_id),
            price: Set(batch.price),
            expiration_day: Set(batch.expiration_day),
        }
        .insert(&*self.db)
        .await?;
        Ok(batch)
    }
}
