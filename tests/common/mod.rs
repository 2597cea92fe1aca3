#![allow(dead_code)]

use std::sync::Arc;

use chrono::NaiveDate;
use material_reservations::{
    clock::FixedClock,
    config::EngineConfig,
    events::{Event, EventSender},
    models::{
        Availability, AvailabilityKey, Batch, Material, NewBatch, Product, ProductionOrder,
        Stock, StockLocation, Warehouse,
    },
    quantity::Quantity,
    services::{EngineContext, ServiceContainer, ServiceFactory},
    store::InMemoryStore,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Day every harness clock reports.
pub fn today() -> NaiveDate {
    day(2024, 6, 1)
}

pub fn day(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

pub fn qty(value: &str) -> Quantity {
    value.parse().unwrap()
}

pub const PRICE: Decimal = dec!(2.50);

/// Engine over an in-memory store with one warehouse whose stocks are
/// prioritized in creation order.
pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub services: ServiceContainer,
    pub events: mpsc::Receiver<Event>,
    pub warehouse_id: Uuid,
    pub stocks: Vec<Uuid>,
}

impl Harness {
    pub fn new(stock_count: usize) -> Self {
        Self::with_config(stock_count, EngineConfig::default())
    }

    pub fn with_config(stock_count: usize, config: EngineConfig) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let stocks: Vec<Uuid> = (0..stock_count)
            .map(|i| store.insert_stock(Stock::new(format!("S{}", i + 1))))
            .collect();
        let warehouse_id = store.insert_warehouse(Warehouse::new("main", stocks.clone()));
        store.set_stocks_priority(warehouse_id, stocks.clone());

        let (sender, events) = EventSender::channel(1024);
        let ctx = EngineContext::new(store.clone(), sender)
            .with_clock(Arc::new(FixedClock(today())))
            .with_config(config);
        let services = ServiceContainer::new(&ServiceFactory::new(ctx));

        Self {
            store,
            services,
            events,
            warehouse_id,
            stocks,
        }
    }

    pub fn stock(&self, index: usize) -> Uuid {
        self.stocks[index]
    }

    pub fn location(&self, stock_index: usize, batch_id: Option<Uuid>) -> StockLocation {
        StockLocation::new(self.stock(stock_index), self.warehouse_id, batch_id)
    }

    pub fn add_product(&self, product: Product) -> Uuid {
        self.store.insert_product(product)
    }

    pub fn add_batch(&self, product_id: Uuid, name: &str, expiration_day: Option<NaiveDate>) -> Batch {
        let batch: Batch = NewBatch {
            name: name.to_string(),
            product_id,
            price: PRICE,
            expiration_day,
        }
        .into();
        self.store.insert_batch(batch.clone());
        batch
    }

    /// Seeds an availability directly, bypassing the movement service.
    pub fn add_availability(
        &self,
        product_id: Uuid,
        stock_index: usize,
        batch_id: Option<Uuid>,
        quantity: &str,
    ) -> Uuid {
        let key = AvailabilityKey::new(product_id, self.location(stock_index, batch_id));
        self.store
            .insert_availability(Availability::new(key, qty(quantity), PRICE))
    }

    pub fn add_order(&self, materials: &[(Uuid, &str)]) -> Uuid {
        let materials = materials
            .iter()
            .map(|(product_id, quantity)| Material::new(*product_id, "material", qty(quantity)))
            .collect();
        self.store.insert_production_order(ProductionOrder::new(
            format!("PO-{}", Uuid::new_v4().simple()),
            self.warehouse_id,
            Uuid::new_v4(),
            Quantity::from_units(1),
            materials,
        ))
    }

    pub fn availability(&self, id: Uuid) -> Option<Availability> {
        self.store.availability(id)
    }

    pub fn order(&self, id: Uuid) -> ProductionOrder {
        self.store.production_order(id).unwrap()
    }

    /// Asserts the per-row ledger of every availability and every stored order.
    pub fn assert_ledgers(&self, orders: &[Uuid]) {
        for availability in self.store.all_availabilities() {
            availability.check_invariants().unwrap();
        }
        for id in orders {
            self.order(*id).check_ledger().unwrap();
        }
    }

    /// Sum of what availabilities hold for `order_id`, in standard units.
    pub fn reserved_on_availabilities(&self, order_id: Uuid) -> Quantity {
        self.store
            .all_availabilities()
            .iter()
            .map(|availability| availability.reserved_by(order_id))
            .sum()
    }

    pub fn drain_events(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}
