//! Domain records the engine reads and mutates.
//!
//! These are storage-agnostic; `crate::entities` holds the relational mapping
//! used by [`crate::store::SeaOrmStore`].

pub mod availability;
pub mod batch;
pub mod location;
pub mod product;
pub mod production_order;

pub use availability::{
    Availability, AvailabilityCandidate, AvailabilityFilter, AvailabilityKey, ReserveEntry,
};
pub use batch::{Batch, NewBatch};
pub use location::{Stock, StockLocation, StocksPriority, Warehouse};
pub use product::{InventoryInfo, Product};
pub use production_order::{
    derive_status, Material, MaterialReserve, Production, ProductionOrder, ProductionOrderStatus,
};
