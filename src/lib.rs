//! Material Reservations Library
//!
//! Batch-aware reservation of production-order materials against
//! multi-warehouse inventory availabilities, plus the stock movements and
//! transfers that keep those reservations consistent.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod clock;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod locks;
pub mod metrics;
pub mod models;
pub mod quantity;
pub mod services;
pub mod store;

pub use errors::ServiceError;
pub use quantity::Quantity;
pub use services::{
    EngineContext, MovementService, ReservationService, ServiceContainer, ServiceFactory,
    TransferService,
};
pub use store::{DynStore, InMemoryStore, InventoryStore, InventoryStoreExt, SeaOrmStore};
