//! Relational tables backing [`crate::store::SeaOrmStore`].

pub mod availability;
pub mod availability_reserve;
pub mod batch;
pub mod material;
pub mod material_reserve;
pub mod product;
pub mod production_order;
pub mod stock;
pub mod warehouse;
pub mod warehouse_stock;
