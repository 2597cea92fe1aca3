use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A named physical sub-location.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stock {
    pub id: Uuid,
    pub name: String,
}

impl Stock {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warehouse {
    pub id: Uuid,
    pub name: String,
    /// Stocks assigned to this warehouse.
    pub stocks: Vec<Uuid>,
}

impl Warehouse {
    pub fn new(name: impl Into<String>, stocks: Vec<Uuid>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            stocks,
        }
    }

    pub fn has_stock(&self, stock_id: Uuid) -> bool {
        self.stocks.contains(&stock_id)
    }
}

/// Warehouse-configured allocation order; earlier stocks are probed first.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StocksPriority {
    pub warehouse_id: Uuid,
    pub stocks: Vec<Uuid>,
}

/// Where a quantity physically sits, independent of the product.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StockLocation {
    pub stock_id: Uuid,
    pub warehouse_id: Uuid,
    pub batch_id: Option<Uuid>,
}

impl StockLocation {
    pub fn new(stock_id: Uuid, warehouse_id: Uuid, batch_id: Option<Uuid>) -> Self {
        Self {
            stock_id,
            warehouse_id,
            batch_id,
        }
    }
}
