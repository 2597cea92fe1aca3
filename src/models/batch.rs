use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A production lot of a batch-managed product.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub id: Uuid,
    pub name: String,
    pub product_id: Uuid,
    pub price: Decimal,
    pub expiration_day: Option<NaiveDate>,
}

impl Batch {
    /// A batch without an expiration day never expires; otherwise it is usable
    /// through its expiration day inclusive.
    pub fn is_usable_on(&self, today: NaiveDate) -> bool {
        self.expiration_day.map_or(true, |day| day >= today)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewBatch {
    pub name: String,
    pub product_id: Uuid,
    pub price: Decimal,
    pub expiration_day: Option<NaiveDate>,
}

impl From<NewBatch> for Batch {
    fn from(new: NewBatch) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: new.name,
            product_id: new.product_id,
            price: new.price,
            expiration_day: new.expiration_day,
        }
    }
}
