//! Resolves the order in which a warehouse's stocks are probed.

use std::collections::HashSet;
use tracing::warn;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::store::InventoryStore;

/// Stocks of `warehouse_id` in allocation order. Fails with `NotFound` when
/// the warehouse has no priority list configured.
pub async fn resolve_stock_order(
    store: &dyn InventoryStore,
    warehouse_id: Uuid,
) -> Result<Vec<Uuid>, ServiceError> {
    let priority = store
        .get_stocks_priority(warehouse_id)
        .await?
        .ok_or_else(|| ServiceError::not_found("Stocks priority for warehouse", warehouse_id))?;

    let ordered = dedup_preserving_order(&priority.stocks);
    if ordered.len() != priority.stocks.len() {
        warn!(%warehouse_id, "Stocks priority lists a stock more than once");
    }
    Ok(ordered)
}

/// Keeps the first occurrence of every stock.
pub fn dedup_preserving_order(stocks: &[Uuid]) -> Vec<Uuid> {
    let mut seen = HashSet::with_capacity(stocks.len());
    stocks
        .iter()
        .copied()
        .filter(|stock| seen.insert(*stock))
        .collect()
}
