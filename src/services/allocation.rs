//! Pure pieces of the reservation pass: candidate ranking and the arithmetic
//! of a single allocation step.

use std::cmp::Ordering;

use crate::errors::ServiceError;
use crate::models::{AvailabilityCandidate, Material};
use crate::quantity::{from_standard_unit, Quantity};

/// Orders candidates largest lot first, then soonest expiry. Batches without
/// an expiration day sort after dated ones when `non_expiring_last` is set.
pub fn rank_candidates(
    mut candidates: Vec<AvailabilityCandidate>,
    non_expiring_last: bool,
) -> Vec<AvailabilityCandidate> {
    candidates.sort_by(|a, b| {
        b.availability
            .quantity
            .cmp(&a.availability.quantity)
            .then_with(|| {
                match (a.expiration_day(), b.expiration_day()) {
                    (Some(x), Some(y)) => x.cmp(&y),
                    (None, None) => Ordering::Equal,
                    (None, Some(_)) if non_expiring_last => Ordering::Greater,
                    (Some(_), None) if non_expiring_last => Ordering::Less,
                    (None, Some(_)) => Ordering::Less,
                    (Some(_), None) => Ordering::Greater,
                }
            })
    });
    candidates
}

/// How much to take from an availability with `free` capacity toward
/// `needed`. `None` when nothing can be taken.
pub fn allocation_amount(free: Quantity, needed: Quantity) -> Option<Quantity> {
    if !free.is_positive() || !needed.is_positive() {
        return None;
    }
    Some(free.min(needed))
}

/// Order-side quantity mirroring `allocated` standard units.
///
/// The allocation that completes a material snaps to the exact outstanding
/// quantity so that `total_reserved == quantity` holds despite rounding.
pub fn order_side_delta(
    material: &Material,
    allocated: Quantity,
    completes: bool,
    rate: rust_decimal::Decimal,
) -> Result<Quantity, ServiceError> {
    if completes {
        return Ok(material.outstanding());
    }
    Ok(from_standard_unit(allocated, rate)?.min(material.outstanding()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Availability, AvailabilityKey, Batch};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn candidate(quantity: i64, expires: Option<(i32, u32, u32)>) -> AvailabilityCandidate {
        let product_id = Uuid::new_v4();
        let batch = expires.map(|(y, m, d)| Batch {
            id: Uuid::new_v4(),
            name: format!("L-{}", quantity),
            product_id,
            price: dec!(1),
            expiration_day: NaiveDate::from_ymd_opt(y, m, d),
        });
        let key = AvailabilityKey {
            product_id,
            stock_id: Uuid::new_v4(),
            warehouse_id: Uuid::new_v4(),
            batch_id: batch.as_ref().map(|b| b.id),
        };
        AvailabilityCandidate {
            availability: Availability::new(key, Quantity::from_units(quantity), dec!(1)),
            batch,
        }
    }

    fn quantities(ranked: &[AvailabilityCandidate]) -> Vec<String> {
        ranked
            .iter()
            .map(|c| {
                format!(
                    "{}@{}",
                    c.availability.quantity,
                    c.expiration_day()
                        .map(|d| d.to_string())
                        .unwrap_or_else(|| "-".into())
                )
            })
            .collect()
    }

    #[test]
    fn largest_lot_first_then_soonest_expiry() {
        let ranked = rank_candidates(
            vec![
                candidate(5, Some((2025, 3, 1))),
                candidate(20, None),
                candidate(5, Some((2025, 1, 1))),
            ],
            true,
        );
        assert_eq!(
            quantities(&ranked),
            vec!["20.0000@-", "5.0000@2025-01-01", "5.0000@2025-03-01"]
        );
    }

    #[test]
    fn non_expiring_placement_follows_policy() {
        let ranked = rank_candidates(
            vec![candidate(5, None), candidate(5, Some((2025, 1, 1)))],
            true,
        );
        assert_eq!(quantities(&ranked), vec!["5.0000@2025-01-01", "5.0000@-"]);

        let ranked = rank_candidates(
            vec![candidate(5, Some((2025, 1, 1))), candidate(5, None)],
            false,
        );
        assert_eq!(quantities(&ranked), vec!["5.0000@-", "5.0000@2025-01-01"]);
    }

    #[test]
    fn allocation_amount_caps_at_free() {
        assert_eq!(
            allocation_amount(Quantity::from_units(10), Quantity::from_units(15)),
            Some(Quantity::from_units(10))
        );
        assert_eq!(
            allocation_amount(Quantity::from_units(100), Quantity::from_units(5)),
            Some(Quantity::from_units(5))
        );
        assert_eq!(
            allocation_amount(Quantity::ZERO, Quantity::from_units(5)),
            None
        );
        assert_eq!(
            allocation_amount(Quantity::from_units(-1), Quantity::from_units(5)),
            None
        );
    }

    #[test]
    fn completing_allocation_snaps_to_outstanding() {
        let material = Material::new(Uuid::new_v4(), "resin", Quantity::from_units(1));
        // 1 / 3 = 0.3333 standard units; 0.3333 * 3 = 0.9999 without snapping.
        let delta = order_side_delta(&material, Quantity::new(dec!(0.3333)), true, dec!(3)).unwrap();
        assert_eq!(delta, Quantity::from_units(1));

        let partial =
            order_side_delta(&material, Quantity::new(dec!(0.1)), false, dec!(3)).unwrap();
        assert_eq!(partial, Quantity::new(dec!(0.3)));
    }
}
