mod common;

use assert_matches::assert_matches;
use common::{day, qty, Harness};
use material_reservations::{
    errors::ServiceError,
    events::Event,
    models::{Product, ProductionOrderStatus},
};
use rust_decimal_macros::dec;

#[tokio::test]
async fn allocation_walks_stock_priority_and_spills_over() {
    let harness = Harness::new(2);
    let product = harness.add_product(Product::new("resin").with_batches(Some(365)));
    let soon = harness.add_batch(product, "LOT-A", Some(day(2025, 1, 1)));
    let later = harness.add_batch(product, "LOT-B", Some(day(2026, 1, 1)));
    let a1 = harness.add_availability(product, 0, Some(soon.id), "10");
    let a2 = harness.add_availability(product, 1, Some(later.id), "100");
    let order_id = harness.add_order(&[(product, "15")]);

    let outcome = harness.services.reservations.reserve(order_id).await.unwrap();

    assert_eq!(outcome.reserved_items, 1);
    assert_eq!(outcome.completed_items, 1);
    assert_eq!(outcome.status, ProductionOrderStatus::Booked);

    assert_eq!(harness.availability(a1).unwrap().total_reserved, qty("10"));
    assert_eq!(harness.availability(a2).unwrap().total_reserved, qty("5"));

    let order = harness.order(order_id);
    let material = &order.materials()[0];
    assert_eq!(material.total_reserved, qty("15"));
    assert!(material.is_complete());
    assert_eq!(material.reserves.len(), 2);
    assert_eq!(
        material.reserve_at(&harness.location(0, Some(soon.id))).unwrap().quantity,
        qty("10")
    );
    harness.assert_ledgers(&[order_id]);
}

#[tokio::test]
async fn larger_lots_are_taken_first_within_a_stock() {
    let harness = Harness::new(1);
    let product = harness.add_product(Product::new("pigment").with_batches(None));
    let small = harness.add_batch(product, "SMALL", None);
    let large = harness.add_batch(product, "LARGE", None);
    let small_id = harness.add_availability(product, 0, Some(small.id), "4");
    let large_id = harness.add_availability(product, 0, Some(large.id), "40");
    let order_id = harness.add_order(&[(product, "6")]);

    harness.services.reservations.reserve(order_id).await.unwrap();

    assert_eq!(harness.availability(large_id).unwrap().total_reserved, qty("6"));
    assert!(harness.availability(small_id).unwrap().total_reserved.is_zero());
}

#[tokio::test]
async fn partial_booking_counts_reserved_and_completed_items() {
    let harness = Harness::new(1);
    let plenty = harness.add_product(Product::new("resin"));
    let scarce = harness.add_product(Product::new("hardener"));
    harness.add_availability(plenty, 0, None, "10");
    harness.add_availability(scarce, 0, None, "8");
    let order_id = harness.add_order(&[(plenty, "5"), (scarce, "20")]);

    let outcome = harness.services.reservations.reserve(order_id).await.unwrap();

    assert_eq!(outcome.status, ProductionOrderStatus::PartialBooked);
    assert_eq!(outcome.reserved_items, 2);
    assert_eq!(outcome.completed_items, 1);
    let order = harness.order(order_id);
    assert_eq!(order.materials()[1].total_reserved, qty("8"));
    assert_eq!(order.materials()[1].outstanding(), qty("12"));

    // Nothing new to allocate; the order keeps its partial status.
    let again = harness.services.reservations.reserve(order_id).await.unwrap();
    assert_eq!(again.reserved_items, 0);
    assert_eq!(again.completed_items, 1);
    assert_eq!(again.status, ProductionOrderStatus::PartialBooked);
    harness.assert_ledgers(&[order_id]);
}

#[tokio::test]
async fn open_order_without_any_stock_stays_open() {
    let harness = Harness::new(1);
    let product = harness.add_product(Product::new("resin"));
    let order_id = harness.add_order(&[(product, "5")]);

    let outcome = harness.services.reservations.reserve(order_id).await.unwrap();

    assert_eq!(outcome.reserved_items, 0);
    assert_eq!(outcome.status, ProductionOrderStatus::Open);
}

#[tokio::test]
async fn expired_batches_are_not_reserved() {
    let harness = Harness::new(1);
    let product = harness.add_product(Product::new("serum").with_batches(Some(90)));
    let expired = harness.add_batch(product, "OLD", Some(day(2024, 1, 1)));
    let today = harness.add_batch(product, "EDGE", Some(common::today()));
    let expired_id = harness.add_availability(product, 0, Some(expired.id), "50");
    let edge_id = harness.add_availability(product, 0, Some(today.id), "5");
    let order_id = harness.add_order(&[(product, "10")]);

    let outcome = harness.services.reservations.reserve(order_id).await.unwrap();

    assert_eq!(outcome.status, ProductionOrderStatus::PartialBooked);
    assert!(harness.availability(expired_id).unwrap().total_reserved.is_zero());
    assert_eq!(harness.availability(edge_id).unwrap().total_reserved, qty("5"));
}

#[tokio::test]
async fn conversion_rate_snaps_the_completing_allocation() {
    let harness = Harness::new(1);
    let product =
        harness.add_product(Product::new("fiber").with_conversion_rate(dec!(3)));
    let availability_id = harness.add_availability(product, 0, None, "100");
    let order_id = harness.add_order(&[(product, "10")]);

    let outcome = harness.services.reservations.reserve(order_id).await.unwrap();

    assert_eq!(outcome.status, ProductionOrderStatus::Booked);
    assert_eq!(
        harness.availability(availability_id).unwrap().total_reserved,
        qty("3.3333")
    );
    let order = harness.order(order_id);
    assert_eq!(order.materials()[0].total_reserved, qty("10"));
    assert!(order.materials()[0].is_complete());
    harness.assert_ledgers(&[order_id]);
}

#[tokio::test]
async fn reserve_rejects_orders_past_booking() {
    let harness = Harness::new(1);
    let product = harness.add_product(Product::new("resin"));
    let availability_id = harness.add_availability(product, 0, None, "10");
    let order_id = harness.add_order(&[(product, "5")]);

    for status in [
        ProductionOrderStatus::Booked,
        ProductionOrderStatus::InProgress,
        ProductionOrderStatus::Closed,
        ProductionOrderStatus::Cancelled,
    ] {
        let mut order = harness.order(order_id);
        order.status = status;
        harness.store.insert_production_order(order);

        let result = harness.services.reservations.reserve(order_id).await;
        assert_matches!(result, Err(ServiceError::InvalidStatus(_)));
    }
    assert!(harness
        .availability(availability_id)
        .unwrap()
        .total_reserved
        .is_zero());
}

#[tokio::test]
async fn reserve_requires_a_stocks_priority() {
    let harness = Harness::new(1);
    let product = harness.add_product(Product::new("resin"));
    let mut order = harness.order(harness.add_order(&[(product, "5")]));
    order.warehouse_id = uuid::Uuid::new_v4();
    let order_id = harness.store.insert_production_order(order);

    let result = harness.services.reservations.reserve(order_id).await;

    assert_matches!(result, Err(ServiceError::NotFound(_)));
}

#[tokio::test]
async fn unknown_order_is_not_found() {
    let harness = Harness::new(1);
    let result = harness
        .services
        .reservations
        .reserve(uuid::Uuid::new_v4())
        .await;
    assert_matches!(result, Err(ServiceError::NotFound(_)));
}

#[tokio::test]
async fn unreserve_releases_everything_and_is_idempotent() {
    let harness = Harness::new(2);
    let product = harness.add_product(Product::new("resin"));
    harness.add_availability(product, 0, None, "4");
    harness.add_availability(product, 1, None, "20");
    let order_id = harness.add_order(&[(product, "10")]);
    let other_id = harness.add_order(&[(product, "3")]);

    harness.services.reservations.reserve(order_id).await.unwrap();
    harness.services.reservations.reserve(other_id).await.unwrap();

    let first = harness.services.reservations.unreserve(order_id).await.unwrap();
    assert_eq!(first.released_entries, 2);
    assert_eq!(first.order.status, ProductionOrderStatus::Open);
    assert!(first.order.materials()[0].reserves.is_empty());
    assert!(harness.reserved_on_availabilities(order_id).is_zero());
    assert_eq!(harness.reserved_on_availabilities(other_id), qty("3"));

    let availabilities = {
        let mut rows = harness.store.all_availabilities();
        rows.sort_by_key(|row| row.id);
        rows
    };
    let second = harness.services.reservations.unreserve(order_id).await.unwrap();
    assert_eq!(second.released_entries, 0);
    assert_eq!(second.order.materials(), first.order.materials());
    assert_eq!(second.order.status, first.order.status);

    let mut after = harness.store.all_availabilities();
    after.sort_by_key(|row| row.id);
    assert_eq!(after, availabilities);
    harness.assert_ledgers(&[order_id, other_id]);
}

#[tokio::test]
async fn reservation_pass_publishes_an_event() {
    let mut harness = Harness::new(1);
    let product = harness.add_product(Product::new("resin"));
    harness.add_availability(product, 0, None, "10");
    let order_id = harness.add_order(&[(product, "5")]);

    harness.services.reservations.reserve(order_id).await.unwrap();

    let events = harness.drain_events();
    assert_matches!(
        events.as_slice(),
        [Event::MaterialsReserved { production_order_id, reserved_items: 1, completed_items: 1, status: ProductionOrderStatus::Booked }]
            if *production_order_id == order_id
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_orders_never_overcommit_an_availability() {
    let harness = Harness::new(1);
    let product = harness.add_product(Product::new("resin"));
    let availability_id = harness.add_availability(product, 0, None, "10");
    let orders: Vec<_> = (0..4)
        .map(|_| harness.add_order(&[(product, "7")]))
        .collect();

    let tasks: Vec<_> = orders
        .iter()
        .map(|order_id| {
            let service = harness.services.reservations.clone();
            let order_id = *order_id;
            tokio::spawn(async move { service.reserve(order_id).await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let availability = harness.availability(availability_id).unwrap();
    assert_eq!(availability.total_reserved, qty("10"));
    let booked: material_reservations::quantity::Quantity = orders
        .iter()
        .map(|id| harness.order(*id).materials()[0].total_reserved)
        .sum();
    assert_eq!(booked, qty("10"));
    harness.assert_ledgers(&orders);
}

#[tokio::test]
async fn shortages_report_outstanding_and_free_stock() {
    let harness = Harness::new(2);
    let product = harness.add_product(Product::new("fiber").with_conversion_rate(dec!(2)));
    harness.add_availability(product, 0, None, "3");
    let order_id = harness.add_order(&[(product, "10")]);
    harness.services.reservations.reserve(order_id).await.unwrap();

    // A later entrance the order has not picked up yet.
    harness.add_availability(product, 1, None, "1.5");
    let shortages = harness
        .services
        .reservations
        .shortages(order_id)
        .await
        .unwrap();

    assert_eq!(shortages.len(), 1);
    let shortage = &shortages[0];
    assert_eq!(shortage.required, qty("10"));
    assert_eq!(shortage.reserved, qty("6"));
    assert_eq!(shortage.outstanding, qty("4"));
    assert_eq!(shortage.free_in_warehouse, qty("3"));
}
