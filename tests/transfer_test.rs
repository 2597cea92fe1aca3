mod common;

use assert_matches::assert_matches;
use common::{qty, Harness};
use material_reservations::{
    config::EngineConfig,
    errors::ServiceError,
    models::{AvailabilityKey, Product},
    quantity::Quantity,
    services::{movements::ExitCommand, transfers::TransferRequest},
};
use rust_decimal_macros::dec;
use uuid::Uuid;

fn request(harness: &Harness, product_id: Uuid, from: usize, to: usize, quantity: &str) -> TransferRequest {
    TransferRequest {
        quantity: qty(quantity),
        product_id,
        stock_out: harness.stock(from),
        stock_in: harness.stock(to),
        warehouse_out: harness.warehouse_id,
        warehouse_in: harness.warehouse_id,
        batch_id: None,
    }
}

/// Stock 0 is the only one holding product; stock 1 is the transfer target.
fn seeded(on_hand: &str) -> (Harness, Uuid, Uuid) {
    let harness = Harness::new(2);
    let product = harness.add_product(Product::new("resin"));
    let availability_id = harness.add_availability(product, 0, None, on_hand);
    (harness, product, availability_id)
}

#[tokio::test]
async fn draining_transfer_moves_the_row_and_repoints_reservations() {
    let (harness, product, source_id) = seeded("10");
    let order_id = harness.add_order(&[(product, "6")]);
    harness.services.reservations.reserve(order_id).await.unwrap();

    let outcome = harness
        .services
        .transfers
        .transfer(request(&harness, product, 0, 1, "10"))
        .await
        .unwrap();

    assert!(outcome.source.is_none());
    assert!(harness.availability(source_id).is_none());
    assert_eq!(outcome.moved_reservations, 1);
    assert_eq!(outcome.updated_orders, vec![order_id]);

    let destination = harness.availability(outcome.destination.id).unwrap();
    assert_eq!(destination.quantity, qty("10"));
    assert_eq!(destination.total_reserved, qty("6"));
    assert_eq!(destination.reserved_by(order_id), qty("6"));
    assert_eq!(destination.price, common::PRICE);

    let order = harness.order(order_id);
    let material = &order.materials()[0];
    assert_eq!(material.total_reserved, qty("6"));
    assert!(material.reserve_at(&harness.location(0, None)).is_none());
    assert_eq!(
        material.reserve_at(&harness.location(1, None)).unwrap().quantity,
        qty("6")
    );
    harness.assert_ledgers(&[order_id]);
}

#[tokio::test]
async fn partial_transfer_splits_the_last_reservation_it_touches() {
    let (harness, product, source_id) = seeded("10");
    let first = harness.add_order(&[(product, "4")]);
    let second = harness.add_order(&[(product, "4")]);
    harness.services.reservations.reserve(first).await.unwrap();
    harness.services.reservations.reserve(second).await.unwrap();

    let outcome = harness
        .services
        .transfers
        .transfer(request(&harness, product, 0, 1, "6"))
        .await
        .unwrap();

    assert_eq!(outcome.moved_reservations, 2);
    let source = harness.availability(source_id).unwrap();
    assert_eq!(source.quantity, qty("4"));
    assert_eq!(source.total_reserved, qty("2"));
    assert_eq!(source.reserved_by(first), Quantity::ZERO);
    assert_eq!(source.reserved_by(second), qty("2"));

    let destination = harness.availability(outcome.destination.id).unwrap();
    assert_eq!(destination.quantity, qty("6"));
    assert_eq!(destination.reserved_by(first), qty("4"));
    assert_eq!(destination.reserved_by(second), qty("2"));

    let split = harness.order(second);
    let material = &split.materials()[0];
    assert_eq!(material.total_reserved, qty("4"));
    assert_eq!(
        material.reserve_at(&harness.location(0, None)).unwrap().quantity,
        qty("2")
    );
    assert_eq!(
        material.reserve_at(&harness.location(1, None)).unwrap().quantity,
        qty("2")
    );
    harness.assert_ledgers(&[first, second]);
}

#[tokio::test]
async fn transfer_conserves_quantity_and_per_order_reservations() {
    let (harness, product, source_id) = seeded("12");
    harness.add_availability(product, 1, None, "3");
    let order_id = harness.add_order(&[(product, "9")]);
    harness.services.reservations.reserve(order_id).await.unwrap();
    let reserved_before = harness.reserved_on_availabilities(order_id);
    let on_hand_before: Quantity = harness
        .store
        .all_availabilities()
        .iter()
        .map(|a| a.quantity)
        .sum();

    harness
        .services
        .transfers
        .transfer(request(&harness, product, 0, 1, "5"))
        .await
        .unwrap();

    let on_hand_after: Quantity = harness
        .store
        .all_availabilities()
        .iter()
        .map(|a| a.quantity)
        .sum();
    assert_eq!(on_hand_after, on_hand_before);
    assert_eq!(harness.reserved_on_availabilities(order_id), reserved_before);
    assert_eq!(
        harness.order(order_id).materials()[0].total_reserved,
        reserved_before
    );
    assert_eq!(harness.availability(source_id).unwrap().quantity, qty("7"));
    harness.assert_ledgers(&[order_id]);
}

#[tokio::test]
async fn transfer_with_conversion_rate_mirrors_in_order_units() {
    let harness = Harness::new(2);
    let product = harness.add_product(Product::new("fiber").with_conversion_rate(dec!(3)));
    harness.add_availability(product, 0, None, "10");
    let order_id = harness.add_order(&[(product, "9")]);
    harness.services.reservations.reserve(order_id).await.unwrap();

    harness
        .services
        .transfers
        .transfer(request(&harness, product, 0, 1, "2"))
        .await
        .unwrap();

    let order = harness.order(order_id);
    let material = &order.materials()[0];
    assert_eq!(material.total_reserved, qty("9"));
    assert_eq!(
        material.reserve_at(&harness.location(0, None)).unwrap().quantity,
        qty("3")
    );
    assert_eq!(
        material.reserve_at(&harness.location(1, None)).unwrap().quantity,
        qty("6")
    );
    harness.assert_ledgers(&[order_id]);
}

#[tokio::test]
async fn transfer_more_than_on_hand_fails_without_changes() {
    let (harness, product, source_id) = seeded("10");
    let before = harness.availability(source_id).unwrap();

    let result = harness
        .services
        .transfers
        .transfer(request(&harness, product, 0, 1, "11"))
        .await;

    assert_matches!(
        result,
        Err(ServiceError::InsufficientStock { requested, available, .. })
            if requested == qty("11") && available == qty("10")
    );
    assert_eq!(harness.availability(source_id).unwrap(), before);
    let destination_key = AvailabilityKey::new(product, harness.location(1, None));
    assert!(harness
        .store
        .all_availabilities()
        .iter()
        .all(|a| a.key() != destination_key));
}

#[tokio::test]
async fn transfer_rejects_invalid_requests() {
    let (harness, product, _) = seeded("10");

    let same = harness
        .services
        .transfers
        .transfer(request(&harness, product, 0, 0, "1"))
        .await;
    assert_matches!(same, Err(ServiceError::ValidationError(_)));

    let zero = harness
        .services
        .transfers
        .transfer(request(&harness, product, 0, 1, "0"))
        .await;
    assert_matches!(zero, Err(ServiceError::ValidationError(_)));

    let mut foreign = request(&harness, product, 0, 1, "1");
    foreign.stock_in = Uuid::new_v4();
    assert_matches!(
        harness.services.transfers.transfer(foreign).await,
        Err(ServiceError::NotFound(_))
    );

    let mut batched = request(&harness, product, 0, 1, "1");
    batched.batch_id = Some(Uuid::new_v4());
    assert_matches!(
        harness.services.transfers.transfer(batched).await,
        Err(ServiceError::ValidationError(_))
    );
}

#[tokio::test]
async fn batch_managed_transfer_keeps_the_batch() {
    let harness = Harness::new(2);
    let product = harness.add_product(Product::new("pigment").with_batches(None));
    let batch = harness.add_batch(product, "LOT-9", None);
    harness.add_availability(product, 0, Some(batch.id), "8");

    let mut missing_batch = request(&harness, product, 0, 1, "3");
    assert_matches!(
        harness.services.transfers.transfer(missing_batch.clone()).await,
        Err(ServiceError::ValidationError(_))
    );

    missing_batch.batch_id = Some(batch.id);
    let outcome = harness
        .services
        .transfers
        .transfer(missing_batch)
        .await
        .unwrap();
    assert_eq!(outcome.destination.batch_id, Some(batch.id));
    assert_eq!(outcome.source.unwrap().quantity, qty("5"));
}

#[tokio::test]
async fn full_transfer_repoints_every_material_of_the_product() {
    let (harness, product, source_id) = seeded("10");
    let order_id = harness.add_order(&[(product, "3"), (product, "4")]);
    harness.services.reservations.reserve(order_id).await.unwrap();

    harness
        .services
        .transfers
        .transfer(request(&harness, product, 0, 1, "10"))
        .await
        .unwrap();

    assert!(harness.availability(source_id).is_none());
    let (from, to) = (harness.location(0, None), harness.location(1, None));
    let order = harness.order(order_id);
    for (material, expected) in order.materials().iter().zip(["3", "4"]) {
        assert_eq!(material.total_reserved, qty(expected));
        assert!(material.reserve_at(&from).is_none());
        assert_eq!(material.reserve_at(&to).unwrap().quantity, qty(expected));
    }
    assert_eq!(harness.reserved_on_availabilities(order_id), qty("7"));
    harness.assert_ledgers(&[order_id]);
}

#[tokio::test]
async fn partial_transfer_spreads_over_materials_in_ledger_order() {
    let (harness, product, source_id) = seeded("10");
    let order_id = harness.add_order(&[(product, "3"), (product, "4")]);
    harness.services.reservations.reserve(order_id).await.unwrap();

    let outcome = harness
        .services
        .transfers
        .transfer(request(&harness, product, 0, 1, "5"))
        .await
        .unwrap();

    let source = harness.availability(source_id).unwrap();
    assert_eq!(source.reserved_by(order_id), qty("2"));
    assert_eq!(outcome.destination.reserved_by(order_id), qty("5"));

    let (from, to) = (harness.location(0, None), harness.location(1, None));
    let order = harness.order(order_id);
    let (first, second) = (&order.materials()[0], &order.materials()[1]);
    assert!(first.reserve_at(&from).is_none());
    assert_eq!(first.reserve_at(&to).unwrap().quantity, qty("3"));
    assert_eq!(second.reserve_at(&from).unwrap().quantity, qty("2"));
    assert_eq!(second.reserve_at(&to).unwrap().quantity, qty("2"));
    harness.assert_ledgers(&[order_id]);
}

#[tokio::test]
async fn drained_source_survives_while_it_still_holds_reservations() {
    let harness = Harness::with_config(
        2,
        EngineConfig {
            allow_exit_below_reserved: true,
            ..EngineConfig::default()
        },
    );
    let product = harness.add_product(Product::new("resin"));
    let source_id = harness.add_availability(product, 0, None, "10");
    let order_id = harness.add_order(&[(product, "6")]);
    harness.services.reservations.reserve(order_id).await.unwrap();
    harness
        .services
        .movements
        .exit(ExitCommand {
            product_id: product,
            stock_id: harness.stock(0),
            warehouse_id: harness.warehouse_id,
            quantity: qty("8"),
            batch: None,
        })
        .await
        .unwrap();

    let outcome = harness
        .services
        .transfers
        .transfer(request(&harness, product, 0, 1, "2"))
        .await
        .unwrap();

    let source = outcome.source.expect("source keeps its reservations");
    assert!(source.quantity.is_zero());
    assert_eq!(source.total_reserved, qty("4"));
    assert_eq!(harness.availability(source_id).unwrap(), source);
    assert_eq!(outcome.destination.reserved_by(order_id), qty("2"));
    assert_eq!(harness.reserved_on_availabilities(order_id), qty("6"));

    let order = harness.order(order_id);
    let material = &order.materials()[0];
    assert_eq!(material.total_reserved, qty("6"));
    assert_eq!(material.reserve_at(&harness.location(0, None)).unwrap().quantity, qty("4"));
    assert_eq!(material.reserve_at(&harness.location(1, None)).unwrap().quantity, qty("2"));
}
