/*!
 * # Metrics Module
 *
 * Prometheus counters for the reservation engine. All counters are registered
 * in a crate-level [`Registry`] and rendered in the text exposition format by
 * [`gather_text`].
 */

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use tracing::warn;

use crate::errors::ServiceError;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref RESERVATION_PASSES: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "reservation_passes_total",
            "Reservation passes by resulting order status"
        ),
        &["status"]
    )
    .expect("metric can be created");
    pub static ref RESERVED_MATERIALS: IntCounter = IntCounter::new(
        "reserved_materials_total",
        "Materials that received at least one allocation"
    )
    .expect("metric can be created");
    pub static ref RESERVATION_RELEASES: IntCounter = IntCounter::new(
        "reservation_releases_total",
        "Production orders whose reservations were released"
    )
    .expect("metric can be created");
    pub static ref STOCK_TRANSFERS: IntCounter =
        IntCounter::new("stock_transfers_total", "Completed stock transfers")
            .expect("metric can be created");
    pub static ref STOCK_MOVEMENTS: IntCounterVec = IntCounterVec::new(
        Opts::new("stock_movements_total", "Entrances and exits applied"),
        &["kind"]
    )
    .expect("metric can be created");
    pub static ref AVAILABILITIES_DEPLETED: IntCounter = IntCounter::new(
        "availabilities_depleted_total",
        "Availability rows deleted after draining to zero"
    )
    .expect("metric can be created");
    pub static ref ENGINE_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new("engine_failures_total", "Failed engine operations"),
        &["operation", "error_type"]
    )
    .expect("metric can be created");
}

/// Registers every counter with [`REGISTRY`]. Safe to call more than once.
pub fn register_metrics() {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(RESERVATION_PASSES.clone()),
        Box::new(RESERVED_MATERIALS.clone()),
        Box::new(RESERVATION_RELEASES.clone()),
        Box::new(STOCK_TRANSFERS.clone()),
        Box::new(STOCK_MOVEMENTS.clone()),
        Box::new(AVAILABILITIES_DEPLETED.clone()),
        Box::new(ENGINE_FAILURES.clone()),
    ];
    for collector in collectors {
        match REGISTRY.register(collector) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => warn!("Failed to register metric: {}", e),
        }
    }
}

/// Records a failed operation under its error kind.
pub fn record_failure(operation: &str, error: &ServiceError) {
    ENGINE_FAILURES
        .with_label_values(&[operation, error.kind()])
        .inc();
}

/// Renders all registered metrics in the Prometheus text format.
pub fn gather_text() -> Result<String, ServiceError> {
    register_metrics();
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&REGISTRY.gather(), &mut buffer)
        .map_err(|e| ServiceError::InternalError(format!("Failed to encode metrics: {}", e)))?;
    String::from_utf8(buffer)
        .map_err(|e| ServiceError::InternalError(format!("Metrics are not UTF-8: {}", e)))
}
