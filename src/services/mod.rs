//! The reservation engine's operations.
//!
//! Every service shares one [`EngineContext`]: the store, the lock registries
//! that serialize writers, the event channel, the clock and the engine policy.
//! Lock order is always production orders first, then availability keys.

use std::sync::Arc;
use uuid::Uuid;

use crate::clock::{DynClock, SystemClock};
use crate::config::EngineConfig;
use crate::errors::ServiceError;
use crate::events::EventSender;
use crate::locks::KeyedLocks;
use crate::models::AvailabilityKey;
use crate::store::DynStore;

pub mod allocation;
pub mod factory;
pub mod movements;
pub mod reservations;
pub mod stock_priority;
pub mod transfers;

pub use factory::{ServiceContainer, ServiceFactory};
pub use movements::MovementService;
pub use reservations::ReservationService;
pub use transfers::TransferService;

#[derive(Clone)]
pub struct EngineContext {
    pub store: DynStore,
    pub availability_locks: Arc<KeyedLocks<AvailabilityKey>>,
    pub order_locks: Arc<KeyedLocks<Uuid>>,
    pub events: EventSender,
    pub clock: DynClock,
    pub config: EngineConfig,
}

impl EngineContext {
    pub fn new(store: DynStore, events: EventSender) -> Self {
        Self {
            store,
            availability_locks: Arc::new(KeyedLocks::new()),
            order_locks: Arc::new(KeyedLocks::new()),
            events,
            clock: Arc::new(SystemClock),
            config: EngineConfig::default(),
        }
    }

    pub fn with_clock(mut self, clock: DynClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }
}

/// Runs a ledger check in debug builds only.
pub(crate) fn debug_check(check: Result<(), ServiceError>) -> Result<(), ServiceError> {
    if cfg!(debug_assertions) {
        check
    } else {
        Ok(())
    }
}
