use std::sync::Arc;

use crate::{
    events::EventSender,
    services::{EngineContext, MovementService, ReservationService, TransferService},
    store::DynStore,
};

/// Factory for creating service instances over one shared [`EngineContext`]
pub struct ServiceFactory {
    ctx: EngineContext,
}

impl ServiceFactory {
    /// Creates a new service factory with the given dependencies
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    /// Shorthand for a factory with the system clock and default engine policy
    pub fn from_parts(store: DynStore, event_sender: EventSender) -> Self {
        Self::new(EngineContext::new(store, event_sender))
    }

    /// Creates a reservation service instance
    pub fn reservation_service(&self) -> ReservationService {
        ReservationService::new(self.ctx.clone())
    }

    /// Creates a transfer service instance
    pub fn transfer_service(&self) -> TransferService {
        TransferService::new(self.ctx.clone())
    }

    /// Creates a movement service instance
    pub fn movement_service(&self) -> MovementService {
        MovementService::new(self.ctx.clone())
    }

    /// Creates all services as a tuple for convenience
    pub fn create_all(&self) -> (ReservationService, TransferService, MovementService) {
        (
            self.reservation_service(),
            self.transfer_service(),
            self.movement_service(),
        )
    }
}

/// Service container holding all service instances
#[derive(Clone)]
pub struct ServiceContainer {
    pub reservations: Arc<ReservationService>,
    pub transfers: Arc<TransferService>,
    pub movements: Arc<MovementService>,
}

impl ServiceContainer {
    /// Creates a new service container with all services initialized
    pub fn new(factory: &ServiceFactory) -> Self {
        let (reservations, transfers, movements) = factory.create_all();

        Self {
            reservations: Arc::new(reservations),
            transfers: Arc::new(transfers),
            movements: Arc::new(movements),
        }
    }
}
