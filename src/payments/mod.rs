//! Payment gateway integration and the deferred-charge scheduler.

pub mod gateway;
pub mod orchestrator;
pub mod scheduler;

pub use gateway::{
    ChargeBehavior, GatewayRecord, GatewayStatus, HttpPaymentGateway, MockPaymentGateway,
    PaymentGateway,
};
pub use orchestrator::PaymentOrchestrator;
pub use scheduler::{DeferredChargeOutcome, DeferredChargeScheduler};
