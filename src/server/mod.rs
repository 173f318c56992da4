//! Session orchestration
//!
//! - [`SessionOrchestrator`]: offer handling, observer binding, shutdown
//! - [`OrchestratorConfig`]: tunables
//! - [`OfferRequest`]: the payload that starts a session

pub mod config;
pub(crate) mod connection;
pub mod orchestrator;
pub mod request;

pub use config::OrchestratorConfig;
pub use orchestrator::SessionOrchestrator;
pub use request::OfferRequest;
