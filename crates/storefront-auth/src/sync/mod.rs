//! Backend session sync.
//!
//! Exchanges provider tokens and session cookies for backend accounts, with
//! at most one request in flight per credential.

mod service;
mod single_flight;

pub use service::SessionSync;
pub use single_flight::SingleFlight;
