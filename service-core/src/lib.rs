//! service-core: Shared infrastructure for the device certificate services.
pub mod config;
pub mod error;
pub mod middleware;
pub mod observability;
pub mod retry;
