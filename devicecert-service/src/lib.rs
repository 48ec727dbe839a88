pub mod certificate;
pub mod config;
pub mod enrollment;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod middleware;
pub mod platform;
pub mod policy;
pub mod services;
pub mod startup;

pub use startup::{build_router, AppState, Application};
