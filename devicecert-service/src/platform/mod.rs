//! Integration with the hosting platform: caller authentication, the
//! service-user cache and the trusted-certificate store.

pub mod auth;
pub mod client;
pub mod service_users;
pub mod trust_store;

pub use auth::{IdentityProvider, PlatformIdentityProvider};
pub use client::PlatformClient;
pub use trust_store::{
    NewTrustedCertificate, PlatformTrustStore, TrustStore, TrustStoreOutcome, TrustedCertificate,
};
