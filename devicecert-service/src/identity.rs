//! Caller identity as established by the authentication layer, and the
//! device identifier derived from it.

use std::fmt;
use thiserror::Error;

/// The security context could not be established or is not acceptable.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthContextError {
    #[error("missing Authorization header")]
    MissingCredentials,

    #[error("unsupported authorization scheme")]
    UnsupportedScheme,

    #[error("credentials rejected by the platform: {0}")]
    Rejected(String),

    #[error("authenticated user id is empty")]
    EmptyUserId,

    #[error("user is missing required role {0}")]
    MissingRole(String),

    #[error("could not reach the platform to verify credentials: {0}")]
    Unavailable(String),
}

/// Why an otherwise authenticated caller may not enroll a certificate.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum RejectionReason {
    #[error("not a device identity")]
    NotADeviceIdentity,

    #[error("common name mismatch")]
    CommonNameMismatch,
}

/// Result of upstream authentication. Read-only for the rest of the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedIdentity {
    user_id: String,
    tenant: String,
    roles: Vec<String>,
}

impl AuthenticatedIdentity {
    pub fn new(
        user_id: impl Into<String>,
        tenant: impl Into<String>,
        roles: Vec<String>,
    ) -> Result<Self, AuthContextError> {
        let user_id = user_id.into();
        if user_id.is_empty() {
            return Err(AuthContextError::EmptyUserId);
        }
        Ok(Self {
            user_id,
            tenant: tenant.into(),
            roles,
        })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// Identifier of a device, equal to the CN its certificate must carry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExternalDeviceId(String);

impl ExternalDeviceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExternalDeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Strip the device prefix from the caller's user id.
///
/// A missing prefix, or nothing left after stripping it, means the caller
/// is not a device.
pub fn resolve_external_id(
    identity: &AuthenticatedIdentity,
    device_prefix: &str,
) -> Result<ExternalDeviceId, RejectionReason> {
    match identity.user_id().strip_prefix(device_prefix) {
        Some(id) if !id.is_empty() => Ok(ExternalDeviceId(id.to_string())),
        _ => Err(RejectionReason::NotADeviceIdentity),
    }
}
