use crate::certificate::CertificateError;
use crate::identity::{AuthContextError, RejectionReason};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Every way an enrollment request can end other than success.
///
/// Each variant maps to one status and `{error, reason}` body; nothing
/// beyond the short tag and a reason reaches the caller.
#[derive(Debug, Error)]
pub enum EnrollmentError {
    #[error("invalid user context: {0}")]
    AuthContext(#[from] AuthContextError),

    #[error("caller is not a device identity")]
    NotDeviceIdentity,

    #[error("failed to read certificate: {0}")]
    UnreadableBody(String),

    #[error("invalid certificate: {0}")]
    InvalidCertificate(#[from] CertificateError),

    #[error("certificate common name does not match the token")]
    CommonNameMismatch,

    #[error("certificate has already been uploaded: {0}")]
    AlreadyEnrolled(String),

    #[error("service credentials still stale for tenant {tenant}: {detail}")]
    StaleServiceCredentials { tenant: String, detail: String },

    #[error("failed to upload trusted certificate: {detail}")]
    Upstream {
        status: Option<StatusCode>,
        detail: String,
    },
}

impl From<RejectionReason> for EnrollmentError {
    fn from(reason: RejectionReason) -> Self {
        match reason {
            RejectionReason::NotADeviceIdentity => EnrollmentError::NotDeviceIdentity,
            RejectionReason::CommonNameMismatch => EnrollmentError::CommonNameMismatch,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorMessage {
    pub error: &'static str,
    pub reason: String,
}

impl EnrollmentError {
    pub fn status(&self) -> StatusCode {
        match self {
            EnrollmentError::AuthContext(_) => StatusCode::FORBIDDEN,
            EnrollmentError::NotDeviceIdentity => StatusCode::UNPROCESSABLE_ENTITY,
            EnrollmentError::UnreadableBody(_) => StatusCode::UNPROCESSABLE_ENTITY,
            EnrollmentError::InvalidCertificate(_) => StatusCode::UNPROCESSABLE_ENTITY,
            EnrollmentError::CommonNameMismatch => StatusCode::FORBIDDEN,
            EnrollmentError::AlreadyEnrolled(_) => StatusCode::CONFLICT,
            EnrollmentError::StaleServiceCredentials { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            EnrollmentError::Upstream { status, .. } => {
                status.unwrap_or(StatusCode::UNPROCESSABLE_ENTITY)
            }
        }
    }

    /// Metric label for the terminal outcome.
    pub fn label(&self) -> &'static str {
        match self {
            EnrollmentError::AuthContext(_) => "invalid_user_context",
            EnrollmentError::NotDeviceIdentity => "not_device_identity",
            EnrollmentError::UnreadableBody(_) => "unreadable_body",
            EnrollmentError::InvalidCertificate(_) => "invalid_certificate",
            EnrollmentError::CommonNameMismatch => "common_name_mismatch",
            EnrollmentError::AlreadyEnrolled(_) => "duplicate",
            EnrollmentError::StaleServiceCredentials { .. } => "stale_service_credentials",
            EnrollmentError::Upstream { .. } => "upstream_failure",
        }
    }

    pub fn message(&self) -> ErrorMessage {
        let (error, reason) = match self {
            EnrollmentError::AuthContext(e) => ("invalid user context", e.to_string()),
            EnrollmentError::NotDeviceIdentity => (
                "Invalid user id detected in token",
                "must be a device user".to_string(),
            ),
            EnrollmentError::UnreadableBody(detail) => {
                ("Failed to read certificate", detail.clone())
            }
            EnrollmentError::InvalidCertificate(e) => ("Invalid certificate", e.to_string()),
            EnrollmentError::CommonNameMismatch => (
                "Certificate Common Name and token mismatch",
                "The certificate's Common Name (CN) does not match the token".to_string(),
            ),
            EnrollmentError::AlreadyEnrolled(detail) => {
                ("Certificate has already been uploaded", detail.clone())
            }
            EnrollmentError::StaleServiceCredentials { tenant, .. } => (
                "Failed to upload trusted certificate",
                format!(
                    "Invalid service user credentials detected for tenant {}",
                    tenant
                ),
            ),
            EnrollmentError::Upstream { detail, .. } => {
                ("Failed to upload trusted certificate", detail.clone())
            }
        };
        ErrorMessage { error, reason }
    }
}

impl IntoResponse for EnrollmentError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.message())).into_response()
    }
}
