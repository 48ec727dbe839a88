//! One enrollment request from resolved identity to trust-store record.
//!
//! The device id is resolved before the body is read, so non-device callers
//! never have their upload consumed. Dropping the returned future (the
//! caller went away) cancels an in-flight submission.

use crate::certificate;
use crate::config::EnrollmentConfig;
use crate::error::EnrollmentError;
use crate::identity::{resolve_external_id, AuthenticatedIdentity, ExternalDeviceId};
use crate::platform::{TrustStore, TrustStoreOutcome, TrustedCertificate};
use crate::policy::{decide, EnrollmentDecision};
use crate::services::metrics;
use axum::body::Bytes;
use service_core::retry::{retry_when, Attempted, RetryPolicy};
use std::future::Future;
use std::sync::Arc;

/// A certificate that is now trusted for `external_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct Enrolled {
    pub external_id: ExternalDeviceId,
    pub record: TrustedCertificate,
    pub attempts: u32,
}

pub struct EnrollmentService {
    trust_store: Arc<dyn TrustStore>,
    retry_policy: RetryPolicy,
    device_prefix: String,
}

impl EnrollmentService {
    pub fn new(trust_store: Arc<dyn TrustStore>, config: &EnrollmentConfig) -> Self {
        Self {
            trust_store,
            retry_policy: config.retry_policy(),
            device_prefix: config.device_user_prefix.clone(),
        }
    }

    /// `certificate_body` is only awaited once the caller is known to be a device.
    pub async fn enroll<R>(
        &self,
        identity: &AuthenticatedIdentity,
        certificate_body: R,
    ) -> Result<Enrolled, EnrollmentError>
    where
        R: Future<Output = Result<Bytes, EnrollmentError>>,
    {
        let result = self.run(identity, certificate_body).await;
        metrics::record_enrollment(match &result {
            Ok(_) => "created",
            Err(e) => e.label(),
        });
        result
    }

    async fn run<R>(
        &self,
        identity: &AuthenticatedIdentity,
        certificate_body: R,
    ) -> Result<Enrolled, EnrollmentError>
    where
        R: Future<Output = Result<Bytes, EnrollmentError>>,
    {
        let external_id = resolve_external_id(identity, &self.device_prefix).map_err(|reason| {
            tracing::error!(user_id = %identity.user_id(), "Could not derive external name from user");
            EnrollmentError::from(reason)
        })?;

        let certificate_body = certificate_body.await?;
        let certificate = certificate::parse(&certificate_body).map_err(|e| {
            tracing::error!(reason = %e, "Invalid certificate");
            EnrollmentError::from(e)
        })?;

        let (external_id, certificate) = match decide(external_id, certificate) {
            EnrollmentDecision::Accepted {
                external_id,
                certificate,
            } => (external_id, certificate),
            EnrollmentDecision::Rejected(reason) => {
                tracing::error!(
                    user_id = %identity.user_id(),
                    "Certificate does not match the token"
                );
                return Err(reason.into());
            }
        };

        let tenant = identity.tenant();
        tracing::info!(
            user_id = %identity.user_id(),
            tenant = %tenant,
            external_id = %external_id,
            serial_number = %certificate.serial_number,
            not_after = %certificate.not_after,
            "Uploading device certificate"
        );

        let Attempted { outcome, attempts } = retry_when(
            &self.retry_policy,
            "register_trusted_certificate",
            TrustStoreOutcome::is_transient_auth_stale,
            |_attempt| {
                self.trust_store
                    .submit(tenant, &external_id, &certificate.raw_pem)
            },
        )
        .await;

        match outcome {
            TrustStoreOutcome::Success(record) => {
                tracing::info!(
                    tenant = %tenant,
                    external_id = %external_id,
                    fingerprint = record.fingerprint.as_deref().unwrap_or("-"),
                    attempts,
                    "Registered device successfully"
                );
                Ok(Enrolled {
                    external_id,
                    record,
                    attempts,
                })
            }
            TrustStoreOutcome::Duplicate(detail) => {
                tracing::info!(
                    tenant = %tenant,
                    external_id = %external_id,
                    "Trusted certificate has already been uploaded"
                );
                Err(EnrollmentError::AlreadyEnrolled(detail))
            }
            TrustStoreOutcome::TransientAuthStale(detail) => {
                tracing::error!(
                    tenant = %tenant,
                    attempts,
                    detail = %detail,
                    "Service user credentials still invalid after refresh"
                );
                Err(EnrollmentError::StaleServiceCredentials {
                    tenant: tenant.to_string(),
                    detail,
                })
            }
            TrustStoreOutcome::OtherFailure { status, detail } => {
                tracing::error!(reason = %detail, "Failed to upload trusted certificate");
                Err(EnrollmentError::Upstream { status, detail })
            }
        }
    }
}
