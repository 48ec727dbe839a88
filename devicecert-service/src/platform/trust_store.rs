//! Registration of device certificates as trusted credentials on the platform.

use super::client::PlatformClient;
use crate::identity::ExternalDeviceId;
use crate::services::metrics;
use async_trait::async_trait;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use service_core::observability::TracedRequestExt;

/// Reason returned when the platform could not be reached. The underlying
/// error names internal URLs and is only logged.
const UPLOAD_TRANSPORT_ERROR: &str = "certificate upload error. platform unreachable";

/// Where enrolled certificates are persisted.
#[async_trait]
pub trait TrustStore: Send + Sync {
    /// One registration attempt. Never retries on its own.
    async fn submit(
        &self,
        tenant: &str,
        external_id: &ExternalDeviceId,
        cert_pem: &str,
    ) -> TrustStoreOutcome;
}

/// Classified result of a single submission attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum TrustStoreOutcome {
    Success(TrustedCertificate),
    /// The certificate is already trusted. Terminal, never retried.
    Duplicate(String),
    /// The cached service credentials for the tenant are out of date.
    TransientAuthStale(String),
    OtherFailure {
        status: Option<StatusCode>,
        detail: String,
    },
}

impl TrustStoreOutcome {
    pub fn is_transient_auth_stale(&self) -> bool {
        matches!(self, TrustStoreOutcome::TransientAuthStale(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            TrustStoreOutcome::Success(_) => "success",
            TrustStoreOutcome::Duplicate(_) => "duplicate",
            TrustStoreOutcome::TransientAuthStale(_) => "transient_auth_stale",
            TrustStoreOutcome::OtherFailure { .. } => "other_failure",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CertificateStatus {
    Enabled,
    Disabled,
}

/// Body of the register-certificate call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTrustedCertificate {
    pub name: String,
    pub auto_registration_enabled: bool,
    pub status: CertificateStatus,
    pub cert_in_pem_format: String,
}

impl NewTrustedCertificate {
    pub fn enabled(name: &ExternalDeviceId, cert_pem: &str) -> Self {
        Self {
            name: name.to_string(),
            auto_registration_enabled: true,
            status: CertificateStatus::Enabled,
            cert_in_pem_format: cert_pem.to_string(),
        }
    }
}

/// Trusted-certificate record as returned by the platform.
///
/// Fields this service does not interpret are kept so the caller gets the
/// full record back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustedCertificate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<CertificateStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_registration_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_in_pem_format: Option<String>,
    #[serde(flatten)]
    pub additional: serde_json::Map<String, serde_json::Value>,
}

impl From<&NewTrustedCertificate> for TrustedCertificate {
    fn from(submitted: &NewTrustedCertificate) -> Self {
        Self {
            fingerprint: None,
            name: submitted.name.clone(),
            status: Some(submitted.status),
            auto_registration_enabled: Some(submitted.auto_registration_enabled),
            cert_in_pem_format: Some(submitted.cert_in_pem_format.clone()),
            additional: serde_json::Map::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PlatformError {
    error: Option<String>,
    message: Option<String>,
}

/// Human-readable detail for a non-2xx response.
fn error_detail(status: StatusCode, body: &str) -> String {
    let message = serde_json::from_str::<PlatformError>(body)
        .ok()
        .and_then(|e| e.message.or(e.error))
        .filter(|m| !m.is_empty())
        .or_else(|| Some(body.trim().to_string()).filter(|b| !b.is_empty()));

    match message {
        Some(message) => format!("{}: {}", status, message),
        None => status.to_string(),
    }
}

/// Map a platform response onto an outcome.
///
/// A 2xx whose body is not a record still counts as success; the record is
/// then rebuilt from what was submitted.
pub fn classify(status: StatusCode, body: &str, submitted: &NewTrustedCertificate) -> TrustStoreOutcome {
    if status.is_success() {
        let record = serde_json::from_str::<TrustedCertificate>(body)
            .unwrap_or_else(|_| TrustedCertificate::from(submitted));
        return TrustStoreOutcome::Success(record);
    }

    let detail = error_detail(status, body);
    match status {
        StatusCode::CONFLICT => TrustStoreOutcome::Duplicate(detail),
        StatusCode::UNAUTHORIZED => TrustStoreOutcome::TransientAuthStale(detail),
        _ => TrustStoreOutcome::OtherFailure {
            status: Some(status),
            detail,
        },
    }
}

/// [`TrustStore`] backed by the platform's trusted-certificates API.
#[derive(Clone)]
pub struct PlatformTrustStore {
    client: PlatformClient,
}

impl PlatformTrustStore {
    pub fn new(client: PlatformClient) -> Self {
        Self { client }
    }

    async fn refresh_after_stale(&self, tenant: &str) {
        tracing::info!(
            tenant = %tenant,
            "Invalid service user detected, refreshing service users. The next request for the same tenant should then work"
        );
        // Failure is already logged by the client; the caller still gets the stale outcome.
        let _ = self.client.refresh_service_users().await;
    }
}

#[async_trait]
impl TrustStore for PlatformTrustStore {
    async fn submit(
        &self,
        tenant: &str,
        external_id: &ExternalDeviceId,
        cert_pem: &str,
    ) -> TrustStoreOutcome {
        let outcome = match self.client.service_user(tenant) {
            None => {
                self.refresh_after_stale(tenant).await;
                TrustStoreOutcome::TransientAuthStale(format!(
                    "no service user cached for tenant {}",
                    tenant
                ))
            }
            Some(service_user) => {
                let request = NewTrustedCertificate::enabled(external_id, cert_pem);
                let url = self
                    .client
                    .url(&format!("/tenant/tenants/{}/trusted-certificates", tenant));

                let sent = self
                    .client
                    .http()
                    .post(&url)
                    .basic_auth(service_user.login(), Some(service_user.password()))
                    .json(&request)
                    .with_trace_context()
                    .send()
                    .await;

                match sent {
                    Ok(response) => {
                        let status = response.status();
                        let body = response.text().await.unwrap_or_default();
                        tracing::debug!(status = %status, tenant = %tenant, "Trusted certificate response");

                        let outcome = classify(status, &body, &request);
                        if outcome.is_transient_auth_stale() {
                            self.refresh_after_stale(tenant).await;
                        }
                        outcome
                    }
                    Err(e) => {
                        tracing::error!(error = %e, url = %url, "Failed to send trusted certificate request");
                        TrustStoreOutcome::OtherFailure {
                            status: None,
                            detail: UPLOAD_TRANSPORT_ERROR.to_string(),
                        }
                    }
                }
            }
        };

        metrics::record_submission(outcome.label());
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submitted() -> NewTrustedCertificate {
        NewTrustedCertificate {
            name: "sensor01".into(),
            auto_registration_enabled: true,
            status: CertificateStatus::Enabled,
            cert_in_pem_format: "-----BEGIN CERTIFICATE-----\n...".into(),
        }
    }

    #[test]
    fn request_body_uses_platform_field_names() {
        let body = serde_json::to_value(submitted()).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "name": "sensor01",
                "autoRegistrationEnabled": true,
                "status": "ENABLED",
                "certInPemFormat": "-----BEGIN CERTIFICATE-----\n...",
            })
        );
    }

    #[test]
    fn created_response_is_success_with_extra_fields_preserved() {
        let body = r#"{"fingerprint":"ab12","name":"sensor01","status":"ENABLED","issuer":"CN=sensor01"}"#;
        match classify(StatusCode::CREATED, body, &submitted()) {
            TrustStoreOutcome::Success(record) => {
                assert_eq!(record.fingerprint.as_deref(), Some("ab12"));
                assert_eq!(record.status, Some(CertificateStatus::Enabled));
                assert_eq!(record.additional["issuer"], "CN=sensor01");
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn success_without_body_echoes_submission() {
        match classify(StatusCode::CREATED, "", &submitted()) {
            TrustStoreOutcome::Success(record) => {
                assert_eq!(record.name, "sensor01");
                assert_eq!(record.auto_registration_enabled, Some(true));
                assert!(record.fingerprint.is_none());
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn conflict_is_duplicate() {
        let body = r#"{"error":"tenant/Conflict","message":"Certificate already exists"}"#;
        assert_eq!(
            classify(StatusCode::CONFLICT, body, &submitted()),
            TrustStoreOutcome::Duplicate("409 Conflict: Certificate already exists".into())
        );
    }

    #[test]
    fn unauthorized_is_transient() {
        let outcome = classify(StatusCode::UNAUTHORIZED, "", &submitted());
        assert!(outcome.is_transient_auth_stale());
        assert_eq!(
            outcome,
            TrustStoreOutcome::TransientAuthStale("401 Unauthorized".into())
        );
    }

    #[test]
    fn other_status_carries_status_and_detail() {
        assert_eq!(
            classify(StatusCode::BAD_REQUEST, "bad pem", &submitted()),
            TrustStoreOutcome::OtherFailure {
                status: Some(StatusCode::BAD_REQUEST),
                detail: "400 Bad Request: bad pem".into(),
            }
        );
    }

    #[test]
    fn forbidden_is_not_transient() {
        assert!(!classify(StatusCode::FORBIDDEN, "", &submitted()).is_transient_auth_stale());
    }
}
