use crate::error::EnrollmentError;
use crate::identity::AuthenticatedIdentity;
use crate::platform::TrustedCertificate;
use crate::startup::AppState;
use axum::{
    body::{to_bytes, Body},
    extract::State,
    http::StatusCode,
    Json,
};
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub status: &'static str,
    pub trusted_certificate: TrustedCertificate,
}

/// `POST /certificates/upload`
///
/// The body is the raw PEM; its CN must name the calling device.
#[tracing::instrument(skip_all)]
pub async fn upload_certificate(
    State(state): State<AppState>,
    identity: AuthenticatedIdentity,
    body: Body,
) -> Result<(StatusCode, Json<UploadResponse>), EnrollmentError> {
    let limit = state.config.enrollment.max_certificate_bytes;
    let certificate_body = async move {
        to_bytes(body, limit).await.map_err(|e| {
            tracing::error!(error = %e, "Failed to read certificate");
            EnrollmentError::UnreadableBody(e.to_string())
        })
    };

    let enrolled = state.enrollment.enroll(&identity, certificate_body).await?;

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            status: "OK",
            trusted_certificate: enrolled.record,
        }),
    ))
}
