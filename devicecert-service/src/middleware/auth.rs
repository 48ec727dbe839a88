//! Establishes who is calling before any handler runs.
//!
//! The `Authorization` header is verified against the platform on every
//! request; nothing is cached between requests.

use crate::error::EnrollmentError;
use crate::identity::{AuthContextError, AuthenticatedIdentity};
use crate::services::metrics;
use crate::startup::AppState;
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts};

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedIdentity {
    type Rejection = EnrollmentError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let identity = establish(parts, state).await.map_err(|e| {
            metrics::record_enrollment(e.label());
            e
        })?;

        let span = tracing::Span::current();
        span.record("user_id", identity.user_id());
        span.record("tenant", identity.tenant());

        Ok(identity)
    }
}

async fn establish(
    parts: &Parts,
    state: &AppState,
) -> Result<AuthenticatedIdentity, EnrollmentError> {
    let authorization = parts
        .headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthContextError::MissingCredentials)?;

    let identity = state
        .identity_provider
        .authenticate(authorization)
        .await
        .map_err(|e| {
            tracing::warn!(reason = %e, "Could not establish user context");
            e
        })?;

    if let Some(role) = state.config.enrollment.required_role() {
        if !identity.has_role(role) {
            tracing::warn!(user_id = %identity.user_id(), role = %role, "User lacks required role");
            return Err(AuthContextError::MissingRole(role.to_string()).into());
        }
    }

    Ok(identity)
}
