//! Resolves the caller's credentials to an identity by asking the platform.

use super::client::PlatformClient;
use crate::identity::{AuthContextError, AuthenticatedIdentity};
use async_trait::async_trait;
use axum::http::{header, HeaderValue, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use service_core::observability::TracedRequestExt;

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Verify an `Authorization` header value and return who it belongs to.
    async fn authenticate(
        &self,
        authorization: &HeaderValue,
    ) -> Result<AuthenticatedIdentity, AuthContextError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CurrentUser {
    id: Option<String>,
    user_name: Option<String>,
    #[serde(default)]
    effective_roles: Vec<Role>,
}

#[derive(Debug, Deserialize)]
struct Role {
    id: String,
}

#[derive(Debug, Deserialize)]
struct CurrentTenant {
    name: String,
}

/// Forwards the caller's Bearer or Basic credentials to the platform's
/// current-user and current-tenant endpoints.
#[derive(Clone)]
pub struct PlatformIdentityProvider {
    client: PlatformClient,
}

impl PlatformIdentityProvider {
    pub fn new(client: PlatformClient) -> Self {
        Self { client }
    }

    async fn get_as_caller<T: DeserializeOwned>(
        &self,
        path: &str,
        authorization: &HeaderValue,
    ) -> Result<T, AuthContextError> {
        let response = self
            .client
            .http()
            .get(self.client.url(path))
            .header(header::AUTHORIZATION, authorization.clone())
            .with_trace_context()
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, path = %path, "Failed to reach platform for caller identity");
                AuthContextError::Unavailable(e.without_url().to_string())
            })?;

        match response.status() {
            status if status.is_success() => response
                .json::<T>()
                .await
                .map_err(|e| AuthContextError::Unavailable(e.without_url().to_string())),
            status @ (StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) => {
                Err(AuthContextError::Rejected(status.to_string()))
            }
            status => Err(AuthContextError::Unavailable(format!(
                "{} returned {}",
                path, status
            ))),
        }
    }
}

fn has_supported_scheme(authorization: &HeaderValue) -> bool {
    let Ok(value) = authorization.to_str() else {
        return false;
    };
    let scheme = value.split_whitespace().next().unwrap_or_default();
    scheme.eq_ignore_ascii_case("bearer") || scheme.eq_ignore_ascii_case("basic")
}

#[async_trait]
impl IdentityProvider for PlatformIdentityProvider {
    async fn authenticate(
        &self,
        authorization: &HeaderValue,
    ) -> Result<AuthenticatedIdentity, AuthContextError> {
        if !has_supported_scheme(authorization) {
            return Err(AuthContextError::UnsupportedScheme);
        }

        let (user, tenant) = tokio::try_join!(
            self.get_as_caller::<CurrentUser>("/user/currentUser", authorization),
            self.get_as_caller::<CurrentTenant>("/tenant/currentTenant", authorization),
        )?;

        let user_id = user.id.or(user.user_name).unwrap_or_default();
        let roles = user.effective_roles.into_iter().map(|r| r.id).collect();

        AuthenticatedIdentity::new(user_id, tenant.name, roles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_bearer_and_basic_schemes() {
        assert!(has_supported_scheme(&HeaderValue::from_static("Bearer abc")));
        assert!(has_supported_scheme(&HeaderValue::from_static("basic dXNlcjpwdw==")));
        assert!(!has_supported_scheme(&HeaderValue::from_static("Digest x")));
        assert!(!has_supported_scheme(&HeaderValue::from_static("")));
    }

    #[test]
    fn current_user_prefers_id_over_user_name() {
        let user: CurrentUser = serde_json::from_str(
            r#"{"id":"device_sensor01","userName":"ignored","effectiveRoles":[{"id":"ROLE_A"}]}"#,
        )
        .unwrap();
        assert_eq!(user.id.or(user.user_name).as_deref(), Some("device_sensor01"));
        assert_eq!(user.effective_roles[0].id, "ROLE_A");
    }
}
