//! HTTP client for the hosting platform's REST API.

use super::service_users::{ServiceUser, ServiceUserCache, Subscriptions};
use crate::config::PlatformConfig;
use crate::services::metrics;
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use service_core::error::AppError;
use service_core::observability::TracedRequestExt;
use std::sync::Arc;

const SUBSCRIPTIONS_PATH: &str = "/application/currentApplication/subscriptions";

#[derive(Clone)]
pub struct PlatformClient {
    http: Client,
    base_url: String,
    bootstrap_login: String,
    bootstrap_password: Secret<String>,
    service_users: Arc<ServiceUserCache>,
}

impl PlatformClient {
    pub fn new(config: &PlatformConfig) -> Result<Self, AppError> {
        let http = Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        let bootstrap_login = if config.bootstrap_tenant.is_empty() {
            config.bootstrap_user.clone()
        } else {
            format!("{}/{}", config.bootstrap_tenant, config.bootstrap_user)
        };

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            bootstrap_login,
            bootstrap_password: config.bootstrap_password.clone(),
            service_users: Arc::new(ServiceUserCache::new()),
        })
    }

    pub fn http(&self) -> &Client {
        &self.http
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn service_user(&self, tenant: &str) -> Option<ServiceUser> {
        self.service_users.get(tenant)
    }

    /// Re-read the service users this microservice is subscribed with.
    ///
    /// Other requests may still observe the previous set for a while.
    pub async fn refresh_service_users(&self) -> Result<usize, AppError> {
        let result = self.fetch_service_users().await;

        match &result {
            Ok(count) => {
                metrics::record_service_user_refresh("ok");
                tracing::info!(tenants = count, "Refreshed microservice service users");
            }
            Err(e) => {
                metrics::record_service_user_refresh("error");
                tracing::error!(error = %e, "Could not update microservice service user list");
            }
        }

        result
    }

    async fn fetch_service_users(&self) -> Result<usize, AppError> {
        let response = self
            .http
            .get(self.url(SUBSCRIPTIONS_PATH))
            .basic_auth(
                &self.bootstrap_login,
                Some(self.bootstrap_password.expose_secret()),
            )
            .with_trace_context()
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::BadGateway(format!(
                "service user lookup returned {}",
                status
            )));
        }

        let subscriptions: Subscriptions = response.json().await?;
        Ok(self.service_users.replace(subscriptions.users))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base_url: &str, tenant: &str) -> PlatformConfig {
        serde_json::from_value(serde_json::json!({
            "base_url": base_url,
            "bootstrap_tenant": tenant,
            "bootstrap_user": "servicebootstrap_devicecert",
            "bootstrap_password": "pw",
        }))
        .unwrap()
    }

    #[test]
    fn url_joins_without_double_slash() {
        let client = PlatformClient::new(&config("https://platform.example/", "t1")).unwrap();
        assert_eq!(
            client.url("/tenant/currentTenant"),
            "https://platform.example/tenant/currentTenant"
        );
    }

    #[test]
    fn bootstrap_login_is_tenant_qualified_when_tenant_set() {
        let client = PlatformClient::new(&config("https://p", "management")).unwrap();
        assert_eq!(client.bootstrap_login, "management/servicebootstrap_devicecert");

        let client = PlatformClient::new(&config("https://p", "")).unwrap();
        assert_eq!(client.bootstrap_login, "servicebootstrap_devicecert");
    }

    #[test]
    fn empty_cache_has_no_service_user() {
        let client = PlatformClient::new(&config("https://p", "t1")).unwrap();
        assert!(client.service_user("t1").is_none());
    }
}
