use secrecy::Secret;
use serde::Deserialize;
use service_core::config::{self as core_config, Config as ServerConfig};
use service_core::error::AppError;
use service_core::retry::RetryPolicy;
use std::time::Duration;

/// Full settings tree, loaded from `configuration.*` and `APP__` variables.
///
/// ```text
/// APP__SERVER__PORT=8080
/// APP__PLATFORM__BASE_URL=https://example.platform.io
/// APP__PLATFORM__BOOTSTRAP_TENANT=management
/// APP__PLATFORM__BOOTSTRAP_USER=servicebootstrap_devicecert
/// APP__PLATFORM__BOOTSTRAP_PASSWORD=...
/// APP__ENROLLMENT__REQUIRED_ROLE=ROLE_SELF_SIGNED_CERT_CREATE
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceCertConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub platform: PlatformConfig,
    #[serde(default)]
    pub enrollment: EnrollmentConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlatformConfig {
    pub base_url: String,
    #[serde(default)]
    pub bootstrap_tenant: String,
    #[serde(default)]
    pub bootstrap_user: String,
    #[serde(default = "empty_secret")]
    pub bootstrap_password: Secret<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnrollmentConfig {
    /// userID prefix that marks a device identity.
    #[serde(default = "default_device_user_prefix")]
    pub device_user_prefix: String,
    /// Role the caller must hold. An empty value disables the check.
    #[serde(default = "default_required_role")]
    pub required_role: String,
    #[serde(default = "default_max_certificate_bytes")]
    pub max_certificate_bytes: usize,
    /// Pause before the single retry after stale service credentials.
    #[serde(default)]
    pub retry_delay_ms: u64,
}

impl Default for EnrollmentConfig {
    fn default() -> Self {
        Self {
            device_user_prefix: default_device_user_prefix(),
            required_role: default_required_role(),
            max_certificate_bytes: default_max_certificate_bytes(),
            retry_delay_ms: 0,
        }
    }
}

impl EnrollmentConfig {
    pub fn required_role(&self) -> Option<&str> {
        Some(self.required_role.as_str()).filter(|role| !role.is_empty())
    }

    /// The submission retry policy is fixed at one retry; only the pause is tunable.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::once().with_delay(Duration::from_millis(self.retry_delay_ms))
    }
}

impl PlatformConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn empty_secret() -> Secret<String> {
    Secret::new(String::new())
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_device_user_prefix() -> String {
    "device_".to_string()
}

fn default_required_role() -> String {
    "ROLE_SELF_SIGNED_CERT_CREATE".to_string()
}

fn default_max_certificate_bytes() -> usize {
    64 * 1024
}

impl DeviceCertConfig {
    pub fn load() -> Result<Self, AppError> {
        let config: Self = core_config::load()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.platform.base_url.trim().is_empty() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "platform.base_url must not be empty"
            )));
        }
        if self.enrollment.device_user_prefix.is_empty() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "enrollment.device_user_prefix must not be empty"
            )));
        }
        Ok(())
    }
}
