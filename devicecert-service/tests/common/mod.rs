#![allow(dead_code)]

use devicecert_service::config::{DeviceCertConfig, EnrollmentConfig, PlatformConfig};
use devicecert_service::{services, Application};
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
use secrecy::Secret;
use serde_json::json;
use service_core::config::Config as ServerConfig;
use wiremock::matchers::{basic_auth, bearer_token, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TENANT: &str = "t100";
pub const CERT_ROLE: &str = "ROLE_SELF_SIGNED_CERT_CREATE";
pub const DEVICE_TOKEN: &str = "device-token";
pub const SERVICE_USER: &str = "service_devicecert";
pub const SERVICE_PASSWORD: &str = "service-pw";
pub const BOOTSTRAP_LOGIN: &str = "management/servicebootstrap_devicecert";
pub const BOOTSTRAP_PASSWORD: &str = "bootstrap-pw";
pub const SUBSCRIPTIONS_PATH: &str = "/application/currentApplication/subscriptions";

pub fn trusted_certificates_path(tenant: &str) -> String {
    format!("/tenant/tenants/{}/trusted-certificates", tenant)
}

pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub platform: MockServer,
    pub client: reqwest::Client,
}

impl TestApp {
    /// App against a mock platform that knows one service user for [`TENANT`].
    pub async fn spawn() -> Self {
        Self::spawn_with(|_| {}).await
    }

    pub async fn spawn_with(customize: impl FnOnce(&mut DeviceCertConfig)) -> Self {
        // One recorder per test binary; later calls find it installed.
        let _ = services::init_metrics();

        let platform = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(SUBSCRIPTIONS_PATH))
            .and(basic_auth(BOOTSTRAP_LOGIN, BOOTSTRAP_PASSWORD))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "users": [
                    { "tenant": TENANT, "name": SERVICE_USER, "password": SERVICE_PASSWORD }
                ]
            })))
            .mount(&platform)
            .await;

        let mut config = DeviceCertConfig {
            server: ServerConfig {
                port: 0,
                log_level: "debug".to_string(),
                otlp_endpoint: None,
            },
            platform: PlatformConfig {
                base_url: platform.uri(),
                bootstrap_tenant: "management".to_string(),
                bootstrap_user: "servicebootstrap_devicecert".to_string(),
                bootstrap_password: Secret::new(BOOTSTRAP_PASSWORD.to_string()),
                request_timeout_secs: 5,
            },
            enrollment: EnrollmentConfig::default(),
        };
        customize(&mut config);

        let app = Application::build(config)
            .await
            .expect("Failed to build test application");
        let port = app.port();

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        TestApp {
            address: format!("http://127.0.0.1:{}", port),
            port,
            platform,
            client: reqwest::Client::new(),
        }
    }

    /// Make the platform resolve [`DEVICE_TOKEN`] to `user_id` in `tenant`.
    pub async fn given_caller(&self, user_id: &str, tenant: &str, roles: &[&str]) {
        let roles: Vec<_> = roles.iter().map(|r| json!({ "id": r })).collect();

        Mock::given(method("GET"))
            .and(path("/user/currentUser"))
            .and(bearer_token(DEVICE_TOKEN))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": user_id,
                "userName": user_id,
                "effectiveRoles": roles,
            })))
            .mount(&self.platform)
            .await;

        Mock::given(method("GET"))
            .and(path("/tenant/currentTenant"))
            .and(bearer_token(DEVICE_TOKEN))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "name": tenant })))
            .mount(&self.platform)
            .await;
    }

    pub async fn upload(&self, body: impl Into<reqwest::Body>) -> reqwest::Response {
        self.client
            .post(format!("{}/certificates/upload", self.address))
            .bearer_auth(DEVICE_TOKEN)
            .body(body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn metrics(&self) -> String {
        self.client
            .get(format!("{}/metrics", self.address))
            .send()
            .await
            .expect("Failed to execute request")
            .text()
            .await
            .expect("Failed to read metrics")
    }

    /// Number of requests the mock platform saw for `path`.
    pub async fn platform_calls(&self, request_path: &str) -> usize {
        self.platform
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.url.path() == request_path)
            .count()
    }
}

/// Self-signed PEM certificate whose subject CN is `cn`.
pub fn certificate_pem(cn: &str) -> String {
    let mut params = CertificateParams::default();
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, cn);
    params.distinguished_name = dn;

    let key_pair = KeyPair::generate().expect("key generation");
    params
        .self_signed(&key_pair)
        .expect("self-signed certificate")
        .pem()
}
