//! Application startup and lifecycle management.

use crate::config::DeviceCertConfig;
use crate::enrollment::EnrollmentService;
use crate::handlers;
use crate::platform::{IdentityProvider, PlatformClient, PlatformIdentityProvider, PlatformTrustStore};
use axum::middleware::from_fn;
use axum::routing::{get, post};
use axum::Router;
use service_core::error::AppError;
use service_core::middleware::{metrics_middleware, request_id_middleware, REQUEST_ID_HEADER};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<DeviceCertConfig>,
    pub enrollment: Arc<EnrollmentService>,
    pub identity_provider: Arc<dyn IdentityProvider>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics))
        .route(
            "/certificates/upload",
            post(handlers::certificates::upload_certificate),
        )
        .layer(from_fn(metrics_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    user_id = tracing::field::Empty,
                    tenant = tracing::field::Empty,
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
}

impl Application {
    /// Wire the platform adapters and bind the listener (port 0 picks a free port).
    pub async fn build(config: DeviceCertConfig) -> Result<Self, AppError> {
        let client = PlatformClient::new(&config.platform)?;

        // Requests for tenants missing here trigger a refresh of their own.
        if let Err(e) = client.refresh_service_users().await {
            tracing::warn!(error = %e, "Starting without service users");
        }

        let trust_store = Arc::new(PlatformTrustStore::new(client.clone()));
        let enrollment = EnrollmentService::new(trust_store, &config.enrollment);

        let state = AppState {
            config: Arc::new(config.clone()),
            enrollment: Arc::new(enrollment),
            identity_provider: Arc::new(PlatformIdentityProvider::new(client)),
        };

        let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(port, platform = %config.platform.base_url, "devicecert-service ready");

        Ok(Self {
            port,
            listener,
            router: build_router(state),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Serve until SIGINT or SIGTERM, then drain in-flight requests.
    pub async fn run_until_stopped(self) -> Result<(), AppError> {
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Service shutdown complete");
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
