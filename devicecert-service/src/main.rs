use devicecert_service::{config::DeviceCertConfig, services, Application};
use service_core::observability::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = DeviceCertConfig::load()?;

    init_tracing(
        "devicecert-service",
        &config.server.log_level,
        config.server.otlp_endpoint.as_deref(),
    );
    services::init_metrics()?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.server.port,
        "Starting devicecert-service"
    );

    let application = Application::build(config).await?;
    application.run_until_stopped().await?;

    Ok(())
}
