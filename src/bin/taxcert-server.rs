use anyhow::Context;
use codef_taxcert::middleware::{RouteConfig, tax_cert_routes};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = RouteConfig::from_env().context("failed to load CODEF configuration")?;
    let path = config.path().to_owned();
    let app = tax_cert_routes(config);

    let addr = std::env::var("TAXCERT_BIND_ADDR")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!(addr = %addr, path = %path, "Tax certificate server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
