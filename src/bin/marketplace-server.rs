use marketplace::config::AppConfig;
use marketplace::Marketplace;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "marketplace=debug,tower_http=info".into()),
        )
        .init();

    let config = AppConfig::from_env()?;
    let addr = config.bind_addr()?;
    let marketplace = Marketplace::from_config(config)?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Marketplace listening on {}", addr);
    axum::serve(listener, marketplace.router()).await?;

    Ok(())
}
