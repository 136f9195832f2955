use hotspot_billing::api::{create_router, AppState};
use hotspot_billing::appliance::{AppliancePool, RouterOsProvisioner};
use hotspot_billing::config::{Settings, StorageBackend};
use hotspot_billing::gateway::DarajaClient;
use hotspot_billing::observability::{init_logging, init_metrics, HealthChecker, LogConfig};
use hotspot_billing::repositories::{CatalogSeed, Stores};
use hotspot_billing::services::Services;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Load configuration
    let settings = Settings::new()?;

    // Initialize logging
    init_logging(&LogConfig::from(&settings.logging));
    info!("Configuration loaded");

    let metrics_handle = init_metrics()?;

    let (stores, pool) = match settings.database.backend {
        StorageBackend::Postgres => {
            info!("Connecting to database...");
            let pool = PgPoolOptions::new()
                .max_connections(settings.database.pool_size)
                .acquire_timeout(Duration::from_secs(5))
                .connect(&settings.database.url)
                .await?;
            info!("Database connection established");

            info!("Running database migrations...");
            sqlx::migrate!("./migrations").run(&pool).await?;
            info!("Migrations applied successfully");

            (Stores::postgres(pool.clone()), Some(pool))
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; state is lost on restart");
            let seed = match &settings.database.seed_file {
                Some(path) => CatalogSeed::load(path)?,
                None => CatalogSeed::default(),
            };
            if seed.plans.is_empty() {
                tracing::warn!("In-memory catalog has no plans; nothing can be sold");
            }
            (Stores::in_memory(&seed).await, None)
        }
    };

    let gateway_configured = settings.gateway.is_configured();
    if !gateway_configured {
        tracing::warn!("Payment gateway credentials are not configured");
    }
    let gateway = Arc::new(DarajaClient::new(settings.gateway)?);
    let provisioner = Arc::new(RouterOsProvisioner::new(AppliancePool::new(&settings.appliance)));

    let services = Services::new(
        stores,
        gateway,
        provisioner,
        &settings.activation,
        settings.payout.default_share_percent,
    );
    let _sweeper = services.monitor.clone().start();

    let health_checker = Arc::new(HealthChecker::new(pool, gateway_configured));
    let state = AppState::new(services)
        .with_metrics(metrics_handle)
        .with_health_checker(health_checker);
    let app = create_router(state);

    let addr = format!("{}:{}", settings.application.host, settings.application.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
