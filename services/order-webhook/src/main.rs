use actix_web::{middleware, web, App, HttpServer};
use dotenv::dotenv;
use order_risk_engine::{GeoResolver, RiskEngine};
use order_webhook::{
    config::{Config, GeoConfig},
    database, geo_db, handlers, metrics, AppState, PgOrderStore,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn io_error(message: String) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, message)
}

/// Fetch missing databases, then open both. Any failure disables geo.
async fn open_geo(config: &GeoConfig) -> GeoResolver {
    let timeout = Duration::from_secs(config.download_timeout_seconds);
    let downloads = [
        (&config.city_db_path, config.city_db_url.as_deref()),
        (&config.asn_db_path, config.asn_db_url.as_deref()),
    ];
    for (path, url) in downloads {
        if let Err(e) = geo_db::ensure_database(path, url, timeout).await {
            error!("Geo database {} unavailable: {:#}", path, e);
        }
    }

    match geo_db::MaxMindGeoDatabase::open(&config.city_db_path, &config.asn_db_path) {
        Ok(db) => {
            info!("Geo databases opened");
            GeoResolver::new(Arc::new(db))
        }
        Err(e) => {
            error!("Geo lookups disabled: {:#}", e);
            GeoResolver::disabled()
        }
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    info!("Starting Order Webhook...");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        io_error(format!("Configuration error: {}", e))
    })?;
    info!("Configuration loaded successfully");

    if let Err(e) = metrics::register_metrics(&metrics::REGISTRY) {
        error!("Failed to register metrics: {}", e);
    }

    // Create database pool
    let pool = database::create_pool(
        &config.database.url,
        config.database.max_connections,
        Duration::from_secs(config.database.acquire_timeout_seconds),
    )
    .await
    .map_err(|e| {
        error!("Failed to create database pool: {}", e);
        io_error(format!("Database connection failed: {}", e))
    })?;
    info!("Database connection pool created successfully");

    if let Err(e) = database::health_check(&pool).await {
        error!("Database health check failed: {}", e);
        return Err(io_error("Database not accessible".to_string()));
    }

    database::run_migrations(&pool).await.map_err(|e| {
        error!("Schema migration failed: {}", e);
        io_error(format!("Migration failed: {}", e))
    })?;

    // Initialize components
    let geo = open_geo(&config.geo).await;
    let geo_enabled = geo.is_enabled();
    let store = Arc::new(PgOrderStore::new(pool.clone()));
    let engine = RiskEngine::new(config.engine.clone(), geo, store.clone(), store).map_err(|e| {
        error!("Invalid engine configuration: {}", e);
        io_error(e.to_string())
    })?;
    info!(
        model = ?engine.config().scoring.model,
        geo_enabled,
        "Risk engine initialized"
    );

    let state = AppState {
        engine: Arc::new(engine),
        webhook: config.webhook.clone(),
        pool: Some(pool.clone()),
        geo_enabled,
    };

    let server_config = config.server.clone();
    info!(
        "Starting HTTP server on {}:{}",
        server_config.host, server_config.port
    );

    let result = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(middleware::Logger::default())
            .configure(handlers::configure_routes)
    })
    .workers(server_config.workers)
    .bind((server_config.host, server_config.port))?
    .run()
    .await;

    pool.close().await;
    info!("Order Webhook stopped");
    result
}
