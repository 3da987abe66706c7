pub mod config;
pub mod database;
pub mod errors;
pub mod geo_db;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod repository;
pub mod signature;

// Re-exports for convenience
pub use handlers::AppState;
pub use repository::PgOrderStore;
