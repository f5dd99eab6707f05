use crate::{
    adapters::persistence::PostgresPersistence,
    infra::{db::init_db, error::InfraError},
};

pub mod app;
pub mod config;
pub mod db;
pub mod dummy_gateway;
pub mod error;
pub mod http_client;
pub mod scheduler;
pub mod setup;
pub mod stripe_client;
pub mod stripe_gateway;

pub async fn postgres_persistence(database_url: &str) -> Result<PostgresPersistence, InfraError> {
    let pool = init_db(database_url).await?;
    db::run_migrations(&pool).await?;
    Ok(PostgresPersistence::new(pool))
}
