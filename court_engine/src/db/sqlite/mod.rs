pub mod db;

pub mod audit;
pub mod carts;
pub mod courts;
pub mod orders;
pub mod payments;
pub mod settlement;

use std::env;

use log::info;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

use crate::court_api::errors::CourtError;
pub use db::SqliteDatabase;

const SQLITE_DB_URL: &str = "sqlite://data/food_court.db";

pub fn db_url() -> String {
    let result = env::var("FCO_DATABASE_URL").unwrap_or_else(|_| {
        info!("🗃️ FCO_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("🗃️ Using database URL: {result}");
    result
}

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, CourtError> {
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect(url).await?;
    Ok(pool)
}
