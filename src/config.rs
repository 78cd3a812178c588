use dotenvy::dotenv;
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server_port: u16,
    /// Absent means the in-memory store is used (demo/test runs).
    pub database_url: Option<String>,
    /// Absent means low-balance alerts are dropped.
    pub low_balance_webhook_url: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok(); // Load .env file if present

        Ok(Config {
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
            database_url: env::var("DATABASE_URL").ok(),
            low_balance_webhook_url: env::var("LOW_BALANCE_WEBHOOK_URL").ok(),
        })
    }
}
