//! Application configuration loaded from environment variables.

use crate::errors::{Result, SchedulerError};

#[derive(Debug, Clone)]
pub struct Config {
    /// Chain directory service endpoint (source of record for chains)
    pub directory_url: String,
    /// Ledger/wallet service endpoint (balances, transfers, account ids)
    pub ledger_url: String,
    /// Id of the chain this scheduler instance owns
    pub chain_id: String,
    /// Origin used when producing invite links
    pub invite_origin: String,
    /// Path to the SQLite database file for the rotation-event journal
    pub database_url: String,
    /// Port for the REST API server
    pub api_port: u16,
    /// Seconds between recomputation ticks
    pub tick_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            directory_url: env_var("DIRECTORY_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8000/directory".to_string()),
            ledger_url: env_var("LEDGER_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8000/ledger".to_string()),
            chain_id: env_var("CHAIN_ID").map_err(|_| {
                SchedulerError::Config("CHAIN_ID environment variable is required".to_string())
            })?,
            invite_origin: env_var("INVITE_ORIGIN")
                .unwrap_or_else(|_| "https://app.chainpool.example".to_string()),
            database_url: env_var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./rotation_events.db".to_string()),
            api_port: env_var("API_PORT")
                .unwrap_or_else(|_| "3002".to_string())
                .parse()
                .map_err(|_| SchedulerError::Config("Invalid API_PORT".to_string()))?,
            tick_interval_secs: env_var("TICK_INTERVAL_SECS")
                .unwrap_or_else(|_| "1".to_string())
                .parse()
                .map_err(|_| SchedulerError::Config("Invalid TICK_INTERVAL_SECS".to_string()))?,
        })
    }
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| SchedulerError::Config(format!("Missing env var: {key}")))
}
