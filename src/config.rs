use anyhow::Context;

use crate::AppResult;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub account: String,
    pub daemon_host: String,
    pub daemon_port: u16,
    pub direct_dm_greeting: String,
    pub mapping_retention_hours: i64,
}

impl Config {
    pub fn from_env() -> AppResult<Self> {
        Ok(Self {
            database_url: dotenv::var("DATABASE_URL").context("DATABASE_URL is not set")?,
            account: dotenv::var("SIGNAL_PHONE_NUMBER")
                .context("SIGNAL_PHONE_NUMBER is not set")?,
            daemon_host: dotenv::var("SIGNAL_DAEMON_HOST")
                .unwrap_or_else(|_| "localhost".to_owned()),
            daemon_port: dotenv::var("SIGNAL_DAEMON_PORT")
                .unwrap_or_else(|_| "8080".to_owned())
                .parse()
                .context("SIGNAL_DAEMON_PORT is not a port number")?,
            direct_dm_greeting: dotenv::var("DIRECT_DM_GREETING").unwrap_or_else(|_| {
                "Hello! Your message has been forwarded to our team. \
                 They will reply to you through me."
                    .to_owned()
            }),
            mapping_retention_hours: dotenv::var("RELAY_MAPPING_RETENTION_HOURS")
                .unwrap_or_else(|_| "72".to_owned())
                .parse()
                .context("RELAY_MAPPING_RETENTION_HOURS is not a number")?,
        })
    }
}
