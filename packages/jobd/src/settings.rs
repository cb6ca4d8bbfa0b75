//! Process settings read from the environment.

use std::time::Duration;

use db::DbConfig;
use jobs_runtime::{ProducerConfig, WorkerConfig};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("{var} must be a whole number, got {value:?}")]
    NotANumber { var: &'static str, value: String },
    #[error("JOBD_DB_USER and JOBD_DB_PASS must be set together")]
    PartialCredentials,
}

/// Everything `jobd` needs to start.
#[derive(Debug, Clone)]
pub struct Settings {
    pub db: DbConfig,
    pub worker: WorkerConfig,
    pub producers: ProducerConfig,
}

impl Settings {
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Apply overrides from `lookup` on top of the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SettingsError> {
        let mut db = match (lookup("JOBD_DB_ENDPOINT"), lookup("JOBD_DATA_DIR")) {
            (Some(endpoint), _) => DbConfig::endpoint(endpoint),
            (None, Some(dir)) => DbConfig::rocksdb(dir),
            (None, None) => DbConfig::memory(),
        };
        if let Some(namespace) = lookup("JOBD_DB_NAMESPACE") {
            db = db.with_namespace(namespace);
        }
        if let Some(database) = lookup("JOBD_DB_DATABASE") {
            db = db.with_database(database);
        }
        match (lookup("JOBD_DB_USER"), lookup("JOBD_DB_PASS")) {
            (Some(user), Some(pass)) => db = db.with_credentials(user, pass),
            (None, None) => {}
            _ => return Err(SettingsError::PartialCredentials),
        }

        let mut worker = WorkerConfig::default();
        if let Some(ms) = number(&lookup, "JOBD_POLL_INTERVAL_MS")? {
            worker = worker.with_poll_interval(Duration::from_millis(ms));
        }

        let mut producers = ProducerConfig::default();
        if let Some(tables) = lookup("JOBD_TABLES") {
            producers.tables = tables
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(days) = number(&lookup, "JOBD_RETENTION_DAYS")? {
            producers.retention_days = u32::try_from(days).map_err(|_| SettingsError::NotANumber {
                var: "JOBD_RETENTION_DAYS",
                value: days.to_string(),
            })?;
        }

        Ok(Self {
            db,
            worker,
            producers,
        })
    }
}

fn number(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<u64>, SettingsError> {
    lookup(var)
        .map(|value| {
            value
                .trim()
                .parse::<u64>()
                .map_err(|_| SettingsError::NotANumber { var, value })
        })
        .transpose()
}
