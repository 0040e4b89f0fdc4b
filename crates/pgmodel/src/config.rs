//! Database connection settings.
//!
//! Settings come from a URL, a TOML document (`[database]` table), or the
//! environment. String values in TOML may reference environment variables as
//! `${NAME}`.

use crate::error::{OrmError, OrmResult};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    /// Full connection URL; takes precedence over the discrete fields.
    pub url: Option<String>,
    pub user: String,
    pub password: Option<String>,
    pub database: String,
    pub host: String,
    pub port: u16,
    /// Maximum pooled connections.
    pub pool_size: usize,
    /// Bounded wait for connecting and for acquiring a pooled connection.
    pub connection_timeout_ms: u64,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: None,
            user: "postgres".to_string(),
            password: None,
            database: "postgres".to_string(),
            host: "localhost".to_string(),
            port: 5432,
            pool_size: 10,
            connection_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    database: DbConfig,
}

impl DbConfig {
    /// Settings from a `postgres://` URL, other fields at their defaults.
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    /// Parse a TOML document with a `[database]` table.
    pub fn from_toml_str(raw: &str) -> OrmResult<Self> {
        let file: ConfigFile = toml::from_str(raw)?;
        let mut config = file.database;
        config.expand_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML config file.
    pub fn from_file(path: impl AsRef<Path>) -> OrmResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            OrmError::Config(format!("failed to read config file {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&raw)
            .map_err(|e| OrmError::Config(format!("{}: {e}", path.display())))
    }

    /// Settings from the process environment.
    ///
    /// `DATABASE_URL` wins when set; otherwise `PGUSER`, `PGPASSWORD`,
    /// `PGDATABASE`, `PGHOST` and `PGPORT` are read. `DB_POOL_SIZE` and
    /// `DB_CONNECTION_TIMEOUT_MS` tune the pool either way.
    pub fn from_env() -> OrmResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> OrmResult<Self> {
        let mut config = match lookup("DATABASE_URL") {
            Some(url) => Self::from_url(url),
            None => {
                let defaults = Self::default();
                Self {
                    user: lookup("PGUSER").unwrap_or(defaults.user),
                    password: lookup("PGPASSWORD"),
                    database: lookup("PGDATABASE").unwrap_or(defaults.database),
                    host: lookup("PGHOST").unwrap_or(defaults.host),
                    port: parse_var("PGPORT", lookup("PGPORT"))?.unwrap_or(defaults.port),
                    ..defaults
                }
            }
        };
        if let Some(size) = parse_var("DB_POOL_SIZE", lookup("DB_POOL_SIZE"))? {
            config.pool_size = size;
        }
        let timeout = lookup("DB_CONNECTION_TIMEOUT_MS");
        if let Some(ms) = parse_var("DB_CONNECTION_TIMEOUT_MS", timeout)? {
            config.connection_timeout_ms = ms;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> OrmResult<()> {
        if self.pool_size == 0 {
            return Err(OrmError::Config("pool_size must be at least 1".to_string()));
        }
        if self.connection_timeout_ms == 0 {
            return Err(OrmError::Config(
                "connection_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.url.is_none() && self.database.is_empty() {
            return Err(OrmError::Config("database name is empty".to_string()));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    /// Driver-level connection settings.
    pub fn pg_config(&self) -> OrmResult<tokio_postgres::Config> {
        let mut pg = match &self.url {
            Some(url) => url
                .parse::<tokio_postgres::Config>()
                .map_err(|e| OrmError::Config(format!("invalid database url: {e}")))?,
            None => {
                let mut pg = tokio_postgres::Config::new();
                pg.user(&self.user)
                    .dbname(&self.database)
                    .host(&self.host)
                    .port(self.port);
                if let Some(password) = &self.password {
                    pg.password(password);
                }
                pg
            }
        };
        if pg.get_connect_timeout().is_none() {
            pg.connect_timeout(self.connect_timeout());
        }
        Ok(pg)
    }

    fn expand_env(&mut self) -> OrmResult<()> {
        if let Some(url) = self.url.as_mut() {
            *url = expand_env_vars(url)?;
        }
        if let Some(password) = self.password.as_mut() {
            *password = expand_env_vars(password)?;
        }
        self.user = expand_env_vars(&self.user)?;
        self.host = expand_env_vars(&self.host)?;
        self.database = expand_env_vars(&self.database)?;
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: Option<String>) -> OrmResult<Option<T>> {
    value
        .map(|v| {
            v.trim()
                .parse::<T>()
                .map_err(|_| OrmError::Config(format!("{key} is not a valid number: {v}")))
        })
        .transpose()
}

/// Expand `${NAME}` references from the environment.
fn expand_env_vars(input: &str) -> OrmResult<String> {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next();

            let mut key = String::new();
            let mut closed = false;
            for ch in chars.by_ref() {
                if ch == '}' {
                    closed = true;
                    break;
                }
                key.push(ch);
            }

            if !closed {
                return Err(OrmError::Config(format!(
                    "unterminated env var reference: ${{{key}}}"
                )));
            }
            let value = std::env::var(&key)
                .map_err(|_| OrmError::Config(format!("missing env var for config: {key}")))?;
            out.push_str(&value);
            continue;
        }
        out.push(c);
    }

    Ok(out)
}
