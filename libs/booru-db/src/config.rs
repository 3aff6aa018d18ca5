//! Connection and pool settings.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};

/// Where the `MySQL` server lives and how to log in.
///
/// The password is never serialized and prints as `[REDACTED]`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    #[serde(skip_serializing)]
    pub password: Option<SecretString>,
    pub dbname: String,
    pub pool: PoolCfg,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_owned(),
            port: 3306,
            user: "booru".to_owned(),
            password: None,
            dbname: "booru".to_owned(),
            pool: PoolCfg::default(),
        }
    }
}

impl DbConfig {
    /// Typed connect options for the `SQLx` driver.
    #[must_use]
    pub fn connect_options(&self) -> MySqlConnectOptions {
        let opts = MySqlConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .database(&self.dbname);
        match &self.password {
            Some(password) => opts.password(password.expose_secret()),
            None => opts,
        }
    }

    /// `mysql://user@host:port/db`, without the password. For logs.
    #[must_use]
    pub fn redacted_url(&self) -> String {
        format!(
            "mysql://{}@{}:{}/{}",
            self.user, self.host, self.port, self.dbname
        )
    }
}

/// Pool sizing and timeouts. Unset fields keep the driver defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolCfg {
    pub max_conns: Option<u32>,
    pub min_conns: Option<u32>,
    #[serde(with = "humantime_serde")]
    pub acquire_timeout: Option<Duration>,
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Option<Duration>,
    #[serde(with = "humantime_serde")]
    pub max_lifetime: Option<Duration>,
    pub test_before_acquire: bool,
}

impl PoolCfg {
    #[must_use]
    pub fn apply_mysql(&self, mut opts: MySqlPoolOptions) -> MySqlPoolOptions {
        if let Some(n) = self.max_conns {
            opts = opts.max_connections(n);
        }
        if let Some(n) = self.min_conns {
            opts = opts.min_connections(n);
        }
        if let Some(t) = self.acquire_timeout {
            opts = opts.acquire_timeout(t);
        }
        if let Some(t) = self.idle_timeout {
            opts = opts.idle_timeout(t);
        }
        if let Some(t) = self.max_lifetime {
            opts = opts.max_lifetime(t);
        }
        if self.test_before_acquire {
            opts = opts.test_before_acquire(true);
        }
        opts
    }
}
