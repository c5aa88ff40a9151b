//! Connection parameters resolved from libpq-style environment variables.

use std::env;
use std::fmt;
use thiserror::Error;

/// Loopback default used when `PGHOST` is unset.
pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 5432;
pub const DEFAULT_DATABASE: &str = "pgxbench";
/// Every pool under test is capped at this many connections.
pub const POOL_SIZE: u32 = 10;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid value for environment variable {var}: {reason}")]
    InvalidEnvValue { var: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnConfig {
    /// Host name, IP address, or an absolute Unix socket directory.
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    pub database: String,
    pub pool_size: u32,
}

impl ConnConfig {
    /// Resolve the configuration from the process environment, honoring a
    /// `.env` file in the working directory when one exists.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            log::debug!("Loaded environment overrides from {}", path.display());
        }
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Resolve the configuration through an arbitrary variable lookup.
    ///
    /// Empty values are treated the same as unset ones.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let host = get("PGHOST").unwrap_or_else(|| DEFAULT_HOST.to_string());

        let port = match get("PGPORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|err| ConfigError::InvalidEnvValue {
                    var: "PGPORT".to_string(),
                    reason: format!("{raw:?} is not a port number ({err})"),
                })?,
            None => DEFAULT_PORT,
        };

        let user = get("PGUSER")
            .or_else(|| get("USER"))
            .or_else(|| get("USERNAME"))
            .ok_or_else(|| ConfigError::MissingEnvVar("PGUSER".to_string()))?;

        let database = get("PGDATABASE").unwrap_or_else(|| DEFAULT_DATABASE.to_string());

        Ok(Self {
            host,
            port,
            user,
            password: get("PGPASSWORD"),
            database,
            pool_size: POOL_SIZE,
        })
    }

    /// True when `host` names a Unix socket directory rather than a TCP host.
    pub fn is_unix_socket(&self) -> bool {
        self.host.starts_with('/')
    }
}

// Never prints the password.
impl fmt::Display for ConnConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "host={} port={} user={} dbname={} pool_size={}",
            self.host, self.port, self.user, self.database, self.pool_size
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_os_user_is_set() {
        let config = ConnConfig::from_lookup(lookup(&[("USER", "alice")])).unwrap();
        assert_eq!(config.host, DEFAULT_HOST);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.user, "alice");
        assert_eq!(config.database, DEFAULT_DATABASE);
        assert_eq!(config.password, None);
        assert_eq!(config.pool_size, 10);
    }

    #[test]
    fn libpq_variables_override_defaults() {
        let config = ConnConfig::from_lookup(lookup(&[
            ("PGHOST", "db.internal"),
            ("PGPORT", "6543"),
            ("PGUSER", "bench"),
            ("PGPASSWORD", "secret"),
            ("PGDATABASE", "drivers"),
            ("USER", "alice"),
        ]))
        .unwrap();
        assert_eq!(config.host, "db.internal");
        assert_eq!(config.port, 6543);
        assert_eq!(config.user, "bench");
        assert_eq!(config.password.as_deref(), Some("secret"));
        assert_eq!(config.database, "drivers");
    }

    #[test]
    fn empty_values_fall_back_to_defaults() {
        let config =
            ConnConfig::from_lookup(lookup(&[("PGHOST", ""), ("PGUSER", " "), ("USER", "bob")]))
                .unwrap();
        assert_eq!(config.host, DEFAULT_HOST);
        assert_eq!(config.user, "bob");
    }

    #[test]
    fn username_is_used_when_user_is_missing() {
        let config = ConnConfig::from_lookup(lookup(&[("USERNAME", "carol")])).unwrap();
        assert_eq!(config.user, "carol");
    }

    #[test]
    fn invalid_port_is_rejected() {
        let err = ConnConfig::from_lookup(lookup(&[("PGPORT", "postgres"), ("USER", "alice")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvValue { ref var, .. } if var == "PGPORT"));
    }

    #[test]
    fn missing_user_is_an_error() {
        let err = ConnConfig::from_lookup(lookup(&[])).unwrap_err();
        assert_eq!(err, ConfigError::MissingEnvVar("PGUSER".to_string()));
    }

    #[test]
    fn display_hides_password() {
        let config =
            ConnConfig::from_lookup(lookup(&[("USER", "alice"), ("PGPASSWORD", "hunter2")]))
                .unwrap();
        let shown = config.to_string();
        assert!(!shown.contains("hunter2"));
        assert!(shown.contains("user=alice"));
    }

    #[test]
    fn absolute_host_is_a_unix_socket() {
        let config =
            ConnConfig::from_lookup(lookup(&[("PGHOST", "/var/run/postgresql"), ("USER", "a")]))
                .unwrap();
        assert!(config.is_unix_socket());
    }
}
