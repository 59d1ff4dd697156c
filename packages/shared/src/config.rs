use std::fmt;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    Missing(String),
    Invalid { key: String, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "{} environment variable must be set", key),
            ConfigError::Invalid { key, value } => {
                write!(f, "{} has an invalid value: {}", key, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

fn invalid(key: &str, value: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        value: value.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    DynamoDb,
}

impl FromStr for StorageBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "dynamodb" => Ok(StorageBackend::DynamoDb),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub bind_address: String,
    pub jwt_secret: String,
    pub rating_window: i32,
    pub grace_period: Duration,
    pub retention: Duration,
    pub sweep_interval: Duration,
    pub clock_tick: Duration,
    pub min_move_interval: Duration,
    pub persist_queue_capacity: usize,
    pub persist_max_attempts: u32,
    pub persist_backoff: Duration,
    pub suggestion_url: Option<String>,
    pub suggestion_timeout: Duration,
    pub storage_backend: StorageBackend,
    pub rooms_table: String,
    pub match_history_table: String,
    pub users_table: String,
}

impl OrchestratorConfig {
    /// Defaults for everything except the secret.
    pub fn with_jwt_secret(jwt_secret: &str) -> Self {
        OrchestratorConfig {
            bind_address: "0.0.0.0:8080".to_string(),
            jwt_secret: jwt_secret.to_string(),
            rating_window: 200,
            grace_period: Duration::from_secs(60),
            retention: Duration::from_secs(600),
            sweep_interval: Duration::from_secs(60),
            clock_tick: Duration::from_millis(1000),
            min_move_interval: Duration::from_millis(300),
            persist_queue_capacity: 1024,
            persist_max_attempts: 3,
            persist_backoff: Duration::from_millis(200),
            suggestion_url: None,
            suggestion_timeout: Duration::from_millis(2000),
            storage_backend: StorageBackend::Memory,
            rooms_table: "rooms".to_string(),
            match_history_table: "match_history".to_string(),
            users_table: "users".to_string(),
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt_secret = lookup("JWT_SECRET")
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ConfigError::Missing("JWT_SECRET".to_string()))?;
        let defaults = Self::with_jwt_secret(&jwt_secret);

        let parse = |key: &str| -> Result<Option<u64>, ConfigError> {
            match lookup(key) {
                None => Ok(None),
                Some(value) => value
                    .trim()
                    .parse::<u64>()
                    .map(Some)
                    .map_err(|_| invalid(key, value)),
            }
        };
        // Zero would stall a ticker or a channel.
        let positive = |key: &str| -> Result<Option<u64>, ConfigError> {
            match parse(key)? {
                Some(0) => Err(invalid(key, 0)),
                other => Ok(other),
            }
        };
        let secs = |key: &str, default: Duration| -> Result<Duration, ConfigError> {
            Ok(parse(key)?.map(Duration::from_secs).unwrap_or(default))
        };
        let millis = |key: &str, default: Duration| -> Result<Duration, ConfigError> {
            Ok(parse(key)?.map(Duration::from_millis).unwrap_or(default))
        };

        let storage_backend = match lookup("STORAGE_BACKEND") {
            None => defaults.storage_backend,
            Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
                key: "STORAGE_BACKEND".to_string(),
                value,
            })?,
        };

        let persist_max_attempts = match positive("PERSIST_MAX_ATTEMPTS")? {
            Some(n) => u32::try_from(n).map_err(|_| invalid("PERSIST_MAX_ATTEMPTS", n))?,
            None => defaults.persist_max_attempts,
        };
        let persist_queue_capacity = match positive("PERSIST_QUEUE_CAPACITY")? {
            Some(n) => usize::try_from(n).map_err(|_| invalid("PERSIST_QUEUE_CAPACITY", n))?,
            None => defaults.persist_queue_capacity,
        };
        let rating_window = match parse("RATING_WINDOW")? {
            Some(n) => i32::try_from(n).map_err(|_| invalid("RATING_WINDOW", n))?,
            None => defaults.rating_window,
        };

        Ok(OrchestratorConfig {
            bind_address: lookup("BIND_ADDRESS").unwrap_or(defaults.bind_address.clone()),
            rating_window,
            grace_period: secs("GRACE_PERIOD_SECS", defaults.grace_period)?,
            retention: secs("RETENTION_SECS", defaults.retention)?,
            sweep_interval: positive("SWEEP_INTERVAL_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
            clock_tick: positive("CLOCK_TICK_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.clock_tick),
            min_move_interval: millis("MIN_MOVE_INTERVAL_MS", defaults.min_move_interval)?,
            persist_queue_capacity,
            persist_max_attempts,
            persist_backoff: millis("PERSIST_BACKOFF_MS", defaults.persist_backoff)?,
            suggestion_url: lookup("SUGGESTION_URL").filter(|s| !s.is_empty()),
            suggestion_timeout: millis("SUGGESTION_TIMEOUT_MS", defaults.suggestion_timeout)?,
            storage_backend,
            rooms_table: lookup("ROOMS_TABLE").unwrap_or(defaults.rooms_table.clone()),
            match_history_table: lookup("MATCH_HISTORY_TABLE")
                .unwrap_or(defaults.match_history_table.clone()),
            users_table: lookup("USERS_TABLE").unwrap_or(defaults.users_table.clone()),
            jwt_secret,
        })
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
    fn test_secret_is_required() {
        let result = OrchestratorConfig::from_lookup(lookup(&[]));
        assert_eq!(
            result.unwrap_err(),
            ConfigError::Missing("JWT_SECRET".to_string())
        );
    }

    #[test]
    fn test_defaults_apply() {
        let config = OrchestratorConfig::from_lookup(lookup(&[("JWT_SECRET", "s")])).unwrap();

        assert_eq!(config.rating_window, 200);
        assert_eq!(config.grace_period, Duration::from_secs(60));
        assert_eq!(config.retention, Duration::from_secs(600));
        assert_eq!(config.storage_backend, StorageBackend::Memory);
        assert!(config.suggestion_url.is_none());
    }

    #[test]
    fn test_overrides_are_parsed() {
        let config = OrchestratorConfig::from_lookup(lookup(&[
            ("JWT_SECRET", "s"),
            ("GRACE_PERIOD_SECS", "5"),
            ("CLOCK_TICK_MS", "250"),
            ("STORAGE_BACKEND", "DynamoDB"),
            ("SUGGESTION_URL", "http://engine:9000/suggest"),
        ]))
        .unwrap();

        assert_eq!(config.grace_period, Duration::from_secs(5));
        assert_eq!(config.clock_tick, Duration::from_millis(250));
        assert_eq!(config.storage_backend, StorageBackend::DynamoDb);
        assert_eq!(
            config.suggestion_url.as_deref(),
            Some("http://engine:9000/suggest")
        );
    }

    #[test]
    fn test_invalid_number_is_rejected() {
        let result = OrchestratorConfig::from_lookup(lookup(&[
            ("JWT_SECRET", "s"),
            ("RATING_WINDOW", "wide"),
        ]));
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_zero_tick_and_sweep_are_rejected() {
        for key in ["CLOCK_TICK_MS", "SWEEP_INTERVAL_SECS", "PERSIST_QUEUE_CAPACITY"] {
            let result = OrchestratorConfig::from_lookup(lookup(&[("JWT_SECRET", "s"), (key, "0")]));

            assert_eq!(
                result.unwrap_err(),
                ConfigError::Invalid {
                    key: key.to_string(),
                    value: "0".to_string(),
                }
            );
        }
    }

    #[test]
    fn test_rating_window_out_of_range_is_rejected() {
        let result = OrchestratorConfig::from_lookup(lookup(&[
            ("JWT_SECRET", "s"),
            ("RATING_WINDOW", "4294967296"),
        ]));
        assert!(matches!(result, Err(ConfigError::Invalid { key, .. }) if key == "RATING_WINDOW"));
    }
}
