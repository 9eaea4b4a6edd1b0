use std::env;
use std::net::SocketAddr;

use thiserror::Error;

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";
pub const DEFAULT_SPENDING_COST: i32 = 200;
pub const DEFAULT_SUBMISSION_CATEGORY: &str = "submissions";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set in .env")]
    Missing(&'static str),
    #[error("{var} has an invalid value: {value:?}")]
    Invalid { var: &'static str, value: String },
}

/// Runtime settings, read once at start-up and handed to every handler through the context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub gateway_url: String,
    pub earning_review_channel_id: String,
    pub spending_review_channel_id: String,
    pub earning_approved_channel_id: String,
    pub spending_approved_channel_id: String,
    pub spending_cost: i32,
    pub submission_category: String,
}

impl Config {
    /// Loads `.env` (if present) and reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |var: &'static str| -> Result<String, ConfigError> {
            lookup(var)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::Missing(var))
        };

        let bind_addr = match lookup("BIND_ADDR") {
            Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
                var: "BIND_ADDR",
                value,
            })?,
            None => DEFAULT_BIND_ADDR
                .parse()
                .map_err(|_| ConfigError::Invalid {
                    var: "BIND_ADDR",
                    value: DEFAULT_BIND_ADDR.to_string(),
                })?,
        };

        let spending_cost = match lookup("SPENDING_COST") {
            Some(value) => match value.trim().parse::<i32>() {
                Ok(cost) if cost > 0 => cost,
                _ => {
                    return Err(ConfigError::Invalid {
                        var: "SPENDING_COST",
                        value,
                    })
                }
            },
            None => DEFAULT_SPENDING_COST,
        };

        Ok(Config {
            database_url: required("DATABASE_URL")?,
            bind_addr,
            gateway_url: required("GATEWAY_URL")?,
            earning_review_channel_id: required("EARNING_REVIEW_CHANNEL_ID")?,
            spending_review_channel_id: required("SPENDING_REVIEW_CHANNEL_ID")?,
            earning_approved_channel_id: required("EARNING_APPROVED_CHANNEL_ID")?,
            spending_approved_channel_id: required("SPENDING_APPROVED_CHANNEL_ID")?,
            spending_cost,
            submission_category: lookup("SUBMISSION_CATEGORY")
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_SUBMISSION_CATEGORY.to_string()),
        })
    }
}

/// Just the database location, for the maintenance binaries.
pub fn database_url_from_env() -> Result<String, ConfigError> {
    dotenvy::dotenv().ok();
    env::var("DATABASE_URL")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing("DATABASE_URL"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_vars() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("DATABASE_URL", "bot.db"),
            ("GATEWAY_URL", "http://127.0.0.1:8080"),
            ("EARNING_REVIEW_CHANNEL_ID", "11"),
            ("SPENDING_REVIEW_CHANNEL_ID", "12"),
            ("EARNING_APPROVED_CHANNEL_ID", "13"),
            ("SPENDING_APPROVED_CHANNEL_ID", "14"),
        ])
    }

    fn load(vars: &HashMap<&'static str, &'static str>) -> Result<Config, ConfigError> {
        Config::from_lookup(|key| vars.get(key).map(|v| v.to_string()))
    }

    #[test]
    fn test_defaults() {
        let config = load(&base_vars()).expect("config loads");
        assert_eq!(config.spending_cost, 200);
        assert_eq!(config.bind_addr.to_string(), DEFAULT_BIND_ADDR);
        assert_eq!(config.submission_category, "submissions");
        assert_eq!(config.earning_review_channel_id, "11");
    }

    #[test]
    fn test_missing_required_variable() {
        let mut vars = base_vars();
        vars.remove("GATEWAY_URL");
        assert_eq!(load(&vars), Err(ConfigError::Missing("GATEWAY_URL")));
    }

    #[test]
    fn test_invalid_spending_cost() {
        let mut vars = base_vars();
        vars.insert("SPENDING_COST", "-5");
        assert!(matches!(
            load(&vars),
            Err(ConfigError::Invalid {
                var: "SPENDING_COST",
                ..
            })
        ));
        vars.insert("SPENDING_COST", "250");
        assert_eq!(load(&vars).expect("config loads").spending_cost, 250);
    }
}
