use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the process environment so it can be tested with a plain
/// `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let invalid = |var: &str, e: &dyn std::fmt::Display| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason: e.to_string(),
    };

    let parse_addr = |var: &str, default: &str| -> Result<SocketAddr, ConfigError> {
        or_default(var, default)
            .parse::<SocketAddr>()
            .map_err(|e| invalid(var, &e))
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, &e))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, &e))
    };

    let parse_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        or_default(var, default)
            .parse::<usize>()
            .map_err(|e| invalid(var, &e))
    };

    let database_url = require("DATABASE_URL")?;
    let env = parse_environment(&or_default("SPECBLOCK_ENV", "development"));
    let bind_addr = parse_addr("SPECBLOCK_BIND_ADDR", "0.0.0.0:3000")?;
    let log_level = or_default("SPECBLOCK_LOG_LEVEL", "info");
    let api_keys = parse_api_keys(&or_default("SPECBLOCK_API_KEYS", ""));

    let db_max_connections = parse_u32("SPECBLOCK_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("SPECBLOCK_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("SPECBLOCK_DB_ACQUIRE_TIMEOUT_SECS", "10")?;
    let storefront_rate_limit_per_min =
        parse_usize("SPECBLOCK_STOREFRONT_RATE_LIMIT_PER_MIN", "600")?;

    if storefront_rate_limit_per_min == 0 {
        return Err(ConfigError::InvalidEnvVar {
            var: "SPECBLOCK_STOREFRONT_RATE_LIMIT_PER_MIN".to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }

    if api_keys.is_empty() && env != Environment::Development {
        return Err(ConfigError::MissingEnvVar("SPECBLOCK_API_KEYS".to_string()));
    }

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        api_keys,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        storefront_rate_limit_per_min,
    })
}

/// Parse a string into an `Environment` variant.
///
/// Unrecognized values default to `Environment::Development`.
fn parse_environment(s: &str) -> Environment {
    match s {
        "production" => Environment::Production,
        "test" => Environment::Test,
        _ => Environment::Development,
    }
}

fn parse_api_keys(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}
