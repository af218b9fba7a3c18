//! Server configuration from environment variables.

use spring83::difficulty::DifficultyGate;
use spring83::{Publisher, Result, SpringError};
use std::path::PathBuf;

pub const ENV_HOST: &str = "HOST";
pub const ENV_PORT: &str = "PORT";
pub const ENV_STORE: &str = "STORE";
pub const ENV_TTL: &str = "TTL";
pub const ENV_TITLE: &str = "TITLE";
pub const ENV_ADMIN: &str = "ADMIN_BOARD";
pub const ENV_BLOCKLIST: &str = "BLOCKLIST";
pub const ENV_DIFFICULTY: &str = "DIFFICULTY";
pub const ENV_NUM_BOARDS: &str = "NUM_BOARDS";

/// Every supported variable with its default
const ENV_DEFAULTS: &[(&str, &str)] = &[
    (ENV_HOST, ""),
    (ENV_PORT, "8080"),
    (ENV_STORE, "store"),
    (ENV_TTL, "22"),
    (ENV_TITLE, "s83d"),
    (ENV_ADMIN, ""),
    (ENV_BLOCKLIST, ""),
    (ENV_DIFFICULTY, "off"),
    (ENV_NUM_BOARDS, "0"),
];

/// Allowed board lifetime in days
pub const MIN_TTL_DAYS: i64 = 7;
pub const MAX_TTL_DAYS: i64 = 22;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub store: PathBuf,
    pub ttl_days: i64,
    pub title: String,
    pub admin: Option<Publisher>,
    /// Extra blocked keys, on top of the built-in infernal key
    pub blocklist: Vec<Publisher>,
    pub difficulty: DifficultyGate,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a config from `lookup`, where empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| -> String {
            lookup(name).filter(|v| !v.is_empty()).unwrap_or_else(|| {
                ENV_DEFAULTS
                    .iter()
                    .find(|(n, _)| *n == name)
                    .map(|(_, d)| d.to_string())
                    .unwrap_or_default()
            })
        };

        let port = parse_number::<u16>(ENV_PORT, &var(ENV_PORT))?;
        let ttl_days = parse_number::<i64>(ENV_TTL, &var(ENV_TTL))?;
        if !(MIN_TTL_DAYS..=MAX_TTL_DAYS).contains(&ttl_days) {
            return Err(SpringError::config(format!(
                "invalid TTL ({ttl_days}), must not be less than {MIN_TTL_DAYS} or more than {MAX_TTL_DAYS} days"
            )));
        }

        let admin = match var(ENV_ADMIN) {
            key if key.is_empty() => None,
            key => Some(Publisher::from_hex(&key).map_err(|e| {
                SpringError::config(format!("invalid {ENV_ADMIN} ({key}): {e}"))
            })?),
        };

        let blocklist = var(ENV_BLOCKLIST)
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(|k| {
                Publisher::from_hex(k)
                    .map_err(|e| SpringError::config(format!("invalid {ENV_BLOCKLIST} key ({k}): {e}")))
            })
            .collect::<Result<Vec<_>>>()?;

        let seed = parse_number::<usize>(ENV_NUM_BOARDS, &var(ENV_NUM_BOARDS))?;
        let difficulty = match var(ENV_DIFFICULTY).to_ascii_lowercase().as_str() {
            "on" | "true" | "1" => DifficultyGate::enabled(seed),
            "off" | "false" | "0" => DifficultyGate::disabled(),
            other => {
                return Err(SpringError::config(format!(
                    "invalid {ENV_DIFFICULTY} ({other}), use on or off"
                )))
            }
        };

        Ok(Self {
            host: var(ENV_HOST),
            port,
            store: PathBuf::from(var(ENV_STORE)),
            ttl_days,
            title: var(ENV_TITLE),
            admin,
            blocklist,
            difficulty,
        })
    }

    /// Listen address; an empty host means every interface.
    pub fn address(&self) -> String {
        let host = if self.host.is_empty() {
            "0.0.0.0"
        } else {
            &self.host
        };
        format!("{}:{}", host, self.port)
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| SpringError::config(format!("failed parsing number for {name}: {value}")))
}

/// Print the supported environment variables
pub fn print_usage() {
    println!("Usage: s83d is configured using environment variables.");
    println!();
    println!("For example: `PORT=8383 s83d`");
    println!();
    println!("{:<16} default", "variable");
    println!("{:<16} -------", "--------");
    for (name, default) in ENV_DEFAULTS {
        println!("{:<16} {}", name, default);
    }
}
