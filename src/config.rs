use crate::error::ConfigError;
use crate::pow::{DIFFICULTY, MAX_DIFFICULTY};
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub difficulty: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: "127.0.0.1".to_string(),
            port: 9095,
            data_dir: PathBuf::from("data"),
            difficulty: DIFFICULTY,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds a config from an arbitrary variable source; unset names take
    /// their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let host = lookup("SERVER_HOST").unwrap_or(defaults.host);

        let port = match lookup("SERVER_PORT") {
            Some(value) => value.parse::<u16>().map_err(|_| ConfigError::Invalid {
                name: "SERVER_PORT",
                expected: "a valid u16",
                value,
            })?,
            None => defaults.port,
        };

        let data_dir = lookup("LEDGER_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);

        let difficulty = match lookup("LEDGER_DIFFICULTY") {
            Some(value) => match value.parse::<usize>() {
                Ok(d) if (1..=MAX_DIFFICULTY).contains(&d) => d,
                _ => {
                    return Err(ConfigError::Invalid {
                        name: "LEDGER_DIFFICULTY",
                        expected: "an integer between 1 and 8",
                        value,
                    })
                }
            },
            None => defaults.difficulty,
        };

        Ok(Config {
            host,
            port,
            data_dir,
            difficulty,
        })
    }

    pub fn bind_address(&self) -> (String, u16) {
        (self.host.clone(), self.port)
    }
}
