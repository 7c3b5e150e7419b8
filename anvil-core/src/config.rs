// Copyright 2026 Anvil Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Ambient configuration loading: layered defaults → TOML file → environment, with a
//! dump-and-exit escape hatch shared by every bootable process in this family.

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    #[serde(with = "humantime_serde")]
    pub initial_interval: Duration,
    pub multiplier: f64,
    #[serde(with = "humantime_serde")]
    pub max_interval: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_interval: Duration::from_millis(100),
            multiplier: 2.0,
            max_interval: Duration::from_secs(5),
        }
    }
}

impl RetryConfig {
    /// Computes the delay before attempt `attempt` (0-indexed), capped at `max_interval`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let scaled = self.initial_interval.as_secs_f64() * self.multiplier.powi(attempt as i32);
        Duration::from_secs_f64(scaled).min(self.max_interval)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TracingConfig {
    pub filter: String,
    pub json: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

/// Loads a typed configuration value from (in increasing priority) built-in defaults, an
/// optional TOML file, and `SCREAMING_SNAKE_CASE` environment variables under `env_prefix`.
pub struct ConfigLoader<T> {
    pub config_file_name: PathBuf,
    pub env_prefix: String,
    _marker: std::marker::PhantomData<T>,
}

impl<T> ConfigLoader<T>
where
    T: Default + Serialize + DeserializeOwned,
{
    pub fn new(config_file_name: impl Into<PathBuf>, env_prefix: impl Into<String>) -> Self {
        Self {
            config_file_name: config_file_name.into(),
            env_prefix: env_prefix.into(),
            _marker: std::marker::PhantomData,
        }
    }

    pub fn load(&self) -> figment::Result<T> {
        let mut figment = Figment::from(Serialized::defaults(T::default()));
        if self.config_file_name.exists() {
            figment = figment.merge(Toml::file(&self.config_file_name));
        }
        figment
            .merge(Env::prefixed(&format!("{}_", self.env_prefix)).split("__"))
            .extract()
    }

    /// Loads normally, or — if invoked with `--dump-config` — prints the effective,
    /// redacted configuration to stdout and returns `None` so the caller exits without
    /// binding any sockets.
    pub fn load_or_dump_config(&self) -> Option<T>
    where
        T: std::fmt::Debug,
    {
        if std::env::args().any(|arg| arg == "--dump-config") {
            match self.load() {
                Ok(config) => {
                    println!("{config:#?}");
                }
                Err(err) => {
                    eprintln!("failed to load configuration: {err}");
                }
            }
            None
        } else {
            match self.load() {
                Ok(config) => Some(config),
                Err(err) => {
                    eprintln!("failed to load configuration: {err}");
                    None
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_delay_grows_geometrically_and_caps() {
        let retry = RetryConfig {
            max_attempts: 5,
            initial_interval: Duration::from_millis(100),
            multiplier: 2.0,
            max_interval: Duration::from_secs(1),
        };
        assert_eq!(retry.delay_for(0), Duration::from_millis(100));
        assert_eq!(retry.delay_for(1), Duration::from_millis(200));
        assert_eq!(retry.delay_for(10), Duration::from_secs(1));
    }
}
