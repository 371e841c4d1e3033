//! Typhoon Configuration Module
//!
//! Project settings live in `<typhoon_home>/typhoonconfig.toml`:
//!
//! ```toml
//! default_environment = "dev"
//!
//! [environments.dev]
//! connections_table_name = "typhoon_connections"
//! variables_table_name = "typhoon_variables"
//! lambda_function_timeout = 50
//!
//! [environments.prod]
//! iam_role_name = "typhoon-prod"
//! ```
//!
//! ## Priority Order (highest to lowest)
//!
//! 1. Environment variables (`TYPHOON_HOME`, `TYPHOON_ENV`), via `with_env()`
//! 2. Config file
//! 3. Defaults
//!
//! Only the binary calls `with_env()`; library code is handed a config or a
//! `TargetEnv` explicitly.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::codegen::TargetEnv;
use crate::error::{Result, TyphoonError};
use crate::util::{CONFIG_FILE_NAME, DEFAULT_LAMBDA_TIMEOUT};

/// Environment variable naming the typhoon home directory
pub const HOME_VAR: &str = "TYPHOON_HOME";
/// Environment variable selecting the target environment
pub const ENV_VAR: &str = "TYPHOON_ENV";

const FALLBACK_ENVIRONMENT: &str = "dev";

/// One `[environments.<name>]` table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnvironmentConfig {
    #[serde(default = "default_connections_table")]
    pub connections_table_name: String,
    #[serde(default = "default_variables_table")]
    pub variables_table_name: String,
    /// Seconds
    #[serde(default = "default_timeout")]
    pub lambda_function_timeout: u64,
    pub iam_role_name: Option<String>,
}

fn default_connections_table() -> String {
    "typhoon_connections".to_string()
}

fn default_variables_table() -> String {
    "typhoon_variables".to_string()
}

fn default_timeout() -> u64 {
    DEFAULT_LAMBDA_TIMEOUT
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            connections_table_name: default_connections_table(),
            variables_table_name: default_variables_table(),
            lambda_function_timeout: default_timeout(),
            iam_role_name: None,
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TyphoonConfig {
    /// Directory holding the config file, `dags/` and `out/`
    #[serde(skip)]
    pub home: PathBuf,

    /// Environment override (`TYPHOON_ENV`)
    #[serde(skip)]
    pub selected_environment: Option<String>,

    pub default_environment: Option<String>,

    #[serde(default)]
    pub environments: BTreeMap<String, EnvironmentConfig>,
}

impl TyphoonConfig {
    /// Config file path under `home`
    pub fn config_path(home: &Path) -> PathBuf {
        home.join(CONFIG_FILE_NAME)
    }

    /// Load the config of `home`.
    ///
    /// Returns a default config if the file doesn't exist, an error if it
    /// exists but is malformed.
    pub fn load(home: impl Into<PathBuf>) -> Result<Self> {
        let home = home.into();
        let path = Self::config_path(&home);

        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self {
                home,
                ..Self::default()
            });
        }

        let content = fs::read_to_string(&path).map_err(|e| TyphoonError::ConfigError {
            reason: format!("Failed to read {}: {}", path.display(), e),
        })?;
        let mut config = Self::from_toml(&content)?;
        config.home = home;
        Ok(config)
    }

    /// Parse config text; `home` is left empty
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| TyphoonError::ConfigError {
            reason: format!("Failed to parse config file: {}", e),
        })
    }

    /// Apply `TYPHOON_HOME` and `TYPHOON_ENV`.
    ///
    /// A different home reloads the config file found there.
    pub fn with_env(mut self) -> Result<Self> {
        if let Some(home) = non_empty_var(HOME_VAR) {
            let home = PathBuf::from(home);
            if home != self.home {
                let selected = self.selected_environment.take();
                self = Self::load(home)?;
                self.selected_environment = selected;
            }
        }
        if let Some(env) = non_empty_var(ENV_VAR) {
            self.selected_environment = Some(env);
        }
        Ok(self)
    }

    /// Environment in effect: override, then `default_environment`, then `dev`
    pub fn environment(&self) -> &str {
        self.selected_environment
            .as_deref()
            .or(self.default_environment.as_deref())
            .unwrap_or(FALLBACK_ENVIRONMENT)
    }

    /// Target parameters of `env`.
    ///
    /// With no `[environments]` at all every name gets the defaults; once
    /// environments are declared, an undeclared one is an error.
    pub fn target(&self, env: &str) -> Result<TargetEnv> {
        let settings = match self.environments.get(env) {
            Some(settings) => settings.clone(),
            None if self.environments.is_empty() => EnvironmentConfig::default(),
            None => {
                return Err(TyphoonError::UnknownEnvironment {
                    environment: env.to_string(),
                })
            }
        };
        Ok(TargetEnv {
            environment: env.to_string(),
            connections_table_name: settings.connections_table_name,
            variables_table_name: settings.variables_table_name,
            lambda_function_timeout: settings.lambda_function_timeout,
        })
    }

    /// Target of the environment in effect
    pub fn current_target(&self) -> Result<TargetEnv> {
        self.target(self.environment())
    }

    pub fn dags_directory(&self) -> PathBuf {
        self.home.join("dags")
    }

    pub fn out_directory(&self) -> PathBuf {
        self.home.join("out")
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use tempfile::TempDir;

    const CONFIG: &str = r#"
default_environment = "staging"

[environments.staging]
connections_table_name = "conn_staging"
lambda_function_timeout = 90

[environments.prod]
iam_role_name = "typhoon-prod"
"#;

    #[test]
    fn parses_environments_with_defaults() {
        let config = TyphoonConfig::from_toml(CONFIG).unwrap();
        assert_eq!(config.environment(), "staging");

        let staging = config.current_target().unwrap();
        assert_eq!(staging.connections_table_name, "conn_staging");
        assert_eq!(staging.variables_table_name, "typhoon_variables");
        assert_eq!(staging.lambda_function_timeout, 90);

        let prod = &config.environments["prod"];
        assert_eq!(prod.lambda_function_timeout, DEFAULT_LAMBDA_TIMEOUT);
        assert_eq!(prod.iam_role_name.as_deref(), Some("typhoon-prod"));
    }

    #[test]
    fn unknown_environment_is_an_error() {
        let config = TyphoonConfig::from_toml(CONFIG).unwrap();
        let err = config.target("qa").unwrap_err();
        assert_eq!(err.code(), "TYPHOON-061");
    }

    #[test]
    fn empty_config_accepts_any_environment() {
        let config = TyphoonConfig::default();
        assert_eq!(config.environment(), "dev");
        assert_eq!(config.target("anything").unwrap().environment, "anything");
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join(CONFIG_FILE_NAME), "environments = 3").unwrap();
        let err = TyphoonConfig::load(temp_dir.path()).unwrap_err();
        assert_eq!(err.code(), "TYPHOON-060");
    }

    #[test]
    fn directories_hang_off_home() {
        let temp_dir = TempDir::new().unwrap();
        let config = TyphoonConfig::load(temp_dir.path()).unwrap();
        assert_eq!(config.dags_directory(), temp_dir.path().join("dags"));
        assert_eq!(config.out_directory(), temp_dir.path().join("out"));
    }

    #[test]
    #[serial]
    fn env_overrides_config() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join(CONFIG_FILE_NAME), CONFIG).unwrap();

        env::set_var(HOME_VAR, temp_dir.path());
        env::set_var(ENV_VAR, "prod");
        let config = TyphoonConfig::default().with_env();
        env::remove_var(HOME_VAR);
        env::remove_var(ENV_VAR);

        let config = config.unwrap();
        assert_eq!(config.home, temp_dir.path());
        assert_eq!(config.environment(), "prod");
        assert_eq!(config.current_target().unwrap().environment, "prod");
    }
}
