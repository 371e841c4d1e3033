//! Target-environment parameters baked into an artifact

use serde::{Deserialize, Serialize};

use crate::util::DEFAULT_LAMBDA_TIMEOUT;

/// Deployment environment an artifact is generated for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetEnv {
    pub environment: String,
    #[serde(default = "default_connections_table")]
    pub connections_table_name: String,
    #[serde(default = "default_variables_table")]
    pub variables_table_name: String,
    /// Serverless invocation timeout, in seconds
    #[serde(default = "default_timeout")]
    pub lambda_function_timeout: u64,
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

impl TargetEnv {
    /// Environment with default table names and timeout
    pub fn new(environment: impl Into<String>) -> Self {
        Self {
            environment: environment.into(),
            connections_table_name: default_connections_table(),
            variables_table_name: default_variables_table(),
            lambda_function_timeout: default_timeout(),
        }
    }
}

impl Default for TargetEnv {
    fn default() -> Self {
        Self::new("dev")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_tables_fill_defaults() {
        let target: TargetEnv = toml::from_str(
            r#"
            environment = "prod"
            lambda_function_timeout = 120
            "#,
        )
        .unwrap();
        assert_eq!(target.environment, "prod");
        assert_eq!(target.connections_table_name, "typhoon_connections");
        assert_eq!(target.lambda_function_timeout, 120);
    }
}
