//! Execution context exposed to transformations as `$DAG_CONTEXT`

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{json, Value};

use crate::error::{Result, TyphoonError};
use crate::util::EXECUTION_DATE_FORMAT;

/// Per-execution facts about the run
#[derive(Debug, Clone, PartialEq)]
pub struct DagContext {
    pub dag_name: String,
    pub execution_date: NaiveDateTime,
    /// Wall-clock time the execution started
    pub etl_timestamp: DateTime<Utc>,
}

impl DagContext {
    pub fn new(dag_name: impl Into<String>, execution_date: NaiveDateTime) -> Self {
        Self {
            dag_name: dag_name.into(),
            execution_date,
            etl_timestamp: Utc::now(),
        }
    }

    /// Parse an execution date in `YYYY-MM-DDTHH:MM` form
    pub fn parse(dag_name: impl Into<String>, execution_date: &str) -> Result<Self> {
        let date = NaiveDateTime::parse_from_str(execution_date.trim(), EXECUTION_DATE_FORMAT)
            .map_err(|e| TyphoonError::ConfigError {
                reason: format!(
                    "invalid execution date '{}' (expected YYYY-MM-DDTHH:MM): {}",
                    execution_date, e
                ),
            })?;
        Ok(Self::new(dag_name, date))
    }

    /// Context for "now", truncated to the minute
    pub fn now(dag_name: impl Into<String>) -> Self {
        let now = Utc::now().naive_utc();
        let truncated = NaiveDateTime::parse_from_str(
            &now.format(EXECUTION_DATE_FORMAT).to_string(),
            EXECUTION_DATE_FORMAT,
        )
        .unwrap_or(now);
        Self::new(dag_name, truncated)
    }

    pub fn ts(&self) -> String {
        self.execution_date.format(EXECUTION_DATE_FORMAT).to_string()
    }

    pub fn ds(&self) -> String {
        self.execution_date.format("%Y-%m-%d").to_string()
    }

    pub fn ds_nodash(&self) -> String {
        self.execution_date.format("%Y%m%d").to_string()
    }

    /// Mapping bound to `dag_context` in expressions
    pub fn to_value(&self) -> Value {
        json!({
            "execution_date": self.execution_date.format("%Y-%m-%dT%H:%M:%S").to_string(),
            "etl_timestamp": self.etl_timestamp.to_rfc3339(),
            "ts": self.ts(),
            "ds": self.ds(),
            "ds_nodash": self.ds_nodash(),
            "dag_name": self.dag_name,
        })
    }
}
