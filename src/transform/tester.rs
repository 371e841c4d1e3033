//! Interactive transformation tester
//!
//! Runs named parameter chains of one edge against a sample input, the way an
//! editor previews them before the DAG is built:
//!
//! ```json
//! {
//!   "source": "Hi",
//!   "eval_source": false,
//!   "dag_context": {"execution_date": "2024-01-01T00:00", "dag_name": "example"},
//!   "dag_config": {"region": "eu-west-1"},
//!   "edge": {
//!     "key": {"apply": true, "contents": ["$SOURCE.lower()", "$1 + '.csv'"]}
//!   }
//! }
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use super::chain::{evaluate_chain, EvalContext, TransformationResult};
use super::eval::{Interpreter, Scope};
use super::parser::parse;
use crate::error::{Result, TyphoonError};
use crate::registry::FunctionResolver;
use crate::runtime::DagContext;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextRequest {
    pub execution_date: String,
    #[serde(default)]
    pub dag_name: String,
}

/// One parameter's chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamRequest {
    #[serde(default = "default_apply")]
    pub apply: bool,
    #[serde(default)]
    pub contents: Vec<String>,
}

fn default_apply() -> bool {
    true
}

fn default_batch_num() -> u64 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformationRequest {
    pub source: Value,
    /// `source` is an expression (a string) to evaluate rather than a value
    #[serde(default)]
    pub eval_source: bool,
    pub dag_context: ContextRequest,
    #[serde(default)]
    pub dag_config: Map<String, Value>,
    #[serde(default = "default_batch_num")]
    pub batch_num: u64,
    pub edge: IndexMap<String, ParamRequest>,
}

impl TransformationRequest {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// The input value, evaluating it first when `eval_source` is set
    fn source_value(&self, dag_config: &Value, dag_context: &Value) -> Result<Value> {
        if !self.eval_source {
            return Ok(self.source.clone());
        }
        let text = self.source.as_str().ok_or_else(|| TyphoonError::SchemaError {
            location: "source".into(),
            reason: "eval_source requires the source to be an expression string".into(),
        })?;
        let invalid = |e: super::StepError| TyphoonError::InvalidTransformation {
            location: "source".into(),
            reason: e.to_string(),
        };
        let expr = parse(text).map_err(invalid)?;
        let scope = Scope {
            source: &Value::Null,
            results: &[],
            dag_config,
            dag_context,
            batch_num: self.batch_num,
        };
        Interpreter::new(scope).evaluate(&expr).map_err(invalid)
    }

    /// Run every applied parameter chain, in request order
    pub fn run(
        &self,
        resolver: Option<&dyn FunctionResolver>,
    ) -> Result<IndexMap<String, TransformationResult>> {
        let context =
            DagContext::parse(self.dag_context.dag_name.as_str(), &self.dag_context.execution_date)?
                .to_value();
        let config = Value::Object(self.dag_config.clone());
        let source = self.source_value(&config, &context)?;

        let mut ctx = EvalContext::new(&config)
            .with_dag_context(&context)
            .with_batch_num(self.batch_num);
        if let Some(resolver) = resolver {
            ctx = ctx.with_resolver(resolver);
        }

        let mut results = IndexMap::new();
        for (name, param) in self.edge.iter().filter(|(_, p)| p.apply) {
            let outcome = evaluate_chain(&param.contents, source.clone(), &ctx);
            debug!(param = %name, steps = outcome.steps.len(), "transformation preview");
            results.insert(name.clone(), TransformationResult::from_outcome(name, &outcome));
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::FunctionRegistry;
    use crate::transform::ErrorKind;
    use serde_json::json;

    fn request(body: Value) -> TransformationRequest {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn runs_applied_params_in_order() {
        let req = request(json!({
            "source": "Hi",
            "dag_context": {"execution_date": "2024-01-02T03:04", "dag_name": "example"},
            "dag_config": {"suffix": "!"},
            "edge": {
                "lower": {"apply": true, "contents": ["$SOURCE.lower()", "$1 + $DAG_CONFIG.suffix"]},
                "skipped": {"apply": false, "contents": ["1 / 0"]},
                "day": {"contents": ["$DAG_CONTEXT.ds_nodash"]},
            }
        }));
        let results = req.run(None).unwrap();
        assert_eq!(results.keys().collect::<Vec<_>>(), vec!["lower", "day"]);
        assert_eq!(
            results["lower"],
            TransformationResult::Success {
                value: json!("hi!"),
                rendered: "'hi!'".into(),
            }
        );
        assert_eq!(
            results["day"],
            TransformationResult::Success {
                value: json!("20240102"),
                rendered: "'20240102'".into(),
            }
        );
    }

    #[test]
    fn failures_name_the_param() {
        let req = request(json!({
            "source": {"a": 1},
            "dag_context": {"execution_date": "2024-01-02T03:04"},
            "edge": {"table": {"contents": ["$SOURCE['b']"]}}
        }));
        match &req.run(None).unwrap()["table"] {
            TransformationResult::Failure {
                config_item,
                error_kind,
                message,
            } => {
                assert_eq!(config_item, "table");
                assert_eq!(*error_kind, ErrorKind::KeyError);
                assert_eq!(message, "'b'");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn evaluated_source_and_resolver() {
        let registry = FunctionRegistry::new();
        let req = request(json!({
            "source": "[1, 2] + [3]",
            "eval_source": true,
            "dag_context": {"execution_date": "2024-01-02T03:04"},
            "edge": {"json": {"contents": ["typhoon.data.to_json($SOURCE)"]}}
        }));
        let results = req.run(Some(&registry)).unwrap();
        assert_eq!(
            results["json"],
            TransformationResult::Success {
                value: json!("[1,2,3]"),
                rendered: "'[1,2,3]'".into(),
            }
        );
    }

    #[test]
    fn bad_execution_date_is_rejected() {
        let req = request(json!({
            "source": null,
            "dag_context": {"execution_date": "yesterday"},
            "edge": {}
        }));
        assert!(req.run(None).is_err());
    }
}
