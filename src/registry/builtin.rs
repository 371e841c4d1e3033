//! Reserved `typhoon.*` functions
//!
//! Nodes:
//! - `typhoon.flow.emit`: emits `items` (one batch each), `value`, or its input
//! - `typhoon.flow.echo`: passes its input on as a single batch
//! - `typhoon.flow.log`: logs its input and ends the path
//!
//! Transformations:
//! - `typhoon.data.identity`, `typhoon.data.to_json`, `typhoon.data.from_json`,
//!   `typhoon.data.flatten`

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::info;

use crate::util::render;

use super::function::{single_arg, CallError, FnTransform, NodeFunction};
use super::resolver::FunctionRegistry;

struct Emit;

#[async_trait]
impl NodeFunction for Emit {
    async fn call(
        &self,
        input: Option<Value>,
        params: &Map<String, Value>,
    ) -> Result<Vec<Value>, CallError> {
        match (params.get("items"), params.get("value")) {
            (Some(Value::Array(items)), _) => Ok(items.clone()),
            (Some(other), _) => Err(CallError::new(format!(
                "emit: 'items' must be a list, got {}",
                render(other)
            ))),
            (None, Some(value)) => Ok(vec![value.clone()]),
            (None, None) => Ok(vec![input.unwrap_or(Value::Null)]),
        }
    }
}

struct Echo;

#[async_trait]
impl NodeFunction for Echo {
    async fn call(
        &self,
        input: Option<Value>,
        _params: &Map<String, Value>,
    ) -> Result<Vec<Value>, CallError> {
        Ok(vec![input.unwrap_or(Value::Null)])
    }
}

struct Log;

#[async_trait]
impl NodeFunction for Log {
    async fn call(
        &self,
        input: Option<Value>,
        params: &Map<String, Value>,
    ) -> Result<Vec<Value>, CallError> {
        let label = params.get("label").and_then(Value::as_str).unwrap_or("typhoon");
        let rendered = input.as_ref().map_or_else(|| "None".to_string(), render);
        info!(label, value = %rendered, "flow.log");
        Ok(Vec::new())
    }
}

fn flatten(args: &[Value]) -> Result<Value, CallError> {
    match single_arg("flatten", args)? {
        Value::Array(items) => Ok(Value::Array(
            items
                .iter()
                .flat_map(|item| match item {
                    Value::Array(inner) => inner.clone(),
                    other => vec![other.clone()],
                })
                .collect(),
        )),
        other => Err(CallError::new(format!(
            "flatten() expects a list, got {}",
            render(other)
        ))),
    }
}

pub(super) fn install(registry: &FunctionRegistry) {
    registry.insert_node("typhoon.flow.emit", Arc::new(Emit));
    registry.insert_node("typhoon.flow.echo", Arc::new(Echo));
    registry.insert_node("typhoon.flow.log", Arc::new(Log));

    registry.insert_transform(
        "typhoon.data.identity",
        Arc::new(FnTransform(|args: &[Value]| {
            single_arg("identity", args).cloned()
        })),
    );
    registry.insert_transform(
        "typhoon.data.to_json",
        Arc::new(FnTransform(|args: &[Value]| {
            let value = single_arg("to_json", args)?;
            serde_json::to_string(value)
                .map(Value::String)
                .map_err(|e| CallError::new(e.to_string()))
        })),
    );
    registry.insert_transform(
        "typhoon.data.from_json",
        Arc::new(FnTransform(|args: &[Value]| match single_arg("from_json", args)? {
            Value::String(text) => {
                serde_json::from_str(text).map_err(|e| CallError::new(e.to_string()))
            }
            other => Err(CallError::new(format!(
                "from_json() expects a str, got {}",
                render(other)
            ))),
        })),
    );
    registry.insert_transform("typhoon.data.flatten", Arc::new(FnTransform(flatten)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::FunctionResolver;
    use serde_json::json;

    #[tokio::test]
    async fn emit_items_as_batches() {
        let registry = FunctionRegistry::new();
        let emit = registry.resolve_node("typhoon.flow.emit").unwrap();
        let params = json!({"items": [1, "two"]}).as_object().cloned().unwrap();
        assert_eq!(emit.call(None, &params).await.unwrap(), vec![json!(1), json!("two")]);

        let params = json!({"value": "Hi"}).as_object().cloned().unwrap();
        assert_eq!(emit.call(None, &params).await.unwrap(), vec![json!("Hi")]);

        let bad = json!({"items": 3}).as_object().cloned().unwrap();
        assert!(emit.call(None, &bad).await.is_err());
    }

    #[tokio::test]
    async fn echo_and_log() {
        let registry = FunctionRegistry::new();
        let echo = registry.resolve_node("typhoon.flow.echo").unwrap();
        assert_eq!(
            echo.call(Some(json!("x")), &Map::new()).await.unwrap(),
            vec![json!("x")]
        );
        let log = registry.resolve_node("typhoon.flow.log").unwrap();
        assert!(log.call(Some(json!(1)), &Map::new()).await.unwrap().is_empty());
    }

    #[test]
    fn data_transforms() {
        let registry = FunctionRegistry::new();
        let call = |name: &str, arg: Value| {
            registry
                .resolve_transform(name)
                .unwrap()
                .call(&[arg])
        };
        assert_eq!(call("typhoon.data.identity", json!(5)).unwrap(), json!(5));
        assert_eq!(
            call("typhoon.data.to_json", json!({"a": [1]})).unwrap(),
            json!(r#"{"a":[1]}"#)
        );
        assert_eq!(
            call("typhoon.data.from_json", json!("[1, 2]")).unwrap(),
            json!([1, 2])
        );
        assert_eq!(
            call("typhoon.data.flatten", json!([[1, 2], 3, [4]])).unwrap(),
            json!([1, 2, 3, 4])
        );
        assert!(call("typhoon.data.from_json", json!(1)).is_err());
    }
}
