//! Transformation Integration Tests
//!
//! Placeholder rewriting, chain evaluation and the interactive tester.

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use typhoon::transform::{
    evaluate_chain, rewrite, run_transformations, ChainEvaluation, ChainState, ErrorKind,
    EvalContext, TransformationRequest, TransformationResult,
};

fn chain(steps: &[&str]) -> Vec<String> {
    steps.iter().map(|s| s.to_string()).collect()
}

// ═══════════════════════════════════════════════════════════════
// REWRITING
// ═══════════════════════════════════════════════════════════════

#[test]
fn test_rewrite_table() {
    let cases = [
        ("$1", "results[0]"),
        ("$12 + $3", "results[11] + results[2]"),
        ("$SOURCE", "source_data"),
        ("$DAG_CONFIG.region", "dag_config['region']"),
        ("$DAG_CONFIG", "dag_config"),
        ("$DAG_CONTEXT.ds", "dag_context['ds']"),
        ("$BATCH_NUM * 2", "batch_num * 2"),
        ("'$SOURCE stays' + $SOURCE", "'$SOURCE stays' + source_data"),
    ];
    for (input, expected) in cases {
        assert_eq!(rewrite(input).unwrap(), expected, "rewriting {input}");
    }
}

#[test]
fn test_rewrite_rejects_unsafe_tokens() {
    for bad in ["$0", "$-1", "$01", "$WHATEVER", "1 + $"] {
        assert!(rewrite(bad).is_err(), "{bad} should be rejected");
    }
}

// ═══════════════════════════════════════════════════════════════
// CHAINS
// ═══════════════════════════════════════════════════════════════

#[test]
fn test_step_reference_plus_source() {
    let config = json!({});
    let ctx = EvalContext::new(&config);
    let outcome = evaluate_chain(&chain(&["3", "$1 + $SOURCE"]), json!(5), &ctx);
    assert_eq!(outcome.final_value(), json!(8));
}

#[test]
fn test_config_lookup() {
    let config = json!({"region": "eu-west-1"});
    let ctx = EvalContext::new(&config);
    let outcome = evaluate_chain(&chain(&["$DAG_CONFIG.region"]), Value::Null, &ctx);
    assert_eq!(outcome.final_value(), json!("eu-west-1"));
}

#[test]
fn test_ok_fail_ok_containment() {
    let config = json!({});
    let ctx = EvalContext::new(&config);
    let outcome = evaluate_chain(
        &chain(&["$SOURCE * 2", "$1 / 0", "$1 + 1"]),
        json!(4),
        &ctx,
    );

    assert_eq!(outcome.steps.len(), 3);
    assert_eq!(outcome.steps[0].as_ref().unwrap(), &json!(8));
    let err = outcome.steps[1].as_ref().unwrap_err();
    assert_eq!(err.kind, ErrorKind::ZeroDivisionError);
    assert_eq!(outcome.steps[2].as_ref().unwrap(), &json!(9));
    assert!(outcome.is_success());
    assert_eq!(outcome.failures().map(|(i, _)| i).collect::<Vec<_>>(), vec![2]);
}

#[test]
fn test_failure_record_flows_into_later_steps() {
    let config = json!({});
    let ctx = EvalContext::new(&config);
    let outcome = evaluate_chain(&chain(&["$SOURCE.nope()", "$1"]), json!("x"), &ctx);
    let last = outcome.final_value();
    assert_eq!(
        last,
        json!({"__error__": "AttributeError: 'str' object has no attribute 'nope'"})
    );
}

#[test]
fn test_forward_reference_is_an_index_error() {
    let config = json!({});
    let ctx = EvalContext::new(&config);
    let outcome = evaluate_chain(&chain(&["$2", "1"]), Value::Null, &ctx);
    assert_eq!(
        outcome.steps[0].as_ref().unwrap_err().kind,
        ErrorKind::IndexError
    );
    assert_eq!(outcome.final_value(), json!(1));
}

#[test]
fn test_state_machine_advances_past_failures() {
    let steps = chain(&["1 / 0", "'done'"]);
    let config = json!({});
    let ctx = EvalContext::new(&config);
    let mut evaluation = ChainEvaluation::new(&steps, Value::Null);

    assert_eq!(evaluation.state(), ChainState::Pending);
    evaluation.advance(&ctx);
    assert_eq!(evaluation.state(), ChainState::Running { step: 1 });
    evaluation.advance(&ctx);
    assert_eq!(evaluation.state(), ChainState::Done);

    let outcome = evaluation.run(&ctx);
    assert_eq!(outcome.final_value(), json!("done"));
}

#[test]
fn test_batch_num_and_context() {
    let config = json!({"bucket": "raw"});
    let context = json!({"ds": "2024-01-02"});
    let ctx = EvalContext::new(&config)
        .with_dag_context(&context)
        .with_batch_num(7);
    let outcome = evaluate_chain(
        &chain(&[
            "$DAG_CONFIG.bucket + '/' + $DAG_CONTEXT.ds",
            "'%s-%d' % ($1, $BATCH_NUM)",
        ]),
        Value::Null,
        &ctx,
    );
    assert_eq!(outcome.final_value(), json!("raw/2024-01-02-7"));
}

#[test]
fn test_run_transformations_returns_last_value() {
    let config = json!({});
    let value = run_transformations(
        json!(["b", "a"]),
        &config,
        &chain(&["sorted($SOURCE)", "','.join($1)"]),
    );
    assert_eq!(value, json!("a,b"));
}

#[test]
fn test_deeply_nested_step_fails_without_ending_the_chain() {
    let config = json!({});
    let deep_parens = format!("{}1{}", "(".repeat(10_000), ")".repeat(10_000));
    let value = run_transformations(
        Value::Null,
        &config,
        &chain(&[deep_parens.as_str(), "'after'"]),
    );
    assert_eq!(value, json!("after"));

    let ctx = EvalContext::new(&config);
    let nested = format!("{}1{}", "(".repeat(100), ")".repeat(100));
    let negations = format!("{}1", "-".repeat(50_000));
    let lists = format!("{}1{}", "[".repeat(100), "]".repeat(100));
    let outcome = evaluate_chain(
        &chain(&[&nested, &negations, &lists, "$SOURCE"]),
        json!("kept"),
        &ctx,
    );
    assert_eq!(
        outcome.steps[0].as_ref().unwrap_err().kind,
        ErrorKind::RecursionError
    );
    assert_eq!(
        outcome.steps[1].as_ref().unwrap_err().kind,
        ErrorKind::SyntaxError
    );
    assert_eq!(
        outcome.steps[2].as_ref().unwrap_err().kind,
        ErrorKind::RecursionError
    );
    assert_eq!(outcome.final_value(), json!("kept"));
}

// ═══════════════════════════════════════════════════════════════
// TESTER
// ═══════════════════════════════════════════════════════════════

#[test]
fn test_tester_request_from_json() {
    let request = TransformationRequest::from_json(
        r#"{
            "source": "Hi",
            "dag_context": {"execution_date": "2024-01-02T03:04", "dag_name": "t"},
            "dag_config": {"suffix": "?"},
            "edge": {
                "greeting": {"contents": ["$SOURCE.upper()", "$1 + $DAG_CONFIG.suffix"]},
                "broken": {"contents": ["$SOURCE + 1"]}
            }
        }"#,
    )
    .unwrap();
    let results = request.run(None).unwrap();

    assert_eq!(
        results["greeting"],
        TransformationResult::Success {
            value: json!("HI?"),
            rendered: "'HI?'".to_string(),
        }
    );
    assert!(matches!(
        &results["broken"],
        TransformationResult::Failure { error_kind: ErrorKind::TypeError, .. }
    ));

    let json = serde_json::to_value(&results).unwrap();
    assert_eq!(json["greeting"]["value"], "HI?");
}
