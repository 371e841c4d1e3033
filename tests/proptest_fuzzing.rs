//! Property-Based Testing for Typhoon
//!
//! Uses proptest to fuzz the parsing and structure logic.
//! Coverage targets:
//! - Placeholder rewriting (transform/rewrite.rs)
//! - Expression parsing and evaluation (transform/parser.rs, transform/eval.rs)
//! - Structure resolution (dag/structure.rs)
//! - Literal rendering (util/literal.rs)

use proptest::prelude::*;
use serde_json::{json, Value};

// =============================================================================
// TEST 1: Rewriter Fuzzing
// =============================================================================
// Target: src/transform/rewrite.rs
// Risk: byte scanning, quote tracking, digit parsing

mod rewrite_fuzzing {
    use super::*;
    use typhoon::transform::{placeholders, rewrite, Placeholder};

    proptest! {
        /// Property: rewriting never panics on arbitrary input
        #[test]
        fn test_rewrite_never_panics(expr in ".*") {
            let _ = rewrite(&expr);
        }

        /// Property: text without `$` is left untouched
        #[test]
        fn test_rewrite_without_placeholders_is_identity(expr in "[^$]*") {
            prop_assert_eq!(rewrite(&expr).unwrap(), expr);
        }

        /// Property: `$N` always maps to `results[N-1]`
        #[test]
        fn test_step_reference_mapping(n in 1usize..10_000) {
            let expr = format!("${}", n);
            prop_assert_eq!(rewrite(&expr).unwrap(), format!("results[{}]", n - 1));
            prop_assert_eq!(placeholders(&expr).unwrap(), vec![Placeholder::Step(n)]);
        }

        /// Property: placeholders inside string literals are not rewritten
        #[test]
        fn test_quoted_placeholders_survive(key in "[a-z_]{1,10}") {
            let expr = format!("'$DAG_CONFIG.{}' + $DAG_CONFIG.{}", key, key);
            prop_assert_eq!(
                rewrite(&expr).unwrap(),
                format!("'$DAG_CONFIG.{}' + dag_config['{}']", key, key)
            );
        }
    }
}

// =============================================================================
// TEST 2: Expression Fuzzing
// =============================================================================
// Target: src/transform/parser.rs, src/transform/eval.rs
// Risk: recursion, integer overflow, slicing bounds

mod expression_fuzzing {
    use super::*;
    use typhoon::transform::{evaluate_chain, parse, EvalContext};

    fn eval(step: &str, source: Value) -> Value {
        let config = json!({});
        evaluate_chain(&[step.to_string()], source, &EvalContext::new(&config)).final_value()
    }

    proptest! {
        /// Property: parsing never panics
        #[test]
        fn test_parse_never_panics(expr in ".{0,64}") {
            let _ = parse(&expr);
        }

        /// Property: evaluation of arithmetic never panics, overflow included
        #[test]
        fn test_arithmetic_never_panics(
            a in any::<i64>(),
            b in any::<i64>(),
            op in prop::sample::select(vec!["+", "-", "*", "//", "%", "/", "**"])
        ) {
            let _ = eval(&format!("({}) {} ({})", a, op, b), Value::Null);
        }

        /// Property: floor division and modulo satisfy a == (a // b) * b + a % b
        #[test]
        fn test_floor_div_mod_identity(a in -10_000i64..10_000, b in -100i64..100) {
            prop_assume!(b != 0);
            let q = eval(&format!("({}) // ({})", a, b), Value::Null);
            let r = eval(&format!("({}) % ({})", a, b), Value::Null);
            let (q, r) = (q.as_i64().unwrap(), r.as_i64().unwrap());
            prop_assert_eq!(q * b + r, a);
            prop_assert!(r == 0 || (r < 0) == (b < 0));
        }

        /// Property: slicing a list never panics and never grows it
        #[test]
        fn test_slicing_is_bounded(
            items in prop::collection::vec(any::<i32>(), 0..20),
            lo in -30i64..30,
            hi in -30i64..30
        ) {
            let source = json!(items);
            let result = eval(&format!("$SOURCE[{}:{}]", lo, hi), source);
            prop_assert!(result.as_array().map_or(false, |r| r.len() <= items.len()));
        }
    }
}

// =============================================================================
// TEST 3: Structure Fuzzing
// =============================================================================
// Target: src/dag/structure.rs
// Risk: ordering, set differences

mod structure_fuzzing {
    use super::*;
    use std::collections::HashSet;
    use typhoon::ast::Dag;

    fn dag_yaml(node_count: usize, edges: &[(usize, usize)]) -> String {
        let mut yaml = String::from("name: fuzz\nnodes:\n");
        for i in 0..node_count {
            yaml.push_str(&format!("  n{}:\n    function: typhoon.flow.echo\n", i));
        }
        if !edges.is_empty() {
            yaml.push_str("edges:\n");
            for (i, (s, d)) in edges.iter().enumerate() {
                yaml.push_str(&format!(
                    "  e{}:\n    source: n{}\n    destination: n{}\n",
                    i, s, d
                ));
            }
        }
        yaml
    }

    fn arb_graph() -> impl Strategy<Value = (usize, Vec<(usize, usize)>)> {
        (1usize..8).prop_flat_map(|n| {
            (
                Just(n),
                prop::collection::vec((0..n, 0..n), 0..16),
            )
        })
    }

    proptest! {
        /// Property: no node is both a source and a sink
        #[test]
        fn test_sources_and_sinks_are_disjoint((n, edges) in arb_graph()) {
            let dag = Dag::from_yaml(&dag_yaml(n, &edges)).unwrap();
            let structure = dag.structure();
            let sources: HashSet<String> = structure.sources().iter().map(|s| s.to_string()).collect();
            let sinks: HashSet<String> = structure.sinks().iter().map(|s| s.to_string()).collect();
            prop_assert!(sources.is_disjoint(&sinks));
        }

        /// Property: edgesFor yields exactly the edges of a source, in declaration order
        #[test]
        fn test_edges_for_matches_declaration_order((n, edges) in arb_graph()) {
            let dag = Dag::from_yaml(&dag_yaml(n, &edges)).unwrap();
            for source in 0..n {
                let name = format!("n{}", source);
                let expected: Vec<String> = edges
                    .iter()
                    .enumerate()
                    .filter(|(_, (s, _))| *s == source)
                    .map(|(i, _)| format!("e{}", i))
                    .collect();
                let actual: Vec<String> = dag.edges_for(&name).map(|(e, _)| e.to_string()).collect();
                prop_assert_eq!(&actual, &expected);
                // Restartable
                let again: Vec<String> = dag.edges_for(&name).map(|(e, _)| e.to_string()).collect();
                prop_assert_eq!(actual, again);
            }
        }

        /// Property: cycle detection never panics
        #[test]
        fn test_cycle_detection_never_panics((n, edges) in arb_graph()) {
            let dag = Dag::from_yaml(&dag_yaml(n, &edges)).unwrap();
            let _ = dag.structure().detect_cycles();
        }
    }
}

// =============================================================================
// TEST 4: Literal Fuzzing
// =============================================================================
// Target: src/util/literal.rs
// Risk: quoting and escaping

mod literal_fuzzing {
    use super::*;
    use typhoon::transform::{evaluate_chain, EvalContext};
    use typhoon::util::render;

    proptest! {
        /// Property: a rendered string literal evaluates back to the same string
        #[test]
        fn test_rendered_strings_round_trip(s in "[ -~]{0,30}") {
            let literal = render(&json!(s));
            let config = json!({});
            let outcome = evaluate_chain(&[literal.clone()], Value::Null, &EvalContext::new(&config));
            // `$` inside a literal is not a placeholder, so every printable string survives
            prop_assert_eq!(outcome.final_value(), json!(s), "literal {}", literal);
        }

        /// Property: nested lists of ints and strings round-trip
        #[test]
        fn test_rendered_lists_round_trip(
            ints in prop::collection::vec(any::<i32>(), 0..5),
            strs in prop::collection::vec("[a-z' ]{0,5}", 0..5)
        ) {
            let value = json!([ints, strs, {"k": strs}]);
            let config = json!({});
            let outcome = evaluate_chain(&[render(&value)], Value::Null, &EvalContext::new(&config));
            prop_assert_eq!(outcome.final_value(), value);
        }
    }
}
