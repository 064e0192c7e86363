use allstar_core::{
    AltSet, Atn, CallContext, DecisionCache, Diagnostic, DiagnosticListener, GrammarSpec, NoopObserver,
    ParserInterpreter, PredicateTable, PredictionHooks, PredictionMode, Predictor, PredictorOptions,
    RecognitionError, TokenStream, VecTokenStream,
};
use std::sync::Arc;

fn compile(json: &str) -> Arc<Atn> {
    let grammar: GrammarSpec = serde_json::from_str(json).expect("grammar json");
    Arc::new(grammar.compile().expect("compile"))
}

fn tokens(atn: &Atn, input: &str) -> Vec<i32> {
    input
        .split_whitespace()
        .map(|name| atn.token_type(name).expect("token"))
        .collect()
}

// top1: q A ; top2: q ; q: Z | Z A
const ESCALATION: &str = r#"{
  "tokens": ["Z", "A"],
  "rules": [
    {"name": "top1", "alts": [[{"rule": "q"}, {"token": "A"}]]},
    {"name": "top2", "alts": [[{"rule": "q"}]]},
    {"name": "q", "alts": [[{"token": "Z"}], [{"token": "Z"}, {"token": "A"}]]}
  ]
}"#;

// s: q ; q: Z | Z
const AMBIGUOUS: &str = r#"{
  "tokens": ["Z"],
  "rules": [
    {"name": "s", "alts": [[{"rule": "q"}]]},
    {"name": "q", "alts": [[{"token": "Z"}], [{"token": "Z"}]]}
  ]
}"#;

#[test]
fn full_context_resolves_sll_conflict_to_longer_alternative() {
    let atn = compile(ESCALATION);
    let mut interpreter = ParserInterpreter::new(atn.clone());
    let mut input = VecTokenStream::new(tokens(&atn, "Z A"));

    let outcome = interpreter.parse(&mut input, 1).expect("parse");
    assert_eq!(outcome.predictions.len(), 1);
    assert_eq!(outcome.predictions[0].decision, 0);
    assert_eq!(outcome.predictions[0].alt, 2);
    assert_eq!(outcome.consumed, 2);

    let kinds = outcome
        .diagnostics
        .iter()
        .map(|diagnostic| match diagnostic {
            Diagnostic::AttemptingFullContext { conflicting_alts, .. } => {
                assert_eq!(conflicting_alts, &[1, 2].into_iter().collect::<AltSet>());
                "full-context"
            }
            Diagnostic::ContextSensitivity { prediction, .. } => {
                assert_eq!(*prediction, 2);
                "context-sensitivity"
            }
            Diagnostic::Ambiguity { .. } => "ambiguity",
        })
        .collect::<Vec<_>>();
    assert_eq!(kinds, vec!["full-context", "context-sensitivity"]);
}

#[test]
fn sll_mode_never_escalates_and_takes_minimum_alternative() {
    let atn = compile(ESCALATION);
    let mut interpreter = ParserInterpreter::new(atn.clone());
    interpreter.set_mode(PredictionMode::Sll);
    let mut input = VecTokenStream::new(tokens(&atn, "Z A"));

    let outcome = interpreter.parse(&mut input, 1).expect("parse");
    assert_eq!(outcome.predictions[0].alt, 1);
    assert_eq!(outcome.consumed, 1);
    assert!(outcome.diagnostics.is_empty());
}

#[test]
fn true_ambiguity_is_reported_and_resolved_to_minimum() {
    let atn = compile(AMBIGUOUS);
    let mut interpreter = ParserInterpreter::new(atn.clone());
    let mut input = VecTokenStream::new(tokens(&atn, "Z"));

    let outcome = interpreter.parse(&mut input, 0).expect("parse");
    assert_eq!(outcome.predictions[0].alt, 1);

    let ambiguities = outcome
        .diagnostics
        .iter()
        .filter_map(|diagnostic| match diagnostic {
            Diagnostic::Ambiguity { ambig_alts, exact, .. } => Some((ambig_alts.clone(), *exact)),
            _ => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(ambiguities, vec![([1, 2].into_iter().collect::<AltSet>(), false)]);
    assert!(!outcome
        .diagnostics
        .iter()
        .any(|diagnostic| matches!(diagnostic, Diagnostic::ContextSensitivity { .. })));
}

#[test]
fn exact_mode_marks_ambiguity_exact() {
    let atn = compile(AMBIGUOUS);
    let mut interpreter = ParserInterpreter::new(atn.clone());
    interpreter.set_mode(PredictionMode::LlExactAmbigDetection);
    let mut input = VecTokenStream::new(tokens(&atn, "Z"));

    let outcome = interpreter.parse(&mut input, 0).expect("parse");
    assert_eq!(outcome.predictions[0].alt, 1);
    assert!(outcome.diagnostics.iter().any(|diagnostic| matches!(
        diagnostic,
        Diagnostic::Ambiguity { exact: true, .. }
    )));
}

#[test]
fn minimum_of_viable_alternatives_wins() {
    let atn = compile(
        r#"{
  "tokens": ["Z", "Y"],
  "rules": [
    {"name": "s", "alts": [[{"rule": "q"}]]},
    {"name": "q", "alts": [[{"token": "Z"}], [{"token": "Y"}], [{"token": "Z"}], [{"token": "Z"}]]}
  ]
}"#,
    );
    let mut interpreter = ParserInterpreter::new(atn.clone());
    let mut input = VecTokenStream::new(tokens(&atn, "Z"));

    let outcome = interpreter.parse(&mut input, 0).expect("parse");
    assert_eq!(outcome.predictions[0].alt, 1);
    let ambig = outcome
        .diagnostics
        .iter()
        .find_map(|diagnostic| match diagnostic {
            Diagnostic::Ambiguity { ambig_alts, .. } => Some(ambig_alts.clone()),
            _ => None,
        })
        .expect("ambiguity");
    assert_eq!(ambig, [3, 1, 4].into_iter().collect::<AltSet>());
}

#[test]
fn dead_end_raises_no_viable_alt_at_offending_index() {
    let atn = compile(
        r#"{
  "tokens": ["A", "B", "C", "D"],
  "rules": [
    {"name": "s", "alts": [[{"rule": "q"}]]},
    {"name": "q", "alts": [[{"token": "A"}, {"token": "B"}], [{"token": "A"}, {"token": "C"}]]}
  ]
}"#,
    );
    let mut interpreter = ParserInterpreter::new(atn.clone());
    let mut input = VecTokenStream::new(tokens(&atn, "A D"));

    let err = interpreter
        .predict(&mut input, 0, &CallContext::empty())
        .expect_err("no viable alternative");
    assert_eq!(err.decision, 0);
    assert_eq!(err.start_index, 0);
    assert_eq!(err.offending_index, 1);
    assert_eq!(err.offending_symbol, atn.token_type("D").expect("D"));
    assert_eq!(input.index(), 0);

    let err = interpreter.parse(&mut input, 0).expect_err("parse error");
    match err {
        RecognitionError::NoViableAlt(err) => assert_eq!(err.offending_index, 1),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn mismatched_symbol_reports_expected_tokens() {
    let atn = compile(
        r#"{
  "tokens": ["A", "B"],
  "rules": [{"name": "s", "alts": [[{"token": "A"}, {"token": "B"}, {"token": "EOF"}]]}]
}"#,
    );
    let mut interpreter = ParserInterpreter::new(atn.clone());
    let mut input = VecTokenStream::new(tokens(&atn, "A A"));

    match interpreter.parse(&mut input, 0).expect_err("mismatch") {
        RecognitionError::InputMismatch { index, expected, .. } => {
            assert_eq!(index, 1);
            assert!(expected.contains(atn.token_type("B").expect("B")));
            assert_eq!(expected.len(), 1);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn predictions_are_deterministic_and_cache_transparent() {
    let atn = compile(
        r#"{
  "tokens": ["A", "B", "C"],
  "rules": [
    {"name": "q", "alts": [
      [{"token": "B"}],
      [{"token": "A"}, {"token": "B"}],
      [{"token": "A"}, {"token": "A"}, {"token": "B"}],
      [{"token": "A"}, {"token": "A"}, {"token": "C"}]
    ]}
  ]
}"#,
    );
    let inputs = ["A A C", "B", "A B", "A A B", "A A C"];

    let mut warm = ParserInterpreter::new(atn.clone());
    for input in inputs {
        let mut cold = ParserInterpreter::new(atn.clone());
        let mut stream = VecTokenStream::new(tokens(&atn, input));
        let expected = cold.parse(&mut stream, 0).expect("cold parse");

        let mut stream = VecTokenStream::new(tokens(&atn, input));
        let cached = warm.parse(&mut stream, 0).expect("warm parse");
        assert_eq!(cached, expected, "input {input}");
    }

    let first = warm.render_dfa(0);
    warm.clear_cache();
    assert!(warm.render_dfa(0).is_empty());
    for input in inputs {
        let mut stream = VecTokenStream::new(tokens(&atn, input));
        warm.parse(&mut stream, 0).expect("parse after clear");
    }
    assert_eq!(warm.render_dfa(0), first);
    assert!(first.contains("=>4"));
}

#[test]
fn precedence_decisions_follow_operator_binding() {
    // e: INT ( {2>=prec}? STAR e[3] | {1>=prec}? PLUS e[2] )*
    let atn = compile(
        r#"{
  "tokens": ["INT", "PLUS", "STAR"],
  "rules": [
    {"name": "s", "alts": [[{"rule": "e"}, {"token": "EOF"}]]},
    {"name": "e", "left_recursive": true, "alts": [[
      {"token": "INT"},
      {"star": [
        [{"precpred": 2}, {"token": "STAR"}, {"call": {"rule": "e", "precedence": 3}}],
        [{"precpred": 1}, {"token": "PLUS"}, {"call": {"rule": "e", "precedence": 2}}]
      ]}
    ]]}
  ]
}"#,
    );
    assert_eq!(atn.number_of_decisions(), 2);
    assert!(atn.decision_state(1).precedence_decision);

    let mut interpreter = ParserInterpreter::new(atn.clone());
    let mut input = VecTokenStream::new(tokens(&atn, "INT PLUS INT STAR INT"));
    let outcome = interpreter.parse(&mut input, 0).expect("parse");

    let loop_alts = outcome
        .predictions
        .iter()
        .filter(|prediction| prediction.decision == 1)
        .map(|prediction| prediction.alt)
        .collect::<Vec<_>>();
    assert_eq!(loop_alts, vec![1, 1, 2, 2, 2]);
    let operator_alts = outcome
        .predictions
        .iter()
        .filter(|prediction| prediction.decision == 0)
        .map(|prediction| prediction.alt)
        .collect::<Vec<_>>();
    assert_eq!(operator_alts, vec![2, 1]);
}

#[test]
fn failing_predicate_prunes_its_alternative() {
    // q: {0}? A | A
    let json = r#"{
  "tokens": ["A"],
  "rules": [
    {"name": "s", "alts": [[{"rule": "q"}]]},
    {"name": "q", "alts": [[{"pred": {"index": 0}}, {"token": "A"}], [{"token": "A"}]]}
  ]
}"#;
    let atn = compile(json);

    let mut predicates = PredicateTable::new();
    predicates.set(1, 0, false);
    let mut interpreter = ParserInterpreter::new(atn.clone());
    interpreter.set_predicates(predicates);
    let mut input = VecTokenStream::new(tokens(&atn, "A"));
    let outcome = interpreter.parse(&mut input, 0).expect("parse");
    assert_eq!(outcome.predictions[0].alt, 2);

    let mut predicates = PredicateTable::new();
    predicates.set(1, 0, true);
    let mut interpreter = ParserInterpreter::new(atn.clone());
    interpreter.set_predicates(predicates);
    let mut input = VecTokenStream::new(tokens(&atn, "A"));
    let outcome = interpreter.parse(&mut input, 0).expect("parse");
    assert_eq!(outcome.predictions[0].alt, 1);
}

#[test]
fn predicate_evaluation_error_counts_as_false() {
    let atn = compile(
        r#"{
  "tokens": ["A"],
  "rules": [
    {"name": "s", "alts": [[{"rule": "q"}]]},
    {"name": "q", "alts": [[{"pred": {"index": 0}}, {"token": "A"}], [{"token": "A"}]]}
  ]
}"#,
    );
    let predictor = Predictor::new(atn.clone(), PredictorOptions::default());
    let mut cache = DecisionCache::new(&atn);
    let mut evaluator = PredicateTable::new();
    let mut listener = DiagnosticListener::new(false);
    let mut observer = NoopObserver;
    let mut hooks = PredictionHooks::new(&mut evaluator, &mut listener, &mut observer);
    let mut input = VecTokenStream::new(tokens(&atn, "A"));

    let alt = predictor
        .adaptive_predict(&mut cache, &mut input, 0, &CallContext::empty(), &mut hooks)
        .expect("predict");
    assert_eq!(alt, 2);
    assert_eq!(input.index(), 0);
    assert_eq!(input.open_marks(), 0);
}
