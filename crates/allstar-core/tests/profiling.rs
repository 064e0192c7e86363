use allstar_core::report::{self, ReportColumn};
use allstar_core::{
    AltSet, Atn, AtnConfigSet, CallContext, DecisionCache, DecisionInfo, GrammarSpec, NoopListener,
    NoopObserver, ParserInterpreter, PredicateTable, PredictionHooks, PredictionObserver, Predictor,
    PredictorOptions, Profiler, ProfilingPredictor, TokenStream, VecTokenStream,
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

// q: B | A B | A A B | A A C
const LOOKAHEAD: &str = r#"{
  "tokens": ["A", "B", "C"],
  "rules": [
    {"name": "q", "alts": [
      [{"token": "B"}],
      [{"token": "A"}, {"token": "B"}],
      [{"token": "A"}, {"token": "A"}, {"token": "B"}],
      [{"token": "A"}, {"token": "A"}, {"token": "C"}]
    ]}
  ]
}"#;

#[test]
fn profile_csv_reports_lookahead_depths() {
    let atn = compile(LOOKAHEAD);
    let mut interpreter = ParserInterpreter::new(atn.clone());
    interpreter.set_profile(true);
    for input in ["B", "A B", "A A B"] {
        let mut stream = VecTokenStream::new(tokens(&atn, input));
        interpreter.parse(&mut stream, 0).expect("parse");
    }

    let decisions = interpreter.decision_info().expect("profiling enabled");
    let info = &decisions[0];
    assert_eq!(info.invocations, 3);
    assert_eq!(info.sll_total_look, 6);
    assert_eq!(info.sll_min_look, 1);
    assert_eq!(info.sll_max_look, 3);
    assert_eq!(info.ll_fallback, 0);
    assert_eq!(info.sll_atn_transitions, 5);
    assert_eq!(info.sll_dfa_transitions, 1);
    let max_event = info.sll_max_look_event.as_ref().expect("max lookahead event");
    assert_eq!(max_event.predicted_alt, 3);
    assert_eq!(max_event.event.stop_index, 2);

    let csv = report::to_csv(&atn, decisions);
    let mut lines = csv.lines();
    assert_eq!(
        lines.next(),
        Some("Rule,Invocations,Time (ms),Total k,Max k,Ambiguities,DFA cache miss")
    );
    let row = lines.next().expect("decision row").split(',').collect::<Vec<_>>();
    assert_eq!(row.len(), ReportColumn::ALL.len());
    assert_eq!(row[0], "q:0");
    assert_eq!(row[1], "3");
    assert!(row[2].parse::<f64>().expect("time") >= 0.0);
    assert_eq!(row[3], "6");
    assert_eq!(row[4], "3");
    assert_eq!(row[5], "0");
    assert_eq!(row[6], "5");
    assert_eq!(lines.next(), None);
}

#[test]
fn escalation_is_profiled_as_one_context_sensitivity() {
    let atn = compile(
        r#"{
  "tokens": ["Z", "A"],
  "rules": [
    {"name": "top1", "alts": [[{"rule": "q"}, {"token": "A"}]]},
    {"name": "top2", "alts": [[{"rule": "q"}]]},
    {"name": "q", "alts": [[{"token": "Z"}], [{"token": "Z"}, {"token": "A"}]]}
  ]
}"#,
    );
    let mut interpreter = ParserInterpreter::new(atn.clone());
    interpreter.set_profile(true);
    let mut input = VecTokenStream::new(tokens(&atn, "Z A"));
    interpreter.parse(&mut input, 1).expect("parse");

    let info = &interpreter.decision_info().expect("profiling enabled")[0];
    assert_eq!(info.invocations, 1);
    assert_eq!(info.ll_fallback, 1);
    assert_eq!(info.context_sensitivities.len(), 1);
    assert!(info.ambiguities.is_empty());
    assert_eq!(info.sll_total_look, 3);
    assert_eq!(info.ll_total_look, 2);
    assert_eq!(info.ll_atn_transitions, 2);

    let parse_info = interpreter.parse_info().expect("profiling enabled");
    assert_eq!(parse_info.ll_decisions, vec![0]);
    assert_eq!(parse_info.total_ll_lookahead_ops, 2);
}

#[test]
fn ambiguity_without_context_sensitivity_is_profiled() {
    let atn = compile(
        r#"{
  "tokens": ["Z"],
  "rules": [
    {"name": "s", "alts": [[{"rule": "q"}]]},
    {"name": "q", "alts": [[{"token": "Z"}], [{"token": "Z"}]]}
  ]
}"#,
    );
    let mut interpreter = ParserInterpreter::new(atn.clone());
    interpreter.set_profile(true);
    let mut input = VecTokenStream::new(tokens(&atn, "Z"));
    interpreter.parse(&mut input, 0).expect("parse");

    let info = &interpreter.decision_info().expect("profiling enabled")[0];
    assert_eq!(info.ambiguities.len(), 1);
    assert_eq!(info.ambiguities[0].ambig_alts, [1, 2].into_iter().collect::<AltSet>());
    assert!(info.ambiguities[0].event.full_ctx);
    assert!(info.context_sensitivities.is_empty());
}

#[test]
fn failed_prediction_records_error_but_not_invocation() {
    let atn = compile(
        r#"{
  "tokens": ["A", "B", "C", "D"],
  "rules": [
    {"name": "q", "alts": [[{"token": "A"}, {"token": "B"}], [{"token": "A"}, {"token": "C"}]]}
  ]
}"#,
    );
    let mut interpreter = ParserInterpreter::new(atn.clone());
    interpreter.set_profile(true);
    let mut input = VecTokenStream::new(tokens(&atn, "A D"));
    interpreter.parse(&mut input, 0).expect_err("no viable alternative");

    let info = &interpreter.decision_info().expect("profiling enabled")[0];
    assert_eq!(info.invocations, 0);
    assert_eq!(info.time_in_prediction_ns, 0);
    assert_eq!(info.errors.len(), 1);
    assert_eq!(info.errors[0].stop_index, 1);
    assert!(!info.errors[0].full_ctx);
}

#[test]
fn successful_full_context_reach_only_counts_the_transition() {
    let mut profiler = Profiler::new(1);
    let closure = AtnConfigSet::new(true);
    profiler.prediction_started(0, 4);
    profiler.reach_computed(0, &closure, 6, true, true);

    let info = &profiler.decision_info()[0];
    assert_eq!(info.ll_atn_transitions, 1);
    assert!(info.errors.is_empty());
    assert!(info.ambiguities.is_empty());
    assert!(info.context_sensitivities.is_empty());
    assert_eq!(info.invocations, 0);
}

#[test]
fn detaching_profiler_drops_statistics() {
    let atn = compile(LOOKAHEAD);
    let mut interpreter = ParserInterpreter::new(atn.clone());
    assert!(interpreter.decision_info().is_none());

    interpreter.set_profile(true);
    let mut input = VecTokenStream::new(tokens(&atn, "B"));
    interpreter.parse(&mut input, 0).expect("parse");
    assert_eq!(interpreter.decision_info().expect("profiling enabled")[0].invocations, 1);

    interpreter.set_profile(false);
    assert!(interpreter.decision_info().is_none());
    interpreter.set_profile(true);
    assert_eq!(interpreter.decision_info().expect("profiling enabled")[0].invocations, 0);
}

#[test]
fn profiling_predictor_matches_plain_predictions_and_absorbs() {
    let atn = compile(LOOKAHEAD);
    let plain = Predictor::new(atn.clone(), PredictorOptions::default());
    let mut profiled = ProfilingPredictor::new(plain.clone());
    let mut cache = DecisionCache::new(&atn);
    let mut evaluator = PredicateTable::new();
    let mut listener = NoopListener;

    let mut total = DecisionInfo::new(0);
    for (input, expected) in [("A A C", 4), ("A B", 2)] {
        let mut stream = VecTokenStream::new(tokens(&atn, input));
        let alt = profiled
            .adaptive_predict(
                &mut cache,
                &mut stream,
                0,
                &CallContext::empty(),
                &mut evaluator,
                &mut listener,
            )
            .expect("predict");
        assert_eq!(alt, expected);
        assert_eq!(stream.index(), 0);
    }
    total.absorb(&profiled.decision_info()[0]);
    total.absorb(&profiled.decision_info()[0]);
    assert_eq!(total.invocations, 4);
    assert_eq!(total.sll_total_look, 10);
    assert_eq!(total.sll_max_look, 3);
    assert_eq!(total.sll_min_look, 2);

    let json = serde_json::to_value(&profiled.decision_info()[0]).expect("serialize");
    assert_eq!(json["invocations"], 2);
    assert_eq!(json["decision"], 0);

    let (predictor, profiler) = profiled.into_parts();
    assert_eq!(profiler.decision_info()[0].invocations, 2);
    let mut stream = VecTokenStream::new(tokens(&atn, "B"));
    let mut observer = NoopObserver;
    let mut hooks = PredictionHooks::new(&mut evaluator, &mut listener, &mut observer);
    let alt = predictor
        .adaptive_predict(&mut cache, &mut stream, 0, &CallContext::empty(), &mut hooks)
        .expect("predict");
    assert_eq!(alt, 1);
}

#[test]
fn parse_info_reports_cache_sizes() {
    // s: q EOF ; q: A* B | r C ; r: A | D
    let atn = compile(
        r#"{
  "tokens": ["A", "B", "C", "D"],
  "rules": [
    {"name": "s", "alts": [[{"rule": "q"}, {"token": "EOF"}]]},
    {"name": "q", "alts": [
      [{"star": [[{"token": "A"}]]}, {"token": "B"}],
      [{"rule": "r"}, {"token": "C"}]
    ]},
    {"name": "r", "alts": [[{"token": "A"}], [{"token": "D"}]]}
  ]
}"#,
    );
    let mut interpreter = ParserInterpreter::new(atn.clone());
    interpreter.set_profile(true);
    let mut input = VecTokenStream::new(tokens(&atn, "D C"));
    interpreter.parse(&mut input, 0).expect("parse");

    let parse_info = interpreter.parse_info().expect("profiling enabled");
    assert!(parse_info.dfa_size > 0);
    // alternative 2 of q predicts from inside r, so its configurations carry a return state
    assert!(parse_info.context_cache_size > 0);

    interpreter.clear_cache();
    let cleared = interpreter.parse_info().expect("profiling enabled");
    assert_eq!(cleared.dfa_size, 0);
    assert_eq!(cleared.context_cache_size, 0);
}
