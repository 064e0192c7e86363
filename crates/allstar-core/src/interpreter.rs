use crate::atn::{Atn, StateNumber, Transition, MIN_USER_TOKEN_TYPE};
use crate::conflict::PredictionMode;
use crate::context::CallContext;
use crate::dfa::{DecisionCache, SharedDecisionCache};
use crate::error::{NoViableAlt, RecognitionError};
use crate::listener::{Diagnostic, DiagnosticListener};
use crate::observer::{NoopObserver, PredictionObserver};
use crate::predictor::{PredictionHooks, Predictor, PredictorOptions};
use crate::profiling::{DecisionInfo, ParseInfo, Profiler};
use crate::semantic::{PredicateTable, SemanticEvaluator};
use crate::token_stream::TokenStream;
use crate::token_stream_vec::VecTokenStream;
use rayon::prelude::*;
use rayon::{ThreadPoolBuildError, ThreadPoolBuilder};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PredictionRecord {
    pub decision: usize,
    pub rule: String,
    pub index: usize,
    pub alt: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParseOutcome {
    pub start_rule: String,
    pub consumed: usize,
    pub predictions: Vec<PredictionRecord>,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone)]
enum CacheHandle {
    Owned(DecisionCache),
    Shared(SharedDecisionCache),
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    return_to: Option<StateNumber>,
    precedence: i32,
}

#[derive(Debug, Clone)]
pub struct ParserInterpreter {
    atn: Arc<Atn>,
    predictor: Predictor,
    cache: CacheHandle,
    profiler: Option<Profiler>,
    predicates: PredicateTable,
    diagnostics: DiagnosticListener,
}

impl ParserInterpreter {
    pub fn new(atn: Arc<Atn>) -> Self {
        let cache = CacheHandle::Owned(DecisionCache::new(&atn));
        Self::with_cache(atn, cache)
    }

    pub fn with_shared_cache(atn: Arc<Atn>, cache: SharedDecisionCache) -> Self {
        Self::with_cache(atn, CacheHandle::Shared(cache))
    }

    fn with_cache(atn: Arc<Atn>, cache: CacheHandle) -> Self {
        Self {
            predictor: Predictor::new(Arc::clone(&atn), PredictorOptions::default()),
            atn,
            cache,
            profiler: None,
            predicates: PredicateTable::new(),
            diagnostics: DiagnosticListener::new(false),
        }
    }

    pub fn atn(&self) -> &Arc<Atn> {
        &self.atn
    }

    pub fn mode(&self) -> PredictionMode {
        self.predictor.options().mode
    }

    pub fn set_mode(&mut self, mode: PredictionMode) {
        self.predictor.set_mode(mode);
    }

    pub fn set_predicates(&mut self, predicates: PredicateTable) {
        self.predicates = predicates;
    }

    pub fn predicates_mut(&mut self) -> &mut PredicateTable {
        &mut self.predicates
    }

    pub fn set_profile(&mut self, profile: bool) {
        if !profile {
            self.profiler = None;
        } else if self.profiler.is_none() {
            self.profiler = Some(Profiler::new(self.atn.number_of_decisions()));
        }
    }

    pub fn is_profiling(&self) -> bool {
        self.profiler.is_some()
    }

    pub fn decision_info(&self) -> Option<&[DecisionInfo]> {
        self.profiler.as_ref().map(Profiler::decision_info)
    }

    pub fn parse_info(&self) -> Option<ParseInfo> {
        let profiler = self.profiler.as_ref()?;
        Some(match &self.cache {
            CacheHandle::Owned(cache) => profiler.parse_info(Some(cache)),
            CacheHandle::Shared(shared) => profiler.parse_info(Some(&*shared.lock())),
        })
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        self.diagnostics.diagnostics()
    }

    pub fn render_dfa(&self, decision: usize) -> String {
        match &self.cache {
            CacheHandle::Owned(cache) => cache.dfa(decision).render(&self.atn),
            CacheHandle::Shared(shared) => shared.lock().dfa(decision).render(&self.atn),
        }
    }

    pub fn clear_cache(&mut self) {
        match &mut self.cache {
            CacheHandle::Owned(cache) => cache.clear(),
            CacheHandle::Shared(shared) => shared.clear(),
        }
    }

    pub fn predict(
        &mut self,
        input: &mut dyn TokenStream,
        decision: usize,
        call_context: &CallContext,
    ) -> Result<usize, NoViableAlt> {
        let Self {
            predictor,
            cache,
            profiler,
            predicates,
            diagnostics,
            ..
        } = self;
        let mut guard;
        let cache: &mut DecisionCache = match cache {
            CacheHandle::Owned(cache) => cache,
            CacheHandle::Shared(shared) => {
                guard = shared.lock();
                &mut *guard
            }
        };
        let mut noop = NoopObserver;
        let observer: &mut dyn PredictionObserver = match profiler.as_mut() {
            Some(profiler) => profiler,
            None => &mut noop,
        };
        let mut hooks = PredictionHooks::new(predicates, diagnostics, observer);
        predictor.adaptive_predict(cache, input, decision, call_context, &mut hooks)
    }

    pub fn parse(
        &mut self,
        input: &mut dyn TokenStream,
        start_rule: usize,
    ) -> Result<ParseOutcome, RecognitionError> {
        self.diagnostics.take();
        let atn = Arc::clone(&self.atn);
        log::debug!(
            "parse rule {} from index {}",
            atn.rule_names()[start_rule],
            input.index()
        );

        let mut frames = vec![Frame {
            return_to: None,
            precedence: 0,
        }];
        let mut call_context = CallContext::empty();
        let mut predictions = Vec::new();
        let mut state = atn.rule_start_state(start_rule).number;

        loop {
            let current = atn.state(state);
            if current.is_rule_stop() {
                let Some(frame) = frames.pop() else {
                    break;
                };
                let Some(return_to) = frame.return_to else {
                    break;
                };
                call_context.invoking_states.pop();
                call_context.precedence = frames.last().map_or(0, |frame| frame.precedence);
                state = return_to;
                continue;
            }

            let mut alt = 1;
            if current.transitions.len() > 1 {
                if let Some(decision) = current.decision {
                    let index = input.index();
                    alt = self.predict(input, decision, &call_context)?;
                    predictions.push(PredictionRecord {
                        decision,
                        rule: atn.rule_name_for_decision(decision).to_string(),
                        index,
                        alt,
                    });
                }
            }
            let Some(transition) = current.transitions.get(alt - 1) else {
                return Err(self.mismatch(state, input, &call_context));
            };

            state = match transition {
                Transition::Epsilon { target, .. } | Transition::Action { target, .. } => *target,
                Transition::Rule {
                    target,
                    follow_state,
                    precedence,
                    ..
                } => {
                    frames.push(Frame {
                        return_to: Some(*follow_state),
                        precedence: *precedence,
                    });
                    call_context.invoking_states.push(current.number);
                    call_context.precedence = *precedence;
                    *target
                }
                Transition::Predicate {
                    target,
                    rule_index,
                    pred_index,
                    ..
                } => {
                    let holds = self
                        .predicates
                        .sempred(&call_context, *rule_index, *pred_index)
                        .unwrap_or(false);
                    if !holds {
                        return Err(RecognitionError::FailedPredicate {
                            state,
                            index: input.index(),
                            rule_index: *rule_index,
                            predicate: format!("{{{rule_index}:{pred_index}}}?"),
                        });
                    }
                    *target
                }
                Transition::Precedence { target, precedence } => {
                    if *precedence < call_context.precedence {
                        return Err(RecognitionError::FailedPredicate {
                            state,
                            index: input.index(),
                            rule_index: current.rule_index,
                            predicate: format!("precpred(_ctx, {precedence})"),
                        });
                    }
                    *target
                }
                matching => {
                    let symbol = input.la(1);
                    if !matching.matches(symbol, MIN_USER_TOKEN_TYPE, atn.max_token_type()) {
                        return Err(self.mismatch(state, input, &call_context));
                    }
                    input.consume();
                    matching.target()
                }
            };
        }

        let outcome = ParseOutcome {
            start_rule: atn.rule_names()[start_rule].clone(),
            consumed: input.index(),
            predictions,
            diagnostics: self.diagnostics.diagnostics().to_vec(),
        };
        log::debug!(
            "rule {} returned at index {} after {} predictions",
            outcome.start_rule,
            outcome.consumed,
            outcome.predictions.len()
        );
        Ok(outcome)
    }

    fn mismatch(&self, state: StateNumber, input: &dyn TokenStream, call_context: &CallContext) -> RecognitionError {
        RecognitionError::InputMismatch {
            state,
            index: input.index(),
            symbol: input.la(1),
            expected: self.atn.expected_tokens(state, call_context),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    pub jobs: usize,
    pub shared_cache: bool,
    pub mode: PredictionMode,
    pub profile: bool,
    pub predicates: PredicateTable,
}

#[derive(Debug, Clone)]
pub struct BatchResult {
    pub outcome: Result<ParseOutcome, RecognitionError>,
    pub diagnostics: Vec<Diagnostic>,
    pub decision_info: Option<Vec<DecisionInfo>>,
}

/// Parse every input on a thread pool. Each input gets its own interpreter;
/// with `shared_cache` they all predict through one decision cache.
pub fn parse_batch(
    atn: &Arc<Atn>,
    inputs: &[Vec<i32>],
    start_rule: usize,
    options: &BatchOptions,
) -> Result<Vec<BatchResult>, ThreadPoolBuildError> {
    let shared = options.shared_cache.then(|| SharedDecisionCache::new(atn));
    let pool = ThreadPoolBuilder::new()
        .num_threads(options.jobs.max(1))
        .build()?;
    let results = pool.install(|| {
        inputs
            .par_iter()
            .map(|symbols| {
                let mut interpreter = match &shared {
                    Some(cache) => ParserInterpreter::with_shared_cache(Arc::clone(atn), cache.clone()),
                    None => ParserInterpreter::new(Arc::clone(atn)),
                };
                interpreter.set_mode(options.mode);
                interpreter.set_profile(options.profile);
                interpreter.set_predicates(options.predicates.clone());
                let mut input = VecTokenStream::new(symbols.clone());
                let outcome = interpreter.parse(&mut input, start_rule);
                BatchResult {
                    outcome,
                    diagnostics: interpreter.diagnostics().to_vec(),
                    decision_info: interpreter.decision_info().map(<[DecisionInfo]>::to_vec),
                }
            })
            .collect::<Vec<_>>()
    });
    Ok(results)
}
