use crate::config::{AltSet, AtnConfigSet};
use crate::context::CallContext;
use crate::dfa::{DecisionCache, DfaEdge, DfaStateId};
use crate::error::NoViableAlt;
use crate::listener::PredictionListener;
use crate::observer::PredictionObserver;
use crate::predictor::{PredictionHooks, Predictor};
use crate::semantic::{SemanticContext, SemanticEvaluator};
use crate::token_stream::TokenStream;
use serde::Serialize;
use std::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecisionEvent {
    pub decision: usize,
    pub start_index: usize,
    pub stop_index: usize,
    pub full_ctx: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LookaheadEvent {
    #[serde(flatten)]
    pub event: DecisionEvent,
    pub predicted_alt: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AmbiguityEvent {
    #[serde(flatten)]
    pub event: DecisionEvent,
    pub ambig_alts: AltSet,
    pub exact: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PredicateEvalEvent {
    #[serde(flatten)]
    pub event: DecisionEvent,
    pub predicate: String,
    pub alt: usize,
    pub result: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DecisionInfo {
    pub decision: usize,
    pub invocations: u64,
    pub time_in_prediction_ns: u64,
    pub sll_total_look: u64,
    pub sll_min_look: u64,
    pub sll_max_look: u64,
    pub sll_max_look_event: Option<LookaheadEvent>,
    pub ll_total_look: u64,
    pub ll_min_look: u64,
    pub ll_max_look: u64,
    pub ll_max_look_event: Option<LookaheadEvent>,
    /// SLL steps answered by an existing automaton edge.
    pub sll_dfa_transitions: u64,
    /// SLL steps that had to simulate the network.
    pub sll_atn_transitions: u64,
    pub ll_atn_transitions: u64,
    pub ll_fallback: u64,
    pub ambiguities: Vec<AmbiguityEvent>,
    pub context_sensitivities: Vec<DecisionEvent>,
    pub errors: Vec<DecisionEvent>,
    pub predicate_evals: Vec<PredicateEvalEvent>,
}

impl DecisionInfo {
    pub fn new(decision: usize) -> Self {
        Self {
            decision,
            ..Self::default()
        }
    }

    pub fn absorb(&mut self, other: &DecisionInfo) {
        self.invocations += other.invocations;
        self.time_in_prediction_ns += other.time_in_prediction_ns;
        self.sll_total_look += other.sll_total_look;
        self.sll_min_look = merge_min(self.sll_min_look, other.sll_min_look);
        if other.sll_max_look > self.sll_max_look {
            self.sll_max_look = other.sll_max_look;
            self.sll_max_look_event = other.sll_max_look_event.clone();
        }
        self.ll_total_look += other.ll_total_look;
        self.ll_min_look = merge_min(self.ll_min_look, other.ll_min_look);
        if other.ll_max_look > self.ll_max_look {
            self.ll_max_look = other.ll_max_look;
            self.ll_max_look_event = other.ll_max_look_event.clone();
        }
        self.sll_dfa_transitions += other.sll_dfa_transitions;
        self.sll_atn_transitions += other.sll_atn_transitions;
        self.ll_atn_transitions += other.ll_atn_transitions;
        self.ll_fallback += other.ll_fallback;
        self.ambiguities.extend(other.ambiguities.iter().cloned());
        self.context_sensitivities
            .extend(other.context_sensitivities.iter().cloned());
        self.errors.extend(other.errors.iter().cloned());
        self.predicate_evals.extend(other.predicate_evals.iter().cloned());
    }

    fn record_sll_look(&mut self, k: u64, event: LookaheadEvent) {
        self.sll_total_look += k;
        self.sll_min_look = merge_min(self.sll_min_look, k);
        if k > self.sll_max_look {
            self.sll_max_look = k;
            self.sll_max_look_event = Some(event);
        }
    }

    fn record_ll_look(&mut self, k: u64, event: LookaheadEvent) {
        self.ll_total_look += k;
        self.ll_min_look = merge_min(self.ll_min_look, k);
        if k > self.ll_max_look {
            self.ll_max_look = k;
            self.ll_max_look_event = Some(event);
        }
    }
}

// A zero minimum means "no sample yet".
fn merge_min(current: u64, sample: u64) -> u64 {
    match (current, sample) {
        (0, sample) => sample,
        (current, 0) => current,
        (current, sample) => current.min(sample),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParseInfo {
    pub ll_decisions: Vec<usize>,
    pub total_time_in_prediction_ns: u64,
    pub total_sll_lookahead_ops: u64,
    pub total_ll_lookahead_ops: u64,
    pub total_sll_atn_lookahead_ops: u64,
    pub total_ll_atn_lookahead_ops: u64,
    pub total_atn_lookahead_ops: u64,
    pub dfa_size: usize,
    pub context_cache_size: usize,
}

impl ParseInfo {
    pub fn from_decisions(decisions: &[DecisionInfo], cache: Option<&DecisionCache>) -> Self {
        let mut info = ParseInfo::default();
        for decision in decisions {
            if decision.ll_fallback > 0 {
                info.ll_decisions.push(decision.decision);
            }
            info.total_time_in_prediction_ns += decision.time_in_prediction_ns;
            info.total_sll_lookahead_ops += decision.sll_total_look;
            info.total_ll_lookahead_ops += decision.ll_total_look;
            info.total_sll_atn_lookahead_ops += decision.sll_atn_transitions;
            info.total_ll_atn_lookahead_ops += decision.ll_atn_transitions;
        }
        info.total_atn_lookahead_ops = info.total_sll_atn_lookahead_ops + info.total_ll_atn_lookahead_ops;
        if let Some(cache) = cache {
            info.dfa_size = cache.dfas().iter().map(|dfa| dfa.len()).sum();
            info.context_cache_size = cache.context_cache_size();
        }
        info
    }
}

#[derive(Debug, Clone)]
struct InFlight {
    decision: usize,
    start_index: usize,
    started: Instant,
    sll_stop: Option<usize>,
    ll_stop: Option<usize>,
    conflicting_alt_resolved_by_sll: usize,
}

#[derive(Debug, Clone)]
pub struct Profiler {
    decisions: Vec<DecisionInfo>,
    in_flight: Option<InFlight>,
}

impl Profiler {
    pub fn new(number_of_decisions: usize) -> Self {
        Self {
            decisions: (0..number_of_decisions).map(DecisionInfo::new).collect(),
            in_flight: None,
        }
    }

    pub fn decision_info(&self) -> &[DecisionInfo] {
        &self.decisions
    }

    pub fn into_decision_info(self) -> Vec<DecisionInfo> {
        self.decisions
    }

    pub fn parse_info(&self, cache: Option<&DecisionCache>) -> ParseInfo {
        ParseInfo::from_decisions(&self.decisions, cache)
    }

    fn event(&self, in_flight: &InFlight, stop_index: usize, full_ctx: bool) -> DecisionEvent {
        DecisionEvent {
            decision: in_flight.decision,
            start_index: in_flight.start_index,
            stop_index,
            full_ctx,
        }
    }
}

impl PredictionObserver for Profiler {
    fn prediction_started(&mut self, decision: usize, start_index: usize) {
        self.in_flight = Some(InFlight {
            decision,
            start_index,
            started: Instant::now(),
            sll_stop: None,
            ll_stop: None,
            conflicting_alt_resolved_by_sll: 0,
        });
    }

    fn existing_target(&mut self, decision: usize, _from: DfaStateId, index: usize, target: Option<DfaEdge>) {
        let Some(in_flight) = self.in_flight.as_mut() else {
            return;
        };
        in_flight.sll_stop = Some(index);
        let Some(target) = target else {
            return;
        };
        let start_index = in_flight.start_index;
        let info = &mut self.decisions[decision];
        info.sll_dfa_transitions += 1;
        if target == DfaEdge::Error {
            info.errors.push(DecisionEvent {
                decision,
                start_index,
                stop_index: index,
                full_ctx: false,
            });
        }
    }

    fn reach_computed(
        &mut self,
        decision: usize,
        _closure: &AtnConfigSet,
        index: usize,
        full_ctx: bool,
        reached: bool,
    ) {
        let Some(in_flight) = self.in_flight.as_mut() else {
            return;
        };
        if full_ctx {
            in_flight.ll_stop = Some(index);
        }
        let stop_index = if full_ctx {
            index
        } else {
            in_flight.sll_stop.unwrap_or(index)
        };
        let start_index = in_flight.start_index;
        let info = &mut self.decisions[decision];
        if full_ctx {
            info.ll_atn_transitions += 1;
        } else {
            info.sll_atn_transitions += 1;
        }
        // A successful reach needs nothing beyond the transition count.
        if !reached {
            info.errors.push(DecisionEvent {
                decision,
                start_index,
                stop_index,
                full_ctx,
            });
        }
    }

    fn predicate_evaluated(
        &mut self,
        decision: usize,
        semantic: &SemanticContext,
        alt: usize,
        result: bool,
        full_ctx: bool,
    ) {
        let Some(in_flight) = self.in_flight.as_ref() else {
            return;
        };
        let stop_index = in_flight.ll_stop.or(in_flight.sll_stop).unwrap_or(in_flight.start_index);
        let event = self.event(in_flight, stop_index, full_ctx);
        self.decisions[decision].predicate_evals.push(PredicateEvalEvent {
            event,
            predicate: semantic.to_string(),
            alt,
            result,
        });
    }

    fn attempting_full_context(
        &mut self,
        decision: usize,
        conflicting_alts: &AltSet,
        configs: &AtnConfigSet,
        _start_index: usize,
        _stop_index: usize,
    ) {
        if let Some(in_flight) = self.in_flight.as_mut() {
            in_flight.conflicting_alt_resolved_by_sll = conflicting_alts
                .min()
                .or_else(|| configs.alts().min())
                .unwrap_or(0);
        }
        self.decisions[decision].ll_fallback += 1;
    }

    fn context_sensitivity(
        &mut self,
        decision: usize,
        prediction: usize,
        _configs: &AtnConfigSet,
        start_index: usize,
        stop_index: usize,
    ) {
        let Some(in_flight) = self.in_flight.as_ref() else {
            return;
        };
        if prediction != in_flight.conflicting_alt_resolved_by_sll {
            self.decisions[decision].context_sensitivities.push(DecisionEvent {
                decision,
                start_index,
                stop_index,
                full_ctx: true,
            });
        }
    }

    fn ambiguity(
        &mut self,
        decision: usize,
        ambig_alts: &AltSet,
        exact: bool,
        configs: &AtnConfigSet,
        start_index: usize,
        stop_index: usize,
    ) {
        let Some(in_flight) = self.in_flight.as_ref() else {
            return;
        };
        let prediction = ambig_alts.min().or_else(|| configs.alts().min()).unwrap_or(0);
        let resolved_by_sll = in_flight.conflicting_alt_resolved_by_sll;
        let event = DecisionEvent {
            decision,
            start_index,
            stop_index,
            full_ctx: configs.full_ctx,
        };
        let info = &mut self.decisions[decision];
        // SLL and LL both conflict, but resolve to different minima.
        if configs.full_ctx && prediction != resolved_by_sll {
            info.context_sensitivities.push(event.clone());
        }
        info.ambiguities.push(AmbiguityEvent {
            event,
            ambig_alts: ambig_alts.clone(),
            exact,
        });
    }

    fn prediction_finished(&mut self, decision: usize, outcome: &Result<usize, NoViableAlt>) {
        let Some(in_flight) = self.in_flight.take() else {
            return;
        };
        let Ok(alt) = outcome else {
            return;
        };
        let elapsed = u64::try_from(in_flight.started.elapsed().as_nanos()).unwrap_or(u64::MAX);
        let info = &mut self.decisions[decision];
        info.time_in_prediction_ns += elapsed;
        info.invocations += 1;

        let sll_stop = in_flight.sll_stop.unwrap_or(in_flight.start_index);
        let sll_k = (sll_stop + 1).saturating_sub(in_flight.start_index) as u64;
        info.record_sll_look(
            sll_k,
            LookaheadEvent {
                event: DecisionEvent {
                    decision,
                    start_index: in_flight.start_index,
                    stop_index: sll_stop,
                    full_ctx: false,
                },
                predicted_alt: *alt,
            },
        );
        if let Some(ll_stop) = in_flight.ll_stop {
            let ll_k = (ll_stop + 1).saturating_sub(in_flight.start_index) as u64;
            info.record_ll_look(
                ll_k,
                LookaheadEvent {
                    event: DecisionEvent {
                        decision,
                        start_index: in_flight.start_index,
                        stop_index: ll_stop,
                        full_ctx: true,
                    },
                    predicted_alt: *alt,
                },
            );
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProfilingPredictor {
    predictor: Predictor,
    profiler: Profiler,
}

impl ProfilingPredictor {
    pub fn new(predictor: Predictor) -> Self {
        let profiler = Profiler::new(predictor.atn().number_of_decisions());
        Self {
            predictor,
            profiler,
        }
    }

    pub fn predictor(&self) -> &Predictor {
        &self.predictor
    }

    pub fn profiler(&self) -> &Profiler {
        &self.profiler
    }

    pub fn decision_info(&self) -> &[DecisionInfo] {
        self.profiler.decision_info()
    }

    pub fn into_parts(self) -> (Predictor, Profiler) {
        (self.predictor, self.profiler)
    }

    pub fn adaptive_predict(
        &mut self,
        cache: &mut DecisionCache,
        input: &mut dyn TokenStream,
        decision: usize,
        call_context: &CallContext,
        evaluator: &mut dyn SemanticEvaluator,
        listener: &mut dyn PredictionListener,
    ) -> Result<usize, NoViableAlt> {
        let mut hooks = PredictionHooks::new(evaluator, listener, &mut self.profiler);
        self.predictor
            .adaptive_predict(cache, input, decision, call_context, &mut hooks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absorb_sums_counters_and_keeps_extremes() {
        let mut left = DecisionInfo::new(2);
        left.invocations = 3;
        left.sll_total_look = 6;
        left.sll_min_look = 1;
        left.sll_max_look = 3;
        left.sll_atn_transitions = 4;

        let mut right = DecisionInfo::new(2);
        right.invocations = 1;
        right.sll_total_look = 5;
        right.sll_min_look = 5;
        right.sll_max_look = 5;
        right.ll_total_look = 2;
        right.ll_min_look = 2;
        right.ll_max_look = 2;
        right.ll_fallback = 1;

        left.absorb(&right);
        assert_eq!(left.invocations, 4);
        assert_eq!(left.sll_total_look, 11);
        assert_eq!(left.sll_min_look, 1);
        assert_eq!(left.sll_max_look, 5);
        assert_eq!(left.ll_min_look, 2);
        assert_eq!(left.ll_fallback, 1);
        assert_eq!(left.sll_atn_transitions, 4);
    }

    #[test]
    fn parse_info_lists_decisions_that_needed_full_context() {
        let mut first = DecisionInfo::new(0);
        first.sll_atn_transitions = 2;
        let mut second = DecisionInfo::new(1);
        second.ll_fallback = 2;
        second.ll_atn_transitions = 3;

        let info = ParseInfo::from_decisions(&[first, second], None);
        assert_eq!(info.ll_decisions, vec![1]);
        assert_eq!(info.total_atn_lookahead_ops, 5);
        assert_eq!(info.dfa_size, 0);
        assert_eq!(info.context_cache_size, 0);
    }
}
