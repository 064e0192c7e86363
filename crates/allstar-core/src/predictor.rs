use crate::atn::{Atn, StateNumber, EOF, INVALID_ALT};
use crate::closure::Closure;
use crate::config::{AltSet, AtnConfig, AtnConfigSet};
use crate::conflict::{self, PredictionMode};
use crate::context::{CallContext, PredictionContext, PredictionContextCache};
use crate::dfa::{DecisionCache, Dfa, DfaEdge, DfaState, DfaStateId, PredPrediction};
use crate::error::NoViableAlt;
use crate::listener::PredictionListener;
use crate::observer::PredictionObserver;
use crate::semantic::{SemanticContext, SemanticEvaluator};
use crate::token_stream::TokenStream;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PredictorOptions {
    pub mode: PredictionMode,
}

pub struct PredictionHooks<'h> {
    pub evaluator: &'h mut dyn SemanticEvaluator,
    pub listener: &'h mut dyn PredictionListener,
    pub observer: &'h mut dyn PredictionObserver,
}

impl<'h> PredictionHooks<'h> {
    pub fn new(
        evaluator: &'h mut dyn SemanticEvaluator,
        listener: &'h mut dyn PredictionListener,
        observer: &'h mut dyn PredictionObserver,
    ) -> Self {
        Self {
            evaluator,
            listener,
            observer,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Predictor {
    atn: Arc<Atn>,
    options: PredictorOptions,
}

impl Predictor {
    pub fn new(atn: Arc<Atn>, options: PredictorOptions) -> Self {
        Self { atn, options }
    }

    pub fn atn(&self) -> &Arc<Atn> {
        &self.atn
    }

    pub fn options(&self) -> PredictorOptions {
        self.options
    }

    pub fn set_mode(&mut self, mode: PredictionMode) {
        self.options.mode = mode;
    }

    /// Predict the alternative of `decision` for the input at its current
    /// position. The input is restored to that position before returning.
    pub fn adaptive_predict(
        &self,
        cache: &mut DecisionCache,
        input: &mut dyn TokenStream,
        decision: usize,
        call_context: &CallContext,
        hooks: &mut PredictionHooks<'_>,
    ) -> Result<usize, NoViableAlt> {
        let atn: &Atn = &self.atn;
        let start_index = input.index();
        let marker = input.mark();
        hooks.observer.prediction_started(decision, start_index);
        log::debug!(
            "adaptive_predict decision {decision} ({}) at index {start_index}, la(1)={}, mode {}",
            atn.rule_name_for_decision(decision),
            atn.token_display_name(input.la(1)),
            self.options.mode
        );

        let decision_state = atn.decision_state(decision);
        let precedence_rule = decision_state
            .precedence_decision
            .then_some(decision_state.rule_index);
        let (dfa, contexts) = cache.parts_mut(decision);
        let outcome = {
            let mut simulation = Simulation {
                atn,
                mode: self.options.mode,
                decision,
                start_index,
                call_context,
                precedence_rule,
                input: &mut *input,
                evaluator: &mut *hooks.evaluator,
                listener: &mut *hooks.listener,
                observer: &mut *hooks.observer,
            };
            simulation.predict(dfa, contexts)
        };

        input.seek(start_index);
        input.release(marker);
        hooks.observer.prediction_finished(decision, &outcome);
        match &outcome {
            Ok(alt) => log::debug!("decision {decision} predicts alt {alt}"),
            Err(err) => log::debug!("{err}"),
        }
        outcome
    }
}

struct Simulation<'a> {
    atn: &'a Atn,
    mode: PredictionMode,
    decision: usize,
    start_index: usize,
    call_context: &'a CallContext,
    precedence_rule: Option<usize>,
    input: &'a mut dyn TokenStream,
    evaluator: &'a mut dyn SemanticEvaluator,
    listener: &'a mut dyn PredictionListener,
    observer: &'a mut dyn PredictionObserver,
}

impl Simulation<'_> {
    fn predict(&mut self, dfa: &mut Dfa, contexts: &mut PredictionContextCache) -> Result<usize, NoViableAlt> {
        let precedence = self.call_context.precedence;
        let s0 = match dfa.start_state(precedence) {
            Some(s0) => s0,
            None => {
                let mut closure = Closure::new(self.atn, false)
                    .with_precedence_rule(self.precedence_rule)
                    .with_evaluator(&mut *self.evaluator, self.call_context);
                let mut s0_closure = closure.start_state(dfa.atn_start_state, PredictionContext::empty());
                if dfa.is_precedence_dfa() {
                    s0_closure = closure.apply_precedence_filter(&s0_closure);
                }
                let s0 = dfa.add_state(DfaState::new(s0_closure), contexts);
                dfa.set_start_state(precedence, s0);
                s0
            }
        };
        self.exec_atn(dfa, contexts, s0)
    }

    fn exec_atn(
        &mut self,
        dfa: &mut Dfa,
        contexts: &mut PredictionContextCache,
        s0: DfaStateId,
    ) -> Result<usize, NoViableAlt> {
        let mut previous = s0;
        let mut symbol = self.input.la(1);
        loop {
            let existing = dfa.existing_target(previous, symbol);
            self.observer
                .existing_target(self.decision, previous, self.input.index(), existing);
            let target = match existing {
                Some(edge) => edge,
                None => self.compute_target_state(dfa, contexts, previous, symbol),
            };

            let current = match target {
                DfaEdge::State(id) => id,
                DfaEdge::Error => {
                    let configs = dfa.state(previous).configs.clone();
                    let err = self.no_viable_alt(configs.clone());
                    self.input.seek(self.start_index);
                    let alt = self.syn_valid_or_sem_invalid_alt_that_finished_decision_entry_rule(&configs);
                    if alt != INVALID_ALT {
                        return Ok(alt);
                    }
                    return Err(err);
                }
            };

            let state = dfa.state(current);
            if state.requires_full_context && self.mode != PredictionMode::Sll {
                let sll_configs = state.configs.clone();
                let predicates = state.predicates.clone();
                let mut conflicting = sll_configs.conflicting_alts.clone().unwrap_or_default();
                if let Some(predicates) = predicates {
                    let conflict_index = self.input.index();
                    self.input.seek(self.start_index);
                    conflicting = self.eval_predicates(&predicates, true, false);
                    if let Some(alt) = conflicting.single() {
                        return Ok(alt);
                    }
                    self.input.seek(conflict_index);
                }

                log::debug!(
                    "decision {} conflicts on {conflicting} at index {}; retrying with full context",
                    self.decision,
                    self.input.index()
                );
                let s0_closure = self.compute_full_context_start_state(dfa.atn_start_state);
                let stop_index = self.input.index();
                self.listener.report_attempting_full_context(
                    self.atn,
                    self.decision,
                    &conflicting,
                    &sll_configs,
                    self.start_index,
                    stop_index,
                );
                self.observer.attempting_full_context(
                    self.decision,
                    &conflicting,
                    &sll_configs,
                    self.start_index,
                    stop_index,
                );
                return self.exec_atn_with_full_context(s0_closure);
            }

            if state.is_accept {
                let Some(predicates) = state.predicates.clone() else {
                    return Ok(state.prediction);
                };
                let configs = state.configs.clone();
                self.input.seek(self.start_index);
                let alts = self.eval_predicates(&predicates, true, false);
                return match alts.min() {
                    Some(alt) => Ok(alt),
                    None => Err(self.no_viable_alt(configs)),
                };
            }

            previous = current;
            if symbol != EOF {
                self.input.consume();
                symbol = self.input.la(1);
            }
        }
    }

    fn compute_target_state(
        &mut self,
        dfa: &mut Dfa,
        contexts: &mut PredictionContextCache,
        previous: DfaStateId,
        symbol: i32,
    ) -> DfaEdge {
        let closure = dfa.state(previous).configs.clone();
        let Some(mut reach) = self.compute_reach_set(&closure, symbol, false) else {
            dfa.add_edge(previous, symbol, DfaEdge::Error);
            return DfaEdge::Error;
        };

        let mut draft_accept = false;
        let mut prediction = INVALID_ALT;
        let mut requires_full_context = false;
        let unique = conflict::unique_alt(&reach);
        if unique != INVALID_ALT {
            draft_accept = true;
            reach.unique_alt = unique;
            prediction = unique;
        } else if conflict::has_sll_conflict_terminating_prediction(self.atn, self.mode, &reach) {
            let alts = conflict::conflicting_alts(&reach);
            prediction = alts.min().unwrap_or(INVALID_ALT);
            reach.conflicting_alts = Some(alts);
            requires_full_context = true;
            draft_accept = true;
        }

        let mut predicates = None;
        if draft_accept && reach.has_semantic_context {
            let alts = conflict::conflicting_alts_or_unique_alt(&reach);
            let nalts = self.atn.decision_state(self.decision).transitions.len();
            match predicates_for_ambig_alts(&alts, &reach, nalts) {
                Some(alt_to_pred) => {
                    predicates = predicate_predictions(&alts, &alt_to_pred);
                    prediction = INVALID_ALT;
                }
                None => prediction = alts.min().unwrap_or(INVALID_ALT),
            }
        }

        let mut draft = DfaState::new(reach);
        draft.is_accept = draft_accept;
        draft.prediction = prediction;
        draft.requires_full_context = requires_full_context;
        draft.predicates = predicates;
        let id = dfa.add_state(draft, contexts);
        dfa.add_edge(previous, symbol, DfaEdge::State(id));
        DfaEdge::State(id)
    }

    fn compute_reach_set(&mut self, closure: &AtnConfigSet, symbol: i32, full_ctx: bool) -> Option<AtnConfigSet> {
        let precedence_rule = if full_ctx { None } else { self.precedence_rule };
        let reach = Closure::new(self.atn, full_ctx)
            .with_precedence_rule(precedence_rule)
            .with_evaluator(&mut *self.evaluator, self.call_context)
            .reach(closure, symbol);
        self.observer.reach_computed(
            self.decision,
            closure,
            self.input.index(),
            full_ctx,
            reach.is_some(),
        );
        reach
    }

    fn compute_full_context_start_state(&mut self, decision_state: StateNumber) -> AtnConfigSet {
        let initial = PredictionContext::from_call_stack(self.atn, self.call_context);
        Closure::new(self.atn, true)
            .with_evaluator(&mut *self.evaluator, self.call_context)
            .start_state(decision_state, initial)
    }

    fn exec_atn_with_full_context(&mut self, s0: AtnConfigSet) -> Result<usize, NoViableAlt> {
        let mut found_exact_ambig = false;
        let mut previous = s0;
        self.input.seek(self.start_index);
        let mut symbol = self.input.la(1);

        let (reach, mut predicted) = loop {
            let Some(mut reach) = self.compute_reach_set(&previous, symbol, true) else {
                let err = self.no_viable_alt(Arc::new(previous.clone()));
                self.input.seek(self.start_index);
                let alt = self.syn_valid_or_sem_invalid_alt_that_finished_decision_entry_rule(&previous);
                if alt != INVALID_ALT {
                    return Ok(alt);
                }
                return Err(err);
            };

            let subsets = conflict::conflicting_alt_subsets(&reach);
            reach.unique_alt = conflict::unique_alt(&reach);
            if reach.unique_alt != INVALID_ALT {
                let alt = reach.unique_alt;
                break (reach, alt);
            }
            if self.mode != PredictionMode::LlExactAmbigDetection {
                let alt = conflict::resolves_to_just_one_viable_alt(&subsets);
                if alt != INVALID_ALT {
                    break (reach, alt);
                }
            } else if conflict::all_subsets_conflict(&subsets) && conflict::all_subsets_equal(&subsets) {
                found_exact_ambig = true;
                let alt = conflict::single_viable_alt(&subsets);
                break (reach, alt);
            }

            previous = reach;
            if symbol != EOF {
                self.input.consume();
                symbol = self.input.la(1);
            }
        };
        let stop_index = self.input.index();

        if reach.has_semantic_context {
            let alts = if reach.unique_alt != INVALID_ALT {
                AltSet::of(reach.unique_alt)
            } else {
                reach.alts()
            };
            let nalts = self.atn.decision_state(self.decision).transitions.len();
            let pairs = predicates_for_ambig_alts(&alts, &reach, nalts)
                .and_then(|alt_to_pred| predicate_predictions(&alts, &alt_to_pred));
            if let Some(pairs) = pairs {
                self.input.seek(self.start_index);
                let viable = self.eval_predicates(&pairs, true, true);
                self.input.seek(stop_index);
                match (viable.min(), viable.single()) {
                    (None, _) => return Err(self.no_viable_alt(Arc::new(reach))),
                    (Some(_), Some(alt)) if reach.unique_alt == INVALID_ALT => return Ok(alt),
                    (Some(alt), _) => predicted = alt,
                }
            }
        }

        if reach.unique_alt != INVALID_ALT {
            log::debug!(
                "decision {} resolved by full context to alt {predicted} at index {stop_index}",
                self.decision
            );
            self.listener.report_context_sensitivity(
                self.atn,
                self.decision,
                predicted,
                &reach,
                self.start_index,
                stop_index,
            );
            self.observer.context_sensitivity(
                self.decision,
                predicted,
                &reach,
                self.start_index,
                stop_index,
            );
            return Ok(predicted);
        }

        let ambig_alts = reach.alts();
        log::debug!(
            "decision {} is ambiguous on {ambig_alts} (exact={found_exact_ambig}) over {}..{stop_index}; choosing {predicted}",
            self.decision,
            self.start_index
        );
        self.listener.report_ambiguity(
            self.atn,
            self.decision,
            found_exact_ambig,
            &ambig_alts,
            &reach,
            self.start_index,
            stop_index,
        );
        self.observer.ambiguity(
            self.decision,
            &ambig_alts,
            found_exact_ambig,
            &reach,
            self.start_index,
            stop_index,
        );
        Ok(predicted)
    }

    fn eval_predicates(&mut self, pairs: &[PredPrediction], complete: bool, full_ctx: bool) -> AltSet {
        let mut predictions = AltSet::new();
        for pair in pairs {
            if pair.semantic.is_none() {
                predictions.insert(pair.alt);
                if !complete {
                    break;
                }
                continue;
            }
            if self.eval_semantic(&pair.semantic, pair.alt, full_ctx) {
                predictions.insert(pair.alt);
                if !complete {
                    break;
                }
            }
        }
        predictions
    }

    fn eval_semantic(&mut self, semantic: &SemanticContext, alt: usize, full_ctx: bool) -> bool {
        let result = semantic.evaluate(&mut *self.evaluator, self.call_context);
        if !matches!(semantic, SemanticContext::Precedence(_)) {
            self.observer
                .predicate_evaluated(self.decision, semantic, alt, result, full_ctx);
        }
        result
    }

    /// On a dead end, prefer an alternative that already finished the
    /// decision rule, first among configs whose guards hold.
    fn syn_valid_or_sem_invalid_alt_that_finished_decision_entry_rule(&mut self, configs: &AtnConfigSet) -> usize {
        let mut valid = Vec::new();
        let mut invalid = Vec::new();
        for config in configs {
            if config.semantic.is_none()
                || self.eval_semantic(&config.semantic, config.alt, configs.full_ctx)
            {
                valid.push(config);
            } else {
                invalid.push(config);
            }
        }
        let alt = self.alt_that_finished_decision_entry_rule(&valid);
        if alt != INVALID_ALT {
            return alt;
        }
        self.alt_that_finished_decision_entry_rule(&invalid)
    }

    fn alt_that_finished_decision_entry_rule(&self, configs: &[&AtnConfig]) -> usize {
        configs
            .iter()
            .filter(|config| {
                config.reaches_into_outer_context > 0
                    || (self.atn.state(config.state).is_rule_stop() && config.context.has_empty_path())
            })
            .map(|config| config.alt)
            .min()
            .unwrap_or(INVALID_ALT)
    }

    fn no_viable_alt(&self, configs: Arc<AtnConfigSet>) -> NoViableAlt {
        NoViableAlt {
            decision: self.decision,
            decision_state: self.atn.decision_state(self.decision).number,
            start_index: self.start_index,
            start_symbol: self.input.get(self.start_index),
            offending_index: self.input.index(),
            offending_symbol: self.input.la(1),
            dead_end_configs: configs,
            call_context: self.call_context.clone(),
        }
    }
}

fn predicates_for_ambig_alts(
    ambig_alts: &AltSet,
    configs: &AtnConfigSet,
    nalts: usize,
) -> Option<Vec<SemanticContext>> {
    let mut alt_to_pred: Vec<Option<SemanticContext>> = vec![None; nalts + 1];
    for config in configs {
        if !ambig_alts.contains(config.alt) {
            continue;
        }
        let Some(slot) = alt_to_pred.get_mut(config.alt) else {
            continue;
        };
        *slot = Some(match slot.take() {
            None => config.semantic.clone(),
            Some(existing) => SemanticContext::or(&existing, &config.semantic),
        });
    }
    let alt_to_pred = alt_to_pred
        .into_iter()
        .map(Option::unwrap_or_default)
        .collect::<Vec<_>>();
    let guarded = alt_to_pred.iter().skip(1).filter(|pred| !pred.is_none()).count();
    (guarded > 0).then_some(alt_to_pred)
}

fn predicate_predictions(ambig_alts: &AltSet, alt_to_pred: &[SemanticContext]) -> Option<Vec<PredPrediction>> {
    let mut pairs = Vec::new();
    let mut contains_predicate = false;
    for (alt, semantic) in alt_to_pred.iter().enumerate().skip(1) {
        if ambig_alts.contains(alt) {
            pairs.push(PredPrediction {
                semantic: semantic.clone(),
                alt,
            });
        }
        if !semantic.is_none() {
            contains_predicate = true;
        }
    }
    contains_predicate.then_some(pairs)
}
