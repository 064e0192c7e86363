use crate::atn::{Atn, StateNumber, Transition, EOF, EPSILON, INVALID_ALT, MIN_USER_TOKEN_TYPE};
use crate::config::{AtnConfig, AtnConfigSet};
use crate::conflict;
use crate::context::{CallContext, MergeCache, PredictionContext, EMPTY_RETURN_STATE};
use crate::semantic::{PredicateTable, SemanticContext, SemanticEvaluator};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
struct Step {
    collect_predicates: bool,
    /// Rule nesting relative to the seed; negative once the walk returned
    /// past the decision rule.
    depth: isize,
    treat_eof_as_epsilon: bool,
}

pub struct Closure<'a> {
    atn: &'a Atn,
    full_ctx: bool,
    precedence_rule: Option<usize>,
    merge_cache: MergeCache,
    evaluator: Option<(&'a mut dyn SemanticEvaluator, &'a CallContext)>,
}

impl<'a> Closure<'a> {
    pub fn new(atn: &'a Atn, full_ctx: bool) -> Self {
        Self {
            atn,
            full_ctx,
            precedence_rule: None,
            merge_cache: MergeCache::new(),
            evaluator: None,
        }
    }

    /// Rule of a precedence decision; configs returning from its outermost
    /// invocation are exempt from the precedence filter.
    pub fn with_precedence_rule(mut self, rule_index: Option<usize>) -> Self {
        self.precedence_rule = rule_index;
        self
    }

    pub fn with_evaluator(
        mut self,
        evaluator: &'a mut dyn SemanticEvaluator,
        call_context: &'a CallContext,
    ) -> Self {
        self.evaluator = Some((evaluator, call_context));
        self
    }

    pub fn start_state(
        &mut self,
        decision_state: StateNumber,
        initial: Arc<PredictionContext>,
    ) -> AtnConfigSet {
        let atn = self.atn;
        let mut configs = AtnConfigSet::new(self.full_ctx);
        for (idx, transition) in atn.state(decision_state).transitions.iter().enumerate() {
            let seed = AtnConfig::new(transition.target(), idx + 1, initial.clone());
            let mut busy = HashSet::new();
            self.close(seed, &mut configs, &mut busy, true, false);
        }
        configs
    }

    pub fn close_all(&mut self, seeds: &AtnConfigSet) -> AtnConfigSet {
        let mut configs = AtnConfigSet::new(self.full_ctx);
        for seed in seeds {
            let mut busy = HashSet::new();
            self.close(seed.clone(), &mut configs, &mut busy, false, false);
        }
        configs
    }

    pub fn close(
        &mut self,
        config: AtnConfig,
        configs: &mut AtnConfigSet,
        busy: &mut HashSet<AtnConfig>,
        collect_predicates: bool,
        treat_eof_as_epsilon: bool,
    ) {
        let mut entered = Vec::new();
        let step = Step {
            collect_predicates,
            depth: 0,
            treat_eof_as_epsilon,
        };
        self.closure_checking_stop_state(config, configs, busy, &mut entered, step);
    }

    fn closure_checking_stop_state(
        &mut self,
        config: AtnConfig,
        configs: &mut AtnConfigSet,
        busy: &mut HashSet<AtnConfig>,
        entered: &mut Vec<usize>,
        step: Step,
    ) {
        if !busy.insert(config.clone()) {
            log::trace!("closure revisits {config}; branch cut");
            return;
        }
        let atn = self.atn;
        if atn.state(config.state).is_rule_stop() {
            if !config.context.is_empty() {
                let context = config.context.clone();
                for idx in 0..context.len() {
                    let return_state = context.return_state(idx);
                    if return_state == EMPTY_RETURN_STATE {
                        if self.full_ctx {
                            let stopped = config.with_context(config.state, PredictionContext::empty());
                            configs.add_with_cache(stopped, &mut self.merge_cache);
                        } else {
                            self.closure_inner(&config, configs, busy, entered, step);
                        }
                        continue;
                    }
                    let returned = AtnConfig {
                        state: return_state,
                        alt: config.alt,
                        context: context
                            .parent(idx)
                            .cloned()
                            .unwrap_or_else(PredictionContext::empty),
                        semantic: config.semantic.clone(),
                        reaches_into_outer_context: config.reaches_into_outer_context,
                        precedence_filter_suppressed: false,
                    };
                    let left_rule = entered.pop();
                    self.closure_checking_stop_state(
                        returned,
                        configs,
                        busy,
                        entered,
                        Step {
                            depth: step.depth - 1,
                            ..step
                        },
                    );
                    if let Some(rule_index) = left_rule {
                        entered.push(rule_index);
                    }
                }
                return;
            }
            if self.full_ctx {
                configs.add_with_cache(config, &mut self.merge_cache);
                return;
            }
        }
        self.closure_inner(&config, configs, busy, entered, step);
    }

    fn closure_inner(
        &mut self,
        config: &AtnConfig,
        configs: &mut AtnConfigSet,
        busy: &mut HashSet<AtnConfig>,
        entered: &mut Vec<usize>,
        step: Step,
    ) {
        let atn = self.atn;
        let state = atn.state(config.state);
        if !state.only_has_epsilon_transitions() {
            configs.add_with_cache(config.clone(), &mut self.merge_cache);
        }

        for transition in &state.transitions {
            let collect_predicates =
                !matches!(transition, Transition::Action { .. }) && step.collect_predicates;
            let Some(mut target) = self.epsilon_target(
                config,
                transition,
                collect_predicates,
                step.depth == 0,
                step.treat_eof_as_epsilon,
            ) else {
                continue;
            };

            let mut depth = step.depth;
            let mut entered_rule = None;
            if state.is_rule_stop() {
                // Returning past the decision rule through a follow link.
                if let (
                    Some(rule_index),
                    Transition::Epsilon {
                        outermost_precedence_return: Some(returning_from),
                        ..
                    },
                ) = (self.precedence_rule, transition)
                {
                    if *returning_from == rule_index {
                        target.precedence_filter_suppressed = true;
                    }
                }
                target.reaches_into_outer_context += 1;
                configs.dips_into_outer_context = true;
                depth -= 1;
            } else if let Transition::Rule { rule_index, .. } = transition {
                if entered.contains(rule_index) {
                    log::trace!(
                        "closure re-enters rule {rule_index} from state {} without input; branch cut",
                        config.state
                    );
                    continue;
                }
                entered_rule = Some(*rule_index);
                if depth >= 0 {
                    depth += 1;
                }
            }

            if let Some(rule_index) = entered_rule {
                entered.push(rule_index);
            }
            self.closure_checking_stop_state(
                target,
                configs,
                busy,
                entered,
                Step {
                    collect_predicates,
                    depth,
                    treat_eof_as_epsilon: step.treat_eof_as_epsilon,
                },
            );
            if entered_rule.is_some() {
                entered.pop();
            }
        }
    }

    fn epsilon_target(
        &mut self,
        config: &AtnConfig,
        transition: &Transition,
        collect_predicates: bool,
        in_context: bool,
        treat_eof_as_epsilon: bool,
    ) -> Option<AtnConfig> {
        match transition {
            Transition::Rule {
                target,
                follow_state,
                ..
            } => Some(config.with_context(
                *target,
                PredictionContext::singleton(config.context.clone(), *follow_state),
            )),
            Transition::Precedence { target, precedence } => {
                if !(collect_predicates && in_context) {
                    return Some(config.moved_to(*target));
                }
                let guard = SemanticContext::Precedence(*precedence);
                if self.full_ctx {
                    if let Some((evaluator, call_context)) = self.evaluator.as_mut() {
                        let holds = guard.evaluate(&mut **evaluator, call_context);
                        return holds.then(|| config.moved_to(*target));
                    }
                }
                Some(config.with_semantic(*target, SemanticContext::and(&config.semantic, &guard)))
            }
            Transition::Predicate {
                target,
                rule_index,
                pred_index,
                ctx_dependent,
            } => {
                if collect_predicates && (!ctx_dependent || in_context) {
                    let guard = SemanticContext::Predicate {
                        rule_index: *rule_index,
                        pred_index: *pred_index,
                        ctx_dependent: *ctx_dependent,
                    };
                    Some(config.with_semantic(*target, SemanticContext::and(&config.semantic, &guard)))
                } else {
                    Some(config.moved_to(*target))
                }
            }
            Transition::Action { target, .. } | Transition::Epsilon { target, .. } => {
                Some(config.moved_to(*target))
            }
            Transition::Atom { target, .. }
            | Transition::Range { target, .. }
            | Transition::Set { target, .. } => {
                if treat_eof_as_epsilon && transition.matches(EOF, 0, 1) {
                    Some(config.moved_to(*target))
                } else {
                    None
                }
            }
            Transition::NotSet { .. } | Transition::Wildcard { .. } => None,
        }
    }

    pub fn reach(&mut self, closure: &AtnConfigSet, symbol: i32) -> Option<AtnConfigSet> {
        let atn = self.atn;
        let mut intermediate = AtnConfigSet::new(self.full_ctx);
        let mut skipped_stop_states = Vec::new();

        for config in closure {
            let state = atn.state(config.state);
            if state.is_rule_stop() {
                if self.full_ctx || symbol == EOF {
                    skipped_stop_states.push(config.clone());
                }
                continue;
            }
            for transition in &state.transitions {
                if transition.matches(symbol, MIN_USER_TOKEN_TYPE, atn.max_token_type()) {
                    intermediate.add_with_cache(config.moved_to(transition.target()), &mut self.merge_cache);
                }
            }
        }

        let skip_closure = skipped_stop_states.is_empty()
            && symbol != EOF
            && (intermediate.len() == 1 || conflict::unique_alt(&intermediate) != INVALID_ALT);
        let mut reach = if skip_closure {
            intermediate
        } else {
            let mut reach = AtnConfigSet::new(self.full_ctx);
            let mut busy = HashSet::new();
            for config in &intermediate {
                self.close(config.clone(), &mut reach, &mut busy, false, symbol == EOF);
            }
            reach
        };

        if symbol == EOF {
            reach = self.remove_all_configs_not_in_rule_stop_state(reach);
        }

        if !skipped_stop_states.is_empty()
            && (!self.full_ctx || !conflict::has_config_in_rule_stop_state(atn, &reach))
        {
            for config in skipped_stop_states {
                reach.add_with_cache(config, &mut self.merge_cache);
            }
        }

        if reach.is_empty() {
            log::trace!("no reach on symbol {symbol}");
            return None;
        }
        log::trace!("reach on symbol {symbol}: {reach}");
        Some(reach)
    }

    /// At end of input only configs that finished their rule survive; configs
    /// that can finish it without consuming are moved to its stop state.
    fn remove_all_configs_not_in_rule_stop_state(&mut self, configs: AtnConfigSet) -> AtnConfigSet {
        let atn = self.atn;
        if conflict::all_configs_in_rule_stop_states(atn, &configs) {
            return configs;
        }
        let mut result = AtnConfigSet::new(configs.full_ctx);
        for config in &configs {
            let state = atn.state(config.state);
            if state.is_rule_stop() {
                result.add_with_cache(config.clone(), &mut self.merge_cache);
                continue;
            }
            if state.only_has_epsilon_transitions()
                && atn.next_tokens(config.state).contains(EPSILON)
            {
                let stop = atn.rule_stop_state(state.rule_index).number;
                result.add_with_cache(config.moved_to(stop), &mut self.merge_cache);
            }
        }
        result
    }

    /// Start-state filter of precedence decisions: alt 1 configs whose
    /// precedence guards fail are dropped, and other alternatives are dropped
    /// where alt 1 already covers the same state and context.
    pub fn apply_precedence_filter(&mut self, configs: &AtnConfigSet) -> AtnConfigSet {
        let mut fallback = PredicateTable::new();
        let empty = CallContext::empty();
        let (evaluator, call_context): (&mut dyn SemanticEvaluator, &CallContext) =
            match self.evaluator.as_mut() {
                Some((evaluator, call_context)) => (&mut **evaluator, *call_context),
                None => (&mut fallback, &empty),
            };

        let mut states_from_alt1: HashMap<StateNumber, Arc<PredictionContext>> = HashMap::new();
        let mut filtered = AtnConfigSet::new(configs.full_ctx);
        for config in configs.iter().filter(|config| config.alt == 1) {
            let Some(updated) = config.semantic.eval_precedence(evaluator, call_context) else {
                continue;
            };
            states_from_alt1.insert(config.state, config.context.clone());
            let config = if updated != config.semantic {
                config.with_semantic(config.state, updated)
            } else {
                config.clone()
            };
            filtered.add_with_cache(config, &mut self.merge_cache);
        }

        for config in configs.iter().filter(|config| config.alt != 1) {
            if !config.precedence_filter_suppressed
                && states_from_alt1.get(&config.state) == Some(&config.context)
            {
                continue;
            }
            filtered.add_with_cache(config.clone(), &mut self.merge_cache);
        }
        filtered
    }
}
