use crate::config::{AltSet, AtnConfigSet};
use crate::dfa::{DfaEdge, DfaStateId};
use crate::error::NoViableAlt;
use crate::semantic::SemanticContext;

/// Instrumentation seams of one prediction. Every method defaults to a no-op;
/// implementations must not influence the predicted alternative.
#[allow(unused_variables)]
pub trait PredictionObserver {
    fn prediction_started(&mut self, decision: usize, start_index: usize) {}

    fn existing_target(
        &mut self,
        decision: usize,
        from: DfaStateId,
        index: usize,
        target: Option<DfaEdge>,
    ) {
    }

    fn reach_computed(
        &mut self,
        decision: usize,
        closure: &AtnConfigSet,
        index: usize,
        full_ctx: bool,
        reached: bool,
    ) {
    }

    fn predicate_evaluated(
        &mut self,
        decision: usize,
        semantic: &SemanticContext,
        alt: usize,
        result: bool,
        full_ctx: bool,
    ) {
    }

    fn attempting_full_context(
        &mut self,
        decision: usize,
        conflicting_alts: &AltSet,
        configs: &AtnConfigSet,
        start_index: usize,
        stop_index: usize,
    ) {
    }

    fn context_sensitivity(
        &mut self,
        decision: usize,
        prediction: usize,
        configs: &AtnConfigSet,
        start_index: usize,
        stop_index: usize,
    ) {
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
    }

    fn prediction_finished(&mut self, decision: usize, outcome: &Result<usize, NoViableAlt>) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl PredictionObserver for NoopObserver {}
