use crate::atn::Atn;
use crate::config::{AltSet, AtnConfigSet};
use serde::Serialize;

#[allow(unused_variables)]
pub trait PredictionListener {
    fn report_attempting_full_context(
        &mut self,
        atn: &Atn,
        decision: usize,
        conflicting_alts: &AltSet,
        configs: &AtnConfigSet,
        start_index: usize,
        stop_index: usize,
    ) {
    }

    fn report_context_sensitivity(
        &mut self,
        atn: &Atn,
        decision: usize,
        prediction: usize,
        configs: &AtnConfigSet,
        start_index: usize,
        stop_index: usize,
    ) {
    }

    fn report_ambiguity(
        &mut self,
        atn: &Atn,
        decision: usize,
        exact: bool,
        ambig_alts: &AltSet,
        configs: &AtnConfigSet,
        start_index: usize,
        stop_index: usize,
    ) {
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopListener;

impl PredictionListener for NoopListener {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    AttemptingFullContext {
        decision: usize,
        rule: String,
        start_index: usize,
        stop_index: usize,
        conflicting_alts: AltSet,
    },
    ContextSensitivity {
        decision: usize,
        rule: String,
        start_index: usize,
        stop_index: usize,
        prediction: usize,
    },
    Ambiguity {
        decision: usize,
        rule: String,
        start_index: usize,
        stop_index: usize,
        exact: bool,
        ambig_alts: AltSet,
    },
}

impl Diagnostic {
    pub fn decision(&self) -> usize {
        match self {
            Diagnostic::AttemptingFullContext { decision, .. }
            | Diagnostic::ContextSensitivity { decision, .. }
            | Diagnostic::Ambiguity { decision, .. } => *decision,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Diagnostic::AttemptingFullContext {
                decision,
                rule,
                start_index,
                stop_index,
                ..
            } => format!(
                "reportAttemptingFullContext d={decision} ({rule}), input={start_index}..{stop_index}"
            ),
            Diagnostic::ContextSensitivity {
                decision,
                rule,
                start_index,
                stop_index,
                ..
            } => format!(
                "reportContextSensitivity d={decision} ({rule}), input={start_index}..{stop_index}"
            ),
            Diagnostic::Ambiguity {
                decision,
                rule,
                start_index,
                stop_index,
                exact,
                ambig_alts,
            } => format!(
                "reportAmbiguity d={decision} ({rule}): ambigAlts={ambig_alts}, exact={exact}, input={start_index}..{stop_index}"
            ),
        }
    }
}

/// Collects every report as a [`Diagnostic`]. With `exact_only`, ambiguities
/// that were not proven exact are skipped.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticListener {
    pub exact_only: bool,
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticListener {
    pub fn new(exact_only: bool) -> Self {
        Self {
            exact_only,
            diagnostics: Vec::new(),
        }
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn take(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    fn push(&mut self, diagnostic: Diagnostic) {
        log::debug!("{}", diagnostic.message());
        self.diagnostics.push(diagnostic);
    }
}

impl PredictionListener for DiagnosticListener {
    fn report_attempting_full_context(
        &mut self,
        atn: &Atn,
        decision: usize,
        conflicting_alts: &AltSet,
        _configs: &AtnConfigSet,
        start_index: usize,
        stop_index: usize,
    ) {
        self.push(Diagnostic::AttemptingFullContext {
            decision,
            rule: atn.rule_name_for_decision(decision).to_string(),
            start_index,
            stop_index,
            conflicting_alts: conflicting_alts.clone(),
        });
    }

    fn report_context_sensitivity(
        &mut self,
        atn: &Atn,
        decision: usize,
        prediction: usize,
        _configs: &AtnConfigSet,
        start_index: usize,
        stop_index: usize,
    ) {
        self.push(Diagnostic::ContextSensitivity {
            decision,
            rule: atn.rule_name_for_decision(decision).to_string(),
            start_index,
            stop_index,
            prediction,
        });
    }

    fn report_ambiguity(
        &mut self,
        atn: &Atn,
        decision: usize,
        exact: bool,
        ambig_alts: &AltSet,
        _configs: &AtnConfigSet,
        start_index: usize,
        stop_index: usize,
    ) {
        if self.exact_only && !exact {
            return;
        }
        self.push(Diagnostic::Ambiguity {
            decision,
            rule: atn.rule_name_for_decision(decision).to_string(),
            start_index,
            stop_index,
            exact,
            ambig_alts: ambig_alts.clone(),
        });
    }
}
