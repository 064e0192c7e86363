use crate::atn::StateNumber;
use crate::config::AtnConfigSet;
use crate::context::CallContext;
use crate::symbol_set::SymbolSet;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtnErrorKind {
    UnknownToken,
    UnknownRule,
    DuplicateRule,
    EmptyRule,
    InvalidElement,
    EmptyClosure,
}

#[derive(Debug, Clone)]
pub struct AtnError {
    pub kind: AtnErrorKind,
    pub message: String,
}

impl AtnError {
    pub fn new(kind: AtnErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl Display for AtnError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AtnError {}

/// A semantic predicate that could not be evaluated. The predictor treats it
/// as a predicate that evaluated to `false`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredicateError {
    pub rule_index: usize,
    pub pred_index: usize,
    pub message: String,
}

impl Display for PredicateError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "predicate {}:{} could not be evaluated: {}",
            self.rule_index, self.pred_index, self.message
        )
    }
}

impl std::error::Error for PredicateError {}

#[derive(Debug, Clone)]
pub struct NoViableAlt {
    pub decision: usize,
    pub decision_state: StateNumber,
    pub start_index: usize,
    pub start_symbol: i32,
    pub offending_index: usize,
    pub offending_symbol: i32,
    pub dead_end_configs: Arc<AtnConfigSet>,
    pub call_context: CallContext,
}

impl Display for NoViableAlt {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "no viable alternative for decision {} at input index {} (symbol {}, started at index {})",
            self.decision, self.offending_index, self.offending_symbol, self.start_index
        )
    }
}

impl std::error::Error for NoViableAlt {}

#[derive(Debug, Clone)]
pub enum RecognitionError {
    NoViableAlt(NoViableAlt),
    InputMismatch {
        state: StateNumber,
        index: usize,
        symbol: i32,
        expected: SymbolSet,
    },
    FailedPredicate {
        state: StateNumber,
        index: usize,
        rule_index: usize,
        predicate: String,
    },
}

impl RecognitionError {
    pub fn offending_index(&self) -> usize {
        match self {
            RecognitionError::NoViableAlt(err) => err.offending_index,
            RecognitionError::InputMismatch { index, .. }
            | RecognitionError::FailedPredicate { index, .. } => *index,
        }
    }

    pub fn offending_state(&self) -> StateNumber {
        match self {
            RecognitionError::NoViableAlt(err) => err.decision_state,
            RecognitionError::InputMismatch { state, .. }
            | RecognitionError::FailedPredicate { state, .. } => *state,
        }
    }
}

impl Display for RecognitionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RecognitionError::NoViableAlt(err) => write!(f, "{err}"),
            RecognitionError::InputMismatch {
                index,
                symbol,
                expected,
                ..
            } => write!(
                f,
                "mismatched input {symbol} at index {index}, expecting {expected}"
            ),
            RecognitionError::FailedPredicate {
                index,
                rule_index,
                predicate,
                ..
            } => write!(
                f,
                "rule {rule_index} failed predicate {predicate} at index {index}"
            ),
        }
    }
}

impl std::error::Error for RecognitionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RecognitionError::NoViableAlt(err) => Some(err),
            _ => None,
        }
    }
}

impl From<NoViableAlt> for RecognitionError {
    fn from(err: NoViableAlt) -> Self {
        RecognitionError::NoViableAlt(err)
    }
}
