use crate::symbol_set::SymbolSet;
use serde::Serialize;
use std::fmt::{Display, Formatter};
use std::sync::OnceLock;

pub const EOF: i32 = -1;
pub const EPSILON: i32 = -2;
pub const MIN_USER_TOKEN_TYPE: i32 = 1;
pub const INVALID_ALT: usize = 0;

pub type StateNumber = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StateKind {
    Basic,
    RuleStart,
    RuleStop,
    BlockStart,
    BlockEnd,
    StarBlockStart,
    PlusBlockStart,
    StarLoopEntry,
    StarLoopBack,
    PlusLoopBack,
    LoopEnd,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Epsilon {
        target: StateNumber,
        /// Set on rule-stop follow links that return from a precedence rule
        /// invoked with precedence 0.
        outermost_precedence_return: Option<usize>,
    },
    Atom {
        target: StateNumber,
        label: i32,
    },
    Range {
        target: StateNumber,
        from: i32,
        to: i32,
    },
    Set {
        target: StateNumber,
        set: SymbolSet,
    },
    NotSet {
        target: StateNumber,
        set: SymbolSet,
    },
    Wildcard {
        target: StateNumber,
    },
    Rule {
        target: StateNumber,
        follow_state: StateNumber,
        rule_index: usize,
        precedence: i32,
    },
    Predicate {
        target: StateNumber,
        rule_index: usize,
        pred_index: usize,
        ctx_dependent: bool,
    },
    Precedence {
        target: StateNumber,
        precedence: i32,
    },
    Action {
        target: StateNumber,
        rule_index: usize,
        action_index: usize,
    },
}

impl Transition {
    pub fn target(&self) -> StateNumber {
        match self {
            Transition::Epsilon { target, .. }
            | Transition::Atom { target, .. }
            | Transition::Range { target, .. }
            | Transition::Set { target, .. }
            | Transition::NotSet { target, .. }
            | Transition::Wildcard { target }
            | Transition::Rule { target, .. }
            | Transition::Predicate { target, .. }
            | Transition::Precedence { target, .. }
            | Transition::Action { target, .. } => *target,
        }
    }

    pub fn is_epsilon(&self) -> bool {
        matches!(
            self,
            Transition::Epsilon { .. }
                | Transition::Rule { .. }
                | Transition::Predicate { .. }
                | Transition::Precedence { .. }
                | Transition::Action { .. }
        )
    }

    pub fn matches(&self, symbol: i32, min_vocab: i32, max_vocab: i32) -> bool {
        match self {
            Transition::Atom { label, .. } => *label == symbol,
            Transition::Range { from, to, .. } => symbol >= *from && symbol <= *to,
            Transition::Set { set, .. } => set.contains(symbol),
            Transition::NotSet { set, .. } => {
                symbol >= min_vocab && symbol <= max_vocab && !set.contains(symbol)
            }
            Transition::Wildcard { .. } => symbol >= min_vocab && symbol <= max_vocab,
            _ => false,
        }
    }

    pub fn label(&self) -> Option<SymbolSet> {
        match self {
            Transition::Atom { label, .. } => Some(SymbolSet::of(*label)),
            Transition::Range { from, to, .. } => Some(SymbolSet::from_range(*from, *to)),
            Transition::Set { set, .. } | Transition::NotSet { set, .. } => Some(set.clone()),
            _ => None,
        }
    }

    pub(crate) fn retarget(&mut self, new_target: StateNumber) {
        match self {
            Transition::Epsilon { target, .. }
            | Transition::Atom { target, .. }
            | Transition::Range { target, .. }
            | Transition::Set { target, .. }
            | Transition::NotSet { target, .. }
            | Transition::Wildcard { target }
            | Transition::Rule { target, .. }
            | Transition::Predicate { target, .. }
            | Transition::Precedence { target, .. }
            | Transition::Action { target, .. } => *target = new_target,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AtnState {
    pub number: StateNumber,
    pub rule_index: usize,
    pub kind: StateKind,
    pub transitions: Vec<Transition>,
    pub decision: Option<usize>,
    pub left_recursive_rule: bool,
    /// Star loop entries that decide whether a precedence rule keeps looping.
    pub precedence_decision: bool,
}

impl AtnState {
    pub fn only_has_epsilon_transitions(&self) -> bool {
        !self.transitions.is_empty() && self.transitions.iter().all(Transition::is_epsilon)
    }

    pub fn is_rule_stop(&self) -> bool {
        self.kind == StateKind::RuleStop
    }
}

#[derive(Debug, Clone)]
pub struct Atn {
    pub(crate) states: Vec<AtnState>,
    pub(crate) decision_to_state: Vec<StateNumber>,
    pub(crate) rule_to_start_state: Vec<StateNumber>,
    pub(crate) rule_to_stop_state: Vec<StateNumber>,
    pub(crate) rule_names: Vec<String>,
    pub(crate) token_names: Vec<String>,
    pub(crate) max_token_type: i32,
    pub(crate) next_tokens: Vec<OnceLock<SymbolSet>>,
}

impl Atn {
    pub fn state(&self, number: StateNumber) -> &AtnState {
        &self.states[number]
    }

    pub fn states(&self) -> &[AtnState] {
        &self.states
    }

    pub fn number_of_decisions(&self) -> usize {
        self.decision_to_state.len()
    }

    pub fn decision_state(&self, decision: usize) -> &AtnState {
        &self.states[self.decision_to_state[decision]]
    }

    pub fn rule_start_state(&self, rule_index: usize) -> &AtnState {
        &self.states[self.rule_to_start_state[rule_index]]
    }

    pub fn rule_stop_state(&self, rule_index: usize) -> &AtnState {
        &self.states[self.rule_to_stop_state[rule_index]]
    }

    pub fn rule_names(&self) -> &[String] {
        &self.rule_names
    }

    pub fn rule_index(&self, name: &str) -> Option<usize> {
        self.rule_names.iter().position(|rule| rule == name)
    }

    pub fn rule_name_for_decision(&self, decision: usize) -> &str {
        &self.rule_names[self.decision_state(decision).rule_index]
    }

    pub fn max_token_type(&self) -> i32 {
        self.max_token_type
    }

    pub fn token_names(&self) -> &[String] {
        &self.token_names
    }

    pub fn token_type(&self, name: &str) -> Option<i32> {
        if name == "EOF" {
            return Some(EOF);
        }
        self.token_names
            .iter()
            .position(|token| token == name)
            .map(|idx| idx as i32 + MIN_USER_TOKEN_TYPE)
    }

    pub fn token_display_name(&self, token_type: i32) -> String {
        if token_type == EOF {
            return "EOF".to_string();
        }
        if token_type == EPSILON {
            return "<EPSILON>".to_string();
        }
        usize::try_from(token_type - MIN_USER_TOKEN_TYPE)
            .ok()
            .and_then(|idx| self.token_names.get(idx))
            .cloned()
            .unwrap_or_else(|| token_type.to_string())
    }

    pub fn symbol_set_display(&self, set: &SymbolSet) -> String {
        let names = set
            .iter()
            .map(|symbol| self.token_display_name(symbol))
            .collect::<Vec<_>>();
        format!("{{{}}}", names.join(", "))
    }
}

impl Display for Atn {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for state in &self.states {
            let marker = match state.decision {
                Some(decision) => format!("d{decision}"),
                None => String::new(),
            };
            writeln!(
                f,
                "{:>4} {:?} {}:{} {}",
                state.number,
                state.kind,
                state.rule_index,
                self.rule_names
                    .get(state.rule_index)
                    .map(String::as_str)
                    .unwrap_or("?"),
                marker
            )?;
            for transition in &state.transitions {
                let edge = match transition {
                    Transition::Epsilon { .. } => "e".to_string(),
                    Transition::Atom { label, .. } => self.token_display_name(*label),
                    Transition::Range { from, to, .. } => format!(
                        "{}..{}",
                        self.token_display_name(*from),
                        self.token_display_name(*to)
                    ),
                    Transition::Set { set, .. } => self.symbol_set_display(set),
                    Transition::NotSet { set, .. } => {
                        format!("~{}", self.symbol_set_display(set))
                    }
                    Transition::Wildcard { .. } => ".".to_string(),
                    Transition::Rule { rule_index, .. } => format!("<{}>", self.rule_names[*rule_index]),
                    Transition::Predicate {
                        rule_index,
                        pred_index,
                        ..
                    } => format!("pred_{rule_index}:{pred_index}"),
                    Transition::Precedence { precedence, .. } => format!("{precedence} >= _p"),
                    Transition::Action {
                        rule_index,
                        action_index,
                        ..
                    } => format!("action_{rule_index}:{action_index}"),
                };
                writeln!(f, "       -{edge}-> {}", transition.target())?;
            }
        }
        Ok(())
    }
}
