use crate::atn::{Atn, AtnState, StateKind, StateNumber, Transition};
use crate::error::{AtnError, AtnErrorKind};
use crate::symbol_set::SymbolSet;
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Element {
    Token(i32),
    Range(i32, i32),
    Set(SymbolSet),
    NotSet(SymbolSet),
    Wildcard,
    Rule { rule_index: usize, precedence: i32 },
    Predicate { pred_index: usize, ctx_dependent: bool },
    Precedence(i32),
    Action(usize),
    Block(Vec<Vec<Element>>),
    Optional(Vec<Vec<Element>>),
    Star(Vec<Vec<Element>>),
    Plus(Vec<Vec<Element>>),
}

/// Lowers rule alternatives into the block and loop shapes of the network:
/// blocks with more than one alternative, optional blocks and both loop
/// entries become decision states, numbered in the order they are completed.
#[derive(Debug)]
pub struct AtnBuilder {
    states: Vec<AtnState>,
    decision_to_state: Vec<StateNumber>,
    rule_to_start_state: Vec<StateNumber>,
    rule_to_stop_state: Vec<StateNumber>,
    rule_names: Vec<String>,
    token_names: Vec<String>,
    defined: Vec<bool>,
    loop_bodies: Vec<Handle>,
}

type Handle = (StateNumber, StateNumber);

impl AtnBuilder {
    pub fn new(token_names: Vec<String>) -> Self {
        Self {
            states: Vec::new(),
            decision_to_state: Vec::new(),
            rule_to_start_state: Vec::new(),
            rule_to_stop_state: Vec::new(),
            rule_names: Vec::new(),
            token_names,
            defined: Vec::new(),
            loop_bodies: Vec::new(),
        }
    }

    pub fn declare_rule(&mut self, name: impl Into<String>) -> usize {
        let rule_index = self.rule_names.len();
        self.rule_names.push(name.into());
        let start = self.new_state(rule_index, StateKind::RuleStart);
        let stop = self.new_state(rule_index, StateKind::RuleStop);
        self.rule_to_start_state.push(start);
        self.rule_to_stop_state.push(stop);
        self.defined.push(false);
        rule_index
    }

    pub fn set_left_recursive(&mut self, rule_index: usize, left_recursive: bool) {
        let start = self.rule_to_start_state[rule_index];
        self.states[start].left_recursive_rule = left_recursive;
    }

    pub fn define_rule(&mut self, rule_index: usize, alts: &[Vec<Element>]) -> Result<(), AtnError> {
        if self.defined[rule_index] {
            return Err(AtnError::new(
                AtnErrorKind::DuplicateRule,
                format!("rule '{}' is defined twice", self.rule_names[rule_index]),
            ));
        }
        if alts.is_empty() {
            return Err(AtnError::new(
                AtnErrorKind::EmptyRule,
                format!("rule '{}' has no alternatives", self.rule_names[rule_index]),
            ));
        }
        let (left, right) = self.block(rule_index, StateKind::BlockStart, alts, false)?;
        let start = self.rule_to_start_state[rule_index];
        let stop = self.rule_to_stop_state[rule_index];
        self.epsilon(start, left);
        self.epsilon(right, stop);
        self.defined[rule_index] = true;
        Ok(())
    }

    pub fn build(mut self) -> Result<Atn, AtnError> {
        if let Some(rule_index) = self.defined.iter().position(|defined| !defined) {
            return Err(AtnError::new(
                AtnErrorKind::EmptyRule,
                format!("rule '{}' is declared but never defined", self.rule_names[rule_index]),
            ));
        }

        self.add_rule_follow_links();
        self.mark_precedence_decisions();

        let max_token_type = self.token_names.len() as i32;
        let next_tokens = (0..self.states.len()).map(|_| OnceLock::new()).collect();
        let atn = Atn {
            states: self.states,
            decision_to_state: self.decision_to_state,
            rule_to_start_state: self.rule_to_start_state,
            rule_to_stop_state: self.rule_to_stop_state,
            rule_names: self.rule_names,
            token_names: self.token_names,
            max_token_type,
            next_tokens,
        };
        // a body that matches nothing would loop forever
        for &(block_start, block_end) in &self.loop_bodies {
            if atn.reaches_without_consuming(block_start, block_end) {
                let rule_index = atn.state(block_start).rule_index;
                return Err(AtnError::new(
                    AtnErrorKind::EmptyClosure,
                    format!(
                        "closure in rule '{}' can match an empty sequence",
                        atn.rule_names[rule_index]
                    ),
                ));
            }
        }
        Ok(atn)
    }

    fn add_rule_follow_links(&mut self) {
        let mut links = Vec::new();
        for state in &self.states {
            for transition in &state.transitions {
                if let Transition::Rule {
                    target,
                    follow_state,
                    precedence,
                    ..
                } = transition
                {
                    let callee = self.states[*target].rule_index;
                    let outermost_precedence_return =
                        if self.states[*target].left_recursive_rule && *precedence == 0 {
                            Some(callee)
                        } else {
                            None
                        };
                    links.push((
                        self.rule_to_stop_state[callee],
                        Transition::Epsilon {
                            target: *follow_state,
                            outermost_precedence_return,
                        },
                    ));
                }
            }
        }
        for (stop, link) in links {
            self.states[stop].transitions.push(link);
        }
    }

    fn mark_precedence_decisions(&mut self) {
        for idx in 0..self.states.len() {
            let state = &self.states[idx];
            if state.kind != StateKind::StarLoopEntry {
                continue;
            }
            let rule_start = self.rule_to_start_state[state.rule_index];
            if !self.states[rule_start].left_recursive_rule {
                continue;
            }
            let Some(last) = state.transitions.last() else {
                continue;
            };
            let maybe_loop_end = &self.states[last.target()];
            if maybe_loop_end.kind != StateKind::LoopEnd
                || !maybe_loop_end.only_has_epsilon_transitions()
            {
                continue;
            }
            if self.states[maybe_loop_end.transitions[0].target()].kind == StateKind::RuleStop {
                self.states[idx].precedence_decision = true;
            }
        }
    }

    fn new_state(&mut self, rule_index: usize, kind: StateKind) -> StateNumber {
        let number = self.states.len();
        self.states.push(AtnState {
            number,
            rule_index,
            kind,
            transitions: Vec::new(),
            decision: None,
            left_recursive_rule: false,
            precedence_decision: false,
        });
        number
    }

    fn define_decision(&mut self, state: StateNumber) {
        self.states[state].decision = Some(self.decision_to_state.len());
        self.decision_to_state.push(state);
    }

    fn epsilon(&mut self, from: StateNumber, to: StateNumber) {
        self.states[from].transitions.push(Transition::Epsilon {
            target: to,
            outermost_precedence_return: None,
        });
    }

    fn block(
        &mut self,
        rule_index: usize,
        kind: StateKind,
        alts: &[Vec<Element>],
        optional: bool,
    ) -> Result<Handle, AtnError> {
        if alts.len() == 1 && !optional && kind == StateKind::BlockStart {
            return self.alternative(rule_index, &alts[0]);
        }

        let mut handles = Vec::with_capacity(alts.len());
        for alt in alts {
            handles.push(self.alternative(rule_index, alt)?);
        }

        let start = self.new_state(rule_index, kind);
        let end = self.new_state(rule_index, StateKind::BlockEnd);
        for (left, right) in handles {
            self.epsilon(start, left);
            self.epsilon(right, end);
        }
        if optional {
            self.epsilon(start, end);
        }
        if self.states[start].transitions.len() > 1 {
            self.define_decision(start);
        }
        Ok((start, end))
    }

    fn alternative(&mut self, rule_index: usize, elements: &[Element]) -> Result<Handle, AtnError> {
        let left = self.new_state(rule_index, StateKind::Basic);
        let mut current = left;
        for element in elements {
            let (el_left, el_right) = self.element(rule_index, element)?;
            self.epsilon(current, el_left);
            current = el_right;
        }
        Ok((left, current))
    }

    fn element(&mut self, rule_index: usize, element: &Element) -> Result<Handle, AtnError> {
        let simple = match element {
            Element::Token(label) => Some(Transition::Atom {
                target: 0,
                label: *label,
            }),
            Element::Range(from, to) => Some(Transition::Range {
                target: 0,
                from: *from,
                to: *to,
            }),
            Element::Set(set) => Some(Transition::Set {
                target: 0,
                set: set.clone(),
            }),
            Element::NotSet(set) => Some(Transition::NotSet {
                target: 0,
                set: set.clone(),
            }),
            Element::Wildcard => Some(Transition::Wildcard { target: 0 }),
            Element::Predicate {
                pred_index,
                ctx_dependent,
            } => Some(Transition::Predicate {
                target: 0,
                rule_index,
                pred_index: *pred_index,
                ctx_dependent: *ctx_dependent,
            }),
            Element::Precedence(precedence) => Some(Transition::Precedence {
                target: 0,
                precedence: *precedence,
            }),
            Element::Action(action_index) => Some(Transition::Action {
                target: 0,
                rule_index,
                action_index: *action_index,
            }),
            _ => None,
        };
        if let Some(mut transition) = simple {
            let left = self.new_state(rule_index, StateKind::Basic);
            let right = self.new_state(rule_index, StateKind::Basic);
            transition.retarget(right);
            self.states[left].transitions.push(transition);
            return Ok((left, right));
        }

        match element {
            Element::Rule {
                rule_index: callee,
                precedence,
            } => {
                let Some(&callee_start) = self.rule_to_start_state.get(*callee) else {
                    return Err(AtnError::new(
                        AtnErrorKind::UnknownRule,
                        format!("rule index {callee} is not declared"),
                    ));
                };
                let left = self.new_state(rule_index, StateKind::Basic);
                let right = self.new_state(rule_index, StateKind::Basic);
                self.states[left].transitions.push(Transition::Rule {
                    target: callee_start,
                    follow_state: right,
                    rule_index: *callee,
                    precedence: *precedence,
                });
                Ok((left, right))
            }
            Element::Block(alts) => self.nested_block(rule_index, StateKind::BlockStart, alts, false),
            Element::Optional(alts) => self.nested_block(rule_index, StateKind::BlockStart, alts, true),
            Element::Star(alts) => self.star(rule_index, alts),
            Element::Plus(alts) => self.plus(rule_index, alts),
            _ => unreachable!("simple elements are lowered above"),
        }
    }

    fn nested_block(
        &mut self,
        rule_index: usize,
        kind: StateKind,
        alts: &[Vec<Element>],
        optional: bool,
    ) -> Result<Handle, AtnError> {
        if alts.is_empty() {
            return Err(AtnError::new(
                AtnErrorKind::InvalidElement,
                format!("empty block in rule '{}'", self.rule_names[rule_index]),
            ));
        }
        self.block(rule_index, kind, alts, optional)
    }

    fn star(&mut self, rule_index: usize, alts: &[Vec<Element>]) -> Result<Handle, AtnError> {
        let (block_start, block_end) =
            self.nested_block(rule_index, StateKind::StarBlockStart, alts, false)?;
        self.loop_bodies.push((block_start, block_end));
        let entry = self.new_state(rule_index, StateKind::StarLoopEntry);
        self.define_decision(entry);
        let end = self.new_state(rule_index, StateKind::LoopEnd);
        let loop_back = self.new_state(rule_index, StateKind::StarLoopBack);
        self.epsilon(entry, block_start);
        self.epsilon(entry, end);
        self.epsilon(block_end, loop_back);
        self.epsilon(loop_back, entry);
        Ok((entry, end))
    }

    fn plus(&mut self, rule_index: usize, alts: &[Vec<Element>]) -> Result<Handle, AtnError> {
        let (block_start, block_end) =
            self.nested_block(rule_index, StateKind::PlusBlockStart, alts, false)?;
        self.loop_bodies.push((block_start, block_end));
        let loop_back = self.new_state(rule_index, StateKind::PlusLoopBack);
        self.define_decision(loop_back);
        let end = self.new_state(rule_index, StateKind::LoopEnd);
        self.epsilon(block_end, loop_back);
        self.epsilon(loop_back, block_start);
        self.epsilon(loop_back, end);
        Ok((block_start, end))
    }
}
