use crate::atn::{Atn, StateNumber, Transition, EOF, EPSILON, MIN_USER_TOKEN_TYPE};
use crate::context::{CallContext, PredictionContext, EMPTY_RETURN_STATE};
use crate::symbol_set::SymbolSet;
use std::collections::HashSet;
use std::sync::Arc;

pub struct Ll1Analyzer<'a> {
    atn: &'a Atn,
}

type LookKey = (StateNumber, Vec<StateNumber>, Option<Arc<PredictionContext>>);

struct Walk {
    look: SymbolSet,
    busy: HashSet<LookKey>,
    called: HashSet<usize>,
    stack: Vec<StateNumber>,
}

impl<'a> Ll1Analyzer<'a> {
    pub fn new(atn: &'a Atn) -> Self {
        Self { atn }
    }

    /// Symbols that can follow `state`. Without a context, reaching the end
    /// of the rule adds `EPSILON`; reaching the bottom of a context adds `EOF`.
    pub fn look(&self, state: StateNumber, context: Option<Arc<PredictionContext>>) -> SymbolSet {
        let mut walk = Walk {
            look: SymbolSet::new(),
            busy: HashSet::new(),
            called: HashSet::new(),
            stack: Vec::new(),
        };
        self.look_into(state, &context, &mut walk);
        walk.look
    }

    fn look_into(&self, state: StateNumber, base: &Option<Arc<PredictionContext>>, walk: &mut Walk) {
        if !walk.busy.insert((state, walk.stack.clone(), base.clone())) {
            return;
        }
        let atn_state = self.atn.state(state);

        if atn_state.is_rule_stop() {
            if let Some(follow) = walk.stack.pop() {
                let removed = walk.called.remove(&atn_state.rule_index);
                self.look_into(follow, base, walk);
                if removed {
                    walk.called.insert(atn_state.rule_index);
                }
                walk.stack.push(follow);
                return;
            }
            let Some(ctx) = base else {
                walk.look.add(EPSILON);
                return;
            };
            if ctx.is_empty() {
                walk.look.add(EOF);
                return;
            }
            for idx in 0..ctx.len() {
                let return_state = ctx.return_state(idx);
                if return_state == EMPTY_RETURN_STATE {
                    walk.look.add(EOF);
                    continue;
                }
                let parent = ctx.parent(idx).cloned();
                self.look_into(return_state, &parent, walk);
            }
            return;
        }

        for transition in &atn_state.transitions {
            match transition {
                Transition::Rule {
                    target,
                    follow_state,
                    rule_index,
                    ..
                } => {
                    if !walk.called.insert(*rule_index) {
                        continue;
                    }
                    walk.stack.push(*follow_state);
                    self.look_into(*target, base, walk);
                    walk.stack.pop();
                    walk.called.remove(rule_index);
                }
                Transition::Wildcard { .. } => {
                    walk.look
                        .add_range(MIN_USER_TOKEN_TYPE, self.atn.max_token_type());
                }
                Transition::NotSet { set, .. } => {
                    walk.look
                        .add_set(&set.complement(MIN_USER_TOKEN_TYPE, self.atn.max_token_type()));
                }
                other if other.is_epsilon() => self.look_into(other.target(), base, walk),
                other => {
                    if let Some(label) = other.label() {
                        walk.look.add_set(&label);
                    }
                }
            }
        }
    }
}

impl Atn {
    /// In-rule follow set of `state`, containing `EPSILON` when the end of
    /// the rule is reachable without consuming a symbol.
    pub fn next_tokens(&self, state: StateNumber) -> &SymbolSet {
        self.next_tokens[state].get_or_init(|| Ll1Analyzer::new(self).look(state, None))
    }

    pub fn expected_tokens(&self, state: StateNumber, call_context: &CallContext) -> SymbolSet {
        let mut following = self.next_tokens(state).clone();
        if !following.contains(EPSILON) {
            return following;
        }
        let mut expected = following.clone();
        expected.remove(EPSILON);
        for &invoking_state in call_context.invoking_states.iter().rev() {
            if !following.contains(EPSILON) {
                break;
            }
            let Some(Transition::Rule { follow_state, .. }) =
                self.state(invoking_state).transitions.first()
            else {
                break;
            };
            following = self.next_tokens(*follow_state).clone();
            expected.add_set(&following);
            expected.remove(EPSILON);
        }
        if following.contains(EPSILON) {
            expected.add(EOF);
        }
        expected
    }

    /// Whether `to` is reachable from `from` in the same rule without
    /// consuming a symbol. Calls are passed only into nullable rules.
    pub fn reaches_without_consuming(&self, from: StateNumber, to: StateNumber) -> bool {
        let mut seen = HashSet::new();
        let mut pending = vec![from];
        while let Some(state) = pending.pop() {
            if state == to {
                return true;
            }
            if !seen.insert(state) {
                continue;
            }
            for transition in &self.state(state).transitions {
                match transition {
                    Transition::Rule {
                        target,
                        follow_state,
                        ..
                    } => {
                        if self.next_tokens(*target).contains(EPSILON) {
                            pending.push(*follow_state);
                        }
                    }
                    other if other.is_epsilon() => pending.push(other.target()),
                    _ => {}
                }
            }
        }
        false
    }
}
