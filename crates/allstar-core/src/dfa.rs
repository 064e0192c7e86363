use crate::atn::{Atn, StateNumber, INVALID_ALT};
use crate::config::AtnConfigSet;
use crate::context::PredictionContextCache;
use crate::semantic::SemanticContext;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub type DfaStateId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DfaEdge {
    State(DfaStateId),
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredPrediction {
    pub semantic: SemanticContext,
    pub alt: usize,
}

#[derive(Debug, Clone)]
pub struct DfaState {
    pub id: DfaStateId,
    pub configs: Arc<AtnConfigSet>,
    pub edges: HashMap<i32, DfaEdge>,
    pub is_accept: bool,
    pub prediction: usize,
    pub requires_full_context: bool,
    pub predicates: Option<Vec<PredPrediction>>,
}

impl DfaState {
    pub fn new(configs: AtnConfigSet) -> Self {
        Self {
            id: 0,
            configs: Arc::new(configs),
            edges: HashMap::new(),
            is_accept: false,
            prediction: INVALID_ALT,
            requires_full_context: false,
            predicates: None,
        }
    }

    fn label(&self) -> String {
        let mut label = String::new();
        if self.is_accept {
            label.push(':');
        }
        let _ = write!(label, "s{}", self.id);
        if self.requires_full_context {
            label.push('^');
        }
        if self.is_accept {
            match &self.predicates {
                Some(predicates) => {
                    let pairs = predicates
                        .iter()
                        .map(|pair| format!("({}, {})", pair.semantic, pair.alt))
                        .collect::<Vec<_>>();
                    let _ = write!(label, "=>[{}]", pairs.join(", "));
                }
                None => {
                    let _ = write!(label, "=>{}", self.prediction);
                }
            }
        }
        label
    }
}

#[derive(Debug, Clone)]
pub struct Dfa {
    pub decision: usize,
    pub atn_start_state: StateNumber,
    precedence_dfa: bool,
    s0: Option<DfaStateId>,
    precedence_starts: HashMap<i32, DfaStateId>,
    states: Vec<DfaState>,
    index: HashMap<Arc<AtnConfigSet>, DfaStateId>,
}

impl Dfa {
    pub fn new(atn: &Atn, decision: usize) -> Self {
        let start = atn.decision_state(decision);
        Self {
            decision,
            atn_start_state: start.number,
            precedence_dfa: start.precedence_decision,
            s0: None,
            precedence_starts: HashMap::new(),
            states: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn is_precedence_dfa(&self) -> bool {
        self.precedence_dfa
    }

    /// Start state for the parser's current precedence; the precedence is
    /// ignored outside precedence decisions.
    pub fn start_state(&self, precedence: i32) -> Option<DfaStateId> {
        if self.precedence_dfa {
            self.precedence_starts.get(&precedence).copied()
        } else {
            self.s0
        }
    }

    pub fn set_start_state(&mut self, precedence: i32, state: DfaStateId) {
        if self.precedence_dfa {
            self.precedence_starts.insert(precedence, state);
        } else {
            self.s0 = Some(state);
        }
    }

    pub fn state(&self, id: DfaStateId) -> &DfaState {
        &self.states[id]
    }

    pub fn states(&self) -> &[DfaState] {
        &self.states
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn existing_target(&self, from: DfaStateId, symbol: i32) -> Option<DfaEdge> {
        self.states[from].edges.get(&symbol).copied()
    }

    pub fn add_state(&mut self, mut draft: DfaState, contexts: &mut PredictionContextCache) -> DfaStateId {
        if let Some(&id) = self.index.get(&draft.configs) {
            return id;
        }
        let id = self.states.len();
        let mut configs = Arc::try_unwrap(draft.configs).unwrap_or_else(|shared| (*shared).clone());
        configs.optimize_configs(contexts);
        let configs = Arc::new(configs);
        draft.id = id;
        draft.configs = configs.clone();
        self.index.insert(configs, id);
        self.states.push(draft);
        id
    }

    pub fn add_edge(&mut self, from: DfaStateId, symbol: i32, edge: DfaEdge) {
        log::trace!("decision {} edge s{from} -{symbol}-> {edge:?}", self.decision);
        self.states[from].edges.insert(symbol, edge);
    }

    pub fn clear(&mut self) {
        self.s0 = None;
        self.precedence_starts.clear();
        self.states.clear();
        self.index.clear();
    }

    pub fn render(&self, atn: &Atn) -> String {
        let mut out = String::new();
        for state in &self.states {
            let mut edges = state.edges.iter().collect::<Vec<_>>();
            edges.sort_by_key(|(symbol, _)| **symbol);
            for (symbol, edge) in edges {
                let DfaEdge::State(target) = edge else {
                    continue;
                };
                let _ = writeln!(
                    out,
                    "{}-{}->{}",
                    state.label(),
                    atn.token_display_name(*symbol),
                    self.states[*target].label()
                );
            }
        }
        out
    }
}

#[derive(Debug, Clone)]
pub struct DecisionCache {
    dfas: Vec<Dfa>,
    contexts: PredictionContextCache,
}

impl DecisionCache {
    pub fn new(atn: &Atn) -> Self {
        Self {
            dfas: (0..atn.number_of_decisions())
                .map(|decision| Dfa::new(atn, decision))
                .collect(),
            contexts: PredictionContextCache::new(),
        }
    }

    pub fn dfa(&self, decision: usize) -> &Dfa {
        &self.dfas[decision]
    }

    pub fn dfas(&self) -> &[Dfa] {
        &self.dfas
    }

    pub(crate) fn parts_mut(&mut self, decision: usize) -> (&mut Dfa, &mut PredictionContextCache) {
        (&mut self.dfas[decision], &mut self.contexts)
    }

    pub fn dfa_size(&self, decision: usize) -> usize {
        self.dfas[decision].len()
    }

    pub fn context_cache_size(&self) -> usize {
        self.contexts.len()
    }

    pub fn clear(&mut self) {
        for dfa in &mut self.dfas {
            dfa.clear();
        }
        self.contexts = PredictionContextCache::new();
    }
}

/// A decision cache shared by several recognizers. Each prediction holds the
/// lock for its whole duration.
#[derive(Debug, Clone)]
pub struct SharedDecisionCache {
    inner: Arc<Mutex<DecisionCache>>,
}

impl SharedDecisionCache {
    pub fn new(atn: &Atn) -> Self {
        Self {
            inner: Arc::new(Mutex::new(DecisionCache::new(atn))),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, DecisionCache> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}
