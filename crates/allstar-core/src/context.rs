use crate::atn::{Atn, StateNumber, Transition};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

/// Return state of the `$` slot: the outermost (empty) call stack.
pub const EMPTY_RETURN_STATE: usize = usize::MAX;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallContext {
    pub invoking_states: Vec<StateNumber>,
    pub precedence: i32,
}

impl CallContext {
    pub fn new(invoking_states: Vec<StateNumber>, precedence: i32) -> Self {
        Self {
            invoking_states,
            precedence,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.invoking_states.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.invoking_states.len()
    }
}

pub type MergeCache = HashMap<(Arc<PredictionContext>, Arc<PredictionContext>), Arc<PredictionContext>>;

#[derive(Debug)]
pub struct PredictionContext {
    node: Node,
    hash: u64,
}

#[derive(Debug, PartialEq, Eq)]
enum Node {
    Empty,
    Singleton {
        parent: Arc<PredictionContext>,
        return_state: usize,
    },
    Array {
        parents: Vec<Arc<PredictionContext>>,
        return_states: Vec<usize>,
    },
}

fn empty_context() -> &'static Arc<PredictionContext> {
    static EMPTY: OnceLock<Arc<PredictionContext>> = OnceLock::new();
    EMPTY.get_or_init(|| {
        Arc::new(PredictionContext {
            node: Node::Empty,
            hash: 1,
        })
    })
}

impl PredictionContext {
    pub fn empty() -> Arc<Self> {
        empty_context().clone()
    }

    pub fn singleton(parent: Arc<Self>, return_state: usize) -> Arc<Self> {
        if return_state == EMPTY_RETURN_STATE && parent.is_empty() {
            return Self::empty();
        }
        let mut hasher = DefaultHasher::new();
        1u8.hash(&mut hasher);
        parent.hash.hash(&mut hasher);
        return_state.hash(&mut hasher);
        Arc::new(Self {
            hash: hasher.finish(),
            node: Node::Singleton {
                parent,
                return_state,
            },
        })
    }

    fn array(parents: Vec<Arc<Self>>, return_states: Vec<usize>) -> Arc<Self> {
        assert!(
            return_states.len() >= 2 && parents.len() == return_states.len(),
            "array prediction context needs at least two aligned slots"
        );
        assert!(
            return_states.windows(2).all(|w| w[0] < w[1]),
            "array prediction context return states must be strictly increasing"
        );
        let mut hasher = DefaultHasher::new();
        2u8.hash(&mut hasher);
        for parent in &parents {
            parent.hash.hash(&mut hasher);
        }
        return_states.hash(&mut hasher);
        Arc::new(Self {
            hash: hasher.finish(),
            node: Node::Array {
                parents,
                return_states,
            },
        })
    }

    pub fn from_call_stack(atn: &Atn, call_context: &CallContext) -> Arc<Self> {
        let mut context = Self::empty();
        for &invoking_state in &call_context.invoking_states {
            let follow_state = match atn.state(invoking_state).transitions.first() {
                Some(Transition::Rule { follow_state, .. }) => *follow_state,
                _ => panic!("invoking state {invoking_state} does not start with a rule transition"),
            };
            context = Self::singleton(context, follow_state);
        }
        context
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.node, Node::Empty)
    }

    pub fn has_empty_path(&self) -> bool {
        self.return_state(self.len() - 1) == EMPTY_RETURN_STATE
    }

    pub fn len(&self) -> usize {
        match &self.node {
            Node::Empty | Node::Singleton { .. } => 1,
            Node::Array { return_states, .. } => return_states.len(),
        }
    }

    pub fn return_state(&self, index: usize) -> usize {
        match &self.node {
            Node::Empty => EMPTY_RETURN_STATE,
            Node::Singleton { return_state, .. } => *return_state,
            Node::Array { return_states, .. } => return_states[index],
        }
    }

    pub fn parent(&self, index: usize) -> Option<&Arc<Self>> {
        match &self.node {
            Node::Empty => None,
            Node::Singleton { parent, .. } => Some(parent),
            Node::Array { parents, .. } => Some(&parents[index]),
        }
    }

    pub fn depth(&self) -> usize {
        match &self.node {
            Node::Empty => 0,
            Node::Singleton { parent, .. } => 1 + parent.depth(),
            Node::Array {
                parents,
                return_states,
            } => parents
                .iter()
                .zip(return_states)
                .map(|(parent, &rs)| {
                    if rs == EMPTY_RETURN_STATE {
                        0
                    } else {
                        1 + parent.depth()
                    }
                })
                .max()
                .unwrap_or(0),
        }
    }

    fn slots(this: &Arc<Self>) -> (Vec<Arc<Self>>, Vec<usize>) {
        match &this.node {
            Node::Empty => (vec![this.clone()], vec![EMPTY_RETURN_STATE]),
            Node::Singleton {
                parent,
                return_state,
            } => (vec![parent.clone()], vec![*return_state]),
            Node::Array {
                parents,
                return_states,
            } => (parents.clone(), return_states.clone()),
        }
    }

    fn is_array(&self) -> bool {
        matches!(self.node, Node::Array { .. })
    }

    /// Merge two call-stack graphs. With `root_is_wildcard` (SLL) the empty
    /// stack absorbs any other stack; otherwise it is kept as a `$` slot.
    pub fn merge(
        a: &Arc<Self>,
        b: &Arc<Self>,
        root_is_wildcard: bool,
        cache: &mut MergeCache,
    ) -> Arc<Self> {
        if Arc::ptr_eq(a, b) || a == b {
            return a.clone();
        }
        if let Some(merged) = cache
            .get(&(a.clone(), b.clone()))
            .or_else(|| cache.get(&(b.clone(), a.clone())))
        {
            return merged.clone();
        }

        let merged = if !a.is_array() && !b.is_array() {
            Self::merge_singletons(a, b, root_is_wildcard, cache)
        } else if root_is_wildcard && a.is_empty() {
            a.clone()
        } else if root_is_wildcard && b.is_empty() {
            b.clone()
        } else {
            Self::merge_arrays(a, b, root_is_wildcard, cache)
        };
        cache.insert((a.clone(), b.clone()), merged.clone());
        merged
    }

    fn merge_root(a: &Arc<Self>, b: &Arc<Self>, root_is_wildcard: bool) -> Option<Arc<Self>> {
        if root_is_wildcard {
            if a.is_empty() || b.is_empty() {
                return Some(Self::empty());
            }
            return None;
        }
        match (a.is_empty(), b.is_empty()) {
            (true, true) => Some(Self::empty()),
            (true, false) => Some(Self::array(
                vec![b.parent(0)?.clone(), Self::empty()],
                vec![b.return_state(0), EMPTY_RETURN_STATE],
            )),
            (false, true) => Some(Self::array(
                vec![a.parent(0)?.clone(), Self::empty()],
                vec![a.return_state(0), EMPTY_RETURN_STATE],
            )),
            (false, false) => None,
        }
    }

    fn merge_singletons(
        a: &Arc<Self>,
        b: &Arc<Self>,
        root_is_wildcard: bool,
        cache: &mut MergeCache,
    ) -> Arc<Self> {
        if let Some(merged) = Self::merge_root(a, b, root_is_wildcard) {
            return merged;
        }
        let (Node::Singleton {
            parent: a_parent,
            return_state: a_rs,
        }, Node::Singleton {
            parent: b_parent,
            return_state: b_rs,
        }) = (&a.node, &b.node)
        else {
            unreachable!("root merge handles empty contexts");
        };

        if a_rs == b_rs {
            let parent = Self::merge(a_parent, b_parent, root_is_wildcard, cache);
            if Arc::ptr_eq(&parent, a_parent) || parent == *a_parent {
                return a.clone();
            }
            if Arc::ptr_eq(&parent, b_parent) || parent == *b_parent {
                return b.clone();
            }
            return Self::singleton(parent, *a_rs);
        }

        let (low, high) = if a_rs < b_rs { (a, b) } else { (b, a) };
        let (low_parent, high_parent) = if a_parent == b_parent {
            (a_parent.clone(), a_parent.clone())
        } else {
            (
                low.parent(0).cloned().unwrap_or_else(Self::empty),
                high.parent(0).cloned().unwrap_or_else(Self::empty),
            )
        };
        Self::array(
            vec![low_parent, high_parent],
            vec![low.return_state(0), high.return_state(0)],
        )
    }

    fn merge_arrays(
        a: &Arc<Self>,
        b: &Arc<Self>,
        root_is_wildcard: bool,
        cache: &mut MergeCache,
    ) -> Arc<Self> {
        let (a_parents, a_states) = Self::slots(a);
        let (b_parents, b_states) = Self::slots(b);
        let mut parents = Vec::with_capacity(a_states.len() + b_states.len());
        let mut return_states = Vec::with_capacity(a_states.len() + b_states.len());

        let (mut i, mut j) = (0, 0);
        while i < a_states.len() && j < b_states.len() {
            let a_parent = &a_parents[i];
            let b_parent = &b_parents[j];
            if a_states[i] == b_states[j] {
                let payload = a_states[i];
                let both_dollars = payload == EMPTY_RETURN_STATE;
                if both_dollars || a_parent == b_parent {
                    parents.push(a_parent.clone());
                } else {
                    parents.push(Self::merge(a_parent, b_parent, root_is_wildcard, cache));
                }
                return_states.push(payload);
                i += 1;
                j += 1;
            } else if a_states[i] < b_states[j] {
                parents.push(a_parent.clone());
                return_states.push(a_states[i]);
                i += 1;
            } else {
                parents.push(b_parent.clone());
                return_states.push(b_states[j]);
                j += 1;
            }
        }
        parents.extend(a_parents[i..].iter().cloned());
        return_states.extend_from_slice(&a_states[i..]);
        parents.extend(b_parents[j..].iter().cloned());
        return_states.extend_from_slice(&b_states[j..]);

        if return_states.len() == 1 {
            return Self::singleton(parents[0].clone(), return_states[0]);
        }

        // Equal parents share one allocation.
        let mut unique: HashMap<Arc<Self>, Arc<Self>> = HashMap::new();
        let parents = parents
            .into_iter()
            .map(|parent| unique.entry(parent.clone()).or_insert(parent).clone())
            .collect();

        let merged = Self::array(parents, return_states);
        if merged == *a {
            return a.clone();
        }
        if merged == *b {
            return b.clone();
        }
        merged
    }
}

impl PartialEq for PredictionContext {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other) || (self.hash == other.hash && self.node == other.node)
    }
}

impl Eq for PredictionContext {}

impl Hash for PredictionContext {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.hash.hash(state);
    }
}

impl Display for PredictionContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.node {
            Node::Empty => write!(f, "$"),
            Node::Singleton {
                parent,
                return_state,
            } => {
                if parent.is_empty() {
                    write!(f, "{return_state}")
                } else {
                    write!(f, "{return_state} {parent}")
                }
            }
            Node::Array {
                parents,
                return_states,
            } => {
                write!(f, "[")?;
                for (idx, (parent, rs)) in parents.iter().zip(return_states).enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    if *rs == EMPTY_RETURN_STATE {
                        write!(f, "$")?;
                    } else if parent.is_empty() {
                        write!(f, "{rs}")?;
                    } else {
                        write!(f, "{rs} {parent}")?;
                    }
                }
                write!(f, "]")
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PredictionContextCache {
    cache: HashMap<Arc<PredictionContext>, Arc<PredictionContext>>,
}

impl PredictionContextCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn add(&mut self, context: Arc<PredictionContext>) -> Arc<PredictionContext> {
        if context.is_empty() {
            return PredictionContext::empty();
        }
        self.cache.entry(context.clone()).or_insert(context).clone()
    }

    pub fn get(&self, context: &Arc<PredictionContext>) -> Option<Arc<PredictionContext>> {
        self.cache.get(context).cloned()
    }

    pub fn canonical(&mut self, context: &Arc<PredictionContext>) -> Arc<PredictionContext> {
        let mut visited = HashMap::new();
        self.canonical_in(context, &mut visited)
    }

    fn canonical_in(
        &mut self,
        context: &Arc<PredictionContext>,
        visited: &mut HashMap<Arc<PredictionContext>, Arc<PredictionContext>>,
    ) -> Arc<PredictionContext> {
        if context.is_empty() {
            return PredictionContext::empty();
        }
        if let Some(existing) = visited.get(context) {
            return existing.clone();
        }
        if let Some(existing) = self.get(context) {
            visited.insert(context.clone(), existing.clone());
            return existing;
        }

        let (parents, return_states) = PredictionContext::slots(context);
        let mut changed = false;
        let mut canonical_parents = Vec::with_capacity(parents.len());
        for parent in &parents {
            let canonical = self.canonical_in(parent, visited);
            if !Arc::ptr_eq(&canonical, parent) {
                changed = true;
            }
            canonical_parents.push(canonical);
        }

        if !changed {
            let added = self.add(context.clone());
            visited.insert(context.clone(), added.clone());
            return added;
        }

        let updated = if return_states.len() == 1 {
            PredictionContext::singleton(canonical_parents[0].clone(), return_states[0])
        } else {
            PredictionContext::array(canonical_parents, return_states)
        };
        let updated = self.add(updated);
        visited.insert(context.clone(), updated.clone());
        updated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack(states: &[usize]) -> Arc<PredictionContext> {
        states.iter().fold(PredictionContext::empty(), |ctx, &rs| {
            PredictionContext::singleton(ctx, rs)
        })
    }

    #[test]
    fn push_of_empty_return_state_on_empty_is_empty() {
        let ctx = PredictionContext::singleton(PredictionContext::empty(), EMPTY_RETURN_STATE);
        assert!(ctx.is_empty());
    }

    #[test]
    fn equal_stacks_are_equal_and_merge_to_left_input() {
        let a = stack(&[3, 7]);
        let b = stack(&[3, 7]);
        let mut cache = MergeCache::new();

        assert_eq!(a, b);
        let merged = PredictionContext::merge(&a, &b, false, &mut cache);
        assert!(Arc::ptr_eq(&merged, &a));
    }

    #[test]
    fn diverging_top_frames_share_parent() {
        let parent = stack(&[3]);
        let a = PredictionContext::singleton(parent.clone(), 9);
        let b = PredictionContext::singleton(parent.clone(), 5);
        let mut cache = MergeCache::new();

        let merged = PredictionContext::merge(&a, &b, false, &mut cache);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged.return_state(0), 5);
        assert_eq!(merged.return_state(1), 9);
        let p0 = merged.parent(0).expect("parent 0");
        let p1 = merged.parent(1).expect("parent 1");
        assert!(Arc::ptr_eq(p0, p1));
        assert!(Arc::ptr_eq(p0, &parent));
    }

    #[test]
    fn same_top_frame_merges_parents() {
        let a = stack(&[3, 9]);
        let b = stack(&[4, 9]);
        let mut cache = MergeCache::new();

        let merged = PredictionContext::merge(&a, &b, false, &mut cache);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged.return_state(0), 9);
        assert_eq!(merged.parent(0).expect("parent").len(), 2);
        assert_eq!(merged.to_string(), "9 [3, 4]");
    }

    #[test]
    fn root_merge_depends_on_wildcard_mode() {
        let a = stack(&[4]);
        let empty = PredictionContext::empty();
        let mut cache = MergeCache::new();

        let sll = PredictionContext::merge(&a, &empty, true, &mut cache);
        assert!(sll.is_empty());

        let mut cache = MergeCache::new();
        let ll = PredictionContext::merge(&a, &empty, false, &mut cache);
        assert_eq!(ll.len(), 2);
        assert_eq!(ll.return_state(0), 4);
        assert_eq!(ll.return_state(1), EMPTY_RETURN_STATE);
        assert!(ll.has_empty_path());
        assert_eq!(ll.to_string(), "[4, $]");
    }

    #[test]
    fn array_merge_collapses_duplicates() {
        let mut cache = MergeCache::new();
        let ab = PredictionContext::merge(&stack(&[1]), &stack(&[2]), false, &mut cache);
        let bc = PredictionContext::merge(&stack(&[2]), &stack(&[3]), false, &mut cache);

        let merged = PredictionContext::merge(&ab, &bc, false, &mut cache);
        assert_eq!(
            (0..merged.len()).map(|i| merged.return_state(i)).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );

        let again = PredictionContext::merge(&merged, &ab, false, &mut cache);
        assert!(Arc::ptr_eq(&again, &merged));
    }

    #[test]
    fn cache_canonicalizes_structurally_equal_graphs() {
        let mut cache = PredictionContextCache::new();
        let first = cache.canonical(&stack(&[3, 8, 11]));
        let second = cache.canonical(&stack(&[3, 8, 11]));

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.depth(), 3);
        assert_eq!(cache.len(), 3);
    }
}
