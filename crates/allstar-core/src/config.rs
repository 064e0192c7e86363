use crate::atn::{StateNumber, INVALID_ALT};
use crate::context::{MergeCache, PredictionContext, PredictionContextCache};
use crate::semantic::SemanticContext;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct AltSet(BTreeSet<usize>);

impl AltSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of(alt: usize) -> Self {
        Self(BTreeSet::from([alt]))
    }

    pub fn insert(&mut self, alt: usize) -> bool {
        self.0.insert(alt)
    }

    pub fn contains(&self, alt: usize) -> bool {
        self.0.contains(&alt)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn min(&self) -> Option<usize> {
        self.0.first().copied()
    }

    pub fn max(&self) -> Option<usize> {
        self.0.last().copied()
    }

    pub fn single(&self) -> Option<usize> {
        if self.0.len() == 1 {
            self.min()
        } else {
            None
        }
    }

    pub fn union_with(&mut self, other: &AltSet) {
        self.0.extend(other.0.iter().copied());
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<usize> for AltSet {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Display for AltSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (idx, alt) in self.0.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{alt}")?;
        }
        write!(f, "}}")
    }
}

#[derive(Debug, Clone)]
pub struct AtnConfig {
    pub state: StateNumber,
    pub alt: usize,
    pub context: Arc<PredictionContext>,
    pub semantic: SemanticContext,
    /// Number of times the closure returned past the decision rule.
    pub reaches_into_outer_context: usize,
    pub precedence_filter_suppressed: bool,
}

impl AtnConfig {
    pub fn new(state: StateNumber, alt: usize, context: Arc<PredictionContext>) -> Self {
        Self {
            state,
            alt,
            context,
            semantic: SemanticContext::None,
            reaches_into_outer_context: 0,
            precedence_filter_suppressed: false,
        }
    }

    pub fn moved_to(&self, state: StateNumber) -> Self {
        Self {
            state,
            ..self.clone()
        }
    }

    pub fn with_context(&self, state: StateNumber, context: Arc<PredictionContext>) -> Self {
        Self {
            state,
            context,
            ..self.clone()
        }
    }

    pub fn with_semantic(&self, state: StateNumber, semantic: SemanticContext) -> Self {
        Self {
            state,
            semantic,
            ..self.clone()
        }
    }
}

impl PartialEq for AtnConfig {
    fn eq(&self, other: &Self) -> bool {
        self.state == other.state
            && self.alt == other.alt
            && self.precedence_filter_suppressed == other.precedence_filter_suppressed
            && self.semantic == other.semantic
            && self.context == other.context
    }
}

impl Eq for AtnConfig {}

impl Hash for AtnConfig {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.state.hash(state);
        self.alt.hash(state);
        self.context.hash(state);
        self.semantic.hash(state);
    }
}

impl Display for AtnConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "({},{},[{}]", self.state, self.alt, self.context)?;
        if !self.semantic.is_none() {
            write!(f, ",{}", self.semantic)?;
        }
        if self.reaches_into_outer_context > 0 {
            write!(f, ",up={}", self.reaches_into_outer_context)?;
        }
        write!(f, ")")
    }
}

type ConfigKey = (StateNumber, usize, SemanticContext);

#[derive(Debug, Clone, Default)]
pub struct AtnConfigSet {
    configs: Vec<AtnConfig>,
    lookup: HashMap<ConfigKey, usize>,
    pub full_ctx: bool,
    /// The single alternative of every config, or `INVALID_ALT`.
    pub unique_alt: usize,
    pub conflicting_alts: Option<AltSet>,
    pub has_semantic_context: bool,
    pub dips_into_outer_context: bool,
}

impl AtnConfigSet {
    pub fn new(full_ctx: bool) -> Self {
        Self {
            full_ctx,
            ..Self::default()
        }
    }

    pub fn add(&mut self, config: AtnConfig) -> bool {
        let mut cache = MergeCache::new();
        self.add_with_cache(config, &mut cache)
    }

    pub fn add_with_cache(&mut self, config: AtnConfig, cache: &mut MergeCache) -> bool {
        if !config.semantic.is_none() {
            self.has_semantic_context = true;
        }
        if config.reaches_into_outer_context > 0 {
            self.dips_into_outer_context = true;
        }
        let key = (config.state, config.alt, config.semantic.clone());
        let Some(&idx) = self.lookup.get(&key) else {
            self.lookup.insert(key, self.configs.len());
            self.configs.push(config);
            return true;
        };

        let root_is_wildcard = !self.full_ctx;
        let existing = &mut self.configs[idx];
        let merged = PredictionContext::merge(
            &existing.context,
            &config.context,
            root_is_wildcard,
            cache,
        );
        let changed = merged != existing.context
            || config.reaches_into_outer_context > existing.reaches_into_outer_context
            || (config.precedence_filter_suppressed && !existing.precedence_filter_suppressed);
        existing.reaches_into_outer_context = existing
            .reaches_into_outer_context
            .max(config.reaches_into_outer_context);
        if config.precedence_filter_suppressed {
            existing.precedence_filter_suppressed = true;
        }
        existing.context = merged;
        changed
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AtnConfig> {
        self.configs.iter()
    }

    pub fn configs(&self) -> &[AtnConfig] {
        &self.configs
    }

    pub fn alts(&self) -> AltSet {
        self.configs.iter().map(|config| config.alt).collect()
    }

    pub fn states(&self) -> BTreeSet<StateNumber> {
        self.configs.iter().map(|config| config.state).collect()
    }

    pub fn optimize_configs(&mut self, cache: &mut PredictionContextCache) {
        for config in &mut self.configs {
            config.context = cache.canonical(&config.context);
        }
    }
}

impl PartialEq for AtnConfigSet {
    fn eq(&self, other: &Self) -> bool {
        self.full_ctx == other.full_ctx
            && self.unique_alt == other.unique_alt
            && self.conflicting_alts == other.conflicting_alts
            && self.has_semantic_context == other.has_semantic_context
            && self.dips_into_outer_context == other.dips_into_outer_context
            && self.configs == other.configs
    }
}

impl Eq for AtnConfigSet {}

impl Hash for AtnConfigSet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.full_ctx.hash(state);
        self.configs.hash(state);
    }
}

impl<'a> IntoIterator for &'a AtnConfigSet {
    type Item = &'a AtnConfig;
    type IntoIter = std::slice::Iter<'a, AtnConfig>;

    fn into_iter(self) -> Self::IntoIter {
        self.configs.iter()
    }
}

impl Display for AtnConfigSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[")?;
        for (idx, config) in self.configs.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{config}")?;
        }
        write!(f, "]")?;
        if self.has_semantic_context {
            write!(f, ",hasSemanticContext")?;
        }
        if self.unique_alt != INVALID_ALT {
            write!(f, ",uniqueAlt={}", self.unique_alt)?;
        }
        if let Some(alts) = &self.conflicting_alts {
            write!(f, ",conflictingAlts={alts}")?;
        }
        if self.dips_into_outer_context {
            write!(f, ",dipsIntoOuterContext")?;
        }
        Ok(())
    }
}
