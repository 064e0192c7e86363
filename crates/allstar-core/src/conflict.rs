use crate::atn::{Atn, StateNumber, INVALID_ALT};
use crate::config::{AltSet, AtnConfigSet};
use crate::context::PredictionContext;
use crate::semantic::SemanticContext;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PredictionMode {
    /// Never escalate; conflicts resolve to the minimum alternative.
    Sll,
    #[default]
    Ll,
    LlExactAmbigDetection,
}

impl Display for PredictionMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PredictionMode::Sll => "sll",
            PredictionMode::Ll => "ll",
            PredictionMode::LlExactAmbigDetection => "ll-exact",
        };
        write!(f, "{name}")
    }
}

impl FromStr for PredictionMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "sll" => Ok(PredictionMode::Sll),
            "ll" => Ok(PredictionMode::Ll),
            "ll-exact" => Ok(PredictionMode::LlExactAmbigDetection),
            other => Err(format!("unknown prediction mode '{other}'")),
        }
    }
}

pub fn unique_alt(configs: &AtnConfigSet) -> usize {
    configs.alts().single().unwrap_or(INVALID_ALT)
}

pub fn conflicting_alt_subsets(configs: &AtnConfigSet) -> Vec<AltSet> {
    let mut order = Vec::new();
    let mut subsets: HashMap<(StateNumber, &Arc<PredictionContext>), usize> = HashMap::new();
    for config in configs {
        let idx = *subsets.entry((config.state, &config.context)).or_insert_with(|| {
            order.push(AltSet::new());
            order.len() - 1
        });
        order[idx].insert(config.alt);
    }
    order
}

pub fn state_to_alt_map(configs: &AtnConfigSet) -> BTreeMap<StateNumber, AltSet> {
    let mut map: BTreeMap<StateNumber, AltSet> = BTreeMap::new();
    for config in configs {
        map.entry(config.state).or_default().insert(config.alt);
    }
    map
}

pub fn has_state_associated_with_one_alt(configs: &AtnConfigSet) -> bool {
    state_to_alt_map(configs).values().any(|alts| alts.len() == 1)
}

pub fn has_conflicting_alt_set(subsets: &[AltSet]) -> bool {
    subsets.iter().any(|alts| alts.len() > 1)
}

pub fn has_non_conflicting_alt_set(subsets: &[AltSet]) -> bool {
    subsets.iter().any(|alts| alts.len() == 1)
}

pub fn all_subsets_conflict(subsets: &[AltSet]) -> bool {
    !has_non_conflicting_alt_set(subsets)
}

pub fn all_subsets_equal(subsets: &[AltSet]) -> bool {
    match subsets.split_first() {
        Some((first, rest)) => rest.iter().all(|alts| alts == first),
        None => true,
    }
}

pub fn union_of(subsets: &[AltSet]) -> AltSet {
    let mut all = AltSet::new();
    for alts in subsets {
        all.union_with(alts);
    }
    all
}

/// The alternative every subset resolves to by minimum, or `INVALID_ALT` if
/// the minima differ.
pub fn single_viable_alt(subsets: &[AltSet]) -> usize {
    let viable = subsets
        .iter()
        .filter_map(AltSet::min)
        .collect::<AltSet>();
    viable.single().unwrap_or(INVALID_ALT)
}

pub fn resolves_to_just_one_viable_alt(subsets: &[AltSet]) -> usize {
    single_viable_alt(subsets)
}

pub fn all_configs_in_rule_stop_states(atn: &Atn, configs: &AtnConfigSet) -> bool {
    configs
        .iter()
        .all(|config| atn.state(config.state).is_rule_stop())
}

pub fn has_config_in_rule_stop_state(atn: &Atn, configs: &AtnConfigSet) -> bool {
    configs
        .iter()
        .any(|config| atn.state(config.state).is_rule_stop())
}

/// True when SLL simulation can stop: every config finished its rule, or
/// some subset conflicts and no state is tied to a single alternative.
pub fn has_sll_conflict_terminating_prediction(
    atn: &Atn,
    mode: PredictionMode,
    configs: &AtnConfigSet,
) -> bool {
    if all_configs_in_rule_stop_states(atn, configs) {
        return true;
    }
    // Pure SLL ignores guards when looking for conflicts.
    let stripped;
    let configs = if mode == PredictionMode::Sll && configs.has_semantic_context {
        let mut dup = AtnConfigSet::new(configs.full_ctx);
        for config in configs {
            dup.add(config.with_semantic(config.state, SemanticContext::None));
        }
        stripped = dup;
        &stripped
    } else {
        configs
    };
    has_conflicting_alt_set(&conflicting_alt_subsets(configs))
        && !has_state_associated_with_one_alt(configs)
}

pub fn conflicting_alts(configs: &AtnConfigSet) -> AltSet {
    union_of(&conflicting_alt_subsets(configs))
}

pub fn conflicting_alts_or_unique_alt(configs: &AtnConfigSet) -> AltSet {
    if configs.unique_alt != INVALID_ALT {
        return AltSet::of(configs.unique_alt);
    }
    configs
        .conflicting_alts
        .clone()
        .unwrap_or_else(|| conflicting_alts(configs))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alts(values: &[usize]) -> AltSet {
        values.iter().copied().collect()
    }

    #[test]
    fn single_viable_alt_requires_equal_minima() {
        assert_eq!(single_viable_alt(&[alts(&[1, 2]), alts(&[1, 3])]), 1);
        assert_eq!(single_viable_alt(&[alts(&[1, 2]), alts(&[2, 3])]), INVALID_ALT);
    }

    #[test]
    fn subset_predicates() {
        let subsets = [alts(&[1, 2]), alts(&[1, 2])];
        assert!(all_subsets_conflict(&subsets));
        assert!(all_subsets_equal(&subsets));

        let mixed = [alts(&[1, 2]), alts(&[3])];
        assert!(has_conflicting_alt_set(&mixed));
        assert!(!all_subsets_conflict(&mixed));
        assert_eq!(union_of(&mixed), alts(&[1, 2, 3]));
    }

    #[test]
    fn mode_names_round_trip_through_display() {
        for mode in [
            PredictionMode::Sll,
            PredictionMode::Ll,
            PredictionMode::LlExactAmbigDetection,
        ] {
            assert_eq!(mode.to_string().parse::<PredictionMode>(), Ok(mode));
        }
        assert!("lr".parse::<PredictionMode>().is_err());
    }
}
