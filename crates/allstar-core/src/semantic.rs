use crate::context::CallContext;
use crate::error::PredicateError;
use std::collections::{BTreeSet, HashMap};
use std::fmt::{Display, Formatter};
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SemanticContext {
    #[default]
    None,
    Predicate {
        rule_index: usize,
        pred_index: usize,
        ctx_dependent: bool,
    },
    Precedence(i32),
    And(Arc<[SemanticContext]>),
    Or(Arc<[SemanticContext]>),
}

pub trait SemanticEvaluator {
    fn sempred(
        &mut self,
        call_context: &CallContext,
        rule_index: usize,
        pred_index: usize,
    ) -> Result<bool, PredicateError>;

    fn precpred(&mut self, call_context: &CallContext, precedence: i32) -> Result<bool, PredicateError> {
        Ok(precedence >= call_context.precedence)
    }
}

impl SemanticContext {
    pub fn is_none(&self) -> bool {
        matches!(self, SemanticContext::None)
    }

    pub fn and(a: &SemanticContext, b: &SemanticContext) -> SemanticContext {
        if a.is_none() {
            return b.clone();
        }
        if b.is_none() {
            return a.clone();
        }
        let mut operands = BTreeSet::new();
        for ctx in [a, b] {
            match ctx {
                SemanticContext::And(inner) => operands.extend(inner.iter().cloned()),
                other => {
                    operands.insert(other.clone());
                }
            }
        }
        // Conjoined precedence predicates reduce to the weakest one.
        reduce_precedence(&mut operands, |levels| levels.iter().min().copied());
        Self::combine(operands, SemanticContext::And)
    }

    pub fn or(a: &SemanticContext, b: &SemanticContext) -> SemanticContext {
        if a.is_none() || b.is_none() {
            return SemanticContext::None;
        }
        let mut operands = BTreeSet::new();
        for ctx in [a, b] {
            match ctx {
                SemanticContext::Or(inner) => operands.extend(inner.iter().cloned()),
                other => {
                    operands.insert(other.clone());
                }
            }
        }
        reduce_precedence(&mut operands, |levels| levels.iter().max().copied());
        Self::combine(operands, SemanticContext::Or)
    }

    fn combine(
        operands: BTreeSet<SemanticContext>,
        wrap: fn(Arc<[SemanticContext]>) -> SemanticContext,
    ) -> SemanticContext {
        if operands.len() == 1 {
            return operands.into_iter().next().unwrap_or_default();
        }
        wrap(operands.into_iter().collect::<Vec<_>>().into())
    }

    pub fn evaluate(&self, evaluator: &mut dyn SemanticEvaluator, call_context: &CallContext) -> bool {
        match self {
            SemanticContext::None => true,
            SemanticContext::Predicate {
                rule_index,
                pred_index,
                ..
            } => match evaluator.sempred(call_context, *rule_index, *pred_index) {
                Ok(value) => value,
                Err(err) => {
                    log::debug!("{err}; treating as false");
                    false
                }
            },
            SemanticContext::Precedence(precedence) => {
                match evaluator.precpred(call_context, *precedence) {
                    Ok(value) => value,
                    Err(err) => {
                        log::debug!("{err}; treating as false");
                        false
                    }
                }
            }
            SemanticContext::And(operands) => operands
                .iter()
                .all(|operand| operand.evaluate(evaluator, call_context)),
            SemanticContext::Or(operands) => operands
                .iter()
                .any(|operand| operand.evaluate(evaluator, call_context)),
        }
    }

    /// Resolve the precedence predicates of the guard against the call
    /// context. `None` means the guard can never hold; other predicates are
    /// left in place.
    pub fn eval_precedence(
        &self,
        evaluator: &mut dyn SemanticEvaluator,
        call_context: &CallContext,
    ) -> Option<SemanticContext> {
        match self {
            SemanticContext::None | SemanticContext::Predicate { .. } => Some(self.clone()),
            SemanticContext::Precedence(precedence) => {
                match evaluator.precpred(call_context, *precedence) {
                    Ok(true) => Some(SemanticContext::None),
                    Ok(false) => None,
                    Err(err) => {
                        log::debug!("{err}; treating as false");
                        None
                    }
                }
            }
            SemanticContext::And(operands) => {
                let mut result = SemanticContext::None;
                for operand in operands.iter() {
                    let evaluated = operand.eval_precedence(evaluator, call_context)?;
                    result = SemanticContext::and(&result, &evaluated);
                }
                Some(result)
            }
            SemanticContext::Or(operands) => {
                let mut remaining = Vec::new();
                for operand in operands.iter() {
                    match operand.eval_precedence(evaluator, call_context) {
                        Some(SemanticContext::None) => return Some(SemanticContext::None),
                        Some(evaluated) => remaining.push(evaluated),
                        None => {}
                    }
                }
                let mut iter = remaining.into_iter();
                let first = iter.next()?;
                Some(iter.fold(first, |acc, operand| SemanticContext::or(&acc, &operand)))
            }
        }
    }
}

fn reduce_precedence(
    operands: &mut BTreeSet<SemanticContext>,
    pick: impl Fn(&[i32]) -> Option<i32>,
) {
    let levels = operands
        .iter()
        .filter_map(|operand| match operand {
            SemanticContext::Precedence(level) => Some(*level),
            _ => None,
        })
        .collect::<Vec<_>>();
    if levels.len() < 2 {
        return;
    }
    operands.retain(|operand| !matches!(operand, SemanticContext::Precedence(_)));
    if let Some(level) = pick(&levels) {
        operands.insert(SemanticContext::Precedence(level));
    }
}

impl Display for SemanticContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SemanticContext::None => write!(f, "true"),
            SemanticContext::Predicate {
                rule_index,
                pred_index,
                ..
            } => write!(f, "{{{rule_index}:{pred_index}}}?"),
            SemanticContext::Precedence(precedence) => write!(f, "{{{precedence}>=prec}}?"),
            SemanticContext::And(operands) | SemanticContext::Or(operands) => {
                let sep = if matches!(self, SemanticContext::And(_)) {
                    " && "
                } else {
                    " || "
                };
                for (idx, operand) in operands.iter().enumerate() {
                    if idx > 0 {
                        write!(f, "{sep}")?;
                    }
                    write!(f, "{operand}")?;
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PredicateTable {
    values: HashMap<(usize, usize), bool>,
    default: Option<bool>,
}

impl PredicateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Outcome for predicates missing from the table. Without a default a
    /// missing predicate is an evaluation error.
    pub fn with_default(mut self, value: bool) -> Self {
        self.default = Some(value);
        self
    }

    pub fn set(&mut self, rule_index: usize, pred_index: usize, value: bool) {
        self.values.insert((rule_index, pred_index), value);
    }

    pub fn get(&self, rule_index: usize, pred_index: usize) -> Option<bool> {
        self.values
            .get(&(rule_index, pred_index))
            .copied()
            .or(self.default)
    }
}

impl SemanticEvaluator for PredicateTable {
    fn sempred(
        &mut self,
        _call_context: &CallContext,
        rule_index: usize,
        pred_index: usize,
    ) -> Result<bool, PredicateError> {
        self.get(rule_index, pred_index).ok_or_else(|| PredicateError {
            rule_index,
            pred_index,
            message: "no value registered".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pred(rule_index: usize, pred_index: usize) -> SemanticContext {
        SemanticContext::Predicate {
            rule_index,
            pred_index,
            ctx_dependent: false,
        }
    }

    #[test]
    fn and_flattens_and_skips_none() {
        let ab = SemanticContext::and(&pred(0, 0), &pred(0, 1));
        let abc = SemanticContext::and(&ab, &pred(1, 0));
        let same = SemanticContext::and(&SemanticContext::None, &abc);

        assert_eq!(same, abc);
        match &abc {
            SemanticContext::And(operands) => assert_eq!(operands.len(), 3),
            other => panic!("expected conjunction, got {other}"),
        }
    }

    #[test]
    fn or_with_none_is_none() {
        let ctx = SemanticContext::or(&pred(0, 0), &SemanticContext::None);
        assert!(ctx.is_none());
    }

    #[test]
    fn precedence_operands_reduce() {
        let and = SemanticContext::and(&SemanticContext::Precedence(3), &SemanticContext::Precedence(1));
        assert_eq!(and, SemanticContext::Precedence(1));

        let or = SemanticContext::or(&SemanticContext::Precedence(3), &SemanticContext::Precedence(1));
        assert_eq!(or, SemanticContext::Precedence(3));
    }

    #[test]
    fn missing_predicate_evaluates_false() {
        let mut table = PredicateTable::new();
        table.set(0, 0, true);
        let ctx = CallContext::empty();

        assert!(pred(0, 0).evaluate(&mut table, &ctx));
        assert!(!pred(0, 1).evaluate(&mut table, &ctx));

        let mut permissive = PredicateTable::new().with_default(true);
        assert!(pred(0, 1).evaluate(&mut permissive, &ctx));
    }

    #[test]
    fn eval_precedence_drops_satisfied_levels() {
        let mut table = PredicateTable::new();
        let ctx = CallContext::new(Vec::new(), 2);
        let guard = SemanticContext::and(&SemanticContext::Precedence(3), &pred(0, 0));

        assert_eq!(guard.eval_precedence(&mut table, &ctx), Some(pred(0, 0)));
        assert_eq!(
            SemanticContext::Precedence(1).eval_precedence(&mut table, &ctx),
            None
        );
    }
}
