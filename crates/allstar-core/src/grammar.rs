use crate::atn::{Atn, EOF};
use crate::atn_builder::{AtnBuilder, Element};
use crate::error::{AtnError, AtnErrorKind};
use crate::symbol_set::SymbolSet;
use serde::Deserialize;
use std::collections::HashMap;

/// Serialized rule/alternative skeleton of an already analysed grammar.
/// Left-recursive rules are expected in their rewritten loop form, with
/// `precpred` guards and precedence arguments on the recursive calls.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GrammarSpec {
    pub tokens: Vec<String>,
    pub rules: Vec<RuleSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleSpec {
    pub name: String,
    #[serde(default)]
    pub left_recursive: bool,
    pub alts: Vec<Vec<ElementSpec>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementSpec {
    Token(String),
    Range { from: String, to: String },
    Set(Vec<String>),
    NotSet(Vec<String>),
    Wildcard,
    Rule(String),
    Call { rule: String, precedence: i32 },
    Pred(PredSpec),
    Precpred(i32),
    Action(usize),
    Block(Vec<Vec<ElementSpec>>),
    Optional(Vec<Vec<ElementSpec>>),
    Star(Vec<Vec<ElementSpec>>),
    Plus(Vec<Vec<ElementSpec>>),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PredSpec {
    pub index: usize,
    #[serde(default)]
    pub ctx_dependent: bool,
}

impl GrammarSpec {
    pub fn compile(&self) -> Result<Atn, AtnError> {
        let mut builder = AtnBuilder::new(self.tokens.clone());
        let mut rules = HashMap::new();
        for rule in &self.rules {
            if rules.contains_key(rule.name.as_str()) {
                return Err(AtnError::new(
                    AtnErrorKind::DuplicateRule,
                    format!("rule '{}' is defined twice", rule.name),
                ));
            }
            let rule_index = builder.declare_rule(rule.name.clone());
            builder.set_left_recursive(rule_index, rule.left_recursive);
            rules.insert(rule.name.as_str(), rule_index);
        }

        let resolver = Resolver {
            tokens: self
                .tokens
                .iter()
                .enumerate()
                .map(|(idx, name)| (name.as_str(), idx as i32 + 1))
                .collect(),
            rules,
        };
        for (rule_index, rule) in self.rules.iter().enumerate() {
            let alts = resolver.alts(&rule.alts)?;
            builder.define_rule(rule_index, &alts)?;
        }
        let atn = builder.build()?;
        log::debug!(
            "compiled {} rules into {} states and {} decisions",
            self.rules.len(),
            atn.states().len(),
            atn.number_of_decisions()
        );
        Ok(atn)
    }
}

struct Resolver<'a> {
    tokens: HashMap<&'a str, i32>,
    rules: HashMap<&'a str, usize>,
}

impl Resolver<'_> {
    fn alts(&self, alts: &[Vec<ElementSpec>]) -> Result<Vec<Vec<Element>>, AtnError> {
        alts.iter()
            .map(|alt| alt.iter().map(|element| self.element(element)).collect())
            .collect()
    }

    fn token(&self, name: &str) -> Result<i32, AtnError> {
        if name == "EOF" {
            return Ok(EOF);
        }
        self.tokens.get(name).copied().ok_or_else(|| {
            AtnError::new(AtnErrorKind::UnknownToken, format!("unknown token '{name}'"))
        })
    }

    fn rule(&self, name: &str) -> Result<usize, AtnError> {
        self.rules.get(name).copied().ok_or_else(|| {
            AtnError::new(AtnErrorKind::UnknownRule, format!("unknown rule '{name}'"))
        })
    }

    fn set(&self, names: &[String]) -> Result<SymbolSet, AtnError> {
        let mut set = SymbolSet::new();
        for name in names {
            set.add(self.token(name)?);
        }
        Ok(set)
    }

    fn element(&self, element: &ElementSpec) -> Result<Element, AtnError> {
        Ok(match element {
            ElementSpec::Token(name) => Element::Token(self.token(name)?),
            ElementSpec::Range { from, to } => {
                let (from, to) = (self.token(from)?, self.token(to)?);
                if from > to {
                    return Err(AtnError::new(
                        AtnErrorKind::InvalidElement,
                        format!("empty token range {from}..{to}"),
                    ));
                }
                Element::Range(from, to)
            }
            ElementSpec::Set(names) => Element::Set(self.set(names)?),
            ElementSpec::NotSet(names) => Element::NotSet(self.set(names)?),
            ElementSpec::Wildcard => Element::Wildcard,
            ElementSpec::Rule(name) => Element::Rule {
                rule_index: self.rule(name)?,
                precedence: 0,
            },
            ElementSpec::Call { rule, precedence } => Element::Rule {
                rule_index: self.rule(rule)?,
                precedence: *precedence,
            },
            ElementSpec::Pred(pred) => Element::Predicate {
                pred_index: pred.index,
                ctx_dependent: pred.ctx_dependent,
            },
            ElementSpec::Precpred(precedence) => Element::Precedence(*precedence),
            ElementSpec::Action(index) => Element::Action(*index),
            ElementSpec::Block(alts) => Element::Block(self.alts(alts)?),
            ElementSpec::Optional(alts) => Element::Optional(self.alts(alts)?),
            ElementSpec::Star(alts) => Element::Star(self.alts(alts)?),
            ElementSpec::Plus(alts) => Element::Plus(self.alts(alts)?),
        })
    }
}
