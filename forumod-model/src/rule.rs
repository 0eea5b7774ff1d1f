//! Per-user rule configuration (§3 `RuleConfig`) and the boolean-expression
//! DSL (§4.5, §9 "Boolean-expression DSL").
//!
//! This module only carries the *declarative* shape a rule is loaded from;
//! the registry that turns a `ConditionDescriptor`/`OperationDescriptor`
//! into a runnable check or action lives in `forumod-core` (C2).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ModelError, Result};

/// One condition attached to a rule, in declared (pre-sort) order.
///
/// `priority` defaults to 50; higher runs first under strict-AND
/// evaluation (§4.5). `valid` is computed at load time from `options` by
/// the registry (an unregistered `type` or a schema mismatch makes a
/// condition permanently invalid, never re-checked at runtime) and is
/// `None` until the registry has validated it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionDescriptor {
    #[serde(rename = "type")]
    pub type_tag: String,
    pub options: Value,
    #[serde(default = "default_priority")]
    pub priority: f32,
    /// An optional key distinguishing two conditions of the same `type`
    /// that target different attributes (e.g. two `limiter`s, one on
    /// `floor` and one on `user.level`). Forms `"{type}:{key}"` identity
    /// for context deduplication (§4.5).
    #[serde(default)]
    pub key: Option<String>,
}

fn default_priority() -> f32 {
    50.0
}

impl ConditionDescriptor {
    /// Identity used for deduplicating recorded context (§4.5): `"type"`
    /// or `"type:key"`.
    pub fn identity(&self) -> String {
        match &self.key {
            Some(key) => format!("{}:{key}", self.type_tag),
            None => self.type_tag.clone(),
        }
    }
}

/// One operation attached to a rule.
///
/// `direct` marks an operation that runs immediately even under
/// manual-confirm, before the rest of the group is enqueued (§4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationDescriptor {
    #[serde(rename = "type")]
    pub type_tag: String,
    #[serde(default)]
    pub options: Value,
    #[serde(default)]
    pub direct: bool,
}

/// The four shorthand operation tokens (§3), expanded by the registry
/// into the equivalent `OperationDescriptor` list at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationShorthand {
    Ignore,
    Delete,
    Block,
    DeleteAndBlock,
}

/// `operations` is either a shorthand token or an ordered descriptor list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OperationSpec {
    Shorthand(OperationShorthand),
    List(Vec<OperationDescriptor>),
}

/// A boolean-expression AST over condition indices (§4.5, §9). Parsed
/// once at load time; anything outside literals/`not`/`and`/`or` over
/// non-negative integers is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum LogicExpr {
    /// A leaf referencing `conditions[index]`.
    Condition { index: usize },
    Not { operand: Box<LogicExpr> },
    And { operands: Vec<LogicExpr> },
    Or { operands: Vec<LogicExpr> },
}

impl LogicExpr {
    /// Parses the textual form used in `RuleConfig.logic.expression`
    /// (e.g. `"(0 and 1) or 2"`) into an AST. Grammar: non-negative
    /// integer literals, unary `not`, binary `and`/`or` (left-
    /// associative, `and` binds tighter than `or`), and parentheses.
    pub fn parse(expr: &str) -> Result<Self> {
        let tokens = tokenize(expr)?;
        let mut pos = 0;
        let parsed = parse_or(&tokens, &mut pos)?;
        if pos != tokens.len() {
            return Err(ModelError::InvalidLogic(format!(
                "unexpected trailing input in {expr:?}"
            )));
        }
        Ok(parsed)
    }

    /// The set of leaf indices that are *necessary* for this expression
    /// to be true (§4.5 "priority group analysis"): `AND`'s necessary set
    /// is the union of its children's; `OR`'s is the intersection; a
    /// leaf's is itself.
    pub fn necessary_indices(&self) -> std::collections::BTreeSet<usize> {
        use std::collections::BTreeSet;
        match self {
            LogicExpr::Condition { index } => BTreeSet::from([*index]),
            LogicExpr::Not { operand } => operand.necessary_indices(),
            LogicExpr::And { operands } => operands
                .iter()
                .flat_map(|o| o.necessary_indices())
                .collect(),
            LogicExpr::Or { operands } => {
                let mut iter = operands.iter().map(|o| o.necessary_indices());
                let Some(first) = iter.next() else {
                    return BTreeSet::new();
                };
                iter.fold(first, |acc, set| acc.intersection(&set).copied().collect())
            }
        }
    }

    /// Evaluates the expression given a partial assignment of leaf
    /// results; an index missing from `known` is treated as `false`
    /// (§4.5 "early-true detection").
    pub fn eval_partial(&self, known: &BTreeMap<usize, bool>) -> bool {
        match self {
            LogicExpr::Condition { index } => known.get(index).copied().unwrap_or(false),
            LogicExpr::Not { operand } => !operand.eval_partial(known),
            LogicExpr::And { operands } => operands.iter().all(|o| o.eval_partial(known)),
            LogicExpr::Or { operands } => operands.iter().any(|o| o.eval_partial(known)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Int(usize),
    Not,
    And,
    Or,
    LParen,
    RParen,
}

fn tokenize(expr: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = expr.char_indices().peekable();
    while let Some((_, c)) = chars.peek().copied() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if c == '(' {
            tokens.push(Token::LParen);
            chars.next();
            continue;
        }
        if c == ')' {
            tokens.push(Token::RParen);
            chars.next();
            continue;
        }
        if c.is_ascii_digit() {
            let mut digits = String::new();
            while let Some((_, d)) = chars.peek().copied() {
                if d.is_ascii_digit() {
                    digits.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            let n = digits
                .parse::<usize>()
                .map_err(|_| ModelError::InvalidLogic(format!("bad integer {digits:?}")))?;
            tokens.push(Token::Int(n));
            continue;
        }
        if c.is_alphabetic() {
            let mut word = String::new();
            while let Some((_, w)) = chars.peek().copied() {
                if w.is_alphanumeric() || w == '_' {
                    word.push(w);
                    chars.next();
                } else {
                    break;
                }
            }
            match word.as_str() {
                "and" => tokens.push(Token::And),
                "or" => tokens.push(Token::Or),
                "not" => tokens.push(Token::Not),
                other => {
                    return Err(ModelError::InvalidLogic(format!(
                        "unknown identifier {other:?} in logic expression"
                    )));
                }
            }
            continue;
        }
        return Err(ModelError::InvalidLogic(format!(
            "unexpected character {c:?} in logic expression"
        )));
    }
    Ok(tokens)
}

fn parse_or(tokens: &[Token], pos: &mut usize) -> Result<LogicExpr> {
    let mut operands = vec![parse_and(tokens, pos)?];
    while matches!(tokens.get(*pos), Some(Token::Or)) {
        *pos += 1;
        operands.push(parse_and(tokens, pos)?);
    }
    Ok(if operands.len() == 1 {
        operands.pop().unwrap()
    } else {
        LogicExpr::Or { operands }
    })
}

fn parse_and(tokens: &[Token], pos: &mut usize) -> Result<LogicExpr> {
    let mut operands = vec![parse_unary(tokens, pos)?];
    while matches!(tokens.get(*pos), Some(Token::And)) {
        *pos += 1;
        operands.push(parse_unary(tokens, pos)?);
    }
    Ok(if operands.len() == 1 {
        operands.pop().unwrap()
    } else {
        LogicExpr::And { operands }
    })
}

fn parse_unary(tokens: &[Token], pos: &mut usize) -> Result<LogicExpr> {
    if matches!(tokens.get(*pos), Some(Token::Not)) {
        *pos += 1;
        let operand = parse_unary(tokens, pos)?;
        return Ok(LogicExpr::Not {
            operand: Box::new(operand),
        });
    }
    parse_atom(tokens, pos)
}

fn parse_atom(tokens: &[Token], pos: &mut usize) -> Result<LogicExpr> {
    match tokens.get(*pos) {
        Some(Token::Int(n)) => {
            *pos += 1;
            Ok(LogicExpr::Condition { index: *n })
        }
        Some(Token::LParen) => {
            *pos += 1;
            let inner = parse_or(tokens, pos)?;
            match tokens.get(*pos) {
                Some(Token::RParen) => {
                    *pos += 1;
                    Ok(inner)
                }
                _ => Err(ModelError::InvalidLogic("unmatched '('".into())),
            }
        }
        other => Err(ModelError::InvalidLogic(format!(
            "expected integer or '(' but found {other:?}"
        ))),
    }
}

/// The top-level `logic` block on a `RuleConfig`: the raw expression plus
/// its parsed form, kept together since the registry needs the original
/// text for round-tripping back to the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogicSpec {
    pub expression: String,
    #[serde(skip)]
    parsed: Option<LogicExpr>,
}

impl LogicSpec {
    pub fn new(expression: impl Into<String>) -> Result<Self> {
        let expression = expression.into();
        let parsed = LogicExpr::parse(&expression)?;
        Ok(Self {
            expression,
            parsed: Some(parsed),
        })
    }

    /// Re-parses `expression` if it hasn't been parsed yet (e.g. right
    /// after deserialization, where `#[serde(skip)]` leaves `parsed`
    /// empty).
    pub fn ast(&mut self) -> Result<&LogicExpr> {
        if self.parsed.is_none() {
            self.parsed = Some(LogicExpr::parse(&self.expression)?);
        }
        Ok(self.parsed.as_ref().unwrap())
    }
}

impl PartialEq for LogicSpec {
    fn eq(&self, other: &Self) -> bool {
        self.expression == other.expression
    }
}
impl Eq for LogicSpec {}

/// A user-owned rule (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    pub name: String,
    #[serde(default)]
    pub manual_confirm: bool,
    pub operations: OperationSpec,
    #[serde(default)]
    pub conditions: Vec<ConditionDescriptor>,
    pub last_modify: i64,
    #[serde(default)]
    pub whitelist: bool,
    #[serde(default)]
    pub force_record_context: bool,
    #[serde(default)]
    pub logic: Option<LogicSpec>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn parses_simple_or() {
        let expr = LogicExpr::parse("(0 and 1) or 2").unwrap();
        assert_eq!(
            expr,
            LogicExpr::Or {
                operands: vec![
                    LogicExpr::And {
                        operands: vec![
                            LogicExpr::Condition { index: 0 },
                            LogicExpr::Condition { index: 1 },
                        ]
                    },
                    LogicExpr::Condition { index: 2 },
                ]
            }
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!(LogicExpr::parse("0 xor 1").is_err());
        assert!(LogicExpr::parse("(0 and 1").is_err());
    }

    #[test]
    fn necessary_indices_for_or_is_intersection() {
        let expr = LogicExpr::parse("(0 and 1) or 2").unwrap();
        // Neither branch of the OR is individually necessary.
        assert!(expr.necessary_indices().is_empty());

        let expr = LogicExpr::parse("0 and 1").unwrap();
        assert_eq!(
            expr.necessary_indices(),
            std::collections::BTreeSet::from([0, 1])
        );
    }

    #[test]
    fn early_true_detection() {
        let expr = LogicExpr::parse("(0 and 1) or 2").unwrap();
        let mut known = BTreeMap::new();
        known.insert(2, true);
        assert!(expr.eval_partial(&known));
    }
}
