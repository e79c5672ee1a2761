//! Typed syntax tree for parsed rules.

use serde::{Deserialize, Serialize};
use voxel_ca_core::Offset;

/// One parsed rule: when `condition` holds, apply `effects` in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub condition: Condition,
    pub effects: Vec<Effect>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Condition {
    And(Vec<Condition>),
    Not(Box<Condition>),
    Equal(Expression, Expression),
}

impl Condition {
    /// Conjunction of `conditions`; `None` when empty, the lone element when single.
    pub fn all(mut conditions: Vec<Condition>) -> Option<Condition> {
        match conditions.len() {
            0 => None,
            1 => conditions.pop(),
            _ => Some(Condition::And(conditions)),
        }
    }

    pub fn equal(left: Expression, right: Expression) -> Self {
        Condition::Equal(left, right)
    }

    pub fn not_equal(left: Expression, right: Expression) -> Self {
        Condition::Equal(left, right).negate()
    }

    /// The cell's primitive equals `block`.
    pub fn block(block: i64) -> Self {
        Condition::Equal(Expression::Index(0), Expression::Literal(block))
    }

    pub fn negate(self) -> Self {
        Condition::Not(Box::new(self))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl Operator {
    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Add => "+",
            Operator::Sub => "-",
            Operator::Mul => "*",
            Operator::Div => "/",
            Operator::Mod => "%",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Expression {
    Literal(i64),
    /// Channel of the evaluated cell.
    Index(usize),
    /// Channel of a neighbor.
    NeighborIndex(Offset, usize),
    /// Number of `offsets` whose cell satisfies the condition.
    NeighborsCount(Vec<Offset>, Box<Condition>),
    /// Sign of `left - right`: -1, 0 or 1.
    Compare(Box<Expression>, Box<Expression>),
    Operation(Box<Expression>, Box<Expression>, Operator),
}

impl Expression {
    pub fn compare(left: Expression, right: Expression) -> Self {
        Expression::Compare(Box::new(left), Box::new(right))
    }

    pub fn operation(left: Expression, right: Expression, op: Operator) -> Self {
        Expression::Operation(Box::new(left), Box::new(right), op)
    }

    pub fn count(offsets: Vec<Offset>, condition: Condition) -> Self {
        Expression::NeighborsCount(offsets, Box::new(condition))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    SetIndex(usize, Expression),
    /// Copy every channel of the neighbor at the offset.
    BlockCopy(Offset),
    TriggerEvent(String, Option<Expression>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_condition_all() {
        assert_eq!(Condition::all(vec![]), None);
        assert_eq!(Condition::all(vec![Condition::block(1)]), Some(Condition::block(1)));
        assert!(matches!(
            Condition::all(vec![Condition::block(1), Condition::block(2)]),
            Some(Condition::And(list)) if list.len() == 2
        ));
    }

    #[test]
    fn test_rule_serializes() {
        let rule = Rule {
            condition: Condition::block(3),
            effects: vec![Effect::SetIndex(0, Expression::Literal(4))],
        };
        let json = serde_json::to_string(&rule).unwrap();
        let back: Rule = serde_json::from_str(&json).unwrap();
        assert_eq!(back, rule);
    }
}
