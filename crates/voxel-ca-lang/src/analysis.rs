//! Static analysis over parsed rules.

use std::collections::BTreeSet;

use crate::ast::{Condition, Effect, Expression, Rule};

/// Visit every expression reachable from `condition`, outermost first.
pub fn for_each_expression<'a>(condition: &'a Condition, visit: &mut dyn FnMut(&'a Expression)) {
    match condition {
        Condition::And(list) => {
            for c in list {
                for_each_expression(c, visit);
            }
        }
        Condition::Not(inner) => for_each_expression(inner, visit),
        Condition::Equal(left, right) => {
            walk_expression(left, visit);
            walk_expression(right, visit);
        }
    }
}

/// Visit `expression` and all of its sub-expressions, outermost first.
pub fn walk_expression<'a>(expression: &'a Expression, visit: &mut dyn FnMut(&'a Expression)) {
    visit(expression);
    match expression {
        Expression::Literal(_) | Expression::Index(_) | Expression::NeighborIndex(..) => {}
        Expression::NeighborsCount(_, condition) => for_each_expression(condition, visit),
        Expression::Compare(left, right) | Expression::Operation(left, right, _) => {
            walk_expression(left, visit);
            walk_expression(right, visit);
        }
    }
}

/// Visit every expression of a rule, conditions first, then effects in order.
pub fn for_each_rule_expression<'a>(rule: &'a Rule, visit: &mut dyn FnMut(&'a Expression)) {
    for_each_expression(&rule.condition, visit);
    for effect in &rule.effects {
        match effect {
            Effect::SetIndex(_, expression) => walk_expression(expression, visit),
            Effect::TriggerEvent(_, Some(expression)) => walk_expression(expression, visit),
            Effect::TriggerEvent(_, None) | Effect::BlockCopy(_) => {}
        }
    }
}

/// Number of channels the rules need: one more than the highest slot used.
pub fn state_count(rules: &[Rule]) -> usize {
    let mut highest = 0;
    for rule in rules {
        for_each_rule_expression(rule, &mut |expression| match expression {
            Expression::Index(slot) | Expression::NeighborIndex(_, slot) => {
                highest = highest.max(*slot)
            }
            _ => {}
        });
        for effect in &rule.effects {
            if let Effect::SetIndex(slot, _) = effect {
                highest = highest.max(*slot);
            }
        }
    }
    highest + 1
}

/// Primitive ids compared against the block channel anywhere in the rules.
///
/// A cell whose primitive is not in this set can never satisfy a rule that
/// tests its own block, so the engine does not need to track it.
pub fn tracked_literals(rules: &[Rule]) -> BTreeSet<i64> {
    let mut literals = BTreeSet::new();
    for rule in rules {
        collect_tracked(&rule.condition, &mut literals);
    }
    literals
}

fn collect_tracked(condition: &Condition, literals: &mut BTreeSet<i64>) {
    match condition {
        Condition::And(list) => list.iter().for_each(|c| collect_tracked(c, literals)),
        Condition::Not(inner) => collect_tracked(inner, literals),
        Condition::Equal(left, right) => {
            if let (
                Expression::Index(0) | Expression::NeighborIndex(_, 0),
                Expression::Literal(value),
            ) = (left, right)
            {
                literals.insert(*value);
            }
            collect_from_expression(left, literals);
            collect_from_expression(right, literals);
        }
    }
}

fn collect_from_expression(expression: &Expression, literals: &mut BTreeSet<i64>) {
    match expression {
        Expression::NeighborsCount(_, condition) => collect_tracked(condition, literals),
        Expression::Compare(left, right) | Expression::Operation(left, right, _) => {
            collect_from_expression(left, literals);
            collect_from_expression(right, literals);
        }
        Expression::Literal(_) | Expression::Index(_) | Expression::NeighborIndex(..) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use voxel_ca_core::BlockPalette;

    fn parse(source: &[&str]) -> (BlockPalette, Vec<Rule>) {
        let palette = BlockPalette::builtin();
        let rules = {
            let mut parser = Parser::new(&palette);
            for line in source {
                parser.feed_line(line).unwrap();
            }
            parser.finish().0
        };
        (palette, rules)
    }

    #[test]
    fn test_state_count() {
        let (_, rules) = parse(&["#dirt -> #stone"]);
        assert_eq!(state_count(&rules), 1);
        assert_eq!(state_count(&[]), 1);

        let (_, rules) = parse(&["#dirt & heat=1 -> age=up@power"]);
        assert_eq!(state_count(&rules), 4);
    }

    #[test]
    fn test_tracked_literals() {
        let (palette, rules) = parse(&[
            "#white_wool & [!2]moore2d@#white_wool -> #air",
            "!#stone & up@#sand -> heat=3",
            "heat=7 -> #dirt",
        ]);
        let tracked = tracked_literals(&rules);
        let expected: BTreeSet<i64> = ["white_wool", "stone", "sand"]
            .iter()
            .map(|n| palette.resolve(n).unwrap())
            .collect();
        assert_eq!(tracked, expected);
    }
}
