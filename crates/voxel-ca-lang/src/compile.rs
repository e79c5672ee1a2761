//! Interpreter backend: evaluates parsed rules directly against a query.

use std::fmt;

use indexmap::IndexMap;
use voxel_ca_core::{
    Action, CellOutcome, CellRule, ChannelMap, Query, ShiftedQuery, StateName, TrackedTable,
    TriggeredEvent,
};

use crate::analysis::{state_count, tracked_literals};
use crate::ast::{Condition, Effect, Expression, Operator, Rule};

/// Rules ready to run as a [`CellRule`].
///
/// Every rule whose condition holds runs its effects in declaration order,
/// all reading pre-tick state. When several writes hit the same channel the
/// last one wins. Only channels whose value actually changes are emitted.
pub struct CompiledRule {
    rules: Vec<Rule>,
    states: Vec<StateName>,
    channel_count: usize,
    tracked: TrackedTable,
}

/// Lower `rules` with the slot table produced while parsing them.
pub fn compile(rules: Vec<Rule>, slots: &IndexMap<String, usize>) -> CompiledRule {
    let mut names: Vec<(usize, &String)> = slots.iter().map(|(name, &slot)| (slot, name)).collect();
    names.sort_by_key(|(slot, _)| *slot);
    let states: Vec<StateName> = names
        .into_iter()
        .map(|(_, name)| StateName::from(name.as_str()))
        .collect();
    let channel_count = state_count(&rules).max(states.len() + 1);
    let tracked = TrackedTable::from_literals(tracked_literals(&rules));

    CompiledRule {
        rules,
        states,
        channel_count,
        tracked,
    }
}

impl CompiledRule {
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn tracked_table(&self) -> &TrackedTable {
        &self.tracked
    }
}

impl CellRule for CompiledRule {
    fn process(&self, query: &dyn Query) -> CellOutcome {
        let mut updates = ChannelMap::new();
        let mut events = Vec::new();

        for rule in &self.rules {
            if !evaluate_condition(&rule.condition, query) {
                continue;
            }
            for effect in &rule.effects {
                match effect {
                    Effect::SetIndex(slot, expression) => {
                        updates.insert(*slot, evaluate_expression(expression, query));
                    }
                    Effect::BlockCopy(offset) => {
                        for slot in 0..self.channel_count {
                            updates.insert(slot, query.state_at(*offset, slot));
                        }
                    }
                    Effect::TriggerEvent(name, value) => events.push(TriggeredEvent::new(
                        name.clone(),
                        value.as_ref().map(|e| evaluate_expression(e, query)),
                    )),
                }
            }
        }

        updates.retain(|&slot, value| query.state(slot) != *value);

        if !updates.is_empty() {
            Action::update(updates).with_events(events).into()
        } else if !events.is_empty() {
            Action::events_only(events).into()
        } else {
            CellOutcome::Idle
        }
    }

    fn tracked(&self, primitive: i64) -> bool {
        self.tracked.contains(primitive)
    }

    fn states(&self) -> &[StateName] {
        &self.states
    }

    fn channel_count(&self) -> usize {
        self.channel_count
    }
}

impl fmt::Debug for CompiledRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledRule")
            .field("rule_count", &self.rules.len())
            .field("states", &self.states)
            .field("tracked", &self.tracked.count())
            .finish()
    }
}

/// Evaluate a condition for the cell behind `query`.
pub fn evaluate_condition(condition: &Condition, query: &dyn Query) -> bool {
    match condition {
        Condition::And(list) => list.iter().all(|c| evaluate_condition(c, query)),
        Condition::Not(inner) => !evaluate_condition(inner, query),
        Condition::Equal(left, right) => {
            evaluate_expression(left, query) == evaluate_expression(right, query)
        }
    }
}

/// Evaluate an expression for the cell behind `query`.
pub fn evaluate_expression(expression: &Expression, query: &dyn Query) -> i64 {
    match expression {
        Expression::Literal(value) => *value,
        Expression::Index(slot) => query.state(*slot),
        Expression::NeighborIndex(offset, slot) => query.state_at(*offset, *slot),
        Expression::NeighborsCount(offsets, condition) => offsets
            .iter()
            .filter(|&&offset| evaluate_condition(condition, &ShiftedQuery::new(query, offset)))
            .count() as i64,
        Expression::Compare(left, right) => {
            let left = evaluate_expression(left, query);
            let right = evaluate_expression(right, query);
            left.cmp(&right) as i64
        }
        Expression::Operation(left, right, op) => apply_operator(
            *op,
            evaluate_expression(left, query),
            evaluate_expression(right, query),
        ),
    }
}

/// Integer arithmetic shared by both backends.
///
/// Overflow wraps. Dividing by zero yields the dividend and taking a
/// remainder by zero yields zero.
pub fn apply_operator(op: Operator, left: i64, right: i64) -> i64 {
    match op {
        Operator::Add => left.wrapping_add(right),
        Operator::Sub => left.wrapping_sub(right),
        Operator::Mul => left.wrapping_mul(right),
        Operator::Div => left.checked_div(right).unwrap_or(left),
        Operator::Mod => left.checked_rem(right).unwrap_or(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::Program;
    use voxel_ca_core::{neighbors, BlockPalette, NeighborhoodSnapshot, Offset};

    fn program(source: &str) -> (BlockPalette, CompiledRule) {
        let palette = BlockPalette::builtin();
        let compiled = Program::from_source(source, &palette).unwrap().compile();
        (palette, compiled)
    }

    fn single(outcome: CellOutcome) -> Action {
        match outcome {
            CellOutcome::Single(action) => action,
            other => panic!("expected a single action, got {other:?}"),
        }
    }

    #[test]
    fn test_operator_semantics() {
        assert_eq!(apply_operator(Operator::Div, 7, 2), 3);
        assert_eq!(apply_operator(Operator::Div, 7, 0), 7);
        assert_eq!(apply_operator(Operator::Mod, 7, 0), 0);
        assert_eq!(apply_operator(Operator::Mod, -7, 3), -1);
        assert_eq!(apply_operator(Operator::Add, i64::MAX, 1), i64::MIN);
        assert_eq!(apply_operator(Operator::Div, i64::MIN, -1), i64::MIN);
    }

    #[test]
    fn test_block_rule_and_tracking() {
        let (palette, rule) = program("#dirt -> #stone");
        let dirt = palette.resolve("dirt").unwrap();
        let stone = palette.resolve("stone").unwrap();

        assert!(rule.tracked(dirt));
        assert!(!rule.tracked(stone));
        assert_eq!(rule.channel_count(), 1);

        let query = NeighborhoodSnapshot::new(1, 1).with(Offset::SELF, 0, dirt);
        let action = single(rule.process(&query));
        assert_eq!(action.updated, ChannelMap::from([(0, stone)]));
        assert_eq!(action.wake_points, neighbors::MOORE_3D_SELF.to_vec());

        let query = NeighborhoodSnapshot::new(1, 1).with(Offset::SELF, 0, stone);
        assert_eq!(rule.process(&query), CellOutcome::Idle);
    }

    #[test]
    fn test_last_match_wins() {
        let (palette, rule) = program("#dirt -> #stone\n#dirt -> #sand");
        let dirt = palette.resolve("dirt").unwrap();
        let sand = palette.resolve("sand").unwrap();
        let query = NeighborhoodSnapshot::new(1, 1).with(Offset::SELF, 0, dirt);
        assert_eq!(single(rule.process(&query)).updated, ChannelMap::from([(0, sand)]));
    }

    #[test]
    fn test_unchanged_channels_are_dropped() {
        let (palette, rule) = program("#dirt -> heat=2 age=age");
        let dirt = palette.resolve("dirt").unwrap();
        let query = NeighborhoodSnapshot::new(1, 3)
            .with(Offset::SELF, 0, dirt)
            .with(Offset::SELF, 2, 9);
        assert_eq!(single(rule.process(&query)).updated, ChannelMap::from([(1, 2)]));

        let query = query.with(Offset::SELF, 1, 2);
        assert_eq!(rule.process(&query), CellOutcome::Idle);
    }

    #[test]
    fn test_counter_increments() {
        let (palette, rule) = program("#dirt & points!0 -> points=points+1");
        let dirt = palette.resolve("dirt").unwrap();
        let query = NeighborhoodSnapshot::new(1, 2)
            .with(Offset::SELF, 0, dirt)
            .with(Offset::SELF, 1, 4);
        assert_eq!(single(rule.process(&query)).updated, ChannelMap::from([(1, 5)]));
    }

    #[test]
    fn test_block_copy_copies_all_channels() {
        let (palette, rule) = program("#air & up@#sand & heat=0 -> ~up");
        let sand = palette.resolve("sand").unwrap();
        let up = Offset::new(0, 1, 0);
        let query = NeighborhoodSnapshot::new(1, 2)
            .with(up, 0, sand)
            .with(up, 1, 6);
        assert_eq!(
            single(rule.process(&query)).updated,
            ChannelMap::from([(0, sand), (1, 6)])
        );
    }

    #[test]
    fn test_events_only_action() {
        let (palette, rule) = program("#dirt -> $dirt_exist=1");
        let dirt = palette.resolve("dirt").unwrap();
        let query = NeighborhoodSnapshot::new(1, 1).with(Offset::SELF, 0, dirt);
        let action = single(rule.process(&query));
        assert!(action.updated.is_empty());
        assert!(action.wake_points.is_empty());
        assert_eq!(action.events, vec![TriggeredEvent::new("dirt_exist", Some(1))]);
    }

    #[test]
    fn test_neighbor_counts() {
        let (palette, rule) = program("#air & [>1]neumann2d@#dirt -> #dirt");
        let dirt = palette.resolve("dirt").unwrap();
        let mut query = NeighborhoodSnapshot::new(1, 1).with(Offset::new(1, 0, 0), 0, dirt);
        assert_eq!(rule.process(&query), CellOutcome::Idle);
        query.set(Offset::new(-1, 0, 0), 0, dirt);
        assert_eq!(single(rule.process(&query)).updated, ChannelMap::from([(0, dirt)]));
    }

    #[test]
    fn test_comparison_conditions() {
        let (palette, rule) = program("#dirt & heat>3 -> #stone\n#dirt & heat<0 -> #sand");
        let dirt = palette.resolve("dirt").unwrap();
        let base = NeighborhoodSnapshot::new(1, 2).with(Offset::SELF, 0, dirt);
        assert_eq!(rule.process(&base.clone().with(Offset::SELF, 1, 3)), CellOutcome::Idle);
        assert_eq!(
            single(rule.process(&base.clone().with(Offset::SELF, 1, 4))).updated,
            ChannelMap::from([(0, palette.resolve("stone").unwrap())])
        );
        assert_eq!(
            single(rule.process(&base.with(Offset::SELF, 1, -2))).updated,
            ChannelMap::from([(0, palette.resolve("sand").unwrap())])
        );
    }
}
