//! A hand-written rule that slides blocks through air.

use voxel_ca_core::{Action, CellOutcome, CellRule, ChannelMap, Offset, Query, StateName, AIR};

/// Slot of `push_direction`.
pub const DIRECTION_SLOT: usize = 1;
/// Slot of `push_strength`.
pub const STRENGTH_SLOT: usize = 2;

/// Axis-aligned push direction, stored as `1..=6` in `push_direction`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Down,
    Up,
    North,
    South,
    West,
    East,
}

impl Direction {
    pub const ALL: [Direction; 6] = [
        Direction::Down,
        Direction::Up,
        Direction::North,
        Direction::South,
        Direction::West,
        Direction::East,
    ];

    /// Decode a `push_direction` value; `0` and out-of-range values are `None`.
    pub fn from_state(value: i64) -> Option<Self> {
        match value {
            1..=6 => Some(Self::ALL[(value - 1) as usize]),
            _ => None,
        }
    }

    pub fn state_value(self) -> i64 {
        self as i64 + 1
    }

    /// Unit offset pointing where a block moving this way goes.
    pub fn offset(self) -> Offset {
        match self {
            Direction::Down => Offset::new(0, -1, 0),
            Direction::Up => Offset::new(0, 1, 0),
            Direction::North => Offset::new(0, 0, -1),
            Direction::South => Offset::new(0, 0, 1),
            Direction::West => Offset::new(-1, 0, 0),
            Direction::East => Offset::new(1, 0, 0),
        }
    }
}

/// Moves blocks carrying a direction and a positive strength.
///
/// Each move costs one strength; a block reaching zero stops. A block in the
/// way of a pusher inherits the push and keeps the pusher awake.
#[derive(Debug, Clone)]
pub struct BlockPusher {
    states: [StateName; 2],
}

impl Default for BlockPusher {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockPusher {
    pub fn new() -> Self {
        Self {
            states: [StateName::new("push_direction"), StateName::new("push_strength")],
        }
    }

    /// First neighbor actively pushing toward the queried cell.
    ///
    /// Air only adopts a pushed block, so `carrying` requires the pusher to be
    /// non-air; a solid cell takes the push from any neighbor with strength.
    fn incoming(query: &dyn Query, carrying: bool) -> Option<(Direction, i64, i64)> {
        Direction::ALL.into_iter().find_map(|direction| {
            let behind = direction.offset().inverse();
            let block = query.state_at(behind, 0);
            let strength = query.state_at(behind, STRENGTH_SLOT);
            let pushing = query.state_at(behind, DIRECTION_SLOT) == direction.state_value();
            let solid = !carrying || block != AIR;
            (solid && pushing && strength > 0).then_some((direction, block, strength))
        })
    }
}

impl CellRule for BlockPusher {
    fn process(&self, query: &dyn Query) -> CellOutcome {
        let block = query.state(0);

        if block == AIR {
            let Some((direction, pushed, strength)) = Self::incoming(query, true) else {
                return CellOutcome::Idle;
            };
            let remaining = strength - 1;
            let heading = if remaining > 0 { direction.state_value() } else { 0 };
            return Action::update(ChannelMap::from([
                (0, pushed),
                (DIRECTION_SLOT, heading),
                (STRENGTH_SLOT, remaining),
            ]))
            .into();
        }

        let strength = query.state(STRENGTH_SLOT);
        if let Some(direction) = Direction::from_state(query.state(DIRECTION_SLOT)) {
            if strength > 0 {
                let target = direction.offset();
                let wake = vec![Offset::SELF, target];
                if query.state_at(target, 0) == AIR {
                    return Action::update(ChannelMap::new())
                        .with_clear(true)
                        .with_wake_points(wake)
                        .into();
                }
                return Action::update(ChannelMap::new())
                    .with_wake_points(wake)
                    .into();
            }
        }

        match Self::incoming(query, false) {
            Some((direction, _, strength)) => Action::update(ChannelMap::from([
                (DIRECTION_SLOT, direction.state_value()),
                (STRENGTH_SLOT, strength),
            ]))
            .into(),
            None => CellOutcome::Idle,
        }
    }

    fn tracked(&self, _primitive: i64) -> bool {
        true
    }

    fn states(&self) -> &[StateName] {
        &self.states
    }
}
