//! The compiled cell-rule contract and the actions rules emit.
//!
//! A [`CellRule`] looks at a cell through a [`Query`] and answers with a
//! [`CellOutcome`]: nothing, one [`Action`], or several. Actions are data; the
//! engine decides when and whether they are applied.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::coords::Offset;
use crate::error::{CoreError, CoreResult};
use crate::neighbors::MOORE_3D_SELF;
use crate::query::Query;

/// Sparse map of channel slot to new value.
pub type ChannelMap = BTreeMap<usize, i64>;

/// Primitive ids below this bound get a precomputed tracked flag.
pub const TRACKED_TABLE_LIMIT: i64 = 1 << 15;

/// Name of an auxiliary state channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StateName(String);

impl StateName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StateName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for StateName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for StateName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A named side-channel notification raised by a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggeredEvent {
    pub name: String,
    pub value: Option<i64>,
}

impl TriggeredEvent {
    pub fn new(name: impl Into<String>, value: Option<i64>) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// A requested change to one cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    /// Channels to write.
    pub updated: ChannelMap,

    /// Reset every channel to zero before writing.
    pub clear: bool,

    /// Offsets registered as tracked once the action applies.
    pub wake_points: Vec<Offset>,

    /// Channel values that must still hold when the action applies.
    pub conditions: Option<ChannelMap>,

    /// Ticks to wait before applying; zero applies this tick.
    pub schedule_delay: u32,

    /// Events raised alongside the change.
    pub events: Vec<TriggeredEvent>,
}

impl Action {
    /// Apply `updated` this tick and wake the surrounding cube.
    pub fn update(updated: ChannelMap) -> Self {
        Self {
            updated,
            clear: false,
            wake_points: MOORE_3D_SELF.to_vec(),
            conditions: None,
            schedule_delay: 0,
            events: Vec::new(),
        }
    }

    /// Apply `updated` after `delay` ticks.
    pub fn schedule(delay: u32, updated: ChannelMap) -> Self {
        Self {
            schedule_delay: delay,
            ..Self::update(updated)
        }
    }

    /// Apply `updated` after `delay` ticks if `conditions` still hold.
    pub fn conditional_schedule(delay: u32, conditions: ChannelMap, updated: ChannelMap) -> Self {
        Self {
            conditions: Some(conditions),
            ..Self::schedule(delay, updated)
        }
    }

    /// An action carrying only events: no writes and no wake-ups.
    pub fn events_only(events: Vec<TriggeredEvent>) -> Self {
        Self {
            wake_points: Vec::new(),
            events,
            ..Self::update(ChannelMap::new())
        }
    }

    /// The same action with its delay removed.
    pub fn immediate(self) -> Self {
        Self {
            schedule_delay: 0,
            ..self
        }
    }

    pub fn with_clear(mut self, clear: bool) -> Self {
        self.clear = clear;
        self
    }

    pub fn with_wake_points(mut self, wake_points: Vec<Offset>) -> Self {
        self.wake_points = wake_points;
        self
    }

    pub fn with_events(mut self, events: Vec<TriggeredEvent>) -> Self {
        self.events = events;
        self
    }

    pub fn is_scheduled(&self) -> bool {
        self.schedule_delay > 0
    }

    /// Check the guard conditions against current channel values.
    pub fn conditions_hold(&self, current: impl Fn(usize) -> i64) -> bool {
        match &self.conditions {
            None => true,
            Some(conditions) => conditions
                .iter()
                .all(|(&slot, &value)| current(slot) == value),
        }
    }
}

/// What a rule produced for one cell.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CellOutcome {
    #[default]
    Idle,
    Single(Action),
    Multiple(Vec<Action>),
}

impl CellOutcome {
    pub fn is_idle(&self) -> bool {
        match self {
            CellOutcome::Idle => true,
            CellOutcome::Single(_) => false,
            CellOutcome::Multiple(actions) => actions.is_empty(),
        }
    }

    /// Number of actions carried.
    pub fn len(&self) -> usize {
        match self {
            CellOutcome::Idle => 0,
            CellOutcome::Single(_) => 1,
            CellOutcome::Multiple(actions) => actions.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append another outcome, allocating only when both carry actions.
    pub fn join(self, other: CellOutcome) -> CellOutcome {
        match (self, other) {
            (CellOutcome::Idle, other) => other,
            (this, CellOutcome::Idle) => this,
            (CellOutcome::Single(a), CellOutcome::Single(b)) => CellOutcome::Multiple(vec![a, b]),
            (CellOutcome::Single(a), CellOutcome::Multiple(mut rest)) => {
                rest.insert(0, a);
                CellOutcome::Multiple(rest)
            }
            (CellOutcome::Multiple(mut list), CellOutcome::Single(b)) => {
                list.push(b);
                CellOutcome::Multiple(list)
            }
            (CellOutcome::Multiple(mut list), CellOutcome::Multiple(rest)) => {
                list.extend(rest);
                CellOutcome::Multiple(list)
            }
        }
    }

    pub fn into_actions(self) -> Vec<Action> {
        match self {
            CellOutcome::Idle => Vec::new(),
            CellOutcome::Single(action) => vec![action],
            CellOutcome::Multiple(actions) => actions,
        }
    }
}

impl From<Action> for CellOutcome {
    fn from(action: Action) -> Self {
        CellOutcome::Single(action)
    }
}

impl From<Option<Action>> for CellOutcome {
    fn from(action: Option<Action>) -> Self {
        action.map(CellOutcome::Single).unwrap_or_default()
    }
}

/// A compiled rule evaluated once per tracked cell per tick.
///
/// Implementations must be pure: the outcome depends only on the query.
pub trait CellRule: Send + Sync {
    /// Evaluate the rule for the cell behind `query`.
    fn process(&self, query: &dyn Query) -> CellOutcome;

    /// Whether cells holding `primitive` can ever make the rule fire.
    fn tracked(&self, primitive: i64) -> bool;

    /// Auxiliary state names; `states()[i]` lives in slot `i + 1`.
    fn states(&self) -> &[StateName];

    /// Channels stored per cell, including the primitive slot.
    fn channel_count(&self) -> usize {
        self.states().len() + 1
    }

    /// Slot of a named auxiliary state.
    fn slot_of(&self, name: &str) -> Option<usize> {
        self.states()
            .iter()
            .position(|s| s.as_str() == name)
            .map(|i| i + 1)
    }
}

/// Lookup table of tracked primitive ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackedTable {
    table: Vec<bool>,
}

impl TrackedTable {
    /// Track exactly the given ids. Negative ids are ignored.
    pub fn from_literals(literals: impl IntoIterator<Item = i64>) -> Self {
        let mut table = Vec::new();
        for literal in literals {
            let Ok(index) = usize::try_from(literal) else {
                continue;
            };
            if index >= table.len() {
                table.resize(index + 1, false);
            }
            table[index] = true;
        }
        Self { table }
    }

    /// Track every id below `limit` accepted by `predicate`.
    pub fn from_predicate(limit: i64, predicate: impl Fn(i64) -> bool) -> Self {
        let table = (0..limit.max(0)).map(predicate).collect();
        Self { table }
    }

    pub fn contains(&self, primitive: i64) -> bool {
        usize::try_from(primitive)
            .ok()
            .and_then(|i| self.table.get(i).copied())
            .unwrap_or(false)
    }

    /// Number of tracked ids.
    pub fn count(&self) -> usize {
        self.table.iter().filter(|&&t| t).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = i64> + '_ {
        self.table
            .iter()
            .enumerate()
            .filter(|(_, &t)| t)
            .map(|(i, _)| i as i64)
    }
}

/// Several rules evaluated together as one.
///
/// All sub-rules must agree on the slots they share.
pub struct JoinedRule {
    rules: Vec<Arc<dyn CellRule>>,
    states: Vec<StateName>,
    tracked: TrackedTable,
}

impl JoinedRule {
    /// Join `rules`, merging their state tables.
    pub fn new(rules: Vec<Arc<dyn CellRule>>) -> CoreResult<Self> {
        let mut states: Vec<StateName> = Vec::new();
        for rule in &rules {
            for (i, name) in rule.states().iter().enumerate() {
                match states.get(i) {
                    Some(existing) if existing != name => {
                        return Err(CoreError::SlotConflict {
                            slot: i + 1,
                            existing: existing.to_string(),
                            incoming: name.to_string(),
                        });
                    }
                    Some(_) => {}
                    None => states.push(name.clone()),
                }
            }
        }

        let tracked = TrackedTable::from_predicate(TRACKED_TABLE_LIMIT, |primitive| {
            rules.iter().any(|r| r.tracked(primitive))
        });

        Ok(Self {
            rules,
            states,
            tracked,
        })
    }

    pub fn rules(&self) -> &[Arc<dyn CellRule>] {
        &self.rules
    }
}

impl CellRule for JoinedRule {
    fn process(&self, query: &dyn Query) -> CellOutcome {
        self.rules
            .iter()
            .fold(CellOutcome::Idle, |acc, rule| acc.join(rule.process(query)))
    }

    fn tracked(&self, primitive: i64) -> bool {
        if (0..TRACKED_TABLE_LIMIT).contains(&primitive) {
            self.tracked.contains(primitive)
        } else {
            self.rules.iter().any(|r| r.tracked(primitive))
        }
    }

    fn states(&self) -> &[StateName] {
        &self.states
    }
}

impl fmt::Debug for JoinedRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinedRule")
            .field("rule_count", &self.rules.len())
            .field("states", &self.states)
            .field("tracked", &self.tracked.count())
            .finish()
    }
}
