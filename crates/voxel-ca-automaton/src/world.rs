//! Incremental, section-sparse execution engine.
//!
//! Only tracked cells are evaluated each step. Actions are buffered until every
//! tracked cell has been evaluated, so a step always reads the state left by
//! the previous one.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use voxel_ca_core::{
    coords, neighbors, Action, CellPos, CellRule, ChannelMap, SectionPos, TriggeredEvent,
    CELLS_PER_SECTION,
};

use crate::config::EngineConfig;
use crate::error::{AutomatonError, AutomatonResult};
use crate::host::WorldHost;
use crate::query::WorldQuery;
use crate::storage::SectionStorage;
use crate::timer::TimerWheel;

/// Name under which the primitive channel is reported by [`LazyWorld::inspect`].
pub const PRIMITIVE_CHANNEL: &str = "block";

/// Where a section stands from the engine's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SectionLifecycle {
    /// The host does not have the section loaded.
    Unloaded,
    /// Loaded, with no tracked cells.
    Loaded,
    /// Loaded with at least one tracked cell.
    Active,
}

/// An action bound to the cell it targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAction {
    pub pos: CellPos,
    pub action: Action,
}

/// An event raised by an applied action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellEvent {
    pub tick: u64,
    pub pos: CellPos,
    pub event: TriggeredEvent,
}

/// Statistics for one host tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TickReport {
    /// Tick number (0-indexed).
    pub tick: u64,

    /// Engine steps merged into this report.
    pub steps: u32,

    /// Sections with at least one tracked cell at the start of a step.
    pub processed_sections: usize,

    /// Tracked cells evaluated.
    pub processed_cells: usize,

    /// Actions applied, placements included.
    pub applied_actions: usize,

    /// External placements applied.
    pub placements: usize,

    /// Cells whose channels changed.
    pub modified_cells: usize,

    /// Actions handed to the timer wheel.
    pub scheduled_actions: usize,

    /// Actions whose delay did not fit the wheel.
    pub rejected_actions: usize,

    /// Actions dropped because their section vanished or conditions failed.
    pub stale_actions: usize,

    /// Events raised.
    pub events: usize,

    /// Sections whose changes were flushed to the host.
    pub flushed_sections: usize,

    /// Wall-clock time spent.
    pub duration: Duration,
}

impl TickReport {
    fn new(tick: u64) -> Self {
        Self {
            tick,
            ..Default::default()
        }
    }

    /// Whether any cell changed.
    pub fn had_changes(&self) -> bool {
        self.modified_cells > 0
    }

    /// Fold another step's counters into this report.
    pub fn merge(&mut self, other: &TickReport) {
        self.steps += other.steps;
        self.processed_sections += other.processed_sections;
        self.processed_cells += other.processed_cells;
        self.applied_actions += other.applied_actions;
        self.placements += other.placements;
        self.modified_cells += other.modified_cells;
        self.scheduled_actions += other.scheduled_actions;
        self.rejected_actions += other.rejected_actions;
        self.stale_actions += other.stale_actions;
        self.events += other.events;
        self.flushed_sections += other.flushed_sections;
        self.duration += other.duration;
    }
}

/// Per-step buffer of encoded change records, by section.
type ChangeBatch = IndexMap<SectionPos, Vec<i64>>;

/// A cellular automaton running lazily over the sections of a host world.
pub struct LazyWorld<H: WorldHost> {
    host: H,
    rule: Arc<dyn CellRule>,
    config: EngineConfig,
    sections: IndexMap<SectionPos, SectionStorage>,
    wheel: TimerWheel<PendingAction>,
    placements: Vec<PendingAction>,
    events: Vec<CellEvent>,
    current_tick: u64,
    tick_history: Vec<TickReport>,
}

impl<H: WorldHost> LazyWorld<H> {
    /// Create an engine without seeding any section.
    pub fn new(host: H, rule: Arc<dyn CellRule>, config: EngineConfig) -> AutomatonResult<Self> {
        config.validate()?;
        Ok(Self {
            host,
            rule,
            wheel: TimerWheel::new(config.wheel_size),
            config,
            sections: IndexMap::new(),
            placements: Vec::new(),
            events: Vec::new(),
            current_tick: 0,
            tick_history: Vec::new(),
        })
    }

    /// Create an engine and seed every section the host reports as loaded.
    pub fn register(
        host: H,
        rule: Arc<dyn CellRule>,
        config: EngineConfig,
    ) -> AutomatonResult<Self> {
        let mut world = Self::new(host, rule, config)?;
        for section in world.host.loaded_sections() {
            world.handle_section_load(section);
        }
        info!(
            sections = world.sections.len(),
            tracked = world.tracked_cell_count(),
            states = world.rule.states().len(),
            "automaton_registered"
        );
        Ok(world)
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn rule(&self) -> &Arc<dyn CellRule> {
        &self.rule
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn tick_count(&self) -> u64 {
        self.current_tick
    }

    /// The most recent tick reports, oldest first.
    pub fn tick_history(&self) -> &[TickReport] {
        &self.tick_history
    }

    /// Tasks waiting in the timer wheel.
    pub fn pending_scheduled(&self) -> usize {
        self.wheel.len()
    }

    /// Take every event raised since the last call.
    pub fn take_events(&mut self) -> Vec<CellEvent> {
        std::mem::take(&mut self.events)
    }

    /// Total tracked cells across all sections.
    pub fn tracked_cell_count(&self) -> usize {
        self.sections.values().map(|s| s.tracked().len()).sum()
    }

    pub fn is_tracked(&self, pos: CellPos) -> bool {
        self.sections
            .get(&pos.section())
            .is_some_and(|s| s.tracked().contains(pos.local_index()))
    }

    pub fn section_lifecycle(&self, section: SectionPos) -> SectionLifecycle {
        if !self.host.is_section_loaded(section) {
            return SectionLifecycle::Unloaded;
        }
        match self.sections.get(&section) {
            Some(storage) if !storage.tracked().is_empty() => SectionLifecycle::Active,
            _ => SectionLifecycle::Loaded,
        }
    }

    /// Current value of `slot` at `pos`.
    pub fn state_at(&self, pos: CellPos, slot: usize) -> i64 {
        match self.sections.get(&pos.section()) {
            Some(storage) => storage.get(pos.local_index(), slot),
            None if slot == 0 => self.host.primitive_state(pos),
            None => 0,
        }
    }

    /// Every channel of `pos` by name, primitive first.
    pub fn inspect(&self, pos: CellPos) -> IndexMap<String, i64> {
        let mut channels = IndexMap::new();
        channels.insert(PRIMITIVE_CHANNEL.to_string(), self.state_at(pos, 0));
        for (i, state) in self.rule.states().iter().enumerate() {
            channels.insert(state.to_string(), self.state_at(pos, i + 1));
        }
        channels
    }

    // ========================================================================
    // Host notifications
    // ========================================================================

    /// Create or refresh storage for `section` and seed its tracked cells.
    pub fn handle_section_load(&mut self, section: SectionPos) {
        if !self.host.is_section_loaded(section) {
            debug!(%section, "section_load_ignored");
            return;
        }
        match self.sections.get_mut(&section) {
            Some(storage) => {
                for index in 0..CELLS_PER_SECTION {
                    storage.set(index, 0, self.host.primitive_state(section.cell(index)));
                }
            }
            None => {
                let storage = self.fresh_storage(section);
                self.sections.insert(section, storage);
            }
        }
        let seeded = self.seed_section(section);
        debug!(%section, seeded, "section_loaded");
    }

    /// Drop storage and tracked cells of `section`.
    pub fn handle_section_unload(&mut self, section: SectionPos) {
        if let Some(storage) = self.sections.swap_remove(&section) {
            debug!(%section, tracked = storage.tracked().len(), "section_unloaded");
        }
    }

    /// Queue an external write: every channel of `pos` is reset, then
    /// `channels` is written. Applied at the start of the next step.
    pub fn handle_placement(&mut self, pos: CellPos, channels: ChannelMap) {
        self.placements.push(PendingAction {
            pos,
            action: Action::update(channels).with_clear(true),
        });
    }

    /// Queue placement of a primitive block with all auxiliary states at zero.
    pub fn handle_block_placement(&mut self, pos: CellPos, state: i64) {
        self.handle_placement(pos, ChannelMap::from([(0, state)]));
    }

    /// Queue placement of a block with named auxiliary states.
    pub fn handle_named_placement(
        &mut self,
        pos: CellPos,
        state: i64,
        values: &[(&str, i64)],
    ) -> AutomatonResult<()> {
        let mut channels = ChannelMap::from([(0, state)]);
        for (name, value) in values {
            let slot = self
                .rule
                .slot_of(name)
                .ok_or_else(|| AutomatonError::UnknownState {
                    name: name.to_string(),
                })?;
            channels.insert(slot, *value);
        }
        self.handle_placement(pos, channels);
        Ok(())
    }

    // ========================================================================
    // Rule replacement
    // ========================================================================

    /// Swap the active rule.
    ///
    /// Channels are migrated by state name. Pending wheel tasks and queued
    /// placements are remapped; writes to states the new rule lacks are
    /// dropped, and tasks guarded by such states are discarded. Every section
    /// is then re-seeded.
    pub fn replace_rule(&mut self, rule: Arc<dyn CellRule>) -> AutomatonResult<()> {
        let old_states = self.rule.states().to_vec();
        let new_states = rule.states().to_vec();

        // new slot -> old slot
        let mut mapping = vec![Some(0)];
        mapping.extend(
            new_states
                .iter()
                .map(|name| old_states.iter().position(|s| s == name).map(|i| i + 1)),
        );
        // old slot -> new slot
        let mut remap: BTreeMap<usize, usize> = BTreeMap::new();
        for (new_slot, old_slot) in mapping.iter().enumerate() {
            if let Some(old_slot) = old_slot {
                remap.insert(*old_slot, new_slot);
            }
        }

        for storage in self.sections.values_mut() {
            storage.migrate(&mapping);
        }

        let pending = self.wheel.drain_all();
        let mut kept = 0usize;
        for (delay, mut task) in pending {
            if !remap_action(&mut task.action, &remap) {
                continue;
            }
            self.wheel.schedule(task, delay)?;
            kept += 1;
        }
        self.placements
            .retain_mut(|placement| remap_action(&mut placement.action, &remap));

        self.rule = rule;
        let sections: Vec<SectionPos> = self.sections.keys().copied().collect();
        let mut seeded = 0;
        for section in sections {
            seeded += self.seed_section(section);
        }
        info!(
            states = new_states.len(),
            rescheduled = kept,
            seeded,
            "automaton_rule_replaced"
        );
        Ok(())
    }

    // ========================================================================
    // Ticking
    // ========================================================================

    /// Run one host tick: `steps_per_tick` engine steps merged into one report.
    pub fn tick(&mut self) -> TickReport {
        debug!(tick = self.current_tick, "automaton_tick_start");
        let mut report = TickReport::new(self.current_tick);
        for _ in 0..self.config.steps_per_tick {
            let step = self.step();
            report.merge(&step);
        }

        if self.tick_history.len() >= self.config.history_window {
            let excess = self.tick_history.len() + 1 - self.config.history_window;
            self.tick_history.drain(..excess);
        }
        self.tick_history.push(report.clone());
        self.current_tick += 1;

        debug!(
            tick = report.tick,
            cells = report.processed_cells,
            modified = report.modified_cells,
            duration_ms = report.duration.as_millis() as u64,
            "automaton_tick_complete"
        );
        report
    }

    /// Run exactly `n` ticks.
    pub fn run_ticks(&mut self, n: usize) -> Vec<TickReport> {
        (0..n).map(|_| self.tick()).collect()
    }

    /// Whether no cell is tracked, scheduled or queued for placement.
    pub fn is_idle(&self) -> bool {
        self.wheel.is_empty() && self.placements.is_empty() && self.tracked_cell_count() == 0
    }

    /// Tick until the world is idle or `max_ticks` have run.
    pub fn run_until_idle(&mut self, max_ticks: usize) -> Vec<TickReport> {
        let mut reports = Vec::new();
        for _ in 0..max_ticks {
            reports.push(self.tick());
            if self.is_idle() {
                info!(tick = self.current_tick, "automaton_idle");
                break;
            }
        }
        reports
    }

    fn step(&mut self) -> TickReport {
        let started = Instant::now();
        let mut report = TickReport {
            tick: self.current_tick,
            steps: 1,
            ..Default::default()
        };
        let mut changes = ChangeBatch::new();

        for placement in std::mem::take(&mut self.placements) {
            self.ensure_section(placement.pos.section());
            if self.apply(placement, &mut changes, &mut report) {
                report.placements += 1;
            }
        }

        let mut buffered = Vec::new();
        let channels = self.rule.channel_count();
        let keys: Vec<SectionPos> = self.sections.keys().copied().collect();
        for section in keys {
            let cells = match self.sections.get_mut(&section) {
                Some(storage) if !storage.tracked().is_empty() => storage.tracked_mut().drain(),
                _ => continue,
            };
            report.processed_sections += 1;
            for index in cells {
                let pos = section.cell(index);
                let query = WorldQuery::new(&self.sections, &self.host, pos, channels);
                let outcome = self.rule.process(&query);
                report.processed_cells += 1;
                buffered.extend(
                    outcome
                        .into_actions()
                        .into_iter()
                        .map(|action| PendingAction { pos, action }),
                );
            }
        }

        let mut due = Vec::with_capacity(buffered.len());
        for pending in buffered {
            if !pending.action.is_scheduled() {
                due.push(pending);
                continue;
            }
            let delay = pending.action.schedule_delay;
            let task = PendingAction {
                pos: pending.pos,
                action: pending.action.immediate(),
            };
            match self.wheel.schedule(task, delay) {
                Ok(_) => report.scheduled_actions += 1,
                Err(e) => {
                    warn!(pos = %pending.pos, error = %e, "scheduled_action_rejected");
                    report.rejected_actions += 1;
                }
            }
        }
        self.wheel.advance(|task| due.push(task));

        for pending in due {
            self.apply(pending, &mut changes, &mut report);
        }

        for (section, records) in changes {
            self.host.section_changed(section, &records);
            report.flushed_sections += 1;
        }

        report.duration = started.elapsed();
        report
    }

    /// Apply one action. Returns false when it was dropped as stale.
    fn apply(
        &mut self,
        pending: PendingAction,
        changes: &mut ChangeBatch,
        report: &mut TickReport,
    ) -> bool {
        let PendingAction { pos, action } = pending;
        let section = pos.section();
        let index = pos.local_index();

        let Some(storage) = self.sections.get_mut(&section) else {
            report.stale_actions += 1;
            return false;
        };
        if !action.conditions_hold(|slot| storage.get(index, slot)) {
            report.stale_actions += 1;
            return false;
        }

        let before = storage.get(index, 0);
        let mut modified = action.clear && storage.clear_cell(index);
        for (&slot, &value) in &action.updated {
            modified |= storage.set(index, slot, value) != value;
        }
        let after = storage.get(index, 0);

        if after != before {
            self.host.set_primitive_state(pos, after);
            changes
                .entry(section)
                .or_default()
                .push(coords::encode_change(pos, after));
        }
        if modified {
            report.modified_cells += 1;
        }
        report.applied_actions += 1;

        for event in action.events {
            info!(
                tick = self.current_tick,
                pos = %pos,
                event = %event.name,
                value = ?event.value,
                "cell_event"
            );
            report.events += 1;
            self.events.push(CellEvent {
                tick: self.current_tick,
                pos,
                event,
            });
        }
        for offset in action.wake_points {
            self.track(pos + offset);
        }
        true
    }

    // ========================================================================
    // Storage helpers
    // ========================================================================

    fn fresh_storage(&self, section: SectionPos) -> SectionStorage {
        let mut storage = SectionStorage::new(self.rule.channel_count());
        for index in 0..CELLS_PER_SECTION {
            storage.set(index, 0, self.host.primitive_state(section.cell(index)));
        }
        storage
    }

    /// Make sure `section` has storage if the host has it loaded.
    fn ensure_section(&mut self, section: SectionPos) -> bool {
        if self.sections.contains_key(&section) {
            return true;
        }
        if !self.host.is_section_loaded(section) {
            return false;
        }
        let storage = self.fresh_storage(section);
        self.sections.insert(section, storage);
        true
    }

    /// Mark `pos` for evaluation next step. Ignored in unloaded sections.
    fn track(&mut self, pos: CellPos) -> bool {
        let section = pos.section();
        if !self.ensure_section(section) {
            return false;
        }
        self.sections
            .get_mut(&section)
            .is_some_and(|storage| storage.tracked_mut().insert(pos.local_index()))
    }

    /// Register the 3D Moore neighborhood of every seedable cell. Returns the
    /// number of seed cells.
    fn seed_section(&mut self, section: SectionPos) -> usize {
        let Some(storage) = self.sections.get(&section) else {
            return 0;
        };
        let seed_empty = self.config.seed_empty_cells;
        let seeds: Vec<CellPos> = (0..CELLS_PER_SECTION)
            .filter(|&index| {
                let primitive = storage.get(index, 0);
                (primitive != 0 || seed_empty) && self.rule.tracked(primitive)
            })
            .map(|index| section.cell(index))
            .collect();
        for pos in &seeds {
            for offset in neighbors::MOORE_3D_SELF {
                self.track(*pos + *offset);
            }
        }
        seeds.len()
    }
}

/// Rewrite the slots of `action` through `remap`. Returns false if the action
/// is guarded by a state that no longer exists.
fn remap_action(action: &mut Action, remap: &BTreeMap<usize, usize>) -> bool {
    if let Some(conditions) = &action.conditions {
        let mut mapped = ChannelMap::new();
        for (slot, value) in conditions {
            match remap.get(slot) {
                Some(new_slot) => {
                    mapped.insert(*new_slot, *value);
                }
                None => return false,
            }
        }
        action.conditions = Some(mapped);
    }
    action.updated = std::mem::take(&mut action.updated)
        .into_iter()
        .filter_map(|(slot, value)| remap.get(&slot).map(|new_slot| (*new_slot, value)))
        .collect();
    true
}

impl<H: WorldHost> fmt::Debug for LazyWorld<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyWorld")
            .field("tick", &self.current_tick)
            .field("sections", &self.sections.len())
            .field("tracked", &self.tracked_cell_count())
            .field("scheduled", &self.wheel.len())
            .field("states", &self.rule.states())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryWorld;
    use voxel_ca_core::{CellOutcome, Offset, Query, StateName};

    /// Sand-like rule: a non-air block above air falls one cell.
    struct Fall;

    impl CellRule for Fall {
        fn process(&self, query: &dyn Query) -> CellOutcome {
            let below = Offset::new(0, -1, 0);
            if query.state(0) != 0 && query.state_at(below, 0) == 0 {
                return Action::update(ChannelMap::from([(0, 0)])).into();
            }
            if query.state(0) == 0 && query.state_at(Offset::new(0, 1, 0), 0) != 0 {
                return Action::update(ChannelMap::from([(0, query.state_at(Offset::new(0, 1, 0), 0))]))
                    .into();
            }
            CellOutcome::Idle
        }

        fn tracked(&self, _primitive: i64) -> bool {
            true
        }

        fn states(&self) -> &[StateName] {
            &[]
        }
    }

    fn falling_world() -> LazyWorld<MemoryWorld> {
        let host = MemoryWorld::new().with_block(CellPos::new(2, 5, 2), 7);
        LazyWorld::register(host, Arc::new(Fall), EngineConfig::fast()).unwrap()
    }

    #[test]
    fn test_register_seeds_moore_cube() {
        let world = falling_world();
        assert_eq!(world.tracked_cell_count(), 27);
        assert_eq!(
            world.section_lifecycle(SectionPos::new(0, 0, 0)),
            SectionLifecycle::Active
        );
    }

    #[test]
    fn test_block_falls_one_cell_per_tick() {
        let mut world = falling_world();
        let report = world.tick();
        assert_eq!(report.modified_cells, 2);
        assert_eq!(world.host().block(CellPos::new(2, 5, 2)), 0);
        assert_eq!(world.host().block(CellPos::new(2, 4, 2)), 7);

        world.tick();
        assert_eq!(world.host().block(CellPos::new(2, 3, 2)), 7);
        assert_eq!(world.host().non_air_blocks().len(), 1);
    }

    #[test]
    fn test_changes_flushed_per_section() {
        let mut world = falling_world();
        world.tick();
        let updates = world.host_mut().take_updates();
        assert_eq!(updates.len(), 1);
        let mut records = updates[0].records.clone();
        records.sort();
        assert_eq!(
            records,
            vec![
                coords::encode_change(CellPos::new(2, 5, 2), 0),
                coords::encode_change(CellPos::new(2, 4, 2), 7),
            ]
        );
    }

    #[test]
    fn test_unload_drops_storage() {
        let mut world = falling_world();
        world.host_mut().unload_section(SectionPos::new(0, 0, 0));
        world.handle_section_unload(SectionPos::new(0, 0, 0));
        assert_eq!(world.tracked_cell_count(), 0);
        assert_eq!(
            world.section_lifecycle(SectionPos::new(0, 0, 0)),
            SectionLifecycle::Unloaded
        );

        let report = world.tick();
        assert_eq!(report.processed_cells, 0);
        assert_eq!(world.host().block(CellPos::new(2, 5, 2)), 7);
    }

    #[test]
    fn test_history_window() {
        let mut world = falling_world();
        world.run_ticks(12);
        assert_eq!(world.tick_history().len(), 8);
        assert_eq!(world.tick_history()[0].tick, 4);
        assert_eq!(world.tick_count(), 12);
    }

    #[test]
    fn test_steps_per_tick() {
        let host = MemoryWorld::new().with_block(CellPos::new(2, 5, 2), 7);
        let config = EngineConfig {
            steps_per_tick: 3,
            ..EngineConfig::fast()
        };
        let mut world = LazyWorld::register(host, Arc::new(Fall), config).unwrap();
        let report = world.tick();
        assert_eq!(report.steps, 3);
        assert_eq!(world.host().block(CellPos::new(2, 2, 2)), 7);
    }

    #[test]
    fn test_inspect_reports_block() {
        let world = falling_world();
        let channels = world.inspect(CellPos::new(2, 5, 2));
        assert_eq!(channels.get(PRIMITIVE_CHANNEL), Some(&7));
        assert_eq!(channels.len(), 1);
    }
}
