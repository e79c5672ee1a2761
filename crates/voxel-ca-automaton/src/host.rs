//! The boundary between the engine and the world it runs in.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::trace;
use voxel_ca_core::{coords, CellPos, SectionPos, AIR};

/// World runtime hosting an engine.
///
/// The host owns the authoritative primitive block of every cell. The engine
/// mirrors primitive changes back through [`WorldHost::set_primitive_state`]
/// and reports each section's batch of changes once per step through
/// [`WorldHost::section_changed`], after which cached section
/// representations should be considered stale.
pub trait WorldHost {
    /// Primitive block at `pos`; `0` when unknown.
    fn primitive_state(&self, pos: CellPos) -> i64;

    /// Overwrite the primitive block at `pos`.
    fn set_primitive_state(&mut self, pos: CellPos, value: i64);

    /// Whether the section is currently loaded.
    fn is_section_loaded(&self, section: SectionPos) -> bool;

    /// Every loaded section worth seeding.
    fn loaded_sections(&self) -> Vec<SectionPos>;

    /// Bulk change notification; records use `value << 12 | x << 8 | z << 4 | y`.
    fn section_changed(&mut self, section: SectionPos, records: &[i64]);
}

/// One flushed batch of section changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionUpdate {
    pub section: SectionPos,
    pub records: Vec<i64>,
}

/// In-memory world where every section counts as loaded unless unloaded
/// explicitly.
#[derive(Debug, Clone, Default)]
pub struct MemoryWorld {
    blocks: HashMap<CellPos, i64>,
    unloaded: HashSet<SectionPos>,
    updates: Vec<SectionUpdate>,
}

impl MemoryWorld {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a block without notifying anyone.
    pub fn set_block(&mut self, pos: CellPos, value: i64) {
        if value == AIR {
            self.blocks.remove(&pos);
        } else {
            self.blocks.insert(pos, value);
        }
    }

    /// Builder form of [`MemoryWorld::set_block`].
    pub fn with_block(mut self, pos: CellPos, value: i64) -> Self {
        self.set_block(pos, value);
        self
    }

    pub fn block(&self, pos: CellPos) -> i64 {
        self.blocks.get(&pos).copied().unwrap_or(AIR)
    }

    pub fn unload_section(&mut self, section: SectionPos) {
        self.unloaded.insert(section);
    }

    pub fn load_section(&mut self, section: SectionPos) {
        self.unloaded.remove(&section);
    }

    /// Positions of every non-air block, sorted.
    pub fn non_air_blocks(&self) -> Vec<(CellPos, i64)> {
        let mut blocks: Vec<(CellPos, i64)> = self.blocks.iter().map(|(p, v)| (*p, *v)).collect();
        blocks.sort();
        blocks
    }

    /// Change batches received so far.
    pub fn updates(&self) -> &[SectionUpdate] {
        &self.updates
    }

    pub fn take_updates(&mut self) -> Vec<SectionUpdate> {
        std::mem::take(&mut self.updates)
    }
}

impl WorldHost for MemoryWorld {
    fn primitive_state(&self, pos: CellPos) -> i64 {
        self.block(pos)
    }

    fn set_primitive_state(&mut self, pos: CellPos, value: i64) {
        if self.unloaded.contains(&pos.section()) {
            return;
        }
        self.set_block(pos, value);
    }

    fn is_section_loaded(&self, section: SectionPos) -> bool {
        !self.unloaded.contains(&section)
    }

    fn loaded_sections(&self) -> Vec<SectionPos> {
        let sections: BTreeSet<SectionPos> = self
            .blocks
            .keys()
            .map(CellPos::section)
            .filter(|s| !self.unloaded.contains(s))
            .collect();
        sections.into_iter().collect()
    }

    fn section_changed(&mut self, section: SectionPos, records: &[i64]) {
        for record in records {
            let ((x, y, z), value) = coords::decode_change(*record);
            trace!(%section, x, y, z, value, "section_change_record");
        }
        self.updates.push(SectionUpdate {
            section,
            records: records.to_vec(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_world_blocks() {
        let mut world = MemoryWorld::new().with_block(CellPos::new(1, 2, 3), 5);
        assert_eq!(world.primitive_state(CellPos::new(1, 2, 3)), 5);
        assert_eq!(world.primitive_state(CellPos::new(0, 0, 0)), AIR);

        world.set_primitive_state(CellPos::new(1, 2, 3), AIR);
        assert!(world.non_air_blocks().is_empty());
    }

    #[test]
    fn test_loaded_sections() {
        let mut world = MemoryWorld::new()
            .with_block(CellPos::new(1, 1, 1), 1)
            .with_block(CellPos::new(20, 1, 1), 1)
            .with_block(CellPos::new(2, 2, 2), 1);
        assert_eq!(
            world.loaded_sections(),
            vec![SectionPos::new(0, 0, 0), SectionPos::new(1, 0, 0)]
        );

        world.unload_section(SectionPos::new(1, 0, 0));
        assert!(!world.is_section_loaded(SectionPos::new(1, 0, 0)));
        assert_eq!(world.loaded_sections(), vec![SectionPos::new(0, 0, 0)]);

        world.set_primitive_state(CellPos::new(20, 1, 1), AIR);
        assert_eq!(world.block(CellPos::new(20, 1, 1)), 1);
    }
}
