//! Query over live section storage, falling back to the host.

use indexmap::IndexMap;
use voxel_ca_core::{CellPos, Offset, Query, SectionPos};

use crate::host::WorldHost;
use crate::storage::SectionStorage;

/// Read view centered on one cell of a [`crate::LazyWorld`].
///
/// Cells in sections without storage read their primitive from the host and
/// zero for every auxiliary channel.
pub struct WorldQuery<'a, H: WorldHost> {
    sections: &'a IndexMap<SectionPos, SectionStorage>,
    host: &'a H,
    origin: CellPos,
    channels: usize,
}

impl<'a, H: WorldHost> WorldQuery<'a, H> {
    pub fn new(
        sections: &'a IndexMap<SectionPos, SectionStorage>,
        host: &'a H,
        origin: CellPos,
        channels: usize,
    ) -> Self {
        Self {
            sections,
            host,
            origin,
            channels,
        }
    }

    pub fn origin(&self) -> CellPos {
        self.origin
    }
}

impl<H: WorldHost> Query for WorldQuery<'_, H> {
    fn state_at(&self, offset: Offset, slot: usize) -> i64 {
        let pos = self.origin + offset;
        match self.sections.get(&pos.section()) {
            Some(storage) => storage.get(pos.local_index(), slot),
            None if slot == 0 => self.host.primitive_state(pos),
            None => 0,
        }
    }

    fn channel_count(&self) -> usize {
        self.channels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryWorld;

    #[test]
    fn test_reads_storage_then_host() {
        let host = MemoryWorld::new().with_block(CellPos::new(16, 0, 0), 9);
        let mut sections = IndexMap::new();
        let mut storage = SectionStorage::new(2);
        storage.set(CellPos::new(15, 0, 0).local_index(), 0, 3);
        storage.set(CellPos::new(15, 0, 0).local_index(), 1, 4);
        sections.insert(SectionPos::new(0, 0, 0), storage);

        let query = WorldQuery::new(&sections, &host, CellPos::new(15, 0, 0), 2);
        assert_eq!(query.state(0), 3);
        assert_eq!(query.state(1), 4);
        assert_eq!(query.state_at(Offset::new(1, 0, 0), 0), 9);
        assert_eq!(query.state_at(Offset::new(1, 0, 0), 1), 0);
    }
}
