//! Read-only cell queries used by rules during evaluation.

use serde::{Deserialize, Serialize};

use crate::coords::Offset;

/// Read access to the multi-channel state around one cell.
///
/// Implementations answer from pre-tick state only. Slot `0` is the
/// primitive block channel; higher slots are auxiliary integer channels.
/// Reads of channels that do not exist return `0`.
pub trait Query {
    /// Value of `slot` at the cell displaced by `offset`.
    fn state_at(&self, offset: Offset, slot: usize) -> i64;

    /// Number of channels stored per cell.
    fn channel_count(&self) -> usize;

    /// Value of `slot` at the queried cell.
    fn state(&self, slot: usize) -> i64 {
        self.state_at(Offset::SELF, slot)
    }

    /// All channels of the cell displaced by `offset`.
    fn channels_at(&self, offset: Offset) -> Vec<i64> {
        (0..self.channel_count())
            .map(|slot| self.state_at(offset, slot))
            .collect()
    }

    /// Count neighbors among `offsets` whose `slot` satisfies `predicate`.
    fn count_neighbors(
        &self,
        slot: usize,
        offsets: &[Offset],
        predicate: &dyn Fn(i64) -> bool,
    ) -> usize {
        offsets
            .iter()
            .filter(|&&offset| predicate(self.state_at(offset, slot)))
            .count()
    }

    /// Like [`Query::count_neighbors`] but stops once `limit` matches are seen.
    fn count_neighbors_limit(
        &self,
        slot: usize,
        offsets: &[Offset],
        predicate: &dyn Fn(i64) -> bool,
        limit: usize,
    ) -> usize {
        let mut count = 0;
        for &offset in offsets {
            if count >= limit {
                break;
            }
            if predicate(self.state_at(offset, slot)) {
                count += 1;
            }
        }
        count
    }
}

/// A query re-centered on a neighbor of another query.
pub struct ShiftedQuery<'a> {
    inner: &'a dyn Query,
    origin: Offset,
}

impl<'a> ShiftedQuery<'a> {
    pub fn new(inner: &'a dyn Query, origin: Offset) -> Self {
        Self { inner, origin }
    }
}

impl Query for ShiftedQuery<'_> {
    fn state_at(&self, offset: Offset, slot: usize) -> i64 {
        let shifted = Offset::new(
            self.origin.x.wrapping_add(offset.x),
            self.origin.y.wrapping_add(offset.y),
            self.origin.z.wrapping_add(offset.z),
        );
        self.inner.state_at(shifted, slot)
    }

    fn channel_count(&self) -> usize {
        self.inner.channel_count()
    }
}

/// Dense copy of a cubic window around a cell.
///
/// Values are stored channel-major; inside a channel the x axis varies
/// fastest, then y, then z. Reads outside the window return `0`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeighborhoodSnapshot {
    radius: i32,
    channels: usize,
    values: Vec<i64>,
}

impl NeighborhoodSnapshot {
    /// Create an all-zero window of the given radius.
    pub fn new(radius: u32, channels: usize) -> Self {
        let radius = radius as i32;
        let side = (2 * radius + 1) as usize;
        let channels = channels.max(1);
        Self {
            radius,
            channels,
            values: vec![0; side * side * side * channels],
        }
    }

    /// Capture a window from any query.
    pub fn capture(query: &dyn Query, radius: u32) -> Self {
        let mut snapshot = Self::new(radius, query.channel_count());
        let r = snapshot.radius;
        for z in -r..=r {
            for y in -r..=r {
                for x in -r..=r {
                    let offset = Offset::new(x, y, z);
                    for slot in 0..snapshot.channels {
                        snapshot.set(offset, slot, query.state_at(offset, slot));
                    }
                }
            }
        }
        snapshot
    }

    /// Builder form of [`NeighborhoodSnapshot::set`].
    pub fn with(mut self, offset: Offset, slot: usize, value: i64) -> Self {
        self.set(offset, slot, value);
        self
    }

    /// Write one value; writes outside the window are ignored.
    pub fn set(&mut self, offset: Offset, slot: usize, value: i64) {
        if let Some(index) = self.index(offset, slot) {
            self.values[index] = value;
        }
    }

    pub fn radius(&self) -> u32 {
        self.radius as u32
    }

    /// Cells along one edge of the window.
    pub fn side(&self) -> usize {
        (2 * self.radius + 1) as usize
    }

    /// Number of cells in the window.
    pub fn volume(&self) -> usize {
        let side = self.side();
        side * side * side
    }

    /// Flattened primitive channel, in kernel neighbor-table order.
    pub fn primitive_buffer(&self) -> &[i64] {
        &self.values[..self.volume()]
    }

    /// Position of `offset` in the flattened window, if inside.
    pub fn cell_index(&self, offset: Offset) -> Option<usize> {
        if offset.radius() > self.radius {
            return None;
        }
        let side = self.side() as i32;
        let r = self.radius;
        Some((((offset.z + r) * side + (offset.y + r)) * side + (offset.x + r)) as usize)
    }

    fn index(&self, offset: Offset, slot: usize) -> Option<usize> {
        if slot >= self.channels {
            return None;
        }
        self.cell_index(offset)
            .map(|cell| slot * self.volume() + cell)
    }
}

impl Query for NeighborhoodSnapshot {
    fn state_at(&self, offset: Offset, slot: usize) -> i64 {
        self.index(offset, slot)
            .map(|i| self.values[i])
            .unwrap_or(0)
    }

    fn channel_count(&self) -> usize {
        self.channels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neighbors::MOORE_2D;

    #[test]
    fn test_snapshot_reads_and_bounds() {
        let snapshot = NeighborhoodSnapshot::new(1, 2)
            .with(Offset::new(1, 0, 0), 0, 7)
            .with(Offset::SELF, 1, 3)
            .with(Offset::new(2, 0, 0), 0, 99);

        assert_eq!(snapshot.state_at(Offset::new(1, 0, 0), 0), 7);
        assert_eq!(snapshot.state(1), 3);
        assert_eq!(snapshot.state_at(Offset::new(2, 0, 0), 0), 0);
        assert_eq!(snapshot.state(5), 0);
        assert_eq!(snapshot.channels_at(Offset::SELF), vec![0, 3]);
    }

    #[test]
    fn test_primitive_buffer_order() {
        let snapshot = NeighborhoodSnapshot::new(1, 1)
            .with(Offset::new(-1, -1, -1), 0, 1)
            .with(Offset::new(0, -1, -1), 0, 2)
            .with(Offset::new(-1, 0, -1), 0, 3)
            .with(Offset::new(-1, -1, 0), 0, 4);
        let buffer = snapshot.primitive_buffer();
        assert_eq!(buffer.len(), 27);
        assert_eq!(buffer[0], 1);
        assert_eq!(buffer[1], 2);
        assert_eq!(buffer[3], 3);
        assert_eq!(buffer[9], 4);
    }

    #[test]
    fn test_count_neighbors() {
        let mut snapshot = NeighborhoodSnapshot::new(1, 1);
        for offset in &MOORE_2D[..3] {
            snapshot.set(*offset, 0, 5);
        }
        assert_eq!(snapshot.count_neighbors(0, MOORE_2D, &|v| v == 5), 3);
        assert_eq!(snapshot.count_neighbors_limit(0, MOORE_2D, &|v| v == 5, 2), 2);
    }

    #[test]
    fn test_shifted_query() {
        let snapshot = NeighborhoodSnapshot::new(1, 1).with(Offset::new(1, 0, 0), 0, 4);
        let shifted = ShiftedQuery::new(&snapshot, Offset::new(1, 0, 0));
        assert_eq!(shifted.state(0), 4);
        assert_eq!(shifted.state_at(Offset::new(-1, 0, 0), 0), 0);
    }
}
