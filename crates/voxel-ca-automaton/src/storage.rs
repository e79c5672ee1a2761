//! Per-section channel storage and tracked-cell sets.

use voxel_ca_core::CELLS_PER_SECTION;

const WORDS: usize = CELLS_PER_SECTION / 64;

/// Fixed 4096-bit set of tracked cell indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedCells {
    words: [u64; WORDS],
    len: usize,
}

impl Default for TrackedCells {
    fn default() -> Self {
        Self {
            words: [0; WORDS],
            len: 0,
        }
    }
}

impl TrackedCells {
    /// Mark `index`; returns true if it was not already tracked.
    pub fn insert(&mut self, index: usize) -> bool {
        let (word, bit) = (index / 64, 1u64 << (index % 64));
        if index >= CELLS_PER_SECTION || self.words[word] & bit != 0 {
            return false;
        }
        self.words[word] |= bit;
        self.len += 1;
        true
    }

    pub fn remove(&mut self, index: usize) -> bool {
        let (word, bit) = (index / 64, 1u64 << (index % 64));
        if index >= CELLS_PER_SECTION || self.words[word] & bit == 0 {
            return false;
        }
        self.words[word] &= !bit;
        self.len -= 1;
        true
    }

    pub fn contains(&self, index: usize) -> bool {
        index < CELLS_PER_SECTION && self.words[index / 64] & (1u64 << (index % 64)) != 0
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Tracked indices in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(w, &word)| {
            let mut bits = word;
            std::iter::from_fn(move || {
                if bits == 0 {
                    return None;
                }
                let bit = bits.trailing_zeros() as usize;
                bits &= bits - 1;
                Some(w * 64 + bit)
            })
        })
    }

    /// Take every tracked index, leaving the set empty.
    pub fn drain(&mut self) -> Vec<usize> {
        let cells: Vec<usize> = self.iter().collect();
        self.words = [0; WORDS];
        self.len = 0;
        cells
    }
}

/// Dense channel storage for one section.
///
/// Values are channel-major: slot `s` of cell `i` lives at `s * 4096 + i`.
#[derive(Debug, Clone)]
pub struct SectionStorage {
    channels: usize,
    values: Vec<i64>,
    tracked: TrackedCells,
}

impl SectionStorage {
    /// Zeroed storage with `channels` slots per cell (at least one).
    pub fn new(channels: usize) -> Self {
        let channels = channels.max(1);
        Self {
            channels,
            values: vec![0; channels * CELLS_PER_SECTION],
            tracked: TrackedCells::default(),
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels
    }

    /// Value of `slot` at `index`; missing channels read as zero.
    pub fn get(&self, index: usize, slot: usize) -> i64 {
        if slot >= self.channels || index >= CELLS_PER_SECTION {
            return 0;
        }
        self.values[slot * CELLS_PER_SECTION + index]
    }

    /// Write `slot` at `index`, returning the previous value.
    /// Writes to missing channels are ignored.
    pub fn set(&mut self, index: usize, slot: usize, value: i64) -> i64 {
        if slot >= self.channels || index >= CELLS_PER_SECTION {
            return value;
        }
        std::mem::replace(&mut self.values[slot * CELLS_PER_SECTION + index], value)
    }

    /// Reset every channel of `index` to zero. Returns true if anything changed.
    pub fn clear_cell(&mut self, index: usize) -> bool {
        let mut changed = false;
        for slot in 0..self.channels {
            changed |= self.set(index, slot, 0) != 0;
        }
        changed
    }

    /// All channels of `index`, slot order.
    pub fn channels_of(&self, index: usize) -> Vec<i64> {
        (0..self.channels).map(|slot| self.get(index, slot)).collect()
    }

    pub fn tracked(&self) -> &TrackedCells {
        &self.tracked
    }

    pub fn tracked_mut(&mut self) -> &mut TrackedCells {
        &mut self.tracked
    }

    /// Rebuild the channel layout: new slot `s` takes old slot `mapping[s]`,
    /// or zeros when `None`.
    pub fn migrate(&mut self, mapping: &[Option<usize>]) {
        let channels = mapping.len().max(1);
        let mut values = vec![0; channels * CELLS_PER_SECTION];
        for (slot, source) in mapping.iter().enumerate() {
            let Some(source) = *source else {
                continue;
            };
            if source >= self.channels {
                continue;
            }
            let from = source * CELLS_PER_SECTION;
            let to = slot * CELLS_PER_SECTION;
            values[to..to + CELLS_PER_SECTION]
                .copy_from_slice(&self.values[from..from + CELLS_PER_SECTION]);
        }
        self.channels = channels;
        self.values = values;
    }
}
