//! Dirt that turns into grass once it has been left alone long enough.

use voxel_ca_core::{Action, BlockPalette, CellOutcome, CellRule, ChannelMap, Query, StateName};

use crate::error::{AutomatonError, AutomatonResult};

/// Ticks a dirt block must stay dirt before it becomes grass.
pub const GROW_DELAY: u32 = 25;

/// Schedules every tracked dirt block to become grass after [`GROW_DELAY`]
/// ticks. The change is dropped if the cell is no longer dirt when it is due.
#[derive(Debug, Clone)]
pub struct GrassGrow {
    dirt: i64,
    grass: i64,
}

impl GrassGrow {
    pub fn new(dirt: i64, grass: i64) -> Self {
        Self { dirt, grass }
    }

    /// Resolve `dirt` and `grass_block` from `palette`.
    pub fn from_palette(palette: &BlockPalette) -> AutomatonResult<Self> {
        let lookup = |name: &str| {
            palette.resolve(name).ok_or_else(|| AutomatonError::UnknownState {
                name: name.to_string(),
            })
        };
        Ok(Self::new(lookup("dirt")?, lookup("grass_block")?))
    }
}

impl CellRule for GrassGrow {
    fn process(&self, query: &dyn Query) -> CellOutcome {
        if query.state(0) != self.dirt {
            return CellOutcome::Idle;
        }
        Action::conditional_schedule(
            GROW_DELAY,
            ChannelMap::from([(0, self.dirt)]),
            ChannelMap::from([(0, self.grass)]),
        )
        .into()
    }

    fn tracked(&self, primitive: i64) -> bool {
        primitive == self.dirt
    }

    fn states(&self) -> &[StateName] {
        &[]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxel_ca_core::{NeighborhoodSnapshot, Offset};

    #[test]
    fn test_dirt_schedules_guarded_growth() {
        let rule = GrassGrow::from_palette(&BlockPalette::builtin()).unwrap();
        let snapshot = NeighborhoodSnapshot::new(1, 1).with(Offset::SELF, 0, rule.dirt);

        let actions = rule.process(&snapshot).into_actions();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].schedule_delay, GROW_DELAY);
        assert_eq!(actions[0].conditions, Some(ChannelMap::from([(0, rule.dirt)])));
        assert_eq!(actions[0].updated, ChannelMap::from([(0, rule.grass)]));
    }

    #[test]
    fn test_other_blocks_idle() {
        let rule = GrassGrow::from_palette(&BlockPalette::builtin()).unwrap();
        let grass = NeighborhoodSnapshot::new(1, 1).with(Offset::SELF, 0, rule.grass);
        assert!(rule.process(&grass).is_idle());
        assert!(rule.tracked(rule.dirt));
        assert!(!rule.tracked(rule.grass));
    }
}
