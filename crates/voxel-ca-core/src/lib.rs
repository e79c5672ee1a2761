//! Core domain types for rule-driven voxel cellular automata.
//!
//! ## Core Concepts
//!
//! - **Cell**: a voxel position carrying one primitive block id (slot 0) and
//!   any number of auxiliary integer channels (slots 1..)
//! - **Section**: a 16x16x16 block of cells, the unit of storage and tracking
//! - **Query**: a read-only view of the channels around one cell
//! - **CellRule**: a compiled rule that turns a query into zero or more actions
//! - **Action**: a buffered, possibly delayed and guarded, write to one cell
//!
//! The [`BlockPalette`] maps material names used in rule source to primitive
//! ids.

pub mod coords;
mod error;
pub mod neighbors;
mod palette;
mod query;
mod rule;

pub use coords::{CellPos, Offset, SectionPos, CELLS_PER_SECTION, SECTION_SIZE};
pub use error::{CoreError, CoreResult};
pub use palette::{BlockDefinition, BlockPalette, BlockProperty, AIR};
pub use query::{NeighborhoodSnapshot, Query, ShiftedQuery};
pub use rule::{
    Action, CellOutcome, CellRule, ChannelMap, JoinedRule, StateName, TrackedTable,
    TriggeredEvent, TRACKED_TABLE_LIMIT,
};
