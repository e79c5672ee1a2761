//! Incremental execution engine for voxel cellular automata.
//!
//! A [`LazyWorld`] runs one [`voxel_ca_core::CellRule`] over the sections of a
//! host world. Only tracked cells are evaluated; every applied action wakes a
//! set of neighbors for the next step, so quiet regions cost nothing.
//!
//! ## Step Model
//!
//! ```text
//! step = {
//!     apply queued placements,
//!     evaluate every tracked cell against the pre-step state,
//!     delayed actions -> timer wheel, wheel advances,
//!     apply buffered + due actions (stale ones dropped),
//!     register wake points, flush change records to the host,
//! }
//! ```
//!
//! The host side is the [`WorldHost`] trait; [`MemoryWorld`] is an in-memory
//! implementation for tests and demos.

pub mod config;
mod error;
mod host;
mod query;
pub mod rules;
mod storage;
pub mod timer;
mod world;

pub use config::EngineConfig;
pub use error::{AutomatonError, AutomatonResult};
pub use host::{MemoryWorld, SectionUpdate, WorldHost};
pub use query::WorldQuery;
pub use rules::{BlockPusher, Direction, GrassGrow};
pub use storage::{SectionStorage, TrackedCells};
pub use timer::{TaskHandle, TimerWheel};
pub use world::{
    CellEvent, LazyWorld, PendingAction, SectionLifecycle, TickReport, PRIMITIVE_CHANNEL,
};
