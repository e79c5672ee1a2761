//! Native rules written directly against [`voxel_ca_core::CellRule`].

mod grass;
mod pusher;

pub use grass::{GrassGrow, GROW_DELAY};
pub use pusher::{BlockPusher, Direction, DIRECTION_SLOT, STRENGTH_SLOT};
