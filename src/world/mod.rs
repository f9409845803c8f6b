//! World module - TR-style room and sector geometry
//!
//! Levels are made of rooms, each owning a grid of sectors. Rooms connect
//! through sector portals and stacked (vertical) sector links; the graph
//! built from them decides which rooms may interact.

mod geometry;
mod graph;
mod level;

pub use geometry::*;
pub use graph::RoomGraph;
pub use level::*;
