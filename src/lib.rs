//! Simulation core for TR-style room and sector 3D worlds
//!
//! Rooms are grids of sectors linked by portals and by vertical sector
//! links. Objects live in exactly one room, physics pairs are filtered by
//! room adjacency, and the `game::Engine` advances everything in fixed steps
//! fed by wall-clock frame time.

/// Version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod config;
pub mod console;
pub mod game;
pub mod logging;
pub mod render;
pub mod world;
