//! Core geometry types for TR-style levels
//!
//! Rooms contain a 2D grid of sectors on the XZ plane (Y is up).
//! Every cross reference (sector -> room, sector -> sector above/below) is a
//! key into the owning `RoomGraph`, so rebuilding the graph on level reload
//! can never leave a dangling link behind.

use std::fmt;

use rapier3d::prelude::*;
use serde::{Serialize, Deserialize};

use crate::game::ObjectId;
use super::level::StaticMeshDesc;

/// Sector size in world units
pub const SECTOR_SIZE: Real = 1024.0;

/// Index of a room inside its `RoomGraph`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub u32);

impl RoomId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lookup key for a single sector: owning room plus grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SectorRef {
    pub room: RoomId,
    pub x: usize,
    pub z: usize,
}

/// Axis-aligned bounding box (world space)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Point<Real>,
    pub max: Point<Real>,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::new(Point::origin(), Point::origin())
    }
}

impl Aabb {
    pub fn new(min: Point<Real>, max: Point<Real>) -> Self {
        Self { min, max }
    }

    /// An inverted box that any `expand` call will overwrite.
    pub fn empty() -> Self {
        Self::new(
            point![Real::MAX, Real::MAX, Real::MAX],
            point![Real::MIN, Real::MIN, Real::MIN],
        )
    }

    /// Check if a point is inside the box (inclusive on all faces)
    pub fn contains(&self, p: &Point<Real>) -> bool {
        p.x >= self.min.x && p.x <= self.max.x
            && p.y >= self.min.y && p.y <= self.max.y
            && p.z >= self.min.z && p.z <= self.max.z
    }

    /// Check if two boxes overlap or are closer than `margin` on every axis
    pub fn touches(&self, other: &Aabb, margin: Real) -> bool {
        self.min.x <= other.max.x + margin && other.min.x <= self.max.x + margin
            && self.min.y <= other.max.y + margin && other.min.y <= self.max.y + margin
            && self.min.z <= other.max.z + margin && other.min.z <= self.max.z + margin
    }

    /// Expand bounds to include a point
    pub fn expand(&mut self, p: &Point<Real>) {
        self.min = self.min.inf(p);
        self.max = self.max.sup(p);
    }

    pub fn center(&self) -> Point<Real> {
        rapier3d::na::center(&self.min, &self.max)
    }

    pub fn half_extents(&self) -> Vector<Real> {
        (self.max - self.min) * 0.5
    }
}

/// A single grid cell of a room
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sector {
    /// Floor height, relative to the room origin
    pub floor: Real,
    /// Ceiling height, relative to the room origin
    pub ceiling: Real,
    /// Room reachable through this cell (TR-style sector portal)
    #[serde(default)]
    pub portal_to_room: Option<RoomId>,

    // Filled in by `RoomGraph::build`, never serialized
    #[serde(skip)]
    pub x: usize,
    #[serde(skip)]
    pub z: usize,
    #[serde(skip)]
    pub owner: RoomId,
    #[serde(skip)]
    pub sector_below: Option<SectorRef>,
    #[serde(skip)]
    pub sector_above: Option<SectorRef>,
}

impl Default for RoomId {
    fn default() -> Self {
        RoomId(0)
    }
}

impl Sector {
    pub fn new(floor: Real, ceiling: Real) -> Self {
        Self {
            floor,
            ceiling,
            portal_to_room: None,
            x: 0,
            z: 0,
            owner: RoomId::default(),
            sector_below: None,
            sector_above: None,
        }
    }

    pub fn with_portal(mut self, target: RoomId) -> Self {
        self.portal_to_room = Some(target);
        self
    }

    /// Key for this sector in the graph
    pub fn key(&self) -> SectorRef {
        SectorRef { room: self.owner, x: self.x, z: self.z }
    }
}

/// A room in the level - contains a 2D grid of sectors
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    /// Room index, assigned by `RoomGraph::build`
    #[serde(skip)]
    pub id: RoomId,
    /// Room origin in world space (corner of sector grid)
    pub position: [Real; 3],
    /// Grid width (number of sectors in X direction)
    pub width: usize,
    /// Grid depth (number of sectors in Z direction)
    pub depth: usize,
    /// 2D array of sectors [x][z], None = solid wall cell
    pub sectors: Vec<Vec<Option<Sector>>>,
    /// Flipped variant of this room (flooded, collapsed...), inactive until flipped
    #[serde(default)]
    pub alternate: Option<RoomId>,
    /// Static meshes placed in this room
    #[serde(default)]
    pub statics: Vec<StaticMeshDesc>,

    /// The room this one is the alternate of
    #[serde(skip)]
    pub base: Option<RoomId>,
    /// Inactive rooms are skipped by point lookups
    #[serde(skip)]
    pub active: bool,
    /// World-space bounds - computed from sectors, not serialized
    #[serde(skip)]
    pub bounds: Aabb,
    /// Rooms that may interact with this one, including itself
    #[serde(skip)]
    pub near_rooms: Vec<RoomId>,
    /// Static meshes currently owned by this room
    #[serde(skip)]
    pub static_meshes: Vec<ObjectId>,
    /// Dynamic objects currently inside this room
    #[serde(skip)]
    pub objects: Vec<ObjectId>,
}

impl Room {
    /// Create a new empty room with the given grid size
    pub fn new(id: RoomId, position: [Real; 3], width: usize, depth: usize) -> Self {
        let sectors = (0..width)
            .map(|_| (0..depth).map(|_| None).collect())
            .collect();

        Self {
            id,
            position,
            width,
            depth,
            sectors,
            alternate: None,
            statics: Vec::new(),
            base: None,
            active: true,
            bounds: Aabb::default(),
            near_rooms: Vec::new(),
            static_meshes: Vec::new(),
            objects: Vec::new(),
        }
    }

    /// Room filled with flat sectors of the same floor and ceiling
    pub fn filled(id: RoomId, position: [Real; 3], width: usize, depth: usize, floor: Real, ceiling: Real) -> Self {
        let mut room = Self::new(id, position, width, depth);
        for x in 0..width {
            for z in 0..depth {
                room.set_sector(x, z, Sector::new(floor, ceiling));
            }
        }
        room
    }

    pub fn origin(&self) -> Vector<Real> {
        vector![self.position[0], self.position[1], self.position[2]]
    }

    /// Get sector at grid position (None if out of bounds or a wall)
    pub fn get_sector(&self, x: usize, z: usize) -> Option<&Sector> {
        self.sectors.get(x)?.get(z)?.as_ref()
    }

    pub fn get_sector_mut(&mut self, x: usize, z: usize) -> Option<&mut Sector> {
        self.sectors.get_mut(x)?.get_mut(z)?.as_mut()
    }

    /// Set sector at grid position (ignored when out of bounds)
    pub fn set_sector(&mut self, x: usize, z: usize, mut sector: Sector) {
        let id = self.id;
        if let Some(cell) = self.sectors.get_mut(x).and_then(|col| col.get_mut(z)) {
            sector.x = x;
            sector.z = z;
            sector.owner = id;
            *cell = Some(sector);
        }
    }

    /// Convert world position to grid coordinates
    pub fn world_to_grid(&self, world_x: Real, world_z: Real) -> Option<(usize, usize)> {
        let local_x = world_x - self.position[0];
        let local_z = world_z - self.position[2];

        if local_x < 0.0 || local_z < 0.0 {
            return None;
        }

        let grid_x = (local_x / SECTOR_SIZE) as usize;
        let grid_z = (local_z / SECTOR_SIZE) as usize;

        if grid_x < self.width && grid_z < self.depth {
            Some((grid_x, grid_z))
        } else {
            None
        }
    }

    /// World-space center of a grid cell, at the room origin height
    pub fn grid_center(&self, x: usize, z: usize) -> Point<Real> {
        point![
            self.position[0] + (x as Real + 0.5) * SECTOR_SIZE,
            self.position[1],
            self.position[2] + (z as Real + 0.5) * SECTOR_SIZE
        ]
    }

    /// World-space floor height of a sector of this room
    pub fn floor_y(&self, sector: &Sector) -> Real {
        self.position[1] + sector.floor
    }

    /// World-space ceiling height of a sector of this room
    pub fn ceiling_y(&self, sector: &Sector) -> Real {
        self.position[1] + sector.ceiling
    }

    /// Recalculate world bounds from sectors (call after loading from file)
    pub fn recalculate_bounds(&mut self) {
        let mut bounds = Aabb::empty();
        for (x, z, sector) in self.iter_sectors() {
            let corner = self.grid_center(x, z) - vector![SECTOR_SIZE * 0.5, 0.0, SECTOR_SIZE * 0.5];
            bounds.expand(&point![corner.x, self.floor_y(sector), corner.z]);
            bounds.expand(&point![
                corner.x + SECTOR_SIZE,
                self.ceiling_y(sector),
                corner.z + SECTOR_SIZE
            ]);
        }
        // A room without sectors collapses to its origin
        if bounds.min.x > bounds.max.x {
            let origin = Point::from(self.origin());
            bounds = Aabb::new(origin, origin);
        }
        self.bounds = bounds;
    }

    /// Check if a world-space point is inside this room's bounds
    pub fn contains_point(&self, point: &Point<Real>) -> bool {
        self.bounds.contains(point)
    }

    /// Iterate over all sectors with their grid coordinates
    pub fn iter_sectors(&self) -> impl Iterator<Item = (usize, usize, &Sector)> {
        self.sectors.iter().enumerate().flat_map(|(x, col)| {
            col.iter().enumerate().filter_map(move |(z, sector)| {
                sector.as_ref().map(|s| (x, z, s))
            })
        })
    }

    pub fn sector_count(&self) -> usize {
        self.iter_sectors().count()
    }
}
