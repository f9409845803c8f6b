//! Room graph: near-room relation, vertical sector links and point lookup
//!
//! Built once per level load. Two distinct rooms are *near* when their bounds
//! touch and a portal or vertical sector link joins them. Flipped alternates
//! share their base room's connections but are never near the base itself.

use rapier3d::prelude::*;

use super::geometry::{Room, RoomId, Sector, SectorRef};

/// Max height difference for a ceiling and floor to count as the same plane
const VERTICAL_LINK_EPSILON: Real = 1.0;

/// Rooms of one level plus the precomputed near table
#[derive(Debug, Clone, Default)]
pub struct RoomGraph {
    rooms: Vec<Room>,
    /// Row-major `len x len` table
    near: Vec<bool>,
}

impl RoomGraph {
    /// Take ownership of the rooms and compute everything derived from them.
    /// `margin` is the slack allowed between touching bounds.
    pub fn build(mut rooms: Vec<Room>, margin: Real) -> Self {
        let count = rooms.len();

        for (i, room) in rooms.iter_mut().enumerate() {
            let id = RoomId(i as u32);
            room.id = id;
            room.base = None;
            room.active = true;
            room.near_rooms.clear();
            room.objects.clear();
            room.static_meshes.clear();
            for (x, col) in room.sectors.iter_mut().enumerate() {
                for (z, cell) in col.iter_mut().enumerate() {
                    if let Some(sector) = cell {
                        sector.x = x;
                        sector.z = z;
                        sector.owner = id;
                        sector.sector_above = None;
                        sector.sector_below = None;
                    }
                }
            }
        }

        // Alternates start out inactive
        for i in 0..count {
            if let Some(alt) = rooms[i].alternate {
                if alt.index() < count && alt.index() != i {
                    rooms[alt.index()].base = Some(RoomId(i as u32));
                    rooms[alt.index()].active = false;
                }
            }
        }

        for room in &mut rooms {
            room.recalculate_bounds();
        }

        link_vertical_sectors(&mut rooms);

        let near = compute_near_table(&rooms, margin);
        for (i, room) in rooms.iter_mut().enumerate() {
            room.near_rooms = (0..count)
                .filter(|&j| near[i * count + j])
                .map(|j| RoomId(j as u32))
                .collect();
        }

        Self { rooms, near }
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    pub fn rooms(&self) -> &[Room] {
        &self.rooms
    }

    pub fn room(&self, id: RoomId) -> Option<&Room> {
        self.rooms.get(id.index())
    }

    pub fn room_mut(&mut self, id: RoomId) -> Option<&mut Room> {
        self.rooms.get_mut(id.index())
    }

    pub fn sector(&self, key: SectorRef) -> Option<&Sector> {
        self.room(key.room)?.get_sector(key.x, key.z)
    }

    /// Whether objects in `a` and `b` may interact. Reflexive and symmetric.
    pub fn are_near(&self, a: RoomId, b: RoomId) -> bool {
        if a == b {
            return true;
        }
        let n = self.rooms.len();
        if a.index() >= n || b.index() >= n {
            return false;
        }
        self.near[a.index() * n + b.index()]
    }

    /// The currently active room of an alternate pair
    pub fn active_variant(&self, id: RoomId) -> Option<RoomId> {
        let room = self.room(id)?;
        if room.active {
            return Some(id);
        }
        [room.base, room.alternate]
            .into_iter()
            .flatten()
            .find(|&other| self.room(other).is_some_and(|r| r.active))
    }

    /// Swap which room of an alternate pair is active.
    /// Returns `(deactivated, activated)`, or `None` if the room has no alternate.
    pub fn swap_active(&mut self, id: RoomId) -> Option<(RoomId, RoomId)> {
        let room = self.room(id)?;
        let base = room.base.unwrap_or(id);
        let alt = self.room(base)?.alternate?;
        if self.room(alt).is_none() || alt == base {
            return None;
        }

        let (from, to) = if self.rooms[base.index()].active { (base, alt) } else { (alt, base) };
        self.rooms[from.index()].active = false;
        self.rooms[to.index()].active = true;
        Some((from, to))
    }

    /// Locate the sector containing `point`, starting from a hint room.
    ///
    /// Tries the hint room (following portals and vertical links), then the
    /// hint room's near rooms, then every active room.
    pub fn sector_at(&self, point: &Point<Real>, hint: Option<RoomId>) -> Option<SectorRef> {
        if let Some(hint) = hint.and_then(|h| self.active_variant(h)) {
            if let Some(found) = self.resolve_in_room(hint, point) {
                return Some(found);
            }
            let near = &self.rooms[hint.index()].near_rooms;
            if let Some(found) = near.iter()
                .filter(|&&n| n != hint)
                .find_map(|&n| self.resolve_in_room(n, point))
            {
                return Some(found);
            }
        }

        self.rooms.iter()
            .filter(|r| r.active)
            .find_map(|r| self.resolve_in_room(r.id, point))
    }

    pub fn room_at(&self, point: &Point<Real>, hint: Option<RoomId>) -> Option<RoomId> {
        self.sector_at(point, hint).map(|s| s.room)
    }

    fn cell_contains(&self, id: RoomId, point: &Point<Real>) -> bool {
        self.room(id).is_some_and(|room| {
            room.active
                && room.contains_point(point)
                && room.world_to_grid(point.x, point.z)
                    .and_then(|(x, z)| room.get_sector(x, z))
                    .is_some()
        })
    }

    fn resolve_in_room(&self, start: RoomId, point: &Point<Real>) -> Option<SectorRef> {
        let mut current = start;
        // Every hop lands in a different room, so this bounds portal cycles
        for _ in 0..=self.rooms.len() {
            let room = self.room(current)?;
            if !room.active || !room.contains_point(point) {
                return None;
            }
            let (x, z) = room.world_to_grid(point.x, point.z)?;
            let sector = room.get_sector(x, z)?;

            if let Some(target) = sector.portal_to_room.and_then(|t| self.active_variant(t)) {
                if target != current && self.cell_contains(target, point) {
                    current = target;
                    continue;
                }
            }

            let link = if point.y < room.floor_y(sector) {
                sector.sector_below
            } else if point.y > room.ceiling_y(sector) {
                sector.sector_above
            } else {
                None
            };
            match link.and_then(|l| self.active_variant(l.room)) {
                Some(next) if next != current => current = next,
                _ => return Some(sector.key()),
            }
        }
        None
    }
}

/// Pair up sectors whose ceiling sits on another room's floor at the same XZ
/// cell center. Links to alternates only fill slots nothing else claimed.
fn link_vertical_sectors(rooms: &mut [Room]) {
    let mut links: Vec<(SectorRef, SectorRef)> = Vec::new();

    for lower in rooms.iter() {
        for (x, z, sector) in lower.iter_sectors() {
            let center = lower.grid_center(x, z);
            let ceiling = lower.ceiling_y(sector);
            for upper in rooms.iter() {
                if upper.id == lower.id || group_of(rooms, upper.id) == group_of(rooms, lower.id) {
                    continue;
                }
                let Some((ux, uz)) = upper.world_to_grid(center.x, center.z) else { continue };
                let Some(above) = upper.get_sector(ux, uz) else { continue };
                if (upper.floor_y(above) - ceiling).abs() <= VERTICAL_LINK_EPSILON {
                    links.push((sector.key(), above.key()));
                }
            }
        }
    }

    for (below, above) in links {
        let above_is_alt = rooms[above.room.index()].base.is_some();
        let below_is_alt = rooms[below.room.index()].base.is_some();

        if let Some(sector) = rooms[below.room.index()].get_sector_mut(below.x, below.z) {
            if sector.sector_above.is_none() || !above_is_alt {
                sector.sector_above = Some(above);
            }
        }
        if let Some(sector) = rooms[above.room.index()].get_sector_mut(above.x, above.z) {
            if sector.sector_below.is_none() || !below_is_alt {
                sector.sector_below = Some(below);
            }
        }
    }
}

fn group_of(rooms: &[Room], id: RoomId) -> RoomId {
    rooms.get(id.index()).and_then(|r| r.base).unwrap_or(id)
}

fn compute_near_table(rooms: &[Room], margin: Real) -> Vec<bool> {
    let n = rooms.len();

    // Connectivity between alternate groups, from portals and vertical links
    let mut connected = vec![false; n * n];
    for room in rooms {
        let from = group_of(rooms, room.id).index();
        for (_, _, sector) in room.iter_sectors() {
            let targets = [
                sector.portal_to_room,
                sector.sector_above.map(|s| s.room),
                sector.sector_below.map(|s| s.room),
            ];
            for target in targets.into_iter().flatten() {
                if target.index() >= n {
                    continue;
                }
                let to = group_of(rooms, target).index();
                connected[from * n + to] = true;
                connected[to * n + from] = true;
            }
        }
    }

    let mut near = vec![false; n * n];
    for a in 0..n {
        near[a * n + a] = true;
        for b in (a + 1)..n {
            let ga = group_of(rooms, RoomId(a as u32)).index();
            let gb = group_of(rooms, RoomId(b as u32)).index();
            let is_near = ga != gb
                && connected[ga * n + gb]
                && rooms[a].bounds.touches(&rooms[b].bounds, margin);
            near[a * n + b] = is_near;
            near[b * n + a] = is_near;
        }
    }
    near
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::create_test_level;

    const ROOM_A: RoomId = RoomId(0);
    const ROOM_B: RoomId = RoomId(1);
    const ROOM_C: RoomId = RoomId(2);
    const ROOM_A_FLOODED: RoomId = RoomId(3);
    const ROOM_E: RoomId = RoomId(4);

    fn test_graph() -> RoomGraph {
        RoomGraph::build(create_test_level().rooms, 16.0)
    }

    #[test]
    fn test_near_relation_is_reflexive_and_symmetric() {
        let graph = test_graph();
        for a in 0..graph.len() as u32 {
            assert!(graph.are_near(RoomId(a), RoomId(a)));
            for b in 0..graph.len() as u32 {
                assert_eq!(graph.are_near(RoomId(a), RoomId(b)), graph.are_near(RoomId(b), RoomId(a)));
            }
        }
    }

    #[test]
    fn test_portal_and_vertical_neighbors_are_near() {
        let graph = test_graph();
        assert!(graph.are_near(ROOM_A, ROOM_B));
        assert!(graph.are_near(ROOM_B, ROOM_E));
        assert!(!graph.are_near(ROOM_A, ROOM_C));
        assert!(!graph.are_near(ROOM_A, ROOM_E));
    }

    #[test]
    fn test_alternate_inherits_connections_but_not_base() {
        let graph = test_graph();
        assert!(!graph.room(ROOM_A_FLOODED).unwrap().active);
        assert_eq!(graph.room(ROOM_A_FLOODED).unwrap().base, Some(ROOM_A));
        assert!(graph.are_near(ROOM_A_FLOODED, ROOM_B));
        assert!(!graph.are_near(ROOM_A_FLOODED, ROOM_A));
    }

    #[test]
    fn test_unknown_room_is_never_near() {
        let graph = test_graph();
        assert!(!graph.are_near(ROOM_A, RoomId(99)));
        assert!(graph.are_near(RoomId(99), RoomId(99)));
    }

    #[test]
    fn test_vertical_links() {
        let graph = test_graph();
        let below = graph.room(ROOM_B).unwrap().get_sector(1, 2).unwrap();
        let above = below.sector_above.expect("B should link up into E");
        assert_eq!(above, SectorRef { room: ROOM_E, x: 1, z: 2 });
        assert_eq!(graph.sector(above).unwrap().sector_below, Some(below.key()));
    }

    #[test]
    fn test_sector_at_uses_hint_and_falls_back() {
        let graph = test_graph();
        let in_a = point![3500.0, 512.0, 2048.0];
        let in_b = point![4200.0, 512.0, 2048.0];
        let in_e = point![4200.0, 2600.0, 2048.0];

        assert_eq!(graph.room_at(&in_a, Some(ROOM_A)), Some(ROOM_A));
        assert_eq!(graph.room_at(&in_b, Some(ROOM_A)), Some(ROOM_B));
        assert_eq!(graph.room_at(&in_e, Some(ROOM_B)), Some(ROOM_E));
        // Hint far away still resolves through the full search
        assert_eq!(graph.room_at(&in_b, Some(ROOM_C)), Some(ROOM_B));
        assert_eq!(graph.room_at(&in_b, None), Some(ROOM_B));
        assert_eq!(graph.room_at(&point![-5000.0, 0.0, 0.0], Some(ROOM_A)), None);
    }

    #[test]
    fn test_sector_at_returns_grid_cell() {
        let graph = test_graph();
        let found = graph.sector_at(&point![1100.0, 10.0, 3000.0], None).unwrap();
        assert_eq!(found, SectorRef { room: ROOM_A, x: 1, z: 2 });
    }

    #[test]
    fn test_swap_active_flips_lookup() {
        let mut graph = test_graph();
        let p = point![1000.0, 512.0, 1000.0];
        assert_eq!(graph.room_at(&p, None), Some(ROOM_A));

        assert_eq!(graph.swap_active(ROOM_A), Some((ROOM_A, ROOM_A_FLOODED)));
        assert_eq!(graph.room_at(&p, Some(ROOM_A)), Some(ROOM_A_FLOODED));
        assert_eq!(graph.active_variant(ROOM_A), Some(ROOM_A_FLOODED));

        assert_eq!(graph.swap_active(ROOM_A_FLOODED), Some((ROOM_A_FLOODED, ROOM_A)));
        assert_eq!(graph.swap_active(ROOM_C), None);
    }

    #[test]
    fn test_overlapping_unconnected_rooms_are_not_near() {
        let rooms = vec![
            Room::filled(RoomId(0), [0.0, 0.0, 0.0], 2, 2, 0.0, 1024.0),
            Room::filled(RoomId(1), [0.0, 0.0, 0.0], 2, 2, 0.0, 1024.0),
        ];
        let graph = RoomGraph::build(rooms, 16.0);
        assert!(!graph.are_near(RoomId(0), RoomId(1)));
        assert_eq!(graph.room(RoomId(0)).unwrap().near_rooms, vec![RoomId(0)]);
    }
}
