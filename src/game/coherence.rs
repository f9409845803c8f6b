//! Room coherence
//!
//! After each physics step, every moving object's room is re-resolved from
//! its body position, using the room it was in as the lookup hint. An object
//! that leaves every room keeps the last room it was known to be in.

use rapier3d::prelude::*;

use crate::world::{RoomGraph, RoomId};
use super::object::ObjectId;
use super::physics::{ColliderTag, PhysicsWorld, ROOT_PART};
use super::registry::ObjectRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomChange {
    Unchanged,
    Moved { from: Option<RoomId>, to: RoomId },
    /// No room contains the position; the object keeps its old room
    Lost,
}

/// Re-resolve one object's room from `position`. Idempotent for a fixed position.
pub fn reconcile_room(
    graph: &mut RoomGraph,
    objects: &mut ObjectRegistry,
    id: ObjectId,
    position: &Point<Real>,
) -> RoomChange {
    let Some(object) = objects.get(id) else {
        return RoomChange::Lost;
    };
    let current = object.room;

    match graph.room_at(position, current) {
        Some(room) if Some(room) == current => RoomChange::Unchanged,
        Some(room) => {
            objects.set_room(graph, id, room);
            tracing::debug!(object = %id, from = ?current, to = %room, "room transition");
            RoomChange::Moved { from: current, to: room }
        }
        None => {
            tracing::debug!(object = %id, room = ?current, ?position, "object outside every room");
            RoomChange::Lost
        }
    }
}

/// Post-step pass over every non-fixed root body. Returns how many objects changed room.
pub fn update_rooms(graph: &mut RoomGraph, objects: &mut ObjectRegistry, physics: &PhysicsWorld) -> usize {
    let moving: Vec<(ObjectId, Point<Real>)> = physics.bodies
        .iter()
        .filter(|(_, body)| !body.is_fixed())
        .filter_map(|(_, body)| {
            let tag = ColliderTag::decode(body.user_data)?;
            (tag.part == ROOT_PART).then(|| (tag.object, Point::from(*body.translation())))
        })
        .collect();

    moving.into_iter()
        .filter(|(id, position)| {
            matches!(reconcile_room(graph, objects, *id, position), RoomChange::Moved { .. })
        })
        .count()
}

/// Activate the other room of an alternate pair and move every entity across.
/// Returns `(deactivated, activated)`.
pub fn flip_alternate(
    graph: &mut RoomGraph,
    objects: &mut ObjectRegistry,
    room: RoomId,
) -> Option<(RoomId, RoomId)> {
    let (from, to) = graph.swap_active(room)?;
    let members = graph.room(from).map(|r| r.objects.clone()).unwrap_or_default();
    for id in &members {
        objects.set_room(graph, *id, to);
    }
    tracing::info!(%from, %to, moved = members.len(), "flipped alternate room");
    Some((from, to))
}
