//! Object registry
//!
//! Owns every world object and keeps room membership lists in step with each
//! object's `room` field. Spawning, despawning and room changes all go
//! through here, so an object is always in exactly one membership list of the
//! room it names (or in none, when it has no room).

use rapier3d::prelude::*;

use crate::world::{RoomGraph, RoomId};
use super::component::ComponentStorage;
use super::entity::Entity;
use super::object::{ObjectAllocator, ObjectId};

/// Discriminant of `ObjectData`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Entity,
    StaticMesh,
    Room,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StaticMesh {
    pub half_extents: Vector<Real>,
}

/// Closed set of object variants
#[derive(Debug, Clone)]
pub enum ObjectData {
    Entity(Entity),
    StaticMesh(StaticMesh),
    /// Collision geometry of a room
    Room(RoomId),
}

impl ObjectData {
    pub fn kind(&self) -> ObjectKind {
        match self {
            ObjectData::Entity(_) => ObjectKind::Entity,
            ObjectData::StaticMesh(_) => ObjectKind::StaticMesh,
            ObjectData::Room(_) => ObjectKind::Room,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorldObject {
    pub id: ObjectId,
    /// Room the object currently belongs to
    pub room: Option<RoomId>,
    /// Root rigid body
    pub body: Option<RigidBodyHandle>,
    /// Main collider on the root body
    pub collider: Option<ColliderHandle>,
    pub data: ObjectData,
}

impl WorldObject {
    pub fn kind(&self) -> ObjectKind {
        self.data.kind()
    }

    pub fn as_entity(&self) -> Option<&Entity> {
        match &self.data {
            ObjectData::Entity(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_entity_mut(&mut self) -> Option<&mut Entity> {
        match &mut self.data {
            ObjectData::Entity(e) => Some(e),
            _ => None,
        }
    }
}

/// Membership list of `room` that objects of this kind live in
fn membership(graph: &mut RoomGraph, room: Option<RoomId>, kind: ObjectKind) -> Option<&mut Vec<ObjectId>> {
    let room = graph.room_mut(room?)?;
    match kind {
        ObjectKind::Entity => Some(&mut room.objects),
        ObjectKind::StaticMesh => Some(&mut room.static_meshes),
        ObjectKind::Room => None,
    }
}

#[derive(Debug, Default)]
pub struct ObjectRegistry {
    allocator: ObjectAllocator,
    objects: ComponentStorage<WorldObject>,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an object and register it with its room.
    pub fn spawn(&mut self, graph: &mut RoomGraph, room: Option<RoomId>, data: ObjectData) -> ObjectId {
        let id = self.allocator.allocate();
        let kind = data.kind();
        // Unknown rooms leave the object roomless rather than half-registered
        let room = room.filter(|r| graph.room(*r).is_some());
        if let Some(list) = membership(graph, room, kind) {
            list.push(id);
        }
        self.objects.insert(id, WorldObject { id, room, body: None, collider: None, data });
        id
    }

    /// Remove an object and unlink it from its room
    pub fn despawn(&mut self, graph: &mut RoomGraph, id: ObjectId) -> Option<WorldObject> {
        let object = self.objects.remove(id)?;
        self.allocator.free(id);
        if let Some(list) = membership(graph, object.room, object.kind()) {
            list.retain(|&o| o != id);
        }
        Some(object)
    }

    /// Move an object into `new_room`, fixing both membership lists.
    /// Returns the previous room.
    pub fn set_room(&mut self, graph: &mut RoomGraph, id: ObjectId, new_room: RoomId) -> Option<RoomId> {
        if graph.room(new_room).is_none() {
            return None;
        }
        let object = self.objects.get_mut(id)?;
        let old_room = object.room;
        if old_room == Some(new_room) {
            return old_room;
        }
        let kind = object.kind();
        object.room = Some(new_room);

        if let Some(list) = membership(graph, old_room, kind) {
            list.retain(|&o| o != id);
        }
        if let Some(list) = membership(graph, Some(new_room), kind) {
            list.push(id);
        }
        old_room
    }

    pub fn room_of(&self, id: ObjectId) -> Option<RoomId> {
        self.objects.get(id)?.room
    }

    pub fn get(&self, id: ObjectId) -> Option<&WorldObject> {
        self.objects.get(id)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut WorldObject> {
        self.objects.get_mut(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &WorldObject> {
        self.objects.iter().map(|(_, o)| o)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut WorldObject> {
        self.objects.iter_mut().map(|(_, o)| o)
    }

    pub fn len(&self) -> usize {
        self.allocator.alive_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::create_test_level;

    fn graph() -> RoomGraph {
        RoomGraph::build(create_test_level().rooms, 16.0)
    }

    fn static_box() -> ObjectData {
        ObjectData::StaticMesh(StaticMesh { half_extents: vector![1.0, 1.0, 1.0] })
    }

    #[test]
    fn test_spawn_registers_with_room() {
        let mut graph = graph();
        let mut objects = ObjectRegistry::new();

        let entity = objects.spawn(&mut graph, Some(RoomId(0)), ObjectData::Entity(Entity::new(None)));
        let mesh = objects.spawn(&mut graph, Some(RoomId(2)), static_box());
        let geometry = objects.spawn(&mut graph, Some(RoomId(1)), ObjectData::Room(RoomId(1)));

        assert_eq!(graph.room(RoomId(0)).unwrap().objects, vec![entity]);
        assert_eq!(graph.room(RoomId(2)).unwrap().static_meshes, vec![mesh]);
        assert!(graph.room(RoomId(1)).unwrap().objects.is_empty());
        assert_eq!(objects.get(geometry).unwrap().kind(), ObjectKind::Room);
        assert_eq!(objects.len(), 3);
    }

    #[test]
    fn test_set_room_moves_membership() {
        let mut graph = graph();
        let mut objects = ObjectRegistry::new();
        let id = objects.spawn(&mut graph, Some(RoomId(0)), ObjectData::Entity(Entity::new(None)));

        assert_eq!(objects.set_room(&mut graph, id, RoomId(1)), Some(RoomId(0)));
        assert!(graph.room(RoomId(0)).unwrap().objects.is_empty());
        assert_eq!(graph.room(RoomId(1)).unwrap().objects, vec![id]);
        assert_eq!(objects.room_of(id), Some(RoomId(1)));

        // Same room again is a no-op
        objects.set_room(&mut graph, id, RoomId(1));
        assert_eq!(graph.room(RoomId(1)).unwrap().objects, vec![id]);

        // Unknown room is refused
        assert_eq!(objects.set_room(&mut graph, id, RoomId(77)), None);
        assert_eq!(objects.room_of(id), Some(RoomId(1)));
    }

    #[test]
    fn test_despawn_unlinks_and_invalidates() {
        let mut graph = graph();
        let mut objects = ObjectRegistry::new();
        let id = objects.spawn(&mut graph, Some(RoomId(2)), static_box());

        assert!(objects.despawn(&mut graph, id).is_some());
        assert!(graph.room(RoomId(2)).unwrap().static_meshes.is_empty());
        assert!(objects.get(id).is_none());
        assert!(objects.despawn(&mut graph, id).is_none());

        let reused = objects.spawn(&mut graph, None, static_box());
        assert_eq!(reused.index(), id.index());
        assert!(objects.get(id).is_none());
        assert_eq!(objects.room_of(reused), None);
    }
}
