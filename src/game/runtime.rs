//! Simulation driver
//!
//! `Engine` owns everything a running level needs: config, clock, physics
//! world, room graph, objects and the external collaborators. The host calls
//! `Engine::frame` once per rendered frame with the wall-clock delta; the
//! engine turns that into zero or more fixed logic steps.
//!
//! One step is:
//! 1. pre-tick: scripts, AI, audio, entity logic, then the pose layer
//! 2. physics integration, filtered by room
//! 3. post-tick: room coherence for every moving root body

use std::path::Path;
use std::time::Duration;

use rapier3d::prelude::*;
use thiserror::Error;

use crate::config::{ConfigError, EngineConfig};
use crate::console::Console;
use crate::world::{
    load_level, validate_entity, validate_level, EntitySpawn, Level, LevelError, RoomGraph, RoomId,
};
use super::clock::{FixedStepClock, FrameReport};
use super::coherence::{self, RoomChange};
use super::collision::{self, ConvexHit, QueryOrigin, RayHit, RoomFilter};
use super::entity::{BoneAttachment, Entity, GhostProxy};
use super::hooks::Collaborators;
use super::object::ObjectId;
use super::physics::{ColliderTag, PhysicsWorld};
use super::pose::{update_poses, SkeletalModel};
use super::registry::{ObjectData, ObjectKind, ObjectRegistry, StaticMesh};

/// Radius of bone-attached bodies and ghost proxies
const BONE_PROXY_RADIUS: Real = 32.0;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Level(#[from] LevelError),
    #[error("no world loaded")]
    NoWorld,
    #[error("unknown room {0}")]
    UnknownRoom(RoomId),
    #[error("room {0} has no alternate")]
    NoAlternate(RoomId),
    #[error("cannot spawn entity: {0}")]
    Spawn(String),
}

/// Everything that exists only while a level is loaded
pub struct World {
    pub graph: RoomGraph,
    pub objects: ObjectRegistry,
    pub models: Vec<SkeletalModel>,
}

pub struct Engine {
    config: EngineConfig,
    clock: FixedStepClock,
    physics: PhysicsWorld,
    world: Option<World>,
    collaborators: Collaborators,
    console: Console,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            clock: FixedStepClock::new(config.step_duration()?, config.max_substeps),
            physics: PhysicsWorld::new(config.gravity),
            world: None,
            collaborators: Collaborators::default(),
            console: Console::new(),
            config,
        })
    }

    pub fn with_collaborators(mut self, collaborators: Collaborators) -> Self {
        self.collaborators = collaborators;
        self
    }

    /// Load a level file and make it the running world
    pub fn load_world<P: AsRef<Path>>(&mut self, path: P) -> Result<(), EngineError> {
        self.unload();
        let level = load_level(path)?;
        self.load_level(level)
    }

    /// Build the world from a level description. On failure no world is
    /// loaded and `frame` will not step.
    pub fn load_level(&mut self, level: Level) -> Result<(), EngineError> {
        self.unload();
        validate_level(&level)?;

        let Level { rooms, models, entities } = level;
        let mut physics = PhysicsWorld::new(self.config.gravity);
        let mut world = World {
            graph: RoomGraph::build(rooms, self.config.near_margin),
            objects: ObjectRegistry::new(),
            models,
        };

        // Room geometry and static meshes, disabled while their room is inactive
        let room_ids: Vec<RoomId> = world.graph.rooms().iter().map(|r| r.id).collect();
        for room_id in room_ids {
            let Some(room) = world.graph.room(room_id) else { continue };
            let active = room.active;
            let statics = room.statics.clone();

            let geometry = world.objects.spawn(&mut world.graph, Some(room_id), ObjectData::Room(room_id));
            let Some(room) = world.graph.room(room_id) else { continue };
            let body = physics.add_room_geometry(room, ColliderTag::root(geometry));
            if let Some(object) = world.objects.get_mut(geometry) {
                object.body = Some(body);
            }

            for desc in statics {
                let half_extents = Vector::from(desc.half_extents);
                let id = world.objects.spawn(
                    &mut world.graph,
                    Some(room_id),
                    ObjectData::StaticMesh(StaticMesh { half_extents }),
                );
                let (body, collider) = physics.add_fixed_box(Vector::from(desc.position), half_extents, ColliderTag::root(id));
                if let Some(object) = world.objects.get_mut(id) {
                    object.body = Some(body);
                    object.collider = Some(collider);
                }
            }

            if !active {
                set_room_colliders_enabled(&world, &mut physics, room_id, false);
            }
        }

        for spawn in &entities {
            spawn_entity(&mut world, &mut physics, spawn)?;
        }

        physics.refresh_queries();
        tracing::info!(
            rooms = world.graph.len(),
            objects = world.objects.len(),
            "world ready"
        );

        self.physics = physics;
        self.world = Some(world);
        self.clock = FixedStepClock::new(self.clock.step(), self.config.max_substeps);
        Ok(())
    }

    /// Drop the running world. `frame` stops stepping until a new one loads.
    pub fn unload(&mut self) {
        if self.world.take().is_some() {
            tracing::info!("world unloaded");
        }
        self.physics = PhysicsWorld::new(self.config.gravity);
        self.clock.discard();
    }

    /// Add an entity to the running world
    pub fn spawn_entity(&mut self, spawn: &EntitySpawn) -> Result<ObjectId, EngineError> {
        let world = self.world.as_mut().ok_or(EngineError::NoWorld)?;
        validate_entity(spawn, world.graph.len(), &world.models, "spawn")
            .map_err(EngineError::Spawn)?;
        let id = spawn_entity(world, &mut self.physics, spawn)?;
        self.physics.refresh_queries();
        Ok(id)
    }

    /// Advance by a wall-clock delta, running as many fixed steps as it covers
    pub fn frame(&mut self, delta_secs: f64) -> FrameReport {
        if self.world.is_none() {
            self.clock.discard();
            return FrameReport::default();
        }

        self.clock.begin_frame(delta_secs);
        let dt = self.clock.step_secs();
        while self.clock.try_step() {
            self.step(dt);
        }
        let report = self.clock.end_frame();

        if report.dropped > Duration::ZERO {
            tracing::warn!(
                steps = report.steps,
                dropped_ms = report.dropped.as_secs_f64() * 1000.0,
                "simulation falling behind, dropping time"
            );
        }

        if let Some(world) = self.world.as_mut() {
            for object in world.objects.iter_mut() {
                if let Some(pose) = object.as_entity_mut().and_then(|e| e.pose.as_mut()) {
                    pose.lerp = report.alpha;
                }
            }
        }
        report
    }

    fn step(&mut self, dt: Real) {
        let Some(world) = self.world.as_mut() else { return };

        pre_tick(world, &mut self.physics, &mut self.collaborators, &mut self.console, dt);

        let filter = RoomFilter { graph: &world.graph, objects: &world.objects };
        self.physics.step(dt, &filter);

        post_tick(world, &self.physics);
    }

    pub fn cast_ray(&self, origin: &QueryOrigin, ray: &Ray, max_toi: Real) -> Option<RayHit> {
        let world = self.world.as_ref()?;
        collision::cast_ray(&self.physics, &world.graph, &world.objects, origin, ray, max_toi)
    }

    pub fn cast_convex(
        &self,
        origin: &QueryOrigin,
        shape: &dyn Shape,
        position: &Isometry<Real>,
        velocity: &Vector<Real>,
        max_toi: Real,
    ) -> Option<ConvexHit> {
        let world = self.world.as_ref()?;
        collision::cast_convex(&self.physics, &world.graph, &world.objects, origin, shape, position, velocity, max_toi)
    }

    /// Query origin for an object: its own colliders are skipped, its room filters hits
    pub fn query_origin(&self, id: ObjectId, skip_ghosts: bool) -> QueryOrigin {
        QueryOrigin {
            object: Some(id),
            room: self.world.as_ref().and_then(|w| w.objects.room_of(id)),
            skip_ghosts,
        }
    }

    /// Re-resolve one object's room from its root body right now
    pub fn reconcile_room(&mut self, id: ObjectId) -> Result<RoomChange, EngineError> {
        let world = self.world.as_mut().ok_or(EngineError::NoWorld)?;
        let Some(position) = world.objects.get(id)
            .and_then(|o| o.body)
            .and_then(|h| self.physics.body_translation(h))
        else {
            return Ok(RoomChange::Lost);
        };
        Ok(coherence::reconcile_room(&mut world.graph, &mut world.objects, id, &position))
    }

    /// Swap a room with its alternate. Returns `(deactivated, activated)`.
    pub fn flip_room(&mut self, room: RoomId) -> Result<(RoomId, RoomId), EngineError> {
        let world = self.world.as_mut().ok_or(EngineError::NoWorld)?;
        if world.graph.room(room).is_none() {
            return Err(EngineError::UnknownRoom(room));
        }
        let (from, to) = coherence::flip_alternate(&mut world.graph, &mut world.objects, room)
            .ok_or(EngineError::NoAlternate(room))?;
        set_room_colliders_enabled(world, &mut self.physics, from, false);
        set_room_colliders_enabled(world, &mut self.physics, to, true);
        self.physics.refresh_queries();
        Ok((from, to))
    }

    /// Run a console line: built-in commands first, then the script host
    pub fn exec_command(&mut self, line: &str) -> String {
        self.console.execute(line, self.world.as_ref(), self.collaborators.script.as_mut())
    }

    pub fn object_position(&self, id: ObjectId) -> Option<Isometry<Real>> {
        let body = self.world.as_ref()?.objects.get(id)?.body?;
        self.physics.bodies.get(body).map(|b| *b.position())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn clock(&self) -> &FixedStepClock {
        &self.clock
    }

    pub fn physics(&self) -> &PhysicsWorld {
        &self.physics
    }

    pub fn physics_mut(&mut self) -> &mut PhysicsWorld {
        &mut self.physics
    }

    pub fn world(&self) -> Option<&World> {
        self.world.as_ref()
    }

    pub fn world_mut(&mut self) -> Option<&mut World> {
        self.world.as_mut()
    }

    pub fn console(&self) -> &Console {
        &self.console
    }

    pub fn is_loaded(&self) -> bool {
        self.world.is_some()
    }
}

fn pre_tick(
    world: &mut World,
    physics: &mut PhysicsWorld,
    collaborators: &mut Collaborators,
    console: &mut Console,
    dt: Real,
) {
    if let Err(e) = collaborators.script.advance_tasks(dt) {
        tracing::warn!("script tasks failed: {}", e);
        console.notify(e.to_string());
    }
    collaborators.ai.update(world, dt);
    if let Err(e) = collaborators.audio.update() {
        tracing::error!("audio update failed: {}", e);
    }

    // Entity logic: state machine and movement intent
    for object in world.objects.iter_mut() {
        let body = match object.body {
            Some(handle) => physics.bodies.get_mut(handle),
            None => None,
        };
        let ObjectData::Entity(entity) = &mut object.data else { continue };
        if !entity.enabled {
            continue;
        }
        let model = entity.model.and_then(|m| world.models.get(m));
        entity.frame(body, model, dt);
    }

    // Last, so this step's integration carries bone bodies onto the new pose
    update_poses(&mut world.objects, &world.models, physics);
}

fn post_tick(world: &mut World, physics: &PhysicsWorld) {
    coherence::update_rooms(&mut world.graph, &mut world.objects, physics);
}

/// Enable or disable the geometry and static mesh colliders owned by a room
fn set_room_colliders_enabled(world: &World, physics: &mut PhysicsWorld, room: RoomId, enabled: bool) {
    let bodies: Vec<RigidBodyHandle> = world.objects.iter()
        .filter(|o| o.room == Some(room))
        .filter(|o| matches!(o.kind(), ObjectKind::Room | ObjectKind::StaticMesh))
        .filter_map(|o| o.body)
        .collect();
    for handle in bodies {
        let colliders = physics.bodies.get(handle).map(|b| b.colliders().to_vec()).unwrap_or_default();
        for collider in colliders {
            if let Some(collider) = physics.colliders.get_mut(collider) {
                collider.set_enabled(enabled);
            }
        }
    }
}

fn spawn_entity(world: &mut World, physics: &mut PhysicsWorld, spawn: &EntitySpawn) -> Result<ObjectId, EngineError> {
    let model = match spawn.model {
        Some(index) => {
            let model = world.models.get(index)
                .ok_or_else(|| EngineError::Spawn(format!("unknown model {}", index)))?;
            Some((index, model))
        }
        None => None,
    };
    let position = Vector::from(spawn.position);
    let room = spawn.room
        .or_else(|| world.graph.room_at(&Point::from(position), None));
    if room.is_none() {
        tracing::debug!(?position, "entity spawned outside every room");
    }

    let mut entity = Entity::new(model);
    entity.physics_driven = spawn.physics_driven;
    let bind_pose = model.map(|(_, m)| m.bone_transforms(0, 0)).unwrap_or_default();

    let id = world.objects.spawn(&mut world.graph, room, ObjectData::Entity(Entity::new(None)));
    let (body, collider) = physics.add_body(
        position,
        Vector::from(spawn.half_extents),
        spawn.kinematic,
        Vector::from(spawn.velocity),
        ColliderTag::root(id),
    );
    let root = Isometry::translation(position.x, position.y, position.z);

    let mut part = 1;
    for &bone in &spawn.attached_bones {
        let handle = physics.add_bone_body(root * bind_pose[bone], BONE_PROXY_RADIUS, ColliderTag::part(id, part));
        entity.attachments.push(BoneAttachment { bone, body: handle });
        part += 1;
    }
    for &bone in &spawn.ghost_bones {
        let handle = physics.add_ghost(root * bind_pose[bone], BONE_PROXY_RADIUS, ColliderTag::part(id, part));
        entity.ghosts.push(GhostProxy { bone, collider: handle });
        part += 1;
    }
    if let Some(chain) = &spawn.chain {
        let anchor = match entity.attachments.iter().find(|a| a.bone == chain.bone) {
            Some(attachment) => attachment.body,
            None => {
                let handle = physics.add_bone_body(root * bind_pose[chain.bone], BONE_PROXY_RADIUS, ColliderTag::part(id, part));
                entity.attachments.push(BoneAttachment { bone: chain.bone, body: handle });
                part += 1;
                handle
            }
        };
        entity.chain = physics.add_chain(anchor, chain.links, chain.link_length, chain.radius, id, part);
    }

    if let Some(object) = world.objects.get_mut(id) {
        object.body = Some(body);
        object.collider = Some(collider);
        object.data = ObjectData::Entity(entity);
    }
    Ok(id)
}
