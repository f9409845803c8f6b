//! Game Runtime Module
//!
//! Everything that runs once a level is loaded: the object registry, the
//! rapier physics world with its room filter, skeletal poses, the fixed-step
//! clock and the `Engine` that ties them together.
//!
//! Key concepts:
//! - ObjectId: Generational index, stale ids never alias a reused slot
//! - ObjectData: Closed set of object variants (entity, static mesh, room geometry)
//! - RoomFilter: Physics hooks that drop pairs whose rooms are not near
//! - Engine: Owns config, clock, physics, world and collaborators
//!
//! Design philosophy:
//! - No global state, the host owns the `Engine`
//! - Hooks are plain method calls around the physics step
//! - Cross references are ids, never pointers

pub mod object;
pub mod component;
pub mod registry;
pub mod entity;
pub mod pose;
pub mod physics;
pub mod collision;
pub mod clock;
pub mod hooks;
pub mod coherence;
pub mod runtime;

// Re-export main types
pub use object::ObjectId;
pub use registry::{ObjectData, ObjectKind, ObjectRegistry, StaticMesh, WorldObject};
pub use entity::{BoneAttachment, Entity, GhostProxy};
pub use pose::{Animation, Bone, BoneKey, SkeletalModel, SkeletalPose};
pub use physics::{ColliderTag, PhysicsWorld};
pub use collision::{ConvexHit, QueryOrigin, RayHit, RoomFilter};
pub use clock::{ClockState, FixedStepClock, FrameReport};
pub use hooks::{
    AiDirector, AudioError, AudioMixer, Collaborators, NullAiDirector, NullAudioMixer, NullScriptHost,
    ScriptError, ScriptHost,
};
pub use coherence::RoomChange;
pub use runtime::{Engine, EngineError, World};
