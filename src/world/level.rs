//! Level loading and saving
//!
//! Uses RON (Rusty Object Notation) for human-readable level files.
//! Supports both compressed (brotli) and uncompressed RON files.
//! - Reading: Auto-detects format by checking for valid RON start
//! - Writing: Always uses brotli compression

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::game::SkeletalModel;
use super::{Room, RoomId, Sector, SECTOR_SIZE};

/// Validation limits to prevent resource exhaustion from malicious files
pub mod limits {
    /// Maximum number of rooms in a level
    pub const MAX_ROOMS: usize = 256;
    /// Maximum grid dimension (width or depth) for a room
    pub const MAX_ROOM_SIZE: usize = 128;
    /// Maximum static meshes per room
    pub const MAX_STATICS_PER_ROOM: usize = 512;
    /// Maximum entities in a level
    pub const MAX_ENTITIES: usize = 4096;
    /// Maximum bones per skeletal model
    pub const MAX_BONES: usize = 64;
    /// Maximum links in a secondary chain
    pub const MAX_CHAIN_LINKS: usize = 32;
    /// Maximum coordinate value (prevents overflow issues)
    pub const MAX_COORD: f32 = 1_000_000.0;
}

/// A static mesh placed in a room: a fixed box collider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticMeshDesc {
    /// World-space center
    pub position: [f32; 3],
    pub half_extents: [f32; 3],
}

/// Secondary dynamics chain hanging off a bone (ponytail, rope)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainSpawn {
    /// Bone the first link is jointed to
    pub bone: usize,
    pub links: usize,
    pub link_length: f32,
    pub radius: f32,
}

/// Initial placement of an entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySpawn {
    pub position: [f32; 3],
    pub half_extents: [f32; 3],
    /// Explicit starting room; looked up from `position` when absent
    #[serde(default)]
    pub room: Option<RoomId>,
    /// Index into `Level::models`
    #[serde(default)]
    pub model: Option<usize>,
    /// Root body follows the animation instead of being simulated
    #[serde(default)]
    pub kinematic: bool,
    /// Fully simulated (ragdoll, debris); the pose layer leaves it alone
    #[serde(default)]
    pub physics_driven: bool,
    #[serde(default)]
    pub velocity: [f32; 3],
    #[serde(default)]
    pub chain: Option<ChainSpawn>,
    /// Bones that get a sensor proxy for trigger and query checks
    #[serde(default)]
    pub ghost_bones: Vec<usize>,
    /// Bones that get a kinematic body driven by the pose
    #[serde(default)]
    pub attached_bones: Vec<usize>,
}

impl EntitySpawn {
    pub fn new(position: [f32; 3], half_extents: [f32; 3]) -> Self {
        Self {
            position,
            half_extents,
            room: None,
            model: None,
            kinematic: false,
            physics_driven: false,
            velocity: [0.0; 3],
            chain: None,
            ghost_bones: Vec::new(),
            attached_bones: Vec::new(),
        }
    }
}

/// A complete level description
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Level {
    pub rooms: Vec<Room>,
    #[serde(default)]
    pub models: Vec<SkeletalModel>,
    #[serde(default)]
    pub entities: Vec<EntitySpawn>,
}

/// Error type for level loading
#[derive(Debug, Error)]
pub enum LevelError {
    #[error("level file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("unsupported level format: {0}")]
    UnsupportedFormat(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Check if a float is valid (not NaN or Inf)
fn is_valid_float(f: f32) -> bool {
    f.is_finite() && f.abs() <= limits::MAX_COORD
}

fn is_valid_vec3(v: &[f32; 3]) -> bool {
    v.iter().all(|&c| is_valid_float(c))
}

fn validate_room_ref(id: RoomId, total_rooms: usize, context: &str) -> Result<(), String> {
    if id.index() >= total_rooms {
        return Err(format!("{}: invalid room {} (only {} rooms)", context, id, total_rooms));
    }
    Ok(())
}

/// Validate a room
fn validate_room(room: &Room, room_idx: usize, total_rooms: usize) -> Result<(), String> {
    let context = format!("room[{}]", room_idx);

    if room.width > limits::MAX_ROOM_SIZE {
        return Err(format!("{}: width too large ({} > {})",
            context, room.width, limits::MAX_ROOM_SIZE));
    }
    if room.depth > limits::MAX_ROOM_SIZE {
        return Err(format!("{}: depth too large ({} > {})",
            context, room.depth, limits::MAX_ROOM_SIZE));
    }
    if !is_valid_vec3(&room.position) {
        return Err(format!("{}: invalid position {:?}", context, room.position));
    }

    if room.sectors.len() != room.width {
        return Err(format!("{}: sectors array width mismatch ({} != {})",
            context, room.sectors.len(), room.width));
    }
    for (x, col) in room.sectors.iter().enumerate() {
        if col.len() != room.depth {
            return Err(format!("{}: sectors[{}] depth mismatch ({} != {})",
                context, x, col.len(), room.depth));
        }
    }

    if let Some(alt) = room.alternate {
        validate_room_ref(alt, total_rooms, &format!("{} alternate", context))?;
        if alt.index() == room_idx {
            return Err(format!("{}: room is its own alternate", context));
        }
    }

    for (x, col) in room.sectors.iter().enumerate() {
        for (z, sector_opt) in col.iter().enumerate() {
            if let Some(sector) = sector_opt {
                validate_sector(sector, total_rooms, &format!("{} sector[{},{}]", context, x, z))?;
            }
        }
    }

    if room.statics.len() > limits::MAX_STATICS_PER_ROOM {
        return Err(format!("{}: too many static meshes ({} > {})",
            context, room.statics.len(), limits::MAX_STATICS_PER_ROOM));
    }
    for (i, mesh) in room.statics.iter().enumerate() {
        if !is_valid_vec3(&mesh.position) || !is_valid_vec3(&mesh.half_extents)
            || mesh.half_extents.iter().any(|&h| h <= 0.0)
        {
            return Err(format!("{} static[{}]: invalid box", context, i));
        }
    }

    Ok(())
}

fn validate_sector(sector: &Sector, total_rooms: usize, context: &str) -> Result<(), String> {
    if !is_valid_float(sector.floor) || !is_valid_float(sector.ceiling) {
        return Err(format!("{}: invalid heights ({}, {})", context, sector.floor, sector.ceiling));
    }
    if sector.floor > sector.ceiling {
        return Err(format!("{}: floor {} above ceiling {}", context, sector.floor, sector.ceiling));
    }
    if let Some(target) = sector.portal_to_room {
        validate_room_ref(target, total_rooms, &format!("{} portal", context))?;
    }
    Ok(())
}

fn validate_model(model: &SkeletalModel, context: &str) -> Result<(), String> {
    if model.bones.is_empty() || model.bones.len() > limits::MAX_BONES {
        return Err(format!("{}: bone count {} out of range", context, model.bones.len()));
    }
    for (i, bone) in model.bones.iter().enumerate() {
        // Parents come first so poses can be built in one forward pass
        if bone.parent.is_some_and(|p| p >= i) {
            return Err(format!("{} bone[{}]: parent must precede child", context, i));
        }
        if !is_valid_vec3(&bone.offset) {
            return Err(format!("{} bone[{}]: invalid offset", context, i));
        }
    }
    for (a, anim) in model.animations.iter().enumerate() {
        let anim_context = format!("{} animation[{}]", context, a);
        if anim.frames.is_empty() {
            return Err(format!("{}: no frames", anim_context));
        }
        if anim.next_animation >= model.animations.len() {
            return Err(format!("{}: invalid next_animation {}", anim_context, anim.next_animation));
        }
        let next_len = model.animations[anim.next_animation].frames.len();
        if anim.next_frame >= next_len {
            return Err(format!("{}: invalid next_frame {}", anim_context, anim.next_frame));
        }
        for (f, keys) in anim.frames.iter().enumerate() {
            if keys.len() != model.bones.len() {
                return Err(format!("{} frame[{}]: {} keys for {} bones",
                    anim_context, f, keys.len(), model.bones.len()));
            }
            for key in keys {
                if !is_valid_vec3(&key.offset) || !key.rotation.iter().all(|r| r.is_finite()) {
                    return Err(format!("{} frame[{}]: invalid key", anim_context, f));
                }
            }
        }
    }
    Ok(())
}

/// Validate one entity spawn against the rooms and models it may reference
pub fn validate_entity(
    spawn: &EntitySpawn,
    room_count: usize,
    models: &[SkeletalModel],
    context: &str,
) -> Result<(), String> {
    if !is_valid_vec3(&spawn.position) || !is_valid_vec3(&spawn.velocity) {
        return Err(format!("{}: invalid position or velocity", context));
    }
    if !is_valid_vec3(&spawn.half_extents) || spawn.half_extents.iter().any(|&h| h <= 0.0) {
        return Err(format!("{}: invalid half extents {:?}", context, spawn.half_extents));
    }
    if let Some(room) = spawn.room {
        validate_room_ref(room, room_count, context)?;
    }

    let bone_count = match spawn.model {
        Some(m) => match models.get(m) {
            Some(model) => model.bones.len(),
            None => return Err(format!("{}: invalid model {}", context, m)),
        },
        None => 0,
    };
    let bones = spawn.ghost_bones.iter()
        .chain(spawn.attached_bones.iter())
        .chain(spawn.chain.as_ref().map(|c| &c.bone));
    for &bone in bones {
        if bone >= bone_count {
            return Err(format!("{}: bone {} out of range ({} bones)", context, bone, bone_count));
        }
    }
    if let Some(chain) = &spawn.chain {
        if chain.links == 0 || chain.links > limits::MAX_CHAIN_LINKS {
            return Err(format!("{}: chain link count {} out of range", context, chain.links));
        }
        if !(is_valid_float(chain.link_length) && chain.link_length > 0.0
            && is_valid_float(chain.radius) && chain.radius > 0.0)
        {
            return Err(format!("{}: invalid chain dimensions", context));
        }
    }
    Ok(())
}

/// Each alternate pairs with exactly one base room, and is not a base itself
fn validate_alternates(rooms: &[Room]) -> Result<(), String> {
    let mut base_of: Vec<Option<usize>> = vec![None; rooms.len()];
    for (i, room) in rooms.iter().enumerate() {
        let Some(alt) = room.alternate else { continue };
        let Some(slot) = base_of.get_mut(alt.index()) else { continue };
        if let Some(other) = slot {
            return Err(format!("room[{}]: alternate {} already used by room[{}]", i, alt, other));
        }
        *slot = Some(i);
    }
    for (i, room) in rooms.iter().enumerate() {
        if let (Some(alt), Some(base)) = (room.alternate, base_of[i]) {
            return Err(format!(
                "room[{}]: alternate of room[{}] cannot have its own alternate {}", i, base, alt
            ));
        }
    }
    Ok(())
}

/// Validate an entire level
pub fn validate_level(level: &Level) -> Result<(), LevelError> {
    if level.rooms.len() > limits::MAX_ROOMS {
        return Err(LevelError::Validation(format!(
            "too many rooms ({} > {})", level.rooms.len(), limits::MAX_ROOMS
        )));
    }
    if level.entities.len() > limits::MAX_ENTITIES {
        return Err(LevelError::Validation(format!(
            "too many entities ({} > {})", level.entities.len(), limits::MAX_ENTITIES
        )));
    }

    for (i, room) in level.rooms.iter().enumerate() {
        validate_room(room, i, level.rooms.len())
            .map_err(LevelError::Validation)?;
    }
    validate_alternates(&level.rooms).map_err(LevelError::Validation)?;
    for (i, model) in level.models.iter().enumerate() {
        validate_model(model, &format!("model[{}]", i))
            .map_err(LevelError::Validation)?;
    }
    for (i, spawn) in level.entities.iter().enumerate() {
        validate_entity(spawn, level.rooms.len(), &level.models, &format!("entity[{}]", i))
            .map_err(LevelError::Validation)?;
    }

    Ok(())
}

/// Load a level from a RON file (supports both compressed and uncompressed)
pub fn load_level<P: AsRef<Path>>(path: P) -> Result<Level, LevelError> {
    let path = path.as_ref();
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(LevelError::NotFound(path.to_path_buf()));
        }
        Err(e) => return Err(e.into()),
    };

    let level = parse_level_data(&bytes).inspect_err(|e| {
        tracing::error!(path = %path.display(), "failed to load level: {}", e);
    })?;
    tracing::info!(
        path = %path.display(),
        rooms = level.rooms.len(),
        entities = level.entities.len(),
        "loaded level"
    );
    Ok(level)
}

/// Parse level data from bytes, plain or brotli-compressed
pub fn parse_level_data(bytes: &[u8]) -> Result<Level, LevelError> {
    // Detect format: RON files start with '(' or whitespace, brotli is binary
    let is_plain_ron = bytes.first()
        .map(|&b| b == b'(' || b == b' ' || b == b'\n' || b == b'\r' || b == b'\t')
        .unwrap_or(false);

    let contents = if is_plain_ron {
        String::from_utf8(bytes.to_vec())
            .map_err(|e| LevelError::UnsupportedFormat(format!("invalid UTF-8: {}", e)))?
    } else {
        let mut decompressed = Vec::new();
        brotli::BrotliDecompress(&mut Cursor::new(bytes), &mut decompressed)
            .map_err(|e| LevelError::UnsupportedFormat(format!("brotli decompression failed: {}", e)))?;
        String::from_utf8(decompressed)
            .map_err(|e| LevelError::UnsupportedFormat(format!("invalid UTF-8 after decompression: {}", e)))?
    };

    load_level_from_str(&contents)
}

/// Load a level from a RON string (for embedded levels or testing)
pub fn load_level_from_str(s: &str) -> Result<Level, LevelError> {
    let level: Level = match ron::from_str(s) {
        Ok(l) => l,
        Err(e) => {
            log_parse_context(s, &e);
            return Err(e.into());
        }
    };

    // Validate level to prevent malicious files
    validate_level(&level)?;
    Ok(level)
}

/// Show the offending line of a RON parse error
fn log_parse_context(contents: &str, e: &ron::error::SpannedError) {
    let pos = e.position;
    let line_idx = pos.line.saturating_sub(1);
    if let Some(line) = contents.lines().nth(line_idx) {
        tracing::error!("  Line {}: {}", pos.line, line);
        if pos.col > 0 && pos.col <= line.len() {
            let start = pos.col.saturating_sub(20);
            let end = (pos.col + 30).min(line.len());
            if let Some(context) = line.get(start..end) {
                tracing::error!("  Context: ...{}...", context);
            }
        }
    }
}

/// Standard test level.
///
/// Five 4x4 rooms, floor 0 and ceiling 2048 (room-relative):
/// - 0: A at the origin, east column portals into B, alternate is 3
/// - 1: B east of A, west column portals back into A, E stacked on top
/// - 2: C far south of A (not near A), holds a static box
/// - 3: A flooded, same footprint as A, inactive until flipped
/// - 4: E on top of B, linked through the sector grid
pub fn create_test_level() -> Level {
    use crate::game::{Animation, Bone, BoneKey};

    let size = 4;
    let span = size as f32 * SECTOR_SIZE;
    let ceiling = 2.0 * SECTOR_SIZE;

    let mut a = Room::filled(RoomId(0), [0.0, 0.0, 0.0], size, size, 0.0, ceiling);
    let mut b = Room::filled(RoomId(1), [span, 0.0, 0.0], size, size, 0.0, ceiling);
    let mut c = Room::filled(RoomId(2), [0.0, 0.0, 2.0 * span], size, size, 0.0, ceiling);
    let mut flooded = Room::filled(RoomId(3), [0.0, 0.0, 0.0], size, size, 0.0, ceiling);
    let e = Room::filled(RoomId(4), [span, ceiling, 0.0], size, size, 0.0, ceiling);

    for z in 0..size {
        a.set_sector(size - 1, z, Sector::new(0.0, ceiling).with_portal(RoomId(1)));
        flooded.set_sector(size - 1, z, Sector::new(0.0, ceiling).with_portal(RoomId(1)));
        b.set_sector(0, z, Sector::new(0.0, ceiling).with_portal(RoomId(0)));
    }
    a.alternate = Some(RoomId(3));
    c.statics.push(StaticMeshDesc {
        position: [512.0, 512.0, 2.0 * span + 808.0],
        half_extents: [256.0, 256.0, 256.0],
    });

    let still = |y: f32| vec![
        BoneKey { offset: [0.0, 0.0, 0.0], rotation: [0.0, 0.0, 0.0] },
        BoneKey { offset: [0.0, y, 0.0], rotation: [0.0, 0.0, 0.0] },
    ];
    let model = SkeletalModel {
        bones: vec![
            Bone { parent: None, offset: [0.0, 0.0, 0.0] },
            Bone { parent: Some(0), offset: [0.0, 256.0, 0.0] },
        ],
        animations: vec![
            // 0: idle, loops on itself
            Animation { frames: vec![still(0.0), still(16.0)], next_animation: 0, next_frame: 0 },
            // 1: crouch, falls back into idle
            Animation { frames: vec![still(-64.0), still(-128.0), still(-128.0)], next_animation: 0, next_frame: 0 },
        ],
    };

    let mut lara = EntitySpawn::new([1024.0, 512.0, 2048.0], [128.0, 256.0, 128.0]);
    lara.model = Some(0);
    lara.attached_bones = vec![1];
    lara.ghost_bones = vec![1];
    lara.chain = Some(ChainSpawn { bone: 1, links: 3, link_length: 64.0, radius: 16.0 });

    Level {
        rooms: vec![a, b, c, flooded, e],
        models: vec![model],
        entities: vec![lara],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_test_level_is_valid() {
        let level = create_test_level();
        validate_level(&level).unwrap();
    }

    #[test]
    fn test_load_compressed() {
        let level = create_test_level();
        let text = ron::ser::to_string_pretty(&level, ron::ser::PrettyConfig::new()).unwrap();
        let mut compressed = Vec::new();
        brotli::BrotliCompress(
            &mut Cursor::new(text.as_bytes()),
            &mut compressed,
            &brotli::enc::BrotliEncoderParams { quality: 6, lgwin: 22, ..Default::default() },
        ).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.ron");
        std::fs::write(&path, &compressed).unwrap();

        let loaded = load_level(&path).unwrap();
        assert_eq!(loaded.rooms.len(), level.rooms.len());
        assert_eq!(loaded.rooms[0].alternate, Some(RoomId(3)));
        assert_eq!(loaded.rooms[0].get_sector(3, 1).unwrap().portal_to_room, Some(RoomId(1)));
        assert_eq!(loaded.rooms[2].statics, level.rooms[2].statics);
        assert_eq!(loaded.entities, level.entities);
    }

    #[test]
    fn test_load_plain_ron() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let text = ron::ser::to_string(&create_test_level()).unwrap();
        file.write_all(text.as_bytes()).unwrap();

        let loaded = load_level(file.path()).unwrap();
        assert_eq!(loaded.rooms.len(), 5);
        assert_eq!(loaded.models[0].bones.len(), 2);
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_level(dir.path().join("nope.ron")).unwrap_err();
        assert!(matches!(err, LevelError::NotFound(_)));
    }

    #[test]
    fn test_garbage_is_unsupported() {
        let err = parse_level_data(&[0xff, 0x00, 0x13, 0x37]).unwrap_err();
        assert!(matches!(err, LevelError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_parse_error() {
        let err = load_level_from_str("(rooms: [ oops").unwrap_err();
        assert!(matches!(err, LevelError::Parse(_)));
    }

    #[test]
    fn test_rejects_dangling_portal() {
        let mut level = create_test_level();
        level.rooms[1].set_sector(2, 2, Sector::new(0.0, 1024.0).with_portal(RoomId(42)));
        assert!(matches!(validate_level(&level), Err(LevelError::Validation(_))));
    }

    #[test]
    fn test_rejects_inverted_sector() {
        let mut level = create_test_level();
        level.rooms[0].set_sector(0, 0, Sector::new(512.0, 0.0));
        assert!(matches!(validate_level(&level), Err(LevelError::Validation(_))));
    }

    #[test]
    fn test_rejects_bad_bone_reference() {
        let mut level = create_test_level();
        level.entities[0].ghost_bones.push(7);
        assert!(matches!(validate_level(&level), Err(LevelError::Validation(_))));
    }

    #[test]
    fn test_rejects_shared_or_chained_alternates() {
        // B also claims the flooded A
        let mut level = create_test_level();
        level.rooms[1].alternate = Some(RoomId(3));
        assert!(matches!(validate_level(&level), Err(LevelError::Validation(_))));

        // Flooded A points back at A, so both would start inactive
        let mut level = create_test_level();
        level.rooms[3].alternate = Some(RoomId(0));
        assert!(matches!(validate_level(&level), Err(LevelError::Validation(_))));

        // An alternate with an alternate of its own
        let mut level = create_test_level();
        level.rooms[3].alternate = Some(RoomId(2));
        assert!(matches!(validate_level(&level), Err(LevelError::Validation(_))));

        // Distinct pairs are fine
        let mut level = create_test_level();
        level.rooms[1].alternate = Some(RoomId(4));
        validate_level(&level).unwrap();
    }

    #[test]
    fn test_entity_validation_checks_one_spawn() {
        let level = create_test_level();
        let mut spawn = level.entities[0].clone();
        assert!(validate_entity(&spawn, level.rooms.len(), &level.models, "spawn").is_ok());
        spawn.room = Some(RoomId(9));
        assert!(validate_entity(&spawn, level.rooms.len(), &level.models, "spawn").is_err());
        spawn.room = None;
        spawn.position[1] = f32::NAN;
        assert!(validate_entity(&spawn, level.rooms.len(), &level.models, "spawn").is_err());
    }

    #[test]
    fn test_rejects_oversized_room() {
        let mut level = create_test_level();
        level.rooms.push(Room::new(RoomId(5), [0.0; 3], limits::MAX_ROOM_SIZE + 1, 1));
        assert!(matches!(validate_level(&level), Err(LevelError::Validation(_))));
    }
}
