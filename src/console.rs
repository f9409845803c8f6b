//! Diagnostics console
//!
//! Built-in commands are handled here; every other line goes to the script
//! host. Errors from scripts come back as text, never as a panic.

use std::collections::VecDeque;
use std::fmt;

use crate::game::{ObjectKind, ScriptHost, World};
use crate::world::{Aabb, Room, RoomId};

/// Oldest notifications are dropped past this
const MAX_NOTIFICATIONS: usize = 64;

#[derive(Debug, Default)]
pub struct Console {
    notifications: VecDeque<String>,
}

impl Console {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a line for display (script failures, warnings)
    pub fn notify(&mut self, message: impl Into<String>) {
        if self.notifications.len() == MAX_NOTIFICATIONS {
            self.notifications.pop_front();
        }
        self.notifications.push_back(message.into());
    }

    pub fn notifications(&self) -> impl Iterator<Item = &str> {
        self.notifications.iter().map(String::as_str)
    }

    pub fn clear_notifications(&mut self) {
        self.notifications.clear();
    }

    pub fn execute(&mut self, line: &str, world: Option<&World>, script: &mut dyn ScriptHost) -> String {
        let line = line.trim();
        let mut words = line.split_whitespace();
        match words.next() {
            None => String::new(),
            Some("room_info") => room_info(world, words.next()),
            Some(_) => match script.run_string(line) {
                Ok(output) => output,
                Err(e) => e.to_string(),
            },
        }
    }
}

fn room_info(world: Option<&World>, arg: Option<&str>) -> String {
    let Some(world) = world else {
        return "no world loaded".to_string();
    };
    let Some(arg) = arg else {
        // Summary of every room
        return world.graph.rooms().iter()
            .map(|r| format!("room {}: {}x{} {}", r.id, r.width, r.depth, if r.active { "active" } else { "inactive" }))
            .collect::<Vec<_>>()
            .join("\n");
    };
    let Ok(index) = arg.parse::<u32>() else {
        return format!("bad room id '{}'", arg);
    };
    match dump_room(world, RoomId(index)) {
        Some(dump) => dump.to_string(),
        None => format!("no room {}", index),
    }
}

struct SectorLine {
    x: usize,
    z: usize,
    floor: f32,
    ceiling: f32,
    portal: Option<RoomId>,
    below: Option<RoomId>,
    above: Option<RoomId>,
}

/// Snapshot of one room for the console
pub struct RoomDump {
    id: RoomId,
    active: bool,
    bounds: Aabb,
    width: usize,
    depth: usize,
    alternate: Option<RoomId>,
    base: Option<RoomId>,
    near: Vec<RoomId>,
    sectors: Vec<SectorLine>,
    statics: Vec<String>,
    entities: Vec<String>,
}

impl RoomDump {
    fn new(room: &Room, world: &World) -> Self {
        let sectors = room.iter_sectors()
            .map(|(x, z, s)| SectorLine {
                x,
                z,
                floor: room.floor_y(s),
                ceiling: room.ceiling_y(s),
                portal: s.portal_to_room,
                below: s.sector_below.map(|r| r.room),
                above: s.sector_above.map(|r| r.room),
            })
            .collect();
        let entities = room.objects.iter()
            .filter(|id| world.objects.get(**id).is_some_and(|o| o.kind() == ObjectKind::Entity))
            .map(|id| id.to_string())
            .collect();

        Self {
            id: room.id,
            active: room.active,
            bounds: room.bounds,
            width: room.width,
            depth: room.depth,
            alternate: room.alternate,
            base: room.base,
            near: room.near_rooms.clone(),
            sectors,
            statics: room.static_meshes.iter().map(|id| id.to_string()).collect(),
            entities,
        }
    }
}

fn opt(room: Option<RoomId>) -> String {
    room.map_or_else(|| "-".to_string(), |r| r.to_string())
}

impl fmt::Display for RoomDump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "room {} ({})", self.id, if self.active { "active" } else { "inactive" })?;
        writeln!(
            f,
            "  bounds ({:.0}, {:.0}, {:.0}) - ({:.0}, {:.0}, {:.0})",
            self.bounds.min.x, self.bounds.min.y, self.bounds.min.z,
            self.bounds.max.x, self.bounds.max.y, self.bounds.max.z,
        )?;
        writeln!(f, "  grid {}x{}", self.width, self.depth)?;
        writeln!(f, "  alternate {} base {}", opt(self.alternate), opt(self.base))?;
        let near: Vec<String> = self.near.iter().map(|r| r.to_string()).collect();
        writeln!(f, "  near [{}]", near.join(", "))?;
        for s in &self.sectors {
            writeln!(
                f,
                "  [{},{}] floor {:.0} ceiling {:.0} portal {} below {} above {}",
                s.x, s.z, s.floor, s.ceiling, opt(s.portal), opt(s.below), opt(s.above),
            )?;
        }
        writeln!(f, "  statics [{}]", self.statics.join(", "))?;
        write!(f, "  entities [{}]", self.entities.join(", "))
    }
}

/// Dump a room, logging it at debug level too
pub fn dump_room(world: &World, id: RoomId) -> Option<RoomDump> {
    let room = world.graph.room(id)?;
    let dump = RoomDump::new(room, world);
    tracing::debug!("{}", dump);
    Some(dump)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{Engine, NullScriptHost, ScriptError};
    use crate::config::EngineConfig;
    use crate::world::create_test_level;

    struct Echo;

    impl ScriptHost for Echo {
        fn advance_tasks(&mut self, _dt: f32) -> Result<(), ScriptError> {
            Ok(())
        }

        fn run_string(&mut self, source: &str) -> Result<String, ScriptError> {
            if source.starts_with("error") {
                return Err(ScriptError::Runtime("bad input".to_string()));
            }
            Ok(source.to_uppercase())
        }
    }

    fn loaded() -> Engine {
        let mut engine = Engine::new(EngineConfig::default()).unwrap();
        engine.load_level(create_test_level()).unwrap();
        engine
    }

    #[test]
    fn test_room_info_lists_sectors_and_members() {
        let engine = loaded();
        let mut console = Console::new();
        let text = console.execute("room_info 0", engine.world(), &mut NullScriptHost);

        assert!(text.starts_with("room 0 (active)"));
        assert!(text.contains("alternate 3"));
        assert!(text.contains("[3,0] floor 0 ceiling 2048 portal 1"));
        assert_eq!(text.matches("floor").count(), 16);
        // Lara spawns in room A
        assert!(!text.ends_with("entities []"));

        let text = console.execute("room_info 2", engine.world(), &mut NullScriptHost);
        assert!(!text.contains("statics []"));
        assert!(text.ends_with("entities []"));
    }

    #[test]
    fn test_room_info_bad_input() {
        let engine = loaded();
        let mut console = Console::new();
        assert_eq!(console.execute("room_info 99", engine.world(), &mut NullScriptHost), "no room 99");
        assert_eq!(console.execute("room_info x", engine.world(), &mut NullScriptHost), "bad room id 'x'");
        assert_eq!(console.execute("room_info 0", None, &mut NullScriptHost), "no world loaded");
        assert_eq!(console.execute("room_info", engine.world(), &mut NullScriptHost).lines().count(), 5);
    }

    #[test]
    fn test_other_lines_go_to_script() {
        let mut console = Console::new();
        assert_eq!(console.execute("  hello  ", None, &mut Echo), "HELLO");
        assert_eq!(console.execute("error now", None, &mut Echo), "script error: bad input");
        assert_eq!(console.execute("print(1)", None, &mut NullScriptHost), "no script engine attached");
        assert_eq!(console.execute("", None, &mut Echo), "");
    }

    #[test]
    fn test_notifications_are_bounded() {
        let mut console = Console::new();
        for i in 0..100 {
            console.notify(format!("line {}", i));
        }
        assert_eq!(console.notifications().count(), MAX_NOTIFICATIONS);
        assert_eq!(console.notifications().next(), Some("line 36"));
    }
}
