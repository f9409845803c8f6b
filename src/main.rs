//! Level viewer
//!
//! Opens a window, loads a level (the path given on the command line, or the
//! built-in test level) and runs the engine at its fixed step, drawing
//! room bounds, static meshes and entity skeletons as wireframes.
//!
//! Keys: arrows orbit, PageUp/PageDown zoom, F flips room 0, Escape quits.

use macroquad::prelude::*;
use rapier3d::prelude::Real;

use tomb_runtime::config::{load_config, EngineConfig};
use tomb_runtime::game::Engine;
use tomb_runtime::logging::init_logging;
use tomb_runtime::render::DrawList;
use tomb_runtime::world::{create_test_level, RoomId, SECTOR_SIZE};
use tomb_runtime::VERSION;

const CONFIG_PATH: &str = "tomb.ron";

fn window_conf() -> Conf {
    Conf {
        window_title: format!("tomb-runtime v{}", VERSION),
        window_width: 1280,
        window_height: 720,
        window_resizable: true,
        high_dpi: true,
        ..Default::default()
    }
}

/// World units to view units; macroquad's far plane is fixed
fn to_view(x: Real, y: Real, z: Real) -> Vec3 {
    vec3(x, y, z) / SECTOR_SIZE
}

struct Orbit {
    yaw: f32,
    pitch: f32,
    distance: f32,
}

impl Orbit {
    fn update(&mut self, dt: f32) {
        if is_key_down(KeyCode::Left) { self.yaw -= dt; }
        if is_key_down(KeyCode::Right) { self.yaw += dt; }
        if is_key_down(KeyCode::Up) { self.pitch = (self.pitch + dt).min(1.5); }
        if is_key_down(KeyCode::Down) { self.pitch = (self.pitch - dt).max(-1.5); }
        if is_key_down(KeyCode::PageUp) { self.distance = (self.distance - dt * 8.0).max(2.0); }
        if is_key_down(KeyCode::PageDown) { self.distance += dt * 8.0; }
    }

    fn camera(&self, target: Vec3) -> Camera3D {
        let offset = vec3(
            self.yaw.cos() * self.pitch.cos(),
            self.pitch.sin(),
            self.yaw.sin() * self.pitch.cos(),
        ) * self.distance;
        Camera3D {
            position: target + offset,
            target,
            up: Vec3::Y,
            ..Default::default()
        }
    }
}

fn draw_world(list: &DrawList) {
    for room in &list.rooms {
        let b = room.bounds;
        let center = to_view((b.min.x + b.max.x) * 0.5, (b.min.y + b.max.y) * 0.5, (b.min.z + b.max.z) * 0.5);
        let size = to_view(b.max.x - b.min.x, b.max.y - b.min.y, b.max.z - b.min.z);
        draw_cube_wires(center, size, DARKGRAY);
    }
    for mesh in &list.statics {
        let p = mesh.position;
        let h = mesh.half_extents * 2.0;
        draw_cube_wires(to_view(p.x, p.y, p.z), to_view(h.x, h.y, h.z), ORANGE);
    }
    for entity in &list.entities {
        let p = entity.root.translation.vector;
        let h = entity.half_extents * 2.0;
        draw_cube_wires(to_view(p.x, p.y, p.z), to_view(h.x, h.y, h.z), SKYBLUE);
        let mut last = to_view(p.x, p.y, p.z);
        for bone in &entity.bones {
            let b = bone.translation.vector;
            let joint = to_view(b.x, b.y, b.z);
            draw_line_3d(last, joint, YELLOW);
            last = joint;
        }
    }
}

#[macroquad::main(window_conf)]
async fn main() {
    // Initialize crash logging FIRST (before any other code)
    #[cfg(not(target_arch = "wasm32"))]
    crashlog::setup!(crashlog::cargo_metadata!().capitalized(), false);

    let config = match load_config(CONFIG_PATH) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}: {}, using defaults", CONFIG_PATH, e);
            EngineConfig::default()
        }
    };
    if let Err(e) = init_logging(&config.log_filter) {
        eprintln!("logging unavailable: {}", e);
    }

    let mut engine = match Engine::new(config) {
        Ok(engine) => engine,
        Err(e) => {
            tracing::error!("cannot start engine: {}", e);
            return;
        }
    };

    let loaded = match std::env::args().nth(1) {
        Some(path) => engine.load_world(&path),
        None => engine.load_level(create_test_level()),
    };
    if let Err(e) = loaded {
        tracing::error!("level not loaded: {}", e);
    }

    let mut orbit = Orbit { yaw: 0.8, pitch: 0.6, distance: 16.0 };
    let mut status = String::new();

    loop {
        if is_key_pressed(KeyCode::Escape) {
            break;
        }
        let dt = get_frame_time();
        orbit.update(dt);

        if is_key_pressed(KeyCode::F) {
            status = match engine.flip_room(RoomId(0)) {
                Ok((from, to)) => format!("flipped room {} -> {}", from, to),
                Err(e) => e.to_string(),
            };
        }

        engine.frame(dt as f64);
        let list = DrawList::build(&engine);

        clear_background(Color::from_rgba(20, 22, 28, 255));
        let target = list.entities.first()
            .map(|e| e.root.translation.vector)
            .map(|p| to_view(p.x, p.y, p.z))
            .unwrap_or(Vec3::ZERO);
        set_camera(&orbit.camera(target));
        draw_world(&list);

        set_default_camera();
        let header = if engine.is_loaded() {
            format!("steps {}  alpha {:.2}", engine.clock().total_steps(), list.alpha)
        } else {
            "no level loaded".to_string()
        };
        draw_text(&header, 10.0, 20.0, 20.0, WHITE);
        draw_text(&status, 10.0, 40.0, 20.0, LIGHTGRAY);
        if let Some(line) = engine.console().notifications().last() {
            draw_text(line, 10.0, screen_height() - 10.0, 20.0, RED);
        }

        next_frame().await;
    }
}
