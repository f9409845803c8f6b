//! Collaborator seams
//!
//! Scripting, AI and audio live outside this crate. The driver talks to them
//! through these traits once per logic step; the null implementations let
//! the engine run headless.

use thiserror::Error;

use super::runtime::World;

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("script error: {0}")]
    Runtime(String),
    #[error("no script engine attached")]
    Unavailable,
}

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("audio device error: {0}")]
    Device(String),
}

pub trait ScriptHost {
    /// Resume scheduled script tasks
    fn advance_tasks(&mut self, dt: f32) -> Result<(), ScriptError>;
    /// Run one console line, returning what it printed
    fn run_string(&mut self, source: &str) -> Result<String, ScriptError>;
}

pub trait AiDirector {
    fn update(&mut self, world: &mut World, dt: f32);
}

pub trait AudioMixer {
    fn update(&mut self) -> Result<(), AudioError>;
}

#[derive(Debug, Default)]
pub struct NullScriptHost;

impl ScriptHost for NullScriptHost {
    fn advance_tasks(&mut self, _dt: f32) -> Result<(), ScriptError> {
        Ok(())
    }

    fn run_string(&mut self, _source: &str) -> Result<String, ScriptError> {
        Err(ScriptError::Unavailable)
    }
}

#[derive(Debug, Default)]
pub struct NullAiDirector;

impl AiDirector for NullAiDirector {
    fn update(&mut self, _world: &mut World, _dt: f32) {}
}

#[derive(Debug, Default)]
pub struct NullAudioMixer;

impl AudioMixer for NullAudioMixer {
    fn update(&mut self) -> Result<(), AudioError> {
        Ok(())
    }
}

/// The external systems an `Engine` drives each step
pub struct Collaborators {
    pub script: Box<dyn ScriptHost>,
    pub ai: Box<dyn AiDirector>,
    pub audio: Box<dyn AudioMixer>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            script: Box::new(NullScriptHost),
            ai: Box::new(NullAiDirector),
            audio: Box::new(NullAudioMixer),
        }
    }
}
