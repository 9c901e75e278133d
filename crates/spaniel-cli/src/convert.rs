use std::io::{self, Read};
use std::path::Path;
use std::sync::Arc;

use spaniel_core::config::Config;
use spaniel_core::engine::Engine;
use spaniel_core::error::{Result, SpanielError};
use spaniel_core::memory::{InputEvent, MemoryDesktop, RecordingInput};
use spaniel_core::recorder::Recorder;
use tracing::debug;

/// Replays a JSONL input log against a desktop snapshot while a [`Recorder`]
/// listens, producing the script that reproduces the session.
pub struct EventLogConverter {
    desktop: MemoryDesktop,
    config: Config,
}

impl EventLogConverter {
    pub fn new(desktop: MemoryDesktop, config: Config) -> Self {
        Self { desktop, config }
    }

    pub async fn convert_file(&self, path: &Path) -> Result<String> {
        let content = std::fs::read_to_string(path)?;
        self.convert_str(&content).await
    }

    pub async fn convert_stdin(&self) -> Result<String> {
        let mut content = String::new();
        io::stdin().read_to_string(&mut content)?;
        self.convert_str(&content).await
    }

    pub async fn convert_str(&self, content: &str) -> Result<String> {
        let input = Arc::new(RecordingInput::attached(self.desktop.clone()));
        let engine = Engine::with_config(Arc::new(self.desktop.clone()), input, self.config.clone());
        let mut recorder = Recorder::start(&engine).await?;

        for (index, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let event: InputEvent = serde_json::from_str(line).map_err(|e| {
                SpanielError::InvalidArgument(format!("line {}: invalid event: {}", index + 1, e))
            })?;
            deliver(&engine, &event).await?;
            let seen = recorder.drain().await?;
            debug!(line = index + 1, seen, "replayed input event");
        }

        Ok(recorder.finish())
    }
}

async fn deliver(engine: &Engine, event: &InputEvent) -> Result<()> {
    let input = engine.input();
    match event {
        InputEvent::Motion { x, y } => input.absolute_motion(*x, *y).await,
        InputEvent::RelativeMotion { dx, dy } => input.relative_motion(*dx, *dy).await,
        InputEvent::Press { x, y, button } => input.press(*x, *y, *button).await,
        InputEvent::Release { x, y, button } => input.release(*x, *y, *button).await,
        InputEvent::Click { x, y, button } => input.click(*x, *y, *button).await,
        InputEvent::DoubleClick { x, y, button } => input.double_click(*x, *y, *button).await,
        InputEvent::Type(text) => engine.type_text(text).await,
        InputEvent::KeyCombo(combo) => input.key_combo(combo).await,
        InputEvent::Key(name) => input.press_key(name).await,
    }
}
