//! # spaniel-core
//!
//! Core library for GUI test automation through the accessibility bus.
//!
//! Applications expose their widgets as a tree of accessible objects. This
//! crate wraps those objects as [`node::Node`]s, finds them with retrying
//! predicate searches, reads and writes their attributes and drives them
//! through their actions or synthesized input.
//!
//! ## Modules
//!
//! - [`accessible`] - Bus abstraction: roles, states, the `Accessible` trait and events
//! - [`memory`] - In-memory desktop provider and recording input injector
//! - [`engine`] - Shared context: bus, input, configuration and translations
//! - [`config`] - Runtime configuration (delays, search retries, logging)
//! - [`node`] - Node handles and attribute access
//! - [`predicate`] / [`search`] / [`search_path`] - Finding nodes and replaying how they were found
//! - [`action`] - Named actions and sensitivity checks
//! - [`root`] - Desktop root, applications and windows
//! - [`input`] - Raw mouse and keyboard input
//! - [`i18n`] - Translation of search strings
//! - [`procedural`] - Focus-based procedural API
//! - [`script`] - Script parser and runner
//! - [`recorder`] - Records interaction as a script
//! - [`dump`] - Tree dumps and JSON snapshots
//! - [`logging`] - Tracing subscriber setup
//!
//! ## Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use spaniel_core::engine::Engine;
//! use spaniel_core::memory::{MemoryDesktop, RecordingInput};
//!
//! # async fn example() -> spaniel_core::error::Result<()> {
//! let desktop = MemoryDesktop::load(Path::new("desktop.json"))?;
//! let engine = Engine::new(Arc::new(desktop), Arc::new(RecordingInput::new()));
//! let gedit = engine.root().await?.application("gedit").await?;
//! gedit.node().button("OK").await?.click().await?;
//! # Ok(())
//! # }
//! ```

pub mod accessible;
pub mod action;
pub mod config;
pub mod dump;
pub mod engine;
pub mod error;
pub mod i18n;
pub mod input;
pub mod logging;
pub mod memory;
pub mod node;
pub mod predicate;
pub mod procedural;
pub mod recorder;
pub mod root;
pub mod script;
pub mod search;
pub mod search_path;

#[cfg(test)]
pub(crate) mod fixtures;
