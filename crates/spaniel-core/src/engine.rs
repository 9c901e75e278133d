//! The engine context shared by every node.
//!
//! An [`Engine`] bundles the accessibility bus, the input injector, the
//! configuration and the translation registry. Nodes hold an `Arc<Engine>`,
//! so configuration changes made through the engine are seen by every node
//! created from it.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use spaniel_core::config::Config;
//! use spaniel_core::engine::Engine;
//! use spaniel_core::memory::{MemoryDesktop, RecordingInput};
//!
//! # async fn example() -> spaniel_core::error::Result<()> {
//! let desktop = MemoryDesktop::new();
//! let engine = Engine::start(Arc::new(desktop), Arc::new(RecordingInput::new()), Config::load()).await?;
//! let root = engine.root().await?;
//! for app in root.applications().await? {
//!     println!("{}", app.name().await?);
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use tracing::{debug, info};

use crate::accessible::{AccessibilityBus, EventListener, ObjectId};
use crate::config::Config;
use crate::error::{Result, SpanielError};
use crate::i18n::{self, Catalog, PackageDb, TranslatableString, TranslationRegistry};
use crate::input::{Input, InputInjector};
use crate::node::Node;
use crate::predicate::Predicate;
use crate::root::Root;

/// Shared context for nodes: bus, input, configuration and translations.
pub struct Engine {
    bus: Arc<dyn AccessibilityBus>,
    input: Input,
    config: RwLock<Config>,
    translations: RwLock<TranslationRegistry>,
    truncated: Mutex<HashSet<ObjectId>>,
}

impl Engine {
    /// Creates an engine with default configuration.
    pub fn new(bus: Arc<dyn AccessibilityBus>, injector: Arc<dyn InputInjector>) -> Arc<Self> {
        Self::with_config(bus, injector, Config::default())
    }

    /// Creates an engine with the given configuration.
    pub fn with_config(
        bus: Arc<dyn AccessibilityBus>,
        injector: Arc<dyn InputInjector>,
        config: Config,
    ) -> Arc<Self> {
        Arc::new(Self {
            bus,
            input: Input::new(injector),
            config: RwLock::new(config),
            translations: RwLock::new(TranslationRegistry::new()),
            truncated: Mutex::new(HashSet::new()),
        })
    }

    /// Creates an engine after validating `config` and, when
    /// `check_for_a11y` is set, confirming the bus has accessibility enabled.
    pub async fn start(
        bus: Arc<dyn AccessibilityBus>,
        injector: Arc<dyn InputInjector>,
        config: Config,
    ) -> Result<Arc<Self>> {
        config.validate()?;
        if config.check_for_a11y {
            let enabled = bus
                .is_enabled()
                .await
                .map_err(|e| SpanielError::Bus(e.to_string()))?;
            if !enabled {
                return Err(SpanielError::DependencyNotFound(
                    "accessibility is not enabled on the session bus".to_string(),
                ));
            }
        }
        Ok(Self::with_config(bus, injector, config))
    }

    pub fn bus(&self) -> &Arc<dyn AccessibilityBus> {
        &self.bus
    }

    pub fn input(&self) -> &Input {
        &self.input
    }

    /// The desktop root node.
    pub async fn root(self: &Arc<Self>) -> Result<Root> {
        let desktop = self
            .bus
            .desktop()
            .await
            .map_err(|e| SpanielError::Bus(e.to_string()))?;
        Ok(Root::new(Node::new(self.clone(), desktop)))
    }

    /// A snapshot of the current configuration.
    pub fn config(&self) -> Config {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_config(&self, config: Config) {
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = config;
    }

    /// Applies `f` to the configuration in place.
    pub fn update_config(&self, f: impl FnOnce(&mut Config)) {
        f(&mut self.config.write().unwrap_or_else(PoisonError::into_inner));
    }

    /// Restores the documented defaults.
    pub fn reset_config(&self) {
        self.update_config(Config::reset);
    }

    pub fn add_catalog(&self, catalog: Catalog) {
        self.translations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .add(catalog);
    }

    /// Loads the catalogs of `package` (and its dependencies) for the
    /// current languages. Returns the number of catalogs added.
    pub fn load_translations(&self, db: &dyn PackageDb, package: &str) -> Result<usize> {
        let languages = i18n::current_languages();
        let catalogs = i18n::load_translations_from_package(db, package, &languages)?;
        let count = catalogs.len();
        let mut registry = self.translations.write().unwrap_or_else(PoisonError::into_inner);
        for catalog in catalogs {
            registry.add(catalog);
        }
        info!(package, count, "loaded translations");
        Ok(count)
    }

    /// Wraps `source` with its known translations.
    pub fn translatable(&self, source: &str) -> TranslatableString {
        let ts = self
            .translations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .translatable(source);
        if self.config().debug_translation && !ts.translations().is_empty() {
            debug!(source, translations = ?ts.translations(), "translated");
        }
        ts
    }

    /// `predicate` with its names translated through the loaded catalogs.
    pub fn translate_predicate(&self, predicate: &Predicate) -> Predicate {
        let registry = self.translations.read().unwrap_or_else(PoisonError::into_inner);
        predicate.translated(&registry)
    }

    /// Sleeps for `duration`, tracing it when `debug_sleep` is set.
    pub async fn sleep(&self, duration: Duration, reason: &str) {
        if duration.is_zero() {
            return;
        }
        if self.config().debug_sleep {
            debug!(ms = duration.as_millis() as u64, reason, "sleeping");
        }
        tokio::time::sleep(duration).await;
    }

    /// Records that the children of `id` were truncated; true only the first
    /// time for each object.
    pub(crate) fn first_truncation(&self, id: &ObjectId) -> bool {
        self.truncated
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone())
    }

    /// Types `text` as synthetic key presses, one character at a time,
    /// pausing `typing_delay` between keys.
    pub async fn type_text(&self, text: &str) -> Result<()> {
        debug!(text, "raw typing");
        let delay = self.config().typing_delay();
        for (i, c) in text.chars().enumerate() {
            if i > 0 {
                self.sleep(delay, "between keystrokes").await;
            }
            self.input.type_char(c).await?;
        }
        Ok(())
    }

    /// Registers with the bus event registry.
    pub async fn register_event_listener(&self, event_names: &[&str]) -> Result<EventListener> {
        self.bus
            .register_event_listener(event_names)
            .await
            .map_err(|e| SpanielError::Bus(e.to_string()))
    }
}
