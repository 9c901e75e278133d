//! Records user interaction as a replayable script.
//!
//! [`Recorder`] listens for mouse presses and text insertions on the bus,
//! resolves the node involved to its absolute search path and hands it to a
//! [`ScriptWriter`]. The writer names each node once and reuses the longest
//! path prefix it has already bound, so a recording reads like:
//!
//! ```text
//! geditApp = root.application("gedit", recursive=false)
//! oKButton = geditApp.window("Untitled - gedit", recursive=false).button("OK")
//! oKButton.click()
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Local;
use tracing::{debug, info, warn};

use crate::accessible::{AccessibleEvent, EventListener};
use crate::engine::Engine;
use crate::error::Result;
use crate::node::Node;
use crate::predicate::quote;
use crate::script::ROOT_VARIABLE;
use crate::search_path::SearchPath;

/// Bus events the recorder registers for.
pub const RECORDED_EVENTS: &[&str] = &["mouse:button", "object:text-changed:insert"];

/// Builds script text from search paths and actions.
#[derive(Debug, Default)]
pub struct ScriptWriter {
    lines: Vec<String>,
    bound: Vec<(SearchPath, String)>,
    names: HashSet<String>,
    /// Variable and accumulated text of the trailing `typeText` line.
    typing: Option<(String, String)>,
}

impl ScriptWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// A writer whose script starts with a timestamp comment.
    pub fn with_header() -> Self {
        let mut writer = Self::new();
        writer.comment(&format!(
            "spaniel script recorded {}",
            Local::now().format("%Y-%m-%d %H:%M:%S")
        ));
        writer
    }

    fn push(&mut self, line: String) {
        self.typing = None;
        self.lines.push(line);
    }

    pub fn comment(&mut self, text: &str) {
        for part in text.lines() {
            self.push(format!("# {}", part));
        }
    }

    fn unique_name(&mut self, base: String) -> String {
        let mut name = base.clone();
        let mut n = 2;
        while name == ROOT_VARIABLE || self.names.contains(&name) {
            name = format!("{}{}", base, n);
            n += 1;
        }
        self.names.insert(name.clone());
        name
    }

    fn bound_variable(&self, path: &SearchPath) -> Option<&str> {
        self.bound
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, v)| v.as_str())
    }

    /// The variable holding the node at `path`, emitting its assignment
    /// first if needed. The application prefix is always bound on its own.
    pub fn variable_for(&mut self, path: &SearchPath) -> String {
        if path.is_empty() {
            return ROOT_VARIABLE.to_string();
        }
        if let Some(var) = self.bound_variable(path) {
            return var.to_string();
        }
        if path.len() > 1 {
            self.variable_for(&path.prefix(1));
        }

        let (base, base_path) = self
            .bound
            .iter()
            .filter(|(p, _)| p.len() < path.len() && path.starts_with(p))
            .max_by_key(|(p, _)| p.len())
            .map(|(p, v)| (v.clone(), p.clone()))
            .unwrap_or_else(|| (ROOT_VARIABLE.to_string(), SearchPath::new()));
        let relative = base_path.relative_to(path).unwrap_or_else(|| path.clone());

        let suggested = path
            .predicate_at(path.len() - 1)
            .map(|p| p.make_script_variable_name())
            .unwrap_or_else(|| "node".to_string());
        let name = self.unique_name(suggested);
        self.push(format!("{} = {}{}", name, base, relative.make_script_method_call()));
        self.bound.push((path.clone(), name.clone()));
        name
    }

    /// Emits `var.call` for the node at `path`, e.g. `call = "click()"`.
    pub fn action(&mut self, path: &SearchPath, call: &str) {
        let var = self.variable_for(path);
        self.push(format!("{}.{}", var, call));
    }

    /// Emits a `typeText` line, extending the previous one when it typed
    /// into the same node.
    pub fn type_text(&mut self, path: &SearchPath, text: &str) {
        let var = self.variable_for(path);
        if let Some((typed_var, typed)) = self.typing.take() {
            if typed_var == var {
                let typed = typed + text;
                if let Some(last) = self.lines.last_mut() {
                    *last = format!("{}.typeText({})", var, quote(&typed));
                }
                self.typing = Some((var, typed));
                return;
            }
        }
        self.push(format!("{}.typeText({})", var, quote(text)));
        self.typing = Some((var, text.to_string()));
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// The script so far, one statement per line.
    pub fn script(&self) -> String {
        let mut out = self.lines.join("\n");
        out.push('\n');
        out
    }
}

/// Finds the deepest showing node whose extents contain the point, in the
/// subtree of `from`. Later siblings win over earlier ones.
pub async fn node_at_point(from: &Node, x: i32, y: i32) -> Result<Option<Node>> {
    let mut hit = None;
    let mut stack = vec![from.clone()];
    while let Some(node) = stack.pop() {
        let showing = node.showing().await.unwrap_or(false);
        if showing && node.extents().await.is_ok_and(|r| r.contains(x, y)) {
            hit = Some(node.clone());
        }
        let children = node.children_tolerant().await.unwrap_or_default();
        stack.extend(children.into_iter().rev());
    }
    Ok(hit)
}

/// Turns bus events into script lines.
pub struct Recorder {
    engine: Arc<Engine>,
    listener: EventListener,
    writer: ScriptWriter,
}

impl Recorder {
    /// Registers for [`RECORDED_EVENTS`] and starts an empty script.
    pub async fn start(engine: &Arc<Engine>) -> Result<Self> {
        let listener = engine.register_event_listener(RECORDED_EVENTS).await?;
        info!("recording started");
        Ok(Self {
            engine: engine.clone(),
            listener,
            writer: ScriptWriter::with_header(),
        })
    }

    pub fn writer(&self) -> &ScriptWriter {
        &self.writer
    }

    /// Records one event. Events that cannot be resolved to a node are
    /// skipped with a warning.
    pub async fn handle(&mut self, event: &AccessibleEvent) -> Result<()> {
        if let Some(button) = pressed_button(&event.kind) {
            return self.record_press(event.detail1, event.detail2, button).await;
        }
        if event.matches("object:text-changed:insert") {
            let (Some(source), Some(text)) = (&event.source, &event.any_data) else {
                return Ok(());
            };
            let node = Node::new(self.engine.clone(), source.clone());
            match node.absolute_search_path().await {
                Ok(path) => self.writer.type_text(&path, text),
                Err(e) => warn!(error = %e, "cannot resolve typing target"),
            }
        }
        Ok(())
    }

    async fn record_press(&mut self, x: i32, y: i32, button: u32) -> Result<()> {
        let root = self.engine.root().await?;
        let Some(node) = node_at_point(root.node(), x, y).await? else {
            debug!(x, y, "press outside any node");
            return Ok(());
        };
        let path = match node.absolute_search_path().await {
            Ok(path) => path,
            Err(e) => {
                warn!(error = %e, "cannot resolve click target");
                return Ok(());
            }
        };
        let clickable = button == 1 && node.action("click").await.is_ok();
        let call = if clickable {
            "click()".to_string()
        } else {
            format!("rawClick({})", button)
        };
        debug!(path = %path, call = %call, "recorded press");
        self.writer.action(&path, &call);
        Ok(())
    }

    /// Waits for the next event and records it. Returns false once the bus
    /// stops delivering events.
    pub async fn record_next(&mut self) -> Result<bool> {
        match self.listener.next().await {
            Some(event) => {
                self.handle(&event).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Records every event already queued. Returns how many were seen.
    pub async fn drain(&mut self) -> Result<usize> {
        let mut seen = 0;
        while let Some(event) = self.listener.try_next() {
            self.handle(&event).await?;
            seen += 1;
        }
        Ok(seen)
    }

    /// Stops recording and returns the script.
    pub fn finish(self) -> String {
        self.listener.deregister();
        info!(lines = self.writer.lines().len(), "recording finished");
        self.writer.script()
    }
}

/// The button number of a `mouse:button:<n>p` press event.
fn pressed_button(kind: &str) -> Option<u32> {
    kind.strip_prefix("mouse:button:")?
        .strip_suffix('p')?
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{quiet_config, Gedit};
    use crate::memory::RecordingInput;
    use crate::predicate::Predicate;
    use crate::script::ScriptRunner;

    fn path(steps: &[(Predicate, bool)]) -> SearchPath {
        let mut path = SearchPath::new();
        for (p, r) in steps {
            path.append(p.clone(), *r);
        }
        path
    }

    #[test]
    fn writer_binds_application_then_longest_prefix() {
        let app = (Predicate::ApplicationNamed("gedit".into()), false);
        let win = (Predicate::WindowNamed("Untitled - gedit".into()), false);
        let ok = path(&[app.clone(), win.clone(), (Predicate::ButtonNamed("OK".into()), true)]);
        let window = path(&[app.clone(), win.clone()]);
        let help = path(&[app, win, (Predicate::ButtonNamed("Help".into()), true)]);

        let mut writer = ScriptWriter::new();
        writer.action(&ok, "click()");
        writer.variable_for(&window);
        writer.action(&help, "click()");
        writer.action(&ok, "click()");
        assert_eq!(
            writer.lines(),
            [
                "geditApp = root.application(\"gedit\", recursive=false)",
                "oKButton = geditApp.window(\"Untitled - gedit\", recursive=false).button(\"OK\")",
                "oKButton.click()",
                "untitledGeditWin = geditApp.window(\"Untitled - gedit\", recursive=false)",
                "helpButton = untitledGeditWin.button(\"Help\")",
                "helpButton.click()",
                "oKButton.click()",
            ]
        );
    }

    #[test]
    fn writer_merges_consecutive_typing() {
        let entry = path(&[
            (Predicate::ApplicationNamed("gedit".into()), false),
            (Predicate::LabelledAs("Find:".into()), true),
        ]);
        let mut writer = ScriptWriter::new();
        writer.type_text(&entry, "a");
        writer.type_text(&entry, "b\"");
        writer.action(&entry, "rawClick(1)");
        writer.type_text(&entry, "c");
        assert_eq!(
            writer.lines(),
            [
                "geditApp = root.application(\"gedit\", recursive=false)",
                "findNode = geditApp.childLabelled(\"Find:\")",
                "findNode.typeText(\"ab\\\"\")",
                "findNode.rawClick(1)",
                "findNode.typeText(\"c\")",
            ]
        );
    }

    #[test]
    fn writer_keeps_names_unique() {
        let a = path(&[(Predicate::ApplicationNamed("x".into()), false), (Predicate::ButtonNamed("OK".into()), true)]);
        let b = path(&[(Predicate::ApplicationNamed("y".into()), false), (Predicate::ButtonNamed("OK".into()), true)]);
        let mut writer = ScriptWriter::new();
        assert_eq!(writer.variable_for(&a), "oKButton");
        assert_eq!(writer.variable_for(&b), "oKButton2");
    }

    #[test]
    fn press_events_parse_buttons() {
        assert_eq!(pressed_button("mouse:button:1p"), Some(1));
        assert_eq!(pressed_button("mouse:button:3p"), Some(3));
        assert_eq!(pressed_button("mouse:button:1r"), None);
        assert_eq!(pressed_button("object:text-changed:insert"), None);
    }

    #[tokio::test]
    async fn recorded_session_replays() {
        let gedit = Gedit::new();
        let input = Arc::new(RecordingInput::attached(gedit.desktop.clone()));
        let engine = Engine::with_config(Arc::new(gedit.desktop.clone()), input, quiet_config());
        let mut recorder = Recorder::start(&engine).await.unwrap();

        gedit.node(&engine, gedit.ok).raw_click(1).await.unwrap();
        gedit.node(&engine, gedit.entry).type_text("xy").await.unwrap();
        gedit.node(&engine, gedit.wrap).raw_click(3).await.unwrap();
        assert_eq!(recorder.drain().await.unwrap(), 5);

        let script = recorder.finish();
        assert!(script.starts_with("# spaniel script recorded"), "{script}");
        assert!(script.contains("oKButton.click()"), "{script}");
        assert!(script.contains(".typeText(\"xy\")"), "{script}");
        assert!(script.contains(".rawClick(3)"), "{script}");

        let replay = Gedit::new();
        let (replay_engine, replay_input) = crate::fixtures::engine(&replay.desktop);
        let mut runner = ScriptRunner::new(replay_engine.root().await.unwrap());
        runner.run_source(&script).await.unwrap();
        assert_eq!(replay.desktop.invocations(), vec![(replay.ok, "click".to_string())]);
        assert_eq!(replay.desktop.text(replay.entry).as_deref(), Some("xyhello"));
        assert_eq!(replay_input.events().len(), 1);
    }
}
