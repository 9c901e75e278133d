//! Shared test fixtures: a small gedit-like desktop and a quiet engine.

use std::sync::Arc;

use crate::accessible::{Role, State};
use crate::config::Config;
use crate::dump::NodeSnapshot;
use crate::engine::Engine;
use crate::memory::{MemId, MemoryDesktop, RecordingInput};
use crate::node::Node;

/// Configuration with every delay zeroed and a short search cutoff.
pub(crate) fn quiet_config() -> Config {
    let mut config = Config::default();
    config.default_delay = 0.0;
    config.action_delay = 0.0;
    config.typing_delay = 0.0;
    config.double_click_delay = 0.0;
    config.search_backoff_duration = 0.0;
    config.search_cutoff_count = 2;
    config.check_for_a11y = false;
    config.log_to_file = false;
    config
}

/// An engine over `desktop` whose input is recorded, not delivered.
pub(crate) fn engine(desktop: &MemoryDesktop) -> (Arc<Engine>, Arc<RecordingInput>) {
    let input = Arc::new(RecordingInput::new());
    let engine = Engine::with_config(Arc::new(desktop.clone()), input.clone(), quiet_config());
    (engine, input)
}

/// A find bar inside a text editor window.
///
/// ```text
/// gedit (application)
///   Untitled - gedit (frame)
///     (panel)
///       Find: (label)
///       (text, labelled by Find:)   "hello"
///       OK (push button)
///       Cancel (push button, insensitive)
///       Wrap (check box)
///       Plain (combo box)
///         (menu)
///           Plain (menu item, hidden)
///           Clear (menu item, hidden)
///       Zoom (slider)
///       Results (list)
///       Help (text, with a link)
/// ```
pub(crate) struct Gedit {
    pub desktop: MemoryDesktop,
    pub app: MemId,
    pub frame: MemId,
    pub panel: MemId,
    pub label: MemId,
    pub entry: MemId,
    pub ok: MemId,
    pub cancel: MemId,
    pub wrap: MemId,
    pub combo: MemId,
    pub clear: MemId,
    pub slider: MemId,
    pub list: MemId,
    pub help: MemId,
}

impl Gedit {
    pub fn new() -> Self {
        let desktop = MemoryDesktop::new();
        let combo_menu = NodeSnapshot::new(Role::Menu, "")
            .hidden()
            .child(NodeSnapshot::new(Role::MenuItem, "Plain").hidden().action("click"))
            .child(NodeSnapshot::new(Role::MenuItem, "Clear").hidden().action("click"));
        let rows = (1..=3).map(|i| {
            NodeSnapshot::new(Role::ListItem, format!("Result {}", i)).with_state(State::Selectable)
        });
        let panel = NodeSnapshot::new(Role::Panel, "")
            .extents(0, 20, 800, 200)
            .child(NodeSnapshot::new(Role::Label, "Find:").extents(10, 20, 60, 20))
            .child(
                NodeSnapshot::new(Role::Text, "")
                    .editable_text("hello")
                    .with_state(State::Focusable)
                    .extents(80, 20, 300, 20)
                    .labelled_by("Find:"),
            )
            .child(
                NodeSnapshot::new(Role::PushButton, "OK")
                    .action("click")
                    .with_state(State::Focusable)
                    .extents(10, 50, 80, 30),
            )
            .child(
                NodeSnapshot::new(Role::PushButton, "Cancel")
                    .action("click")
                    .insensitive()
                    .extents(100, 50, 80, 30),
            )
            .child(
                NodeSnapshot::new(Role::CheckBox, "Wrap")
                    .action("toggle")
                    .with_state(State::Checked)
                    .extents(190, 50, 80, 30),
            )
            .child(
                NodeSnapshot::new(Role::ComboBox, "Plain")
                    .action("press")
                    .extents(280, 50, 100, 30)
                    .child(combo_menu),
            )
            .child(NodeSnapshot::new(Role::Slider, "Zoom").value(50.0, 0.0, 100.0, 1.0))
            .child(
                NodeSnapshot::new(Role::List, "Results")
                    .selectable_children()
                    .children(rows),
            )
            .child(
                NodeSnapshot::new(Role::Text, "Help")
                    .text("See the manual")
                    .link(
                        NodeSnapshot::new(Role::Link, "manual")
                            .action("jump")
                            .uri("https://example.org/help"),
                    ),
            );
        let app = desktop.add(
            desktop.root_id(),
            NodeSnapshot::new(Role::Application, "gedit")
                .toolkit("GTK", "3.24", 7)
                .child(
                    NodeSnapshot::new(Role::Frame, "Untitled - gedit")
                        .with_state(State::Active)
                        .extents(0, 0, 800, 600)
                        .child(panel),
                ),
        );

        let find = |role: Role, name: &str| {
            desktop
                .find_role(role, name)
                .unwrap_or_else(|| panic!("fixture lacks {:?} {:?}", role, name))
        };
        let frame = find(Role::Frame, "Untitled - gedit");
        let panel = find(Role::Panel, "");
        let entry = find(Role::Text, "");
        let combo = find(Role::ComboBox, "Plain");
        let clear = find(Role::MenuItem, "Clear");
        desktop.on_action(clear, "click", move |tree, _| tree.set_name(combo, "Clear"));

        Gedit {
            app,
            frame,
            panel,
            label: find(Role::Label, "Find:"),
            entry,
            ok: find(Role::PushButton, "OK"),
            cancel: find(Role::PushButton, "Cancel"),
            wrap: find(Role::CheckBox, "Wrap"),
            combo,
            clear,
            slider: find(Role::Slider, "Zoom"),
            list: find(Role::List, "Results"),
            help: find(Role::Text, "Help"),
            desktop,
        }
    }

    /// A node handle on `id` bound to `engine`.
    pub fn node(&self, engine: &Arc<Engine>, id: MemId) -> Node {
        Node::new(engine.clone(), self.desktop.accessible(id))
    }
}
