//! Shared helpers for spaniel-core integration tests.
//!
//! Builds a small spreadsheet-like application on the in-memory desktop and
//! an engine over it with every delay zeroed.

#![allow(dead_code)]

use std::sync::Arc;

use spaniel_core::accessible::{Role, State};
use spaniel_core::config::Config;
use spaniel_core::dump::NodeSnapshot;
use spaniel_core::engine::Engine;
use spaniel_core::memory::{MemId, MemoryDesktop, RecordingInput};

pub const ROWS: usize = 4;
pub const COLUMNS: usize = 3;

/// Configuration for tests: no sleeps, two search attempts.
pub fn quiet_config() -> Config {
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

pub fn engine(desktop: &MemoryDesktop) -> (Arc<Engine>, Arc<RecordingInput>) {
    let input = Arc::new(RecordingInput::new());
    let engine = Engine::with_config(Arc::new(desktop.clone()), input.clone(), quiet_config());
    (engine, input)
}

/// Ids of the interesting nodes in the sheets application.
pub struct Sheets {
    pub desktop: MemoryDesktop,
    pub app: MemId,
    pub title: MemId,
    pub save: MemId,
    pub delete: MemId,
    pub format: MemId,
}

/// ```text
/// sheets (application)
///   Budget.ods - Sheets (frame)
///     (filler)
///       Title: (label)
///       (text, labelled by Title:)
///       Save (push button)
///       Delete (push button, insensitive)
///       Number (combo box)
///         (menu) Number / Percent / Date (menu items)
///       Grid (table) ROWS x COLUMNS table cells
/// ```
pub fn sheets() -> Sheets {
    let desktop = MemoryDesktop::new();
    let formats = ["Number", "Percent", "Date"]
        .into_iter()
        .map(|f| NodeSnapshot::new(Role::MenuItem, f).hidden().action("click"));
    let cells = (0..ROWS).flat_map(|r| {
        (0..COLUMNS).map(move |c| {
            NodeSnapshot::new(Role::TableCell, format!("R{}C{}", r + 1, c + 1))
                .with_state(State::Selectable)
        })
    });
    let filler = NodeSnapshot::new(Role::Filler, "")
        .child(NodeSnapshot::new(Role::Label, "Title:"))
        .child(
            NodeSnapshot::new(Role::Text, "")
                .editable_text("")
                .with_state(State::Focusable)
                .labelled_by("Title:"),
        )
        .child(NodeSnapshot::new(Role::PushButton, "Save").action("click"))
        .child(
            NodeSnapshot::new(Role::PushButton, "Delete")
                .action("click")
                .insensitive(),
        )
        .child(
            NodeSnapshot::new(Role::ComboBox, "Number")
                .action("press")
                .child(NodeSnapshot::new(Role::Menu, "").hidden().children(formats)),
        )
        .child(
            NodeSnapshot::new(Role::Table, "Grid")
                .selectable_children()
                .children(cells),
        );
    let app = desktop.add(
        desktop.root_id(),
        NodeSnapshot::new(Role::Application, "sheets")
            .toolkit("GTK", "3.24", 11)
            .child(
                NodeSnapshot::new(Role::Frame, "Budget.ods - Sheets")
                    .with_state(State::Active)
                    .child(filler),
            ),
    );

    let combo = desktop
        .find_role(Role::ComboBox, "Number")
        .expect("combo box");
    for format in ["Percent", "Date"] {
        let item = desktop.find_role(Role::MenuItem, format).expect("menu item");
        desktop.on_action(item, "click", move |tree, _| tree.set_name(combo, format));
    }

    Sheets {
        app,
        title: desktop.find_role(Role::Text, "").expect("title entry"),
        save: desktop.find_role(Role::PushButton, "Save").expect("save"),
        delete: desktop.find_role(Role::PushButton, "Delete").expect("delete"),
        format: combo,
        desktop,
    }
}
