//! Accessibility provider trait for backend-agnostic tree access.
//!
//! This module defines the seam between spaniel and the platform accessibility
//! bus. A host implements [`AccessibilityBus`] (desktop root plus event
//! registry) and [`Accessible`] (one remote UI object). Everything above this
//! module, from predicates to the procedural facade, talks to the bus only
//! through these traits.
//!
//! Capability interfaces (Action, Component, Text, ...) are optional facets of
//! an accessible. Their methods have default implementations that report
//! [`BusError::NotSupported`], so a backend only overrides the capabilities a
//! given object really has.
//!
//! # Example
//!
//! ```no_run
//! use spaniel_core::accessible::{AccessibilityBus, Role};
//! use spaniel_core::memory::MemoryDesktop;
//!
//! # async fn example() -> Result<(), spaniel_core::accessible::BusError> {
//! let desktop = MemoryDesktop::new();
//! let root = desktop.desktop().await?;
//! assert_eq!(root.role().await?, Role::DesktopFrame);
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::warn;

/// Optional capability interfaces an accessible may implement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Action,
    Component,
    Text,
    EditableText,
    Hypertext,
    Hyperlink,
    Value,
    Application,
    Selection,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::Action => "Action",
            Capability::Component => "Component",
            Capability::Text => "Text",
            Capability::EditableText => "EditableText",
            Capability::Hypertext => "Hypertext",
            Capability::Hyperlink => "Hyperlink",
            Capability::Value => "Value",
            Capability::Application => "Application",
            Capability::Selection => "Selection",
        };
        f.write_str(name)
    }
}

/// Errors reported by an accessibility backend.
///
/// The node layer maps these onto [`SpanielError`](crate::error::SpanielError)
/// kinds and adds node context.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    /// The remote object no longer exists.
    #[error("accessible object is dead")]
    Dead,

    /// The object does not implement the requested capability.
    #[error("{0} interface not implemented")]
    NotSupported(Capability),

    /// Any other bus failure.
    #[error("bus call failed: {0}")]
    Failed(String),
}

/// Result type for raw bus calls.
pub type BusResult<T> = Result<T, BusError>;

macro_rules! roles {
    ($($variant:ident => $name:literal),* $(,)?) => {
        /// Accessible role, in bijection with its role name (see [`Role::name`]).
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum Role {
            $($variant,)*
        }

        impl Role {
            /// Every known role, in declaration order.
            pub const ALL: &'static [Role] = &[$(Role::$variant,)*];

            /// The role name as reported by the bus (`"push button"`, `"frame"`, ...).
            pub fn name(self) -> &'static str {
                match self {
                    $(Role::$variant => $name,)*
                }
            }

            /// Inverse of [`Role::name`].
            pub fn from_name(name: &str) -> Option<Role> {
                match name {
                    $($name => Some(Role::$variant),)*
                    _ => None,
                }
            }
        }
    };
}

roles! {
    Invalid => "invalid",
    AcceleratorLabel => "accelerator label",
    Alert => "alert",
    Animation => "animation",
    Arrow => "arrow",
    Calendar => "calendar",
    Canvas => "canvas",
    CheckBox => "check box",
    CheckMenuItem => "check menu item",
    ColorChooser => "color chooser",
    ColumnHeader => "column header",
    ComboBox => "combo box",
    DateEditor => "date editor",
    DesktopIcon => "desktop icon",
    DesktopFrame => "desktop frame",
    Dial => "dial",
    Dialog => "dialog",
    DirectoryPane => "directory pane",
    DrawingArea => "drawing area",
    FileChooser => "file chooser",
    Filler => "filler",
    FontChooser => "font chooser",
    Frame => "frame",
    GlassPane => "glass pane",
    HtmlContainer => "html container",
    Icon => "icon",
    Image => "image",
    InternalFrame => "internal frame",
    Label => "label",
    LayeredPane => "layered pane",
    List => "list",
    ListItem => "list item",
    Menu => "menu",
    MenuBar => "menu bar",
    MenuItem => "menu item",
    OptionPane => "option pane",
    PageTab => "page tab",
    PageTabList => "page tab list",
    Panel => "panel",
    PasswordText => "password text",
    PopupMenu => "popup menu",
    ProgressBar => "progress bar",
    PushButton => "push button",
    RadioButton => "radio button",
    RadioMenuItem => "radio menu item",
    RootPane => "root pane",
    RowHeader => "row header",
    ScrollBar => "scroll bar",
    ScrollPane => "scroll pane",
    Separator => "separator",
    Slider => "slider",
    SpinButton => "spin button",
    SplitPane => "split pane",
    StatusBar => "status bar",
    Table => "table",
    TableCell => "table cell",
    TableColumnHeader => "table column header",
    TableRowHeader => "table row header",
    TearoffMenuItem => "tearoff menu item",
    Terminal => "terminal",
    Text => "text",
    ToggleButton => "toggle button",
    ToolBar => "tool bar",
    ToolTip => "tool tip",
    Tree => "tree",
    TreeTable => "tree table",
    Unknown => "unknown",
    Viewport => "viewport",
    Window => "window",
    Header => "header",
    Footer => "footer",
    Paragraph => "paragraph",
    Ruler => "ruler",
    Application => "application",
    Autocomplete => "autocomplete",
    Editbar => "editbar",
    Embedded => "embedded",
    Entry => "entry",
    Chart => "chart",
    Caption => "caption",
    DocumentFrame => "document frame",
    Heading => "heading",
    Page => "page",
    Section => "section",
    Form => "form",
    Link => "link",
    InputMethodWindow => "input method window",
    TableRow => "table row",
    TreeItem => "tree item",
    DocumentText => "document text",
    DocumentWeb => "document web",
    Notification => "notification",
    InfoBar => "info bar",
    LevelBar => "level bar",
    TitleBar => "title bar",
    BlockQuote => "block quote",
    Audio => "audio",
    Video => "video",
    Article => "article",
    Landmark => "landmark",
    Log => "log",
    Marquee => "marquee",
    Math => "math",
    Rating => "rating",
    Timer => "timer",
    Static => "static",
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::from_name(s).ok_or_else(|| format!("unknown role name '{}'", s))
    }
}

impl Serialize for Role {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Role::from_name(&name).ok_or_else(|| serde::de::Error::custom(format!("unknown role name '{}'", name)))
    }
}

/// Accessible state flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    Active,
    Armed,
    Busy,
    Checkable,
    Checked,
    Collapsed,
    Defunct,
    Editable,
    Enabled,
    Expandable,
    Expanded,
    Focusable,
    Focused,
    HasPopup,
    Horizontal,
    Iconified,
    Indeterminate,
    Modal,
    MultiLine,
    Multiselectable,
    Pressed,
    ReadOnly,
    Required,
    Resizable,
    Selectable,
    Selected,
    Sensitive,
    Showing,
    SingleLine,
    Transient,
    Vertical,
    Visible,
}

/// The set of states currently held by an accessible.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateSet(BTreeSet<State>);

impl StateSet {
    /// Creates an empty state set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the set holds `state`.
    pub fn contains(&self, state: State) -> bool {
        self.0.contains(&state)
    }

    /// Adds a state; returns true if it was not present.
    pub fn insert(&mut self, state: State) -> bool {
        self.0.insert(state)
    }

    /// Removes a state; returns true if it was present.
    pub fn remove(&mut self, state: State) -> bool {
        self.0.remove(&state)
    }

    pub fn iter(&self) -> impl Iterator<Item = State> + '_ {
        self.0.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<State> for StateSet {
    fn from_iter<I: IntoIterator<Item = State>>(iter: I) -> Self {
        StateSet(iter.into_iter().collect())
    }
}

/// Relation kinds between accessibles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationType {
    LabelFor,
    LabelledBy,
    ControllerFor,
    ControlledBy,
    MemberOf,
    TooltipFor,
    NodeChildOf,
    NodeParentOf,
    FlowsTo,
    FlowsFrom,
    SubwindowOf,
    Embeds,
    EmbeddedBy,
    PopupFor,
    ParentWindowOf,
    DescriptionFor,
    DescribedBy,
}

/// One relation of an accessible: a kind and its target objects.
#[derive(Debug, Clone)]
pub struct Relation {
    pub kind: RelationType,
    pub targets: Vec<AccessibleRef>,
}

/// Screen-space rectangle in integer pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    /// The center point, rounded towards the origin.
    pub fn center(&self) -> (i32, i32) {
        (self.x + self.width / 2, self.y + self.height / 2)
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x && y >= self.y && x < self.x + self.width && y < self.y + self.height
    }
}

/// Bus-wide identity of a remote object.
///
/// Two handles denote the same accessible iff their ids are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId {
    pub bus_name: String,
    pub path: String,
}

impl ObjectId {
    pub fn new(bus_name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            bus_name: bus_name.into(),
            path: path.into(),
        }
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.bus_name, self.path)
    }
}

/// Shared handle to a remote accessible object.
pub type AccessibleRef = Arc<dyn Accessible>;

/// One remote UI object as seen through the accessibility bus.
///
/// Required methods cover the core Accessible interface (identity, naming,
/// hierarchy, states, relations). Capability methods default to
/// [`BusError::NotSupported`] for their capability; backends override the ones
/// an object implements and report them from [`interfaces`](Self::interfaces).
///
/// Any call may fail with [`BusError::Dead`] once the remote object is gone.
#[async_trait]
pub trait Accessible: Send + Sync + fmt::Debug {
    /// Bus identity of the object. Never touches the bus.
    fn id(&self) -> ObjectId;

    async fn name(&self) -> BusResult<String>;

    async fn description(&self) -> BusResult<String>;

    async fn role(&self) -> BusResult<Role>;

    /// Role name; defaults to the canonical name of [`role`](Self::role).
    async fn role_name(&self) -> BusResult<String> {
        Ok(self.role().await?.name().to_string())
    }

    /// The parent object, or `None` for the desktop root.
    async fn parent(&self) -> BusResult<Option<AccessibleRef>>;

    async fn child_count(&self) -> BusResult<usize>;

    async fn child_at_index(&self, index: usize) -> BusResult<AccessibleRef>;

    async fn index_in_parent(&self) -> BusResult<usize>;

    async fn state_set(&self) -> BusResult<StateSet>;

    async fn relation_set(&self) -> BusResult<Vec<Relation>>;

    /// Capabilities this object implements.
    async fn interfaces(&self) -> BusResult<BTreeSet<Capability>>;

    // -- Action -------------------------------------------------------------

    async fn n_actions(&self) -> BusResult<usize> {
        Err(BusError::NotSupported(Capability::Action))
    }

    async fn action_name(&self, index: usize) -> BusResult<String> {
        let _ = index;
        Err(BusError::NotSupported(Capability::Action))
    }

    async fn action_description(&self, index: usize) -> BusResult<String> {
        let _ = index;
        Err(BusError::NotSupported(Capability::Action))
    }

    async fn action_key_binding(&self, index: usize) -> BusResult<String> {
        let _ = index;
        Err(BusError::NotSupported(Capability::Action))
    }

    async fn do_action(&self, index: usize) -> BusResult<bool> {
        let _ = index;
        Err(BusError::NotSupported(Capability::Action))
    }

    // -- Component ----------------------------------------------------------

    /// Screen extents of the object.
    async fn extents(&self) -> BusResult<Rect> {
        Err(BusError::NotSupported(Capability::Component))
    }

    async fn grab_focus(&self) -> BusResult<bool> {
        Err(BusError::NotSupported(Capability::Component))
    }

    async fn contains_point(&self, x: i32, y: i32) -> BusResult<bool> {
        Ok(self.extents().await?.contains(x, y))
    }

    /// The direct child under a screen point, if any.
    async fn accessible_at_point(&self, x: i32, y: i32) -> BusResult<Option<AccessibleRef>> {
        let _ = (x, y);
        Err(BusError::NotSupported(Capability::Component))
    }

    // -- Text ---------------------------------------------------------------

    async fn character_count(&self) -> BusResult<i32> {
        Err(BusError::NotSupported(Capability::Text))
    }

    /// Text between two character offsets; `end == -1` means end of text.
    async fn get_text(&self, start: i32, end: i32) -> BusResult<String> {
        let _ = (start, end);
        Err(BusError::NotSupported(Capability::Text))
    }

    async fn caret_offset(&self) -> BusResult<i32> {
        Err(BusError::NotSupported(Capability::Text))
    }

    /// Moves the caret. The remote side clamps out-of-range offsets.
    async fn set_caret_offset(&self, offset: i32) -> BusResult<bool> {
        let _ = offset;
        Err(BusError::NotSupported(Capability::Text))
    }

    async fn n_text_selections(&self) -> BusResult<usize> {
        Err(BusError::NotSupported(Capability::Text))
    }

    async fn text_selection(&self, index: usize) -> BusResult<(i32, i32)> {
        let _ = index;
        Err(BusError::NotSupported(Capability::Text))
    }

    async fn add_text_selection(&self, start: i32, end: i32) -> BusResult<bool> {
        let _ = (start, end);
        Err(BusError::NotSupported(Capability::Text))
    }

    async fn remove_text_selection(&self, index: usize) -> BusResult<bool> {
        let _ = index;
        Err(BusError::NotSupported(Capability::Text))
    }

    // -- EditableText -------------------------------------------------------

    async fn set_text_contents(&self, text: &str) -> BusResult<bool> {
        let _ = text;
        Err(BusError::NotSupported(Capability::EditableText))
    }

    async fn insert_text(&self, position: i32, text: &str) -> BusResult<bool> {
        let _ = (position, text);
        Err(BusError::NotSupported(Capability::EditableText))
    }

    async fn delete_text(&self, start: i32, end: i32) -> BusResult<bool> {
        let _ = (start, end);
        Err(BusError::NotSupported(Capability::EditableText))
    }

    // -- Hypertext / Hyperlink ----------------------------------------------

    async fn n_links(&self) -> BusResult<usize> {
        Err(BusError::NotSupported(Capability::Hypertext))
    }

    /// The accessible standing for the link at `index`.
    async fn link(&self, index: usize) -> BusResult<AccessibleRef> {
        let _ = index;
        Err(BusError::NotSupported(Capability::Hypertext))
    }

    async fn uri(&self) -> BusResult<String> {
        Err(BusError::NotSupported(Capability::Hyperlink))
    }

    // -- Value --------------------------------------------------------------

    async fn current_value(&self) -> BusResult<f64> {
        Err(BusError::NotSupported(Capability::Value))
    }

    async fn set_current_value(&self, value: f64) -> BusResult<()> {
        let _ = value;
        Err(BusError::NotSupported(Capability::Value))
    }

    async fn minimum_value(&self) -> BusResult<f64> {
        Err(BusError::NotSupported(Capability::Value))
    }

    async fn maximum_value(&self) -> BusResult<f64> {
        Err(BusError::NotSupported(Capability::Value))
    }

    async fn minimum_increment(&self) -> BusResult<f64> {
        Err(BusError::NotSupported(Capability::Value))
    }

    // -- Application --------------------------------------------------------

    async fn toolkit_name(&self) -> BusResult<String> {
        Err(BusError::NotSupported(Capability::Application))
    }

    async fn toolkit_version(&self) -> BusResult<String> {
        Err(BusError::NotSupported(Capability::Application))
    }

    async fn application_id(&self) -> BusResult<i32> {
        Err(BusError::NotSupported(Capability::Application))
    }

    // -- Selection ----------------------------------------------------------

    async fn select_child(&self, index: usize) -> BusResult<bool> {
        let _ = index;
        Err(BusError::NotSupported(Capability::Selection))
    }

    async fn deselect_child(&self, index: usize) -> BusResult<bool> {
        let _ = index;
        Err(BusError::NotSupported(Capability::Selection))
    }

    async fn is_child_selected(&self, index: usize) -> BusResult<bool> {
        let _ = index;
        Err(BusError::NotSupported(Capability::Selection))
    }

    async fn n_selected_children(&self) -> BusResult<usize> {
        Err(BusError::NotSupported(Capability::Selection))
    }
}

/// An event delivered by the bus event registry.
#[derive(Debug, Clone)]
pub struct AccessibleEvent {
    /// Colon-separated event name, e.g. `object:state-changed:focused` or
    /// `mouse:button:1p`.
    pub kind: String,
    /// The object the event concerns, if any.
    pub source: Option<AccessibleRef>,
    pub detail1: i32,
    pub detail2: i32,
    /// Event payload, e.g. inserted text for `object:text-changed:insert`.
    pub any_data: Option<String>,
}

impl AccessibleEvent {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            source: None,
            detail1: 0,
            detail2: 0,
            any_data: None,
        }
    }

    pub fn with_source(mut self, source: AccessibleRef) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_details(mut self, detail1: i32, detail2: i32) -> Self {
        self.detail1 = detail1;
        self.detail2 = detail2;
        self
    }

    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.any_data = Some(data.into());
        self
    }

    /// Returns true if this event falls under the registered name `pattern`.
    ///
    /// Registration is by prefix on whole segments: `object:state-changed`
    /// matches `object:state-changed:focused` but not `object:state-changedx`.
    pub fn matches(&self, pattern: &str) -> bool {
        let pattern = pattern.trim_end_matches(':');
        self.kind == pattern
            || (self.kind.starts_with(pattern) && self.kind[pattern.len()..].starts_with(':'))
    }
}

/// A registration with the bus event registry.
///
/// Events whose name does not match one of the registered names are skipped.
/// Dropping the listener unregisters it.
pub struct EventListener {
    names: Vec<String>,
    rx: broadcast::Receiver<AccessibleEvent>,
}

impl EventListener {
    pub fn new(names: &[&str], rx: broadcast::Receiver<AccessibleEvent>) -> Self {
        Self {
            names: names.iter().map(|n| n.to_string()).collect(),
            rx,
        }
    }

    /// The event names this listener was registered for.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Waits for the next matching event. Returns `None` once the bus closes.
    pub async fn next(&mut self) -> Option<AccessibleEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => {
                    if self.names.iter().any(|n| event.matches(n)) {
                        return Some(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event listener lagged; events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// The next matching event already queued, without waiting.
    pub fn try_next(&mut self) -> Option<AccessibleEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => {
                    if self.names.iter().any(|n| event.matches(n)) {
                        return Some(event);
                    }
                }
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "event listener lagged; events dropped");
                }
                Err(_) => return None,
            }
        }
    }

    /// Unregisters the listener.
    pub fn deregister(self) {}
}

/// Entry point of an accessibility backend.
#[async_trait]
pub trait AccessibilityBus: Send + Sync {
    /// The desktop root, whose children are the running applications.
    async fn desktop(&self) -> BusResult<AccessibleRef>;

    /// Whether accessibility is enabled for the session.
    async fn is_enabled(&self) -> BusResult<bool> {
        Ok(true)
    }

    /// Registers for the given event names (prefix match on whole segments).
    async fn register_event_listener(&self, event_names: &[&str]) -> BusResult<EventListener>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_names_are_a_bijection() {
        let mut seen = std::collections::HashSet::new();
        for role in Role::ALL {
            assert!(seen.insert(role.name()), "duplicate role name {}", role.name());
            assert_eq!(Role::from_name(role.name()), Some(*role));
        }
        assert_eq!(Role::from_name("no such role"), None);
    }

    #[test]
    fn role_serializes_as_name() {
        let json = serde_json::to_string(&Role::PushButton).unwrap();
        assert_eq!(json, "\"push button\"");
        let back: Role = serde_json::from_str("\"page tab\"").unwrap();
        assert_eq!(back, Role::PageTab);
        assert!(serde_json::from_str::<Role>("\"bogus\"").is_err());
    }

    #[test]
    fn rect_center_and_contains() {
        let r = Rect::new(10, 20, 100, 50);
        assert_eq!(r.center(), (60, 45));
        assert!(r.contains(10, 20));
        assert!(r.contains(109, 69));
        assert!(!r.contains(110, 20));
        assert!(!r.contains(9, 30));
    }

    #[test]
    fn event_matching_is_segment_prefix() {
        let event = AccessibleEvent::new("object:state-changed:focused");
        assert!(event.matches("object:state-changed"));
        assert!(event.matches("object:state-changed:"));
        assert!(event.matches("object:state-changed:focused"));
        assert!(event.matches("object"));
        assert!(!event.matches("object:state-change"));
        assert!(!event.matches("window"));
    }

    #[test]
    fn state_set_basics() {
        let mut states: StateSet = [State::Sensitive, State::Showing].into_iter().collect();
        assert!(states.contains(State::Sensitive));
        assert!(!states.contains(State::Focused));
        assert!(states.insert(State::Focused));
        assert!(!states.insert(State::Focused));
        assert!(states.remove(State::Sensitive));
        assert_eq!(states.iter().count(), 2);
    }
}
