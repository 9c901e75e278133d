//! The node wrapper over raw accessibles.
//!
//! A [`Node`] pairs an [`AccessibleRef`] with the [`Engine`] it was reached
//! through. Attribute reads go straight to the bus; writes that change the
//! application (text, caret, combo value, numeric value, selection) sleep for
//! `default_delay` afterwards so the UI can settle.
//!
//! Bus failures are translated into [`SpanielError`] kinds here:
//! a vanished object becomes [`SpanielError::DeadReference`] and latches the
//! node's dead flag, a missing interface becomes
//! [`SpanielError::CapabilityAbsent`].

use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::accessible::{
    AccessibleRef, BusError, BusResult, Capability, ObjectId, Rect, RelationType, Role, State,
    StateSet,
};
use crate::engine::Engine;
use crate::error::{Result, SpanielError};
use crate::predicate::Predicate;

/// A live handle on one accessible object.
///
/// Equality and hashing use the bus identity of the object, so two handles
/// reached by different routes compare equal.
#[derive(Clone)]
pub struct Node {
    engine: Arc<Engine>,
    acc: AccessibleRef,
    debug_name: Option<String>,
    dead: Arc<AtomicBool>,
}

/// A relation with its targets wrapped as nodes.
#[derive(Debug, Clone)]
pub struct NodeRelation {
    pub kind: RelationType,
    pub targets: Vec<Node>,
}

/// A dynamically typed attribute value, see [`Node::attribute`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttrValue {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Texts(Vec<String>),
    Pair(i32, i32),
    Role(Role),
    States(StateSet),
    Rect(Rect),
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::None => f.write_str("None"),
            AttrValue::Bool(b) => write!(f, "{}", b),
            AttrValue::Int(i) => write!(f, "{}", i),
            AttrValue::Float(v) => write!(f, "{}", v),
            AttrValue::Text(t) => f.write_str(t),
            AttrValue::Texts(items) => write!(f, "[{}]", items.join(", ")),
            AttrValue::Pair(a, b) => write!(f, "({}, {})", a, b),
            AttrValue::Role(r) => f.write_str(r.name()),
            AttrValue::States(states) => {
                let names: Vec<String> = states.iter().map(|s| format!("{:?}", s).to_lowercase()).collect();
                write!(f, "[{}]", names.join(", "))
            }
            AttrValue::Rect(r) => write!(f, "({}, {}, {}x{})", r.x, r.y, r.width, r.height),
        }
    }
}

const WRITABLE_ATTRIBUTES: &[&str] = &["text", "caretoffset", "combovalue", "value"];

const READ_ONLY_ATTRIBUTES: &[&str] = &[
    "name",
    "description",
    "role",
    "rolename",
    "parent",
    "children",
    "childcount",
    "indexinparent",
    "stateset",
    "sensitive",
    "showing",
    "visible",
    "focused",
    "checked",
    "dead",
    "labeller",
    "labellee",
    "actions",
    "extents",
    "position",
    "size",
    "charactercount",
    "toolkitname",
    "version",
    "id",
    "uri",
    "minvalue",
    "maxvalue",
    "minvalueincrement",
];

fn attribute_key(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

impl Node {
    pub fn new(engine: Arc<Engine>, acc: AccessibleRef) -> Self {
        Self {
            engine,
            acc,
            debug_name: None,
            dead: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Wraps another accessible reached from this node.
    pub(crate) fn wrap(&self, acc: AccessibleRef) -> Node {
        Node::new(self.engine.clone(), acc)
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn accessible(&self) -> &AccessibleRef {
        &self.acc
    }

    pub fn id(&self) -> ObjectId {
        self.acc.id()
    }

    pub fn debug_name(&self) -> Option<&str> {
        self.debug_name.as_deref()
    }

    pub fn set_debug_name(&mut self, name: impl Into<String>) {
        self.debug_name = Some(name.into());
    }

    pub fn with_debug_name(mut self, name: impl Into<String>) -> Self {
        self.set_debug_name(name);
        self
    }

    fn tag(&self) -> String {
        self.debug_name
            .clone()
            .unwrap_or_else(|| self.acc.id().to_string())
    }

    /// Maps a raw bus result into the crate error space.
    pub(crate) fn check<T>(&self, result: BusResult<T>) -> Result<T> {
        result.map_err(|e| match e {
            BusError::Dead => {
                self.dead.store(true, Ordering::Relaxed);
                SpanielError::DeadReference(self.tag())
            }
            BusError::NotSupported(capability) => SpanielError::CapabilityAbsent {
                capability,
                node: self.tag(),
            },
            BusError::Failed(message) => SpanielError::Bus(message),
        })
    }

    /// Whether a previous call on this handle found the object dead.
    pub fn is_dead(&self) -> bool {
        self.dead.load(Ordering::Relaxed)
    }

    /// Asks the bus whether the object is gone.
    pub async fn dead(&self) -> bool {
        if self.is_dead() {
            return true;
        }
        if let Err(BusError::Dead) = self.acc.name().await {
            self.dead.store(true, Ordering::Relaxed);
            return true;
        }
        false
    }

    /// The string used for this node in log lines.
    ///
    /// With `absolute_node_paths` set this is the absolute search path;
    /// otherwise the debug name if one was given, or `[role | name]`.
    pub async fn log_string(&self) -> String {
        if self.engine.config().absolute_node_paths {
            if let Ok(path) = self.absolute_search_path().await {
                return path.to_string();
            }
        }
        if let Some(name) = &self.debug_name {
            return name.clone();
        }
        let role = self.role_name().await.unwrap_or_else(|_| "dead".to_string());
        let name = self.name().await.unwrap_or_default();
        format!("[{} | {}]", role, name)
    }

    // -- core attributes ----------------------------------------------------

    pub async fn name(&self) -> Result<String> {
        self.check(self.acc.name().await)
    }

    pub async fn description(&self) -> Result<String> {
        self.check(self.acc.description().await)
    }

    pub async fn role(&self) -> Result<Role> {
        self.check(self.acc.role().await)
    }

    pub async fn role_name(&self) -> Result<String> {
        self.check(self.acc.role_name().await)
    }

    /// The parent node; `None` for the desktop root.
    pub async fn parent(&self) -> Result<Option<Node>> {
        Ok(self.check(self.acc.parent().await)?.map(|p| self.wrap(p)))
    }

    pub async fn child_count(&self) -> Result<usize> {
        self.check(self.acc.child_count().await)
    }

    pub async fn child_at_index(&self, index: usize) -> Result<Node> {
        Ok(self.wrap(self.check(self.acc.child_at_index(index).await)?))
    }

    pub async fn index_in_parent(&self) -> Result<usize> {
        self.check(self.acc.index_in_parent().await)
    }

    /// Hyperlink nodes of a hypertext object; empty for everything else.
    pub async fn links(&self) -> Result<Vec<Node>> {
        let count = match self.acc.n_links().await {
            Err(BusError::NotSupported(_)) => return Ok(Vec::new()),
            result => self.check(result)?,
        };
        let mut links = Vec::with_capacity(count);
        for index in 0..count {
            links.push(self.wrap(self.check(self.acc.link(index).await)?));
        }
        Ok(links)
    }

    /// Children in order, truncated to `children_limit`, followed by links.
    pub async fn children(&self) -> Result<Vec<Node>> {
        let count = self.child_count().await?;
        let limit = self.engine.config().children_limit;
        if count > limit && self.engine.first_truncation(&self.id()) {
            warn!(
                node = %self.log_string().await,
                count,
                limit,
                "too many children, truncating"
            );
        }
        let mut children = Vec::with_capacity(count.min(limit));
        for index in 0..count.min(limit) {
            children.push(self.child_at_index(index).await?);
        }
        children.extend(self.links().await?);
        Ok(children)
    }

    /// Like [`children`](Self::children) but drops children that fail to
    /// resolve, as happens when they die mid-traversal.
    pub(crate) async fn children_tolerant(&self) -> Result<Vec<Node>> {
        let count = self.child_count().await?;
        let limit = self.engine.config().children_limit;
        let mut children = Vec::with_capacity(count.min(limit));
        for index in 0..count.min(limit) {
            match self.acc.child_at_index(index).await {
                Ok(acc) => children.push(self.wrap(acc)),
                Err(e) => tracing::debug!(index, error = %e, "skipping unreachable child"),
            }
        }
        if let Ok(links) = self.links().await {
            children.extend(links);
        }
        Ok(children)
    }

    pub async fn state_set(&self) -> Result<StateSet> {
        self.check(self.acc.state_set().await)
    }

    async fn has_state(&self, state: State) -> Result<bool> {
        Ok(self.state_set().await?.contains(state))
    }

    pub async fn sensitive(&self) -> Result<bool> {
        self.has_state(State::Sensitive).await
    }

    pub async fn showing(&self) -> Result<bool> {
        self.has_state(State::Showing).await
    }

    pub async fn visible(&self) -> Result<bool> {
        self.has_state(State::Visible).await
    }

    pub async fn focused(&self) -> Result<bool> {
        self.has_state(State::Focused).await
    }

    pub async fn checked(&self) -> Result<bool> {
        self.has_state(State::Checked).await
    }

    pub async fn interfaces(&self) -> Result<BTreeSet<Capability>> {
        self.check(self.acc.interfaces().await)
    }

    pub async fn relations(&self) -> Result<Vec<NodeRelation>> {
        let relations = self.check(self.acc.relation_set().await)?;
        Ok(relations
            .into_iter()
            .map(|r| NodeRelation {
                kind: r.kind,
                targets: r.targets.into_iter().map(|t| self.wrap(t)).collect(),
            })
            .collect())
    }

    async fn first_related(&self, kind: RelationType) -> Result<Option<Node>> {
        Ok(self
            .relations()
            .await?
            .into_iter()
            .find(|r| r.kind == kind)
            .and_then(|r| r.targets.into_iter().next()))
    }

    /// The node labelling this one.
    pub async fn labeller(&self) -> Result<Option<Node>> {
        self.first_related(RelationType::LabelledBy).await
    }

    /// The node this one labels.
    pub async fn labellee(&self) -> Result<Option<Node>> {
        self.first_related(RelationType::LabelFor).await
    }

    pub async fn grab_focus(&self) -> Result<()> {
        if !self.check(self.acc.grab_focus().await)? {
            warn!(node = %self.log_string().await, "focus request refused");
        }
        Ok(())
    }

    // -- component ----------------------------------------------------------

    pub async fn extents(&self) -> Result<Rect> {
        self.check(self.acc.extents().await)
    }

    pub async fn position(&self) -> Result<(i32, i32)> {
        let r = self.extents().await?;
        Ok((r.x, r.y))
    }

    pub async fn size(&self) -> Result<(i32, i32)> {
        let r = self.extents().await?;
        Ok((r.width, r.height))
    }

    /// Centre of the node's extents in screen coordinates.
    pub async fn center(&self) -> Result<(i32, i32)> {
        Ok(self.extents().await?.center())
    }

    // -- text ---------------------------------------------------------------

    /// The full text contents.
    pub async fn text(&self) -> Result<String> {
        self.check(self.acc.get_text(0, -1).await)
    }

    /// Replaces the full text contents.
    pub async fn set_text(&self, text: &str) -> Result<()> {
        info!(node = %self.log_string().await, text, "setting text");
        if !self.check(self.acc.set_text_contents(text).await)? {
            warn!(node = %self.log_string().await, "text change refused");
        }
        self.settle("after setting text").await;
        Ok(())
    }

    pub async fn character_count(&self) -> Result<i32> {
        self.check(self.acc.character_count().await)
    }

    pub async fn get_text(&self, start: i32, end: i32) -> Result<String> {
        self.check(self.acc.get_text(start, end).await)
    }

    pub async fn caret_offset(&self) -> Result<i32> {
        self.check(self.acc.caret_offset().await)
    }

    /// Moves the caret; out-of-range offsets are clamped by the application.
    pub async fn set_caret_offset(&self, offset: i32) -> Result<()> {
        self.check(self.acc.set_caret_offset(offset).await)?;
        self.settle("after moving caret").await;
        Ok(())
    }

    pub async fn text_selections(&self) -> Result<Vec<(i32, i32)>> {
        let count = self.check(self.acc.n_text_selections().await)?;
        let mut selections = Vec::with_capacity(count);
        for index in 0..count {
            selections.push(self.check(self.acc.text_selection(index).await)?);
        }
        Ok(selections)
    }

    pub async fn add_text_selection(&self, start: i32, end: i32) -> Result<bool> {
        self.check(self.acc.add_text_selection(start, end).await)
    }

    pub async fn remove_text_selection(&self, index: usize) -> Result<bool> {
        self.check(self.acc.remove_text_selection(index).await)
    }

    // -- combo box ----------------------------------------------------------

    /// The selected value of a combo box, which is its name.
    pub async fn combovalue(&self) -> Result<String> {
        self.name().await
    }

    /// Selects `value` by finding the child with that (translated) name and
    /// clicking it.
    pub async fn set_combovalue(&self, value: &str) -> Result<()> {
        info!(node = %self.log_string().await, value, "setting combo box value");
        let item = self
            .find_child(&Predicate::Named(self.engine.translatable(value)))
            .await?;
        item.click().await?;
        self.settle("after setting combo box value").await;
        Ok(())
    }

    // -- application / hyperlink --------------------------------------------

    pub async fn toolkit_name(&self) -> Result<String> {
        self.check(self.acc.toolkit_name().await)
    }

    pub async fn toolkit_version(&self) -> Result<String> {
        self.check(self.acc.toolkit_version().await)
    }

    pub async fn application_id(&self) -> Result<i32> {
        self.check(self.acc.application_id().await)
    }

    pub async fn uri(&self) -> Result<String> {
        self.check(self.acc.uri().await)
    }

    // -- value --------------------------------------------------------------

    pub async fn value(&self) -> Result<f64> {
        self.check(self.acc.current_value().await)
    }

    pub async fn set_value(&self, value: f64) -> Result<()> {
        info!(node = %self.log_string().await, value, "setting value");
        self.check(self.acc.set_current_value(value).await)?;
        self.settle("after setting value").await;
        Ok(())
    }

    pub async fn min_value(&self) -> Result<f64> {
        self.check(self.acc.minimum_value().await)
    }

    pub async fn max_value(&self) -> Result<f64> {
        self.check(self.acc.maximum_value().await)
    }

    pub async fn min_value_increment(&self) -> Result<f64> {
        self.check(self.acc.minimum_increment().await)
    }

    // -- selection ----------------------------------------------------------

    async fn selection_parent(&self) -> Result<(Node, usize)> {
        let parent = self.parent().await?.ok_or_else(|| {
            SpanielError::InvalidArgument(format!("{} has no parent to select it in", self.tag()))
        })?;
        Ok((parent, self.index_in_parent().await?))
    }

    /// Selects this node within its parent's selection.
    pub async fn select(&self) -> Result<()> {
        let (parent, index) = self.selection_parent().await?;
        info!(node = %self.log_string().await, "selecting");
        parent.check(parent.acc.select_child(index).await)?;
        self.settle("after selecting").await;
        Ok(())
    }

    pub async fn deselect(&self) -> Result<()> {
        let (parent, index) = self.selection_parent().await?;
        info!(node = %self.log_string().await, "deselecting");
        parent.check(parent.acc.deselect_child(index).await)?;
        self.settle("after deselecting").await;
        Ok(())
    }

    /// Whether this node is selected in its parent. Falls back to the
    /// `selected` state when the parent has no selection interface.
    pub async fn is_selected(&self) -> Result<bool> {
        let (parent, index) = self.selection_parent().await?;
        match parent.acc.is_child_selected(index).await {
            Err(BusError::NotSupported(_)) => self.has_state(State::Selected).await,
            result => parent.check(result),
        }
    }

    // -- raw input ----------------------------------------------------------

    /// Clicks the centre of the node with the given mouse button.
    pub async fn raw_click(&self, button: u32) -> Result<()> {
        let (x, y) = self.center().await?;
        info!(node = %self.log_string().await, x, y, button, "clicking");
        self.engine.input().click(x, y, button).await
    }

    /// Two raw clicks separated by `double_click_delay`.
    pub async fn double_click(&self, button: u32) -> Result<()> {
        let (x, y) = self.center().await?;
        info!(node = %self.log_string().await, x, y, button, "double clicking");
        let input = self.engine.input();
        input.click(x, y, button).await?;
        self.engine
            .sleep(self.engine.config().double_click_delay(), "between clicks")
            .await;
        input.click(x, y, button).await
    }

    /// Focuses the node and types `text` as synthetic key presses.
    pub async fn raw_type(&self, text: &str) -> Result<()> {
        self.grab_focus().await?;
        info!(node = %self.log_string().await, text, "typing");
        self.engine.type_text(text).await
    }

    /// Types `text` into the node.
    ///
    /// Editable text is inserted at the caret through the text interface;
    /// anything else is focused and fed synthetic key presses.
    pub async fn type_text(&self, text: &str) -> Result<()> {
        if !self.interfaces().await?.contains(&Capability::EditableText) {
            return self.raw_type(text).await;
        }
        let count = self.character_count().await?;
        let caret = match self.acc.caret_offset().await {
            Ok(offset) if (0..=count).contains(&offset) => offset,
            _ => count,
        };
        info!(node = %self.log_string().await, text, "typing");
        self.check(self.acc.insert_text(caret, text).await)?;
        let inserted = i32::try_from(text.chars().count()).unwrap_or(i32::MAX);
        // Caret support is optional for editable text.
        match self.acc.set_caret_offset(caret.saturating_add(inserted)).await {
            Err(BusError::NotSupported(_)) => {}
            result => {
                self.check(result)?;
            }
        }
        self.settle("after typing").await;
        Ok(())
    }

    /// Sends a key combination such as `<Control>a` after focusing the node.
    pub async fn key_combo(&self, combo: &str) -> Result<()> {
        match self.grab_focus().await {
            Err(SpanielError::CapabilityAbsent { .. }) | Ok(()) => {}
            Err(e) => return Err(e),
        }
        info!(node = %self.log_string().await, combo, "pressing key combo");
        self.engine.input().key_combo(combo).await
    }

    async fn settle(&self, reason: &str) {
        self.engine
            .sleep(self.engine.config().default_delay(), reason)
            .await;
    }

    // -- dynamic attributes -------------------------------------------------

    /// Reads an attribute by name (`roleName`, `role_name` and `rolename`
    /// are all accepted).
    pub async fn attribute(&self, name: &str) -> Result<AttrValue> {
        let key = attribute_key(name);
        let value = match key.as_str() {
            "name" => AttrValue::Text(self.name().await?),
            "description" => AttrValue::Text(self.description().await?),
            "role" => AttrValue::Role(self.role().await?),
            "rolename" => AttrValue::Text(self.role_name().await?),
            "parent" => match self.parent().await? {
                Some(parent) => AttrValue::Text(parent.log_string().await),
                None => AttrValue::None,
            },
            "children" => {
                let mut names = Vec::new();
                for child in self.children().await? {
                    names.push(child.log_string().await);
                }
                AttrValue::Texts(names)
            }
            "childcount" => AttrValue::Int(self.child_count().await? as i64),
            "indexinparent" => AttrValue::Int(self.index_in_parent().await? as i64),
            "stateset" => AttrValue::States(self.state_set().await?),
            "sensitive" => AttrValue::Bool(self.sensitive().await?),
            "showing" => AttrValue::Bool(self.showing().await?),
            "visible" => AttrValue::Bool(self.visible().await?),
            "focused" => AttrValue::Bool(self.focused().await?),
            "checked" => AttrValue::Bool(self.checked().await?),
            "dead" => AttrValue::Bool(self.dead().await),
            "labeller" | "labellee" => {
                let related = if key == "labeller" {
                    self.labeller().await?
                } else {
                    self.labellee().await?
                };
                match related {
                    Some(node) => AttrValue::Text(node.log_string().await),
                    None => AttrValue::None,
                }
            }
            "actions" => AttrValue::Texts(
                self.actions()
                    .await?
                    .into_iter()
                    .map(|a| a.name().to_string())
                    .collect(),
            ),
            "extents" => AttrValue::Rect(self.extents().await?),
            "position" => {
                let (x, y) = self.position().await?;
                AttrValue::Pair(x, y)
            }
            "size" => {
                let (w, h) = self.size().await?;
                AttrValue::Pair(w, h)
            }
            "text" => AttrValue::Text(self.text().await?),
            "charactercount" => AttrValue::Int(self.character_count().await? as i64),
            "caretoffset" => AttrValue::Int(self.caret_offset().await? as i64),
            "combovalue" => AttrValue::Text(self.combovalue().await?),
            "toolkitname" => AttrValue::Text(self.toolkit_name().await?),
            "version" => AttrValue::Text(self.toolkit_version().await?),
            "id" => AttrValue::Int(self.application_id().await? as i64),
            "uri" => AttrValue::Text(self.uri().await?),
            "value" => AttrValue::Float(self.value().await?),
            "minvalue" => AttrValue::Float(self.min_value().await?),
            "maxvalue" => AttrValue::Float(self.max_value().await?),
            "minvalueincrement" => AttrValue::Float(self.min_value_increment().await?),
            _ => {
                return Err(SpanielError::InvalidArgument(format!(
                    "unknown attribute '{}'",
                    name
                )))
            }
        };
        Ok(value)
    }

    /// Writes an attribute by name. Only `text`, `caretOffset`,
    /// `combovalue` and `value` are writable.
    pub async fn set_attribute(&self, name: &str, value: AttrValue) -> Result<()> {
        let key = attribute_key(name);
        match (key.as_str(), value) {
            ("text", AttrValue::Text(text)) => self.set_text(&text).await,
            ("caretoffset", AttrValue::Int(offset)) => {
                let offset = i32::try_from(offset).map_err(|_| {
                    SpanielError::InvalidArgument(format!("caret offset {} out of range", offset))
                })?;
                self.set_caret_offset(offset).await
            }
            ("combovalue", AttrValue::Text(value)) => self.set_combovalue(&value).await,
            ("value", AttrValue::Float(value)) => self.set_value(value).await,
            ("value", AttrValue::Int(value)) => self.set_value(value as f64).await,
            (k, value) if WRITABLE_ATTRIBUTES.contains(&k) => Err(SpanielError::InvalidArgument(
                format!("cannot assign {:?} to attribute '{}'", value, name),
            )),
            (k, _) if READ_ONLY_ATTRIBUTES.contains(&k) => Err(SpanielError::InvalidArgument(
                format!("attribute '{}' is read-only", name),
            )),
            _ => Err(SpanielError::InvalidArgument(format!(
                "unknown attribute '{}'",
                name
            ))),
        }
    }

    /// Applies `predicate` with default options but no retries.
    pub async fn satisfies(&self, predicate: &Predicate) -> bool {
        predicate.satisfied_by_node(self).await
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.acc.id() == other.acc.id()
    }
}

impl Eq for Node {}

impl Hash for Node {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.acc.id().hash(state);
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.acc.id())
            .field("debug_name", &self.debug_name)
            .field("dead", &self.is_dead())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{self, Gedit};
    use crate::memory::InputEvent;

    #[tokio::test]
    async fn reads_core_attributes() {
        let gedit = Gedit::new();
        let (engine, _) = fixtures::engine(&gedit.desktop);
        let frame = gedit.node(&engine, gedit.frame);
        assert_eq!(frame.name().await.unwrap(), "Untitled - gedit");
        assert_eq!(frame.role().await.unwrap(), Role::Frame);
        assert_eq!(frame.role_name().await.unwrap(), "frame");
        let parent = frame.parent().await.unwrap().unwrap();
        assert_eq!(parent, gedit.node(&engine, gedit.app));
        assert!(frame.showing().await.unwrap());
    }

    #[tokio::test]
    async fn root_has_no_parent_and_children_exclude_self() {
        let gedit = Gedit::new();
        let (engine, _) = fixtures::engine(&gedit.desktop);
        let root = engine.root().await.unwrap();
        assert!(root.parent().await.unwrap().is_none());
        let children = root.children().await.unwrap();
        assert!(!children.contains(&root));
        assert!(children.contains(&gedit.node(&engine, gedit.app)));
    }

    #[tokio::test]
    async fn children_truncate_at_limit() {
        let gedit = Gedit::new();
        let (engine, _) = fixtures::engine(&gedit.desktop);
        engine.update_config(|c| c.children_limit = 2);
        let panel = gedit.node(&engine, gedit.panel);
        assert!(panel.child_count().await.unwrap() > 2);
        assert_eq!(panel.children().await.unwrap().len(), 2);
        let again = gedit.node(&engine, gedit.panel);
        assert_eq!(again.children().await.unwrap().len(), 2);
        assert!(!engine.first_truncation(&panel.id()));
    }

    #[tokio::test]
    async fn labeller_and_labellee_are_symmetric() {
        let gedit = Gedit::new();
        let (engine, _) = fixtures::engine(&gedit.desktop);
        let entry = gedit.node(&engine, gedit.entry);
        let label = entry.labeller().await.unwrap().unwrap();
        assert_eq!(label.name().await.unwrap(), "Find:");
        assert_eq!(label.labellee().await.unwrap().unwrap(), entry);
    }

    #[tokio::test]
    async fn text_attribute_roundtrip() {
        let gedit = Gedit::new();
        let (engine, _) = fixtures::engine(&gedit.desktop);
        let entry = gedit.node(&engine, gedit.entry);
        assert_eq!(entry.text().await.unwrap(), "hello");
        entry.set_text("goodbye").await.unwrap();
        assert_eq!(entry.text().await.unwrap(), "goodbye");
        entry.set_caret_offset(999).await.unwrap();
        assert_eq!(entry.caret_offset().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn capability_absent_for_missing_interface() {
        let gedit = Gedit::new();
        let (engine, _) = fixtures::engine(&gedit.desktop);
        let ok = gedit.node(&engine, gedit.ok);
        let err = ok.text().await.unwrap_err();
        assert!(matches!(
            err,
            SpanielError::CapabilityAbsent {
                capability: Capability::Text,
                ..
            }
        ));
        let err = gedit.node(&engine, gedit.frame).toolkit_name().await.unwrap_err();
        assert!(matches!(err, SpanielError::CapabilityAbsent { .. }));
    }

    #[tokio::test]
    async fn read_only_and_unknown_attributes() {
        let gedit = Gedit::new();
        let (engine, _) = fixtures::engine(&gedit.desktop);
        let ok = gedit.node(&engine, gedit.ok);
        let err = ok.set_attribute("roleName", AttrValue::Text("x".into())).await.unwrap_err();
        assert!(err.to_string().contains("read-only"));
        let err = ok.set_attribute("bogus", AttrValue::Int(1)).await.unwrap_err();
        assert!(err.to_string().contains("unknown attribute"));
        assert_eq!(ok.attribute("role_name").await.unwrap(), AttrValue::Text("push button".into()));
        assert_eq!(ok.attribute("actions").await.unwrap(), AttrValue::Texts(vec!["click".into()]));
    }

    #[tokio::test]
    async fn combovalue_selects_child_by_name() {
        let gedit = Gedit::new();
        let (engine, _) = fixtures::engine(&gedit.desktop);
        let combo = gedit.node(&engine, gedit.combo);
        assert_eq!(combo.combovalue().await.unwrap(), "Plain");
        combo
            .set_attribute("combovalue", AttrValue::Text("Clear".into()))
            .await
            .unwrap();
        assert_eq!(combo.combovalue().await.unwrap(), "Clear");
    }

    #[tokio::test]
    async fn value_interface() {
        let gedit = Gedit::new();
        let (engine, _) = fixtures::engine(&gedit.desktop);
        let slider = gedit.node(&engine, gedit.slider);
        assert_eq!(slider.value().await.unwrap(), 50.0);
        assert_eq!(slider.max_value().await.unwrap(), 100.0);
        slider.set_attribute("value", AttrValue::Int(75)).await.unwrap();
        assert_eq!(slider.value().await.unwrap(), 75.0);
    }

    #[tokio::test]
    async fn application_attributes() {
        let gedit = Gedit::new();
        let (engine, _) = fixtures::engine(&gedit.desktop);
        let app = gedit.node(&engine, gedit.app);
        assert_eq!(app.toolkit_name().await.unwrap(), "GTK");
        assert_eq!(app.attribute("version").await.unwrap(), AttrValue::Text("3.24".into()));
        assert_eq!(app.attribute("id").await.unwrap(), AttrValue::Int(7));
    }

    #[tokio::test]
    async fn dead_node_reports_dead_reference() {
        let gedit = Gedit::new();
        let (engine, _) = fixtures::engine(&gedit.desktop);
        let ok = gedit.node(&engine, gedit.ok);
        assert!(!ok.dead().await);
        gedit.desktop.remove(gedit.app);
        assert!(ok.name().await.unwrap_err().is_dead());
        assert!(ok.is_dead());
        assert!(ok.dead().await);
    }

    #[tokio::test]
    async fn raw_click_hits_center() {
        let gedit = Gedit::new();
        let (engine, input) = fixtures::engine(&gedit.desktop);
        let ok = gedit.node(&engine, gedit.ok);
        ok.raw_click(1).await.unwrap();
        assert_eq!(input.events(), vec![InputEvent::Click { x: 50, y: 65, button: 1 }]);
    }

    #[tokio::test]
    async fn double_click_is_two_clicks() {
        let gedit = Gedit::new();
        let (engine, input) = fixtures::engine(&gedit.desktop);
        gedit.node(&engine, gedit.ok).double_click(1).await.unwrap();
        let clicks = input
            .events()
            .into_iter()
            .filter(|e| matches!(e, InputEvent::Click { .. }))
            .count();
        assert_eq!(clicks, 2);
    }

    #[tokio::test]
    async fn type_text_inserts_at_caret() {
        let gedit = Gedit::new();
        let (engine, input) = fixtures::engine(&gedit.desktop);
        let entry = gedit.node(&engine, gedit.entry);
        entry.set_caret_offset(5).await.unwrap();
        entry.type_text(" world").await.unwrap();
        assert_eq!(entry.text().await.unwrap(), "hello world");
        assert_eq!(entry.caret_offset().await.unwrap(), 11);
        assert!(input.events().is_empty());
    }

    #[tokio::test]
    async fn type_text_on_vanished_entry_is_dead_reference() {
        let gedit = Gedit::new();
        let (engine, input) = fixtures::engine(&gedit.desktop);
        let entry = gedit.node(&engine, gedit.entry);
        gedit.desktop.remove(gedit.entry);
        let err = entry.type_text("x").await.unwrap_err();
        assert!(matches!(err, SpanielError::DeadReference(_)), "{err}");
        assert!(entry.is_dead());
        assert!(input.events().is_empty());
    }

    #[tokio::test]
    async fn type_text_falls_back_to_raw_input() {
        let gedit = Gedit::new();
        let (engine, input) = fixtures::engine(&gedit.desktop);
        let ok = gedit.node(&engine, gedit.ok);
        ok.type_text("ab").await.unwrap();
        assert_eq!(input.typed(), "ab");
        assert!(ok.focused().await.unwrap());
    }

    #[tokio::test]
    async fn selection_through_parent() {
        let gedit = Gedit::new();
        let (engine, _) = fixtures::engine(&gedit.desktop);
        let rows = gedit.desktop.edit(|t| t.children(gedit.list));
        let second = gedit.node(&engine, rows[1]);
        assert!(!second.is_selected().await.unwrap());
        second.select().await.unwrap();
        assert!(second.is_selected().await.unwrap());
        second.deselect().await.unwrap();
        assert!(!second.is_selected().await.unwrap());
    }

    #[tokio::test]
    async fn log_string_formats() {
        let gedit = Gedit::new();
        let (engine, _) = fixtures::engine(&gedit.desktop);
        let ok = gedit.node(&engine, gedit.ok);
        assert_eq!(ok.log_string().await, "[push button | OK]");
        assert_eq!(ok.clone().with_debug_name("the OK button").log_string().await, "the OK button");
        engine.update_config(|c| c.absolute_node_paths = true);
        let path = ok.log_string().await;
        assert!(path.starts_with("{\"gedit\" application"), "{path}");
    }

    #[tokio::test]
    async fn hypertext_links_follow_children() {
        let gedit = Gedit::new();
        let (engine, _) = fixtures::engine(&gedit.desktop);
        let help = gedit.node(&engine, gedit.help);
        let children = help.children().await.unwrap();
        let last = children.last().unwrap();
        assert_eq!(last.role().await.unwrap(), Role::Link);
        assert_eq!(last.uri().await.unwrap(), "https://example.org/help");
    }
}
