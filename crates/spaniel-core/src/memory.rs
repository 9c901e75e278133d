//! In-memory accessibility bus and a recording input injector.
//!
//! [`MemoryDesktop`] implements [`AccessibilityBus`] over a tree held in
//! process. Trees are built from [`NodeSnapshot`]s, either in code or from a
//! JSON file captured with [`crate::dump::snapshot`]. Removing a node kills
//! every handle on it and its descendants, the way a closed window does on a
//! real bus.
//!
//! [`RecordingInput`] records synthetic input. When attached to a desktop it
//! also delivers clicks and typing to the nodes under the pointer and with
//! focus, and emits the matching bus events.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::accessible::{
    AccessibilityBus, Accessible, AccessibleEvent, AccessibleRef, BusError, BusResult, Capability,
    EventListener, ObjectId, Rect, Relation, RelationType, Role, State, StateSet,
};
use crate::dump::{NodeSnapshot, ToolkitSnapshot, ValueSnapshot};
use crate::error::Result;
use crate::input::{InputInjector, KeyCombo};

const EVENT_CAPACITY: usize = 256;

/// Handle on a node of a [`MemoryDesktop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemId(u64);

impl fmt::Display for MemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Callback run when an action is performed on a node.
pub type ActionHandler = Arc<dyn Fn(&mut MemoryTree, MemId) + Send + Sync>;

#[derive(Debug, Clone)]
struct TextState {
    contents: String,
    caret: i32,
    editable: bool,
    selections: Vec<(i32, i32)>,
}

impl TextState {
    fn char_len(text: &str) -> i32 {
        i32::try_from(text.chars().count()).unwrap_or(i32::MAX)
    }

    fn len(&self) -> i32 {
        Self::char_len(&self.contents)
    }

    fn byte_offset(&self, offset: i32) -> usize {
        let offset = usize::try_from(offset.max(0)).unwrap_or(0);
        self.contents
            .char_indices()
            .nth(offset)
            .map(|(i, _)| i)
            .unwrap_or(self.contents.len())
    }

    fn slice(&self, start: i32, end: i32) -> String {
        let len = self.len();
        let end = if end < 0 || end > len { len } else { end };
        let start = start.clamp(0, end);
        self.contents[self.byte_offset(start)..self.byte_offset(end)].to_string()
    }

    fn insert(&mut self, position: i32, text: &str) -> i32 {
        let position = position.clamp(0, self.len());
        let at = self.byte_offset(position);
        self.contents.insert_str(at, text);
        position
    }

    fn delete(&mut self, start: i32, end: i32) {
        let len = self.len();
        let end = if end < 0 || end > len { len } else { end };
        let start = start.clamp(0, end);
        let range = self.byte_offset(start)..self.byte_offset(end);
        self.contents.replace_range(range, "");
        self.caret = self.caret.min(self.len());
    }
}

struct MemNode {
    role: Role,
    name: String,
    description: String,
    parent: Option<MemId>,
    children: Vec<MemId>,
    links: Vec<MemId>,
    states: StateSet,
    relations: Vec<(RelationType, Vec<MemId>)>,
    actions: Vec<String>,
    extents: Option<Rect>,
    text: Option<TextState>,
    value: Option<ValueSnapshot>,
    uri: Option<String>,
    toolkit: Option<ToolkitSnapshot>,
    selectable_children: bool,
}

impl MemNode {
    fn interfaces(&self) -> BTreeSet<Capability> {
        let mut caps = BTreeSet::new();
        if !self.actions.is_empty() {
            caps.insert(Capability::Action);
        }
        if self.extents.is_some() {
            caps.insert(Capability::Component);
        }
        if let Some(text) = &self.text {
            caps.insert(Capability::Text);
            if text.editable {
                caps.insert(Capability::EditableText);
            }
        }
        if !self.links.is_empty() {
            caps.insert(Capability::Hypertext);
        }
        if self.uri.is_some() {
            caps.insert(Capability::Hyperlink);
        }
        if self.value.is_some() {
            caps.insert(Capability::Value);
        }
        if self.toolkit.is_some() {
            caps.insert(Capability::Application);
        }
        if self.selectable_children {
            caps.insert(Capability::Selection);
        }
        caps
    }

    fn text(&self) -> BusResult<&TextState> {
        self.text.as_ref().ok_or(BusError::NotSupported(Capability::Text))
    }

    fn text_mut(&mut self) -> BusResult<&mut TextState> {
        self.text.as_mut().ok_or(BusError::NotSupported(Capability::Text))
    }

    fn editable_mut(&mut self) -> BusResult<&mut TextState> {
        match self.text.as_mut() {
            Some(text) if text.editable => Ok(text),
            _ => Err(BusError::NotSupported(Capability::EditableText)),
        }
    }

    fn value(&self) -> BusResult<&ValueSnapshot> {
        self.value.as_ref().ok_or(BusError::NotSupported(Capability::Value))
    }

    fn toolkit(&self) -> BusResult<&ToolkitSnapshot> {
        self.toolkit
            .as_ref()
            .ok_or(BusError::NotSupported(Capability::Application))
    }

    fn extents(&self) -> BusResult<Rect> {
        self.extents.ok_or(BusError::NotSupported(Capability::Component))
    }

    fn showing(&self) -> bool {
        self.states.contains(State::Showing)
    }
}

/// The mutable tree behind a [`MemoryDesktop`].
///
/// Action handlers receive it directly, so they can rename nodes, toggle
/// states, add windows or close them.
pub struct MemoryTree {
    nodes: HashMap<MemId, MemNode>,
    next_id: u64,
    root: MemId,
    handlers: HashMap<(MemId, String), ActionHandler>,
    invocations: Vec<(MemId, String)>,
}

impl MemoryTree {
    fn new(root: NodeSnapshot) -> Self {
        let mut tree = MemoryTree {
            nodes: HashMap::new(),
            next_id: 0,
            root: MemId(0),
            handlers: HashMap::new(),
            invocations: Vec::new(),
        };
        let mut pending = Vec::new();
        tree.root = tree.insert(None, root, &mut pending);
        tree.resolve_labels(pending);
        tree
    }

    fn alloc(&mut self) -> MemId {
        let id = MemId(self.next_id);
        self.next_id += 1;
        id
    }

    fn insert(
        &mut self,
        parent: Option<MemId>,
        snapshot: NodeSnapshot,
        pending: &mut Vec<(MemId, String)>,
    ) -> MemId {
        let id = self.alloc();
        let NodeSnapshot {
            role,
            name,
            description,
            states,
            actions,
            extents,
            text,
            editable,
            value,
            uri,
            toolkit,
            labeller,
            selectable_children,
            links,
            children,
        } = snapshot;
        let text = text.or_else(|| editable.then(String::new)).map(|contents| TextState {
            contents,
            caret: 0,
            editable,
            selections: Vec::new(),
        });
        self.nodes.insert(
            id,
            MemNode {
                role,
                name,
                description,
                parent,
                children: Vec::new(),
                links: Vec::new(),
                states,
                relations: Vec::new(),
                actions,
                extents,
                text,
                value,
                uri,
                toolkit,
                selectable_children,
            },
        );
        if let Some(label) = labeller {
            pending.push((id, label));
        }
        for child in children {
            let child = self.insert(Some(id), child, pending);
            if let Some(node) = self.nodes.get_mut(&id) {
                node.children.push(child);
            }
        }
        for link in links {
            let link = self.insert(Some(id), link, pending);
            if let Some(node) = self.nodes.get_mut(&id) {
                node.links.push(link);
            }
        }
        id
    }

    /// Links each pending node to the nearest label with the given name,
    /// searching outwards through its ancestors.
    fn resolve_labels(&mut self, pending: Vec<(MemId, String)>) {
        for (target, label_name) in pending {
            let mut scope = self.parent(target);
            while let Some(ancestor) = scope {
                let label = self.descendants(ancestor).into_iter().find(|id| {
                    *id != target
                        && self
                            .nodes
                            .get(id)
                            .is_some_and(|n| n.role == Role::Label && n.name == label_name)
                });
                if let Some(label) = label {
                    self.set_label(label, target);
                    break;
                }
                scope = self.parent(ancestor);
            }
        }
    }

    /// `from` and everything below it in document order, links included.
    fn descendants(&self, from: MemId) -> Vec<MemId> {
        let mut out = Vec::new();
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            out.push(id);
            stack.extend(node.links.iter().rev());
            stack.extend(node.children.iter().rev());
        }
        out
    }

    pub fn root(&self) -> MemId {
        self.root
    }

    pub fn contains(&self, id: MemId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Adds `snapshot` under `parent` and returns the new subtree's root.
    /// Adding under a removed node yields an id that is already dead.
    pub fn add(&mut self, parent: MemId, snapshot: NodeSnapshot) -> MemId {
        if !self.contains(parent) {
            return self.alloc();
        }
        let mut pending = Vec::new();
        let id = self.insert(Some(parent), snapshot, &mut pending);
        if let Some(node) = self.nodes.get_mut(&parent) {
            node.children.push(id);
        }
        self.resolve_labels(pending);
        id
    }

    /// Removes `id` and its subtree. The desktop root cannot be removed.
    pub fn remove(&mut self, id: MemId) {
        if id == self.root {
            return;
        }
        if let Some(parent) = self.parent(id).and_then(|p| self.nodes.get_mut(&p)) {
            parent.children.retain(|c| *c != id);
            parent.links.retain(|c| *c != id);
        }
        for dead in self.descendants(id) {
            self.nodes.remove(&dead);
            self.handlers.retain(|(owner, _), _| *owner != dead);
        }
        debug!(id = %id, "removed node");
    }

    pub fn name(&self, id: MemId) -> Option<&str> {
        self.nodes.get(&id).map(|n| n.name.as_str())
    }

    pub fn set_name(&mut self, id: MemId, name: impl Into<String>) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.name = name.into();
        }
    }

    pub fn role(&self, id: MemId) -> Option<Role> {
        self.nodes.get(&id).map(|n| n.role)
    }

    pub fn states(&self, id: MemId) -> Option<&StateSet> {
        self.nodes.get(&id).map(|n| &n.states)
    }

    pub fn set_state(&mut self, id: MemId, state: State, on: bool) {
        if let Some(node) = self.nodes.get_mut(&id) {
            if on {
                node.states.insert(state);
            } else {
                node.states.remove(state);
            }
        }
    }

    pub fn text(&self, id: MemId) -> Option<&str> {
        self.nodes
            .get(&id)
            .and_then(|n| n.text.as_ref())
            .map(|t| t.contents.as_str())
    }

    pub fn set_text(&mut self, id: MemId, text: impl Into<String>) {
        if let Some(state) = self.nodes.get_mut(&id).and_then(|n| n.text.as_mut()) {
            state.contents = text.into();
            state.caret = state.caret.min(state.len());
        }
    }

    pub fn parent(&self, id: MemId) -> Option<MemId> {
        self.nodes.get(&id).and_then(|n| n.parent)
    }

    pub fn children(&self, id: MemId) -> Vec<MemId> {
        self.nodes
            .get(&id)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    /// First live node named `name`, in document order.
    pub fn find(&self, name: &str) -> Option<MemId> {
        self.descendants(self.root)
            .into_iter()
            .find(|id| self.name(*id) == Some(name))
    }

    /// First live node with the given role and name, in document order.
    pub fn find_role(&self, role: Role, name: &str) -> Option<MemId> {
        self.descendants(self.root)
            .into_iter()
            .find(|id| self.role(*id) == Some(role) && self.name(*id) == Some(name))
    }

    /// Makes `labeller` the label of `target`, in both directions.
    pub fn set_label(&mut self, labeller: MemId, target: MemId) {
        if let Some(node) = self.nodes.get_mut(&labeller) {
            node.relations.push((RelationType::LabelFor, vec![target]));
        }
        if let Some(node) = self.nodes.get_mut(&target) {
            node.relations.push((RelationType::LabelledBy, vec![labeller]));
        }
    }

    /// Runs the named action: records it and calls any registered handler.
    fn perform(&mut self, id: MemId, action: &str) {
        self.invocations.push((id, action.to_string()));
        let handler = self.handlers.get(&(id, action.to_string())).cloned();
        if let Some(handler) = handler {
            handler(self, id);
        }
    }

    fn focus(&mut self, id: MemId) {
        for (other, node) in self.nodes.iter_mut() {
            if *other == id {
                node.states.insert(State::Focused);
            } else {
                node.states.remove(State::Focused);
            }
        }
    }

    fn focused(&self) -> Option<MemId> {
        self.descendants(self.root)
            .into_iter()
            .find(|id| self.nodes.get(id).is_some_and(|n| n.states.contains(State::Focused)))
    }

    /// Deepest showing node whose extents contain the point.
    fn node_at_point(&self, x: i32, y: i32) -> Option<MemId> {
        self.descendants(self.root).into_iter().rev().find(|id| {
            self.nodes.get(id).is_some_and(|n| {
                n.showing() && n.extents.is_some_and(|r| r.contains(x, y))
            })
        })
    }
}

struct Inner {
    bus_name: String,
    tree: Mutex<MemoryTree>,
    events: broadcast::Sender<AccessibleEvent>,
    enabled: AtomicBool,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, MemoryTree> {
        self.tree.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// An accessibility bus whose desktop lives in memory.
#[derive(Clone)]
pub struct MemoryDesktop {
    inner: Arc<Inner>,
}

impl Default for MemoryDesktop {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryDesktop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryDesktop")
            .field("bus_name", &self.inner.bus_name)
            .finish()
    }
}

impl MemoryDesktop {
    /// An empty desktop: a `desktop frame` root with no applications.
    pub fn new() -> Self {
        Self::with_root(NodeSnapshot::new(Role::DesktopFrame, "main"))
    }

    fn with_root(root: NodeSnapshot) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                bus_name: format!(":memory.{}", Uuid::new_v4().simple()),
                tree: Mutex::new(MemoryTree::new(root)),
                events,
                enabled: AtomicBool::new(true),
            }),
        }
    }

    /// Builds a desktop from a snapshot. A `desktop frame` snapshot becomes
    /// the root; anything else is added as the root's only child.
    pub fn from_snapshot(snapshot: NodeSnapshot) -> Self {
        if snapshot.role == Role::DesktopFrame {
            return Self::with_root(snapshot);
        }
        let desktop = Self::new();
        desktop.add(desktop.root_id(), snapshot);
        desktop
    }

    /// Loads a snapshot JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::from_snapshot(NodeSnapshot::from_json(&text)?))
    }

    /// Runs `f` with exclusive access to the tree.
    pub fn edit<R>(&self, f: impl FnOnce(&mut MemoryTree) -> R) -> R {
        f(&mut self.inner.lock())
    }

    pub fn root_id(&self) -> MemId {
        self.inner.lock().root()
    }

    pub fn add(&self, parent: MemId, snapshot: NodeSnapshot) -> MemId {
        self.edit(|tree| tree.add(parent, snapshot))
    }

    pub fn remove(&self, id: MemId) {
        self.edit(|tree| tree.remove(id));
    }

    pub fn find(&self, name: &str) -> Option<MemId> {
        self.inner.lock().find(name)
    }

    pub fn find_role(&self, role: Role, name: &str) -> Option<MemId> {
        self.inner.lock().find_role(role, name)
    }

    pub fn name(&self, id: MemId) -> Option<String> {
        self.inner.lock().name(id).map(str::to_string)
    }

    pub fn text(&self, id: MemId) -> Option<String> {
        self.inner.lock().text(id).map(str::to_string)
    }

    pub fn set_label(&self, labeller: MemId, target: MemId) {
        self.edit(|tree| tree.set_label(labeller, target));
    }

    /// Registers `handler` to run whenever `action` is performed on `id`.
    pub fn on_action<F>(&self, id: MemId, action: &str, handler: F)
    where
        F: Fn(&mut MemoryTree, MemId) + Send + Sync + 'static,
    {
        self.edit(|tree| {
            tree.handlers
                .insert((id, action.to_string()), Arc::new(handler));
        });
    }

    /// Every action performed so far, in order.
    pub fn invocations(&self) -> Vec<(MemId, String)> {
        self.inner.lock().invocations.clone()
    }

    /// A raw accessible for `id`.
    pub fn accessible(&self, id: MemId) -> AccessibleRef {
        Arc::new(MemAccessible {
            inner: self.inner.clone(),
            id,
        })
    }

    /// Toggles what [`AccessibilityBus::is_enabled`] reports.
    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Broadcasts `event` to registered listeners.
    pub fn emit(&self, event: AccessibleEvent) {
        // No listeners is fine.
        let _ = self.inner.events.send(event);
    }

    /// Clicks at a screen point: focuses the node there, performs its first
    /// action and emits the mouse button events.
    pub fn click_at(&self, x: i32, y: i32, button: u32) {
        let target = self.edit(|tree| {
            let target = tree.node_at_point(x, y)?;
            tree.focus(target);
            if button == 1 {
                let action = tree.nodes.get(&target).and_then(|n| n.actions.first().cloned());
                if let Some(action) = action {
                    tree.perform(target, &action);
                }
            }
            Some(target)
        });
        debug!(x, y, button, target = ?target, "delivered click");
        for phase in ["p", "r"] {
            self.emit(
                AccessibleEvent::new(format!("mouse:button:{}{}", button, phase)).with_details(x, y),
            );
        }
    }

    /// Inserts `text` at the caret of the focused editable node, if any.
    pub fn type_into_focus(&self, text: &str) {
        let inserted = self.edit(|tree| {
            let id = tree.focused()?;
            let state = tree.nodes.get_mut(&id)?.editable_mut().ok()?;
            let position = state.insert(state.caret, text);
            state.caret = position + TextState::char_len(text);
            Some((id, position))
        });
        if let Some((id, position)) = inserted {
            self.emit_text_inserted(id, position, text);
        }
    }

    fn emit_text_inserted(&self, id: MemId, position: i32, text: &str) {
        self.emit(
            AccessibleEvent::new("object:text-changed:insert")
                .with_source(self.accessible(id))
                .with_details(position, TextState::char_len(text))
                .with_data(text),
        );
    }
}

#[async_trait]
impl AccessibilityBus for MemoryDesktop {
    async fn desktop(&self) -> BusResult<AccessibleRef> {
        Ok(self.accessible(self.root_id()))
    }

    async fn is_enabled(&self) -> BusResult<bool> {
        Ok(self.inner.enabled.load(Ordering::Relaxed))
    }

    async fn register_event_listener(&self, event_names: &[&str]) -> BusResult<EventListener> {
        Ok(EventListener::new(event_names, self.inner.events.subscribe()))
    }
}

/// One object of a [`MemoryDesktop`].
struct MemAccessible {
    inner: Arc<Inner>,
    id: MemId,
}

impl fmt::Debug for MemAccessible {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MemAccessible({})", self.id)
    }
}

impl MemAccessible {
    fn wrap(&self, id: MemId) -> AccessibleRef {
        Arc::new(MemAccessible {
            inner: self.inner.clone(),
            id,
        })
    }

    fn read<T>(&self, f: impl FnOnce(&MemoryTree, &MemNode) -> BusResult<T>) -> BusResult<T> {
        let tree = self.inner.lock();
        let node = tree.nodes.get(&self.id).ok_or(BusError::Dead)?;
        f(&tree, node)
    }

    fn write<T>(&self, f: impl FnOnce(&mut MemNode) -> BusResult<T>) -> BusResult<T> {
        let mut tree = self.inner.lock();
        let node = tree.nodes.get_mut(&self.id).ok_or(BusError::Dead)?;
        f(node)
    }

    fn selection_child(&self, index: usize) -> BusResult<(MemId, bool)> {
        self.read(|_, node| {
            if !node.selectable_children {
                return Err(BusError::NotSupported(Capability::Selection));
            }
            let child = node
                .children
                .get(index)
                .copied()
                .ok_or_else(|| BusError::Failed(format!("no child at index {}", index)))?;
            Ok((child, node.states.contains(State::Multiselectable)))
        })
    }
}

#[async_trait]
impl Accessible for MemAccessible {
    fn id(&self) -> ObjectId {
        ObjectId::new(
            self.inner.bus_name.clone(),
            format!("/org/a11y/spaniel/accessible/{}", self.id),
        )
    }

    async fn name(&self) -> BusResult<String> {
        self.read(|_, n| Ok(n.name.clone()))
    }

    async fn description(&self) -> BusResult<String> {
        self.read(|_, n| Ok(n.description.clone()))
    }

    async fn role(&self) -> BusResult<Role> {
        self.read(|_, n| Ok(n.role))
    }

    async fn parent(&self) -> BusResult<Option<AccessibleRef>> {
        self.read(|_, n| Ok(n.parent.map(|p| self.wrap(p))))
    }

    async fn child_count(&self) -> BusResult<usize> {
        self.read(|_, n| Ok(n.children.len()))
    }

    async fn child_at_index(&self, index: usize) -> BusResult<AccessibleRef> {
        self.read(|_, n| {
            n.children
                .get(index)
                .map(|c| self.wrap(*c))
                .ok_or_else(|| BusError::Failed(format!("no child at index {}", index)))
        })
    }

    async fn index_in_parent(&self) -> BusResult<usize> {
        self.read(|tree, n| {
            let parent = n
                .parent
                .and_then(|p| tree.nodes.get(&p))
                .ok_or_else(|| BusError::Failed("object has no parent".to_string()))?;
            if let Some(index) = parent.children.iter().position(|c| *c == self.id) {
                return Ok(index);
            }
            parent
                .links
                .iter()
                .position(|c| *c == self.id)
                .map(|i| parent.children.len() + i)
                .ok_or_else(|| BusError::Failed("object not found in parent".to_string()))
        })
    }

    async fn state_set(&self) -> BusResult<StateSet> {
        self.read(|_, n| Ok(n.states.clone()))
    }

    async fn relation_set(&self) -> BusResult<Vec<Relation>> {
        self.read(|tree, n| {
            Ok(n.relations
                .iter()
                .map(|(kind, targets)| Relation {
                    kind: *kind,
                    targets: targets
                        .iter()
                        .filter(|t| tree.contains(**t))
                        .map(|t| self.wrap(*t))
                        .collect(),
                })
                .filter(|r| !r.targets.is_empty())
                .collect())
        })
    }

    async fn interfaces(&self) -> BusResult<BTreeSet<Capability>> {
        self.read(|_, n| Ok(n.interfaces()))
    }

    async fn n_actions(&self) -> BusResult<usize> {
        self.read(|_, n| {
            if n.actions.is_empty() {
                return Err(BusError::NotSupported(Capability::Action));
            }
            Ok(n.actions.len())
        })
    }

    async fn action_name(&self, index: usize) -> BusResult<String> {
        self.read(|_, n| {
            n.actions
                .get(index)
                .cloned()
                .ok_or(BusError::NotSupported(Capability::Action))
        })
    }

    async fn action_description(&self, index: usize) -> BusResult<String> {
        self.action_name(index).await.map(|_| String::new())
    }

    async fn action_key_binding(&self, index: usize) -> BusResult<String> {
        self.action_name(index).await.map(|_| String::new())
    }

    async fn do_action(&self, index: usize) -> BusResult<bool> {
        let mut tree = self.inner.lock();
        let node = tree.nodes.get(&self.id).ok_or(BusError::Dead)?;
        if node.actions.is_empty() {
            return Err(BusError::NotSupported(Capability::Action));
        }
        let action = node
            .actions
            .get(index)
            .cloned()
            .ok_or_else(|| BusError::Failed(format!("no action at index {}", index)))?;
        tree.perform(self.id, &action);
        Ok(true)
    }

    async fn extents(&self) -> BusResult<Rect> {
        self.read(|_, n| n.extents())
    }

    async fn grab_focus(&self) -> BusResult<bool> {
        let mut tree = self.inner.lock();
        tree.nodes.get(&self.id).ok_or(BusError::Dead)?.extents()?;
        tree.focus(self.id);
        Ok(true)
    }

    async fn accessible_at_point(&self, x: i32, y: i32) -> BusResult<Option<AccessibleRef>> {
        self.read(|tree, n| {
            n.extents()?;
            Ok(n.children
                .iter()
                .rev()
                .find(|c| {
                    tree.nodes.get(c).is_some_and(|child| {
                        child.showing() && child.extents.is_some_and(|r| r.contains(x, y))
                    })
                })
                .map(|c| self.wrap(*c)))
        })
    }

    async fn character_count(&self) -> BusResult<i32> {
        self.read(|_, n| Ok(n.text()?.len()))
    }

    async fn get_text(&self, start: i32, end: i32) -> BusResult<String> {
        self.read(|_, n| Ok(n.text()?.slice(start, end)))
    }

    async fn caret_offset(&self) -> BusResult<i32> {
        self.read(|_, n| Ok(n.text()?.caret))
    }

    async fn set_caret_offset(&self, offset: i32) -> BusResult<bool> {
        self.write(|n| {
            let text = n.text_mut()?;
            text.caret = offset.clamp(0, text.len());
            Ok(true)
        })
    }

    async fn n_text_selections(&self) -> BusResult<usize> {
        self.read(|_, n| Ok(n.text()?.selections.len()))
    }

    async fn text_selection(&self, index: usize) -> BusResult<(i32, i32)> {
        self.read(|_, n| {
            n.text()?
                .selections
                .get(index)
                .copied()
                .ok_or_else(|| BusError::Failed(format!("no selection at index {}", index)))
        })
    }

    async fn add_text_selection(&self, start: i32, end: i32) -> BusResult<bool> {
        self.write(|n| {
            let text = n.text_mut()?;
            let len = text.len();
            text.selections.push((start.clamp(0, len), end.clamp(0, len)));
            Ok(true)
        })
    }

    async fn remove_text_selection(&self, index: usize) -> BusResult<bool> {
        self.write(|n| {
            let text = n.text_mut()?;
            if index >= text.selections.len() {
                return Ok(false);
            }
            text.selections.remove(index);
            Ok(true)
        })
    }

    async fn set_text_contents(&self, contents: &str) -> BusResult<bool> {
        self.write(|n| {
            let text = n.editable_mut()?;
            text.contents = contents.to_string();
            text.caret = text.caret.min(text.len());
            text.selections.clear();
            Ok(true)
        })
    }

    async fn insert_text(&self, position: i32, contents: &str) -> BusResult<bool> {
        let position = self.write(|n| Ok(n.editable_mut()?.insert(position, contents)))?;
        let desktop = MemoryDesktop {
            inner: self.inner.clone(),
        };
        desktop.emit_text_inserted(self.id, position, contents);
        Ok(true)
    }

    async fn delete_text(&self, start: i32, end: i32) -> BusResult<bool> {
        self.write(|n| {
            n.editable_mut()?.delete(start, end);
            Ok(true)
        })
    }

    async fn n_links(&self) -> BusResult<usize> {
        self.read(|_, n| {
            if n.links.is_empty() {
                return Err(BusError::NotSupported(Capability::Hypertext));
            }
            Ok(n.links.len())
        })
    }

    async fn link(&self, index: usize) -> BusResult<AccessibleRef> {
        self.read(|_, n| {
            n.links
                .get(index)
                .map(|l| self.wrap(*l))
                .ok_or(BusError::NotSupported(Capability::Hypertext))
        })
    }

    async fn uri(&self) -> BusResult<String> {
        self.read(|_, n| n.uri.clone().ok_or(BusError::NotSupported(Capability::Hyperlink)))
    }

    async fn current_value(&self) -> BusResult<f64> {
        self.read(|_, n| Ok(n.value()?.current))
    }

    async fn set_current_value(&self, value: f64) -> BusResult<()> {
        self.write(|n| {
            let range = n.value.as_mut().ok_or(BusError::NotSupported(Capability::Value))?;
            range.current = value.clamp(range.minimum, range.maximum);
            Ok(())
        })
    }

    async fn minimum_value(&self) -> BusResult<f64> {
        self.read(|_, n| Ok(n.value()?.minimum))
    }

    async fn maximum_value(&self) -> BusResult<f64> {
        self.read(|_, n| Ok(n.value()?.maximum))
    }

    async fn minimum_increment(&self) -> BusResult<f64> {
        self.read(|_, n| Ok(n.value()?.increment))
    }

    async fn toolkit_name(&self) -> BusResult<String> {
        self.read(|_, n| Ok(n.toolkit()?.name.clone()))
    }

    async fn toolkit_version(&self) -> BusResult<String> {
        self.read(|_, n| Ok(n.toolkit()?.version.clone()))
    }

    async fn application_id(&self) -> BusResult<i32> {
        self.read(|_, n| Ok(n.toolkit()?.id))
    }

    async fn select_child(&self, index: usize) -> BusResult<bool> {
        let (child, multi) = self.selection_child(index)?;
        let mut tree = self.inner.lock();
        if !multi {
            for sibling in tree.children(self.id) {
                tree.set_state(sibling, State::Selected, false);
            }
        }
        tree.set_state(child, State::Selected, true);
        Ok(true)
    }

    async fn deselect_child(&self, index: usize) -> BusResult<bool> {
        let (child, _) = self.selection_child(index)?;
        self.inner.lock().set_state(child, State::Selected, false);
        Ok(true)
    }

    async fn is_child_selected(&self, index: usize) -> BusResult<bool> {
        let (child, _) = self.selection_child(index)?;
        Ok(self
            .inner
            .lock()
            .states(child)
            .is_some_and(|s| s.contains(State::Selected)))
    }

    async fn n_selected_children(&self) -> BusResult<usize> {
        self.read(|tree, n| {
            if !n.selectable_children {
                return Err(BusError::NotSupported(Capability::Selection));
            }
            Ok(n.children
                .iter()
                .filter(|c| tree.states(**c).is_some_and(|s| s.contains(State::Selected)))
                .count())
        })
    }
}

/// A synthetic input event seen by [`RecordingInput`].
///
/// Serializes externally tagged in snake case, e.g.
/// `{"click":{"x":50,"y":65,"button":1}}` or `{"type":"hello"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputEvent {
    Motion { x: i32, y: i32 },
    RelativeMotion { dx: i32, dy: i32 },
    Press { x: i32, y: i32, button: u32 },
    Release { x: i32, y: i32, button: u32 },
    Click { x: i32, y: i32, button: u32 },
    DoubleClick { x: i32, y: i32, button: u32 },
    Type(String),
    KeyCombo(String),
    Key(String),
}

/// An [`InputInjector`] that records every event, optionally delivering
/// clicks and typing to a [`MemoryDesktop`].
#[derive(Debug, Default)]
pub struct RecordingInput {
    events: Mutex<Vec<InputEvent>>,
    desktop: Option<MemoryDesktop>,
}

impl RecordingInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// A recorder that also clicks and types into `desktop`.
    pub fn attached(desktop: MemoryDesktop) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            desktop: Some(desktop),
        }
    }

    fn push(&self, event: InputEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    pub fn events(&self) -> Vec<InputEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Everything typed so far, concatenated.
    pub fn typed(&self) -> String {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                InputEvent::Type(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[async_trait]
impl InputInjector for RecordingInput {
    async fn absolute_motion(&self, x: i32, y: i32) -> Result<()> {
        self.push(InputEvent::Motion { x, y });
        Ok(())
    }

    async fn relative_motion(&self, dx: i32, dy: i32) -> Result<()> {
        self.push(InputEvent::RelativeMotion { dx, dy });
        Ok(())
    }

    async fn press(&self, x: i32, y: i32, button: u32) -> Result<()> {
        self.push(InputEvent::Press { x, y, button });
        Ok(())
    }

    async fn release(&self, x: i32, y: i32, button: u32) -> Result<()> {
        self.push(InputEvent::Release { x, y, button });
        Ok(())
    }

    async fn click(&self, x: i32, y: i32, button: u32) -> Result<()> {
        self.push(InputEvent::Click { x, y, button });
        if let Some(desktop) = &self.desktop {
            desktop.click_at(x, y, button);
        }
        Ok(())
    }

    async fn double_click(&self, x: i32, y: i32, button: u32) -> Result<()> {
        self.push(InputEvent::DoubleClick { x, y, button });
        Ok(())
    }

    async fn type_string(&self, text: &str) -> Result<()> {
        self.push(InputEvent::Type(text.to_string()));
        if let Some(desktop) = &self.desktop {
            desktop.type_into_focus(text);
        }
        Ok(())
    }

    async fn key_combo(&self, combo: &KeyCombo) -> Result<()> {
        self.push(InputEvent::KeyCombo(combo.to_string()));
        Ok(())
    }

    async fn press_key(&self, keysym: &str) -> Result<()> {
        self.push(InputEvent::Key(keysym.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (MemoryDesktop, MemId, MemId, MemId) {
        let desktop = MemoryDesktop::new();
        let app = desktop.add(
            desktop.root_id(),
            NodeSnapshot::new(Role::Application, "demo").child(
                NodeSnapshot::new(Role::Frame, "Main")
                    .extents(0, 0, 400, 300)
                    .child(NodeSnapshot::new(Role::Label, "Name:"))
                    .child(
                        NodeSnapshot::new(Role::Text, "")
                            .editable_text("")
                            .extents(100, 10, 200, 20)
                            .labelled_by("Name:"),
                    )
                    .child(
                        NodeSnapshot::new(Role::PushButton, "Go")
                            .action("click")
                            .extents(10, 50, 50, 20),
                    ),
            ),
        );
        let entry = desktop.find_role(Role::Text, "").unwrap();
        let go = desktop.find("Go").unwrap();
        (desktop, app, entry, go)
    }

    #[tokio::test]
    async fn labels_resolve_by_name() {
        let (desktop, _, entry, _) = sample();
        let label = desktop.find("Name:").unwrap();
        let acc = desktop.accessible(entry);
        let relations = acc.relation_set().await.unwrap();
        assert_eq!(relations.len(), 1);
        assert_eq!(relations[0].kind, RelationType::LabelledBy);
        assert_eq!(relations[0].targets[0].id(), desktop.accessible(label).id());
    }

    #[tokio::test]
    async fn removed_subtree_is_dead() {
        let (desktop, app, entry, _) = sample();
        let acc = desktop.accessible(entry);
        desktop.remove(app);
        assert_eq!(acc.name().await, Err(BusError::Dead));
        assert!(desktop.find("Go").is_none());
        let root = desktop.accessible(desktop.root_id());
        assert_eq!(root.child_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn handlers_can_edit_the_tree() {
        let (desktop, _, _, go) = sample();
        desktop.on_action(go, "click", |tree, id| tree.set_name(id, "Going"));
        assert!(desktop.accessible(go).do_action(0).await.unwrap());
        assert_eq!(desktop.name(go).as_deref(), Some("Going"));
        assert_eq!(desktop.invocations(), vec![(go, "click".to_string())]);
    }

    #[tokio::test]
    async fn text_offsets_are_characters() {
        let (desktop, _, entry, _) = sample();
        let acc = desktop.accessible(entry);
        acc.set_text_contents("héllo").await.unwrap();
        assert_eq!(acc.character_count().await.unwrap(), 5);
        assert_eq!(acc.get_text(1, 3).await.unwrap(), "él");
        assert_eq!(acc.get_text(2, -1).await.unwrap(), "llo");
        acc.insert_text(99, "!").await.unwrap();
        assert_eq!(desktop.text(entry).as_deref(), Some("héllo!"));
        acc.delete_text(0, 1).await.unwrap();
        assert_eq!(desktop.text(entry).as_deref(), Some("éllo!"));
        assert!(acc.set_caret_offset(-4).await.unwrap());
        assert_eq!(acc.caret_offset().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn attached_input_clicks_and_types() {
        let (desktop, _, entry, go) = sample();
        let mut listener = desktop.register_event_listener(&["object:text-changed"]).await.unwrap();
        let input = RecordingInput::attached(desktop.clone());
        input.click(20, 55, 1).await.unwrap();
        assert_eq!(desktop.invocations(), vec![(go, "click".to_string())]);
        input.click(150, 15, 1).await.unwrap();
        input.type_string("hi").await.unwrap();
        assert_eq!(desktop.text(entry).as_deref(), Some("hi"));
        let event = listener.next().await.unwrap();
        assert_eq!(event.kind, "object:text-changed:insert");
        assert_eq!(event.any_data.as_deref(), Some("hi"));
    }

    #[tokio::test]
    async fn desktop_snapshot_becomes_root() {
        let snapshot = NodeSnapshot::new(Role::DesktopFrame, "main")
            .child(NodeSnapshot::new(Role::Application, "a"))
            .child(NodeSnapshot::new(Role::Application, "b"));
        let desktop = MemoryDesktop::from_snapshot(snapshot);
        let root = desktop.desktop().await.unwrap();
        assert_eq!(root.child_count().await.unwrap(), 2);
        assert!(root.parent().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn bus_names_are_unique() {
        let a = MemoryDesktop::new();
        let b = MemoryDesktop::new();
        assert_ne!(a.accessible(a.root_id()).id(), b.accessible(b.root_id()).id());
    }
}
