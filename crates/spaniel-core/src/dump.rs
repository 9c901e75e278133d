//! Tree dumps and serializable snapshots.
//!
//! [`dump`] renders a subtree as indented text for humans. [`NodeSnapshot`]
//! is the JSON form of a subtree: [`snapshot`] captures one from a live tree,
//! and [`MemoryDesktop`](crate::memory::MemoryDesktop) replays one offline.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::accessible::{Capability, Rect, Role, State, StateSet};
use crate::error::{Result, SpanielError};
use crate::node::Node;
use crate::predicate::BoxFuture;

fn default_states() -> StateSet {
    [State::Enabled, State::Sensitive, State::Showing, State::Visible]
        .into_iter()
        .collect()
}

fn is_default_states(states: &StateSet) -> bool {
    *states == default_states()
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Numeric range of a value widget.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueSnapshot {
    pub current: f64,
    pub minimum: f64,
    pub maximum: f64,
    pub increment: f64,
}

/// Application metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolkitSnapshot {
    pub name: String,
    pub version: String,
    pub id: i32,
}

/// A serializable copy of one node and its descendants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub role: Role,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default = "default_states", skip_serializing_if = "is_default_states")]
    pub states: StateSet,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extents: Option<Rect>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub editable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<ValueSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toolkit: Option<ToolkitSnapshot>,
    /// Name of the node labelling this one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labeller: Option<String>,
    /// Whether the node offers a selection over its children.
    #[serde(default, skip_serializing_if = "is_false")]
    pub selectable_children: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<NodeSnapshot>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeSnapshot>,
}

impl NodeSnapshot {
    /// A sensitive, showing node with no capabilities.
    pub fn new(role: Role, name: impl Into<String>) -> Self {
        Self {
            role,
            name: name.into(),
            description: String::new(),
            states: default_states(),
            actions: Vec::new(),
            extents: None,
            text: None,
            editable: false,
            value: None,
            uri: None,
            toolkit: None,
            labeller: None,
            selectable_children: false,
            links: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_state(mut self, state: State) -> Self {
        self.states.insert(state);
        self
    }

    pub fn without_state(mut self, state: State) -> Self {
        self.states.remove(state);
        self
    }

    pub fn insensitive(self) -> Self {
        self.without_state(State::Sensitive).without_state(State::Enabled)
    }

    pub fn hidden(self) -> Self {
        self.without_state(State::Showing).without_state(State::Visible)
    }

    pub fn action(mut self, name: impl Into<String>) -> Self {
        self.actions.push(name.into());
        self
    }

    pub fn extents(mut self, x: i32, y: i32, width: i32, height: i32) -> Self {
        self.extents = Some(Rect::new(x, y, width, height));
        self
    }

    /// Read-only text contents.
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn editable_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self.editable = true;
        self.with_state(State::Editable)
    }

    pub fn value(mut self, current: f64, minimum: f64, maximum: f64, increment: f64) -> Self {
        self.value = Some(ValueSnapshot {
            current,
            minimum,
            maximum,
            increment,
        });
        self
    }

    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    pub fn toolkit(mut self, name: impl Into<String>, version: impl Into<String>, id: i32) -> Self {
        self.toolkit = Some(ToolkitSnapshot {
            name: name.into(),
            version: version.into(),
            id,
        });
        self
    }

    pub fn labelled_by(mut self, label: impl Into<String>) -> Self {
        self.labeller = Some(label.into());
        self
    }

    pub fn selectable_children(mut self) -> Self {
        self.selectable_children = true;
        self
    }

    pub fn child(mut self, child: NodeSnapshot) -> Self {
        self.children.push(child);
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = NodeSnapshot>) -> Self {
        self.children.extend(children);
        self
    }

    pub fn link(mut self, link: NodeSnapshot) -> Self {
        self.links.push(link);
        self
    }

    /// Number of nodes in this subtree, links included.
    pub fn node_count(&self) -> usize {
        1 + self
            .children
            .iter()
            .chain(&self.links)
            .map(NodeSnapshot::node_count)
            .sum::<usize>()
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Keeps `Ok` values, maps a missing capability to `None` and propagates
/// everything else.
fn optional<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(SpanielError::CapabilityAbsent { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Captures `node` and its descendants. Children that die during the walk
/// are left out.
pub fn snapshot(node: &Node) -> BoxFuture<'_, Result<NodeSnapshot>> {
    Box::pin(async move {
        let mut snap = NodeSnapshot::new(node.role().await?, node.name().await?);
        snap.description = node.description().await?;
        snap.states = node.state_set().await?;
        snap.actions = node
            .actions()
            .await?
            .iter()
            .map(|a| a.name().to_string())
            .collect();
        snap.extents = optional(node.extents().await)?;
        snap.text = optional(node.text().await)?;
        snap.editable = node
            .interfaces()
            .await?
            .contains(&Capability::EditableText);
        if let Some(current) = optional(node.value().await)? {
            snap.value = Some(ValueSnapshot {
                current,
                minimum: node.min_value().await?,
                maximum: node.max_value().await?,
                increment: node.min_value_increment().await?,
            });
        }
        snap.uri = optional(node.uri().await)?;
        if let Some(name) = optional(node.toolkit_name().await)? {
            snap.toolkit = Some(ToolkitSnapshot {
                name,
                version: node.toolkit_version().await?,
                id: node.application_id().await?,
            });
        }
        if let Some(labeller) = node.labeller().await? {
            snap.labeller = Some(labeller.name().await?);
        }
        snap.selectable_children = node
            .interfaces()
            .await?
            .contains(&Capability::Selection);
        let count = node.child_count().await?;
        let limit = node.engine().config().children_limit;
        for index in 0..count.min(limit) {
            let Ok(child) = node.child_at_index(index).await else {
                continue;
            };
            match snapshot(&child).await {
                Ok(child) => snap.children.push(child),
                Err(e) if e.is_dead() => continue,
                Err(e) => return Err(e),
            }
        }
        for link in node.links().await? {
            snap.links.push(snapshot(&link).await?);
        }
        Ok(snap)
    })
}

/// Renders `node`'s subtree as indented text, one node per line, with its
/// actions and text contents beneath it.
pub async fn dump(node: &Node) -> Result<String> {
    let mut out = String::new();
    let mut stack = vec![(node.clone(), 0usize)];
    while let Some((current, depth)) = stack.pop() {
        let indent = " ".repeat(depth);
        let role = current.role_name().await?;
        let name = current.name().await?;
        let description = current.description().await?;
        if description.is_empty() {
            let _ = writeln!(out, "{}[{} | {}]", indent, role, name);
        } else {
            let _ = writeln!(out, "{}[{} | {}] - {}", indent, role, name, description);
        }
        for action in current.actions().await? {
            let _ = writeln!(out, "{} action: {}", indent, action.name());
        }
        if let Some(text) = optional(current.text().await)? {
            if !text.is_empty() {
                let _ = writeln!(out, "{} text: {:?}", indent, text);
            }
        }
        let children = current.children_tolerant().await?;
        for child in children.into_iter().rev() {
            stack.push((child, depth + 1));
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{self, Gedit};
    use crate::memory::MemoryDesktop;

    #[tokio::test]
    async fn dump_lists_nodes_with_actions() {
        let gedit = Gedit::new();
        let (engine, _) = fixtures::engine(&gedit.desktop);
        let app = gedit.node(&engine, gedit.app);
        let text = dump(&app).await.unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "[application | gedit]");
        assert_eq!(lines[1], " [frame | Untitled - gedit]");
        assert!(lines.contains(&"   [push button | OK]"));
        assert!(lines.contains(&"    action: click"));
        assert!(lines.contains(&"    text: \"hello\""));
    }

    #[tokio::test]
    async fn snapshot_replays_into_an_equal_tree() {
        let gedit = Gedit::new();
        let (engine, _) = fixtures::engine(&gedit.desktop);
        let app = gedit.node(&engine, gedit.app);
        let snap = snapshot(&app).await.unwrap();
        assert_eq!(snap.toolkit.as_ref().map(|t| t.name.as_str()), Some("GTK"));

        let replay = MemoryDesktop::new();
        let id = replay.add(replay.root_id(), snap.clone());
        let (engine2, _) = fixtures::engine(&replay);
        let app2 = Node::new(engine2, replay.accessible(id));
        assert_eq!(snapshot(&app2).await.unwrap(), snap);
        assert_eq!(dump(&app2).await.unwrap(), dump(&app).await.unwrap());
    }

    #[test]
    fn json_omits_defaults() {
        let snap = NodeSnapshot::new(Role::PushButton, "OK").action("click");
        let json = serde_json::to_string(&snap).unwrap();
        assert_eq!(json, r#"{"role":"push button","name":"OK","actions":["click"]}"#);
        let back = NodeSnapshot::from_json(&json).unwrap();
        assert_eq!(back, snap);
    }

    #[test]
    fn node_count_includes_links() {
        let snap = NodeSnapshot::new(Role::Panel, "")
            .child(NodeSnapshot::new(Role::Label, "a"))
            .child(NodeSnapshot::new(Role::Label, "b").link(NodeSnapshot::new(Role::Link, "c")));
        assert_eq!(snap.node_count(), 4);
    }
}
