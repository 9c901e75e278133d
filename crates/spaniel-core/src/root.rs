//! Typed views of the desktop root, applications and windows.

use std::ops::Deref;

use crate::accessible::{Role, State};
use crate::error::{Result, SpanielError};
use crate::node::Node;
use crate::predicate::Predicate;
use crate::search::FindOptions;

/// The desktop root. Its children are the running applications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Root(Node);

impl Root {
    pub fn new(node: Node) -> Self {
        Self(node)
    }

    pub fn node(&self) -> &Node {
        &self.0
    }

    /// Every running application.
    pub async fn applications(&self) -> Result<Vec<Application>> {
        let predicate = Predicate::from_fn(|node| {
            Box::pin(async move { node.role().await.ok() == Some(Role::Application) })
        });
        let apps = self
            .0
            .find_children_with(&predicate, FindOptions::default().recursive(false))
            .await?;
        Ok(apps.into_iter().map(Application).collect())
    }

    /// The application named `name`, retrying until it appears.
    pub async fn application(&self, name: &str) -> Result<Application> {
        let predicate = Predicate::ApplicationNamed(self.0.engine().translatable(name));
        match self
            .0
            .find_child_with(&predicate, FindOptions::default().recursive(false))
            .await?
        {
            Some(node) => Ok(Application(node)),
            None => Err(SpanielError::Search {
                description: predicate.describe_search_result(),
                origin: self.0.log_string().await,
            }),
        }
    }
}

impl Deref for Root {
    type Target = Node;

    fn deref(&self) -> &Node {
        &self.0
    }
}

/// A running application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Application(Node);

impl Application {
    pub fn new(node: Node) -> Self {
        Self(node)
    }

    pub fn node(&self) -> &Node {
        &self.0
    }

    pub fn into_node(self) -> Node {
        self.0
    }

    /// Top-level frames of the application.
    pub async fn windows(&self) -> Result<Vec<Window>> {
        let frames = self
            .0
            .find_children_with(&Predicate::Window, FindOptions::default().recursive(false))
            .await?;
        Ok(frames.into_iter().map(Window).collect())
    }

    /// Top-level dialogs of the application.
    pub async fn dialogs(&self) -> Result<Vec<Node>> {
        let predicate = Predicate::from_fn(|node| {
            Box::pin(async move { node.role().await.ok() == Some(Role::Dialog) })
        });
        self.0
            .find_children_with(&predicate, FindOptions::default().recursive(false))
            .await
    }

    /// The top-level frame named `name`.
    pub async fn window(&self, name: &str) -> Result<Window> {
        let predicate = Predicate::WindowNamed(self.0.engine().translatable(name));
        let options = FindOptions::default().recursive(false);
        match self.0.find_child_with(&predicate, options).await? {
            Some(node) => Ok(Window(node)),
            None => Err(SpanielError::Search {
                description: predicate.describe_search_result(),
                origin: self.0.log_string().await,
            }),
        }
    }
}

impl Deref for Application {
    type Target = Node;

    fn deref(&self) -> &Node {
        &self.0
    }
}

/// A top-level frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window(Node);

impl Window {
    pub fn new(node: Node) -> Self {
        Self(node)
    }

    pub fn node(&self) -> &Node {
        &self.0
    }

    pub async fn title(&self) -> Result<String> {
        self.0.name().await
    }

    /// Whether the window manager reports this window as active.
    pub async fn is_active(&self) -> Result<bool> {
        Ok(self.0.state_set().await?.contains(State::Active))
    }
}

impl Deref for Window {
    type Target = Node;

    fn deref(&self) -> &Node {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{self, Gedit};

    #[tokio::test]
    async fn lists_applications_and_windows() {
        let gedit = Gedit::new();
        let (engine, _) = fixtures::engine(&gedit.desktop);
        let root = engine.root().await.unwrap();
        let apps = root.applications().await.unwrap();
        assert_eq!(apps.len(), 1);
        let app = root.application("gedit").await.unwrap();
        assert_eq!(app, apps[0]);
        assert_eq!(app.toolkit_name().await.unwrap(), "GTK");
        let windows = app.windows().await.unwrap();
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].title().await.unwrap(), "Untitled - gedit");
        assert_eq!(app.window("Untitled - gedit").await.unwrap(), windows[0]);
        assert!(app.dialogs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_application_is_a_search_error() {
        let gedit = Gedit::new();
        let (engine, _) = fixtures::engine(&gedit.desktop);
        let root = engine.root().await.unwrap();
        assert!(root.application("gcalctool").await.unwrap_err().is_search());
    }
}
