//! Tree search with retry, and absolute search paths.
//!
//! A search walks the subtree below a node in document order (depth-first,
//! pre-order) and returns the first node satisfying a [`Predicate`]. The start
//! node itself is never tested. Searches retry with
//! `search_backoff_duration` sleeps up to `search_cutoff_count` attempts,
//! which absorbs the lag between a UI change and its accessibility tree.

use std::collections::HashSet;

use tracing::{debug, error, info};

use crate::accessible::Role;
use crate::error::{Result, SpanielError};
use crate::node::Node;
use crate::predicate::{GenericPredicate, Predicate};
use crate::search_path::{SearchPath, SearchStep};

/// Options for [`Node::find_child_with`] and [`Node::find_children_with`].
#[derive(Debug, Clone)]
pub struct FindOptions {
    /// Search the whole subtree rather than direct children only.
    pub recursive: bool,
    /// Retry with backoff until the cutoff count.
    pub retry: bool,
    /// Fail with [`SpanielError::Search`] instead of returning `None`.
    pub require_result: bool,
    /// Debug name given to the returned node.
    pub debug_name: Option<String>,
    /// Only return nodes in the `showing` state.
    pub showing_only: bool,
}

impl Default for FindOptions {
    fn default() -> Self {
        Self {
            recursive: true,
            retry: true,
            require_result: true,
            debug_name: None,
            showing_only: false,
        }
    }
}

impl FindOptions {
    /// A single pass that returns `None` on a miss.
    pub fn single_pass() -> Self {
        Self::default().retry(false).require_result(false)
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn retry(mut self, retry: bool) -> Self {
        self.retry = retry;
        self
    }

    pub fn require_result(mut self, require_result: bool) -> Self {
        self.require_result = require_result;
        self
    }

    pub fn debug_name(mut self, name: impl Into<String>) -> Self {
        self.debug_name = Some(name.into());
        self
    }

    pub fn showing_only(mut self, showing_only: bool) -> Self {
        self.showing_only = showing_only;
        self
    }
}

impl Node {
    /// Walks the subtree in document order collecting matches, stopping at
    /// the first one when `first_only` is set. Branches that fail to
    /// resolve are skipped.
    async fn walk(&self, recursive: bool, matches: &Matches<'_>, first_only: bool) -> Vec<Node> {
        let mut found = Vec::new();
        let mut visited = HashSet::from([self.id()]);
        let mut stack: Vec<Node> = match self.children_tolerant().await {
            Ok(children) => children.into_iter().rev().collect(),
            Err(e) => {
                debug!(error = %e, "search origin has no reachable children");
                return found;
            }
        };
        while let Some(node) = stack.pop() {
            if !visited.insert(node.id()) {
                continue;
            }
            if matches.test(&node).await {
                found.push(node.clone());
                if first_only {
                    break;
                }
            }
            if recursive {
                match node.children_tolerant().await {
                    Ok(children) => stack.extend(children.into_iter().rev()),
                    Err(e) => debug!(error = %e, "skipping branch"),
                }
            }
        }
        found
    }

    /// Finds the first matching descendant, retrying with the default
    /// options. Fails with [`SpanielError::Search`] when nothing matches.
    pub async fn find_child(&self, predicate: &Predicate) -> Result<Node> {
        match self.find_child_with(predicate, FindOptions::default()).await? {
            Some(node) => Ok(node),
            None => Err(SpanielError::Search {
                description: predicate.describe_search_result(),
                origin: self.log_string().await,
            }),
        }
    }

    /// Finds the first matching descendant.
    ///
    /// Returns `Ok(None)` on a miss only when `require_result` is off.
    pub async fn find_child_with(
        &self,
        predicate: &Predicate,
        options: FindOptions,
    ) -> Result<Option<Node>> {
        predicate.validate()?;
        let config = self.engine().config();
        let description = predicate.describe_search_result();
        let cutoff = config.search_cutoff_count.max(1);
        for attempt in 1..=cutoff {
            if attempt > config.search_warning_threshold || config.debug_searching {
                info!(attempt, search = %description, "searching");
            }
            let matches = Matches {
                predicate,
                showing_only: options.showing_only,
            };
            let found = self.walk(options.recursive, &matches, true).await;
            if let Some(node) = found.into_iter().next() {
                let node = node.with_debug_name(
                    options.debug_name.clone().unwrap_or_else(|| description.clone()),
                );
                if config.debug_search_paths {
                    if let Ok(path) = node.absolute_search_path().await {
                        debug!(path = %path, "search result path");
                    }
                }
                return Ok(Some(node));
            }
            if !options.retry {
                break;
            }
            if attempt < cutoff {
                self.engine()
                    .sleep(config.search_backoff(), "search backoff")
                    .await;
            }
        }
        if options.require_result {
            let origin = self.log_string().await;
            error!(search = %description, origin = %origin, "search exhausted");
            return Err(SpanielError::Search {
                description,
                origin,
            });
        }
        Ok(None)
    }

    /// All matching descendants in document order, from a single pass.
    pub async fn find_children(&self, predicate: &Predicate) -> Result<Vec<Node>> {
        self.find_children_with(predicate, FindOptions::default())
            .await
    }

    /// Like [`find_children`](Self::find_children); honours `recursive` and
    /// `showing_only`. Duplicate objects are reported once.
    pub async fn find_children_with(
        &self,
        predicate: &Predicate,
        options: FindOptions,
    ) -> Result<Vec<Node>> {
        predicate.validate()?;
        let matches = Matches {
            predicate,
            showing_only: options.showing_only,
        };
        Ok(self.walk(options.recursive, &matches, false).await)
    }

    /// The nearest ancestor satisfying `predicate`.
    pub async fn find_ancestor(&self, predicate: &Predicate) -> Result<Option<Node>> {
        predicate.validate()?;
        let mut current = self.parent().await?;
        while let Some(node) = current {
            if predicate.satisfied_by_node(&node).await {
                return Ok(Some(node));
            }
            current = node.parent().await?;
        }
        Ok(None)
    }

    async fn find_translated(&self, predicate: Predicate) -> Result<Node> {
        self.find_child(&predicate).await
    }

    /// Finds a descendant by any combination of name, role name,
    /// description and label.
    pub async fn child(&self, predicate: GenericPredicate) -> Result<Node> {
        let predicate = self.engine().translate_predicate(&Predicate::Generic(predicate));
        self.find_translated(predicate).await
    }

    pub async fn child_named(&self, name: &str) -> Result<Node> {
        let name = self.engine().translatable(name);
        self.find_translated(Predicate::Named(name)).await
    }

    pub async fn child_labelled(&self, label: &str) -> Result<Node> {
        let label = self.engine().translatable(label);
        self.find_translated(Predicate::LabelledAs(label)).await
    }

    pub async fn button(&self, name: &str) -> Result<Node> {
        let name = self.engine().translatable(name);
        self.find_translated(Predicate::ButtonNamed(name)).await
    }

    pub async fn menu(&self, name: &str) -> Result<Node> {
        let name = self.engine().translatable(name);
        self.find_translated(Predicate::MenuNamed(name)).await
    }

    pub async fn menu_item(&self, name: &str) -> Result<Node> {
        let name = self.engine().translatable(name);
        self.find_translated(Predicate::MenuItemNamed(name)).await
    }

    pub async fn text_entry(&self, name: &str) -> Result<Node> {
        let name = self.engine().translatable(name);
        self.find_translated(Predicate::TextEntryNamed(name)).await
    }

    pub async fn tab(&self, name: &str) -> Result<Node> {
        let name = self.engine().translatable(name);
        self.find_translated(Predicate::TabNamed(name)).await
    }

    pub async fn dialog(&self, name: &str) -> Result<Node> {
        let name = self.engine().translatable(name);
        self.find_translated(Predicate::DialogNamed(name)).await
    }

    pub async fn window(&self, name: &str) -> Result<Node> {
        let name = self.engine().translatable(name);
        self.find_translated(Predicate::WindowNamed(name)).await
    }

    /// Whether a descendant satisfies `predicate`, checked in a single pass.
    pub async fn is_child(&self, predicate: &Predicate, recursive: bool) -> Result<bool> {
        let options = FindOptions::single_pass().recursive(recursive);
        Ok(self.find_child_with(predicate, options).await?.is_some())
    }

    async fn is_identifiable(&self) -> Result<bool> {
        if self.parent().await?.is_none() {
            return Ok(true);
        }
        if self.labeller().await?.is_some() {
            return Ok(true);
        }
        Ok(!self.name().await?.is_empty())
    }

    /// The predicate that best identifies this node among its ancestor's
    /// descendants: its label, then a role-specific predicate, then name and
    /// role name together.
    async fn best_predicate(&self) -> Result<Predicate> {
        if let Some(labeller) = self.labeller().await? {
            let label = labeller.name().await?;
            if !label.is_empty() {
                return Ok(Predicate::LabelledAs(label.into()));
            }
        }
        let name = self.name().await?;
        let predicate = match self.role().await? {
            Role::Application => Predicate::ApplicationNamed(name.into()),
            Role::Frame => Predicate::WindowNamed(name.into()),
            Role::Dialog => Predicate::DialogNamed(name.into()),
            Role::Menu => Predicate::MenuNamed(name.into()),
            Role::MenuItem | Role::CheckMenuItem => Predicate::MenuItemNamed(name.into()),
            Role::PushButton => Predicate::ButtonNamed(name.into()),
            Role::Text => Predicate::TextEntryNamed(name.into()),
            Role::PageTab => Predicate::TabNamed(name.into()),
            _ => Predicate::Generic(
                GenericPredicate::new()
                    .name(name)
                    .role_name(self.role_name().await?),
            ),
        };
        Ok(predicate)
    }

    /// A search path that leads from the desktop root to this node.
    ///
    /// Each step searches from the nearest identifiable ancestor (one with a
    /// name or a label); the step is recursive when unidentifiable
    /// intermediate nodes were skipped.
    pub async fn absolute_search_path(&self) -> Result<SearchPath> {
        let mut steps = Vec::new();
        let mut current = self.clone();
        while let Some(mut ancestor) = current.parent().await? {
            let predicate = current.best_predicate().await?;
            let mut recursive = false;
            while !ancestor.is_identifiable().await? {
                recursive = true;
                ancestor = match ancestor.parent().await? {
                    Some(parent) => parent,
                    None => break,
                };
            }
            steps.push(SearchStep {
                predicate,
                recursive,
            });
            current = ancestor;
        }
        steps.reverse();
        Ok(steps.into_iter().collect())
    }

    /// Replays a search path from this node, step by step.
    pub async fn apply_search_path(&self, path: &SearchPath) -> Result<Node> {
        let mut current = self.clone();
        for step in path.steps() {
            let predicate = self.engine().translate_predicate(&step.predicate);
            let options = FindOptions::default().recursive(step.recursive);
            current = match current.find_child_with(&predicate, options).await? {
                Some(node) => node,
                None => {
                    return Err(SpanielError::Search {
                        description: predicate.describe_search_result(),
                        origin: current.log_string().await,
                    })
                }
            };
        }
        Ok(current)
    }
}

struct Matches<'p> {
    predicate: &'p Predicate,
    showing_only: bool,
}

impl Matches<'_> {
    async fn test(&self, node: &Node) -> bool {
        if !self.predicate.satisfied_by_node(node).await {
            return false;
        }
        !self.showing_only || node.showing().await.unwrap_or(false)
    }
}
