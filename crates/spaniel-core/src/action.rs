//! Named actions and the sensitivity gate in front of them.

use tracing::{error, info, warn, Instrument};

use crate::accessible::BusError;
use crate::error::{Result, SpanielError};
use crate::node::Node;

/// One action advertised by a node.
#[derive(Debug, Clone)]
pub struct Action {
    node: Node,
    index: usize,
    name: String,
    description: String,
    key_binding: String,
}

impl Action {
    pub(crate) fn new(
        node: Node,
        index: usize,
        name: String,
        description: String,
        key_binding: String,
    ) -> Self {
        Self {
            node,
            index,
            name,
            description,
            key_binding,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn key_binding(&self) -> &str {
        &self.key_binding
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    /// Performs the action.
    ///
    /// Insensitive nodes are refused with [`SpanielError::NotSensitive`] when
    /// `ensure_sensitivity` is set, before anything is sent and without the
    /// post-action delay. Otherwise a warning is logged and the action goes
    /// ahead. After the invocation the engine sleeps `action_delay`, whether
    /// or not the application reported success.
    pub async fn invoke(&self) -> Result<()> {
        let node = &self.node;
        let config = node.engine().config();
        let target = node.log_string().await;
        if !node.sensitive().await? {
            if config.ensure_sensitivity {
                error!(action = %self.name, node = %target, "refusing action on insensitive node");
                return Err(SpanielError::NotSensitive {
                    action: self.name.clone(),
                    node: target,
                });
            }
            warn!(action = %self.name, node = %target, "acting on insensitive node");
        }
        let span = tracing::info_span!("action", name = %self.name, node = %target);
        async {
            info!("performing action");
            let result = node.accessible().do_action(self.index).await;
            node.engine()
                .sleep(config.action_delay(), "after action")
                .await;
            match node.check(result) {
                Ok(true) => Ok(()),
                Ok(false) => Err(SpanielError::Bus(format!(
                    "{} on {} reported failure",
                    self.name, target
                ))),
                Err(e) => {
                    error!(error = %e, "action failed");
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }
}

impl Node {
    /// Actions advertised by this node, in index order. Empty when the node
    /// has no action interface.
    pub async fn actions(&self) -> Result<Vec<Action>> {
        let count = match self.accessible().n_actions().await {
            Err(BusError::NotSupported(_)) => return Ok(Vec::new()),
            result => self.check(result)?,
        };
        let acc = self.accessible();
        let mut actions = Vec::with_capacity(count);
        for index in 0..count {
            let name = self.check(acc.action_name(index).await)?;
            let description = acc.action_description(index).await.unwrap_or_default();
            let key_binding = acc.action_key_binding(index).await.unwrap_or_default();
            actions.push(Action::new(
                self.clone(),
                index,
                name,
                description,
                key_binding,
            ));
        }
        Ok(actions)
    }

    /// Looks up an action by name.
    pub async fn action(&self, name: &str) -> Result<Action> {
        let found = self.actions().await?.into_iter().find(|a| a.name == name);
        match found {
            Some(action) => Ok(action),
            None => Err(SpanielError::ActionNotSupported {
                action: name.to_string(),
                node: self.log_string().await,
            }),
        }
    }

    /// Performs the named action, see [`Action::invoke`].
    pub async fn do_action(&self, name: &str) -> Result<()> {
        self.action(name).await?.invoke().await
    }

    pub async fn click(&self) -> Result<()> {
        self.do_action("click").await
    }

    pub async fn press(&self) -> Result<()> {
        self.do_action("press").await
    }

    pub async fn release(&self) -> Result<()> {
        self.do_action("release").await
    }

    pub async fn activate(&self) -> Result<()> {
        self.do_action("activate").await
    }

    pub async fn open(&self) -> Result<()> {
        self.do_action("open").await
    }

    /// Follows a hyperlink.
    pub async fn jump(&self) -> Result<()> {
        self.do_action("jump").await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::fixtures::{self, Gedit};

    #[tokio::test]
    async fn click_invokes_the_action() {
        let gedit = Gedit::new();
        let (engine, _) = fixtures::engine(&gedit.desktop);
        gedit.node(&engine, gedit.ok).click().await.unwrap();
        assert_eq!(gedit.desktop.invocations(), vec![(gedit.ok, "click".to_string())]);
    }

    #[tokio::test]
    async fn unknown_action_is_not_supported() {
        let gedit = Gedit::new();
        let (engine, _) = fixtures::engine(&gedit.desktop);
        let err = gedit.node(&engine, gedit.ok).do_action("explode").await.unwrap_err();
        assert!(matches!(err, SpanielError::ActionNotSupported { .. }));
        let err = gedit.node(&engine, gedit.frame).click().await.unwrap_err();
        assert!(matches!(err, SpanielError::ActionNotSupported { .. }));
        assert!(gedit.desktop.invocations().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn insensitive_node_is_refused_without_delay() {
        let gedit = Gedit::new();
        let (engine, _) = fixtures::engine(&gedit.desktop);
        engine.update_config(|c| c.action_delay = 1.0);
        let start = tokio::time::Instant::now();
        let err = gedit.node(&engine, gedit.cancel).click().await.unwrap_err();
        assert!(matches!(err, SpanielError::NotSensitive { .. }));
        assert!(gedit.desktop.invocations().is_empty());
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn insensitive_node_is_acted_on_when_not_enforced() {
        let gedit = Gedit::new();
        let (engine, _) = fixtures::engine(&gedit.desktop);
        engine.update_config(|c| c.ensure_sensitivity = false);
        gedit.node(&engine, gedit.cancel).click().await.unwrap();
        assert_eq!(gedit.desktop.invocations(), vec![(gedit.cancel, "click".to_string())]);
    }

    #[tokio::test(start_paused = true)]
    async fn action_delay_follows_each_action() {
        let gedit = Gedit::new();
        let (engine, _) = fixtures::engine(&gedit.desktop);
        engine.update_config(|c| c.action_delay = 1.0);
        let start = tokio::time::Instant::now();
        gedit.node(&engine, gedit.ok).click().await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test]
    async fn action_on_dead_node_is_dead_reference() {
        let gedit = Gedit::new();
        let (engine, _) = fixtures::engine(&gedit.desktop);
        let ok = gedit.node(&engine, gedit.ok);
        let action = ok.action("click").await.unwrap();
        gedit.desktop.remove(gedit.ok);
        assert!(action.invoke().await.unwrap_err().is_dead());
        assert!(ok.is_dead());
    }

    #[tokio::test]
    async fn actions_list_metadata() {
        let gedit = Gedit::new();
        let (engine, _) = fixtures::engine(&gedit.desktop);
        let actions = gedit.node(&engine, gedit.wrap).actions().await.unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].name(), "toggle");
        assert_eq!(actions[0].index(), 0);
    }
}
