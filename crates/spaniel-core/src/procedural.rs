//! Single-focus procedural facade.
//!
//! [`Focus`] keeps a current application, dialog and widget. Setters narrow
//! the context by searching for a node and storing it; actions then apply to
//! the current widget:
//!
//! ```no_run
//! # async fn example(root: spaniel_core::root::Root) -> spaniel_core::error::Result<()> {
//! use spaniel_core::procedural::Focus;
//!
//! let mut focus = Focus::new(root);
//! focus.application("gedit").await?;
//! focus.dialog("Find").await?;
//! focus.text("").await?;
//! focus.type_text("needle").await?;
//! focus.click("Find").await?;
//! # Ok(())
//! # }
//! ```
//!
//! A setter that cannot find its target returns the search error when
//! `fatal_errors` is set. Otherwise it logs, leaves the slot unchanged and
//! returns `Ok(false)`.

use tracing::{info, warn};

use crate::accessible::Role;
use crate::error::{Result, SpanielError};
use crate::node::Node;
use crate::predicate::{GenericPredicate, Predicate};
use crate::root::{Application, Root};
use crate::search::FindOptions;

/// What to look for when focusing a widget. Empty fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WidgetQuery {
    pub name: String,
    pub role_name: String,
    pub description: String,
}

impl WidgetQuery {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn role_name(mut self, role_name: impl Into<String>) -> Self {
        self.role_name = role_name.into();
        self
    }

    pub fn role(self, role: Role) -> Self {
        self.role_name(role.name())
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_empty() && self.role_name.is_empty() && self.description.is_empty()
    }

    fn predicate(&self) -> GenericPredicate {
        let mut predicate = GenericPredicate::new();
        if !self.name.is_empty() {
            predicate = predicate.name(self.name.as_str());
        }
        if !self.role_name.is_empty() {
            predicate = predicate.role_name(self.role_name.as_str());
        }
        if !self.description.is_empty() {
            predicate = predicate.description(self.description.as_str());
        }
        predicate
    }
}

impl From<&str> for WidgetQuery {
    fn from(name: &str) -> Self {
        Self::named(name)
    }
}

impl From<String> for WidgetQuery {
    fn from(name: String) -> Self {
        Self::named(name)
    }
}

/// The current application, dialog and widget.
#[derive(Debug, Clone)]
pub struct Focus {
    root: Root,
    app: Option<Application>,
    dialog: Option<Node>,
    widget: Option<Node>,
}

impl Focus {
    pub fn new(root: Root) -> Self {
        Self {
            root,
            app: None,
            dialog: None,
            widget: None,
        }
    }

    pub fn root(&self) -> &Root {
        &self.root
    }

    pub fn current_application(&self) -> Option<&Application> {
        self.app.as_ref()
    }

    pub fn current_dialog(&self) -> Option<&Node> {
        self.dialog.as_ref()
    }

    pub fn current_widget(&self) -> Option<&Node> {
        self.widget.as_ref()
    }

    /// Clears every slot.
    pub fn reset(&mut self) {
        self.app = None;
        self.dialog = None;
        self.widget = None;
    }

    /// Applies the `fatal_errors` policy to a failed search.
    fn focus_failed(&self, what: &str, err: SpanielError) -> Result<bool> {
        if !err.is_search() || self.root.engine().config().fatal_errors {
            return Err(err);
        }
        warn!(query = what, error = %err, "focus failed");
        Ok(false)
    }

    /// Focuses the application named `name`. Clears the dialog and widget.
    pub async fn application(&mut self, name: &str) -> Result<bool> {
        match self.root.application(name).await {
            Ok(app) => {
                info!(application = name, "focused application");
                self.app = Some(app);
                self.dialog = None;
                self.widget = None;
                Ok(true)
            }
            Err(e) => self.focus_failed(name, e),
        }
    }

    /// The node dialogs and windows are searched under.
    fn top(&self) -> &Node {
        match &self.app {
            Some(app) => app.node(),
            None => self.root.node(),
        }
    }

    async fn focus_top_level(&mut self, predicate: Predicate) -> Result<bool> {
        let predicate = self.root.engine().translate_predicate(&predicate);
        let options = FindOptions::default().recursive(false);
        match self.top().find_child_with(&predicate, options).await {
            Ok(Some(node)) => {
                info!(node = %predicate, "focused");
                self.dialog = Some(node);
                self.widget = None;
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(e) => {
                let what = predicate.describe_search_result();
                self.focus_failed(&what, e)
            }
        }
    }

    /// Focuses the top-level dialog named `name`. Clears the widget.
    pub async fn dialog(&mut self, name: &str) -> Result<bool> {
        self.focus_top_level(Predicate::DialogNamed(name.into())).await
    }

    /// Focuses the top-level frame named `name`, in the dialog slot.
    pub async fn window(&mut self, name: &str) -> Result<bool> {
        self.focus_top_level(Predicate::WindowNamed(name.into())).await
    }

    /// Focuses a widget, searching the current widget's subtree, then the
    /// dialog's, then the application's, then the whole desktop. Only the
    /// last candidate is retried.
    pub async fn widget(&mut self, query: impl Into<WidgetQuery>) -> Result<bool> {
        let query = query.into();
        let predicate = Predicate::Generic(query.predicate());
        predicate.validate()?;
        let predicate = self.root.engine().translate_predicate(&predicate);

        let mut scopes: Vec<Node> = Vec::new();
        if let Some(widget) = &self.widget {
            scopes.push(widget.clone());
        }
        if let Some(dialog) = &self.dialog {
            scopes.push(dialog.clone());
        }
        if let Some(app) = &self.app {
            scopes.push(app.node().clone());
        }
        if scopes.is_empty() {
            scopes.push(self.root.node().clone());
        }

        let last = scopes.len() - 1;
        for (i, scope) in scopes.iter().enumerate() {
            let options = if i == last {
                FindOptions::default()
            } else {
                FindOptions::single_pass()
            };
            match scope.find_child_with(&predicate, options).await {
                Ok(Some(node)) => {
                    info!(widget = %predicate, "focused widget");
                    self.widget = Some(node);
                    return Ok(true);
                }
                Ok(None) => continue,
                Err(e) => {
                    let what = predicate.describe_search_result();
                    return self.focus_failed(&what, e);
                }
            }
        }
        Ok(false)
    }

    pub async fn button(&mut self, name: &str) -> Result<bool> {
        self.widget(WidgetQuery::named(name).role(Role::PushButton)).await
    }

    pub async fn menu(&mut self, name: &str) -> Result<bool> {
        self.widget(WidgetQuery::named(name).role(Role::Menu)).await
    }

    pub async fn menu_item(&mut self, name: &str) -> Result<bool> {
        self.widget(WidgetQuery::named(name).role(Role::MenuItem)).await
    }

    /// Focuses a text widget. An empty name matches any.
    pub async fn text(&mut self, name: &str) -> Result<bool> {
        self.widget(WidgetQuery::named(name).role(Role::Text)).await
    }

    pub async fn tab(&mut self, name: &str) -> Result<bool> {
        self.widget(WidgetQuery::named(name).role(Role::PageTab)).await
    }

    pub async fn table(&mut self, name: &str) -> Result<bool> {
        self.widget(WidgetQuery::named(name).role(Role::Table)).await
    }

    pub async fn icon(&mut self, name: &str) -> Result<bool> {
        self.widget(WidgetQuery::named(name).role(Role::Icon)).await
    }

    /// Refocuses when `query` is non-empty, then returns the widget to act
    /// on. `None` means the refocus failed and was tolerated.
    async fn target(&mut self, query: WidgetQuery, action: &str) -> Result<Option<Node>> {
        if !query.is_empty() && !self.widget(query).await? {
            warn!(action, "skipping action, widget not focused");
            return Ok(None);
        }
        match &self.widget {
            Some(widget) => Ok(Some(widget.clone())),
            None => Err(SpanielError::InvalidArgument(format!(
                "cannot {}: no widget is focused",
                action
            ))),
        }
    }

    async fn act(&mut self, query: impl Into<WidgetQuery>, action: &str) -> Result<()> {
        if let Some(widget) = self.target(query.into(), action).await? {
            widget.do_action(action).await?;
        }
        Ok(())
    }

    /// Performs `click` on the (re)focused widget.
    pub async fn click(&mut self, query: impl Into<WidgetQuery>) -> Result<()> {
        self.act(query, "click").await
    }

    pub async fn activate(&mut self, query: impl Into<WidgetQuery>) -> Result<()> {
        self.act(query, "activate").await
    }

    /// Opens an icon or list item.
    pub async fn open_item(&mut self, query: impl Into<WidgetQuery>) -> Result<()> {
        self.act(query, "open").await
    }

    /// Selects the (re)focused widget within its parent.
    pub async fn select(&mut self, query: impl Into<WidgetQuery>) -> Result<()> {
        if let Some(widget) = self.target(query.into(), "select").await? {
            widget.select().await?;
        }
        Ok(())
    }

    pub async fn deselect(&mut self, query: impl Into<WidgetQuery>) -> Result<()> {
        if let Some(widget) = self.target(query.into(), "deselect").await? {
            widget.deselect().await?;
        }
        Ok(())
    }

    /// Types into the current widget, or as raw keystrokes when no widget is
    /// focused.
    pub async fn type_text(&mut self, text: &str) -> Result<()> {
        match &self.widget {
            Some(widget) => widget.type_text(text).await,
            None => self.root.engine().type_text(text).await,
        }
    }

    /// Sends a key combination such as `<Control>s` to the current widget,
    /// or to whatever has keyboard focus.
    pub async fn key_combo(&mut self, combo: &str) -> Result<()> {
        match &self.widget {
            Some(widget) => widget.key_combo(combo).await,
            None => self.root.engine().input().key_combo(combo).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{self, Gedit};

    async fn focus(gedit: &Gedit) -> Focus {
        let (engine, _) = fixtures::engine(&gedit.desktop);
        Focus::new(engine.root().await.unwrap())
    }

    #[tokio::test]
    async fn application_then_widget_then_click() {
        let gedit = Gedit::new();
        let mut focus = focus(&gedit).await;
        assert!(focus.application("gedit").await.unwrap());
        assert!(focus.button("OK").await.unwrap());
        focus.click("").await.unwrap();
        assert_eq!(gedit.desktop.invocations(), vec![(gedit.ok, "click".to_string())]);
    }

    #[tokio::test]
    async fn refocus_then_dispatch_by_action_name() {
        let gedit = Gedit::new();
        let mut focus = focus(&gedit).await;
        focus.application("gedit").await.unwrap();
        focus.click(WidgetQuery::named("Wrap").role_name("check box")).await.unwrap_err();
        focus.act("Wrap", "toggle").await.unwrap();
        assert_eq!(gedit.desktop.invocations(), vec![(gedit.wrap, "toggle".to_string())]);
    }

    #[tokio::test]
    async fn failed_focus_is_tolerated_without_fatal_errors() {
        let gedit = Gedit::new();
        let mut focus = focus(&gedit).await;
        focus.application("gedit").await.unwrap();
        focus.button("OK").await.unwrap();
        assert!(!focus.button("Missing").await.unwrap());
        assert_eq!(focus.current_widget().unwrap().name().await.unwrap(), "OK");
        // The refocus fails, so the click is skipped.
        focus.click("Missing").await.unwrap();
        assert!(gedit.desktop.invocations().is_empty());
    }

    #[tokio::test]
    async fn failed_focus_is_an_error_with_fatal_errors() {
        let gedit = Gedit::new();
        let mut focus = focus(&gedit).await;
        focus.root().engine().update_config(|c| c.fatal_errors = true);
        assert!(focus.application("gcalctool").await.unwrap_err().is_search());
        assert!(focus.current_application().is_none());
    }

    #[tokio::test]
    async fn acting_without_a_widget_is_invalid() {
        let gedit = Gedit::new();
        let mut focus = focus(&gedit).await;
        let err = focus.click("").await.unwrap_err();
        assert!(matches!(err, SpanielError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn window_fills_the_dialog_slot() {
        let gedit = Gedit::new();
        let mut focus = focus(&gedit).await;
        focus.application("gedit").await.unwrap();
        assert!(focus.window("Untitled - gedit").await.unwrap());
        let dialog = focus.current_dialog().unwrap();
        assert_eq!(dialog, &gedit.node(focus.root().engine(), gedit.frame));
        assert!(focus.current_widget().is_none());
    }

    #[tokio::test]
    async fn type_text_goes_to_the_focused_widget() {
        let gedit = Gedit::new();
        let mut focus = focus(&gedit).await;
        focus.application("gedit").await.unwrap();
        focus.text("").await.unwrap();
        focus.type_text("!").await.unwrap();
        assert_eq!(gedit.desktop.text(gedit.entry).as_deref(), Some("!hello"));
    }

    #[tokio::test]
    async fn select_and_deselect_list_rows() {
        let gedit = Gedit::new();
        let mut focus = focus(&gedit).await;
        focus.application("gedit").await.unwrap();
        focus.select("Result 2").await.unwrap();
        let row = focus.current_widget().unwrap().clone();
        assert!(row.is_selected().await.unwrap());
        focus.deselect("").await.unwrap();
        assert!(!row.is_selected().await.unwrap());
    }

    #[tokio::test]
    async fn raw_typing_without_a_widget() {
        let gedit = Gedit::new();
        let (engine, input) = fixtures::engine(&gedit.desktop);
        let mut focus = Focus::new(engine.root().await.unwrap());
        focus.type_text("ab").await.unwrap();
        focus.key_combo("<Control>q").await.unwrap();
        assert_eq!(input.typed(), "ab");
        assert_eq!(input.events().len(), 3);
    }
}
