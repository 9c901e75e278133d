//! Search predicates.
//!
//! A [`Predicate`] decides whether a node matches, describes itself for log
//! messages, and renders itself as a method call in the recorded-script
//! language (see [`crate::script`]). Name-bearing predicates carry a
//! [`TranslatableString`] so they also match localized names.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::accessible::Role;
use crate::error::{Result, SpanielError};
use crate::i18n::{TranslatableString, TranslationRegistry};
use crate::node::Node;

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

type MatchFn = dyn for<'a> Fn(&'a Node) -> BoxFuture<'a, bool> + Send + Sync;

/// A predicate built from an arbitrary async closure.
///
/// Two `FnPredicate`s are equal only if they share the same closure.
#[derive(Clone)]
pub struct FnPredicate {
    f: Arc<MatchFn>,
}

impl FnPredicate {
    pub fn new<F>(f: F) -> Self
    where
        F: for<'a> Fn(&'a Node) -> BoxFuture<'a, bool> + Send + Sync + 'static,
    {
        Self { f: Arc::new(f) }
    }

    pub async fn call(&self, node: &Node) -> bool {
        (self.f)(node).await
    }
}

impl PartialEq for FnPredicate {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.f), Arc::as_ptr(&other.f))
    }
}

impl Eq for FnPredicate {}

impl fmt::Debug for FnPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnPredicate")
    }
}

/// Matches on any combination of name, role name, description and label.
///
/// All given fields must match. At least one field is required.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct GenericPredicate {
    pub name: Option<TranslatableString>,
    pub role_name: Option<String>,
    pub description: Option<String>,
    pub label: Option<TranslatableString>,
}

impl GenericPredicate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<TranslatableString>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn role_name(mut self, role_name: impl Into<String>) -> Self {
        self.role_name = Some(role_name.into());
        self
    }

    pub fn role(self, role: Role) -> Self {
        self.role_name(role.name())
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn label(mut self, label: impl Into<TranslatableString>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.role_name.is_none()
            && self.description.is_none()
            && self.label.is_none()
    }

    pub fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(SpanielError::InvalidArgument(
                "a generic predicate needs at least one of name, roleName, description or label"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Replaces the name and label with versions carrying their translations.
    pub fn translated(mut self, registry: &TranslationRegistry) -> Self {
        if let Some(name) = self.name.take() {
            self.name = Some(registry.translatable(name.source()));
        }
        if let Some(label) = self.label.take() {
            self.label = Some(registry.translatable(label.source()));
        }
        self
    }

    async fn satisfied_by(&self, node: &Node) -> Result<bool> {
        if let Some(name) = &self.name {
            if !name.matched_by(&node.name().await?) {
                return Ok(false);
            }
        }
        if let Some(role_name) = &self.role_name {
            if *role_name != node.role_name().await? {
                return Ok(false);
            }
        }
        if let Some(description) = &self.description {
            if *description != node.description().await? {
                return Ok(false);
            }
        }
        if let Some(label) = &self.label {
            let Some(labeller) = node.labeller().await? else {
                return Ok(false);
            };
            if !label.matched_by(&labeller.name().await?) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn fields(&self) -> Vec<(&'static str, &str)> {
        let mut fields = Vec::new();
        if let Some(name) = &self.name {
            fields.push(("name", name.source()));
        }
        if let Some(role_name) = &self.role_name {
            fields.push(("roleName", role_name.as_str()));
        }
        if let Some(description) = &self.description {
            fields.push(("description", description.as_str()));
        }
        if let Some(label) = &self.label {
            fields.push(("label", label.source()));
        }
        fields
    }
}

/// A search predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// An application with the given name.
    ApplicationNamed(TranslatableString),
    /// Any top-level frame.
    Window,
    WindowNamed(TranslatableString),
    DialogNamed(TranslatableString),
    MenuNamed(TranslatableString),
    MenuItemNamed(TranslatableString),
    ButtonNamed(TranslatableString),
    TextEntryNamed(TranslatableString),
    TabNamed(TranslatableString),
    /// Any node with the given name.
    Named(TranslatableString),
    /// A node whose labeller has the given name.
    LabelledAs(TranslatableString),
    Generic(GenericPredicate),
    Fn(FnPredicate),
}

impl Predicate {
    /// Builds a predicate from an async closure.
    ///
    /// ```
    /// use spaniel_core::predicate::Predicate;
    ///
    /// let showing = Predicate::from_fn(|node| Box::pin(async move { node.showing().await.unwrap_or(false) }));
    /// assert_eq!(showing.describe_search_result(), "lambda");
    /// ```
    pub fn from_fn<F>(f: F) -> Self
    where
        F: for<'a> Fn(&'a Node) -> BoxFuture<'a, bool> + Send + Sync + 'static,
    {
        Predicate::Fn(FnPredicate::new(f))
    }

    /// The role this predicate requires, if it is one of the role-bound kinds.
    pub fn required_role(&self) -> Option<Role> {
        match self {
            Predicate::ApplicationNamed(_) => Some(Role::Application),
            Predicate::Window | Predicate::WindowNamed(_) => Some(Role::Frame),
            Predicate::DialogNamed(_) => Some(Role::Dialog),
            Predicate::MenuNamed(_) => Some(Role::Menu),
            Predicate::MenuItemNamed(_) => Some(Role::MenuItem),
            Predicate::ButtonNamed(_) => Some(Role::PushButton),
            Predicate::TextEntryNamed(_) => Some(Role::Text),
            Predicate::TabNamed(_) => Some(Role::PageTab),
            _ => None,
        }
    }

    fn name(&self) -> Option<&TranslatableString> {
        match self {
            Predicate::ApplicationNamed(n)
            | Predicate::WindowNamed(n)
            | Predicate::DialogNamed(n)
            | Predicate::MenuNamed(n)
            | Predicate::MenuItemNamed(n)
            | Predicate::ButtonNamed(n)
            | Predicate::TextEntryNamed(n)
            | Predicate::TabNamed(n)
            | Predicate::Named(n)
            | Predicate::LabelledAs(n) => Some(n),
            _ => None,
        }
    }

    /// Returns a copy whose names carry translations from `registry`.
    pub fn translated(&self, registry: &TranslationRegistry) -> Predicate {
        let tr = |n: &TranslatableString| registry.translatable(n.source());
        match self {
            Predicate::ApplicationNamed(n) => Predicate::ApplicationNamed(tr(n)),
            Predicate::WindowNamed(n) => Predicate::WindowNamed(tr(n)),
            Predicate::DialogNamed(n) => Predicate::DialogNamed(tr(n)),
            Predicate::MenuNamed(n) => Predicate::MenuNamed(tr(n)),
            Predicate::MenuItemNamed(n) => Predicate::MenuItemNamed(tr(n)),
            Predicate::ButtonNamed(n) => Predicate::ButtonNamed(tr(n)),
            Predicate::TextEntryNamed(n) => Predicate::TextEntryNamed(tr(n)),
            Predicate::TabNamed(n) => Predicate::TabNamed(tr(n)),
            Predicate::Named(n) => Predicate::Named(tr(n)),
            Predicate::LabelledAs(n) => Predicate::LabelledAs(tr(n)),
            Predicate::Generic(g) => Predicate::Generic(g.clone().translated(registry)),
            Predicate::Window | Predicate::Fn(_) => self.clone(),
        }
    }

    /// Rejects predicates that cannot match anything meaningful.
    pub fn validate(&self) -> Result<()> {
        match self {
            Predicate::Generic(g) => g.validate(),
            _ => Ok(()),
        }
    }

    /// Tests `node`. A bus failure while reading attributes counts as a miss.
    pub async fn satisfied_by_node(&self, node: &Node) -> bool {
        self.try_satisfied_by(node).await.unwrap_or(false)
    }

    async fn try_satisfied_by(&self, node: &Node) -> Result<bool> {
        match self {
            Predicate::Generic(g) => g.satisfied_by(node).await,
            Predicate::Fn(f) => Ok(f.call(node).await),
            Predicate::Named(name) => Ok(name.matched_by(&node.name().await?)),
            Predicate::LabelledAs(label) => match node.labeller().await? {
                Some(labeller) => Ok(label.matched_by(&labeller.name().await?)),
                None => Ok(false),
            },
            Predicate::Window => Ok(node.role().await? == Role::Frame),
            _ => {
                let (Some(role), Some(name)) = (self.required_role(), self.name()) else {
                    return Ok(false);
                };
                if node.role().await? != role {
                    return Ok(false);
                }
                Ok(name.matched_by(&node.name().await?))
            }
        }
    }

    /// Human-readable description used in logs and search errors.
    pub fn describe_search_result(&self) -> String {
        match self {
            Predicate::ApplicationNamed(n) => format!("{} application", quote(n.source())),
            Predicate::Window => "window".to_string(),
            Predicate::WindowNamed(n) => format!("{} window", quote(n.source())),
            Predicate::DialogNamed(n) => format!("{} dialog", quote(n.source())),
            Predicate::MenuNamed(n) => format!("{} menu", quote(n.source())),
            Predicate::MenuItemNamed(n) => format!("{} menu item", quote(n.source())),
            Predicate::ButtonNamed(n) => format!("{} button", quote(n.source())),
            Predicate::TextEntryNamed(n) => format!("{} text entry", quote(n.source())),
            Predicate::TabNamed(n) => format!("{} tab", quote(n.source())),
            Predicate::Named(n) => format!("child named {}", quote(n.source())),
            Predicate::LabelledAs(n) => format!("child labelled {}", quote(n.source())),
            Predicate::Generic(g) => {
                let parts: Vec<String> = g
                    .fields()
                    .into_iter()
                    .map(|(k, v)| format!("{}={}", k, quote(v)))
                    .collect();
                format!("child with {}", parts.join(" "))
            }
            Predicate::Fn(_) => "lambda".to_string(),
        }
    }

    /// Renders the predicate as a script method call, e.g. `.button("OK")`.
    ///
    /// Closure predicates have no script form and render as `.lambda()`,
    /// which the script parser rejects.
    pub fn make_script_method_call(&self, recursive: bool) -> String {
        let (method, mut args) = match self {
            Predicate::ApplicationNamed(n) => ("application", vec![quote(n.source())]),
            Predicate::Window => ("window", Vec::new()),
            Predicate::WindowNamed(n) => ("window", vec![quote(n.source())]),
            Predicate::DialogNamed(n) => ("dialog", vec![quote(n.source())]),
            Predicate::MenuNamed(n) => ("menu", vec![quote(n.source())]),
            Predicate::MenuItemNamed(n) => ("menuItem", vec![quote(n.source())]),
            Predicate::ButtonNamed(n) => ("button", vec![quote(n.source())]),
            Predicate::TextEntryNamed(n) => ("textentry", vec![quote(n.source())]),
            Predicate::TabNamed(n) => ("tab", vec![quote(n.source())]),
            Predicate::Named(n) => ("childNamed", vec![quote(n.source())]),
            Predicate::LabelledAs(n) => ("childLabelled", vec![quote(n.source())]),
            Predicate::Generic(g) => (
                "child",
                g.fields()
                    .into_iter()
                    .map(|(k, v)| format!("{}={}", k, quote(v)))
                    .collect(),
            ),
            Predicate::Fn(_) => ("lambda", Vec::new()),
        };
        if !recursive {
            args.push("recursive=false".to_string());
        }
        format!(".{}({})", method, args.join(", "))
    }

    /// A variable name for the node this predicate finds, e.g. `okButton`.
    pub fn make_script_variable_name(&self) -> String {
        let (base, suffix) = match self {
            Predicate::ApplicationNamed(n) => (n.source(), "App"),
            Predicate::Window => ("", "Window"),
            Predicate::WindowNamed(n) => (n.source(), "Win"),
            Predicate::DialogNamed(n) => (n.source(), "Dlg"),
            Predicate::MenuNamed(n) => (n.source(), "Menu"),
            Predicate::MenuItemNamed(n) => (n.source(), "MenuItem"),
            Predicate::ButtonNamed(n) => (n.source(), "Button"),
            Predicate::TextEntryNamed(n) => (n.source(), "Entry"),
            Predicate::TabNamed(n) => (n.source(), "Tab"),
            Predicate::Named(n) | Predicate::LabelledAs(n) => (n.source(), "Node"),
            Predicate::Generic(g) => (
                g.name
                    .as_ref()
                    .or(g.label.as_ref())
                    .map(|n| n.source())
                    .unwrap_or(""),
                "Node",
            ),
            Predicate::Fn(_) => ("", "Node"),
        };
        variable_name(base, suffix)
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe_search_result())
    }
}

impl From<GenericPredicate> for Predicate {
    fn from(g: GenericPredicate) -> Self {
        Predicate::Generic(g)
    }
}

fn variable_name(base: &str, suffix: &str) -> String {
    let stem = camel_case(base);
    if stem.is_empty() {
        let mut chars = suffix.chars();
        return match chars.next() {
            Some(c) => c.to_lowercase().chain(chars).collect(),
            None => "node".to_string(),
        };
    }
    let name = format!("{}{}", stem, suffix);
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        format!("n{}", name)
    } else {
        name
    }
}

/// Joins the alphanumeric words of `text` in lower camel case.
///
/// The first character of the first word is lowercased and the first
/// character of every later word uppercased; the rest is kept, so applying
/// it twice gives the same result.
pub fn camel_case(text: &str) -> String {
    let mut out = String::new();
    for (i, word) in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .enumerate()
    {
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            if i == 0 {
                out.extend(first.to_lowercase());
            } else {
                out.extend(first.to_uppercase());
            }
            out.extend(chars);
        }
    }
    out
}

/// Double-quotes `text` with backslash escapes.
pub fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camel_case_is_idempotent() {
        for text in ["Save As…", "open file", "OK", "ReplaceAll", "zoom 100%", ""] {
            let once = camel_case(text);
            assert_eq!(camel_case(&once), once, "{text:?}");
        }
        assert_eq!(camel_case("Save As"), "saveAs");
        assert_eq!(camel_case("open  recent-file"), "openRecentFile");
    }

    #[test]
    fn variable_names() {
        assert_eq!(Predicate::ButtonNamed("OK".into()).make_script_variable_name(), "oKButton");
        assert_eq!(
            Predicate::ApplicationNamed("gedit".into()).make_script_variable_name(),
            "geditApp"
        );
        assert_eq!(Predicate::Window.make_script_variable_name(), "window");
        assert_eq!(Predicate::TabNamed("".into()).make_script_variable_name(), "tab");
        assert_eq!(
            Predicate::MenuItemNamed("3D view".into()).make_script_variable_name(),
            "n3DViewMenuItem"
        );
        assert_eq!(
            Predicate::Generic(GenericPredicate::new().role_name("icon")).make_script_variable_name(),
            "node"
        );
    }

    #[test]
    fn script_method_calls() {
        assert_eq!(
            Predicate::ApplicationNamed("gedit".into()).make_script_method_call(true),
            r#".application("gedit")"#
        );
        assert_eq!(Predicate::Window.make_script_method_call(true), ".window()");
        assert_eq!(
            Predicate::ButtonNamed("Say \"hi\"".into()).make_script_method_call(false),
            r#".button("Say \"hi\"", recursive=false)"#
        );
        let generic = GenericPredicate::new().name("Clear").role_name("menu item");
        assert_eq!(
            Predicate::Generic(generic).make_script_method_call(true),
            r#".child(name="Clear", roleName="menu item")"#
        );
    }

    #[test]
    fn descriptions() {
        assert_eq!(Predicate::DialogNamed("Open".into()).describe_search_result(), "\"Open\" dialog");
        assert_eq!(
            Predicate::LabelledAs("Find:".into()).describe_search_result(),
            "child labelled \"Find:\""
        );
        let generic = GenericPredicate::new().role_name("table cell");
        assert_eq!(
            Predicate::Generic(generic).describe_search_result(),
            "child with roleName=\"table cell\""
        );
    }

    #[test]
    fn empty_generic_is_rejected() {
        let err = Predicate::Generic(GenericPredicate::new()).validate().unwrap_err();
        assert!(matches!(err, SpanielError::InvalidArgument(_)));
        assert!(Predicate::Generic(GenericPredicate::new().description("x")).validate().is_ok());
    }

    #[test]
    fn fn_predicates_compare_by_identity() {
        let a = Predicate::from_fn(|_| Box::pin(async { true }));
        let b = Predicate::from_fn(|_| Box::pin(async { true }));
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn quote_escapes() {
        assert_eq!(quote("a\"b\\c\nd"), r#""a\"b\\c\nd""#);
    }
}
