//! Search paths: sequences of (predicate, recursive) steps from the root.

use std::fmt;

use crate::predicate::Predicate;

/// One step of a search path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchStep {
    pub predicate: Predicate,
    /// Whether the step searches the whole subtree or only direct children.
    pub recursive: bool,
}

/// An ordered list of search steps leading from the desktop root to a node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPath {
    steps: Vec<SearchStep>,
}

impl SearchPath {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, predicate: Predicate, recursive: bool) {
        self.steps.push(SearchStep { predicate, recursive });
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> &[SearchStep] {
        &self.steps
    }

    pub fn predicate_at(&self, index: usize) -> Option<&Predicate> {
        self.steps.get(index).map(|s| &s.predicate)
    }

    pub fn is_recursive(&self, index: usize) -> Option<bool> {
        self.steps.get(index).map(|s| s.recursive)
    }

    /// The first `len` steps (all of them if `len` exceeds the length).
    pub fn prefix(&self, len: usize) -> SearchPath {
        SearchPath {
            steps: self.steps.iter().take(len).cloned().collect(),
        }
    }

    pub fn starts_with(&self, prefix: &SearchPath) -> bool {
        self.steps.starts_with(&prefix.steps)
    }

    /// The steps of `other` after `self`, if `self` is a prefix of `other`.
    pub fn relative_to(&self, other: &SearchPath) -> Option<SearchPath> {
        if !other.starts_with(self) {
            return None;
        }
        Some(SearchPath {
            steps: other.steps[self.steps.len()..].to_vec(),
        })
    }

    /// The chained method calls that replay this path, e.g.
    /// `.application("gedit").button("OK")`.
    pub fn make_script_method_call(&self) -> String {
        self.steps
            .iter()
            .map(|s| s.predicate.make_script_method_call(s.recursive))
            .collect()
    }
}

impl FromIterator<SearchStep> for SearchPath {
    fn from_iter<I: IntoIterator<Item = SearchStep>>(iter: I) -> Self {
        SearchPath {
            steps: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for SearchPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, step) in self.steps.iter().enumerate() {
            if i > 0 {
                f.write_str(" -> ")?;
            }
            write!(f, "{}", step.predicate.describe_search_result())?;
            if step.recursive {
                f.write_str(" (recursive)")?;
            }
        }
        f.write_str("}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SearchPath {
        let mut path = SearchPath::new();
        path.append(Predicate::ApplicationNamed("gedit".into()), false);
        path.append(Predicate::WindowNamed("Untitled".into()), false);
        path.append(Predicate::ButtonNamed("OK".into()), true);
        path
    }

    #[test]
    fn prefix_and_relative() {
        let path = sample();
        let head = path.prefix(1);
        assert_eq!(head.len(), 1);
        let tail = head.relative_to(&path).unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail.predicate_at(0), Some(&Predicate::WindowNamed("Untitled".into())));
        assert_eq!(path.relative_to(&head), None);
        assert!(SearchPath::new().relative_to(&path).unwrap() == path);
        assert_eq!(path.prefix(10), path);
    }

    #[test]
    fn relative_to_rejects_divergent_paths() {
        let mut other = SearchPath::new();
        other.append(Predicate::ApplicationNamed("gcalctool".into()), false);
        assert_eq!(other.relative_to(&sample()), None);
    }

    #[test]
    fn renders_script_chain() {
        assert_eq!(
            sample().make_script_method_call(),
            r#".application("gedit", recursive=false).window("Untitled", recursive=false).button("OK")"#
        );
    }

    #[test]
    fn display_lists_steps() {
        let text = sample().to_string();
        assert!(text.starts_with("{\"gedit\" application -> "));
        assert!(text.ends_with("\"OK\" button (recursive)}"));
    }
}
