//! Absolute, slash-separated paths into a store.

use std::fmt;

/// An absolute path to a group, dataset or attribute owner in a store.
///
/// The root is `/`; every other path is `/a/b/c` with non-empty components
/// that never contain `/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorePath {
    components: Vec<String>,
}

impl StorePath {
    pub fn root() -> Self {
        Self { components: Vec::new() }
    }

    /// Parse a path; leading, trailing and repeated slashes are ignored.
    pub fn parse(path: &str) -> Self {
        Self {
            components: path
                .split('/')
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    /// Append one component.
    pub fn join(&self, name: &str) -> Self {
        let mut components = self.components.clone();
        components.push(name.to_string());
        Self { components }
    }

    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    pub fn components(&self) -> &[String] {
        &self.components
    }

    /// Last component, `None` for the root.
    pub fn name(&self) -> Option<&str> {
        self.components.last().map(String::as_str)
    }

    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        let mut components = self.components.clone();
        components.pop();
        Some(Self { components })
    }

    /// Components of `self` below `base`, or `None` if `self` is not under it.
    pub fn strip_prefix(&self, base: &StorePath) -> Option<&[String]> {
        self.components.strip_prefix(base.components.as_slice())
    }

    /// Render as `Type.a.b`, relative to `base`.
    ///
    /// Used to name datasets in partial-dump reports, e.g.
    /// `Experiment.manData`.
    pub fn qualified(&self, type_name: &str, base: &StorePath) -> String {
        let rel = self.strip_prefix(base).unwrap_or(&self.components);
        let mut out = type_name.to_string();
        for c in rel {
            out.push('.');
            out.push_str(c);
        }
        out
    }
}

impl Default for StorePath {
    fn default() -> Self {
        Self::root()
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.components.is_empty() {
            return f.write_str("/");
        }
        for c in &self.components {
            write!(f, "/{c}")?;
        }
        Ok(())
    }
}

impl From<&str> for StorePath {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}
