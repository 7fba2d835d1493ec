//! Property lists for dump and load operations.
//!
//! As with the store's creation and access property lists, each bundle is a
//! plain struct with public fields, a `Default`, and chaining setters.

use crate::path::StorePath;

/// Dump properties.
#[derive(Debug, Clone, Default)]
pub struct DumpProps {
    /// Accept datasets left without data instead of failing with
    /// [`Error::PartialDump`](crate::Error::PartialDump).
    pub partial: bool,
    /// Group the root record is written to.
    pub root: StorePath,
}

impl DumpProps {
    /// Create default dump properties: strict, at `/`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow unwritten datasets.
    pub fn partial(mut self) -> Self {
        self.partial = true;
        self
    }

    /// Dump under `path` instead of the store root.
    pub fn root(mut self, path: impl Into<StorePath>) -> Self {
        self.root = path.into();
        self
    }
}

/// Load properties.
#[derive(Debug, Clone, Default)]
pub struct LoadProps {
    /// Fail with [`Error::UnmappedKeys`](crate::Error::UnmappedKeys) when the
    /// store holds keys the schema does not describe.
    pub deny_unmapped: bool,
    /// Group the root record is read from.
    pub root: StorePath,
}

impl LoadProps {
    /// Create default load properties: lenient, at `/`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject unmapped store keys.
    pub fn deny_unmapped(mut self) -> Self {
        self.deny_unmapped = true;
        self
    }

    /// Load from `path` instead of the store root.
    pub fn root(mut self, path: impl Into<StorePath>) -> Self {
        self.root = path.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dump_props_defaults() {
        let props = DumpProps::new();
        assert!(!props.partial);
        assert!(props.root.is_root());
    }

    #[test]
    fn dump_props_chaining() {
        let props = DumpProps::new().partial().root("/run1");
        assert!(props.partial);
        assert_eq!(props.root.to_string(), "/run1");
    }

    #[test]
    fn load_props_chaining() {
        let props = LoadProps::new().deny_unmapped().root(StorePath::parse("/a/b"));
        assert!(props.deny_unmapped);
        assert_eq!(props.root.to_string(), "/a/b");
    }
}
