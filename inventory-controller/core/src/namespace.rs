use std::fmt;

/// Selects the namespace(s) a list operation applies to.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum NamespaceFilter {
    All,
    Namespace(String),
}

/// Splits a URI path into its non-empty segments.
pub fn path_segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

// === impl NamespaceFilter ===

impl NamespaceFilter {
    /// Resolves the namespace addressed by a request path.
    ///
    /// A path with at most one segment (i.e. `/deployments`) addresses all
    /// namespaces. Otherwise the second segment names the namespace and any
    /// further segments are ignored. The namespace is not validated here; the
    /// control plane rejects (or returns nothing for) invalid names.
    pub fn from_path<S: AsRef<str>>(segments: &[S]) -> Self {
        match segments.get(1) {
            Some(ns) => Self::Namespace(ns.as_ref().to_string()),
            None => Self::All,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::All => None,
            Self::Namespace(ns) => Some(ns),
        }
    }
}

impl fmt::Display for NamespaceFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("*"),
            Self::Namespace(ns) => f.write_str(ns),
        }
    }
}
