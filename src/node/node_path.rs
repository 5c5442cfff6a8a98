use derive_more::Display;
use thiserror::Error;

/// An absolute path to a node in an HDF5 hierarchy.
///
/// Paths are normalised on creation: a leading `/` is added if missing and a trailing `/` is removed.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display)]
#[display("{_0}")]
pub struct NodePath(String);

/// An invalid node path.
#[derive(Debug, Error)]
#[error("invalid node path {0}")]
pub struct NodePathError(String);

impl NodePath {
    /// Create a new node path from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`NodePathError`] if `path` is not valid according to [`NodePath::validate`()].
    pub fn new(path: &str) -> Result<Self, NodePathError> {
        let mut normalised = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };
        if normalised.len() > 1 && normalised.ends_with('/') {
            normalised.pop();
        }
        if Self::validate(&normalised) {
            Ok(Self(normalised))
        } else {
            Err(NodePathError(path.to_string()))
        }
    }

    /// The root node.
    #[must_use]
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// Returns true if this is the root path.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Extracts a string slice containing the node path `String`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Return the names of the path components from the root.
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|name| !name.is_empty())
    }

    /// Return the path of the child `name` of this node.
    ///
    /// # Errors
    /// Returns [`NodePathError`] if `name` is not a valid node name.
    pub fn child(&self, name: &str) -> Result<Self, NodePathError> {
        if name.is_empty() || name.contains('/') {
            return Err(NodePathError(format!("{}/{name}", self.0)));
        }
        if self.is_root() {
            Self::new(&format!("/{name}"))
        } else {
            Self::new(&format!("{}/{name}", self.0))
        }
    }

    /// Validates a path:
    /// - A path always starts with `/`, and
    /// - a non-root path cannot end with `/`, because node names must be non-empty and cannot contain `/`.
    ///
    /// Additionally, it checks that there are no empty nodes (i.e. a `//` substring) and no `.` or `..` nodes.
    #[must_use]
    pub fn validate(path: &str) -> bool {
        path.eq("/")
            || (path.starts_with('/')
                && !path.ends_with('/')
                && path[1..]
                    .split('/')
                    .all(|name| !name.is_empty() && name != "." && name != ".."))
    }
}

impl TryFrom<&str> for NodePath {
    type Error = NodePathError;

    fn try_from(path: &str) -> Result<Self, Self::Error> {
        Self::new(path)
    }
}
