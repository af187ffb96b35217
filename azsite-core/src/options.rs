//! Resource options accepted at registration time

use crate::engine::Urn;

/// Engine-level options for one resource registration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceOptions {
    /// Component this resource is nested under
    pub parent: Option<Urn>,
    /// Resources that must converge before this one
    pub depends_on: Vec<Urn>,
    /// Refuse to delete the resource while set
    pub protect: bool,
    pub delete_before_replace: bool,
    /// Input names whose change forces replacement instead of update
    pub replace_on_changes: Vec<String>,
    /// Adopt an existing cloud resource instead of creating one
    pub import: Option<String>,
    /// Read an existing resource by id. Not supported for component resources.
    pub id: Option<String>,
    /// Provider package version; the crate version when unset
    pub version: Option<String>,
}

impl ResourceOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parent(mut self, parent: Urn) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn depends_on(mut self, urn: Urn) -> Self {
        self.depends_on.push(urn);
        self
    }

    pub fn protect(mut self, protect: bool) -> Self {
        self.protect = protect;
        self
    }

    pub fn delete_before_replace(mut self, delete_before_replace: bool) -> Self {
        self.delete_before_replace = delete_before_replace;
        self
    }

    pub fn replace_on_changes(mut self, name: impl Into<String>) -> Self {
        self.replace_on_changes.push(name.into());
        self
    }

    pub fn import(mut self, id: impl Into<String>) -> Self {
        self.import = Some(id.into());
        self
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }
}
