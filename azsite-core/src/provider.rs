//! Provider - Traits abstracting resource operations
//!
//! A `Provider` performs CRUD on individual child resources of one cloud
//! (Azure, a simulation of it, ...). A `ComponentProvider` owns the
//! convergence of a whole component resource: given desired inputs and the
//! previously recorded state it creates, updates and deletes child resources
//! through a `Provider` and reports the component's outputs.

use std::future::Future;
use std::pin::Pin;

use crate::plan::Plan;
use crate::resource::{PropertyMap, Resource, ResourceId, State};

/// Error type for Provider operations
#[derive(Debug)]
pub struct ProviderError {
    pub message: String,
    pub resource_id: Option<ResourceId>,
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(ref id) = self.resource_id {
            write!(f, "[{}] {}", id, self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for ProviderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|e| e.as_ref() as &dyn std::error::Error)
    }
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            resource_id: None,
            cause: None,
        }
    }

    pub fn for_resource(mut self, id: ResourceId) -> Self {
        self.resource_id = Some(id);
        self
    }

    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Return type for async operations
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Definition of resource types that a Provider can handle
pub trait ResourceType: Send + Sync {
    /// Resource type name (e.g., "storage_account")
    fn name(&self) -> &'static str;

    /// Attributes that cannot be changed in place; a change forces replacement
    fn replace_on_changes(&self) -> &'static [&'static str] {
        &[]
    }
}

/// Child resource Provider
///
/// All operations are async and involve side effects.
pub trait Provider: Send + Sync {
    /// Name of this Provider (e.g., "azure")
    fn name(&self) -> &'static str;

    /// List of resource types this Provider can handle
    fn resource_types(&self) -> Vec<Box<dyn ResourceType>>;

    /// Attributes of `resource_type` whose change forces replacement
    fn replace_keys(&self, resource_type: &str) -> &'static [&'static str] {
        self.resource_types()
            .iter()
            .find(|t| t.name() == resource_type)
            .map(|t| t.replace_on_changes())
            .unwrap_or(&[])
    }

    /// Get the current state of a resource by its cloud identifier
    ///
    /// Returns `State::not_found()` if the resource does not exist.
    fn read(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<State>>;

    /// Create a resource
    ///
    /// Returns State with identifier set to the cloud identifier
    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>>;

    /// Update a resource in place
    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>>;

    /// Delete a resource
    fn delete(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>>;
}

/// Provider implementation for Box<dyn Provider>
/// This enables dynamic dispatch for Providers
impl Provider for Box<dyn Provider> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
        (**self).resource_types()
    }

    fn replace_keys(&self, resource_type: &str) -> &'static [&'static str] {
        (**self).replace_keys(resource_type)
    }

    fn read(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).read(id, identifier)
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).create(resource)
    }

    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).update(id, identifier, from, to)
    }

    fn delete(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
        (**self).delete(id, identifier)
    }
}

/// Recorded state of one component resource instance
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentState {
    pub urn: String,
    pub resource_type: String,
    /// Canonical inputs the component was last converged with
    pub inputs: PropertyMap,
    /// Outputs reported by the last successful convergence
    pub outputs: PropertyMap,
    /// Child resources that exist, in creation order
    pub children: Vec<State>,
}

/// A failed convergence together with whatever child resources exist afterwards
#[derive(Debug)]
pub struct ConvergeFailure {
    pub error: ProviderError,
    pub children: Vec<State>,
}

impl ConvergeFailure {
    pub fn new(error: ProviderError, children: Vec<State>) -> Self {
        Self { error, children }
    }
}

impl std::fmt::Display for ConvergeFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl std::error::Error for ConvergeFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Component Provider: converges a component resource as a whole
///
/// Contract:
/// - converging unchanged inputs against an already-converged state is a
///   no-op returning the same state;
/// - changed inputs touch only the child resources they imply;
/// - `destroy` removes every recorded child in dependency-safe order.
pub trait ComponentProvider: Send + Sync {
    /// Component type token (e.g., "azure-static-website:index:Website")
    fn resource_type(&self) -> &'static str;

    /// Compute the child resource plan without side effects
    fn preview(
        &self,
        urn: String,
        inputs: PropertyMap,
        previous: Option<ComponentState>,
    ) -> BoxFuture<'_, ProviderResult<Plan>>;

    /// Make real resources match `inputs`
    fn converge(
        &self,
        urn: String,
        inputs: PropertyMap,
        previous: Option<ComponentState>,
    ) -> BoxFuture<'_, Result<ComponentState, ConvergeFailure>>;

    /// Tear down everything recorded in `previous`
    fn destroy(&self, previous: ComponentState) -> BoxFuture<'_, Result<(), ConvergeFailure>>;
}
