//! State file structures for persisting converged resources

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use azsite_core::provider::ComponentState;
use azsite_core::resource::{ResourceId, State, properties_from_json, properties_to_json};

/// The main state file structure that persists to the backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateFile {
    /// State file format version
    pub version: u32,
    /// Monotonically increasing number for each state modification
    pub serial: u64,
    /// Unique identifier for this state lineage (prevents accidental overwrites)
    pub lineage: String,
    /// Version of azsite that last modified this state
    pub azsite_version: String,
    /// Registered resources, in registration order
    pub resources: Vec<ResourceState>,
}

impl StateFile {
    pub const CURRENT_VERSION: u32 = 1;

    pub fn new() -> Self {
        Self::with_lineage(uuid::Uuid::new_v4().to_string())
    }

    pub fn with_lineage(lineage: String) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            serial: 0,
            lineage,
            azsite_version: env!("CARGO_PKG_VERSION").to_string(),
            resources: Vec::new(),
        }
    }

    /// Increment serial and stamp the current version for a new state write
    pub fn increment_serial(&mut self) {
        self.serial += 1;
        self.azsite_version = env!("CARGO_PKG_VERSION").to_string();
    }

    pub fn find_resource(&self, urn: &str) -> Option<&ResourceState> {
        self.resources.iter().find(|r| r.urn == urn)
    }

    pub fn find_resource_mut(&mut self, urn: &str) -> Option<&mut ResourceState> {
        self.resources.iter_mut().find(|r| r.urn == urn)
    }

    /// Add or replace a resource, keeping its position if it was already recorded
    pub fn upsert_resource(&mut self, resource: ResourceState) {
        if let Some(existing) = self.find_resource_mut(&resource.urn) {
            *existing = resource;
        } else {
            self.resources.push(resource);
        }
    }

    pub fn remove_resource(&mut self, urn: &str) -> Option<ResourceState> {
        let pos = self.resources.iter().position(|r| r.urn == urn)?;
        Some(self.resources.remove(pos))
    }
}

impl Default for StateFile {
    fn default() -> Self {
        Self::new()
    }
}

/// State of one component resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceState {
    pub urn: String,
    pub resource_type: String,
    /// Logical name given at registration
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    /// URNs this resource waited for
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    /// Refuse to destroy while set
    #[serde(default)]
    pub protected: bool,
    pub inputs: HashMap<String, serde_json::Value>,
    pub outputs: HashMap<String, serde_json::Value>,
    /// Child resources in creation order
    #[serde(default)]
    pub children: Vec<ChildState>,
}

impl ResourceState {
    pub fn from_component(name: impl Into<String>, component: &ComponentState) -> Self {
        Self {
            urn: component.urn.clone(),
            resource_type: component.resource_type.clone(),
            name: name.into(),
            parent: None,
            dependencies: Vec::new(),
            protected: false,
            inputs: properties_to_json(&component.inputs),
            outputs: properties_to_json(&component.outputs),
            children: component.children.iter().map(ChildState::from_state).collect(),
        }
    }

    pub fn with_parent(mut self, parent: Option<String>) -> Self {
        self.parent = parent;
        self
    }

    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn with_protected(mut self, protected: bool) -> Self {
        self.protected = protected;
        self
    }

    /// The previous state handed back to the component provider
    pub fn to_component(&self) -> ComponentState {
        ComponentState {
            urn: self.urn.clone(),
            resource_type: self.resource_type.clone(),
            inputs: properties_from_json(&self.inputs),
            outputs: properties_from_json(&self.outputs),
            children: self.children.iter().map(ChildState::to_state).collect(),
        }
    }
}

/// One child resource as last observed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildState {
    pub resource_type: String,
    pub name: String,
    /// Cloud-side identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    pub attributes: HashMap<String, serde_json::Value>,
}

impl ChildState {
    pub fn from_state(state: &State) -> Self {
        Self {
            resource_type: state.id.resource_type.clone(),
            name: state.id.name.clone(),
            identifier: state.identifier.clone(),
            attributes: properties_to_json(&state.attributes),
        }
    }

    pub fn to_state(&self) -> State {
        let state = State::existing(
            ResourceId::new(&self.resource_type, &self.name),
            properties_from_json(&self.attributes),
        );
        match &self.identifier {
            Some(identifier) => state.with_identifier(identifier),
            None => state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use azsite_core::resource::{PropertyMap, Value};

    const URN: &str = "urn:pulumi:dev::docs::azure-static-website:index:Website::site";

    fn component() -> ComponentState {
        let mut inputs = PropertyMap::new();
        inputs.insert("sitePath".to_string(), Value::string("./dist"));
        inputs.insert("withCDN".to_string(), Value::Bool(false));
        let mut outputs = PropertyMap::new();
        outputs.insert("resourceGroupName".to_string(), Value::string("site-rg-1a2b3c4d"));

        let mut rg_attrs = PropertyMap::new();
        rg_attrs.insert("name".to_string(), Value::string("site-rg-1a2b3c4d"));
        rg_attrs.insert("location".to_string(), Value::string("eastus"));

        ComponentState {
            urn: URN.to_string(),
            resource_type: "azure-static-website:index:Website".to_string(),
            inputs,
            outputs,
            children: vec![
                State::existing(ResourceId::new("resource_group", "site-rg"), rg_attrs)
                    .with_identifier("/subscriptions/0/resourceGroups/site-rg-1a2b3c4d"),
            ],
        }
    }

    #[test]
    fn new_state_file_is_empty() {
        let state = StateFile::new();
        assert_eq!(state.version, StateFile::CURRENT_VERSION);
        assert_eq!(state.serial, 0);
        assert!(!state.lineage.is_empty());
        assert!(state.resources.is_empty());
    }

    #[test]
    fn increment_serial() {
        let mut state = StateFile::new();
        state.increment_serial();
        state.increment_serial();
        assert_eq!(state.serial, 2);
    }

    #[test]
    fn component_state_survives_persistence() {
        let original = component();
        let resource = ResourceState::from_component("site", &original).with_protected(true);

        let json = serde_json::to_string_pretty(&resource).unwrap();
        let restored: ResourceState = serde_json::from_str(&json).unwrap();

        assert_eq!(restored, resource);
        assert_eq!(restored.to_component(), original);
    }

    #[test]
    fn upsert_keeps_registration_order() {
        let mut state = StateFile::new();
        let first = ResourceState::from_component("site", &component());
        let mut second = first.clone();
        second.urn = format!("{}-2", URN);
        state.upsert_resource(first.clone());
        state.upsert_resource(second);

        let updated = first.with_protected(true);
        state.upsert_resource(updated);

        assert_eq!(state.resources.len(), 2);
        assert_eq!(state.resources[0].urn, URN);
        assert!(state.resources[0].protected);

        assert!(state.remove_resource(URN).is_some());
        assert!(state.remove_resource(URN).is_none());
        assert_eq!(state.resources.len(), 1);
    }
}
