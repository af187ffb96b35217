//! Reference resolution between child resources
//!
//! Child resources refer to each other's computed attributes with
//! `Value::ResourceRef`. A `Bindings` table maps each child to its known
//! attributes; resolving replaces references whose target is known and
//! leaves the rest untouched for a later pass.

use std::collections::HashMap;

use crate::resource::{PropertyMap, Resource, ResourceId, State, Value};

#[derive(Debug, Clone, Default)]
pub struct Bindings {
    attributes: HashMap<ResourceId, PropertyMap>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed bindings from observed states, skipping ones that do not exist
    pub fn from_states<'a>(states: impl IntoIterator<Item = &'a State>) -> Self {
        let mut bindings = Self::new();
        for state in states {
            if state.exists {
                bindings.record(state);
            }
        }
        bindings
    }

    /// Record (or refresh) the attributes of a converged child
    pub fn record(&mut self, state: &State) {
        let entry = self.attributes.entry(state.id.clone()).or_default();
        for (k, v) in &state.attributes {
            entry.insert(k.clone(), v.clone());
        }
    }

    /// Forget a child that was deleted
    pub fn forget(&mut self, id: &ResourceId) {
        self.attributes.remove(id);
    }

    pub fn get(&self, id: &ResourceId, attribute: &str) -> Option<&Value> {
        self.attributes.get(id).and_then(|attrs| attrs.get(attribute))
    }

    pub fn resolve_value(&self, value: &Value) -> Value {
        match value {
            Value::ResourceRef { target, attribute } => match self.get(target, attribute) {
                Some(found) => self.resolve_value(found),
                // Keep as-is if not known yet
                None => value.clone(),
            },
            Value::List(items) => {
                Value::List(items.iter().map(|v| self.resolve_value(v)).collect())
            }
            Value::Map(map) => Value::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.resolve_value(v)))
                    .collect(),
            ),
            _ => value.clone(),
        }
    }

    pub fn resolve(&self, resource: &Resource) -> Resource {
        Resource {
            id: resource.id.clone(),
            attributes: resource
                .attributes
                .iter()
                .map(|(k, v)| (k.clone(), self.resolve_value(v)))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_references_and_keeps_unknown_ones() {
        let rg = ResourceId::new("resource_group", "site-resource-group");
        let profile = ResourceId::new("cdn_profile", "site-profile");

        let mut attrs = PropertyMap::new();
        attrs.insert("name".to_string(), Value::string("site-rg-1a2b3c4d"));
        let bindings = Bindings::from_states([&State::existing(rg.clone(), attrs)]);

        let endpoint = Resource::new("cdn_endpoint", "site-endpoint")
            .with_attribute("resource_group_name", Value::reference(&rg, "name"))
            .with_attribute("profile_name", Value::reference(&profile, "name"));

        let resolved = bindings.resolve(&endpoint);
        assert_eq!(
            resolved.attributes.get("resource_group_name"),
            Some(&Value::string("site-rg-1a2b3c4d"))
        );
        assert!(resolved.attributes["profile_name"].is_unresolved());
    }

    #[test]
    fn missing_states_are_not_bound() {
        let rg = ResourceId::new("resource_group", "rg");
        let bindings = Bindings::from_states([&State::not_found(rg.clone())]);
        assert!(bindings.get(&rg, "name").is_none());
    }

    #[test]
    fn forget_removes_binding() {
        let rg = ResourceId::new("resource_group", "rg");
        let mut attrs = PropertyMap::new();
        attrs.insert("name".to_string(), Value::string("rg-1"));
        let mut bindings = Bindings::from_states([&State::existing(rg.clone(), attrs)]);

        bindings.forget(&rg);
        assert!(bindings.get(&rg, "name").is_none());
    }
}
