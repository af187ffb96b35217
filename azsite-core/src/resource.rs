//! Resource - Representing child resources and their state

use std::collections::HashMap;
use std::fmt;

/// Attribute bag keyed by canonical attribute name
pub type PropertyMap = HashMap<String, Value>;

/// Unique identifier for a resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId {
    /// Resource type (e.g., "storage_account", "cdn_endpoint")
    pub resource_type: String,
    /// Logical resource name, unique within its owning component
    pub name: String,
}

impl ResourceId {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.resource_type, self.name)
    }
}

/// Attribute value of a resource
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Int(i64),
    Bool(bool),
    List(Vec<Value>),
    Map(HashMap<String, Value>),
    /// Reference to another resource's attribute, resolved once that resource converges
    ResourceRef {
        target: ResourceId,
        attribute: String,
    },
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    pub fn reference(target: &ResourceId, attribute: impl Into<String>) -> Self {
        Value::ResourceRef {
            target: target.clone(),
            attribute: attribute.into(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns true if this value (or anything nested in it) is still a reference
    pub fn is_unresolved(&self) -> bool {
        match self {
            Value::ResourceRef { .. } => true,
            Value::List(items) => items.iter().any(Value::is_unresolved),
            Value::Map(map) => map.values().any(Value::is_unresolved),
            _ => false,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Int(n) => serde_json::Value::Number((*n).into()),
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Map(map) => {
                let obj: serde_json::Map<_, _> = map
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect();
                serde_json::Value::Object(obj)
            }
            // References are resolved before they are persisted; keep a readable marker otherwise
            Value::ResourceRef { target, attribute } => {
                serde_json::Value::String(format!("${{{}.{}}}", target, attribute))
            }
        }
    }

    /// Convert from JSON. `null` has no counterpart and yields `None`.
    pub fn from_json(json: &serde_json::Value) -> Option<Value> {
        match json {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(Value::String(s.clone())),
            serde_json::Value::Number(n) => n.as_i64().map(Value::Int),
            serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
            serde_json::Value::Array(items) => {
                Some(Value::List(items.iter().filter_map(Value::from_json).collect()))
            }
            serde_json::Value::Object(map) => Some(Value::Map(
                map.iter()
                    .filter_map(|(k, v)| Value::from_json(v).map(|v| (k.clone(), v)))
                    .collect(),
            )),
        }
    }
}

/// Convert a property map into a JSON object map
pub fn properties_to_json(props: &PropertyMap) -> HashMap<String, serde_json::Value> {
    props.iter().map(|(k, v)| (k.clone(), v.to_json())).collect()
}

/// Convert a JSON object map into a property map, dropping nulls
pub fn properties_from_json(json: &HashMap<String, serde_json::Value>) -> PropertyMap {
    json.iter()
        .filter_map(|(k, v)| Value::from_json(v).map(|v| (k.clone(), v)))
        .collect()
}

/// Desired state of a child resource
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub id: ResourceId,
    pub attributes: PropertyMap,
}

impl Resource {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: ResourceId::new(resource_type, name),
            attributes: HashMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Set an attribute only when a value is present
    pub fn with_optional(self, key: impl Into<String>, value: Option<Value>) -> Self {
        match value {
            Some(value) => self.with_attribute(key, value),
            None => self,
        }
    }

    /// Resources this one refers to through `ResourceRef` values
    pub fn dependencies(&self) -> Vec<ResourceId> {
        let mut deps = Vec::new();
        for value in self.attributes.values() {
            collect_dependencies(value, &mut deps);
        }
        deps.sort();
        deps.dedup();
        deps
    }
}

fn collect_dependencies(value: &Value, deps: &mut Vec<ResourceId>) {
    match value {
        Value::ResourceRef { target, .. } => deps.push(target.clone()),
        Value::List(items) => {
            for item in items {
                collect_dependencies(item, deps);
            }
        }
        Value::Map(map) => {
            for v in map.values() {
                collect_dependencies(v, deps);
            }
        }
        _ => {}
    }
}

/// Current state fetched from actual infrastructure
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    pub id: ResourceId,
    /// Cloud-side identifier (e.g., an Azure resource ID)
    pub identifier: Option<String>,
    pub attributes: PropertyMap,
    /// Whether this state exists
    pub exists: bool,
}

impl State {
    pub fn not_found(id: ResourceId) -> Self {
        Self {
            id,
            identifier: None,
            attributes: HashMap::new(),
            exists: false,
        }
    }

    pub fn existing(id: ResourceId, attributes: PropertyMap) -> Self {
        Self {
            id,
            identifier: None,
            attributes,
            exists: true,
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependencies_are_collected_from_nested_values() {
        let rg = ResourceId::new("resource_group", "site-resource-group");
        let account = ResourceId::new("storage_account", "site-account");
        let resource = Resource::new("cdn_endpoint", "site-endpoint")
            .with_attribute("resource_group_name", Value::reference(&rg, "name"))
            .with_attribute(
                "origins",
                Value::List(vec![Value::reference(&account, "primary_web_host")]),
            )
            .with_attribute("is_https_allowed", Value::Bool(true));

        assert_eq!(resource.dependencies(), vec![rg, account]);
    }

    #[test]
    fn unresolved_detection() {
        let rg = ResourceId::new("resource_group", "rg");
        assert!(Value::reference(&rg, "name").is_unresolved());
        assert!(Value::List(vec![Value::reference(&rg, "name")]).is_unresolved());
        assert!(!Value::string("rg-1234").is_unresolved());
    }

    #[test]
    fn json_conversion_drops_nulls() {
        let json = serde_json::json!({
            "name": "site",
            "count": 3,
            "enabled": true,
            "missing": null,
            "types": ["text/html", null],
        });
        let map: HashMap<String, serde_json::Value> =
            serde_json::from_value(json).unwrap();
        let props = properties_from_json(&map);

        assert_eq!(props.get("name"), Some(&Value::string("site")));
        assert_eq!(props.get("count"), Some(&Value::Int(3)));
        assert_eq!(props.get("enabled"), Some(&Value::Bool(true)));
        assert!(!props.contains_key("missing"));
        assert_eq!(
            props.get("types"),
            Some(&Value::List(vec![Value::string("text/html")]))
        );

        let back = properties_to_json(&props);
        assert_eq!(back.get("count"), Some(&serde_json::json!(3)));
    }

    #[test]
    fn resource_id_display() {
        let id = ResourceId::new("storage_account", "site-account");
        assert_eq!(id.to_string(), "storage_account.site-account");
    }
}
