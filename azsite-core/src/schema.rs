//! Schema - Define type schemas for resources
//!
//! Each attribute has exactly one canonical name. Callers may use aliases on
//! input; `ResourceSchema::canonicalize` folds them into the canonical form
//! that is sent across the registration boundary.

use std::collections::HashMap;
use std::fmt;

use crate::resource::{PropertyMap, Value};

/// Attribute type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeType {
    String,
    Bool,
}

impl AttributeType {
    /// Check if a value conforms to this type
    pub fn validate(&self, value: &Value) -> Result<(), TypeError> {
        match (self, value) {
            // References resolve at apply time, so they are accepted wherever a scalar is
            (_, Value::ResourceRef { .. }) => Ok(()),
            (AttributeType::String, Value::String(_)) => Ok(()),
            (AttributeType::Bool, Value::Bool(_)) => Ok(()),
            _ => Err(TypeError::TypeMismatch {
                expected: self.type_name(),
                got: value.type_name(),
            }),
        }
    }

    fn type_name(&self) -> String {
        match self {
            AttributeType::String => "String".to_string(),
            AttributeType::Bool => "Bool".to_string(),
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

/// Type error
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TypeError {
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("Required attribute '{name}' is missing")]
    MissingRequired { name: String },

    #[error("Unknown attribute '{name}'")]
    UnknownAttribute { name: String },

    #[error("Attribute '{canonical}' was given more than once (as {})", given.join(", "))]
    ConflictingNames {
        canonical: String,
        given: Vec<String>,
    },

    #[error("Attribute '{name}': {inner}")]
    AttributeError { name: String, inner: Box<TypeError> },
}

impl Value {
    fn type_name(&self) -> String {
        match self {
            Value::String(_) => "String".to_string(),
            Value::Int(_) => "Int".to_string(),
            Value::Bool(_) => "Bool".to_string(),
            Value::List(_) => "List".to_string(),
            Value::Map(_) => "Map".to_string(),
            Value::ResourceRef { target, attribute } => {
                format!("ResourceRef({}.{})", target, attribute)
            }
        }
    }
}

/// Attribute schema
#[derive(Debug, Clone)]
pub struct AttributeSchema {
    /// Canonical name sent across the registration boundary
    pub name: String,
    pub attr_type: AttributeType,
    pub required: bool,
    pub description: Option<String>,
    /// Alternative spellings accepted on input
    pub aliases: Vec<String>,
    /// Computed by the provider; never accepted as input
    pub output: bool,
}

impl AttributeSchema {
    pub fn new(name: impl Into<String>, attr_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attr_type,
            required: false,
            description: None,
            aliases: Vec::new(),
            output: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn output(mut self) -> Self {
        self.output = true;
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    fn answers_to(&self, name: &str) -> bool {
        self.name == name || self.aliases.iter().any(|a| a == name)
    }
}

/// Resource schema
#[derive(Debug, Clone)]
pub struct ResourceSchema {
    pub resource_type: String,
    pub attributes: HashMap<String, AttributeSchema>,
    pub description: Option<String>,
}

impl ResourceSchema {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            attributes: HashMap::new(),
            description: None,
        }
    }

    pub fn attribute(mut self, schema: AttributeSchema) -> Self {
        self.attributes.insert(schema.name.clone(), schema);
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Find the input attribute a (possibly aliased) name refers to
    pub fn lookup_input(&self, name: &str) -> Option<&AttributeSchema> {
        self.attributes
            .values()
            .find(|schema| !schema.output && schema.answers_to(name))
    }

    /// Rewrite aliased input names to their canonical names.
    ///
    /// Unknown names and names that collapse onto the same canonical
    /// attribute are errors.
    pub fn canonicalize(&self, attributes: &PropertyMap) -> Result<PropertyMap, Vec<TypeError>> {
        let mut errors = Vec::new();
        let mut given: HashMap<&str, Vec<String>> = HashMap::new();
        let mut canonical = PropertyMap::new();

        let mut names: Vec<&String> = attributes.keys().collect();
        names.sort();

        for name in names {
            match self.lookup_input(name) {
                Some(schema) => {
                    given.entry(schema.name.as_str()).or_default().push(name.clone());
                    canonical.insert(schema.name.clone(), attributes[name].clone());
                }
                None => errors.push(TypeError::UnknownAttribute { name: name.clone() }),
            }
        }

        for (canonical_name, spellings) in given {
            if spellings.len() > 1 {
                errors.push(TypeError::ConflictingNames {
                    canonical: canonical_name.to_string(),
                    given: spellings,
                });
            }
        }

        if errors.is_empty() {
            Ok(canonical)
        } else {
            Err(errors)
        }
    }

    /// Validate canonical input attributes
    pub fn validate(&self, attributes: &PropertyMap) -> Result<(), Vec<TypeError>> {
        let mut errors = Vec::new();

        let mut required: Vec<&AttributeSchema> = self
            .attributes
            .values()
            .filter(|s| s.required && !s.output)
            .collect();
        required.sort_by(|a, b| a.name.cmp(&b.name));
        for schema in required {
            if !attributes.contains_key(&schema.name) {
                errors.push(TypeError::MissingRequired {
                    name: schema.name.clone(),
                });
            }
        }

        for (name, value) in attributes {
            if let Some(schema) = self.attributes.get(name)
                && let Err(e) = schema.attr_type.validate(value)
            {
                errors.push(TypeError::AttributeError {
                    name: name.clone(),
                    inner: Box::new(e),
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> ResourceSchema {
        ResourceSchema::new("resource")
            .attribute(
                AttributeSchema::new("sitePath", AttributeType::String)
                    .required()
                    .with_alias("site_path"),
            )
            .attribute(
                AttributeSchema::new("withCDN", AttributeType::Bool)
                    .with_alias("with_cdn")
                    .with_alias("withCdn"),
            )
            .attribute(AttributeSchema::new("originURL", AttributeType::String).output())
    }

    #[test]
    fn validate_string_type() {
        let t = AttributeType::String;
        assert!(t.validate(&Value::String("hello".to_string())).is_ok());
        assert!(t.validate(&Value::Int(42)).is_err());
    }

    #[test]
    fn references_pass_for_any_type() {
        let target = crate::resource::ResourceId::new("resource_group", "rg");
        let reference = Value::reference(&target, "name");
        assert!(AttributeType::String.validate(&reference).is_ok());
        assert!(AttributeType::Bool.validate(&reference).is_ok());
    }

    #[test]
    fn aliases_fold_to_canonical_names() {
        let mut attrs = PropertyMap::new();
        attrs.insert("site_path".to_string(), Value::string("./dist"));
        attrs.insert("withCdn".to_string(), Value::Bool(true));

        let canonical = schema().canonicalize(&attrs).unwrap();
        assert_eq!(canonical.get("sitePath"), Some(&Value::string("./dist")));
        assert_eq!(canonical.get("withCDN"), Some(&Value::Bool(true)));
        assert_eq!(canonical.len(), 2);
    }

    #[test]
    fn alias_and_canonical_together_conflict() {
        let mut attrs = PropertyMap::new();
        attrs.insert("sitePath".to_string(), Value::string("./a"));
        attrs.insert("site_path".to_string(), Value::string("./b"));

        let errors = schema().canonicalize(&attrs).unwrap_err();
        assert!(matches!(
            &errors[0],
            TypeError::ConflictingNames { canonical, .. } if canonical == "sitePath"
        ));
    }

    #[test]
    fn outputs_are_not_inputs() {
        let mut attrs = PropertyMap::new();
        attrs.insert("sitePath".to_string(), Value::string("./dist"));
        attrs.insert("originURL".to_string(), Value::string("https://x"));

        let errors = schema().canonicalize(&attrs).unwrap_err();
        assert_eq!(
            errors,
            vec![TypeError::UnknownAttribute {
                name: "originURL".to_string()
            }]
        );
    }

    #[test]
    fn missing_required_attribute() {
        let errors = schema().validate(&PropertyMap::new()).unwrap_err();
        assert_eq!(
            errors,
            vec![TypeError::MissingRequired {
                name: "sitePath".to_string()
            }]
        );
    }

    #[test]
    fn wrong_type_is_reported_with_attribute_name() {
        let mut attrs = PropertyMap::new();
        attrs.insert("sitePath".to_string(), Value::string("./dist"));
        attrs.insert("withCDN".to_string(), Value::string("yes"));

        let errors = schema().validate(&attrs).unwrap_err();
        assert!(matches!(
            &errors[0],
            TypeError::AttributeError { name, .. } if name == "withCDN"
        ));
    }
}
