//! Stack file - JSON declaration of the Website resources of one stack

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use serde::Deserialize;

use azsite_core::options::ResourceOptions;
use azsite_core::resource::{PropertyMap, Value, properties_from_json};
use azsite_core::website::{WEBSITE_TYPE, WebsiteSpec};
use azsite_state::BackendConfig;

/// Stack name used when the file does not set one
pub const DEFAULT_STACK: &str = "dev";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StackFile {
    /// Project name
    pub name: String,
    #[serde(default)]
    pub stack: Option<String>,
    /// Azure region for every resource of the stack
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub backend: Option<BackendDecl>,
    /// Keyed by logical name
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceDecl>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendDecl {
    #[serde(rename = "type")]
    pub backend_type: String,
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceDecl {
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default)]
    pub properties: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub options: OptionsDecl,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OptionsDecl {
    /// Logical names of resources that must converge first
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub protect: bool,
    /// Logical name of the parent resource
    #[serde(default)]
    pub parent: Option<String>,
}

impl ResourceDecl {
    pub fn properties(&self) -> PropertyMap {
        properties_from_json(&self.properties)
    }

    /// Engine options; `parent` and `dependsOn` are resolved to URNs by the caller
    pub fn base_options(&self) -> ResourceOptions {
        ResourceOptions::new().protect(self.options.protect)
    }
}

impl StackFile {
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        Self::parse(&content).map_err(|e| format!("{}: {}", path.display(), e))
    }

    pub fn parse(content: &str) -> Result<Self, String> {
        serde_json::from_str(content).map_err(|e| format!("Parse error: {}", e))
    }

    pub fn stack_name(&self) -> &str {
        self.stack.as_deref().unwrap_or(DEFAULT_STACK)
    }

    /// Backend declared by the file, or a local file at `default_path`.
    /// Relative paths in the file are taken from `base_dir`.
    pub fn backend_config(&self, base_dir: &Path, default_path: &Path) -> BackendConfig {
        let Some(decl) = &self.backend else {
            return BackendConfig::local(default_path.to_string_lossy());
        };
        let mut attributes = HashMap::new();
        if let Some(path) = &decl.path {
            let path = base_dir.join(path);
            attributes.insert(
                "path".to_string(),
                Value::String(path.to_string_lossy().into_owned()),
            );
        }
        BackendConfig {
            backend_type: decl.backend_type.clone(),
            attributes,
        }
    }

    /// Every problem with the file, one message each
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.name.trim().is_empty() {
            errors.push("project name must not be empty".to_string());
        }

        for (name, decl) in &self.resources {
            if decl.resource_type != WEBSITE_TYPE {
                errors.push(format!(
                    "{}: unsupported resource type '{}' (expected '{}')",
                    name, decl.resource_type, WEBSITE_TYPE
                ));
                continue;
            }
            if let Err(e) = WebsiteSpec::from_properties(&decl.properties()) {
                errors.push(format!("{}: {}", name, e));
            }
            for dep in &decl.options.depends_on {
                if !self.resources.contains_key(dep) {
                    errors.push(format!("{}: depends on unknown resource '{}'", name, dep));
                }
            }
            if let Some(parent) = &decl.options.parent
                && !self.resources.contains_key(parent)
            {
                errors.push(format!("{}: unknown parent '{}'", name, parent));
            }
        }

        if errors.is_empty()
            && let Err(e) = self.registration_order()
        {
            errors.push(e);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Logical names ordered so parents and dependencies come first.
    /// Ties keep name order.
    pub fn registration_order(&self) -> Result<Vec<&str>, String> {
        let mut pending: BTreeMap<&str, Vec<&str>> = self
            .resources
            .iter()
            .map(|(name, decl)| {
                let mut deps: Vec<&str> = decl.options.depends_on.iter().map(String::as_str).collect();
                deps.extend(decl.options.parent.as_deref());
                deps.retain(|d| self.resources.contains_key(*d));
                (name.as_str(), deps)
            })
            .collect();

        let mut order = Vec::with_capacity(pending.len());
        while !pending.is_empty() {
            let ready: Vec<&str> = pending
                .iter()
                .filter(|(_, deps)| deps.iter().all(|d| order.contains(d)))
                .map(|(name, _)| *name)
                .collect();

            if ready.is_empty() {
                let stuck: Vec<&str> = pending.keys().copied().collect();
                return Err(format!("dependency cycle among: {}", stuck.join(", ")));
            }

            for name in ready {
                pending.remove(name);
                order.push(name);
            }
        }
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn stack(resources: &str) -> StackFile {
        StackFile::parse(&format!(r#"{{ "name": "docs", "resources": {} }}"#, resources)).unwrap()
    }

    #[test]
    fn minimal_file() {
        let file = stack(
            r#"{ "site": { "type": "azure-static-website:index:Website",
                           "properties": { "sitePath": "./dist" } } }"#,
        );
        assert_eq!(file.stack_name(), DEFAULT_STACK);
        assert!(file.validate().is_ok());

        let decl = &file.resources["site"];
        assert_eq!(decl.properties().get("sitePath"), Some(&Value::string("./dist")));
        assert!(!decl.base_options().protect);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result = StackFile::parse(r#"{ "name": "docs", "regoin": "westeurope" }"#);
        assert!(result.is_err());
    }

    #[test]
    fn validation_collects_every_problem() {
        let file = stack(
            r#"{
                "a": { "type": "azure-static-website:index:Website", "properties": {} },
                "b": { "type": "aws:s3:Bucket" },
                "c": { "type": "azure-static-website:index:Website",
                       "properties": { "sitePath": "./c" },
                       "options": { "dependsOn": ["missing"], "parent": "ghost" } }
            }"#,
        );
        let errors = file.validate().unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors[0].starts_with("a:"));
        assert!(errors[1].contains("unsupported resource type"));
        assert!(errors.iter().any(|e| e.contains("unknown resource 'missing'")));
        assert!(errors.iter().any(|e| e.contains("unknown parent 'ghost'")));
    }

    #[test]
    fn dependencies_come_first() {
        let file = stack(
            r#"{
                "a": { "type": "azure-static-website:index:Website",
                       "properties": { "sitePath": "./a" },
                       "options": { "dependsOn": ["c"] } },
                "b": { "type": "azure-static-website:index:Website",
                       "properties": { "sitePath": "./b" },
                       "options": { "parent": "a" } },
                "c": { "type": "azure-static-website:index:Website",
                       "properties": { "sitePath": "./c" } }
            }"#,
        );
        assert_eq!(file.registration_order().unwrap(), vec!["c", "a", "b"]);
    }

    #[test]
    fn cycles_are_reported() {
        let file = stack(
            r#"{
                "a": { "type": "azure-static-website:index:Website",
                       "properties": { "sitePath": "./a" },
                       "options": { "dependsOn": ["b"] } },
                "b": { "type": "azure-static-website:index:Website",
                       "properties": { "sitePath": "./b" },
                       "options": { "dependsOn": ["a"] } }
            }"#,
        );
        let errors = file.validate().unwrap_err();
        assert_eq!(errors, vec!["dependency cycle among: a, b".to_string()]);
    }

    #[test]
    fn backend_paths_are_relative_to_the_stack_file() {
        let file = StackFile::parse(
            r#"{ "name": "docs", "backend": { "type": "local", "path": "state/dev.json" } }"#,
        )
        .unwrap();
        let config = file.backend_config(Path::new("/srv/site"), Path::new("ignored.json"));
        assert_eq!(config.backend_type, "local");
        assert_eq!(
            config.get_string("path").map(PathBuf::from),
            Some(PathBuf::from("/srv/site/state/dev.json"))
        );

        let file = stack("{}");
        let config = file.backend_config(Path::new("/srv/site"), Path::new("azsite.state.json"));
        assert_eq!(config.get_string("path"), Some("azsite.state.json"));
    }
}
