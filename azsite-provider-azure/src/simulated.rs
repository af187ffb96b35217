//! Simulated Azure
//!
//! An in-process stand-in for the Azure resource manager. It assigns
//! physical names and resource ids, computes the attributes Azure would
//! (endpoints, host names, FQDNs) and enforces the rules convergence has to
//! respect: references must be resolved, DNS zones must exist, and a
//! resource cannot be deleted while something else still lives inside it.
//! The cloud can be persisted to a JSON file so separate runs see the same
//! resources.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use azsite_core::provider::{BoxFuture, Provider, ProviderError, ProviderResult, ResourceType};
use azsite_core::resource::{
    PropertyMap, Resource, ResourceId, State, Value, properties_from_json, properties_to_json,
};

use crate::children::{
    self, BLOB, CDN_CUSTOM_DOMAIN, CDN_ENDPOINT, CDN_PROFILE, DNS_RECORD_SET, RESOURCE_GROUP,
    STATIC_WEBSITE, STORAGE_ACCOUNT, WEB_CONTAINER,
};

const SUBSCRIPTION: &str = "00000000-0000-0000-0000-000000000000";
const STORAGE_NAME_MAX: usize = 24;

/// Attributes through which one resource lives inside another, with the
/// parent's type and the parent attribute they carry
const CONTAINMENT: &[(&str, &str, &str)] = &[
    ("resource_group_name", RESOURCE_GROUP, "name"),
    ("account_name", STORAGE_ACCOUNT, "name"),
    ("profile_name", CDN_PROFILE, "name"),
    ("endpoint_name", CDN_ENDPOINT, "name"),
    ("origin_host_name", STORAGE_ACCOUNT, "primary_web_host"),
];

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredResource {
    resource_type: String,
    name: String,
    attributes: HashMap<String, serde_json::Value>,
}

impl StoredResource {
    fn id(&self) -> ResourceId {
        ResourceId::new(&self.resource_type, &self.name)
    }

    fn attr(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(serde_json::Value::as_str)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Cloud {
    /// Keyed by resource id
    resources: BTreeMap<String, StoredResource>,
}

/// Simulated Azure resource manager
pub struct SimulatedAzure {
    cloud: Mutex<Cloud>,
    path: Option<PathBuf>,
    known_zones: Option<HashSet<String>>,
    failures: Mutex<HashSet<String>>,
}

impl Default for SimulatedAzure {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedAzure {
    /// An empty cloud that lives in memory only
    pub fn new() -> Self {
        Self {
            cloud: Mutex::new(Cloud::default()),
            path: None,
            known_zones: None,
            failures: Mutex::new(HashSet::new()),
        }
    }

    /// A cloud persisted at `path`, loaded if the file exists
    pub fn open(path: impl AsRef<Path>) -> ProviderResult<Self> {
        let path = path.as_ref().to_path_buf();
        let cloud = if path.exists() {
            let content = fs::read_to_string(&path).map_err(|e| {
                ProviderError::new(format!("Failed to read {}", path.display())).with_cause(e)
            })?;
            serde_json::from_str(&content).map_err(|e| {
                ProviderError::new(format!("Failed to parse {}", path.display())).with_cause(e)
            })?
        } else {
            Cloud::default()
        };
        Ok(Self {
            cloud: Mutex::new(cloud),
            path: Some(path),
            ..Self::new()
        })
    }

    /// Only these DNS zones exist
    pub fn with_known_zones<I, S>(mut self, zones: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.known_zones = Some(zones.into_iter().map(Into::into).collect());
        self
    }

    /// Make every create or update of `resource_type` fail
    pub fn with_failure(mut self, resource_type: impl Into<String>) -> Self {
        self.failures.get_mut().insert(resource_type.into());
        self
    }

    pub async fn clear_failures(&self) {
        self.failures.lock().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.cloud.lock().await.resources.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Attributes of every live resource of `resource_type`
    pub async fn resources_of_type(&self, resource_type: &str) -> Vec<PropertyMap> {
        self.cloud
            .lock()
            .await
            .resources
            .values()
            .filter(|r| r.resource_type == resource_type)
            .map(|r| properties_from_json(&r.attributes))
            .collect()
    }

    fn save(&self, cloud: &Cloud) -> ProviderResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                ProviderError::new(format!("Failed to create {}", parent.display())).with_cause(e)
            })?;
        }
        let content = serde_json::to_string_pretty(cloud)
            .map_err(|e| ProviderError::new("Failed to serialize cloud").with_cause(e))?;
        fs::write(path, content).map_err(|e| {
            ProviderError::new(format!("Failed to write {}", path.display())).with_cause(e)
        })
    }

    async fn check_writable(&self, resource: &Resource) -> ProviderResult<()> {
        let mut pending: Vec<&String> = resource
            .attributes
            .iter()
            .filter(|(_, v)| v.is_unresolved())
            .map(|(k, _)| k)
            .collect();
        if !pending.is_empty() {
            pending.sort();
            return Err(ProviderError::new(format!(
                "attributes {:?} still refer to unconverged resources",
                pending
            ))
            .for_resource(resource.id.clone()));
        }

        if self.failures.lock().await.contains(&resource.id.resource_type) {
            return Err(ProviderError::new("simulated failure").for_resource(resource.id.clone()));
        }

        if resource.id.resource_type == DNS_RECORD_SET
            && let Some(zones) = &self.known_zones
        {
            let zone = resource
                .attributes
                .get("zone_name")
                .and_then(Value::as_str)
                .unwrap_or_default();
            if !zones.contains(zone) {
                return Err(ProviderError::new(format!("DNS zone '{}' was not found", zone))
                    .for_resource(resource.id.clone()));
            }
        }

        Ok(())
    }
}

/// Physical name Azure would assign to a new resource
fn physical_name(resource: &Resource) -> String {
    let suffix = &uuid::Uuid::new_v4().simple().to_string()[..8];
    let attr = |key: &str| resource.attributes.get(key).and_then(Value::as_str);
    match resource.id.resource_type.as_str() {
        STORAGE_ACCOUNT => {
            let mut prefix: String = resource
                .id
                .name
                .chars()
                .filter(char::is_ascii_alphanumeric)
                .map(|c| c.to_ascii_lowercase())
                .collect();
            prefix.truncate(STORAGE_NAME_MAX - suffix.len());
            format!("{}{}", prefix, suffix)
        }
        STATIC_WEBSITE => "default".to_string(),
        BLOB => attr("blob_name").unwrap_or(&resource.id.name).to_string(),
        DNS_RECORD_SET => attr("relative_name").unwrap_or("@").to_string(),
        _ => format!("{}-{}", resource.id.name, suffix),
    }
}

/// Attributes Azure computes for a resource called `name`
fn computed_attributes(resource: &Resource, name: &str) -> PropertyMap {
    let attr = |key: &str| resource.attributes.get(key).and_then(Value::as_str);
    let mut computed = PropertyMap::new();
    computed.insert("name".to_string(), Value::string(name));
    match resource.id.resource_type.as_str() {
        STORAGE_ACCOUNT => {
            let host = format!("{}.z13.web.core.windows.net", name);
            computed.insert(
                "primary_web_endpoint".to_string(),
                Value::string(format!("https://{}/", host)),
            );
            computed.insert("primary_web_host".to_string(), Value::string(host));
        }
        STATIC_WEBSITE => {
            computed.insert("container_name".to_string(), Value::string(WEB_CONTAINER));
        }
        BLOB => {
            let account = attr("account_name").unwrap_or_default();
            computed.insert(
                "url".to_string(),
                Value::string(format!(
                    "https://{}.blob.core.windows.net/{}/{}",
                    account, WEB_CONTAINER, name
                )),
            );
        }
        CDN_ENDPOINT => {
            computed.insert(
                "host_name".to_string(),
                Value::string(format!("{}.azureedge.net", name)),
            );
        }
        DNS_RECORD_SET => {
            let zone = attr("zone_name").unwrap_or_default();
            let fqdn = if name == "@" {
                format!("{}.", zone)
            } else {
                format!("{}.{}.", name, zone)
            };
            let host = fqdn.trim_end_matches('.').to_string();
            computed.insert("fqdn".to_string(), Value::string(fqdn));
            computed.insert("host".to_string(), Value::string(host));
        }
        _ => {}
    }
    computed
}

fn resource_id(resource: &Resource, name: &str) -> String {
    let path = match resource.id.resource_type.as_str() {
        RESOURCE_GROUP => return format!("/subscriptions/{}/resourceGroups/{}", SUBSCRIPTION, name),
        STORAGE_ACCOUNT => "Microsoft.Storage/storageAccounts".to_string(),
        STATIC_WEBSITE | BLOB => {
            let account = resource
                .attributes
                .get("account_name")
                .and_then(Value::as_str)
                .unwrap_or_default();
            format!(
                "Microsoft.Storage/storageAccounts/{}/{}",
                account, resource.id.resource_type
            )
        }
        CDN_PROFILE => "Microsoft.Cdn/profiles".to_string(),
        CDN_ENDPOINT => "Microsoft.Cdn/profiles/endpoints".to_string(),
        DNS_RECORD_SET => {
            let zone = resource
                .attributes
                .get("zone_name")
                .and_then(Value::as_str)
                .unwrap_or_default();
            format!("Microsoft.Network/dnsZones/{}", zone)
        }
        CDN_CUSTOM_DOMAIN => "Microsoft.Cdn/profiles/endpoints/customDomains".to_string(),
        other => other.to_string(),
    };
    format!(
        "/subscriptions/{}/providers/{}/{}",
        SUBSCRIPTION, path, name
    )
}

fn store(resource: &Resource, name: &str) -> StoredResource {
    let mut attributes = resource.attributes.clone();
    attributes.extend(computed_attributes(resource, name));
    StoredResource {
        resource_type: resource.id.resource_type.clone(),
        name: resource.id.name.clone(),
        attributes: properties_to_json(&attributes),
    }
}

fn to_state(identifier: &str, stored: &StoredResource) -> State {
    State::existing(stored.id(), properties_from_json(&stored.attributes))
        .with_identifier(identifier)
}

impl Provider for SimulatedAzure {
    fn name(&self) -> &'static str {
        "azure"
    }

    fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
        children::child_types()
    }

    fn read(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        Box::pin(async move {
            let cloud = self.cloud.lock().await;
            match cloud.resources.get(&identifier) {
                Some(stored) => Ok(to_state(&identifier, stored)),
                None => Ok(State::not_found(id)),
            }
        })
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move {
            self.check_writable(&resource).await?;

            let name = physical_name(&resource);
            let identifier = resource_id(&resource, &name);
            let mut cloud = self.cloud.lock().await;
            if cloud.resources.contains_key(&identifier) {
                return Err(ProviderError::new(format!("{} already exists", identifier))
                    .for_resource(resource.id.clone()));
            }

            let stored = store(&resource, &name);
            let state = to_state(&identifier, &stored);
            cloud.resources.insert(identifier.clone(), stored);
            self.save(&cloud)?;
            log::debug!("created {}", identifier);
            Ok(state)
        })
    }

    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        _from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        let to = to.clone();
        Box::pin(async move {
            self.check_writable(&to).await?;

            let mut cloud = self.cloud.lock().await;
            let name = match cloud.resources.get(&identifier) {
                Some(existing) => existing.attr("name").unwrap_or_default().to_string(),
                None => {
                    return Err(ProviderError::new(format!("{} was not found", identifier))
                        .for_resource(id));
                }
            };

            let stored = store(&to, &name);
            let state = to_state(&identifier, &stored);
            cloud.resources.insert(identifier.clone(), stored);
            self.save(&cloud)?;
            log::debug!("updated {}", identifier);
            Ok(state)
        })
    }

    fn delete(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        Box::pin(async move {
            let mut cloud = self.cloud.lock().await;
            let Some(target) = cloud.resources.get(&identifier) else {
                log::debug!("{} is already gone", identifier);
                return Ok(());
            };

            for (key, parent_type, parent_attr) in CONTAINMENT {
                if target.resource_type != *parent_type {
                    continue;
                }
                let Some(value) = target.attr(parent_attr) else {
                    continue;
                };
                let dependent = cloud.resources.iter().find(|(other_id, other)| {
                    **other_id != identifier && other.attr(key) == Some(value)
                });
                if let Some((_, dependent)) = dependent {
                    return Err(ProviderError::new(format!(
                        "cannot delete while {} still refers to it",
                        dependent.id()
                    ))
                    .for_resource(id));
                }
            }

            cloud.resources.remove(&identifier);
            self.save(&cloud)?;
            log::debug!("deleted {}", identifier);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn resource_group() -> Resource {
        Resource::new(RESOURCE_GROUP, "site-rg").with_attribute("location", Value::string("eastus"))
    }

    fn storage_account(rg_name: &str) -> Resource {
        Resource::new(STORAGE_ACCOUNT, "site-storage")
            .with_attribute("resource_group_name", Value::string(rg_name))
            .with_attribute("location", Value::string("eastus"))
    }

    #[tokio::test]
    async fn create_assigns_names_and_endpoints() {
        let azure = SimulatedAzure::new();
        let rg = azure.create(&resource_group()).await.unwrap();
        let rg_name = rg.get_str("name").unwrap().to_string();
        assert!(rg_name.starts_with("site-rg-"));

        let account = azure.create(&storage_account(&rg_name)).await.unwrap();
        let account_name = account.get_str("name").unwrap();
        assert!(account_name.len() <= 24);
        assert!(
            account_name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        );
        assert_eq!(
            account.get_str("primary_web_endpoint"),
            Some(format!("https://{}.z13.web.core.windows.net/", account_name).as_str())
        );

        let read = azure
            .read(&account.id, account.identifier.as_deref().unwrap())
            .await
            .unwrap();
        assert_eq!(read, account);
    }

    #[tokio::test]
    async fn unresolved_references_are_rejected() {
        let azure = SimulatedAzure::new();
        let rg = ResourceId::new(RESOURCE_GROUP, "site-rg");
        let resource = Resource::new(STORAGE_ACCOUNT, "site-storage")
            .with_attribute("resource_group_name", Value::reference(&rg, "name"));

        let err = azure.create(&resource).await.unwrap_err();
        assert!(err.message.contains("resource_group_name"));
        assert!(azure.is_empty().await);
    }

    #[tokio::test]
    async fn unknown_dns_zone_is_rejected() {
        let azure = SimulatedAzure::new().with_known_zones(["example.com"]);
        let record = |zone: &str| {
            Resource::new(DNS_RECORD_SET, "site-dns-record")
                .with_attribute("zone_name", Value::string(zone))
                .with_attribute("relative_name", Value::string("www"))
        };

        assert!(azure.create(&record("example.org")).await.is_err());
        let state = azure.create(&record("example.com")).await.unwrap();
        assert_eq!(state.get_str("fqdn"), Some("www.example.com."));
        assert_eq!(state.get_str("host"), Some("www.example.com"));
    }

    #[tokio::test]
    async fn containing_resource_cannot_be_deleted_first() {
        let azure = SimulatedAzure::new();
        let rg = azure.create(&resource_group()).await.unwrap();
        let account = azure
            .create(&storage_account(rg.get_str("name").unwrap()))
            .await
            .unwrap();

        let rg_identifier = rg.identifier.as_deref().unwrap();
        assert!(azure.delete(&rg.id, rg_identifier).await.is_err());

        azure
            .delete(&account.id, account.identifier.as_deref().unwrap())
            .await
            .unwrap();
        azure.delete(&rg.id, rg_identifier).await.unwrap();
        assert!(azure.is_empty().await);
    }

    #[tokio::test]
    async fn update_keeps_physical_name() {
        let azure = SimulatedAzure::new();
        let rg = azure.create(&resource_group()).await.unwrap();
        let tagged = resource_group().with_attribute("owner", Value::string("web"));

        let updated = azure
            .update(&rg.id, rg.identifier.as_deref().unwrap(), &rg, &tagged)
            .await
            .unwrap();
        assert_eq!(updated.get_str("name"), rg.get_str("name"));
        assert_eq!(updated.get_str("owner"), Some("web"));
    }

    #[tokio::test]
    async fn injected_failures_can_be_cleared() {
        let azure = SimulatedAzure::new().with_failure(RESOURCE_GROUP);
        assert!(azure.create(&resource_group()).await.is_err());

        azure.clear_failures().await;
        assert!(azure.create(&resource_group()).await.is_ok());
    }

    #[tokio::test]
    async fn persisted_cloud_is_reloaded() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".azsite/cloud.json");

        let rg = {
            let azure = SimulatedAzure::open(&path).unwrap();
            azure.create(&resource_group()).await.unwrap()
        };

        let azure = SimulatedAzure::open(&path).unwrap();
        assert_eq!(azure.len().await, 1);
        let read = azure
            .read(&rg.id, rg.identifier.as_deref().unwrap())
            .await
            .unwrap();
        assert!(read.exists);
        assert_eq!(read.get_str("name"), rg.get_str("name"));
    }
}
