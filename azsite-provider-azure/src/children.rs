//! Children - The Azure resources a Website is made of
//!
//! `desired_children` turns a `WebsiteSpec` and the discovered site files
//! into an ordered list of child resources. Earlier children never refer to
//! later ones, so the list is also a valid creation order.

use azsite_core::provider::ResourceType;
use azsite_core::resource::{Resource, ResourceId, Value};
use azsite_core::website::WebsiteSpec;

use crate::site::SiteFile;

pub const RESOURCE_GROUP: &str = "resource_group";
pub const STORAGE_ACCOUNT: &str = "storage_account";
pub const STATIC_WEBSITE: &str = "static_website";
pub const BLOB: &str = "blob";
pub const CDN_PROFILE: &str = "cdn_profile";
pub const CDN_ENDPOINT: &str = "cdn_endpoint";
pub const DNS_RECORD_SET: &str = "dns_record_set";
pub const CDN_CUSTOM_DOMAIN: &str = "cdn_custom_domain";

/// Content types the CDN endpoint compresses
pub const COMPRESSED_CONTENT_TYPES: &[&str] = &[
    "text/html",
    "text/css",
    "application/javascript",
    "application/json",
    "image/svg+xml",
    "font/woff",
    "font/woff2",
];

/// Storage static websites serve from this container
pub const WEB_CONTAINER: &str = "$web";

const DNS_TTL: i64 = 3600;

/// Resource group resource type
pub struct ResourceGroupType;

impl ResourceType for ResourceGroupType {
    fn name(&self) -> &'static str {
        RESOURCE_GROUP
    }

    fn replace_on_changes(&self) -> &'static [&'static str] {
        &["location"]
    }
}

/// Storage account resource type
pub struct StorageAccountType;

impl ResourceType for StorageAccountType {
    fn name(&self) -> &'static str {
        STORAGE_ACCOUNT
    }

    fn replace_on_changes(&self) -> &'static [&'static str] {
        &["resource_group_name", "location", "account_kind"]
    }
}

/// Static website configuration of a storage account
pub struct StaticWebsiteType;

impl ResourceType for StaticWebsiteType {
    fn name(&self) -> &'static str {
        STATIC_WEBSITE
    }

    fn replace_on_changes(&self) -> &'static [&'static str] {
        &["account_name", "resource_group_name"]
    }
}

/// Blob resource type
pub struct BlobType;

impl ResourceType for BlobType {
    fn name(&self) -> &'static str {
        BLOB
    }

    fn replace_on_changes(&self) -> &'static [&'static str] {
        &["account_name", "container_name", "blob_name"]
    }
}

/// CDN profile resource type
pub struct CdnProfileType;

impl ResourceType for CdnProfileType {
    fn name(&self) -> &'static str {
        CDN_PROFILE
    }

    fn replace_on_changes(&self) -> &'static [&'static str] {
        &["resource_group_name", "sku"]
    }
}

/// CDN endpoint resource type
pub struct CdnEndpointType;

impl ResourceType for CdnEndpointType {
    fn name(&self) -> &'static str {
        CDN_ENDPOINT
    }

    fn replace_on_changes(&self) -> &'static [&'static str] {
        &["resource_group_name", "profile_name"]
    }
}

/// DNS record set resource type
pub struct DnsRecordSetType;

impl ResourceType for DnsRecordSetType {
    fn name(&self) -> &'static str {
        DNS_RECORD_SET
    }

    fn replace_on_changes(&self) -> &'static [&'static str] {
        &["zone_name", "resource_group_name", "record_type", "relative_name"]
    }
}

/// CDN custom domain resource type
pub struct CdnCustomDomainType;

impl ResourceType for CdnCustomDomainType {
    fn name(&self) -> &'static str {
        CDN_CUSTOM_DOMAIN
    }

    fn replace_on_changes(&self) -> &'static [&'static str] {
        &["resource_group_name", "profile_name", "endpoint_name", "host_name"]
    }
}

/// Every child resource type a Website can have
pub fn child_types() -> Vec<Box<dyn ResourceType>> {
    vec![
        Box::new(ResourceGroupType),
        Box::new(StorageAccountType),
        Box::new(StaticWebsiteType),
        Box::new(BlobType),
        Box::new(CdnProfileType),
        Box::new(CdnEndpointType),
        Box::new(DnsRecordSetType),
        Box::new(CdnCustomDomainType),
    ]
}

/// Ids of the fixed children of the Website `name`
#[derive(Debug, Clone)]
pub struct ChildIds {
    pub resource_group: ResourceId,
    pub storage_account: ResourceId,
    pub static_website: ResourceId,
    pub cdn_profile: ResourceId,
    pub cdn_endpoint: ResourceId,
    pub dns_record_set: ResourceId,
    pub cdn_custom_domain: ResourceId,
}

impl ChildIds {
    pub fn new(website: &str) -> Self {
        let id = |resource_type: &str, child: &str| {
            ResourceId::new(resource_type, format!("{}-{}", website, child))
        };
        Self {
            resource_group: id(RESOURCE_GROUP, "rg"),
            storage_account: id(STORAGE_ACCOUNT, "storage"),
            static_website: id(STATIC_WEBSITE, "static-website"),
            cdn_profile: id(CDN_PROFILE, "cdn-profile"),
            cdn_endpoint: id(CDN_ENDPOINT, "cdn-endpoint"),
            dns_record_set: id(DNS_RECORD_SET, "dns-record"),
            cdn_custom_domain: id(CDN_CUSTOM_DOMAIN, "custom-domain"),
        }
    }

    pub fn blob(website: &str, path: &str) -> ResourceId {
        ResourceId::new(BLOB, format!("{}-blob-{}", website, path))
    }
}

/// Child resources of the Website `name`, in creation order
pub fn desired_children(
    name: &str,
    spec: &WebsiteSpec,
    files: &[SiteFile],
    location: &str,
) -> Vec<Resource> {
    let ids = ChildIds::new(name);
    let rg_name = Value::reference(&ids.resource_group, "name");
    let account_name = Value::reference(&ids.storage_account, "name");
    let web_host = Value::reference(&ids.storage_account, "primary_web_host");

    let mut children = vec![
        Resource::new(RESOURCE_GROUP, &ids.resource_group.name)
            .with_attribute("location", Value::string(location)),
        Resource::new(STORAGE_ACCOUNT, &ids.storage_account.name)
            .with_attribute("resource_group_name", rg_name.clone())
            .with_attribute("location", Value::string(location))
            .with_attribute("account_kind", Value::string("StorageV2"))
            .with_attribute("sku", Value::string("Standard_LRS")),
        Resource::new(STATIC_WEBSITE, &ids.static_website.name)
            .with_attribute("resource_group_name", rg_name.clone())
            .with_attribute("account_name", account_name.clone())
            .with_attribute(
                "index_document",
                Value::string(spec.index_document_or_default()),
            )
            .with_attribute(
                "error_document_404_path",
                Value::string(spec.error_document_or_default()),
            ),
    ];

    for file in files {
        let id = ChildIds::blob(name, &file.path);
        children.push(
            Resource::new(BLOB, id.name)
                .with_attribute("account_name", account_name.clone())
                // Through the static website so blobs wait for the $web container
                .with_attribute(
                    "container_name",
                    Value::reference(&ids.static_website, "container_name"),
                )
                .with_attribute("blob_name", Value::string(&file.path))
                .with_attribute("type", Value::string("Block"))
                .with_attribute("content_type", Value::string(&file.content_type))
                .with_attribute("content_hash", Value::string(&file.content_hash))
                .with_attribute(
                    "source",
                    Value::string(file.source.to_string_lossy().into_owned()),
                ),
        );
    }

    if spec.with_cdn {
        children.push(
            Resource::new(CDN_PROFILE, &ids.cdn_profile.name)
                .with_attribute("resource_group_name", rg_name.clone())
                .with_attribute("location", Value::string("global"))
                .with_attribute("sku", Value::string("Standard_Microsoft")),
        );
        children.push(
            Resource::new(CDN_ENDPOINT, &ids.cdn_endpoint.name)
                .with_attribute("resource_group_name", rg_name.clone())
                .with_attribute("profile_name", Value::reference(&ids.cdn_profile, "name"))
                .with_attribute("origin_host_name", web_host.clone())
                .with_attribute("origin_host_header", web_host.clone())
                .with_attribute("is_http_allowed", Value::Bool(false))
                .with_attribute("is_https_allowed", Value::Bool(true))
                .with_attribute("is_compression_enabled", Value::Bool(true))
                .with_attribute(
                    "content_types_to_compress",
                    Value::List(
                        COMPRESSED_CONTENT_TYPES
                            .iter()
                            .map(|t| Value::string(*t))
                            .collect(),
                    ),
                ),
        );
    }

    if let Some(zone) = &spec.dns_zone_name {
        let (record_type, relative_name) = match &spec.subdomain {
            Some(subdomain) => ("CNAME", subdomain.as_str()),
            None => ("A", "@"),
        };
        let target = if spec.with_cdn {
            Value::reference(&ids.cdn_endpoint, "host_name")
        } else {
            web_host.clone()
        };
        let zone_group = match &spec.domain_resource_group {
            Some(group) => Value::string(group),
            None => rg_name.clone(),
        };
        children.push(
            Resource::new(DNS_RECORD_SET, &ids.dns_record_set.name)
                .with_attribute("zone_name", Value::string(zone))
                .with_attribute("resource_group_name", zone_group)
                .with_attribute("record_type", Value::string(record_type))
                .with_attribute("relative_name", Value::string(relative_name))
                .with_attribute("ttl", Value::Int(DNS_TTL))
                .with_attribute("target", target),
        );

        if spec.with_cdn {
            children.push(
                Resource::new(CDN_CUSTOM_DOMAIN, &ids.cdn_custom_domain.name)
                    .with_attribute("resource_group_name", rg_name.clone())
                    .with_attribute("profile_name", Value::reference(&ids.cdn_profile, "name"))
                    .with_attribute("endpoint_name", Value::reference(&ids.cdn_endpoint, "name"))
                    .with_attribute("host_name", Value::reference(&ids.dns_record_set, "host"))
                    .with_attribute("https_enabled", Value::Bool(true))
                    .with_attribute("certificate_type", Value::string("Dedicated")),
            );
        }
    }

    children
}

#[cfg(test)]
mod tests {
    use super::*;
    use azsite_core::website::WebsiteArgs;
    use std::path::PathBuf;

    fn files() -> Vec<SiteFile> {
        vec![
            SiteFile {
                path: "css/site.css".to_string(),
                source: PathBuf::from("dist/css/site.css"),
                content_type: "text/css".to_string(),
                content_hash: "aa".to_string(),
            },
            SiteFile {
                path: "index.html".to_string(),
                source: PathBuf::from("dist/index.html"),
                content_type: "text/html".to_string(),
                content_hash: "bb".to_string(),
            },
        ]
    }

    fn types(children: &[Resource]) -> Vec<&str> {
        children.iter().map(|c| c.id.resource_type.as_str()).collect()
    }

    #[test]
    fn site_path_only_gives_storage_and_blobs() {
        let spec = WebsiteArgs::new("dist").into_spec().unwrap();
        let children = desired_children("site", &spec, &files(), "eastus");

        assert_eq!(
            types(&children),
            vec![RESOURCE_GROUP, STORAGE_ACCOUNT, STATIC_WEBSITE, BLOB, BLOB]
        );
        assert_eq!(children[0].id.name, "site-rg");
        assert_eq!(children[3].id.name, "site-blob-css/site.css");
        assert_eq!(
            children[2].attributes.get("index_document"),
            Some(&Value::string("index.html"))
        );
        assert_eq!(
            children[2].attributes.get("error_document_404_path"),
            Some(&Value::string("error.html"))
        );
    }

    #[test]
    fn cdn_and_custom_domain_children() {
        let spec = WebsiteArgs::new("dist")
            .with_cdn(true)
            .dns_zone_name("example.com")
            .subdomain("www")
            .into_spec()
            .unwrap();
        let children = desired_children("site", &spec, &[], "eastus");

        assert_eq!(
            types(&children),
            vec![
                RESOURCE_GROUP,
                STORAGE_ACCOUNT,
                STATIC_WEBSITE,
                CDN_PROFILE,
                CDN_ENDPOINT,
                DNS_RECORD_SET,
                CDN_CUSTOM_DOMAIN
            ]
        );

        let ids = ChildIds::new("site");
        let record = &children[5];
        assert_eq!(record.attributes.get("record_type"), Some(&Value::string("CNAME")));
        assert_eq!(record.attributes.get("relative_name"), Some(&Value::string("www")));
        assert_eq!(
            record.attributes.get("target"),
            Some(&Value::reference(&ids.cdn_endpoint, "host_name"))
        );
        assert_eq!(
            children[6].attributes.get("host_name"),
            Some(&Value::reference(&ids.dns_record_set, "host"))
        );
    }

    #[test]
    fn apex_domain_without_cdn_targets_storage() {
        let spec = WebsiteArgs::new("dist")
            .dns_zone_name("example.com")
            .domain_resource_group("dns-rg")
            .into_spec()
            .unwrap();
        let children = desired_children("site", &spec, &[], "eastus");

        assert_eq!(
            types(&children),
            vec![RESOURCE_GROUP, STORAGE_ACCOUNT, STATIC_WEBSITE, DNS_RECORD_SET]
        );
        let record = &children[3];
        assert_eq!(record.attributes.get("record_type"), Some(&Value::string("A")));
        assert_eq!(record.attributes.get("relative_name"), Some(&Value::string("@")));
        assert_eq!(
            record.attributes.get("resource_group_name"),
            Some(&Value::string("dns-rg"))
        );
    }

    #[test]
    fn children_only_refer_backwards() {
        let spec = WebsiteArgs::new("dist")
            .with_cdn(true)
            .dns_zone_name("example.com")
            .into_spec()
            .unwrap();
        let children = desired_children("site", &spec, &files(), "eastus");

        for (i, child) in children.iter().enumerate() {
            for dep in child.dependencies() {
                let position = children.iter().position(|c| c.id == dep).unwrap();
                assert!(position < i, "{} refers forward to {}", child.id, dep);
            }
        }
    }
}
