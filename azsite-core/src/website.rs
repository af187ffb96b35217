//! Website - Argument and output model of the static website resource
//!
//! `WebsiteArgs` is what callers write (builder setters or serde), a raw
//! `PropertyMap` is what a stack file carries, and both normalize into a
//! `WebsiteSpec` whose attributes use the canonical names. `WebsiteState` is
//! the computed output record.

use serde::{Deserialize, Serialize};

use crate::error::{OutputError, ValidationError};
use crate::resource::{PropertyMap, Value};
use crate::schema::{AttributeSchema, AttributeType, ResourceSchema};

/// Type token of the Website resource
pub const WEBSITE_TYPE: &str = "azure-static-website:index:Website";

pub const DEFAULT_INDEX_DOCUMENT: &str = "index.html";
pub const DEFAULT_ERROR_DOCUMENT: &str = "error.html";

// Canonical input names
pub const SITE_PATH: &str = "sitePath";
pub const DNS_ZONE_NAME: &str = "dnsZoneName";
pub const DOMAIN_RESOURCE_GROUP: &str = "domainResourceGroup";
pub const ERROR_DOCUMENT: &str = "errorDocument";
pub const INDEX_DOCUMENT: &str = "indexDocument";
pub const SUBDOMAIN: &str = "subdomain";
pub const WITH_CDN: &str = "withCDN";

// Canonical output names
pub const ORIGIN_URL: &str = "originURL";
pub const CDN_URL: &str = "cdnURL";
pub const CUSTOM_DOMAIN_URL: &str = "customDomainURL";
pub const RESOURCE_GROUP_NAME: &str = "resourceGroupName";

/// Attribute schema of the Website resource
pub fn website_schema() -> ResourceSchema {
    ResourceSchema::new(WEBSITE_TYPE)
        .with_description("Azure Storage static website with optional CDN and custom domain")
        .attribute(
            AttributeSchema::new(SITE_PATH, AttributeType::String)
                .required()
                .with_alias("site_path")
                .with_description("Local directory whose contents are published"),
        )
        .attribute(
            AttributeSchema::new(DNS_ZONE_NAME, AttributeType::String)
                .with_alias("dns_zone_name")
                .with_description("DNS zone for the custom domain"),
        )
        .attribute(
            AttributeSchema::new(DOMAIN_RESOURCE_GROUP, AttributeType::String)
                .with_alias("domain_resource_group")
                .with_description("Resource group that owns the DNS zone"),
        )
        .attribute(
            AttributeSchema::new(ERROR_DOCUMENT, AttributeType::String)
                .with_alias("error_document"),
        )
        .attribute(
            AttributeSchema::new(INDEX_DOCUMENT, AttributeType::String)
                .with_alias("index_document"),
        )
        .attribute(
            AttributeSchema::new(SUBDOMAIN, AttributeType::String)
                .with_description("Host name within the zone; the apex when absent"),
        )
        .attribute(
            AttributeSchema::new(WITH_CDN, AttributeType::Bool)
                .with_alias("with_cdn")
                .with_alias("withCdn"),
        )
        .attribute(AttributeSchema::new(ORIGIN_URL, AttributeType::String).output())
        .attribute(AttributeSchema::new(CDN_URL, AttributeType::String).output())
        .attribute(AttributeSchema::new(CUSTOM_DOMAIN_URL, AttributeType::String).output())
        .attribute(AttributeSchema::new(RESOURCE_GROUP_NAME, AttributeType::String).output())
}

/// Caller-facing arguments
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WebsiteArgs {
    #[serde(default, alias = "site_path")]
    pub site_path: Option<String>,
    #[serde(default, alias = "dns_zone_name", skip_serializing_if = "Option::is_none")]
    pub dns_zone_name: Option<String>,
    #[serde(default, alias = "domain_resource_group", skip_serializing_if = "Option::is_none")]
    pub domain_resource_group: Option<String>,
    #[serde(default, alias = "error_document", skip_serializing_if = "Option::is_none")]
    pub error_document: Option<String>,
    #[serde(default, alias = "index_document", skip_serializing_if = "Option::is_none")]
    pub index_document: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subdomain: Option<String>,
    #[serde(
        default,
        rename = "withCDN",
        alias = "with_cdn",
        alias = "withCdn",
        skip_serializing_if = "Option::is_none"
    )]
    pub with_cdn: Option<bool>,
}

impl WebsiteArgs {
    pub fn new(site_path: impl Into<String>) -> Self {
        Self {
            site_path: Some(site_path.into()),
            ..Self::default()
        }
    }

    pub fn dns_zone_name(mut self, zone: impl Into<String>) -> Self {
        self.dns_zone_name = Some(zone.into());
        self
    }

    pub fn domain_resource_group(mut self, group: impl Into<String>) -> Self {
        self.domain_resource_group = Some(group.into());
        self
    }

    pub fn error_document(mut self, document: impl Into<String>) -> Self {
        self.error_document = Some(document.into());
        self
    }

    pub fn index_document(mut self, document: impl Into<String>) -> Self {
        self.index_document = Some(document.into());
        self
    }

    pub fn subdomain(mut self, subdomain: impl Into<String>) -> Self {
        self.subdomain = Some(subdomain.into());
        self
    }

    pub fn with_cdn(mut self, with_cdn: bool) -> Self {
        self.with_cdn = Some(with_cdn);
        self
    }

    /// Normalize into a validated spec
    pub fn into_spec(self) -> Result<WebsiteSpec, ValidationError> {
        let site_path = self
            .site_path
            .ok_or_else(|| ValidationError::MissingRequired(SITE_PATH.to_string()))?;
        Ok(WebsiteSpec {
            site_path,
            dns_zone_name: self.dns_zone_name,
            domain_resource_group: self.domain_resource_group,
            error_document: self.error_document,
            index_document: self.index_document,
            subdomain: self.subdomain,
            with_cdn: self.with_cdn.unwrap_or(false),
        })
    }
}

/// Desired state of one Website
#[derive(Debug, Clone, PartialEq)]
pub struct WebsiteSpec {
    pub site_path: String,
    pub dns_zone_name: Option<String>,
    pub domain_resource_group: Option<String>,
    pub error_document: Option<String>,
    pub index_document: Option<String>,
    pub subdomain: Option<String>,
    pub with_cdn: bool,
}

impl WebsiteSpec {
    /// Build from a raw property map using canonical names or aliases
    pub fn from_properties(properties: &PropertyMap) -> Result<Self, ValidationError> {
        let schema = website_schema();
        let canonical = schema.canonicalize(properties)?;
        schema.validate(&canonical)?;
        Self::from_attributes(&canonical)
    }

    /// Build from canonical attributes that already passed the schema
    pub fn from_attributes(attributes: &PropertyMap) -> Result<Self, ValidationError> {
        let text = |name: &str| {
            attributes
                .get(name)
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        let site_path =
            text(SITE_PATH).ok_or_else(|| ValidationError::MissingRequired(SITE_PATH.to_string()))?;
        Ok(Self {
            site_path,
            dns_zone_name: text(DNS_ZONE_NAME),
            domain_resource_group: text(DOMAIN_RESOURCE_GROUP),
            error_document: text(ERROR_DOCUMENT),
            index_document: text(INDEX_DOCUMENT),
            subdomain: text(SUBDOMAIN),
            with_cdn: attributes
                .get(WITH_CDN)
                .and_then(Value::as_bool)
                .unwrap_or(false),
        })
    }

    /// Canonical attributes sent across the registration boundary.
    ///
    /// Absent optionals are omitted so the provider applies its defaults.
    pub fn to_attributes(&self) -> PropertyMap {
        let mut attributes = PropertyMap::new();
        attributes.insert(SITE_PATH.to_string(), Value::string(&self.site_path));
        let optionals = [
            (DNS_ZONE_NAME, &self.dns_zone_name),
            (DOMAIN_RESOURCE_GROUP, &self.domain_resource_group),
            (ERROR_DOCUMENT, &self.error_document),
            (INDEX_DOCUMENT, &self.index_document),
            (SUBDOMAIN, &self.subdomain),
        ];
        for (name, value) in optionals {
            if let Some(value) = value {
                attributes.insert(name.to_string(), Value::string(value));
            }
        }
        attributes.insert(WITH_CDN.to_string(), Value::Bool(self.with_cdn));
        attributes
    }

    pub fn index_document_or_default(&self) -> &str {
        self.index_document.as_deref().unwrap_or(DEFAULT_INDEX_DOCUMENT)
    }

    pub fn error_document_or_default(&self) -> &str {
        self.error_document.as_deref().unwrap_or(DEFAULT_ERROR_DOCUMENT)
    }
}

impl TryFrom<WebsiteArgs> for WebsiteSpec {
    type Error = ValidationError;

    fn try_from(args: WebsiteArgs) -> Result<Self, Self::Error> {
        args.into_spec()
    }
}

/// Computed outputs of one Website
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebsiteState {
    #[serde(rename = "originURL")]
    pub origin_url: String,
    #[serde(rename = "cdnURL", default, skip_serializing_if = "Option::is_none")]
    pub cdn_url: Option<String>,
    #[serde(rename = "customDomainURL", default, skip_serializing_if = "Option::is_none")]
    pub custom_domain_url: Option<String>,
    #[serde(rename = "resourceGroupName")]
    pub resource_group_name: String,
}

impl WebsiteState {
    pub fn to_outputs(&self) -> PropertyMap {
        let mut outputs = PropertyMap::new();
        outputs.insert(ORIGIN_URL.to_string(), Value::string(&self.origin_url));
        if let Some(url) = &self.cdn_url {
            outputs.insert(CDN_URL.to_string(), Value::string(url));
        }
        if let Some(url) = &self.custom_domain_url {
            outputs.insert(CUSTOM_DOMAIN_URL.to_string(), Value::string(url));
        }
        outputs.insert(
            RESOURCE_GROUP_NAME.to_string(),
            Value::string(&self.resource_group_name),
        );
        outputs
    }

    /// Read the output record back; `urn` is only used in error reports
    pub fn from_outputs(urn: &str, outputs: &PropertyMap) -> Result<Self, OutputError> {
        Ok(Self {
            origin_url: required_output(urn, outputs, ORIGIN_URL)?,
            cdn_url: optional_output(urn, outputs, CDN_URL)?,
            custom_domain_url: optional_output(urn, outputs, CUSTOM_DOMAIN_URL)?,
            resource_group_name: required_output(urn, outputs, RESOURCE_GROUP_NAME)?,
        })
    }
}

pub(crate) fn required_output(
    urn: &str,
    outputs: &PropertyMap,
    name: &str,
) -> Result<String, OutputError> {
    optional_output(urn, outputs, name)?.ok_or_else(|| OutputError::Malformed {
        urn: urn.to_string(),
        name: name.to_string(),
    })
}

pub(crate) fn optional_output(
    urn: &str,
    outputs: &PropertyMap,
    name: &str,
) -> Result<Option<String>, OutputError> {
    match outputs.get(name) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(OutputError::Malformed {
            urn: urn.to_string(),
            name: name.to_string(),
        }),
    }
}
