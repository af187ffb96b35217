//! Component - The Website resource handle
//!
//! Constructing a `Website` validates its arguments, registers it with the
//! orchestrator reached through the `Context`, and returns immediately with
//! deferred outputs.

use crate::engine::{Context, Urn};
use crate::error::Error;
use crate::options::ResourceOptions;
use crate::output::{Output, Resolution};
use crate::resource::PropertyMap;
use crate::website::{
    self, CDN_URL, CUSTOM_DOMAIN_URL, ORIGIN_URL, RESOURCE_GROUP_NAME, WEBSITE_TYPE, WebsiteArgs,
    WebsiteSpec, WebsiteState,
};

/// A registered Website
#[derive(Debug, Clone)]
pub struct Website {
    urn: Urn,
    name: String,
    resolution: Resolution,
}

impl Website {
    /// Register a Website from typed arguments
    pub fn new(
        ctx: &Context,
        name: &str,
        args: WebsiteArgs,
        opts: ResourceOptions,
    ) -> Result<Self, Error> {
        check_options(&opts, false)?;
        let spec = args.into_spec()?;
        Self::register(ctx, name, &spec, &opts)
    }

    /// Register a Website from a raw property map (canonical names or aliases)
    pub fn from_properties(
        ctx: &Context,
        name: &str,
        properties: &PropertyMap,
        opts: ResourceOptions,
    ) -> Result<Self, Error> {
        check_options(&opts, true)?;
        let spec = WebsiteSpec::from_properties(properties)?;
        Self::register(ctx, name, &spec, &opts)
    }

    fn register(
        ctx: &Context,
        name: &str,
        spec: &WebsiteSpec,
        opts: &ResourceOptions,
    ) -> Result<Self, Error> {
        let (urn, resolution) =
            ctx.register_resource(WEBSITE_TYPE, name, spec.to_attributes(), opts)?;
        Ok(Self {
            urn,
            name: name.to_string(),
            resolution,
        })
    }

    pub fn urn(&self) -> &Urn {
        &self.urn
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Storage static-website endpoint
    pub fn origin_url(&self) -> Output<String> {
        self.resolution
            .output(|urn, outputs| website::required_output(urn, outputs, ORIGIN_URL))
    }

    /// CDN endpoint URL; `None` when the site is not served through a CDN
    pub fn cdn_url(&self) -> Output<Option<String>> {
        self.resolution
            .output(|urn, outputs| website::optional_output(urn, outputs, CDN_URL))
    }

    /// Custom domain URL; `None` when no DNS zone was given
    pub fn custom_domain_url(&self) -> Output<Option<String>> {
        self.resolution
            .output(|urn, outputs| website::optional_output(urn, outputs, CUSTOM_DOMAIN_URL))
    }

    pub fn resource_group_name(&self) -> Output<String> {
        self.resolution
            .output(|urn, outputs| website::required_output(urn, outputs, RESOURCE_GROUP_NAME))
    }

    /// All outputs at once
    pub fn state(&self) -> Output<WebsiteState> {
        self.resolution.output(WebsiteState::from_outputs)
    }
}

fn check_options(opts: &ResourceOptions, raw_properties: bool) -> Result<(), Error> {
    match (&opts.id, raw_properties) {
        (Some(_), true) => Err(Error::configuration(
            "a property override and opts.id are mutually exclusive",
        )),
        (Some(_), false) => Err(Error::configuration(
            "component resources do not support opts.id",
        )),
        (None, _) => Ok(()),
    }
}
