//! Website Provider - Converge a Website onto Azure child resources

use std::path::PathBuf;

use azsite_core::differ::create_plan;
use azsite_core::engine::Urn;
use azsite_core::interpreter::{ApplyResult, Interpreter};
use azsite_core::plan::Plan;
use azsite_core::provider::{
    BoxFuture, ComponentProvider, ComponentState, ConvergeFailure, Provider, ProviderError,
    ProviderResult,
};
use azsite_core::resource::{PropertyMap, Resource, ResourceId, State};
use azsite_core::website::{WEBSITE_TYPE, WebsiteSpec, WebsiteState};

use crate::children::{ChildIds, desired_children};
use crate::site;

/// Azure region used when none is configured
pub const DEFAULT_LOCATION: &str = "eastus";

/// Component provider for `azure-static-website:index:Website`
pub struct WebsiteProvider<P: Provider> {
    interpreter: Interpreter<P>,
    location: String,
    base_dir: Option<PathBuf>,
}

impl<P: Provider> WebsiteProvider<P> {
    pub fn new(provider: P) -> Self {
        Self {
            interpreter: Interpreter::new(provider),
            location: DEFAULT_LOCATION.to_string(),
            base_dir: None,
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    /// Resolve relative site paths against `dir` instead of the working directory
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    /// The child resource provider
    pub fn child_provider(&self) -> &P {
        self.interpreter.provider()
    }

    fn desired(
        &self,
        urn: &str,
        inputs: &PropertyMap,
    ) -> ProviderResult<(String, WebsiteSpec, Vec<Resource>)> {
        let name = Urn::parse(urn)
            .and_then(|u| u.name().map(str::to_string))
            .ok_or_else(|| ProviderError::new(format!("malformed URN '{}'", urn)))?;
        let spec = WebsiteSpec::from_attributes(inputs)
            .map_err(|e| ProviderError::new(format!("invalid inputs for {}", urn)).with_cause(e))?;

        let root = match &self.base_dir {
            Some(base) => base.join(&spec.site_path),
            None => PathBuf::from(&spec.site_path),
        };
        let files = site::discover(&root)
            .map_err(|e| ProviderError::new(format!("cannot publish {}", urn)).with_cause(e))?;

        let children = desired_children(&name, &spec, &files, &self.location);
        Ok((name, spec, children))
    }

    /// Re-read recorded children from the cloud. Children that are gone are
    /// dropped so the plan creates them again.
    async fn refresh(&self, recorded: &[State]) -> ProviderResult<Vec<State>> {
        let provider = self.interpreter.provider();
        let mut current = Vec::with_capacity(recorded.len());
        for state in recorded {
            let Some(identifier) = state.identifier.as_deref() else {
                current.push(state.clone());
                continue;
            };
            let observed = provider.read(&state.id, identifier).await?;
            if observed.exists {
                current.push(observed);
            } else {
                log::info!("{} no longer exists", state.id);
            }
        }
        Ok(current)
    }

    fn plan(&self, desired: &[Resource], current: &[State]) -> Plan {
        let provider = self.interpreter.provider();
        create_plan(desired, current, |resource_type| provider.replace_keys(resource_type))
    }
}

/// Put converged children in the order of `desired`, leftovers last
fn order_children(desired: &[Resource], mut states: Vec<State>) -> Vec<State> {
    let mut ordered = Vec::with_capacity(states.len());
    for resource in desired {
        if let Some(pos) = states.iter().position(|s| s.id == resource.id) {
            ordered.push(states.remove(pos));
        }
    }
    ordered.extend(states);
    ordered
}

/// Outputs of a converged Website
fn website_outputs(
    name: &str,
    spec: &WebsiteSpec,
    children: &[State],
) -> ProviderResult<WebsiteState> {
    let ids = ChildIds::new(name);
    let attr = |id: &ResourceId, key: &str| -> ProviderResult<String> {
        children
            .iter()
            .find(|s| &s.id == id)
            .and_then(|s| s.get_str(key))
            .map(str::to_string)
            .ok_or_else(|| {
                ProviderError::new(format!("'{}' is not known after convergence", key))
                    .for_resource(id.clone())
            })
    };

    let resource_group_name = attr(&ids.resource_group, "name")?;
    let origin_url = attr(&ids.storage_account, "primary_web_endpoint")?;

    let cdn_url = if spec.with_cdn {
        Some(format!("https://{}", attr(&ids.cdn_endpoint, "host_name")?))
    } else {
        None
    };

    let custom_domain_url = match &spec.dns_zone_name {
        Some(_) => {
            let host = attr(&ids.dns_record_set, "host")?;
            if spec.with_cdn {
                // HTTPS is only served once the custom domain is bound
                attr(&ids.cdn_custom_domain, "name")?;
                Some(format!("https://{}", host))
            } else {
                Some(format!("http://{}", host))
            }
        }
        None => None,
    };

    Ok(WebsiteState {
        origin_url,
        cdn_url,
        custom_domain_url,
        resource_group_name,
    })
}

/// Split an apply result into the surviving children and the first failure
fn finish(desired: &[Resource], result: ApplyResult) -> (Vec<State>, Option<ProviderError>) {
    let ApplyResult {
        outcomes, states, ..
    } = result;
    let children = order_children(desired, states);
    (children, outcomes.into_iter().find_map(Result::err))
}

impl<P: Provider> ComponentProvider for WebsiteProvider<P> {
    fn resource_type(&self) -> &'static str {
        WEBSITE_TYPE
    }

    fn preview(
        &self,
        urn: String,
        inputs: PropertyMap,
        previous: Option<ComponentState>,
    ) -> BoxFuture<'_, ProviderResult<Plan>> {
        Box::pin(async move {
            let (_, _, desired) = self.desired(&urn, &inputs)?;
            let recorded = previous.map(|p| p.children).unwrap_or_default();
            let current = self.refresh(&recorded).await?;
            Ok(self.plan(&desired, &current))
        })
    }

    fn converge(
        &self,
        urn: String,
        inputs: PropertyMap,
        previous: Option<ComponentState>,
    ) -> BoxFuture<'_, Result<ComponentState, ConvergeFailure>> {
        Box::pin(async move {
            let recorded = previous.map(|p| p.children).unwrap_or_default();
            let (name, spec, desired) = match self.desired(&urn, &inputs) {
                Ok(desired) => desired,
                Err(e) => return Err(ConvergeFailure::new(e, recorded)),
            };
            let current = match self.refresh(&recorded).await {
                Ok(current) => current,
                Err(e) => return Err(ConvergeFailure::new(e, recorded)),
            };

            let plan = self.plan(&desired, &current);
            if plan.is_empty() {
                log::debug!("{} is up to date", urn);
            } else {
                log::info!("{}: {}", urn, plan.summary());
            }

            let result = self.interpreter.apply(&plan, current).await;
            let (children, error) = finish(&desired, result);
            if let Some(error) = error {
                return Err(ConvergeFailure::new(error, children));
            }

            match website_outputs(&name, &spec, &children) {
                Ok(state) => Ok(ComponentState {
                    urn,
                    resource_type: WEBSITE_TYPE.to_string(),
                    inputs,
                    outputs: state.to_outputs(),
                    children,
                }),
                Err(e) => Err(ConvergeFailure::new(e, children)),
            }
        })
    }

    fn destroy(&self, previous: ComponentState) -> BoxFuture<'_, Result<(), ConvergeFailure>> {
        Box::pin(async move {
            let plan = self.plan(&[], &previous.children);
            log::info!("{}: {}", previous.urn, plan.summary());

            let result = self.interpreter.apply(&plan, previous.children).await;
            let (children, error) = finish(&[], result);
            match error {
                Some(error) => Err(ConvergeFailure::new(error, children)),
                None => Ok(()),
            }
        })
    }
}
