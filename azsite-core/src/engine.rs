//! Engine - The registration boundary between resources and the orchestrator
//!
//! A resource registers itself by sending a `RegisterResourceRequest` to a
//! `Monitor` together with the `Resolver` for its outputs. The monitor
//! acknowledges synchronously and resolves the outputs once the provider has
//! converged the resource. `Context` carries everything a registration needs
//! (project, stack, monitor) and the set of URNs already registered in this
//! run.

use std::fmt;
use std::sync::Arc;

use dashmap::DashSet;
use serde::{Deserialize, Serialize};

use crate::error::{Error, MonitorError};
use crate::options::ResourceOptions;
use crate::output::{self, Resolution, Resolver};
use crate::resource::PropertyMap;

const URN_PREFIX: &str = "urn:pulumi:";

/// Engine-wide identity of a resource instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Urn(String);

impl Urn {
    /// Build `urn:pulumi:<stack>::<project>::<type chain>::<name>`
    pub fn new(
        stack: &str,
        project: &str,
        parent: Option<&Urn>,
        resource_type: &str,
        name: &str,
    ) -> Self {
        let type_chain = match parent.and_then(Urn::type_chain) {
            Some(parent_chain) => format!("{}${}", parent_chain, resource_type),
            None => resource_type.to_string(),
        };
        Self(format!(
            "{}{}::{}::{}::{}",
            URN_PREFIX, stack, project, type_chain, name
        ))
    }

    /// Accept a string only if it has the URN shape
    pub fn parse(s: &str) -> Option<Self> {
        let urn = Self(s.to_string());
        if urn.parts().is_some() { Some(urn) } else { None }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn parts(&self) -> Option<[&str; 4]> {
        let rest = self.0.strip_prefix(URN_PREFIX)?;
        let mut parts = rest.splitn(4, "::");
        let stack = parts.next()?;
        let project = parts.next()?;
        let chain = parts.next()?;
        let name = parts.next()?;
        if stack.is_empty() || project.is_empty() || chain.is_empty() || name.is_empty() {
            return None;
        }
        Some([stack, project, chain, name])
    }

    pub fn stack(&self) -> Option<&str> {
        self.parts().map(|p| p[0])
    }

    pub fn project(&self) -> Option<&str> {
        self.parts().map(|p| p[1])
    }

    pub fn type_chain(&self) -> Option<&str> {
        self.parts().map(|p| p[2])
    }

    /// The resource's own type, the last link of the type chain
    pub fn resource_type(&self) -> Option<&str> {
        self.type_chain()
            .and_then(|chain| chain.rsplit('$').next())
    }

    pub fn name(&self) -> Option<&str> {
        self.parts().map(|p| p[3])
    }
}

impl fmt::Display for Urn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Everything the orchestrator needs to converge one resource
#[derive(Debug, Clone, PartialEq)]
pub struct RegisterResourceRequest {
    pub urn: Urn,
    pub resource_type: String,
    pub name: String,
    pub parent: Option<Urn>,
    pub dependencies: Vec<Urn>,
    /// Canonical input properties
    pub properties: PropertyMap,
    /// Convergence happens in a provider process, not in the caller
    pub remote: bool,
    pub protect: bool,
    pub replace_on_changes: Vec<String>,
    pub delete_before_replace: bool,
    pub import_id: Option<String>,
    pub version: String,
}

/// The orchestrator's answer to a registration
#[derive(Debug, Clone, PartialEq)]
pub struct RegisterResourceAck {
    pub urn: Urn,
}

/// Handle to the orchestrator
///
/// `register_resource` returns as soon as the registration is accepted; the
/// monitor keeps `resolver` and resolves it when convergence completes.
pub trait Monitor: Send + Sync {
    fn register_resource(
        &self,
        request: RegisterResourceRequest,
        resolver: Resolver,
    ) -> Result<RegisterResourceAck, MonitorError>;
}

/// Explicit run context for registrations
#[derive(Clone)]
pub struct Context {
    project: String,
    stack: String,
    monitor: Arc<dyn Monitor>,
    registered: Arc<DashSet<Urn>>,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("project", &self.project)
            .field("stack", &self.stack)
            .field("registered", &self.registered.len())
            .finish()
    }
}

impl Context {
    pub fn new(
        project: impl Into<String>,
        stack: impl Into<String>,
        monitor: Arc<dyn Monitor>,
    ) -> Self {
        Self {
            project: project.into(),
            stack: stack.into(),
            monitor,
            registered: Arc::new(DashSet::new()),
        }
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn stack(&self) -> &str {
        &self.stack
    }

    /// URN a resource would get in this run
    pub fn urn_for(&self, resource_type: &str, name: &str, parent: Option<&Urn>) -> Urn {
        Urn::new(&self.stack, &self.project, parent, resource_type, name)
    }

    /// Whether `urn` was registered in this run
    pub fn is_registered(&self, urn: &Urn) -> bool {
        self.registered.contains(urn)
    }

    /// Register a resource and return the resolution of its outputs
    pub fn register_resource(
        &self,
        resource_type: &str,
        name: &str,
        properties: PropertyMap,
        opts: &ResourceOptions,
    ) -> Result<(Urn, Resolution), Error> {
        let urn = self.urn_for(resource_type, name, opts.parent.as_ref());

        if opts.parent.as_ref() == Some(&urn) {
            return Err(Error::configuration(format!("{} cannot be its own parent", urn)));
        }
        if opts.depends_on.contains(&urn) {
            return Err(Error::configuration(format!("{} cannot depend on itself", urn)));
        }

        if !self.registered.insert(urn.clone()) {
            return Err(Error::DuplicateResource {
                urn: urn.to_string(),
            });
        }

        let request = RegisterResourceRequest {
            urn: urn.clone(),
            resource_type: resource_type.to_string(),
            name: name.to_string(),
            parent: opts.parent.clone(),
            dependencies: opts.depends_on.clone(),
            properties,
            remote: true,
            protect: opts.protect,
            replace_on_changes: opts.replace_on_changes.clone(),
            delete_before_replace: opts.delete_before_replace,
            import_id: opts.import.clone(),
            version: opts
                .version
                .clone()
                .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string()),
        };

        let (resolver, resolution) = output::resolution(urn.as_str());
        log::debug!("Registering {}", urn);

        let ack = match self.monitor.register_resource(request, resolver) {
            Ok(ack) => ack,
            Err(e) => {
                // Nothing was accepted, so the name is free again
                self.registered.remove(&urn);
                return Err(e.into());
            }
        };

        if ack.urn != urn {
            return Err(MonitorError::MalformedAck(format!(
                "expected {}, got {}",
                urn, ack.urn
            ))
            .into());
        }

        Ok((urn, resolution))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Value;
    use std::sync::Mutex;

    /// Accepts registrations and keeps the requests and resolvers
    #[derive(Default)]
    struct RecordingMonitor {
        requests: Mutex<Vec<RegisterResourceRequest>>,
        resolvers: Mutex<Vec<Resolver>>,
    }

    impl Monitor for RecordingMonitor {
        fn register_resource(
            &self,
            request: RegisterResourceRequest,
            resolver: Resolver,
        ) -> Result<RegisterResourceAck, MonitorError> {
            let urn = request.urn.clone();
            self.requests.lock().unwrap().push(request);
            self.resolvers.lock().unwrap().push(resolver);
            Ok(RegisterResourceAck { urn })
        }
    }

    struct UnreachableMonitor;

    impl Monitor for UnreachableMonitor {
        fn register_resource(
            &self,
            _request: RegisterResourceRequest,
            _resolver: Resolver,
        ) -> Result<RegisterResourceAck, MonitorError> {
            Err(MonitorError::Unreachable("connection refused".to_string()))
        }
    }

    struct WrongAckMonitor;

    impl Monitor for WrongAckMonitor {
        fn register_resource(
            &self,
            _request: RegisterResourceRequest,
            _resolver: Resolver,
        ) -> Result<RegisterResourceAck, MonitorError> {
            Ok(RegisterResourceAck {
                urn: Urn::new("dev", "other", None, "x:y:Z", "other"),
            })
        }
    }

    const TYPE: &str = "azure-static-website:index:Website";

    fn props() -> PropertyMap {
        let mut props = PropertyMap::new();
        props.insert("sitePath".to_string(), Value::string("./dist"));
        props
    }

    #[test]
    fn urn_format_and_parts() {
        let urn = Urn::new("dev", "docs", None, TYPE, "site");
        assert_eq!(
            urn.as_str(),
            "urn:pulumi:dev::docs::azure-static-website:index:Website::site"
        );
        assert_eq!(urn.stack(), Some("dev"));
        assert_eq!(urn.project(), Some("docs"));
        assert_eq!(urn.resource_type(), Some(TYPE));
        assert_eq!(urn.name(), Some("site"));

        let child = Urn::new("dev", "docs", Some(&urn), TYPE, "child");
        assert_eq!(child.type_chain(), Some(format!("{}${}", TYPE, TYPE).as_str()));
        assert_eq!(child.resource_type(), Some(TYPE));
    }

    #[test]
    fn parse_rejects_malformed_urns() {
        assert!(Urn::parse("urn:pulumi:dev::docs::t::site").is_some());
        assert!(Urn::parse("urn:pulumi:dev::docs").is_none());
        assert!(Urn::parse("not-a-urn").is_none());
    }

    #[test]
    fn registration_sends_remote_request_with_version() {
        let monitor = Arc::new(RecordingMonitor::default());
        let ctx = Context::new("docs", "dev", monitor.clone());

        let (urn, _resolution) = ctx
            .register_resource(TYPE, "site", props(), &ResourceOptions::new().protect(true))
            .unwrap();

        let requests = monitor.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.urn, urn);
        assert_eq!(request.resource_type, TYPE);
        assert!(request.remote);
        assert!(request.protect);
        assert_eq!(request.version, env!("CARGO_PKG_VERSION"));
        assert_eq!(request.properties.get("sitePath"), Some(&Value::string("./dist")));
    }

    #[test]
    fn explicit_version_is_forwarded() {
        let monitor = Arc::new(RecordingMonitor::default());
        let ctx = Context::new("docs", "dev", monitor.clone());
        ctx.register_resource(TYPE, "site", props(), &ResourceOptions::new().version("9.9.9"))
            .unwrap();
        assert_eq!(monitor.requests.lock().unwrap()[0].version, "9.9.9");
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let monitor = Arc::new(RecordingMonitor::default());
        let ctx = Context::new("docs", "dev", monitor.clone());
        let opts = ResourceOptions::new();

        ctx.register_resource(TYPE, "site", props(), &opts).unwrap();
        let err = ctx.register_resource(TYPE, "site", props(), &opts).unwrap_err();

        assert!(matches!(err, Error::DuplicateResource { .. }));
        assert_eq!(monitor.requests.lock().unwrap().len(), 1);
    }

    #[test]
    fn self_dependency_is_a_configuration_error() {
        let ctx = Context::new("docs", "dev", Arc::new(RecordingMonitor::default()));
        let own = ctx.urn_for(TYPE, "site", None);

        let err = ctx
            .register_resource(TYPE, "site", props(), &ResourceOptions::new().depends_on(own))
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn unreachable_monitor_frees_the_name() {
        let ctx = Context::new("docs", "dev", Arc::new(UnreachableMonitor));
        let opts = ResourceOptions::new();

        let err = ctx.register_resource(TYPE, "site", props(), &opts).unwrap_err();
        assert!(matches!(
            err,
            Error::EngineCommunication(MonitorError::Unreachable(_))
        ));
        assert!(!ctx.is_registered(&ctx.urn_for(TYPE, "site", None)));
    }

    #[test]
    fn mismatched_ack_is_malformed() {
        let ctx = Context::new("docs", "dev", Arc::new(WrongAckMonitor));
        let err = ctx
            .register_resource(TYPE, "site", props(), &ResourceOptions::new())
            .unwrap_err();
        assert!(matches!(
            err,
            Error::EngineCommunication(MonitorError::MalformedAck(_))
        ));
    }
}
