//! In-process orchestrator
//!
//! `LocalOrchestrator` is the `Monitor` handed to `Context`. Every accepted
//! registration becomes a task that waits for the resources it depends on and
//! then previews or converges it through a `ComponentProvider`. Independent
//! resources run concurrently. Outputs are published through the resolver
//! that came with the registration.

use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use azsite_core::engine::{Monitor, RegisterResourceAck, RegisterResourceRequest, Urn};
use azsite_core::error::{MonitorError, OutputError};
use azsite_core::output::Resolver;
use azsite_core::plan::Plan;
use azsite_core::provider::{ComponentProvider, ComponentState, ProviderError};
use azsite_core::resource::{PropertyMap, State};
use azsite_state::{ChildState, ResourceState, StateFile};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Compute plans only; outputs of changing resources stay unknown
    Preview,
    /// Converge for real
    Apply,
}

impl Mode {
    fn phase(self) -> &'static str {
        match self {
            Mode::Preview => "preview",
            Mode::Apply => "up",
        }
    }
}

/// What happened to one registered resource
#[derive(Debug)]
pub enum Outcome {
    Planned {
        request: RegisterResourceRequest,
        plan: Plan,
        /// The whole component is recreated
        replaces: bool,
    },
    Converged {
        request: RegisterResourceRequest,
        state: ComponentState,
    },
    Failed {
        request: RegisterResourceRequest,
        error: String,
        /// Child resources that exist after the failure
        children: Vec<State>,
    },
}

impl Outcome {
    pub fn request(&self) -> &RegisterResourceRequest {
        match self {
            Outcome::Planned { request, .. }
            | Outcome::Converged { request, .. }
            | Outcome::Failed { request, .. } => request,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed { .. })
    }
}

/// A recorded resource that is no longer registered
#[derive(Debug)]
pub enum Removal {
    /// Would be destroyed (preview)
    Planned(ResourceState),
    Destroyed(ResourceState),
    Failed {
        resource: ResourceState,
        error: String,
        children: Vec<State>,
    },
}

/// Everything a run did, in registration order
#[derive(Debug, Default)]
pub struct RunReport {
    pub outcomes: Vec<Outcome>,
    /// In reverse registration order of the previous run
    pub removals: Vec<Removal>,
}

impl RunReport {
    pub fn failures(&self) -> usize {
        let removals = self
            .removals
            .iter()
            .filter(|r| matches!(r, Removal::Failed { .. }))
            .count();
        self.outcomes.iter().filter(|o| o.is_failed()).count() + removals
    }

    /// Fold what this run changed into `state`. Plans change nothing.
    pub fn record(&self, state: &mut StateFile) {
        for outcome in &self.outcomes {
            match outcome {
                Outcome::Planned { .. } => {}
                Outcome::Converged {
                    request,
                    state: component,
                } => state.upsert_resource(resource_record(request, component)),
                Outcome::Failed {
                    request, children, ..
                } => {
                    let record = match state.find_resource(request.urn.as_str()) {
                        Some(existing) => {
                            let mut record = existing.clone();
                            record.children = children.iter().map(ChildState::from_state).collect();
                            record
                        }
                        None => {
                            let component = ComponentState {
                                urn: request.urn.to_string(),
                                resource_type: request.resource_type.clone(),
                                inputs: request.properties.clone(),
                                outputs: PropertyMap::new(),
                                children: children.clone(),
                            };
                            resource_record(request, &component)
                        }
                    };
                    keep_or_forget(state, record);
                }
            }
        }

        for removal in &self.removals {
            match removal {
                Removal::Planned(_) => {}
                Removal::Destroyed(resource) => {
                    state.remove_resource(&resource.urn);
                }
                Removal::Failed {
                    resource, children, ..
                } => {
                    let mut record = resource.clone();
                    record.children = children.iter().map(ChildState::from_state).collect();
                    keep_or_forget(state, record);
                }
            }
        }
    }
}

fn resource_record(request: &RegisterResourceRequest, component: &ComponentState) -> ResourceState {
    ResourceState::from_component(&request.name, component)
        .with_parent(request.parent.as_ref().map(Urn::to_string))
        .with_dependencies(request.dependencies.iter().map(Urn::to_string).collect())
        .with_protected(request.protect)
}

/// A resource without children has nothing left in the cloud
fn keep_or_forget(state: &mut StateFile, record: ResourceState) {
    if record.children.is_empty() {
        state.remove_resource(&record.urn);
    } else {
        state.upsert_resource(record);
    }
}

struct Job {
    request: RegisterResourceRequest,
    resolver: Resolver,
}

/// `None` while running, then whether the resource succeeded
type Completion = watch::Sender<Option<bool>>;

pub struct LocalOrchestrator {
    sender: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    worker: Mutex<Option<JoinHandle<Vec<Outcome>>>>,
    provider: Arc<dyn ComponentProvider>,
    previous: Arc<Vec<ResourceState>>,
    mode: Mode,
}

impl LocalOrchestrator {
    /// Start the worker. Must be called inside a Tokio runtime.
    pub fn new(
        provider: Arc<dyn ComponentProvider>,
        previous: Vec<ResourceState>,
        mode: Mode,
    ) -> Self {
        let (sender, jobs) = mpsc::unbounded_channel();
        let previous = Arc::new(previous);
        let worker = tokio::spawn(run_worker(jobs, provider.clone(), previous.clone(), mode));
        Self {
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
            provider,
            previous,
            mode,
        }
    }

    /// Refuse further registrations
    pub fn close(&self) {
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
    }

    /// Close, then wait until every accepted registration has finished
    pub async fn finish(&self) -> Result<RunReport, String> {
        self.close();
        let worker = self
            .worker
            .lock()
            .map_err(|_| "orchestrator state is poisoned".to_string())?
            .take()
            .ok_or_else(|| "orchestrator already finished".to_string())?;

        let outcomes = worker
            .await
            .map_err(|e| format!("orchestrator worker failed: {}", e))?;
        Ok(RunReport {
            outcomes,
            removals: Vec::new(),
        })
    }

    /// Destroy (or, in preview, list) recorded resources the run did not register.
    /// Newest first.
    pub async fn remove_absent(&self, report: &mut RunReport) {
        let registered: Vec<&str> = report
            .outcomes
            .iter()
            .map(|o| o.request().urn.as_str())
            .collect();
        let absent: Vec<ResourceState> = self
            .previous
            .iter()
            .rev()
            .filter(|r| !registered.contains(&r.urn.as_str()))
            .cloned()
            .collect();

        for resource in absent {
            let removal = if resource.protected {
                Removal::Failed {
                    error: format!("{} is protected and cannot be destroyed", resource.urn),
                    children: resource.to_component().children,
                    resource,
                }
            } else if self.mode == Mode::Preview {
                Removal::Planned(resource)
            } else {
                log::info!("Destroying {}", resource.urn);
                match self.provider.destroy(resource.to_component()).await {
                    Ok(()) => Removal::Destroyed(resource),
                    Err(failure) => Removal::Failed {
                        error: failure.error.to_string(),
                        children: failure.children,
                        resource,
                    },
                }
            };
            report.removals.push(removal);
        }
    }
}

impl Monitor for LocalOrchestrator {
    fn register_resource(
        &self,
        request: RegisterResourceRequest,
        resolver: Resolver,
    ) -> Result<RegisterResourceAck, MonitorError> {
        let sender = self
            .sender
            .lock()
            .map_err(|_| MonitorError::Unreachable("orchestrator state is poisoned".to_string()))?;
        let Some(sender) = sender.as_ref() else {
            return Err(MonitorError::Unreachable(
                "orchestrator is closed".to_string(),
            ));
        };

        let urn = request.urn.clone();
        sender
            .send(Job { request, resolver })
            .map_err(|_| MonitorError::Unreachable("orchestrator worker has stopped".to_string()))?;
        log::debug!("Accepted {}", urn);
        Ok(RegisterResourceAck { urn })
    }
}

async fn run_worker(
    mut jobs: mpsc::UnboundedReceiver<Job>,
    provider: Arc<dyn ComponentProvider>,
    previous: Arc<Vec<ResourceState>>,
    mode: Mode,
) -> Vec<Outcome> {
    let completions: Arc<DashMap<Urn, Completion>> = Arc::new(DashMap::new());
    let mut tasks = Vec::new();

    while let Some(job) = jobs.recv().await {
        let urn = job.request.urn.clone();

        // Dependencies register first, so anything missing here never will
        let waits: Vec<(Urn, Option<watch::Receiver<Option<bool>>>)> = job
            .request
            .dependencies
            .iter()
            .map(|dep| (dep.clone(), completions.get(dep).map(|c| c.subscribe())))
            .collect();
        let (done, _) = watch::channel(None);
        completions.insert(urn.clone(), done);

        let recorded = previous.iter().find(|r| r.urn == urn.as_str()).cloned();
        let provider = provider.clone();
        let completions = completions.clone();
        tasks.push(tokio::spawn(async move {
            let outcome = match wait_for(waits).await {
                Ok(()) => run_job(job, recorded, provider.as_ref(), mode).await,
                Err(error) => fail(job, recorded, error),
            };
            if let Some(done) = completions.get(&urn) {
                done.send_replace(Some(!outcome.is_failed()));
            }
            outcome
        }));
    }

    let mut outcomes = Vec::with_capacity(tasks.len());
    for task in tasks {
        match task.await {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => log::error!("Resource task panicked: {}", e),
        }
    }
    outcomes
}

async fn wait_for(waits: Vec<(Urn, Option<watch::Receiver<Option<bool>>>)>) -> Result<(), String> {
    for (dep, receiver) in waits {
        let Some(mut receiver) = receiver else {
            return Err(format!("dependency {} was never registered", dep));
        };
        let succeeded = match receiver.wait_for(Option::is_some).await {
            Ok(status) => *status == Some(true),
            Err(_) => false,
        };
        if !succeeded {
            return Err(format!("dependency {} failed", dep));
        }
    }
    Ok(())
}

fn fail(job: Job, recorded: Option<ResourceState>, error: String) -> Outcome {
    let Job { request, resolver } = job;
    log::warn!("{}: {}", request.urn, error);
    resolver.resolve(Err(OutputError::convergence(
        request.urn.as_str(),
        ProviderError::new(error.clone()),
    )));
    Outcome::Failed {
        request,
        error,
        children: recorded
            .map(|r| r.to_component().children)
            .unwrap_or_default(),
    }
}

/// Whether any input named in `replace_on_changes` differs from the recorded inputs
fn needs_replacement(request: &RegisterResourceRequest, recorded: &ComponentState) -> bool {
    request
        .replace_on_changes
        .iter()
        .any(|key| request.properties.get(key) != recorded.inputs.get(key))
}

async fn run_job(
    job: Job,
    recorded: Option<ResourceState>,
    provider: &dyn ComponentProvider,
    mode: Mode,
) -> Outcome {
    if job.request.import_id.is_some() {
        return fail(job, recorded, "component resources cannot be imported".to_string());
    }

    let previous = recorded.as_ref().map(ResourceState::to_component);
    let replaces = previous
        .as_ref()
        .is_some_and(|p| needs_replacement(&job.request, p));
    if replaces && recorded.as_ref().is_some_and(|r| r.protected) {
        let error = format!("{} is protected and cannot be replaced", job.request.urn);
        return fail(job, recorded, error);
    }

    let Job { request, resolver } = job;
    let urn = request.urn.to_string();

    match mode {
        Mode::Preview => {
            let base = if replaces { None } else { previous.clone() };
            match provider.preview(urn.clone(), request.properties.clone(), base).await {
                Ok(plan) => {
                    // Unchanged resources keep their recorded outputs
                    match previous {
                        Some(previous) if plan.is_empty() && !replaces => {
                            resolver.resolve(Ok(previous.outputs))
                        }
                        _ => resolver.resolve(Err(OutputError::Unknown {
                            urn,
                            phase: mode.phase().to_string(),
                        })),
                    }
                    Outcome::Planned {
                        request,
                        plan,
                        replaces,
                    }
                }
                Err(error) => {
                    let message = error.to_string();
                    resolver.resolve(Err(OutputError::convergence(urn, error)));
                    Outcome::Failed {
                        request,
                        error: message,
                        children: previous.map(|p| p.children).unwrap_or_default(),
                    }
                }
            }
        }
        Mode::Apply => {
            let mut base = previous;
            // Child names derive from the resource name, so the old
            // children must go before the new ones are created
            if replaces && let Some(old) = base.take() {
                log::info!("Replacing {}", urn);
                if let Err(failure) = provider.destroy(old).await {
                    let message = failure.error.to_string();
                    resolver.resolve(Err(OutputError::convergence(urn, failure.error)));
                    return Outcome::Failed {
                        request,
                        error: message,
                        children: failure.children,
                    };
                }
            }

            match provider.converge(urn.clone(), request.properties.clone(), base).await {
                Ok(state) => {
                    resolver.resolve(Ok(state.outputs.clone()));
                    Outcome::Converged { request, state }
                }
                Err(failure) => {
                    let message = failure.error.to_string();
                    resolver.resolve(Err(OutputError::convergence(urn, failure.error)));
                    Outcome::Failed {
                        request,
                        error: message,
                        children: failure.children,
                    }
                }
            }
        }
    }
}
