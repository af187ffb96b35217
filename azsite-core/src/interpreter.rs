//! Interpreter - Execute Effects using a Provider
//!
//! The Interpreter executes Effects contained in a Plan in order,
//! collecting the results. This is where side effects actually occur.
//! References between children are re-resolved before every effect, so a
//! child created earlier in the plan feeds its computed attributes to the
//! children that depend on it.

use crate::effect::Effect;
use crate::plan::Plan;
use crate::provider::{Provider, ProviderError, ProviderResult};
use crate::reference::Bindings;
use crate::resource::{Resource, ResourceId, State};

/// Result of executing each Effect
#[derive(Debug)]
pub enum EffectOutcome {
    /// Create succeeded
    Created { state: State },
    /// Update succeeded
    Updated { state: State },
    /// Replacement created
    Replaced { state: State },
    /// Delete succeeded
    Deleted { id: ResourceId },
}

/// Result of executing the entire Plan
#[derive(Debug)]
pub struct ApplyResult {
    /// One entry per attempted effect; a failure is always the last entry
    pub outcomes: Vec<Result<EffectOutcome, ProviderError>>,
    /// Child resources that exist after the plan ran (or stopped)
    pub states: Vec<State>,
}

/// Interpreter that executes Effects using a Provider
pub struct Interpreter<P: Provider> {
    provider: P,
}

impl<P: Provider> Interpreter<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Execute a Plan against the children in `current`, causing side effects
    pub async fn apply(&self, plan: &Plan, current: Vec<State>) -> ApplyResult {
        let mut states: Vec<State> = current.into_iter().filter(|s| s.exists).collect();
        let mut bindings = Bindings::from_states(&states);
        let mut outcomes = Vec::new();

        for effect in plan.effects() {
            let result = self.execute_effect(effect, &mut bindings).await;
            let failed = match &result {
                Ok(outcome) => {
                    track(&mut states, outcome);
                    false
                }
                Err(e) => {
                    log::warn!("{} failed: {}", effect, e);
                    true
                }
            };
            outcomes.push(result);
            if failed {
                break;
            }
        }

        ApplyResult { outcomes, states }
    }

    /// Execute a single Effect
    async fn execute_effect(
        &self,
        effect: &Effect,
        bindings: &mut Bindings,
    ) -> ProviderResult<EffectOutcome> {
        log::debug!("{}", effect);

        match effect {
            Effect::Create(resource) => {
                let resolved = resolve_fully(bindings, resource)?;
                let state = self.provider.create(&resolved).await?;
                bindings.record(&state);
                Ok(EffectOutcome::Created { state })
            }
            Effect::Update { id, from, to, .. } => {
                let identifier = identifier_of(from)?;
                let resolved = resolve_fully(bindings, to)?;
                let state = self
                    .provider
                    .update(id, identifier, from, &resolved)
                    .await?;
                bindings.record(&state);
                Ok(EffectOutcome::Updated { state })
            }
            Effect::Replace { to, .. } => {
                let resolved = resolve_fully(bindings, to)?;
                let state = self.provider.create(&resolved).await?;
                bindings.record(&state);
                Ok(EffectOutcome::Replaced { state })
            }
            Effect::Delete { state, .. } => {
                let identifier = identifier_of(state)?;
                self.provider.delete(&state.id, identifier).await?;
                bindings.forget(&state.id);
                Ok(EffectOutcome::Deleted {
                    id: state.id.clone(),
                })
            }
        }
    }
}

fn identifier_of(state: &State) -> ProviderResult<&str> {
    state.identifier.as_deref().ok_or_else(|| {
        ProviderError::new("no cloud identifier recorded").for_resource(state.id.clone())
    })
}

fn resolve_fully(bindings: &Bindings, resource: &Resource) -> ProviderResult<Resource> {
    let resolved = bindings.resolve(resource);
    let mut pending: Vec<&String> = resolved
        .attributes
        .iter()
        .filter(|(_, v)| v.is_unresolved())
        .map(|(k, _)| k)
        .collect();
    if pending.is_empty() {
        return Ok(resolved);
    }
    pending.sort();
    Err(ProviderError::new(format!(
        "unresolved references in {}",
        pending
            .iter()
            .map(|k| k.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    ))
    .for_resource(resource.id.clone()))
}

/// Keep the list of existing children in step with an outcome
fn track(states: &mut Vec<State>, outcome: &EffectOutcome) {
    match outcome {
        EffectOutcome::Created { state }
        | EffectOutcome::Updated { state }
        | EffectOutcome::Replaced { state } => {
            match states.iter_mut().find(|s| s.id == state.id) {
                Some(existing) => *existing = state.clone(),
                None => states.push(state.clone()),
            }
        }
        EffectOutcome::Deleted { id } => states.retain(|s| &s.id != id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{BoxFuture, ResourceType};
    use crate::resource::Value;

    struct TestProvider;

    impl Provider for TestProvider {
        fn name(&self) -> &'static str {
            "test"
        }

        fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
            vec![]
        }

        fn read(&self, id: &ResourceId, _identifier: &str) -> BoxFuture<'_, ProviderResult<State>> {
            let id = id.clone();
            Box::pin(async move { Ok(State::not_found(id)) })
        }

        fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
            let mut attrs = resource.attributes.clone();
            attrs.insert(
                "name".to_string(),
                Value::string(format!("{}-generated", resource.id.name)),
            );
            let state = State::existing(resource.id.clone(), attrs)
                .with_identifier(format!("/test/{}", resource.id.name));
            Box::pin(async move { Ok(state) })
        }

        fn update(
            &self,
            id: &ResourceId,
            identifier: &str,
            _from: &State,
            to: &Resource,
        ) -> BoxFuture<'_, ProviderResult<State>> {
            let state = State::existing(id.clone(), to.attributes.clone()).with_identifier(identifier);
            Box::pin(async move { Ok(state) })
        }

        fn delete(&self, id: &ResourceId, _identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
            let fail = id.resource_type == "locked";
            Box::pin(async move {
                if fail {
                    Err(ProviderError::new("resource is locked"))
                } else {
                    Ok(())
                }
            })
        }
    }

    #[tokio::test]
    async fn apply_empty_plan() {
        let interpreter = Interpreter::new(TestProvider);
        let plan = Plan::new();
        let result = interpreter.apply(&plan, vec![]).await;

        assert!(result.outcomes.is_empty());
        assert!(result.states.is_empty());
    }

    #[tokio::test]
    async fn created_attributes_flow_into_dependents() {
        let interpreter = Interpreter::new(TestProvider);
        let rg = ResourceId::new("resource_group", "rg");
        let mut plan = Plan::new();
        plan.add(Effect::Create(Resource::new("resource_group", "rg")));
        plan.add(Effect::Create(
            Resource::new("storage_account", "account")
                .with_attribute("resource_group_name", Value::reference(&rg, "name")),
        ));

        let result = interpreter.apply(&plan, vec![]).await;

        assert!(result.outcomes.iter().all(Result::is_ok));
        assert_eq!(result.states.len(), 2);
        assert_eq!(
            result.states[1].get_str("resource_group_name"),
            Some("rg-generated")
        );
    }

    #[tokio::test]
    async fn unresolvable_reference_fails_and_stops() {
        let interpreter = Interpreter::new(TestProvider);
        let missing = ResourceId::new("cdn_profile", "profile");
        let mut plan = Plan::new();
        plan.add(Effect::Create(
            Resource::new("cdn_endpoint", "endpoint")
                .with_attribute("profile_name", Value::reference(&missing, "name")),
        ));
        plan.add(Effect::Create(Resource::new("blob", "index.html")));

        let result = interpreter.apply(&plan, vec![]).await;

        assert_eq!(result.outcomes.len(), 1);
        let err = result.outcomes[0].as_ref().unwrap_err();
        assert!(err.message.contains("profile_name"));
    }

    #[tokio::test]
    async fn failed_delete_keeps_state() {
        let interpreter = Interpreter::new(TestProvider);
        let locked = State::existing(ResourceId::new("locked", "x"), Default::default())
            .with_identifier("/test/x");
        let mut plan = Plan::new();
        plan.add(Effect::Delete {
            state: locked.clone(),
            replaced: false,
        });

        let result = interpreter.apply(&plan, vec![locked]).await;

        assert!(result.outcomes[0].is_err());
        assert_eq!(result.states.len(), 1);
    }
}
