//! Differ - Compare desired state with current state to generate a Plan
//!
//! Compares the desired child resources derived from a component's inputs
//! with the child states recorded by the previous convergence, and generates
//! the list of required Effects (Plan).

use std::collections::{HashMap, HashSet};

use crate::effect::Effect;
use crate::plan::Plan;
use crate::reference::Bindings;
use crate::resource::{PropertyMap, Resource, ResourceId, State};

/// Result of a diff operation
#[derive(Debug, Clone, PartialEq)]
pub enum Diff {
    /// Resource does not exist -> needs creation
    Create(Resource),
    /// Resource exists with mutable differences -> needs update
    Update {
        id: ResourceId,
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    /// Resource exists but an immutable attribute changed -> delete and recreate
    Replace {
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    /// Resource exists with no differences -> no action needed
    NoChange(ResourceId),
}

impl Diff {
    /// Returns whether this Diff involves a change
    pub fn is_change(&self) -> bool {
        !matches!(self, Diff::NoChange(_))
    }
}

/// Compare desired state with current state to compute a Diff
pub fn diff(desired: &Resource, current: &State, replace_keys: &[&str]) -> Diff {
    if !current.exists {
        return Diff::Create(desired.clone());
    }

    let changed = find_changed_attributes(&desired.attributes, &current.attributes);

    if changed.is_empty() {
        Diff::NoChange(desired.id.clone())
    } else if changed.iter().any(|k| replace_keys.contains(&k.as_str())) {
        Diff::Replace {
            from: current.clone(),
            to: desired.clone(),
            changed_attributes: changed,
        }
    } else {
        Diff::Update {
            id: desired.id.clone(),
            from: current.clone(),
            to: desired.clone(),
            changed_attributes: changed,
        }
    }
}

/// Find changed attributes between desired and current state
///
/// Only desired keys are compared; attributes the cloud computes on its own
/// (names, endpoints) live only in the current state and never count.
fn find_changed_attributes(desired: &PropertyMap, current: &PropertyMap) -> Vec<String> {
    let mut changed = Vec::new();

    for (key, desired_value) in desired {
        match current.get(key) {
            Some(current_value) if current_value == desired_value => {}
            _ => changed.push(key.clone()),
        }
    }

    changed.sort();
    changed
}

/// Compute a Plan that takes `current` (in creation order) to `desired`
/// (in dependency order).
///
/// All deletions come first, newest first: children that are no longer
/// desired and the old halves of replacements. Creates, updates and the new
/// halves of replacements follow in dependency order. References are
/// resolved against the current states; once a child is scheduled for
/// creation or replacement its computed attributes are no longer known, so
/// dependents that refer to them are planned as changes too.
pub fn create_plan<F>(desired: &[Resource], current: &[State], replace_keys: F) -> Plan
where
    F: Fn(&str) -> &'static [&'static str],
{
    let current_by_id: HashMap<&ResourceId, &State> = current.iter().map(|s| (&s.id, s)).collect();
    let mut bindings = Bindings::from_states(current);
    let mut forward = Vec::new();
    let mut replaced: HashSet<ResourceId> = HashSet::new();

    for resource in desired {
        let current = current_by_id
            .get(&resource.id)
            .map(|s| (*s).clone())
            .unwrap_or_else(|| State::not_found(resource.id.clone()));

        let resolved = bindings.resolve(resource);
        match diff(&resolved, &current, replace_keys(&resource.id.resource_type)) {
            Diff::Create(_) => {
                bindings.forget(&resource.id);
                forward.push(Effect::Create(resource.clone()));
            }
            Diff::Replace {
                from,
                changed_attributes,
                ..
            } => {
                bindings.forget(&resource.id);
                replaced.insert(resource.id.clone());
                forward.push(Effect::Replace {
                    from,
                    to: resource.clone(),
                    changed_attributes,
                });
            }
            Diff::Update {
                id,
                from,
                changed_attributes,
                ..
            } => {
                forward.push(Effect::Update {
                    id,
                    from,
                    to: resource.clone(),
                    changed_attributes,
                });
            }
            Diff::NoChange(_) => {}
        }
    }

    let desired_ids: HashSet<&ResourceId> = desired.iter().map(|r| &r.id).collect();
    let mut plan = Plan::new();
    for state in current.iter().rev() {
        if !state.exists {
            continue;
        }
        if replaced.contains(&state.id) {
            plan.add(Effect::Delete {
                state: state.clone(),
                replaced: true,
            });
        } else if !desired_ids.contains(&state.id) {
            plan.add(Effect::Delete {
                state: state.clone(),
                replaced: false,
            });
        }
    }
    for effect in forward {
        plan.add(effect);
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Value;

    fn no_replace(_: &str) -> &'static [&'static str] {
        &[]
    }

    fn state(resource_type: &str, name: &str, attrs: &[(&str, Value)]) -> State {
        let attributes = attrs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        State::existing(ResourceId::new(resource_type, name), attributes)
            .with_identifier(format!("/{}/{}", resource_type, name))
    }

    #[test]
    fn diff_create_when_not_exists() {
        let desired = Resource::new("blob", "index.html");
        let current = State::not_found(ResourceId::new("blob", "index.html"));

        let result = diff(&desired, &current, &[]);
        assert!(matches!(result, Diff::Create(_)));
    }

    #[test]
    fn diff_no_change_when_same() {
        let desired = Resource::new("static_website", "web")
            .with_attribute("index_document", Value::string("index.html"));
        let current = state(
            "static_website",
            "web",
            &[
                ("index_document", Value::string("index.html")),
                ("container_name", Value::string("$web")),
            ],
        );

        let result = diff(&desired, &current, &[]);
        assert!(matches!(result, Diff::NoChange(_)));
    }

    #[test]
    fn diff_update_when_different() {
        let desired = Resource::new("static_website", "web")
            .with_attribute("index_document", Value::string("home.html"));
        let current = state(
            "static_website",
            "web",
            &[("index_document", Value::string("index.html"))],
        );

        match diff(&desired, &current, &[]) {
            Diff::Update {
                changed_attributes, ..
            } => assert_eq!(changed_attributes, vec!["index_document".to_string()]),
            other => panic!("Expected Update, got {:?}", other),
        }
    }

    #[test]
    fn diff_replace_when_immutable_attribute_changes() {
        let desired = Resource::new("dns_record_set", "cname")
            .with_attribute("relative_record_set_name", Value::string("blog"));
        let current = state(
            "dns_record_set",
            "cname",
            &[("relative_record_set_name", Value::string("www"))],
        );

        let result = diff(&desired, &current, &["relative_record_set_name"]);
        assert!(matches!(result, Diff::Replace { .. }));
    }

    #[test]
    fn unchanged_children_produce_empty_plan() {
        let rg_id = ResourceId::new("resource_group", "rg");
        let desired = vec![
            Resource::new("resource_group", "rg")
                .with_attribute("location", Value::string("eastus")),
            Resource::new("storage_account", "account")
                .with_attribute("resource_group_name", Value::reference(&rg_id, "name")),
        ];
        let current = vec![
            state(
                "resource_group",
                "rg",
                &[
                    ("location", Value::string("eastus")),
                    ("name", Value::string("rg-1234")),
                ],
            ),
            state(
                "storage_account",
                "account",
                &[("resource_group_name", Value::string("rg-1234"))],
            ),
        ];

        let plan = create_plan(&desired, &current, no_replace);
        assert!(plan.is_empty(), "unexpected effects: {:?}", plan.effects());
    }

    #[test]
    fn removed_children_are_deleted_newest_first_before_creates() {
        let desired = vec![
            Resource::new("resource_group", "rg"),
            Resource::new("blob", "about.html"),
        ];
        let current = vec![
            state("resource_group", "rg", &[]),
            state("cdn_profile", "profile", &[]),
            state("cdn_endpoint", "endpoint", &[]),
        ];

        let plan = create_plan(&desired, &current, no_replace);
        let effects = plan.effects();
        assert_eq!(effects.len(), 3);
        assert!(matches!(&effects[0], Effect::Delete { state, replaced: false } if state.id.name == "endpoint"));
        assert!(matches!(&effects[1], Effect::Delete { state, replaced: false } if state.id.name == "profile"));
        assert!(matches!(&effects[2], Effect::Create(r) if r.id.name == "about.html"));
    }

    #[test]
    fn replacement_cascades_to_dependents() {
        let rg_id = ResourceId::new("resource_group", "rg");
        let desired = vec![
            Resource::new("resource_group", "rg")
                .with_attribute("location", Value::string("westeurope")),
            Resource::new("storage_account", "account")
                .with_attribute("resource_group_name", Value::reference(&rg_id, "name")),
        ];
        let current = vec![
            state(
                "resource_group",
                "rg",
                &[
                    ("location", Value::string("eastus")),
                    ("name", Value::string("rg-1234")),
                ],
            ),
            state(
                "storage_account",
                "account",
                &[("resource_group_name", Value::string("rg-1234"))],
            ),
        ];

        let replace = |resource_type: &str| -> &'static [&'static str] {
            match resource_type {
                "resource_group" => &["location"],
                "storage_account" => &["resource_group_name"],
                _ => &[],
            }
        };

        let plan = create_plan(&desired, &current, replace);
        let effects = plan.effects();
        assert_eq!(effects.len(), 4);
        // Old halves go first, dependents before what they depend on
        assert!(matches!(&effects[0], Effect::Delete { state, replaced: true } if state.id.name == "account"));
        assert!(matches!(&effects[1], Effect::Delete { state, replaced: true } if state.id.name == "rg"));
        assert!(matches!(&effects[2], Effect::Replace { to, .. } if to.id.name == "rg"));
        assert!(matches!(&effects[3], Effect::Replace { to, .. } if to.id.name == "account"));
        assert_eq!(plan.summary().replace, 2);
        assert_eq!(plan.summary().delete, 0);
    }
}
