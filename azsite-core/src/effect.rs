//! Effect - A single side effect on a child resource
//!
//! Effects are values: building one does nothing. The Interpreter performs them.

use crate::resource::{Resource, ResourceId, State};

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Create(Resource),
    Update {
        id: ResourceId,
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    /// Create `to` in place of `from`, whose deletion was scheduled earlier
    /// in the plan as a `Delete` with `replaced` set
    Replace {
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    Delete {
        state: State,
        /// The resource is deleted only to be recreated by a later `Replace`
        replaced: bool,
    },
}

impl Effect {
    /// Logical id of the child resource this effect targets
    pub fn id(&self) -> &ResourceId {
        match self {
            Effect::Create(r) => &r.id,
            Effect::Update { id, .. } => id,
            Effect::Replace { to, .. } => &to.id,
            Effect::Delete { state, .. } => &state.id,
        }
    }

    /// One-character marker used when rendering plans
    pub fn symbol(&self) -> &'static str {
        match self {
            Effect::Create(_) => "+",
            Effect::Update { .. } => "~",
            Effect::Replace { .. } => "+-",
            Effect::Delete { replaced: true, .. } => "-+",
            Effect::Delete { .. } => "-",
        }
    }
}

impl std::fmt::Display for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Effect::Create(r) => write!(f, "Create {}", r.id),
            Effect::Update {
                id,
                changed_attributes,
                ..
            } => write!(f, "Update {} ({})", id, changed_attributes.join(", ")),
            Effect::Replace {
                to,
                changed_attributes,
                ..
            } => write!(f, "Replace {} ({})", to.id, changed_attributes.join(", ")),
            Effect::Delete {
                state,
                replaced: true,
            } => write!(f, "Delete {} (replacing)", state.id),
            Effect::Delete { state, .. } => write!(f, "Delete {}", state.id),
        }
    }
}
