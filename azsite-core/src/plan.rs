//! Plan - Collection of Effects
//!
//! A Plan is an ordered list of Effects to be executed.
//! No side effects occur until the Plan is applied.

use crate::effect::Effect;

/// Plan containing Effects to be executed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    effects: Vec<Effect>,
}

impl Plan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, effect: Effect) {
        self.effects.push(effect);
    }

    pub fn effects(&self) -> &[Effect] {
        &self.effects
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    /// Generate a summary of the Plan for display
    pub fn summary(&self) -> PlanSummary {
        let mut summary = PlanSummary::default();
        for effect in &self.effects {
            match effect {
                Effect::Create(_) => summary.create += 1,
                Effect::Update { .. } => summary.update += 1,
                Effect::Replace { .. } => summary.replace += 1,
                // Counted once, as the Replace that follows it
                Effect::Delete { replaced: true, .. } => {}
                Effect::Delete { .. } => summary.delete += 1,
            }
        }
        summary
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PlanSummary {
    pub create: usize,
    pub update: usize,
    pub replace: usize,
    pub delete: usize,
}

impl PlanSummary {
    pub fn total(&self) -> usize {
        self.create + self.update + self.replace + self.delete
    }
}

impl std::ops::AddAssign for PlanSummary {
    fn add_assign(&mut self, other: Self) {
        self.create += other.create;
        self.update += other.update;
        self.replace += other.replace;
        self.delete += other.delete;
    }
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Plan: {} to create, {} to update, {} to replace, {} to delete",
            self.create, self.update, self.replace, self.delete
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{Resource, ResourceId, State};

    #[test]
    fn empty_plan() {
        let plan = Plan::new();
        assert!(plan.is_empty());
        assert_eq!(plan.summary().total(), 0);
    }

    #[test]
    fn plan_summary() {
        let mut plan = Plan::new();
        plan.add(Effect::Create(Resource::new("blob", "a")));
        plan.add(Effect::Create(Resource::new("blob", "b")));
        plan.add(Effect::Delete {
            state: State::existing(ResourceId::new("cdn_profile", "c"), Default::default()),
            replaced: false,
        });
        plan.add(Effect::Delete {
            state: State::existing(ResourceId::new("dns_record_set", "d"), Default::default()),
            replaced: true,
        });

        let summary = plan.summary();
        assert_eq!(summary.create, 2);
        assert_eq!(summary.delete, 1);
        assert_eq!(
            summary.to_string(),
            "Plan: 2 to create, 0 to update, 0 to replace, 1 to delete"
        );
    }

    #[test]
    fn summaries_accumulate() {
        let mut total = PlanSummary::default();
        total += PlanSummary {
            create: 1,
            update: 2,
            replace: 0,
            delete: 0,
        };
        total += PlanSummary {
            create: 0,
            update: 1,
            replace: 1,
            delete: 3,
        };
        assert_eq!(total.total(), 8);
        assert_eq!(total.update, 3);
    }
}
