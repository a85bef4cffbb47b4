//! Per-generation bookkeeping for mutation strategies.
//!
//! A strategy is requested when a generation brings new coverage, and it is
//! only ever handed out for the generation it was produced in.

use crate::prompt::ExecutionContext;
use crate::reconciler::{MutationTargetMap, StrategyOutcome};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StrategyState {
    #[default]
    NoStrategy,
    /// A strategy for this generation has been asked for and its outcome
    /// is not recorded yet.
    Requested { generation: u64 },
    Validated {
        generation: u64,
        targets: MutationTargetMap,
    },
    Exhausted { generation: u64 },
}

impl StrategyState {
    pub fn generation(&self) -> Option<u64> {
        match self {
            StrategyState::NoStrategy => None,
            StrategyState::Requested { generation }
            | StrategyState::Validated { generation, .. }
            | StrategyState::Exhausted { generation } => Some(*generation),
        }
    }
}

#[derive(Debug, Default)]
pub struct GuidanceSchedule {
    state: StrategyState,
}

impl GuidanceSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &StrategyState {
        &self.state
    }

    /// Moves the schedule to `generation` and returns the context to request
    /// a strategy with, if one is due. The state then stays `Requested` until
    /// [`GuidanceSchedule::complete`] records the outcome.
    ///
    /// Nothing is due when this generation was already seen; a generation
    /// without new coverage drops any earlier map.
    pub fn begin<'c>(
        &mut self,
        generation: u64,
        coverage: Option<&'c ExecutionContext>,
    ) -> Option<&'c ExecutionContext> {
        if self.state.generation() == Some(generation) {
            return None;
        }
        match coverage {
            Some(context) => {
                self.state = StrategyState::Requested { generation };
                Some(context)
            }
            None => {
                self.state = StrategyState::NoStrategy;
                None
            }
        }
    }

    /// Records the outcome of the pending request. Ignored when no request
    /// is pending.
    pub fn complete(&mut self, outcome: StrategyOutcome) {
        let StrategyState::Requested { generation } = self.state else {
            return;
        };
        self.state = match outcome {
            StrategyOutcome::Validated { targets, .. } => {
                StrategyState::Validated { generation, targets }
            }
            StrategyOutcome::Exhausted { .. } => StrategyState::Exhausted { generation },
        };
    }

    /// Advances the schedule to `generation`, calling `request` at most once
    /// when a strategy is due. Returns the target map valid for
    /// `generation`, if any.
    pub fn observe<F>(
        &mut self,
        generation: u64,
        coverage: Option<&ExecutionContext>,
        request: F,
    ) -> Option<&MutationTargetMap>
    where
        F: FnOnce(&ExecutionContext) -> StrategyOutcome,
    {
        if let Some(context) = self.begin(generation, coverage) {
            let outcome = request(context);
            self.complete(outcome);
        }
        self.targets(generation)
    }

    /// The validated map for `generation`; stale maps are never returned.
    pub fn targets(&self, generation: u64) -> Option<&MutationTargetMap> {
        match &self.state {
            StrategyState::Validated {
                generation: produced,
                targets,
            } if *produced == generation => Some(targets),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validated(function: &str) -> StrategyOutcome {
        StrategyOutcome::Validated {
            targets: [(function, ["amount"])].into_iter().collect(),
            attempts: 1,
        }
    }

    #[test]
    fn requests_on_coverage_and_drops_stale_maps() {
        let mut schedule = GuidanceSchedule::new();
        let context = ExecutionContext::default();

        assert!(schedule.observe(0, None, |_| unreachable!()).is_none());
        assert_eq!(schedule.state(), &StrategyState::NoStrategy);

        let targets = schedule.observe(1, Some(&context), |_| validated("deposit"));
        assert!(targets.unwrap().is_target("deposit", "amount"));

        // Same generation again: served, no second request.
        assert!(
            schedule
                .observe(1, Some(&context), |_| unreachable!())
                .is_some()
        );

        assert!(schedule.observe(2, None, |_| unreachable!()).is_none());
        assert_eq!(schedule.state(), &StrategyState::NoStrategy);
        assert!(schedule.targets(1).is_none());
    }

    #[test]
    fn exhaustion_leaves_no_targets() {
        let mut schedule = GuidanceSchedule::new();
        let outcome = schedule.observe(3, Some(&ExecutionContext::default()), |_| {
            StrategyOutcome::Exhausted {
                attempts: 3,
                reminders: Vec::new(),
            }
        });
        assert!(outcome.is_none());
        assert_eq!(schedule.state(), &StrategyState::Exhausted { generation: 3 });
    }

    #[test]
    fn pending_request_is_visible_until_completed() {
        let mut schedule = GuidanceSchedule::new();
        let context = ExecutionContext::new("JUMPI not taken", "[]", "deposit");

        let due = schedule.begin(7, Some(&context));
        assert_eq!(due, Some(&context));
        assert_eq!(schedule.state(), &StrategyState::Requested { generation: 7 });
        assert!(schedule.targets(7).is_none());
        assert!(schedule.begin(7, Some(&context)).is_none());

        schedule.complete(validated("deposit"));
        assert!(schedule.targets(7).unwrap().is_target("deposit", "amount"));

        // Nothing pending: a stray outcome changes nothing.
        schedule.complete(StrategyOutcome::Exhausted {
            attempts: 1,
            reminders: Vec::new(),
        });
        assert!(schedule.targets(7).is_some());

        assert!(schedule.begin(8, None).is_none());
        assert_eq!(schedule.state(), &StrategyState::NoStrategy);
    }

    #[test]
    fn targets_only_for_their_generation() {
        let mut schedule = GuidanceSchedule::new();
        schedule.observe(4, Some(&ExecutionContext::default()), |_| validated("withdraw"));
        assert!(schedule.targets(4).is_some());
        assert!(schedule.targets(5).is_none());
    }
}
