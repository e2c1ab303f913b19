//! Funnel splitting: how far a visit got through an ordered list of steps

use crate::error::{ExtractError, Result};
use crate::scope::{Context, EventRef, FunnelOutcome, FunnelStep, PageRef, ProcessingScope};
use crate::split::{Branch, Splitter};
use crate::types::Visit;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A named step reached by raising any of `events`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunnelStepDefinition {
    pub name: String,
    pub events: HashSet<String>,
}

impl FunnelStepDefinition {
    pub fn new<I, S>(name: impl Into<String>, events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FunnelStepDefinition {
            name: name.into(),
            events: events.into_iter().map(Into::into).collect(),
        }
    }
}

/// Emits one `Continued` branch per step reached, then a single `Fallout`
/// branch for the first step not reached. Nothing is emitted past the fallout.
pub struct FunnelSplitter {
    steps: Vec<FunnelStepDefinition>,
}

impl FunnelSplitter {
    pub fn new(steps: Vec<FunnelStepDefinition>) -> Result<Self> {
        if steps.is_empty() {
            return Err(ExtractError::config("funnel needs at least one step"));
        }
        Ok(FunnelSplitter { steps })
    }

    fn step(&self, index: usize, outcome: FunnelOutcome) -> Context {
        Context::Funnel(FunnelStep {
            index,
            name: self.steps[index].name.clone(),
            outcome,
        })
    }
}

impl Splitter for FunnelSplitter {
    fn splits<'a>(
        &'a self,
        scope: &'a ProcessingScope<'_>,
    ) -> Box<dyn Iterator<Item = Branch> + 'a> {
        let Some(visit) = scope.current::<Visit>() else {
            return Box::new(std::iter::empty());
        };

        let mut branches = Vec::new();
        let mut reached = 0;
        for (page_idx, page) in visit.pages().iter().enumerate() {
            for (event_idx, event) in page.events.iter().enumerate() {
                let advances = self
                    .steps
                    .get(reached)
                    .is_some_and(|step| step.events.contains(&event.event_id));
                if advances {
                    let mut contexts = vec![self.step(reached, FunnelOutcome::Continued)];
                    if let Some(page_ref) = PageRef::new(visit.pages().clone(), page_idx) {
                        contexts.push(Context::Page(page_ref.clone()));
                        if let Some(event_ref) = EventRef::new(page_ref, event_idx) {
                            contexts.push(Context::PageEvent(event_ref));
                        }
                    }
                    branches.push(Branch::new(contexts));
                    reached += 1;
                }
            }
        }

        if reached < self.steps.len() {
            branches.push(Branch::new(vec![self.step(reached, FunnelOutcome::Fallout)]));
        }

        Box::new(branches.into_iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::fixtures::{page, visit};

    fn outcomes(splitter: &FunnelSplitter, v: Visit) -> Vec<(String, FunnelOutcome)> {
        let scope = ProcessingScope::root(Context::Visit(v));
        splitter
            .splits(&scope)
            .filter_map(|b| match &b.contexts[0] {
                Context::Funnel(step) => Some((step.name.clone(), step.outcome)),
                _ => None,
            })
            .collect()
    }

    fn two_steps() -> FunnelSplitter {
        FunnelSplitter::new(vec![
            FunnelStepDefinition::new("S1", ["e1"]),
            FunnelStepDefinition::new("S2", ["e2"]),
        ])
        .unwrap()
    }

    #[test]
    fn test_fallout_after_first_step() {
        let out = outcomes(&two_steps(), visit(1, 1, vec![page("A", &["e1"])]));
        assert_eq!(
            out,
            vec![
                ("S1".to_string(), FunnelOutcome::Continued),
                ("S2".to_string(), FunnelOutcome::Fallout),
            ]
        );
    }

    #[test]
    fn test_all_steps_reached() {
        let out = outcomes(&two_steps(), visit(1, 1, vec![page("A", &["e1"]), page("B", &["e2"])]));
        assert_eq!(
            out,
            vec![
                ("S1".to_string(), FunnelOutcome::Continued),
                ("S2".to_string(), FunnelOutcome::Continued),
            ]
        );
    }

    #[test]
    fn test_out_of_order_events_do_not_count() {
        let out = outcomes(&two_steps(), visit(1, 1, vec![page("A", &["e2", "e1"])]));
        assert_eq!(
            out,
            vec![
                ("S1".to_string(), FunnelOutcome::Continued),
                ("S2".to_string(), FunnelOutcome::Fallout),
            ]
        );
    }

    #[test]
    fn test_no_events_falls_out_of_first_step() {
        let out = outcomes(&two_steps(), visit(1, 1, vec![page("A", &[])]));
        assert_eq!(out, vec![("S1".to_string(), FunnelOutcome::Fallout)]);
    }

    #[test]
    fn test_continued_branch_carries_event() {
        let splitter = two_steps();
        let v = visit(1, 1, vec![page("A", &["x", "e1"])]);
        let scope = ProcessingScope::root(Context::Visit(v));
        let first = splitter.splits(&scope).next().unwrap();
        match first.contexts.last() {
            Some(Context::PageEvent(e)) => assert_eq!(e.event().event_id, "e1"),
            other => panic!("expected event context, got {:?}", other),
        }
    }
}
