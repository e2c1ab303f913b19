//! Splitters fan one scope out into several row-producing scopes
//!
//! A splitter never mutates the record it splits. Each branch carries the
//! contexts to push for it, typically a [`SplitInfo`] naming the branch and a
//! [`Visit`] view restricted to the branch's pages.

pub mod condition;
pub mod exposure;
pub mod funnel;

use crate::scope::{Context, EventRef, PageRef, ProcessingScope};
use crate::types::Visit;

pub use condition::{Condition, ConditionChainSplitter, PageCondition, PageEventCondition};
pub use exposure::{TestExposureFields, TestVariable};
pub use funnel::{FunnelSplitter, FunnelStepDefinition};

/// Contexts pushed, in order, for one branch
#[derive(Debug, Clone)]
pub struct Branch {
    pub contexts: Vec<Context>,
}

impl Branch {
    pub fn new(contexts: Vec<Context>) -> Self {
        Branch { contexts }
    }
}

/// Produces the branches of a scope.
///
/// The returned iterator is lazy and single-pass. A scope without the context
/// a splitter needs yields no branches.
pub trait Splitter: Send + Sync {
    fn splits<'a>(
        &'a self,
        scope: &'a ProcessingScope<'_>,
    ) -> Box<dyn Iterator<Item = Branch> + 'a>;
}

/// One branch per page of the current visit
#[derive(Debug, Clone, Copy, Default)]
pub struct PagesSplitter;

impl Splitter for PagesSplitter {
    fn splits<'a>(
        &'a self,
        scope: &'a ProcessingScope<'_>,
    ) -> Box<dyn Iterator<Item = Branch> + 'a> {
        let Some(visit) = scope.current::<Visit>() else {
            return Box::new(std::iter::empty());
        };
        let pages = visit.pages().clone();
        Box::new(
            (0..pages.len())
                .filter_map(move |idx| PageRef::new(pages.clone(), idx))
                .map(|page| Branch::new(vec![Context::Page(page)])),
        )
    }
}

/// One branch per page event of the current visit, in page order
#[derive(Debug, Clone, Copy, Default)]
pub struct PageEventsSplitter;

impl Splitter for PageEventsSplitter {
    fn splits<'a>(
        &'a self,
        scope: &'a ProcessingScope<'_>,
    ) -> Box<dyn Iterator<Item = Branch> + 'a> {
        let Some(visit) = scope.current::<Visit>() else {
            return Box::new(std::iter::empty());
        };
        let pages = visit.pages().clone();
        Box::new(
            (0..pages.len())
                .filter_map(move |idx| PageRef::new(pages.clone(), idx))
                .flat_map(|page| {
                    let count = page.page().events.len();
                    (0..count).filter_map(move |idx| {
                        let event = EventRef::new(page.clone(), idx)?;
                        Some(Branch::new(vec![
                            Context::Page(page.clone()),
                            Context::PageEvent(event),
                        ]))
                    })
                }),
        )
    }
}
