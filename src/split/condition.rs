//! Condition-chain splitting: pages before and after a sequence of matches
//!
//! The chain holds one active condition at a time. Walking the pages in
//! order, a page matching the active condition advances the chain, so
//! `n` conditions partition the pages into `n + 1` buckets.

use crate::error::{ExtractError, Result};
use crate::scope::{Context, EventRef, PageRef, ProcessingScope, SplitInfo};
use crate::source::Filter;
use crate::split::{Branch, Splitter};
use crate::types::{Page, Visit};
use tracing::trace;

/// A test applied to one page.
///
/// `scope` is `None` during estimation passes; conditions then compare
/// against their configured value only.
pub trait Condition: Send + Sync {
    fn matches(&self, scope: Option<&ProcessingScope<'_>>, page: &Page) -> bool;
}

/// Page raised a given event. Without a configured id, the event in the
/// ambient scope is used.
#[derive(Debug, Clone, Default)]
pub struct PageEventCondition {
    pub event_id: Option<String>,
}

impl PageEventCondition {
    pub fn new(event_id: impl Into<String>) -> Self {
        PageEventCondition {
            event_id: Some(event_id.into()),
        }
    }
}

impl Condition for PageEventCondition {
    fn matches(&self, scope: Option<&ProcessingScope<'_>>, page: &Page) -> bool {
        let ambient = scope
            .and_then(|s| s.current::<EventRef>())
            .map(|e| e.event().event_id.as_str());
        match self.event_id.as_deref().or(ambient) {
            Some(event_id) => page.has_event(event_id),
            None => false,
        }
    }
}

/// Page shows a given item. Without a configured id, the page in the ambient
/// scope is used ("pages before this page").
#[derive(Debug, Clone, Default)]
pub struct PageCondition {
    pub item_id: Option<String>,
}

impl PageCondition {
    pub fn new(item_id: impl Into<String>) -> Self {
        PageCondition {
            item_id: Some(item_id.into()),
        }
    }
}

impl Condition for PageCondition {
    fn matches(&self, scope: Option<&ProcessingScope<'_>>, page: &Page) -> bool {
        let ambient = scope
            .and_then(|s| s.current::<PageRef>())
            .map(|p| p.page().item_id.as_str());
        match self.item_id.as_deref().or(ambient) {
            Some(item_id) => page.item_id == item_id,
            None => false,
        }
    }
}

/// Splits a visit's pages into buckets around an ordered chain of conditions
pub struct ConditionChainSplitter {
    conditions: Vec<Box<dyn Condition>>,
    names: Vec<String>,
    include_match_before: bool,
    empty_if_condition_not_met: bool,
    total_name: Option<String>,
}

impl ConditionChainSplitter {
    /// `names` labels the buckets and must be one longer than `conditions`
    pub fn new(conditions: Vec<Box<dyn Condition>>, names: Vec<String>) -> Result<Self> {
        if conditions.is_empty() {
            return Err(ExtractError::config("condition splitter needs at least one condition"));
        }
        if names.len() != conditions.len() + 1 {
            return Err(ExtractError::config(format!(
                "condition splitter with {} conditions needs {} bucket names, got {}",
                conditions.len(),
                conditions.len() + 1,
                names.len()
            )));
        }
        Ok(ConditionChainSplitter {
            conditions,
            names,
            include_match_before: true,
            empty_if_condition_not_met: false,
            total_name: None,
        })
    }

    /// Single condition with `Before` / `After` buckets
    pub fn before_after(condition: Box<dyn Condition>) -> Self {
        ConditionChainSplitter {
            conditions: vec![condition],
            names: vec!["Before".to_string(), "After".to_string()],
            include_match_before: true,
            empty_if_condition_not_met: false,
            total_name: None,
        }
    }

    /// Put the matching page in the bucket before the match (default) or after
    pub fn include_match_before(mut self, value: bool) -> Self {
        self.include_match_before = value;
        self
    }

    /// Clear every bucket when the last condition never matched
    pub fn empty_if_condition_not_met(mut self, value: bool) -> Self {
        self.empty_if_condition_not_met = value;
        self
    }

    /// Also emit the unsplit visit as a last branch named `name`
    pub fn with_total(mut self, name: impl Into<String>) -> Self {
        self.total_name = Some(name.into());
        self
    }

    /// Assign pages to buckets in one walk
    pub fn buckets(&self, scope: Option<&ProcessingScope<'_>>, pages: &[Page]) -> Vec<Vec<Page>> {
        let n = self.conditions.len();
        let mut buckets: Vec<Vec<Page>> = vec![Vec::new(); n + 1];
        let mut index = 0;

        for page in pages {
            if index < n && self.conditions[index].matches(scope, page) {
                let target = if self.include_match_before { index } else { index + 1 };
                buckets[target].push(page.clone());
                index += 1;
            } else {
                buckets[index].push(page.clone());
            }
        }

        if index < n && self.empty_if_condition_not_met {
            trace!(matched = index, conditions = n, "condition chain incomplete, clearing buckets");
            buckets.iter_mut().for_each(Vec::clear);
        }

        buckets
    }
}

impl Splitter for ConditionChainSplitter {
    fn splits<'a>(
        &'a self,
        scope: &'a ProcessingScope<'_>,
    ) -> Box<dyn Iterator<Item = Branch> + 'a> {
        let Some(visit) = scope.current::<Visit>().cloned() else {
            return Box::new(std::iter::empty());
        };

        let buckets = self.buckets(Some(scope), visit.pages());
        let total = self.total_name.as_ref().map(|name| {
            Branch::new(vec![
                Context::Split(SplitInfo {
                    name: name.clone(),
                    index: self.names.len(),
                }),
                Context::Visit(visit.clone()),
            ])
        });

        let view_of = visit.clone();
        let bucket_branches = buckets.into_iter().enumerate().map(move |(index, pages)| {
            Branch::new(vec![
                Context::Split(SplitInfo {
                    name: self.names[index].clone(),
                    index,
                }),
                Context::Visit(view_of.with_pages(pages)),
            ])
        });

        Box::new(bucket_branches.chain(total))
    }
}

impl Filter for ConditionChainSplitter {
    /// Admits visits where each condition matches some page. Conditions are
    /// checked independently of each other and of page order, unlike the
    /// splitting walk.
    fn include(&self, visit: &Visit) -> bool {
        self.conditions
            .iter()
            .all(|condition| visit.pages().iter().any(|page| condition.matches(None, page)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::fixtures::{page, visit};

    fn split_items(splitter: &ConditionChainSplitter, v: Visit) -> Vec<(String, Vec<String>)> {
        let scope = ProcessingScope::root(Context::Visit(v));
        splitter
            .splits(&scope)
            .map(|branch| {
                let name = match &branch.contexts[0] {
                    Context::Split(info) => info.name.clone(),
                    _ => String::new(),
                };
                let items = match &branch.contexts[1] {
                    Context::Visit(view) => {
                        view.pages().iter().map(|p| p.item_id.clone()).collect()
                    }
                    _ => Vec::new(),
                };
                (name, items)
            })
            .collect()
    }

    fn abc() -> Visit {
        visit(1, 1, vec![page("A", &[]), page("B", &["goal"]), page("C", &[])])
    }

    #[test]
    fn test_match_goes_before() {
        let splitter = ConditionChainSplitter::before_after(Box::new(PageCondition::new("B")));
        let out = split_items(&splitter, abc());
        assert_eq!(
            out,
            vec![
                ("Before".to_string(), vec!["A".to_string(), "B".to_string()]),
                ("After".to_string(), vec!["C".to_string()]),
            ]
        );
    }

    #[test]
    fn test_match_goes_after() {
        let splitter =
            ConditionChainSplitter::before_after(Box::new(PageEventCondition::new("goal")))
                .include_match_before(false);
        let out = split_items(&splitter, abc());
        assert_eq!(out[0].1, vec!["A"]);
        assert_eq!(out[1].1, vec!["B", "C"]);
    }

    #[test]
    fn test_unmet_condition_empties_buckets_but_not_total() {
        let splitter = ConditionChainSplitter::before_after(Box::new(PageCondition::new("Z")))
            .empty_if_condition_not_met(true)
            .with_total("Total");
        let v = abc();
        let out = split_items(&splitter, v.clone());

        assert_eq!(out.len(), 3);
        assert!(out[0].1.is_empty());
        assert!(out[1].1.is_empty());
        assert_eq!(out[2].0, "Total");
        assert_eq!(out[2].1, vec!["A", "B", "C"]);

        // The record being split is left as it was
        assert_eq!(v.page_count(), 3);
    }

    #[test]
    fn test_unmet_condition_kept_without_flag() {
        let splitter = ConditionChainSplitter::before_after(Box::new(PageCondition::new("Z")));
        let out = split_items(&splitter, abc());
        assert_eq!(out[0].1, vec!["A", "B", "C"]);
        assert!(out[1].1.is_empty());
    }

    #[test]
    fn test_chain_of_two_conditions() {
        let splitter = ConditionChainSplitter::new(
            vec![Box::new(PageCondition::new("B")), Box::new(PageCondition::new("D"))],
            vec!["Start".to_string(), "Middle".to_string(), "End".to_string()],
        )
        .unwrap();
        let v = visit(
            1,
            1,
            vec![page("A", &[]), page("B", &[]), page("C", &[]), page("D", &[]), page("E", &[])],
        );
        let out = split_items(&splitter, v);
        assert_eq!(out[0].1, vec!["A", "B"]);
        assert_eq!(out[1].1, vec!["C", "D"]);
        assert_eq!(out[2].1, vec!["E"]);
    }

    #[test]
    fn test_view_aggregates_follow_bucket() {
        let splitter = ConditionChainSplitter::before_after(Box::new(PageCondition::new("B")));
        let scope = ProcessingScope::root(Context::Visit(abc()));
        let values: Vec<i64> = splitter
            .splits(&scope)
            .map(|branch| match &branch.contexts[1] {
                Context::Visit(view) => view.value(),
                _ => -1,
            })
            .collect();
        assert_eq!(values, vec![10, 0]);
    }

    #[test]
    fn test_ambient_page_and_null_scope() {
        let condition = PageCondition::default();
        let v = abc();
        let root = ProcessingScope::root(Context::Visit(v.clone()));
        let page_scope = root.push(Context::Page(PageRef::new(v.pages().clone(), 1).unwrap()));

        assert!(condition.matches(Some(&page_scope), &v.pages()[1]));
        assert!(!condition.matches(Some(&page_scope), &v.pages()[0]));
        // Estimation pass: nothing configured, nothing ambient
        assert!(!condition.matches(None, &v.pages()[1]));

        let configured = PageCondition::new("C");
        assert!(configured.matches(None, &v.pages()[2]));
    }

    #[test]
    fn test_filter_path_ignores_order() {
        // Conditions matched out of order: the split walk never completes the
        // chain, the filter still admits the visit.
        let splitter = ConditionChainSplitter::new(
            vec![Box::new(PageCondition::new("C")), Box::new(PageCondition::new("A"))],
            vec!["1".to_string(), "2".to_string(), "3".to_string()],
        )
        .unwrap()
        .empty_if_condition_not_met(true);
        let v = abc();

        assert!(splitter.include(&v));
        let buckets = splitter.buckets(None, v.pages());
        assert!(buckets.iter().all(Vec::is_empty));
    }

    #[test]
    fn test_bucket_name_count_checked() {
        let result = ConditionChainSplitter::new(
            vec![Box::new(PageCondition::new("A"))],
            vec!["Only".to_string()],
        );
        assert!(result.is_err());
    }
}
