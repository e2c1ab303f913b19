//! Visit sources and the filters applied while enumerating them
//!
//! A source hands out its records as independent partitions so several
//! loader threads can drain it at once. Filters are evaluated inside the
//! partition iterators; rejected visits never reach the processing queue.

pub mod filters;
pub mod json_lines;
pub mod memory;

use crate::error::Result;
use crate::types::Visit;
use chrono::NaiveDateTime;
use std::sync::Arc;

pub use filters::{DateRangeFilter, SampleFilter, SiteFilter, VisitTime};
pub use json_lines::JsonLinesSource;
pub use memory::MemorySource;

/// Admits or rejects a visit before it is processed
pub trait Filter: Send + Sync {
    fn include(&self, visit: &Visit) -> bool;

    /// Expected number of admitted visits out of `population`
    fn estimate_count(&self, population: u64) -> u64 {
        population
    }
}

/// Progress callback, invoked once per record read (before filtering)
pub type ItemLoaded = Arc<dyn Fn() + Send + Sync>;

/// One partition of a source
pub type VisitStream = Box<dyn Iterator<Item = Result<Visit>> + Send>;

pub trait DataSource: Send {
    /// Size estimate before filtering, if the source knows it cheaply
    fn count(&self) -> Option<u64>;

    fn filters(&self) -> &[Arc<dyn Filter>];

    fn filters_mut(&mut self) -> &mut Vec<Arc<dyn Filter>>;

    fn set_item_loaded(&mut self, callback: ItemLoaded);

    /// Restrict to visits whose last activity falls in `[start, end)`
    fn apply_update_filter(&mut self, start: NaiveDateTime, end: NaiveDateTime) {
        self.filters_mut()
            .push(Arc::new(DateRangeFilter::new(VisitTime::End, Some(start), Some(end))));
    }

    /// Split the records into at most `n` disjoint filtered streams
    fn partitions(&mut self, n: usize) -> Result<Vec<VisitStream>>;
}

/// Pre-flight estimate of how many visits the source will admit
pub fn estimate_count(source: &dyn DataSource) -> Option<u64> {
    let population = source.count()?;
    Some(
        source
            .filters()
            .iter()
            .fold(population, |estimate, filter| filter.estimate_count(estimate)),
    )
}

/// Wraps a raw record iterator with the filter chain and the progress callback
pub(crate) fn filtered<I>(
    records: I,
    filters: Vec<Arc<dyn Filter>>,
    on_loaded: Option<ItemLoaded>,
) -> VisitStream
where
    I: Iterator<Item = Result<Visit>> + Send + 'static,
{
    Box::new(records.filter(move |record| {
        if let Some(callback) = &on_loaded {
            callback();
        }
        match record {
            Ok(visit) => filters.iter().all(|f| f.include(visit)),
            Err(_) => true,
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::fixtures::{at, page, visit};
    use chrono::Datelike;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_update_filter_uses_visit_end() {
        let visits = (1..=5).map(|day| visit(u128::from(day), day, vec![page("A", &[])])).collect();
        let mut source = MemorySource::new(visits);
        // Visits end at 10:00 on their day
        source.apply_update_filter(at(2, 10), at(4, 10));

        let ids: Vec<u32> = source
            .partitions(1)
            .unwrap()
            .into_iter()
            .flatten()
            .map(|v| v.unwrap().info().end.day())
            .collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[test]
    fn test_item_loaded_counts_rejected_records() {
        let visits = (1..=4).map(|day| visit(u128::from(day), day, vec![page("A", &[])])).collect();
        let mut source = MemorySource::new(visits);
        source.filters_mut().push(Arc::new(SiteFilter::new(["elsewhere"])));

        let loaded = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&loaded);
        source.set_item_loaded(Arc::new(move || {
            counter.fetch_add(1, Ordering::Relaxed);
        }));

        let admitted: usize = source.partitions(2).unwrap().into_iter().map(|p| p.count()).sum();
        assert_eq!(admitted, 0);
        assert_eq!(loaded.load(Ordering::Relaxed), 4);
    }

    #[test]
    fn test_estimate_count_folds_filters() {
        let visits = (0..200).map(|i| visit(i, 1, vec![])).collect();
        let mut source = MemorySource::new(visits);
        assert_eq!(estimate_count(&source), Some(200));

        source.filters_mut().push(Arc::new(SampleFilter::new(25).unwrap()));
        assert_eq!(estimate_count(&source), Some(50));
    }
}
