use crate::error::Result;
use crate::source::{filtered, DataSource, Filter, ItemLoaded, VisitStream};
use crate::types::Visit;
use std::sync::Arc;

/// Visits held in memory, partitioned round-robin
#[derive(Default)]
pub struct MemorySource {
    visits: Vec<Visit>,
    filters: Vec<Arc<dyn Filter>>,
    on_loaded: Option<ItemLoaded>,
}

impl MemorySource {
    pub fn new(visits: Vec<Visit>) -> Self {
        MemorySource {
            visits,
            filters: Vec::new(),
            on_loaded: None,
        }
    }
}

impl DataSource for MemorySource {
    fn count(&self) -> Option<u64> {
        Some(self.visits.len() as u64)
    }

    fn filters(&self) -> &[Arc<dyn Filter>] {
        &self.filters
    }

    fn filters_mut(&mut self) -> &mut Vec<Arc<dyn Filter>> {
        &mut self.filters
    }

    fn set_item_loaded(&mut self, callback: ItemLoaded) {
        self.on_loaded = Some(callback);
    }

    fn partitions(&mut self, n: usize) -> Result<Vec<VisitStream>> {
        let n = n.max(1);
        let mut parts: Vec<Vec<Visit>> = vec![Vec::new(); n];
        for (idx, visit) in self.visits.iter().enumerate() {
            parts[idx % n].push(visit.clone());
        }

        Ok(parts
            .into_iter()
            .map(|part| {
                filtered(
                    part.into_iter().map(Ok),
                    self.filters.clone(),
                    self.on_loaded.clone(),
                )
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::fixtures::visit;
    use std::collections::HashSet;
    use ulid::Ulid;

    #[test]
    fn test_partitions_are_disjoint_and_complete() {
        let mut source = MemorySource::new((0..10).map(|i| visit(i, 1, vec![])).collect());
        let parts = source.partitions(3).unwrap();
        assert_eq!(parts.len(), 3);

        let ids: Vec<Ulid> = parts.into_iter().flatten().map(|v| v.unwrap().id()).collect();
        let unique: HashSet<Ulid> = ids.iter().copied().collect();
        assert_eq!(ids.len(), 10);
        assert_eq!(unique.len(), 10);
    }

    #[test]
    fn test_zero_partitions_means_one() {
        let mut source = MemorySource::new(vec![visit(1, 1, vec![])]);
        assert_eq!(source.partitions(0).unwrap().len(), 1);
    }
}
