//! Deduplicating table construction
//!
//! A builder owns the rows of one table for one worker. Rows are keyed by the
//! surrogate key over their dimension values and kept in ascending key order,
//! so any builder's output can be merged with another's without re-sorting.

use crate::error::Result;
use crate::keys::{KeyFactory, SurrogateKey};
use crate::scope::ProcessingScope;
use crate::table::mapper::TableMapper;
use crate::table::merge::{merge_duplicates, merge_sorted};
use crate::table::schema::{Row, TableData, TableSchema};
use crate::value::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Common surface of plain and sequence builders
pub trait TableBuilder: Send {
    fn schema(&self) -> &Arc<TableSchema>;

    /// Build and add every row `scope` produces; returns how many
    fn add_from_scope(&mut self, scope: &ProcessingScope<'_>) -> usize;

    /// Insert a row buffer, merging facts into an existing row with the same key
    fn add_data(&mut self, values: Vec<Value>) -> SurrogateKey;

    /// Insert a row whose key is already computed
    fn add_row(&mut self, row: Row);

    /// End-of-batch materialization
    fn finalize_data(&mut self);

    /// Drain the rows, ascending by key
    fn take_rows(&mut self) -> Vec<Row>;

    fn row_count(&self) -> usize;
}

pub struct TableDataBuilder {
    mapper: Arc<TableMapper>,
    keys: Arc<dyn KeyFactory>,
    rows: BTreeMap<SurrogateKey, Row>,
}

impl TableDataBuilder {
    pub fn new(mapper: Arc<TableMapper>, keys: Arc<dyn KeyFactory>) -> Self {
        TableDataBuilder {
            mapper,
            keys,
            rows: BTreeMap::new(),
        }
    }

    pub fn mapper(&self) -> &Arc<TableMapper> {
        &self.mapper
    }

    /// Fill `row` from `scope`; `false` when the scope contributes no row
    pub fn set_values(&self, scope: &ProcessingScope<'_>, row: &mut [Value]) -> bool {
        self.mapper.set_values(scope, row)
    }

    /// Surrogate key over the dimension values of `values`
    pub fn key_of(&self, values: &[Value]) -> SurrogateKey {
        let dimensions: Vec<&Value> = self
            .mapper
            .schema()
            .dimension_indices()
            .iter()
            .map(|&idx| &values[idx])
            .collect();
        self.keys.calculate_key(&dimensions)
    }

    pub fn contains(&self, key: &SurrogateKey) -> bool {
        self.rows.contains_key(key)
    }

    pub fn rows(&self) -> impl Iterator<Item = &Row> + '_ {
        self.rows.values()
    }

    pub fn into_table_data(mut self, complete: bool) -> TableData {
        TableData {
            schema: Arc::clone(self.mapper.schema()),
            rows: self.take_rows(),
            complete,
        }
    }
}

impl TableBuilder for TableDataBuilder {
    fn schema(&self) -> &Arc<TableSchema> {
        self.mapper.schema()
    }

    fn add_from_scope(&mut self, scope: &ProcessingScope<'_>) -> usize {
        let mapper = Arc::clone(&self.mapper);
        let mut added = 0;
        mapper.for_each_scope(scope, &mut |row_scope: &ProcessingScope<'_>| {
            let mut values = mapper.schema().empty_values();
            if mapper.set_values(row_scope, &mut values) {
                self.add_data(values);
                added += 1;
            }
        });
        added
    }

    fn add_data(&mut self, values: Vec<Value>) -> SurrogateKey {
        assert_eq!(
            values.len(),
            self.mapper.schema().len(),
            "row width must match schema of table '{}'",
            self.mapper.name()
        );
        let key = self.key_of(&values);
        self.add_row(Row { key, values });
        key
    }

    fn add_row(&mut self, row: Row) {
        let schema = self.mapper.schema();
        match self.rows.get_mut(&row.key) {
            Some(existing) => existing.merge_facts(&row, schema),
            None => {
                self.rows.insert(row.key, row);
            }
        }
    }

    fn finalize_data(&mut self) {}

    fn take_rows(&mut self) -> Vec<Row> {
        std::mem::take(&mut self.rows).into_values().collect()
    }

    fn row_count(&self) -> usize {
        self.rows.len()
    }
}

fn by_key(a: &Row, b: &Row) -> Ordering {
    a.key.cmp(&b.key)
}

/// Combine ascending partial outputs of one table into a single ascending,
/// duplicate-free row list.
///
/// Partials are merged pairwise in rounds, so every row is copied once per
/// round rather than once per partial.
pub fn merge_partials(schema: &TableSchema, partials: Vec<Vec<Row>>) -> Result<Vec<Row>> {
    let mut runs = partials;
    while runs.len() > 1 {
        let mut next = Vec::with_capacity((runs.len() + 1) / 2);
        let mut pending = runs.into_iter();
        while let Some(a) = pending.next() {
            match pending.next() {
                Some(b) => next.push(merge_sorted(a, b, by_key).collect()),
                None => next.push(a),
            }
        }
        runs = next;
    }

    merge_duplicates(
        runs.pop().unwrap_or_default(),
        |previous: &mut Row, current: Row| previous.merge_facts(&current, schema),
        by_key,
    )
}
