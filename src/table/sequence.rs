//! Gap-filling builders for ordered dimensions
//!
//! Some tables are read as a continuous axis (one row per day, say). A
//! sequence builder remembers which keys it saw and, when finalized, adds a
//! zero-fact row for every key between the smallest and largest seen.

use crate::keys::SurrogateKey;
use crate::scope::ProcessingScope;
use crate::table::builder::{TableBuilder, TableDataBuilder};
use crate::table::fields::{date_parts, DATE_PART_NAMES};
use crate::table::schema::{Row, TableSchema};
use crate::value::Value;
use chrono::{Days, NaiveDate};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::hash::Hash;
use std::sync::Arc;
use tracing::{debug, warn};

/// An ordered, enumerable key space read from table rows
pub trait SequenceDomain: Send + Sync {
    type Key: Clone + Eq + Hash + Send + std::fmt::Debug;

    /// Sequence key of a row, `None` if the row is off the axis
    fn key_of_row(&self, schema: &TableSchema, values: &[Value]) -> Option<Self::Key>;

    /// The next key after `key`
    fn increment(&self, key: &Self::Key) -> Option<Self::Key>;

    fn compare(&self, a: &Self::Key, b: &Self::Key) -> Ordering;

    /// Write the dimension columns describing `key` into a zero row
    fn fill_key(&self, key: &Self::Key, schema: &TableSchema, values: &mut [Value]);
}

/// Consecutive days, read from the `<prefix>Date` column written by
/// [`DatePartsField`](crate::table::fields::DatePartsField)
#[derive(Debug, Clone)]
pub struct DateSequence {
    prefix: String,
}

impl DateSequence {
    pub fn new(prefix: impl Into<String>) -> Self {
        DateSequence { prefix: prefix.into() }
    }

    fn column(&self, part: &str) -> String {
        format!("{}{}", self.prefix, part)
    }
}

impl SequenceDomain for DateSequence {
    type Key = NaiveDate;

    fn key_of_row(&self, schema: &TableSchema, values: &[Value]) -> Option<NaiveDate> {
        let idx = schema.index_of(&self.column(DATE_PART_NAMES[0]))?;
        values[idx].as_date()
    }

    fn increment(&self, key: &NaiveDate) -> Option<NaiveDate> {
        key.checked_add_days(Days::new(1))
    }

    fn compare(&self, a: &NaiveDate, b: &NaiveDate) -> Ordering {
        a.cmp(b)
    }

    fn fill_key(&self, key: &NaiveDate, schema: &TableSchema, values: &mut [Value]) {
        for (part, value) in DATE_PART_NAMES.iter().zip(date_parts(*key)) {
            if let Some(idx) = schema.index_of(&self.column(part)) {
                values[idx] = value;
            }
        }
    }
}

pub struct SequenceTableDataBuilder<D: SequenceDomain> {
    inner: TableDataBuilder,
    domain: D,
    min: Option<D::Key>,
    max: Option<D::Key>,
    seen: HashSet<D::Key>,
}

impl<D: SequenceDomain> SequenceTableDataBuilder<D> {
    pub fn new(inner: TableDataBuilder, domain: D) -> Self {
        SequenceTableDataBuilder {
            inner,
            domain,
            min: None,
            max: None,
            seen: HashSet::new(),
        }
    }

    fn track(&mut self, values: &[Value]) {
        let Some(key) = self.domain.key_of_row(self.inner.schema(), values) else {
            return;
        };
        if self
            .min
            .as_ref()
            .map_or(true, |min| self.domain.compare(&key, min) == Ordering::Less)
        {
            self.min = Some(key.clone());
        }
        if self
            .max
            .as_ref()
            .map_or(true, |max| self.domain.compare(&key, max) == Ordering::Greater)
        {
            self.max = Some(key.clone());
        }
        self.seen.insert(key);
    }
}

impl<D> TableBuilder for SequenceTableDataBuilder<D>
where
    D: SequenceDomain,
{
    fn schema(&self) -> &Arc<TableSchema> {
        self.inner.schema()
    }

    fn add_from_scope(&mut self, scope: &ProcessingScope<'_>) -> usize {
        let mapper = Arc::clone(self.inner.mapper());
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
        self.track(&values);
        self.inner.add_data(values)
    }

    fn add_row(&mut self, row: Row) {
        self.track(&row.values);
        self.inner.add_row(row);
    }

    fn finalize_data(&mut self) {
        let (Some(min), Some(max)) = (self.min.clone(), self.max.clone()) else {
            return;
        };

        let schema = Arc::clone(self.inner.schema());
        let mut filled = 0usize;
        let mut current = min;
        loop {
            if !self.seen.contains(&current) {
                let mut values = schema.zero_values();
                self.domain.fill_key(&current, &schema, &mut values);
                self.inner.add_data(values);
                self.seen.insert(current.clone());
                filled += 1;
            }
            if self.domain.compare(&current, &max) != Ordering::Less {
                break;
            }
            match self.domain.increment(&current) {
                Some(next) if self.domain.compare(&next, &current) == Ordering::Greater => {
                    current = next
                }
                _ => {
                    warn!(table = schema.name(), key = ?current, "sequence stopped advancing");
                    break;
                }
            }
        }

        if filled > 0 {
            debug!(table = schema.name(), filled, "filled sequence gaps");
        }
    }

    fn take_rows(&mut self) -> Vec<Row> {
        self.min = None;
        self.max = None;
        self.seen.clear();
        self.inner.take_rows()
    }

    fn row_count(&self) -> usize {
        self.inner.row_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::Fnv1a32;
    use crate::scope::Context;
    use crate::table::fields::{DatePartsField, PathField};
    use crate::table::mapper::{FieldMapper, TableMapper};
    use crate::types::fixtures::{page, visit};

    fn daily() -> SequenceTableDataBuilder<DateSequence> {
        let fields: Vec<Box<dyn FieldMapper>> = vec![
            Box::new(DatePartsField::new("", "visit.date").unwrap()),
            Box::new(PathField::fact("Visits", "count").unwrap()),
        ];
        let mapper = Arc::new(TableMapper::new("Daily", vec![], fields).unwrap());
        SequenceTableDataBuilder::new(
            TableDataBuilder::new(mapper, Arc::new(Fnv1a32)),
            DateSequence::new(""),
        )
    }

    fn add_visit(builder: &mut SequenceTableDataBuilder<DateSequence>, day: u32) {
        let v = visit(u128::from(day), day, vec![page("A", &[])]);
        let scope = ProcessingScope::root(Context::Visit(v));
        builder.add_from_scope(&scope);
    }

    #[test]
    fn test_gap_day_gets_zero_row() {
        let mut builder = daily();
        add_visit(&mut builder, 1);
        add_visit(&mut builder, 3);
        builder.finalize_data();

        let schema = Arc::clone(builder.schema());
        let date_idx = schema.index_of("Date").unwrap();
        let visits_idx = schema.index_of("Visits").unwrap();
        let day_idx = schema.index_of("Day").unwrap();

        let mut rows = builder.take_rows();
        assert_eq!(rows.len(), 3);
        rows.sort_by_key(|r| r.values[date_idx].as_date());

        let counts: Vec<Value> = rows.iter().map(|r| r.values[visits_idx].clone()).collect();
        assert_eq!(counts, vec![Value::Int(1), Value::Int(0), Value::Int(1)]);
        assert_eq!(rows[1].values[day_idx], Value::Int(2));
        assert_eq!(
            rows[1].values[date_idx],
            Value::Date(NaiveDate::from_ymd_opt(2024, 3, 2).unwrap())
        );
    }

    #[test]
    fn test_no_gaps_adds_nothing() {
        let mut builder = daily();
        add_visit(&mut builder, 4);
        add_visit(&mut builder, 5);
        add_visit(&mut builder, 5);
        builder.finalize_data();
        assert_eq!(builder.row_count(), 2);
    }

    #[test]
    fn test_empty_builder_finalizes_to_nothing() {
        let mut builder = daily();
        builder.finalize_data();
        assert_eq!(builder.row_count(), 0);
    }

    #[test]
    fn test_merged_rows_are_tracked() {
        let mut source = daily();
        add_visit(&mut source, 1);
        add_visit(&mut source, 4);
        let rows = source.take_rows();

        let mut target = daily();
        for row in rows {
            target.add_row(row);
        }
        target.finalize_data();
        assert_eq!(target.row_count(), 4);
    }
}
