//! Field and table mappers: how a scope becomes a row

use crate::error::{ExtractError, Result};
use crate::scope::ProcessingScope;
use crate::split::Splitter;
use crate::table::schema::{Field, TableSchema};
use crate::value::Value;
use std::ops::Range;
use std::sync::Arc;

/// Declares columns and fills them from a scope.
///
/// `values` is exactly this mapper's slice of the row, in the order of
/// [`fields`](FieldMapper::fields). Returning `false` means the scope has no
/// row for this table (for example, required context is missing).
pub trait FieldMapper: Send + Sync {
    fn fields(&self) -> Vec<Field>;

    fn set_values(&self, scope: &ProcessingScope<'_>, values: &mut [Value]) -> bool;
}

/// A table definition: row fan-out plus the field mappers filling each row
pub struct TableMapper {
    schema: Arc<TableSchema>,
    splitters: Vec<Arc<dyn Splitter>>,
    mappers: Vec<(Range<usize>, Box<dyn FieldMapper>)>,
}

impl TableMapper {
    pub fn new(
        name: impl Into<String>,
        splitters: Vec<Arc<dyn Splitter>>,
        mappers: Vec<Box<dyn FieldMapper>>,
    ) -> Result<Self> {
        let name = name.into();
        if mappers.is_empty() {
            return Err(ExtractError::config(format!("table '{}' has no fields", name)));
        }

        let mut fields = Vec::new();
        let mut ranged = Vec::with_capacity(mappers.len());
        for mapper in mappers {
            let start = fields.len();
            fields.extend(mapper.fields());
            ranged.push((start..fields.len(), mapper));
        }

        Ok(TableMapper {
            schema: Arc::new(TableSchema::new(name, fields)?),
            splitters,
            mappers: ranged,
        })
    }

    pub fn schema(&self) -> &Arc<TableSchema> {
        &self.schema
    }

    pub fn name(&self) -> &str {
        self.schema.name()
    }

    /// Fill `row` from `scope`; `false` when any mapper has no data
    pub fn set_values(&self, scope: &ProcessingScope<'_>, row: &mut [Value]) -> bool {
        debug_assert_eq!(row.len(), self.schema.len());
        self.mappers
            .iter()
            .all(|(range, mapper)| mapper.set_values(scope, &mut row[range.clone()]))
    }

    /// Call `f` once per row-producing scope, walking the splitters as a
    /// cartesian product in declaration order
    pub fn for_each_scope(
        &self,
        scope: &ProcessingScope<'_>,
        f: &mut dyn FnMut(&ProcessingScope<'_>),
    ) {
        walk(&self.splitters, scope, f);
    }
}

fn walk(
    splitters: &[Arc<dyn Splitter>],
    scope: &ProcessingScope<'_>,
    f: &mut dyn FnMut(&ProcessingScope<'_>),
) {
    let Some((first, rest)) = splitters.split_first() else {
        f(scope);
        return;
    };

    for branch in first.splits(scope) {
        scope.enter(branch.contexts, &mut |child: &ProcessingScope<'_>| {
            walk(rest, child, f)
        });
    }
}
