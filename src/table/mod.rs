//! Tables: schemas, column mappers, and the builders that aggregate rows

pub mod builder;
pub mod fields;
pub mod mapper;
pub mod merge;
pub mod schema;
pub mod sequence;

pub use builder::{merge_partials, TableBuilder, TableDataBuilder};
pub use fields::{
    date_parts, DatePartsField, FieldPath, PathField, ResolvedLabelField, DATE_PART_NAMES,
};
pub use mapper::{FieldMapper, TableMapper};
pub use merge::{merge_duplicates, merge_sorted};
pub use schema::{Field, FieldType, LabelBinding, Row, TableData, TableSchema};
pub use sequence::{DateSequence, SequenceDomain, SequenceTableDataBuilder};
