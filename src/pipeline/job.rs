//! A validated, ready-to-run job

use crate::cache::LabelResolver;
use crate::error::{ExtractError, Result};
use crate::keys::KeyFactory;
use crate::pipeline::config::{PipelineConfig, SequenceConfig};
use crate::source::Filter;
use crate::table::{
    DateSequence, FieldType, SequenceTableDataBuilder, TableBuilder, TableDataBuilder, TableMapper,
    DATE_PART_NAMES,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// One output table: its mapper and, optionally, the axis to gap-fill
pub struct TableSpec {
    pub mapper: Arc<TableMapper>,
    pub sequence: Option<SequenceConfig>,
}

impl TableSpec {
    pub fn new(mapper: TableMapper) -> Self {
        TableSpec {
            mapper: Arc::new(mapper),
            sequence: None,
        }
    }

    pub fn with_sequence(mut self, sequence: SequenceConfig) -> Self {
        self.sequence = Some(sequence);
        self
    }

    pub fn name(&self) -> &str {
        self.mapper.name()
    }

    /// A fresh, empty builder for this table
    pub fn builder(&self, keys: Arc<dyn KeyFactory>) -> Box<dyn TableBuilder> {
        let inner = TableDataBuilder::new(Arc::clone(&self.mapper), keys);
        match &self.sequence {
            None => Box::new(inner),
            Some(SequenceConfig::Date { prefix }) => {
                Box::new(SequenceTableDataBuilder::new(inner, DateSequence::new(prefix.clone())))
            }
        }
    }

    fn validate(&self) -> Result<()> {
        let Some(SequenceConfig::Date { prefix }) = &self.sequence else {
            return Ok(());
        };
        let column = format!("{}{}", prefix, DATE_PART_NAMES[0]);
        let schema = self.mapper.schema();
        match schema.index_of(&column).map(|idx| &schema.fields()[idx]) {
            Some(field) if field.field_type == FieldType::Dimension => Ok(()),
            _ => Err(ExtractError::config(format!(
                "table '{}' is a date sequence but has no '{}' dimension",
                self.name(),
                column
            ))),
        }
    }
}

pub struct Job {
    pub pipeline: PipelineConfig,
    pub filters: Vec<Arc<dyn Filter>>,
    pub tables: Vec<TableSpec>,
    pub labels: HashMap<String, Arc<dyn LabelResolver>>,
}

impl Job {
    pub fn new(pipeline: PipelineConfig) -> Self {
        Job {
            pipeline,
            filters: Vec::new(),
            tables: Vec::new(),
            labels: HashMap::new(),
        }
    }

    pub fn table(mut self, table: TableSpec) -> Self {
        self.tables.push(table);
        self
    }

    pub fn filter(mut self, filter: Arc<dyn Filter>) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn labels(mut self, name: impl Into<String>, resolver: Arc<dyn LabelResolver>) -> Self {
        self.labels.insert(name.into(), resolver);
        self
    }

    /// Everything that can be checked without reading a record
    pub fn validate(&self) -> Result<()> {
        self.pipeline.validate()?;
        if self.tables.is_empty() {
            return Err(ExtractError::config("job defines no tables"));
        }

        let mut names = HashSet::new();
        for table in &self.tables {
            if !names.insert(table.name()) {
                return Err(ExtractError::config(format!("table '{}' defined twice", table.name())));
            }
            table.validate()?;

            for field in table.mapper.schema().fields() {
                if let Some(binding) = &field.label {
                    if !self.labels.contains_key(&binding.resolver) {
                        return Err(ExtractError::config(format!(
                            "field '{}' in table '{}' uses unknown label resolver '{}'",
                            field.name,
                            table.name(),
                            binding.resolver
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}
