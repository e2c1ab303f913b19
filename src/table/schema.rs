//! Table schema and the row contract handed to exporters

use crate::error::{ExtractError, Result};
use crate::keys::SurrogateKey;
use crate::value::{Value, ValueType};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// Role of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// Part of the row identity
    Dimension,
    /// Additive measure
    Fact,
    /// Descriptive text, resolved after aggregation
    Label,
}

/// Where a label column gets its text from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelBinding {
    /// Dimension column holding the key to resolve
    pub key_field: String,
    /// Name of the label resolver
    pub resolver: String,
}

/// One output column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub value_type: ValueType,
    pub field_type: FieldType,

    /// Calculated-measure expression for OLAP exporters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<LabelBinding>,
}

impl Field {
    pub fn dimension(name: impl Into<String>, value_type: ValueType) -> Self {
        Field {
            name: name.into(),
            value_type,
            field_type: FieldType::Dimension,
            formula: None,
            label: None,
        }
    }

    pub fn fact(name: impl Into<String>, value_type: ValueType) -> Self {
        Field {
            name: name.into(),
            value_type,
            field_type: FieldType::Fact,
            formula: None,
            label: None,
        }
    }

    /// Text column without a resolver; the mapper writes the text itself
    pub fn label(name: impl Into<String>) -> Self {
        Field {
            name: name.into(),
            value_type: ValueType::Text,
            field_type: FieldType::Label,
            formula: None,
            label: None,
        }
    }

    /// Text column filled from `resolver` using the key in `key_field`
    pub fn resolved_label(
        name: impl Into<String>,
        key_field: impl Into<String>,
        resolver: impl Into<String>,
    ) -> Self {
        Field {
            label: Some(LabelBinding {
                key_field: key_field.into(),
                resolver: resolver.into(),
            }),
            ..Field::label(name)
        }
    }

    pub fn with_formula(mut self, formula: impl Into<String>) -> Self {
        self.formula = Some(formula.into());
        self
    }

    pub fn is_dimension(&self) -> bool {
        self.field_type == FieldType::Dimension
    }

    pub fn is_fact(&self) -> bool {
        self.field_type == FieldType::Fact
    }
}

/// Ordered, immutable column list of a table
#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    name: String,
    fields: Vec<Field>,
    dimensions: Vec<usize>,
    facts: Vec<usize>,
}

impl TableSchema {
    /// Validates names and label bindings; fields keep the given order
    pub fn new(name: impl Into<String>, fields: Vec<Field>) -> Result<Self> {
        let name = name.into();
        let mut seen = HashSet::new();
        for field in &fields {
            if !seen.insert(field.name.as_str()) {
                return Err(ExtractError::config(format!(
                    "table '{}' declares field '{}' twice",
                    name, field.name
                )));
            }
        }

        for field in &fields {
            if let Some(binding) = &field.label {
                let key = fields.iter().find(|f| f.name == binding.key_field);
                if !key.is_some_and(Field::is_dimension) {
                    return Err(ExtractError::config(format!(
                        "label '{}' in table '{}' refers to '{}', which is not a dimension",
                        field.name, name, binding.key_field
                    )));
                }
            }
        }

        let dimensions = positions(&fields, FieldType::Dimension);
        let facts = positions(&fields, FieldType::Fact);
        Ok(TableSchema {
            name,
            fields,
            dimensions,
            facts,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn dimension_indices(&self) -> &[usize] {
        &self.dimensions
    }

    pub fn fact_indices(&self) -> &[usize] {
        &self.facts
    }

    /// Row buffer of the right width, all nulls
    pub fn empty_values(&self) -> Vec<Value> {
        vec![Value::Null; self.fields.len()]
    }

    /// Row buffer with every fact at its zero value
    pub fn zero_values(&self) -> Vec<Value> {
        let mut values = self.empty_values();
        for &idx in &self.facts {
            values[idx] = self.fields[idx].value_type.zero();
        }
        values
    }
}

fn positions(fields: &[Field], kind: FieldType) -> Vec<usize> {
    fields
        .iter()
        .enumerate()
        .filter(|(_, f)| f.field_type == kind)
        .map(|(idx, _)| idx)
        .collect()
}

/// A finished row: values aligned to the schema plus its identity
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub key: SurrogateKey,
    pub values: Vec<Value>,
}

impl Row {
    /// Add the facts of `other` into this row; other columns keep this row's values
    pub fn merge_facts(&mut self, other: &Row, schema: &TableSchema) {
        for &idx in schema.fact_indices() {
            self.values[idx].accumulate(&other.values[idx]);
        }
    }
}

/// A finished table: the contract consumed by exporters
#[derive(Debug, Clone)]
pub struct TableData {
    pub schema: Arc<TableSchema>,
    /// Ascending by surrogate key
    pub rows: Vec<Row>,
    /// False when the run was cancelled before the source was exhausted
    pub complete: bool,
}

impl TableData {
    pub fn name(&self) -> &str {
        self.schema.name()
    }

    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        let idx = self.schema.index_of(name)?;
        Some(self.rows.iter().map(|r| &r.values[idx]).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn visits_schema() -> TableSchema {
        TableSchema::new(
            "Visits",
            vec![
                Field::dimension("Site", ValueType::Text),
                Field::resolved_label("SiteName", "Site", "sites"),
                Field::fact("Visits", ValueType::Int),
                Field::fact("Value", ValueType::Float).with_formula("[Value] / [Visits]"),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_schema_indices() {
        let schema = visits_schema();
        assert_eq!(schema.len(), 4);
        assert_eq!(schema.dimension_indices(), &[0]);
        assert_eq!(schema.fact_indices(), &[2, 3]);
        assert_eq!(schema.index_of("SiteName"), Some(1));
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let result = TableSchema::new(
            "T",
            vec![
                Field::dimension("A", ValueType::Text),
                Field::fact("A", ValueType::Int),
            ],
        );
        assert!(matches!(result, Err(ExtractError::Configuration(_))));
    }

    #[test]
    fn test_label_must_point_at_dimension() {
        let result = TableSchema::new(
            "T",
            vec![
                Field::fact("Count", ValueType::Int),
                Field::resolved_label("Name", "Count", "names"),
            ],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_values() {
        let schema = visits_schema();
        assert_eq!(
            schema.zero_values(),
            vec![Value::Null, Value::Null, Value::Int(0), Value::Float(0.0)]
        );
    }

    #[test]
    fn test_merge_facts_keeps_dimensions() {
        let schema = visits_schema();
        let mut a = Row {
            key: SurrogateKey(1),
            values: vec![Value::from("web"), Value::Null, Value::Int(1), Value::Float(2.0)],
        };
        let b = Row {
            key: SurrogateKey(1),
            values: vec![Value::from("other"), Value::Null, Value::Int(2), Value::Float(0.5)],
        };
        a.merge_facts(&b, &schema);
        assert_eq!(
            a.values,
            vec![Value::from("web"), Value::Null, Value::Int(3), Value::Float(2.5)]
        );
    }
}
