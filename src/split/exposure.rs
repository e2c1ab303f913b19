//! Multivariate test exposure as columns
//!
//! Not a fan-out: a visit exposed to the test gets one value and one label
//! per test variable; a visit never exposed has no row.

use crate::scope::ProcessingScope;
use crate::table::mapper::FieldMapper;
use crate::table::schema::Field;
use crate::types::Visit;
use crate::value::{Value, ValueType};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A test variable and the display names of its variants, by index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestVariable {
    pub name: String,
    pub variants: Vec<String>,
}

pub struct TestExposureFields {
    test_id: String,
    variables: Vec<TestVariable>,
}

impl TestExposureFields {
    pub fn new(test_id: impl Into<String>, variables: Vec<TestVariable>) -> Self {
        TestExposureFields {
            test_id: test_id.into(),
            variables,
        }
    }
}

impl FieldMapper for TestExposureFields {
    fn fields(&self) -> Vec<Field> {
        self.variables
            .iter()
            .flat_map(|v| {
                [
                    Field::dimension(v.name.clone(), ValueType::Int),
                    Field::label(format!("{}Label", v.name)),
                ]
            })
            .collect()
    }

    fn set_values(&self, scope: &ProcessingScope<'_>, values: &mut [Value]) -> bool {
        let Some(exposure) = scope.current::<Visit>().and_then(|v| v.exposure(&self.test_id)) else {
            return false;
        };

        for (idx, variable) in self.variables.iter().enumerate() {
            let Some(&choice) = exposure.combination.get(idx) else {
                debug!(
                    test = %self.test_id,
                    variable = %variable.name,
                    "combination shorter than variable list"
                );
                return false;
            };
            let Some(label) = variable.variants.get(usize::from(choice)) else {
                debug!(test = %self.test_id, variable = %variable.name, choice, "unknown variant");
                return false;
            };
            values[idx * 2] = Value::Int(i64::from(choice));
            values[idx * 2 + 1] = Value::from(label.as_str());
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::Context;
    use crate::types::fixtures::{page, visit};
    use crate::types::{TestExposure, VisitRecord};

    fn fields() -> TestExposureFields {
        TestExposureFields::new(
            "hero-test",
            vec![
                TestVariable {
                    name: "Banner".to_string(),
                    variants: vec!["Original".to_string(), "Blue".to_string()],
                },
                TestVariable {
                    name: "Copy".to_string(),
                    variants: vec!["Short".to_string(), "Long".to_string()],
                },
            ],
        )
    }

    fn exposed(combination: Vec<u8>) -> Visit {
        let mut record = VisitRecord::from(visit(1, 1, vec![page("A", &[])]));
        record.test_exposures.push(TestExposure {
            test_id: "hero-test".to_string(),
            combination,
        });
        Visit::from(record)
    }

    #[test]
    fn test_columns() {
        let names: Vec<String> = fields().fields().into_iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["Banner", "BannerLabel", "Copy", "CopyLabel"]);
    }

    #[test]
    fn test_exposed_visit_gets_values_and_labels() {
        let scope = ProcessingScope::root(Context::Visit(exposed(vec![1, 0])));
        let mut values = vec![Value::Null; 4];
        assert!(fields().set_values(&scope, &mut values));
        assert_eq!(
            values,
            vec![Value::Int(1), Value::from("Blue"), Value::Int(0), Value::from("Short")]
        );
    }

    #[test]
    fn test_unexposed_visit_has_no_data() {
        let scope = ProcessingScope::root(Context::Visit(visit(1, 1, vec![page("A", &[])])));
        let mut values = vec![Value::Null; 4];
        assert!(!fields().set_values(&scope, &mut values));
        assert!(values.iter().all(Value::is_null));
    }

    #[test]
    fn test_unknown_variant_has_no_data() {
        let scope = ProcessingScope::root(Context::Visit(exposed(vec![5, 0])));
        let mut values = vec![Value::Null; 4];
        assert!(!fields().set_values(&scope, &mut values));
    }
}
