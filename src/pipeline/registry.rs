//! Named constructors for configurable components
//!
//! Jobs refer to field mappers, splitters and filters by a `type` string.
//! The registry maps each string to a constructor that reads its parameters
//! from JSON. Built-ins are registered by [`Registry::with_defaults`];
//! callers can add their own before building a job.

use crate::cache::{LabelResolver, MapLabelResolver};
use crate::error::{ExtractError, Result};
use crate::pipeline::config::{ComponentConfig, JobConfig, TableConfig};
use crate::pipeline::job::{Job, TableSpec};
use crate::source::{DateRangeFilter, Filter, SampleFilter, SiteFilter, VisitTime};
use crate::split::{
    Condition, ConditionChainSplitter, FunnelSplitter, FunnelStepDefinition, PageCondition,
    PageEventCondition, PageEventsSplitter, PagesSplitter, Splitter, TestExposureFields,
    TestVariable,
};
use crate::table::{
    DatePartsField, FieldMapper, FieldType, PathField, ResolvedLabelField, TableMapper,
};
use chrono::NaiveDateTime;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Parameters of one component, everything but its `type`
pub type Params = serde_json::Map<String, serde_json::Value>;

type Constructor<T> = Box<dyn Fn(&Params) -> Result<T> + Send + Sync>;

#[derive(Default)]
pub struct Registry {
    fields: HashMap<String, Constructor<Box<dyn FieldMapper>>>,
    splitters: HashMap<String, Constructor<Arc<dyn Splitter>>>,
    filters: HashMap<String, Constructor<Arc<dyn Filter>>>,
}

/// Deserialize a component's parameters into its typed form
pub fn parse_params<P: DeserializeOwned>(kind: &str, params: &Params) -> Result<P> {
    serde_json::from_value(serde_json::Value::Object(params.clone()))
        .map_err(|e| ExtractError::config(format!("bad parameters for '{}': {}", kind, e)))
}

#[derive(Deserialize)]
struct PathParams {
    name: String,
    path: String,
    role: FieldType,
    #[serde(default)]
    formula: Option<String>,
}

#[derive(Deserialize)]
struct DatePartsParams {
    #[serde(default)]
    prefix: String,
    path: String,
}

#[derive(Deserialize)]
struct LabelParams {
    name: String,
    key_field: String,
    resolver: String,
}

#[derive(Deserialize)]
struct TestExposureParams {
    test_id: String,
    variables: Vec<TestVariable>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ConditionParams {
    Page {
        #[serde(default)]
        item_id: Option<String>,
    },
    Event {
        #[serde(default)]
        event_id: Option<String>,
    },
}

fn default_true() -> bool {
    true
}

#[derive(Deserialize)]
struct ConditionChainParams {
    conditions: Vec<ConditionParams>,
    #[serde(default)]
    names: Option<Vec<String>>,
    #[serde(default = "default_true")]
    include_match_before: bool,
    #[serde(default)]
    empty_if_condition_not_met: bool,
    #[serde(default)]
    total: Option<String>,
}

impl ConditionChainParams {
    fn build(self) -> Result<ConditionChainSplitter> {
        let conditions: Vec<Box<dyn Condition>> = self
            .conditions
            .into_iter()
            .map(|c| -> Box<dyn Condition> {
                match c {
                    ConditionParams::Page { item_id } => Box::new(PageCondition { item_id }),
                    ConditionParams::Event { event_id } => {
                        Box::new(PageEventCondition { event_id })
                    }
                }
            })
            .collect();

        let splitter = match self.names {
            Some(names) => ConditionChainSplitter::new(conditions, names)?,
            None if conditions.len() == 1 => {
                let mut conditions = conditions;
                ConditionChainSplitter::before_after(conditions.remove(0))
            }
            None => {
                return Err(ExtractError::config(
                    "condition chains with several conditions need bucket names",
                ))
            }
        };

        let splitter = splitter
            .include_match_before(self.include_match_before)
            .empty_if_condition_not_met(self.empty_if_condition_not_met);
        Ok(match self.total {
            Some(name) => splitter.with_total(name),
            None => splitter,
        })
    }
}

#[derive(Deserialize)]
struct FunnelParams {
    steps: Vec<FunnelStepDefinition>,
}

#[derive(Deserialize)]
struct SiteParams {
    sites: Vec<String>,
}

#[derive(Deserialize)]
struct SampleParams {
    percent: u8,
}

#[derive(Deserialize)]
struct DateRangeParams {
    #[serde(default)]
    on: VisitTime,
    #[serde(default)]
    start: Option<NaiveDateTime>,
    #[serde(default)]
    end: Option<NaiveDateTime>,
}

impl Registry {
    /// An empty registry
    pub fn new() -> Self {
        Registry::default()
    }

    /// A registry holding every built-in component
    pub fn with_defaults() -> Self {
        let mut registry = Registry::new();

        registry.register_field("path", |p| {
            let params: PathParams = parse_params("path", p)?;
            let mut field = PathField::new(params.name, &params.path, params.role)?;
            if let Some(formula) = params.formula {
                field = field.with_formula(formula);
            }
            Ok(Box::new(field))
        });
        registry.register_field("date_parts", |p| {
            let params: DatePartsParams = parse_params("date_parts", p)?;
            Ok(Box::new(DatePartsField::new(params.prefix, &params.path)?))
        });
        registry.register_field("label", |p| {
            let params: LabelParams = parse_params("label", p)?;
            Ok(Box::new(ResolvedLabelField::new(
                params.name,
                params.key_field,
                params.resolver,
            )))
        });
        registry.register_field("test_exposure", |p| {
            let params: TestExposureParams = parse_params("test_exposure", p)?;
            Ok(Box::new(TestExposureFields::new(params.test_id, params.variables)))
        });

        registry.register_splitter("pages", |_| Ok(Arc::new(PagesSplitter)));
        registry.register_splitter("page_events", |_| Ok(Arc::new(PageEventsSplitter)));
        registry.register_splitter("condition_chain", |p| {
            let params: ConditionChainParams = parse_params("condition_chain", p)?;
            Ok(Arc::new(params.build()?))
        });
        registry.register_splitter("funnel", |p| {
            let params: FunnelParams = parse_params("funnel", p)?;
            Ok(Arc::new(FunnelSplitter::new(params.steps)?))
        });

        registry.register_filter("site", |p| {
            let params: SiteParams = parse_params("site", p)?;
            Ok(Arc::new(SiteFilter::new(params.sites)))
        });
        registry.register_filter("sample", |p| {
            let params: SampleParams = parse_params("sample", p)?;
            Ok(Arc::new(SampleFilter::new(params.percent)?))
        });
        registry.register_filter("date_range", |p| {
            let params: DateRangeParams = parse_params("date_range", p)?;
            Ok(Arc::new(DateRangeFilter::new(params.on, params.start, params.end)))
        });
        registry.register_filter("condition_chain", |p| {
            let params: ConditionChainParams = parse_params("condition_chain", p)?;
            Ok(Arc::new(params.build()?))
        });

        registry
    }

    pub fn register_field<F>(&mut self, kind: impl Into<String>, constructor: F)
    where
        F: Fn(&Params) -> Result<Box<dyn FieldMapper>> + Send + Sync + 'static,
    {
        self.fields.insert(kind.into(), Box::new(constructor));
    }

    pub fn register_splitter<F>(&mut self, kind: impl Into<String>, constructor: F)
    where
        F: Fn(&Params) -> Result<Arc<dyn Splitter>> + Send + Sync + 'static,
    {
        self.splitters.insert(kind.into(), Box::new(constructor));
    }

    pub fn register_filter<F>(&mut self, kind: impl Into<String>, constructor: F)
    where
        F: Fn(&Params) -> Result<Arc<dyn Filter>> + Send + Sync + 'static,
    {
        self.filters.insert(kind.into(), Box::new(constructor));
    }

    pub fn field(&self, config: &ComponentConfig) -> Result<Box<dyn FieldMapper>> {
        construct(&self.fields, "field", config)
    }

    pub fn splitter(&self, config: &ComponentConfig) -> Result<Arc<dyn Splitter>> {
        construct(&self.splitters, "splitter", config)
    }

    pub fn filter(&self, config: &ComponentConfig) -> Result<Arc<dyn Filter>> {
        construct(&self.filters, "filter", config)
    }

    pub fn table(&self, config: &TableConfig) -> Result<TableSpec> {
        let splitters = config
            .splitters
            .iter()
            .map(|s| self.splitter(s))
            .collect::<Result<Vec<_>>>()?;
        let fields = config
            .fields
            .iter()
            .map(|f| self.field(f))
            .collect::<Result<Vec<_>>>()?;

        let spec = TableSpec::new(TableMapper::new(config.name.clone(), splitters, fields)?);
        Ok(match &config.sequence {
            Some(sequence) => spec.with_sequence(sequence.clone()),
            None => spec,
        })
    }

    /// Build and validate a job. Fails on the first configuration problem.
    pub fn build(&self, config: &JobConfig) -> Result<Job> {
        let mut job = Job::new(config.pipeline.clone());
        for filter in &config.filters {
            job.filters.push(self.filter(filter)?);
        }
        for table in &config.tables {
            job.tables.push(self.table(table)?);
        }
        for (name, labels) in &config.labels {
            let resolver: Arc<dyn LabelResolver> =
                Arc::new(MapLabelResolver::new(name.clone(), labels.clone()));
            job.labels.insert(name.clone(), resolver);
        }

        job.validate()?;
        debug!(
            tables = job.tables.len(),
            filters = job.filters.len(),
            "job built"
        );
        Ok(job)
    }
}

fn construct<T>(
    constructors: &HashMap<String, Constructor<T>>,
    what: &str,
    config: &ComponentConfig,
) -> Result<T> {
    let constructor = constructors
        .get(&config.kind)
        .ok_or_else(|| ExtractError::config(format!("unknown {} type '{}'", what, config.kind)))?;
    constructor(&config.params)
}
