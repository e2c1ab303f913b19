//! Built-in field mappers
//!
//! Most columns are a single value read from the scope by a dotted path such
//! as `visit.site` or `page.url`. Paths are checked when the job is built, so
//! a typo fails the job before any record is read.

use crate::error::{ExtractError, Result};
use crate::scope::{EventRef, FunnelStep, PageRef, ProcessingScope, SplitInfo};
use crate::table::mapper::FieldMapper;
use crate::table::schema::{Field, FieldType};
use crate::types::Visit;
use crate::value::{Value, ValueType};
use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;

static FIELD_PATH_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(visit|page|event|split|funnel)\.([a-z][a-z_]*)$").unwrap()
});

/// A value reachable from a scope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldPath {
    Count,
    VisitId,
    ContactId,
    Site,
    Channel,
    Language,
    Start,
    End,
    VisitDate,
    PageCount,
    VisitDuration,
    VisitValue,
    VisitEventCount,
    PageItem,
    PageUrl,
    PageIndex,
    PageDuration,
    PageEventCount,
    EventId,
    EventName,
    EventValue,
    EventTimestamp,
    SplitName,
    SplitIndex,
    FunnelStepName,
    FunnelStepIndex,
    FunnelOutcome,
}

impl FieldPath {
    pub fn parse(path: &str) -> Result<Self> {
        if path == "count" {
            return Ok(FieldPath::Count);
        }

        let captures = FIELD_PATH_REGEX
            .captures(path)
            .ok_or_else(|| ExtractError::config(format!("malformed field path '{}'", path)))?;

        let parsed = match (&captures[1], &captures[2]) {
            ("visit", "id") => FieldPath::VisitId,
            ("visit", "contact_id") => FieldPath::ContactId,
            ("visit", "site") => FieldPath::Site,
            ("visit", "channel") => FieldPath::Channel,
            ("visit", "language") => FieldPath::Language,
            ("visit", "start") => FieldPath::Start,
            ("visit", "end") => FieldPath::End,
            ("visit", "date") => FieldPath::VisitDate,
            ("visit", "page_count") => FieldPath::PageCount,
            ("visit", "duration") => FieldPath::VisitDuration,
            ("visit", "value") => FieldPath::VisitValue,
            ("visit", "event_count") => FieldPath::VisitEventCount,
            ("page", "item_id") => FieldPath::PageItem,
            ("page", "url") => FieldPath::PageUrl,
            ("page", "index") => FieldPath::PageIndex,
            ("page", "duration") => FieldPath::PageDuration,
            ("page", "event_count") => FieldPath::PageEventCount,
            ("event", "id") => FieldPath::EventId,
            ("event", "name") => FieldPath::EventName,
            ("event", "value") => FieldPath::EventValue,
            ("event", "timestamp") => FieldPath::EventTimestamp,
            ("split", "name") => FieldPath::SplitName,
            ("split", "index") => FieldPath::SplitIndex,
            ("funnel", "step") => FieldPath::FunnelStepName,
            ("funnel", "index") => FieldPath::FunnelStepIndex,
            ("funnel", "outcome") => FieldPath::FunnelOutcome,
            (scope, name) => {
                return Err(ExtractError::config(format!(
                    "unknown field '{}' on '{}'",
                    name, scope
                )))
            }
        };
        Ok(parsed)
    }

    pub fn value_type(self) -> ValueType {
        use FieldPath::*;
        match self {
            VisitId | ContactId => ValueType::Guid,
            Site | Channel | Language | PageItem | PageUrl | EventId | EventName | SplitName
            | FunnelStepName | FunnelOutcome => ValueType::Text,
            Start | End | EventTimestamp => ValueType::DateTime,
            VisitDate => ValueType::Date,
            Count | PageCount | VisitDuration | VisitValue | VisitEventCount | PageIndex
            | PageDuration | PageEventCount | EventValue | SplitIndex | FunnelStepIndex => {
                ValueType::Int
            }
        }
    }

    /// The value at this path, or `None` when the scope lacks the context
    pub fn select(self, scope: &ProcessingScope<'_>) -> Option<Value> {
        use FieldPath::*;
        let value = match self {
            Count => Value::Int(1),
            VisitId | ContactId | Site | Channel | Language | Start | End | VisitDate
            | PageCount | VisitDuration | VisitValue | VisitEventCount => {
                let visit = scope.current::<Visit>()?;
                let info = visit.info();
                match self {
                    VisitId => Value::Guid(info.id),
                    ContactId => Value::Guid(info.contact_id),
                    Site => Value::from(info.site.as_str()),
                    Channel => Value::from(info.channel.as_str()),
                    Language => Value::from(info.language.as_str()),
                    Start => Value::DateTime(info.start),
                    End => Value::DateTime(info.end),
                    VisitDate => Value::Date(info.start.date()),
                    PageCount => Value::Int(visit.page_count()),
                    VisitDuration => Value::Int(visit.duration_ms()),
                    VisitValue => Value::Int(visit.value()),
                    _ => Value::Int(visit.event_count()),
                }
            }
            PageItem | PageUrl | PageIndex | PageDuration | PageEventCount => {
                let page_ref = scope.current::<PageRef>()?;
                let page = page_ref.page();
                match self {
                    PageItem => Value::from(page.item_id.as_str()),
                    PageUrl => Value::from(page.url.as_str()),
                    PageIndex => Value::Int(page_ref.index() as i64),
                    PageDuration => Value::Int(page.duration_ms),
                    _ => Value::Int(page.events.len() as i64),
                }
            }
            EventId | EventName | EventValue | EventTimestamp => {
                let event = scope.current::<EventRef>()?.event();
                match self {
                    EventId => Value::from(event.event_id.as_str()),
                    EventName => Value::from(event.name.as_str()),
                    EventValue => Value::Int(event.value),
                    _ => event.timestamp.map_or(Value::Null, Value::DateTime),
                }
            }
            SplitName | SplitIndex => {
                let split = scope.current::<SplitInfo>()?;
                match self {
                    SplitName => Value::from(split.name.as_str()),
                    _ => Value::Int(split.index as i64),
                }
            }
            FunnelStepName | FunnelStepIndex | FunnelOutcome => {
                let step = scope.current::<FunnelStep>()?;
                match self {
                    FunnelStepName => Value::from(step.name.as_str()),
                    FunnelStepIndex => Value::Int(step.index as i64),
                    _ => Value::from(step.outcome.as_str()),
                }
            }
        };
        Some(value)
    }
}

/// One column read from a [`FieldPath`]
pub struct PathField {
    field: Field,
    path: FieldPath,
}

impl PathField {
    pub fn new(name: impl Into<String>, path: &str, field_type: FieldType) -> Result<Self> {
        let path = FieldPath::parse(path)?;
        let field = Field {
            name: name.into(),
            value_type: path.value_type(),
            field_type,
            formula: None,
            label: None,
        };
        Ok(PathField { field, path })
    }

    pub fn dimension(name: impl Into<String>, path: &str) -> Result<Self> {
        PathField::new(name, path, FieldType::Dimension)
    }

    pub fn fact(name: impl Into<String>, path: &str) -> Result<Self> {
        PathField::new(name, path, FieldType::Fact)
    }

    pub fn with_formula(mut self, formula: impl Into<String>) -> Self {
        self.field.formula = Some(formula.into());
        self
    }
}

impl FieldMapper for PathField {
    fn fields(&self) -> Vec<Field> {
        vec![self.field.clone()]
    }

    fn set_values(&self, scope: &ProcessingScope<'_>, values: &mut [Value]) -> bool {
        match self.path.select(scope) {
            Some(value) => {
                values[0] = value;
                true
            }
            None => false,
        }
    }
}

/// Label column filled after aggregation from a resolver; contributes nothing
/// while rows are built
pub struct ResolvedLabelField {
    field: Field,
}

impl ResolvedLabelField {
    pub fn new(
        name: impl Into<String>,
        key_field: impl Into<String>,
        resolver: impl Into<String>,
    ) -> Self {
        ResolvedLabelField {
            field: Field::resolved_label(name, key_field, resolver),
        }
    }
}

impl FieldMapper for ResolvedLabelField {
    fn fields(&self) -> Vec<Field> {
        vec![self.field.clone()]
    }

    fn set_values(&self, _scope: &ProcessingScope<'_>, _values: &mut [Value]) -> bool {
        true
    }
}

/// Column names written by [`DatePartsField`], in order
pub const DATE_PART_NAMES: [&str; 6] = ["Date", "Year", "Quarter", "Month", "Day", "DayOfWeek"];

/// Calendar breakdown of a date. Day of week counts from Monday = 1.
pub fn date_parts(date: NaiveDate) -> [Value; 6] {
    [
        Value::Date(date),
        Value::Int(i64::from(date.year())),
        Value::Int(i64::from((date.month0() / 3) + 1)),
        Value::Int(i64::from(date.month())),
        Value::Int(i64::from(date.day())),
        Value::Int(i64::from(date.weekday().number_from_monday())),
    ]
}

/// Date dimension columns derived from a date-valued path
pub struct DatePartsField {
    prefix: String,
    source: FieldPath,
}

impl DatePartsField {
    pub fn new(prefix: impl Into<String>, path: &str) -> Result<Self> {
        let source = FieldPath::parse(path)?;
        if !matches!(source.value_type(), ValueType::Date | ValueType::DateTime) {
            return Err(ExtractError::config(format!(
                "date parts need a date path, '{}' is {:?}",
                path,
                source.value_type()
            )));
        }
        Ok(DatePartsField {
            prefix: prefix.into(),
            source,
        })
    }

    pub fn names(&self) -> Vec<String> {
        DATE_PART_NAMES
            .iter()
            .map(|part| format!("{}{}", self.prefix, part))
            .collect()
    }
}

impl FieldMapper for DatePartsField {
    fn fields(&self) -> Vec<Field> {
        self.names()
            .into_iter()
            .enumerate()
            .map(|(idx, name)| {
                let value_type = if idx == 0 { ValueType::Date } else { ValueType::Int };
                Field::dimension(name, value_type)
            })
            .collect()
    }

    fn set_values(&self, scope: &ProcessingScope<'_>, values: &mut [Value]) -> bool {
        let Some(date) = self.source.select(scope).and_then(|v| v.as_date()) else {
            return false;
        };
        for (slot, part) in values.iter_mut().zip(date_parts(date)) {
            *slot = part;
        }
        true
    }
}
