//! Built-in visit filters

use crate::error::{ExtractError, Result};
use crate::keys::Fnv1a32;
use crate::source::Filter;
use crate::types::Visit;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Which timestamp of a visit a date range applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisitTime {
    #[default]
    Start,
    End,
}

/// Half-open range `[start, end)` over a visit timestamp; open bounds are unlimited
#[derive(Debug, Clone)]
pub struct DateRangeFilter {
    on: VisitTime,
    start: Option<NaiveDateTime>,
    end: Option<NaiveDateTime>,
}

impl DateRangeFilter {
    pub fn new(on: VisitTime, start: Option<NaiveDateTime>, end: Option<NaiveDateTime>) -> Self {
        DateRangeFilter { on, start, end }
    }
}

impl Filter for DateRangeFilter {
    fn include(&self, visit: &Visit) -> bool {
        let at = match self.on {
            VisitTime::Start => visit.info().start,
            VisitTime::End => visit.info().end,
        };
        self.start.map_or(true, |start| at >= start) && self.end.map_or(true, |end| at < end)
    }
}

#[derive(Debug, Clone)]
pub struct SiteFilter {
    sites: HashSet<String>,
}

impl SiteFilter {
    pub fn new<I, S>(sites: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SiteFilter {
            sites: sites.into_iter().map(Into::into).collect(),
        }
    }
}

impl Filter for SiteFilter {
    fn include(&self, visit: &Visit) -> bool {
        self.sites.contains(&visit.info().site)
    }
}

/// Deterministic sample: a visit is in or out based on a hash of its id, so
/// reruns and parallel loaders agree
#[derive(Debug, Clone, Copy)]
pub struct SampleFilter {
    percent: u8,
}

impl SampleFilter {
    pub fn new(percent: u8) -> Result<Self> {
        if percent > 100 {
            return Err(ExtractError::config(format!(
                "sample percentage must be 0..=100, got {}",
                percent
            )));
        }
        Ok(SampleFilter { percent })
    }
}

impl Filter for SampleFilter {
    fn include(&self, visit: &Visit) -> bool {
        Fnv1a32::hash_bytes(&visit.id().to_bytes()) % 100 < u32::from(self.percent)
    }

    fn estimate_count(&self, population: u64) -> u64 {
        population * u64::from(self.percent) / 100
    }
}
