use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use ulid::Ulid;

/// A goal, outcome or other event raised while a page was viewed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageEvent {
    /// Event definition id
    pub event_id: String,

    #[serde(default)]
    pub name: String,

    /// Engagement value carried by the event
    #[serde(default)]
    pub value: i64,

    #[serde(default)]
    pub timestamp: Option<NaiveDateTime>,
}

/// One page view within a visit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    /// Content item id
    pub item_id: String,

    #[serde(default)]
    pub url: String,

    #[serde(default)]
    pub duration_ms: i64,

    #[serde(default)]
    pub events: Vec<PageEvent>,
}

impl Page {
    pub fn has_event(&self, event_id: &str) -> bool {
        self.events.iter().any(|e| e.event_id == event_id)
    }
}

/// Multivariate test combination the visitor was shown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestExposure {
    pub test_id: String,

    /// Chosen variant index per test variable, in variable order
    pub combination: Vec<u8>,
}

/// Serialized form of a visit, one JSON object per line in source files
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisitRecord {
    pub id: Ulid,

    pub contact_id: Ulid,

    #[serde(default)]
    pub site: String,

    #[serde(default)]
    pub channel: String,

    #[serde(default)]
    pub language: String,

    pub start: NaiveDateTime,

    /// Time of the last activity; incremental updates select on this
    pub end: NaiveDateTime,

    #[serde(default)]
    pub pages: Vec<Page>,

    #[serde(default)]
    pub test_exposures: Vec<TestExposure>,
}

/// Visit attributes that never change between derived views
#[derive(Debug, Clone, PartialEq)]
pub struct VisitInfo {
    pub id: Ulid,
    pub contact_id: Ulid,
    pub site: String,
    pub channel: String,
    pub language: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub test_exposures: Vec<TestExposure>,
}

/// A visit, or a view of one restricted to a subset of its pages.
///
/// Cloning is cheap: both parts are shared. A view made with
/// [`Visit::with_pages`] shares the attributes with its parent and owns only
/// its page list, so aggregates computed from it describe just that bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "VisitRecord", into = "VisitRecord")]
pub struct Visit {
    info: Arc<VisitInfo>,
    pages: Arc<[Page]>,
}

impl Visit {
    pub fn info(&self) -> &VisitInfo {
        &self.info
    }

    pub fn id(&self) -> Ulid {
        self.info.id
    }

    pub fn pages(&self) -> &Arc<[Page]> {
        &self.pages
    }

    /// View of this visit with a different page list
    pub fn with_pages(&self, pages: Vec<Page>) -> Visit {
        Visit {
            info: Arc::clone(&self.info),
            pages: pages.into(),
        }
    }

    pub fn page_count(&self) -> i64 {
        self.pages.len() as i64
    }

    pub fn duration_ms(&self) -> i64 {
        self.pages.iter().fold(0i64, |total, p| total.saturating_add(p.duration_ms))
    }

    /// Sum of event values over the pages in view, saturating at the i64 bounds
    pub fn value(&self) -> i64 {
        self.events().fold(0i64, |total, (_, e)| total.saturating_add(e.value))
    }

    pub fn event_count(&self) -> i64 {
        self.events().count() as i64
    }

    /// Events in page order, with the index of their page
    pub fn events(&self) -> impl Iterator<Item = (usize, &PageEvent)> + '_ {
        self.pages
            .iter()
            .enumerate()
            .flat_map(|(idx, page)| page.events.iter().map(move |e| (idx, e)))
    }

    pub fn exposure(&self, test_id: &str) -> Option<&TestExposure> {
        self.info.test_exposures.iter().find(|t| t.test_id == test_id)
    }
}

impl From<VisitRecord> for Visit {
    fn from(record: VisitRecord) -> Self {
        Visit {
            info: Arc::new(VisitInfo {
                id: record.id,
                contact_id: record.contact_id,
                site: record.site,
                channel: record.channel,
                language: record.language,
                start: record.start,
                end: record.end,
                test_exposures: record.test_exposures,
            }),
            pages: record.pages.into(),
        }
    }
}

impl From<Visit> for VisitRecord {
    fn from(visit: Visit) -> Self {
        let info = visit.info.as_ref().clone();
        VisitRecord {
            id: info.id,
            contact_id: info.contact_id,
            site: info.site,
            channel: info.channel,
            language: info.language,
            start: info.start,
            end: info.end,
            pages: visit.pages.to_vec(),
            test_exposures: info.test_exposures,
        }
    }
}
