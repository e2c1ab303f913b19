use serde_json::json;
use std::io::Write;
use tempfile::NamedTempFile;
use ulid::Ulid;
use xtable::export::{JsonLinesSink, TableSink};
use xtable::pipeline::{CancellationToken, JobConfig, Pipeline, Registry, RunStatus};
use xtable::source::{DataSource, JsonLinesSource};
use xtable::{TableData, Value};

fn visit_json(id: u128, site: &str, day: u32, pages: serde_json::Value) -> String {
    json!({
        "id": Ulid::from(id).to_string(),
        "contact_id": Ulid::from(id + 100).to_string(),
        "site": site,
        "channel": "search",
        "start": format!("2024-03-{:02}T09:00:00", day),
        "end": format!("2024-03-{:02}T10:00:00", day),
        "pages": pages
    })
    .to_string()
}

fn visits_file() -> NamedTempFile {
    let lines = [
        visit_json(
            1,
            "website",
            1,
            json!([
                {"item_id": "A", "duration_ms": 500},
                {"item_id": "B", "duration_ms": 500, "events": [{"event_id": "goal", "value": 20}]},
                {"item_id": "C", "duration_ms": 500}
            ]),
        ),
        visit_json(
            2,
            "website",
            3,
            json!([
                {"item_id": "A", "events": [{"event_id": "e1"}]},
                {"item_id": "B", "events": [{"event_id": "e2"}]}
            ]),
        ),
        visit_json(3, "intranet", 3, json!([{"item_id": "A"}])),
    ];

    let mut file = NamedTempFile::new().unwrap();
    for line in lines {
        writeln!(file, "{}", line).unwrap();
    }
    file.flush().unwrap();
    file
}

fn job() -> JobConfig {
    JobConfig::from_json(
        &json!({
            "pipeline": {"loader_threads": 2, "processing_threads": 3, "batch_size": 1},
            "filters": [{"type": "site", "sites": ["website"]}],
            "tables": [
                {
                    "name": "GoalSplit",
                    "splitters": [{
                        "type": "condition_chain",
                        "conditions": [{"type": "event", "event_id": "goal"}],
                        "total": "Total"
                    }],
                    "fields": [
                        {
                            "type": "path", "name": "Segment",
                            "path": "split.name", "role": "dimension"
                        },
                        {
                            "type": "path", "name": "Pages",
                            "path": "visit.page_count", "role": "fact"
                        },
                        {"type": "path", "name": "Value", "path": "visit.value", "role": "fact"}
                    ]
                },
                {
                    "name": "Funnel",
                    "splitters": [{
                        "type": "funnel",
                        "steps": [
                            {"name": "S1", "events": ["e1"]},
                            {"name": "S2", "events": ["e2"]},
                            {"name": "S3", "events": ["e3"]}
                        ]
                    }],
                    "fields": [
                        {
                            "type": "path", "name": "Step",
                            "path": "funnel.step", "role": "dimension"
                        },
                        {
                            "type": "path", "name": "Outcome",
                            "path": "funnel.outcome", "role": "dimension"
                        },
                        {"type": "path", "name": "Visits", "path": "count", "role": "fact"}
                    ]
                },
                {
                    "name": "Daily",
                    "fields": [
                        {"type": "date_parts", "path": "visit.date"},
                        {"type": "path", "name": "Visits", "path": "count", "role": "fact"}
                    ],
                    "sequence": {"type": "date"}
                },
                {
                    "name": "Pages",
                    "splitters": [{"type": "pages"}],
                    "fields": [
                        {
                            "type": "path", "name": "Item",
                            "path": "page.item_id", "role": "dimension"
                        },
                        {
                            "type": "label", "name": "ItemName",
                            "key_field": "Item", "resolver": "items"
                        },
                        {"type": "path", "name": "Views", "path": "count", "role": "fact"},
                        {
                            "type": "path", "name": "Duration",
                            "path": "page.duration", "role": "fact"
                        }
                    ]
                }
            ],
            "labels": {"items": {"A": "Home", "B": "Products", "C": "Contact"}}
        })
        .to_string(),
    )
    .unwrap()
}

/// Value of `column` in the row whose dimensions match `key`
fn lookup(table: &TableData, key: &[(&str, Value)], column: &str) -> Value {
    let idx = table.schema.index_of(column).unwrap();
    let matching: Vec<_> = table
        .rows
        .iter()
        .filter(|row| {
            key.iter()
                .all(|(name, value)| &row.values[table.schema.index_of(name).unwrap()] == value)
        })
        .collect();
    assert_eq!(matching.len(), 1, "expected one row for {:?} in {}", key, table.name());
    matching[0].values[idx].clone()
}

#[test]
fn test_end_to_end() {
    let file = visits_file();
    let pipeline = Pipeline::new(Registry::with_defaults().build(&job()).unwrap()).unwrap();
    let mut source = JsonLinesSource::new(file.path());
    let output = pipeline.run(&mut source, &CancellationToken::new()).unwrap();

    assert_eq!(output.status, RunStatus::Completed);
    assert_eq!(output.records, 2);

    // Before/After around the goal page, plus the untouched visit as Total
    let split = output.table("GoalSplit").unwrap();
    assert_eq!(split.rows.len(), 3);
    assert_eq!(lookup(split, &[("Segment", Value::from("Before"))], "Pages"), Value::Int(4));
    assert_eq!(lookup(split, &[("Segment", Value::from("After"))], "Pages"), Value::Int(1));
    assert_eq!(lookup(split, &[("Segment", Value::from("Total"))], "Pages"), Value::Int(5));
    assert_eq!(lookup(split, &[("Segment", Value::from("Before"))], "Value"), Value::Int(20));

    let funnel = output.table("Funnel").unwrap();
    assert_eq!(funnel.rows.len(), 4);
    let outcomes = [
        ("S1", "Fallout"),
        ("S1", "Continued"),
        ("S2", "Continued"),
        ("S3", "Fallout"),
    ];
    for (step, outcome) in outcomes {
        let key = [("Step", Value::from(step)), ("Outcome", Value::from(outcome))];
        assert_eq!(lookup(funnel, &key, "Visits"), Value::Int(1));
    }

    let daily = output.table("Daily").unwrap();
    assert_eq!(daily.rows.len(), 3);
    assert_eq!(lookup(daily, &[("Day", Value::Int(1))], "Visits"), Value::Int(1));
    assert_eq!(lookup(daily, &[("Day", Value::Int(2))], "Visits"), Value::Int(0));
    assert_eq!(lookup(daily, &[("Day", Value::Int(3))], "Visits"), Value::Int(1));

    let pages = output.table("Pages").unwrap();
    assert_eq!(lookup(pages, &[("Item", Value::from("A"))], "Views"), Value::Int(2));
    assert_eq!(lookup(pages, &[("Item", Value::from("A"))], "ItemName"), Value::from("Home"));
    assert_eq!(lookup(pages, &[("Item", Value::from("A"))], "Duration"), Value::Int(500));
    assert_eq!(lookup(pages, &[("Item", Value::from("C"))], "ItemName"), Value::from("Contact"));

    for table in &output.tables {
        assert!(table.complete);
        assert!(table.rows.windows(2).all(|w| w[0].key < w[1].key), "{} not sorted", table.name());
    }
}

#[test]
fn test_update_window_and_export() {
    let file = visits_file();
    let pipeline = Pipeline::new(Registry::with_defaults().build(&job()).unwrap()).unwrap();
    let mut source = JsonLinesSource::new(file.path());
    source.apply_update_filter(
        chrono::NaiveDate::from_ymd_opt(2024, 3, 3).unwrap().and_hms_opt(0, 0, 0).unwrap(),
        chrono::NaiveDate::from_ymd_opt(2024, 3, 4).unwrap().and_hms_opt(0, 0, 0).unwrap(),
    );
    let output = pipeline.run(&mut source, &CancellationToken::new()).unwrap();
    assert_eq!(output.records, 1);

    let dir = tempfile::tempdir().unwrap();
    let mut sink = JsonLinesSink::new(dir.path()).unwrap();
    for table in &output.tables {
        sink.write_table(table).unwrap();
    }

    let daily = std::fs::read_to_string(dir.path().join("Daily.jsonl")).unwrap();
    let rows: Vec<serde_json::Value> =
        daily.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["Date"], "2024-03-03");
    assert_eq!(rows[0]["Visits"], 1);

    let funnel = std::fs::read_to_string(dir.path().join("Funnel.jsonl")).unwrap();
    assert_eq!(funnel.lines().count(), 3);
    assert!(dir.path().join("Pages.schema.json").exists());
}

#[test]
fn test_unknown_resolver_rejected_before_reading() {
    let mut config = job();
    config.labels.clear();
    assert!(Registry::with_defaults().build(&config).is_err());
}
