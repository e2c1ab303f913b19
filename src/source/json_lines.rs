//! Newline-delimited JSON visit files

use crate::error::{ExtractError, Result};
use crate::source::{filtered, DataSource, Filter, ItemLoaded, VisitStream};
use crate::types::{Visit, VisitRecord};
use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// One [`VisitRecord`] per line. Blank lines are skipped; a line that does
/// not parse is yielded as [`ExtractError::MalformedRecord`].
///
/// Every partition reads the whole file and keeps the lines whose index
/// falls to it, so partitions stay disjoint without an index of offsets.
pub struct JsonLinesSource {
    path: PathBuf,
    filters: Vec<Arc<dyn Filter>>,
    on_loaded: Option<ItemLoaded>,
}

impl JsonLinesSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        JsonLinesSource {
            path: path.as_ref().to_path_buf(),
            filters: Vec::new(),
            on_loaded: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Parse one line of a visit file
pub fn parse_visit(line: &str) -> Result<Visit> {
    let record: VisitRecord = serde_json::from_str(line)?;
    Ok(Visit::from(record))
}

/// Read every visit from newline-delimited JSON, skipping lines that do not
/// parse. Returns the visits and the number of lines skipped.
pub fn read_visits<R: BufRead>(reader: R, origin: &str) -> Result<(Vec<Visit>, u64)> {
    let mut visits = Vec::new();
    let mut skipped = 0;
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match parse_visit(&line) {
            Ok(visit) => visits.push(visit),
            Err(e) => {
                warn!(origin, line = idx + 1, error = %e, "skipping malformed visit");
                skipped += 1;
            }
        }
    }
    Ok((visits, skipped))
}

impl DataSource for JsonLinesSource {
    fn count(&self) -> Option<u64> {
        None
    }

    fn filters(&self) -> &[Arc<dyn Filter>] {
        &self.filters
    }

    fn filters_mut(&mut self) -> &mut Vec<Arc<dyn Filter>> {
        &mut self.filters
    }

    fn set_item_loaded(&mut self, callback: ItemLoaded) {
        self.on_loaded = Some(callback);
    }

    fn partitions(&mut self, n: usize) -> Result<Vec<VisitStream>> {
        let n = n.max(1);
        debug!(path = %self.path.display(), partitions = n, "opening visit file");

        let mut streams = Vec::with_capacity(n);
        for part in 0..n {
            let file = File::open(&self.path).map_err(|e| {
                ExtractError::Source(format!("cannot open {}: {}", self.path.display(), e))
            })?;
            let display = self.path.display().to_string();

            let records = BufReader::new(file)
                .lines()
                .enumerate()
                .filter(move |(idx, _)| idx % n == part)
                .filter_map(move |(idx, line)| match line {
                    Ok(line) if line.trim().is_empty() => None,
                    Ok(line) => Some(parse_visit(&line).map_err(|e| {
                        ExtractError::MalformedRecord(format!("{}:{}: {}", display, idx + 1, e))
                    })),
                    Err(e) if e.kind() == ErrorKind::InvalidData => Some(Err(
                        ExtractError::MalformedRecord(format!("{}:{}: {}", display, idx + 1, e)),
                    )),
                    Err(e) => Some(Err(ExtractError::Io(e))),
                });

            streams.push(filtered(records, self.filters.clone(), self.on_loaded.clone()));
        }
        Ok(streams)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SiteFilter;
    use crate::types::fixtures::{page, visit};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_visits(lines: &[String]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        file.flush().unwrap();
        file
    }

    fn line(id: u128) -> String {
        serde_json::to_string(&VisitRecord::from(visit(id, 1, vec![page("A", &["goal"])]))).unwrap()
    }

    #[test]
    fn test_reads_all_lines_across_partitions() {
        let file = write_visits(&[line(1), String::new(), line(2), line(3)]);
        let mut source = JsonLinesSource::new(file.path());

        let parts = source.partitions(2).unwrap();
        let mut ids: Vec<u128> = parts
            .into_iter()
            .flatten()
            .map(|v| u128::from(v.unwrap().id()))
            .collect();
        ids.sort();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_parsed_visit_keeps_pages() {
        let file = write_visits(&[line(9)]);
        let mut source = JsonLinesSource::new(file.path());
        let visit = source.partitions(1).unwrap().remove(0).next().unwrap().unwrap();
        assert_eq!(visit.page_count(), 1);
        assert!(visit.pages()[0].has_event("goal"));
    }

    #[test]
    fn test_bad_line_reports_position() {
        let file = write_visits(&[line(1), "{not json".to_string(), line(3)]);
        let mut source = JsonLinesSource::new(file.path());
        let results: Vec<Result<Visit>> = source.partitions(1).unwrap().remove(0).collect();

        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(results[2].is_ok());
        match &results[1] {
            Err(e @ ExtractError::MalformedRecord(msg)) => {
                assert!(e.is_record_error());
                assert!(msg.contains(":2:"), "{}", msg);
            }
            other => panic!("expected malformed record, got {:?}", other.as_ref().map(|v| v.id())),
        }
    }

    #[test]
    fn test_read_visits_skips_bad_lines() {
        let input = format!("{}\n{{not json\n\n{}\n", line(1), line(2));
        let (visits, skipped) = read_visits(input.as_bytes(), "stdin").unwrap();
        assert_eq!(visits.len(), 2);
        assert_eq!(skipped, 1);
    }

    #[test]
    fn test_filters_apply() {
        let file = write_visits(&[line(1), line(2)]);
        let mut source = JsonLinesSource::new(file.path());
        source.filters_mut().push(Arc::new(SiteFilter::new(["other"])));
        assert_eq!(source.partitions(1).unwrap().remove(0).count(), 0);
    }

    #[test]
    fn test_missing_file() {
        let mut source = JsonLinesSource::new("/nonexistent/visits.jsonl");
        assert!(matches!(source.partitions(1), Err(ExtractError::Source(_))));
    }
}
