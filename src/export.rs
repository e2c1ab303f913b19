//! Handing finished tables to their destination

use crate::error::Result;
use crate::table::TableData;
use serde_json::{Map, Value as JsonValue};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Destination for finished tables
pub trait TableSink {
    fn write_table(&mut self, table: &TableData) -> Result<()>;

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// One JSON object per row, keyed by field name, plus the row key as `_key`
pub fn row_object(table: &TableData, row: usize) -> Map<String, JsonValue> {
    let row = &table.rows[row];
    let mut object = Map::with_capacity(row.values.len() + 1);
    object.insert("_key".to_string(), JsonValue::String(row.key.to_string()));
    for (field, value) in table.schema.fields().iter().zip(&row.values) {
        object.insert(field.name.clone(), value.to_json());
    }
    object
}

/// Writes `<table>.jsonl` per table into a directory, with the column list
/// alongside in `<table>.schema.json`
pub struct JsonLinesSink {
    dir: PathBuf,
}

impl JsonLinesSink {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        std::fs::create_dir_all(dir.as_ref())?;
        Ok(JsonLinesSink {
            dir: dir.as_ref().to_path_buf(),
        })
    }

    pub fn table_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.jsonl", name))
    }
}

impl TableSink for JsonLinesSink {
    fn write_table(&mut self, table: &TableData) -> Result<()> {
        let path = self.table_path(table.name());
        let mut writer = BufWriter::new(File::create(&path)?);
        for idx in 0..table.rows.len() {
            serde_json::to_writer(&mut writer, &row_object(table, idx))?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;

        let schema_path = self.dir.join(format!("{}.schema.json", table.name()));
        let schema_file = BufWriter::new(File::create(schema_path)?);
        serde_json::to_writer_pretty(schema_file, table.schema.fields())?;

        debug!(
            table = table.name(),
            rows = table.rows.len(),
            path = %path.display(),
            "table written"
        );
        Ok(())
    }
}

/// All tables into one stream, each row tagged with `_table`
pub struct SingleSink<W: Write> {
    writer: W,
}

impl<W: Write> SingleSink<W> {
    pub fn new(writer: W) -> Self {
        SingleSink { writer }
    }
}

impl<W: Write> TableSink for SingleSink<W> {
    fn write_table(&mut self, table: &TableData) -> Result<()> {
        for idx in 0..table.rows.len() {
            let mut object = row_object(table, idx);
            object.insert("_table".to_string(), JsonValue::String(table.name().to_string()));
            serde_json::to_writer(&mut self.writer, &object)?;
            self.writer.write_all(b"\n")?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
