//! Output formatting for the workflow-archiver CLI.
//!
//! - [`OutputWriter`] picks between JSON and table output
//! - [`JsonOutputWriter`] serializes results to pretty JSON
//! - [`TableOutputWriter`] renders results with `tabled`

use serde::Serialize;
use tabled::{Table, Tabled};

pub enum OutputWriter {
    /// Display results in a human-readable table
    Table(TableOutputWriter),
    /// Display results as JSON
    Json(JsonOutputWriter),
}

impl OutputWriter {
    /// Writer for a `--format` value. Anything but "json" renders a table.
    pub fn for_format(format: &str) -> Self {
        match format.to_lowercase().as_str() {
            "json" => OutputWriter::Json(JsonOutputWriter),
            _ => OutputWriter::Table(TableOutputWriter),
        }
    }

    pub fn write_list<T: Serialize + Tabled>(
        &self,
        items: &[T],
        out: &mut dyn std::io::Write,
    ) -> anyhow::Result<()> {
        match self {
            OutputWriter::Table(writer) => writer.write_list(items, out),
            OutputWriter::Json(writer) => writer.write_list(items, out),
        }
    }

    pub fn write_item<T: Serialize + Tabled>(
        &self,
        item: &T,
        out: &mut dyn std::io::Write,
    ) -> anyhow::Result<()> {
        match self {
            OutputWriter::Table(writer) => writer.write_item(item, out),
            OutputWriter::Json(writer) => writer.write_item(item, out),
        }
    }
}

pub struct TableOutputWriter;
impl TableOutputWriter {
    pub fn write_list<T: Tabled>(
        &self,
        items: &[T],
        out: &mut dyn std::io::Write,
    ) -> anyhow::Result<()> {
        let table = Table::new(items);
        writeln!(out, "{}", table)?;
        Ok(())
    }

    pub fn write_item<T: Tabled>(&self, item: &T, out: &mut dyn std::io::Write) -> anyhow::Result<()> {
        self.write_list(std::slice::from_ref(item), out)
    }
}

pub struct JsonOutputWriter;
impl JsonOutputWriter {
    pub fn write_list<T: Serialize>(
        &self,
        items: &[T],
        out: &mut dyn std::io::Write,
    ) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(items)?;
        writeln!(out, "{}", json)?;
        Ok(())
    }

    pub fn write_item<T: Serialize>(&self, item: &T, out: &mut dyn std::io::Write) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(item)?;
        writeln!(out, "{}", json)?;
        Ok(())
    }
}
