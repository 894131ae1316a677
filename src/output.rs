//! Writes result tables as CSV or JSON.

use crate::aggregate::AggregateResult;
use crate::config::OutputFormat;
use crate::processing::MatchResult;
use anyhow::Result;
use csv::WriterBuilder;
use serde::Serialize;
use std::io::Write;
use tracing::debug;

#[derive(Serialize)]
struct TableJson<'a> {
    columns: &'a [String],
    rows: Vec<Vec<&'a str>>,
}

/// Writes the filtered company table: original columns plus the feature identifier.
pub fn write_filtered<W: Write>(matches: &MatchResult, format: OutputFormat, out: W) -> Result<()> {
    debug!(rows = matches.rows.len(), ?format, "Writing filtered table");
    let rows = matches.rows.iter().map(|row| {
        row.values
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(row.identifier.as_deref().unwrap_or("")))
            .collect::<Vec<_>>()
    });

    match format {
        OutputFormat::Csv => {
            let mut writer = WriterBuilder::new().from_writer(out);
            writer.write_record(&matches.headers)?;
            for row in rows {
                writer.write_record(&row)?;
            }
            writer.flush()?;
        }
        OutputFormat::Json => {
            let table = TableJson {
                columns: &matches.headers,
                rows: rows.collect(),
            };
            write_json(&table, out)?;
        }
    }
    Ok(())
}

pub fn write_aggregate<W: Write>(table: &AggregateResult, format: OutputFormat, out: W) -> Result<()> {
    debug!(rows = table.len(), ?format, "Writing aggregate table");
    match (format, table) {
        (OutputFormat::Csv, AggregateResult::CountOnly(rows)) => write_csv_rows(rows, out),
        (OutputFormat::Csv, AggregateResult::CountAndFunding(rows)) => write_csv_rows(rows, out),
        (OutputFormat::Json, AggregateResult::CountOnly(rows)) => write_json(rows, out),
        (OutputFormat::Json, AggregateResult::CountAndFunding(rows)) => write_json(rows, out),
    }
}

fn write_csv_rows<T: Serialize, W: Write>(rows: &[T], out: W) -> Result<()> {
    let mut writer = WriterBuilder::new().has_headers(true).from_writer(out);
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

fn write_json<T: Serialize + ?Sized, W: Write>(value: &T, mut out: W) -> Result<()> {
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)?;
    Ok(())
}
