use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use clap::{Parser, Subcommand};
use log::info;
use serde_json::{Map, Number, json};

use tabsheet_core::{CodecConfig, Record, Value, read_records, write_records};

#[derive(Parser)]
#[command(name = "tabsheet")]
#[command(about = "Convert JSON record files to and from XLSX workbooks", long_about = None)]
#[command(version)]
struct Cli {
    /// Codec configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a JSON array of records to an XLSX workbook
    Export {
        /// Input JSON file (array of flat objects)
        input: PathBuf,

        /// Output XLSX file
        #[arg(short, long)]
        output: PathBuf,

        /// Sort rows by these columns, highest priority first
        #[arg(long, num_args = 1.., value_name = "COLUMN")]
        sort: Vec<String>,
    },
    /// Read an XLSX workbook back into a JSON array of records
    Import {
        /// Input XLSX file
        input: PathBuf,

        /// Output JSON file; stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    pretty_env_logger::init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => CodecConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => CodecConfig::default(),
    };

    match cli.command {
        Command::Export {
            input,
            output,
            sort,
        } => {
            let content = fs::read_to_string(&input)
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let rows: Vec<Map<String, serde_json::Value>> = serde_json::from_str(&content)
                .with_context(|| format!("{} is not a JSON array of objects", input.display()))?;
            let records: Vec<Record> = rows.iter().map(json_to_record).collect::<Result<_>>()?;

            info!("exporting {} records to {}", records.len(), output.display());
            write_records(&output, &records, &sort, &config)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            println!("Wrote {} records to {}", records.len(), output.display());
        }
        Command::Import { input, output } => {
            let records = read_records(&input, &config)
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let rows: Vec<serde_json::Value> = records.iter().map(record_to_json).collect();
            let text = serde_json::to_string_pretty(&rows)?;

            match output {
                Some(path) => {
                    fs::write(&path, text)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    println!("Wrote {} records to {}", records.len(), path.display());
                }
                None => println!("{}", text),
            }
        }
    }

    Ok(())
}

/// Map one JSON object to a record. Strings in ISO date or date-time
/// shape become typed date values so they round-trip as spreadsheet
/// dates rather than text.
fn json_to_record(object: &Map<String, serde_json::Value>) -> Result<Record> {
    let mut record = Record::new();
    for (key, value) in object {
        let value = match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().context("unrepresentable JSON number")?)
                }
            }
            serde_json::Value::String(s) => parse_string_value(s),
            other => anyhow::bail!("column {key}: nested JSON value {other} is not a scalar"),
        };
        record.insert(key.clone(), value);
    }
    Ok(record)
}

fn parse_string_value(s: &str) -> Value {
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Value::Date(date);
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Value::DateTime(dt);
        }
    }
    Value::Text(s.to_string())
}

fn record_to_json(record: &Record) -> serde_json::Value {
    let mut object = Map::new();
    for (key, value) in record {
        let json = match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => json!(b),
            Value::Int(i) => json!(i),
            Value::Float(f) => Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(s) => json!(s),
            Value::Date(d) => json!(d.format("%Y-%m-%d").to_string()),
            Value::DateTime(dt) => json!(dt.format("%Y-%m-%d %H:%M:%S").to_string()),
        };
        object.insert(key.clone(), json);
    }
    serde_json::Value::Object(object)
}
