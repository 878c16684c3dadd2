//! Tabular adapter between flat records and workbooks
//!
//! A record is a mapping from column name to scalar value; a report is a
//! sequence of records. The adapter writes one header row of column
//! names followed by one data row per record, and reads the inverse.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::Path;

use chrono::NaiveDateTime;
use log::debug;

use crate::config::CodecConfig;
use crate::error::{Error, Result};
use crate::style::HorizontalAlign;
use crate::workbook::{Sheet, Value, Workbook};
use crate::{reader, writer};

/// One flat row of named scalar values. Key order is irrelevant; a
/// missing column reads as null.
pub type Record = BTreeMap<String, Value>;

/// Encode records to an `.xlsx` file. This and [`read_records`] are the
/// external surface collaborator scripts call.
pub fn write_records(
    path: &Path,
    records: &[Record],
    sort_columns: &[String],
    config: &CodecConfig,
) -> Result<()> {
    let workbook = encode_records(records, sort_columns, config)?;
    writer::write_workbook(path, &workbook)
}

/// Decode records from an `.xlsx` file
pub fn read_records(path: &Path, config: &CodecConfig) -> Result<Vec<Record>> {
    let workbook = reader::read_workbook(path)?;
    decode_records(&workbook, config)
}

/// Build a workbook from records: column set is the union of keys, rows
/// are ordered by the sort-column priority list (records missing a sort
/// column sort before those that have it), and cell styles come from the
/// config's number formats.
pub fn encode_records(
    records: &[Record],
    sort_columns: &[String],
    config: &CodecConfig,
) -> Result<Workbook> {
    let columns = column_order(records, sort_columns);
    debug!(
        "encoding {} records across {} columns",
        records.len(),
        columns.len()
    );

    let mut order: Vec<usize> = (0..records.len()).collect();
    order.sort_by(|&i, &j| cmp_records(&records[i], &records[j], sort_columns));

    let mut workbook = Workbook::new();
    workbook.creator = config.creator.clone();

    let align = if config.align_numeric {
        HorizontalAlign::Right
    } else {
        HorizontalAlign::None
    };
    let numeric_style = if config.align_numeric {
        workbook.styles.intern("General", align)
    } else {
        0
    };
    let mut date_style = None;
    let mut datetime_style = None;

    let mut sheet = Sheet::new(config.sheet_title.clone());
    for (ci, name) in columns.iter().enumerate() {
        sheet.set(1, ci as u32 + 1, Value::Text(name.clone()), 0);
    }

    for (ri, &index) in order.iter().enumerate() {
        let record = &records[index];
        let row = ri as u32 + 2;
        // Every data row is materialized, so a record of nothing but
        // nulls still occupies a row in the package
        sheet.mark_row(row);
        for (ci, name) in columns.iter().enumerate() {
            let col = ci as u32 + 1;
            let value = record.get(name).cloned().unwrap_or(Value::Null);
            match value {
                // Null stays cell-absent
                Value::Null => {}
                Value::Text(s) if s.is_empty() => {
                    // Placeholder keeps empty-string distinguishable from null
                    sheet.set(row, col, Value::Text(config.empty_placeholder.clone()), 0);
                }
                Value::Text(s) => sheet.set(row, col, Value::Text(s), 0),
                Value::Bool(b) => sheet.set(row, col, Value::Bool(b), 0),
                Value::Int(i) => sheet.set(row, col, Value::Int(i), numeric_style),
                Value::Float(f) => {
                    if !f.is_finite() {
                        return Err(Error::value(name.clone(), "non-finite number"));
                    }
                    sheet.set(row, col, Value::Float(f), numeric_style);
                }
                Value::Date(d) => {
                    let style = *date_style
                        .get_or_insert_with(|| workbook.styles.intern(&config.date_format, align));
                    sheet.set(row, col, Value::Date(d), style);
                }
                Value::DateTime(dt) => {
                    let style = *datetime_style.get_or_insert_with(|| {
                        workbook.styles.intern(&config.datetime_format, align)
                    });
                    sheet.set(row, col, Value::DateTime(dt), style);
                }
            }
        }
    }

    for (ci, name) in columns.iter().enumerate() {
        let mut width = name.chars().count();
        for record in records {
            if let Some(value) = record.get(name) {
                width = width.max(display_width(value));
            }
        }
        let width = ((width + 2) as f64).clamp(8.0, 40.0);
        sheet.set_column_width(ci as u32 + 1, width);
    }

    workbook.sheets.push(sheet);

    if let Some(lines) = &config.legend {
        let mut legend = Sheet::new(config.legend_title.clone());
        for (i, line) in lines.iter().enumerate() {
            legend.set(i as u32 + 1, 1, Value::Text(line.clone()), 0);
        }
        workbook.sheets.push(legend);
    }

    Ok(workbook)
}

/// Extract records from a workbook's active sheet. The header row gives
/// the column order; reading stops at the first absent row (no row
/// element, no cells) so padding below a gap cannot produce phantom
/// records. A present row whose cells are all null decodes as an
/// all-null record.
pub fn decode_records(workbook: &Workbook, config: &CodecConfig) -> Result<Vec<Record>> {
    let Some(sheet) = workbook.active_sheet() else {
        return Ok(Vec::new());
    };
    let Some((_, _, max_row, _)) = sheet.bounds() else {
        return Ok(Vec::new());
    };

    let mut columns = Vec::new();
    let mut col = 1u32;
    while let Some(cell) = sheet.get(1, col) {
        if cell.value.is_null() {
            break;
        }
        let name = cell.value.as_text().ok_or_else(|| {
            Error::format("xl/worksheets/sheet1.xml", "non-text header cell")
        })?;
        columns.push(name.to_string());
        col += 1;
    }
    if columns.is_empty() {
        return Ok(Vec::new());
    }

    let mut records = Vec::new();
    for row in 2..=max_row {
        if !sheet.row_is_present(row) {
            break;
        }
        let mut record = Record::new();
        for (ci, name) in columns.iter().enumerate() {
            let value = sheet
                .get(row, ci as u32 + 1)
                .map(|cell| cell.value.clone())
                .unwrap_or_default();
            let value = match value {
                Value::Text(s) if s == config.empty_placeholder => Value::Text(String::new()),
                other => other,
            };
            record.insert(name.clone(), value);
        }
        records.push(record);
    }
    debug!("decoded {} records", records.len());
    Ok(records)
}

/// Column order: sort columns that occur in the data first, in caller
/// order, then the remaining union of keys in appearance order
fn column_order(records: &[Record], sort_columns: &[String]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for name in sort_columns {
        if records.iter().any(|r| r.contains_key(name)) && !columns.contains(name) {
            columns.push(name.clone());
        }
    }
    for record in records {
        for name in record.keys() {
            if !columns.contains(name) {
                columns.push(name.clone());
            }
        }
    }
    columns
}

fn cmp_records(a: &Record, b: &Record, sort_columns: &[String]) -> Ordering {
    for name in sort_columns {
        let left = a.get(name).filter(|v| !v.is_null());
        let right = b.get(name).filter(|v| !v.is_null());
        let ordering = match (left, right) {
            (None, None) => Ordering::Equal,
            // Missing sorts first
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(x), Some(y)) => cmp_values(x, y),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Ordering across the value variants: numeric kinds compare among
/// themselves, temporal kinds likewise, and unlike kinds fall back to a
/// fixed variant rank so sorting stays total
fn cmp_values(a: &Value, b: &Value) -> Ordering {
    use Value::*;
    match (a, b) {
        (Bool(x), Bool(y)) => x.cmp(y),
        (Int(x), Int(y)) => x.cmp(y),
        (Float(x), Float(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        (Int(x), Float(y)) => (*x as f64).partial_cmp(y).unwrap_or(Ordering::Equal),
        (Float(x), Int(y)) => x.partial_cmp(&(*y as f64)).unwrap_or(Ordering::Equal),
        (Text(x), Text(y)) => x.cmp(y),
        (Date(x), Date(y)) => x.cmp(y),
        (DateTime(x), DateTime(y)) => x.cmp(y),
        (Date(x), DateTime(y)) => as_datetime(*x).cmp(y),
        (DateTime(x), Date(y)) => x.cmp(&as_datetime(*y)),
        _ => variant_rank(a).cmp(&variant_rank(b)),
    }
}

fn as_datetime(date: chrono::NaiveDate) -> NaiveDateTime {
    date.and_hms_opt(0, 0, 0).expect("midnight is always valid")
}

fn variant_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Int(_) | Value::Float(_) => 2,
        Value::Text(_) => 3,
        Value::Date(_) | Value::DateTime(_) => 4,
    }
}

fn display_width(value: &Value) -> usize {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 5,
        Value::Int(i) => format!("{i}").len(),
        Value::Float(f) => format!("{f}").len(),
        Value::Text(s) => s.chars().count(),
        Value::Date(_) => 10,
        Value::DateTime(_) => 16,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn record(entries: &[(&str, Value)]) -> Record {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_column_union_puts_sort_columns_first() {
        let records = vec![
            record(&[("b", Value::Int(1)), ("a", Value::Int(2))]),
            record(&[("c", Value::Int(3))]),
        ];
        let columns = column_order(&records, &["c".to_string()]);
        assert_eq!(columns, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_sort_columns_absent_everywhere_are_not_invented() {
        let records = vec![record(&[("a", Value::Int(1))])];
        let columns = column_order(&records, &["zz".to_string()]);
        assert_eq!(columns, vec!["a"]);
    }

    #[test]
    fn test_records_missing_sort_column_sort_first() {
        let records = vec![
            record(&[("b", Value::Int(2))]),
            record(&[("a", Value::Text("only-a".into()))]),
            record(&[("b", Value::Int(1))]),
        ];
        let config = CodecConfig::default();
        let workbook = encode_records(&records, &["b".to_string()], &config).unwrap();
        let sheet = workbook.active_sheet().unwrap();
        // Row 2 is the record without "b"; rows 3 and 4 are sorted by it
        assert!(sheet.get(2, 1).is_none());
        assert_eq!(sheet.get(3, 1).unwrap().value, Value::Int(1));
        assert_eq!(sheet.get(4, 1).unwrap().value, Value::Int(2));
    }

    #[test]
    fn test_empty_string_becomes_placeholder_and_back() {
        let config = CodecConfig::default();
        let records = vec![record(&[("b", Value::Text(String::new()))])];
        let workbook = encode_records(&records, &[], &config).unwrap();
        let sheet = workbook.active_sheet().unwrap();
        assert_eq!(
            sheet.get(2, 1).unwrap().value,
            Value::Text(config.empty_placeholder.clone())
        );

        let decoded = decode_records(&workbook, &config).unwrap();
        assert_eq!(decoded[0]["b"], Value::Text(String::new()));
    }

    #[test]
    fn test_all_null_record_round_trips() {
        let config = CodecConfig::default();
        let records = vec![record(&[("a", Value::Null)])];
        let workbook = encode_records(&records, &[], &config).unwrap();
        let sheet = workbook.active_sheet().unwrap();
        assert!(sheet.row_is_present(2));
        assert!(sheet.get(2, 1).is_none());

        let decoded = decode_records(&workbook, &config).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0]["a"], Value::Null);
    }

    #[test]
    fn test_decode_stops_at_first_absent_row() {
        let config = CodecConfig::default();
        let mut workbook = Workbook::new();
        let mut sheet = Sheet::new("data");
        sheet.set(1, 1, Value::Text("a".into()), 0);
        sheet.set(2, 1, Value::Int(1), 0);
        // Row 3 absent entirely; row 4 is application padding
        sheet.set(4, 1, Value::Int(4), 0);
        workbook.sheets.push(sheet);

        let decoded = decode_records(&workbook, &config).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0]["a"], Value::Int(1));
    }

    #[test]
    fn test_decode_pads_missing_columns_with_null() {
        let config = CodecConfig::default();
        let records = vec![
            record(&[("a", Value::Text("x".into()))]),
            record(&[("b", Value::Text("v".into()))]),
        ];
        let workbook = encode_records(&records, &[], &config).unwrap();
        let decoded = decode_records(&workbook, &config).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0]["a"], Value::Text("x".into()));
        assert_eq!(decoded[0]["b"], Value::Null);
        assert_eq!(decoded[1]["a"], Value::Null);
        assert_eq!(decoded[1]["b"], Value::Text("v".into()));
    }

    #[test]
    fn test_date_and_datetime_styles_are_shared_across_rows() {
        let config = CodecConfig::default();
        let date = NaiveDate::from_ymd_opt(2023, 8, 1).unwrap();
        let records: Vec<Record> = (0..50)
            .map(|i| {
                record(&[
                    ("day", Value::Date(date)),
                    ("n", Value::Int(i)),
                ])
            })
            .collect();
        let workbook = encode_records(&records, &[], &config).unwrap();
        assert_eq!(
            workbook.styles.custom_formats(),
            vec![(164, config.date_format.as_str())]
        );
    }

    #[test]
    fn test_align_numeric_uses_general_without_numfmt() {
        let config = CodecConfig {
            align_numeric: true,
            ..CodecConfig::default()
        };
        let records = vec![record(&[("n", Value::Int(7))])];
        let workbook = encode_records(&records, &[], &config).unwrap();
        let sheet = workbook.active_sheet().unwrap();
        let style = sheet.get(2, 1).unwrap().style;
        assert_ne!(style, 0);
        let entry = &workbook.styles.entries()[style as usize];
        assert_eq!(entry.numfmt_id, 0);
        assert_eq!(entry.align, HorizontalAlign::Right);
        assert!(workbook.styles.custom_formats().is_empty());
    }

    #[test]
    fn test_legend_sheet_is_appended() {
        let config = CodecConfig {
            legend: Some(vec!["generated nightly".to_string()]),
            ..CodecConfig::default()
        };
        let workbook = encode_records(&[], &[], &config).unwrap();
        assert_eq!(workbook.sheets.len(), 2);
        assert_eq!(workbook.sheets[1].title, "legend");
        assert_eq!(
            workbook.sheets[1].get(1, 1).unwrap().value,
            Value::Text("generated nightly".into())
        );
    }

    #[test]
    fn test_cross_type_ordering_is_total() {
        let mixed = vec![
            Value::Text("a".into()),
            Value::Null,
            Value::Int(5),
            Value::Bool(true),
        ];
        for a in &mixed {
            for b in &mixed {
                let forward = cmp_values(a, b);
                let backward = cmp_values(b, a);
                assert_eq!(forward, backward.reverse());
            }
        }
        assert_eq!(
            cmp_values(&Value::Int(2), &Value::Float(2.5)),
            Ordering::Less
        );
    }

    #[test]
    fn test_non_finite_float_fails_at_encode() {
        let config = CodecConfig::default();
        let records = vec![record(&[("x", Value::Float(f64::INFINITY))])];
        let err = encode_records(&records, &[], &config).unwrap_err();
        assert!(matches!(err, Error::Value { .. }));
    }
}
