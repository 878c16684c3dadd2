//! OOXML package reader
//!
//! Parses a `.xlsx` package back into typed cell values. The whole
//! archive is read into memory in one call; nothing is streamed or
//! cached across calls. `xl/styles.xml` and `xl/worksheets/sheet1.xml`
//! are mandatory; `xl/sharedStrings.xml` is optional because minimal
//! writers (including this crate's own) omit it, but shared-string
//! cells from third-party files are fully supported.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek};
use std::path::Path;

use log::{debug, trace};
use quick_xml::Reader;
use quick_xml::events::Event;
use zip::ZipArchive;

use crate::error::{Error, Result};
use crate::style::{FormatKind, HorizontalAlign, StyleTable};
use crate::workbook::{Sheet, Value, Workbook, parse_cell_ref, serial_to_date, serial_to_datetime};

const SHEET_PART: &str = "xl/worksheets/sheet1.xml";
const STYLES_PART: &str = "xl/styles.xml";
const SHARED_STRINGS_PART: &str = "xl/sharedStrings.xml";

/// Read a workbook from a file path
pub fn read_workbook<P: AsRef<Path>>(path: P) -> Result<Workbook> {
    let file = File::open(path.as_ref())?;
    read_package(BufReader::new(file))
}

/// Read a workbook from any seekable source
pub fn read_package<R: Read + Seek>(source: R) -> Result<Workbook> {
    let mut archive = ZipArchive::new(source)?;

    let shared_strings = parse_shared_strings(&mut archive)?;
    debug!("loaded {} shared strings", shared_strings.len());
    let styles = parse_styles(&mut archive)?;

    let title = first_sheet_title(&mut archive)?.unwrap_or_else(|| "data".to_string());
    let sheet = parse_sheet(&mut archive, title, &styles, &shared_strings)?;
    trace!(
        "parsed {} populated cells",
        sheet.cells().count()
    );

    Ok(Workbook {
        sheets: vec![sheet],
        styles,
        creator: String::new(),
    })
}

/// Parse xl/sharedStrings.xml if present into an index-ordered list,
/// concatenating the text runs of each entry
fn parse_shared_strings<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<Vec<String>> {
    let mut strings = Vec::new();
    let part = match archive.by_name(SHARED_STRINGS_PART) {
        Ok(file) => file,
        Err(_) => return Ok(strings),
    };

    let mut reader = Reader::from_reader(BufReader::new(part));
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut current = String::new();

    loop {
        match reader
            .read_event_into(&mut buf)
            .map_err(|e| Error::format(SHARED_STRINGS_PART, e))?
        {
            Event::Start(e) if e.name().as_ref() == b"t" => {
                current.push_str(&read_text_node(&mut reader, SHARED_STRINGS_PART)?);
            }
            Event::End(e) if e.name().as_ref() == b"si" => {
                strings.push(std::mem::take(&mut current));
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

/// Parse xl/styles.xml into the inverse style table: numFmtId to format
/// code, and style index to resolved format kind
fn parse_styles<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<StyleTable> {
    let part = archive
        .by_name(STYLES_PART)
        .map_err(|_| Error::format(STYLES_PART, "missing mandatory part"))?;

    let mut reader = Reader::from_reader(BufReader::new(part));
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    let mut num_fmts: HashMap<u32, String> = HashMap::new();
    let mut cell_xfs: Vec<(u32, HorizontalAlign)> = Vec::new();
    let mut in_cell_xfs = false;
    let mut current_xf: Option<(u32, HorizontalAlign)> = None;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| Error::format(STYLES_PART, e))?;
        match event {
            Event::Start(ref e) | Event::Empty(ref e) => match e.name().as_ref() {
                b"numFmt" => {
                    let mut id = None;
                    let mut code = None;
                    for attr in e.attributes().flatten() {
                        match attr.key.as_ref() {
                            b"numFmtId" => {
                                id = attr
                                    .unescape_value()
                                    .map_err(|e| Error::format(STYLES_PART, e))?
                                    .parse::<u32>()
                                    .ok();
                            }
                            b"formatCode" => {
                                code = Some(
                                    attr.unescape_value()
                                        .map_err(|e| Error::format(STYLES_PART, e))?
                                        .replace('\\', ""),
                                );
                            }
                            _ => {}
                        }
                    }
                    if let (Some(id), Some(code)) = (id, code) {
                        num_fmts.insert(id, code);
                    }
                }
                b"cellXfs" => in_cell_xfs = true,
                b"xf" if in_cell_xfs => {
                    let mut numfmt_id = 0u32;
                    for attr in e.attributes().flatten() {
                        if attr.key.as_ref() == b"numFmtId" {
                            numfmt_id = attr
                                .unescape_value()
                                .map_err(|e| Error::format(STYLES_PART, e))?
                                .parse::<u32>()
                                .unwrap_or(0);
                        }
                    }
                    if matches!(event, Event::Empty(_)) {
                        cell_xfs.push((numfmt_id, HorizontalAlign::None));
                    } else {
                        current_xf = Some((numfmt_id, HorizontalAlign::None));
                    }
                }
                b"alignment" if in_cell_xfs => {
                    if let Some((_, align)) = current_xf.as_mut() {
                        for attr in e.attributes().flatten() {
                            if attr.key.as_ref() == b"horizontal" {
                                let value = attr
                                    .unescape_value()
                                    .map_err(|e| Error::format(STYLES_PART, e))?;
                                *align = HorizontalAlign::from_keyword(&value);
                            }
                        }
                    }
                }
                _ => {}
            },
            Event::End(e) => match e.name().as_ref() {
                b"cellXfs" => in_cell_xfs = false,
                b"xf" => {
                    if let Some(xf) = current_xf.take() {
                        cell_xfs.push(xf);
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(StyleTable::from_parts(&num_fmts, &cell_xfs))
}

/// Title of the first sheet from xl/workbook.xml, tolerated absent
fn first_sheet_title<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<Option<String>> {
    let part = match archive.by_name("xl/workbook.xml") {
        Ok(file) => file,
        Err(_) => return Ok(None),
    };

    let mut reader = Reader::from_reader(BufReader::new(part));
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    loop {
        match reader
            .read_event_into(&mut buf)
            .map_err(|e| Error::format("xl/workbook.xml", e))?
        {
            Event::Start(e) | Event::Empty(e) if e.name().as_ref() == b"sheet" => {
                for attr in e.attributes().flatten() {
                    if attr.key.as_ref() == b"name" {
                        let name = attr
                            .unescape_value()
                            .map_err(|e| Error::format("xl/workbook.xml", e))?;
                        return Ok(Some(name.to_string()));
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(None)
}

fn parse_sheet<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    title: String,
    styles: &StyleTable,
    shared_strings: &[String],
) -> Result<Sheet> {
    let part = archive
        .by_name(SHEET_PART)
        .map_err(|_| Error::format(SHEET_PART, "missing mandatory part"))?;

    let mut reader = Reader::from_reader(BufReader::new(part));
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    let mut sheet = Sheet::new(title);
    // Fallback coordinates for cells without an r attribute
    let mut current_row = 0u32;
    let mut next_col = 1u32;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| Error::format(SHEET_PART, e))?;
        match event {
            Event::Start(ref e) | Event::Empty(ref e) if e.name().as_ref() == b"row" => {
                let mut parsed = None;
                for attr in e.attributes().flatten() {
                    if attr.key.as_ref() == b"r" {
                        parsed = Some(
                            attr.unescape_value()
                                .map_err(|e| Error::format(SHEET_PART, e))?
                                .parse::<u32>()
                                .map_err(|e| Error::format(SHEET_PART, e))?,
                        );
                    }
                }
                current_row = parsed.unwrap_or(current_row + 1).max(1);
                next_col = 1;
                // Even a cell-less row element counts as a present row
                sheet.mark_row(current_row);
            }
            Event::Start(ref e) | Event::Empty(ref e) if e.name().as_ref() == b"c" => {
                let mut reference = None;
                let mut style = 0u32;
                let mut type_code = String::new();
                for attr in e.attributes().flatten() {
                    match attr.key.as_ref() {
                        b"r" => {
                            reference = Some(
                                attr.unescape_value()
                                    .map_err(|e| Error::format(SHEET_PART, e))?
                                    .to_string(),
                            );
                        }
                        b"s" => {
                            style = attr
                                .unescape_value()
                                .map_err(|e| Error::format(SHEET_PART, e))?
                                .parse::<u32>()
                                .map_err(|e| Error::format(SHEET_PART, e))?;
                        }
                        b"t" => {
                            type_code = attr
                                .unescape_value()
                                .map_err(|e| Error::format(SHEET_PART, e))?
                                .to_string();
                        }
                        _ => {}
                    }
                }

                let (row, col) = match reference.as_deref() {
                    Some(r) => parse_cell_ref(r)
                        .ok_or_else(|| Error::format(SHEET_PART, format!("bad cell ref {r}")))?,
                    None => (current_row.max(1), next_col),
                };
                next_col = col + 1;

                let literal = if matches!(event, Event::Start(_)) {
                    read_cell_body(&mut reader)?
                } else {
                    CellBody::default()
                };

                let value =
                    typed_value(&type_code, literal, styles.kind_of(style), shared_strings)?;
                sheet.set(row, col, value, style);
            }
            Event::End(ref e) if e.name().as_ref() == b"worksheet" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(sheet)
}

#[derive(Default)]
struct CellBody {
    value_text: Option<String>,
    inline_text: Option<String>,
}

/// Collect the `<v>` text and/or `<is>` runs of one cell element
fn read_cell_body<R: BufRead>(reader: &mut Reader<R>) -> Result<CellBody> {
    let mut body = CellBody::default();
    let mut buf = Vec::new();

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| Error::format(SHEET_PART, e))?;
        match event {
            Event::Start(ref e) => match e.name().as_ref() {
                b"v" => body.value_text = Some(read_text_node(reader, SHEET_PART)?),
                b"is" => {
                    let mut text = String::new();
                    let mut is_buf = Vec::new();
                    loop {
                        match reader
                            .read_event_into(&mut is_buf)
                            .map_err(|e| Error::format(SHEET_PART, e))?
                        {
                            Event::Start(ref t) if t.name().as_ref() == b"t" => {
                                text.push_str(&read_text_node(reader, SHEET_PART)?);
                            }
                            Event::End(ref t) if t.name().as_ref() == b"is" => break,
                            Event::Eof => break,
                            _ => {}
                        }
                        is_buf.clear();
                    }
                    body.inline_text = Some(text);
                }
                _ => {}
            },
            Event::Empty(ref e) => match e.name().as_ref() {
                b"v" => body.value_text = Some(String::new()),
                b"is" => body.inline_text = Some(String::new()),
                _ => {}
            },
            Event::End(ref e) if e.name().as_ref() == b"c" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(body)
}

/// Reinterpret a cell's literal content through its type code and the
/// format kind resolved from its style
fn typed_value(
    type_code: &str,
    body: CellBody,
    kind: FormatKind,
    shared_strings: &[String],
) -> Result<Value> {
    match type_code {
        "inlineStr" => Ok(Value::Text(body.inline_text.unwrap_or_default())),
        "b" => {
            let text = body.value_text.unwrap_or_default();
            Ok(Value::Bool(text == "1"))
        }
        "s" => {
            let text = body.value_text.unwrap_or_default();
            let index = text
                .parse::<usize>()
                .map_err(|_| Error::format(SHEET_PART, format!("bad shared string index {text}")))?;
            let value = shared_strings.get(index).ok_or_else(|| {
                Error::format(SHEET_PART, format!("shared string index {index} out of range"))
            })?;
            Ok(Value::Text(value.clone()))
        }
        "" | "n" => {
            let Some(text) = body.value_text else {
                return Ok(Value::Null);
            };
            if text.contains('.') || text.contains('e') || text.contains('E') {
                let number = text
                    .parse::<f64>()
                    .map_err(|_| Error::format(SHEET_PART, format!("bad number {text}")))?;
                match kind {
                    FormatKind::General => Ok(Value::Float(number)),
                    FormatKind::Date => serial_to_date(number)
                        .map(Value::Date)
                        .ok_or_else(|| Error::format(SHEET_PART, format!("bad date serial {text}"))),
                    FormatKind::DateTimeMinutes => serial_to_datetime(number, true)
                        .map(Value::DateTime)
                        .ok_or_else(|| Error::format(SHEET_PART, format!("bad date serial {text}"))),
                    FormatKind::DateTimeSeconds => serial_to_datetime(number, false)
                        .map(Value::DateTime)
                        .ok_or_else(|| Error::format(SHEET_PART, format!("bad date serial {text}"))),
                }
            } else {
                let number = text
                    .parse::<i64>()
                    .map_err(|_| Error::format(SHEET_PART, format!("bad number {text}")))?;
                Ok(Value::Int(number))
            }
        }
        other => Err(Error::format(
            SHEET_PART,
            format!("unrecognized cell type code {other}"),
        )),
    }
}

fn read_text_node<R: BufRead>(reader: &mut Reader<R>, part: &str) -> Result<String> {
    let mut buf = Vec::new();
    let mut text = String::new();
    loop {
        match reader
            .read_event_into(&mut buf)
            .map_err(|e| Error::format(part, e))?
        {
            Event::Text(e) => text.push_str(&e.unescape().map_err(|e| Error::format(part, e))?),
            Event::CData(e) => text.push_str(&String::from_utf8_lossy(e.as_ref())),
            Event::End(_) => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(text)
}
