//! Minimal OOXML package writer
//!
//! Serializes a [`Workbook`] into the zip/XML structure of an `.xlsx`
//! file: content types, package relationships, workbook, styles, theme,
//! one worksheet part per sheet and the document properties. String cell
//! values are emitted verbatim as inline strings; markup-significant
//! characters in values are not escaped (a known limitation of the
//! format contract, not silently fixed here).

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::Path;

use log::debug;
use quick_xml::escape::escape;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{Error, Result};
use crate::style::{HorizontalAlign, StyleTable};
use crate::workbook::{
    Cell, Sheet, Value, Workbook, cell_ref, date_to_serial, datetime_to_serial,
};

const XML_DECL: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n";

/// Serialize a workbook to a file path. The write goes directly to the
/// target path; no atomic replace is attempted.
pub fn write_workbook(path: &Path, workbook: &Workbook) -> Result<()> {
    let file = File::create(path)?;
    write_package(BufWriter::new(file), workbook)?;
    Ok(())
}

/// Serialize a workbook into any seekable sink (used by file writes and
/// by in-memory tests alike)
pub fn write_package<W: Write + Seek>(sink: W, workbook: &Workbook) -> Result<()> {
    let mut zip = ZipWriter::new(sink);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut put = |name: &str, content: &str| -> Result<()> {
        debug!("writing package part {}", name);
        zip.start_file(name, options)?;
        zip.write_all(content.as_bytes())?;
        Ok(())
    };

    put("[Content_Types].xml", &content_types_xml(workbook))?;
    put("_rels/.rels", ROOT_RELS_XML)?;
    put("xl/workbook.xml", &workbook_xml(workbook))?;
    put("xl/_rels/workbook.xml.rels", &workbook_rels_xml(workbook))?;
    put("xl/styles.xml", &styles_xml(&workbook.styles))?;
    put("xl/theme/theme1.xml", THEME_XML)?;
    for (i, sheet) in workbook.sheets.iter().enumerate() {
        put(
            &format!("xl/worksheets/sheet{}.xml", i + 1),
            &worksheet_xml(sheet)?,
        )?;
    }
    put("docProps/core.xml", &core_props_xml(workbook))?;
    put("docProps/app.xml", APP_PROPS_XML)?;

    zip.finish()?;
    Ok(())
}

fn content_types_xml(workbook: &Workbook) -> String {
    let mut xml = String::from(XML_DECL);
    xml.push_str(
        r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
    );
    xml.push_str(
        r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#,
    );
    xml.push_str(r#"<Default Extension="xml" ContentType="application/xml"/>"#);
    xml.push_str(
        r#"<Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>"#,
    );
    for i in 0..workbook.sheets.len() {
        xml.push_str(&format!(
            r#"<Override PartName="/xl/worksheets/sheet{}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#,
            i + 1
        ));
    }
    xml.push_str(
        r#"<Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/>"#,
    );
    xml.push_str(
        r#"<Override PartName="/xl/theme/theme1.xml" ContentType="application/vnd.openxmlformats-officedocument.theme+xml"/>"#,
    );
    xml.push_str(
        r#"<Override PartName="/docProps/core.xml" ContentType="application/vnd.openxmlformats-package.core-properties+xml"/>"#,
    );
    xml.push_str(
        r#"<Override PartName="/docProps/app.xml" ContentType="application/vnd.openxmlformats-officedocument.extended-properties+xml"/>"#,
    );
    xml.push_str("</Types>");
    xml
}

const ROOT_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>
<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties" Target="docProps/core.xml"/>
<Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/extended-properties" Target="docProps/app.xml"/>
</Relationships>"#;

fn workbook_xml(workbook: &Workbook) -> String {
    let mut xml = String::from(XML_DECL);
    xml.push_str(
        r#"<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets>"#,
    );
    for (i, sheet) in workbook.sheets.iter().enumerate() {
        xml.push_str(&format!(
            r#"<sheet name="{}" sheetId="{}" r:id="rId{}"/>"#,
            escape(sheet.title.as_str()),
            i + 1,
            i + 1
        ));
    }
    xml.push_str("</sheets></workbook>");
    xml
}

fn workbook_rels_xml(workbook: &Workbook) -> String {
    let n = workbook.sheets.len();
    let mut xml = String::from(XML_DECL);
    xml.push_str(
        r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    );
    for i in 0..n {
        xml.push_str(&format!(
            r#"<Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet{}.xml"/>"#,
            i + 1,
            i + 1
        ));
    }
    xml.push_str(&format!(
        r#"<Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>"#,
        n + 1
    ));
    xml.push_str(&format!(
        r#"<Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/theme" Target="theme/theme1.xml"/>"#,
        n + 2
    ));
    xml.push_str("</Relationships>");
    xml
}

fn styles_xml(styles: &StyleTable) -> String {
    let mut xml = String::from(XML_DECL);
    xml.push_str(
        r#"<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">"#,
    );

    let custom = styles.custom_formats();
    if !custom.is_empty() {
        xml.push_str(&format!(r#"<numFmts count="{}">"#, custom.len()));
        for (id, code) in &custom {
            xml.push_str(&format!(
                r#"<numFmt numFmtId="{}" formatCode="{}"/>"#,
                id,
                escape(*code)
            ));
        }
        xml.push_str("</numFmts>");
    }

    xml.push_str(r#"<fonts count="1"><font><sz val="11"/><name val="Calibri"/></font></fonts>"#);
    xml.push_str(
        r#"<fills count="2"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill></fills>"#,
    );
    xml.push_str(
        r#"<borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders>"#,
    );
    xml.push_str(
        r#"<cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs>"#,
    );

    let entries = styles.entries();
    xml.push_str(&format!(r#"<cellXfs count="{}">"#, entries.len()));
    for entry in entries {
        let mut xf = format!(
            r#"<xf numFmtId="{}" fontId="0" fillId="0" borderId="0" xfId="0""#,
            entry.numfmt_id
        );
        if entry.numfmt_id != 0 {
            xf.push_str(r#" applyNumberFormat="1""#);
        }
        match entry.align.keyword() {
            Some(keyword) => {
                xf.push_str(r#" applyAlignment="1">"#);
                xf.push_str(&format!(r#"<alignment horizontal="{}"/>"#, keyword));
                xf.push_str("</xf>");
            }
            None => xf.push_str("/>"),
        }
        xml.push_str(&xf);
    }
    xml.push_str("</cellXfs></styleSheet>");
    xml
}

fn worksheet_xml(sheet: &Sheet) -> Result<String> {
    let mut xml = String::from(XML_DECL);
    xml.push_str(
        r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">"#,
    );

    if let Some((min_row, min_col, max_row, max_col)) = sheet.bounds() {
        xml.push_str(&format!(
            r#"<dimension ref="{}:{}"/>"#,
            cell_ref(min_row, min_col),
            cell_ref(max_row, max_col)
        ));
    }

    let widths: Vec<(u32, f64)> = sheet.column_widths().collect();
    if !widths.is_empty() {
        xml.push_str("<cols>");
        for (col, width) in widths {
            xml.push_str(&format!(
                r#"<col min="{col}" max="{col}" width="{width}" customWidth="1"/>"#,
            ));
        }
        xml.push_str("</cols>");
    }

    xml.push_str("<sheetData>");
    let mut rows: BTreeMap<u32, Vec<(u32, &Cell)>> = BTreeMap::new();
    for row in sheet.marked_rows() {
        rows.entry(row).or_default();
    }
    for (row, col, cell) in sheet.cells() {
        if cell.value.is_null() {
            // Absence of a cell node is the encoding of null
            continue;
        }
        rows.entry(row).or_default().push((col, cell));
    }
    for (row, cells) in &rows {
        if cells.is_empty() {
            // A marked row of nulls keeps its row element so it survives
            // the read back as a row, not as end-of-data
            xml.push_str(&format!(r#"<row r="{row}"/>"#));
            continue;
        }
        xml.push_str(&format!(r#"<row r="{row}">"#));
        for &(col, cell) in cells {
            xml.push_str(&cell_xml(*row, col, cell)?);
        }
        xml.push_str("</row>");
    }
    xml.push_str("</sheetData></worksheet>");
    Ok(xml)
}

fn cell_xml(row: u32, col: u32, cell: &Cell) -> Result<String> {
    let reference = cell_ref(row, col);
    let style_attr = if cell.style != 0 {
        format!(r#" s="{}""#, cell.style)
    } else {
        String::new()
    };

    let xml = match &cell.value {
        Value::Null => unreachable!("null cells are skipped by the row emitter"),
        Value::Bool(b) => format!(
            r#"<c r="{}"{} t="b"><v>{}</v></c>"#,
            reference,
            style_attr,
            if *b { 1 } else { 0 }
        ),
        Value::Int(i) => format!(r#"<c r="{}"{}><v>{}</v></c>"#, reference, style_attr, i),
        Value::Float(f) => {
            if !f.is_finite() {
                return Err(Error::value(reference, "non-finite number"));
            }
            format!(
                r#"<c r="{}"{}><v>{}</v></c>"#,
                reference,
                style_attr,
                float_literal(*f)
            )
        }
        // Inline string, written verbatim
        Value::Text(s) => format!(
            r#"<c r="{}"{} t="inlineStr"><is><t>{}</t></is></c>"#,
            reference, style_attr, s
        ),
        // Serial numbers always carry a decimal point so the reader keeps
        // them on the float path, where the style decides the type
        Value::Date(d) => format!(
            r#"<c r="{}"{}><v>{}</v></c>"#,
            reference,
            style_attr,
            float_literal(date_to_serial(*d))
        ),
        Value::DateTime(dt) => format!(
            r#"<c r="{}"{}><v>{}</v></c>"#,
            reference,
            style_attr,
            float_literal(datetime_to_serial(*dt))
        ),
    };
    Ok(xml)
}

/// Render a float with a guaranteed decimal point
fn float_literal(v: f64) -> String {
    let mut s = format!("{}", v);
    if !s.contains('.') && !s.contains('e') && !s.contains('E') {
        s.push_str(".0");
    }
    s
}

fn core_props_xml(workbook: &Workbook) -> String {
    let creator = escape(workbook.creator.as_str());
    format!(
        r#"{}<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:dcterms="http://purl.org/dc/terms/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
<dc:creator>{}</dc:creator>
<cp:lastModifiedBy>{}</cp:lastModifiedBy>
<dcterms:created xsi:type="dcterms:W3CDTF">2024-01-01T00:00:00Z</dcterms:created>
<dcterms:modified xsi:type="dcterms:W3CDTF">2024-01-01T00:00:00Z</dcterms:modified>
</cp:coreProperties>"#,
        XML_DECL, creator, creator
    )
}

const APP_PROPS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Properties xmlns="http://schemas.openxmlformats.org/officeDocument/2006/extended-properties">
<Application>tabsheet</Application>
<DocSecurity>0</DocSecurity>
<ScaleCrop>false</ScaleCrop>
<LinksUpToDate>false</LinksUpToDate>
<SharedDoc>false</SharedDoc>
<HyperlinksChanged>false</HyperlinksChanged>
<AppVersion>1.0</AppVersion>
</Properties>"#;

/// Minimal Office theme; present because consumers expect the part, its
/// content is never interpreted by this codec.
const THEME_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<a:theme xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" name="Office Theme">
<a:themeElements>
<a:clrScheme name="Office"><a:dk1><a:sysClr val="windowText" lastClr="000000"/></a:dk1><a:lt1><a:sysClr val="window" lastClr="FFFFFF"/></a:lt1><a:dk2><a:srgbClr val="44546A"/></a:dk2><a:lt2><a:srgbClr val="E7E6E6"/></a:lt2><a:accent1><a:srgbClr val="4472C4"/></a:accent1><a:accent2><a:srgbClr val="ED7D31"/></a:accent2><a:accent3><a:srgbClr val="A5A5A5"/></a:accent3><a:accent4><a:srgbClr val="FFC000"/></a:accent4><a:accent5><a:srgbClr val="5B9BD5"/></a:accent5><a:accent6><a:srgbClr val="70AD47"/></a:accent6><a:hlink><a:srgbClr val="0563C1"/></a:hlink><a:folHlink><a:srgbClr val="954F72"/></a:folHlink></a:clrScheme>
<a:fontScheme name="Office"><a:majorFont><a:latin typeface="Calibri Light"/><a:ea typeface=""/><a:cs typeface=""/></a:majorFont><a:minorFont><a:latin typeface="Calibri"/><a:ea typeface=""/><a:cs typeface=""/></a:minorFont></a:fontScheme>
<a:fmtScheme name="Office">
<a:fillStyleLst><a:solidFill><a:schemeClr val="phClr"/></a:solidFill><a:solidFill><a:schemeClr val="phClr"/></a:solidFill><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:fillStyleLst>
<a:lnStyleLst><a:ln w="6350"><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:ln><a:ln w="12700"><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:ln><a:ln w="19050"><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:ln></a:lnStyleLst>
<a:effectStyleLst><a:effectStyle><a:effectLst/></a:effectStyle><a:effectStyle><a:effectLst/></a:effectStyle><a:effectStyle><a:effectLst/></a:effectStyle></a:effectStyleLst>
<a:bgFillStyleLst><a:solidFill><a:schemeClr val="phClr"/></a:solidFill><a:solidFill><a:schemeClr val="phClr"/></a:solidFill><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:bgFillStyleLst>
</a:fmtScheme>
</a:themeElements>
<a:objectDefaults/><a:extraClrSchemeLst/>
</a:theme>"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_literal_keeps_decimal_point() {
        assert_eq!(float_literal(123.4), "123.4");
        assert_eq!(float_literal(45139.0), "45139.0");
        assert_eq!(float_literal(0.0), "0.0");
    }

    #[test]
    fn test_null_cells_are_absent_from_sheet_xml() {
        let mut sheet = Sheet::new("data");
        sheet.set(1, 1, Value::Text("a".into()), 0);
        sheet.set(2, 1, Value::Null, 0);
        sheet.set(2, 2, Value::Int(7), 0);
        let xml = worksheet_xml(&sheet).unwrap();
        assert!(xml.contains(r#"<c r="A1" t="inlineStr"><is><t>a</t></is></c>"#));
        assert!(!xml.contains(r#"r="A2""#));
        assert!(xml.contains(r#"<c r="B2"><v>7</v></c>"#));
        assert!(xml.contains(r#"<dimension ref="A1:B2"/>"#));
    }

    #[test]
    fn test_rows_without_cells_are_not_emitted() {
        let mut sheet = Sheet::new("data");
        sheet.set(1, 1, Value::Int(1), 0);
        sheet.set(5, 1, Value::Int(5), 0);
        let xml = worksheet_xml(&sheet).unwrap();
        assert!(xml.contains(r#"<row r="1">"#));
        assert!(xml.contains(r#"<row r="5">"#));
        assert!(!xml.contains(r#"<row r="2">"#));
    }

    #[test]
    fn test_marked_row_without_cells_keeps_row_element() {
        let mut sheet = Sheet::new("data");
        sheet.set(1, 1, Value::Text("a".into()), 0);
        sheet.mark_row(2);
        let xml = worksheet_xml(&sheet).unwrap();
        assert!(xml.contains(r#"<row r="2"/>"#));
        assert!(xml.contains(r#"<dimension ref="A1:A2"/>"#));
    }

    #[test]
    fn test_non_finite_float_is_rejected() {
        let mut sheet = Sheet::new("data");
        sheet.set(1, 1, Value::Float(f64::NAN), 0);
        let err = worksheet_xml(&sheet).unwrap_err();
        assert!(matches!(err, Error::Value { .. }));
    }

    #[test]
    fn test_boolean_cells_use_numeric_text() {
        let mut sheet = Sheet::new("data");
        sheet.set(1, 1, Value::Bool(true), 0);
        sheet.set(1, 2, Value::Bool(false), 0);
        let xml = worksheet_xml(&sheet).unwrap();
        assert!(xml.contains(r#"<c r="A1" t="b"><v>1</v></c>"#));
        assert!(xml.contains(r#"<c r="B1" t="b"><v>0</v></c>"#));
    }
}
