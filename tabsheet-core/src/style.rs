//! Style table: deduplicated (number format, alignment) pairs

use std::collections::HashMap;

/// First user-definable numFmt id in the OOXML numbering-format space
pub const CUSTOM_NUMFMT_BASE: u32 = 164;

/// The built-in format behind reserved style index 0
pub const GENERAL_FORMAT: &str = "General";

/// Horizontal cell alignment. `None` leaves the application default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HorizontalAlign {
    #[default]
    None,
    Left,
    Right,
}

impl HorizontalAlign {
    pub fn keyword(self) -> Option<&'static str> {
        match self {
            HorizontalAlign::None => None,
            HorizontalAlign::Left => Some("left"),
            HorizontalAlign::Right => Some("right"),
        }
    }

    pub fn from_keyword(keyword: &str) -> Self {
        match keyword {
            "left" => HorizontalAlign::Left,
            "right" => HorizontalAlign::Right,
            _ => HorizontalAlign::None,
        }
    }
}

/// How a numeric cell value is reinterpreted on read, resolved once per
/// style index when the table is built rather than re-derived per cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormatKind {
    #[default]
    General,
    Date,
    /// Date-time format without a seconds component; values round-trip
    /// to the minute only.
    DateTimeMinutes,
    DateTimeSeconds,
}

/// Classify a number-format code into the closed set of kinds the reader
/// distinguishes.
pub fn classify_format(code: &str) -> FormatKind {
    let lower = code.to_ascii_lowercase();
    if lower.contains("h:mm:ss") {
        FormatKind::DateTimeSeconds
    } else if lower.contains("h:mm") {
        FormatKind::DateTimeMinutes
    } else if lower.contains("yy") {
        FormatKind::Date
    } else {
        FormatKind::General
    }
}

/// Format code for a built-in numFmt id (the subset relevant to typed
/// reconstruction; ids without a listed code behave as General).
pub fn builtin_format(id: u32) -> Option<&'static str> {
    let code = match id {
        0 => "General",
        1 => "0",
        2 => "0.00",
        3 => "#,##0",
        4 => "#,##0.00",
        9 => "0%",
        10 => "0.00%",
        11 => "0.00E+00",
        14 => "mm-dd-yy",
        15 => "d-mmm-yy",
        16 => "d-mmm",
        17 => "mmm-yy",
        18 => "h:mm AM/PM",
        19 => "h:mm:ss AM/PM",
        20 => "h:mm",
        21 => "h:mm:ss",
        22 => "m/d/yy h:mm",
        45 => "mm:ss",
        46 => "[h]:mm:ss",
        47 => "mmss.0",
        49 => "@",
        _ => return None,
    };
    Some(code)
}

/// One entry in the style table, referenced from cells by index
#[derive(Debug, Clone)]
pub struct StyleEntry {
    pub number_format: String,
    pub numfmt_id: u32,
    pub align: HorizontalAlign,
    pub kind: FormatKind,
}

/// Deduplicating style table. Index 0 is always the built-in General
/// format with no alignment.
#[derive(Debug, Clone)]
pub struct StyleTable {
    entries: Vec<StyleEntry>,
    by_key: HashMap<(String, HorizontalAlign), u32>,
    custom_ids: HashMap<String, u32>,
}

impl Default for StyleTable {
    fn default() -> Self {
        Self::new()
    }
}

impl StyleTable {
    pub fn new() -> Self {
        let general = StyleEntry {
            number_format: GENERAL_FORMAT.to_string(),
            numfmt_id: 0,
            align: HorizontalAlign::None,
            kind: FormatKind::General,
        };
        let mut by_key = HashMap::new();
        by_key.insert((GENERAL_FORMAT.to_string(), HorizontalAlign::None), 0);
        Self {
            entries: vec![general],
            by_key,
            custom_ids: HashMap::new(),
        }
    }

    /// Map a (number format, alignment) pair to a stable style index,
    /// allocating a cellXfs entry and, for not-yet-seen non-General format
    /// strings, the next custom numFmt id.
    pub fn intern(&mut self, number_format: &str, align: HorizontalAlign) -> u32 {
        let key = (number_format.to_string(), align);
        if let Some(&index) = self.by_key.get(&key) {
            return index;
        }

        // "General" is algebraically index 0's format and must never be
        // registered as a custom numFmt, even when requested explicitly.
        let numfmt_id = if number_format == GENERAL_FORMAT {
            0
        } else if let Some(&id) = self.custom_ids.get(number_format) {
            id
        } else {
            let id = CUSTOM_NUMFMT_BASE + self.custom_ids.len() as u32;
            self.custom_ids.insert(number_format.to_string(), id);
            id
        };

        let index = self.entries.len() as u32;
        self.entries.push(StyleEntry {
            number_format: number_format.to_string(),
            numfmt_id,
            align,
            kind: classify_format(number_format),
        });
        self.by_key.insert(key, index);
        index
    }

    /// Build the inverse table from the parsed numFmts and cellXfs blocks
    /// of a package. Each cellXfs entry resolves its numFmtId through the
    /// custom table first, then the built-in registry.
    pub fn from_parts(
        num_fmts: &HashMap<u32, String>,
        cell_xfs: &[(u32, HorizontalAlign)],
    ) -> Self {
        let mut table = Self::new();
        table.entries.clear();
        table.by_key.clear();

        for &(numfmt_id, align) in cell_xfs {
            let code = num_fmts
                .get(&numfmt_id)
                .map(String::as_str)
                .or_else(|| builtin_format(numfmt_id))
                .unwrap_or(GENERAL_FORMAT);
            let index = table.entries.len() as u32;
            table.entries.push(StyleEntry {
                number_format: code.to_string(),
                numfmt_id,
                align,
                kind: classify_format(code),
            });
            table
                .by_key
                .entry((code.to_string(), align))
                .or_insert(index);
            if numfmt_id >= CUSTOM_NUMFMT_BASE {
                table.custom_ids.entry(code.to_string()).or_insert(numfmt_id);
            }
        }

        if table.entries.is_empty() {
            // A package without cellXfs still resolves style 0 to General
            return Self::new();
        }
        table
    }

    pub fn entries(&self) -> &[StyleEntry] {
        &self.entries
    }

    /// Format kind for a style index; unknown indices behave as General
    pub fn kind_of(&self, style: u32) -> FormatKind {
        self.entries
            .get(style as usize)
            .map(|e| e.kind)
            .unwrap_or_default()
    }

    /// Registered custom formats as (numFmt id, code), ordered by id
    pub fn custom_formats(&self) -> Vec<(u32, &str)> {
        let mut formats: Vec<(u32, &str)> = self
            .custom_ids
            .iter()
            .map(|(code, &id)| (id, code.as_str()))
            .collect();
        formats.sort_by_key(|&(id, _)| id);
        formats
    }
}
