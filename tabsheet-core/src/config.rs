//! Codec configuration
//!
//! All defaults live here as an explicit configuration object passed into
//! each operation; there is no process-global mutable state.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Configuration for the record adapter and package writer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Number format registered for date cells
    pub date_format: String,
    /// Number format registered for date-time cells. The default carries
    /// no seconds component, so date-times round-trip to the minute;
    /// configure a seconds-capable format (e.g. "d.mm.yy h:mm:ss") when
    /// exact round-trips are required.
    pub datetime_format: String,
    /// Non-empty stand-in written for true empty-string values, so they
    /// stay distinguishable from null (which is cell absence)
    pub empty_placeholder: String,
    /// Title of the data sheet
    pub sheet_title: String,
    /// Title of the optional legend sheet
    pub legend_title: String,
    /// Creator recorded in docProps/core.xml
    pub creator: String,
    /// Right-align numeric and date cells
    pub align_numeric: bool,
    /// Free-text annotation lines written to a second sheet when present
    pub legend: Option<Vec<String>>,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            date_format: "d.mm.yy".to_string(),
            datetime_format: "d.mm.yy h:mm".to_string(),
            empty_placeholder: " ".to_string(),
            sheet_title: "data".to_string(),
            legend_title: "legend".to_string(),
            creator: "tabsheet".to_string(),
            align_numeric: false,
            legend: None,
        }
    }
}

impl CodecConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let config: CodecConfig = toml::from_str(&content)
            .map_err(|e| Error::format(path.display().to_string(), e))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CodecConfig::default();
        assert_eq!(config.date_format, "d.mm.yy");
        assert_eq!(config.datetime_format, "d.mm.yy h:mm");
        assert_eq!(config.empty_placeholder, " ");
        assert!(!config.align_numeric);
        assert!(config.legend.is_none());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: CodecConfig =
            toml::from_str("datetime_format = \"d.mm.yy h:mm:ss\"").unwrap();
        assert_eq!(config.datetime_format, "d.mm.yy h:mm:ss");
        assert_eq!(config.sheet_title, "data");
    }
}
