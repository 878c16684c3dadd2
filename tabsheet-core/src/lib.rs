//! tabsheet-core: record-oriented XLSX codec
//!
//! Encodes a sequence of flat records (column name to scalar value) into
//! a minimal OOXML `.xlsx` package and decodes such packages back into
//! the same record shape, without a third-party spreadsheet library.
//! Each encode or decode call is independent and runs to completion in
//! memory; nothing is shared between calls.

pub mod config;
pub mod error;
pub mod reader;
pub mod records;
pub mod style;
pub mod workbook;
pub mod writer;

pub use config::CodecConfig;
pub use error::{Error, Result};
pub use reader::read_workbook;
pub use records::{Record, decode_records, encode_records, read_records, write_records};
pub use style::{FormatKind, HorizontalAlign, StyleTable};
pub use workbook::{Cell, Sheet, Value, Workbook};
pub use writer::write_workbook;
