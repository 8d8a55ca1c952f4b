//! CSV reading and writing with pass-through options from configuration.
//!
//! Source and sink `kwargs` mappings are decoded into typed settings here.
//! Unknown option names are a configuration error rather than being
//! silently ignored.

use std::fs::File;
use std::path::Path;

use polars::prelude::*;
use serde_yaml::{Mapping, Value};

use crate::config::value_kind;
use crate::error::{Error, Result};

/// Options recognized under `sources.<name>.kwargs`.
#[derive(Debug, Clone)]
pub struct CsvReadSettings {
    pub delimiter: u8,
    pub has_header: bool,
    pub skip_rows: usize,
}

impl Default for CsvReadSettings {
    fn default() -> Self {
        Self {
            delimiter: b',',
            has_header: true,
            skip_rows: 0,
        }
    }
}

impl CsvReadSettings {
    /// Decode reader options from a kwargs mapping. `key` is the
    /// configuration path of the mapping, used in error messages.
    pub fn from_kwargs(kwargs: &Mapping, key: &str) -> Result<Self> {
        let mut settings = Self::default();
        for (name, value) in kwargs {
            let name = name.as_str().unwrap_or_default();
            match name {
                "delimiter" => settings.delimiter = delimiter(value, key, name)?,
                "has_header" => {
                    settings.has_header = value
                        .as_bool()
                        .ok_or_else(|| option_error(key, name, "a boolean", value))?;
                }
                "skip_rows" => {
                    settings.skip_rows = value
                        .as_u64()
                        .ok_or_else(|| option_error(key, name, "a non-negative integer", value))?
                        as usize;
                }
                other => {
                    return Err(Error::config(
                        format!("{key}.{other}"),
                        "unknown reader option (recognized: delimiter, has_header, skip_rows)",
                    ));
                }
            }
        }
        Ok(settings)
    }
}

/// Options recognized under `sinks.<name>.kwargs`.
#[derive(Debug, Clone)]
pub struct CsvWriteSettings {
    pub delimiter: u8,
    pub include_header: bool,
}

impl Default for CsvWriteSettings {
    fn default() -> Self {
        Self {
            delimiter: b',',
            include_header: true,
        }
    }
}

impl CsvWriteSettings {
    pub fn from_kwargs(kwargs: &Mapping, key: &str) -> Result<Self> {
        let mut settings = Self::default();
        for (name, value) in kwargs {
            let name = name.as_str().unwrap_or_default();
            match name {
                "delimiter" => settings.delimiter = delimiter(value, key, name)?,
                "include_header" => {
                    settings.include_header = value
                        .as_bool()
                        .ok_or_else(|| option_error(key, name, "a boolean", value))?;
                }
                other => {
                    return Err(Error::config(
                        format!("{key}.{other}"),
                        "unknown writer option (recognized: delimiter, include_header)",
                    ));
                }
            }
        }
        Ok(settings)
    }
}

fn delimiter(value: &Value, key: &str, name: &str) -> Result<u8> {
    value
        .as_str()
        .and_then(|s| s.as_bytes().first().copied().filter(|_| s.len() == 1))
        .ok_or_else(|| option_error(key, name, "a single character", value))
}

fn option_error(key: &str, name: &str, expected: &str, found: &Value) -> Error {
    Error::config(
        format!("{key}.{name}"),
        format!("expected {expected}, found {}", value_kind(found)),
    )
}

/// Read one delimited file into a dataframe.
pub fn read_table(path: &Path, settings: &CsvReadSettings) -> Result<DataFrame> {
    let df = CsvReadOptions::default()
        .with_has_header(settings.has_header)
        .with_skip_rows(settings.skip_rows)
        .with_parse_options(CsvParseOptions::default().with_separator(settings.delimiter))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;
    Ok(df)
}

/// Write one dataframe to a delimited file.
pub fn write_table(path: &Path, df: &mut DataFrame, settings: &CsvWriteSettings) -> Result<()> {
    let file = File::create(path)?;
    CsvWriter::new(file)
        .include_header(settings.include_header)
        .with_separator(settings.delimiter)
        .finish(df)?;
    Ok(())
}
