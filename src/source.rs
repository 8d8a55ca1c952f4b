//! File-pattern sources: glob-resolved CSV inputs.
//!
//! A source is declared under `sources.<name>` in the configuration with a
//! `file` glob pattern and optional reader `kwargs`. Construction resolves
//! the pattern eagerly: the file list is globbed, sorted, and
//! containment-checked immediately, so a typo'd pattern fails before any
//! pipeline runs.

use std::path::{Path, PathBuf};

use polars::prelude::DataFrame;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::io::{self, CsvReadSettings};

/// A named set of input files matched by one glob pattern.
#[derive(Debug, Clone)]
pub struct Source {
    name: String,
    files: Vec<PathBuf>,
    settings: CsvReadSettings,
    dfs: Vec<DataFrame>,
}

impl Source {
    /// Resolve the source named `name` from configuration. The glob must
    /// match at least one regular file inside the configuration root.
    pub fn new(name: &str, config: &Config) -> Result<Self> {
        let file_key = format!("sources.{name}.file");
        let pattern = config.resolve_path(&file_key)?;
        let pattern_str = pattern.to_string_lossy();

        let mut files = Vec::new();
        for entry in glob::glob(&pattern_str)? {
            let path = entry?;
            if path.is_file() {
                files.push(path);
            }
        }
        files.sort();

        if files.is_empty() {
            return Err(Error::config(
                file_key,
                format!("pattern '{pattern_str}' matched no files"),
            ));
        }
        for file in &files {
            config.ensure_within_root(file, &file_key)?;
        }

        let kwargs_key = format!("sources.{name}.kwargs");
        let settings = CsvReadSettings::from_kwargs(&config.kwargs(&kwargs_key)?, &kwargs_key)?;

        Ok(Self {
            name: name.to_owned(),
            files,
            settings,
            dfs: Vec::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The matched input files, in sorted order.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Tables drawn by the last [`draw`](Self::draw) call.
    pub fn tables(&self) -> &[DataFrame] {
        &self.dfs
    }

    /// Read input files into fresh tables, replacing any previously drawn
    /// set. `None` draws every matched file in order; `Some(i)` draws only
    /// the `i`-th file.
    pub fn draw(&mut self, index: Option<usize>) -> Result<&[DataFrame]> {
        let selected: Vec<&PathBuf> = match index {
            None => self.files.iter().collect(),
            Some(i) => {
                let file = self.files.get(i).ok_or(Error::SourceIndex {
                    index: i,
                    available: self.files.len(),
                })?;
                vec![file]
            }
        };

        let mut dfs = Vec::with_capacity(selected.len());
        for file in selected {
            tracing::debug!(source = %self.name, file = %file.display(), "reading input file");
            dfs.push(io::read_table(file, &self.settings)?);
        }
        self.dfs = dfs;
        Ok(&self.dfs)
    }
}

/// The filename stem of a path, used to derive patterned sink names and
/// concatenation keys.
pub(crate) fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}
