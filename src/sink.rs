//! File sinks: fixed or patterned CSV outputs.
//!
//! A sink is declared under `sinks.<name>` with a `file` value that is
//! either a fixed path or a pattern holding exactly one `*` in its
//! filename. Patterned sinks derive one output path per source input file
//! by substituting the input's stem for the `*`; fixed sinks always write
//! a single file.

use std::path::PathBuf;

use polars::prelude::DataFrame;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::io::{self, CsvWriteSettings};
use crate::source::{Source, stem};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Template {
    /// Write exactly one file at this path
    Fixed(PathBuf),
    /// One file per source input; `*` in `name` is replaced by the
    /// input's stem
    Patterned { dir: PathBuf, name: String },
}

/// A named output target resolved from configuration.
#[derive(Debug, Clone)]
pub struct Sink {
    name: String,
    key: String,
    template: Template,
    settings: CsvWriteSettings,
    files: Vec<PathBuf>,
    dfs: Vec<DataFrame>,
}

impl Sink {
    /// Resolve the sink named `name` from configuration. The `file` value
    /// may contain at most one `*`, and only in its final component.
    pub fn new(name: &str, config: &Config) -> Result<Self> {
        let key = format!("sinks.{name}.file");
        let path = config.resolve_path(&key)?;

        let file_name = path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let dir = path.parent().map(PathBuf::from).unwrap_or_default();

        let stars_in_name = file_name.matches('*').count();
        let stars_in_dir = dir.to_string_lossy().matches('*').count();
        let template = match (stars_in_dir, stars_in_name) {
            (0, 0) => Template::Fixed(path),
            (0, 1) => Template::Patterned {
                dir,
                name: file_name,
            },
            _ => {
                return Err(Error::config(
                    key,
                    "sink pattern may hold at most one '*', in the filename only",
                ));
            }
        };

        let kwargs_key = format!("sinks.{name}.kwargs");
        let settings = CsvWriteSettings::from_kwargs(&config.kwargs(&kwargs_key)?, &kwargs_key)?;

        Ok(Self {
            name: name.to_owned(),
            key,
            template,
            settings,
            files: Vec::new(),
            dfs: Vec::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Output paths prepared by the last [`build`](Self::build) call.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Tables queued for the next [`drain`](Self::drain) call.
    pub fn tables(&self) -> &[DataFrame] {
        &self.dfs
    }

    /// Prepare output paths, discarding any earlier set. A patterned sink
    /// derives one path per file of `source`; a fixed sink prepares its
    /// single path and ignores `source`.
    pub fn build(&mut self, source: Option<&Source>) -> Result<&[PathBuf]> {
        self.files.clear();
        self.dfs.clear();
        match &self.template {
            Template::Fixed(path) => self.files.push(path.clone()),
            Template::Patterned { dir, name } => {
                let source = source.ok_or_else(|| Error::PatternedSinkMissingSource {
                    pattern: name.clone(),
                    key: self.key.clone(),
                })?;
                for input in source.files() {
                    let derived = name.replacen('*', &stem(input), 1);
                    self.files.push(dir.join(derived));
                }
            }
        }
        Ok(&self.files)
    }

    /// Queue tables to write on the next drain.
    pub fn set_tables(&mut self, dfs: Vec<DataFrame>) {
        self.dfs = dfs;
    }

    /// Write every queued table to its prepared path, creating parent
    /// directories as needed. Returns the written tables.
    pub fn drain(&mut self) -> Result<Vec<DataFrame>> {
        if self.files.is_empty() {
            return Err(Error::SinkNotBuilt);
        }
        if self.files.len() != self.dfs.len() {
            return Err(Error::DrainPipeMismatch {
                drains: self.files.len(),
                pipes: self.dfs.len(),
            });
        }
        for (path, df) in self.files.iter().zip(self.dfs.iter_mut()) {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            tracing::debug!(sink = %self.name, file = %path.display(), "writing output file");
            io::write_table(path, df, &self.settings)?;
        }
        Ok(std::mem::take(&mut self.dfs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;
    use std::fs;
    use std::path::Path;

    fn write_file(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("mkdir");
        }
        fs::write(path, content).expect("write");
    }

    fn source_with_files(root: &Path, names: &[&str]) -> Source {
        for name in names {
            write_file(&root.join("raw").join(name), "x\n1\n");
        }
        let cfg = Config::from_str("sources:\n  raw:\n    file: raw/*.csv\n", root)
            .expect("valid document");
        Source::new("raw", &cfg).expect("source resolves")
    }

    fn sink_with(root: &Path, file: &str) -> Result<Sink> {
        let doc = format!("sinks:\n  out:\n    file: '{file}'\n");
        let cfg = Config::from_str(&doc, root).expect("valid document");
        Sink::new("out", &cfg)
    }

    #[test]
    fn test_patterned_sink_derives_one_path_per_input() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = source_with_files(dir.path(), &["a.csv", "b.csv"]);
        let mut sink = sink_with(dir.path(), "out/*_done.csv").unwrap();

        let files = sink.build(Some(&source)).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a_done.csv", "b_done.csv"]);
    }

    #[test]
    fn test_patterned_sink_requires_source() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut sink = sink_with(dir.path(), "out/*_done.csv").unwrap();
        let err = sink.build(None).unwrap_err();
        assert!(matches!(err, Error::PatternedSinkMissingSource { .. }));
    }

    #[test]
    fn test_fixed_sink_ignores_source() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = source_with_files(dir.path(), &["a.csv", "b.csv"]);
        let mut sink = sink_with(dir.path(), "out/summary.csv").unwrap();
        assert_eq!(sink.build(Some(&source)).unwrap().len(), 1);
        assert_eq!(sink.build(None).unwrap().len(), 1);
    }

    #[test]
    fn test_multiple_stars_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(sink_with(dir.path(), "out/*_*.csv").is_err());
        assert!(sink_with(dir.path(), "out*/x.csv").is_err());
    }

    #[test]
    fn test_drain_before_build_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut sink = sink_with(dir.path(), "out/x.csv").unwrap();
        assert!(matches!(sink.drain().unwrap_err(), Error::SinkNotBuilt));
    }

    #[test]
    fn test_drain_pipe_mismatch() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut sink = sink_with(dir.path(), "out/x.csv").unwrap();
        sink.build(None).unwrap();
        sink.set_tables(vec![
            df!["x" => [1i64]].expect("frame"),
            df!["x" => [2i64]].expect("frame"),
        ]);
        let err = sink.drain().unwrap_err();
        assert_eq!(err.to_string(), "Sink has 1 drains but got 2 pipes");
    }

    #[test]
    fn test_drain_creates_parent_dirs_and_writes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut sink = sink_with(dir.path(), "out/nested/x.csv").unwrap();
        sink.build(None).unwrap();
        sink.set_tables(vec![df!["x" => [1i64, 2]].expect("frame")]);
        let written = sink.drain().unwrap();
        assert_eq!(written.len(), 1);
        assert!(dir.path().join("out/nested/x.csv").is_file());
    }

    #[test]
    fn test_rebuild_replaces_prepared_paths() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = source_with_files(dir.path(), &["a.csv"]);
        let mut sink = sink_with(dir.path(), "out/*_done.csv").unwrap();
        sink.build(Some(&source)).unwrap();
        sink.build(Some(&source)).unwrap();
        assert_eq!(sink.files().len(), 1);
    }
}
