//! Lines: resolved pipelines wired between a source and a sink.
//!
//! A line is declared under `pipelines.<name>` as a sequence of stage
//! descriptors. Construction resolves every descriptor against the
//! catalogs immediately, so unknown stage kinds and function names fail
//! before any file is read. `connect` binds a source and a sink and draws
//! the inputs; `run` pushes every drawn table through the pipeline and
//! drains the results.

use std::str::FromStr;

use polars::prelude::*;

use crate::catalog::Catalog;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::sink::Sink;
use crate::source::{Source, stem};
use crate::stage::{self, Pipeline, PipelineStage, StageDescriptor};

/// How to combine per-file tables when a run collapses many inputs into
/// one output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConcatAxis {
    /// Stack rows; a `source` column records each row's input file stem
    #[default]
    Index,
    /// Join columns side by side; columns are prefixed with `<stem>:`
    Columns,
}

impl FromStr for ConcatAxis {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "index" => Ok(Self::Index),
            "columns" => Ok(Self::Columns),
            other => Err(Error::config(
                "axis",
                format!("expected 'index' or 'columns', found '{other}'"),
            )),
        }
    }
}

/// A named pipeline plus, once connected, its endpoints.
#[derive(Debug)]
pub struct Line {
    name: String,
    stages: Vec<PipelineStage>,
    pipeline: Option<Pipeline>,
    source: Option<Source>,
    sink: Option<Sink>,
}

impl Line {
    /// Resolve the pipeline named `name` from configuration against the
    /// built-in catalogs and the caller's `catalog`.
    pub fn new(name: &str, config: &Config, catalog: &Catalog) -> Result<Self> {
        let key = format!("pipelines.{name}");
        let entries = config.sequence(&key)?;

        let mut stages = Vec::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            let entry_key = format!("{key}[{i}]");
            let descriptor: StageDescriptor = serde_yaml::from_value(entry.clone())
                .map_err(|e| Error::config(entry_key.clone(), e.to_string()))?;
            stages.push(stage::resolve(&descriptor, catalog, &entry_key)?);
        }

        Ok(Self {
            name: name.to_owned(),
            stages,
            pipeline: None,
            source: None,
            sink: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Assemble the resolved stages into a pipeline. Idempotent; later
    /// calls keep the first assembly.
    pub fn build(&mut self) -> &Pipeline {
        if self.pipeline.is_none() {
            self.pipeline = Some(Pipeline::new(std::mem::take(&mut self.stages)));
        }
        self.pipeline.as_ref().unwrap_or(&EMPTY_PIPELINE)
    }

    /// Bind endpoints: build the pipeline, derive the sink's output paths
    /// from the source, and draw every input table. Returns the drawn
    /// tables.
    pub fn connect(&mut self, mut source: Source, mut sink: Sink) -> Result<Vec<DataFrame>> {
        self.build();
        sink.build(Some(&source))?;
        source.draw(None)?;
        let drawn = source.tables().to_vec();
        self.source = Some(source);
        self.sink = Some(sink);
        Ok(drawn)
    }

    /// Run the full pipeline over every input file and drain the results.
    ///
    /// With as many prepared output paths as inputs, each processed table
    /// writes to its own file. With a single output path and several
    /// inputs, the processed tables are concatenated along `axis` first.
    /// Returns the written tables.
    pub fn run(&mut self, axis: ConcatAxis) -> Result<Vec<DataFrame>> {
        self.build();
        let (source, sink) = match (self.source.as_mut(), self.sink.as_mut()) {
            (Some(source), Some(sink)) => (source, sink),
            _ => return Err(Error::LineNotConnected),
        };
        let pipeline = self.pipeline.as_ref().unwrap_or(&EMPTY_PIPELINE);

        source.draw(None)?;
        let mut processed = Vec::with_capacity(source.tables().len());
        for df in source.tables() {
            processed.push(pipeline.apply(df, None)?);
        }

        let fan_out = sink.files().len() > 1 || source.files().len() == 1;
        let outputs = if fan_out {
            processed
        } else {
            let keys: Vec<String> = source.files().iter().map(|p| stem(p)).collect();
            vec![concat_tables(processed, &keys, axis)?]
        };

        sink.set_tables(outputs);
        let written = sink.drain()?;
        tracing::info!(
            line = %self.name,
            inputs = source.files().len(),
            outputs = written.len(),
            "line run complete"
        );
        Ok(written)
    }

    /// Run a stage prefix over a single input file, without draining.
    /// `to_stage` of `None` or `Some(0)` runs every stage; `Some(k)` runs
    /// the first `k`.
    pub fn run_one(&mut self, source_index: usize, to_stage: Option<usize>) -> Result<DataFrame> {
        self.build();
        let source = self.source.as_mut().ok_or(Error::LineNotConnected)?;
        let pipeline = self.pipeline.as_ref().unwrap_or(&EMPTY_PIPELINE);

        source.draw(Some(source_index))?;
        let df = &source.tables()[0];
        pipeline.apply(df, to_stage)
    }

    pub fn source(&self) -> Option<&Source> {
        self.source.as_ref()
    }

    pub fn sink(&self) -> Option<&Sink> {
        self.sink.as_ref()
    }
}

static EMPTY_PIPELINE: Pipeline = Pipeline::empty();

/// Combine per-file tables into one, keyed by each input's file stem.
fn concat_tables(tables: Vec<DataFrame>, keys: &[String], axis: ConcatAxis) -> Result<DataFrame> {
    let mut iter = keys.iter().zip(tables);
    let (first_key, first) = match iter.next() {
        Some(pair) => pair,
        None => return Ok(DataFrame::empty()),
    };

    match axis {
        ConcatAxis::Index => {
            let mut acc = keyed_rows(first, first_key)?;
            for (key, df) in iter {
                acc.vstack_mut(&keyed_rows(df, key)?)?;
            }
            Ok(acc)
        }
        ConcatAxis::Columns => {
            let mut acc = prefixed_columns(first, first_key)?;
            for (key, df) in iter {
                let prefixed = prefixed_columns(df, key)?;
                acc = acc.hstack(prefixed.get_columns())?;
            }
            Ok(acc)
        }
    }
}

/// Prepend a `source` column holding `key` to every row.
fn keyed_rows(df: DataFrame, key: &str) -> Result<DataFrame> {
    let tag = Column::new("source".into(), vec![key; df.height()]);
    let mut columns = vec![tag];
    columns.extend(df.get_columns().iter().cloned());
    Ok(DataFrame::new(columns)?)
}

/// Rename every column to `<key>:<name>`.
fn prefixed_columns(df: DataFrame, key: &str) -> Result<DataFrame> {
    let mut out = df;
    let names: Vec<String> = out
        .get_column_names()
        .iter()
        .map(|n| n.to_string())
        .collect();
    for name in names {
        out.rename(&name, format!("{key}:{name}").into())?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Args;
    use std::fs;
    use std::path::Path;

    const DOC: &str = r#"
sources:
  raw:
    file: raw/*.csv
sinks:
  split:
    file: out/*_done.csv
  merged:
    file: out/all.csv
pipelines:
  prices:
    - type: transform
      function: add_to_col
      kwargs:
        col_name: prices
        val: 1.5
    - type: pdpipe
      function: col_drop
      kwargs:
        columns: [inventory]
"#;

    fn write_file(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("mkdir");
        }
        fs::write(path, content).expect("write");
    }

    fn seed_inputs(root: &Path) {
        write_file(
            &root.join("raw/jan.csv"),
            "prices,inventory\n20.0,3\n21.0,7\n",
        );
        write_file(&root.join("raw/feb.csv"), "prices,inventory\n19.0,2\n");
    }

    fn catalog() -> Catalog {
        let mut catalog = Catalog::new("user");
        catalog.register_transform("add_to_col", |df: DataFrame, args: &Args| {
            let column = args.str("col_name")?;
            let val = args.f64("val")?;
            Ok(df.lazy().with_column(col(column) + lit(val)).collect()?)
        });
        catalog
    }

    fn connected(root: &Path, sink_name: &str) -> Line {
        let cfg = Config::from_str(DOC, root).expect("valid document");
        let source = Source::new("raw", &cfg).expect("source resolves");
        let sink = Sink::new(sink_name, &cfg).expect("sink resolves");
        let mut line = Line::new("prices", &cfg, &catalog()).expect("line resolves");
        line.connect(source, sink).expect("connect draws inputs");
        line
    }

    #[test]
    fn test_unknown_function_fails_at_construction() {
        let cfg = Config::from_str(DOC, "/data/project").expect("valid document");
        let err = Line::new("prices", &cfg, &Catalog::new("user")).unwrap_err();
        assert!(matches!(err, Error::FunctionNotFound { .. }));
    }

    #[test]
    fn test_bad_descriptor_cites_entry_index() {
        let doc = "pipelines:\n  p:\n    - type: shuffle\n";
        let cfg = Config::from_str(doc, "/data/project").expect("valid document");
        let err = Line::new("p", &cfg, &catalog()).unwrap_err();
        assert!(err.to_string().contains("pipelines.p[0]"));
    }

    #[test]
    fn test_run_before_connect_fails() {
        let cfg = Config::from_str(DOC, "/data/project").expect("valid document");
        let mut line = Line::new("prices", &cfg, &catalog()).expect("line resolves");
        assert!(matches!(
            line.run(ConcatAxis::Index).unwrap_err(),
            Error::LineNotConnected
        ));
        assert!(matches!(
            line.run_one(0, None).unwrap_err(),
            Error::LineNotConnected
        ));
    }

    #[test]
    fn test_run_fans_out_with_patterned_sink() {
        let dir = tempfile::tempdir().expect("tempdir");
        seed_inputs(dir.path());
        let mut line = connected(dir.path(), "split");

        let written = line.run(ConcatAxis::Index).unwrap();
        assert_eq!(written.len(), 2);
        assert!(dir.path().join("out/feb_done.csv").is_file());
        assert!(dir.path().join("out/jan_done.csv").is_file());
        for df in &written {
            assert!(df.column("inventory").is_err());
        }
    }

    #[test]
    fn test_run_concatenates_rows_into_fixed_sink() {
        let dir = tempfile::tempdir().expect("tempdir");
        seed_inputs(dir.path());
        let mut line = connected(dir.path(), "merged");

        let written = line.run(ConcatAxis::Index).unwrap();
        assert_eq!(written.len(), 1);
        let merged = &written[0];
        assert_eq!(merged.height(), 3);

        let tags = merged.column("source").unwrap().str().unwrap();
        let tags: Vec<_> = tags.into_iter().flatten().collect();
        assert_eq!(tags, vec!["feb", "jan", "jan"]);
        assert!(dir.path().join("out/all.csv").is_file());
    }

    #[test]
    fn test_run_concatenates_columns() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_file(&dir.path().join("raw/jan.csv"), "prices,inventory\n20.0,3\n");
        write_file(&dir.path().join("raw/feb.csv"), "prices,inventory\n19.0,2\n");
        let mut line = connected(dir.path(), "merged");

        let written = line.run(ConcatAxis::Columns).unwrap();
        let merged = &written[0];
        assert!(merged.column("feb:prices").is_ok());
        assert!(merged.column("jan:prices").is_ok());
        assert_eq!(merged.shape(), (1, 2));
    }

    #[test]
    fn test_run_one_prefix_skips_later_stages() {
        let dir = tempfile::tempdir().expect("tempdir");
        seed_inputs(dir.path());
        let mut line = connected(dir.path(), "split");

        // only the first stage runs, so inventory survives
        let partial = line.run_one(0, Some(1)).unwrap();
        assert!(partial.column("inventory").is_ok());
        let first = partial.column("prices").unwrap().f64().unwrap().get(0);
        assert_eq!(first, Some(20.5));

        // no file was written
        assert!(!dir.path().join("out").exists());

        // None and Some(0) run the whole pipeline
        for to_stage in [None, Some(0)] {
            let full = line.run_one(0, to_stage).unwrap();
            assert!(full.column("inventory").is_err());
        }
    }

    #[test]
    fn test_rerun_is_deterministic() {
        let dir = tempfile::tempdir().expect("tempdir");
        seed_inputs(dir.path());
        let mut line = connected(dir.path(), "merged");

        let first = line.run(ConcatAxis::Index).unwrap();
        let second = line.run(ConcatAxis::Index).unwrap();
        assert!(first[0].equals(&second[0]));
    }

    #[test]
    fn test_concat_axis_from_str() {
        assert_eq!(ConcatAxis::from_str("index").unwrap(), ConcatAxis::Index);
        assert_eq!(
            ConcatAxis::from_str("columns").unwrap(),
            ConcatAxis::Columns
        );
        assert!(ConcatAxis::from_str("depth").is_err());
    }
}
