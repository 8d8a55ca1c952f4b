use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::str::FromStr as _;

use flowline::catalog::Catalog;
use flowline::config::{Config, ROOT_ENV};
use flowline::line::{ConcatAxis, Line};
use flowline::sink::Sink;
use flowline::source::Source;

#[derive(Parser)]
#[command(name = "flowline", about = "Config-driven dataframe pipeline runner")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a pipeline from source to sink and write the outputs
    Run {
        /// Path to the YAML configuration file
        #[arg(short, long, default_value = "config.yaml")]
        config: PathBuf,

        /// Pipeline name under `pipelines`
        #[arg(short, long)]
        pipeline: String,

        /// Source name under `sources`
        #[arg(short, long)]
        source: String,

        /// Sink name under `sinks`
        #[arg(long)]
        sink: String,

        /// Concatenation axis when several inputs feed one output file
        /// ('index' or 'columns')
        #[arg(long, default_value = "index")]
        axis: String,

        /// Configuration root directory. Defaults to $FLOWLINE_DIR, then
        /// the config file's directory.
        #[arg(long, env = ROOT_ENV)]
        root: Option<PathBuf>,
    },
    /// Run a stage prefix over one input file and print the result,
    /// without writing anything
    Test {
        /// Path to the YAML configuration file
        #[arg(short, long, default_value = "config.yaml")]
        config: PathBuf,

        /// Pipeline name under `pipelines`
        #[arg(short, long)]
        pipeline: String,

        /// Source name under `sources`
        #[arg(short, long)]
        source: String,

        /// Sink name under `sinks` (used to check the wiring, never written)
        #[arg(long)]
        sink: String,

        /// Index of the input file to process
        #[arg(long, default_value_t = 0)]
        index: usize,

        /// Number of leading stages to run (0 runs every stage)
        #[arg(long, default_value_t = 0)]
        to_stage: usize,

        /// Configuration root directory. Defaults to $FLOWLINE_DIR, then
        /// the config file's directory.
        #[arg(long, env = ROOT_ENV)]
        root: Option<PathBuf>,
    },
    /// Resolve every source, sink, and pipeline in a configuration file
    /// and report problems without touching any data
    Validate {
        /// Path to the YAML configuration file
        #[arg(short, long, default_value = "config.yaml")]
        config: PathBuf,

        /// Configuration root directory. Defaults to $FLOWLINE_DIR, then
        /// the config file's directory.
        #[arg(long, env = ROOT_ENV)]
        root: Option<PathBuf>,
    },
}

pub fn run_command(command: Commands) -> Result<()> {
    match command {
        Commands::Run {
            config,
            pipeline,
            source,
            sink,
            axis,
            root,
        } => handle_run(&config, &pipeline, &source, &sink, &axis, root),
        Commands::Test {
            config,
            pipeline,
            source,
            sink,
            index,
            to_stage,
            root,
        } => handle_test(&config, &pipeline, &source, &sink, index, to_stage, root),
        Commands::Validate { config, root } => handle_validate(&config, root),
    }
}

fn load_config(path: &Path, root: Option<PathBuf>) -> Result<Config> {
    let config = match root {
        Some(root) => Config::load_with_root(path, root),
        None => Config::load(path),
    };
    config.with_context(|| format!("Failed to load configuration from {}", path.display()))
}

fn handle_run(
    config: &Path,
    pipeline: &str,
    source: &str,
    sink: &str,
    axis: &str,
    root: Option<PathBuf>,
) -> Result<()> {
    let axis = ConcatAxis::from_str(axis)?;
    let config = load_config(config, root)?;
    let catalog = Catalog::default();

    let source = Source::new(source, &config)?;
    let sink = Sink::new(sink, &config)?;
    let mut line = Line::new(pipeline, &config, &catalog)?;

    line.connect(source, sink)?;
    let written = line.run(axis)?;
    println!("Wrote {} file(s).", written.len());
    Ok(())
}

fn handle_test(
    config: &Path,
    pipeline: &str,
    source: &str,
    sink: &str,
    index: usize,
    to_stage: usize,
    root: Option<PathBuf>,
) -> Result<()> {
    let config = load_config(config, root)?;
    let catalog = Catalog::default();

    let source = Source::new(source, &config)?;
    let sink = Sink::new(sink, &config)?;
    let mut line = Line::new(pipeline, &config, &catalog)?;

    line.connect(source, sink)?;
    let to_stage = (to_stage > 0).then_some(to_stage);
    let result = line.run_one(index, to_stage)?;
    println!("{result}");
    Ok(())
}

fn handle_validate(config: &Path, root: Option<PathBuf>) -> Result<()> {
    let config = load_config(config, root)?;
    let catalog = Catalog::default();
    let mut failures = 0usize;

    let mut report = |kind: &str, name: &str, result: Result<(), flowline::error::Error>| match result {
        Ok(()) => println!("{kind} '{name}': ok"),
        Err(e) => {
            failures += 1;
            println!("{kind} '{name}': {e}");
        }
    };

    for name in section_names(&config, "sources") {
        report("source", &name, Source::new(&name, &config).map(|_| ()));
    }
    for name in section_names(&config, "sinks") {
        report("sink", &name, Sink::new(&name, &config).map(|_| ()));
    }
    for name in section_names(&config, "pipelines") {
        report(
            "pipeline",
            &name,
            Line::new(&name, &config, &catalog).map(|_| ()),
        );
    }

    if failures > 0 {
        anyhow::bail!("{failures} invalid entr{}", if failures == 1 { "y" } else { "ies" });
    }
    println!("Configuration is valid.");
    Ok(())
}

/// Entry names under a top-level mapping section, in document order.
fn section_names(config: &Config, section: &str) -> Vec<String> {
    config
        .get(section)
        .and_then(|v| v.as_mapping())
        .map(|m| {
            m.keys()
                .filter_map(|k| k.as_str().map(str::to_owned))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_section_names_in_document_order() {
        let doc = "sources:\n  b: {file: x}\n  a: {file: y}\n";
        let config = Config::from_str(doc, "/data").expect("valid document");
        assert_eq!(section_names(&config, "sources"), vec!["b", "a"]);
        assert!(section_names(&config, "sinks").is_empty());
    }
}
