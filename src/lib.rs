//! # Flowline - Configuration-Driven Dataframe Pipelines
//!
//! Flowline wires CSV sources, staged transformations, and CSV sinks
//! together from a single YAML document. Pipelines are declared as
//! sequences of stage descriptors; stage functions resolve by name in
//! string-keyed catalogs, so a configuration typo fails at construction
//! with the offending key path instead of partway through a run.
//!
//! ## Quick Start
//!
//! ```no_run
//! use flowline::catalog::Catalog;
//! use flowline::config::Config;
//! use flowline::line::{ConcatAxis, Line};
//! use flowline::sink::Sink;
//! use flowline::source::Source;
//! use std::path::Path;
//!
//! # fn example() -> flowline::error::Result<()> {
//! let config = Config::load(Path::new("config.yaml"))?;
//! let catalog = Catalog::default();
//!
//! let source = Source::new("raw", &config)?;
//! let sink = Sink::new("out", &config)?;
//! let mut line = Line::new("prices", &config, &catalog)?;
//!
//! line.connect(source, sink)?;
//! let written = line.run(ConcatAxis::Index)?;
//! println!("wrote {} file(s)", written.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Modules
//!
//! - [`config`]: YAML configuration with dotted key paths and root
//!   containment checks
//! - [`catalog`]: named transform and check registries, built-in and
//!   caller-supplied
//! - [`stage`]: stage descriptors, resolution, and pipeline composition
//! - [`source`] / [`sink`]: glob-matched CSV inputs and fixed or
//!   patterned CSV outputs
//! - [`line`]: a pipeline wired between a source and a sink
//! - [`error`]: error types and handling utilities

#![warn(clippy::all, rust_2018_idioms)]

pub mod catalog;
pub mod config;
pub mod error;
pub mod io;
pub mod line;
pub mod logging;
pub mod sink;
pub mod source;
pub mod stage;
