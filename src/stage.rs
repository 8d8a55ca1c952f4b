//! Stage descriptors, resolution, and pipeline composition.
//!
//! A pipeline entry in the configuration is parsed into a
//! [`StageDescriptor`], then resolved against a function catalog into a
//! [`PipelineStage`]: a callable over one table with a description and a
//! failure-handling policy. Resolution happens at Line construction, so
//! configuration errors surface before any data is touched.

use polars::prelude::*;
use serde::Deserialize;
use serde_yaml::Mapping;

use crate::catalog::{Args, Catalog, builtin_checks, builtin_transforms};
use crate::error::{Error, Result};

/// The closed set of stage kinds and the catalog each dispatches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Caller-supplied transform (user catalog)
    Transform,
    /// Built-in transform catalog
    Pdpipe,
    /// Caller-supplied check, every row must pass
    VerifyAll,
    /// Caller-supplied check, at least one row must pass
    VerifyAny,
    /// Built-in check catalog (all rows must pass)
    Check,
}

impl StageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Transform => "transform",
            Self::Pdpipe => "pdpipe",
            Self::VerifyAll => "verify_all",
            Self::VerifyAny => "verify_any",
            Self::Check => "check",
        }
    }

    /// Whether this kind names its function under `check` instead of
    /// `function`.
    fn uses_check_key(self) -> bool {
        matches!(self, Self::VerifyAll | Self::VerifyAny | Self::Check)
    }
}

/// Stage-behavior options under the `staging` key.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StagingOptions {
    /// Human-readable stage description
    pub desc: Option<String>,
    /// Raise on stage failure (default true); when false the failure is
    /// logged and the table passes through unchanged
    #[serde(default = "default_true")]
    pub exraise: bool,
    /// Message surfaced when the stage fails
    pub exmsg: Option<String>,
}

impl Default for StagingOptions {
    fn default() -> Self {
        Self {
            desc: None,
            exraise: true,
            exmsg: None,
        }
    }
}

fn default_true() -> bool {
    true
}

/// One declarative stage entry, as read from configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageDescriptor {
    #[serde(rename = "type")]
    pub kind: StageKind,
    pub function: Option<String>,
    pub check: Option<String>,
    #[serde(default)]
    pub kwargs: Mapping,
    #[serde(default)]
    pub staging: StagingOptions,
}

impl StageDescriptor {
    /// The function name for this stage, read from the key the kind
    /// expects (`function` or `check`).
    fn function_name(&self, key: &str) -> Result<&str> {
        let (value, expected) = if self.kind.uses_check_key() {
            (self.check.as_deref(), "check")
        } else {
            (self.function.as_deref(), "function")
        };
        value.ok_or_else(|| {
            Error::config(
                format!("{key}.{expected}"),
                format!(
                    "stage type '{}' requires a '{expected}' key",
                    self.kind.as_str()
                ),
            )
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum Quantifier {
    All,
    Any,
}

/// A resolved, callable pipeline stage.
pub struct PipelineStage {
    run: Box<dyn Fn(&DataFrame) -> Result<DataFrame> + Send + Sync>,
    desc: String,
    exraise: bool,
    exmsg: Option<String>,
}

impl PipelineStage {
    pub fn desc(&self) -> &str {
        &self.desc
    }

    /// Apply the stage to one table, enforcing the failure policy. The
    /// input is never mutated; on a suppressed failure it is returned
    /// unchanged.
    pub fn apply(&self, df: &DataFrame) -> Result<DataFrame> {
        match (self.run)(df) {
            Ok(out) => Ok(out),
            Err(err) if self.exraise => Err(Error::StageFailed {
                stage: self.desc.clone(),
                message: match &self.exmsg {
                    Some(msg) => format!("{msg} ({err})"),
                    None => err.to_string(),
                },
            }),
            Err(err) => {
                match &self.exmsg {
                    Some(msg) => tracing::warn!(stage = %self.desc, error = %err, "{msg}"),
                    None => tracing::warn!(stage = %self.desc, error = %err, "stage failed, passing table through"),
                }
                Ok(df.clone())
            }
        }
    }
}

impl std::fmt::Debug for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineStage")
            .field("desc", &self.desc)
            .field("exraise", &self.exraise)
            .finish_non_exhaustive()
    }
}

/// Resolve a stage descriptor into a pipeline stage. `user` is the
/// caller's catalog; `key` is the descriptor's configuration path, used
/// to annotate errors.
pub fn resolve(descriptor: &StageDescriptor, user: &Catalog, key: &str) -> Result<PipelineStage> {
    let name = descriptor.function_name(key)?.to_owned();
    let args = Args::new(descriptor.kwargs.clone());
    let staging = &descriptor.staging;
    let desc = staging
        .desc
        .clone()
        .unwrap_or_else(|| format!("{}: {name}", descriptor.kind.as_str()));

    let run: Box<dyn Fn(&DataFrame) -> Result<DataFrame> + Send + Sync> = match descriptor.kind {
        // Caller-supplied transforms receive a private copy of the table;
        // the caller's object can never be aliased into the pipeline.
        StageKind::Transform => {
            let f = user.transform(&name)?;
            Box::new(move |df| f(df.clone(), &args))
        }
        StageKind::Pdpipe => {
            let f = builtin_transforms().transform(&name)?;
            Box::new(move |df| f(df.clone(), &args))
        }
        StageKind::VerifyAll | StageKind::VerifyAny => {
            let quantifier = if descriptor.kind == StageKind::VerifyAll {
                Quantifier::All
            } else {
                Quantifier::Any
            };
            let f = user.check(&name)?;
            let stage_desc = desc.clone();
            Box::new(move |df| {
                let mask = f(df, &args)?;
                quantify(&mask, quantifier, &stage_desc)?;
                Ok(df.clone())
            })
        }
        StageKind::Check => {
            let f = builtin_checks().check(&name)?;
            let stage_desc = desc.clone();
            Box::new(move |df| {
                let mask = f(df, &args)?;
                quantify(&mask, Quantifier::All, &stage_desc)?;
                Ok(df.clone())
            })
        }
    };

    Ok(PipelineStage {
        run,
        desc,
        exraise: staging.exraise,
        exmsg: staging.exmsg.clone(),
    })
}

/// Raise unless the mask satisfies the quantifier. Null mask entries
/// count as failures.
fn quantify(mask: &BooleanChunked, quantifier: Quantifier, stage: &str) -> Result<()> {
    let total = mask.len();
    let passed = mask.sum().unwrap_or(0) as usize;
    let holds = match quantifier {
        Quantifier::All => passed == total,
        Quantifier::Any => passed > 0 || total == 0,
    };
    if holds {
        Ok(())
    } else {
        Err(Error::VerificationFailed {
            stage: stage.to_owned(),
            failed: total - passed,
        })
    }
}

/// An ordered sequence of resolved stages. Stage order is exactly the
/// declaration order in configuration.
#[derive(Debug, Default)]
pub struct Pipeline {
    stages: Vec<PipelineStage>,
}

impl Pipeline {
    pub fn new(stages: Vec<PipelineStage>) -> Self {
        Self { stages }
    }

    pub const fn empty() -> Self {
        Self { stages: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stages(&self) -> &[PipelineStage] {
        &self.stages
    }

    /// Apply the stage prefix `[0, to_stage)` to one table. `None` and
    /// `Some(0)` both run every stage (`0` is an explicit "run
    /// everything" alias); larger values clamp to the stage count.
    pub fn apply(&self, df: &DataFrame, to_stage: Option<usize>) -> Result<DataFrame> {
        let end = match to_stage {
            None | Some(0) => self.stages.len(),
            Some(k) => k.min(self.stages.len()),
        };
        let mut out = df.clone();
        for stage in &self.stages[..end] {
            out = stage.apply(&out)?;
        }
        Ok(out)
    }
}
