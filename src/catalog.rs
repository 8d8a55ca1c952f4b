//! Function catalogs and the stage argument bag.
//!
//! Stage descriptors reference functions by name. Each name resolves in a
//! [`Catalog`]: a string-keyed registry built once per catalog rather than
//! attribute traversal, so a bad name fails with a typed
//! [`Error::FunctionNotFound`] instead of an opaque lookup panic.
//!
//! Three catalogs exist: the caller's own (registered transforms and
//! checks), the built-in transform catalog ([`builtin_transforms`]) and
//! the built-in check catalog ([`builtin_checks`]).

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, LazyLock};

use polars::prelude::*;
use serde_yaml::{Mapping, Value};

use crate::config::value_kind;
use crate::error::{Error, Result};

/// A transform consumes a table and produces a new one.
pub type TransformFn = dyn Fn(DataFrame, &Args) -> Result<DataFrame> + Send + Sync;

/// A check produces a row-aligned boolean mask over a table.
pub type CheckFn = dyn Fn(&DataFrame, &Args) -> Result<BooleanChunked> + Send + Sync;

// ---------------------------------------------------------------------------
// Args — typed accessor over a stage's configured kwargs
// ---------------------------------------------------------------------------

/// The fixed argument bag configured for one stage, with typed getters
/// whose errors name the argument and the expected type.
#[derive(Debug, Clone, Default)]
pub struct Args {
    map: Mapping,
}

impl Args {
    pub fn new(map: Mapping) -> Self {
        Self { map }
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Raw value of an argument, if present.
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.map.get(name)
    }

    pub fn required_value(&self, name: &str) -> Result<&Value> {
        self.value(name)
            .ok_or_else(|| missing(name))
    }

    pub fn str(&self, name: &str) -> Result<&str> {
        let value = self.required_value(name)?;
        value.as_str().ok_or_else(|| wrong(name, "a string", value))
    }

    pub fn f64(&self, name: &str) -> Result<f64> {
        let value = self.required_value(name)?;
        value.as_f64().ok_or_else(|| wrong(name, "a number", value))
    }

    pub fn opt_bool(&self, name: &str) -> Result<Option<bool>> {
        match self.value(name) {
            None => Ok(None),
            Some(value) => value
                .as_bool()
                .map(Some)
                .ok_or_else(|| wrong(name, "a boolean", value)),
        }
    }

    /// A required list of strings.
    pub fn str_list(&self, name: &str) -> Result<Vec<String>> {
        self.opt_str_list(name)?.ok_or_else(|| missing(name))
    }

    pub fn opt_str_list(&self, name: &str) -> Result<Option<Vec<String>>> {
        let Some(value) = self.value(name) else {
            return Ok(None);
        };
        let seq = value
            .as_sequence()
            .ok_or_else(|| wrong(name, "a list of strings", value))?;
        let mut out = Vec::with_capacity(seq.len());
        for item in seq {
            out.push(
                item.as_str()
                    .ok_or_else(|| wrong(name, "a list of strings", item))?
                    .to_owned(),
            );
        }
        Ok(Some(out))
    }

    /// A required string-to-string mapping, in declaration order.
    pub fn str_pairs(&self, name: &str) -> Result<Vec<(String, String)>> {
        let value = self.required_value(name)?;
        let map = value
            .as_mapping()
            .ok_or_else(|| wrong(name, "a mapping of strings", value))?;
        let mut out = Vec::with_capacity(map.len());
        for (k, v) in map {
            let (Some(k), Some(v)) = (k.as_str(), v.as_str()) else {
                return Err(wrong(name, "a mapping of strings", v));
            };
            out.push((k.to_owned(), v.to_owned()));
        }
        Ok(out)
    }
}

fn missing(name: &str) -> Error {
    Error::config(format!("kwargs.{name}"), "required argument is missing")
}

fn wrong(name: &str, expected: &str, found: &Value) -> Error {
    Error::config(
        format!("kwargs.{name}"),
        format!("expected {expected}, found {}", value_kind(found)),
    )
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// A named collection of callable functions that stage descriptors
/// reference by name.
pub struct Catalog {
    name: String,
    transforms: BTreeMap<String, Arc<TransformFn>>,
    checks: BTreeMap<String, Arc<CheckFn>>,
}

impl Catalog {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transforms: BTreeMap::new(),
            checks: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn register_transform<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(DataFrame, &Args) -> Result<DataFrame> + Send + Sync + 'static,
    {
        self.transforms.insert(name.into(), Arc::new(f));
        self
    }

    pub fn register_check<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(&DataFrame, &Args) -> Result<BooleanChunked> + Send + Sync + 'static,
    {
        self.checks.insert(name.into(), Arc::new(f));
        self
    }

    pub fn transform(&self, name: &str) -> Result<Arc<TransformFn>> {
        self.transforms
            .get(name)
            .cloned()
            .ok_or_else(|| self.not_found(name))
    }

    pub fn check(&self, name: &str) -> Result<Arc<CheckFn>> {
        self.checks
            .get(name)
            .cloned()
            .ok_or_else(|| self.not_found(name))
    }

    fn not_found(&self, name: &str) -> Error {
        Error::FunctionNotFound {
            catalog: self.name.clone(),
            name: name.to_owned(),
        }
    }
}

/// An empty caller catalog, for pipelines that only use built-in stages.
impl Default for Catalog {
    fn default() -> Self {
        Self::new("user")
    }
}

// ---------------------------------------------------------------------------
// Built-in transform catalog
// ---------------------------------------------------------------------------

static BUILTIN_TRANSFORMS: LazyLock<Catalog> = LazyLock::new(|| {
    let mut catalog = Catalog::new("builtin");
    catalog
        .register_transform("col_drop", col_drop)
        .register_transform("col_keep", col_keep)
        .register_transform("col_rename", col_rename)
        .register_transform("row_drop_null", row_drop_null)
        .register_transform("fill_null", fill_null)
        .register_transform("sort", sort);
    catalog
});

/// The built-in transform catalog (`pdpipe`-kind stages resolve here).
pub fn builtin_transforms() -> &'static Catalog {
    &BUILTIN_TRANSFORMS
}

fn col_drop(df: DataFrame, args: &Args) -> Result<DataFrame> {
    let mut out = df;
    for column in args.str_list("columns")? {
        out = out.drop(&column)?;
    }
    Ok(out)
}

fn col_keep(df: DataFrame, args: &Args) -> Result<DataFrame> {
    let columns = args.str_list("columns")?;
    Ok(df.select(columns.iter().map(String::as_str))?)
}

fn col_rename(df: DataFrame, args: &Args) -> Result<DataFrame> {
    let mut out = df;
    for (from, to) in args.str_pairs("mapping")? {
        out.rename(&from, to.into())?;
    }
    Ok(out)
}

fn row_drop_null(df: DataFrame, args: &Args) -> Result<DataFrame> {
    let subset = args
        .opt_str_list("subset")?
        .map(|columns| columns.iter().map(|c| col(c.as_str())).collect::<Vec<_>>());
    Ok(df.lazy().drop_nulls(subset).collect()?)
}

fn fill_null(df: DataFrame, args: &Args) -> Result<DataFrame> {
    let value = literal(args.required_value("value")?)?;
    let exprs = match args.opt_str_list("columns")? {
        Some(columns) => columns
            .iter()
            .map(|c| col(c.as_str()).fill_null(value.clone()))
            .collect::<Vec<_>>(),
        None => vec![all().fill_null(value)],
    };
    Ok(df.lazy().with_columns(exprs).collect()?)
}

fn sort(df: DataFrame, args: &Args) -> Result<DataFrame> {
    let by = args
        .str_list("by")?
        .iter()
        .map(|c| PlSmallStr::from(c.as_str()))
        .collect::<Vec<_>>();
    let descending = args.opt_bool("descending")?.unwrap_or(false);
    Ok(df.sort(
        by,
        SortMultipleOptions::default().with_order_descending(descending),
    )?)
}

/// Translate a YAML scalar into a Polars literal expression.
fn literal(value: &Value) -> Result<Expr> {
    match value {
        Value::Bool(b) => Ok(lit(*b)),
        Value::Number(n) if n.is_i64() => Ok(lit(n.as_i64().unwrap_or_default())),
        Value::Number(n) => Ok(lit(n.as_f64().unwrap_or_default())),
        Value::String(s) => Ok(lit(s.clone())),
        other => Err(Error::config(
            "kwargs.value",
            format!("expected a scalar, found {}", value_kind(other)),
        )),
    }
}

// ---------------------------------------------------------------------------
// Built-in check catalog
// ---------------------------------------------------------------------------

static BUILTIN_CHECKS: LazyLock<Catalog> = LazyLock::new(|| {
    let mut catalog = Catalog::new("checks");
    catalog
        .register_check("none_missing", none_missing)
        .register_check("within_range", within_range)
        .register_check("within_set", within_set)
        .register_check("unique", unique);
    catalog
});

/// The built-in check catalog (`check`-kind stages resolve here).
pub fn builtin_checks() -> &'static Catalog {
    &BUILTIN_CHECKS
}

fn none_missing(df: &DataFrame, args: &Args) -> Result<BooleanChunked> {
    let columns = match args.opt_str_list("columns")? {
        Some(columns) => columns,
        None => df
            .get_column_names()
            .iter()
            .map(|n| n.to_string())
            .collect(),
    };
    let mut mask: Option<BooleanChunked> = None;
    for column in &columns {
        let not_null = df
            .column(column.as_str())?
            .as_materialized_series()
            .is_not_null();
        mask = Some(match mask {
            None => not_null,
            Some(m) => &m & &not_null,
        });
    }
    Ok(mask.unwrap_or_else(|| BooleanChunked::full("none_missing".into(), true, df.height())))
}

fn within_range(df: &DataFrame, args: &Args) -> Result<BooleanChunked> {
    let column = args.str("column")?;
    let low = args.f64("low")?;
    let high = args.f64("high")?;
    let series = df
        .column(column)?
        .as_materialized_series()
        .cast(&DataType::Float64)?;
    Ok(series
        .f64()?
        .into_iter()
        .map(|v| Some(v.is_some_and(|x| x >= low && x <= high)))
        .collect())
}

fn within_set(df: &DataFrame, args: &Args) -> Result<BooleanChunked> {
    let column = args.str("column")?;
    let values = args.str_list("values")?;
    let allowed: HashSet<&str> = values.iter().map(String::as_str).collect();
    let series = df
        .column(column)?
        .as_materialized_series()
        .cast(&DataType::String)?;
    Ok(series
        .str()?
        .into_iter()
        .map(|v| Some(v.is_some_and(|x| allowed.contains(x))))
        .collect())
}

fn unique(df: &DataFrame, args: &Args) -> Result<BooleanChunked> {
    let column = args.str("column")?;
    let series = df.column(column)?.as_materialized_series().rechunk();
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    let rendered: Vec<String> = series.iter().map(|v| v.to_string()).collect();
    for key in &rendered {
        *counts.entry(key.clone()).or_insert(0) += 1;
    }
    Ok(rendered
        .iter()
        .map(|key| Some(counts.get(key).copied().unwrap_or(0) == 1))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(yaml: &str) -> Args {
        Args::new(serde_yaml::from_str(yaml).expect("valid kwargs"))
    }

    fn sample() -> DataFrame {
        df![
            "prices" => [20.0f64, 21.5, 19.0],
            "inventory" => [3i64, 7, 2],
            "label" => ["a", "b", "a"],
        ]
        .expect("valid sample frame")
    }

    #[test]
    fn test_args_typed_errors_name_argument() {
        let a = args("columns: 5");
        let err = a.str_list("columns").unwrap_err();
        assert!(err.to_string().contains("kwargs.columns"));
        let err = a.str("missing").unwrap_err();
        assert!(err.to_string().contains("kwargs.missing"));
    }

    #[test]
    fn test_catalog_lookup_failure_is_typed() {
        let err = builtin_transforms()
            .transform("no_such_op")
            .err()
            .expect("lookup should fail");
        assert!(matches!(err, Error::FunctionNotFound { .. }));
        assert!(err.to_string().contains("builtin"));
    }

    #[test]
    fn test_col_drop_and_keep() {
        let dropped = col_drop(sample(), &args("columns: [inventory]")).unwrap();
        assert!(dropped.column("inventory").is_err());
        assert_eq!(dropped.width(), 2);

        let kept = col_keep(sample(), &args("columns: [prices]")).unwrap();
        assert_eq!(kept.width(), 1);
    }

    #[test]
    fn test_col_rename() {
        let out = col_rename(sample(), &args("mapping: {prices: unit_price}")).unwrap();
        assert!(out.column("unit_price").is_ok());
        assert!(out.column("prices").is_err());
    }

    #[test]
    fn test_fill_null_and_drop_null() {
        let with_nulls = df![
            "x" => [Some(1i64), None, Some(3)],
            "y" => ["a", "b", "c"],
        ]
        .expect("frame");

        let filled = fill_null(with_nulls.clone(), &args("{value: 0, columns: [x]}")).unwrap();
        assert_eq!(filled.column("x").unwrap().null_count(), 0);

        let dropped = row_drop_null(with_nulls, &args("subset: [x]")).unwrap();
        assert_eq!(dropped.height(), 2);
    }

    #[test]
    fn test_sort_descending() {
        let out = sort(sample(), &args("{by: [prices], descending: true}")).unwrap();
        let first = out.column("prices").unwrap().f64().unwrap().get(0);
        assert_eq!(first, Some(21.5));
    }

    #[test]
    fn test_none_missing_mask() {
        let with_nulls = df!["x" => [Some(1i64), None, Some(3)]].expect("frame");
        let mask = none_missing(&with_nulls, &Args::default()).unwrap();
        let values: Vec<Option<bool>> = mask.into_iter().collect();
        assert_eq!(values, vec![Some(true), Some(false), Some(true)]);
    }

    #[test]
    fn test_within_range_inclusive() {
        let mask = within_range(
            &sample(),
            &args("{column: prices, low: 19.0, high: 21.5}"),
        )
        .unwrap();
        assert_eq!(mask.sum(), Some(3));
    }

    #[test]
    fn test_within_set() {
        let mask = within_set(&sample(), &args("{column: label, values: [a]}")).unwrap();
        assert_eq!(mask.sum(), Some(2));
    }

    #[test]
    fn test_unique_mask() {
        let mask = unique(&sample(), &args("column: label")).unwrap();
        let values: Vec<Option<bool>> = mask.into_iter().collect();
        assert_eq!(values, vec![Some(false), Some(true), Some(false)]);
    }
}
