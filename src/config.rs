//! Hierarchical configuration store with path-annotated accessors.
//!
//! A [`Config`] owns the parsed YAML document plus an explicit root
//! directory. All relative file values resolve against that root, and
//! every resolved path is checked for containment inside it, so a
//! misconfigured pattern can never silently read or write outside the
//! intended project tree.
//!
//! The root is threaded explicitly through constructors rather than held
//! in process-wide state, so multiple independent pipelines can run in
//! the same process without interference.

use std::path::{Component, Path, PathBuf};

use serde_yaml::{Mapping, Value};

use crate::error::{Error, Result};

/// Environment variable consulted by the CLI to pick a configuration root.
pub const ROOT_ENV: &str = "FLOWLINE_DIR";

/// Configuration root for callers that do not pass one explicitly:
/// `$FLOWLINE_DIR` if set, the current working directory otherwise.
pub fn default_root() -> PathBuf {
    std::env::var_os(ROOT_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

/// A parsed configuration document anchored at a root directory.
#[derive(Debug, Clone)]
pub struct Config {
    root: PathBuf,
    doc: Value,
}

impl Config {
    /// Load a YAML configuration file. The root defaults to the file's
    /// parent directory.
    pub fn load(path: &Path) -> Result<Self> {
        let root = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(default_root);
        Self::load_with_root(path, root)
    }

    /// Load a YAML configuration file with an explicit root directory.
    pub fn load_with_root(path: &Path, root: impl Into<PathBuf>) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(
                path.display().to_string(),
                format!("failed to read configuration file: {e}"),
            )
        })?;
        Self::from_str(&content, root)
    }

    /// Parse a configuration document from a string.
    pub fn from_str(doc: &str, root: impl Into<PathBuf>) -> Result<Self> {
        let doc: Value = serde_yaml::from_str(doc)?;
        Ok(Self {
            root: normalize(&root.into()),
            doc,
        })
    }

    /// The configuration root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Look up a dotted key path. Numeric segments index into sequences.
    pub fn get(&self, key: &str) -> Option<&Value> {
        let mut current = &self.doc;
        for segment in key.split('.') {
            current = match (current, segment.parse::<usize>()) {
                (Value::Sequence(seq), Ok(idx)) => seq.get(idx)?,
                (value, _) => value.get(segment)?,
            };
        }
        Some(current)
    }

    /// Look up a dotted key path, failing with the full path when absent.
    pub fn required(&self, key: &str) -> Result<&Value> {
        self.get(key)
            .ok_or_else(|| Error::config(key, "required key is missing"))
    }

    /// A required string value.
    pub fn required_str(&self, key: &str) -> Result<&str> {
        let value = self.required(key)?;
        value
            .as_str()
            .ok_or_else(|| shape_error(key, "a string", value))
    }

    /// A required sequence value.
    pub fn sequence(&self, key: &str) -> Result<&Vec<Value>> {
        let value = self.required(key)?;
        value
            .as_sequence()
            .ok_or_else(|| shape_error(key, "a sequence", value))
    }

    /// The mapping at `key`, or an empty mapping when the key is absent.
    /// A present non-mapping value is a configuration error.
    pub fn kwargs(&self, key: &str) -> Result<Mapping> {
        match self.get(key) {
            None | Some(Value::Null) => Ok(Mapping::new()),
            Some(Value::Mapping(m)) => Ok(m.clone()),
            Some(other) => Err(shape_error(key, "a mapping", other)),
        }
    }

    /// Resolve the file path configured at `key`: relative values join the
    /// root, the result is lexically normalized and containment-checked.
    pub fn resolve_path(&self, key: &str) -> Result<PathBuf> {
        let raw = self.required_str(key)?;
        let joined = if Path::new(raw).is_absolute() {
            PathBuf::from(raw)
        } else {
            self.root.join(raw)
        };
        let resolved = normalize(&joined);
        self.ensure_within_root(&resolved, key)?;
        Ok(resolved)
    }

    /// Check that `path` lies within the configuration root
    /// (case-insensitive, lexical — the path need not exist).
    pub fn ensure_within_root(&self, path: &Path, key: &str) -> Result<()> {
        let resolved = if path.is_absolute() {
            normalize(path)
        } else {
            normalize(&self.root.join(path))
        };
        if is_within(&self.root, &resolved) {
            Ok(())
        } else {
            Err(Error::FileNotInConfigDir {
                file: resolved,
                key: key.to_owned(),
                root: self.root.clone(),
            })
        }
    }
}

/// Lexically normalize a path: drop `.` segments and resolve `..` against
/// preceding components. No filesystem access, so output paths that do
/// not exist yet can still be validated.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(Component::ParentDir);
                }
            }
            other => out.push(other),
        }
    }
    out
}

fn is_within(root: &Path, path: &Path) -> bool {
    let lower = |p: &Path| -> Vec<String> {
        p.components()
            .map(|c| c.as_os_str().to_string_lossy().to_lowercase())
            .collect()
    };
    let root = lower(root);
    let path = lower(path);
    path.len() >= root.len() && path[..root.len()] == root[..]
}

fn shape_error(key: &str, expected: &str, found: &Value) -> Error {
    Error::config(
        key,
        format!("expected {expected}, found {}", value_kind(found)),
    )
}

/// Human-readable kind of a YAML value, for error messages.
pub(crate) fn value_kind(value: &Value) -> String {
    match value {
        Value::Null => "null".to_owned(),
        Value::Bool(b) => format!("boolean `{b}`"),
        Value::Number(n) => format!("number `{n}`"),
        Value::String(s) => format!("string \"{s}\""),
        Value::Sequence(_) => "a sequence".to_owned(),
        Value::Mapping(_) => "a mapping".to_owned(),
        Value::Tagged(_) => "a tagged value".to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"
sources:
  raw:
    file: raw/*.csv
    kwargs:
      delimiter: ";"
sinks:
  out:
    file: out/*_done.csv
pipelines:
  prices:
    - type: pdpipe
      function: col_drop
      kwargs:
        columns: [inventory]
"#;

    fn config() -> Config {
        Config::from_str(DOC, "/data/project").expect("valid test document")
    }

    #[test]
    fn test_dotted_lookup() {
        let cfg = config();
        assert_eq!(
            cfg.required_str("sources.raw.file").unwrap(),
            "raw/*.csv"
        );
        assert_eq!(
            cfg.required_str("pipelines.prices.0.function").unwrap(),
            "col_drop"
        );
    }

    #[test]
    fn test_missing_key_cites_path() {
        let err = config().required("sources.raw.nope").unwrap_err();
        assert!(err.to_string().contains("sources.raw.nope"));
    }

    #[test]
    fn test_wrong_shape_reports_found_value() {
        let err = config().sequence("sources.raw.file").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("expected a sequence"));
        assert!(msg.contains("raw/*.csv"));
    }

    #[test]
    fn test_kwargs_default_empty() {
        let cfg = config();
        assert!(cfg.kwargs("sinks.out.kwargs").unwrap().is_empty());
        assert_eq!(cfg.kwargs("sources.raw.kwargs").unwrap().len(), 1);
    }

    #[test]
    fn test_resolve_relative_path_joins_root() {
        let resolved = config().resolve_path("sinks.out.file").unwrap();
        assert_eq!(resolved, PathBuf::from("/data/project/out/*_done.csv"));
    }

    #[test]
    fn test_containment_rejects_escape() {
        let cfg = Config::from_str("sinks:\n  out:\n    file: ../../etc/passwd\n", "/data/project")
            .expect("valid");
        let err = cfg.resolve_path("sinks.out.file").unwrap_err();
        assert!(matches!(err, Error::FileNotInConfigDir { .. }));
    }

    #[test]
    fn test_containment_rejects_absolute_escape_even_if_missing() {
        let cfg = config();
        let err = cfg
            .ensure_within_root(Path::new("/tmp/does/not/exist.csv"), "sources.raw.file")
            .unwrap_err();
        assert!(matches!(err, Error::FileNotInConfigDir { .. }));
    }

    #[test]
    fn test_containment_is_case_insensitive() {
        let cfg = config();
        assert!(
            cfg.ensure_within_root(Path::new("/DATA/Project/out/x.csv"), "k")
                .is_ok()
        );
    }

    #[test]
    fn test_normalize_resolves_dots() {
        assert_eq!(
            normalize(Path::new("/a/b/../c/./d")),
            PathBuf::from("/a/c/d")
        );
    }
}
