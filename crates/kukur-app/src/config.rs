//! Configuration loading (C9): read a TOML file and merge in whatever
//! `include.glob` entries it names.
//!
//! Grounded in `kukur/config.py::from_toml`, with one deliberate departure:
//! the Python original appends each included document as a single list
//! element (`config[k].append(v)`). The written contract here is
//! "lists concatenate", so list-valued keys are extended rather than
//! nested — see `DESIGN.md`.

use std::path::{Path, PathBuf};

use kukur_core::{KukurError, Result};
use toml::value::Table;
use toml::Value;

/// Load `path`, then merge in every file matched by an `include.glob`
/// pattern (resolved relative to `path`'s directory). Include patterns are
/// processed once, in the order they're listed; included files are merged
/// in sorted-path order for determinism.
pub fn from_toml(path: impl AsRef<Path>) -> Result<Value> {
    let path = path.as_ref();
    let mut config = load_single(path)?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));

    let includes = match config.get("include") {
        Some(Value::Array(items)) => items.clone(),
        Some(_) => {
            return Err(KukurError::InvalidConfiguration(
                "\"include\" must be an array".to_string(),
            ))
        }
        None => Vec::new(),
    };

    for include in includes {
        let table = include.as_table().ok_or_else(|| {
            KukurError::InvalidConfiguration("include entry must be a table".to_string())
        })?;
        let pattern = table.get("glob").and_then(Value::as_str).ok_or_else(|| {
            KukurError::InvalidConfiguration("include entry missing \"glob\"".to_string())
        })?;

        for included_path in matching_paths(base_dir, pattern)? {
            let included = load_single(&included_path)?;
            merge_entry(&mut config, &included);
        }
    }

    Ok(config)
}

fn load_single(path: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        KukurError::InvalidConfiguration(format!("{}: {e}", path.display()))
    })?;
    toml::from_str(&text)
        .map_err(|e| KukurError::InvalidConfiguration(format!("{}: {e}", path.display())))
}

fn matching_paths(base_dir: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let full_pattern = base_dir.join(pattern);
    let mut paths: Vec<PathBuf> = glob::glob(&full_pattern.to_string_lossy())
        .map_err(|e| KukurError::InvalidConfiguration(e.to_string()))?
        .filter_map(|entry| entry.ok())
        .collect();
    paths.sort();
    Ok(paths)
}

/// scalars overwrite, lists concatenate, tables merge recursively.
fn merge_entry(existing: &mut Value, incoming: &Value) {
    match (existing, incoming) {
        (Value::Array(a), Value::Array(b)) => a.extend(b.iter().cloned()),
        (Value::Table(a), Value::Table(b)) => merge_tables(a, b),
        (existing, incoming) => *existing = incoming.clone(),
    }
}

fn merge_tables(a: &mut Table, b: &Table) {
    for (key, value) in b {
        match a.get_mut(key) {
            Some(existing) => merge_entry(existing, value),
            None => {
                a.insert(key.clone(), value.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn loads_a_plain_file_with_no_includes() {
        let dir = tempdir();
        let path = write_temp(dir.path(), "main.toml", "data_dir = \"/tmp\"\n");
        let config = from_toml(&path).unwrap();
        assert_eq!(config.get("data_dir").and_then(Value::as_str), Some("/tmp"));
    }

    #[test]
    fn scalar_in_included_file_overwrites() {
        let dir = tempdir();
        write_temp(dir.path(), "extra.toml", "data_dir = \"/override\"\n");
        let path = write_temp(
            dir.path(),
            "main.toml",
            "data_dir = \"/tmp\"\n[[include]]\nglob = \"extra.toml\"\n",
        );
        let config = from_toml(&path).unwrap();
        assert_eq!(
            config.get("data_dir").and_then(Value::as_str),
            Some("/override")
        );
    }

    #[test]
    fn lists_concatenate_across_includes() {
        let dir = tempdir();
        write_temp(dir.path(), "extra.toml", "tags = [\"b\", \"c\"]\n");
        let path = write_temp(
            dir.path(),
            "main.toml",
            "tags = [\"a\"]\n[[include]]\nglob = \"extra.toml\"\n",
        );
        let config = from_toml(&path).unwrap();
        let tags: Vec<&str> = config
            .get("tags")
            .and_then(Value::as_array)
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        assert_eq!(tags, vec!["a", "b", "c"]);
    }

    #[test]
    fn tables_merge_recursively() {
        let dir = tempdir();
        write_temp(
            dir.path(),
            "extra.toml",
            "[source.plant_a]\ntype = \"csv\"\n",
        );
        let path = write_temp(
            dir.path(),
            "main.toml",
            "[source.plant_b]\ntype = \"csv\"\n[[include]]\nglob = \"extra.toml\"\n",
        );
        let config = from_toml(&path).unwrap();
        let source = config.get("source").and_then(Value::as_table).unwrap();
        assert!(source.contains_key("plant_a"));
        assert!(source.contains_key("plant_b"));
    }

    #[test]
    fn missing_glob_key_is_invalid_configuration() {
        let dir = tempdir();
        let path = write_temp(dir.path(), "main.toml", "[[include]]\nfoo = \"bar\"\n");
        assert!(from_toml(&path).is_err());
    }

    fn tempdir() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }
}
