//! `!include <glob>` support for YAML configuration files.
//!
//! A tagged scalar `!include hosts.d/*.yml` is replaced by the content of
//! every file matching the glob. Relative patterns are resolved against the
//! directory of the file holding the tag. Several mappings are merged, later
//! files overriding earlier keys; several sequences are concatenated. When
//! nothing matches the tag becomes an empty sequence.

use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use globset::GlobBuilder;
use serde_yml::value::TaggedValue;
use serde_yml::{Mapping, Value};
use std::fs;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

const INCLUDE_TAG: &str = "!include";
const GLOB_META: &[char] = &['*', '?', '[', ']', '{', '}'];

/// Reads `path` as YAML and resolves its includes, recursively.
pub fn load_yaml_with_includes<P: AsRef<Path>>(path: P) -> Result<Value> {
    let mut stack = Vec::new();
    load_file(path.as_ref(), &mut stack)
}

fn load_file(path: &Path, stack: &mut Vec<PathBuf>) -> Result<Value> {
    let canonical = fs::canonicalize(path)
        .map_err(Error::from)
        .with_msg(format!("cannot read {path:?}"))?;
    if stack.contains(&canonical) {
        return Err(Error::IncludeCycle(canonical));
    }

    let text = fs::read_to_string(&canonical)
        .map_err(Error::from)
        .with_msg(format!("cannot read {path:?}"))?;
    let value: Value = serde_yml::from_str(&text)
        .map_err(Error::from)
        .with_msg(format!("badly formatted file {path:?}"))?;

    let base_dir = canonical
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("/"));
    stack.push(canonical);
    let resolved = resolve(value, &base_dir, stack);
    stack.pop();
    resolved
}

fn resolve(value: Value, base_dir: &Path, stack: &mut Vec<PathBuf>) -> Result<Value> {
    match value {
        Value::Tagged(tagged) => {
            let TaggedValue { tag, value } = *tagged;
            if tag != INCLUDE_TAG {
                let value = resolve(value, base_dir, stack)?;
                return Ok(Value::Tagged(Box::new(TaggedValue { tag, value })));
            }
            match value {
                Value::String(pattern) => include(&pattern, base_dir, stack),
                other => Err(Error::BadInclude(format!("{other:?}"))),
            }
        }
        Value::Sequence(seq) => seq
            .into_iter()
            .map(|v| resolve(v, base_dir, stack))
            .collect::<Result<Vec<_>>>()
            .map(Value::Sequence),
        Value::Mapping(mapping) => {
            let mut resolved = Mapping::new();
            for (k, v) in mapping {
                resolved.insert(k, resolve(v, base_dir, stack)?);
            }
            Ok(Value::Mapping(resolved))
        }
        other => Ok(other),
    }
}

fn include(pattern: &str, base_dir: &Path, stack: &mut Vec<PathBuf>) -> Result<Value> {
    let values = matching_files(pattern, base_dir)?
        .iter()
        .map(|path| load_file(path, stack))
        .collect::<Result<Vec<_>>>()?;
    Ok(merge(values))
}

/// Files matching `pattern`, sorted by path.
pub fn matching_files(pattern: &str, base_dir: &Path) -> Result<Vec<PathBuf>> {
    let full_pattern = base_dir.join(pattern);
    // walk only from the deepest directory free of glob characters
    let root: PathBuf = full_pattern
        .components()
        .take_while(|c| match c {
            Component::Normal(part) => !part.to_string_lossy().contains(GLOB_META),
            _ => true,
        })
        .collect();
    if !root.exists() {
        return Ok(Vec::new());
    }

    let matcher = GlobBuilder::new(&full_pattern.to_string_lossy())
        .literal_separator(true)
        .build()?
        .compile_matcher();

    let mut files = Vec::new();
    for entry in WalkDir::new(&root).follow_links(true).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_file() && matcher.is_match(entry.path()) {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Merges included documents: mappings if the first one is a mapping,
/// otherwise a concatenated sequence (empty when there is nothing).
pub fn merge(values: Vec<Value>) -> Value {
    if !matches!(values.first(), Some(Value::Mapping(_))) {
        return Value::Sequence(
            values
                .into_iter()
                .flat_map(|value| match value {
                    Value::Sequence(seq) => seq,
                    Value::Null => Vec::new(),
                    other => vec![other],
                })
                .collect(),
        );
    }

    let mut merged = Mapping::new();
    for value in values {
        if let Value::Mapping(mapping) = value {
            for (k, v) in mapping {
                merged.insert(k, v);
            }
        }
    }
    Value::Mapping(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_include_sequences_are_concatenated() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "hosts.d/a.yml", "- a.test\n- b.test\n");
        write(dir.path(), "hosts.d/b.yml", "- c.test\n");
        let conf = write(dir.path(), "config.yml", "hosts: !include hosts.d/*.yml\n");

        let value = load_yaml_with_includes(&conf).unwrap();

        let hosts: Vec<String> = serde_yml::from_value(value["hosts"].clone()).unwrap();
        assert_eq!(hosts, vec!["a.test", "b.test", "c.test"]);
    }

    #[test]
    fn test_include_mappings_later_files_win() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "default.d/1.yml", "port: 22\nlock: /tmp/{}.lock\n");
        write(dir.path(), "default.d/2.yml", "port: 2222\n");
        let conf = write(dir.path(), "config.yml", "default: !include default.d/*.yml\n");

        let value = load_yaml_with_includes(&conf).unwrap();

        assert_eq!(value["default"]["port"], Value::from(2222));
        assert_eq!(value["default"]["lock"], Value::from("/tmp/{}.lock"));
    }

    #[test]
    fn test_include_nothing_matches() {
        let dir = TempDir::new().unwrap();
        let conf = write(dir.path(), "config.yml", "hosts: !include nowhere/*.yml\n");

        let value = load_yaml_with_includes(&conf).unwrap();

        assert_eq!(value["hosts"], Value::Sequence(Vec::new()));
    }

    #[test]
    fn test_include_absolute_and_nested() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "more/inner.yml", "- inner.test\n");
        write(dir.path(), "more/outer.yml", "- outer.test\n- !include inner.yml\n");
        let pattern = dir.path().join("more/outer.yml");
        let conf = write(
            dir.path(),
            "config.yml",
            &format!("hosts: !include {}\n", pattern.display()),
        );

        let value = load_yaml_with_includes(&conf).unwrap();

        let hosts: Vec<Value> = serde_yml::from_value(value["hosts"].clone()).unwrap();
        assert_eq!(hosts[0], Value::from("outer.test"));
        assert_eq!(hosts[1], Value::Sequence(vec![Value::from("inner.test")]));
    }

    #[test]
    fn test_include_cycle_is_an_error() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.yml", "- !include b.yml\n");
        write(dir.path(), "b.yml", "- !include a.yml\n");

        let res = load_yaml_with_includes(dir.path().join("a.yml"));

        assert!(matches!(res, Err(Error::IncludeCycle(_))));
    }

    #[test]
    fn test_merge_empty() {
        assert_eq!(merge(vec![]), Value::Sequence(Vec::new()));
    }
}
