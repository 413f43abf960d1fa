use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;

use crate::error::RuleError;
use crate::group::RuleGroup;
use crate::query::{parse_query, BackendQuery};

/// Contents of a rule file: either a builder tree or a backend query.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleDocument {
    Tree(RuleGroup),
    Query(BackendQuery),
}

/// Loads one rule document. JSON and YAML are both accepted.
pub fn load_document(path: impl AsRef<Path>) -> Result<RuleDocument, RuleError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(RuleError::MissingPath(path.display().to_string()));
    }
    let raw = fs::read_to_string(path).map_err(|err| RuleError::from_io(path, err))?;
    parse_document(&raw, path)
}

/// Loads every `.json`, `.yaml` and `.yml` document directly inside `path`,
/// sorted by file name. A file path yields a single entry.
pub fn load_documents(path: impl AsRef<Path>) -> Result<Vec<(PathBuf, RuleDocument)>, RuleError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(RuleError::MissingPath(path.display().to_string()));
    }
    if !path.is_dir() {
        return Ok(vec![(path.to_path_buf(), load_document(path)?)]);
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(path).map_err(|err| RuleError::from_io(path, err))? {
        let entry = entry.map_err(|err| RuleError::from_io(path, err))?;
        let file_type = entry
            .file_type()
            .map_err(|err| RuleError::from_io(entry.path(), err))?;
        if file_type.is_dir() {
            continue;
        }
        let entry_path = entry.path();
        if let Some(ext) = entry_path.extension().and_then(|value| value.to_str()) {
            if matches!(ext, "json" | "yaml" | "yml") {
                files.push(entry_path);
            }
        }
    }
    files.sort();

    files
        .into_iter()
        .map(|file| load_document(&file).map(|document| (file, document)))
        .collect()
}

/// Parses a document; an object with `groups` is a query, anything else a tree.
pub fn parse_document(raw: &str, path: &Path) -> Result<RuleDocument, RuleError> {
    let value: Value = serde_yaml::from_str(raw)
        .map_err(|err| RuleError::parse_error(path, err.to_string()))?;

    if value.get("groups").is_some() {
        return parse_query(&value).map(RuleDocument::Query);
    }

    RuleGroup::deserialize(&value)
        .map(RuleDocument::Tree)
        .map_err(|err| RuleError::parse_error(path, format!("not a rule tree: {err}")))
}

/// Loads a file that must contain a builder tree.
pub fn load_tree(path: impl AsRef<Path>) -> Result<RuleGroup, RuleError> {
    let path = path.as_ref();
    match load_document(path)? {
        RuleDocument::Tree(tree) => Ok(tree),
        RuleDocument::Query(_) => Err(RuleError::parse_error(
            path,
            "expected a rule tree but found a backend query",
        )),
    }
}
