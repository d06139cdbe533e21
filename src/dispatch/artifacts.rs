//! Element and result artifacts on shared storage
//!
//! Every artifact is a small JSON document carrying the index of the input
//! element it belongs to, so results can be put back in input order no
//! matter how the scheduler reports them.

use futures::stream::{self, StreamExt, TryStreamExt};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::DispatchError;

static JSON_PATH: Lazy<Regex> = Lazy::new(|| Regex::new(r"\S+\.json\b").unwrap());
static RESULT_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^result-(\d+)\.json$").unwrap());

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<V> {
    pub index: usize,
    pub value: V,
}

impl<V: DeserializeOwned> Envelope<V> {
    /// Decode an artifact. Only the object form `{"index": .., "value": ..}`
    /// is accepted; serde would otherwise also take a two-element array.
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        match serde_json::from_slice::<serde_json::Value>(bytes)? {
            object @ serde_json::Value::Object(_) => serde_json::from_value(object),
            other => Err(serde::de::Error::invalid_type(
                unexpected(&other),
                &"an object with `index` and `value`",
            )),
        }
    }
}

fn unexpected(value: &serde_json::Value) -> serde::de::Unexpected<'_> {
    use serde::de::Unexpected;
    match value {
        serde_json::Value::Null => Unexpected::Unit,
        serde_json::Value::Bool(b) => Unexpected::Bool(*b),
        serde_json::Value::Number(_) => Unexpected::Other("number"),
        serde_json::Value::String(s) => Unexpected::Str(s),
        serde_json::Value::Array(_) => Unexpected::Seq,
        serde_json::Value::Object(_) => Unexpected::Map,
    }
}

pub fn element_file_name(index: usize) -> String {
    format!("element-{index:06}.json")
}

pub fn result_file_name(index: usize) -> String {
    format!("result-{index:06}.json")
}

/// Index encoded in a result artifact's file name.
pub fn result_index(path: &Path) -> Option<usize> {
    let name = path.file_name()?.to_str()?;
    RESULT_NAME.captures(name)?[1].parse().ok()
}

/// Pure: result artifact paths mentioned in scheduler output, ordered by
/// element index. Repeated mentions of one index keep the first path.
pub fn discover_result_paths(output: &str) -> Vec<PathBuf> {
    let mut found: BTreeMap<usize, PathBuf> = BTreeMap::new();
    for candidate in JSON_PATH.find_iter(output) {
        let path = PathBuf::from(candidate.as_str());
        let Some(index) = result_index(&path) else {
            continue;
        };
        match found.get(&index) {
            Some(existing) if existing != &path => warn!(
                "Result {} reported twice ({} and {}); keeping the first",
                index,
                existing.display(),
                path.display()
            ),
            Some(_) => {}
            None => {
                found.insert(index, path);
            }
        }
    }
    found.into_values().collect()
}

/// Write one artifact per element into `dir`, up to `concurrency` at a time.
pub async fn write_elements<T: Serialize>(
    elements: &[T],
    dir: &Path,
    concurrency: usize,
) -> Result<usize, DispatchError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| DispatchError::io(dir, source))?;

    let written: Vec<PathBuf> = stream::iter(elements.iter().enumerate())
        .map(|(index, value)| async move {
            let bytes = serde_json::to_vec(&Envelope { index, value })
                .map_err(|source| DispatchError::Serialize { index, source })?;
            let path = dir.join(element_file_name(index));
            tokio::fs::write(&path, bytes)
                .await
                .map_err(|source| DispatchError::io(&path, source))?;
            Ok::<_, DispatchError>(path)
        })
        .buffer_unordered(concurrency.max(1))
        .try_collect()
        .await?;

    debug!("{} elements written to {}", written.len(), dir.display());
    Ok(written.len())
}

/// Load result artifacts, keeping the order of `paths`.
pub async fn read_results<R: DeserializeOwned>(
    paths: &[PathBuf],
    concurrency: usize,
) -> Result<Vec<R>, DispatchError> {
    stream::iter(paths)
        .map(|path| async move {
            let bytes = tokio::fs::read(path)
                .await
                .map_err(|source| DispatchError::io(path, source))?;
            let envelope: Envelope<R> =
                Envelope::from_json(&bytes).map_err(|source| DispatchError::Deserialize {
                    path: path.clone(),
                    source,
                })?;
            Ok::<_, DispatchError>(envelope.value)
        })
        .buffered(concurrency.max(1))
        .try_collect()
        .await
}
