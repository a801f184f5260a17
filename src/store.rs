// SPDX-License-Identifier: Apache-2.0
// Copyright (C) 2025 Keith Harrigian <kharrigian@jhu.edu>

//! Reading and writing cached records.
//!
//! Records are written as JSON arrays. They can be read back from arrays,
//! single objects, or newline-delimited JSON, which is how older
//! collections were stored.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Writes `records` to `path` as a JSON array.
///
/// Missing parent directories are created.
pub fn write_records<T: Serialize>(path: &Path, records: &[T]) -> Result<(), Error> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| Error::Io(parent.to_path_buf(), e))?;
    }
    let data = serde_json::to_string(records).map_err(|e| Error::Json(path.to_path_buf(), e))?;
    fs::write(path, data).map_err(|e| Error::Io(path.to_path_buf(), e))
}

/// Reads records from `path`.
pub fn read_records<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, Error> {
    let data = fs::read_to_string(path).map_err(|e| Error::Io(path.to_path_buf(), e))?;
    parse_records(&data).map_err(|e| Error::Json(path.to_path_buf(), e))
}

/// Number of records stored at `path`.
pub fn count_records(path: &Path) -> Result<usize, Error> {
    read_records::<Value>(path).map(|records| records.len())
}

fn parse_records<T: DeserializeOwned>(data: &str) -> serde_json::Result<Vec<T>> {
    let mut records = vec![];
    for value in serde_json::Deserializer::from_str(data).into_iter::<Value>() {
        match value? {
            Value::Array(values) => {
                for value in values {
                    records.push(serde_json::from_value(value)?);
                }
            }
            value => records.push(serde_json::from_value(value)?),
        }
    }
    Ok(records)
}

/// Reads a list of usernames from `path`.
///
/// Text files hold one username per line. JSON files hold records, and
/// the `author` of each record is used.
pub fn read_usernames(path: &Path) -> Result<Vec<String>, Error> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("txt") => {
            let data = fs::read_to_string(path).map_err(|e| Error::Io(path.to_path_buf(), e))?;
            Ok(data
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(String::from)
                .collect())
        }
        Some("json") => Ok(read_records::<Value>(path)?
            .into_iter()
            .filter_map(|record| match record.get("author") {
                Some(Value::String(author)) => Some(author.clone()),
                _ => None,
            })
            .collect()),
        _ => Err(Error::UnsupportedFile(path.to_path_buf())),
    }
}

/// A storage error.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Could not access {path}: {err}", path = .0.display(), err = .1)]
    Io(PathBuf, io::Error),

    #[error("Invalid JSON in {path}: {err}", path = .0.display(), err = .1)]
    Json(PathBuf, serde_json::Error),

    /// Usernames can only be read from `.txt` and `.json` files.
    #[error("Unsupported file type: {}", .0.display())]
    UnsupportedFile(PathBuf),
}
