// SPDX-License-Identifier: MIT OR Apache-2.0
//! Serialized track state.
//!
//! Two forms are used:
//! - [`StateBuffer`]: compact in-memory snapshots for the undo stack
//! - documents: pretty RON text written next to the timeline's other files

use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

/// Extension used for every persisted timeline file
pub const DOCUMENT_EXTENSION: &str = "ron";

/// Opaque serialized track state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateBuffer {
    data: Vec<u8>,
}

impl StateBuffer {
    /// Encode a serializable value
    pub fn encode<T: Serialize>(value: &T) -> Result<Self> {
        Ok(Self {
            data: bincode::serialize(value)?,
        })
    }

    /// Decode back into a value
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(bincode::deserialize(&self.data)?)
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Size in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the buffer holds no bytes
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Serialize a value to a pretty RON document
pub fn to_document<T: Serialize>(value: &T) -> Result<String> {
    let config = ron::ser::PrettyConfig::default()
        .struct_names(true)
        .enumerate_arrays(false);
    Ok(ron::ser::to_string_pretty(value, config)?)
}

/// Parse a RON document
pub fn from_document<T: DeserializeOwned>(document: &str) -> Result<T> {
    Ok(ron::from_str(document)?)
}

/// Write a value as a RON document, creating parent folders
pub fn save_document<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    write_document(&to_document(value)?, path)
}

/// Read a RON document from disk
pub fn load_document<T: DeserializeOwned>(path: &Path) -> Result<T> {
    from_document(&read_document(path)?)
}

/// Write an already serialized document, creating parent folders
pub fn write_document(document: &str, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, document)?;
    Ok(())
}

/// Read a document's text from disk
pub fn read_document(path: &Path) -> Result<String> {
    Ok(std::fs::read_to_string(path)?)
}

/// File name for a timeline-owned file: `<timeline>_<suffix>.ron` with
/// separators normalized to underscores
pub fn file_name_for(timeline_name: &str, suffix: &str) -> String {
    let mut name: String = format!("{}_{}", timeline_name, suffix)
        .chars()
        .map(|c| match c {
            ' ' | ':' | '/' | '\\' => '_',
            other => other,
        })
        .collect();
    name.push('.');
    name.push_str(DOCUMENT_EXTENSION);
    name
}
