//! JSON patch format.
//!
//! ```json
//! {
//!   "title_id": "12345678",
//!   "name": "example",
//!   "author": "someone",
//!   "data": [
//!     { "file": "default.xbe", "operations": [
//!       { "address": "0x1234", "patched_bytes": "99" },
//!       { "original_bytes": "AABBCC", "patched_bytes": "99" }
//!     ] }
//!   ]
//! }
//! ```
//!
//! The legacy reference parser's per-entry `file` default only ever checked
//! the top-level object (`if "file" not in patch"`), which can never fire
//! since `patch` never gets a top-level `file` key - a no-op bug. This
//! parser applies the `default.xbe` default to each `data[i]` entry
//! individually, which is what the per-entry schema actually calls for.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::model::{Operation, Patch, SubPatch};

#[derive(Deserialize)]
struct JsonPatchFile {
    title_id: Option<String>,
    name: Option<String>,
    author: Option<String>,
    data: Vec<JsonSubPatch>,
}

#[derive(Deserialize)]
struct JsonSubPatch {
    file: Option<String>,
    operations: Vec<JsonOperation>,
}

#[derive(Deserialize)]
struct JsonOperation {
    address: Option<u64>,
    original_bytes: Option<String>,
    patched_bytes: Option<String>,
}

const DEFAULT_TARGET: &str = "default.xbe";

pub fn parse(path: &Path) -> Option<Patch> {
    let text = match fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) => {
            tracing::warn!("cannot read JSON patch '{}': {}", path.display(), e);
            return None;
        }
    };

    let file: JsonPatchFile = match serde_json::from_str(&text) {
        Ok(f) => f,
        Err(e) => {
            tracing::warn!("invalid JSON patch '{}': {}", path.display(), e);
            return None;
        }
    };

    let mut sub_patches = Vec::with_capacity(file.data.len());
    for entry in file.data {
        let mut operations = Vec::with_capacity(entry.operations.len());
        for op in entry.operations {
            let patched_bytes = match op.patched_bytes.as_deref().map(decode_hex) {
                Some(Ok(bytes)) => bytes,
                Some(Err(e)) => {
                    tracing::warn!("invalid patched_bytes in '{}': {}", path.display(), e);
                    return None;
                }
                None => {
                    tracing::warn!(
                        "operation in '{}' is missing patched_bytes",
                        path.display()
                    );
                    return None;
                }
            };

            let operation = if let Some(address) = op.address {
                Operation::Address {
                    address,
                    patched_bytes,
                }
            } else if let Some(original) = op.original_bytes.as_deref() {
                match decode_hex(original) {
                    Ok(original_bytes) => Operation::OriginalBytes {
                        original_bytes,
                        patched_bytes,
                    },
                    Err(e) => {
                        tracing::warn!("invalid original_bytes in '{}': {}", path.display(), e);
                        return None;
                    }
                }
            } else {
                tracing::warn!(
                    "operation in '{}' has neither address nor original_bytes",
                    path.display()
                );
                return None;
            };

            operations.push(operation);
        }

        sub_patches.push(SubPatch {
            target_file: Some(entry.file.unwrap_or_else(|| DEFAULT_TARGET.to_string())),
            operations,
        });
    }

    Some(Patch {
        title_id: file.title_id.map(|t| t.to_lowercase()),
        name: file.name.or_else(|| file_stem(path)),
        author: file.author,
        sub_patches,
    })
}

fn file_stem(path: &Path) -> Option<String> {
    path.file_stem().map(|s| s.to_string_lossy().into_owned())
}

fn decode_hex(s: &str) -> Result<Vec<u8>, String> {
    let s = s.trim().trim_start_matches("0x").trim_start_matches("0X");
    if s.len() % 2 != 0 {
        return Err(format!("odd-length hex string '{}'", s));
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(|e| e.to_string()))
        .collect()
}
