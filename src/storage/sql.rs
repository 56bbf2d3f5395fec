//! SQL and row-codec helpers for the projection store.
//!
//! Literal escaping and value encoding live here, in one audited place, so no
//! query site ever assembles SQL fragments or JSON text by hand.

use crate::{Error, Result};

/// Escapes `%` and `_` wildcards (and the escape char itself) for a LIKE
/// pattern using `\` as the escape character.
///
/// Callers must append `ESCAPE '\'` to the LIKE clause.
#[must_use]
pub fn escape_like_wildcards(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '\\' | '%' | '_' => {
                escaped.push('\\');
                escaped.push(ch);
            },
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Encodes a string list as the JSON text stored in list-valued columns.
#[must_use]
pub fn strings_to_json(values: &[String]) -> String {
    serde_json::to_string(values).unwrap_or_else(|_| "[]".to_string())
}

/// Decodes the JSON text of a list-valued column.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if the stored text is not a JSON string array.
pub fn json_to_strings(raw: &str) -> Result<Vec<String>> {
    serde_json::from_str(raw)
        .map_err(|e| Error::InvalidInput(format!("malformed list column: {e}")))
}

/// Encodes an embedding vector as a little-endian f32 BLOB.
#[must_use]
pub fn embedding_to_blob(vector: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        blob.extend_from_slice(&value.to_le_bytes());
    }
    blob
}

/// Decodes a little-endian f32 BLOB back into an embedding vector.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if the blob length is not a multiple of 4.
pub fn blob_to_embedding(blob: &[u8]) -> Result<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return Err(Error::InvalidInput(format!(
            "embedding blob length {} is not a multiple of 4",
            blob.len()
        )));
    }
    Ok(blob
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}
