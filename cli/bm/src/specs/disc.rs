//! Disc spec parsing.
//!
//! A disc spec is `[[label:]storage-grade:]size`, where the size uses the
//! size spec grammar from [`super::size`].

use serde::Serialize;
use thiserror::Error;

use super::size::{parse_size, SizeSpecError};

/// A requested disc, as described on the command line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_grade: Option<String>,

    /// Size in MiB.
    pub size: u64,
}

/// Errors produced while parsing a disc spec.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiscSpecError {
    #[error("disc specification '{spec}' has {fields} fields, expected [[label:]grade:]size")]
    FieldCount { spec: String, fields: usize },

    #[error("bad size in disc specification '{spec}'")]
    Size {
        spec: String,
        #[source]
        source: SizeSpecError,
    },
}

fn non_empty(field: &str) -> Option<String> {
    (!field.is_empty()).then(|| field.to_string())
}

/// Parse a single disc spec.
pub fn parse_disc_spec(spec: &str) -> Result<DiscSpec, DiscSpecError> {
    let fields: Vec<&str> = spec.split(':').collect();

    let (label, storage_grade, size) = match fields.as_slice() {
        [size] => (None, None, *size),
        [grade, size] => (None, non_empty(grade), *size),
        [label, grade, size] => (non_empty(label), non_empty(grade), *size),
        _ => {
            return Err(DiscSpecError::FieldCount {
                spec: spec.to_string(),
                fields: fields.len(),
            })
        }
    };

    let size = parse_size(size).map_err(|source| DiscSpecError::Size {
        spec: spec.to_string(),
        source,
    })?;

    Ok(DiscSpec {
        label,
        storage_grade,
        size,
    })
}
