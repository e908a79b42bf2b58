//! Line-delimited JSON messages exchanged with the bridge process.

use crate::error::{Result, SrcRecError};
use crate::toolkit::{Handle, LabelTimeCourses};
use base64::{engine::general_purpose::STANDARD, Engine};
use byteorder::{ByteOrder, LittleEndian};
use ndarray::Array3;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

#[derive(Debug, Serialize)]
pub struct Request<'a> {
    pub id: u64,
    pub op: &'a str,
    pub args: Value,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    Ready {
        mne_version: Option<String>,
    },
    Ok {
        id: u64,
        #[serde(default)]
        result: Value,
    },
    Error {
        id: Option<u64>,
        kind: String,
        error: String,
        #[serde(default)]
        path: Option<String>,
        #[serde(default)]
        traceback: Option<String>,
    },
}

/// Failure reported by the bridge for a single operation.
#[derive(Debug, Clone)]
pub struct BridgeFailure {
    pub kind: String,
    pub error: String,
    pub path: Option<String>,
    pub traceback: Option<String>,
}

impl BridgeFailure {
    /// Map the bridge's classification onto the crate error type.
    pub fn into_error(self, op: &str) -> SrcRecError {
        let path = self.path.map(PathBuf::from);
        match self.kind.as_str() {
            "missing_input" => SrcRecError::MissingInput {
                what: format!("input for {}", op),
                path: path.unwrap_or_else(|| PathBuf::from(&self.error)),
            },
            "numerical" => SrcRecError::NumericalFailure(format!("{}: {}", op, self.error)),
            "output_exists" => match path {
                Some(path) => SrcRecError::OutputExists(path),
                None => SrcRecError::OutputWrite {
                    path: PathBuf::new(),
                    reason: self.error,
                },
            },
            "output_write" => SrcRecError::OutputWrite {
                path: path.unwrap_or_default(),
                reason: self.error,
            },
            "protocol" => SrcRecError::Protocol(format!("{}: {}", op, self.error)),
            _ => SrcRecError::MalformedInput(format!("{}: {}", op, self.error)),
        }
    }
}

/// The `path` argument of a request, used when a failure names no file.
pub fn request_path(args: &Value) -> Option<String> {
    args.get("path").and_then(Value::as_str).map(str::to_string)
}

/// Extract the `handle` field of an operation result.
pub fn handle_from<K>(op: &str, result: &Value) -> Result<Handle<K>> {
    result
        .get("handle")
        .and_then(Value::as_u64)
        .map(Handle::new)
        .ok_or_else(|| SrcRecError::Protocol(format!("{} returned no handle: {}", op, result)))
}

pub fn indices_from(op: &str, result: &Value) -> Result<Vec<usize>> {
    let values = result
        .get("indices")
        .and_then(Value::as_array)
        .ok_or_else(|| SrcRecError::Protocol(format!("{} returned no indices", op)))?;
    values
        .iter()
        .map(|v| {
            v.as_u64()
                .map(|i| i as usize)
                .ok_or_else(|| SrcRecError::Protocol(format!("{} returned bad index {}", op, v)))
        })
        .collect()
}

/// Encoded array payload of `extract_label_time_course`.
#[derive(Debug, Deserialize)]
pub struct ArrayPayload {
    pub shape: Vec<usize>,
    pub dtype: String,
    pub data: String,
    #[serde(default)]
    pub labels: Vec<String>,
}

impl ArrayPayload {
    pub fn decode(self) -> Result<LabelTimeCourses> {
        if self.dtype != "<f8" {
            return Err(SrcRecError::Protocol(format!(
                "Unexpected array dtype '{}'",
                self.dtype
            )));
        }
        let (n_epochs, n_labels, n_times) = match self.shape.as_slice() {
            [e, l, t] => (*e, *l, *t),
            other => {
                return Err(SrcRecError::Protocol(format!(
                    "Expected a 3-D label array, got shape {:?}",
                    other
                )))
            }
        };
        let bytes = STANDARD
            .decode(self.data.as_bytes())
            .map_err(|e| SrcRecError::Protocol(format!("Bad array encoding: {}", e)))?;
        let len = n_epochs * n_labels * n_times;
        if bytes.len() != len * 8 {
            return Err(SrcRecError::Protocol(format!(
                "Array payload has {} bytes, expected {}",
                bytes.len(),
                len * 8
            )));
        }
        let mut values = vec![0f64; len];
        LittleEndian::read_f64_into(&bytes, &mut values);
        let data = Array3::from_shape_vec((n_epochs, n_labels, n_times), values)
            .map_err(|e| SrcRecError::Protocol(format!("Bad array shape: {}", e)))?;
        Ok(LabelTimeCourses {
            data,
            labels: self.labels,
        })
    }
}
