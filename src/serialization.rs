//! Model persistence.
//!
//! Every state type in the crate (`Sdr`, `Random`, `Connections`, `TemporalMemory`
//! and the parameter structs) derives `Serialize` and `Deserialize`, and so picks
//! up the [`Serializable`] helpers below.
//!
//! # Supported Formats
//!
//! - **Binary** - compact bincode encoding (default)
//! - **JSON** - human-readable, via serde_json
//!
//! Both formats store permanences as exact `f32` values, so a restored model
//! replays subsequent steps bit-identically.
//!
//! # Example
//!
//! ```rust
//! use dendrite::prelude::*;
//!
//! let mut tm = TemporalMemory::new(TemporalMemoryParams {
//!     column_dimensions: vec![32],
//!     cells_per_column: 4,
//!     ..Default::default()
//! })
//! .unwrap();
//! tm.compute(&Sdr::from_sparse(&[32], &[1, 2, 3]).unwrap(), true).unwrap();
//!
//! let bytes = tm.to_bytes(SerializableFormat::Binary).unwrap();
//! let restored = TemporalMemory::from_bytes(&bytes, SerializableFormat::Binary).unwrap();
//! assert_eq!(tm, restored);
//! ```

use crate::error::{DendriteError, Result};

use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Display;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Serialization format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SerializableFormat {
    /// Compact binary encoding (default).
    #[default]
    Binary,

    /// Human-readable JSON.
    Json,
}

impl std::fmt::Display for SerializableFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SerializableFormat::Binary => write!(f, "BINARY"),
            SerializableFormat::Json => write!(f, "JSON"),
        }
    }
}

impl std::str::FromStr for SerializableFormat {
    type Err = DendriteError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "BINARY" | "BIN" => Ok(SerializableFormat::Binary),
            "JSON" => Ok(SerializableFormat::Json),
            _ => Err(DendriteError::InvalidArgument {
                name: "format",
                message: format!("Unknown format '{s}'. Expected: BINARY, JSON"),
            }),
        }
    }
}

fn serialization_error(context: &str, format: SerializableFormat, err: impl Display) -> DendriteError {
    DendriteError::SerializationError {
        message: format!("{format} {context} failed: {err}"),
    }
}

/// Save/load helpers for any serde type.
pub trait Serializable: Serialize + DeserializeOwned + Sized {
    /// Serializes to a byte vector.
    ///
    /// # Errors
    ///
    /// `SerializationError` if encoding fails.
    fn to_bytes(&self, format: SerializableFormat) -> Result<Vec<u8>> {
        match format {
            SerializableFormat::Binary => bincode::serialize(self)
                .map_err(|e| serialization_error("serialization", format, e)),
            SerializableFormat::Json => serde_json::to_vec_pretty(self)
                .map_err(|e| serialization_error("serialization", format, e)),
        }
    }

    /// Deserializes from a byte slice.
    ///
    /// # Errors
    ///
    /// `SerializationError` if the bytes do not decode to `Self`.
    fn from_bytes(bytes: &[u8], format: SerializableFormat) -> Result<Self> {
        match format {
            SerializableFormat::Binary => bincode::deserialize(bytes)
                .map_err(|e| serialization_error("deserialization", format, e)),
            SerializableFormat::Json => serde_json::from_slice(bytes)
                .map_err(|e| serialization_error("deserialization", format, e)),
        }
    }

    /// Serializes to a JSON string.
    ///
    /// # Errors
    ///
    /// `SerializationError` if encoding fails.
    fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| serialization_error("serialization", SerializableFormat::Json, e))
    }

    /// Deserializes from a JSON string.
    ///
    /// # Errors
    ///
    /// `SerializationError` if the text does not decode to `Self`.
    fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| serialization_error("deserialization", SerializableFormat::Json, e))
    }

    /// Serializes to a writer.
    ///
    /// # Errors
    ///
    /// `SerializationError` if encoding or writing fails.
    fn save<W: Write>(&self, writer: W, format: SerializableFormat) -> Result<()> {
        let mut writer = BufWriter::new(writer);
        match format {
            SerializableFormat::Binary => bincode::serialize_into(&mut writer, self)
                .map_err(|e| serialization_error("serialization", format, e))?,
            SerializableFormat::Json => serde_json::to_writer_pretty(&mut writer, self)
                .map_err(|e| serialization_error("serialization", format, e))?,
        }
        writer.flush().map_err(|e| DendriteError::IoError {
            message: format!("Failed to flush writer: {e}"),
        })
    }

    /// Deserializes from a reader.
    ///
    /// # Errors
    ///
    /// `SerializationError` if reading or decoding fails.
    fn load<R: Read>(reader: R, format: SerializableFormat) -> Result<Self> {
        let mut reader = BufReader::new(reader);
        match format {
            SerializableFormat::Binary => bincode::deserialize_from(&mut reader)
                .map_err(|e| serialization_error("deserialization", format, e)),
            SerializableFormat::Json => serde_json::from_reader(&mut reader)
                .map_err(|e| serialization_error("deserialization", format, e)),
        }
    }

    /// Saves to a file.
    ///
    /// # Errors
    ///
    /// `IoError` if the file cannot be created, otherwise as [`save`](Self::save).
    fn save_to_file<P: AsRef<Path>>(&self, path: P, format: SerializableFormat) -> Result<()> {
        let path = path.as_ref();
        log::debug!("saving {} to {} ({format})", std::any::type_name::<Self>(), path.display());
        let file = File::create(path).map_err(|e| DendriteError::IoError {
            message: format!("Failed to create {}: {e}", path.display()),
        })?;
        self.save(file, format)
    }

    /// Loads from a file.
    ///
    /// # Errors
    ///
    /// `IoError` if the file cannot be opened, otherwise as [`load`](Self::load).
    fn load_from_file<P: AsRef<Path>>(path: P, format: SerializableFormat) -> Result<Self> {
        let path = path.as_ref();
        log::debug!("loading {} from {} ({format})", std::any::type_name::<Self>(), path.display());
        let file = File::open(path).map_err(|e| DendriteError::IoError {
            message: format!("Failed to open {}: {e}", path.display()),
        })?;
        Self::load(file, format)
    }

    /// Saves to a file, choosing JSON for a `.json` extension and binary otherwise.
    ///
    /// # Errors
    ///
    /// As [`save_to_file`](Self::save_to_file).
    fn save_to_file_auto<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let format = infer_format_from_path(path.as_ref());
        self.save_to_file(path, format)
    }

    /// Loads from a file, choosing the format from the extension.
    ///
    /// # Errors
    ///
    /// As [`load_from_file`](Self::load_from_file).
    fn load_from_file_auto<P: AsRef<Path>>(path: P) -> Result<Self> {
        let format = infer_format_from_path(path.as_ref());
        Self::load_from_file(path, format)
    }
}

impl<T> Serializable for T where T: Serialize + DeserializeOwned + Sized {}

/// Infers serialization format from file extension (case-insensitive).
fn infer_format_from_path(path: &Path) -> SerializableFormat {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("json") => SerializableFormat::Json,
        _ => SerializableFormat::Binary,
    }
}
