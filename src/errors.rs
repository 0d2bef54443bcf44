use std::{io, num::{ParseFloatError, ParseIntError}, str::Utf8Error};
use quick_xml::events::attributes::AttrError;
use thiserror::Error;

use crate::data::osm::ElementKey;

/// Failures reported by [`crate::storage::Storage`] operations. All of them are recoverable;
/// the caller decides whether to fall back, pick another id or skip the edit.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("{0} not found")]
    NotFound(ElementKey),

    /// Rehash target identifier already belongs to another element of the same kind.
    #[error("{0} is already in use")]
    Conflict(ElementKey),

    #[error("{0} already exists")]
    DuplicateKey(ElementKey),

    /// Bounding box requested from a store without nodes.
    #[error("storage contains no nodes")]
    EmptyStore,

    #[error("coordinate out of range: lat={lat} lon={lon}")]
    InvalidCoordinate { lat: i32, lon: i32 },

    #[error("invalid bounding box: left={left} bottom={bottom} right={right} top={top}")]
    InvalidBox { left: i32, bottom: i32, right: i32, top: i32 },
}

/// Pipeline level error: I/O, XML, cache and configuration problems.
#[derive(Debug)]
pub struct Error {
    pub message: String,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(value: io::Error) -> Self {
        Error {
            message: value.to_string()
        }
    }
}

impl From<quick_xml::Error> for Error {
    fn from(value: quick_xml::Error) -> Self {
        Error {
            message: value.to_string()
        }
    }
}

impl From<AttrError> for Error {
    fn from(value: AttrError) -> Self {
        Error {
            message: value.to_string()
        }
    }
}

impl From<ParseFloatError> for Error {
    fn from(value: ParseFloatError) -> Self {
        Error {
            message: value.to_string()
        }
    }
}

impl From<ParseIntError> for Error {
    fn from(value: ParseIntError) -> Self {
        Error {
            message: value.to_string()
        }
    }
}

impl From<Utf8Error> for Error {
    fn from(value: Utf8Error) -> Self {
        Error {
            message: value.to_string()
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error {
            message: value.to_string()
        }
    }
}

impl From<StorageError> for Error {
    fn from(value: StorageError) -> Self {
        Error {
            message: value.to_string()
        }
    }
}

impl From<&str> for Error {
    fn from(value: &str) -> Self {
        Error {
            message: value.to_string()
        }
    }
}

impl From<String> for Error {
    fn from(value: String) -> Self {
        Error {
            message: value
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
