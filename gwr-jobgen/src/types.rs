// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Shared types.

use std::error::Error;
use std::fmt;
use std::io;
use std::path::PathBuf;

/// The errors that can be raised while generating jobs.
///
/// None of these are recoverable: they all indicate a configuration that the
/// caller has to fix before any job file can be written.
#[derive(Debug)]
pub enum JobGenError {
    /// A tile coordinate outside of the mesh (plus its edge tiles).
    InvalidCoordinate {
        x: usize,
        y: usize,
        max_x: usize,
        max_y: usize,
    },

    /// An HBM channel that does not exist.
    InvalidChannel { channel: usize, max: usize },

    /// A traffic pattern name that is not registered.
    UnsupportedPattern(String),

    /// A testbench name that is not known.
    UnsupportedTestbench(String),

    /// The mesh dimensions cannot be used with the selected traffic.
    IncompatibleMesh(String),

    /// A transfer that would not fit in the memory of a single tile.
    LengthExceedsCapacity { length: u64, capacity: u64 },

    /// The configuration sources could not be parsed or are inconsistent.
    InvalidConfig(String),

    /// Writing a job file failed.
    Io { path: PathBuf, source: io::Error },
}

impl fmt::Display for JobGenError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            JobGenError::InvalidCoordinate { x, y, max_x, max_y } => {
                write!(f, "Invalid coordinate ({x}, {y}), limit is ({max_x}, {max_y})")
            }
            JobGenError::InvalidChannel { channel, max } => {
                write!(f, "Invalid HBM channel {channel}, limit is {max}")
            }
            JobGenError::UnsupportedPattern(name) => {
                write!(f, "Unknown traffic type: {name}")
            }
            JobGenError::UnsupportedTestbench(name) => {
                write!(f, "Unknown testbench: {name}")
            }
            JobGenError::IncompatibleMesh(msg) => {
                write!(f, "Incompatible mesh: {msg}")
            }
            JobGenError::LengthExceedsCapacity { length, capacity } => {
                write!(
                    f,
                    "Transfer of {length} bytes exceeds tile memory of {capacity} bytes"
                )
            }
            JobGenError::InvalidConfig(msg) => {
                write!(f, "Invalid configuration: {msg}")
            }
            JobGenError::Io { path, source } => {
                write!(f, "Failed to write {}: {source}", path.display())
            }
        }
    }
}

impl Error for JobGenError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            JobGenError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Build an [IncompatibleMesh](JobGenError::IncompatibleMesh) error from a
/// message that supports `to_string`
#[macro_export]
macro_rules! mesh_error {
    ($msg:expr) => {
        Err($crate::types::JobGenError::IncompatibleMesh($msg.to_string()))
    };
}

/// The return type for all fallible job generation functions.
pub type JobGenResult<T> = Result<T, JobGenError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_pattern() {
        let err = JobGenError::UnsupportedPattern("random".to_string());
        assert_eq!(err.to_string(), "Unknown traffic type: random");
    }

    #[test]
    fn io_error_has_source() {
        let err = JobGenError::Io {
            path: PathBuf::from("jobs/mesh_0.txt"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.source().is_some());
        assert!(err.to_string().starts_with("Failed to write jobs/mesh_0.txt"));
    }

    #[test]
    fn mesh_error_macro() {
        let result: JobGenResult<()> = mesh_error!(format!("{}x{}", 3, 5));
        assert!(matches!(result, Err(JobGenError::IncompatibleMesh(msg)) if msg == "3x5"));
    }
}
