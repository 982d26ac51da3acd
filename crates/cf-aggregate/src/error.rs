//! Error types for field aggregation.

use cf_model::ModelError;
use thiserror::Error;

/// Errors that can occur while aggregating fields.
#[derive(Error, Debug)]
pub enum AggregateError {
    /// A field, or a group of fields, cannot take part in aggregation.
    #[error("not aggregatable: {0}")]
    NotAggregatable(String),

    /// Coordinates of two fields overlap or leave a gap where none is allowed.
    #[error("overlapping coordinates: {0}")]
    Overlap(String),

    /// Two fields matched structurally but could not be combined.
    #[error("incompatible on merge: {0}")]
    IncompatibleOnMerge(String),

    /// Invalid combination of options.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Options could not be read from a file or the environment.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(String),

    /// Failure inside the data model (units, shapes, missing constructs).
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Broad classification of an [`AggregateError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotAggregatable,
    Overlap,
    IncompatibleOnMerge,
    Configuration,
    Model,
}

impl AggregateError {
    pub fn not_aggregatable(msg: impl Into<String>) -> Self {
        Self::NotAggregatable(msg.into())
    }

    pub fn overlap(msg: impl Into<String>) -> Self {
        Self::Overlap(msg.into())
    }

    pub fn incompatible(msg: impl Into<String>) -> Self {
        Self::IncompatibleOnMerge(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotAggregatable(_) => ErrorKind::NotAggregatable,
            Self::Overlap(_) => ErrorKind::Overlap,
            Self::IncompatibleOnMerge(_) => ErrorKind::IncompatibleOnMerge,
            Self::Configuration(_) | Self::ConfigLoad(_) => ErrorKind::Configuration,
            Self::Model(_) => ErrorKind::Model,
        }
    }
}

impl From<std::io::Error> for AggregateError {
    fn from(err: std::io::Error) -> Self {
        Self::ConfigLoad(err.to_string())
    }
}

impl From<serde_yaml::Error> for AggregateError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::ConfigLoad(err.to_string())
    }
}

/// Result type for aggregation operations.
pub type Result<T> = std::result::Result<T, AggregateError>;
