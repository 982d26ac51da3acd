//! Error types for the CF data model.

use thiserror::Error;

/// Result type alias using ModelError.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised while building or manipulating fields and their data.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("Unknown units: {0}")]
    UnknownUnits(String),

    #[error("Units '{from}' are not convertible to '{to}'")]
    IncompatibleUnits { from: String, to: String },

    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Invalid axis: {0}")]
    InvalidAxis(String),

    #[error("Data type mismatch: {0}")]
    DtypeMismatch(String),

    #[error("Missing construct: {0}")]
    MissingConstruct(String),
}

impl ModelError {
    pub fn incompatible_units(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::IncompatibleUnits {
            from: from.into(),
            to: to.into(),
        }
    }

    pub fn shape_mismatch(msg: impl Into<String>) -> Self {
        Self::ShapeMismatch(msg.into())
    }

    pub fn invalid_axis(msg: impl Into<String>) -> Self {
        Self::InvalidAxis(msg.into())
    }

    pub fn missing_construct(msg: impl Into<String>) -> Self {
        Self::MissingConstruct(msg.into())
    }
}

impl From<ndarray::ShapeError> for ModelError {
    fn from(err: ndarray::ShapeError) -> Self {
        ModelError::ShapeMismatch(err.to_string())
    }
}
