use thiserror::Error;

/// Structured error types for the tiled segmentation service.
///
/// Each variant carries the context of its error domain so the HTTP boundary
/// can map it to a status code without parsing strings: `Decode` is the
/// client's fault, everything else is a processing failure.
#[derive(Error, Debug)]
pub enum SegError {
    #[error("Invalid image file")]
    Decode {
        #[source]
        source: image::ImageError,
    },

    #[error("Mask encoding failed: {source}")]
    Encode {
        #[source]
        source: image::ImageError,
    },

    #[error("Model error: {operation} failed: {message}")]
    Model { operation: String, message: String },

    #[error("Processing error: {operation} failed: {message}")]
    Processing { operation: String, message: String },

    #[error("Validation error: {field} {reason}")]
    Validation { field: String, reason: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

pub type Result<T> = std::result::Result<T, SegError>;

impl SegError {
    pub fn model(operation: impl Into<String>, message: impl ToString) -> Self {
        Self::Model {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    pub fn processing(operation: impl Into<String>, message: impl ToString) -> Self {
        Self::Processing {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Whether the error was caused by the uploaded bytes rather than the service.
    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::Decode { .. })
    }
}

/// Convert ONNX Runtime errors to model errors.
impl From<ort::Error> for SegError {
    fn from(err: ort::Error) -> Self {
        Self::model("ort operation", err)
    }
}

/// Shape errors come from stitching and reshaping tiles, so they are
/// processing errors rather than model errors.
impl From<ndarray::ShapeError> for SegError {
    fn from(err: ndarray::ShapeError) -> Self {
        Self::processing("tensor shape conversion", err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_message_is_user_facing() {
        let err = SegError::Decode {
            source: image::ImageError::IoError(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "bad bytes",
            )),
        };
        assert_eq!(err.to_string(), "Invalid image file");
        assert!(err.is_client_error());
    }

    #[test]
    fn test_processing_errors_are_not_client_errors() {
        let err = SegError::model("tile inference", "session poisoned");
        assert_eq!(
            err.to_string(),
            "Model error: tile inference failed: session poisoned"
        );
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_shape_error_conversion() {
        let shape_err = ndarray::Array2::<u8>::from_shape_vec((2, 2), vec![0; 3]).unwrap_err();
        let err: SegError = shape_err.into();
        assert!(matches!(err, SegError::Processing { .. }));
    }
}
