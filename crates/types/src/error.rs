use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Client-facing errors returned by the stream engine.
///
/// Every variant is recoverable; the protocol layer serializes them as an
/// [`ErrorBody`] with HTTP status 400.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KinesisError {
    /// The referenced stream or shard does not exist
    #[error("{0}")]
    ResourceNotFound(String),

    /// The stream is not in a status that allows the operation, or already exists
    #[error("{0}")]
    ResourceInUse(String),

    /// A shard, tag or stream ceiling would be exceeded
    #[error("{0}")]
    LimitExceeded(String),

    /// The request is well-formed but semantically invalid
    #[error("{0}")]
    InvalidArgument(String),

    /// The shard iterator is too old or points at something that no longer exists
    #[error("{0}")]
    ExpiredIterator(String),

    /// Reserved for rate limiting; never raised by the local engine
    #[error("{0}")]
    ProvisionedThroughputExceeded(String),
}

/// Result type for stream engine operations
pub type Result<T> = std::result::Result<T, KinesisError>;

impl KinesisError {
    pub fn resource_not_found(message: impl Into<String>) -> Self {
        Self::ResourceNotFound(message.into())
    }

    pub fn resource_in_use(message: impl Into<String>) -> Self {
        Self::ResourceInUse(message.into())
    }

    pub fn limit_exceeded(message: impl Into<String>) -> Self {
        Self::LimitExceeded(message.into())
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn expired_iterator(message: impl Into<String>) -> Self {
        Self::ExpiredIterator(message.into())
    }

    /// The `__type` discriminator used on the wire.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::ResourceNotFound(_) => "ResourceNotFoundException",
            Self::ResourceInUse(_) => "ResourceInUseException",
            Self::LimitExceeded(_) => "LimitExceededException",
            Self::InvalidArgument(_) => "InvalidArgumentException",
            Self::ExpiredIterator(_) => "ExpiredIteratorException",
            Self::ProvisionedThroughputExceeded(_) => "ProvisionedThroughputExceededException",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::ResourceNotFound(msg)
            | Self::ResourceInUse(msg)
            | Self::LimitExceeded(msg)
            | Self::InvalidArgument(msg)
            | Self::ExpiredIterator(msg)
            | Self::ProvisionedThroughputExceeded(msg) => msg,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ResourceNotFound(_))
    }

    pub fn is_in_use(&self) -> bool {
        matches!(self, Self::ResourceInUse(_))
    }

    pub fn to_body(&self) -> ErrorBody {
        ErrorBody::new(self.error_type(), Some(self.message().to_string()))
    }
}

/// JSON body of an error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(rename = "__type")]
    pub error_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ErrorBody {
    pub fn new(error_type: impl Into<String>, message: Option<String>) -> Self {
        Self {
            error_type: error_type.into(),
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_body_serialization() {
        let err = KinesisError::resource_not_found("Stream s under account 0 not found.");
        assert!(err.is_not_found());

        let json = serde_json::to_value(err.to_body()).unwrap();
        assert_eq!(json["__type"], "ResourceNotFoundException");
        assert_eq!(json["message"], "Stream s under account 0 not found.");
    }

    #[test]
    fn test_error_body_without_message() {
        let body = ErrorBody::new("UnknownOperationException", None);
        assert_eq!(
            serde_json::to_string(&body).unwrap(),
            r#"{"__type":"UnknownOperationException"}"#
        );
    }
}
