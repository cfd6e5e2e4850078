use axum::http::StatusCode;
use kinesim_core::ConfigError;
use kinesim_types::{ErrorBody, KinesisError};

/// A request rejected before or by the engine.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Unsupported content type, sent without an Authorization header
    #[error("Missing Authentication Token")]
    MissingTokenXml,

    /// Unsupported content type, sent with an Authorization header
    #[error("Unable to determine service/operation name to be authorized")]
    AccessDeniedXml,

    #[error("Unknown operation")]
    UnknownOperation,

    #[error("Serialization error: {}", .0.as_deref().unwrap_or("malformed body"))]
    Serialization(Option<String>),

    #[error("Missing Authentication Token")]
    MissingAuthenticationToken,

    #[error("{0}")]
    IncompleteSignature(String),

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Service(#[from] KinesisError),
}

impl ProtocolError {
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization(Some(message.into()))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingTokenXml | Self::AccessDeniedXml => StatusCode::FORBIDDEN,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            Self::MissingTokenXml | Self::MissingAuthenticationToken => {
                "MissingAuthenticationTokenException"
            }
            Self::AccessDeniedXml => "AccessDeniedException",
            Self::UnknownOperation => "UnknownOperationException",
            Self::Serialization(_) => "SerializationException",
            Self::IncompleteSignature(_) => "IncompleteSignatureException",
            Self::Validation(_) => "ValidationException",
            Self::Service(err) => err.error_type(),
        }
    }

    /// XML body for the rejections that happen before the content type is known.
    pub fn xml_body(&self) -> Option<String> {
        match self {
            Self::MissingTokenXml | Self::AccessDeniedXml => Some(format!(
                "<{name}>\n  <Message>{message}</Message>\n</{name}>\n",
                name = self.error_type(),
                message = self
            )),
            _ => None,
        }
    }

    pub fn json_body(&self) -> ErrorBody {
        let message = match self {
            Self::UnknownOperation => None,
            Self::Serialization(message) => message.clone(),
            Self::Service(err) => return err.to_body(),
            other => Some(other.to_string()),
        };
        ErrorBody::new(self.error_type(), message)
    }
}

/// Failure to start the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("invalid registry configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xml_bodies() {
        assert_eq!(
            ProtocolError::MissingTokenXml.xml_body().unwrap(),
            "<MissingAuthenticationTokenException>\n  <Message>Missing Authentication Token</Message>\n</MissingAuthenticationTokenException>\n"
        );
        assert_eq!(ProtocolError::AccessDeniedXml.status(), StatusCode::FORBIDDEN);
        assert!(ProtocolError::UnknownOperation.xml_body().is_none());
    }

    #[test]
    fn test_json_bodies() {
        let body = ProtocolError::UnknownOperation.json_body();
        assert_eq!(body.error_type, "UnknownOperationException");
        assert!(body.message.is_none());

        let body = ProtocolError::Serialization(None).json_body();
        assert!(body.message.is_none());

        let body = ProtocolError::MissingAuthenticationToken.json_body();
        assert_eq!(body.message.as_deref(), Some("Missing Authentication Token"));

        let err: ProtocolError = KinesisError::resource_in_use("busy").into();
        assert_eq!(err.json_body().error_type, "ResourceInUseException");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
