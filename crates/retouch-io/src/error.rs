//! Error types for network calls and orchestration runs.

use retouch_editor::EditorError;

use crate::transport::TransportError;

/// A failed request, after any automatic retries.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    /// The request deadline passed.
    #[error("request timed out")]
    Timeout,

    /// No connection could be made or it dropped.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The server answered 5xx.
    #[error("server error ({status}): {message}")]
    Server {
        /// HTTP status.
        status: u16,
        /// Message from the body, or the status text.
        message: String,
    },

    /// The server answered 401; the session has been invalidated.
    #[error("session expired, please sign in again")]
    Unauthorized,

    /// The server answered 429.
    #[error("too many requests, please try again later")]
    RateLimited,

    /// The server answered with another 4xx.
    #[error("request failed ({status}): {message}")]
    Client {
        /// HTTP status.
        status: u16,
        /// Message from the body, or the status text.
        message: String,
    },

    /// A 2xx response whose envelope carried `success: false`.
    #[error("request rejected: {0}")]
    Rejected(String),

    /// The response body did not have the expected shape.
    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Anything else.
    #[error("network request failed: {0}")]
    Unknown(String),
}

impl NetworkError {
    /// Whether the client retries this failure automatically.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::Connection(_) | Self::Server { .. }
        )
    }

    /// Broad classification for display.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Timeout | Self::Connection(_) | Self::Server { .. } => ErrorKind::TransientNetwork,
            Self::Unauthorized => ErrorKind::Auth,
            Self::RateLimited => ErrorKind::RateLimit,
            Self::Client { .. } | Self::Rejected(_) | Self::Decode(_) | Self::Unknown(_) => {
                ErrorKind::Unknown
            }
        }
    }
}

impl From<TransportError> for NetworkError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout => Self::Timeout,
            TransportError::Connection(msg) => Self::Connection(msg),
            TransportError::Other(msg) => Self::Unknown(msg),
        }
    }
}

/// Input rejected before any network call.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    /// Nothing has been drawn.
    #[error("draw the area to repair first")]
    EmptyMask,

    /// The source image is unusable (format, size, dimensions).
    #[error(transparent)]
    Image(EditorError),
}

/// A failed orchestration run.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    /// The run was rejected before starting.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A request failed.
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// The mask could not be rendered or encoded.
    #[error("mask generation failed: {0}")]
    Rasterization(EditorError),

    /// The server reported that processing failed.
    #[error("processing failed: {0}")]
    Remote(String),

    /// The job did not finish within the poll budget.
    #[error("processing of job {process_id} did not finish in time")]
    CompletionTimeout {
        /// Server-side job identifier.
        process_id: String,
    },

    /// The owner abandoned the run.
    #[error("processing was abandoned")]
    Abandoned,
}

impl From<EditorError> for ProcessError {
    fn from(err: EditorError) -> Self {
        if err.is_validation() {
            Self::Validation(ValidationError::Image(err))
        } else {
            Self::Rasterization(err)
        }
    }
}

impl ProcessError {
    /// Broad classification for display.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Network(e) => e.kind(),
            Self::Rasterization(_) => ErrorKind::Rasterization,
            Self::Remote(_) | Self::CompletionTimeout { .. } | Self::Abandoned => ErrorKind::Unknown,
        }
    }

    /// A message suitable for showing to the user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(e) => e.to_string(),
            Self::Network(NetworkError::Timeout) => {
                "The request timed out. Check your connection and try again.".to_owned()
            }
            Self::Network(NetworkError::Connection(_)) => {
                "Could not reach the server. Check your network settings.".to_owned()
            }
            Self::Network(NetworkError::Server { .. }) => {
                "The server is having trouble. Please try again shortly.".to_owned()
            }
            Self::Network(NetworkError::Unauthorized) => {
                "Your session has expired. Please sign in again.".to_owned()
            }
            Self::Network(NetworkError::RateLimited) => {
                "Too many requests. Please wait a moment and try again.".to_owned()
            }
            Self::Network(NetworkError::Client { message, .. } | NetworkError::Rejected(message)) => {
                message.clone()
            }
            Self::Network(_) => "Network request failed. Please try again later.".to_owned(),
            Self::Rasterization(_) => "The mask could not be generated.".to_owned(),
            Self::Remote(message) if !message.is_empty() => message.clone(),
            Self::Remote(_) => "Image processing failed. Please try again.".to_owned(),
            Self::CompletionTimeout { .. } => {
                "Processing is taking longer than expected. Check your history later.".to_owned()
            }
            Self::Abandoned => "Processing was cancelled.".to_owned(),
        }
    }

    /// Whether a fresh full-pipeline run might succeed.
    #[must_use]
    pub const fn can_retry(&self) -> bool {
        match self {
            Self::Validation(_) | Self::Abandoned => false,
            Self::Network(NetworkError::Unauthorized | NetworkError::Decode(_)) => false,
            Self::Network(_)
            | Self::Rasterization(_)
            | Self::Remote(_)
            | Self::CompletionTimeout { .. } => true,
        }
    }
}

/// Broad error classes for presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input; fix it and try again.
    Validation,
    /// Timeout, connection failure or 5xx that outlasted the retry budget.
    TransientNetwork,
    /// The session is no longer valid.
    Auth,
    /// The server is throttling requests.
    RateLimit,
    /// The mask could not be produced.
    Rasterization,
    /// Everything else.
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(NetworkError::Timeout.is_transient());
        assert!(NetworkError::Connection("x".into()).is_transient());
        assert!(
            NetworkError::Server {
                status: 503,
                message: String::new()
            }
            .is_transient()
        );
        assert!(!NetworkError::Unauthorized.is_transient());
        assert!(!NetworkError::RateLimited.is_transient());
        assert!(
            !NetworkError::Client {
                status: 404,
                message: String::new()
            }
            .is_transient()
        );
    }

    #[test]
    fn editor_errors_split_by_cause() {
        let validation: ProcessError = EditorError::UnsupportedFormat("gif".into()).into();
        assert_eq!(validation.kind(), ErrorKind::Validation);
        assert!(!validation.can_retry());

        let raster: ProcessError = EditorError::Surface {
            width: 0,
            height: 0,
        }
        .into();
        assert_eq!(raster.kind(), ErrorKind::Rasterization);
        assert!(raster.can_retry());
    }

    #[test]
    fn network_kinds() {
        let auth = ProcessError::from(NetworkError::Unauthorized);
        assert_eq!(auth.kind(), ErrorKind::Auth);
        assert!(!auth.can_retry());

        let rate = ProcessError::from(NetworkError::RateLimited);
        assert_eq!(rate.kind(), ErrorKind::RateLimit);
        assert!(rate.can_retry());

        let timeout = ProcessError::from(NetworkError::Timeout);
        assert_eq!(timeout.kind(), ErrorKind::TransientNetwork);
    }

    #[test]
    fn user_messages_surface_server_text() {
        let err = ProcessError::from(NetworkError::Rejected("quota exceeded".into()));
        assert_eq!(err.user_message(), "quota exceeded");
        let err = ProcessError::Validation(ValidationError::EmptyMask);
        assert_eq!(err.user_message(), "draw the area to repair first");
    }

    #[test]
    fn transport_errors_map() {
        assert!(matches!(
            NetworkError::from(TransportError::Timeout),
            NetworkError::Timeout
        ));
        assert!(matches!(
            NetworkError::from(TransportError::Other("bad url".into())),
            NetworkError::Unknown(_)
        ));
    }
}
