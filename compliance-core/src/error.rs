use thiserror::Error;

/// Errors produced by the core components.
///
/// Unknown-session and invalid-input conditions are handled at the HTTP
/// layer; this taxonomy covers the outbound backends and storage.
#[derive(Debug, Error)]
pub enum ComplianceError {
    #[error("upstream returned status {status}: {body}")]
    UpstreamStatus { status: u16, body: String },

    #[error("upstream transport error: {0}")]
    UpstreamTransport(String),

    #[error("malformed upstream response: {0}")]
    MalformedResponse(String),

    #[error("missing configuration: {0} not set")]
    MissingConfig(&'static str),

    #[error("storage error: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, ComplianceError>;
