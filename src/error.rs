use thiserror::Error;

/// All errors produced by pronto-core.
///
/// Four classes matter to callers:
/// - connection class (`Connection`, `MissingCredential`, `Http` during
///   `connect()`) — surfaced to the caller, status reverts to disconnected,
///   never auto-retried;
/// - tool class (any error escaping a tool handler) — caught at the tool
///   boundary and reported back to the conversational engine, the session
///   survives;
/// - malformed-event class (`MalformedEvent`) — logged, the offending event
///   is skipped;
/// - precondition class (`NotConnected`) — synchronous fail-fast.
#[derive(Debug, Error)]
pub enum ProntoError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("ephemeral credential response missing client_secret.value")]
    MissingCredential,

    #[error("session is not connected")]
    NotConnected,

    #[error("backend returned HTTP {status}: {detail}")]
    BackendStatus { status: u16, detail: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("malformed event payload: {0}")]
    MalformedEvent(String),

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ProntoError>;
