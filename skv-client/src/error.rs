//! # Client Errors
//!
//! One error enum for the whole client. Argument, transport, decode and
//! domain failures each have their own variants; failures inside a pipeline
//! run are wrapped in `ClientError::Pipeline` with the step that broke.

use std::fmt;

use skv_common::RespError;
use thiserror::Error;

/// Result type for the client.
pub type ClientResult<T> = Result<T, ClientError>;

/// Phase of a pipeline run in which a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Writing a request into the transport buffer.
    Send,
    /// Flushing buffered requests to the store.
    Flush,
    /// Reading or decoding a reply.
    Receive,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Send => write!(f, "send"),
            Stage::Flush => write!(f, "flush"),
            Stage::Receive => write!(f, "receive"),
        }
    }
}

/// Errors surfaced by the client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Entity descriptor is unusable (empty or duplicate field name).
    #[error("invalid entity {entity}: {reason}")]
    InvalidEntity { entity: &'static str, reason: String },
    /// Address could not be parsed into a socket address.
    #[error("invalid address")]
    InvalidAddress,
    /// Configuration could not be parsed.
    #[error("invalid config: {0}")]
    Config(#[from] serde_json::Error),
    /// Network or IO failure while reading/writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// RESP2 framing or parse error.
    #[error("protocol error: {0}")]
    Protocol(&'static str),
    /// Pool is at capacity and no idle connections are available.
    #[error("connection pool exhausted")]
    PoolExhausted,
    /// Connection or subscription was already shut down.
    #[error("connection closed")]
    Closed,
    /// Reply did not have the shape the command expects.
    #[error("cannot decode {command} reply: {reason}")]
    Decode { command: &'static str, reason: String },
    /// Store returned an error reply.
    #[error("server error: {message}")]
    Server { message: String },
    /// Expiry was requested for a key that does not exist.
    #[error("cannot expire missing key {key}")]
    MissingKey { key: String },
    /// A pipeline step failed; earlier steps kept their results.
    #[error("pipeline failed during {stage} at step {step} ({command}): {source}")]
    Pipeline {
        stage: Stage,
        step: usize,
        command: &'static str,
        #[source]
        source: Box<ClientError>,
    },
}

impl ClientError {
    /// Returns the failure underneath any pipeline wrapping.
    pub fn root(&self) -> &ClientError {
        match self {
            ClientError::Pipeline { source, .. } => source.root(),
            other => other,
        }
    }

    /// Strips pipeline wrapping, keeping the underlying failure.
    pub fn into_root(self) -> ClientError {
        match self {
            ClientError::Pipeline { source, .. } => source.into_root(),
            other => other,
        }
    }

    pub(crate) fn decode(command: &'static str, reason: impl Into<String>) -> Self {
        ClientError::Decode {
            command,
            reason: reason.into(),
        }
    }
}

impl From<RespError> for ClientError {
    fn from(err: RespError) -> Self {
        match err {
            RespError::Io(err) => ClientError::Io(err),
            RespError::Protocol(reason) => ClientError::Protocol(reason),
        }
    }
}
