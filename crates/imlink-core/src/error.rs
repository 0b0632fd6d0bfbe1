use std::fmt;

use thiserror::Error;

/// State of one action-stream connection.
///
/// Starts at `Ok`. The first transition away from `Ok` is terminal; every
/// later transition attempt is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// The channel is live.
    Ok,
    /// The stream raised an error.
    ServerError,
    /// The stream ended from the peer side.
    ServerComplete,
    /// The local side tore the channel down with an error.
    ClientError,
    /// The local side closed the channel gracefully.
    ClientComplete,
}

impl ConnectionStatus {
    /// Whether frames may still be written under this status.
    ///
    /// `ServerComplete` stays writable: the peer finished its read side but
    /// the write half is still draining.
    pub fn writable(self) -> bool {
        matches!(self, Self::Ok | Self::ServerComplete)
    }

    pub fn is_terminal(self) -> bool {
        self != Self::Ok
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ok => "ok",
            Self::ServerError => "server-error",
            Self::ServerComplete => "server-complete",
            Self::ClientError => "client-error",
            Self::ClientComplete => "client-complete",
        };
        f.write_str(s)
    }
}

/// Failure reason of the file download path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadError {
    /// The socket closed before the decoder assembled a single frame.
    NoResponse,
    /// The decoded frame carried a non-zero result code.
    Status(i32),
}

impl fmt::Display for DownloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoResponse => f.write_str("no response"),
            Self::Status(code) => write!(f, "status {code}"),
        }
    }
}

/// Errors produced by the imlink protocol layer.
#[derive(Debug, Error)]
pub enum LinkError {
    /// A send was attempted after the connection left its writable states.
    #[error("channel closed ({0})")]
    ChannelClosed(ConnectionStatus),

    /// No correlated reply arrived within the configured window.
    #[error("request timed out")]
    RequestTimeout,

    /// The request was failed in bulk when the channel reached a terminal
    /// status. `cause` carries the stringified stream error when the
    /// teardown was itself caused by one.
    #[error("request cancelled ({reason})")]
    Cancelled {
        reason: ConnectionStatus,
        cause: Option<String>,
    },

    /// The dispatch could not execute an inbound proxied request.
    #[error("forwarding failed: {0}")]
    Forwarding(String),

    #[error("download failed: {0}")]
    Download(DownloadError),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ciborium::de::Error<std::io::Error>> for LinkError {
    fn from(e: ciborium::de::Error<std::io::Error>) -> Self {
        LinkError::Codec(e.to_string())
    }
}

impl From<ciborium::ser::Error<std::io::Error>> for LinkError {
    fn from(e: ciborium::ser::Error<std::io::Error>) -> Self {
        LinkError::Codec(e.to_string())
    }
}

pub type LinkResult<T> = Result<T, LinkError>;
