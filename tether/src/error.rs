//! Error types for requests and connection operations.

use std::io;

/// Error delivered to a completion sink, or returned when a request is
/// rejected up front.
///
/// Every error reaches the sink of the operation that was in flight when
/// it happened. Only "would block" and "interrupted" conditions are retried
/// internally; nothing here is ever retried automatically.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The request options are inconsistent.
    #[error("tcp request has bad params: {0}")]
    InvalidRequest(String),

    /// The host name could not be turned into an address.
    #[error("unable to resolve host {host}: {reason}")]
    Resolution { host: String, reason: String },

    /// The socket could not be created or the connect attempt failed.
    #[error("unable to make connection to {peer}: {source}")]
    Connect {
        peer: String,
        #[source]
        source: io::Error,
    },

    /// No readiness within the connection's timeout.
    #[error("IO timeout")]
    Timeout,

    /// The peer hung up while the engine was waiting on the socket.
    #[error("Remote peer has closed the connection")]
    PeerClosed,

    /// A read failed with an unrecoverable OS error.
    #[error("IO read error while trying to read data: {0}")]
    Read(#[source] io::Error),

    /// A write failed; `remaining` bytes of the operation were never sent.
    #[error("IO write error while trying to write {remaining} bytes: {source}")]
    Write {
        remaining: usize,
        #[source]
        source: io::Error,
    },

    /// The peer closed the stream before any byte of the read arrived.
    #[error("IO read error: connection terminated")]
    Terminated,

    /// A read was queued after the stream already ended.
    #[error("EOF, cannot read more data")]
    ReadClosed,

    /// A write was queued after the write side failed or was shut down.
    #[error("cannot write more data, write side is closed")]
    WriteClosed,

    /// The operation was discarded because an earlier one failed, or the
    /// connection was closing when it was queued.
    #[error("operation cancelled")]
    Cancelled,

    /// The event loop itself failed.
    #[error("event loop error: {0}")]
    Io(#[from] io::Error),
}

/// Classification of an [`Error`], without its payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidRequest,
    ResolutionFailure,
    ConnectFailure,
    Timeout,
    PeerClosed,
    ReadError,
    WriteError,
    /// The stream ended with nothing to deliver, or a read followed EOF.
    EofWithoutData,
    Cancelled,
    Io,
}

impl Error {
    /// Returns the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Error::Resolution { .. } => ErrorKind::ResolutionFailure,
            Error::Connect { .. } => ErrorKind::ConnectFailure,
            Error::Timeout => ErrorKind::Timeout,
            Error::PeerClosed => ErrorKind::PeerClosed,
            Error::Read(_) => ErrorKind::ReadError,
            Error::Write { .. } | Error::WriteClosed => ErrorKind::WriteError,
            Error::Terminated | Error::ReadClosed => ErrorKind::EofWithoutData,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Io(_) => ErrorKind::Io,
        }
    }
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;
