use super::builder::Config;
use super::destination::{Destination, Endpoint};
use crate::connection::{Connection, ConnectSink, DeferredRelease, Setup};
use crate::error::{Error, Result};
use crate::operation::{Completion, Operation, ReadOp, Sink, Termination, WriteOp};

use bytes::Bytes;
use std::path::PathBuf;
use std::time::Duration;

/// Default read scratch and inbound buffer size.
pub(crate) const DEFAULT_CHUNK: usize = 8192;

/// Options for one client request.
///
/// A request describes a write phase (the [`data`](Self::data) segments,
/// sent in order) followed by an optional read phase. Each phase completes
/// through its own sink:
///
/// - [`callback`](Self::callback) completes the read phase, or the write
///   phase when [`read(false)`](Self::read) disables reading;
/// - [`on_written`](Self::on_written) completes the write phase when a read
///   phase follows.
///
/// # Examples
///
/// ```rust,no_run
/// use tether::Request;
///
/// let request = Request::new("127.0.0.1", 25)
///     .data("EHLO example.org\r\n")
///     .stop_pattern("\r\n")
///     .callback(|result, conn| {
///         if let Ok(line) = result {
///             println!("{}", String::from_utf8_lossy(&line));
///         }
///         conn.close();
///     });
/// ```
pub struct Request {
    endpoint: Endpoint,
    data: Vec<Bytes>,
    releases: Vec<DeferredRelease>,
    callback: Option<Sink>,
    on_written: Option<Sink>,
    on_connect: Option<ConnectSink>,
    timeout: Option<Duration>,
    partial: bool,
    termination: Termination,
    shutdown: bool,
    read: bool,
}

/// A validated request, ready to become a connection.
pub(crate) struct Prepared {
    pub(crate) destination: Destination,
    pub(crate) setup: Setup,
}

impl Request {
    /// Creates a request for `host:port`.
    ///
    /// `host` is either a literal IPv4/IPv6 address, connected to directly,
    /// or a name handed to the client's resolver.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self::with_endpoint(Endpoint::Host {
            host: host.into(),
            port,
        })
    }

    /// Creates a request for a Unix-domain stream socket.
    pub fn unix(path: impl Into<PathBuf>) -> Self {
        Self::with_endpoint(Endpoint::Local(path.into()))
    }

    fn with_endpoint(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            data: Vec::new(),
            releases: Vec::new(),
            callback: None,
            on_written: None,
            on_connect: None,
            timeout: None,
            partial: false,
            termination: Termination::Available,
            shutdown: false,
            read: true,
        }
    }

    /// Appends a segment to the write phase.
    pub fn data(mut self, data: impl Into<Bytes>) -> Self {
        self.data.push(data.into());
        self
    }

    /// Appends a segment the connection takes ownership of.
    ///
    /// `release` receives the buffer back exactly once, when the connection
    /// is torn down.
    pub fn data_with_release<F>(mut self, data: Bytes, release: F) -> Self
    where
        F: FnOnce(Bytes) + 'static,
    {
        self.data.push(data.clone());
        self.releases
            .push(DeferredRelease::new(data, Box::new(release)));
        self
    }

    /// Sets the sink of the read phase (or of the write phase for a
    /// write-only request).
    pub fn callback<F>(mut self, f: F) -> Self
    where
        F: FnOnce(Completion, Connection) + 'static,
    {
        self.callback = Some(Sink::new(f));
        self
    }

    /// Sets the sink of the write phase.
    pub fn on_written<F>(mut self, f: F) -> Self
    where
        F: FnOnce(Completion, Connection) + 'static,
    {
        self.on_written = Some(Sink::new(f));
        self
    }

    /// Runs `f` once the socket is connected, before any queued operation.
    pub fn on_connect<F>(mut self, f: F) -> Self
    where
        F: FnOnce(Connection) + 'static,
    {
        self.on_connect = Some(Box::new(f));
        self
    }

    /// Overrides the client's default timeout for this connection.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Delivers every received chunk as its own completion.
    ///
    /// Each chunk completes the read at the head of the queue; further
    /// reads are queued with [`Connection::add_read`]. Any termination set
    /// on the request is ignored.
    pub fn partial(mut self, partial: bool) -> Self {
        self.partial = partial;
        self
    }

    /// Terminates the read phase at the first occurrence of `pattern`.
    ///
    /// The pattern is not part of the delivered payload.
    pub fn stop_pattern(mut self, pattern: impl Into<Bytes>) -> Self {
        self.termination = Termination::delimiter(pattern);
        self
    }

    /// Sets how the read phase is terminated.
    pub fn termination(mut self, termination: Termination) -> Self {
        self.termination = termination;
        self
    }

    /// Half-closes the write side once all data is sent.
    pub fn shutdown(mut self, shutdown: bool) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Enables or disables the read phase; enabled by default.
    pub fn read(mut self, read: bool) -> Self {
        self.read = read;
        self
    }

    /// Validates the options and lays out the operation queue.
    pub(crate) fn prepare(self, config: &Config) -> Result<Prepared> {
        let destination = self.endpoint.classify()?;
        let has_data = self.data.iter().any(|segment| !segment.is_empty());

        if !has_data && !self.read && self.on_connect.is_none() {
            return Err(Error::InvalidRequest(
                "nothing to send, nothing to read and no on_connect".into(),
            ));
        }

        if self.on_written.is_some() && !has_data {
            return Err(Error::InvalidRequest("on_written without data".into()));
        }

        let (write_sink, read_sink) = match (self.read, self.callback, self.on_written) {
            (true, callback, on_written) => (on_written, callback),
            (false, Some(_), Some(_)) => {
                return Err(Error::InvalidRequest(
                    "callback and on_written both complete the write".into(),
                ));
            }
            (false, Some(_), None) if !has_data => {
                return Err(Error::InvalidRequest(
                    "callback has no operation to complete".into(),
                ));
            }
            (false, callback, on_written) => (callback.or(on_written), None),
        };

        let mut operations = Vec::with_capacity(2);

        if let Some(write) = WriteOp::new(self.data, write_sink) {
            operations.push(Operation::Write(write));
        }

        if self.read {
            operations.push(Operation::Read(ReadOp::new(self.termination, read_sink)));
        }

        let inbound_capacity = match (self.read, config.inbound_capacity) {
            (_, Some(capacity)) => capacity,
            (true, None) => DEFAULT_CHUNK,
            (false, None) => 0,
        };

        let setup = Setup {
            peer: self.endpoint.to_string(),
            timeout: self.timeout.unwrap_or(config.timeout),
            partial: self.partial,
            shutdown_after_write: self.shutdown,
            read_chunk: config.read_chunk,
            inbound_capacity,
            on_connect: self.on_connect,
            deferred: self.releases,
            operations,
        };

        Ok(Prepared { destination, setup })
    }
}
