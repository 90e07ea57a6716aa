//! Connection state and lifecycle.
//!
//! A [`Connection`] is a cheap, cloneable handle to one socket and its
//! operation queue. Every clone is one reference: the event loop holds one
//! for each armed readiness wait, pending lookup or deferred callback, and
//! every completion sink receives its own. The connection is finalised
//! when the last reference goes away, never earlier:
//!
//! 1. any armed readiness wait is withdrawn,
//! 2. the descriptor is closed,
//! 3. buffers handed over with a release function are given back, in the
//!    order they were supplied,
//! 4. whatever is still queued is discarded.
//!
//! All mutation happens on the event loop thread. The shared state is never
//! borrowed while a user callback runs, so callbacks may freely queue more
//! work on, retain, or close the handle they were given.

mod connect;
mod plan;
mod pump;

use crate::buffer::InboundBuffer;
use crate::error::{Error, Result};
use crate::operation::{Completion, Operation, OperationQueue, ReadOp, Sink, Termination, WriteOp};
use crate::reactor::LoopHandle;
use crate::reactor::poller::platform::sys_close;
use crate::utils::Key;

use bytes::Bytes;
use std::cell::RefCell;
use std::fmt;
use std::os::fd::RawFd;
use std::rc::Rc;
use std::time::Duration;

use tracing::debug;

pub(crate) use connect::Target;

/// Where a connection is in its life.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    /// Created, destination not looked at yet.
    Unresolved,
    /// Waiting for the resolver.
    Resolving,
    /// Non-blocking connect in progress.
    Connecting,
    /// Connected; queued operations are being serviced.
    Connected,
    /// The peer ended its stream or the write side was shut down; the
    /// other direction may still be in use.
    Closing,
    /// A fatal error ended the connection; nothing more will be sent or
    /// received, and new operations are cancelled.
    Closed,
}

pub(crate) type ConnectSink = Box<dyn FnOnce(Connection)>;

/// A write buffer the connection owns until it is finalised.
pub(crate) struct DeferredRelease {
    buffer: Bytes,
    release: Box<dyn FnOnce(Bytes)>,
}

impl DeferredRelease {
    pub(crate) fn new(buffer: Bytes, release: Box<dyn FnOnce(Bytes)>) -> Self {
        Self { buffer, release }
    }
}

/// Everything a connection starts with.
pub(crate) struct Setup {
    pub(crate) peer: String,
    pub(crate) timeout: Duration,
    pub(crate) partial: bool,
    pub(crate) shutdown_after_write: bool,
    pub(crate) read_chunk: usize,
    pub(crate) inbound_capacity: usize,
    pub(crate) on_connect: Option<ConnectSink>,
    pub(crate) deferred: Vec<DeferredRelease>,
    pub(crate) operations: Vec<Operation>,
}

pub(crate) struct Core {
    peer: String,
    fd: Option<RawFd>,
    state: State,

    inbound: InboundBuffer,
    scratch: Vec<u8>,
    queue: OperationQueue,

    partial: bool,
    shutdown_after_write: bool,
    connected: bool,
    read_closed: bool,
    write_closed: bool,

    timeout: Duration,
    deferred: Vec<DeferredRelease>,
    on_connect: Option<ConnectSink>,

    /// Key of the readiness wait currently registered, if any.
    armed: Option<Key>,
    /// Set while the loop is inside this connection's event handling; new
    /// operations are then picked up by the planner on its way out.
    busy: bool,

    handle: LoopHandle,
}

impl Drop for Core {
    fn drop(&mut self) {
        debug!(peer = %self.peer, fd = ?self.fd, "finalizing connection");
        self.state = State::Closed;

        if let Some(key) = self.armed.take() {
            self.handle.unregister(key);
        }

        if let Some(fd) = self.fd.take() {
            sys_close(fd);
        }

        for DeferredRelease { buffer, release } in self.deferred.drain(..) {
            release(buffer);
        }

        for operation in self.queue.drain() {
            debug!(kind = operation.kind(), "discarding queued operation");
        }
    }
}

/// Handle to a client connection.
///
/// Handles are given to completion callbacks. Cloning a handle takes a new
/// reference; dropping one, or calling [`close`](Self::close), releases it.
#[derive(Clone)]
pub struct Connection {
    core: Rc<RefCell<Core>>,
}

impl Connection {
    pub(crate) fn new(handle: LoopHandle, setup: Setup) -> Self {
        let mut queue = OperationQueue::default();
        for operation in setup.operations {
            queue.push(operation);
        }

        let core = Core {
            peer: setup.peer,
            fd: None,
            state: State::Unresolved,
            inbound: InboundBuffer::with_capacity(setup.inbound_capacity),
            scratch: vec![0; setup.read_chunk.max(1)],
            queue,
            partial: setup.partial,
            shutdown_after_write: setup.shutdown_after_write,
            connected: false,
            read_closed: false,
            write_closed: false,
            timeout: setup.timeout,
            deferred: setup.deferred,
            on_connect: setup.on_connect,
            armed: None,
            busy: false,
            handle,
        };

        Self {
            core: Rc::new(RefCell::new(core)),
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> State {
        self.core.borrow().state
    }

    /// Returns the destination this connection was created for.
    pub fn peer(&self) -> String {
        self.core.borrow().peer.clone()
    }

    /// Sets the timeout applied to every readiness wait armed from now on.
    ///
    /// A wait that is already armed keeps its original deadline.
    pub fn set_timeout(&self, timeout: Duration) {
        self.core.borrow_mut().timeout = timeout;
    }

    /// Queues a read behind every operation already queued.
    ///
    /// If the stream has already ended, the read completes with
    /// [`Error::ReadClosed`] once it reaches the head of the queue. On a
    /// closed connection the sink receives [`Error::Cancelled`] during the
    /// next loop turn.
    pub fn add_read<F>(&self, termination: Termination, sink: F)
    where
        F: FnOnce(Completion, Connection) + 'static,
    {
        let read = ReadOp::new(termination, Some(Sink::new(sink)));
        self.enqueue(Operation::Read(read));
    }

    /// Queues a write behind every operation already queued.
    ///
    /// The sink receives an empty payload once every byte is sent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] if `data` is empty.
    pub fn add_write<F>(&self, data: impl Into<Bytes>, sink: F) -> Result<()>
    where
        F: FnOnce(Completion, Connection) + 'static,
    {
        let write = WriteOp::new(vec![data.into()], Some(Sink::new(sink)))
            .ok_or_else(|| Error::InvalidRequest("nothing to write".into()))?;

        self.enqueue(Operation::Write(write));
        Ok(())
    }

    /// Releases this handle.
    ///
    /// Outstanding waits keep the connection alive; it is torn down once
    /// every other reference has been released as well.
    pub fn close(self) {
        debug!(
            peer = %self.core.borrow().peer,
            references = Rc::strong_count(&self.core),
            "closing connection handle"
        );
    }

    fn enqueue(&self, operation: Operation) {
        let should_plan = {
            let mut core = self.core.borrow_mut();

            if core.state == State::Closed {
                drop(core);
                if let Some(sink) = operation.into_sink() {
                    self.cancel_later(sink);
                }
                return;
            }

            core.queue.push(operation);
            core.connected && !core.busy && core.armed.is_none()
        };

        if should_plan {
            self.run_busy(|conn| conn.plan_next());
        }
    }

    /// Runs `f` with the busy marker set, restoring it afterwards.
    fn run_busy(&self, f: impl FnOnce(&Self)) {
        let was_busy = std::mem::replace(&mut self.core.borrow_mut().busy, true);
        f(self);
        self.core.borrow_mut().busy = was_busy;
    }

    /// Invokes `sink` with a fresh reference to this connection.
    fn complete(&self, sink: Option<Sink>, result: Completion) {
        if let Some(sink) = sink {
            sink.complete(result, self.clone());
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.core.try_borrow() {
            Ok(core) => f
                .debug_struct("Connection")
                .field("peer", &core.peer)
                .field("fd", &core.fd)
                .field("state", &core.state)
                .field("queued", &core.queue.len())
                .finish(),
            Err(_) => f.debug_struct("Connection").finish_non_exhaustive(),
        }
    }
}
