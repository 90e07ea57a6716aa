//! Readiness planning and fatal error handling.

use super::{Connection, Core, State};
use crate::error::Error;
use crate::operation::{Completion, Operation, Sink};
use crate::reactor::{Interest, Readiness};

use tracing::{debug, trace, warn};

/// What the head of the queue needs next.
pub(super) enum Step {
    /// The queue is empty; nothing to wait for.
    Idle,
    /// The head must wait for the socket.
    Wait(Interest),
    /// The head was removed and its sink must be invoked.
    Complete(Option<Sink>, Completion),
}

impl Core {
    fn pop_sink(&mut self) -> Option<Sink> {
        self.queue.pop().and_then(Operation::into_sink)
    }

    /// Decides what the head operation needs, given what the socket can
    /// still do.
    ///
    /// Reads are served from buffered leftovers first; only when those do
    /// not satisfy the read does the socket have to become readable.
    pub(super) fn next_step(&mut self) -> Step {
        if self.state == State::Closed {
            return Step::Idle;
        }

        let termination = match self.queue.head() {
            None => return Step::Idle,
            Some(Operation::Read(read)) => read.termination.clone(),
            Some(Operation::Write(write)) => {
                if write.is_complete() {
                    unreachable!("fully sent write left at the head of the queue");
                }

                if self.write_closed {
                    return Step::Complete(self.pop_sink(), Err(Error::WriteClosed));
                }

                return Step::Wait(Interest::Writable);
            }
        };

        if !self.partial {
            if let Some(payload) = self.inbound.satisfy(&termination, self.read_closed) {
                return Step::Complete(self.pop_sink(), Ok(payload));
            }
        }

        if self.read_closed {
            Step::Complete(self.pop_sink(), Err(Error::ReadClosed))
        } else {
            Step::Wait(Interest::Readable)
        }
    }
}

impl Connection {
    /// Advances the queue until the head needs the socket or the queue is
    /// empty.
    ///
    /// With an empty queue nothing is armed, so the reference the caller
    /// came in with is the last one the loop holds; the connection lives on
    /// only through handles kept by user code.
    pub(super) fn plan_next(&self) {
        loop {
            let step = self.core.borrow_mut().next_step();

            match step {
                Step::Idle => {
                    trace!(peer = %self.core.borrow().peer, "queue drained");
                    return;
                }
                Step::Wait(interest) => {
                    self.arm(interest);
                    return;
                }
                Step::Complete(sink, result) => self.complete(sink, result),
            }
        }
    }

    /// Registers a one-shot wait for `interest`, bounded by the current
    /// timeout. The registration holds a reference until it fires.
    pub(super) fn arm(&self, interest: Interest) {
        let (fd, timeout, handle) = {
            let core = self.core.borrow();
            (core.fd, core.timeout, core.handle.clone())
        };

        let Some(fd) = fd else {
            return;
        };

        let conn = self.clone();
        let registered = handle.register(
            fd,
            interest,
            Some(timeout),
            Box::new(move |readiness| conn.on_ready(readiness)),
        );

        match registered {
            Ok(key) => {
                trace!(fd, ?interest, ?timeout, "armed");
                self.core.borrow_mut().armed = Some(key);
            }
            Err(err) => self.fail(Error::Io(err)),
        }
    }

    /// Entry point for every readiness wait this connection armed.
    pub(super) fn on_ready(&self, readiness: Readiness) {
        let connecting = {
            let mut core = self.core.borrow_mut();
            core.armed = None;
            !core.connected
        };

        self.run_busy(|conn| match readiness {
            Readiness::Timeout => conn.fail(Error::Timeout),
            Readiness::Closed => conn.fail(Error::PeerClosed),
            Readiness::Writable if connecting => conn.finish_connect(),
            Readiness::Writable => conn.write_pump(),
            Readiness::Readable => conn.read_pump(),
        });
    }

    /// Ends the connection.
    ///
    /// `err` goes to the first queued operation that has a sink, which is
    /// the head unless the head was queued without one (a write that only
    /// precedes the read phase). Every later operation is cancelled.
    pub(super) fn fail(&self, err: Error) {
        let queued = {
            let mut core = self.core.borrow_mut();
            core.state = State::Closed;
            core.on_connect = None;

            if let Some(key) = core.armed.take() {
                core.handle.unregister(key);
            }

            core.queue.drain()
        };

        debug!(peer = %self.core.borrow().peer, error = %err, "connection failed");

        let mut sinks = queued.into_iter().filter_map(Operation::into_sink);

        match sinks.next() {
            Some(sink) => sink.complete(Err(err), self.clone()),
            None => warn!(error = %err, "no operation to report to"),
        }

        for sink in sinks {
            sink.complete(Err(Error::Cancelled), self.clone());
        }
    }

    /// Cancels `sink` during the next loop turn.
    pub(super) fn cancel_later(&self, sink: Sink) {
        let handle = self.core.borrow().handle.clone();
        let conn = self.clone();

        if let Err(err) = handle.defer(Box::new(move || {
            sink.complete(Err(Error::Cancelled), conn);
        })) {
            debug!(error = %err, "dropping cancelled operation");
        }
    }

    /// Fails the connection during the next loop turn.
    ///
    /// Used for errors found while a request is still being issued, so that
    /// no sink runs before [`Client::request`](crate::Client::request)
    /// returns.
    pub(super) fn fail_later(&self, err: Error) {
        let handle = self.core.borrow().handle.clone();
        let conn = self.clone();

        if let Err(defer_err) = handle.defer(Box::new(move || conn.fail(err))) {
            debug!(error = %defer_err, "event loop gone, dropping failure");
        }
    }
}
