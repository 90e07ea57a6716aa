//! Socket I/O for the operation at the head of the queue.

use super::{Connection, State};
use crate::error::Error;
use crate::operation::{Completion, Operation, Sink};
use crate::reactor::Interest;
use crate::reactor::poller::platform::{sys_read, sys_sendmsg, sys_shutdown_write};

use bytes::Bytes;
use std::io;

use tracing::{debug, trace};

enum Progress {
    /// Same operation, same direction: wait again.
    Again(Interest),
    /// The head finished (or failed) and was removed; replan afterwards.
    Done(Option<Sink>, Completion),
    /// Unrecoverable; the whole connection fails.
    Fatal(Error),
    /// Nothing to do for this readiness.
    Replan,
}

fn retryable(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

impl Connection {
    /// Sends as much of the head write as the socket takes in one call.
    pub(super) fn write_pump(&self) {
        let progress = self.send_head();
        self.finish(progress);
    }

    /// Performs one read and frames the result for the head read.
    pub(super) fn read_pump(&self) {
        let progress = self.receive_for_head();
        self.finish(progress);
    }

    fn finish(&self, progress: Progress) {
        match progress {
            Progress::Again(interest) => self.arm(interest),
            Progress::Done(sink, result) => {
                self.complete(sink, result);
                self.plan_next();
            }
            Progress::Fatal(err) => self.fail(err),
            Progress::Replan => self.plan_next(),
        }
    }

    fn send_head(&self) -> Progress {
        let mut guard = self.core.borrow_mut();
        let core = &mut *guard;

        let (Some(fd), Some(Operation::Write(write))) = (core.fd, core.queue.head_mut()) else {
            return Progress::Replan;
        };

        let sent = sys_sendmsg(fd, &write.pending());

        match sent {
            Ok(n) => {
                write.advance(n);
                trace!(fd, bytes = n, sent = write.sent(), total = write.total(), "sent");

                if !write.is_complete() {
                    return Progress::Again(Interest::Writable);
                }

                if core.shutdown_after_write {
                    core.shutdown_after_write = false;
                    core.write_closed = true;
                    core.state = State::Closing;

                    if let Err(err) = sys_shutdown_write(fd) {
                        debug!(fd, error = %err, "half-close failed");
                    }
                }

                let sink = core.queue.pop().and_then(Operation::into_sink);
                Progress::Done(sink, Ok(Bytes::new()))
            }
            Err(err) if retryable(&err) => Progress::Again(Interest::Writable),
            Err(err) => {
                let remaining = write.remaining();
                debug!(fd, remaining, error = %err, "write failed");

                core.write_closed = true;
                let sink = core.queue.pop().and_then(Operation::into_sink);
                let err = Error::Write {
                    remaining,
                    source: err,
                };

                Progress::Done(sink, Err(err))
            }
        }
    }

    fn receive_for_head(&self) -> Progress {
        let mut guard = self.core.borrow_mut();
        let core = &mut *guard;

        let (Some(fd), Some(Operation::Read(read))) = (core.fd, core.queue.head()) else {
            return Progress::Replan;
        };
        let termination = read.termination.clone();

        let n = match sys_read(fd, &mut core.scratch) {
            Ok(n) => n,
            Err(err) if retryable(&err) => return Progress::Again(Interest::Readable),
            Err(err) => return Progress::Fatal(Error::Read(err)),
        };

        if n == 0 {
            debug!(fd, buffered = core.inbound.len(), "peer closed its stream");
            core.read_closed = true;
            core.state = State::Closing;

            let payload = core
                .inbound
                .satisfy(&termination, true)
                .ok_or(Error::Terminated);

            let sink = core.queue.pop().and_then(Operation::into_sink);
            return Progress::Done(sink, payload);
        }

        let chunk = &core.scratch[..n];
        trace!(fd, bytes = n, "received");

        if core.partial {
            let payload = Bytes::copy_from_slice(chunk);
            let sink = core.queue.pop().and_then(Operation::into_sink);
            return Progress::Done(sink, Ok(payload));
        }

        core.inbound.append(chunk);

        match core.inbound.satisfy(&termination, false) {
            Some(payload) => {
                let sink = core.queue.pop().and_then(Operation::into_sink);
                Progress::Done(sink, Ok(payload))
            }
            None => Progress::Again(Interest::Readable),
        }
    }
}
