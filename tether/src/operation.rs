//! Queued units of work and their completion sinks.
//!
//! A connection services an ordered queue of [`Operation`]s. Only the head
//! is ever in flight; it leaves the queue exactly once, on success or on a
//! terminal error, and its sink (if any) is invoked exactly once.

use crate::connection::Connection;
use crate::error::Error;
use crate::reactor::poller::platform::MAX_IOV;

use bytes::Bytes;
use std::collections::VecDeque;
use std::fmt;

/// What a completion sink receives: the payload, or why there is none.
///
/// Write completions carry an empty payload.
pub type Completion = Result<Bytes, Error>;

/// How a buffered read decides it is finished.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Termination {
    /// Deliver whatever is buffered as soon as anything is.
    Available,
    /// Deliver everything before the first occurrence of the pattern.
    ///
    /// The pattern itself is consumed and never delivered; bytes after it
    /// stay buffered for the next read.
    Delimiter(Bytes),
    /// Accumulate until the peer closes, then deliver everything.
    WholeOnly,
}

impl Termination {
    /// Builds a delimiter termination; an empty pattern means
    /// [`Available`](Self::Available).
    pub fn delimiter(pattern: impl Into<Bytes>) -> Self {
        let pattern = pattern.into();

        if pattern.is_empty() {
            Self::Available
        } else {
            Self::Delimiter(pattern)
        }
    }
}

/// A one-shot completion callback.
///
/// The connection handle it receives holds its own reference: the sink may
/// keep it, queue more work on it, or drop it.
pub(crate) struct Sink(Box<dyn FnOnce(Completion, Connection)>);

impl Sink {
    pub(crate) fn new<F>(f: F) -> Self
    where
        F: FnOnce(Completion, Connection) + 'static,
    {
        Self(Box::new(f))
    }

    pub(crate) fn complete(self, result: Completion, connection: Connection) {
        (self.0)(result, connection)
    }
}

impl fmt::Debug for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Sink")
    }
}

/// A write of an ordered list of segments, possibly over many sends.
#[derive(Debug)]
pub(crate) struct WriteOp {
    segments: Vec<Bytes>,
    total: usize,
    sent: usize,
    sink: Option<Sink>,
}

impl WriteOp {
    /// Builds a write; empty segments are dropped.
    ///
    /// Returns `None` when there is nothing to send, since a queued write
    /// must always have bytes left.
    pub(crate) fn new(segments: Vec<Bytes>, sink: Option<Sink>) -> Option<Self> {
        let segments: Vec<Bytes> = segments.into_iter().filter(|s| !s.is_empty()).collect();
        let total = segments.iter().map(Bytes::len).sum();

        if total == 0 {
            return None;
        }

        Some(Self {
            segments,
            total,
            sent: 0,
            sink,
        })
    }

    pub(crate) fn total(&self) -> usize {
        self.total
    }

    pub(crate) fn sent(&self) -> usize {
        self.sent
    }

    pub(crate) fn remaining(&self) -> usize {
        self.total - self.sent
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.sent >= self.total
    }

    /// Returns the unsent tail of the segment list.
    ///
    /// Fully sent segments are skipped and the first partially sent one is
    /// trimmed, so the result starts at the first unsent byte. At most
    /// `MAX_IOV` segments are returned.
    pub(crate) fn pending(&self) -> Vec<&[u8]> {
        let mut skip = self.sent;
        let mut pending = Vec::new();

        for segment in &self.segments {
            if pending.len() == MAX_IOV {
                break;
            }

            if skip >= segment.len() {
                skip -= segment.len();
                continue;
            }

            pending.push(&segment[skip..]);
            skip = 0;
        }

        pending
    }

    /// Records that the kernel accepted `n` more bytes.
    pub(crate) fn advance(&mut self, n: usize) {
        self.sent = (self.sent + n).min(self.total);
    }
}

/// A read terminated according to a [`Termination`].
#[derive(Debug)]
pub(crate) struct ReadOp {
    pub(crate) termination: Termination,
    sink: Option<Sink>,
}

impl ReadOp {
    pub(crate) fn new(termination: Termination, sink: Option<Sink>) -> Self {
        Self { termination, sink }
    }
}

/// One queued unit of work.
#[derive(Debug)]
pub(crate) enum Operation {
    Write(WriteOp),
    Read(ReadOp),
}

impl Operation {
    pub(crate) fn into_sink(self) -> Option<Sink> {
        match self {
            Operation::Write(write) => write.sink,
            Operation::Read(read) => read.sink,
        }
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Operation::Write(_) => "write",
            Operation::Read(_) => "read",
        }
    }
}

/// FIFO of pending operations; the front is the one in flight.
#[derive(Debug, Default)]
pub(crate) struct OperationQueue {
    operations: VecDeque<Operation>,
}

impl OperationQueue {
    pub(crate) fn push(&mut self, operation: Operation) {
        self.operations.push_back(operation);
    }

    pub(crate) fn head(&self) -> Option<&Operation> {
        self.operations.front()
    }

    pub(crate) fn head_mut(&mut self) -> Option<&mut Operation> {
        self.operations.front_mut()
    }

    /// Removes the operation in flight.
    pub(crate) fn pop(&mut self) -> Option<Operation> {
        self.operations.pop_front()
    }

    pub(crate) fn len(&self) -> usize {
        self.operations.len()
    }

    /// Removes every queued operation, head first.
    pub(crate) fn drain(&mut self) -> Vec<Operation> {
        self.operations.drain(..).collect()
    }
}
