//! Asynchronous name resolution.
//!
//! The engine never resolves names itself: a [`Client`](crate::Client) is
//! constructed with a [`Resolve`] implementation and hands it every
//! hostname that does not parse as a literal IP address.
//!
//! A resolver answers through a [`Reply`], which may be completed from any
//! thread. The answer is queued for the event loop and delivered on the
//! loop thread during its next turn, so resolution always completes
//! asynchronously, even when the resolver answers from inside
//! [`Resolve::resolve`].

use crate::reactor::poller::Waker;
use crate::utils::Key;

use std::io;
use std::net::{IpAddr, ToSocketAddrs};
use std::sync::Arc;
use std::sync::mpsc::Sender;
use std::thread;

use tracing::debug;

/// A name resolution facility.
///
/// Implementations must complete every [`Reply`] exactly once. A reply that
/// is dropped unanswered reports a resolution failure.
pub trait Resolve {
    /// Starts resolving `host`; the answer goes to `reply`.
    fn resolve(&self, host: &str, reply: Reply);
}

/// A finished lookup travelling back to the loop thread.
pub(crate) struct Resolved {
    pub(crate) key: Key,
    pub(crate) result: io::Result<Vec<IpAddr>>,
}

/// One-shot channel back to the event loop for a single lookup.
///
/// `Reply` is `Send`, so it can be moved into a worker thread.
pub struct Reply {
    key: Key,
    sender: Option<Sender<Resolved>>,
    waker: Arc<Waker>,
}

impl Reply {
    pub(crate) fn new(key: Key, sender: Sender<Resolved>, waker: Arc<Waker>) -> Self {
        Self {
            key,
            sender: Some(sender),
            waker,
        }
    }

    /// Completes the lookup with every address found for the host.
    ///
    /// An empty list is reported to the connection as a resolution failure.
    pub fn send(mut self, result: io::Result<Vec<IpAddr>>) {
        self.deliver(result);
    }

    fn deliver(&mut self, result: io::Result<Vec<IpAddr>>) {
        if let Some(sender) = self.sender.take() {
            // The loop may already be gone; nobody is left to tell.
            let _ = sender.send(Resolved {
                key: self.key,
                result,
            });
            self.waker.wake();
        }
    }
}

impl Drop for Reply {
    fn drop(&mut self) {
        self.deliver(Err(io::Error::other("resolver dropped the request")));
    }
}

/// Resolver backed by the system's `getaddrinfo`.
///
/// Every lookup runs on a short-lived background thread so the event loop
/// never blocks on DNS. There is one thread per outstanding lookup and no
/// upper limit on how many run at once; applications issuing many
/// concurrent requests by name should supply their own [`Resolve`].
///
/// A lookup that outlives the connection timeout is failed on the loop
/// side. Its thread keeps running until `getaddrinfo` returns, and the
/// late answer is discarded.
#[derive(Clone, Debug, Default)]
pub struct SystemResolver {
    _private: (),
}

impl SystemResolver {
    /// Creates a new system resolver.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Resolve for SystemResolver {
    fn resolve(&self, host: &str, reply: Reply) {
        let host = host.to_owned();

        let spawned = thread::Builder::new()
            .name("tether-resolve".into())
            .spawn(move || {
                let result = (host.as_str(), 0)
                    .to_socket_addrs()
                    .map(|addrs| addrs.map(|addr| addr.ip()).collect::<Vec<_>>());

                debug!(%host, ok = result.is_ok(), "lookup finished");
                reply.send(result);
            });

        // A failed spawn drops the closure, and with it the reply, which
        // reports the failure to the loop.
        if let Err(err) = spawned {
            debug!(error = %err, "cannot spawn resolver thread");
        }
    }
}
