use super::event::Event;
use super::poller::Poller;
use super::poller::common::Interest;
use super::timer::Deadline;
use crate::resolve::{Resolve, Reply, Resolved};
use crate::utils::{Key, Slab};

use std::cell::RefCell;
use std::collections::{BinaryHeap, VecDeque};
use std::io;
use std::net::IpAddr;
use std::os::fd::RawFd;
use std::rc::{Rc, Weak};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::time::{Duration, Instant};

use tracing::trace;

/// Outcome delivered to a readiness registration.
///
/// Every registration fires exactly once with one of these values, or is
/// withdrawn without firing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Readiness {
    /// The socket has data (or a pending error, or end of stream) to read.
    Readable,
    /// The socket accepts writes, or a connect attempt settled.
    Writable,
    /// The peer hung up while nothing was readable or writable.
    Closed,
    /// The registration's timeout elapsed first.
    Timeout,
}

pub(crate) type Handler = Box<dyn FnOnce(Readiness)>;
pub(crate) type Deferred = Box<dyn FnOnce()>;
pub(crate) type LookupHandler = Box<dyn FnOnce(io::Result<Vec<IpAddr>>)>;

struct Registration {
    fd: RawFd,
    interest: Interest,
    handler: Handler,
}

impl Registration {
    /// Maps the poller bits onto what this registration waits for.
    fn classify(&self, event: &Event) -> Option<Readiness> {
        let ready = match self.interest {
            Interest::Readable => event.readable,
            Interest::Writable => event.writable,
        };

        if ready {
            Some(match self.interest {
                Interest::Readable => Readiness::Readable,
                Interest::Writable => Readiness::Writable,
            })
        } else if event.closed {
            Some(Readiness::Closed)
        } else {
            None
        }
    }
}

/// State shared between the [`EventLoop`] and its [`LoopHandle`]s.
///
/// Callbacks are never invoked while this state is borrowed: the loop
/// removes a registration first and calls its handler afterwards, so a
/// handler is free to register, withdraw or defer again.
struct Reactor {
    poller: Poller,
    registrations: Slab<Registration>,
    timers: BinaryHeap<Deadline>,
    deferred: VecDeque<Deferred>,
    lookups: Slab<LookupHandler>,
    lookup_deadlines: BinaryHeap<Deadline>,
    resolved_tx: Sender<Resolved>,
}

impl Reactor {
    fn is_idle(&self) -> bool {
        self.registrations.is_empty() && self.lookups.is_empty() && self.deferred.is_empty()
    }

    fn next_timeout(&self) -> Option<Duration> {
        if !self.deferred.is_empty() {
            return Some(Duration::ZERO);
        }

        let earliest = match (self.timers.peek(), self.lookup_deadlines.peek()) {
            (Some(a), Some(b)) => Some(a.at.min(b.at)),
            (a, b) => a.or(b).map(|d| d.at),
        };

        earliest.map(|at| at.saturating_duration_since(Instant::now()))
    }
}

/// Returns the instant `timeout` from now, or `None` when it does not fit.
fn deadline_after(timeout: Option<Duration>) -> Option<Instant> {
    timeout.and_then(|timeout| Instant::now().checked_add(timeout))
}

/// A single-threaded readiness loop.
///
/// The `EventLoop` drives every connection created by a
/// [`Client`](crate::Client) bound to it. All callbacks (readiness,
/// timeouts, resolver answers, deferred work) run on the thread calling
/// [`run`](Self::run) or [`turn`](Self::turn).
///
/// # Examples
///
/// ```rust,no_run
/// use tether::{Client, EventLoop, Request};
///
/// let mut event_loop = EventLoop::new()?;
/// let client = Client::builder().build(&event_loop);
///
/// client.request(
///     Request::new("127.0.0.1", 7)
///         .data("ping\n")
///         .stop_pattern("\n")
///         .callback(|result, _conn| println!("{result:?}")),
/// )?;
///
/// event_loop.run()?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct EventLoop {
    reactor: Rc<RefCell<Reactor>>,
    resolved: Receiver<Resolved>,
    events: Vec<Event>,
}

impl EventLoop {
    /// Creates a new event loop backed by a fresh poller.
    pub fn new() -> io::Result<Self> {
        let (resolved_tx, resolved) = channel();

        let reactor = Reactor {
            poller: Poller::new()?,
            registrations: Slab::with_capacity(64),
            timers: BinaryHeap::new(),
            deferred: VecDeque::new(),
            lookups: Slab::with_capacity(16),
            lookup_deadlines: BinaryHeap::new(),
            resolved_tx,
        };

        Ok(Self {
            reactor: Rc::new(RefCell::new(reactor)),
            resolved,
            events: Vec::with_capacity(64),
        })
    }

    /// Returns a handle used to register work with this loop.
    pub(crate) fn handle(&self) -> LoopHandle {
        LoopHandle {
            reactor: Rc::downgrade(&self.reactor),
        }
    }

    /// Returns `true` when nothing is registered, pending or deferred.
    pub fn is_idle(&self) -> bool {
        self.reactor.borrow().is_idle()
    }

    /// Runs the loop until it is idle.
    ///
    /// The loop is idle once every connection has either finished its
    /// operation queue or failed, and no lookup or deferred callback is
    /// outstanding.
    pub fn run(&mut self) -> io::Result<()> {
        while !self.is_idle() {
            self.turn()?;
        }

        Ok(())
    }

    /// Runs a single iteration of the loop.
    ///
    /// One turn runs the deferred callbacks queued so far, delivers
    /// finished lookups, waits for readiness (bounded by the nearest
    /// deadline) and dispatches what fired.
    pub fn turn(&mut self) -> io::Result<()> {
        self.run_deferred();
        self.deliver_lookups();

        let timeout = {
            let reactor = self.reactor.borrow();
            if reactor.is_idle() {
                return Ok(());
            }
            reactor.next_timeout()
        };

        self.reactor
            .borrow_mut()
            .poller
            .poll(&mut self.events, timeout)?;

        let events = std::mem::take(&mut self.events);
        for event in &events {
            self.dispatch(event);
        }
        self.events = events;

        self.expire_timers();
        self.deliver_lookups();
        self.expire_lookups();

        Ok(())
    }

    fn run_deferred(&mut self) {
        let batch = std::mem::take(&mut self.reactor.borrow_mut().deferred);

        for callback in batch {
            callback();
        }
    }

    fn deliver_lookups(&mut self) {
        while let Ok(resolved) = self.resolved.try_recv() {
            let handler = self.reactor.borrow_mut().lookups.remove(resolved.key);

            if let Some(handler) = handler {
                handler(resolved.result);
            }
        }
    }

    fn dispatch(&mut self, event: &Event) {
        let key = Key::from_token(event.token);

        let fired = {
            let mut reactor = self.reactor.borrow_mut();

            let readiness = match reactor.registrations.get(key) {
                Some(registration) => registration.classify(event),
                None => None,
            };

            match readiness {
                Some(readiness) => reactor.registrations.remove(key).map(|registration| {
                    reactor.poller.deregister(registration.fd);
                    (registration, readiness)
                }),
                None => None,
            }
        };

        if let Some((registration, readiness)) = fired {
            trace!(fd = registration.fd, ?readiness, "registration fired");
            (registration.handler)(readiness);
        }
    }

    fn expire_timers(&mut self) {
        let now = Instant::now();

        loop {
            let expired = {
                let mut reactor = self.reactor.borrow_mut();

                let due = matches!(reactor.timers.peek(), Some(t) if t.at <= now);
                if !due {
                    break;
                }

                let Some(entry) = reactor.timers.pop() else {
                    break;
                };

                let registration = reactor.registrations.remove(entry.key);
                if let Some(registration) = &registration {
                    reactor.poller.deregister(registration.fd);
                }
                registration
            };

            if let Some(registration) = expired {
                trace!(fd = registration.fd, "registration timed out");
                (registration.handler)(Readiness::Timeout);
            }
        }
    }

    /// Fails lookups whose resolver did not answer in time.
    ///
    /// A late answer finds its key gone from the slab and is dropped by
    /// [`deliver_lookups`](Self::deliver_lookups).
    fn expire_lookups(&mut self) {
        let now = Instant::now();

        loop {
            let expired = {
                let mut reactor = self.reactor.borrow_mut();

                let due = matches!(reactor.lookup_deadlines.peek(), Some(d) if d.at <= now);
                if !due {
                    break;
                }

                let Some(entry) = reactor.lookup_deadlines.pop() else {
                    break;
                };

                reactor.lookups.remove(entry.key)
            };

            if let Some(handler) = expired {
                trace!("lookup timed out");
                handler(Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "resolver did not answer in time",
                )));
            }
        }
    }
}

impl Drop for EventLoop {
    /// Drops every outstanding registration, lookup and deferred callback.
    ///
    /// They are released after the shared state is unborrowed, because
    /// releasing the last reference to a connection withdraws its
    /// registration through a [`LoopHandle`].
    fn drop(&mut self) {
        let (registrations, lookups, deferred) = {
            let mut reactor = self.reactor.borrow_mut();
            (
                reactor.registrations.drain(),
                reactor.lookups.drain(),
                std::mem::take(&mut reactor.deferred),
            )
        };

        for registration in &registrations {
            self.reactor.borrow().poller.deregister(registration.fd);
        }

        drop(registrations);
        drop(lookups);
        drop(deferred);
    }
}

/// A cloneable reference to an [`EventLoop`].
///
/// Handles do not keep the loop alive; once the loop is dropped every
/// registration attempt fails with an I/O error.
#[derive(Clone)]
pub(crate) struct LoopHandle {
    reactor: Weak<RefCell<Reactor>>,
}

impl LoopHandle {
    fn upgrade(&self) -> io::Result<Rc<RefCell<Reactor>>> {
        self.reactor
            .upgrade()
            .ok_or_else(|| io::Error::other("event loop has shut down"))
    }

    /// Fails if the loop this handle points at has been dropped.
    pub(crate) fn ensure_alive(&self) -> io::Result<()> {
        self.upgrade().map(drop)
    }

    /// Waits once for `interest` on `fd`, or for `timeout` to elapse.
    ///
    /// The handler fires exactly once unless the registration is withdrawn
    /// with [`unregister`](Self::unregister) first.
    pub(crate) fn register(
        &self,
        fd: RawFd,
        interest: Interest,
        timeout: Option<Duration>,
        handler: Handler,
    ) -> io::Result<Key> {
        let reactor = self.upgrade()?;
        let mut reactor = reactor.borrow_mut();

        let key = reactor.registrations.insert(Registration {
            fd,
            interest,
            handler,
        });

        if let Err(err) = reactor.poller.register(fd, key.to_token(), interest) {
            let rejected = reactor.registrations.remove(key);
            drop(reactor);
            drop(rejected);
            return Err(err);
        }

        // A timeout too large to represent never expires.
        if let Some(at) = deadline_after(timeout) {
            reactor.timers.push(Deadline { at, key });
        }

        trace!(fd, ?interest, live = reactor.registrations.len(), "registered");
        Ok(key)
    }

    /// Withdraws a registration without firing it.
    ///
    /// Returns `false` if the registration already fired or was withdrawn.
    pub(crate) fn unregister(&self, key: Key) -> bool {
        let Ok(reactor) = self.upgrade() else {
            return false;
        };

        let withdrawn = {
            let mut reactor = reactor.borrow_mut();
            let registration = reactor.registrations.remove(key);
            if let Some(registration) = &registration {
                reactor.poller.deregister(registration.fd);
            }
            registration
        };

        withdrawn.is_some()
    }

    /// Runs `callback` on the loop thread during the next turn.
    pub(crate) fn defer(&self, callback: Deferred) -> io::Result<()> {
        let reactor = self.upgrade()?;
        reactor.borrow_mut().deferred.push_back(callback);
        Ok(())
    }

    /// Asks `resolver` for the addresses of `host`.
    ///
    /// The handler runs on the loop thread once the resolver answers,
    /// never from inside this call. If `timeout` elapses first the handler
    /// receives an [`io::ErrorKind::TimedOut`] error and the eventual answer
    /// is discarded.
    pub(crate) fn resolve(
        &self,
        resolver: &dyn Resolve,
        host: &str,
        timeout: Option<Duration>,
        handler: LookupHandler,
    ) -> io::Result<()> {
        let reactor = self.upgrade()?;

        let reply = {
            let mut reactor = reactor.borrow_mut();
            let key = reactor.lookups.insert(handler);
            if let Some(at) = deadline_after(timeout) {
                reactor.lookup_deadlines.push(Deadline { at, key });
            }
            Reply::new(key, reactor.resolved_tx.clone(), reactor.poller.waker())
        };

        resolver.resolve(host, reply);
        Ok(())
    }
}
