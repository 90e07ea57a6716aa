use super::Client;
use super::request::DEFAULT_CHUNK;
use crate::reactor::EventLoop;
use crate::resolve::{Resolve, SystemResolver};

use std::rc::Rc;
use std::time::Duration;

/// Timeout applied to every readiness wait unless overridden.
pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Settings shared by every request a client issues.
#[derive(Clone, Debug)]
pub(crate) struct Config {
    pub(crate) timeout: Duration,
    pub(crate) read_chunk: usize,
    pub(crate) inbound_capacity: Option<usize>,
}

/// Builder for configuring and creating a [`Client`].
///
/// # Examples
///
/// ```rust,no_run
/// use std::time::Duration;
/// use tether::{ClientBuilder, EventLoop, SystemResolver};
///
/// let event_loop = EventLoop::new()?;
/// let client = ClientBuilder::new()
///     .resolver(SystemResolver::new())
///     .timeout(Duration::from_secs(2))
///     .build(&event_loop);
/// # Ok::<(), std::io::Error>(())
/// ```
pub struct ClientBuilder {
    resolver: Option<Rc<dyn Resolve>>,
    config: Config,
}

impl ClientBuilder {
    /// Creates a builder with the default configuration: the system
    /// resolver, a 5 second timeout and 8 KiB reads.
    pub fn new() -> Self {
        Self {
            resolver: None,
            config: Config {
                timeout: DEFAULT_TIMEOUT,
                read_chunk: DEFAULT_CHUNK,
                inbound_capacity: None,
            },
        }
    }

    /// Sets the resolver used for host names.
    pub fn resolver(mut self, resolver: impl Resolve + 'static) -> Self {
        self.resolver = Some(Rc::new(resolver));
        self
    }

    /// Sets the default timeout, re-armed on every readiness wait.
    ///
    /// It also bounds a host name lookup. A duration too large to represent
    /// as a deadline, such as `Duration::MAX`, never expires.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Sets how many bytes a single read may return.
    ///
    /// # Panics
    ///
    /// Panics if `n == 0`.
    pub fn read_chunk(mut self, n: usize) -> Self {
        assert!(n > 0, "read_chunk must be > 0");

        self.config.read_chunk = n;
        self
    }

    /// Sets the initial capacity of each connection's inbound buffer.
    ///
    /// Without it, requests with a read phase start at 8 KiB and
    /// write-only requests start empty.
    pub fn inbound_capacity(mut self, capacity: usize) -> Self {
        self.config.inbound_capacity = Some(capacity);
        self
    }

    /// Builds a client bound to `event_loop`.
    pub fn build(self, event_loop: &EventLoop) -> Client {
        let resolver = self
            .resolver
            .unwrap_or_else(|| Rc::new(SystemResolver::new()));

        Client::new(event_loop.handle(), resolver, self.config)
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
