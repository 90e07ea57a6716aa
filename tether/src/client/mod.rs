//! Request orchestration.
//!
//! A [`Client`] turns each [`Request`] into a connection: literal addresses
//! and local socket paths are connected to right away, host names are
//! resolved first. Everything else (planning, I/O, completion) happens on
//! the event loop the client was built for.

mod builder;
mod destination;
mod request;

pub use builder::ClientBuilder;
pub use request::Request;

pub(crate) use builder::Config;

use crate::connection::Connection;
use crate::error::Result;
use crate::reactor::LoopHandle;
use crate::resolve::Resolve;
use destination::Destination;

use std::rc::Rc;

use tracing::debug;

/// Issues requests on an [`EventLoop`](crate::EventLoop).
///
/// Clients are cheap to clone; clones share the resolver and the
/// configuration.
#[derive(Clone)]
pub struct Client {
    handle: LoopHandle,
    resolver: Rc<dyn Resolve>,
    config: Config,
}

impl Client {
    pub(crate) fn new(handle: LoopHandle, resolver: Rc<dyn Resolve>, config: Config) -> Self {
        Self {
            handle,
            resolver,
            config,
        }
    }

    /// Returns a builder with the default configuration.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Starts a request.
    ///
    /// Returns once the connection is under way; every outcome, including
    /// failures to create the socket or to connect, is delivered to the
    /// request's sinks from the event loop. No sink runs before this call
    /// returns.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`](crate::Error::InvalidRequest) for
    /// inconsistent options, and [`Error::Io`](crate::Error::Io) if the
    /// event loop is gone.
    pub fn request(&self, request: Request) -> Result<()> {
        let prepared = request.prepare(&self.config)?;
        self.handle.ensure_alive()?;

        debug!(peer = %prepared.setup.peer, "new request");
        let conn = Connection::new(self.handle.clone(), prepared.setup);

        match prepared.destination {
            Destination::Direct(target) => conn.connect(target),
            Destination::Name { host, port } => conn.resolve(&*self.resolver, &host, port)?,
        }

        Ok(())
    }
}
