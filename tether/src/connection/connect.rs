//! Resolution and non-blocking connect.

use super::{Connection, State};
use crate::error::Error;
use crate::reactor::Interest;
use crate::reactor::poller::platform::{
    LOCAL_DOMAIN, connect_in_progress, domain_of, sys_connect, sys_connect_local,
    sys_get_socket_error, sys_socket,
};
use crate::resolve::Resolve;

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use tracing::debug;

/// An address the engine can connect to without resolving anything.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Target {
    Inet(SocketAddr),
    Local(PathBuf),
}

/// Picks the address to connect to: the first IPv4 one, else the first
/// IPv6 one.
fn preferred(addrs: &[IpAddr]) -> Option<IpAddr> {
    addrs
        .iter()
        .find(|ip| ip.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
}

impl Connection {
    /// Creates the socket and starts connecting to `target`.
    ///
    /// Completion is always observed through a writability wait, even when
    /// the kernel finishes the connect immediately.
    pub(crate) fn connect(&self, target: Target) {
        let peer = {
            let mut core = self.core.borrow_mut();
            core.state = State::Connecting;
            core.peer.clone()
        };

        let domain = match &target {
            Target::Inet(addr) => domain_of(addr),
            Target::Local(_) => LOCAL_DOMAIN,
        };

        let fd = match sys_socket(domain) {
            Ok(fd) => fd,
            Err(source) => return self.fail_later(Error::Connect { peer, source }),
        };
        self.core.borrow_mut().fd = Some(fd);

        let started = match &target {
            Target::Inet(addr) => sys_connect(fd, addr),
            Target::Local(path) => sys_connect_local(fd, path),
        };

        match started {
            Ok(()) => {}
            Err(err) if connect_in_progress(&err) => {}
            Err(source) => {
                debug!(fd, %peer, error = %source, "connect refused immediately");
                return self.fail_later(Error::Connect { peer, source });
            }
        }

        debug!(fd, %peer, ?target, "connecting");
        self.arm(Interest::Writable);
    }

    /// Hands `host` to the resolver; the connect starts once it answers.
    ///
    /// The pending lookup holds a reference to the connection and is bounded
    /// by the connection timeout.
    pub(crate) fn resolve(&self, resolver: &dyn Resolve, host: &str, port: u16) -> io::Result<()> {
        let (handle, timeout) = {
            let mut core = self.core.borrow_mut();
            core.state = State::Resolving;
            (core.handle.clone(), core.timeout)
        };

        debug!(host, port, ?timeout, "resolving");

        let conn = self.clone();
        let name = host.to_owned();
        handle.resolve(
            resolver,
            host,
            Some(timeout),
            Box::new(move |result| conn.on_resolved(&name, port, result)),
        )
    }

    fn on_resolved(&self, host: &str, port: u16, result: io::Result<Vec<IpAddr>>) {
        let chosen = result.and_then(|addrs| {
            preferred(&addrs)
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no address records"))
        });

        match chosen {
            Ok(ip) => {
                debug!(host, %ip, "resolved");
                self.connect(Target::Inet(SocketAddr::new(ip, port)));
            }
            Err(err) => self.fail(Error::Resolution {
                host: host.to_owned(),
                reason: err.to_string(),
            }),
        }
    }

    /// Runs when the connect wait fires: probes the socket error, then
    /// runs `on_connect` before anything queued is planned.
    pub(super) fn finish_connect(&self) {
        let (fd, peer) = {
            let core = self.core.borrow();
            (core.fd, core.peer.clone())
        };

        let Some(fd) = fd else {
            return;
        };

        if let Err(source) = sys_get_socket_error(fd) {
            return self.fail(Error::Connect { peer, source });
        }

        let on_connect = {
            let mut core = self.core.borrow_mut();
            core.connected = true;
            core.state = State::Connected;
            core.on_connect.take()
        };

        debug!(fd, %peer, "connected");

        if let Some(on_connect) = on_connect {
            on_connect(self.clone());
        }

        self.plan_next();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn prefers_ipv4() {
        let v6 = IpAddr::V6(Ipv6Addr::LOCALHOST);
        let v4 = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1));

        assert_eq!(preferred(&[v6, v4]), Some(v4));
        assert_eq!(preferred(&[v6]), Some(v6));
        assert_eq!(preferred(&[]), None);
    }
}
