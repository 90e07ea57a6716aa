use crate::connection::Target;
use crate::error::{Error, Result};

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

/// Where a request wants to go, as given by the caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Endpoint {
    Host { host: String, port: u16 },
    Local(PathBuf),
}

/// An endpoint classified by what it takes to reach it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Destination {
    /// A literal address, or a local socket path: connect right away.
    Direct(Target),
    /// A host name that must go through the resolver first.
    Name { host: String, port: u16 },
}

impl Endpoint {
    /// Classifies the endpoint.
    ///
    /// Literal IPv4 and IPv6 addresses never reach the resolver; IPv6
    /// literals may be wrapped in brackets.
    pub(crate) fn classify(&self) -> Result<Destination> {
        match self {
            Endpoint::Host { host, .. } if host.is_empty() => {
                Err(Error::InvalidRequest("host is empty".into()))
            }
            Endpoint::Local(path) if path.as_os_str().is_empty() => {
                Err(Error::InvalidRequest("socket path is empty".into()))
            }
            Endpoint::Local(path) => Ok(Destination::Direct(Target::Local(path.clone()))),
            Endpoint::Host { host, port } => {
                let bare = host
                    .strip_prefix('[')
                    .and_then(|h| h.strip_suffix(']'))
                    .unwrap_or(host);

                match bare.parse::<IpAddr>() {
                    Ok(ip) => Ok(Destination::Direct(Target::Inet(SocketAddr::new(ip, *port)))),
                    Err(_) => Ok(Destination::Name {
                        host: host.clone(),
                        port: *port,
                    }),
                }
            }
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Host { host, port } if host.contains(':') && !host.starts_with('[') => {
                write!(f, "[{host}]:{port}")
            }
            Endpoint::Host { host, port } => write!(f, "{host}:{port}"),
            Endpoint::Local(path) => write!(f, "unix:{}", path.display()),
        }
    }
}
