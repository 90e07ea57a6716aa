//! Platform-specific I/O poller abstraction.
//!
//! The poller is used by the event loop to:
//! - wait for readiness of connection sockets,
//! - wake up when a resolver thread posts a result,
//! - bound the wait by the nearest registration deadline.
//!
//! Only Linux `epoll` is implemented; the raw socket helpers in [`unix`]
//! are shared by every Unix target.

pub(crate) mod common;

#[cfg(target_os = "linux")]
mod epoll;

#[cfg(target_os = "linux")]
pub(crate) use epoll::{EpollPoller as Poller, Waker};

#[cfg(not(target_os = "linux"))]
compile_error!("tether requires an epoll-capable target (Linux)");

#[cfg(unix)]
pub(crate) mod unix;

#[cfg(unix)]
pub(crate) use unix as platform;
