//! Readiness polling on Linux.
//!
//! A descriptor enters the epoll set when a registration is made and leaves
//! it as soon as the registration fires or is withdrawn, so every entry is
//! one-shot and `EPOLL_CTL_MOD` is never needed. An `eventfd` stays in the
//! set permanently: resolver threads write to it to cut a wait short.

use super::common::Interest;
use crate::reactor::event::Event;

use libc::{EPOLLERR, EPOLLHUP, EPOLLIN, EPOLLOUT, EPOLLRDHUP, c_int, epoll_event};
use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::sync::Arc;
use std::time::Duration;

/// Token the eventfd is registered under; packed slab keys never reach it.
const WAKER_TOKEN: u64 = u64::MAX;

/// Events collected by one `epoll_wait`.
const MAX_EVENTS: usize = 64;

/// Maps a negative return code to the current `errno`.
fn cvt(rc: c_int) -> io::Result<c_int> {
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(rc)
    }
}

/// Write end of the poller's wake-up `eventfd`.
///
/// Shared with resolver threads so a finished lookup can interrupt a
/// blocking wait.
pub(crate) struct Waker {
    eventfd: File,
}

impl Waker {
    /// Creates a non-blocking, close-on-exec `eventfd` with a zero counter.
    fn new() -> io::Result<Self> {
        let fd = cvt(unsafe { libc::eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) })?;

        Ok(Self {
            eventfd: unsafe { File::from_raw_fd(fd) },
        })
    }

    /// Interrupts a blocked [`poll`](EpollPoller::poll). Callable from any
    /// thread.
    pub(crate) fn wake(&self) {
        // EAGAIN means the counter is saturated, which still wakes the loop.
        let _ = (&self.eventfd).write(&1u64.to_ne_bytes());
    }

    /// Drains the counter so the next `epoll_wait` blocks again.
    fn reset(&self) {
        let mut counter = [0u8; 8];
        let _ = (&self.eventfd).read(&mut counter);
    }
}

/// An epoll instance plus its wake-up `eventfd`.
///
/// Tokens handed to [`register`](Self::register) come back in
/// [`Event::token`] unchanged; the poller never interprets them beyond
/// filtering out its own wake token.
pub(crate) struct EpollPoller {
    epoll: OwnedFd,
    waker: Arc<Waker>,
    buffer: Vec<epoll_event>,
}

impl EpollPoller {
    /// Creates the epoll instance and registers the waker in it.
    ///
    /// # Errors
    ///
    /// Returns the OS error if `epoll_create1`, `eventfd` or the initial
    /// `EPOLL_CTL_ADD` fails.
    pub(crate) fn new() -> io::Result<Self> {
        let epoll = cvt(unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) })?;

        let poller = Self {
            epoll: unsafe { OwnedFd::from_raw_fd(epoll) },
            waker: Arc::new(Waker::new()?),
            buffer: vec![epoll_event { events: 0, u64: 0 }; MAX_EVENTS],
        };

        poller.ctl(
            libc::EPOLL_CTL_ADD,
            poller.waker.eventfd.as_raw_fd(),
            EPOLLIN as u32,
            WAKER_TOKEN,
        )?;

        Ok(poller)
    }

    /// Issues one `epoll_ctl` call for `fd`.
    fn ctl(&self, op: c_int, fd: RawFd, events: u32, token: u64) -> io::Result<()> {
        let mut event = epoll_event { events, u64: token };
        cvt(unsafe { libc::epoll_ctl(self.epoll.as_raw_fd(), op, fd, &mut event) })?;
        Ok(())
    }

    /// Returns a shared handle to the wake-up `eventfd`.
    ///
    /// Every [`Reply`](crate::Reply) carries one so that a resolver thread
    /// can cut the current wait short.
    pub(crate) fn waker(&self) -> Arc<Waker> {
        Arc::clone(&self.waker)
    }

    /// Adds `fd` to the set, waiting for one direction only.
    ///
    /// Readable interest also asks for `EPOLLRDHUP` so a peer half-close is
    /// seen. Errors and hang-ups are always reported by epoll.
    ///
    /// # Arguments
    ///
    /// * `fd` - The non-blocking socket to watch. It must not already be in
    ///   the set.
    /// * `token` - Opaque value returned in [`Event::token`].
    /// * `interest` - The direction to wait for.
    ///
    /// # Errors
    ///
    /// Returns the `epoll_ctl` error, for example `EEXIST` when `fd` is
    /// still registered.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// poller.register(fd, key.to_token(), Interest::Writable)?;
    /// ```
    pub(crate) fn register(&self, fd: RawFd, token: u64, interest: Interest) -> io::Result<()> {
        let events = match interest {
            Interest::Readable => EPOLLIN | EPOLLRDHUP,
            Interest::Writable => EPOLLOUT,
        };

        self.ctl(libc::EPOLL_CTL_ADD, fd, events as u32, token)
    }

    /// Removes `fd` from the set.
    ///
    /// Called when a registration fires or is withdrawn, and before the
    /// descriptor is closed.
    ///
    /// # Arguments
    ///
    /// * `fd` - A descriptor previously passed to
    ///   [`register`](Self::register).
    pub(crate) fn deregister(&self, fd: RawFd) {
        // Fails only if the descriptor is already gone from the set.
        let _ = self.ctl(libc::EPOLL_CTL_DEL, fd, 0, 0);
    }

    /// Waits for readiness, at most `timeout` (forever when `None`).
    ///
    /// `events` is cleared first, then filled with one entry per ready
    /// descriptor. Wake-ups through the [`Waker`] reset the counter and add
    /// no entry. A wait interrupted by a signal returns no events.
    ///
    /// # Arguments
    ///
    /// * `events` - Reused output buffer.
    /// * `timeout` - Upper bound on the wait, rounded up to whole
    ///   milliseconds.
    ///
    /// # Errors
    ///
    /// Returns the `epoll_wait` error other than `EINTR`.
    pub(crate) fn poll(
        &mut self,
        events: &mut Vec<Event>,
        timeout: Option<Duration>,
    ) -> io::Result<()> {
        events.clear();

        // Round up so a sub-millisecond deadline does not spin.
        let timeout_ms = match timeout {
            Some(t) => t.as_micros().div_ceil(1000).min(i32::MAX as u128) as c_int,
            None => -1,
        };

        let waited = cvt(unsafe {
            libc::epoll_wait(
                self.epoll.as_raw_fd(),
                self.buffer.as_mut_ptr(),
                self.buffer.len() as c_int,
                timeout_ms,
            )
        });

        let ready = match waited {
            Ok(n) => n as usize,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => return Ok(()),
            Err(err) => return Err(err),
        };

        for raw in &self.buffer[..ready] {
            let (bits, token) = (raw.events, raw.u64);

            if token == WAKER_TOKEN {
                self.waker.reset();
                continue;
            }

            let any = |mask: c_int| bits & (mask as u32) != 0;
            events.push(Event {
                token,
                readable: any(EPOLLIN | EPOLLERR),
                writable: any(EPOLLOUT | EPOLLERR),
                closed: any(EPOLLHUP | EPOLLRDHUP),
            });
        }

        Ok(())
    }
}
