//! Raw socket calls used by connections.
//!
//! Every wrapper returns `io::Result` and leaves retry decisions
//! (`EAGAIN`, `EINTR`, `EINPROGRESS`) to the caller.

use libc::{
    AF_INET, AF_INET6, AF_UNIX, MSG_NOSIGNAL, SHUT_WR, SO_ERROR, SOCK_CLOEXEC, SOCK_NONBLOCK,
    SOCK_STREAM, SOL_SOCKET, c_int, c_void, iovec, msghdr, sa_family_t, sockaddr, sockaddr_in,
    sockaddr_in6, sockaddr_storage, sockaddr_un, socklen_t,
};
use std::net::SocketAddr;
use std::os::fd::RawFd;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::{io, mem, ptr};

/// Upper bound on segments handed to one `sendmsg` (`UIO_MAXIOV` on Linux).
pub(crate) const MAX_IOV: usize = 1024;

/// Domain used for local (Unix) stream sockets.
pub(crate) const LOCAL_DOMAIN: c_int = AF_UNIX;

/// Syscall return values that signal failure by being negative.
trait Status: Copy {
    fn failed(self) -> bool;
}

impl Status for c_int {
    fn failed(self) -> bool {
        self < 0
    }
}

impl Status for isize {
    fn failed(self) -> bool {
        self < 0
    }
}

/// Turns a `-1` return into the current `errno`.
fn check<T: Status>(rc: T) -> io::Result<T> {
    if rc.failed() {
        Err(io::Error::last_os_error())
    } else {
        Ok(rc)
    }
}

/// Creates a non-blocking, close-on-exec stream socket.
pub(crate) fn sys_socket(domain: c_int) -> io::Result<RawFd> {
    check(unsafe { libc::socket(domain, SOCK_STREAM | SOCK_NONBLOCK | SOCK_CLOEXEC, 0) })
}

/// Closes a descriptor, ignoring errors.
pub(crate) fn sys_close(fd: RawFd) {
    unsafe { libc::close(fd) };
}

/// Returns the socket domain matching an address family.
pub(crate) fn domain_of(addr: &SocketAddr) -> c_int {
    if addr.is_ipv4() { AF_INET } else { AF_INET6 }
}

/// Starts connecting `fd` to an IP endpoint.
pub(crate) fn sys_connect(fd: RawFd, addr: &SocketAddr) -> io::Result<()> {
    let (storage, len) = to_sockaddr(addr);
    check(unsafe { libc::connect(fd, ptr::from_ref(&storage).cast::<sockaddr>(), len) })?;
    Ok(())
}

/// Starts connecting `fd` to a Unix-domain socket path.
pub(crate) fn sys_connect_local(fd: RawFd, path: &Path) -> io::Result<()> {
    let mut addr: sockaddr_un = unsafe { mem::zeroed() };
    addr.sun_family = AF_UNIX as sa_family_t;

    let bytes = path.as_os_str().as_bytes();
    // sun_path must keep its trailing NUL.
    if bytes.len() >= addr.sun_path.len() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "unix socket path is too long",
        ));
    }

    for (dst, src) in addr.sun_path.iter_mut().zip(bytes) {
        *dst = *src as _;
    }

    let len = (mem::size_of::<sa_family_t>() + bytes.len() + 1) as socklen_t;
    check(unsafe { libc::connect(fd, ptr::from_ref(&addr).cast::<sockaddr>(), len) })?;
    Ok(())
}

/// Returns `true` if a `connect(2)` error means the attempt is still running.
///
/// `EAGAIN` is not among them: on a Unix socket it means the listener's
/// backlog is full and nothing was started.
pub(crate) fn connect_in_progress(err: &io::Error) -> bool {
    matches!(
        err.raw_os_error(),
        Some(libc::EINPROGRESS) | Some(libc::EINTR)
    )
}

/// Reads the error left on a socket by an asynchronous connect.
pub(crate) fn sys_get_socket_error(fd: RawFd) -> io::Result<()> {
    let mut pending: c_int = 0;
    let mut len = mem::size_of::<c_int>() as socklen_t;

    check(unsafe {
        libc::getsockopt(
            fd,
            SOL_SOCKET,
            SO_ERROR,
            ptr::from_mut(&mut pending).cast::<c_void>(),
            &mut len,
        )
    })?;

    match pending {
        0 => Ok(()),
        errno => Err(io::Error::from_raw_os_error(errno)),
    }
}

/// Performs one non-blocking read; `Ok(0)` is end of stream.
pub(crate) fn sys_read(fd: RawFd, buffer: &mut [u8]) -> io::Result<usize> {
    let n = check(unsafe { libc::read(fd, buffer.as_mut_ptr().cast::<c_void>(), buffer.len()) })?;
    Ok(n as usize)
}

/// Scatter-writes `segments` with a single `sendmsg(2)`.
///
/// At most [`MAX_IOV`] segments are submitted. `MSG_NOSIGNAL` turns a
/// reset peer into `EPIPE` instead of `SIGPIPE`.
pub(crate) fn sys_sendmsg(fd: RawFd, segments: &[&[u8]]) -> io::Result<usize> {
    let mut iov: Vec<iovec> = segments
        .iter()
        .take(MAX_IOV)
        .map(|segment| iovec {
            iov_base: segment.as_ptr().cast_mut().cast::<c_void>(),
            iov_len: segment.len(),
        })
        .collect();

    let mut msg: msghdr = unsafe { mem::zeroed() };
    msg.msg_iov = iov.as_mut_ptr();
    msg.msg_iovlen = iov.len() as _;

    let n = check(unsafe { libc::sendmsg(fd, &msg, MSG_NOSIGNAL) })?;
    Ok(n as usize)
}

/// Half-closes the sending direction.
pub(crate) fn sys_shutdown_write(fd: RawFd) -> io::Result<()> {
    check(unsafe { libc::shutdown(fd, SHUT_WR) })?;
    Ok(())
}

/// Encodes an IP endpoint as a kernel socket address.
fn to_sockaddr(addr: &SocketAddr) -> (sockaddr_storage, socklen_t) {
    let mut storage: sockaddr_storage = unsafe { mem::zeroed() };

    let len = match addr {
        SocketAddr::V4(v4) => {
            let sin = sockaddr_in {
                sin_family: AF_INET as sa_family_t,
                sin_port: v4.port().to_be(),
                sin_addr: libc::in_addr {
                    s_addr: u32::from_ne_bytes(v4.ip().octets()),
                },
                sin_zero: [0; 8],
            };
            unsafe { ptr::write(ptr::from_mut(&mut storage).cast::<sockaddr_in>(), sin) };
            mem::size_of::<sockaddr_in>()
        }
        SocketAddr::V6(v6) => {
            let sin6 = sockaddr_in6 {
                sin6_family: AF_INET6 as sa_family_t,
                sin6_port: v6.port().to_be(),
                sin6_flowinfo: v6.flowinfo(),
                sin6_addr: libc::in6_addr {
                    s6_addr: v6.ip().octets(),
                },
                sin6_scope_id: v6.scope_id(),
            };
            unsafe { ptr::write(ptr::from_mut(&mut storage).cast::<sockaddr_in6>(), sin6) };
            mem::size_of::<sockaddr_in6>()
        }
    };

    (storage, len as socklen_t)
}
