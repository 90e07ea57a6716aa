#![allow(dead_code)]

use std::cell::RefCell;
use std::io::Read;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::os::fd::AsRawFd;
use std::rc::Rc;
use std::sync::Once;
use std::thread::{self, JoinHandle};

use tether::{Completion, Connection, ErrorKind};
use tracing_subscriber::EnvFilter;

static INIT_LOGGING: Once = Once::new();

/// Installs a test-writer subscriber once; `RUST_LOG` overrides the level.
pub fn init_logging() {
    INIT_LOGGING.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tether=debug"));

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_ansi(false)
            .try_init();
    });
}

/// Accepts a single connection on a loopback port and runs `handler` on it.
pub fn serve<F>(handler: F) -> (SocketAddr, JoinHandle<()>)
where
    F: FnOnce(TcpStream) + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind listener");
    let addr = listener.local_addr().expect("Failed to get local address");

    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().expect("Failed to accept connection");
        handler(stream);
    });

    (addr, handle)
}

/// Reads up to and including the next `\n`.
pub fn read_line(stream: &mut TcpStream) -> String {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];

    loop {
        stream
            .read_exact(&mut byte)
            .expect("Failed to read from stream");
        line.push(byte[0]);

        if byte[0] == b'\n' {
            break;
        }
    }

    String::from_utf8(line).expect("Line is not UTF-8")
}

/// Makes dropping `stream` send a reset instead of an orderly close.
pub fn reset_on_close(stream: &TcpStream) {
    let linger = libc::linger {
        l_onoff: 1,
        l_linger: 0,
    };

    let rc = unsafe {
        libc::setsockopt(
            stream.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_LINGER,
            std::ptr::from_ref(&linger).cast::<libc::c_void>(),
            std::mem::size_of::<libc::linger>() as libc::socklen_t,
        )
    };
    assert_eq!(rc, 0, "Failed to set SO_LINGER");
}

/// What a completion sink observed.
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    Data(Vec<u8>),
    Failed(ErrorKind),
}

impl Outcome {
    pub fn data(bytes: &[u8]) -> Self {
        Outcome::Data(bytes.to_vec())
    }
}

impl From<Completion> for Outcome {
    fn from(result: Completion) -> Self {
        match result {
            Ok(payload) => Outcome::Data(payload.to_vec()),
            Err(err) => Outcome::Failed(err.kind()),
        }
    }
}

pub type Log = Rc<RefCell<Vec<Outcome>>>;

pub fn log() -> Log {
    Rc::new(RefCell::new(Vec::new()))
}

/// A sink that appends what it receives to `log` and drops the handle.
pub fn record(log: &Log) -> impl FnOnce(Completion, Connection) + 'static {
    let log = log.clone();
    move |result, _conn| log.borrow_mut().push(Outcome::from(result))
}
