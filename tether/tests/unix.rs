mod common;

use common::{Outcome, init_logging, log, record};

use std::io::{Read, Write};
use std::os::fd::AsRawFd;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;
use std::thread;

use tether::{Client, ErrorKind, EventLoop, Request};

fn socket_path(name: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("tether-{}-{name}.sock", std::process::id()));
    let _ = std::fs::remove_file(&path);
    path
}

#[test]
fn unix_socket_round_trip() {
    init_logging();

    let path = socket_path("echo");
    let listener = UnixListener::bind(&path).expect("Failed to bind listener");

    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("Failed to accept connection");
        let mut buf = [0u8; 5];
        stream
            .read_exact(&mut buf)
            .expect("Failed to read from stream");
        assert_eq!(&buf, b"PING\n");
        stream
            .write_all(b"PONG\n")
            .expect("Failed to write to stream");
    });

    let mut event_loop = EventLoop::new().unwrap();
    let client = Client::builder().build(&event_loop);
    let seen = log();

    client
        .request(
            Request::unix(&path)
                .data("PING\n")
                .stop_pattern("\n")
                .callback(record(&seen)),
        )
        .unwrap();

    event_loop.run().unwrap();
    server.join().expect("Thread panicked");
    let _ = std::fs::remove_file(&path);

    assert_eq!(*seen.borrow(), vec![Outcome::data(b"PONG")]);
}

#[test]
fn missing_unix_socket_fails_to_connect() {
    init_logging();

    let path = socket_path("missing");

    let mut event_loop = EventLoop::new().unwrap();
    let client = Client::builder().build(&event_loop);
    let seen = log();

    client
        .request(Request::unix(&path).callback(record(&seen)))
        .unwrap();

    event_loop.run().unwrap();

    assert_eq!(
        *seen.borrow(),
        vec![Outcome::Failed(ErrorKind::ConnectFailure)]
    );
}

#[test]
fn full_backlog_fails_to_connect() {
    init_logging();

    let path = socket_path("backlog");
    let listener = UnixListener::bind(&path).expect("Failed to bind listener");
    let rc = unsafe { libc::listen(listener.as_raw_fd(), 0) };
    assert_eq!(rc, 0, "Failed to shrink backlog");

    // Never accepted, so the queue stays full.
    let _pending = UnixStream::connect(&path).expect("Failed to queue client");

    let mut event_loop = EventLoop::new().unwrap();
    let client = Client::builder().build(&event_loop);
    let seen = log();

    client
        .request(
            Request::unix(&path)
                .data("hello")
                .read(false)
                .callback(record(&seen)),
        )
        .unwrap();

    event_loop.run().unwrap();
    let _ = std::fs::remove_file(&path);

    assert_eq!(
        *seen.borrow(),
        vec![Outcome::Failed(ErrorKind::ConnectFailure)]
    );
}
