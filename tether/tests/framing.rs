mod common;

use common::{Log, Outcome, init_logging, log, read_line, record, serve};

use std::io::Write;
use std::thread;
use std::time::Duration;

use tether::{Client, Completion, Connection, ErrorKind, EventLoop, Request, Termination};

/// Records every chunk and asks for the next one until the stream fails.
fn collect_chunks(log: Log) -> Box<dyn FnOnce(Completion, Connection)> {
    Box::new(move |result, conn| {
        let more = result.is_ok();
        log.borrow_mut().push(result.into());

        if more {
            conn.add_read(Termination::Available, collect_chunks(log));
        }
    })
}

#[test]
fn leftover_is_served_to_next_read() {
    init_logging();

    let (addr, server) = serve(|mut stream| {
        assert_eq!(read_line(&mut stream), "LIST\n");
        stream
            .write_all(b"abc\r\n.\r\nxyz\r\n.\r\n")
            .expect("Failed to write to stream");
        thread::sleep(Duration::from_millis(100));
    });

    let mut event_loop = EventLoop::new().unwrap();
    let client = Client::builder().build(&event_loop);
    let seen = log();

    let first = seen.clone();
    client
        .request(
            Request::new(addr.ip().to_string(), addr.port())
                .data("LIST\n")
                .stop_pattern("\r\n.\r\n")
                .callback(move |result, conn| {
                    first.borrow_mut().push(result.into());
                    conn.add_read(Termination::delimiter("\r\n.\r\n"), record(&first));
                }),
        )
        .unwrap();

    event_loop.run().unwrap();
    server.join().expect("Thread panicked");

    assert_eq!(
        *seen.borrow(),
        vec![Outcome::data(b"abc"), Outcome::data(b"xyz")]
    );
}

#[test]
fn partial_mode_delivers_each_chunk() {
    init_logging();

    let (addr, server) = serve(|mut stream| {
        for chunk in [&b"one"[..], b"two", b"three"] {
            stream.write_all(chunk).expect("Failed to write to stream");
            thread::sleep(Duration::from_millis(30));
        }
    });

    let mut event_loop = EventLoop::new().unwrap();
    let client = Client::builder().build(&event_loop);
    let seen = log();

    client
        .request(
            Request::new(addr.ip().to_string(), addr.port())
                .partial(true)
                .stop_pattern("w")
                .callback(collect_chunks(seen.clone())),
        )
        .unwrap();

    event_loop.run().unwrap();
    server.join().expect("Thread panicked");

    let seen = seen.borrow();
    let (last, chunks) = seen.split_last().unwrap();
    assert_eq!(*last, Outcome::Failed(ErrorKind::EofWithoutData));

    let mut joined = Vec::new();
    for chunk in chunks {
        match chunk {
            Outcome::Data(bytes) => {
                assert!(!bytes.is_empty());
                joined.extend_from_slice(bytes);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
    assert_eq!(joined, b"onetwothree");
}

#[test]
fn eof_delivers_unterminated_buffer_once() {
    init_logging();

    let (addr, server) = serve(|mut stream| {
        stream
            .write_all(b"no terminator here")
            .expect("Failed to write to stream");
    });

    let mut event_loop = EventLoop::new().unwrap();
    let client = Client::builder().build(&event_loop);
    let seen = log();

    client
        .request(
            Request::new(addr.ip().to_string(), addr.port())
                .stop_pattern("\r\n")
                .callback(record(&seen)),
        )
        .unwrap();

    event_loop.run().unwrap();
    server.join().expect("Thread panicked");

    assert_eq!(*seen.borrow(), vec![Outcome::data(b"no terminator here")]);
}

#[test]
fn eof_on_empty_buffer_reports_termination() {
    init_logging();

    let (addr, server) = serve(|mut stream| {
        assert_eq!(read_line(&mut stream), "STAT\n");
    });

    let mut event_loop = EventLoop::new().unwrap();
    let client = Client::builder().build(&event_loop);
    let seen = log();

    client
        .request(
            Request::new(addr.ip().to_string(), addr.port())
                .data("STAT\n")
                .stop_pattern("\n")
                .callback(record(&seen)),
        )
        .unwrap();

    event_loop.run().unwrap();
    server.join().expect("Thread panicked");

    assert_eq!(
        *seen.borrow(),
        vec![Outcome::Failed(ErrorKind::EofWithoutData)]
    );
}

#[test]
fn reads_after_eof_fail_without_io() {
    init_logging();

    let (addr, server) = serve(|mut stream| {
        stream.write_all(b"a|").expect("Failed to write to stream");
    });

    let mut event_loop = EventLoop::new().unwrap();
    let client = Client::builder().build(&event_loop);
    let seen = log();

    let outer = seen.clone();
    client
        .request(
            Request::new(addr.ip().to_string(), addr.port())
                .stop_pattern("|")
                .callback(move |result, conn| {
                    outer.borrow_mut().push(result.into());

                    let inner = outer.clone();
                    conn.add_read(Termination::delimiter("|"), move |result, conn| {
                        inner.borrow_mut().push(result.into());
                        conn.add_read(Termination::Available, record(&inner));
                    });
                }),
        )
        .unwrap();

    event_loop.run().unwrap();
    server.join().expect("Thread panicked");

    assert_eq!(
        *seen.borrow(),
        vec![
            Outcome::data(b"a"),
            Outcome::Failed(ErrorKind::EofWithoutData),
            Outcome::Failed(ErrorKind::EofWithoutData),
        ]
    );
}

#[test]
fn whole_only_waits_for_close() {
    init_logging();

    let (addr, server) = serve(|mut stream| {
        for part in [&b"first\n"[..], b"second\n"] {
            stream.write_all(part).expect("Failed to write to stream");
            thread::sleep(Duration::from_millis(20));
        }
    });

    let mut event_loop = EventLoop::new().unwrap();
    let client = Client::builder().read_chunk(4).build(&event_loop);
    let seen = log();

    client
        .request(
            Request::new(addr.ip().to_string(), addr.port())
                .termination(Termination::WholeOnly)
                .callback(record(&seen)),
        )
        .unwrap();

    event_loop.run().unwrap();
    server.join().expect("Thread panicked");

    assert_eq!(*seen.borrow(), vec![Outcome::data(b"first\nsecond\n")]);
}
