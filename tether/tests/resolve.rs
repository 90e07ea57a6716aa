mod common;

use common::{Outcome, init_logging, log, read_line, record, serve};

use std::cell::RefCell;
use std::io::{self, Write};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::rc::Rc;
use std::time::{Duration, Instant};

use tether::{Client, ErrorKind, EventLoop, Reply, Request, Resolve};

/// Answers every lookup from a fixed table and remembers what was asked.
#[derive(Clone, Default)]
struct FixedResolver {
    answer: Option<Vec<IpAddr>>,
    asked: Rc<RefCell<Vec<String>>>,
}

impl Resolve for FixedResolver {
    fn resolve(&self, host: &str, reply: Reply) {
        self.asked.borrow_mut().push(host.to_owned());

        match &self.answer {
            Some(addrs) => reply.send(Ok(addrs.clone())),
            None => reply.send(Err(io::Error::new(
                io::ErrorKind::NotFound,
                "no such host",
            ))),
        }
    }
}

/// Keeps every reply without answering it.
#[derive(Clone, Default)]
struct StalledResolver {
    pending: Rc<RefCell<Vec<Reply>>>,
}

impl Resolve for StalledResolver {
    fn resolve(&self, _host: &str, reply: Reply) {
        self.pending.borrow_mut().push(reply);
    }
}

fn echo_line() -> (std::net::SocketAddr, std::thread::JoinHandle<()>) {
    serve(|mut stream| {
        let line = read_line(&mut stream);
        stream
            .write_all(line.as_bytes())
            .expect("Failed to write to stream");
    })
}

#[test]
fn literal_address_skips_resolver() {
    init_logging();

    let (addr, server) = echo_line();
    let resolver = FixedResolver::default();

    let mut event_loop = EventLoop::new().unwrap();
    let client = Client::builder()
        .resolver(resolver.clone())
        .build(&event_loop);
    let seen = log();

    client
        .request(
            Request::new(addr.ip().to_string(), addr.port())
                .data("direct\n")
                .stop_pattern("\n")
                .callback(record(&seen)),
        )
        .unwrap();

    event_loop.run().unwrap();
    server.join().expect("Thread panicked");

    assert!(resolver.asked.borrow().is_empty());
    assert_eq!(*seen.borrow(), vec![Outcome::data(b"direct")]);
}

#[test]
fn host_name_is_resolved_once_per_request() {
    init_logging();

    let (first, first_server) = echo_line();
    let (second, second_server) = echo_line();
    assert_eq!(first.ip(), second.ip());

    // IPv6 first in the answer: the IPv4 record must still win.
    let resolver = FixedResolver {
        answer: Some(vec![IpAddr::V6(Ipv6Addr::LOCALHOST), first.ip()]),
        ..Default::default()
    };

    let mut event_loop = EventLoop::new().unwrap();
    let client = Client::builder()
        .resolver(resolver.clone())
        .build(&event_loop);
    let seen = log();

    for (port, line) in [(first.port(), "one\n"), (second.port(), "two\n")] {
        client
            .request(
                Request::new("echo.test", port)
                    .data(line)
                    .stop_pattern("\n")
                    .callback(record(&seen)),
            )
            .unwrap();
    }

    event_loop.run().unwrap();
    first_server.join().expect("Thread panicked");
    second_server.join().expect("Thread panicked");

    assert_eq!(*resolver.asked.borrow(), vec!["echo.test", "echo.test"]);

    let mut seen = seen.take();
    seen.sort_by_key(|o| format!("{o:?}"));
    assert_eq!(seen, vec![Outcome::data(b"one"), Outcome::data(b"two")]);
}

#[test]
fn failed_lookup_reaches_callback() {
    init_logging();

    let resolver = FixedResolver::default();

    let mut event_loop = EventLoop::new().unwrap();
    let client = Client::builder()
        .resolver(resolver.clone())
        .build(&event_loop);
    let seen = log();

    client
        .request(
            Request::new("missing.test", 25)
                .data("HELO\r\n")
                .callback(record(&seen)),
        )
        .unwrap();

    event_loop.run().unwrap();

    assert_eq!(resolver.asked.borrow().len(), 1);
    assert_eq!(
        *seen.borrow(),
        vec![Outcome::Failed(ErrorKind::ResolutionFailure)]
    );
}

#[test]
fn empty_answer_is_a_resolution_failure() {
    init_logging();

    let resolver = FixedResolver {
        answer: Some(vec![]),
        ..Default::default()
    };

    let mut event_loop = EventLoop::new().unwrap();
    let client = Client::builder().resolver(resolver).build(&event_loop);
    let seen = log();

    client
        .request(Request::new("void.test", 25).callback(record(&seen)))
        .unwrap();

    event_loop.run().unwrap();

    assert_eq!(
        *seen.borrow(),
        vec![Outcome::Failed(ErrorKind::ResolutionFailure)]
    );
}

#[test]
fn system_resolver_reaches_localhost() {
    init_logging();

    let (addr, server) = echo_line();
    assert_eq!(addr.ip(), IpAddr::V4(Ipv4Addr::LOCALHOST));

    let mut event_loop = EventLoop::new().unwrap();
    let client = Client::builder().build(&event_loop);
    let seen = log();

    client
        .request(
            Request::new("localhost", addr.port())
                .data("via getaddrinfo\n")
                .stop_pattern("\n")
                .callback(record(&seen)),
        )
        .unwrap();

    event_loop.run().unwrap();
    server.join().expect("Thread panicked");

    assert_eq!(*seen.borrow(), vec![Outcome::data(b"via getaddrinfo")]);
}

#[test]
fn stalled_lookup_is_bounded_by_timeout() {
    init_logging();

    let resolver = StalledResolver::default();

    let mut event_loop = EventLoop::new().unwrap();
    let client = Client::builder()
        .resolver(resolver.clone())
        .timeout(Duration::from_millis(100))
        .build(&event_loop);
    let seen = log();

    let started = Instant::now();
    client
        .request(
            Request::new("slow.test", 25)
                .data("HELO\r\n")
                .callback(record(&seen)),
        )
        .unwrap();

    event_loop.run().unwrap();
    let elapsed = started.elapsed();

    assert_eq!(resolver.pending.borrow().len(), 1);
    assert_eq!(
        *seen.borrow(),
        vec![Outcome::Failed(ErrorKind::ResolutionFailure)]
    );
    assert!(elapsed >= Duration::from_millis(100));
    assert!(elapsed < Duration::from_secs(2));
}
