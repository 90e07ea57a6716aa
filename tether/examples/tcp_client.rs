//! Example: send one line to a TCP server and print the first line back.
//!
//! Usage: `cargo run --example tcp_client -- <host> <port> [line]`

use std::time::Duration;

use tether::{Client, EventLoop, Request};

fn main() {
    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "127.0.0.1".to_owned());
    let port = args
        .next()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);
    let line = args.next().unwrap_or_else(|| "Hello from client!".to_owned());

    let mut event_loop = EventLoop::new().unwrap();
    let client = Client::builder()
        .timeout(Duration::from_secs(3))
        .build(&event_loop);

    let request = Request::new(host, port)
        .data(format!("{line}\r\n"))
        .stop_pattern("\r\n")
        .callback(|result, conn| match result {
            Ok(reply) => println!("{}: {}", conn.peer(), String::from_utf8_lossy(&reply)),
            Err(e) => println!("Request failed: {}", e),
        });

    if let Err(e) = client.request(request) {
        println!("Invalid request: {}", e);
        return;
    }

    event_loop.run().unwrap();
}
