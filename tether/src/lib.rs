//! # Tether
//!
//! **Tether** is a single-threaded, event-driven TCP client engine. A request
//! names a destination, the bytes to send and how to frame the answer; the
//! engine resolves, connects, writes and reads without ever blocking the
//! loop, and hands each result to a one-shot completion callback.
//!
//! It provides:
//!
//! - An **epoll event loop** with one-shot readiness waits, each bounded by
//!   its own timeout
//! - **Pluggable name resolution**: literal addresses skip it, host names go
//!   through any [`Resolve`] implementation
//! - A **FIFO operation queue** per connection: scatter writes that survive
//!   short sends, and reads framed by a delimiter, by end of stream, or
//!   delivered chunk by chunk
//! - **Reference-counted connections** that are torn down only when the
//!   last handle or pending wait lets go
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tether::{Client, EventLoop, Request};
//!
//! let mut event_loop = EventLoop::new()?;
//! let client = Client::builder().build(&event_loop);
//!
//! client.request(
//!     Request::new("example.org", 80)
//!         .data("HEAD / HTTP/1.0\r\n\r\n")
//!         .stop_pattern("\r\n\r\n")
//!         .callback(|result, conn| {
//!             match result {
//!                 Ok(head) => println!("{}", String::from_utf8_lossy(&head)),
//!                 Err(e) => eprintln!("request failed: {e}"),
//!             }
//!             conn.close();
//!         }),
//! )?;
//!
//! event_loop.run()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Getting Started
//!
//! Add Tether to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! tether = { git = "https://github.com/Nebula-ecosystem/Tether", package = "tether" }
//! ```

mod buffer;
mod client;
mod connection;
mod error;
mod operation;
mod reactor;
mod resolve;
mod utils;

pub use client::{Client, ClientBuilder, Request};
pub use connection::{Connection, State};
pub use error::{Error, ErrorKind, Result};
pub use operation::{Completion, Termination};
pub use reactor::EventLoop;
pub use resolve::{Reply, Resolve, SystemResolver};
