//! Event loop and readiness handling.
//!
//! This module implements the single-threaded reactor every connection
//! runs on. The reactor is responsible for:
//! - one-shot readiness registrations, each with its own timeout,
//! - callbacks deferred to the next loop turn,
//! - handing resolver answers back to the loop thread.
//!
//! Connections talk to it through a [`LoopHandle`]; applications only
//! create an [`EventLoop`] and run it.

mod core;
mod event;
mod timer;

pub(crate) mod poller;

pub use core::EventLoop;

pub(crate) use core::LoopHandle;

pub(crate) use core::Readiness;
pub(crate) use poller::common::Interest;
