//! Internal data structures.
//!
//! This module provides low-level utilities used by the reactor.
//! In particular, it exposes a [`Slab`] with generation-checked keys
//! used to store readiness registrations and pending lookups.

mod slab;

pub(crate) use slab::{Key, Slab};
