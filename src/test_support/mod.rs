//! Shared helpers for in-crate unit tests. Compiled only under `cfg(test)`.

pub mod socket_guard;
