//! meshdir end-to-end tests
//!
//! This crate holds only integration tests (see `tests/`): a real directory
//! server is bound on an ephemeral port and driven by agent components over
//! the loopback, covering the registration, sync and cache flows across
//! crate boundaries.
