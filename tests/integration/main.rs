//! Chroma integration test harness.
//!
//! Every test starts its own accept loop on 127.0.0.1 with an ephemeral
//! port and a scratch storage root, then talks to it over real TCP:
//!
//!   cargo test --test integration
//!
//! Servers stop and their storage is removed when the handle drops.

mod infra;
pub use infra::*;

mod failures;
mod transfer;
