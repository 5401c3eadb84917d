//! chroma-core — wire format, session outcomes, and configuration.
//! All other chroma crates depend on this one.

pub mod config;
pub mod outcome;
pub mod wire;

pub use outcome::SessionStatus;
pub use wire::{FrameHeader, PayloadReceipt, ProtocolError};
