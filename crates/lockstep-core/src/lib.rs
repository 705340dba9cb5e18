//! lockstep Core - Fundamental types and primitives
//!
//! This crate defines the core types used throughout the engine:
//! - Identifiers (SessionId)
//! - Virtual time (VirtualTime) and tick conversions
//! - Events and their payloads
//! - Simulation state (SimState) and its snapshot plumbing
//! - Deterministic RNG state (RngState/Arc4)

pub mod error;
pub mod event;
pub mod id;
pub mod rng;
pub mod state;
pub mod time;

pub use error::*;
pub use event::*;
pub use id::*;
pub use rng::*;
pub use state::*;
pub use time::*;
