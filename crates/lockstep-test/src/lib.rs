//! lockstep Test Harness - Deterministic fixtures for protocol validation
//!
//! This crate provides:
//! - A reference extension and payload (`demo`) exercising the full plugin
//!   surface, deterministic RNG included
//! - An order-preserving in-memory link with seeded latency jitter (`link`)
//! - A scripted-clock cluster fixture wiring one authority to any number of
//!   participants (`harness`)

pub mod demo;
pub mod harness;
pub mod link;

pub use demo::*;
pub use harness::*;
pub use link::*;
