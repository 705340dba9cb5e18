//! lockstep Engine - Deterministic stepping and history compaction
//!
//! This crate implements the synchronization core:
//! - Safe-advance calculation: the window of history that is provably final
//! - The deterministic stepper: continuous updates plus validated event
//!   dispatch, identical on every replica
//! - The extension contract simulations plug into

pub mod advance;
pub mod engine;
pub mod extension;

pub use advance::*;
pub use engine::*;
pub use extension::*;
