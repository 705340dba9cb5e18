//! lockstep Runtime - Wall-clock drivers for the synchronization engine
//!
//! Two loops exist:
//! - `Authority` owns the canonical state, stamps and broadcasts events,
//!   bootstraps connecting participants, and compacts history.
//! - `Participant` mirrors the canonical state and runs a speculative
//!   projection ahead of it for instant local feedback, rebuilding the
//!   projection whenever a late event proves it wrong.
//!
//! Both are sans-io values driven by the tokio wrappers in `driver`; all
//! outbound traffic is expressed as `Directive`s flushed through the
//! `Transport` contract.

pub mod authority;
pub mod config;
pub mod driver;
pub mod error;
pub mod participant;
pub mod telemetry;
pub mod transport;

pub use authority::*;
pub use config::*;
pub use driver::*;
pub use error::*;
pub use participant::*;
pub use transport::*;
