//! lockstep Wire - Cycle-safe graph snapshot codec
//!
//! This crate carries state between replicas:
//! - `Value` - a document model whose arrays and maps are shared handles,
//!   so reference identity and cycles are expressible
//! - `Wire` - the normalized form: an ordered arena of cells where every
//!   nested node is an integer index into the arena
//! - a compact byte encoding of the normalized form
//!
//! Scalars pass through serialization unchanged. Shared references collapse
//! to a single cell and are re-established on deserialization, which is what
//! makes authority bootstraps and canonical-to-projection clones faithful.

pub mod codec;
pub mod error;
pub mod value;

pub use codec::*;
pub use error::*;
pub use value::*;
