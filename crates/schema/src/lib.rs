//! DevTools Protocol Schema
//!
//! Parses a protocol descriptor (the `/json/protocol` document) and indexes it
//! for the client runtime.
//!
//! ```text
//! JSON → ProtocolDescriptor (ordered, as shipped) → Schema (name-keyed)
//!                                                     ↓
//!                                     Item { category, parameters, ... }
//! ```
//!
//! Nothing here performs I/O. The descriptor is parsed once per connection
//! and never mutated afterwards.

pub mod descriptor;
pub mod embedded;
pub mod error;
pub mod registry;

pub use descriptor::{
    CommandSpec, DomainSpec, EventSpec, Parameter, ProtocolDescriptor, TypeSpec, Version,
};
pub use embedded::embedded;
pub use error::{Result, SchemaError};
pub use registry::{Category, DomainIndex, Item, Schema};
