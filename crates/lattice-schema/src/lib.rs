//! # Lattice Schema - Schema Definition Language and Service
//!
//! Compiles the textual namespace definition language into validated,
//! storable namespace configurations, and writes them transactionally
//! alongside the tuple data.
//!
//! The write path is: compile (with the prefix policy) → type-system
//! validation against both the in-flight batch and the stored definitions →
//! a sanity check that no live relationship would be left dangling → one
//! atomic persist.

pub mod dsl;
pub mod service;
pub mod typesystem;

pub use dsl::{compile, generate, generate_schema, parse_schema, CompileError};
pub use service::SchemaService;
pub use typesystem::{TypeSystem, ValidationError};
