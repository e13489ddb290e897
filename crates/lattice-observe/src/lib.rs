//! # Lattice Observe - Logging and Spans
//!
//! Structured logging initialisation and span helpers for the LatticeDB
//! storage core.

pub mod logging;
pub mod span;

pub use logging::{init_from_config, init_logging, LoggingOptions, OutputFormat};
pub use span::{query_span, record_query_result, schema_span, write_span};
