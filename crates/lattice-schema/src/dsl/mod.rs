//! The namespace definition language: parsing, compilation, and generation.

pub mod ast;
pub mod compiler;
pub mod generator;
pub mod parser;

use thiserror::Error;

pub use ast::{
    ParsedDeclaration, ParsedDefinition, ParsedExpr, ParsedPermission, ParsedRelation,
    ParsedSchema, ParsedSubjectType, SourcePosition,
};
pub use compiler::compile;
pub use generator::{generate, generate_schema};
pub use parser::parse_schema;

/// A compilation failure, carrying the source position it originated from.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("parse error at line {line}, column {column}: {message}")]
    Parse {
        line: usize,
        column: usize,
        message: String,
    },

    #[error(
        "definition `{name}` at line {line}, column {column}: object definitions require a `prefix/` segment"
    )]
    MissingPrefix {
        name: String,
        line: usize,
        column: usize,
    },
}
