//! Syntax layer for shapeql requests.
//!
//! This crate provides:
//! - `token`: Token kinds and token structures
//! - `lexer`: Tokenization
//! - `ast`: The requested-field tree
//! - `parser`: Single-pass recursive descent parser
//! - `formatter`: Canonical request printing
//!
//! Parsing is purely syntactic. Field names are never checked against a
//! schema here, so an unknown field is a compile-time error further down,
//! not a parse error.

pub mod ast;
pub mod error;
pub mod formatter;
pub mod lexer;
pub mod parser;
pub mod token;

pub use ast::*;
pub use error::SyntaxError;
pub use formatter::{format, format_value, format_with_options, FormatOptions, Formatter};
pub use lexer::Lexer;
pub use parser::{parse, Parser, DEFAULT_MAX_DEPTH};
pub use token::{Token, TokenKind};
