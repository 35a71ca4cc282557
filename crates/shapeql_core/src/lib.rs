//! Core utilities for shapeql.
//!
//! This crate provides foundational types used throughout shapeql:
//! - `span`: Source location tracking
//! - `diagnostics`: Error reporting
//! - `tracker`: Explicit-vs-default argument bookkeeping

pub mod diagnostics;
pub mod span;
pub mod tracker;

pub use diagnostics::{Diagnostic, DiagnosticBag, DiagnosticSeverity, Label};
pub use span::{LineColumn, Span};
pub use tracker::ArgumentTracker;
