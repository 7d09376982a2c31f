//! Child output stream handling.
//!
//! This module provides:
//! - ANSI escape stripping for pattern matching
//! - A partial-line-safe line buffer
//! - Reader tasks that deliver lines from a child pipe to a callback

mod ansi;
mod line_reader;

pub use ansi::strip_ansi;
pub use line_reader::{attach, passthrough, LineBuffer, OutputLine};
