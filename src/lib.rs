//! PDF Scramble Library
//!
//! Scrambles the text a PDF yields to copy-paste and text extraction while
//! every page keeps rendering exactly as before. For each font it:
//! - collects the character codes drawn by content streams, forms and
//!   annotation appearances
//! - builds a seeded permutation of those codes that keeps every code on
//!   the glyph it drew
//! - patches the font's encoding, widths and `/ToUnicode` tables
//! - rewrites the text operands of the content streams to the new codes
//!
//! Every patched font and rewritten stream is validated before anything is
//! written back.
//!
//! # Example
//!
//! ```no_run
//! use pdf_scramble::pdf::{scramble_file, FileOptions};
//! use pdf_scramble::ScrambleOptions;
//! use std::path::PathBuf;
//!
//! let options = FileOptions {
//!     input: PathBuf::from("lecture.pdf"),
//!     output: PathBuf::from("lecture-scrambled.pdf"),
//!     scramble: ScrambleOptions::with_seed(42),
//!     ..Default::default()
//! };
//!
//! scramble_file(&options).expect("Failed to scramble PDF");
//! ```

pub mod cmap;
pub mod codespace;
pub mod content;
pub mod document;
pub mod engine;
pub mod error;
pub mod font;
pub mod options;
pub mod patch;
pub mod pdf;
pub mod permute;
pub mod preset;
pub mod report;
pub mod rewrite;
pub mod scan;
pub mod validate;

// Re-export commonly used items
pub use document::Document;
pub use engine::scramble;
pub use error::{Error, Result, ScrambleError};
pub use options::{CharClass, CharSelection, FontSelection, ScrambleOptions, ToUnicodePolicy};
pub use preset::MappingFile;
pub use report::{FontOutcome, FontReport, ScrambleReport};
