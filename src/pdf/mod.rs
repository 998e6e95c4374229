//! PDF adapter: lopdf documents in, scrambled lopdf documents out

pub mod apply;
pub mod extract;
pub mod font_dict;
pub mod metadata;

use std::fs;
use std::path::PathBuf;

use lopdf::Document;
use tracing::info;

use crate::error::{Error, Result};
use crate::options::ScrambleOptions;
use crate::preset::MappingFile;
use crate::report::ScrambleReport;

// Re-export commonly used items
pub use apply::apply_changes;
pub use extract::{build_document, Bindings};
pub use metadata::{inspect_document, inspect_fonts, FontInfo, PdfInfo};

/// Options for scrambling a PDF file
#[derive(Debug, Clone, Default)]
pub struct FileOptions {
    /// Input PDF file path
    pub input: PathBuf,
    /// Output PDF file path
    pub output: PathBuf,
    /// Write the JSON report here
    pub report: Option<PathBuf>,
    /// Mapping file: reused when it exists, then updated with this run's mappings
    pub mapping: Option<PathBuf>,
    pub scramble: ScrambleOptions,
}

/// Scramble a loaded document in place
pub fn scramble_pdf(pdf: &mut Document, options: &ScrambleOptions) -> Result<ScrambleReport> {
    let (mut doc, bindings) = build_document(pdf)?;
    let report = crate::scramble(&mut doc, options)?;
    apply_changes(pdf, &doc, &bindings)?;
    Ok(report)
}

/// Scramble the text of a PDF file and save the result
///
/// # Example
///
/// ```no_run
/// use pdf_scramble::pdf::{scramble_file, FileOptions};
/// use pdf_scramble::ScrambleOptions;
/// use std::path::PathBuf;
///
/// let options = FileOptions {
///     input: PathBuf::from("notes.pdf"),
///     output: PathBuf::from("notes-scrambled.pdf"),
///     scramble: ScrambleOptions::with_seed(7),
///     ..Default::default()
/// };
///
/// let report = scramble_file(&options).expect("Failed to scramble");
/// println!("{}", report);
/// ```
pub fn scramble_file(options: &FileOptions) -> Result<ScrambleReport> {
    if !options.input.exists() {
        return Err(Error::FileNotFound(options.input.clone()));
    }

    let mut pdf = Document::load(&options.input)?;
    if pdf.get_pages().is_empty() {
        return Err(Error::EmptyPdf(options.input.clone()));
    }

    let mut scramble = options.scramble.clone();
    let mut saved = MappingFile::default();
    if let Some(path) = options.mapping.as_ref().filter(|p| p.exists()) {
        saved = MappingFile::load(path)?;
        info!(path = %path.display(), fonts = saved.fonts.len(), "loaded mapping file");
        scramble.presets.merge(&saved);
    }

    let report = scramble_pdf(&mut pdf, &scramble)?;

    pdf.prune_objects();
    pdf.compress();
    pdf.save(&options.output)?;
    info!(path = %options.output.display(), "saved scrambled PDF");

    if let Some(path) = &options.mapping {
        saved.merge(&report.mappings);
        saved.save(path)?;
    }
    if let Some(path) = &options.report {
        fs::write(path, serde_json::to_string_pretty(&report)?)?;
    }
    Ok(report)
}
