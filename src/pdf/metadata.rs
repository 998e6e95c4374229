//! Document and font inventory for `pdf-scramble info`

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

use lopdf::{Document, Object};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::font::{Font, FontKind};
use crate::pdf::extract::build_document;

/// One font resource of the document
#[derive(Debug, Clone, Serialize)]
pub struct FontInfo {
    /// Object reference of the font dictionary
    pub font: String,
    pub base_font: String,
    /// `Type1`, `TrueType`, `Type0 Identity-H`, ...
    pub kind: String,
    /// Code byte widths of the codespace
    pub code_widths: Vec<u8>,
    pub has_to_unicode: bool,
    /// Why the font cannot be remapped, if it cannot
    pub unsupported: Option<String>,
}

impl FontInfo {
    fn new(font: &Font) -> Self {
        let kind = match &font.kind {
            FontKind::Simple(simple) => simple.subtype.clone(),
            FontKind::Composite(composite) => format!("Type0 {}", composite.cmap_name),
            FontKind::Unsupported { .. } => "unknown".to_string(),
        };
        Self {
            font: font.label.clone(),
            base_font: font.base_font.clone(),
            kind,
            code_widths: font.codespace.widths().into_iter().collect(),
            has_to_unicode: font.to_unicode.is_some(),
            unsupported: font.unsupported_reason().map(str::to_string),
        }
    }
}

/// PDF inventory
#[derive(Debug, Clone, Serialize)]
pub struct PdfInfo {
    pub page_count: usize,
    /// Document title (if present)
    pub title: Option<String>,
    /// Content streams, forms and appearance streams found
    pub stream_count: usize,
    pub fonts: Vec<FontInfo>,
}

/// Inspect the fonts of a PDF file
pub fn inspect_fonts(path: &Path) -> Result<PdfInfo> {
    if !path.exists() {
        return Err(Error::FileNotFound(path.to_path_buf()));
    }

    let pdf = Document::load(path)?;
    let page_count = pdf.get_pages().len();
    if page_count == 0 {
        return Err(Error::EmptyPdf(path.to_path_buf()));
    }
    inspect_document(&pdf)
}

/// Inventory of an already loaded document
pub fn inspect_document(pdf: &Document) -> Result<PdfInfo> {
    let (doc, _) = build_document(pdf)?;
    let reachable: BTreeSet<usize> = doc
        .pages
        .iter()
        .flat_map(|p| p.streams.iter().map(|s| s.0))
        .collect();

    Ok(PdfInfo {
        page_count: doc.pages.len(),
        title: info_title(pdf),
        stream_count: reachable.len(),
        fonts: doc.fonts.iter().map(FontInfo::new).collect(),
    })
}

fn info_title(pdf: &Document) -> Option<String> {
    let info_id = pdf.trailer.get(b"Info").ok()?.as_reference().ok()?;
    let info = pdf.get_dictionary(info_id).ok()?;
    match info.get(b"Title").ok()? {
        Object::String(bytes, _) => String::from_utf8(bytes.clone()).ok(),
        _ => None,
    }
}

impl fmt::Display for PdfInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Pages: {}", self.page_count)?;
        if let Some(title) = &self.title {
            writeln!(f, "Title: {}", title)?;
        }
        writeln!(f, "Content streams: {}", self.stream_count)?;
        writeln!(f, "Fonts: {}", self.fonts.len())?;
        for font in &self.fonts {
            let widths: Vec<String> = font.code_widths.iter().map(|w| format!("{}-byte", w)).collect();
            write!(
                f,
                "  {} {} [{}] codes {}, ToUnicode {}",
                font.font,
                font.base_font,
                font.kind,
                widths.join("/"),
                if font.has_to_unicode { "yes" } else { "no" }
            )?;
            match &font.unsupported {
                Some(reason) => writeln!(f, ", not remappable: {}", reason)?,
                None => writeln!(f)?,
            }
        }
        Ok(())
    }
}
