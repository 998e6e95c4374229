//! Typed font model
//!
//! Fonts are reduced to the three tables the remapping engine reads and
//! rewrites: code → glyph (the encoding), code → advance width for simple
//! fonts, and code → Unicode (`/ToUnicode`). Glyph outlines are never
//! touched.

pub mod glyph_names;

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::cmap::{CidSystemInfo, ToUnicodeMap};
use crate::codespace::{Code, Codespace};

pub use glyph_names::{glyph_name_to_unicode, BaseEncoding};

/// Index of a font in [`crate::Document::fonts`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FontHandle(pub usize);

/// Identity of a rendered glyph
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GlyphRef {
    /// Glyph name of a simple font
    Name(String),
    /// Glyph id of a composite font
    Gid(u32),
}

impl fmt::Display for GlyphRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GlyphRef::Name(name) => write!(f, "/{}", name),
            GlyphRef::Gid(gid) => write!(f, "GID {}", gid),
        }
    }
}

/// Encoding of a simple font: an optional base encoding overlaid with
/// `/Differences`.
///
/// A missing base means the font program's built-in encoding, which is not
/// visible at PDF level; only codes named in `differences` have a known
/// glyph then.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimpleEncoding {
    pub base: Option<BaseEncoding>,
    pub differences: BTreeMap<u8, String>,
}

impl SimpleEncoding {
    pub fn glyph_name(&self, code: u8) -> Option<&str> {
        let name = match self.differences.get(&code) {
            Some(name) => name.as_str(),
            None => self.base?.glyph_name(code)?,
        };
        (name != ".notdef").then_some(name)
    }

    /// Differences entries that actually deviate from the base encoding
    pub fn effective_differences(&self) -> BTreeMap<u8, &str> {
        self.differences
            .iter()
            .filter(|(code, name)| self.base.and_then(|b| b.glyph_name(**code)) != Some(name.as_str()))
            .map(|(code, name)| (*code, name.as_str()))
            .collect()
    }
}

/// `/FirstChar`, `/Widths` and the descriptor's `/MissingWidth`
#[derive(Debug, Clone, PartialEq)]
pub struct Widths {
    pub first_char: u8,
    pub values: Vec<f32>,
    pub missing: f32,
}

impl Widths {
    pub fn get(&self, code: u8) -> f32 {
        code.checked_sub(self.first_char)
            .and_then(|i| self.values.get(i as usize))
            .copied()
            .unwrap_or(self.missing)
    }

    /// Set the width of `code`, widening the array as needed
    pub fn set(&mut self, code: u8, width: f32) {
        if self.values.is_empty() {
            self.first_char = code;
        }
        if code < self.first_char {
            let shift = (self.first_char - code) as usize;
            let mut values = vec![self.missing; shift];
            values.append(&mut self.values);
            self.values = values;
            self.first_char = code;
        }
        let index = (code - self.first_char) as usize;
        if index >= self.values.len() {
            self.values.resize(index + 1, self.missing);
        }
        self.values[index] = width;
    }

    pub fn last_char(&self) -> u8 {
        (self.first_char as usize + self.values.len().saturating_sub(1)).min(255) as u8
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimpleFont {
    /// `Type1`, `TrueType`, `Type3` or `MMType1`
    pub subtype: String,
    pub encoding: SimpleEncoding,
    /// `None` for standard 14 fonts that rely on built-in metrics
    pub widths: Option<Widths>,
}

/// How a composite font maps CIDs to glyph ids
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CidToGid {
    Identity,
    /// Big-endian `/CIDToGIDMap` stream, one entry per CID
    Table(Vec<u16>),
}

impl CidToGid {
    pub fn gid(&self, cid: u32) -> Option<u32> {
        match self {
            CidToGid::Identity => Some(cid),
            CidToGid::Table(table) => table.get(cid as usize).map(|g| *g as u32),
        }
    }
}

/// Type0 font with its descendant CIDFont
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeFont {
    /// Name of the encoding CMap (`Identity-H`, or the embedded CMap's name)
    pub cmap_name: String,
    /// Identity-H/V: every two-byte code is its own CID unless `table` says otherwise
    pub identity: bool,
    pub table: BTreeMap<Code, u32>,
    pub cid_to_gid: CidToGid,
    pub wmode: u8,
    pub system_info: CidSystemInfo,
}

impl CompositeFont {
    pub fn cid(&self, code: Code) -> Option<u32> {
        match self.table.get(&code) {
            Some(cid) => Some(*cid),
            None if self.identity && code.width == 2 => Some(code.value),
            None => None,
        }
    }

    /// Every `code → CID` pair, ascending by code
    pub fn mappings(&self) -> Vec<(Code, u32)> {
        if !self.identity {
            return self.table.iter().map(|(c, cid)| (*c, *cid)).collect();
        }
        (0..=0xFFFFu32)
            .map(|value| Code::new(value, 2))
            .filter_map(|code| self.cid(code).map(|cid| (code, cid)))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FontKind {
    Simple(SimpleFont),
    Composite(CompositeFont),
    /// Remapping is impossible at PDF level; text in this font is left alone
    Unsupported { reason: String },
}

/// A font resource as seen by the engine
#[derive(Debug, Clone, PartialEq)]
pub struct Font {
    /// Stable identifier for reports (the object reference, e.g. `12 0 R`)
    pub label: String,
    pub base_font: String,
    pub codespace: Codespace,
    pub kind: FontKind,
    pub to_unicode: Option<ToUnicodeMap>,
}

impl Font {
    pub fn unsupported(label: &str, base_font: &str, reason: impl Into<String>) -> Self {
        Self {
            label: label.to_string(),
            base_font: base_font.to_string(),
            codespace: Codespace::single_byte(),
            kind: FontKind::Unsupported { reason: reason.into() },
            to_unicode: None,
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self.kind, FontKind::Unsupported { .. })
    }

    pub fn unsupported_reason(&self) -> Option<&str> {
        match &self.kind {
            FontKind::Unsupported { reason } => Some(reason),
            _ => None,
        }
    }

    /// Glyph drawn for `code`, `None` for `.notdef` and unmapped codes
    pub fn glyph(&self, code: Code) -> Option<GlyphRef> {
        match &self.kind {
            FontKind::Simple(simple) if code.width == 1 => simple
                .encoding
                .glyph_name(code.value as u8)
                .map(|name| GlyphRef::Name(name.to_string())),
            FontKind::Composite(composite) => {
                let gid = composite.cid_to_gid.gid(composite.cid(code)?)?;
                (gid != 0).then_some(GlyphRef::Gid(gid))
            }
            _ => None,
        }
    }

    /// Code-keyed advance width; only simple fonts with `/Widths` have one
    pub fn width(&self, code: Code) -> Option<f32> {
        match &self.kind {
            FontKind::Simple(SimpleFont { widths: Some(w), .. }) if code.width == 1 => {
                Some(w.get(code.value as u8))
            }
            _ => None,
        }
    }

    /// Text extraction would yield for `code`.
    ///
    /// Follows `/ToUnicode` first, then (simple fonts only) the glyph name.
    pub fn unicode(&self, code: Code) -> Option<String> {
        if let Some(text) = self.to_unicode.as_ref().and_then(|m| m.get(code)) {
            return Some(text.to_string());
        }
        match (&self.kind, self.glyph(code)) {
            (FontKind::Simple(_), Some(GlyphRef::Name(name))) => glyph_name_to_unicode(&name),
            _ => None,
        }
    }

    /// BaseFont without a six-letter subset tag
    pub fn base_name(&self) -> &str {
        strip_subset_prefix(&self.base_font)
    }
}

/// `ABCDEF+Helvetica` → `Helvetica`
pub fn strip_subset_prefix(name: &str) -> &str {
    match name.split_once('+') {
        Some((tag, rest)) if tag.len() == 6 && tag.chars().all(|c| c.is_ascii_uppercase()) => rest,
        _ => name,
    }
}
