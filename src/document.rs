//! In-memory document model consumed by the engine
//!
//! The PDF adapter (see [`crate::pdf::extract`]) builds a [`Document`] from
//! a parsed PDF; the engine mutates fonts and stream bytes in place and
//! marks what it touched so the adapter writes back only those objects.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::font::{Font, FontHandle};

/// Index of a stream in [`Document::streams`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct StreamHandle(pub usize);

/// Where a content stream is drawn from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamOrigin {
    /// One of the page's `/Contents` streams
    Page,
    /// A form XObject painted with `Do`
    Form,
    /// An annotation's normal appearance
    Annotation,
    /// A tiling pattern's cell
    Pattern,
    /// A glyph procedure of a Type3 font
    Glyph,
}

#[derive(Debug, Clone)]
pub struct ContentStream {
    /// Stable identifier for reports (the object reference)
    pub label: String,
    pub origin: StreamOrigin,
    /// Decoded content bytes
    pub bytes: Vec<u8>,
    /// Font resources visible to the stream, by resource name
    pub fonts: BTreeMap<Vec<u8>, FontHandle>,
    /// Set when the stream could not be decoded (unsupported filter, ...)
    pub unreadable: Option<String>,
}

impl ContentStream {
    pub fn new(label: impl Into<String>, origin: StreamOrigin, bytes: Vec<u8>) -> Self {
        Self {
            label: label.into(),
            origin,
            bytes,
            fonts: BTreeMap::new(),
            unreadable: None,
        }
    }

    pub fn with_font(mut self, name: &[u8], font: FontHandle) -> Self {
        self.fonts.insert(name.to_vec(), font);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct Page {
    /// 1-based page number
    pub number: u32,
    /// Content streams in drawing order, then the forms, patterns and
    /// appearance streams reachable from the page
    pub streams: Vec<StreamHandle>,
}

#[derive(Debug, Clone, Default)]
pub struct Document {
    pub pages: Vec<Page>,
    pub fonts: Vec<Font>,
    pub streams: Vec<ContentStream>,
    dirty_fonts: BTreeSet<FontHandle>,
    dirty_streams: BTreeSet<StreamHandle>,
    /// Fonts that may draw codes outside the scanned streams
    distrusted_fonts: BTreeSet<FontHandle>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_font(&mut self, font: Font) -> FontHandle {
        self.fonts.push(font);
        FontHandle(self.fonts.len() - 1)
    }

    pub fn add_stream(&mut self, stream: ContentStream) -> StreamHandle {
        self.streams.push(stream);
        StreamHandle(self.streams.len() - 1)
    }

    pub fn add_page(&mut self, streams: Vec<StreamHandle>) {
        let number = self.pages.len() as u32 + 1;
        self.pages.push(Page { number, streams });
    }

    pub fn font(&self, handle: FontHandle) -> &Font {
        &self.fonts[handle.0]
    }

    pub fn stream(&self, handle: StreamHandle) -> &ContentStream {
        &self.streams[handle.0]
    }

    pub fn font_handles(&self) -> impl Iterator<Item = FontHandle> {
        (0..self.fonts.len()).map(FontHandle)
    }

    pub fn stream_handles(&self) -> impl Iterator<Item = StreamHandle> {
        (0..self.streams.len()).map(StreamHandle)
    }

    /// Replace a font's tables and mark it for writing
    pub fn replace_font(&mut self, handle: FontHandle, font: Font) {
        self.fonts[handle.0] = font;
        self.dirty_fonts.insert(handle);
    }

    /// Replace a stream's bytes and mark it for writing
    pub fn replace_stream_bytes(&mut self, handle: StreamHandle, bytes: Vec<u8>) {
        self.streams[handle.0].bytes = bytes;
        self.dirty_streams.insert(handle);
    }

    /// Mark a font as possibly drawing codes no stream shows, such as the
    /// default resources viewers use to regenerate form field appearances
    pub fn distrust_font(&mut self, handle: FontHandle) {
        self.distrusted_fonts.insert(handle);
    }

    pub fn distrusted_fonts(&self) -> impl Iterator<Item = FontHandle> + '_ {
        self.distrusted_fonts.iter().copied()
    }

    pub fn dirty_fonts(&self) -> impl Iterator<Item = FontHandle> + '_ {
        self.dirty_fonts.iter().copied()
    }

    pub fn dirty_streams(&self) -> impl Iterator<Item = StreamHandle> + '_ {
        self.dirty_streams.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::font::tests::simple_font;

    #[test]
    fn test_handles_index_the_arena() {
        let mut doc = Document::new();
        let f = doc.add_font(simple_font("4 0 R"));
        let s = doc.add_stream(ContentStream::new("5 0 R", StreamOrigin::Page, b"q Q".to_vec()).with_font(b"F1", f));
        doc.add_page(vec![s]);

        assert_eq!(doc.font(f).label, "4 0 R");
        assert_eq!(doc.stream(s).fonts.get(&b"F1"[..]), Some(&f));
        assert_eq!(doc.pages[0].number, 1);
        assert_eq!(doc.dirty_streams().count(), 0);
    }

    #[test]
    fn test_replacements_are_tracked() {
        let mut doc = Document::new();
        let f = doc.add_font(simple_font("4 0 R"));
        let s = doc.add_stream(ContentStream::new("5 0 R", StreamOrigin::Page, Vec::new()));
        doc.replace_stream_bytes(s, b"BT ET".to_vec());
        doc.replace_font(f, simple_font("4 0 R"));

        assert_eq!(doc.dirty_streams().collect::<Vec<_>>(), vec![s]);
        assert_eq!(doc.dirty_fonts().collect::<Vec<_>>(), vec![f]);
        assert_eq!(doc.stream(s).bytes, b"BT ET".to_vec());
    }
}
