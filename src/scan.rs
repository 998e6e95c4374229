//! Code usage scanner
//!
//! Walks every content stream once and records, per font, which character
//! codes text-showing operators draw and where. Streams that fail to parse
//! or decode are reported and excluded from rewriting.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use crate::codespace::Code;
use crate::content::{self, TextState};
use crate::document::{Document, StreamHandle, StreamOrigin};
use crate::engine::parallel_map;
use crate::error::ScrambleError;
use crate::font::FontHandle;

/// One drawn code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occurrence {
    pub stream: StreamHandle,
    /// Offset of the code's first byte in the stream source
    pub offset: usize,
    pub code: Code,
}

/// What the scanned content draws with one font
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FontUsage {
    /// Text operands shown in the font, decoded or not
    pub operands: usize,
    pub codes: BTreeSet<Code>,
    pub occurrences: Vec<Occurrence>,
    /// False when a stream that might use the font failed to scan; unused
    /// codes of such a font may be drawn by content we could not read.
    pub trusted: bool,
}

impl Default for FontUsage {
    fn default() -> Self {
        Self {
            operands: 0,
            codes: BTreeSet::new(),
            occurrences: Vec::new(),
            trusted: true,
        }
    }
}

/// Fonts and codes drawn by one stream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamUsage {
    /// Text operands per font, including fonts that are not decoded
    pub operands: BTreeMap<FontHandle, usize>,
    pub occurrences: Vec<(FontHandle, Occurrence)>,
}

/// Scan outcome for one stream
#[derive(Debug, Clone)]
pub struct StreamScan {
    pub stream: StreamHandle,
    /// Font selection in effect when the stream starts
    pub entry: TextState,
    pub result: Result<StreamUsage, ScrambleError>,
}

impl StreamScan {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    pub usage: BTreeMap<FontHandle, FontUsage>,
    pub streams: BTreeMap<StreamHandle, StreamScan>,
}

impl ScanResult {
    pub fn usage(&self, font: FontHandle) -> Option<&FontUsage> {
        self.usage.get(&font)
    }

    pub fn failures(&self) -> impl Iterator<Item = &StreamScan> {
        self.streams.values().filter(|s| !s.is_ok())
    }
}

/// A run of streams scanned in order with a carried font selection
struct Chain {
    streams: Vec<StreamHandle>,
    /// Streams whose results belong to this chain; the others are only
    /// parsed to carry the font selection forward
    owned: BTreeSet<StreamHandle>,
}

/// Scan every stream of the document
pub fn scan_document(doc: &Document, workers: usize) -> ScanResult {
    let chains = plan_chains(doc);
    let scans: Vec<Vec<StreamScan>> = parallel_map(&chains, workers, |chain| scan_chain(doc, chain));

    let mut result = ScanResult::default();
    for scan in scans.into_iter().flatten() {
        match &scan.result {
            Ok(stream_usage) => {
                for (font, count) in &stream_usage.operands {
                    result.usage.entry(*font).or_default().operands += count;
                }
                for (font, occurrence) in &stream_usage.occurrences {
                    let usage = result.usage.entry(*font).or_default();
                    usage.codes.insert(occurrence.code);
                    usage.occurrences.push(*occurrence);
                }
            }
            Err(e) => {
                warn!("{}", e);
                for font in doc.stream(scan.stream).fonts.values() {
                    result.usage.entry(*font).or_default().trusted = false;
                }
            }
        }
        result.streams.insert(scan.stream, scan);
    }
    for font in doc.distrusted_fonts() {
        result.usage.entry(font).or_default().trusted = false;
    }

    for (font, usage) in &result.usage {
        debug!(
            font = %doc.font(*font).label,
            codes = usage.codes.len(),
            occurrences = usage.occurrences.len(),
            trusted = usage.trusted,
            "font usage"
        );
    }
    result
}

/// Group streams into chains. Page content streams of one page form a
/// chain; forms, patterns, glyph procedures and appearance streams stand
/// alone. A stream shared by
/// several pages is owned by the first.
fn plan_chains(doc: &Document) -> Vec<Chain> {
    let mut claimed = BTreeSet::new();
    let mut chains = Vec::new();

    for page in &doc.pages {
        let mut page_chain = Chain {
            streams: Vec::new(),
            owned: BTreeSet::new(),
        };
        for &handle in &page.streams {
            let first = claimed.insert(handle);
            match doc.stream(handle).origin {
                StreamOrigin::Page => {
                    page_chain.streams.push(handle);
                    if first {
                        page_chain.owned.insert(handle);
                    }
                }
                _ if first => chains.push(Chain {
                    streams: vec![handle],
                    owned: [handle].into_iter().collect(),
                }),
                _ => {}
            }
        }
        if !page_chain.owned.is_empty() {
            chains.push(page_chain);
        }
    }

    // Streams not reachable from any page are still scanned standalone
    for handle in doc.stream_handles() {
        if claimed.insert(handle) {
            chains.push(Chain {
                streams: vec![handle],
                owned: [handle].into_iter().collect(),
            });
        }
    }
    chains
}

fn scan_chain(doc: &Document, chain: &Chain) -> Vec<StreamScan> {
    let mut state = TextState::default();
    let mut scans = Vec::new();
    for &handle in &chain.streams {
        let entry = state.clone();
        let (result, exit) = scan_stream(doc, handle, &entry);
        // A failed stream leaves the font selection unknown
        state = exit.unwrap_or_default();
        if chain.owned.contains(&handle) {
            scans.push(StreamScan {
                stream: handle,
                entry,
                result,
            });
        }
    }
    scans
}

type StreamOutcome = (Result<StreamUsage, ScrambleError>, Option<TextState>);

fn scan_stream(doc: &Document, handle: StreamHandle, entry: &TextState) -> StreamOutcome {
    let stream = doc.stream(handle);
    let fail = |offset: usize, reason: String| ScrambleError::StreamTokenization {
        stream: stream.label.clone(),
        offset,
        reason,
    };

    if let Some(reason) = &stream.unreadable {
        return (Err(fail(0, reason.clone())), None);
    }

    let parsed = match content::parse(&stream.bytes, entry) {
        Ok(parsed) => parsed,
        Err(e) => return (Err(fail(e.offset(), e.reason().to_string())), None),
    };

    let mut usage = StreamUsage::default();
    for operand in &parsed.text_operands {
        let token = &parsed.tokens[operand.token];
        let Some(&font) = stream.fonts.get(&operand.font) else {
            let reason = format!("font resource /{} not found", String::from_utf8_lossy(&operand.font));
            return (Err(fail(token.span.start, reason)), None);
        };
        *usage.operands.entry(font).or_default() += 1;
        let font_model = doc.font(font);
        if !font_model.is_supported() {
            continue;
        }
        let string = parsed.string(operand);
        let codes = match font_model.codespace.decode(&string.bytes) {
            Ok(codes) => codes,
            Err(e) => {
                let offset = string
                    .sources
                    .get(e.offset)
                    .map(|s| s.start())
                    .unwrap_or(token.span.start);
                return (Err(fail(offset, format!("{} for font {}", e, font_model.label))), None);
            }
        };
        let mut byte_index = 0;
        for code in codes {
            let offset = string.sources[byte_index].start();
            byte_index += code.width as usize;
            usage.occurrences.push((font, Occurrence { stream: handle, offset, code }));
        }
    }

    (Ok(usage), Some(parsed.exit_state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codespace::Codespace;
    use crate::document::ContentStream;
    use crate::font::tests::simple_font;
    use crate::font::{Font, FontKind};

    fn two_byte_font(label: &str) -> Font {
        let mut font = simple_font(label);
        font.codespace = Codespace::two_byte();
        font.kind = FontKind::Composite(crate::font::CompositeFont {
            cmap_name: "Identity-H".to_string(),
            identity: true,
            table: Default::default(),
            cid_to_gid: crate::font::CidToGid::Identity,
            wmode: 0,
            system_info: Default::default(),
        });
        font
    }

    #[test]
    fn test_distrusted_font_is_untrusted_even_when_scanned() {
        let mut doc = Document::new();
        let f1 = doc.add_font(simple_font("1 0 R"));
        let f2 = doc.add_font(simple_font("2 0 R"));
        let s = doc.add_stream(
            ContentStream::new("3 0 R", StreamOrigin::Page, b"BT /F1 1 Tf (AB) Tj ET".to_vec()).with_font(b"F1", f1),
        );
        doc.add_page(vec![s]);
        doc.distrust_font(f1);
        doc.distrust_font(f2);

        let result = scan_document(&doc, 1);
        assert!(!result.usage(f1).unwrap().trusted);
        assert_eq!(result.usage(f1).unwrap().codes.len(), 2);
        // Listed but never shown: untrusted, still unused
        assert!(!result.usage(f2).unwrap().trusted);
        assert_eq!(result.usage(f2).unwrap().operands, 0);
    }

    #[test]
    fn test_records_codes_per_font() {
        let mut doc = Document::new();
        let f1 = doc.add_font(simple_font("1 0 R"));
        let f2 = doc.add_font(two_byte_font("2 0 R"));
        let s = doc.add_stream(
            ContentStream::new("3 0 R", StreamOrigin::Page, b"BT /F1 1 Tf (AB) Tj /F2 1 Tf <00410042> Tj ET".to_vec())
                .with_font(b"F1", f1)
                .with_font(b"F2", f2),
        );
        doc.add_page(vec![s]);

        let result = scan_document(&doc, 1);
        let u1 = result.usage(f1).unwrap();
        assert_eq!(u1.codes, [Code::single(65), Code::single(66)].into_iter().collect());
        assert_eq!(u1.occurrences[0].offset, 13);
        assert_eq!(u1.occurrences[1].offset, 14);
        let u2 = result.usage(f2).unwrap();
        assert_eq!(u2.codes, [Code::new(0x41, 2), Code::new(0x42, 2)].into_iter().collect());
        assert!(u2.trusted);
    }

    #[test]
    fn test_font_selection_carries_across_page_streams() {
        let mut doc = Document::new();
        let f1 = doc.add_font(simple_font("1 0 R"));
        let a = doc.add_stream(ContentStream::new("a", StreamOrigin::Page, b"BT /F1 1 Tf".to_vec()).with_font(b"F1", f1));
        let b = doc.add_stream(ContentStream::new("b", StreamOrigin::Page, b"(C) Tj ET".to_vec()).with_font(b"F1", f1));
        doc.add_page(vec![a, b]);

        let result = scan_document(&doc, 2);
        assert_eq!(result.streams[&b].entry, TextState::with_font(b"F1"));
        assert!(result.usage(f1).unwrap().codes.contains(&Code::single(67)));
    }

    #[test]
    fn test_forms_start_without_a_font() {
        let mut doc = Document::new();
        let f1 = doc.add_font(simple_font("1 0 R"));
        let page = doc.add_stream(ContentStream::new("p", StreamOrigin::Page, b"BT /F1 1 Tf /X0 Do".to_vec()).with_font(b"F1", f1));
        let form = doc.add_stream(ContentStream::new("x", StreamOrigin::Form, b"(A) Tj".to_vec()).with_font(b"F1", f1));
        doc.add_page(vec![page, form]);

        let result = scan_document(&doc, 1);
        assert!(!result.streams[&form].is_ok());
        assert_eq!(result.failures().count(), 1);
    }

    #[test]
    fn test_failed_stream_marks_fonts_untrusted() {
        let mut doc = Document::new();
        let f1 = doc.add_font(simple_font("1 0 R"));
        let good = doc.add_stream(ContentStream::new("g", StreamOrigin::Page, b"/F1 1 Tf (A) Tj".to_vec()).with_font(b"F1", f1));
        let bad = doc.add_stream(ContentStream::new("b", StreamOrigin::Form, b"/F1 1 Tf (A Tj".to_vec()).with_font(b"F1", f1));
        doc.add_page(vec![good, bad]);

        let result = scan_document(&doc, 1);
        let usage = result.usage(f1).unwrap();
        assert!(!usage.trusted);
        assert_eq!(usage.codes.len(), 1);
        match &result.streams[&bad].result {
            Err(ScrambleError::StreamTokenization { stream, offset, .. }) => {
                assert_eq!(stream, "b");
                assert_eq!(*offset, 9);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unknown_font_resource_is_a_tokenization_error() {
        let mut doc = Document::new();
        let s = doc.add_stream(ContentStream::new("s", StreamOrigin::Page, b"/F9 1 Tf (A) Tj".to_vec()));
        doc.add_page(vec![s]);
        let result = scan_document(&doc, 1);
        assert_eq!(result.failures().count(), 1);
    }

    #[test]
    fn test_odd_length_in_two_byte_font_fails_stream() {
        let mut doc = Document::new();
        let f2 = doc.add_font(two_byte_font("2 0 R"));
        let s = doc.add_stream(ContentStream::new("s", StreamOrigin::Page, b"/F2 1 Tf <004100> Tj".to_vec()).with_font(b"F2", f2));
        doc.add_page(vec![s]);
        let result = scan_document(&doc, 1);
        assert!(!result.streams[&s].is_ok());
        assert!(result.usage(f2).is_none());
    }

    #[test]
    fn test_shared_stream_is_scanned_once() {
        let mut doc = Document::new();
        let f1 = doc.add_font(simple_font("1 0 R"));
        let shared = doc.add_stream(ContentStream::new("s", StreamOrigin::Page, b"/F1 1 Tf (A) Tj".to_vec()).with_font(b"F1", f1));
        doc.add_page(vec![shared]);
        doc.add_page(vec![shared]);
        let result = scan_document(&doc, 2);
        assert_eq!(result.usage(f1).unwrap().occurrences.len(), 1);
    }
}
