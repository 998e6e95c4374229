//! Build the engine's document model from a lopdf document
//!
//! Walks the page tree, resolving inherited `/Resources`, and collects the
//! page content streams, the form XObjects and tiling patterns they reach,
//! the normal appearance streams of annotations and the glyph procedures of
//! Type3 fonts. Every font dictionary reachable from those resources becomes
//! one entry in the font arena, keyed by object id. Fonts of the AcroForm
//! default resources are marked untrusted: viewers draw new field text with
//! them that no stream shows yet.

use std::collections::BTreeMap;

use lopdf::{Dictionary, Object, ObjectId, Stream};
use tracing::{debug, warn};

use crate::document::{ContentStream, Document, StreamHandle, StreamOrigin};
use crate::error::{Error, Result};
use crate::font::{Font, FontHandle};
use crate::pdf::font_dict::read_font;

/// Maximum depth for `/Parent` chains and nested forms
const MAX_DEPTH: usize = 32;

/// Object ids behind the handles of a built [`Document`]
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    /// Indexed by [`FontHandle`]; `None` for direct font dictionaries
    pub fonts: Vec<Option<ObjectId>>,
    /// Indexed by [`StreamHandle`]
    pub streams: Vec<ObjectId>,
}

/// `12 0 R`
pub fn object_label(id: ObjectId) -> String {
    format!("{} {} R", id.0, id.1)
}

/// Follow one level of indirection
pub(crate) fn resolve<'a>(pdf: &'a lopdf::Document, object: &'a Object) -> Option<&'a Object> {
    match object {
        Object::Reference(id) => pdf.get_object(*id).ok(),
        other => Some(other),
    }
}

/// Resolved dictionary entry
pub(crate) fn entry<'a>(pdf: &'a lopdf::Document, dict: &'a Dictionary, key: &[u8]) -> Option<&'a Object> {
    dict.get(key).ok().and_then(|object| resolve(pdf, object))
}

/// Stream bytes with filters removed
pub(crate) fn decoded_content(stream: &Stream) -> std::result::Result<Vec<u8>, String> {
    if stream.dict.get(b"Filter").is_err() {
        return Ok(stream.content.clone());
    }
    stream
        .decompressed_content()
        .map_err(|e| format!("cannot decode stream filter: {}", e))
}

/// Build the document model of `pdf`
pub fn build_document(pdf: &lopdf::Document) -> Result<(Document, Bindings)> {
    let pages = pdf.get_pages();
    if pages.is_empty() {
        return Err(Error::General("document has no pages".to_string()));
    }

    let mut extractor = Extractor {
        pdf,
        doc: Document::new(),
        bindings: Bindings::default(),
        fonts: BTreeMap::new(),
        streams: BTreeMap::new(),
        type3_fonts: Vec::new(),
    };

    for (number, page_id) in pages {
        let page = pdf.get_dictionary(page_id)?;
        let resources = page_resources(pdf, page_id);
        let fonts = extractor.font_map(resources);

        let mut streams = Vec::new();
        for id in content_refs(page) {
            streams.push(extractor.content_stream(id, StreamOrigin::Page, &fonts));
        }
        extractor.forms(resources, &mut streams, 0);
        extractor.annotations(page, &mut streams);

        debug!(page = number, streams = streams.len(), fonts = fonts.len(), "collected page");
        extractor.doc.add_page(streams);
    }
    extractor.glyph_procedures();
    extractor.form_defaults();

    Ok((extractor.doc, extractor.bindings))
}

struct Extractor<'a> {
    pdf: &'a lopdf::Document,
    doc: Document,
    bindings: Bindings,
    fonts: BTreeMap<ObjectId, FontHandle>,
    streams: BTreeMap<ObjectId, StreamHandle>,
    /// Type3 fonts whose glyph procedures are still to be collected
    type3_fonts: Vec<ObjectId>,
}

impl Extractor<'_> {
    /// Font resource names of a resource dictionary
    fn font_map(&mut self, resources: Option<&Dictionary>) -> BTreeMap<Vec<u8>, FontHandle> {
        let mut map = BTreeMap::new();
        let Some(fonts) = resources
            .and_then(|r| entry(self.pdf, r, b"Font"))
            .and_then(|o| o.as_dict().ok())
        else {
            return map;
        };

        for (name, object) in fonts.iter() {
            let handle = match object {
                Object::Reference(id) => match self.fonts.get(id) {
                    Some(handle) => *handle,
                    None => {
                        let handle = self.doc.add_font(read_font(self.pdf, *id));
                        self.bindings.fonts.push(Some(*id));
                        self.fonts.insert(*id, handle);
                        if is_type3(self.pdf, *id) {
                            self.type3_fonts.push(*id);
                        }
                        handle
                    }
                },
                _ => {
                    let label = format!("/{} (direct)", String::from_utf8_lossy(name));
                    warn!(font = %label, "direct font dictionary left alone");
                    let handle = self.doc.add_font(Font::unsupported(
                        &label,
                        "",
                        "font dictionary is not an indirect object",
                    ));
                    self.bindings.fonts.push(None);
                    handle
                }
            };
            map.insert(name.clone(), handle);
        }
        map
    }

    /// Handle of the stream object `id`, registering it on first sight
    fn content_stream(
        &mut self,
        id: ObjectId,
        origin: StreamOrigin,
        fonts: &BTreeMap<Vec<u8>, FontHandle>,
    ) -> StreamHandle {
        if let Some(handle) = self.streams.get(&id) {
            return *handle;
        }

        let label = object_label(id);
        let mut stream = match self.pdf.get_object(id) {
            Ok(Object::Stream(stream)) => match decoded_content(stream) {
                Ok(bytes) => ContentStream::new(&label, origin, bytes),
                Err(reason) => {
                    let mut content = ContentStream::new(&label, origin, stream.content.clone());
                    content.unreadable = Some(reason);
                    content
                }
            },
            _ => {
                let mut content = ContentStream::new(&label, origin, Vec::new());
                content.unreadable = Some("not a stream object".to_string());
                content
            }
        };
        stream.fonts = fonts.clone();

        let handle = self.doc.add_stream(stream);
        self.bindings.streams.push(id);
        self.streams.insert(id, handle);
        handle
    }

    /// Form XObjects and tiling patterns reachable from `resources`, depth
    /// first
    fn forms(&mut self, resources: Option<&Dictionary>, out: &mut Vec<StreamHandle>, depth: usize) {
        if depth >= MAX_DEPTH {
            return;
        }
        self.patterns(resources, out, depth);
        let Some(xobjects) = resources
            .and_then(|r| entry(self.pdf, r, b"XObject"))
            .and_then(|o| o.as_dict().ok())
        else {
            return;
        };

        for object in xobjects.iter().map(|(_, o)| o) {
            let Ok(id) = object.as_reference() else {
                continue;
            };
            let Ok(Object::Stream(stream)) = self.pdf.get_object(id) else {
                continue;
            };
            if !matches!(stream.dict.get(b"Subtype"), Ok(Object::Name(name)) if name == b"Form") {
                continue;
            }
            if let Some(handle) = self.streams.get(&id) {
                out.push(*handle);
                continue;
            }
            // A form without its own resources uses those of its user
            let own = entry(self.pdf, &stream.dict, b"Resources").and_then(|o| o.as_dict().ok());
            let form_resources = own.or(resources);
            let fonts = self.font_map(form_resources);
            out.push(self.content_stream(id, StreamOrigin::Form, &fonts));
            self.forms(form_resources, out, depth + 1);
        }
    }

    /// Tiling patterns of `resources`; shading patterns draw no text
    fn patterns(&mut self, resources: Option<&Dictionary>, out: &mut Vec<StreamHandle>, depth: usize) {
        let Some(patterns) = resources
            .and_then(|r| entry(self.pdf, r, b"Pattern"))
            .and_then(|o| o.as_dict().ok())
        else {
            return;
        };

        for object in patterns.iter().map(|(_, o)| o) {
            let Ok(id) = object.as_reference() else {
                continue;
            };
            let Ok(Object::Stream(stream)) = self.pdf.get_object(id) else {
                continue;
            };
            if !matches!(stream.dict.get(b"PatternType"), Ok(Object::Integer(1))) {
                continue;
            }
            if let Some(handle) = self.streams.get(&id) {
                out.push(*handle);
                continue;
            }
            let own = entry(self.pdf, &stream.dict, b"Resources").and_then(|o| o.as_dict().ok());
            let pattern_resources = own.or(resources);
            let fonts = self.font_map(pattern_resources);
            out.push(self.content_stream(id, StreamOrigin::Pattern, &fonts));
            self.forms(pattern_resources, out, depth + 1);
        }
    }

    /// `/CharProcs` of every Type3 font met so far, including the Type3
    /// fonts those procedures use in turn
    fn glyph_procedures(&mut self) {
        let pdf = self.pdf;
        while let Some(font_id) = self.type3_fonts.pop() {
            let Ok(font) = pdf.get_dictionary(font_id) else {
                continue;
            };
            let Some(procs) = entry(pdf, font, b"CharProcs").and_then(|o| o.as_dict().ok()) else {
                continue;
            };
            let resources = entry(pdf, font, b"Resources").and_then(|o| o.as_dict().ok());
            let fonts = self.font_map(resources);
            let mut nested = Vec::new();
            for id in procs.iter().filter_map(|(_, o)| o.as_reference().ok()) {
                self.content_stream(id, StreamOrigin::Glyph, &fonts);
            }
            self.forms(resources, &mut nested, 1);
            debug!(font = %object_label(font_id), procedures = procs.len(), "collected glyph procedures");
        }
    }

    /// Distrust the fonts of the AcroForm `/DR` resources
    fn form_defaults(&mut self) {
        let pdf = self.pdf;
        let Some(acroform) = pdf
            .trailer
            .get(b"Root")
            .ok()
            .and_then(|root| resolve(pdf, root))
            .and_then(|o| o.as_dict().ok())
            .and_then(|catalog| entry(pdf, catalog, b"AcroForm"))
            .and_then(|o| o.as_dict().ok())
        else {
            return;
        };
        let resources = entry(pdf, acroform, b"DR").and_then(|o| o.as_dict().ok());
        for (name, handle) in self.font_map(resources) {
            debug!(resource = %String::from_utf8_lossy(&name), "form default font left untrusted");
            self.doc.distrust_font(handle);
        }
    }

    /// Normal appearance streams of the page's annotations
    fn annotations(&mut self, page: &Dictionary, out: &mut Vec<StreamHandle>) {
        let pdf = self.pdf;
        let Some(annots) = entry(pdf, page, b"Annots").and_then(|o| o.as_array().ok()) else {
            return;
        };

        for annot in annots.iter().filter_map(|a| resolve(pdf, a)?.as_dict().ok()) {
            let Some(normal) = entry(pdf, annot, b"AP").and_then(|o| o.as_dict().ok()).and_then(|ap| ap.get(b"N").ok())
            else {
                continue;
            };
            for id in appearance_refs(pdf, normal) {
                if let Some(handle) = self.streams.get(&id) {
                    out.push(*handle);
                    continue;
                }
                let Ok(Object::Stream(stream)) = pdf.get_object(id) else {
                    continue;
                };
                let resources = entry(pdf, &stream.dict, b"Resources").and_then(|o| o.as_dict().ok());
                let fonts = self.font_map(resources);
                out.push(self.content_stream(id, StreamOrigin::Annotation, &fonts));
                self.forms(resources, out, 1);
            }
        }
    }
}

fn is_type3(pdf: &lopdf::Document, id: ObjectId) -> bool {
    pdf.get_dictionary(id)
        .ok()
        .and_then(|dict| dict.get(b"Subtype").ok())
        .is_some_and(|subtype| matches!(subtype, Object::Name(name) if name == b"Type3"))
}

/// `/Resources` of a page, inherited through `/Parent` when absent
fn page_resources(pdf: &lopdf::Document, page_id: ObjectId) -> Option<&Dictionary> {
    let mut current = pdf.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_DEPTH {
        if let Some(resources) = entry(pdf, current, b"Resources") {
            return resources.as_dict().ok();
        }
        let parent = current.get(b"Parent").ok()?.as_reference().ok()?;
        current = pdf.get_dictionary(parent).ok()?;
    }
    None
}

/// Stream references of `/Contents`, a single reference or an array
fn content_refs(page: &Dictionary) -> Vec<ObjectId> {
    match page.get(b"Contents") {
        Ok(Object::Reference(id)) => vec![*id],
        Ok(Object::Array(items)) => items.iter().filter_map(|o| o.as_reference().ok()).collect(),
        _ => Vec::new(),
    }
}

/// A normal appearance is one stream or a dictionary of state streams
fn appearance_refs(pdf: &lopdf::Document, normal: &Object) -> Vec<ObjectId> {
    let states = |dict: &Dictionary| -> Vec<ObjectId> {
        dict.iter().filter_map(|(_, o)| o.as_reference().ok()).collect()
    };
    match normal {
        Object::Reference(id) => match pdf.get_object(*id) {
            Ok(Object::Stream(_)) => vec![*id],
            Ok(Object::Dictionary(dict)) => states(dict),
            _ => Vec::new(),
        },
        Object::Dictionary(dict) => states(dict),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;

    fn page_with(pdf: &mut lopdf::Document, pages_id: ObjectId, content: &[u8], resources: Object) -> ObjectId {
        let contents = pdf.add_object(Stream::new(dictionary! {}, content.to_vec()));
        pdf.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => contents,
            "Resources" => resources,
        })
    }

    fn finish(pdf: &mut lopdf::Document, pages_id: ObjectId, kids: Vec<ObjectId>) {
        let count = kids.len() as i64;
        pdf.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids.into_iter().map(Object::Reference).collect::<Vec<_>>(),
                "Count" => count,
            }),
        );
        let catalog = pdf.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
        pdf.trailer.set("Root", catalog);
    }

    fn helvetica(pdf: &mut lopdf::Document) -> ObjectId {
        pdf.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        })
    }

    #[test]
    fn test_shared_font_is_one_handle() {
        let mut pdf = lopdf::Document::with_version("1.5");
        let pages_id = pdf.new_object_id();
        let font = helvetica(&mut pdf);
        let resources = pdf.add_object(dictionary! { "Font" => dictionary! { "F1" => font } });
        let p1 = page_with(&mut pdf, pages_id, b"BT /F1 12 Tf (A) Tj ET", resources.into());
        let p2 = page_with(&mut pdf, pages_id, b"BT /F1 12 Tf (B) Tj ET", resources.into());
        finish(&mut pdf, pages_id, vec![p1, p2]);

        let (doc, bindings) = build_document(&pdf).unwrap();
        assert_eq!(doc.fonts.len(), 1);
        assert_eq!(doc.pages.len(), 2);
        assert_eq!(doc.streams.len(), 2);
        assert_eq!(bindings.fonts, vec![Some(font)]);
        assert_eq!(doc.stream(StreamHandle(1)).fonts.get(b"F1".as_slice()), Some(&FontHandle(0)));
    }

    #[test]
    fn test_inherited_resources_and_forms() {
        let mut pdf = lopdf::Document::with_version("1.5");
        let pages_id = pdf.new_object_id();
        let font = helvetica(&mut pdf);
        let form = pdf.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Form",
                "BBox" => vec![0.into(), 0.into(), 10.into(), 10.into()],
            },
            b"BT /F1 9 Tf (x) Tj ET".to_vec(),
        ));
        let contents = pdf.add_object(Stream::new(dictionary! {}, b"/Fm0 Do".to_vec()));
        let page = pdf.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => contents,
        });
        finish(&mut pdf, pages_id, vec![page]);
        if let Ok(Object::Dictionary(pages)) = pdf.get_object_mut(pages_id) {
            pages.set(
                "Resources",
                dictionary! {
                    "Font" => dictionary! { "F1" => font },
                    "XObject" => dictionary! { "Fm0" => form },
                },
            );
        }

        let (doc, bindings) = build_document(&pdf).unwrap();
        assert_eq!(doc.pages[0].streams.len(), 2);
        let form_handle = doc.pages[0].streams[1];
        assert_eq!(doc.stream(form_handle).origin, StreamOrigin::Form);
        assert_eq!(bindings.streams[form_handle.0], form);
        assert!(doc.stream(form_handle).fonts.contains_key(b"F1".as_slice()));
    }

    #[test]
    fn test_annotation_appearance_is_collected() {
        let mut pdf = lopdf::Document::with_version("1.5");
        let pages_id = pdf.new_object_id();
        let font = helvetica(&mut pdf);
        let appearance = pdf.add_object(Stream::new(
            dictionary! {
                "Subtype" => "Form",
                "Resources" => dictionary! { "Font" => dictionary! { "Helv" => font } },
            },
            b"BT /Helv 10 Tf (field) Tj ET".to_vec(),
        ));
        let page = page_with(&mut pdf, pages_id, b"", dictionary! {}.into());
        let annot = pdf.add_object(dictionary! {
            "Type" => "Annot",
            "Subtype" => "Widget",
            "AP" => dictionary! { "N" => appearance },
        });
        if let Ok(Object::Dictionary(dict)) = pdf.get_object_mut(page) {
            dict.set("Annots", vec![Object::Reference(annot)]);
        }
        finish(&mut pdf, pages_id, vec![page]);

        let (doc, _) = build_document(&pdf).unwrap();
        let origins: Vec<StreamOrigin> = doc.pages[0].streams.iter().map(|h| doc.stream(*h).origin).collect();
        assert_eq!(origins, vec![StreamOrigin::Page, StreamOrigin::Annotation]);
    }

    #[test]
    fn test_direct_font_dictionary_is_unsupported() {
        let mut pdf = lopdf::Document::with_version("1.5");
        let pages_id = pdf.new_object_id();
        let resources = dictionary! {
            "Font" => dictionary! {
                "F1" => dictionary! { "Type" => "Font", "Subtype" => "Type1", "BaseFont" => "Helvetica" },
            },
        };
        let page = page_with(&mut pdf, pages_id, b"BT /F1 1 Tf (a) Tj ET", resources.into());
        finish(&mut pdf, pages_id, vec![page]);

        let (doc, bindings) = build_document(&pdf).unwrap();
        assert!(!doc.fonts[0].is_supported());
        assert_eq!(bindings.fonts, vec![None]);
    }

    #[test]
    fn test_patterns_and_glyph_procedures_are_collected() {
        let mut pdf = lopdf::Document::with_version("1.5");
        let pages_id = pdf.new_object_id();
        let font = helvetica(&mut pdf);
        let pattern = pdf.add_object(Stream::new(
            dictionary! {
                "PatternType" => 1,
                "Resources" => dictionary! { "Font" => dictionary! { "F1" => font } },
            },
            b"BT /F1 6 Tf (Q) Tj ET".to_vec(),
        ));
        let proc_a = pdf.add_object(Stream::new(dictionary! {}, b"0 0 d0 BT /F1 1 Tf (z) Tj ET".to_vec()));
        let type3 = pdf.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type3",
            "Encoding" => dictionary! { "Differences" => vec![65.into(), Object::Name(b"a".to_vec())] },
            "CharProcs" => dictionary! { "a" => proc_a },
            "Resources" => dictionary! { "Font" => dictionary! { "F1" => font } },
        });
        let resources = dictionary! {
            "Font" => dictionary! { "T3" => type3 },
            "Pattern" => dictionary! { "P0" => pattern },
        };
        let page = page_with(&mut pdf, pages_id, b"BT /T3 1 Tf (A) Tj ET", resources.into());
        finish(&mut pdf, pages_id, vec![page]);

        let (doc, bindings) = build_document(&pdf).unwrap();
        let origins: Vec<StreamOrigin> = doc.pages[0].streams.iter().map(|h| doc.stream(*h).origin).collect();
        assert_eq!(origins, vec![StreamOrigin::Page, StreamOrigin::Pattern]);

        let glyph = bindings.streams.iter().position(|id| *id == proc_a).map(StreamHandle).unwrap();
        assert_eq!(doc.stream(glyph).origin, StreamOrigin::Glyph);
        assert!(doc.stream(glyph).fonts.contains_key(b"F1".as_slice()));
    }

    #[test]
    fn test_acroform_default_fonts_are_distrusted() {
        let mut pdf = lopdf::Document::with_version("1.5");
        let pages_id = pdf.new_object_id();
        let font = helvetica(&mut pdf);
        let other = helvetica(&mut pdf);
        let resources = dictionary! { "Font" => dictionary! { "F1" => font, "F2" => other } };
        let page = page_with(&mut pdf, pages_id, b"BT /F1 1 Tf (a) Tj ET", resources.into());
        finish(&mut pdf, pages_id, vec![page]);
        let acroform = pdf.add_object(dictionary! {
            "Fields" => Vec::<Object>::new(),
            "DR" => dictionary! { "Font" => dictionary! { "Helv" => font } },
        });
        let root = pdf.trailer.get(b"Root").unwrap().as_reference().unwrap();
        if let Ok(Object::Dictionary(catalog)) = pdf.get_object_mut(root) {
            catalog.set("AcroForm", acroform);
        }

        let (doc, bindings) = build_document(&pdf).unwrap();
        let distrusted: Vec<Option<ObjectId>> = doc.distrusted_fonts().map(|h| bindings.fonts[h.0]).collect();
        assert_eq!(distrusted, vec![Some(font)]);
    }
}
