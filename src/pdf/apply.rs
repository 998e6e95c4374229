//! Write patched fonts and rewritten streams back into a lopdf document

use lopdf::{Dictionary, Object, ObjectId, Stream, StringFormat};
use tracing::debug;

use crate::cmap::CidCMap;
use crate::document::Document;
use crate::error::{Error, Result};
use crate::font::{CompositeFont, Font, FontKind, SimpleFont};
use crate::pdf::extract::{object_label, Bindings};

/// Copy every font and stream the engine touched into `pdf`.
///
/// New tables are added as fresh objects; the ones they replace become
/// unreferenced.
pub fn apply_changes(pdf: &mut lopdf::Document, doc: &Document, bindings: &Bindings) -> Result<()> {
    for handle in doc.dirty_fonts() {
        let font = doc.font(handle);
        let Some(id) = bindings.fonts.get(handle.0).copied().flatten() else {
            return Err(Error::General(format!("font {} has no object to write to", font.label)));
        };
        write_font(pdf, id, font)?;
        debug!(font = %font.label, "wrote font tables");
    }

    for handle in doc.dirty_streams() {
        let stream = doc.stream(handle);
        let id = bindings
            .streams
            .get(handle.0)
            .copied()
            .ok_or_else(|| Error::General(format!("stream {} has no object to write to", stream.label)))?;
        match pdf.get_object_mut(id)? {
            Object::Stream(target) => target.set_plain_content(stream.bytes.clone()),
            _ => return Err(Error::General(format!("{} is not a stream", object_label(id)))),
        }
    }
    Ok(())
}

fn write_font(pdf: &mut lopdf::Document, id: ObjectId, font: &Font) -> Result<()> {
    let encoding = match &font.kind {
        FontKind::Simple(simple) => Some(Object::Dictionary(encoding_dict(simple))),
        FontKind::Composite(composite) => {
            let stream = cmap_stream(font, composite);
            Some(Object::Reference(pdf.add_object(stream)))
        }
        FontKind::Unsupported { .. } => None,
    };
    let to_unicode = font
        .to_unicode
        .as_ref()
        .map(|map| pdf.add_object(Stream::new(Dictionary::new(), map.write(&font.codespace))));

    let dict = pdf.get_object_mut(id)?.as_dict_mut()?;
    if let Some(encoding) = encoding {
        dict.set("Encoding", encoding);
    }
    if let FontKind::Simple(SimpleFont { widths: Some(widths), .. }) = &font.kind {
        dict.set("FirstChar", Object::Integer(widths.first_char as i64));
        dict.set("LastChar", Object::Integer(widths.last_char() as i64));
        dict.set("Widths", Object::Array(widths.values.iter().map(|w| number(*w)).collect()));
    }
    if let Some(to_unicode) = to_unicode {
        dict.set("ToUnicode", Object::Reference(to_unicode));
    }
    Ok(())
}

/// `/Encoding` dictionary with the font's base encoding and differences
fn encoding_dict(font: &SimpleFont) -> Dictionary {
    let mut dict = Dictionary::new();
    dict.set("Type", Object::Name(b"Encoding".to_vec()));
    if let Some(base) = font.encoding.base {
        dict.set("BaseEncoding", Object::Name(base.pdf_name().to_vec()));
    }

    let mut differences = Vec::new();
    let mut next: Option<u8> = None;
    for (code, name) in font.encoding.effective_differences() {
        if next != Some(code) {
            differences.push(Object::Integer(code as i64));
        }
        differences.push(Object::Name(name.as_bytes().to_vec()));
        next = code.checked_add(1);
    }
    if !differences.is_empty() {
        dict.set("Differences", Object::Array(differences));
    }
    dict
}

/// Embedded encoding CMap with every `code → CID` pair of the font
fn cmap_stream(font: &Font, composite: &CompositeFont) -> Stream {
    let direction = if composite.wmode == 1 { "V" } else { "H" };
    let name = if composite.identity {
        format!("Scrambled-{}", direction)
    } else {
        composite.cmap_name.clone()
    };
    let data = CidCMap::write(
        &name,
        &composite.system_info,
        &font.codespace,
        composite.wmode,
        composite.mappings(),
    );

    let info = &composite.system_info;
    let mut system_info = Dictionary::new();
    system_info.set("Registry", Object::String(info.registry.as_bytes().to_vec(), StringFormat::Literal));
    system_info.set("Ordering", Object::String(info.ordering.as_bytes().to_vec(), StringFormat::Literal));
    system_info.set("Supplement", Object::Integer(info.supplement));

    let mut dict = Dictionary::new();
    dict.set("Type", Object::Name(b"CMap".to_vec()));
    dict.set("CMapName", Object::Name(name.into_bytes()));
    dict.set("CIDSystemInfo", Object::Dictionary(system_info));
    if composite.wmode == 1 {
        dict.set("WMode", Object::Integer(1));
    }
    Stream::new(dict, data)
}

fn number(value: f32) -> Object {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f32 {
        Object::Integer(value as i64)
    } else {
        Object::Real(value)
    }
}
