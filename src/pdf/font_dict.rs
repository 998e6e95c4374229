//! Font dictionaries to the typed font model

use std::collections::BTreeMap;

use lopdf::{Dictionary, Object, ObjectId};
use tracing::debug;

use crate::cmap::{CidCMap, CidSystemInfo, ToUnicodeMap};
use crate::codespace::Codespace;
use crate::font::{
    strip_subset_prefix, BaseEncoding, CidToGid, CompositeFont, Font, FontKind, SimpleEncoding, SimpleFont, Widths,
};
use crate::pdf::extract::{decoded_content, entry, object_label, resolve};

const STANDARD_14: [&str; 14] = [
    "Times-Roman",
    "Times-Bold",
    "Times-Italic",
    "Times-BoldItalic",
    "Helvetica",
    "Helvetica-Bold",
    "Helvetica-Oblique",
    "Helvetica-BoldOblique",
    "Courier",
    "Courier-Bold",
    "Courier-Oblique",
    "Courier-BoldOblique",
    "Symbol",
    "ZapfDingbats",
];

/// FontDescriptor flag: font uses symbols outside the standard Latin set
const FLAG_SYMBOLIC: i64 = 1 << 2;

/// Read the font dictionary `id`. Fonts that cannot be remapped come back
/// as [`FontKind::Unsupported`] with the reason.
pub fn read_font(pdf: &lopdf::Document, id: ObjectId) -> Font {
    let label = object_label(id);
    let dict = match pdf.get_dictionary(id) {
        Ok(dict) => dict,
        Err(e) => return Font::unsupported(&label, "", format!("not a font dictionary: {}", e)),
    };
    let base_font = name(dict, b"BaseFont").unwrap_or_default();

    match read_tables(pdf, dict) {
        Ok((codespace, kind, to_unicode)) => Font {
            label,
            base_font,
            codespace,
            kind,
            to_unicode,
        },
        Err(reason) => {
            debug!(font = %label, %base_font, "unsupported: {}", reason);
            Font::unsupported(&label, &base_font, reason)
        }
    }
}

type Tables = (Codespace, FontKind, Option<ToUnicodeMap>);

fn read_tables(pdf: &lopdf::Document, dict: &Dictionary) -> Result<Tables, String> {
    let subtype = name(dict, b"Subtype").ok_or("font has no /Subtype")?;
    let (codespace, kind) = match subtype.as_str() {
        "Type0" => composite_font(pdf, dict)?,
        "Type1" | "MMType1" | "TrueType" | "Type3" => (Codespace::single_byte(), simple_font(pdf, dict, &subtype)?),
        other => return Err(format!("unknown font subtype /{}", other)),
    };

    let to_unicode = match entry(pdf, dict, b"ToUnicode") {
        Some(Object::Stream(stream)) => {
            let bytes = decoded_content(stream)?;
            Some(ToUnicodeMap::parse(&bytes).map_err(|e| format!("unreadable /ToUnicode: {}", e))?)
        }
        _ => None,
    };
    Ok((codespace, kind, to_unicode))
}

fn simple_font(pdf: &lopdf::Document, dict: &Dictionary, subtype: &str) -> Result<FontKind, String> {
    let base_font = name(dict, b"BaseFont").unwrap_or_default();
    let base_name = strip_subset_prefix(&base_font);
    let descriptor = entry(pdf, dict, b"FontDescriptor").and_then(|o| o.as_dict().ok());
    let flags = descriptor
        .and_then(|d| d.get(b"Flags").ok())
        .and_then(|o| o.as_i64().ok())
        .unwrap_or(0);
    let embedded = descriptor
        .is_some_and(|d| d.has(b"FontFile") || d.has(b"FontFile2") || d.has(b"FontFile3"));

    if matches!(base_name, "Symbol" | "ZapfDingbats") && !embedded {
        return Err(format!("{} uses its built-in symbol encoding", base_name));
    }
    if subtype == "TrueType" && flags & FLAG_SYMBOLIC != 0 {
        return Err("symbolic TrueType selects glyphs through its internal cmap".to_string());
    }

    // Encoding used when none (or no /BaseEncoding) is given
    let implicit = match subtype {
        "Type3" => None,
        "TrueType" => Some(BaseEncoding::Standard),
        _ if !embedded && STANDARD_14.contains(&base_name) => Some(BaseEncoding::Standard),
        _ => None,
    };

    let encoding = match entry(pdf, dict, b"Encoding") {
        None => SimpleEncoding {
            base: implicit,
            differences: BTreeMap::new(),
        },
        Some(Object::Name(encoding)) => SimpleEncoding {
            base: Some(base_encoding(encoding)?),
            differences: BTreeMap::new(),
        },
        Some(Object::Dictionary(encoding)) => {
            let base = match encoding.get(b"BaseEncoding") {
                Ok(Object::Name(name)) => Some(base_encoding(name)?),
                _ => implicit,
            };
            let differences = match entry(pdf, encoding, b"Differences") {
                Some(Object::Array(items)) => differences(items)?,
                _ => BTreeMap::new(),
            };
            SimpleEncoding { base, differences }
        }
        Some(_) => return Err("malformed /Encoding".to_string()),
    };
    if encoding.base.is_none() && encoding.differences.is_empty() {
        return Err("glyph selection relies on the font program's built-in encoding".to_string());
    }

    Ok(FontKind::Simple(SimpleFont {
        subtype: subtype.to_string(),
        encoding,
        widths: widths(pdf, dict, descriptor)?,
    }))
}

fn base_encoding(name: &[u8]) -> Result<BaseEncoding, String> {
    BaseEncoding::from_pdf_name(name).ok_or_else(|| format!("unknown encoding /{}", String::from_utf8_lossy(name)))
}

/// `[code /name /name code /name ...]`
fn differences(items: &[Object]) -> Result<BTreeMap<u8, String>, String> {
    let mut map = BTreeMap::new();
    let mut code: Option<i64> = None;
    for item in items {
        match item {
            Object::Integer(n) => code = Some(*n),
            Object::Name(name) => {
                let current = code.ok_or("/Differences starts with a glyph name")?;
                if let Ok(byte) = u8::try_from(current) {
                    map.insert(byte, String::from_utf8_lossy(name).into_owned());
                }
                code = Some(current + 1);
            }
            _ => return Err("malformed /Differences entry".to_string()),
        }
    }
    Ok(map)
}

fn widths(pdf: &lopdf::Document, dict: &Dictionary, descriptor: Option<&Dictionary>) -> Result<Option<Widths>, String> {
    let (Some(first), Some(Object::Array(values))) = (
        entry(pdf, dict, b"FirstChar").and_then(|o| o.as_i64().ok()),
        entry(pdf, dict, b"Widths"),
    ) else {
        return Ok(None);
    };
    let first_char = u8::try_from(first).map_err(|_| format!("/FirstChar {} out of range", first))?;
    let missing = descriptor
        .and_then(|d| entry(pdf, d, b"MissingWidth"))
        .and_then(number)
        .unwrap_or(0.0);
    let values = values
        .iter()
        .take(256 - first_char as usize)
        .map(|o| resolve(pdf, o).and_then(number).unwrap_or(missing))
        .collect();
    Ok(Some(Widths {
        first_char,
        values,
        missing,
    }))
}

fn composite_font(pdf: &lopdf::Document, dict: &Dictionary) -> Result<(Codespace, FontKind), String> {
    let descendant = entry(pdf, dict, b"DescendantFonts")
        .and_then(|o| o.as_array().ok())
        .and_then(|fonts| fonts.first())
        .and_then(|o| resolve(pdf, o))
        .and_then(|o| o.as_dict().ok())
        .ok_or("Type0 font without a descendant CIDFont")?;

    let system_info = match entry(pdf, descendant, b"CIDSystemInfo").and_then(|o| o.as_dict().ok()) {
        Some(info) => CidSystemInfo {
            registry: text(pdf, info, b"Registry").unwrap_or_else(|| "Adobe".to_string()),
            ordering: text(pdf, info, b"Ordering").unwrap_or_else(|| "Identity".to_string()),
            supplement: entry(pdf, info, b"Supplement").and_then(|o| o.as_i64().ok()).unwrap_or(0),
        },
        None => CidSystemInfo::default(),
    };

    let cid_to_gid = match (name(descendant, b"Subtype").as_deref(), entry(pdf, descendant, b"CIDToGIDMap")) {
        (Some("CIDFontType2"), Some(Object::Stream(stream))) => {
            let bytes = decoded_content(stream)?;
            CidToGid::Table(
                bytes
                    .chunks(2)
                    .map(|pair| u16::from_be_bytes([pair[0], pair.get(1).copied().unwrap_or(0)]))
                    .collect(),
            )
        }
        _ => CidToGid::Identity,
    };

    match entry(pdf, dict, b"Encoding") {
        Some(Object::Name(cmap)) => {
            let wmode = match cmap.as_slice() {
                b"Identity-H" => 0,
                b"Identity-V" => 1,
                other => {
                    return Err(format!("predefined CMap /{} is not embedded", String::from_utf8_lossy(other)));
                }
            };
            Ok((
                Codespace::two_byte(),
                FontKind::Composite(CompositeFont {
                    cmap_name: String::from_utf8_lossy(cmap).into_owned(),
                    identity: true,
                    table: BTreeMap::new(),
                    cid_to_gid,
                    wmode,
                    system_info,
                }),
            ))
        }
        Some(Object::Stream(stream)) => {
            let bytes = decoded_content(stream)?;
            let cmap = CidCMap::parse(&bytes).map_err(|e| format!("unreadable encoding CMap: {}", e))?;
            if let Some(parent) = &cmap.parent {
                return Err(format!("encoding CMap builds on /{}", parent));
            }
            let wmode = match stream.dict.get(b"WMode") {
                Ok(Object::Integer(mode)) => *mode as u8,
                _ => cmap.wmode,
            };
            Ok((
                cmap.codespace,
                FontKind::Composite(CompositeFont {
                    cmap_name: cmap.name.unwrap_or_else(|| "Custom".to_string()),
                    identity: false,
                    table: cmap.mappings,
                    cid_to_gid,
                    wmode,
                    system_info,
                }),
            ))
        }
        _ => Err("Type0 font without /Encoding".to_string()),
    }
}

fn name(dict: &Dictionary, key: &[u8]) -> Option<String> {
    match dict.get(key) {
        Ok(Object::Name(name)) => Some(String::from_utf8_lossy(name).into_owned()),
        _ => None,
    }
}

fn text(pdf: &lopdf::Document, dict: &Dictionary, key: &[u8]) -> Option<String> {
    match entry(pdf, dict, key) {
        Some(Object::String(bytes, _)) => Some(String::from_utf8_lossy(bytes).into_owned()),
        _ => None,
    }
}

fn number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(n) => Some(*n as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codespace::Code;
    use crate::font::GlyphRef;
    use lopdf::{dictionary, Stream};

    fn load(pdf: &mut lopdf::Document, font: Dictionary) -> Font {
        let id = pdf.add_object(font);
        read_font(pdf, id)
    }

    #[test]
    fn test_simple_font_with_differences() {
        let mut pdf = lopdf::Document::with_version("1.5");
        let font = load(
            &mut pdf,
            dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => "ABCDEF+Garamond",
                "FirstChar" => 65,
                "Widths" => vec![600.into(), 650.into()],
                "Encoding" => dictionary! {
                    "BaseEncoding" => "WinAnsiEncoding",
                    "Differences" => vec![66.into(), Object::Name(b"fi".to_vec())],
                },
            },
        );
        assert!(font.is_supported());
        assert_eq!(font.glyph(Code::single(65)), Some(GlyphRef::Name("A".to_string())));
        assert_eq!(font.glyph(Code::single(66)), Some(GlyphRef::Name("fi".to_string())));
        assert_eq!(font.width(Code::single(66)), Some(650.0));
        assert_eq!(font.unicode(Code::single(66)).as_deref(), Some("\u{FB01}"));
    }

    #[test]
    fn test_standard_font_without_encoding() {
        let mut pdf = lopdf::Document::with_version("1.5");
        let font = load(
            &mut pdf,
            dictionary! { "Type" => "Font", "Subtype" => "Type1", "BaseFont" => "Courier" },
        );
        assert_eq!(font.glyph(Code::single(0x27)), Some(GlyphRef::Name("quoteright".to_string())));
    }

    #[test]
    fn test_unsupported_fonts() {
        let mut pdf = lopdf::Document::with_version("1.5");
        let descriptor = pdf.add_object(dictionary! { "Type" => "FontDescriptor", "Flags" => 4 });
        let symbolic = load(
            &mut pdf,
            dictionary! {
                "Type" => "Font",
                "Subtype" => "TrueType",
                "BaseFont" => "Wingdings",
                "FontDescriptor" => descriptor,
            },
        );
        assert!(!symbolic.is_supported());

        let predefined = load(
            &mut pdf,
            dictionary! {
                "Type" => "Font",
                "Subtype" => "Type0",
                "BaseFont" => "MSung",
                "Encoding" => "UniCNS-UCS2-H",
                "DescendantFonts" => vec![dictionary! { "Subtype" => "CIDFontType0" }.into()],
            },
        );
        assert!(predefined.unsupported_reason().unwrap().contains("UniCNS-UCS2-H"));

        let symbol = load(
            &mut pdf,
            dictionary! { "Type" => "Font", "Subtype" => "Type1", "BaseFont" => "Symbol" },
        );
        assert!(!symbol.is_supported());
    }

    #[test]
    fn test_identity_composite_font() {
        let mut pdf = lopdf::Document::with_version("1.5");
        let cid_to_gid = pdf.add_object(Stream::new(dictionary! {}, vec![0, 0, 0, 7, 0, 7]));
        let cmap = b"/CIDInit /ProcSet findresource begin 12 dict begin begincmap
1 begincodespacerange <0000> <FFFF> endcodespacerange
1 beginbfchar <0001> <0041> endbfchar endcmap"
            .to_vec();
        let to_unicode = pdf.add_object(Stream::new(dictionary! {}, cmap));
        let font = load(
            &mut pdf,
            dictionary! {
                "Type" => "Font",
                "Subtype" => "Type0",
                "BaseFont" => "XYZABC+NotoSans",
                "Encoding" => "Identity-H",
                "ToUnicode" => to_unicode,
                "DescendantFonts" => vec![dictionary! {
                    "Subtype" => "CIDFontType2",
                    "CIDToGIDMap" => cid_to_gid,
                }.into()],
            },
        );
        assert_eq!(font.codespace, Codespace::two_byte());
        assert_eq!(font.glyph(Code::new(1, 2)), Some(GlyphRef::Gid(7)));
        assert_eq!(font.glyph(Code::new(2, 2)), Some(GlyphRef::Gid(7)));
        assert_eq!(font.glyph(Code::new(0, 2)), None);
        assert_eq!(font.unicode(Code::new(1, 2)).as_deref(), Some("A"));
    }
}
