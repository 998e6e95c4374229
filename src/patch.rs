//! Font table patcher
//!
//! Applies a code mapping to a font model: the glyph (or CID) and the
//! advance width of every moved code are made reachable at its new code,
//! and the ToUnicode entry at the new code is replaced by a decoy or a
//! neutral entry. Codes not targeted by the mapping keep their tables.

use std::collections::{BTreeMap, BTreeSet};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::cmap::ToUnicodeMap;
use crate::codespace::Code;
use crate::error::ScrambleError;
use crate::font::{Font, FontKind};
use crate::options::ToUnicodePolicy;
use crate::permute::CodeMapping;

/// Patch `font` for `mapping`. `used` is the set the mapping was built
/// for; its original texts feed the decoy pool.
pub fn patch_font(
    font: &Font,
    mapping: &CodeMapping,
    used: &BTreeSet<Code>,
    policy: ToUnicodePolicy,
    seed: u64,
) -> Result<Font, ScrambleError> {
    let violation = |detail: String| ScrambleError::ConsistencyViolation {
        subject: format!("font {}", font.label),
        detail,
    };

    let mut patched = font.clone();
    match (&mut patched.kind, &font.kind) {
        (FontKind::Simple(simple), FontKind::Simple(original)) => {
            for (from, to) in mapping.moved() {
                let (Ok(from_byte), Ok(to_byte)) = (u8::try_from(from.value), u8::try_from(to.value)) else {
                    return Err(violation(format!("{} -> {} is not a single-byte move", from, to)));
                };
                let name = original
                    .encoding
                    .glyph_name(from_byte)
                    .ok_or_else(|| violation(format!("moved code {} draws no glyph", from)))?;
                simple.encoding.differences.insert(to_byte, name.to_string());
                if let (Some(widths), Some(old)) = (simple.widths.as_mut(), original.widths.as_ref()) {
                    widths.set(to_byte, old.get(from_byte));
                }
            }
        }
        (FontKind::Composite(composite), FontKind::Composite(original)) => {
            for (from, to) in mapping.moved() {
                let cid = original
                    .cid(from)
                    .ok_or_else(|| violation(format!("moved code {} has no CID", from)))?;
                composite.table.insert(to, cid);
            }
        }
        _ => {
            return Err(ScrambleError::UnsupportedFont {
                font: font.label.clone(),
                reason: font.unsupported_reason().unwrap_or("unknown font kind").to_string(),
            });
        }
    }

    patched.to_unicode = patch_to_unicode(font, mapping, used, policy, seed);
    Ok(patched)
}

/// Text written at moved codes when no decoy is available. Leaving the
/// entry out would let extractors fall back to the glyph name.
pub const NEUTRAL_TEXT: &str = "\u{FFFD}";

/// Build the ToUnicode map of the patched font
fn patch_to_unicode(
    font: &Font,
    mapping: &CodeMapping,
    used: &BTreeSet<Code>,
    policy: ToUnicodePolicy,
    seed: u64,
) -> Option<ToUnicodeMap> {
    let mut map = match (&font.to_unicode, &font.kind) {
        (Some(map), _) => map.clone(),
        // Without a ToUnicode, extractors fall back to glyph names; an
        // explicit map stops that
        (None, FontKind::Simple(_)) => derived_map(font),
        (None, _) => ToUnicodeMap::new(),
    };

    let originals: BTreeMap<Code, String> = used
        .iter()
        .filter_map(|c| font.unicode(*c).map(|text| (*c, text)))
        .collect();
    let mut rng = StdRng::seed_from_u64(seed);
    let distinct: BTreeSet<&str> = originals.values().map(String::as_str).collect();
    let mut pool: Vec<&str> = distinct.into_iter().collect();
    pool.shuffle(&mut rng);

    // With fewer than two distinct texts the used set cannot hide itself
    let spare_texts = if policy == ToUnicodePolicy::Decoy && pool.len() < 2 {
        font_alphabet(font, &map)
    } else {
        Vec::new()
    };
    let mut alphabet: Vec<&str> = spare_texts.iter().map(String::as_str).collect();
    alphabet.shuffle(&mut rng);

    for (from, to) in mapping.moved() {
        let original = originals.get(&from).map(String::as_str);
        let text = match policy {
            ToUnicodePolicy::Omit => None,
            ToUnicodePolicy::Decoy => {
                pick_decoy(&pool, original, &mut rng).or_else(|| pick_decoy(&alphabet, original, &mut rng))
            }
        };
        map.insert(to, text.unwrap_or(NEUTRAL_TEXT).to_string());
    }

    if map.is_empty() && font.to_unicode.is_none() {
        None
    } else {
        Some(map)
    }
}

/// A pool entry different from `original`, starting at a random position
fn pick_decoy<'a>(pool: &[&'a str], original: Option<&str>, rng: &mut StdRng) -> Option<&'a str> {
    if pool.is_empty() {
        return None;
    }
    let start = rng.gen_range(0..pool.len());
    (0..pool.len())
        .map(|i| pool[(start + i) % pool.len()])
        .find(|candidate| Some(*candidate) != original)
}

/// Every visible text the font can produce, sorted and deduplicated.
/// Simple fonts add the texts of their encoding's glyph names.
fn font_alphabet(font: &Font, map: &ToUnicodeMap) -> Vec<String> {
    let derived = match font.kind {
        FontKind::Simple(_) => derived_map(font),
        _ => ToUnicodeMap::new(),
    };
    let texts: BTreeSet<String> = map
        .iter()
        .chain(derived.iter())
        .map(|(_, text)| text.clone())
        .filter(|text| !text.trim().is_empty() && text != NEUTRAL_TEXT)
        .collect();
    texts.into_iter().collect()
}

/// ToUnicode derived from the glyph names of a simple font
fn derived_map(font: &Font) -> ToUnicodeMap {
    let mut map = ToUnicodeMap::new();
    for byte in 0..=255u8 {
        let code = Code::single(byte);
        if let Some(text) = font.unicode(code) {
            map.insert(code, text);
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmap::CidSystemInfo;
    use crate::codespace::Codespace;
    use crate::font::tests::simple_font;
    use crate::font::{CidToGid, CompositeFont, GlyphRef};

    fn abc_mapping() -> CodeMapping {
        [
            (Code::single(65), Code::single(200)),
            (Code::single(66), Code::single(65)),
            (Code::single(67), Code::single(67)),
        ]
        .into_iter()
        .collect()
    }

    fn used() -> BTreeSet<Code> {
        [65, 66, 67].into_iter().map(Code::single).collect()
    }

    #[test]
    fn test_simple_font_glyphs_and_widths_follow_codes() {
        let font = simple_font("1 0 R");
        let patched = patch_font(&font, &abc_mapping(), &used(), ToUnicodePolicy::Decoy, 7).unwrap();

        for (from, to) in abc_mapping().iter() {
            assert_eq!(patched.glyph(to), font.glyph(from));
            assert_eq!(patched.width(to), font.width(from));
        }
        assert_eq!(patched.glyph(Code::single(200)), Some(GlyphRef::Name("A".to_string())));
    }

    #[test]
    fn test_decoy_never_reveals_original_text() {
        let font = simple_font("1 0 R");
        for seed in 0..20 {
            let patched = patch_font(&font, &abc_mapping(), &used(), ToUnicodePolicy::Decoy, seed).unwrap();
            let map = patched.to_unicode.as_ref().unwrap();
            assert_ne!(map.get(Code::single(200)), Some("A"));
            assert_ne!(map.get(Code::single(65)), Some("B"));
            assert!(map.get(Code::single(200)).is_some());
            // Unmoved codes keep their text
            assert_eq!(map.get(Code::single(67)), Some("C"));
        }
    }

    #[test]
    fn test_omit_neutralizes_entries_of_moved_codes() {
        let font = simple_font("1 0 R");
        let patched = patch_font(&font, &abc_mapping(), &used(), ToUnicodePolicy::Omit, 7).unwrap();
        let map = patched.to_unicode.unwrap();
        assert_eq!(map.get(Code::single(200)), Some(NEUTRAL_TEXT));
        assert_eq!(map.get(Code::single(65)), Some(NEUTRAL_TEXT));
        assert_eq!(map.get(Code::single(67)), Some("C"));
    }

    #[test]
    fn test_single_text_pool_draws_decoy_from_font_alphabet() {
        let font = simple_font("1 0 R");
        let mapping: CodeMapping = [(Code::single(65), Code::single(200))].into_iter().collect();
        let used: BTreeSet<Code> = [Code::single(65)].into_iter().collect();
        for seed in 0..10 {
            let patched = patch_font(&font, &mapping, &used, ToUnicodePolicy::Decoy, seed).unwrap();
            let text = patched.unicode(Code::single(200)).unwrap();
            assert_ne!(text, "A");
            assert_ne!(text, NEUTRAL_TEXT);
            assert!(!text.trim().is_empty());
        }
    }

    #[test]
    fn test_omit_hides_glyph_name_fallback() {
        let font = simple_font("1 0 R");
        let patched = patch_font(&font, &abc_mapping(), &used(), ToUnicodePolicy::Omit, 7).unwrap();
        // Code 200 names glyph A in /Differences; extraction must not read it
        assert_eq!(patched.unicode(Code::single(200)).as_deref(), Some(NEUTRAL_TEXT));
        assert_eq!(patched.unicode(Code::single(65)).as_deref(), Some(NEUTRAL_TEXT));
    }

    #[test]
    fn test_composite_cid_follows_code() {
        let font = Font {
            label: "2 0 R".to_string(),
            base_font: "Noto".to_string(),
            codespace: Codespace::two_byte(),
            kind: FontKind::Composite(CompositeFont {
                cmap_name: "Identity-H".to_string(),
                identity: true,
                table: BTreeMap::new(),
                cid_to_gid: CidToGid::Identity,
                wmode: 0,
                system_info: CidSystemInfo::default(),
            }),
            to_unicode: None,
        };
        let mapping: CodeMapping = [(Code::new(0x10, 2), Code::new(0x5000, 2))].into_iter().collect();
        let used: BTreeSet<Code> = [Code::new(0x10, 2)].into_iter().collect();
        let patched = patch_font(&font, &mapping, &used, ToUnicodePolicy::Decoy, 0).unwrap();
        assert_eq!(patched.glyph(Code::new(0x5000, 2)), Some(GlyphRef::Gid(0x10)));
        assert_eq!(patched.glyph(Code::new(0x10, 2)), Some(GlyphRef::Gid(0x10)));
        // No text to draw decoys from: the moved code gets the neutral entry
        let map = patched.to_unicode.unwrap();
        assert_eq!(map.get(Code::new(0x5000, 2)), Some(NEUTRAL_TEXT));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_unsupported_font_is_rejected() {
        let font = Font::unsupported("3 0 R", "Symbol", "symbolic font without encoding");
        let err = patch_font(&font, &CodeMapping::new(), &BTreeSet::new(), ToUnicodePolicy::Decoy, 0).unwrap_err();
        assert!(matches!(err, ScrambleError::UnsupportedFont { .. }));
    }
}
