//! Consistency validator
//!
//! Re-derives, from the original and patched tables and streams, that every
//! drawn code still renders the glyph it rendered before. Any failure is a
//! [`ScrambleError::ConsistencyViolation`].

use std::collections::{BTreeMap, BTreeSet};

use crate::codespace::Code;
use crate::content::{self, TextState};
use crate::error::ScrambleError;
use crate::font::{Font, FontHandle};
use crate::permute::CodeMapping;

fn violation(subject: impl Into<String>, detail: String) -> ScrambleError {
    ScrambleError::ConsistencyViolation {
        subject: subject.into(),
        detail,
    }
}

/// Check a patched font against its original for the given mapping
pub fn validate_font(original: &Font, patched: &Font, mapping: &CodeMapping) -> Result<(), ScrambleError> {
    let subject = format!("font {}", original.label);
    let mut images = BTreeSet::new();

    for (from, to) in mapping.iter() {
        if !images.insert(to) {
            return Err(violation(subject, format!("{} is the image of two codes", to)));
        }
        if to.width != from.width {
            return Err(violation(subject, format!("{} -> {} changes code width", from, to)));
        }
        if !original.codespace.contains(to) {
            return Err(violation(subject, format!("{} lies outside the codespace", to)));
        }
        let before = original.glyph(from);
        let after = patched.glyph(to);
        if before != after {
            return Err(violation(
                subject,
                format!("{} drew {:?} but {} draws {:?}", from, before, to, after),
            ));
        }
        if original.width(from) != patched.width(to) {
            return Err(violation(subject, format!("{} -> {} changes the advance width", from, to)));
        }
        if from != to {
            // Font::unicode includes the glyph-name fallback extractors use
            if let Some(text) = original.unicode(from) {
                if patched.unicode(to).as_deref() == Some(text.as_str()) {
                    return Err(violation(subject, format!("{} still extracts as {:?}", to, text)));
                }
            }
        }
    }
    Ok(())
}

/// Check a rewritten stream against the original bytes.
///
/// Both must parse from the same entry state, have the same operators and
/// the same bytes outside text operands, and every operand must decode to
/// the mapped codes of the original operand.
pub fn validate_stream(
    label: &str,
    original: &[u8],
    rewritten: &[u8],
    entry: &TextState,
    resources: &BTreeMap<Vec<u8>, FontHandle>,
    fonts: &[Font],
    mappings: &BTreeMap<FontHandle, CodeMapping>,
) -> Result<(), ScrambleError> {
    let subject = format!("stream {}", label);
    let before = content::parse(original, entry)
        .map_err(|e| violation(subject.as_str(), format!("original does not parse: {}", e)))?;
    let after = content::parse(rewritten, entry)
        .map_err(|e| violation(subject.as_str(), format!("rewritten stream does not parse: {}", e)))?;

    if before.operator_count() != after.operator_count() {
        return Err(violation(
            subject,
            format!("operator count {} became {}", before.operator_count(), after.operator_count()),
        ));
    }
    if before.skeleton(original) != after.skeleton(rewritten) {
        return Err(violation(subject, "bytes outside text operands changed".to_string()));
    }

    for (old, new) in before.text_operands.iter().zip(&after.text_operands) {
        let handle = resources
            .get(&old.font)
            .ok_or_else(|| violation(subject.as_str(), "text in an unknown font".to_string()))?;
        let font = &fonts[handle.0];
        let old_bytes = &before.string(old).bytes;
        let new_bytes = &after.string(new).bytes;

        let Some(mapping) = mappings.get(handle) else {
            if old_bytes != new_bytes {
                return Err(violation(subject, format!("text in unmapped font {} changed", font.label)));
            }
            continue;
        };
        let decode = |bytes: &[u8]| {
            font.codespace
                .decode(bytes)
                .map_err(|e| violation(subject.as_str(), format!("{} for font {}", e, font.label)))
        };
        let old_codes = decode(old_bytes)?;
        let new_codes = decode(new_bytes)?;
        let expected: Vec<Code> = old_codes.iter().map(|c| mapping.map(*c)).collect();
        if new_codes != expected {
            return Err(violation(
                subject,
                format!("operand decodes to {:?}, expected {:?}", new_codes, expected),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::font::tests::simple_font;
    use crate::options::ToUnicodePolicy;
    use crate::patch::patch_font;

    fn mapping(pairs: &[(u8, u8)]) -> CodeMapping {
        pairs.iter().map(|(a, b)| (Code::single(*a), Code::single(*b))).collect()
    }

    fn resources() -> BTreeMap<Vec<u8>, FontHandle> {
        [(b"F1".to_vec(), FontHandle(0))].into_iter().collect()
    }

    #[test]
    fn test_patched_font_validates() {
        let font = simple_font("1 0 R");
        let m = mapping(&[(65, 200), (66, 65)]);
        let used = [65, 66].into_iter().map(Code::single).collect();
        let patched = patch_font(&font, &m, &used, ToUnicodePolicy::Decoy, 3).unwrap();
        assert_eq!(validate_font(&font, &patched, &m), Ok(()));
    }

    #[test]
    fn test_unpatched_font_fails() {
        let font = simple_font("1 0 R");
        let m = mapping(&[(65, 66), (66, 65)]);
        let err = validate_font(&font, &font, &m).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_glyph_name_fallback_exposing_text_fails() {
        let font = simple_font("1 0 R");
        let m = mapping(&[(65, 200)]);
        let used = [65].into_iter().map(Code::single).collect();
        let mut patched = patch_font(&font, &m, &used, ToUnicodePolicy::Omit, 3).unwrap();
        assert_eq!(validate_font(&font, &patched, &m), Ok(()));

        // Dropping the entry at the new code lets /Differences name "A" again
        if let Some(map) = patched.to_unicode.as_mut() {
            map.remove(Code::single(200));
        }
        let err = validate_font(&font, &patched, &m).unwrap_err();
        assert!(err.to_string().contains("still extracts as"));
    }

    #[test]
    fn test_collision_fails() {
        let font = simple_font("1 0 R");
        let m = mapping(&[(65, 65), (66, 65)]);
        assert!(validate_font(&font, &font, &m).is_err());
    }

    #[test]
    fn test_stream_with_mapped_codes_validates() {
        let fonts = vec![simple_font("1 0 R")];
        let mappings = [(FontHandle(0), mapping(&[(65, 66), (66, 65)]))].into_iter().collect();
        let result = validate_stream(
            "s",
            b"/F1 1 Tf [(AB) 10 (A)] TJ",
            b"/F1 1 Tf [(BA) 10 (B)] TJ",
            &TextState::default(),
            &resources(),
            &fonts,
            &mappings,
        );
        assert_eq!(result, Ok(()));
    }

    #[test]
    fn test_changed_kerning_fails() {
        let fonts = vec![simple_font("1 0 R")];
        let mappings = [(FontHandle(0), mapping(&[(65, 66), (66, 65)]))].into_iter().collect();
        let result = validate_stream(
            "s",
            b"/F1 1 Tf [(AB) 10 (A)] TJ",
            b"/F1 1 Tf [(BA) 20 (B)] TJ",
            &TextState::default(),
            &resources(),
            &fonts,
            &mappings,
        );
        assert!(matches!(result, Err(ScrambleError::ConsistencyViolation { .. })));
    }

    #[test]
    fn test_wrong_code_fails() {
        let fonts = vec![simple_font("1 0 R")];
        let mappings = [(FontHandle(0), mapping(&[(65, 66)]))].into_iter().collect();
        let result = validate_stream(
            "s",
            b"/F1 1 Tf (A) Tj",
            b"/F1 1 Tf (C) Tj",
            &TextState::default(),
            &resources(),
            &fonts,
            &mappings,
        );
        assert!(result.is_err());
    }
}
