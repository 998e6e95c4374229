//! Content stream rewriter
//!
//! Replaces the code bytes of text operands and nothing else. Hex operands
//! keep their exact length and layout; literal operands are respelled in
//! place whenever each new byte fits the source width of the byte it
//! replaces. Otherwise the operand is respelled whole and padded back to
//! its source length with line continuations; only a string that cannot fit
//! at all is re-emitted at a new length.

use std::collections::BTreeMap;

use tracing::trace;

use crate::codespace::{Code, Codespace};
use crate::content::{self, ByteSource, PdfString, StringSyntax, TextState};
use crate::document::ContentStream;
use crate::error::ScrambleError;
use crate::font::{Font, FontHandle};
use crate::permute::CodeMapping;

/// New bytes of a stream that changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewrittenStream {
    pub bytes: Vec<u8>,
    pub changed_operands: usize,
    /// Operands that could not keep their source length
    pub resized_operands: usize,
}

/// Rewrite the text operands of `stream`. Returns `None` when no operand
/// changes. Fails, leaving the stream to the caller untouched, when the
/// stream does not parse or a string does not decode.
pub fn rewrite_stream(
    stream: &ContentStream,
    entry: &TextState,
    fonts: &[Font],
    mappings: &BTreeMap<FontHandle, CodeMapping>,
) -> Result<Option<RewrittenStream>, ScrambleError> {
    let fail = |offset: usize, reason: String| ScrambleError::StreamTokenization {
        stream: stream.label.clone(),
        offset,
        reason,
    };
    let source = stream.bytes.as_slice();
    let parsed = content::parse(source, entry).map_err(|e| fail(e.offset(), e.reason().to_string()))?;

    let mut replacements: Vec<(std::ops::Range<usize>, Vec<u8>)> = Vec::new();
    let mut resized_operands = 0;

    for operand in &parsed.text_operands {
        let span = parsed.tokens[operand.token].span.clone();
        let handle = stream.fonts.get(&operand.font).ok_or_else(|| {
            fail(
                span.start,
                format!("font resource /{} not found", String::from_utf8_lossy(&operand.font)),
            )
        })?;
        let Some(mapping) = mappings.get(handle) else {
            continue;
        };
        let font = &fonts[handle.0];
        let string = parsed.string(operand);
        let codes = font
            .codespace
            .decode(&string.bytes)
            .map_err(|e| fail(span.start, format!("{} for font {}", e, font.label)))?;
        let new_codes: Vec<Code> = codes.iter().map(|c| mapping.map(*c)).collect();
        if new_codes == codes {
            continue;
        }
        let new_bytes = Codespace::encode(&new_codes);

        let (spelled, resized) = respell(&source[span.clone()], span.start, string, &new_bytes);
        if resized {
            resized_operands += 1;
        }
        trace!(stream = %stream.label, offset = span.start, resized, "rewrote operand");
        replacements.push((span, spelled));
    }

    if replacements.is_empty() {
        return Ok(None);
    }

    let changed_operands = replacements.len();
    let mut bytes = Vec::with_capacity(source.len());
    let mut pos = 0;
    for (span, spelled) in replacements {
        bytes.extend_from_slice(&source[pos..span.start]);
        bytes.extend_from_slice(&spelled);
        pos = span.end;
    }
    bytes.extend_from_slice(&source[pos..]);

    Ok(Some(RewrittenStream {
        bytes,
        changed_operands,
        resized_operands,
    }))
}

/// Spell `new` in place of the string token `token` (starting at `start`).
/// Returns the new token bytes and whether the length changed.
fn respell(token: &[u8], start: usize, string: &PdfString, new: &[u8]) -> (Vec<u8>, bool) {
    let in_place = match string.syntax {
        StringSyntax::Hex => respell_hex(token, start, string, new),
        StringSyntax::Literal => respell_literal(token, start, string, new),
    };
    match in_place {
        Some(bytes) => (bytes, false),
        None => {
            let bytes = match string.syntax {
                StringSyntax::Hex => emit_hex(new),
                StringSyntax::Literal => fit_literal(new, token.len()).unwrap_or_else(|| emit_literal(new)),
            };
            let resized = bytes.len() != token.len();
            (bytes, resized)
        }
    }
}

fn respell_hex(token: &[u8], start: usize, string: &PdfString, new: &[u8]) -> Option<Vec<u8>> {
    let lowercase = token.iter().any(|b| matches!(b, b'a'..=b'f'));
    let digit = |nibble: u8| {
        let d = b"0123456789ABCDEF"[nibble as usize];
        if lowercase {
            d.to_ascii_lowercase()
        } else {
            d
        }
    };

    let mut out = token.to_vec();
    for (source, &byte) in string.sources.iter().zip(new) {
        let ByteSource::Hex { high, low } = *source else {
            return None;
        };
        out[high - start] = digit(byte >> 4);
        match low {
            Some(low) => out[low - start] = digit(byte & 0x0F),
            // A trailing odd digit implies a zero low nibble
            None if byte & 0x0F != 0 => return None,
            None => {}
        }
    }
    Some(out)
}

fn respell_literal(token: &[u8], start: usize, string: &PdfString, new: &[u8]) -> Option<Vec<u8>> {
    let mut out = token.to_vec();
    // Right to left, so each byte sees the final spelling of its successor
    for (i, source) in string.sources.iter().enumerate().rev() {
        let ByteSource::Literal(range) = source else {
            return None;
        };
        let local = (range.start - start)..(range.end - start);
        let next = out.get(local.end).copied();
        let current = &token[local.clone()];

        if new[i] == string.bytes[i] && spelling_survives(current, next) {
            continue;
        }
        let spelled = spell(new[i], local.len(), next)?;
        out[local].copy_from_slice(&spelled);
    }
    Some(out)
}

/// Whether an unchanged byte's original spelling still decodes to the same
/// byte given the (possibly new) character that follows it.
fn spelling_survives(spelling: &[u8], next: Option<u8>) -> bool {
    match spelling {
        // Raw parentheses pair with each other; a changed partner breaks them
        [b'(' | b')'] => false,
        [b'\\', d, ..] if is_octal(*d) => spelling.len() == 4 || !next.is_some_and(is_octal),
        _ => true,
    }
}

/// Spell `byte` in exactly `width` source bytes, if possible
fn spell(byte: u8, width: usize, next: Option<u8>) -> Option<Vec<u8>> {
    let next_octal = next.is_some_and(is_octal);
    match width {
        1 => (!matches!(byte, b'(' | b')' | b'\\' | b'\r')).then(|| vec![byte]),
        2 => {
            let escaped = match byte {
                b'\n' => b'n',
                b'\r' => b'r',
                b'\t' => b't',
                0x08 => b'b',
                0x0C => b'f',
                b'(' | b')' | b'\\' => byte,
                _ if byte < 8 && !next_octal => b'0' + byte,
                // An unknown escape reads as the character itself
                _ if !b"nrtbf01234567\r\n".contains(&byte) => byte,
                _ => return None,
            };
            Some(vec![b'\\', escaped])
        }
        3 if byte < 64 && !next_octal => Some(format!("\\{:02o}", byte).into_bytes()),
        4 => Some(format!("\\{:03o}", byte).into_bytes()),
        _ => None,
    }
}

fn is_octal(byte: u8) -> bool {
    matches!(byte, b'0'..=b'7')
}

fn emit_hex(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len() * 2 + 2);
    out.push(b'<');
    for b in bytes {
        out.extend_from_slice(format!("{:02X}", b).as_bytes());
    }
    out.push(b'>');
    out
}

/// Spell `bytes` as a literal token of exactly `len` bytes. Spare room is
/// filled with line continuations, which decode to nothing.
fn fit_literal(bytes: &[u8], len: usize) -> Option<Vec<u8>> {
    let raw_parens = parens_balanced(bytes);
    let mut spellings: Vec<Vec<u8>> = bytes
        .iter()
        .map(|&b| match b {
            b'(' | b')' if raw_parens => vec![b],
            b'(' | b')' | b'\\' => vec![b'\\', b],
            b'\r' => b"\\r".to_vec(),
            _ => vec![b],
        })
        .collect();
    let minimal: usize = spellings.iter().map(Vec::len).sum::<usize>() + 2;
    let mut slack = len.checked_sub(minimal)?;

    if slack == 1 {
        widen_by_one(bytes, &mut spellings)?;
        slack = 0;
    }

    let mut out = Vec::with_capacity(len);
    out.push(b'(');
    for spelling in &spellings {
        out.extend_from_slice(spelling);
    }
    if slack % 2 == 1 {
        out.extend_from_slice(b"\\\r\n");
        slack -= 3;
    }
    for _ in 0..slack / 2 {
        out.extend_from_slice(b"\\\n");
    }
    out.push(b')');
    Some(out)
}

/// Lengthen one spelling by a single byte
fn widen_by_one(bytes: &[u8], spellings: &mut [Vec<u8>]) -> Option<()> {
    // An unknown escape reads as the character itself
    if let Some(i) = bytes.iter().position(|b| !b"nrtbf01234567\r\n()\\".contains(b)) {
        spellings[i] = vec![b'\\', bytes[i]];
        return Some(());
    }
    // A two-byte escape of a small byte becomes a two-digit octal escape
    let i = (0..bytes.len()).find(|&i| {
        let next = spellings.get(i + 1).and_then(|s| s.first().copied());
        spellings[i].len() == 2 && bytes[i] < 64 && !next.is_some_and(is_octal)
    })?;
    spellings[i] = format!("\\{:02o}", bytes[i]).into_bytes();
    Some(())
}

/// Whether every parenthesis in `bytes` has a partner, so all can stay raw
fn parens_balanced(bytes: &[u8]) -> bool {
    let mut depth = 0usize;
    for &b in bytes {
        match b {
            b'(' => depth += 1,
            b')' => match depth.checked_sub(1) {
                Some(d) => depth = d,
                None => return false,
            },
            _ => {}
        }
    }
    depth == 0
}

fn emit_literal(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len() + 2);
    out.push(b'(');
    for &b in bytes {
        match b {
            b'(' | b')' | b'\\' => out.extend_from_slice(&[b'\\', b]),
            b'\r' => out.extend_from_slice(b"\\r"),
            _ => out.push(b),
        }
    }
    out.push(b')');
    out
}
