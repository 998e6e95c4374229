//! Character codes and codespace ranges
//!
//! A font's codespace decides how the bytes of a string operand split into
//! character codes. Simple fonts always use one byte per code; composite
//! fonts declare one or more `codespacerange` entries of 1 to 4 bytes each,
//! and a single string may mix widths.

use std::collections::BTreeSet;
use std::fmt;

use thiserror::Error;

/// A character code together with the number of bytes it occupies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Code {
    /// Byte width of the code (1 to 4)
    pub width: u8,
    /// Big-endian numeric value
    pub value: u32,
}

impl Code {
    pub fn new(value: u32, width: u8) -> Self {
        Self { width, value }
    }

    /// A one-byte code
    pub fn single(byte: u8) -> Self {
        Self { width: 1, value: byte as u32 }
    }

    /// Interpret up to four bytes as a big-endian code
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let value = bytes.iter().fold(0u32, |acc, &b| (acc << 8) | b as u32);
        Self { width: bytes.len() as u8, value }
    }

    /// Encode the code at its own width
    pub fn to_bytes(&self) -> Vec<u8> {
        (0..self.width)
            .rev()
            .map(|i| (self.value >> (8 * i as u32)) as u8)
            .collect()
    }

    /// Uppercase hex digits, two per byte
    pub fn to_hex(&self) -> String {
        self.to_bytes().iter().map(|b| format!("{:02X}", b)).collect()
    }

    /// Parse hex digits (two per byte, at most four bytes)
    pub fn parse_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim();
        if hex.is_empty() || hex.len() % 2 != 0 || hex.len() > 8 {
            return None;
        }
        let value = u32::from_str_radix(hex, 16).ok()?;
        Some(Self { width: (hex.len() / 2) as u8, value })
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.to_hex())
    }
}

/// One `codespacerange` entry: a byte-wise rectangle of codes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodespaceRange {
    low: Vec<u8>,
    high: Vec<u8>,
}

impl CodespaceRange {
    /// Build a range; bounds must have the same length (1 to 4) and be
    /// ordered byte by byte.
    pub fn new(low: Vec<u8>, high: Vec<u8>) -> Option<Self> {
        if low.is_empty() || low.len() > 4 || low.len() != high.len() {
            return None;
        }
        if low.iter().zip(&high).any(|(l, h)| l > h) {
            return None;
        }
        Some(Self { low, high })
    }

    pub fn width(&self) -> u8 {
        self.low.len() as u8
    }

    pub fn low(&self) -> Code {
        Code::from_bytes(&self.low)
    }

    pub fn high(&self) -> Code {
        Code::from_bytes(&self.high)
    }

    /// Whether the byte sequence lies inside this range
    pub fn contains(&self, bytes: &[u8]) -> bool {
        bytes.len() == self.low.len()
            && bytes
                .iter()
                .zip(self.low.iter().zip(&self.high))
                .all(|(b, (l, h))| l <= b && b <= h)
    }

    pub fn contains_code(&self, code: Code) -> bool {
        code.width == self.width() && self.contains(&code.to_bytes())
    }

    /// Number of codes in the range
    pub fn len(&self) -> u64 {
        self.low
            .iter()
            .zip(&self.high)
            .map(|(l, h)| (*h as u64) - (*l as u64) + 1)
            .product()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Enumerate codes in ascending order
    pub fn codes(&self) -> impl Iterator<Item = Code> + '_ {
        let mut current = Some(self.low.clone());
        std::iter::from_fn(move || {
            let bytes = current.take()?;
            let code = Code::from_bytes(&bytes);
            // Odometer step, least significant byte first
            let mut next = bytes;
            for i in (0..next.len()).rev() {
                if next[i] < self.high[i] {
                    next[i] += 1;
                    current = Some(next);
                    break;
                }
                next[i] = self.low[i];
            }
            Some(code)
        })
    }
}

/// Why a byte sequence could not be split into codes
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("no codespace range matches bytes at string offset {offset}")]
pub struct CodespaceError {
    /// Offset of the first unmatched byte within the string
    pub offset: usize,
}

/// The full codespace of a font
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Codespace {
    ranges: Vec<CodespaceRange>,
}

impl Codespace {
    pub fn new(ranges: Vec<CodespaceRange>) -> Self {
        Self { ranges }
    }

    /// `<00> <FF>`, used by every simple font
    pub fn single_byte() -> Self {
        Self::new(vec![CodespaceRange { low: vec![0x00], high: vec![0xFF] }])
    }

    /// `<0000> <FFFF>`, the codespace of Identity-H and Identity-V
    pub fn two_byte() -> Self {
        Self::new(vec![CodespaceRange {
            low: vec![0x00, 0x00],
            high: vec![0xFF, 0xFF],
        }])
    }

    pub fn ranges(&self) -> &[CodespaceRange] {
        &self.ranges
    }

    /// Distinct code widths declared by the ranges
    pub fn widths(&self) -> BTreeSet<u8> {
        self.ranges.iter().map(CodespaceRange::width).collect()
    }

    pub fn contains(&self, code: Code) -> bool {
        self.ranges.iter().any(|r| r.contains_code(code))
    }

    /// Total number of codes, counting overlapping ranges once per range
    pub fn size(&self) -> u64 {
        self.ranges.iter().map(CodespaceRange::len).sum()
    }

    /// Split a string operand into codes, shortest match first.
    pub fn decode(&self, bytes: &[u8]) -> Result<Vec<Code>, CodespaceError> {
        let mut codes = Vec::with_capacity(bytes.len());
        let mut pos = 0;
        while pos < bytes.len() {
            let matched = (1..=4usize).find(|&n| {
                pos + n <= bytes.len()
                    && self.ranges.iter().any(|r| r.contains(&bytes[pos..pos + n]))
            });
            match matched {
                Some(n) => {
                    codes.push(Code::from_bytes(&bytes[pos..pos + n]));
                    pos += n;
                }
                None => return Err(CodespaceError { offset: pos }),
            }
        }
        Ok(codes)
    }

    /// Encode a code sequence back to bytes
    pub fn encode(codes: &[Code]) -> Vec<u8> {
        codes.iter().flat_map(Code::to_bytes).collect()
    }

    /// Codes of the given width in ascending order, at most `limit` of them
    pub fn codes_of_width(&self, width: u8, limit: usize) -> Vec<Code> {
        let mut seen = BTreeSet::new();
        for range in self.ranges.iter().filter(|r| r.width() == width) {
            for code in range.codes() {
                if seen.len() >= limit {
                    break;
                }
                seen.insert(code);
            }
        }
        seen.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(low: &[u8], high: &[u8]) -> CodespaceRange {
        CodespaceRange::new(low.to_vec(), high.to_vec()).unwrap()
    }

    #[test]
    fn test_code_hex_round_trip() {
        let code = Code::new(0x0041, 2);
        assert_eq!(code.to_hex(), "0041");
        assert_eq!(Code::parse_hex("0041"), Some(code));
        assert_eq!(Code::parse_hex("041"), None);
        assert_eq!(code.to_string(), "<0041>");
    }

    #[test]
    fn test_width_is_part_of_identity() {
        assert_ne!(Code::new(0x41, 1), Code::new(0x41, 2));
    }

    #[test]
    fn test_decode_mixed_width_codespace() {
        // Shift-JIS style: single bytes 00-80, double bytes 81-9F xx
        let cs = Codespace::new(vec![range(&[0x00], &[0x80]), range(&[0x81, 0x40], &[0x9F, 0xFC])]);
        let codes = cs.decode(&[0x41, 0x81, 0x40, 0x42]).unwrap();
        assert_eq!(
            codes,
            vec![Code::new(0x41, 1), Code::new(0x8140, 2), Code::new(0x42, 1)]
        );
    }

    #[test]
    fn test_decode_reports_offset_of_bad_byte() {
        let cs = Codespace::new(vec![range(&[0x00], &[0x7F])]);
        let err = cs.decode(&[0x41, 0xF0]).unwrap_err();
        assert_eq!(err.offset, 1);
    }

    #[test]
    fn test_decode_truncated_two_byte_code() {
        let cs = Codespace::two_byte();
        assert!(cs.decode(&[0x00, 0x41, 0x00]).is_err());
    }

    #[test]
    fn test_range_enumeration_is_rectangular() {
        let r = range(&[0x10, 0x20], &[0x11, 0x21]);
        let codes: Vec<_> = r.codes().collect();
        assert_eq!(r.len(), 4);
        assert_eq!(
            codes,
            vec![
                Code::new(0x1020, 2),
                Code::new(0x1021, 2),
                Code::new(0x1120, 2),
                Code::new(0x1121, 2),
            ]
        );
        assert!(!r.contains(&[0x10, 0x22]));
    }

    #[test]
    fn test_codes_of_width_respects_limit() {
        let cs = Codespace::two_byte();
        assert_eq!(cs.codes_of_width(2, 10).len(), 10);
        assert!(cs.codes_of_width(1, 10).is_empty());
    }

    #[test]
    fn test_invalid_ranges_rejected() {
        assert!(CodespaceRange::new(vec![0x10], vec![0x00]).is_none());
        assert!(CodespaceRange::new(vec![0x00], vec![0x00, 0xFF]).is_none());
        assert!(CodespaceRange::new(vec![], vec![]).is_none());
    }
}
