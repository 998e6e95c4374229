//! CMap programs: ToUnicode maps and CID encodings
//!
//! Parsing covers `codespacerange`, `bfchar`, `bfrange`, `cidchar` and
//! `cidrange` sections, which is everything embedded CMaps use in practice.
//! Writing produces minimal CMaps in the layout Acrobat emits.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use thiserror::Error;

use crate::codespace::{Code, Codespace, CodespaceRange};
use crate::content::lexer::{LexError, Lexer, Token, TokenKind};

/// Entries per `begin…`/`end…` block, the limit set by the CMap format
const BLOCK_SIZE: usize = 100;

/// Upper bound on codes materialized from ranges
const MAX_ENTRIES: usize = 1 << 20;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CMapError {
    #[error("CMap syntax error: {0}")]
    Lex(#[from] LexError),

    #[error("malformed CMap: {0}")]
    Malformed(String),

    #[error("CMap expands to too many codes")]
    TooLarge,
}

/// Registry/Ordering/Supplement of a CID-keyed font
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CidSystemInfo {
    pub registry: String,
    pub ordering: String,
    pub supplement: i64,
}

impl Default for CidSystemInfo {
    fn default() -> Self {
        Self {
            registry: "Adobe".to_string(),
            ordering: "Identity".to_string(),
            supplement: 0,
        }
    }
}

/// A parsed `/ToUnicode` map
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToUnicodeMap {
    /// Declared codespace, if the CMap had one
    pub codespace: Option<Codespace>,
    entries: BTreeMap<Code, String>,
}

impl ToUnicodeMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(data: &[u8]) -> Result<Self, CMapError> {
        let sections = Sections::parse(data)?;
        let mut entries = BTreeMap::new();

        for pair in sections.items("bfchar").chunks(2) {
            let [src, dst] = pair else {
                return Err(CMapError::Malformed("odd bfchar entry count".to_string()));
            };
            if let (Some(src), Some(dst)) = (hex_bytes(src), hex_bytes(dst)) {
                entries.insert(Code::from_bytes(src), utf16be_to_string(dst));
            }
        }

        let range_items = sections.items("bfrange");
        let mut i = 0;
        while i + 3 <= range_items.len() {
            let (Some(lo), Some(hi)) = (hex_bytes(&range_items[i]), hex_bytes(&range_items[i + 1]))
            else {
                return Err(CMapError::Malformed("bfrange bounds must be hex strings".to_string()));
            };
            let (lo, hi) = (Code::from_bytes(lo), Code::from_bytes(hi));
            if hi.value < lo.value || (hi.value - lo.value) as usize > MAX_ENTRIES {
                return Err(CMapError::TooLarge);
            }
            match &range_items[i + 2] {
                Item::Hex(dst) => {
                    let mut units = utf16_units(dst);
                    for value in lo.value..=hi.value {
                        entries.insert(Code::new(value, lo.width), String::from_utf16_lossy(&units));
                        if let Some(last) = units.last_mut() {
                            *last = last.wrapping_add(1);
                        }
                    }
                }
                Item::Array(dsts) => {
                    for (value, dst) in (lo.value..=hi.value).zip(dsts) {
                        entries.insert(Code::new(value, lo.width), utf16be_to_string(dst));
                    }
                }
                _ => {
                    return Err(CMapError::Malformed("bfrange destination".to_string()));
                }
            }
            i += 3;
        }

        Ok(Self {
            codespace: sections.codespace()?,
            entries,
        })
    }

    pub fn get(&self, code: Code) -> Option<&str> {
        self.entries.get(&code).map(String::as_str)
    }

    pub fn insert(&mut self, code: Code, text: String) {
        self.entries.insert(code, text);
    }

    pub fn remove(&mut self, code: Code) -> Option<String> {
        self.entries.remove(&code)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Code, &String)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize as a `bfchar` CMap over the given codespace
    pub fn write(&self, codespace: &Codespace) -> Vec<u8> {
        let mut out = String::new();
        out.push_str("/CIDInit /ProcSet findresource begin\n12 dict begin\nbegincmap\n");
        out.push_str("/CIDSystemInfo\n<< /Registry (Adobe)\n/Ordering (UCS)\n/Supplement 0\n>> def\n");
        out.push_str("/CMapName /Adobe-Identity-UCS def\n/CMapType 2 def\n");
        write_codespace(&mut out, codespace);

        let entries: Vec<_> = self.entries.iter().filter(|(_, text)| !text.is_empty()).collect();
        for block in entries.chunks(BLOCK_SIZE) {
            let _ = writeln!(out, "{} beginbfchar", block.len());
            for (code, text) in block {
                let _ = writeln!(out, "<{}> <{}>", code.to_hex(), string_to_utf16be_hex(text));
            }
            out.push_str("endbfchar\n");
        }

        out.push_str("endcmap\nCMapName currentdict /CMap defineresource pop\nend\nend\n");
        out.into_bytes()
    }
}

/// A parsed CID encoding CMap (the `/Encoding` stream of a Type0 font)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CidCMap {
    pub name: Option<String>,
    pub codespace: Codespace,
    pub mappings: BTreeMap<Code, u32>,
    pub wmode: u8,
    /// Name of a parent CMap pulled in with `usecmap`
    pub parent: Option<String>,
}

impl CidCMap {
    pub fn parse(data: &[u8]) -> Result<Self, CMapError> {
        let sections = Sections::parse(data)?;
        let mut mappings = BTreeMap::new();

        for pair in sections.items("cidchar").chunks(2) {
            let [Item::Hex(src), Item::Int(cid)] = pair else {
                return Err(CMapError::Malformed("cidchar entry".to_string()));
            };
            mappings.insert(Code::from_bytes(src), *cid as u32);
        }

        for triple in sections.items("cidrange").chunks(3) {
            let [Item::Hex(lo), Item::Hex(hi), Item::Int(cid)] = triple else {
                return Err(CMapError::Malformed("cidrange entry".to_string()));
            };
            let (lo, hi) = (Code::from_bytes(lo), Code::from_bytes(hi));
            if hi.value < lo.value {
                return Err(CMapError::Malformed("inverted cidrange".to_string()));
            }
            if mappings.len() + (hi.value - lo.value) as usize > MAX_ENTRIES {
                return Err(CMapError::TooLarge);
            }
            for (offset, value) in (lo.value..=hi.value).enumerate() {
                mappings.insert(Code::new(value, lo.width), *cid as u32 + offset as u32);
            }
        }

        let codespace = sections
            .codespace()?
            .ok_or_else(|| CMapError::Malformed("no codespacerange".to_string()))?;

        Ok(Self {
            name: sections.cmap_name.clone(),
            codespace,
            mappings,
            wmode: sections.wmode,
            parent: sections.parent.clone(),
        })
    }

    /// Serialize `code → CID` pairs as an embedded CMap. Consecutive codes
    /// differing only in their last byte and mapping to consecutive CIDs
    /// collapse into `cidrange` entries.
    pub fn write<I>(name: &str, info: &CidSystemInfo, codespace: &Codespace, wmode: u8, mappings: I) -> Vec<u8>
    where
        I: IntoIterator<Item = (Code, u32)>,
    {
        let mut ranges: Vec<(Code, Code, u32)> = Vec::new();
        for (code, cid) in mappings {
            if let Some((lo, hi, start)) = ranges.last_mut() {
                let extends = code.width == hi.width
                    && code.value == hi.value + 1
                    && code.value >> 8 == lo.value >> 8
                    && cid == *start + (code.value - lo.value);
                if extends {
                    *hi = code;
                    continue;
                }
            }
            ranges.push((code, code, cid));
        }

        let mut out = String::new();
        out.push_str("%!PS-Adobe-3.0 Resource-CMap\n%%DocumentNeededResources: procset CIDInit\n");
        out.push_str("%%IncludeResource: procset CIDInit\n");
        let _ = writeln!(out, "%%BeginResource: CMap {}", name);
        out.push_str("/CIDInit /ProcSet findresource begin\n12 dict begin\nbegincmap\n");
        let _ = writeln!(
            out,
            "/CIDSystemInfo 3 dict dup begin\n  /Registry ({}) def\n  /Ordering ({}) def\n  /Supplement {} def\nend def",
            escape_literal(&info.registry),
            escape_literal(&info.ordering),
            info.supplement
        );
        let _ = writeln!(out, "/CMapName /{} def\n/CMapVersion 1 def\n/CMapType 1 def\n/WMode {} def", name, wmode);
        write_codespace(&mut out, codespace);

        let (singles, spans): (Vec<_>, Vec<_>) = ranges.into_iter().partition(|(lo, hi, _)| lo == hi);
        for block in spans.chunks(BLOCK_SIZE) {
            let _ = writeln!(out, "{} begincidrange", block.len());
            for (lo, hi, cid) in block {
                let _ = writeln!(out, "<{}> <{}> {}", lo.to_hex(), hi.to_hex(), cid);
            }
            out.push_str("endcidrange\n");
        }
        for block in singles.chunks(BLOCK_SIZE) {
            let _ = writeln!(out, "{} begincidchar", block.len());
            for (code, _, cid) in block {
                let _ = writeln!(out, "<{}> {}", code.to_hex(), cid);
            }
            out.push_str("endcidchar\n");
        }

        out.push_str("endcmap\nCMapName currentdict /CMap defineresource pop\nend\nend\n%%EndResource\n%%EOF\n");
        out.into_bytes()
    }
}

fn write_codespace(out: &mut String, codespace: &Codespace) {
    let ranges = codespace.ranges();
    for block in ranges.chunks(BLOCK_SIZE) {
        let _ = writeln!(out, "{} begincodespacerange", block.len());
        for range in block {
            let _ = writeln!(out, "<{}> <{}>", range.low().to_hex(), range.high().to_hex());
        }
        out.push_str("endcodespacerange\n");
    }
}

/// Operand of a CMap section entry
#[derive(Debug, Clone, PartialEq)]
enum Item {
    Hex(Vec<u8>),
    Int(i64),
    Name,
    Array(Vec<Vec<u8>>),
}

fn hex_bytes(item: &Item) -> Option<&[u8]> {
    match item {
        Item::Hex(b) => Some(b),
        _ => None,
    }
}

/// Section operands of a CMap, grouped by section keyword
#[derive(Debug, Default)]
struct Sections {
    items: BTreeMap<&'static str, Vec<Item>>,
    cmap_name: Option<String>,
    wmode: u8,
    parent: Option<String>,
}

const SECTION_NAMES: [&str; 5] = ["codespacerange", "bfchar", "bfrange", "cidchar", "cidrange"];

impl Sections {
    fn parse(data: &[u8]) -> Result<Self, CMapError> {
        let tokens = Lexer::tokenize(data)?;
        let mut sections = Sections::default();
        let mut current: Option<&'static str> = None;
        let mut array: Option<Vec<Vec<u8>>> = None;

        for (i, token) in tokens.iter().enumerate() {
            match &token.kind {
                TokenKind::Operator(op) => {
                    let op = String::from_utf8_lossy(op);
                    if let Some(name) = op.strip_prefix("begin").and_then(section_name) {
                        current = Some(name);
                    } else if op.starts_with("end") && current.is_some() {
                        current = None;
                    } else if op == "usecmap" {
                        sections.parent = previous_name(&tokens, i);
                    } else if op == "def" {
                        // "/CMapName /Foo def" and "/WMode 1 def"
                        if i >= 2 {
                            match (tokens[i - 2].as_name(), &tokens[i - 1].kind) {
                                (Some(b"CMapName"), TokenKind::Name(n)) => {
                                    sections.cmap_name = Some(String::from_utf8_lossy(n).into_owned());
                                }
                                (Some(b"WMode"), TokenKind::Integer(w)) => {
                                    sections.wmode = (*w).clamp(0, 1) as u8;
                                }
                                _ => {}
                            }
                        }
                    }
                }
                _ if current.is_none() => {}
                TokenKind::ArrayStart => array = Some(Vec::new()),
                TokenKind::ArrayEnd => {
                    if let (Some(section), Some(values)) = (current, array.take()) {
                        sections.items.entry(section).or_default().push(Item::Array(values));
                    }
                }
                kind => {
                    let Some(section) = current else { continue };
                    if let Some(values) = array.as_mut() {
                        if let TokenKind::String(s) = kind {
                            values.push(s.bytes.clone());
                        }
                        continue;
                    }
                    let item = match kind {
                        TokenKind::String(s) => Item::Hex(s.bytes.clone()),
                        TokenKind::Integer(n) => Item::Int(*n),
                        TokenKind::Name(_) => Item::Name,
                        _ => continue,
                    };
                    sections.items.entry(section).or_default().push(item);
                }
            }
        }

        Ok(sections)
    }

    fn items(&self, section: &str) -> &[Item] {
        self.items.get(section).map(Vec::as_slice).unwrap_or(&[])
    }

    fn codespace(&self) -> Result<Option<Codespace>, CMapError> {
        let items = self.items("codespacerange");
        if items.is_empty() {
            return Ok(None);
        }
        let mut ranges = Vec::new();
        for pair in items.chunks(2) {
            let [Item::Hex(lo), Item::Hex(hi)] = pair else {
                return Err(CMapError::Malformed("codespacerange entry".to_string()));
            };
            let range = CodespaceRange::new(lo.clone(), hi.clone())
                .ok_or_else(|| CMapError::Malformed("invalid codespace range".to_string()))?;
            ranges.push(range);
        }
        Ok(Some(Codespace::new(ranges)))
    }
}

fn section_name(name: &str) -> Option<&'static str> {
    SECTION_NAMES.iter().copied().find(|s| *s == name)
}

fn previous_name(tokens: &[Token], i: usize) -> Option<String> {
    tokens[..i]
        .iter()
        .rev()
        .find_map(Token::as_name)
        .map(|n| String::from_utf8_lossy(n).into_owned())
}

fn utf16_units(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks(2)
        .map(|pair| match pair {
            [hi, lo] => u16::from_be_bytes([*hi, *lo]),
            [single] => *single as u16,
            _ => 0,
        })
        .collect()
}

fn utf16be_to_string(bytes: &[u8]) -> String {
    String::from_utf16_lossy(&utf16_units(bytes))
}

fn string_to_utf16be_hex(text: &str) -> String {
    text.encode_utf16().map(|u| format!("{:04X}", u)).collect()
}

fn escape_literal(text: &str) -> String {
    text.replace('\\', "\\\\").replace('(', "\\(").replace(')', "\\)")
}
