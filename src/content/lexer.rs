//! Span-preserving lexer for content streams and CMap programs
//!
//! Every token remembers the byte range it was read from, and every byte of
//! a string operand remembers where it was spelled in the source. The
//! rewriter needs both to replace code bytes without touching anything else.

use std::ops::Range;

use thiserror::Error;

/// Source spelling of one decoded string byte
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ByteSource {
    /// Literal-string byte spelled by the given source bytes
    /// (a plain character, an escape, an octal escape or a raw end-of-line)
    Literal(Range<usize>),
    /// Hex-string byte; positions of its high and (optional) low digit
    Hex { high: usize, low: Option<usize> },
}

impl ByteSource {
    /// First source offset of the byte
    pub fn start(&self) -> usize {
        match self {
            ByteSource::Literal(span) => span.start,
            ByteSource::Hex { high, .. } => *high,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringSyntax {
    Literal,
    Hex,
}

/// A decoded string operand
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfString {
    pub syntax: StringSyntax,
    pub bytes: Vec<u8>,
    pub sources: Vec<ByteSource>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    Name(Vec<u8>),
    Operator(Vec<u8>),
    String(PdfString),
    ArrayStart,
    ArrayEnd,
    DictStart,
    DictEnd,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Range<usize>,
}

impl Token {
    pub fn as_string(&self) -> Option<&PdfString> {
        match &self.kind {
            TokenKind::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_name(&self) -> Option<&[u8]> {
        match &self.kind {
            TokenKind::Name(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self.kind {
            TokenKind::Integer(i) => Some(i as f64),
            TokenKind::Real(r) => Some(r),
            _ => None,
        }
    }
}

/// Lexical error with the offset where it was detected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} at byte {offset}")]
pub struct LexError {
    pub offset: usize,
    pub message: String,
}

pub struct Lexer<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a [u8]) -> Self {
        Self { input, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    /// Lex the whole input
    pub fn tokenize(input: &'a [u8]) -> Result<Vec<Token>, LexError> {
        Lexer::new(input).collect()
    }

    fn error(&self, offset: usize, message: &str) -> LexError {
        LexError {
            offset,
            message: message.to_string(),
        }
    }

    pub fn next_token(&mut self) -> Option<Result<Token, LexError>> {
        self.skip_whitespace_and_comments();
        if self.pos >= self.input.len() {
            return None;
        }

        let start = self.pos;
        let byte = self.input[self.pos];
        self.pos += 1;
        let kind = match byte {
            b'[' => Ok(TokenKind::ArrayStart),
            b']' => Ok(TokenKind::ArrayEnd),
            b'<' if self.peek() == Some(b'<') => {
                self.pos += 1;
                Ok(TokenKind::DictStart)
            }
            b'>' if self.peek() == Some(b'>') => {
                self.pos += 1;
                Ok(TokenKind::DictEnd)
            }
            b'(' => self.read_literal_string(start).map(TokenKind::String),
            b'<' => self.read_hex_string(start).map(TokenKind::String),
            b'/' => Ok(TokenKind::Name(self.read_regular())),
            b'{' | b'}' => Ok(TokenKind::Operator(vec![byte])),
            b')' => Err(self.error(start, "unbalanced ')'")),
            b'>' => Err(self.error(start, "unexpected '>'")),
            b'+' | b'-' | b'.' | b'0'..=b'9' => {
                self.pos = start;
                Ok(self.read_number())
            }
            _ => {
                self.pos = start;
                let word = self.read_regular();
                let kind = match word.as_slice() {
                    b"true" => TokenKind::Boolean(true),
                    b"false" => TokenKind::Boolean(false),
                    b"null" => TokenKind::Null,
                    _ => TokenKind::Operator(word),
                };
                if kind == TokenKind::Operator(b"ID".to_vec()) {
                    self.skip_inline_image_data();
                }
                Ok(kind)
            }
        };

        Some(kind.map(|kind| Token {
            kind,
            span: start..self.pos,
        }))
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            while self.pos < self.input.len() && is_whitespace(self.input[self.pos]) {
                self.pos += 1;
            }
            if self.peek() == Some(b'%') {
                while self.pos < self.input.len()
                    && self.input[self.pos] != b'\n'
                    && self.input[self.pos] != b'\r'
                {
                    self.pos += 1;
                }
                continue;
            }
            break;
        }
    }

    fn read_regular(&mut self) -> Vec<u8> {
        let start = self.pos;
        while self.pos < self.input.len() && is_regular(self.input[self.pos]) {
            self.pos += 1;
        }
        self.input[start..self.pos].to_vec()
    }

    fn read_number(&mut self) -> TokenKind {
        let word = self.read_regular();
        let text = String::from_utf8_lossy(&word);
        if let Ok(i) = text.parse::<i64>() {
            return TokenKind::Integer(i);
        }
        // Producers emit oddities like "4." or "-.5"; anything unparsable
        // still round-trips through its span, the value is informational.
        TokenKind::Real(text.parse::<f64>().unwrap_or(0.0))
    }

    fn read_literal_string(&mut self, start: usize) -> Result<PdfString, LexError> {
        let mut bytes = Vec::new();
        let mut sources = Vec::new();
        let mut depth = 1;

        loop {
            let Some(byte) = self.peek() else {
                return Err(self.error(start, "unterminated literal string"));
            };
            let piece_start = self.pos;
            self.pos += 1;
            match byte {
                b'\\' => {
                    let Some(next) = self.peek() else {
                        return Err(self.error(start, "unterminated literal string"));
                    };
                    self.pos += 1;
                    let decoded = match next {
                        b'n' => Some(b'\n'),
                        b'r' => Some(b'\r'),
                        b't' => Some(b'\t'),
                        b'b' => Some(0x08),
                        b'f' => Some(0x0C),
                        b'(' | b')' | b'\\' => Some(next),
                        b'\r' => {
                            if self.peek() == Some(b'\n') {
                                self.pos += 1;
                            }
                            None
                        }
                        b'\n' => None,
                        b'0'..=b'7' => {
                            let mut value = (next - b'0') as u16;
                            for _ in 0..2 {
                                match self.peek() {
                                    Some(d @ b'0'..=b'7') => {
                                        self.pos += 1;
                                        value = (value << 3) | (d - b'0') as u16;
                                    }
                                    _ => break,
                                }
                            }
                            Some((value & 0xFF) as u8)
                        }
                        other => Some(other),
                    };
                    if let Some(b) = decoded {
                        bytes.push(b);
                        sources.push(ByteSource::Literal(piece_start..self.pos));
                    }
                }
                b'\r' => {
                    // A raw end-of-line of any kind reads as a single LF
                    if self.peek() == Some(b'\n') {
                        self.pos += 1;
                    }
                    bytes.push(b'\n');
                    sources.push(ByteSource::Literal(piece_start..self.pos));
                }
                b'(' => {
                    depth += 1;
                    bytes.push(byte);
                    sources.push(ByteSource::Literal(piece_start..self.pos));
                }
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                    bytes.push(byte);
                    sources.push(ByteSource::Literal(piece_start..self.pos));
                }
                _ => {
                    bytes.push(byte);
                    sources.push(ByteSource::Literal(piece_start..self.pos));
                }
            }
        }

        Ok(PdfString {
            syntax: StringSyntax::Literal,
            bytes,
            sources,
        })
    }

    fn read_hex_string(&mut self, start: usize) -> Result<PdfString, LexError> {
        let mut bytes = Vec::new();
        let mut sources = Vec::new();
        let mut pending: Option<(u8, usize)> = None;

        loop {
            let Some(byte) = self.peek() else {
                return Err(self.error(start, "unterminated hex string"));
            };
            let at = self.pos;
            self.pos += 1;
            if byte == b'>' {
                break;
            }
            if is_whitespace(byte) {
                continue;
            }
            let Some(nibble) = hex_nibble(byte) else {
                return Err(self.error(at, "invalid hex digit"));
            };
            match pending.take() {
                Some((high, high_at)) => {
                    bytes.push((high << 4) | nibble);
                    sources.push(ByteSource::Hex {
                        high: high_at,
                        low: Some(at),
                    });
                }
                None => pending = Some((nibble, at)),
            }
        }
        if let Some((high, high_at)) = pending {
            bytes.push(high << 4);
            sources.push(ByteSource::Hex {
                high: high_at,
                low: None,
            });
        }

        Ok(PdfString {
            syntax: StringSyntax::Hex,
            bytes,
            sources,
        })
    }

    fn skip_inline_image_data(&mut self) {
        // ID is followed by exactly one whitespace byte, then binary data
        // terminated by EI between whitespace/delimiters.
        if self.pos < self.input.len() && is_whitespace(self.input[self.pos]) {
            self.pos += 1;
        }
        let mut i = self.pos;
        while i + 1 < self.input.len() {
            if self.input[i] == b'E' && self.input[i + 1] == b'I' {
                let prev_ok = i > 0 && is_whitespace(self.input[i - 1]);
                let next_ok = i + 2 >= self.input.len()
                    || is_whitespace(self.input[i + 2])
                    || is_delim(self.input[i + 2]);
                if prev_ok && next_ok {
                    self.pos = i;
                    return;
                }
            }
            i += 1;
        }
        self.pos = self.input.len();
    }
}

impl Iterator for Lexer<'_> {
    type Item = Result<Token, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_token()
    }
}

pub fn is_whitespace(byte: u8) -> bool {
    matches!(byte, b'\x00' | b'\x09' | b'\x0a' | b'\x0c' | b'\x0d' | b' ')
}

pub fn is_delim(byte: u8) -> bool {
    matches!(
        byte,
        b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
    )
}

fn is_regular(byte: u8) -> bool {
    !(is_delim(byte) || is_whitespace(byte))
}

fn hex_nibble(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &[u8]) -> Vec<TokenKind> {
        Lexer::tokenize(input)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_operators_and_operands() {
        assert_eq!(
            kinds(b"/F1 12 Tf 1.5 TL"),
            vec![
                TokenKind::Name(b"F1".to_vec()),
                TokenKind::Integer(12),
                TokenKind::Operator(b"Tf".to_vec()),
                TokenKind::Real(1.5),
                TokenKind::Operator(b"TL".to_vec()),
            ]
        );
    }

    #[test]
    fn test_literal_string_records_escape_widths() {
        let tokens = Lexer::tokenize(b"(A\\(\\101\r\nB)").unwrap();
        let s = tokens[0].as_string().unwrap();
        assert_eq!(s.bytes, b"A(A\nB".to_vec());
        assert_eq!(
            s.sources,
            vec![
                ByteSource::Literal(1..2),
                ByteSource::Literal(2..4),
                ByteSource::Literal(4..8),
                ByteSource::Literal(8..10),
                ByteSource::Literal(10..11),
            ]
        );
        assert_eq!(tokens[0].span, 0..12);
    }

    #[test]
    fn test_line_continuation_yields_no_byte() {
        let tokens = Lexer::tokenize(b"(ab\\\ncd)").unwrap();
        let s = tokens[0].as_string().unwrap();
        assert_eq!(s.bytes, b"abcd".to_vec());
        assert_eq!(s.sources.len(), 4);
    }

    #[test]
    fn test_nested_parentheses() {
        let tokens = Lexer::tokenize(b"(a(b)c) Tj").unwrap();
        assert_eq!(tokens[0].as_string().unwrap().bytes, b"a(b)c".to_vec());
        assert_eq!(tokens[1].kind, TokenKind::Operator(b"Tj".to_vec()));
    }

    #[test]
    fn test_hex_string_with_whitespace_and_odd_digit() {
        let tokens = Lexer::tokenize(b"<00 4 1 7>").unwrap();
        let s = tokens[0].as_string().unwrap();
        assert_eq!(s.bytes, vec![0x00, 0x41, 0x70]);
        assert_eq!(s.sources[1], ByteSource::Hex { high: 4, low: Some(6) });
        assert_eq!(s.sources[2], ByteSource::Hex { high: 8, low: None });
    }

    #[test]
    fn test_dictionary_tokens() {
        assert_eq!(
            kinds(b"<</MCID 0>> BDC"),
            vec![
                TokenKind::DictStart,
                TokenKind::Name(b"MCID".to_vec()),
                TokenKind::Integer(0),
                TokenKind::DictEnd,
                TokenKind::Operator(b"BDC".to_vec()),
            ]
        );
    }

    #[test]
    fn test_unterminated_string_is_an_error() {
        let err = Lexer::tokenize(b"BT (abc Tj").unwrap_err();
        assert_eq!(err.offset, 3);
    }

    #[test]
    fn test_bad_hex_digit_is_an_error() {
        let err = Lexer::tokenize(b"<41zz> Tj").unwrap_err();
        assert_eq!(err.offset, 3);
    }

    #[test]
    fn test_inline_image_data_is_skipped() {
        let input = b"BI /W 1 /H 1 ID \xff(\x00EI Q";
        let ops: Vec<_> = kinds(input)
            .into_iter()
            .filter_map(|k| match k {
                TokenKind::Operator(op) => Some(op),
                _ => None,
            })
            .collect();
        assert_eq!(ops, vec![b"BI".to_vec(), b"ID".to_vec(), b"EI".to_vec(), b"Q".to_vec()]);
    }

    #[test]
    fn test_comments_are_skipped() {
        assert_eq!(
            kinds(b"% header\nq Q"),
            vec![
                TokenKind::Operator(b"q".to_vec()),
                TokenKind::Operator(b"Q".to_vec()),
            ]
        );
    }
}
