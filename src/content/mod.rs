//! Content stream parsing
//!
//! Finds the string operands of text-showing operators (`Tj`, `TJ`, `'`,
//! `"`) and the font resource selected when each is shown. Font selection
//! follows `Tf` and the `q`/`Q` graphics-state stack.

pub mod lexer;

use thiserror::Error;

pub use lexer::{ByteSource, LexError, Lexer, PdfString, StringSyntax, Token, TokenKind};

/// Text-showing operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextOperator {
    /// `Tj`
    Show,
    /// `TJ`, with kerning numbers between strings
    ShowArray,
    /// `'`
    NextLineShow,
    /// `"`
    SpacingShow,
}

impl TextOperator {
    fn from_operator(op: &[u8]) -> Option<Self> {
        match op {
            b"Tj" => Some(TextOperator::Show),
            b"TJ" => Some(TextOperator::ShowArray),
            b"'" => Some(TextOperator::NextLineShow),
            b"\"" => Some(TextOperator::SpacingShow),
            _ => None,
        }
    }
}

/// Font selection carried through a stream and across the streams of a page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextState {
    /// Resource name of the selected font
    pub font: Option<Vec<u8>>,
    saved: Vec<Option<Vec<u8>>>,
}

impl TextState {
    pub fn with_font(name: &[u8]) -> Self {
        Self {
            font: Some(name.to_vec()),
            saved: Vec::new(),
        }
    }
}

/// A string shown by a text operator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextOperand {
    /// Index of the string token in [`ParsedContent::tokens`]
    pub token: usize,
    pub operator: TextOperator,
    /// Font resource name in effect
    pub font: Vec<u8>,
}

/// Why a content stream could not be parsed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContentError {
    #[error(transparent)]
    Lex(#[from] LexError),

    #[error("{reason} at byte {offset}")]
    Operator { offset: usize, reason: String },
}

impl ContentError {
    /// Byte offset in the stream where parsing stopped
    pub fn offset(&self) -> usize {
        match self {
            ContentError::Lex(e) => e.offset,
            ContentError::Operator { offset, .. } => *offset,
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            ContentError::Lex(e) => &e.message,
            ContentError::Operator { reason, .. } => reason,
        }
    }
}

/// Tokens of a stream plus the text operands found among them
#[derive(Debug, Clone)]
pub struct ParsedContent {
    pub tokens: Vec<Token>,
    pub text_operands: Vec<TextOperand>,
    /// Font selection after the last operator
    pub exit_state: TextState,
}

impl ParsedContent {
    pub fn string(&self, operand: &TextOperand) -> &PdfString {
        match &self.tokens[operand.token].kind {
            TokenKind::String(s) => s,
            _ => unreachable!("text operand always indexes a string token"),
        }
    }

    /// Number of operator tokens
    pub fn operator_count(&self) -> usize {
        self.tokens
            .iter()
            .filter(|t| matches!(t.kind, TokenKind::Operator(_)))
            .count()
    }

    /// The stream bytes with every text operand cut out, one `None` marker
    /// per operand. Two streams with equal skeletons differ only inside
    /// text operands.
    pub fn skeleton<'a>(&self, bytes: &'a [u8]) -> Vec<Option<&'a [u8]>> {
        let mut out = Vec::with_capacity(self.text_operands.len() * 2 + 1);
        let mut pos = 0;
        for operand in &self.text_operands {
            let span = &self.tokens[operand.token].span;
            out.push(Some(&bytes[pos..span.start]));
            out.push(None);
            pos = span.end;
        }
        out.push(Some(&bytes[pos..]));
        out
    }
}

/// Parse a content stream starting from the given font selection
pub fn parse(bytes: &[u8], entry: &TextState) -> Result<ParsedContent, ContentError> {
    let tokens = Lexer::tokenize(bytes)?;
    let mut state = entry.clone();
    let mut text_operands = Vec::new();
    let mut operands_start = 0;

    for (index, token) in tokens.iter().enumerate() {
        let TokenKind::Operator(op) = &token.kind else {
            continue;
        };
        let operands = &tokens[operands_start..index];
        let first_operand = operands_start;
        operands_start = index + 1;

        match op.as_slice() {
            b"Tf" => {
                let name = operands
                    .iter()
                    .find_map(Token::as_name)
                    .ok_or_else(|| ContentError::Operator {
                        offset: token.span.start,
                        reason: "Tf without a font name".to_string(),
                    })?;
                state.font = Some(name.to_vec());
            }
            b"q" => state.saved.push(state.font.clone()),
            b"Q" => {
                if let Some(font) = state.saved.pop() {
                    state.font = font;
                }
            }
            _ => {
                let Some(operator) = TextOperator::from_operator(op) else {
                    continue;
                };
                let font = state.font.clone().ok_or_else(|| ContentError::Operator {
                    offset: token.span.start,
                    reason: "text shown before any font was selected".to_string(),
                })?;
                let strings = operands
                    .iter()
                    .enumerate()
                    .filter(|(_, t)| t.as_string().is_some())
                    .map(|(i, _)| first_operand + i);
                let selected: Vec<usize> = match operator {
                    // TJ shows every string of its array operand
                    TextOperator::ShowArray => strings.collect(),
                    _ => strings.last().into_iter().collect(),
                };
                if selected.is_empty() {
                    return Err(ContentError::Operator {
                        offset: token.span.start,
                        reason: "text operator without a string operand".to_string(),
                    });
                }
                text_operands.extend(selected.into_iter().map(|token| TextOperand {
                    token,
                    operator,
                    font: font.clone(),
                }));
            }
        }
    }

    Ok(ParsedContent {
        tokens,
        text_operands,
        exit_state: state,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shown(parsed: &ParsedContent) -> Vec<(Vec<u8>, Vec<u8>)> {
        parsed
            .text_operands
            .iter()
            .map(|o| (o.font.clone(), parsed.string(o).bytes.clone()))
            .collect()
    }

    #[test]
    fn test_finds_all_text_operators() {
        let content = b"BT /F1 12 Tf (A) Tj [(B) -120 (C)] TJ (D) ' 1 2 (E) \" ET";
        let parsed = parse(content, &TextState::default()).unwrap();
        let strings: Vec<_> = shown(&parsed).into_iter().map(|(_, s)| s).collect();
        assert_eq!(
            strings,
            vec![b"A".to_vec(), b"B".to_vec(), b"C".to_vec(), b"D".to_vec(), b"E".to_vec()]
        );
        assert!(parsed.text_operands.iter().all(|o| o.font == b"F1".to_vec()));
    }

    #[test]
    fn test_font_follows_graphics_state_stack() {
        let content = b"BT /F1 9 Tf q /F2 9 Tf (x) Tj Q (y) Tj ET";
        let parsed = parse(content, &TextState::default()).unwrap();
        assert_eq!(
            shown(&parsed),
            vec![(b"F2".to_vec(), b"x".to_vec()), (b"F1".to_vec(), b"y".to_vec())]
        );
    }

    #[test]
    fn test_entry_state_carries_font() {
        let parsed = parse(b"(z) Tj", &TextState::with_font(b"F3")).unwrap();
        assert_eq!(shown(&parsed), vec![(b"F3".to_vec(), b"z".to_vec())]);
        assert_eq!(parsed.exit_state.font, Some(b"F3".to_vec()));
    }

    #[test]
    fn test_text_without_font_is_an_error() {
        let err = parse(b"BT (A) Tj ET", &TextState::default()).unwrap_err();
        assert_eq!(err.offset(), 7);
        assert!(matches!(err, ContentError::Operator { .. }));
    }

    #[test]
    fn test_marked_content_strings_are_not_text() {
        let content = b"/Span <</ActualText (hello)>> BDC /F1 1 Tf (h) Tj EMC";
        let parsed = parse(content, &TextState::default()).unwrap();
        assert_eq!(shown(&parsed), vec![(b"F1".to_vec(), b"h".to_vec())]);
    }

    #[test]
    fn test_skeleton_excludes_only_text_operands() {
        let content = b"/F1 1 Tf (AB) Tj";
        let parsed = parse(content, &TextState::default()).unwrap();
        assert_eq!(
            parsed.skeleton(content),
            vec![Some(&b"/F1 1 Tf "[..]), None, Some(&b" Tj"[..])]
        );
        assert_eq!(parsed.operator_count(), 2);
    }
}
