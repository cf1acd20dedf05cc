// SPDX-License-Identifier: PMPL-1.0-or-later
//! SQL tokenizer used by the default parser.
//!
//! Byte-oriented: every multi-byte UTF-8 sequence is either inside a quoted
//! token or treated as part of a word, so token spans always fall on char
//! boundaries.

use crate::error::BindError;

/// Kind of a lexed token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Unquoted keyword or identifier. Text is lower-cased.
    Word,
    /// Backtick-quoted identifier. Text is the unescaped name.
    QuotedIdent,
    /// String literal.
    Str,
    /// Numeric literal.
    Number,
    /// `?` placeholder.
    Param,
    /// Optimizer hint comment `/*+ ... */`. Text is the trimmed body.
    Hint,
    /// Operator or punctuation.
    Op,
}

/// A token with its byte span in the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub start: usize,
    pub end: usize,
}

impl Token {
    /// True for a word token equal to `kw` (lower-case).
    pub fn is_word(&self, kw: &str) -> bool {
        self.kind == TokenKind::Word && self.text == kw
    }

    /// True for an operator token equal to `op`.
    pub fn is_op(&self, op: &str) -> bool {
        self.kind == TokenKind::Op && self.text == op
    }

    /// True for literal-like tokens that normalize to `?`.
    pub fn is_literal(&self) -> bool {
        matches!(self.kind, TokenKind::Str | TokenKind::Number | TokenKind::Param)
    }

    /// True for tokens that can name a schema object.
    pub fn is_identifier(&self) -> bool {
        matches!(self.kind, TokenKind::Word | TokenKind::QuotedIdent)
    }
}

const MULTI_CHAR_OPS: [&str; 10] = ["<=>", ">=", "<=", "<>", "!=", "||", "&&", ":=", "<<", ">>"];

/// Split `sql` into tokens, dropping whitespace and plain comments.
pub fn tokenize(sql: &str) -> Result<Vec<Token>, BindError> {
    let bytes = sql.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let b = bytes[pos];
        let start = pos;

        if b.is_ascii_whitespace() {
            pos += 1;
            continue;
        }

        // Line comments: `-- ` and `#`.
        if b == b'#'
            || (b == b'-'
                && bytes.get(pos + 1) == Some(&b'-')
                && bytes.get(pos + 2).map_or(true, |c| c.is_ascii_whitespace()))
        {
            while pos < bytes.len() && bytes[pos] != b'\n' {
                pos += 1;
            }
            continue;
        }

        if b == b'/' && bytes.get(pos + 1) == Some(&b'*') {
            let body_start = pos + 2;
            let close = sql[body_start..]
                .find("*/")
                .ok_or_else(|| BindError::Parse(format!("unterminated comment at offset {start}")))?;
            let body_end = body_start + close;
            pos = body_end + 2;
            if bytes.get(body_start) == Some(&b'+') {
                tokens.push(Token {
                    kind: TokenKind::Hint,
                    text: sql[body_start + 1..body_end].trim().to_string(),
                    start,
                    end: pos,
                });
            }
            continue;
        }

        match b {
            b'\'' | b'"' => {
                pos = scan_quoted(bytes, pos, b, true)?;
                tokens.push(Token {
                    kind: TokenKind::Str,
                    text: sql[start..pos].to_string(),
                    start,
                    end: pos,
                });
            }
            b'`' => {
                pos = scan_quoted(bytes, pos, b'`', false)?;
                tokens.push(Token {
                    kind: TokenKind::QuotedIdent,
                    text: sql[start + 1..pos - 1].replace("``", "`"),
                    start,
                    end: pos,
                });
            }
            b'0'..=b'9' => {
                pos = scan_number(bytes, pos);
                tokens.push(Token {
                    kind: TokenKind::Number,
                    text: sql[start..pos].to_string(),
                    start,
                    end: pos,
                });
            }
            b'.' if bytes.get(pos + 1).is_some_and(u8::is_ascii_digit) => {
                pos = scan_number(bytes, pos);
                tokens.push(Token {
                    kind: TokenKind::Number,
                    text: sql[start..pos].to_string(),
                    start,
                    end: pos,
                });
            }
            b'?' => {
                pos += 1;
                tokens.push(Token {
                    kind: TokenKind::Param,
                    text: "?".to_string(),
                    start,
                    end: pos,
                });
            }
            _ if is_word_byte(b) => {
                while pos < bytes.len() && is_word_byte(bytes[pos]) {
                    pos += 1;
                }
                tokens.push(Token {
                    kind: TokenKind::Word,
                    text: sql[start..pos].to_lowercase(),
                    start,
                    end: pos,
                });
            }
            _ => {
                let op = MULTI_CHAR_OPS
                    .iter()
                    .find(|op| sql[pos..].starts_with(*op))
                    .map_or(1, |op| op.len());
                pos += op;
                tokens.push(Token {
                    kind: TokenKind::Op,
                    text: sql[start..pos].to_string(),
                    start,
                    end: pos,
                });
            }
        }
    }

    Ok(tokens)
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$' || b >= 0x80
}

/// Scan a quoted token starting at `pos`; returns the offset past the closing quote.
fn scan_quoted(bytes: &[u8], pos: usize, quote: u8, backslash: bool) -> Result<usize, BindError> {
    let mut i = pos + 1;
    while i < bytes.len() {
        let b = bytes[i];
        if backslash && b == b'\\' {
            i += 2;
            continue;
        }
        if b == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return Ok(i + 1);
        }
        i += 1;
    }
    Err(BindError::Parse(format!("unterminated quoted token at offset {pos}")))
}

fn scan_number(bytes: &[u8], mut pos: usize) -> usize {
    if bytes[pos] == b'0' && matches!(bytes.get(pos + 1), Some(b'x' | b'X')) {
        pos += 2;
        while pos < bytes.len() && bytes[pos].is_ascii_hexdigit() {
            pos += 1;
        }
        return pos;
    }
    while pos < bytes.len() && bytes[pos].is_ascii_digit() {
        pos += 1;
    }
    if bytes.get(pos) == Some(&b'.') {
        pos += 1;
        while pos < bytes.len() && bytes[pos].is_ascii_digit() {
            pos += 1;
        }
    }
    if matches!(bytes.get(pos), Some(b'e' | b'E')) {
        let mut exp = pos + 1;
        if matches!(bytes.get(exp), Some(b'+' | b'-')) {
            exp += 1;
        }
        if bytes.get(exp).is_some_and(u8::is_ascii_digit) {
            pos = exp;
            while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                pos += 1;
            }
        }
    }
    pos
}
