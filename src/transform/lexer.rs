//! Lexer for the transformation expression language.
//!
//! Produces span-based tokens; text is sliced from the source only when the
//! parser needs it (names, numbers, string bodies).

use std::ops::Range;

use logos::{Lexer, Logos};

use super::error::StepError;

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    #[token("(")]
    ParenOpen,
    #[token(")")]
    ParenClose,
    #[token("[")]
    BracketOpen,
    #[token("]")]
    BracketClose,
    #[token("{")]
    BraceOpen,
    #[token("}")]
    BraceClose,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token(".")]
    Dot,
    #[token("=")]
    Assign,

    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("**")]
    DoubleStar,
    #[token("/")]
    Slash,
    #[token("//")]
    DoubleSlash,
    #[token("%")]
    Percent,

    #[token("==")]
    Eq,
    #[token("!=")]
    NotEq,
    #[token("<")]
    Lt,
    #[token("<=")]
    LtEq,
    #[token(">")]
    Gt,
    #[token(">=")]
    GtEq,

    #[token("True")]
    KwTrue,
    #[token("False")]
    KwFalse,
    #[token("None")]
    KwNone,
    #[token("and")]
    KwAnd,
    #[token("or")]
    KwOr,
    #[token("not")]
    KwNot,
    #[token("in")]
    KwIn,
    #[token("is")]
    KwIs,
    #[token("if")]
    KwIf,
    #[token("else")]
    KwElse,
    #[token("for")]
    KwFor,

    /// Defined after keywords so they take precedence
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*")]
    Name,

    #[regex(r"[0-9][0-9_]*")]
    Int,

    #[regex(r"[0-9][0-9_]*\.[0-9_]*([eE][+-]?[0-9]+)?")]
    #[regex(r"\.[0-9][0-9_]*([eE][+-]?[0-9]+)?")]
    #[regex(r"[0-9][0-9_]*[eE][+-]?[0-9]+")]
    Float,

    #[regex(r#""(?:[^"\\\n]|\\.)*""#)]
    #[regex(r"'(?:[^'\\\n]|\\.)*'")]
    #[token("'''", |lex| close_triple(lex, "'''"))]
    #[token(r#"""""#, |lex| close_triple(lex, r#"""""#))]
    Str,

    #[regex(r"[ \t\r\n\f]+")]
    Whitespace,
}

/// Extend a triple-quoted string token up to its closing delimiter
fn close_triple(lex: &mut Lexer<'_, TokenKind>, delimiter: &str) -> bool {
    let rest = lex.remainder();
    let bytes = rest.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' {
            i += 2;
            continue;
        }
        if rest[i..].starts_with(delimiter) {
            lex.bump(i + delimiter.len());
            return true;
        }
        i += 1;
    }
    false
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Range<usize>,
}

/// Tokenize `source`, dropping whitespace
pub fn lex(source: &str) -> Result<Vec<Token>, StepError> {
    let mut tokens = Vec::new();
    let mut lexer = TokenKind::lexer(source);
    while let Some(result) = lexer.next() {
        let span = lexer.span();
        match result {
            Ok(TokenKind::Whitespace) => {}
            Ok(kind) => tokens.push(Token { kind, span }),
            Err(()) => {
                let fragment = &source[span.clone()];
                let message = if fragment.starts_with(['\'', '"']) {
                    format!("unterminated string literal at offset {}", span.start)
                } else {
                    format!("invalid syntax '{}' at offset {}", fragment, span.start)
                };
                return Err(StepError::syntax(message));
            }
        }
    }
    Ok(tokens)
}

/// Decode the body of a string token (quotes stripped, escapes processed)
pub fn unquote(raw: &str) -> Result<String, StepError> {
    let quote_len = if raw.starts_with("'''") || raw.starts_with(r#"""""#) {
        3
    } else {
        1
    };
    let body = raw
        .get(quote_len..raw.len().saturating_sub(quote_len))
        .ok_or_else(|| StepError::syntax("unterminated string literal"))?;

    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some('\n') => {}
            Some('x') => out.push(hex_escape(&mut chars, 2)?),
            Some('u') => out.push(hex_escape(&mut chars, 4)?),
            // Unknown escapes keep the backslash
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    Ok(out)
}

fn hex_escape(chars: &mut std::str::Chars<'_>, digits: usize) -> Result<char, StepError> {
    let hex: String = chars.by_ref().take(digits).collect();
    u32::from_str_radix(&hex, 16)
        .ok()
        .filter(|_| hex.len() == digits)
        .and_then(char::from_u32)
        .ok_or_else(|| StepError::syntax(format!("invalid escape sequence '{}'", hex)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        lex(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn operators_prefer_longest_match() {
        assert_eq!(
            kinds("a ** b // c <= d"),
            vec![
                TokenKind::Name,
                TokenKind::DoubleStar,
                TokenKind::Name,
                TokenKind::DoubleSlash,
                TokenKind::Name,
                TokenKind::LtEq,
                TokenKind::Name,
            ]
        );
    }

    #[test]
    fn keywords_beat_names() {
        assert_eq!(
            kinds("not x in None"),
            vec![
                TokenKind::KwNot,
                TokenKind::Name,
                TokenKind::KwIn,
                TokenKind::KwNone,
            ]
        );
        assert_eq!(kinds("notable"), vec![TokenKind::Name]);
    }

    #[test]
    fn numbers() {
        assert_eq!(kinds("42"), vec![TokenKind::Int]);
        assert_eq!(kinds("4.5"), vec![TokenKind::Float]);
        assert_eq!(kinds("1e3"), vec![TokenKind::Float]);
        assert_eq!(
            kinds("results[0].upper()"),
            vec![
                TokenKind::Name,
                TokenKind::BracketOpen,
                TokenKind::Int,
                TokenKind::BracketClose,
                TokenKind::Dot,
                TokenKind::Name,
                TokenKind::ParenOpen,
                TokenKind::ParenClose,
            ]
        );
    }

    #[test]
    fn strings_and_escapes() {
        let source = r#"'a\'b' "c\td" '''it's'''"#;
        let tokens = lex(source).unwrap();
        assert_eq!(tokens.len(), 3);
        let bodies: Vec<String> = tokens
            .iter()
            .map(|t| unquote(&source[t.span.clone()]).unwrap())
            .collect();
        assert_eq!(bodies, vec!["a'b", "c\td", "it's"]);
        assert_eq!(unquote(r"'\x41é'").unwrap(), "Aé");
        assert_eq!(unquote("''").unwrap(), "");
    }

    #[test]
    fn invalid_input_is_syntax_error() {
        let err = lex("a ? b").unwrap_err();
        assert_eq!(err.kind, crate::transform::ErrorKind::SyntaxError);
        assert!(lex("'open").is_err());
    }
}
