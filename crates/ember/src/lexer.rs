//! Lexer for Ember source code.
//!
//! Wraps the logos-generated token enum with line tracking and string-escape
//! processing. Newlines are significant (they separate bindings and match
//! branches) and are produced as tokens; spaces, tabs and `#` line comments
//! are skipped.

use logos::Logos;

use crate::error::ParseError;

/// Ember tokens.
///
/// Identifiers may contain dashes between alphanumeric parts (`make-adder`),
/// so subtraction must be written in prefix form (`- a b` or `sub a b`) like
/// every other application.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\r\f]+")]
#[logos(skip r"#[^\n]*")]
pub enum Token {
    // ==================== Keywords ====================
    #[token("val")]
    KwVal,
    #[token("match")]
    KwMatch,
    #[token("with")]
    KwWith,
    #[token("end")]
    KwEnd,
    #[token("module")]
    KwModule,

    // ==================== Punctuation ====================
    #[token("=")]
    Equals,
    #[token("->")]
    Arrow,
    #[token(".")]
    Dot,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("_", priority = 10)]
    Underscore,
    #[token("\n")]
    Newline,

    // ==================== Literals and names ====================
    #[regex(r"-?[0-9]+")]
    Number,
    #[regex(r":[A-Za-z_][A-Za-z0-9_]*(-[A-Za-z0-9_]+)*")]
    SymbolLit,
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*(-[A-Za-z0-9_]+)*")]
    Ident,
    /// Primitive operator spelling, usable wherever a name is.
    #[regex(r"==|\|\||&&|[+*/<>!-]")]
    Operator,
    #[regex(r#""([^"\\\n]|\\.)*""#)]
    StringLit,
}

/// A token with its source text and line number.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpannedToken<'a> {
    pub token: Token,
    pub text: &'a str,
    pub line: u32,
}

/// Tokenizes a whole source string.
///
/// Returns the token list (newlines included) or the first lexical error.
pub fn tokenize(source: &str) -> Result<Vec<SpannedToken<'_>>, ParseError> {
    let mut lexer = Token::lexer(source);
    let mut tokens = Vec::new();
    let mut line = 1;
    while let Some(result) = lexer.next() {
        let text = lexer.slice();
        match result {
            Ok(token) => {
                tokens.push(SpannedToken { token, text, line });
                if token == Token::Newline {
                    line += 1;
                }
            }
            Err(()) => {
                return Err(ParseError::LexerError {
                    text: text.to_owned(),
                    line,
                });
            }
        }
    }
    Ok(tokens)
}

/// Processes the escape sequences of a raw string literal (quotes included).
pub fn unescape(raw: &str, line: u32) -> Result<String, ParseError> {
    let inner = &raw[1..raw.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let escaped = chars.next().expect("lexer guarantees no trailing backslash");
        match escaped {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '\\' => out.push('\\'),
            '"' => out.push('"'),
            '0' => out.push('\0'),
            other => return Err(ParseError::InvalidEscape { sequence: other, line }),
        }
    }
    Ok(out)
}
