//! Pull-based lexical analyzer.
//!
//! [`CharSource`] streams raw bytes from a file and tracks the 1-based line
//! counter; [`Lexer`] sits on top of it, holding a single look-ahead byte and
//! turning runs of bytes into [`Token`]s one at a time. Neither type buffers
//! more than one token's worth of state — there is no backtracking lexer
//! state beyond the look-ahead character described in §4.1.

pub mod token;

use std::io::{Bytes, Read};

use crate::error::{LexicalError, Position};

pub use token::{classify_word, Keyword, OperatorKind, Token, TokenKind, TypeName};

/// A byte stream with 1-based line tracking. Line numbers advance on `\n`
/// or `\r`, matching the behavior the lexer relies on for whitespace and
/// comment skipping.
pub struct CharSource<R: Read> {
    bytes: Bytes<R>,
    line: u32,
}

impl<R: Read> CharSource<R> {
    pub fn new(reader: R) -> Self {
        CharSource {
            bytes: reader.bytes(),
            line: 1,
        }
    }

    pub fn line(&self) -> u32 {
        self.line
    }
}

impl<R: Read> Iterator for CharSource<R> {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        // A mid-stream I/O error is treated the same as EOF: the core's
        // scope is file I/O only, and there is nothing more specific to do
        // with a read failure than to stop producing bytes.
        let b = self.bytes.next()?.ok()?;
        if b == b'\n' || b == b'\r' {
            self.line += 1;
        }
        Some(b)
    }
}

impl CharSource<std::fs::File> {
    pub fn open(path: &std::path::Path) -> std::io::Result<Self> {
        Ok(CharSource::new(std::fs::File::open(path)?))
    }
}

pub struct Lexer<R: Read> {
    source: CharSource<R>,
    lookahead: Option<u8>,
    line: u32,
}

impl<R: Read> Lexer<R> {
    pub fn new(mut source: CharSource<R>) -> Self {
        let line = source.line();
        let lookahead = source.next();
        Lexer {
            source,
            lookahead,
            line,
        }
    }

    /// Consumes the current look-ahead byte and fetches the next one.
    fn bump(&mut self) -> Option<u8> {
        let c = self.lookahead.take();
        self.line = self.source.line();
        self.lookahead = self.source.next();
        c
    }

    fn pos(&self) -> Position {
        Position(self.line)
    }

    fn err(&self, message: impl Into<String>) -> LexicalError {
        LexicalError {
            message: message.into(),
            position: self.pos(),
        }
    }

    /// Returns the next token. Once the underlying source is exhausted,
    /// every subsequent call keeps returning `End` (idempotence at EOF).
    pub fn next_token(&mut self) -> Result<Token, LexicalError> {
        loop {
            let Some(c) = self.lookahead else {
                return Ok(Token::new(TokenKind::End, self.pos()));
            };
            if c.is_ascii_whitespace() {
                self.bump();
                continue;
            }
            if c == b'#' {
                while let Some(c) = self.lookahead {
                    if c == b'\n' || c == b'\r' {
                        break;
                    }
                    self.bump();
                }
                continue;
            }
            break;
        }

        let start_line = self.line;
        let c = self.lookahead.unwrap();

        if c.is_ascii_alphabetic() || c == b'_' {
            return Ok(self.scan_word(start_line));
        }
        if c.is_ascii_digit() || c == b'.' {
            return Ok(self.scan_number(start_line));
        }
        if c == b'\'' {
            return self.scan_char(start_line);
        }
        if c == b'"' {
            return self.scan_string(start_line);
        }

        self.scan_operator(start_line)
    }

    fn scan_word(&mut self, start_line: u32) -> Token {
        let mut word = Vec::new();
        while let Some(c) = self.lookahead {
            if c.is_ascii_alphanumeric() || c == b'_' {
                word.push(c);
                self.bump();
            } else {
                break;
            }
        }
        let word = String::from_utf8_lossy(&word).into_owned();
        Token::new(classify_word(&word), Position(start_line))
    }

    fn scan_number(&mut self, start_line: u32) -> Token {
        let mut lexeme = Vec::new();
        while let Some(c) = self.lookahead {
            if c.is_ascii_digit() || c == b'.' {
                lexeme.push(c);
                self.bump();
            } else {
                break;
            }
        }
        let lexeme = String::from_utf8_lossy(&lexeme).into_owned();
        Token::new(
            TokenKind::NumberLit(parse_double_best_effort(&lexeme)),
            Position(start_line),
        )
    }

    fn scan_char(&mut self, start_line: u32) -> Result<Token, LexicalError> {
        self.bump(); // opening quote
        let Some(first) = self.lookahead else {
            return Err(self.err("unterminated character literal"));
        };
        self.bump();
        let value = if first == b'\\' {
            let Some(escaped) = self.lookahead else {
                return Err(self.err("unterminated character literal"));
            };
            self.bump();
            resolve_escape(escaped)
                .ok_or_else(|| self.err(format!("unsupported escape '\\{}'", escaped as char)))?
        } else {
            first
        };
        if self.lookahead != Some(b'\'') {
            return Err(self.err("malformed character literal"));
        }
        self.bump();
        Ok(Token::new(TokenKind::CharLit(value), Position(start_line)))
    }

    fn scan_string(&mut self, start_line: u32) -> Result<Token, LexicalError> {
        self.bump(); // opening quote
        let mut bytes = Vec::new();
        loop {
            match self.lookahead {
                None => return Err(self.err("unterminated string literal")),
                Some(b'"') => {
                    self.bump();
                    break;
                }
                Some(b'\\') => {
                    self.bump();
                    let Some(escaped) = self.lookahead else {
                        return Err(self.err("unterminated string literal"));
                    };
                    self.bump();
                    let resolved = resolve_escape(escaped).ok_or_else(|| {
                        self.err(format!("unsupported escape '\\{}'", escaped as char))
                    })?;
                    bytes.push(resolved);
                }
                Some(c) => {
                    bytes.push(c);
                    self.bump();
                }
            }
        }
        Ok(Token::new(
            TokenKind::StringLit(bytes),
            Position(start_line),
        ))
    }

    fn scan_operator(&mut self, start_line: u32) -> Result<Token, LexicalError> {
        let c = self.bump().unwrap();
        let (kind, spelling) = match c {
            b'<' => match self.lookahead {
                Some(b'=') => {
                    self.bump();
                    (OperatorKind::Le, "<=".to_string())
                }
                Some(b'>') => {
                    self.bump();
                    (OperatorKind::Neq, "<>".to_string())
                }
                _ => (OperatorKind::Lt, "<".to_string()),
            },
            b'>' => match self.lookahead {
                Some(b'=') => {
                    self.bump();
                    (OperatorKind::Ge, ">=".to_string())
                }
                _ => (OperatorKind::Gt, ">".to_string()),
            },
            b'-' => match self.lookahead {
                Some(b'>') => {
                    self.bump();
                    (OperatorKind::Arrow, "->".to_string())
                }
                _ => (OperatorKind::Sub, "-".to_string()),
            },
            b'=' => match self.lookahead {
                Some(b'=') => {
                    self.bump();
                    (OperatorKind::Eq, "==".to_string())
                }
                _ => (OperatorKind::Assign, "=".to_string()),
            },
            b'+' => (OperatorKind::Add, "+".to_string()),
            b'*' => (OperatorKind::Mul, "*".to_string()),
            b'/' => (OperatorKind::Div, "/".to_string()),
            b'(' => (OperatorKind::LParen, "(".to_string()),
            b')' => (OperatorKind::RParen, ")".to_string()),
            b',' => (OperatorKind::Comma, ",".to_string()),
            b':' => (OperatorKind::Colon, ":".to_string()),
            b';' => (OperatorKind::Semi, ";".to_string()),
            other if other.is_ascii_graphic() => (OperatorKind::UserDefined, (other as char).to_string()),
            other => {
                return Err(LexicalError {
                    message: format!("unexpected byte 0x{other:02x}"),
                    position: Position(start_line),
                })
            }
        };
        Ok(Token::new(
            TokenKind::Operator(kind, spelling),
            Position(start_line),
        ))
    }
}

fn resolve_escape(c: u8) -> Option<u8> {
    Some(match c {
        b'n' => b'\n',
        b'r' => b'\r',
        b't' => b'\t',
        b'\\' => b'\\',
        b'\'' => b'\'',
        _ => return None,
    })
}

/// `strtod`-equivalent parse: accepts the longest prefix of `lexeme` that
/// parses as a valid double, per §4.1's "accepts one '.' but does not
/// validate" note. Malformed residue (a second decimal point, trailing
/// garbage) is simply dropped rather than raising an error.
fn parse_double_best_effort(lexeme: &str) -> f64 {
    if let Ok(v) = lexeme.parse::<f64>() {
        return v;
    }
    let mut end = lexeme.len();
    while end > 0 {
        if let Ok(v) = lexeme[..end].parse::<f64>() {
            return v;
        }
        end -= 1;
    }
    0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex_all(src: &str) -> Vec<Token> {
        let mut lexer = Lexer::new(CharSource::new(src.as_bytes()));
        let mut tokens = Vec::new();
        loop {
            let tok = lexer.next_token().expect("lex error");
            let end = tok.is_end();
            tokens.push(tok);
            if end {
                break;
            }
        }
        tokens
    }

    #[test]
    fn eof_is_idempotent() {
        let mut lexer = Lexer::new(CharSource::new("".as_bytes()));
        assert!(lexer.next_token().unwrap().is_end());
        assert!(lexer.next_token().unwrap().is_end());
        assert!(lexer.next_token().unwrap().is_end());
    }

    #[test]
    fn positions_are_monotonic_and_positive() {
        let tokens = lex_all("foo\nbar\nbaz");
        let mut last = 0;
        for t in &tokens {
            assert!(t.position.line() >= 1);
            assert!(t.position.line() >= last);
            last = t.position.line();
        }
    }

    #[test]
    fn two_char_operators_disambiguate() {
        for (spelling, kind) in [
            ("<=", OperatorKind::Le),
            ("<>", OperatorKind::Neq),
            (">=", OperatorKind::Ge),
            ("==", OperatorKind::Eq),
            ("->", OperatorKind::Arrow),
        ] {
            let tokens = lex_all(spelling);
            assert_eq!(tokens.len(), 2, "spelling={spelling}");
            let (got_kind, got_spelling) = tokens[0].as_operator().unwrap();
            assert_eq!(got_kind, kind);
            assert_eq!(got_spelling, spelling);
            assert!(tokens[1].is_end());
        }
    }

    #[test]
    fn one_char_operators_round_trip() {
        for spelling in ["<", ">", "+", "-", "*", "/", "(", ")", ",", ":", ";", "="] {
            let tokens = lex_all(spelling);
            assert_eq!(tokens.len(), 2);
            let (_, got_spelling) = tokens[0].as_operator().unwrap();
            assert_eq!(got_spelling, spelling);
        }
    }

    #[test]
    fn user_defined_operator() {
        let tokens = lex_all("|");
        let (kind, spelling) = tokens[0].as_operator().unwrap();
        assert_eq!(kind, OperatorKind::UserDefined);
        assert_eq!(spelling, "|");
    }

    #[test]
    fn keywords_and_types_classify() {
        let tokens = lex_all("extern number foo");
        assert_eq!(tokens[0].as_keyword(), Some(Keyword::Extern));
        assert_eq!(tokens[1].as_type(), Some(TypeName::Number));
        assert_eq!(tokens[2].as_identifier(), Some("foo"));
    }

    #[test]
    fn comment_runs_to_end_of_line() {
        let tokens = lex_all("foo # this is a comment\nbar");
        assert_eq!(tokens[0].as_identifier(), Some("foo"));
        assert_eq!(tokens[1].as_identifier(), Some("bar"));
        assert!(tokens[1].position.line() > tokens[0].position.line());
    }

    #[test]
    fn string_literal_resolves_escapes() {
        let tokens = lex_all(r#""a\nb""#);
        match &tokens[0].kind {
            TokenKind::StringLit(bytes) => assert_eq!(bytes, b"a\nb"),
            other => panic!("expected StringLit, got {other:?}"),
        }
    }

    #[test]
    fn char_literal_plain_and_escaped() {
        let tokens = lex_all("'a'");
        assert_eq!(tokens[0].kind, TokenKind::CharLit(b'a'));
        let tokens = lex_all(r"'\n'");
        assert_eq!(tokens[0].kind, TokenKind::CharLit(b'\n'));
    }

    #[test]
    fn number_literal() {
        let tokens = lex_all("3.14");
        assert_eq!(tokens[0].kind, TokenKind::NumberLit(3.14));
    }
}
