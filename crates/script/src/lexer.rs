//! Single-pass lexer: source text -> a finite token stream terminated by EOF.

use crate::error::LexError;
use crate::token::{Token, TokenKind, TokenValue, keyword};

pub struct Lexer<'a> {
    source: &'a [u8],
    pos: usize,
    line: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Lexer {
            source: source.as_bytes(),
            pos: 0,
            line: 1,
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                break;
            }
        }
        Ok(tokens)
    }

    fn peek(&self) -> Option<u8> {
        self.source.get(self.pos).copied()
    }

    fn peek_next(&self) -> Option<u8> {
        self.source.get(self.pos + 1).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let c = self.peek()?;
        if c == b'\n' {
            self.line += 1;
        }
        self.pos += 1;
        Some(c)
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c == b' ' || c == b'\t' || c == b'\r' || c == b'\n' => {
                    self.advance();
                }
                Some(b'#') => {
                    while let Some(c) = self.peek() {
                        if c == b'\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    fn number(&mut self) -> Token {
        let start = self.pos;
        let line = self.line;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.advance();
        }

        let mut is_float = false;
        if self.peek() == Some(b'.') && matches!(self.peek_next(), Some(c) if c.is_ascii_digit()) {
            is_float = true;
            self.advance();
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.advance();
            }
        }

        let text = std::str::from_utf8(&self.source[start..self.pos]).unwrap();
        if is_float {
            Token::new(TokenKind::Number, TokenValue::Float(text.parse().unwrap()), text, line)
        } else {
            Token::new(TokenKind::Number, TokenValue::Int(text.parse().unwrap()), text, line)
        }
    }

    fn string(&mut self) -> Result<Token, LexError> {
        let start_line = self.line;
        self.advance(); // opening quote
        let start = self.pos;
        loop {
            match self.peek() {
                None => return Err(LexError::UnterminatedString { line: start_line }),
                Some(b'\n') => return Err(LexError::UnterminatedString { line: start_line }),
                Some(b'"') => break,
                _ => {
                    self.advance();
                }
            }
        }
        let text = std::str::from_utf8(&self.source[start..self.pos]).unwrap().to_string();
        self.advance(); // closing quote
        Ok(Token::new(TokenKind::String, TokenValue::Str(text.clone()), text, start_line))
    }

    fn identifier_or_keyword(&mut self) -> Token {
        let start = self.pos;
        let line = self.line;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == b'_') {
            self.advance();
        }
        let text = std::str::from_utf8(&self.source[start..self.pos]).unwrap().to_string();
        match keyword(&text) {
            Some(kind) => Token::new(kind, TokenValue::Str(text.clone()), text, line),
            None => Token::new(TokenKind::Identifier, TokenValue::Str(text.clone()), text, line),
        }
    }

    fn next_token(&mut self) -> Result<Token, LexError> {
        self.skip_whitespace_and_comments();

        let line = self.line;
        let Some(c) = self.peek() else {
            return Ok(Token::new(TokenKind::Eof, TokenValue::None, "", line));
        };

        if c.is_ascii_digit() {
            return Ok(self.number());
        }
        if c.is_ascii_alphabetic() || c == b'_' {
            return Ok(self.identifier_or_keyword());
        }
        if c == b'"' {
            return self.string();
        }

        macro_rules! two_char {
            ($second:expr, $two_kind:expr, $one_kind:expr, $one_lexeme:expr) => {{
                self.advance();
                if self.peek() == Some($second) {
                    self.advance();
                    let lexeme = format!("{}{}", $one_lexeme, $second as char);
                    Token::new($two_kind, TokenValue::Str(lexeme.clone()), lexeme, line)
                } else {
                    Token::new($one_kind, TokenValue::Str($one_lexeme.to_string()), $one_lexeme, line)
                }
            }};
        }

        let token = match c {
            b'=' => two_char!(b'=', TokenKind::EqualEqual, TokenKind::Equals, "="),
            b'!' => two_char!(b'=', TokenKind::BangEqual, TokenKind::Bang, "!"),
            b'>' => two_char!(b'=', TokenKind::GreaterEqual, TokenKind::Greater, ">"),
            b'<' => two_char!(b'=', TokenKind::LessEqual, TokenKind::Less, "<"),
            b'+' => self.single(TokenKind::Plus, "+"),
            b'-' => self.single(TokenKind::Minus, "-"),
            b'*' => self.single(TokenKind::Star, "*"),
            b'/' => self.single(TokenKind::Slash, "/"),
            b'.' => self.single(TokenKind::Dot, "."),
            b',' => self.single(TokenKind::Comma, ","),
            b':' => self.single(TokenKind::Colon, ":"),
            b';' => self.single(TokenKind::Semicolon, ";"),
            b'(' => self.single(TokenKind::LParen, "("),
            b')' => self.single(TokenKind::RParen, ")"),
            b'{' => self.single(TokenKind::LBrace, "{"),
            b'}' => self.single(TokenKind::RBrace, "}"),
            other => {
                return Err(LexError::UnexpectedChar {
                    line,
                    ch: other as char,
                });
            }
        };
        Ok(token)
    }

    fn single(&mut self, kind: TokenKind, lexeme: &str) -> Token {
        let line = self.line;
        self.advance();
        Token::new(kind, TokenValue::Str(lexeme.to_string()), lexeme, line)
    }
}
