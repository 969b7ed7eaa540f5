// Copyright 2019 The Model Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

// hand-rolled lexer for equation text.  Keywords and identifiers are
// case-insensitive: token text is lowercased, while locations count
// characters of the original input.

use lazy_static::lazy_static;
use regex::Regex;
use unicode_xid::UnicodeXID;

#[cfg(test)]
mod test;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SourceLoc {
    pub line: usize,
    pub pos: usize,
}

impl SourceLoc {
    pub fn new(line: usize, pos: usize) -> Self {
        SourceLoc { line, pos }
    }

    pub fn off(&self, n: usize) -> Self {
        SourceLoc {
            line: self.line,
            pos: self.pos + n,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TokenKind {
    Token,
    Ident,
    Reserved,
    Number,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub text: String,
    pub kind: TokenKind,
    pub start_loc: SourceLoc,
    pub end_loc: SourceLoc,
}

impl Token {
    fn new(text: &str, kind: TokenKind, start_loc: SourceLoc, end_loc: SourceLoc) -> Self {
        Token {
            text: text.to_owned(),
            kind,
            start_loc,
            end_loc,
        }
    }

    /// value is the numeric value of a Number token, parsed from the
    /// longest prefix of the token text that is a valid float.
    pub fn value(&self) -> Option<f64> {
        if self.kind != TokenKind::Number {
            return None;
        }

        lazy_static! {
            static ref FLOAT_PREFIX_RE: Regex =
                Regex::new(r"^([0-9]+\.?[0-9]*|\.[0-9]+)(e[0-9]+)?").unwrap();
        }

        match FLOAT_PREFIX_RE.find(&self.text) {
            Some(m) => m.as_str().parse::<f64>().ok(),
            None => Some(f64::NAN),
        }
    }

    pub fn is_op(&self, op: &str) -> bool {
        self.kind == TokenKind::Token && self.text == op
    }

    pub fn is_reserved(&self, word: &str) -> bool {
        self.kind == TokenKind::Reserved && self.text == word
    }
}

const RESERVED_WORDS: &[&str] = &["if", "then", "else"];

const WORD_OPERATORS: &[(&str, &str)] = &[("and", "&"), ("or", "|"), ("not", "!"), ("mod", "%")];

pub struct Lexer {
    text: String,
    pos: usize,
    line: usize,
    col: usize,
    peeked: Option<Option<Token>>,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Lexer {
            text: input.to_owned(),
            pos: 0,
            line: 0,
            col: 0,
            peeked: None,
        }
    }

    fn lookahead(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn lookahead2(&self) -> Option<char> {
        self.text[self.pos..].chars().nth(1)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.lookahead()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.col = 0;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn bump_bytes(&mut self, len: usize) {
        let end = self.pos + len;
        while self.pos < end && self.bump().is_some() {}
    }

    fn loc(&self) -> SourceLoc {
        SourceLoc::new(self.line, self.col)
    }

    fn skip_whitespace(&mut self) {
        let mut in_comment = false;
        while let Some(c) = self.lookahead() {
            if in_comment {
                if c == '}' {
                    in_comment = false;
                }
            } else if c == '{' {
                in_comment = true;
            } else if !c.is_whitespace() {
                break;
            }
            self.bump();
        }
    }

    fn identifier(&mut self, start: SourceLoc) -> Token {
        let begin = self.pos;
        while let Some(c) = self.lookahead() {
            if is_identifier_continue(c) {
                self.bump();
            } else {
                break;
            }
        }
        let word = self.text[begin..self.pos].to_lowercase();
        let len = self.col - start.pos;

        if let Some((_, op)) = WORD_OPERATORS.iter().find(|(w, _)| *w == word) {
            return Token::new(op, TokenKind::Token, start, start.off(len));
        }

        let kind = if RESERVED_WORDS.contains(&word.as_str()) {
            TokenKind::Reserved
        } else {
            TokenKind::Ident
        };
        Token::new(&word, kind, start, start.off(len))
    }

    fn quoted_identifier(&mut self, start: SourceLoc) -> Token {
        let begin = self.pos;
        // opening quote
        self.bump();
        while let Some(c) = self.bump() {
            if c == '"' {
                break;
            }
        }
        let text = self.text[begin..self.pos].to_lowercase();
        Token::new(&text, TokenKind::Ident, start, self.loc())
    }

    fn number(&mut self, start: SourceLoc) -> Token {
        lazy_static! {
            static ref NUMBER_RE: Regex =
                Regex::new(r"^[0-9]*(\.[0-9]*)?([eE][0-9]*(\.[0-9]*)?)?").unwrap();
        }

        let len = NUMBER_RE
            .find(&self.text[self.pos..])
            .map(|m| m.end())
            .unwrap_or(0);
        let begin = self.pos;
        self.bump_bytes(len);
        let text = self.text[begin..self.pos].to_ascii_lowercase();
        Token::new(&text, TokenKind::Number, start, start.off(len))
    }

    fn next_token(&mut self) -> Option<Token> {
        if let Some(tok) = self.peeked.take() {
            return tok;
        }

        self.skip_whitespace();

        let start = self.loc();
        let c = self.lookahead()?;

        macro_rules! op {
            ($text:expr, $len:expr) => {{
                for _ in 0..$len {
                    self.bump();
                }
                Some(Token::new($text, TokenKind::Token, start, start.off($len)))
            }};
        }

        match c {
            '=' => {
                if self.lookahead2() == Some('=') {
                    op!("=", 2)
                } else {
                    op!("=", 1)
                }
            }
            '<' => match self.lookahead2() {
                Some('=') => op!("≤", 2),
                Some('>') => op!("≠", 2),
                _ => op!("<", 1),
            },
            '>' => match self.lookahead2() {
                Some('=') => op!("≥", 2),
                _ => op!(">", 1),
            },
            '"' => Some(self.quoted_identifier(start)),
            '.' if self.lookahead2().map_or(false, is_identifier_start) => {
                Some(self.identifier(start))
            }
            c if is_number_start(c) => Some(self.number(start)),
            c if is_identifier_start(c) => Some(self.identifier(start)),
            c => {
                self.bump();
                let mut buf = [0; 4];
                Some(Token::new(
                    c.encode_utf8(&mut buf),
                    TokenKind::Token,
                    start,
                    start.off(1),
                ))
            }
        }
    }

    pub fn peek(&mut self) -> Option<&Token> {
        if self.peeked.is_none() {
            let tok = self.next_token();
            self.peeked = Some(tok);
        }
        self.peeked.as_ref().and_then(|tok| tok.as_ref())
    }
}

impl Iterator for Lexer {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        self.next_token()
    }
}

fn is_number_start(c: char) -> bool {
    c.is_ascii_digit() || c == '.'
}

fn is_identifier_start(c: char) -> bool {
    !c.is_ascii_digit() && (UnicodeXID::is_xid_start(c) || c == '_' || c == '$')
}

fn is_identifier_continue(c: char) -> bool {
    UnicodeXID::is_xid_continue(c) || c == '.' || c == '$'
}
