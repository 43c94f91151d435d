//! WHERE 子句的词法分析器
//!
//! 支持带引号的标识符（`"x"`、`` `x` ``、`[x]`）, 使用双写引号转义的字符串
//! （启用时也支持反斜杠转义）, 数字, 过滤语法的关键字, 比较运算符以及两种
//! SQL 注释。其他字符产生 `Illegal`, 由解析器保留为原始片段。

use std::borrow::Cow;

use crate::token::{Span, Token, TokenKind};

pub struct Lexer<'a> {
    input: &'a str,
    /// 输入字符串中的当前位置（字节索引）
    position: usize,
    backslash_escapes: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Lexer {
            input,
            position: 0,
            backslash_escapes: false,
        }
    }

    /// 将字符串中的 `\` 视为转义符（MySQL）
    pub fn with_backslash_escapes(mut self, enabled: bool) -> Self {
        self.backslash_escapes = enabled;
        self
    }

    fn peek(&self) -> Option<char> {
        self.input[self.position..].chars().next()
    }

    fn peek_next(&self) -> Option<char> {
        self.input[self.position..].chars().nth(1)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if let Some(c) = c {
            self.position += c.len_utf8();
        }
        c
    }

    /// 跳过空白字符
    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.bump();
            } else {
                break;
            }
        }
    }

    fn token(&self, kind: TokenKind<'a>, start: usize) -> Token<'a> {
        Token {
            kind,
            span: Span::new(start, self.position),
        }
    }

    fn read_number(&mut self, start: usize) -> Token<'a> {
        self.eat_digits();
        if self.peek() == Some('.') && self.peek_next().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
            self.eat_digits();
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let mark = self.position;
            self.bump();
            if matches!(self.peek(), Some('+' | '-')) {
                self.bump();
            }
            if self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.eat_digits();
            } else {
                self.position = mark;
            }
        }
        // `12abc` 不是数字加标识符
        if self.peek().is_some_and(is_identifier_char) {
            while self.peek().is_some_and(is_identifier_char) {
                self.bump();
            }
            return self.token(TokenKind::Illegal, start);
        }
        self.token(TokenKind::Number(&self.input[start..self.position]), start)
    }

    fn eat_digits(&mut self) {
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
    }

    /// 读取到结束字符 `close` 为止, 双写的结束字符代表其本身
    /// 注意：开始字符已经被调用者消费
    fn read_delimited(&mut self, close: char, backslash: bool) -> Option<Cow<'a, str>> {
        let content_start = self.position;
        let mut owned: Option<String> = None;
        loop {
            let at = self.position;
            let c = self.bump()?;
            if backslash && c == '\\' {
                let escaped = self.bump()?;
                owned
                    .get_or_insert_with(|| self.input[content_start..at].to_string())
                    .push(unescape(escaped));
            } else if c == close && self.peek() == Some(close) {
                self.bump();
                owned
                    .get_or_insert_with(|| self.input[content_start..at].to_string())
                    .push(close);
            } else if c == close {
                return Some(match owned {
                    Some(buf) => Cow::Owned(buf),
                    None => Cow::Borrowed(&self.input[content_start..at]),
                });
            } else if let Some(buf) = owned.as_mut() {
                buf.push(c);
            }
        }
    }

    /// 读取行注释, 直到行尾（不含换行符）
    fn read_line_comment(&mut self, start: usize) -> Token<'a> {
        while self.peek().is_some_and(|c| c != '\n') {
            self.bump();
        }
        self.token(TokenKind::Comment, start)
    }

    /// 读取块注释, 未闭合的块注释延续到输入末尾
    fn read_block_comment(&mut self, start: usize) -> Token<'a> {
        while let Some(c) = self.bump() {
            if c == '*' && self.peek() == Some('/') {
                self.bump();
                break;
            }
        }
        self.token(TokenKind::Comment, start)
    }

    fn read_identifier(&mut self, start: usize) -> Token<'a> {
        while self.peek().is_some_and(is_identifier_char) {
            self.bump();
        }
        let literal = &self.input[start..self.position];
        self.token(match_keyword(literal), start)
    }
}

fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

fn unescape(c: char) -> char {
    match c {
        'n' => '\n',
        't' => '\t',
        'r' => '\r',
        '0' => '\0',
        other => other,
    }
}

fn match_keyword(s: &str) -> TokenKind<'_> {
    match s.to_ascii_lowercase().as_str() {
        "and" => TokenKind::And,
        "or" => TokenKind::Or,
        "not" => TokenKind::Not,
        "in" => TokenKind::In,
        "is" => TokenKind::Is,
        "null" => TokenKind::Null,
        "between" => TokenKind::Between,
        "like" => TokenKind::Like,
        "ilike" => TokenKind::ILike,
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        _ => TokenKind::Identifier(s),
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.skip_whitespace();
        let start = self.position;
        let c = self.bump()?;

        let token = match c {
            '(' => self.token(TokenKind::LParen, start),
            ')' => self.token(TokenKind::RParen, start),
            ',' => self.token(TokenKind::Comma, start),
            '.' => self.token(TokenKind::Dot, start),
            '=' => self.token(TokenKind::Eq, start),
            '-' if self.peek() == Some('-') => self.read_line_comment(start),
            '-' => self.token(TokenKind::Minus, start),
            '/' if self.peek() == Some('*') => {
                self.bump();
                self.read_block_comment(start)
            }
            '<' => match self.peek() {
                Some('=') => {
                    self.bump();
                    self.token(TokenKind::Lte, start)
                }
                Some('>') => {
                    self.bump();
                    self.token(TokenKind::NotEq, start)
                }
                _ => self.token(TokenKind::Lt, start),
            },
            '>' => {
                if self.peek() == Some('=') {
                    self.bump();
                    self.token(TokenKind::Gte, start)
                } else {
                    self.token(TokenKind::Gt, start)
                }
            }
            '!' => {
                if self.peek() == Some('=') {
                    self.bump();
                    self.token(TokenKind::NotEq, start)
                } else {
                    self.token(TokenKind::Illegal, start)
                }
            }
            '\'' => {
                let backslash = self.backslash_escapes;
                match self.read_delimited('\'', backslash) {
                    Some(s) => self.token(TokenKind::String(s), start),
                    None => self.token(TokenKind::Illegal, start),
                }
            }
            '"' | '`' | '[' => {
                let close = if c == '[' { ']' } else { c };
                match self.read_delimited(close, false) {
                    Some(s) => self.token(TokenKind::QuotedIdentifier(s), start),
                    None => self.token(TokenKind::Illegal, start),
                }
            }
            c if c.is_ascii_digit() => self.read_number(start),
            c if c.is_alphabetic() || c == '_' => self.read_identifier(start),
            _ => self.token(TokenKind::Illegal, start),
        };
        Some(token)
    }
}
