//! Tokenizer for the instruction language

use crate::ScriptError;

/// A lexical token
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    True,
    False,
    Null,
    Let,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Dot,
    Comma,
    Colon,
    Semi,
    Eq,
    Minus,
}

/// Token plus the 1-based source line it started on
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub line: u32,
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: u32,
}

/// Tokenize script source.
///
/// Supports `//` line comments; whitespace is insignificant outside
/// strings.
pub fn tokenize(source: &str) -> Result<Vec<Spanned>, ScriptError> {
    let mut lexer = Lexer {
        chars: source.chars().peekable(),
        line: 1,
    };
    let mut tokens = Vec::new();
    while let Some(spanned) = lexer.next_token()? {
        tokens.push(spanned);
    }
    Ok(tokens)
}

impl Lexer<'_> {
    fn error(&self, message: impl Into<String>) -> ScriptError {
        ScriptError::Parse {
            line: self.line,
            message: message.into(),
        }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next();
        if c == Some('\n') {
            self.line += 1;
        }
        c
    }

    fn skip_trivia(&mut self) -> Result<(), ScriptError> {
        loop {
            match self.chars.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('/') => {
                    let mut ahead = self.chars.clone();
                    ahead.next();
                    if ahead.peek() != Some(&'/') {
                        return Err(self.error("unexpected character `/`"));
                    }
                    while let Some(&c) = self.chars.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn next_token(&mut self) -> Result<Option<Spanned>, ScriptError> {
        self.skip_trivia()?;
        let line = self.line;
        let Some(&c) = self.chars.peek() else {
            return Ok(None);
        };

        let token = match c {
            '(' => self.punct(Token::LParen),
            ')' => self.punct(Token::RParen),
            '[' => self.punct(Token::LBracket),
            ']' => self.punct(Token::RBracket),
            '{' => self.punct(Token::LBrace),
            '}' => self.punct(Token::RBrace),
            '.' => self.punct(Token::Dot),
            ',' => self.punct(Token::Comma),
            ':' => self.punct(Token::Colon),
            ';' => self.punct(Token::Semi),
            '=' => self.punct(Token::Eq),
            '-' => self.punct(Token::Minus),
            '"' => self.string()?,
            '0'..='9' => self.number()?,
            c if c == '_' || c == '$' || c.is_ascii_alphabetic() => self.ident(),
            other => return Err(self.error(format!("unexpected character `{other}`"))),
        };

        Ok(Some(Spanned { token, line }))
    }

    fn punct(&mut self, token: Token) -> Token {
        self.bump();
        token
    }

    fn ident(&mut self) -> Token {
        let mut name = String::new();
        while let Some(&c) = self.chars.peek() {
            if c == '_' || c == '$' || c.is_ascii_alphanumeric() {
                name.push(c);
                self.bump();
            } else {
                break;
            }
        }
        match name.as_str() {
            "true" => Token::True,
            "false" => Token::False,
            "null" => Token::Null,
            "let" => Token::Let,
            _ => Token::Ident(name),
        }
    }

    fn number(&mut self) -> Result<Token, ScriptError> {
        let mut text = String::new();
        let mut is_float = false;
        while let Some(&c) = self.chars.peek() {
            match c {
                '0'..='9' => {
                    text.push(c);
                    self.bump();
                }
                '.' => {
                    // Only part of the number when a digit follows;
                    // otherwise it is a member-access dot.
                    let mut ahead = self.chars.clone();
                    ahead.next();
                    if is_float || !matches!(ahead.peek(), Some('0'..='9')) {
                        break;
                    }
                    is_float = true;
                    text.push(c);
                    self.bump();
                }
                'e' | 'E' => {
                    is_float = true;
                    text.push(c);
                    self.bump();
                    if let Some(&sign @ ('+' | '-')) = self.chars.peek() {
                        text.push(sign);
                        self.bump();
                    }
                }
                _ => break,
            }
        }
        if is_float {
            let value: f64 = text
                .parse()
                .map_err(|_| self.error(format!("malformed number `{text}`")))?;
            Ok(Token::Float(value))
        } else {
            let value: i64 = text
                .parse()
                .map_err(|_| self.error(format!("integer literal `{text}` out of range")))?;
            Ok(Token::Int(value))
        }
    }

    fn string(&mut self) -> Result<Token, ScriptError> {
        self.bump(); // opening quote
        let mut text = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated string")),
                Some('"') => return Ok(Token::Str(text)),
                Some('\\') => text.push(self.escape()?),
                Some(c) if (c as u32) < 0x20 => {
                    return Err(self.error("raw control character in string"));
                }
                Some(c) => text.push(c),
            }
        }
    }

    fn escape(&mut self) -> Result<char, ScriptError> {
        match self.bump() {
            Some('"') => Ok('"'),
            Some('\\') => Ok('\\'),
            Some('/') => Ok('/'),
            Some('n') => Ok('\n'),
            Some('t') => Ok('\t'),
            Some('r') => Ok('\r'),
            Some('b') => Ok('\u{8}'),
            Some('f') => Ok('\u{c}'),
            Some('u') => self.unicode_escape(),
            Some(other) => Err(self.error(format!("unknown escape `\\{other}`"))),
            None => Err(self.error("unterminated string")),
        }
    }

    fn unicode_escape(&mut self) -> Result<char, ScriptError> {
        let first = self.hex4()?;
        // Combine UTF-16 surrogate pairs the way JSON strings carry them.
        let code = if (0xD800..0xDC00).contains(&first) {
            if self.bump() != Some('\\') || self.bump() != Some('u') {
                return Err(self.error("unpaired surrogate in \\u escape"));
            }
            let second = self.hex4()?;
            if !(0xDC00..0xE000).contains(&second) {
                return Err(self.error("unpaired surrogate in \\u escape"));
            }
            0x10000 + ((first - 0xD800) << 10) + (second - 0xDC00)
        } else {
            first
        };
        char::from_u32(code).ok_or_else(|| self.error("invalid \\u escape"))
    }

    fn hex4(&mut self) -> Result<u32, ScriptError> {
        let mut code = 0u32;
        for _ in 0..4 {
            let digit = self
                .bump()
                .and_then(|c| c.to_digit(16))
                .ok_or_else(|| self.error("malformed \\u escape"))?;
            code = code * 16 + digit;
        }
        Ok(code)
    }
}
