use cgmath::{Quaternion, Vector3};
use nom::branch::alt;
use nom::bytes::complete::{tag, take_until, take_while1};
use nom::character::complete::{char, not_line_ending};
use nom::combinator::{cut, map, value};
use nom::multi::many0;
use nom::sequence::{preceded, terminated};

use std::fmt;

use crate::error::FormatError;
use crate::read::utilities::into_format;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Keywords and numbers. `static` is fused with the word after it.
    Word(String),
    Str(String),
    Open,
    Close,
    Colon,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Word(w) => f.write_str(w),
            Token::Str(s) => write!(f, "\"{}\"", s),
            Token::Open => f.write_str("{"),
            Token::Close => f.write_str("}"),
            Token::Colon => f.write_str(":"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub line: usize,
}

type IResult<'a, O> = nom::IResult<&'a str, O, FormatError>;

fn is_separator(c: char) -> bool {
    c.is_whitespace() || c == ','
}

fn is_word(c: char) -> bool {
    !is_separator(c) && !matches!(c, '{' | '}' | ':' | '"')
}

/// Whitespace, commas and `//` comments running to the end of the line.
fn filler(i: &str) -> IResult<'_, ()> {
    value(
        (),
        many0(alt((
            take_while1(is_separator),
            preceded(tag("//"), not_line_ending),
        ))),
    )(i)
}

/// A quoted string. There is no escape syntax, the first `"` ends it.
fn string(i: &str) -> IResult<'_, &str> {
    preceded(char('"'), cut(terminated(take_until("\""), char('"'))))(i)
}

fn next_token(i: &str) -> IResult<'_, Token> {
    alt((
        value(Token::Open, char('{')),
        value(Token::Close, char('}')),
        value(Token::Colon, char(':')),
        map(string, |s| Token::Str(s.to_owned())),
        map(take_while1(is_word), |w: &str| Token::Word(w.to_owned())),
    ))(i)
}

fn lines(text: &str) -> usize {
    text.matches('\n').count()
}

/// Splits MDL source into tokens. Commas count as whitespace and `//` starts
/// a comment running to the end of the line.
pub fn tokenize(src: &str) -> Result<Vec<Spanned>, FormatError> {
    let mut out: Vec<Spanned> = vec![];
    let mut line = 1;
    let mut i = src;

    loop {
        let (rest, _) = filler(i).map_err(into_format)?;
        line += lines(&i[..i.len() - rest.len()]);
        if rest.is_empty() {
            break;
        }
        let (after, token) = next_token(rest).map_err(into_format)?;
        let start = line;
        line += lines(&rest[..rest.len() - after.len()]);
        i = after;

        if let Token::Word(word) = &token {
            if let Some(Spanned {
                token: Token::Word(prev),
                ..
            }) = out.last_mut()
            {
                if prev == "static" {
                    prev.push(' ');
                    prev.push_str(word);
                    continue;
                }
            }
        }
        out.push(Spanned { token, line: start });
    }
    Ok(out)
}

/// Token cursor with one token of lookahead.
#[derive(Debug, Clone)]
pub struct TokenStream {
    tokens: Vec<Spanned>,
    pos: usize,
}

impl TokenStream {
    pub fn new(src: &str) -> Result<Self, FormatError> {
        Ok(Self {
            tokens: tokenize(src)?,
            pos: 0,
        })
    }

    pub fn peek(&self) -> Option<&Spanned> {
        self.tokens.get(self.pos)
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    pub fn next(&mut self) -> Result<Spanned, FormatError> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or(FormatError::UnexpectedEof)?;
        self.pos += 1;
        Ok(token)
    }

    /// Line of the next token, or of the last one at the end of input.
    pub fn line(&self) -> usize {
        self.peek()
            .or_else(|| self.tokens.last())
            .map(|t| t.line)
            .unwrap_or(1)
    }

    pub fn unknown(token: &Spanned, block: &'static str) -> FormatError {
        FormatError::UnknownToken {
            token: token.token.to_string(),
            block,
            line: token.line,
        }
    }

    fn expect(&mut self, expected: Token, block: &'static str) -> Result<(), FormatError> {
        let token = self.next()?;
        if token.token == expected {
            Ok(())
        } else {
            Err(Self::unknown(&token, block))
        }
    }

    pub fn open(&mut self, block: &'static str) -> Result<(), FormatError> {
        self.expect(Token::Open, block)
    }

    pub fn close(&mut self, block: &'static str) -> Result<(), FormatError> {
        self.expect(Token::Close, block)
    }

    pub fn colon(&mut self, block: &'static str) -> Result<(), FormatError> {
        self.expect(Token::Colon, block)
    }

    /// Consumes a closing brace if one is next.
    pub fn at_close(&mut self) -> bool {
        match self.peek() {
            Some(Spanned {
                token: Token::Close,
                ..
            }) => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    pub fn word(&mut self, block: &'static str) -> Result<(String, usize), FormatError> {
        let token = self.next()?;
        match token.token {
            Token::Word(w) => Ok((w, token.line)),
            _ => Err(Self::unknown(&token, block)),
        }
    }

    pub fn string(&mut self, block: &'static str) -> Result<String, FormatError> {
        let token = self.next()?;
        match token.token {
            Token::Str(s) => Ok(s),
            _ => Err(Self::unknown(&token, block)),
        }
    }

    fn number<T: std::str::FromStr>(&mut self, block: &'static str) -> Result<T, FormatError> {
        let (word, line) = self.word(block)?;
        word.parse()
            .map_err(|_| FormatError::InvalidNumber { token: word, line })
    }

    pub fn float(&mut self, block: &'static str) -> Result<f32, FormatError> {
        self.number(block)
    }

    pub fn uint(&mut self, block: &'static str) -> Result<u32, FormatError> {
        self.number(block)
    }

    pub fn int(&mut self, block: &'static str) -> Result<i32, FormatError> {
        self.number(block)
    }

    pub fn vector3(&mut self, block: &'static str) -> Result<Vector3<f32>, FormatError> {
        self.open(block)?;
        let v = Vector3::new(self.float(block)?, self.float(block)?, self.float(block)?);
        self.close(block)?;
        Ok(v)
    }

    /// Written x, y, z, w.
    pub fn quaternion(&mut self, block: &'static str) -> Result<Quaternion<f32>, FormatError> {
        self.open(block)?;
        let (x, y, z, w) = (
            self.float(block)?,
            self.float(block)?,
            self.float(block)?,
            self.float(block)?,
        );
        self.close(block)?;
        Ok(Quaternion::new(w, x, y, z))
    }
}
