//! PostScript tokenizer for Type1 font programs.
//!
//! Recognizes the subset of PostScript syntax found in font programs:
//! - Numbers: integers (42, -7), reals (0.001, -.5, 1e-3) and radix
//!   numbers (8#1777, 16#FF)
//! - Strings: literal ((Copyright)) and hexadecimal (<48656C6C6F>)
//! - Names: literal (/FontName) and executable (def, dup, RD, -|)
//! - Delimiters: `[`, `]`, `{`, `}`, `<<`, `>>`
//!
//! Whitespace and comments (% to EOL) are skipped. Binary charstring data
//! following `RD`/`-|` is not tokenizable and is read with
//! [`Lexer::read_binary`].

use nom::{
    branch::alt,
    bytes::complete::{tag, take_till, take_while, take_while1},
    character::complete::{char, digit1, one_of},
    combinator::{map, opt, recognize, value},
    sequence::{delimited, pair, preceded, tuple},
    IResult,
};

/// Token types recognized by the tokenizer.
#[derive(Debug, PartialEq, Clone)]
pub enum Token<'a> {
    /// Integer number
    Integer(i64),

    /// Real number
    Real(f64),

    /// Literal string bytes, escapes not decoded (see [`decode_literal`])
    LiteralString(&'a [u8]),

    /// Hexadecimal string digits, whitespace preserved
    HexString(&'a [u8]),

    /// Literal name without its slash (`FontName` from `/FontName`)
    Name(&'a str),

    /// Executable name (`def`, `readonly`, `RD`, `-|`, ...)
    Operator(&'a str),

    /// `[`
    ArrayStart,

    /// `]`
    ArrayEnd,

    /// `{`
    ProcStart,

    /// `}`
    ProcEnd,

    /// `<<`
    DictStart,

    /// `>>`
    DictEnd,
}

impl<'a> Token<'a> {
    /// Numeric value of a number token.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Token::Integer(i) => Some(i as f64),
            Token::Real(r) => Some(r),
            _ => None,
        }
    }

    /// Integer value of a number token (reals are truncated).
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Token::Integer(i) => Some(i),
            Token::Real(r) => Some(r as i64),
            _ => None,
        }
    }

    /// Whether the token is the executable name `op`.
    pub fn is_operator(&self, op: &str) -> bool {
        matches!(self, Token::Operator(o) if *o == op)
    }
}

fn is_whitespace(c: u8) -> bool {
    matches!(c, b' ' | b'\t' | b'\r' | b'\n' | 0x00 | 0x0C)
}

fn is_delimiter(c: u8) -> bool {
    matches!(c, b'/' | b'%' | b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}')
}

fn is_regular(c: u8) -> bool {
    !is_whitespace(c) && !is_delimiter(c)
}

fn error<T>(input: &[u8], kind: nom::error::ErrorKind) -> IResult<&[u8], T> {
    Err(nom::Err::Error(nom::error::Error::new(input, kind)))
}

fn whitespace(input: &[u8]) -> IResult<&[u8], ()> {
    value((), take_while1(is_whitespace))(input)
}

fn comment(input: &[u8]) -> IResult<&[u8], ()> {
    value((), preceded(char('%'), take_till(|c| c == b'\r' || c == b'\n')))(input)
}

/// Skip all whitespace and comments.
fn skip_ws(input: &[u8]) -> &[u8] {
    let mut remaining = input;
    loop {
        if let Ok((rest, _)) = whitespace(remaining) {
            remaining = rest;
            continue;
        }
        if let Ok((rest, _)) = comment(remaining) {
            remaining = rest;
            continue;
        }
        return remaining;
    }
}

/// `base#digits`, e.g. `8#1777`.
fn parse_radix_number(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (rest, (base, _, digits)) =
        tuple((digit1, char('#'), take_while1(|c: u8| c.is_ascii_alphanumeric())))(input)?;
    let base = std::str::from_utf8(base)
        .ok()
        .and_then(|b| b.parse::<u32>().ok())
        .filter(|b| (2..=36).contains(b));
    let Some(base) = base else {
        return error(input, nom::error::ErrorKind::Digit);
    };
    let parsed = std::str::from_utf8(digits)
        .ok()
        .and_then(|d| i64::from_str_radix(d, base).ok());
    match parsed {
        Some(n) => Ok((rest, Token::Integer(n))),
        None => error(input, nom::error::ErrorKind::Digit),
    }
}

/// Integers and reals, with an optional exponent.
fn parse_number(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (rest, text) = recognize(tuple((
        opt(one_of("+-")),
        alt((
            recognize(pair(digit1, opt(pair(char('.'), opt(digit1))))),
            recognize(pair(char('.'), digit1)),
        )),
        opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
    )))(input)?;

    // `12abc` is a name, not a number followed by a name
    if rest.first().is_some_and(|&c| is_regular(c)) {
        return error(input, nom::error::ErrorKind::Digit);
    }

    let Ok(text) = std::str::from_utf8(text) else {
        return error(input, nom::error::ErrorKind::Digit);
    };
    let is_real = text.contains(['.', 'e', 'E']);
    if !is_real {
        if let Ok(n) = text.parse::<i64>() {
            return Ok((rest, Token::Integer(n)));
        }
    }
    match text.parse::<f64>() {
        Ok(r) => Ok((rest, Token::Real(r))),
        Err(_) => error(input, nom::error::ErrorKind::Float),
    }
}

/// Literal string with balanced parentheses and backslash escapes.
fn parse_literal_string(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (remaining, _) = char('(')(input)?;
    let mut depth = 1;
    let mut pos = 0;

    while depth > 0 && pos < remaining.len() {
        match remaining[pos] {
            b'\\' => pos += 2,
            b'(' => {
                depth += 1;
                pos += 1;
            },
            b')' => {
                depth -= 1;
                pos += 1;
            },
            _ => pos += 1,
        }
    }

    if depth != 0 || pos > remaining.len() {
        return error(input, nom::error::ErrorKind::Tag);
    }

    Ok((&remaining[pos..], Token::LiteralString(&remaining[..pos - 1])))
}

fn parse_hex_string(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    if input.starts_with(b"<<") {
        return error(input, nom::error::ErrorKind::Tag);
    }
    delimited(
        char('<'),
        map(
            take_while(|c: u8| c.is_ascii_hexdigit() || is_whitespace(c)),
            Token::HexString,
        ),
        char('>'),
    )(input)
}

fn parse_name(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (rest, bytes) = preceded(char('/'), take_while(is_regular))(input)?;
    match std::str::from_utf8(bytes) {
        Ok(name) => Ok((rest, Token::Name(name))),
        Err(_) => error(input, nom::error::ErrorKind::Char),
    }
}

fn parse_operator(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (rest, bytes) = take_while1(is_regular)(input)?;
    match std::str::from_utf8(bytes) {
        Ok(op) => Ok((rest, Token::Operator(op))),
        Err(_) => error(input, nom::error::ErrorKind::Char),
    }
}

fn parse_delimiter(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    alt((
        value(Token::DictStart, tag(b"<<")),
        value(Token::DictEnd, tag(b">>")),
        value(Token::ArrayStart, tag(b"[")),
        value(Token::ArrayEnd, tag(b"]")),
        value(Token::ProcStart, tag(b"{")),
        value(Token::ProcEnd, tag(b"}")),
    ))(input)
}

/// Parse a single token, skipping leading whitespace and comments.
pub fn token(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let input = skip_ws(input);
    alt((
        parse_delimiter,
        parse_hex_string,
        parse_literal_string,
        parse_name,
        parse_radix_number,
        parse_number,
        parse_operator,
    ))(input)
}

/// Decode the escapes of a literal string body.
///
/// Handles `\n \r \t \b \f \\ \( \)`, octal `\ddd` and backslash line
/// continuation. Unknown escapes yield the escaped character.
pub fn decode_literal(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        let b = raw[i];
        i += 1;
        if b != b'\\' {
            out.push(b);
            continue;
        }
        let Some(&esc) = raw.get(i) else {
            break;
        };
        i += 1;
        match esc {
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0C),
            b'0'..=b'7' => {
                let mut code = (esc - b'0') as u32;
                for _ in 0..2 {
                    match raw.get(i) {
                        Some(&d @ b'0'..=b'7') => {
                            code = code * 8 + (d - b'0') as u32;
                            i += 1;
                        },
                        _ => break,
                    }
                }
                out.push((code & 0xFF) as u8);
            },
            b'\r' => {
                if raw.get(i) == Some(&b'\n') {
                    i += 1;
                }
            },
            b'\n' => {},
            other => out.push(other),
        }
    }
    out
}

/// Decode a literal string as Latin-1 text.
pub fn literal_text(raw: &[u8]) -> String {
    decode_literal(raw).into_iter().map(char::from).collect()
}

/// Sequential tokenizer over a byte buffer with access to raw binary runs.
#[derive(Debug, Clone)]
pub struct Lexer<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Start tokenizing at `pos`; offsets stay relative to `data`.
    pub fn with_offset(data: &'a [u8], pos: usize) -> Self {
        Self {
            data,
            pos: pos.min(data.len()),
        }
    }

    /// The next token without consuming it.
    pub fn peek(&self) -> Option<Token<'a>> {
        self.clone().next_token()
    }

    /// Byte offset of the next unread byte.
    pub fn offset(&self) -> usize {
        self.pos
    }

    /// Offset at which the next token starts (after whitespace/comments).
    pub fn next_token_start(&self) -> usize {
        let rest = &self.data[self.pos..];
        self.pos + (rest.len() - skip_ws(rest).len())
    }

    /// Next token, or `None` at end of input. Bytes that start no token
    /// (a stray `)` or `>`) are skipped.
    pub fn next_token(&mut self) -> Option<Token<'a>> {
        loop {
            let rest = &self.data[self.pos..];
            if skip_ws(rest).is_empty() {
                self.pos = self.data.len();
                return None;
            }
            match token(rest) {
                Ok((remaining, tok)) => {
                    self.pos = self.data.len() - remaining.len();
                    return Some(tok);
                },
                Err(_) => {
                    let start = self.data.len() - skip_ws(rest).len();
                    self.pos = start + 1;
                },
            }
        }
    }

    /// Read `len` raw bytes following an `RD`-style operator, which is
    /// separated from its data by exactly one whitespace byte.
    pub fn read_binary(&mut self, len: usize) -> Option<&'a [u8]> {
        let start = self.pos + 1;
        let end = start.checked_add(len)?;
        let bytes = self.data.get(start..end)?;
        self.pos = end;
        Some(bytes)
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_token()
    }
}
