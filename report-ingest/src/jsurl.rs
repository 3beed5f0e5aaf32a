//! JSURL: a compact, URL-safe rendering of JSON values.
//!
//! # Grammar
//!
//! ```text
//! value   := "~" ( "null" | "true" | "false" | number | "'" string | "(" composite ")" )
//! array   := "~" | value+                 e.g. ~(~1~'a)   empty: ~(~)
//! object  := ( key value ( "~" key value )* )?   e.g. ~(a~1~b~'x)   empty: ~()
//! ```
//!
//! Strings and keys keep `[A-Za-z0-9_.-]` as-is. `$` becomes `!`, any other
//! UTF-16 code unit below `0x100` becomes `*hh` and the rest become `**hhhh`.
//! The output therefore never needs further escaping inside a query string or
//! form body.
//!
//! Values are produced through `serde_json`, so `Option::None` fields marked
//! `skip_serializing_if` are omitted rather than written as `~null`.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Number, Value};
use std::borrow::Cow;
use std::fmt::Write;

#[derive(thiserror::Error, Debug)]
pub enum EncodeError {
    #[error("value is not representable as JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// `~(~…)` already means an array, so an empty key would not decode back
    /// into an object.
    #[error("object keys must not be empty")]
    EmptyKey,
}

#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("unexpected end of input at offset {0}")]
    UnexpectedEnd(usize),
    #[error("expected '{expected}' at offset {offset}")]
    Expected { expected: char, offset: usize },
    #[error("bad value keyword: {0}")]
    BadKeyword(String),
    #[error("invalid number: {0}")]
    InvalidNumber(String),
    #[error("invalid escape sequence at offset {0}")]
    InvalidEscape(usize),
    #[error("trailing characters at offset {0}")]
    TrailingCharacters(usize),
    #[error("decoded value has the wrong shape: {0}")]
    Json(#[from] serde_json::Error),
}

/// Serializes `value` into its JSURL form.
pub fn to_string<T>(value: &T) -> Result<String, EncodeError>
where
    T: Serialize + ?Sized,
{
    let value = serde_json::to_value(value)?;
    let mut out = String::new();
    write_value(&value, &mut out)?;
    Ok(out)
}

/// Deserializes a JSURL string into `T`.
pub fn from_str<T: DeserializeOwned>(input: &str) -> Result<T, DecodeError> {
    let value = parse(input)?;
    Ok(serde_json::from_value(value)?)
}

/// Parses a JSURL string into a JSON value.
pub fn parse(input: &str) -> Result<Value, DecodeError> {
    let input = unmangle_quotes(input);
    let mut parser = Parser {
        s: &input,
        pos: 0,
    };

    let value = parser.parse_one()?;
    if parser.pos != parser.s.len() {
        return Err(DecodeError::TrailingCharacters(parser.pos));
    }
    Ok(value)
}

fn write_value(value: &Value, out: &mut String) -> Result<(), EncodeError> {
    match value {
        Value::Null => out.push_str("~null"),
        Value::Bool(true) => out.push_str("~true"),
        Value::Bool(false) => out.push_str("~false"),
        Value::Number(number) => {
            out.push('~');
            out.push_str(&number.to_string());
        }
        Value::String(s) => {
            out.push_str("~'");
            escape_into(s, out);
        }
        Value::Array(items) => {
            out.push_str("~(");
            if items.is_empty() {
                out.push('~');
            }
            for item in items {
                write_value(item, out)?;
            }
            out.push(')');
        }
        Value::Object(map) => {
            out.push_str("~(");
            for (i, (key, value)) in map.iter().enumerate() {
                if key.is_empty() {
                    return Err(EncodeError::EmptyKey);
                }
                if i > 0 {
                    out.push('~');
                }
                escape_into(key, out);
                write_value(value, out)?;
            }
            out.push(')');
        }
    }
    Ok(())
}

fn escape_into(s: &str, out: &mut String) {
    for ch in s.chars() {
        match ch {
            'A'..='Z' | 'a'..='z' | '0'..='9' | '_' | '-' | '.' => out.push(ch),
            '$' => out.push('!'),
            _ => {
                let mut units = [0u16; 2];
                for unit in ch.encode_utf16(&mut units) {
                    // Writing into a String cannot fail.
                    let _ = if *unit < 0x100 {
                        write!(out, "*{unit:02x}")
                    } else {
                        write!(out, "**{unit:04x}")
                    };
                }
            }
        }
    }
}

/// Some mail clients and chat tools percent-encode the quote that introduces
/// a string, sometimes more than once (`%27`, `%2527`, ...).
fn unmangle_quotes(input: &str) -> Cow<'_, str> {
    if !input.contains('%') {
        return Cow::Borrowed(input);
    }

    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let mut tail = &rest[pos + 1..];
        while let Some(stripped) = tail.strip_prefix("25") {
            tail = stripped;
        }
        match tail.strip_prefix("27") {
            Some(after) => {
                out.push('\'');
                rest = after;
            }
            None => {
                out.push('%');
                rest = &rest[pos + 1..];
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

struct Parser<'a> {
    s: &'a str,
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<u8> {
        self.s.as_bytes().get(self.pos).copied()
    }

    fn eat(&mut self, expected: u8) -> Result<(), DecodeError> {
        match self.peek() {
            Some(b) if b == expected => {
                self.pos += 1;
                Ok(())
            }
            Some(_) => Err(DecodeError::Expected {
                expected: expected as char,
                offset: self.pos,
            }),
            None => Err(DecodeError::UnexpectedEnd(self.pos)),
        }
    }

    fn parse_one(&mut self) -> Result<Value, DecodeError> {
        self.eat(b'~')?;

        match self.peek() {
            Some(b'(') => {
                self.pos += 1;
                let value = if self.peek() == Some(b'~') {
                    self.parse_array_items()?
                } else {
                    self.parse_object_entries()?
                };
                self.eat(b')')?;
                Ok(value)
            }
            Some(b'\'') => {
                self.pos += 1;
                Ok(Value::String(self.decode_string()?))
            }
            Some(first) => {
                let start = self.pos;
                self.pos += 1;
                while let Some(b) = self.peek() {
                    if b == b')' || b == b'~' {
                        break;
                    }
                    self.pos += 1;
                }
                let token = &self.s[start..self.pos];

                if first.is_ascii_digit() || first == b'-' {
                    parse_number(token)
                } else {
                    match token {
                        "true" => Ok(Value::Bool(true)),
                        "false" => Ok(Value::Bool(false)),
                        "null" => Ok(Value::Null),
                        other => Err(DecodeError::BadKeyword(other.to_string())),
                    }
                }
            }
            None => Err(DecodeError::UnexpectedEnd(self.pos)),
        }
    }

    fn parse_array_items(&mut self) -> Result<Value, DecodeError> {
        let mut items = Vec::new();

        // `~(~)` is the empty array
        if self.s.as_bytes().get(self.pos + 1) == Some(&b')') {
            self.pos += 1;
            return Ok(Value::Array(items));
        }

        while self.peek() == Some(b'~') {
            items.push(self.parse_one()?);
        }
        Ok(Value::Array(items))
    }

    fn parse_object_entries(&mut self) -> Result<Value, DecodeError> {
        let mut map = Map::new();
        if self.peek() == Some(b')') {
            return Ok(Value::Object(map));
        }

        loop {
            let key = self.decode_string()?;
            let value = self.parse_one()?;
            map.insert(key, value);

            if self.peek() == Some(b'~') {
                self.pos += 1;
            } else {
                break;
            }
        }
        Ok(Value::Object(map))
    }

    /// Reads an escaped string up to the next `~` or `)`.
    fn decode_string(&mut self) -> Result<String, DecodeError> {
        let mut units: Vec<u16> = Vec::new();
        let mut beg = self.pos;

        while let Some(b) = self.peek() {
            match b {
                b'~' | b')' => break,
                b'*' => {
                    units.extend(self.s[beg..self.pos].encode_utf16());
                    let (width, start) = if self.s.as_bytes().get(self.pos + 1) == Some(&b'*') {
                        (4, self.pos + 2)
                    } else {
                        (2, self.pos + 1)
                    };
                    let unit = self
                        .s
                        .get(start..start + width)
                        .filter(|hex| hex.bytes().all(|b| b.is_ascii_hexdigit()))
                        .and_then(|hex| u16::from_str_radix(hex, 16).ok())
                        .ok_or(DecodeError::InvalidEscape(self.pos))?;
                    units.push(unit);
                    self.pos = start + width;
                    beg = self.pos;
                }
                b'!' => {
                    units.extend(self.s[beg..self.pos].encode_utf16());
                    units.push(u16::from(b'$'));
                    self.pos += 1;
                    beg = self.pos;
                }
                _ => self.pos += 1,
            }
        }
        units.extend(self.s[beg..self.pos].encode_utf16());

        String::from_utf16(&units).map_err(|_| DecodeError::InvalidEscape(beg))
    }
}

fn parse_number(token: &str) -> Result<Value, DecodeError> {
    if let Ok(n) = token.parse::<u64>() {
        return Ok(Value::Number(n.into()));
    }
    if let Ok(n) = token.parse::<i64>() {
        return Ok(Value::Number(n.into()));
    }
    token
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| DecodeError::InvalidNumber(token.to_string()))
}
