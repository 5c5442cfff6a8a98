//! Parsing of Python literal expressions into JSON.
//!
//! ASDF auxiliary dictionaries are stored as the `repr` of a Python dictionary.
//! The supported grammar is the subset produced by `repr` of dictionaries of strings, numbers, `None`, booleans, lists, tuples and `numpy` scalars and arrays (`float32(1.5)`, `array([1, 2], dtype=float32)`).
//! Calls to `numpy` constructors are replaced by their first positional argument, keyword arguments naming `numpy` types are accepted and ignored, and tuples become arrays.
//! Any other call or bare name is rejected.

use serde_json::{Map, Number, Value};
use thiserror::Error;

const MAX_DEPTH: usize = 128;

/// The `numpy` constructors and scalar types that may be called or named.
const NUMPY_NAMES: &[&str] = &[
    "array", "asarray", "bool_", "int8", "int16", "int32", "int64", "uint8", "uint16", "uint32",
    "uint64", "float16", "float32", "float64", "str_", "bytes_",
];

/// Returns true if `identifier` is a `numpy` constructor or scalar type, with or without a module prefix.
fn is_numpy_name(identifier: &str) -> bool {
    let name = identifier
        .strip_prefix("numpy.")
        .or_else(|| identifier.strip_prefix("np."))
        .unwrap_or(identifier);
    NUMPY_NAMES.contains(&name)
}

/// A Python literal parse error.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid Python literal at position {position}: {message}")]
pub struct PythonLiteralError {
    position: usize,
    message: String,
}

impl PythonLiteralError {
    /// Return the byte position of the error.
    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }
}

/// Parse a Python literal expression.
///
/// Dictionary keys that are not strings are converted to their text. Non-finite floats become `null`.
///
/// # Errors
/// Returns a [`PythonLiteralError`] if `text` is not a supported literal or has trailing characters.
pub fn parse(text: &str) -> Result<Value, PythonLiteralError> {
    let mut parser = Parser { text, position: 0 };
    let value = parser.value(0)?;
    parser.skip_whitespace();
    if parser.position < text.len() {
        return Err(parser.error("unexpected trailing characters"));
    }
    Ok(value)
}

struct Parser<'a> {
    text: &'a str,
    position: usize,
}

impl<'a> Parser<'a> {
    fn error(&self, message: impl Into<String>) -> PythonLiteralError {
        PythonLiteralError {
            position: self.position,
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.text[self.position..].chars().next()
    }

    fn next(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.position += c.len_utf8();
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.next();
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), PythonLiteralError> {
        self.skip_whitespace();
        match self.next() {
            Some(c) if c == expected => Ok(()),
            Some(c) => Err(self.error(format!("expected '{expected}', found '{c}'"))),
            None => Err(self.error(format!("expected '{expected}', found end of input"))),
        }
    }

    /// Consume `close` if it is the next character.
    fn close(&mut self, close: char) -> bool {
        self.skip_whitespace();
        if self.peek() == Some(close) {
            self.next();
            true
        } else {
            false
        }
    }

    fn value(&mut self, depth: usize) -> Result<Value, PythonLiteralError> {
        if depth > MAX_DEPTH {
            return Err(self.error("nesting is too deep"));
        }
        self.skip_whitespace();
        match self.peek() {
            Some('{') => self.dict(depth),
            Some('[') => {
                self.next();
                Ok(Value::Array(self.items(']', depth)?.0))
            }
            Some('(') => {
                self.next();
                let (mut items, trailing_comma) = self.items(')', depth)?;
                if items.len() == 1 && !trailing_comma {
                    Ok(items.remove(0))
                } else {
                    Ok(Value::Array(items))
                }
            }
            Some('\'' | '"') => self.string().map(Value::String),
            Some(c) if c.is_ascii_digit() || matches!(c, '-' | '+' | '.') => self.number(),
            Some(c) if c.is_alphabetic() || c == '_' => self.identifier(depth),
            Some(c) => Err(self.error(format!("unexpected character '{c}'"))),
            None => Err(self.error("unexpected end of input")),
        }
    }

    /// Parse comma separated values up to `close`, returning them and whether the last was followed by a comma.
    fn items(
        &mut self,
        close: char,
        depth: usize,
    ) -> Result<(Vec<Value>, bool), PythonLiteralError> {
        let mut items = Vec::new();
        let mut trailing_comma = false;
        loop {
            if self.close(close) {
                return Ok((items, trailing_comma));
            }
            items.push(self.value(depth + 1)?);
            if self.close(close) {
                return Ok((items, false));
            }
            self.expect(',')?;
            trailing_comma = true;
        }
    }

    fn dict(&mut self, depth: usize) -> Result<Value, PythonLiteralError> {
        self.expect('{')?;
        let mut map = Map::new();
        loop {
            if self.close('}') {
                return Ok(Value::Object(map));
            }
            let key = match self.value(depth + 1)? {
                Value::String(key) => key,
                Value::Null => "None".to_string(),
                Value::Bool(true) => "True".to_string(),
                Value::Bool(false) => "False".to_string(),
                Value::Number(number) => number.to_string(),
                Value::Array(_) | Value::Object(_) => {
                    return Err(self.error("unhashable dictionary key"))
                }
            };
            self.expect(':')?;
            let value = self.value(depth + 1)?;
            map.insert(key, value);
            if self.close('}') {
                return Ok(Value::Object(map));
            }
            self.expect(',')?;
        }
    }

    fn string(&mut self) -> Result<String, PythonLiteralError> {
        let Some(quote) = self.next() else {
            return Err(self.error("expected a string"));
        };
        let mut string = String::new();
        loop {
            match self.next() {
                None => return Err(self.error("unterminated string")),
                Some(c) if c == quote => break,
                Some('\\') => match self.next() {
                    Some('n') => string.push('\n'),
                    Some('t') => string.push('\t'),
                    Some('r') => string.push('\r'),
                    Some('0') => string.push('\0'),
                    Some('x') => string.push(self.code_point(2)?),
                    Some('u') => string.push(self.code_point(4)?),
                    Some('U') => string.push(self.code_point(8)?),
                    Some('\n') => {}
                    Some(c @ ('\\' | '\'' | '"')) => string.push(c),
                    Some(c) => {
                        string.push('\\');
                        string.push(c);
                    }
                    None => return Err(self.error("unterminated string")),
                },
                Some(c) => string.push(c),
            }
        }
        Ok(string)
    }

    fn code_point(&mut self, digits: usize) -> Result<char, PythonLiteralError> {
        let start = self.position;
        let end = start + digits;
        let hex = self
            .text
            .get(start..end)
            .ok_or_else(|| self.error("truncated escape sequence"))?;
        let code = u32::from_str_radix(hex, 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| self.error(format!("invalid escape sequence {hex}")))?;
        self.position = end;
        Ok(code)
    }

    fn number(&mut self) -> Result<Value, PythonLiteralError> {
        let start = self.position;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '+' | '.' | '_'))
        {
            self.next();
        }
        let text = self.text[start..self.position].replace('_', "");
        let text = text.strip_prefix('+').unwrap_or(&text);
        if let Ok(value) = text.parse::<i64>() {
            return Ok(Value::Number(value.into()));
        }
        if let Ok(value) = text.parse::<u64>() {
            return Ok(Value::Number(value.into()));
        }
        match text {
            "-inf" | "-nan" => return Ok(Value::Null),
            _ => {}
        }
        text.parse::<f64>()
            .map(|value| Number::from_f64(value).map_or(Value::Null, Value::Number))
            .map_err(|_| PythonLiteralError {
                position: start,
                message: format!("invalid number {text}"),
            })
    }

    fn identifier_text(&mut self) -> &'a str {
        let text = self.text;
        let start = self.position;
        while self
            .peek()
            .is_some_and(|c| c.is_alphanumeric() || matches!(c, '_' | '.'))
        {
            self.next();
        }
        &text[start..self.position]
    }

    fn identifier(&mut self, depth: usize) -> Result<Value, PythonLiteralError> {
        let start = self.position;
        let identifier = self.identifier_text();
        if matches!(self.peek(), Some('\'' | '"')) && matches!(identifier, "b" | "u" | "r") {
            return self.string().map(Value::String);
        }
        match identifier {
            "None" | "nan" | "inf" | "NaN" => return Ok(Value::Null),
            "True" => return Ok(Value::Bool(true)),
            "False" => return Ok(Value::Bool(false)),
            _ => {}
        }
        if !is_numpy_name(identifier) {
            return Err(PythonLiteralError {
                position: start,
                message: format!("unknown name {identifier}"),
            });
        }
        if !self.close('(') {
            return Err(PythonLiteralError {
                position: start,
                message: format!("{identifier} is not called"),
            });
        }
        self.call_arguments(identifier, depth)
    }

    /// Consume `name=` if a keyword argument follows.
    fn keyword(&mut self) -> bool {
        let start = self.position;
        self.skip_whitespace();
        let name = self.identifier_text();
        let is_keyword = !name.is_empty() && !name.contains('.') && {
            self.skip_whitespace();
            let rest = &self.text[self.position..];
            rest.starts_with('=') && !rest.starts_with("==")
        };
        if is_keyword {
            self.next();
        } else {
            self.position = start;
        }
        is_keyword
    }

    /// Parse a keyword argument value, which may be a bare `numpy` type such as `float32`.
    fn keyword_value(&mut self, depth: usize) -> Result<(), PythonLiteralError> {
        self.skip_whitespace();
        let start = self.position;
        let name = self.identifier_text();
        if is_numpy_name(name) {
            self.skip_whitespace();
            if self.peek() != Some('(') {
                return Ok(());
            }
        }
        self.position = start;
        self.value(depth + 1).map(|_| ())
    }

    /// Parse the arguments of a call, returning its first positional argument.
    fn call_arguments(
        &mut self,
        identifier: &str,
        depth: usize,
    ) -> Result<Value, PythonLiteralError> {
        let mut first = None;
        loop {
            if self.close(')') {
                break;
            }
            if self.keyword() {
                self.keyword_value(depth)?;
            } else {
                let argument = self.value(depth + 1)?;
                if first.is_none() {
                    first = Some(argument);
                }
            }
            if self.close(')') {
                break;
            }
            self.expect(',')?;
        }
        first.ok_or_else(|| self.error(format!("call to {identifier} has no arguments")))
    }
}
