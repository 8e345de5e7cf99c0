// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Zelkova Contributors

//! Restricted literal evaluator for property values.
//!
//! Accepts JSON literals plus a few spellings common in hand-written tree
//! files: single-quoted strings, tuples (parsed as arrays), and
//! `True`/`False`/`None`. Nothing here can observe side effects.

use serde_json::Value;

/// Parse a literal expression, or describe why it isn't one.
pub fn parse_literal(input: &str) -> Result<Value, String> {
    let mut p = Cursor::new(input);
    p.skip_ws();
    let value = p.value()?;
    p.skip_ws();
    if let Some(ch) = p.peek() {
        return Err(format!("unexpected character {ch:?} after literal"));
    }
    Ok(value)
}

struct Cursor<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
}

impl<'a> Cursor<'a> {
    fn new(input: &'a str) -> Self {
        Cursor {
            chars: input.chars().peekable(),
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn bump(&mut self) -> Option<char> {
        self.chars.next()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
    }

    fn eat(&mut self, ch: char) -> bool {
        if self.peek() == Some(ch) {
            self.bump();
            return true;
        }
        false
    }

    fn value(&mut self) -> Result<Value, String> {
        match self.peek() {
            None => Err("empty expression".to_string()),
            Some('"') | Some('\'') => self.string().map(Value::String),
            Some('[') => self.sequence('[', ']'),
            Some('(') => self.sequence('(', ')'),
            Some('{') => self.mapping(),
            Some(c) if c.is_ascii_digit() || c == '-' || c == '+' => self.number(),
            Some(c) if c.is_alphabetic() => self.word(),
            Some(c) => Err(format!("unexpected character {c:?}")),
        }
    }

    fn string(&mut self) -> Result<String, String> {
        let quote = self.bump().unwrap_or('"');
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err("unterminated string".to_string()),
                Some(c) if c == quote => return Ok(out),
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some('\\') => out.push('\\'),
                    Some('\'') => out.push('\''),
                    Some('"') => out.push('"'),
                    Some(c) => return Err(format!("bad escape '\\{c}'")),
                    None => return Err("unterminated string".to_string()),
                },
                Some(c) => out.push(c),
            }
        }
    }

    fn number(&mut self) -> Result<Value, String> {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E') {
                text.push(c);
                self.bump();
            } else {
                break;
            }
        }
        if let Ok(n) = text.parse::<i64>() {
            return Ok(Value::from(n));
        }
        let f: f64 = text
            .parse()
            .map_err(|_| format!("bad number {text:?}"))?;
        serde_json::Number::from_f64(f)
            .map(Value::Number)
            .ok_or_else(|| format!("bad number {text:?}"))
    }

    fn word(&mut self) -> Result<Value, String> {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                text.push(c);
                self.bump();
            } else {
                break;
            }
        }
        match text.as_str() {
            "true" | "True" => Ok(Value::Bool(true)),
            "false" | "False" => Ok(Value::Bool(false)),
            "null" | "None" => Ok(Value::Null),
            _ => Err(format!("unknown name {text:?}")),
        }
    }

    fn sequence(&mut self, open: char, close: char) -> Result<Value, String> {
        self.eat(open);
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            if self.eat(close) {
                return Ok(Value::Array(items));
            }
            items.push(self.value()?);
            self.skip_ws();
            if !self.eat(',') && self.peek() != Some(close) {
                return Err(format!("expected ',' or {close:?}"));
            }
        }
    }

    fn mapping(&mut self) -> Result<Value, String> {
        self.eat('{');
        let mut map = serde_json::Map::new();
        loop {
            self.skip_ws();
            if self.eat('}') {
                return Ok(Value::Object(map));
            }
            let key = match self.peek() {
                Some('"') | Some('\'') => self.string()?,
                _ => return Err("expected string key".to_string()),
            };
            self.skip_ws();
            if !self.eat(':') {
                return Err("expected ':' after key".to_string());
            }
            self.skip_ws();
            let value = self.value()?;
            map.insert(key, value);
            self.skip_ws();
            if !self.eat(',') && self.peek() != Some('}') {
                return Err("expected ',' or '}'".to_string());
            }
        }
    }
}

#[cfg(test)]
#[path = "literal_tests.rs"]
mod tests;
