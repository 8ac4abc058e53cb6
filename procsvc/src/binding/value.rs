//! Binding - Values
//! ================
//!
//! Conversions between interpreter words and the native types the commands
//! need. Every word is a string; commands ask for typed views of their
//! arguments through [`Args`] and hand a [`Value`] back as their result.
//!
//! Lists are written as whitespace-separated words. `{...}` groups a word
//! literally (braces nest) and `"..."` groups a word with `\"` and `\\`
//! escapes. Bare words are taken verbatim, so Windows paths keep their
//! backslashes.

use super::error::CommandError;
use crate::process::HandleRef;

/// A command result.
#[derive(serde::Serialize, Debug, Clone, PartialEq, Eq, Default)]
pub enum Value {
    #[default]
    Empty,
    Int(i64),
    Str(String),
    List(Vec<Value>),
}

impl Value {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Str(s) => parse_int(s),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Str(s) => s.is_empty(),
            Self::List(items) => items.is_empty(),
            Self::Int(_) => false,
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => Ok(()),
            Self::Int(i) => write!(f, "{i}"),
            Self::Str(s) => f.write_str(s),
            Self::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    let element = item.to_string();
                    if needs_braces(&element) {
                        write!(f, "{{{element}}}")?;
                    } else {
                        f.write_str(&element)?;
                    }
                }
                Ok(())
            }
        }
    }
}

fn needs_braces(element: &str) -> bool {
    element.is_empty()
        || element
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '{' | '}' | '"'))
}

/// Parses an integer argument: optional sign, decimal or `0x` hex. A
/// floating point word is truncated toward zero.
pub fn parse_int(word: &str) -> Option<i64> {
    if let Some(i) = parse_wide(word) {
        return Some(i);
    }
    let float: f64 = word.trim().parse().ok()?;
    if float.is_finite() && float >= i64::MIN as f64 && float <= i64::MAX as f64 {
        Some(float.trunc() as i64)
    } else {
        None
    }
}

/// Parses a 64-bit integer without float coercion, the way handles are read.
pub fn parse_wide(word: &str) -> Option<i64> {
    let word = word.trim();
    let (negative, digits) = match word.as_bytes().first()? {
        b'-' => (true, &word[1..]),
        b'+' => (false, &word[1..]),
        _ => (false, word),
    };
    if digits.is_empty() {
        return None;
    }
    let magnitude = match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok()?,
        None if digits.bytes().all(|b| b.is_ascii_digit()) => digits.parse::<u64>().ok()?,
        None => return None,
    };
    if negative {
        0i64.checked_sub_unsigned(magnitude)
    } else {
        // handle values may use all 64 bits
        Some(magnitude as i64)
    }
}

/// Splits a command line or a list into words.
pub fn split_words(input: &str) -> Result<Vec<String>, CommandError> {
    let mut words = Vec::new();
    let mut chars = input.chars().peekable();

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        let Some(&first) = chars.peek() else {
            return Ok(words);
        };

        let mut word = String::new();
        match first {
            '{' => {
                chars.next();
                let mut depth = 1;
                loop {
                    let c = chars
                        .next()
                        .ok_or_else(|| CommandError::type_mismatch("missing close-brace"))?;
                    match c {
                        '{' => depth += 1,
                        '}' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => (),
                    }
                    word.push(c);
                }
                expect_separator(&mut chars, "extra characters after close-brace")?;
            }
            '"' => {
                chars.next();
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(c @ ('"' | '\\')) => word.push(c),
                            Some(c) => {
                                word.push('\\');
                                word.push(c);
                            }
                            None => return Err(CommandError::type_mismatch("missing \"")),
                        },
                        Some(c) => word.push(c),
                        None => return Err(CommandError::type_mismatch("missing \"")),
                    }
                }
                expect_separator(&mut chars, "extra characters after close-quote")?;
            }
            _ => {
                while let Some(c) = chars.next_if(|c| !c.is_whitespace()) {
                    word.push(c);
                }
            }
        }
        words.push(word);
    }
}

fn expect_separator(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    message: &str,
) -> Result<(), CommandError> {
    match chars.peek() {
        Some(c) if !c.is_whitespace() => Err(CommandError::type_mismatch(message)),
        _ => Ok(()),
    }
}

/// A handle argument: one handle, or a list of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleArg {
    One(HandleRef),
    Many(Vec<HandleRef>),
}

/// The words of one command invocation. Index 0 is the command name;
/// arguments start at 1.
#[derive(Debug, Clone, Copy)]
pub struct Args<'a> {
    words: &'a [String],
}

impl<'a> Args<'a> {
    pub fn new(words: &'a [String]) -> Self {
        Self { words }
    }

    pub fn name(&self) -> &'a str {
        self.words.first().map_or("", String::as_str)
    }

    /// Number of arguments, not counting the command name.
    pub fn len(&self) -> usize {
        self.words.len().saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<&'a str> {
        self.words.get(index).map(String::as_str)
    }

    /// All arguments after the command name.
    pub fn rest(&self) -> &'a [String] {
        self.words.get(1..).unwrap_or(&[])
    }

    pub fn string(&self, index: usize) -> Result<&'a str, CommandError> {
        self.get(index)
            .ok_or_else(|| CommandError::type_mismatch("No valid value"))
    }

    pub fn int(&self, index: usize) -> Result<i64, CommandError> {
        self.string(index)
            .and_then(|w| parse_int(w).ok_or_else(|| CommandError::type_mismatch("No numeric value")))
    }

    pub fn handle(&self, index: usize) -> Result<HandleRef, CommandError> {
        let word = self.string(index)?;
        parse_handle(word).ok_or_else(|| CommandError::type_mismatch("No valid value"))
    }

    /// Reads a single handle or a list of handles.
    pub fn handles(&self, index: usize) -> Result<HandleArg, CommandError> {
        let word = self.string(index)?;
        if let Some(handle) = parse_handle(word) {
            return Ok(HandleArg::One(handle));
        }
        let items = split_words(word).map_err(|_| CommandError::type_mismatch("No list object"))?;
        items
            .iter()
            .map(|item| parse_handle(item).ok_or_else(|| CommandError::type_mismatch("No valid value")))
            .collect::<Result<Vec<_>, _>>()
            .map(HandleArg::Many)
    }
}

fn parse_handle(word: &str) -> Option<HandleRef> {
    parse_wide(word).map(|raw| HandleRef(raw as u64))
}
