//! Strict parser for rule-parameter literals.
//!
//! Alert rule rows carry their thresholds as a dictionary literal, for
//! example:
//!
//! ```text
//! {'TMAX_CRIT': [38.0], 'TMAX_STRESS_DURATION': 3, 'TMAX_CRIT_BBCH': ['BBCH_21']}
//! ```
//!
//! Only a small literal grammar is accepted: a dictionary of quoted keys to
//! numbers, quoted strings, or flat lists of those. Single or double quotes,
//! and a trailing comma before a closing bracket. Anything else, including
//! arithmetic, names, and nested containers, is rejected with the byte
//! position of the problem.

use std::collections::BTreeMap;
use std::iter::Peekable;
use std::str::CharIndices;

/// Errors raised while parsing or reading rule parameters.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParameterError {
    /// The text is not a valid parameter literal.
    #[error("syntax error at byte {position}: {reason}")]
    Syntax {
        /// Byte offset of the problem.
        position: usize,
        /// What was expected.
        reason: String,
    },

    /// The same key appears twice.
    #[error("duplicate parameter {key}")]
    DuplicateKey {
        /// The repeated key.
        key: String,
    },

    /// A required parameter is absent.
    #[error("missing parameter {key}")]
    Missing {
        /// The absent key.
        key: String,
    },

    /// A parameter has the wrong shape.
    #[error("parameter {key} must be {expected}")]
    WrongType {
        /// The offending key.
        key: String,
        /// Description of the accepted shape.
        expected: &'static str,
    },
}

/// A parsed scalar or list value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// A numeric literal. `integer` is set when the literal is a whole
    /// number written without a fraction or exponent.
    Number {
        /// The value as a float.
        value: f64,
        /// The value as an integer, for integer literals.
        integer: Option<i64>,
    },
    /// A quoted string.
    Text(String),
    /// A flat list of scalars.
    List(Vec<ParamValue>),
}

impl ParamValue {
    const fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number { value, .. } => Some(*value),
            Self::Text(_) | Self::List(_) => None,
        }
    }

    const fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Number { integer, .. } => *integer,
            Self::Text(_) | Self::List(_) => None,
        }
    }

    fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Number { .. } | Self::List(_) => None,
        }
    }

    /// The value as a list; a scalar reads as a one-element list.
    fn items(&self) -> &[Self] {
        match self {
            Self::List(items) => items,
            scalar => core::slice::from_ref(scalar),
        }
    }
}

/// A parsed parameter dictionary with typed accessors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterSet {
    entries: BTreeMap<String, ParamValue>,
}

impl ParameterSet {
    /// Parse a dictionary literal.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::Syntax`] for malformed text and
    /// [`ParameterError::DuplicateKey`] for repeated keys.
    pub fn parse(text: &str) -> Result<Self, ParameterError> {
        Parser::new(text).dictionary()
    }

    /// Iterate over the parameter names.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Whether `key` is present.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Raw access to a value.
    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.entries.get(key)
    }

    fn require(&self, key: &str) -> Result<&ParamValue, ParameterError> {
        self.entries.get(key).ok_or_else(|| ParameterError::Missing {
            key: key.to_owned(),
        })
    }

    /// A list of numbers. A single number reads as a one-element list.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::Missing`] or [`ParameterError::WrongType`].
    pub fn numbers(&self, key: &str) -> Result<Vec<f64>, ParameterError> {
        self.require(key)?
            .items()
            .iter()
            .map(|item| {
                item.as_number().ok_or_else(|| ParameterError::WrongType {
                    key: key.to_owned(),
                    expected: "a number or a list of numbers",
                })
            })
            .collect()
    }

    /// A list of strings. A single string reads as a one-element list.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::Missing`] or [`ParameterError::WrongType`].
    pub fn texts(&self, key: &str) -> Result<Vec<String>, ParameterError> {
        self.require(key)?
            .items()
            .iter()
            .map(|item| {
                item.as_text()
                    .map(str::to_owned)
                    .ok_or_else(|| ParameterError::WrongType {
                        key: key.to_owned(),
                        expected: "a string or a list of strings",
                    })
            })
            .collect()
    }

    /// A single string.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::Missing`] or [`ParameterError::WrongType`].
    pub fn text(&self, key: &str) -> Result<&str, ParameterError> {
        self.require(key)?
            .as_text()
            .ok_or_else(|| ParameterError::WrongType {
                key: key.to_owned(),
                expected: "a string",
            })
    }

    /// A single integer literal.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::Missing`] or [`ParameterError::WrongType`].
    pub fn integer(&self, key: &str) -> Result<i64, ParameterError> {
        self.require(key)?
            .as_integer()
            .ok_or_else(|| ParameterError::WrongType {
                key: key.to_owned(),
                expected: "an integer",
            })
    }

    /// A list of integer literals. A single integer reads as a one-element
    /// list.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::Missing`] or [`ParameterError::WrongType`].
    pub fn integers(&self, key: &str) -> Result<Vec<i64>, ParameterError> {
        self.require(key)?
            .items()
            .iter()
            .map(|item| {
                item.as_integer().ok_or_else(|| ParameterError::WrongType {
                    key: key.to_owned(),
                    expected: "an integer or a list of integers",
                })
            })
            .collect()
    }
}

struct Parser<'a> {
    text: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            chars: text.char_indices().peekable(),
        }
    }

    fn position(&mut self) -> usize {
        self.chars.peek().map_or(self.text.len(), |(index, _)| *index)
    }

    fn error(&mut self, reason: impl Into<String>) -> ParameterError {
        ParameterError::Syntax {
            position: self.position(),
            reason: reason.into(),
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, c)| *c)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.chars.next();
        }
    }

    fn expect(&mut self, wanted: char) -> Result<(), ParameterError> {
        self.skip_whitespace();
        if self.peek() == Some(wanted) {
            self.chars.next();
            Ok(())
        } else {
            Err(self.error(format!("expected '{wanted}'")))
        }
    }

    /// Consume `c` if it is next (after whitespace).
    fn accept(&mut self, c: char) -> bool {
        self.skip_whitespace();
        if self.peek() == Some(c) {
            self.chars.next();
            true
        } else {
            false
        }
    }

    fn dictionary(mut self) -> Result<ParameterSet, ParameterError> {
        self.expect('{')?;
        let mut entries = BTreeMap::new();
        loop {
            if self.accept('}') {
                break;
            }
            self.skip_whitespace();
            let key = self.string()?;
            self.expect(':')?;
            let value = self.value()?;
            if entries.contains_key(&key) {
                return Err(ParameterError::DuplicateKey { key });
            }
            entries.insert(key, value);
            if self.accept(',') {
                continue;
            }
            self.expect('}')?;
            break;
        }
        self.skip_whitespace();
        if self.peek().is_some() {
            return Err(self.error("unexpected text after closing '}'"));
        }
        Ok(ParameterSet { entries })
    }

    fn value(&mut self) -> Result<ParamValue, ParameterError> {
        self.skip_whitespace();
        if self.accept('[') {
            let mut items = Vec::new();
            loop {
                if self.accept(']') {
                    break;
                }
                items.push(self.scalar()?);
                if self.accept(',') {
                    continue;
                }
                self.expect(']')?;
                break;
            }
            Ok(ParamValue::List(items))
        } else {
            self.scalar()
        }
    }

    fn scalar(&mut self) -> Result<ParamValue, ParameterError> {
        self.skip_whitespace();
        match self.peek() {
            Some('\'' | '"') => self.string().map(ParamValue::Text),
            Some(c) if c.is_ascii_digit() || matches!(c, '-' | '+' | '.') => self.number(),
            Some('[') => Err(self.error("nested lists are not allowed")),
            Some(_) => Err(self.error("expected a number, a quoted string or a list")),
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn string(&mut self) -> Result<String, ParameterError> {
        let Some(quote) = self.peek().filter(|c| matches!(c, '\'' | '"')) else {
            return Err(self.error("expected a quoted string"));
        };
        self.chars.next();
        let mut out = String::new();
        loop {
            match self.chars.next() {
                None => return Err(self.error("unterminated string")),
                Some((_, c)) if c == quote => return Ok(out),
                Some((_, '\\')) => match self.chars.next() {
                    Some((_, 'n')) => out.push('\n'),
                    Some((_, 't')) => out.push('\t'),
                    Some((_, escaped @ ('\\' | '\'' | '"'))) => out.push(escaped),
                    Some((_, other)) => {
                        return Err(self.error(format!("unsupported escape '\\{other}'")));
                    }
                    None => return Err(self.error("unterminated string")),
                },
                Some((_, c)) => out.push(c),
            }
        }
    }

    fn number(&mut self) -> Result<ParamValue, ParameterError> {
        let start = self.position();
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E'))
        {
            self.chars.next();
        }
        let end = self.position();
        let literal = self.text.get(start..end).unwrap_or_default();
        let value: f64 = literal
            .parse()
            .map_err(|err: core::num::ParseFloatError| ParameterError::Syntax {
                position: start,
                reason: format!("invalid number '{literal}': {err}"),
            })?;
        if !value.is_finite() {
            return Err(ParameterError::Syntax {
                position: start,
                reason: format!("number '{literal}' is out of range"),
            });
        }
        Ok(ParamValue::Number {
            value,
            integer: literal.parse::<i64>().ok(),
        })
    }
}
