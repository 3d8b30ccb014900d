//! Queries and the query string parser.
//!
//! ```text
//! query  := clause (WS clause)*
//! clause := ['+' | '-'] [field ':'] value
//! value  := word | '"' any text '"'
//! ```
//!
//! `+` marks a clause that must match, `-` one that must not.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{FoliumError, Result};

/// How a term takes part in matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Occur {
    /// Contributes to the score.
    #[default]
    Should,
    /// Documents must match and it contributes to the score.
    Must,
    /// Matching documents are removed.
    MustNot,
}

/// One field/value clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Term {
    pub field: String,
    pub value: String,
    #[serde(default)]
    pub occur: Occur,
}

impl Term {
    pub fn new<F: Into<String>, V: Into<String>>(field: F, value: V, occur: Occur) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
            occur,
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.occur {
            Occur::Should => "",
            Occur::Must => "+",
            Occur::MustNot => "-",
        };
        if self.value.contains(char::is_whitespace) {
            write!(f, "{prefix}{}:\"{}\"", self.field, self.value)
        } else {
            write!(f, "{prefix}{}:{}", self.field, self.value)
        }
    }
}

/// A list of terms.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub terms: Vec<Term>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn should<F: Into<String>, V: Into<String>>(mut self, field: F, value: V) -> Self {
        self.terms.push(Term::new(field, value, Occur::Should));
        self
    }

    pub fn must<F: Into<String>, V: Into<String>>(mut self, field: F, value: V) -> Self {
        self.terms.push(Term::new(field, value, Occur::Must));
        self
    }

    pub fn must_not<F: Into<String>, V: Into<String>>(mut self, field: F, value: V) -> Self {
        self.terms.push(Term::new(field, value, Occur::MustNot));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, term) in self.terms.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{term}")?;
        }
        Ok(())
    }
}

/// Parses query strings.
#[derive(Debug, Clone, Default)]
pub struct QueryParser {
    default_field: Option<String>,
}

impl QueryParser {
    /// A parser that requires `field:` on every clause.
    pub fn new() -> Self {
        Self::default()
    }

    /// A parser that puts bare values in `field`.
    pub fn with_default_field<S: Into<String>>(field: S) -> Self {
        Self {
            default_field: Some(field.into()),
        }
    }

    pub fn parse(&self, input: &str) -> Result<Query> {
        let mut query = Query::new();
        let mut chars = input.chars().peekable();

        loop {
            while chars.next_if(|c| c.is_whitespace()).is_some() {}
            if chars.peek().is_none() {
                break;
            }

            let occur = match chars.next_if(|c| *c == '+' || *c == '-') {
                Some('+') => Occur::Must,
                Some(_) => Occur::MustNot,
                None => Occur::Should,
            };

            let mut field = None;
            let mut value = String::new();
            loop {
                match chars.peek().copied() {
                    None => break,
                    Some(c) if c.is_whitespace() => break,
                    Some('"') => {
                        chars.next();
                        let mut closed = false;
                        for c in chars.by_ref() {
                            if c == '"' {
                                closed = true;
                                break;
                            }
                            value.push(c);
                        }
                        if !closed {
                            return Err(FoliumError::query(format!(
                                "unterminated quote in {input:?}"
                            )));
                        }
                        break;
                    }
                    Some(':') if field.is_none() && !value.is_empty() => {
                        chars.next();
                        field = Some(std::mem::take(&mut value));
                    }
                    Some(c) => {
                        chars.next();
                        value.push(c);
                    }
                }
            }

            if value.trim().is_empty() {
                return Err(FoliumError::query(format!("empty clause in {input:?}")));
            }
            let field = match field.or_else(|| self.default_field.clone()) {
                Some(field) => field,
                None => {
                    return Err(FoliumError::query(format!(
                        "{value:?} has no field and no default field is set"
                    )))
                }
            };
            query.terms.push(Term::new(field, value, occur));
        }

        if query.is_empty() {
            return Err(FoliumError::query("empty query"));
        }
        Ok(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_clauses() {
        let parser = QueryParser::with_default_field("title");
        let query = parser
            .parse(r#"apple +body:"red fruit" -title:pear"#)
            .unwrap();

        assert_eq!(
            query.terms,
            vec![
                Term::new("title", "apple", Occur::Should),
                Term::new("body", "red fruit", Occur::Must),
                Term::new("title", "pear", Occur::MustNot),
            ]
        );
        assert_eq!(query.to_string(), r#"title:apple +body:"red fruit" -title:pear"#);
    }

    #[test]
    fn test_parse_errors() {
        let parser = QueryParser::new();
        for input in ["", "   ", "apple", "title:\"open", "+", "title:"] {
            assert!(
                matches!(parser.parse(input), Err(FoliumError::Query(_))),
                "{input:?} should not parse"
            );
        }
    }

    #[test]
    fn test_builder() {
        let query = Query::new().should("title", "a").must_not("title", "b");
        assert_eq!(query.terms[1].occur, Occur::MustNot);
        assert_eq!(query.to_string(), "title:a -title:b");
    }
}
