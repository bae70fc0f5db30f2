//! Structured predicates over recorded exchanges

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::exchange::Exchange;

/// Which payload(s) of an exchange a predicate inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Request,
    Response,
    /// Matches when either side matches
    Either,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Scope::Request => "request",
            Scope::Response => "response",
            Scope::Either => "request|response",
        })
    }
}

/// A boolean test over one exchange.
///
/// Needles are normalized when the predicate is built, so matching never
/// allocates more than the haystack serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    /// HTTP method, case-insensitive
    Method(String),
    /// Substring of the request URL
    UrlContains(String),
    /// Response status equals the value
    Status(u16),
    /// A response arrived and its status differs from the value
    StatusNot(u16),
    /// The exchange has a response or a failure attached
    Resolved,
    /// Case-insensitive containment in the canonical payload text
    Contains { scope: Scope, needle: String },
    /// Containment after stripping every non-digit from both sides
    DigitsContain { scope: Scope, digits: String },
    /// JSON pointer lookup equals the expected value
    Field {
        scope: Scope,
        pointer: String,
        expected: serde_json::Value,
    },
    All(Vec<Predicate>),
    Any(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    pub fn method(method: &str) -> Self {
        Predicate::Method(method.to_ascii_uppercase())
    }

    pub fn url_contains(fragment: impl Into<String>) -> Self {
        Predicate::UrlContains(fragment.into())
    }

    pub fn status(code: u16) -> Self {
        Predicate::Status(code)
    }

    pub fn status_not(code: u16) -> Self {
        Predicate::StatusNot(code)
    }

    pub fn resolved() -> Self {
        Predicate::Resolved
    }

    pub fn contains(scope: Scope, needle: &str) -> Self {
        Predicate::Contains {
            scope,
            needle: needle.to_lowercase(),
        }
    }

    pub fn digits(scope: Scope, value: &str) -> Self {
        Predicate::DigitsContain {
            scope,
            digits: only_digits(value),
        }
    }

    pub fn field(scope: Scope, pointer: impl Into<String>, expected: serde_json::Value) -> Self {
        Predicate::Field {
            scope,
            pointer: pointer.into(),
            expected,
        }
    }

    /// Both must hold. Nested `All`s are flattened.
    pub fn and(self, other: Predicate) -> Self {
        match self {
            Predicate::All(mut parts) => {
                parts.push(other);
                Predicate::All(parts)
            }
            first => Predicate::All(vec![first, other]),
        }
    }

    /// Either may hold. Nested `Any`s are flattened.
    pub fn or(self, other: Predicate) -> Self {
        match self {
            Predicate::Any(mut parts) => {
                parts.push(other);
                Predicate::Any(parts)
            }
            first => Predicate::Any(vec![first, other]),
        }
    }

    pub fn negate(self) -> Self {
        Predicate::Not(Box::new(self))
    }

    pub fn matches(&self, exchange: &Exchange) -> bool {
        match self {
            Predicate::Method(method) => exchange.method.eq_ignore_ascii_case(method),
            Predicate::UrlContains(fragment) => exchange.url.contains(fragment.as_str()),
            Predicate::Status(code) => exchange.status == Some(*code),
            Predicate::StatusNot(code) => matches!(exchange.status, Some(s) if s != *code),
            Predicate::Resolved => exchange.is_resolved(),
            Predicate::Contains { scope, needle } => {
                in_scope(exchange, *scope, |text| text.contains(needle.as_str()))
            }
            Predicate::DigitsContain { scope, digits } => {
                !digits.is_empty()
                    && in_scope(exchange, *scope, |text| only_digits(text).contains(digits.as_str()))
            }
            Predicate::Field {
                scope,
                pointer,
                expected,
            } => field_matches(exchange, *scope, pointer, expected),
            Predicate::All(parts) => parts.iter().all(|p| p.matches(exchange)),
            Predicate::Any(parts) => parts.iter().any(|p| p.matches(exchange)),
            Predicate::Not(inner) => !inner.matches(exchange),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Method(m) => write!(f, "method == {}", m),
            Predicate::UrlContains(s) => write!(f, "url contains {:?}", s),
            Predicate::Status(c) => write!(f, "status == {}", c),
            Predicate::StatusNot(c) => write!(f, "status != {}", c),
            Predicate::Resolved => f.write_str("resolved"),
            Predicate::Contains { scope, needle } => write!(f, "{} contains {:?}", scope, needle),
            Predicate::DigitsContain { scope, digits } => {
                write!(f, "{} digits contain {:?}", scope, digits)
            }
            Predicate::Field {
                scope,
                pointer,
                expected,
            } => write!(f, "{}{} == {}", scope, pointer, expected),
            Predicate::All(parts) => join(f, parts, " AND "),
            Predicate::Any(parts) => join(f, parts, " OR "),
            Predicate::Not(inner) => write!(f, "NOT ({})", inner),
        }
    }
}

fn join(f: &mut fmt::Formatter<'_>, parts: &[Predicate], sep: &str) -> fmt::Result {
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        match part {
            Predicate::All(_) | Predicate::Any(_) => write!(f, "({})", part)?,
            _ => write!(f, "{}", part)?,
        }
    }
    Ok(())
}

fn in_scope<F>(exchange: &Exchange, scope: Scope, test: F) -> bool
where
    F: Fn(&str) -> bool,
{
    let request = || test(&exchange.request_body.canonical());
    // An unresolved exchange has no response text to search.
    let response = || {
        exchange
            .response_body
            .as_ref()
            .map_or(false, |body| test(&body.canonical()))
    };
    match scope {
        Scope::Request => request(),
        Scope::Response => response(),
        Scope::Either => request() || response(),
    }
}

fn field_matches(exchange: &Exchange, scope: Scope, pointer: &str, expected: &serde_json::Value) -> bool {
    let request = || exchange.request_body.pointer(pointer) == Some(expected);
    let response = || {
        exchange
            .response_body
            .as_ref()
            .and_then(|body| body.pointer(pointer))
            == Some(expected)
    };
    match scope {
        Scope::Request => request(),
        Scope::Response => response(),
        Scope::Either => request() || response(),
    }
}

/// Keep only ASCII digits, preserving their order.
pub fn only_digits(value: &str) -> String {
    value.chars().filter(|c| c.is_ascii_digit()).collect()
}
