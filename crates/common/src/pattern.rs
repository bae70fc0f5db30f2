//! Method + URL glob patterns used to select which calls get recorded

use regex::Regex;
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Matches outgoing calls by HTTP method and URL glob.
///
/// In the URL glob `**` matches any run of characters, `*` matches any run
/// without `/`, and `?` matches a single character. `POST **` therefore
/// captures every POST regardless of host.
#[derive(Debug, Clone)]
pub struct RoutePattern {
    method: Option<String>,
    glob: String,
    regex: Regex,
}

impl RoutePattern {
    /// Create a pattern. A method of `*` matches every method.
    pub fn new(method: &str, glob: &str) -> Result<Self> {
        if glob.is_empty() {
            return Err(Error::InvalidPattern("empty URL glob".to_string()));
        }
        let method = match method.trim() {
            "" | "*" => None,
            m => Some(m.to_ascii_uppercase()),
        };
        let regex = Regex::new(&glob_to_regex(glob))
            .map_err(|e| Error::InvalidPattern(format!("{}: {}", glob, e)))?;

        Ok(Self {
            method,
            glob: glob.to_string(),
            regex,
        })
    }

    /// Every POST call, any host.
    pub fn any_post() -> Self {
        Self::new("POST", "**").expect("static pattern is valid")
    }

    pub fn matches(&self, method: &str, url: &str) -> bool {
        let method_ok = self
            .method
            .as_deref()
            .map_or(true, |m| m.eq_ignore_ascii_case(method));
        method_ok && self.regex.is_match(url)
    }
}

impl fmt::Display for RoutePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method.as_deref().unwrap_or("*"), self.glob)
    }
}

impl FromStr for RoutePattern {
    type Err = Error;

    /// Parse `"POST **"` or a bare glob (any method).
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().split_once(char::is_whitespace) {
            Some((method, glob)) => Self::new(method, glob.trim()),
            None => Self::new("*", s.trim()),
        }
    }
}

fn glob_to_regex(glob: &str) -> String {
    let mut out = String::with_capacity(glob.len() * 2 + 2);
    out.push('^');
    let mut chars = glob.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                out.push_str(".*");
            }
            '*' => out.push_str("[^/]*"),
            '?' => out.push('.'),
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
    out.push('$');
    out
}
