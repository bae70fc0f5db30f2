//! Named expectations over a settled buffer
//!
//! Each helper turns a matcher result into an [`E2eError::Expectation`]
//! carrying the label it was called with, so a failing scenario reports
//! which expectation broke and what the buffer held.

use signup_probe_common::{count, find_all, find_first, Exchange, Predicate, Scope};

use crate::error::{E2eError, E2eResult};

/// The earliest exchange matching `predicate`.
pub fn expect_first<'a>(
    buffer: &'a [Exchange],
    predicate: &Predicate,
    label: &str,
) -> E2eResult<&'a Exchange> {
    find_first(buffer, predicate).ok_or_else(|| {
        E2eError::expectation(
            label,
            format!(
                "no exchange matched {} among {} recorded",
                predicate,
                buffer.len()
            ),
        )
    })
}

pub fn expect_count(
    buffer: &[Exchange],
    predicate: &Predicate,
    expected: usize,
    label: &str,
) -> E2eResult<()> {
    let actual = count(buffer, predicate);
    if actual == expected {
        return Ok(());
    }
    let ids: Vec<String> = find_all(buffer, predicate)
        .iter()
        .map(|e| e.id.to_string())
        .collect();
    Err(E2eError::expectation(
        label,
        format!(
            "expected {} exchange(s) matching {}, found {} [{}]",
            expected,
            predicate,
            actual,
            ids.join(", ")
        ),
    ))
}

pub fn expect_none(buffer: &[Exchange], predicate: &Predicate, label: &str) -> E2eResult<()> {
    match find_first(buffer, predicate) {
        None => Ok(()),
        Some(found) => Err(E2eError::expectation(
            label,
            format!("{} matched {}", found, predicate),
        )),
    }
}

/// Case-insensitive containment in one exchange's payload(s).
pub fn expect_payload_contains(exchange: &Exchange, scope: Scope, needle: &str) -> E2eResult<()> {
    let predicate = Predicate::contains(scope, needle);
    if predicate.matches(exchange) {
        Ok(())
    } else {
        Err(E2eError::expectation(
            format!("{} payload of {} includes {:?}", scope, exchange.id, needle),
            truncate(&payload_text(exchange, scope)),
        ))
    }
}

/// Digit-only containment, e.g. `5141234567` in `"(514) 123-4567"`.
pub fn expect_digits(exchange: &Exchange, scope: Scope, digits: &str) -> E2eResult<()> {
    let predicate = Predicate::digits(scope, digits);
    if predicate.matches(exchange) {
        Ok(())
    } else {
        Err(E2eError::expectation(
            format!("{} payload of {} includes digits {}", scope, exchange.id, digits),
            truncate(&payload_text(exchange, scope)),
        ))
    }
}

fn payload_text(exchange: &Exchange, scope: Scope) -> String {
    match scope {
        Scope::Request => exchange.request_body.canonical(),
        Scope::Response => exchange.response_canonical(),
        Scope::Either => format!(
            "request {} / response {}",
            exchange.request_body.canonical(),
            exchange.response_canonical()
        ),
    }
}

fn truncate(text: &str) -> String {
    const LIMIT: usize = 240;
    match text.char_indices().nth(LIMIT) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
