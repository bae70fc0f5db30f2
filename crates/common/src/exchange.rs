//! Recorded network exchanges and the events that build them

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of an exchange in the order the recorder observed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ExchangeId(pub u64);

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifier the network layer assigns to a request so that its response
/// can be correlated later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestKey(pub u64);

/// A request or response body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Payload {
    #[default]
    Empty,
    Json(serde_json::Value),
    Text(String),
    Bytes(Vec<u8>),
}

impl Payload {
    /// Build a payload from an optional raw body, parsing JSON when possible.
    pub fn from_text(body: Option<&str>) -> Self {
        match body {
            None => Payload::Empty,
            Some(text) if text.trim().is_empty() => Payload::Empty,
            Some(text) => match serde_json::from_str(text) {
                Ok(value) => Payload::Json(value),
                Err(_) => Payload::Text(text.to_string()),
            },
        }
    }

    /// Build a payload from raw bytes. UTF-8 bodies go through `from_text`.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        match std::str::from_utf8(bytes) {
            Ok(text) => Self::from_text(Some(text)),
            Err(_) => Payload::Bytes(bytes.to_vec()),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Payload::Empty)
    }

    /// Lowercased serialized form used for substring matching.
    ///
    /// JSON is rendered compactly; an empty body renders as `{}`.
    pub fn canonical(&self) -> String {
        let raw = match self {
            Payload::Empty => "{}".to_string(),
            Payload::Json(value) => value.to_string(),
            Payload::Text(text) => text.clone(),
            Payload::Bytes(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        };
        raw.to_lowercase()
    }

    /// Look up a field by JSON pointer (`/user/email`). Only JSON payloads
    /// have fields.
    pub fn pointer(&self, pointer: &str) -> Option<&serde_json::Value> {
        match self {
            Payload::Json(value) => value.pointer(pointer),
            _ => None,
        }
    }
}

/// Resolution state of an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeState {
    /// Request observed, no response yet
    Pending,
    /// Response attached
    Completed,
    /// Network layer reported a failure; no status or body will arrive
    Failed,
}

/// One recorded request/response pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exchange {
    pub id: ExchangeId,
    pub request_key: RequestKey,
    pub method: String,
    pub url: String,
    /// Pattern of the recording that captured this exchange
    pub pattern: String,
    pub request_body: Payload,
    pub status: Option<u16>,
    pub response_body: Option<Payload>,
    pub failure: Option<String>,
    pub observed_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Exchange {
    pub(crate) fn pending(id: ExchangeId, pattern: String, request: &ObservedRequest) -> Self {
        Self {
            id,
            request_key: request.key,
            method: request.method.clone(),
            url: request.url.clone(),
            pattern,
            request_body: request.body.clone(),
            status: None,
            response_body: None,
            failure: None,
            observed_at: request.observed_at,
            resolved_at: None,
        }
    }

    pub fn state(&self) -> ExchangeState {
        if self.failure.is_some() {
            ExchangeState::Failed
        } else if self.status.is_some() {
            ExchangeState::Completed
        } else {
            ExchangeState::Pending
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.state() != ExchangeState::Pending
    }

    /// Canonical response body, `{}` while unresolved.
    pub fn response_canonical(&self) -> String {
        self.response_body
            .as_ref()
            .map(Payload::canonical)
            .unwrap_or_else(|| Payload::Empty.canonical())
    }

    pub(crate) fn complete(&mut self, status: u16, body: Payload, at: DateTime<Utc>) {
        self.status = Some(status);
        self.response_body = Some(body);
        self.resolved_at = Some(at);
    }

    pub(crate) fn fail(&mut self, reason: String, at: DateTime<Utc>) {
        self.failure = Some(reason);
        self.resolved_at = Some(at);
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.status, &self.failure) {
            (Some(status), _) => write!(f, "{} {} {} -> {}", self.id, self.method, self.url, status),
            (None, Some(reason)) => {
                write!(f, "{} {} {} -> failed ({})", self.id, self.method, self.url, reason)
            }
            (None, None) => write!(f, "{} {} {} -> pending", self.id, self.method, self.url),
        }
    }
}

/// An outgoing request as seen by the network layer.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservedRequest {
    pub key: RequestKey,
    pub method: String,
    pub url: String,
    pub body: Payload,
    pub observed_at: DateTime<Utc>,
}

impl ObservedRequest {
    pub fn new(key: RequestKey, method: impl Into<String>, url: impl Into<String>, body: Payload) -> Self {
        Self {
            key,
            method: method.into(),
            url: url.into(),
            body,
            observed_at: Utc::now(),
        }
    }
}

/// Events fed into the recorder by a network interception source.
#[derive(Debug, Clone, PartialEq)]
pub enum TrafficEvent {
    Request(ObservedRequest),
    Response {
        key: RequestKey,
        status: u16,
        body: Payload,
    },
    Failed {
        key: RequestKey,
        reason: String,
    },
}
