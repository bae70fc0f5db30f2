//! Traffic recorder
//!
//! Buffers every network exchange whose method and URL match a recording's
//! pattern. A network interception source feeds [`TrafficEvent`]s through
//! [`TrafficRecorder::ingest`]; scenarios hold a [`RecordingHandle`] and read
//! snapshots of the buffer while the recording is live.
//!
//! Buffers are append-only and keep observation order. Nothing is merged or
//! deduplicated: a double submission shows up as two exchanges.

use chrono::Utc;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tracing::{debug, trace, warn};

use crate::exchange::{Exchange, ExchangeId, ObservedRequest, Payload, RequestKey, TrafficEvent};
use crate::pattern::RoutePattern;

/// Identifies one recording within a recorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordingId(pub u64);

type SharedBuffer = Arc<Mutex<Vec<Exchange>>>;

struct ActiveRecording {
    id: RecordingId,
    pattern: RoutePattern,
    buffer: SharedBuffer,
}

#[derive(Default)]
struct RecorderState {
    next_recording: u64,
    next_exchange: u64,
    recordings: Vec<ActiveRecording>,
}

/// Shared sink for intercepted traffic.
///
/// Cloning is cheap; clones feed the same set of recordings.
#[derive(Clone, Default)]
pub struct TrafficRecorder {
    state: Arc<Mutex<RecorderState>>,
}

impl TrafficRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin buffering every call matching `pattern`.
    pub fn start_recording(&self, pattern: RoutePattern) -> RecordingHandle {
        let mut state = self.state.lock();
        let id = RecordingId(state.next_recording);
        state.next_recording += 1;

        let buffer: SharedBuffer = Arc::new(Mutex::new(Vec::new()));
        debug!("Recording {} started for {}", id.0, pattern);
        state.recordings.push(ActiveRecording {
            id,
            pattern: pattern.clone(),
            buffer: buffer.clone(),
        });

        RecordingHandle {
            id,
            pattern,
            buffer,
            recorder: Arc::downgrade(&self.state),
        }
    }

    /// Stop a recording and return its final buffer.
    pub fn stop_recording(&self, handle: RecordingHandle) -> Vec<Exchange> {
        let exchanges = handle.snapshot();
        debug!(
            "Recording {} stopped with {} exchange(s)",
            handle.id.0,
            exchanges.len()
        );
        drop(handle);
        exchanges
    }

    /// Number of recordings currently capturing traffic.
    pub fn active_recordings(&self) -> usize {
        self.state.lock().recordings.len()
    }

    /// Feed one network event into every active recording.
    pub fn ingest(&self, event: TrafficEvent) {
        match event {
            TrafficEvent::Request(request) => self.observe_request(&request),
            TrafficEvent::Response { key, status, body } => {
                self.resolve(key, |exchange, at| exchange.complete(status, body.clone(), at))
            }
            TrafficEvent::Failed { key, reason } => {
                self.resolve(key, |exchange, at| exchange.fail(reason.clone(), at))
            }
        }
    }

    /// Convenience for sources that only see raw bodies.
    pub fn observe(&self, key: RequestKey, method: &str, url: &str, body: Option<&str>) {
        self.ingest(TrafficEvent::Request(ObservedRequest::new(
            key,
            method,
            url,
            Payload::from_text(body),
        )));
    }

    fn observe_request(&self, request: &ObservedRequest) {
        let mut state = self.state.lock();
        let RecorderState {
            next_exchange,
            recordings,
            ..
        } = &mut *state;

        for recording in recordings.iter() {
            if !recording.pattern.matches(&request.method, &request.url) {
                continue;
            }
            let id = ExchangeId(*next_exchange);
            *next_exchange += 1;
            trace!(
                "Recording {} captured {} {} as {}",
                recording.id.0,
                request.method,
                request.url,
                id
            );
            recording.buffer.lock().push(Exchange::pending(
                id,
                recording.pattern.to_string(),
                request,
            ));
        }
    }

    fn resolve<F>(&self, key: RequestKey, apply: F)
    where
        F: Fn(&mut Exchange, chrono::DateTime<Utc>),
    {
        let at = Utc::now();
        let state = self.state.lock();
        let mut resolved = 0;

        for recording in &state.recordings {
            let mut buffer = recording.buffer.lock();
            for exchange in buffer.iter_mut().filter(|e| e.request_key == key) {
                if exchange.is_resolved() {
                    warn!("Ignoring second resolution for {}", exchange);
                    continue;
                }
                apply(exchange, at);
                resolved += 1;
            }
        }

        if resolved == 0 {
            // Requests sent before recording started, or filtered out by pattern.
            trace!("No recorded exchange for request key {}", key.0);
        }
    }
}

/// A live recording.
///
/// Dropping the handle stops the recording and discards its buffer.
pub struct RecordingHandle {
    id: RecordingId,
    pattern: RoutePattern,
    buffer: SharedBuffer,
    recorder: Weak<Mutex<RecorderState>>,
}

impl RecordingHandle {
    pub fn id(&self) -> RecordingId {
        self.id
    }

    pub fn pattern(&self) -> &RoutePattern {
        &self.pattern
    }

    /// Copy of the buffer as it stands now, in observation order.
    pub fn snapshot(&self) -> Vec<Exchange> {
        self.buffer.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.buffer.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for RecordingHandle {
    fn drop(&mut self) {
        if let Some(state) = self.recorder.upgrade() {
            state.lock().recordings.retain(|r| r.id != self.id);
        }
    }
}
