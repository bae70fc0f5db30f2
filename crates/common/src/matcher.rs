//! Queries over a recorded buffer
//!
//! Absence is a normal outcome: every query returns `Option`/`Vec` and the
//! caller decides whether that is a failure.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::exchange::Exchange;
use crate::predicate::Predicate;
use crate::recorder::RecordingHandle;

/// Earliest exchange satisfying `predicate`.
pub fn find_first<'a>(buffer: &'a [Exchange], predicate: &Predicate) -> Option<&'a Exchange> {
    buffer.iter().find(|e| predicate.matches(e))
}

/// Every exchange satisfying `predicate`, in observation order.
pub fn find_all<'a>(buffer: &'a [Exchange], predicate: &Predicate) -> Vec<&'a Exchange> {
    buffer.iter().filter(|e| predicate.matches(e)).collect()
}

pub fn count(buffer: &[Exchange], predicate: &Predicate) -> usize {
    buffer.iter().filter(|e| predicate.matches(e)).count()
}

/// Polling schedule for waiting on a live recording.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WaitPolicy {
    /// Give up after this long
    #[serde(with = "millis")]
    pub timeout: Duration,
    /// First pause between polls
    #[serde(with = "millis")]
    pub initial_interval: Duration,
    /// Pauses double up to this cap
    #[serde(with = "millis")]
    pub max_interval: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            initial_interval: Duration::from_millis(50),
            max_interval: Duration::from_millis(800),
        }
    }
}

impl WaitPolicy {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Default::default()
        }
    }

    fn next_interval(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max_interval)
    }
}

/// Poll a live recording until an exchange satisfies `predicate` or the
/// policy's timeout elapses.
pub async fn wait_for_match(
    handle: &RecordingHandle,
    predicate: &Predicate,
    policy: &WaitPolicy,
) -> Option<Exchange> {
    let start = Instant::now();
    let mut interval = policy.initial_interval;
    let mut polls = 0u32;

    loop {
        polls += 1;
        let buffer = handle.snapshot();
        if let Some(found) = find_first(&buffer, predicate) {
            debug!("Matched {} after {} poll(s): {}", predicate, polls, found);
            return Some(found.clone());
        }

        let elapsed = start.elapsed();
        if elapsed >= policy.timeout {
            debug!(
                "No exchange matched {} within {:?} ({} poll(s), {} buffered)",
                predicate,
                policy.timeout,
                polls,
                buffer.len()
            );
            return None;
        }

        tokio::time::sleep(interval.min(policy.timeout - elapsed)).await;
        interval = policy.next_interval(interval);
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::{Payload, RequestKey, TrafficEvent};
    use crate::pattern::RoutePattern;
    use crate::predicate::Scope;
    use crate::recorder::TrafficRecorder;

    fn record(recorder: &TrafficRecorder, key: u64, email: &str, status: u16) {
        recorder.observe(
            RequestKey(key),
            "POST",
            "https://api.example.ca/api/accounts",
            Some(&format!(r#"{{"email":"{}"}}"#, email)),
        );
        recorder.ingest(TrafficEvent::Response {
            key: RequestKey(key),
            status,
            body: Payload::from_text(Some(&format!(r#"{{"email":"{}"}}"#, email))),
        });
    }

    fn created(email: &str) -> Predicate {
        Predicate::status(201).and(Predicate::contains(Scope::Either, email))
    }

    #[test]
    fn test_find_first_prefers_earliest() {
        let recorder = TrafficRecorder::new();
        let handle = recorder.start_recording(RoutePattern::any_post());
        record(&recorder, 1, "a@x.io", 500);
        record(&recorder, 2, "a@x.io", 201);
        record(&recorder, 3, "a@x.io", 201);

        let buffer = handle.snapshot();
        let first = find_first(&buffer, &created("a@x.io")).unwrap();
        assert_eq!(first.request_key, RequestKey(2));
        assert!(find_first(&buffer, &created("b@x.io")).is_none());
    }

    #[test]
    fn test_find_all_is_ordered_and_idempotent() {
        let recorder = TrafficRecorder::new();
        let handle = recorder.start_recording(RoutePattern::any_post());
        for key in 0..4 {
            record(&recorder, key, "a@x.io", if key % 2 == 0 { 201 } else { 409 });
        }

        let buffer = handle.snapshot();
        let predicate = created("a@x.io");
        let first: Vec<_> = find_all(&buffer, &predicate).iter().map(|e| e.id).collect();
        let second: Vec<_> = find_all(&buffer, &predicate).iter().map(|e| e.id).collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
        assert!(first[0] < first[1]);
        assert_eq!(count(&buffer, &predicate), 2);
    }

    #[test]
    fn test_buffer_never_loses_submissions() {
        let recorder = TrafficRecorder::new();
        let handle = recorder.start_recording(RoutePattern::any_post());
        let n = 25;
        for key in 0..n {
            record(&recorder, key, "bulk@x.io", 201);
        }
        let buffer = recorder.stop_recording(handle);
        assert!(count(&buffer, &created("bulk@x.io")) >= n as usize);
    }

    #[tokio::test]
    async fn test_wait_for_match_sees_late_response() {
        let recorder = TrafficRecorder::new();
        let handle = recorder.start_recording(RoutePattern::any_post());

        let feeder = recorder.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(60)).await;
            record(&feeder, 1, "late@x.io", 201);
        });

        let policy = WaitPolicy {
            timeout: Duration::from_secs(2),
            initial_interval: Duration::from_millis(10),
            max_interval: Duration::from_millis(40),
        };
        let found = wait_for_match(&handle, &created("late@x.io"), &policy).await;
        assert_eq!(found.map(|e| e.status), Some(Some(201)));
    }

    #[tokio::test]
    async fn test_wait_for_match_times_out() {
        let recorder = TrafficRecorder::new();
        let handle = recorder.start_recording(RoutePattern::any_post());
        record(&recorder, 1, "other@x.io", 201);

        let start = Instant::now();
        let found = wait_for_match(
            &handle,
            &created("missing@x.io"),
            &WaitPolicy {
                timeout: Duration::from_millis(120),
                initial_interval: Duration::from_millis(10),
                max_interval: Duration::from_millis(40),
            },
        )
        .await;
        assert!(found.is_none());
        assert!(start.elapsed() >= Duration::from_millis(120));
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = WaitPolicy::default();
        let mut interval = policy.initial_interval;
        for _ in 0..10 {
            interval = policy.next_interval(interval);
        }
        assert_eq!(interval, policy.max_interval);
    }

    #[test]
    fn test_backoff_saturates_with_huge_caps() {
        let policy = WaitPolicy {
            timeout: Duration::MAX,
            initial_interval: Duration::from_secs(u64::MAX / 2 + 1),
            max_interval: Duration::MAX,
        };
        let interval = policy.next_interval(policy.initial_interval);
        assert_eq!(interval, Duration::MAX);
        assert_eq!(policy.next_interval(interval), Duration::MAX);
    }

    #[test]
    fn test_policy_serializes_as_millis() {
        let json = serde_json::to_value(WaitPolicy::with_timeout(Duration::from_secs(3))).unwrap();
        assert_eq!(json["timeout"], 3000);
        assert_eq!(json["initial_interval"], 50);
    }
}
