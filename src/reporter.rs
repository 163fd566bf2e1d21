/// User-facing event reporting
///
/// Cache failures surface as warnings. A build with thousands of spawns
/// hitting the same broken endpoint would otherwise print thousands of
/// identical lines, so the spawn cache reports through a `DedupingReporter`
/// that lets each distinct message through once.
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::warn;

use crate::logging::services;

/// A warning shown to the user; identical messages are the same event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub message: String,
}

impl Event {
    pub fn warn(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Sink for events shown to the user
pub trait Reporter: Send + Sync {
    fn handle(&self, event: &Event);
}

/// Forwards events to the tracing subscriber
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn handle(&self, event: &Event) {
        warn!(service = services::SPAWN_CACHE, "{}", event.message);
    }
}

/// Reporter that forwards each distinct message at most once
///
/// Lives as long as the spawn cache that owns it, i.e. one build. Without an
/// inner reporter every event is dropped.
pub struct DedupingReporter {
    inner: Option<Arc<dyn Reporter>>,
    reported: Mutex<HashSet<String>>,
}

impl DedupingReporter {
    pub fn new(inner: Option<Arc<dyn Reporter>>) -> Self {
        Self {
            inner,
            reported: Mutex::new(HashSet::new()),
        }
    }

    pub fn report(&self, event: Event) {
        let Some(inner) = &self.inner else {
            return;
        };

        let first_time = self
            .reported
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(event.message.clone());

        if first_time {
            inner.handle(&event);
        }
    }

    /// Number of distinct messages seen so far
    pub fn reported_count(&self) -> usize {
        self.reported
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl std::fmt::Debug for DedupingReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DedupingReporter")
            .field("has_inner", &self.inner.is_some())
            .field("reported", &self.reported_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[derive(Default)]
    struct CollectingReporter {
        events: Mutex<Vec<Event>>,
    }

    impl Reporter for CollectingReporter {
        fn handle(&self, event: &Event) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    #[test]
    fn test_identical_messages_forwarded_once() {
        let collector = Arc::new(CollectingReporter::default());
        let reporter = DedupingReporter::new(Some(collector.clone() as Arc<dyn Reporter>));

        for _ in 0..5 {
            reporter.report(Event::warn("Error reading from the remote cache:\ntimeout"));
        }
        reporter.report(Event::warn("Error writing to the remote cache:\ntimeout"));

        let events = collector.events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[1].message,
            "Error writing to the remote cache:\ntimeout"
        );
    }

    #[test]
    fn test_concurrent_reports_forwarded_once() {
        let collector = Arc::new(CollectingReporter::default());
        let reporter = DedupingReporter::new(Some(collector.clone() as Arc<dyn Reporter>));

        thread::scope(|s| {
            for _ in 0..16 {
                s.spawn(|| {
                    for _ in 0..100 {
                        reporter.report(Event::warn("same failure"));
                    }
                });
            }
        });

        assert_eq!(collector.events.lock().unwrap().len(), 1);
        assert_eq!(reporter.reported_count(), 1);
    }

    #[test]
    fn test_without_inner_reporter_events_are_dropped() {
        let reporter = DedupingReporter::new(None);
        reporter.report(Event::warn("ignored"));
        assert_eq!(reporter.reported_count(), 0);
    }
}
