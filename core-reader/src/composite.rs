//! Composite-event correlation.
//!
//! Raw events sharing a correlation key accumulate into one composite
//! value with at-most-one-per-key semantics. Entries expire on two tiers:
//! incomplete values after `max_incomplete_age`, complete values after
//! `max_complete_age`, measured from each entry's last modification.
//! Expiration is driven both explicitly (`expire`) and by arrivals:
//! `process` first sweeps against the incoming event's timestamp, so
//! callbacks fire deterministically in event time.

use crate::error::{ReaderError, Result};
use chrono::{DateTime, Duration, Utc};
use core_events::TraceEvent;
use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

/// A value assembled from multiple raw events.
pub trait CompositeEvent {
    /// Folds one raw event into the composite.
    fn process_event(&mut self, event: &TraceEvent);

    /// Whether the composite has everything it needs.
    fn is_complete(&self) -> bool;

    /// When the composite last absorbed an event.
    fn last_modified(&self) -> DateTime<Utc>;
}

type ExpiryCallback<V> = Box<dyn FnMut(V) + Send>;

/// Time-ordered keyed collection of in-flight composites.
///
/// Iteration and eviction follow insertion order by last modification. The
/// boundary is exclusive: an entry exactly `max_*_age` old is kept; one
/// strictly older is evicted.
pub struct ExpiringCompositeCollection<K, V> {
    max_incomplete_age: Duration,
    max_complete_age: Duration,
    on_incomplete_expired: ExpiryCallback<V>,
    on_complete_expired: ExpiryCallback<V>,
    entries: HashMap<K, V>,
    /// Touch queue: `(last_modified at touch, key)`. Stale pairs (the
    /// entry was touched again later) are skipped when popped.
    order: VecDeque<(DateTime<Utc>, K)>,
}

impl<K, V> ExpiringCompositeCollection<K, V>
where
    K: Eq + Hash + Clone,
    V: CompositeEvent + Default,
{
    /// Creates a collection.
    ///
    /// Negative ages are taken as their absolute value; zero ages are
    /// rejected.
    pub fn new(
        max_incomplete_age: Duration,
        max_complete_age: Duration,
        on_incomplete_expired: impl FnMut(V) + Send + 'static,
        on_complete_expired: impl FnMut(V) + Send + 'static,
    ) -> Result<Self> {
        let max_incomplete_age = Self::normalize_age(max_incomplete_age, "max_incomplete_age")?;
        let max_complete_age = Self::normalize_age(max_complete_age, "max_complete_age")?;
        Ok(Self {
            max_incomplete_age,
            max_complete_age,
            on_incomplete_expired: Box::new(on_incomplete_expired),
            on_complete_expired: Box::new(on_complete_expired),
            entries: HashMap::new(),
            order: VecDeque::new(),
        })
    }

    fn normalize_age(age: Duration, name: &str) -> Result<Duration> {
        if age == Duration::zero() {
            return Err(ReaderError::InvalidArgument(format!(
                "{} must be non-zero",
                name
            )));
        }
        Ok(if age < Duration::zero() { -age } else { age })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Folds an event into the value for `key`, allocating the value on
    /// first sight. Entries past their limit relative to
    /// `event.timestamp()` are swept first.
    pub fn process(&mut self, key: K, event: &TraceEvent) {
        self.sweep(event.timestamp());
        let entry = self.entries.entry(key.clone()).or_default();
        entry.process_event(event);
        self.order.push_back((entry.last_modified(), key));
    }

    /// The live value for `key`, if any.
    pub fn try_get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    /// Evicts every entry whose tier age has elapsed at `now`, firing the
    /// matching callback once per entry.
    pub fn expire(&mut self, now: DateTime<Utc>) {
        self.sweep(now);
    }

    /// Evicts every currently-complete entry regardless of age, firing the
    /// complete callback for each, oldest first.
    pub fn flush_complete(&mut self) {
        let mut retained: VecDeque<(DateTime<Utc>, K)> = VecDeque::new();
        while let Some((touched, key)) = self.order.pop_front() {
            let current = match self.entries.get(&key) {
                Some(entry) => entry,
                None => continue,
            };
            if current.last_modified() != touched {
                continue;
            }
            if current.is_complete() {
                if let Some(value) = self.entries.remove(&key) {
                    (self.on_complete_expired)(value);
                }
            } else {
                retained.push_back((touched, key));
            }
        }
        self.order = retained;
    }

    fn sweep(&mut self, now: DateTime<Utc>) {
        // Entries younger than the shorter tier cannot be expired, and the
        // queue is ordered by touch time, so the walk stops there.
        let min_age = self.max_incomplete_age.min(self.max_complete_age);
        let mut undecided: Vec<(DateTime<Utc>, K)> = Vec::new();

        loop {
            let expired = match self.order.front() {
                Some((touched, _)) if now.signed_duration_since(*touched) > min_age => true,
                _ => false,
            };
            if !expired {
                break;
            }
            let (touched, key) = match self.order.pop_front() {
                Some(pair) => pair,
                None => break,
            };
            let entry = match self.entries.get(&key) {
                Some(entry) => entry,
                None => continue,
            };
            if entry.last_modified() != touched {
                continue;
            }

            let complete = entry.is_complete();
            let limit = if complete {
                self.max_complete_age
            } else {
                self.max_incomplete_age
            };
            if now.signed_duration_since(touched) > limit {
                if let Some(value) = self.entries.remove(&key) {
                    if complete {
                        (self.on_complete_expired)(value);
                    } else {
                        (self.on_incomplete_expired)(value);
                    }
                }
            } else {
                undecided.push((touched, key));
            }
        }

        for pair in undecided.into_iter().rev() {
            self.order.push_front(pair);
        }
    }
}

impl<K, V> std::fmt::Debug for ExpiringCompositeCollection<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpiringCompositeCollection")
            .field("entries", &self.entries.len())
            .field("max_incomplete_age", &self.max_incomplete_age)
            .field("max_complete_age", &self.max_complete_age)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use core_events::{Level, ProviderDescriptor, TraceEvent};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// A request assembled from a start and an end event.
    #[derive(Default)]
    struct Request {
        started: bool,
        ended: bool,
        last_modified: Option<DateTime<Utc>>,
    }

    impl CompositeEvent for Request {
        fn process_event(&mut self, event: &TraceEvent) {
            match event.event_name() {
                "Start" => self.started = true,
                "End" => self.ended = true,
                _ => {}
            }
            self.last_modified = Some(event.timestamp());
        }

        fn is_complete(&self) -> bool {
            self.started && self.ended
        }

        fn last_modified(&self) -> DateTime<Utc> {
            self.last_modified.unwrap_or_else(Utc::now)
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()
    }

    fn event(name: &str, at: DateTime<Utc>) -> TraceEvent {
        let provider = ProviderDescriptor::from_name("CompositeTests").unwrap();
        TraceEvent::builder(&provider, 1, name)
            .level(Level::Informational)
            .timestamp(at)
            .build()
            .unwrap()
    }

    type Counters = (Arc<AtomicUsize>, Arc<AtomicUsize>);

    fn collection(
        incomplete: Duration,
        complete: Duration,
    ) -> (ExpiringCompositeCollection<u64, Request>, Counters) {
        let incomplete_fired = Arc::new(AtomicUsize::new(0));
        let complete_fired = Arc::new(AtomicUsize::new(0));
        let i = Arc::clone(&incomplete_fired);
        let c = Arc::clone(&complete_fired);
        let collection = ExpiringCompositeCollection::new(
            incomplete,
            complete,
            move |_request| {
                i.fetch_add(1, Ordering::SeqCst);
            },
            move |_request| {
                c.fetch_add(1, Ordering::SeqCst);
            },
        )
        .unwrap();
        (collection, (incomplete_fired, complete_fired))
    }

    #[test]
    fn test_zero_ages_rejected() {
        let result = ExpiringCompositeCollection::<u64, Request>::new(
            Duration::zero(),
            Duration::seconds(1),
            |_| {},
            |_| {},
        );
        assert!(matches!(result, Err(ReaderError::InvalidArgument(_))));
    }

    #[test]
    fn test_negative_ages_are_absolute() {
        let (mut collection, (incomplete, _)) =
            collection(Duration::seconds(-10), Duration::seconds(-20));
        collection.process(1, &event("Start", t0()));
        // Under the absolute-valued 10 s limit nothing expires at +10 s.
        collection.expire(t0() + Duration::seconds(10));
        assert_eq!(collection.len(), 1);
        collection.expire(t0() + Duration::seconds(11));
        assert_eq!(collection.len(), 0);
        assert_eq!(incomplete.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_values_accumulate_per_key() {
        let (mut collection, _) = collection(Duration::minutes(5), Duration::minutes(5));
        collection.process(1, &event("Start", t0()));
        collection.process(1, &event("End", t0() + Duration::seconds(1)));
        collection.process(2, &event("Start", t0() + Duration::seconds(2)));

        assert_eq!(collection.len(), 2);
        assert!(collection.try_get(&1).unwrap().is_complete());
        assert!(!collection.try_get(&2).unwrap().is_complete());
        assert!(collection.try_get(&3).is_none());
    }

    #[test]
    fn test_boundary_is_exclusive() {
        let (mut collection, (incomplete, _)) =
            collection(Duration::seconds(30), Duration::seconds(60));
        collection.process(1, &event("Start", t0()));

        // Exactly at the limit: kept.
        collection.expire(t0() + Duration::seconds(30));
        assert_eq!(collection.len(), 1);
        assert_eq!(incomplete.load(Ordering::SeqCst), 0);

        // Strictly beyond: evicted.
        collection.expire(t0() + Duration::seconds(30) + Duration::milliseconds(1));
        assert_eq!(collection.len(), 0);
        assert_eq!(incomplete.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_two_tier_expiration() {
        let (mut collection, (incomplete, complete)) =
            collection(Duration::seconds(100), Duration::seconds(10));
        collection.process(1, &event("Start", t0()));
        collection.process(1, &event("End", t0()));
        collection.process(2, &event("Start", t0()));

        // Past the complete tier, inside the incomplete one.
        collection.expire(t0() + Duration::seconds(11));
        assert_eq!(complete.load(Ordering::SeqCst), 1);
        assert_eq!(incomplete.load(Ordering::SeqCst), 0);
        assert_eq!(collection.len(), 1);

        collection.expire(t0() + Duration::seconds(101));
        assert_eq!(incomplete.load(Ordering::SeqCst), 1);
        assert!(collection.is_empty());
    }

    #[test]
    fn test_arrivals_drive_expiration_in_event_time() {
        let (mut collection, (_, complete)) =
            collection(Duration::seconds(100), Duration::seconds(10));
        collection.process(1, &event("Start", t0()));
        collection.process(1, &event("End", t0()));

        // An arrival for another key past the complete age sweeps key 1.
        collection.process(
            2,
            &event("Start", t0() + Duration::seconds(10) + Duration::milliseconds(1)),
        );
        assert_eq!(complete.load(Ordering::SeqCst), 1);
        assert!(collection.try_get(&1).is_none());
        assert!(collection.try_get(&2).is_some());
    }

    #[test]
    fn test_touch_refreshes_age() {
        let (mut collection, (incomplete, _)) =
            collection(Duration::seconds(30), Duration::seconds(30));
        collection.process(1, &event("Start", t0()));
        // Touched again shortly before it would have expired.
        collection.process(1, &event("Progress", t0() + Duration::seconds(25)));

        collection.expire(t0() + Duration::seconds(31));
        assert_eq!(collection.len(), 1);
        assert_eq!(incomplete.load(Ordering::SeqCst), 0);

        collection.expire(t0() + Duration::seconds(56));
        assert_eq!(collection.len(), 0);
        assert_eq!(incomplete.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_flush_complete_ignores_age() {
        let (mut collection, (_, complete)) =
            collection(Duration::minutes(5), Duration::minutes(5));
        collection.process(1, &event("Start", t0()));
        collection.process(1, &event("End", t0()));
        collection.process(2, &event("Start", t0()));

        collection.flush_complete();
        assert_eq!(complete.load(Ordering::SeqCst), 1);
        assert_eq!(collection.len(), 1);
        assert!(collection.try_get(&2).is_some());
    }

    #[test]
    fn test_callbacks_fire_once_per_entry() {
        let (mut collection, (incomplete, complete)) =
            collection(Duration::seconds(10), Duration::seconds(10));
        collection.process(1, &event("Start", t0()));
        collection.expire(t0() + Duration::seconds(11));
        collection.expire(t0() + Duration::seconds(20));
        collection.flush_complete();
        assert_eq!(incomplete.load(Ordering::SeqCst), 1);
        assert_eq!(complete.load(Ordering::SeqCst), 0);
    }
}
