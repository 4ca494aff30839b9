//! # Cartstream Testing
//!
//! Test doubles and fixtures shared by the workspace's test suites.
//!
//! This crate provides:
//! - [`InMemoryEventSink`]: records appended events, and can be switched into
//!   a failing mode to exercise the persistence-failure path
//! - [`ScriptedRandom`]: a [`RandomSource`](cartstream_core::environment::RandomSource) that replays queued draws
//! - Fixtures: a small [`sample_catalog`] and numbered [`customers`]
//!
//! ## Example
//!
//! ```
//! use cartstream_testing::{InMemoryEventSink, customers, sample_catalog};
//! use cartstream_core::event::Event;
//! use cartstream_core::sink::EventSink;
//! use cartstream_core::Utc;
//!
//! # tokio_test::block_on(async {
//! let sink = InMemoryEventSink::new();
//! let catalog = sample_catalog();
//! let event = Event::added(customers(1)[0].clone(), catalog.pick(0), Utc::now());
//!
//! sink.append(&event).await.unwrap();
//! assert_eq!(sink.events(), vec![event]);
//! # });
//! ```

use cartstream_core::catalog::{Catalog, Product, ProductId};
use cartstream_core::customer::CustomerId;

/// Mock implementations of the core traits.
pub mod mocks {
    use cartstream_core::environment::RandomSource;
    use cartstream_core::event::Event;
    use cartstream_core::sink::{AppendFuture, EventSink, SinkError};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Event sink that keeps appended events in memory.
    ///
    /// Clones share storage, so a test can hand one clone to the code under
    /// test and inspect another.
    #[derive(Debug, Clone, Default)]
    pub struct InMemoryEventSink {
        events: Arc<Mutex<Vec<Event>>>,
        failing: Arc<AtomicBool>,
        attempts: Arc<AtomicUsize>,
    }

    impl InMemoryEventSink {
        /// An empty, healthy sink.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// A sink that rejects every append.
        #[must_use]
        pub fn failing() -> Self {
            let sink = Self::default();
            sink.set_failing(true);
            sink
        }

        /// Switch failure mode on or off.
        pub fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }

        /// Events stored so far, in append order.
        #[must_use]
        pub fn events(&self) -> Vec<Event> {
            self.events
                .lock()
                .map(|events| events.clone())
                .unwrap_or_default()
        }

        /// Number of `append` calls, including failed ones.
        #[must_use]
        pub fn attempts(&self) -> usize {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    impl EventSink for InMemoryEventSink {
        fn append<'a>(&'a self, event: &'a Event) -> AppendFuture<'a> {
            Box::pin(async move {
                self.attempts.fetch_add(1, Ordering::SeqCst);

                if self.failing.load(Ordering::SeqCst) {
                    return Err(SinkError::ConnectionFailed(
                        "in-memory sink set to fail".to_string(),
                    ));
                }

                self.events
                    .lock()
                    .map_err(|e| SinkError::Other(format!("lock poisoned: {e}")))?
                    .push(event.clone());
                Ok(())
            })
        }
    }

    /// Random source that replays scripted draws.
    ///
    /// Each kind of draw has its own queue. An exhausted queue yields the
    /// lowest value (`0.0` or `0`), so a test only needs to script the draws
    /// it cares about.
    #[derive(Debug, Clone, Default)]
    pub struct ScriptedRandom {
        units: VecDeque<f64>,
        indices: VecDeque<usize>,
        counts: VecDeque<u32>,
    }

    impl ScriptedRandom {
        /// A source with nothing scripted.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue draws for [`RandomSource::unit`].
        #[must_use]
        pub fn with_units(mut self, units: impl IntoIterator<Item = f64>) -> Self {
            self.units.extend(units);
            self
        }

        /// Queue draws for [`RandomSource::index`].
        #[must_use]
        pub fn with_indices(mut self, indices: impl IntoIterator<Item = usize>) -> Self {
            self.indices.extend(indices);
            self
        }

        /// Queue draws for [`RandomSource::up_to`].
        #[must_use]
        pub fn with_counts(mut self, counts: impl IntoIterator<Item = u32>) -> Self {
            self.counts.extend(counts);
            self
        }

        /// Whether every scripted draw has been consumed.
        #[must_use]
        pub fn is_exhausted(&self) -> bool {
            self.units.is_empty() && self.indices.is_empty() && self.counts.is_empty()
        }
    }

    impl RandomSource for ScriptedRandom {
        fn unit(&mut self) -> f64 {
            self.units.pop_front().unwrap_or(0.0)
        }

        // Scripted values are clamped into range so a script written for a
        // bigger cart still yields a valid index.
        fn index(&mut self, len: usize) -> usize {
            self.indices
                .pop_front()
                .map_or(0, |i| i.min(len.saturating_sub(1)))
        }

        fn up_to(&mut self, max: u32) -> u32 {
            self.counts.pop_front().map_or(0, |n| n.min(max))
        }
    }
}

pub use mocks::{InMemoryEventSink, ScriptedRandom};

/// Four-product catalog used across the test suites.
///
/// Listing order: Mug (3), Backpack (7), Lamp (11), Notebook (12).
///
/// # Panics
///
/// Never in practice; the hardcoded listing is non-empty with unique IDs.
#[must_use]
#[allow(clippy::expect_used)]
pub fn sample_catalog() -> Catalog {
    let products = vec![
        Product::new(
            ProductId::new(3),
            "Mug",
            8.5,
            "Ceramic mug",
            "https://img.example/3.jpg",
        ),
        Product::new(
            ProductId::new(7),
            "Backpack",
            19.99,
            "Fits 15 inch laptops",
            "https://img.example/7.jpg",
        ),
        Product::new(
            ProductId::new(11),
            "Lamp",
            34.0,
            "Desk lamp",
            "https://img.example/11.jpg",
        ),
        Product::new(
            ProductId::new(12),
            "Notebook",
            4.25,
            "A5 ruled",
            "https://img.example/12.jpg",
        ),
    ];

    Catalog::new(products).expect("hardcoded catalog should always be valid")
}

/// Customers `c1..=cn`.
#[must_use]
pub fn customers(n: usize) -> Vec<CustomerId> {
    (1..=n).map(|i| CustomerId::new(format!("c{i}"))).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use cartstream_core::environment::RandomSource;
    use cartstream_core::event::Event;
    use cartstream_core::sink::EventSink;
    use chrono::{TimeZone, Utc};

    #[tokio::test]
    async fn in_memory_sink_records_events() {
        let sink = InMemoryEventSink::new();
        let observer = sink.clone();
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let event = Event::purchased(CustomerId::new("c1"), at);

        sink.append(&event).await.unwrap();

        assert_eq!(observer.events(), vec![event]);
        assert_eq!(observer.attempts(), 1);
    }

    #[tokio::test]
    async fn failing_sink_counts_attempts_but_stores_nothing() {
        let sink = InMemoryEventSink::failing();
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let event = Event::purchased(CustomerId::new("c1"), at);

        assert!(sink.append(&event).await.is_err());
        assert!(sink.events().is_empty());
        assert_eq!(sink.attempts(), 1);

        sink.set_failing(false);
        sink.append(&event).await.unwrap();
        assert_eq!(sink.events().len(), 1);
    }

    #[test]
    fn scripted_random_replays_then_bottoms_out() {
        let mut rng = ScriptedRandom::new()
            .with_units([0.5, 0.9])
            .with_indices([5])
            .with_counts([100]);

        assert!((rng.unit() - 0.5).abs() < f64::EPSILON);
        assert!((rng.unit() - 0.9).abs() < f64::EPSILON);
        assert!(rng.unit().abs() < f64::EPSILON);
        assert_eq!(rng.index(3), 2);
        assert_eq!(rng.index(3), 0);
        assert_eq!(rng.up_to(50), 50);
        assert!(rng.is_exhausted());
    }

    #[test]
    fn fixtures_are_stable() {
        let catalog = sample_catalog();
        assert_eq!(catalog.len(), 4);
        assert_eq!(catalog.pick(1).title, "Backpack");
        assert_eq!(customers(2), vec![CustomerId::new("c1"), CustomerId::new("c2")]);
    }
}
