//! Virtual clock and event generator.
//!
//! The generator walks a virtual calendar one day per batch. While the day
//! is inside the backfill window batches are produced back to back; once the
//! window has been covered it keeps going in the live phase, one batch per
//! real-time tick.

use cartstream_core::catalog::Catalog;
use cartstream_core::customer::CustomerId;
use cartstream_core::environment::RandomSource;
use cartstream_core::event::Event;
use cartstream_core::machine::{CartError, Carts};
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, NaiveTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// Last second offset inside a virtual day.
const LAST_SECOND_OF_DAY: u32 = 86_399;

/// Which part of the run a batch belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Historical days, generated as fast as the channel accepts them.
    Backfill,
    /// Days after the backfill window, paced by the live tick.
    Live,
}

/// Errors raised by the generator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GeneratorError {
    /// There is nobody to generate events for.
    #[error("customer list is empty")]
    NoCustomers,

    /// A batch must contain at least one event.
    #[error("batch size must be at least 1")]
    ZeroBatchSize,

    /// A cart transition failed.
    #[error(transparent)]
    Cart(#[from] CartError),
}

/// Generator settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorConfig {
    /// First virtual day (inclusive).
    pub backfill_start: DateTime<Utc>,
    /// First live day; backfill covers `backfill_start..backfill_end`.
    pub backfill_end: DateTime<Utc>,
    /// Events per virtual day.
    pub batch_size: usize,
    /// Real-time pause after each live batch.
    pub live_tick: Duration,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            backfill_start: utc_midnight(2024, 1, 1),
            backfill_end: utc_midnight(2025, 1, 1),
            batch_size: 25,
            live_tick: Duration::from_secs(1),
        }
    }
}

fn utc_midnight(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(year, month, day)
        .unwrap_or_default()
        .and_time(NaiveTime::MIN)
        .and_utc()
}

/// The simulated calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VirtualClock {
    day: DateTime<Utc>,
}

impl VirtualClock {
    /// Start at the day containing `start`, truncated to UTC midnight.
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            day: start.date_naive().and_time(NaiveTime::MIN).and_utc(),
        }
    }

    /// Midnight of the current virtual day.
    #[must_use]
    pub const fn day(&self) -> DateTime<Utc> {
        self.day
    }

    /// Move to the next day.
    pub fn advance(&mut self) {
        self.day += ChronoDuration::days(1);
    }

    /// A uniformly chosen second within the current day.
    pub fn timestamp_within_day<R: RandomSource + ?Sized>(&self, rng: &mut R) -> DateTime<Utc> {
        self.day + ChronoDuration::seconds(i64::from(rng.up_to(LAST_SECOND_OF_DAY)))
    }
}

/// One virtual day's worth of events.
#[derive(Debug, Clone)]
pub struct Batch {
    /// Midnight of the day the events belong to
    pub day: DateTime<Utc>,
    /// Phase the day was generated in
    pub phase: Phase,
    /// Events in generation order; timestamps are not sorted
    pub events: Vec<Event>,
}

/// Produces batches of cart events from a fixed catalog and customer list.
pub struct EventGenerator<R> {
    catalog: Arc<Catalog>,
    carts: Carts,
    rng: R,
    clock: VirtualClock,
    config: GeneratorConfig,
}

impl<R: RandomSource> EventGenerator<R> {
    /// Create a generator positioned at `config.backfill_start`.
    ///
    /// # Errors
    ///
    /// Returns [`GeneratorError::NoCustomers`] if `customers` is empty and
    /// [`GeneratorError::ZeroBatchSize`] if `config.batch_size` is zero.
    pub fn new(
        catalog: Arc<Catalog>,
        customers: impl IntoIterator<Item = CustomerId>,
        rng: R,
        config: GeneratorConfig,
    ) -> Result<Self, GeneratorError> {
        let carts = Carts::new(customers);
        if carts.customers().is_empty() {
            return Err(GeneratorError::NoCustomers);
        }
        if config.batch_size == 0 {
            return Err(GeneratorError::ZeroBatchSize);
        }

        Ok(Self {
            catalog,
            carts,
            rng,
            clock: VirtualClock::new(config.backfill_start),
            config,
        })
    }

    /// Phase of the next batch.
    #[must_use]
    pub fn phase(&self) -> Phase {
        if self.clock.day() < self.config.backfill_end {
            Phase::Backfill
        } else {
            Phase::Live
        }
    }

    /// Current cart state.
    #[must_use]
    pub const fn carts(&self) -> &Carts {
        &self.carts
    }

    /// Generator settings.
    #[must_use]
    pub const fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Generate the current day's batch and advance the clock.
    ///
    /// # Errors
    ///
    /// Propagates [`CartError`] from the state machine.
    pub fn next_batch(&mut self) -> Result<Batch, GeneratorError> {
        let day = self.clock.day();
        let phase = self.phase();
        let mut events = Vec::with_capacity(self.config.batch_size);

        for _ in 0..self.config.batch_size {
            let customers = self.carts.customers();
            let customer = customers[self.rng.index(customers.len())].clone();
            let at = self.clock.timestamp_within_day(&mut self.rng);
            let event = self
                .carts
                .transition(&customer, &self.catalog, at, &mut self.rng)?;
            events.push(event);
        }

        self.clock.advance();
        Ok(Batch { day, phase, events })
    }
}

/// Feed generated events into `sender` until the receiver goes away.
///
/// Backfill batches go out without pausing. Each live batch is followed by a
/// sleep of `live_tick`.
///
/// # Errors
///
/// Returns the first [`GeneratorError`] raised while generating.
pub async fn drive<R: RandomSource>(
    generator: &mut EventGenerator<R>,
    sender: mpsc::Sender<Event>,
) -> Result<(), GeneratorError> {
    let mut backfilled = 0usize;
    let mut announced = generator.phase() == Phase::Live;

    loop {
        let batch = generator.next_batch()?;
        let count = batch.events.len();

        if batch.phase == Phase::Live && !announced {
            tracing::info!(
                days = backfilled,
                through = %batch.day.date_naive(),
                "Backfill complete"
            );
            announced = true;
        }

        for event in batch.events {
            if sender.send(event).await.is_err() {
                tracing::debug!("Event receiver dropped, stopping generator");
                return Ok(());
            }
        }

        match batch.phase {
            Phase::Backfill => backfilled += 1,
            Phase::Live => {
                tracing::info!(day = %batch.day.date_naive(), events = count, "Sent live batch");
                tokio::time::sleep(generator.config.live_tick).await;
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use cartstream_core::environment::RngSource;
    use cartstream_core::event::Action;
    use cartstream_testing::{ScriptedRandom, customers, sample_catalog};
    use chrono::{TimeZone, Timelike};

    fn config(start: DateTime<Utc>, end: DateTime<Utc>, batch_size: usize) -> GeneratorConfig {
        GeneratorConfig {
            backfill_start: start,
            backfill_end: end,
            batch_size,
            live_tick: Duration::from_secs(1),
        }
    }

    fn jan(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()
    }

    #[test]
    fn clock_truncates_to_midnight() {
        let clock = VirtualClock::new(Utc.with_ymd_and_hms(2024, 3, 5, 17, 42, 9).unwrap());
        assert_eq!(clock.day(), Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap());
    }

    #[test]
    fn timestamps_stay_within_the_day() {
        let clock = VirtualClock::new(jan(1));
        let mut rng = ScriptedRandom::new().with_counts([0, LAST_SECOND_OF_DAY]);

        let first = clock.timestamp_within_day(&mut rng);
        let last = clock.timestamp_within_day(&mut rng);

        assert_eq!(first, jan(1));
        assert_eq!(last.date_naive(), jan(1).date_naive());
        assert_eq!(last.num_seconds_from_midnight(), LAST_SECOND_OF_DAY);
    }

    #[test]
    fn rejects_empty_customer_list() {
        let result = EventGenerator::new(
            Arc::new(sample_catalog()),
            Vec::<CustomerId>::new(),
            RngSource::seeded(1),
            GeneratorConfig::default(),
        );
        assert!(matches!(result, Err(GeneratorError::NoCustomers)));
    }

    #[test]
    fn rejects_zero_batch_size() {
        let result = EventGenerator::new(
            Arc::new(sample_catalog()),
            customers(3),
            RngSource::seeded(1),
            config(jan(1), jan(2), 0),
        );
        assert!(matches!(result, Err(GeneratorError::ZeroBatchSize)));
    }

    #[test]
    fn batches_cover_one_day_each_then_go_live() {
        let mut generator = EventGenerator::new(
            Arc::new(sample_catalog()),
            customers(4),
            RngSource::seeded(7),
            config(jan(1), jan(3), 10),
        )
        .unwrap();

        let phases: Vec<_> = (0..4)
            .map(|_| {
                let batch = generator.next_batch().unwrap();
                assert_eq!(batch.events.len(), 10);
                for event in &batch.events {
                    assert_eq!(event.timestamp().date_naive(), batch.day.date_naive());
                }
                (batch.day, batch.phase)
            })
            .collect();

        assert_eq!(
            phases,
            vec![
                (jan(1), Phase::Backfill),
                (jan(2), Phase::Backfill),
                (jan(3), Phase::Live),
                (jan(4), Phase::Live),
            ]
        );
    }

    #[test]
    fn first_event_for_a_customer_is_an_add() {
        let mut generator = EventGenerator::new(
            Arc::new(sample_catalog()),
            customers(1),
            RngSource::seeded(99),
            config(jan(1), jan(2), 1),
        )
        .unwrap();

        let batch = generator.next_batch().unwrap();
        assert_eq!(batch.events[0].action(), Action::AddToCart);
    }

    #[test]
    fn same_seed_same_stream() {
        let run = || {
            let mut generator = EventGenerator::new(
                Arc::new(sample_catalog()),
                customers(5),
                RngSource::seeded(2024),
                config(jan(1), jan(10), 25),
            )
            .unwrap();
            (0..5)
                .flat_map(|_| generator.next_batch().unwrap().events)
                .map(|e| {
                    (
                        e.customer_id().clone(),
                        e.action(),
                        e.product().and_then(|p| p.id),
                        e.timestamp(),
                    )
                })
                .collect::<Vec<_>>()
        };

        assert_eq!(run(), run());
    }

    #[tokio::test(start_paused = true)]
    async fn drive_sends_backfill_without_delay_and_paces_live_batches() {
        let mut generator = EventGenerator::new(
            Arc::new(sample_catalog()),
            customers(3),
            RngSource::seeded(5),
            config(jan(1), jan(4), 2),
        )
        .unwrap();
        let (tx, mut rx) = mpsc::channel(64);
        let started = tokio::time::Instant::now();

        let handle = tokio::spawn(async move { drive(&mut generator, tx).await });

        // Three backfill days of two events each arrive with no time passing.
        for _ in 0..6 {
            let event = rx.recv().await.unwrap();
            assert!(event.timestamp() < jan(4));
        }
        assert_eq!(started.elapsed(), Duration::ZERO);

        // The first live batch goes out, then the tick.
        for _ in 0..2 {
            let event = rx.recv().await.unwrap();
            assert_eq!(event.timestamp().date_naive(), jan(4).date_naive());
        }
        let next = rx.recv().await.unwrap();
        assert_eq!(next.timestamp().date_naive(), jan(5).date_naive());
        assert!(started.elapsed() >= Duration::from_secs(1));

        drop(rx);
        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn drive_stops_when_receiver_is_gone() {
        let mut generator = EventGenerator::new(
            Arc::new(sample_catalog()),
            customers(2),
            RngSource::seeded(3),
            config(jan(1), jan(2), 5),
        )
        .unwrap();
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        assert_eq!(drive(&mut generator, tx).await, Ok(()));
    }
}
