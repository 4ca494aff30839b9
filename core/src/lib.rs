//! # Cartstream Core
//!
//! Domain types and the cart state machine for the cart event stream.
//!
//! This crate is the functional core of the system. It performs no I/O: randomness
//! is injected through the trait in [`environment`], timestamps are passed in
//! explicitly, and persistence is reached only through the
//! [`sink::EventSink`] trait.
//!
//! ## Core Concepts
//!
//! - **Catalog**: immutable snapshot of sellable products, loaded once
//! - **Cart**: per-customer multiset of product quantities
//! - **Carts**: the cart state machine over a fixed customer universe
//! - **Event**: immutable record of one customer action, the unit of
//!   transport and persistence
//!
//! ## Example
//!
//! ```
//! use cartstream_core::catalog::{Catalog, Product, ProductId};
//! use cartstream_core::customer::CustomerId;
//! use cartstream_core::environment::RngSource;
//! use cartstream_core::event::Action;
//! use cartstream_core::machine::Carts;
//! use chrono::Utc;
//!
//! let catalog = Catalog::new(vec![Product::new(
//!     ProductId::new(7),
//!     "Backpack",
//!     19.99,
//!     "Fits 15 inch laptops",
//!     "https://example.com/7.jpg",
//! )])
//! .unwrap();
//!
//! let customer = CustomerId::new("c1");
//! let mut carts = Carts::new([customer.clone()]);
//! let mut rng = RngSource::seeded(42);
//!
//! let event = carts.transition(&customer, &catalog, Utc::now(), &mut rng).unwrap();
//! assert_eq!(event.action(), Action::AddToCart);
//! ```

pub mod cart;
pub mod catalog;
pub mod customer;
pub mod event;
pub mod machine;
pub mod sink;
pub mod wire;

// Re-export commonly used types
pub use chrono::{DateTime, Utc};

/// Environment traits - injected sources of randomness.
///
/// All nondeterminism the cart state machine and the generator depend on is
/// abstracted here so tests can script it. Time is not injected: events are
/// stamped by the generator's virtual clock, passed in explicitly.
pub mod environment {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// Source of the random draws made by the cart state machine and the
    /// generator.
    ///
    /// Given the same sequence of draws, every consumer of this trait makes
    /// the same decisions.
    pub trait RandomSource: Send {
        /// A uniform value in `[0, 1)`.
        fn unit(&mut self) -> f64;

        /// A uniform index in `0..len`.
        ///
        /// Callers never pass `len == 0`.
        fn index(&mut self, len: usize) -> usize;

        /// A uniform integer in `0..=max`.
        fn up_to(&mut self, max: u32) -> u32;
    }

    /// [`RandomSource`] backed by any `rand` generator.
    #[derive(Debug, Clone)]
    pub struct RngSource<R>(R);

    impl<R: Rng + Send> RngSource<R> {
        /// Wrap an existing generator.
        #[must_use]
        pub const fn new(rng: R) -> Self {
            Self(rng)
        }
    }

    impl RngSource<StdRng> {
        /// Deterministic source for reproducible runs.
        #[must_use]
        pub fn seeded(seed: u64) -> Self {
            Self(StdRng::seed_from_u64(seed))
        }

        /// Source seeded from operating system entropy.
        #[must_use]
        pub fn from_entropy() -> Self {
            Self(StdRng::from_entropy())
        }
    }

    impl<R: Rng + Send> RandomSource for RngSource<R> {
        fn unit(&mut self) -> f64 {
            self.0.r#gen::<f64>()
        }

        fn index(&mut self, len: usize) -> usize {
            self.0.gen_range(0..len)
        }

        fn up_to(&mut self, max: u32) -> u32 {
            self.0.gen_range(0..=max)
        }
    }
}
