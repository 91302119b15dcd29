//! Environment abstraction.
//!
//! The `Environment` trait decouples the session engine from system
//! resources (time, sleeping, randomness). The heartbeat monitor only ever
//! talks to the clock through it, which is what lets the liveness tests run
//! against millisecond-scale configurations instead of the 10-second
//! production defaults.
//!
//! # Invariants
//!
//! - Monotonicity: `now()` never goes backwards within one process.
//! - Isolation: implementations must not share hidden global state.

use std::time::{Duration, Instant};

/// Abstract environment providing time, sleeping, and randomness.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Returns the current time.
    ///
    /// Must be monotonic: subsequent calls return values >= previous calls.
    fn now(&self) -> Instant;

    /// Sleeps for the specified duration.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fills the provided buffer with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u64`, used for connection ids.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }
}
