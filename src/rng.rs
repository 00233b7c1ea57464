use rand::{rngs::StdRng, SeedableRng};
use std::sync::atomic::{AtomicU64, Ordering};

static STREAM: AtomicU64 = AtomicU64::new(0);

/// Create a [`StdRng`] seeded from the `SEED` environment variable.
///
/// Successive calls draw from distinct streams derived from the base seed,
/// so repeated layer initializations stay deterministic without being
/// identical to each other.
pub fn rng_from_env() -> StdRng {
    let base: u64 = std::env::var("SEED")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);
    let stream = STREAM.fetch_add(1, Ordering::SeqCst);
    StdRng::seed_from_u64(base.wrapping_add(stream))
}
