pub mod random;

pub use random::RandomGenerator;

use tinylink_core::ShortCode;

/// Trait for generating short codes.
///
/// Implementations are pure generators that don't interact with storage;
/// collision avoidance against stored codes is done by [`unique_code`].
pub trait Generator: Send + Sync + 'static {
    /// Draws a candidate code of exactly `length` symbols.
    fn generate(&self, length: usize) -> ShortCode;
}

/// Draws candidates until one is not taken.
///
/// Retries are unbounded: at the lengths operators choose (8 and up) the
/// collision probability is negligible.
pub fn unique_code<G, F>(generator: &G, length: usize, mut is_taken: F) -> ShortCode
where
    G: Generator + ?Sized,
    F: FnMut(&ShortCode) -> bool,
{
    loop {
        let candidate = generator.generate(length);
        if !is_taken(&candidate) {
            return candidate;
        }
    }
}
