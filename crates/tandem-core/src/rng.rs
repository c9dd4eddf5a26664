//! Lockstep random number generator.
//!
//! Both peers hold one of these. The therapist picks the seed and ships it in
//! `Open` and `Login`; as long as both sides then make the same sequence of
//! `draw` calls, they see the same numbers. The draw counter makes drift
//! observable.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Seeded generator shared in lockstep between two peers.
///
/// ChaCha8 rather than `StdRng`: its output stream is stable across platforms
/// and `rand` releases, so two builds agree on every draw.
#[derive(Debug, Clone)]
pub struct LockstepRng {
    seed: u32,
    draws: u64,
    rng: ChaCha8Rng,
}

impl LockstepRng {
    /// Generator seeded with `seed`, zero draws made.
    pub fn new(seed: u32) -> Self {
        Self { seed, draws: 0, rng: ChaCha8Rng::seed_from_u64(u64::from(seed)) }
    }

    /// Reseed and reset the draw counter.
    pub fn set_seed(&mut self, seed: u32) {
        *self = Self::new(seed);
    }

    /// Current seed.
    pub fn seed(&self) -> u32 {
        self.seed
    }

    /// Draws made since the last `set_seed`.
    pub fn draw_count(&self) -> u64 {
        self.draws
    }

    /// Integer in `[min, max)`.
    ///
    /// An empty range returns `min`. It still counts as a draw so callers that
    /// size ranges from shared state stay in step even when a range collapses.
    pub fn draw(&mut self, min: i32, max: i32) -> i32 {
        self.draws += 1;
        if max <= min {
            return min;
        }
        self.rng.gen_range(min..max)
    }

    /// Shuffle `items` using lockstep draws.
    ///
    /// Picks and removes a random element while more than one remains, then
    /// inserts the last one at a random position. Both peers must call this
    /// with equally long inputs.
    pub fn randomize<T>(&mut self, mut items: Vec<T>) -> Vec<T> {
        let mut out = Vec::with_capacity(items.len());
        while items.len() > 1 {
            let index = self.draw_index(items.len());
            out.push(items.remove(index));
        }
        if let Some(last) = items.pop() {
            let index = self.draw_index(out.len());
            out.insert(index, last);
        }
        out
    }

    fn draw_index(&mut self, len: usize) -> usize {
        let max = i32::try_from(len).unwrap_or(i32::MAX);
        usize::try_from(self.draw(0, max)).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn empty_range_counts_as_draw() {
        let mut rng = LockstepRng::new(1);
        assert_eq!(rng.draw(5, 5), 5);
        assert_eq!(rng.draw(7, 3), 7);
        assert_eq!(rng.draw_count(), 2);
    }

    #[test]
    fn set_seed_resets_stream_and_counter() {
        let mut rng = LockstepRng::new(42);
        let first: Vec<_> = (0..8).map(|_| rng.draw(0, 1000)).collect();

        rng.set_seed(42);
        assert_eq!(rng.draw_count(), 0);
        let again: Vec<_> = (0..8).map(|_| rng.draw(0, 1000)).collect();
        assert_eq!(first, again);
    }

    #[test]
    fn randomize_keeps_every_item() {
        let mut rng = LockstepRng::new(9);
        let mut shuffled = rng.randomize((0..20).collect::<Vec<_>>());
        // n - 1 picks plus the final insert
        assert_eq!(rng.draw_count(), 20);

        shuffled.sort_unstable();
        assert_eq!(shuffled, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn randomize_small_inputs() {
        let mut rng = LockstepRng::new(3);
        assert!(rng.randomize(Vec::<u8>::new()).is_empty());
        assert_eq!(rng.randomize(vec!['a']), vec!['a']);
        assert_eq!(rng.draw_count(), 1);
    }

    proptest! {
        #[test]
        fn peers_draw_in_lockstep(
            seed in any::<u32>(),
            ranges in prop::collection::vec((-1000i32..1000, -1000i32..1000), 0..64),
        ) {
            let mut therapist = LockstepRng::new(seed);
            let mut patient = LockstepRng::new(seed);

            for (min, max) in ranges {
                let a = therapist.draw(min, max);
                prop_assert_eq!(a, patient.draw(min, max));
                if max > min {
                    prop_assert!(a >= min && a < max);
                } else {
                    prop_assert_eq!(a, min);
                }
            }
            prop_assert_eq!(therapist.draw_count(), patient.draw_count());
        }

        #[test]
        fn randomize_in_lockstep(
            seed in any::<u32>(),
            items in prop::collection::vec(any::<u16>(), 0..40),
        ) {
            let mut therapist = LockstepRng::new(seed);
            let mut patient = LockstepRng::new(seed);
            prop_assert_eq!(therapist.randomize(items.clone()), patient.randomize(items));
        }
    }
}
