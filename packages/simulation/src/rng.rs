//! Random arrivals, directions and crossing times.

use rand::{Rng as _, SeedableRng, rngs::StdRng};
use tunnel_monitor::Direction;

use crate::config::CrossingRange;

/// Seedable source of every random choice one generator makes.
#[derive(Debug, Clone)]
pub struct ArrivalRng(StdRng);

impl ArrivalRng {
    /// Creates a generator from an optional seed.
    ///
    /// If `None` is provided, the generator is seeded from the OS.
    #[must_use]
    pub fn new(seed: Option<u64>) -> Self {
        Self(seed.map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64))
    }

    /// North or south with equal probability.
    pub fn direction(&mut self) -> Direction {
        if self.0.random_bool(0.5) {
            Direction::North
        } else {
            Direction::South
        }
    }

    /// Exponentially distributed gap between arrivals with the given mean.
    pub fn interarrival(&mut self, mean: f64) -> f64 {
        if mean <= 0.0 {
            return 0.0;
        }

        let uniform: f64 = self.0.random();
        -mean * (1.0 - uniform).ln()
    }

    /// Uniformly distributed crossing time within `range`.
    pub fn crossing(&mut self, range: CrossingRange) -> f64 {
        if range.min >= range.max {
            return range.min;
        }

        self.0.random_range(range.min..=range.max)
    }
}
