//! Synchronization monitor for a single-lane, bidirectional tunnel.
//!
//! Three traffic classes share the tunnel: cars heading south, cars heading
//! north, and pedestrians. Only one class may occupy the tunnel at a time,
//! and a priority marker ([`Turn`]) keeps a class from being starved while
//! the others keep arriving.
//!
//! Two backends implement the [`Tunnel`] trait:
//!
//! * [`Monitor`] - a mutex plus one condition variable per traffic class
//! * [`arbiter::ArbiterHandle`] - a dedicated thread that owns the state and
//!   serves requests over a channel (requires the `arbiter` feature)
//!
//! # Example
//!
//! ```rust
//! use tunnel_monitor::{Direction, Monitor, TrafficClass, Tunnel as _};
//!
//! let monitor = Monitor::new();
//!
//! monitor.enter_car(Direction::South);
//! assert_eq!(monitor.snapshot().crossing()[TrafficClass::SouthCar], 1);
//!
//! monitor.leave_car(Direction::South);
//! assert_eq!(monitor.snapshot().crossing()[TrafficClass::SouthCar], 0);
//! ```

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

use std::{fmt, str::FromStr};

use thiserror::Error;

#[cfg(feature = "arbiter")]
pub mod arbiter;

mod monitor;
mod state;

pub use monitor::Monitor;
pub use state::{ClassCounts, SharedState};

/// Default number of waiters a class must exceed before it is favored.
pub const DEFAULT_PRIORITY_THRESHOLD: u32 = 2;

/// Direction of travel for a car.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Direction {
    South,
    North,
}

impl Direction {
    pub const ALL: [Self; 2] = [Self::South, Self::North];

    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::South => Self::North,
            Self::North => Self::South,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Self::South => "south",
            Self::North => "north",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid direction: {0:?}")]
pub struct InvalidDirectionError(pub String);

/// Numeric direction codes, `0` for north and `1` for south.
impl TryFrom<u8> for Direction {
    type Error = InvalidDirectionError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::North),
            1 => Ok(Self::South),
            _ => Err(InvalidDirectionError(value.to_string())),
        }
    }
}

impl FromStr for Direction {
    type Err = InvalidDirectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "south" | "s" => Ok(Self::South),
            "north" | "n" => Ok(Self::North),
            _ => Err(InvalidDirectionError(s.to_string())),
        }
    }
}

/// The kinds of traffic that compete for the tunnel.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TrafficClass {
    SouthCar,
    NorthCar,
    Pedestrian,
}

impl TrafficClass {
    pub const ALL: [Self; 3] = [Self::SouthCar, Self::NorthCar, Self::Pedestrian];

    pub(crate) const fn index(self) -> usize {
        match self {
            Self::SouthCar => 0,
            Self::NorthCar => 1,
            Self::Pedestrian => 2,
        }
    }

    /// The two classes excluded while this one occupies the tunnel.
    ///
    /// These are also the classes whose waiters get woken once the last
    /// member of this class leaves.
    #[must_use]
    pub const fn others(self) -> [Self; 2] {
        match self {
            Self::SouthCar => [Self::NorthCar, Self::Pedestrian],
            Self::NorthCar => [Self::SouthCar, Self::Pedestrian],
            Self::Pedestrian => [Self::NorthCar, Self::SouthCar],
        }
    }

    #[must_use]
    pub const fn direction(self) -> Option<Direction> {
        match self {
            Self::SouthCar => Some(Direction::South),
            Self::NorthCar => Some(Direction::North),
            Self::Pedestrian => None,
        }
    }
}

impl From<Direction> for TrafficClass {
    fn from(value: Direction) -> Self {
        match value {
            Direction::South => Self::SouthCar,
            Direction::North => Self::NorthCar,
        }
    }
}

impl fmt::Display for TrafficClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Self::SouthCar => "south car",
            Self::NorthCar => "north car",
            Self::Pedestrian => "pedestrian",
        })
    }
}

/// The class that currently holds the right of way, if any.
///
/// A favored class is never blocked by the turn itself. Every other class
/// is held back until a departure resets the turn.
#[derive(Debug, Default, Clone, Copy, Hash, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Turn {
    #[default]
    Any,
    Favor(TrafficClass),
}

impl Turn {
    #[must_use]
    pub fn permits(self, class: TrafficClass) -> bool {
        match self {
            Self::Any => true,
            Self::Favor(favored) => favored == class,
        }
    }
}

impl fmt::Display for Turn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.pad("any"),
            Self::Favor(class) => class.fmt(f),
        }
    }
}

/// Starvation-avoidance rule applied on every departure.
///
/// When a class leaves, its candidates (see
/// [`PriorityRule::candidates`]) are checked in order, and the first one
/// with more than `threshold` waiters becomes the favored class. If none
/// qualifies the turn goes back to [`Turn::Any`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PriorityRule {
    pub threshold: u32,
}

impl Default for PriorityRule {
    fn default() -> Self {
        Self::new(DEFAULT_PRIORITY_THRESHOLD)
    }
}

impl PriorityRule {
    #[must_use]
    pub const fn new(threshold: u32) -> Self {
        Self { threshold }
    }

    /// Classes considered for the turn when `departing` leaves, in order of
    /// precedence.
    ///
    /// A departing car checks the opposite direction before pedestrians. A
    /// departing pedestrian checks north cars before south cars.
    #[must_use]
    pub const fn candidates(departing: TrafficClass) -> [TrafficClass; 2] {
        departing.others()
    }

    #[must_use]
    pub fn next_turn(&self, departing: TrafficClass, waiting: &ClassCounts) -> Turn {
        Self::candidates(departing)
            .into_iter()
            .find(|candidate| waiting[*candidate] > u64::from(self.threshold))
            .map_or(Turn::Any, Turn::Favor)
    }
}

/// The operations every tunnel backend exposes to actors.
///
/// `enter_*` calls block the calling thread until the class may enter.
/// `leave_*` calls never block. Every `leave_*` must follow a matching
/// `enter_*` made by the same actor.
pub trait Tunnel: Send + Sync {
    fn enter_car(&self, direction: Direction);

    fn leave_car(&self, direction: Direction);

    fn enter_pedestrian(&self);

    fn leave_pedestrian(&self);

    /// Copy of the shared state taken under the lock.
    fn snapshot(&self) -> SharedState;
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test_log::test]
    fn direction_parses_names_and_codes() {
        assert_eq!("South".parse::<Direction>(), Ok(Direction::South));
        assert_eq!(" n ".parse::<Direction>(), Ok(Direction::North));
        assert_eq!(Direction::try_from(1), Ok(Direction::South));
        assert_eq!(Direction::try_from(0), Ok(Direction::North));
    }

    #[test_log::test]
    fn direction_rejects_invalid_values() {
        assert_eq!(
            "east".parse::<Direction>(),
            Err(InvalidDirectionError("east".to_string()))
        );
        assert_eq!(
            Direction::try_from(2),
            Err(InvalidDirectionError("2".to_string()))
        );
    }

    #[test_log::test]
    fn turn_only_restricts_other_classes() {
        for class in TrafficClass::ALL {
            assert!(Turn::Any.permits(class));
            assert!(Turn::Favor(class).permits(class));
            for other in class.others() {
                assert!(!Turn::Favor(other).permits(class));
            }
        }
    }

    #[test_log::test]
    fn next_turn_defaults_to_any_at_threshold() {
        let rule = PriorityRule::default();
        let waiting = ClassCounts::from([2, 2, 2]);

        for class in TrafficClass::ALL {
            assert_eq!(rule.next_turn(class, &waiting), Turn::Any);
        }
    }

    #[test_log::test]
    fn departing_car_favors_opposite_direction_first() {
        let rule = PriorityRule::default();
        let waiting = ClassCounts::from([3, 3, 3]);

        assert_eq!(
            rule.next_turn(TrafficClass::SouthCar, &waiting),
            Turn::Favor(TrafficClass::NorthCar)
        );
        assert_eq!(
            rule.next_turn(TrafficClass::NorthCar, &waiting),
            Turn::Favor(TrafficClass::SouthCar)
        );
    }

    #[test_log::test]
    fn departing_car_falls_back_to_pedestrians() {
        let rule = PriorityRule::default();
        let waiting = ClassCounts::from([0, 1, 3]);

        assert_eq!(
            rule.next_turn(TrafficClass::SouthCar, &waiting),
            Turn::Favor(TrafficClass::Pedestrian)
        );
    }

    // Depends on the north-before-south tie-break for departing pedestrians.
    #[test_log::test]
    fn departing_pedestrian_checks_north_before_south() {
        let rule = PriorityRule::default();

        assert_eq!(
            rule.next_turn(TrafficClass::Pedestrian, &ClassCounts::from([3, 3, 0])),
            Turn::Favor(TrafficClass::NorthCar)
        );
        assert_eq!(
            rule.next_turn(TrafficClass::Pedestrian, &ClassCounts::from([3, 0, 0])),
            Turn::Favor(TrafficClass::SouthCar)
        );
    }

    #[test_log::test]
    fn departing_class_never_favors_itself() {
        let rule = PriorityRule::new(0);
        let waiting = ClassCounts::from([5, 0, 0]);

        assert_eq!(rule.next_turn(TrafficClass::SouthCar, &waiting), Turn::Any);
    }

    #[test_log::test]
    fn threshold_is_configurable() {
        let waiting = ClassCounts::from([0, 1, 0]);

        assert_eq!(
            PriorityRule::new(0).next_turn(TrafficClass::SouthCar, &waiting),
            Turn::Favor(TrafficClass::NorthCar)
        );
        assert_eq!(
            PriorityRule::new(1).next_turn(TrafficClass::SouthCar, &waiting),
            Turn::Any
        );
    }
}
