use std::ops::{Index, IndexMut};

use crate::{PriorityRule, TrafficClass, Turn};

/// One counter per [`TrafficClass`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClassCounts([u64; 3]);

impl ClassCounts {
    #[must_use]
    pub fn total(&self) -> u64 {
        self.0.iter().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TrafficClass, u64)> + '_ {
        TrafficClass::ALL.into_iter().map(|class| (class, self[class]))
    }
}

/// Counts in `[south car, north car, pedestrian]` order.
impl From<[u64; 3]> for ClassCounts {
    fn from(value: [u64; 3]) -> Self {
        Self(value)
    }
}

impl Index<TrafficClass> for ClassCounts {
    type Output = u64;

    fn index(&self, class: TrafficClass) -> &Self::Output {
        &self.0[class.index()]
    }
}

impl IndexMut<TrafficClass> for ClassCounts {
    fn index_mut(&mut self, class: TrafficClass) -> &mut Self::Output {
        &mut self.0[class.index()]
    }
}

/// The counters and priority marker every tunnel backend arbitrates over.
///
/// Only the backends mutate it, always under their lock (or on their own
/// thread, for the arbiter). Everyone else sees copies through
/// [`crate::Tunnel::snapshot`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SharedState {
    crossing: ClassCounts,
    waiting: ClassCounts,
    turn: Turn,
    operations: u64,
}

/// Outcome of a departure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Departure {
    /// The departing class has nobody left inside the tunnel.
    pub cleared: bool,
}

impl SharedState {
    #[must_use]
    pub const fn crossing(&self) -> &ClassCounts {
        &self.crossing
    }

    #[must_use]
    pub const fn waiting(&self) -> &ClassCounts {
        &self.waiting
    }

    #[must_use]
    pub const fn turn(&self) -> Turn {
        self.turn
    }

    /// Number of enter/leave operations performed so far.
    #[must_use]
    pub const fn operations(&self) -> u64 {
        self.operations
    }

    /// Entry predicate for `class`.
    ///
    /// Both excluded classes must be out of the tunnel and the turn must
    /// either be open or favor `class`.
    #[must_use]
    pub fn can_enter(&self, class: TrafficClass) -> bool {
        class
            .others()
            .into_iter()
            .all(|other| self.crossing[other] == 0)
            && self.turn.permits(class)
    }

    /// The class currently inside the tunnel, if any.
    #[must_use]
    pub fn occupant(&self) -> Option<TrafficClass> {
        TrafficClass::ALL
            .into_iter()
            .find(|class| self.crossing[*class] > 0)
    }

    /// Whether at most one traffic class is inside the tunnel.
    #[must_use]
    pub fn is_exclusive(&self) -> bool {
        TrafficClass::ALL
            .into_iter()
            .filter(|class| self.crossing[*class] > 0)
            .count()
            <= 1
    }

    pub(crate) const fn record_operation(&mut self) {
        self.operations += 1;
    }

    pub(crate) fn begin_wait(&mut self, class: TrafficClass) {
        self.waiting[class] += 1;
    }

    /// Moves one waiter of `class` into the tunnel.
    pub(crate) fn admit(&mut self, class: TrafficClass) {
        debug_assert!(self.can_enter(class));
        self.waiting[class] = self.waiting[class].saturating_sub(1);
        self.crossing[class] += 1;
    }

    /// Undoes an [`Self::admit`] whose grant never reached its actor.
    pub(crate) fn revoke(&mut self, class: TrafficClass) {
        self.crossing[class] = self.crossing[class].saturating_sub(1);
    }

    /// Records one member of `class` leaving and re-derives the turn.
    ///
    /// Returns `None` for a leave with nobody of that class inside. The
    /// state is left untouched in that case.
    pub(crate) fn depart(&mut self, class: TrafficClass, rule: PriorityRule) -> Option<Departure> {
        if self.crossing[class] == 0 {
            log::error!("depart: {class} left without entering, ignoring");
            return None;
        }

        self.crossing[class] -= 1;

        let turn = rule.next_turn(class, &self.waiting);
        if turn != self.turn {
            log::debug!("depart: turn {} -> {turn}", self.turn);
            self.turn = turn;
        }

        Some(Departure {
            cleared: self.crossing[class] == 0,
        })
    }
}
