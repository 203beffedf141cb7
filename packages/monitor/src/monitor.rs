use std::{
    fmt,
    sync::{Condvar, Mutex, MutexGuard},
};

use crate::{Direction, PriorityRule, SharedState, TrafficClass, Tunnel};

const POISONED: &str = "Tunnel monitor lock poisoned";

/// Condition-variable backed tunnel monitor.
///
/// All state lives behind a single [`Mutex`]. Each traffic class waits on
/// its own [`Condvar`] and rechecks its entry predicate on every wake.
///
/// A poisoned lock means a thread panicked in the middle of a critical
/// section, so the counters can no longer be trusted. Every operation
/// panics in that case instead of carrying on without mutual exclusion.
#[derive(Debug)]
pub struct Monitor {
    rule: PriorityRule,
    state: Mutex<SharedState>,
    south_car: Condvar,
    north_car: Condvar,
    pedestrian: Condvar,
}

impl Default for Monitor {
    fn default() -> Self {
        Self::new()
    }
}

impl Monitor {
    #[must_use]
    pub fn new() -> Self {
        Self::with_rule(PriorityRule::default())
    }

    #[must_use]
    pub fn with_rule(rule: PriorityRule) -> Self {
        Self {
            rule,
            state: Mutex::new(SharedState::default()),
            south_car: Condvar::new(),
            north_car: Condvar::new(),
            pedestrian: Condvar::new(),
        }
    }

    #[must_use]
    pub const fn rule(&self) -> PriorityRule {
        self.rule
    }

    const fn condition(&self, class: TrafficClass) -> &Condvar {
        match class {
            TrafficClass::SouthCar => &self.south_car,
            TrafficClass::NorthCar => &self.north_car,
            TrafficClass::Pedestrian => &self.pedestrian,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SharedState> {
        self.state.lock().expect(POISONED)
    }

    /// Blocks until `class` may enter, then records it as crossing.
    ///
    /// # Panics
    ///
    /// * If the state mutex is poisoned
    pub fn enter(&self, class: TrafficClass) {
        let mut state = self.lock();
        state.record_operation();
        state.begin_wait(class);

        if !state.can_enter(class) {
            log::debug!(
                "enter: {class} waiting (crossing={:?} turn={})",
                state.crossing(),
                state.turn()
            );
        }

        let mut state = self
            .condition(class)
            .wait_while(state, |state| !state.can_enter(class))
            .expect(POISONED);

        state.admit(class);
        log::debug!(
            "enter: {class} granted ({} crossing)",
            state.crossing()[class]
        );
    }

    /// Records one member of `class` leaving.
    ///
    /// Once the last member of `class` is out, every waiter of the two
    /// excluded classes is woken to recheck its predicate.
    ///
    /// # Panics
    ///
    /// * If the state mutex is poisoned
    pub fn leave(&self, class: TrafficClass) {
        let mut state = self.lock();
        state.record_operation();

        let Some(departure) = state.depart(class, self.rule) else {
            return;
        };
        log::trace!("leave: {class} left (state={state:?})");
        drop(state);

        if departure.cleared {
            for other in class.others() {
                self.condition(other).notify_all();
            }
        }
    }

    /// # Panics
    ///
    /// * If the state mutex is poisoned
    #[must_use]
    pub fn snapshot(&self) -> SharedState {
        *self.lock()
    }
}

impl Tunnel for Monitor {
    fn enter_car(&self, direction: Direction) {
        self.enter(direction.into());
    }

    fn leave_car(&self, direction: Direction) {
        self.leave(direction.into());
    }

    fn enter_pedestrian(&self) {
        self.enter(TrafficClass::Pedestrian);
    }

    fn leave_pedestrian(&self) {
        self.leave(TrafficClass::Pedestrian);
    }

    fn snapshot(&self) -> SharedState {
        Self::snapshot(self)
    }
}

/// Renders the operation counter as `Monitor: N`.
///
/// Panics if the state mutex is poisoned, like every other operation.
impl fmt::Display for Monitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let operations = self.lock().operations();
        write!(f, "Monitor: {operations}")
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::Arc,
        thread,
        time::{Duration, Instant},
    };

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::Turn;

    /// Wait for the monitor state to satisfy a predicate with timeout.
    ///
    /// # Panics
    ///
    /// * If the timeout is exceeded before the predicate is satisfied
    fn wait_for_state(monitor: &Monitor, predicate: impl Fn(&SharedState) -> bool) -> SharedState {
        let timeout = Duration::from_secs(5);
        let start = Instant::now();

        loop {
            let state = monitor.snapshot();
            if predicate(&state) {
                return state;
            }

            assert!(
                start.elapsed() < timeout,
                "Timeout after {timeout:?} waiting for state condition, current state: {state:?}"
            );

            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test_log::test]
    fn enter_on_fresh_monitor_does_not_block() {
        let monitor = Monitor::new();
        monitor.enter(TrafficClass::SouthCar);

        let state = monitor.snapshot();
        assert_eq!(state.crossing()[TrafficClass::SouthCar], 1);
        assert_eq!(state.waiting()[TrafficClass::SouthCar], 0);
        assert_eq!(state.turn(), Turn::Any);
    }

    #[test_log::test]
    fn operations_are_counted() {
        let monitor = Monitor::new();
        monitor.enter_pedestrian();
        monitor.enter_pedestrian();
        monitor.leave_pedestrian();

        assert_eq!(monitor.snapshot().operations(), 3);
        assert_eq!(monitor.to_string(), "Monitor: 3");
    }

    #[test_log::test]
    fn leave_without_enter_leaves_state_unchanged() {
        let monitor = Monitor::new();
        monitor.leave_car(Direction::North);

        let state = monitor.snapshot();
        assert_eq!(state.crossing().total(), 0);
        assert_eq!(state.turn(), Turn::Any);
    }

    #[test_log::test]
    fn blocked_car_is_released_when_tunnel_clears() {
        let monitor = Arc::new(Monitor::new());
        monitor.enter_car(Direction::South);

        let handle = thread::spawn({
            let monitor = monitor.clone();
            move || monitor.enter_car(Direction::North)
        });

        wait_for_state(&monitor, |s| s.waiting()[TrafficClass::NorthCar] == 1);
        assert_eq!(monitor.snapshot().crossing()[TrafficClass::NorthCar], 0);

        monitor.leave_car(Direction::South);
        handle.join().unwrap();

        let state = monitor.snapshot();
        assert_eq!(state.crossing()[TrafficClass::NorthCar], 1);
        assert_eq!(state.waiting()[TrafficClass::NorthCar], 0);
    }

    #[test_log::test]
    fn partial_departure_keeps_opposite_class_waiting() {
        let monitor = Arc::new(Monitor::new());
        monitor.enter_car(Direction::North);
        monitor.enter_car(Direction::North);

        let handle = thread::spawn({
            let monitor = monitor.clone();
            move || monitor.enter_pedestrian()
        });

        wait_for_state(&monitor, |s| s.waiting()[TrafficClass::Pedestrian] == 1);
        monitor.leave_car(Direction::North);
        assert_eq!(monitor.snapshot().crossing()[TrafficClass::Pedestrian], 0);

        monitor.leave_car(Direction::North);
        handle.join().unwrap();
        assert_eq!(monitor.snapshot().occupant(), Some(TrafficClass::Pedestrian));
    }

    #[test_log::test]
    fn poisoned_lock_is_fatal() {
        let monitor = Arc::new(Monitor::new());

        let _ = thread::spawn({
            let monitor = monitor.clone();
            move || {
                let _guard = monitor.state.lock().unwrap();
                panic!("crash inside the critical section");
            }
        })
        .join();

        let result = thread::spawn({
            let monitor = monitor.clone();
            move || monitor.enter_pedestrian()
        })
        .join();
        assert!(result.is_err());

        let result = thread::spawn(move || monitor.to_string()).join();
        assert!(result.is_err());
    }
}
