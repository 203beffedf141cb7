//! Car and pedestrian behaviors: enter, hold the tunnel, leave.

use std::{thread, time::Duration};

use tunnel_monitor::{Direction, TrafficClass, Tunnel};

use crate::report::Observer;

pub fn car(
    id: u64,
    direction: Direction,
    tunnel: &dyn Tunnel,
    observer: &Observer,
    crossing: Duration,
) {
    log::info!(
        "car {id} heading {direction} wants to enter. Monitor: {}",
        tunnel.snapshot().operations()
    );
    tunnel.enter_car(direction);

    let snapshot = tunnel.snapshot();
    observer.entered(direction.into(), &snapshot);
    log::info!(
        "car {id} heading {direction} enters the tunnel. Monitor: {}",
        snapshot.operations()
    );

    thread::sleep(crossing);

    log::info!(
        "car {id} heading {direction} leaving the tunnel. Monitor: {}",
        tunnel.snapshot().operations()
    );
    tunnel.leave_car(direction);
    log::info!(
        "car {id} heading {direction} out of the tunnel. Monitor: {}",
        tunnel.snapshot().operations()
    );
}

pub fn pedestrian(id: u64, tunnel: &dyn Tunnel, observer: &Observer, crossing: Duration) {
    log::info!(
        "pedestrian {id} wants to enter. Monitor: {}",
        tunnel.snapshot().operations()
    );
    tunnel.enter_pedestrian();

    let snapshot = tunnel.snapshot();
    observer.entered(TrafficClass::Pedestrian, &snapshot);
    log::info!(
        "pedestrian {id} enters the tunnel. Monitor: {}",
        snapshot.operations()
    );

    thread::sleep(crossing);

    log::info!(
        "pedestrian {id} leaving the tunnel. Monitor: {}",
        tunnel.snapshot().operations()
    );
    tunnel.leave_pedestrian();
    log::info!(
        "pedestrian {id} out of the tunnel. Monitor: {}",
        tunnel.snapshot().operations()
    );
}
