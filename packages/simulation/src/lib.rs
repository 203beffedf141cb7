//! Threaded traffic simulation around the tunnel monitor.
//!
//! Two generator threads spawn one thread per car and per pedestrian with
//! exponentially distributed gaps between arrivals. Every actor enters the
//! tunnel, holds it for a random crossing time and leaves. An [`Observer`]
//! checks from inside each crossing that no two classes share the tunnel.

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

use std::{
    io,
    sync::Arc,
    thread::{self, JoinHandle},
};

use thiserror::Error;
use tunnel_monitor::{Monitor, PriorityRule, Tunnel, arbiter::Arbiter};

pub mod actors;
pub mod config;
pub mod logging;
pub mod report;
pub mod rng;

pub use config::{Backend, ConfigError, CrossingRange, SimulationConfig};
pub use report::{Observer, SimulationReport};
pub use rng::ArrivalRng;

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Failed to spawn thread {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },
    #[error("Thread {0} panicked")]
    ActorPanicked(String),
}

/// # Errors
///
/// * If the arbiter thread cannot be spawned
pub fn build_tunnel(
    backend: Backend,
    rule: PriorityRule,
) -> Result<Arc<dyn Tunnel>, SimulationError> {
    log::debug!("build_tunnel: backend={backend} threshold={}", rule.threshold);

    let tunnel: Arc<dyn Tunnel> = match backend {
        Backend::Monitor => Arc::new(Monitor::with_rule(rule)),
        Backend::Arbiter => Arc::new(Arbiter::spawn(rule).map_err(|source| {
            SimulationError::Spawn {
                name: "tunnel-arbiter".to_string(),
                source,
            }
        })?),
    };

    Ok(tunnel)
}

fn spawn_named<F>(name: String, f: F) -> Result<(String, JoinHandle<()>), SimulationError>
where
    F: FnOnce() + Send + 'static,
{
    match thread::Builder::new().name(name.clone()).spawn(f) {
        Ok(handle) => Ok((name, handle)),
        Err(source) => Err(SimulationError::Spawn { name, source }),
    }
}

/// Joins every handle, reporting the first one that panicked.
fn join_all(handles: Vec<(String, JoinHandle<()>)>) -> Result<(), SimulationError> {
    let mut result = Ok(());

    for (name, handle) in handles {
        if handle.join().is_err() {
            log::error!("join_all: {name} panicked");
            if result.is_ok() {
                result = Err(SimulationError::ActorPanicked(name));
            }
        }
    }

    result
}

/// Spawns `config.cars` car threads, one per arrival, then waits for all of
/// them to get through.
///
/// # Errors
///
/// * If a car thread cannot be spawned
/// * If a car thread panicked
pub fn generate_cars(
    tunnel: &Arc<dyn Tunnel>,
    observer: &Arc<Observer>,
    config: &SimulationConfig,
    rng: &mut ArrivalRng,
) -> Result<(), SimulationError> {
    let mut cars = vec![];
    let mut spawn_error = None;

    for id in 1..=config.cars {
        let direction = rng.direction();
        let crossing = config.scaled(rng.crossing(config.car_crossing));

        let spawned = spawn_named(format!("car-{id}"), {
            let tunnel = tunnel.clone();
            let observer = observer.clone();
            move || actors::car(id, direction, tunnel.as_ref(), &observer, crossing)
        });

        match spawned {
            Ok(car) => cars.push(car),
            Err(e) => {
                spawn_error = Some(e);
                break;
            }
        }

        thread::sleep(config.scaled(rng.interarrival(config.car_interval)));
    }

    let joined = join_all(cars);
    spawn_error.map_or(joined, Err)
}

/// Spawns `config.pedestrians` pedestrian threads, one per arrival, then
/// waits for all of them to get through.
///
/// # Errors
///
/// * If a pedestrian thread cannot be spawned
/// * If a pedestrian thread panicked
pub fn generate_pedestrians(
    tunnel: &Arc<dyn Tunnel>,
    observer: &Arc<Observer>,
    config: &SimulationConfig,
    rng: &mut ArrivalRng,
) -> Result<(), SimulationError> {
    let mut pedestrians = vec![];
    let mut spawn_error = None;

    for id in 1..=config.pedestrians {
        let crossing = config.scaled(rng.crossing(config.pedestrian_crossing));

        let spawned = spawn_named(format!("pedestrian-{id}"), {
            let tunnel = tunnel.clone();
            let observer = observer.clone();
            move || actors::pedestrian(id, tunnel.as_ref(), &observer, crossing)
        });

        match spawned {
            Ok(pedestrian) => pedestrians.push(pedestrian),
            Err(e) => {
                spawn_error = Some(e);
                break;
            }
        }

        thread::sleep(config.scaled(rng.interarrival(config.pedestrian_interval)));
    }

    let joined = join_all(pedestrians);
    spawn_error.map_or(joined, Err)
}

/// Runs a full simulation and returns its report.
///
/// The car generator is seeded with `config.seed` and the pedestrian
/// generator with the next seed, so a seeded run makes the same arrivals
/// every time. Thread interleaving still varies.
///
/// # Errors
///
/// * If the config is invalid
/// * If any thread cannot be spawned
/// * If any thread panicked
pub fn run(config: &SimulationConfig) -> Result<SimulationReport, SimulationError> {
    config.validate()?;

    log::info!(
        "run: {} cars, {} pedestrians, backend={}",
        config.cars,
        config.pedestrians,
        config.backend
    );

    let tunnel = build_tunnel(config.backend, PriorityRule::new(config.priority_threshold))?;
    let observer = Arc::new(Observer::default());

    let generators = vec![
        spawn_generator("car-generator", &tunnel, &observer, config, 0, generate_cars)?,
        spawn_generator(
            "pedestrian-generator",
            &tunnel,
            &observer,
            config,
            1,
            generate_pedestrians,
        )?,
    ];

    let mut result = Ok(());
    for (name, handle) in generators {
        let outcome = handle
            .join()
            .map_err(|_| SimulationError::ActorPanicked(name.to_string()))
            .and_then(|outcome| outcome);

        if let Err(e) = outcome {
            log::error!("run: {name} failed: {e}");
            if result.is_ok() {
                result = Err(e);
            }
        }
    }
    result?;

    let report = observer.finish(tunnel.snapshot());
    log::info!("run: finished\n{report}");

    Ok(report)
}

type Generator = fn(
    &Arc<dyn Tunnel>,
    &Arc<Observer>,
    &SimulationConfig,
    &mut ArrivalRng,
) -> Result<(), SimulationError>;

fn spawn_generator(
    name: &'static str,
    tunnel: &Arc<dyn Tunnel>,
    observer: &Arc<Observer>,
    config: &SimulationConfig,
    seed_offset: u64,
    generator: Generator,
) -> Result<(&'static str, JoinHandle<Result<(), SimulationError>>), SimulationError> {
    let tunnel = tunnel.clone();
    let observer = observer.clone();
    let config = config.clone();
    let mut rng = ArrivalRng::new(config.seed.map(|seed| seed.wrapping_add(seed_offset)));

    thread::Builder::new()
        .name(name.to_string())
        .spawn(move || generator(&tunnel, &observer, &config, &mut rng))
        .map(|handle| (name, handle))
        .map_err(|source| SimulationError::Spawn {
            name: name.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tunnel_monitor::{ClassCounts, Direction, TrafficClass};

    use super::*;

    #[test_log::test]
    fn build_tunnel_honors_threshold() {
        for backend in [Backend::Monitor, Backend::Arbiter] {
            let tunnel = build_tunnel(backend, PriorityRule::new(0)).unwrap();

            tunnel.enter_car(Direction::South);
            let waiter = thread::spawn({
                let tunnel = tunnel.clone();
                move || tunnel.enter_pedestrian()
            });
            while tunnel.snapshot().waiting()[TrafficClass::Pedestrian] == 0 {
                thread::yield_now();
            }
            tunnel.leave_car(Direction::South);
            waiter.join().unwrap();

            assert_eq!(
                tunnel.snapshot().turn(),
                tunnel_monitor::Turn::Favor(TrafficClass::Pedestrian)
            );
        }
    }

    #[test_log::test]
    fn join_all_reports_panicked_thread() {
        let handles = vec![
            spawn_named("fine".to_string(), || {}).unwrap(),
            spawn_named("broken".to_string(), || panic!("boom")).unwrap(),
        ];

        let result = join_all(handles);
        assert!(matches!(result, Err(SimulationError::ActorPanicked(name)) if name == "broken"));
    }

    #[test_log::test]
    fn invalid_config_is_rejected_before_running() {
        let config = SimulationConfig {
            pedestrian_crossing: CrossingRange::new(3.0, 1.0),
            ..SimulationConfig::default()
        };

        assert!(matches!(run(&config), Err(SimulationError::Config(_))));
    }

    #[test_log::test]
    fn generate_cars_runs_every_car() {
        let tunnel = build_tunnel(Backend::Monitor, PriorityRule::default()).unwrap();
        let observer = Arc::new(Observer::default());
        let config = SimulationConfig {
            cars: 12,
            time_scale: 0.0,
            ..SimulationConfig::default()
        };

        generate_cars(&tunnel, &observer, &config, &mut ArrivalRng::new(Some(5))).unwrap();

        let report = observer.finish(tunnel.snapshot());
        assert_eq!(
            report.crossed[TrafficClass::SouthCar] + report.crossed[TrafficClass::NorthCar],
            12
        );
        assert_eq!(report.crossed[TrafficClass::Pedestrian], 0);
        assert_eq!(report.final_state.crossing(), &ClassCounts::default());
        assert!(report.is_clean());
    }
}
