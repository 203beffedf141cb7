#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

use std::path::PathBuf;

use clap::Parser;
use tunnel_simulation::{Backend, ConfigError, CrossingRange, SimulationConfig};

/// Simulates cars and pedestrians sharing a single-lane tunnel
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML config file; flags override its values
    #[arg(short, long, value_name = "PATH", env = "TUNNEL_CONFIG")]
    config: Option<PathBuf>,

    /// Number of cars to generate
    #[arg(long, env = "TUNNEL_CARS")]
    cars: Option<u64>,

    /// Number of pedestrians to generate
    #[arg(long, env = "TUNNEL_PEDESTRIANS")]
    pedestrians: Option<u64>,

    /// Mean seconds between car arrivals
    #[arg(long, value_name = "SECS")]
    car_interval: Option<f64>,

    /// Mean seconds between pedestrian arrivals
    #[arg(long, value_name = "SECS")]
    pedestrian_interval: Option<f64>,

    /// Car crossing time range in seconds
    #[arg(long, value_name = "MIN..MAX")]
    car_crossing: Option<CrossingRange>,

    /// Pedestrian crossing time range in seconds
    #[arg(long, value_name = "MIN..MAX")]
    pedestrian_crossing: Option<CrossingRange>,

    /// Seed for reproducible arrivals
    #[arg(long, env = "TUNNEL_SEED")]
    seed: Option<u64>,

    /// Waiters a class must exceed before it takes the turn
    #[arg(long, env = "TUNNEL_PRIORITY_THRESHOLD")]
    priority_threshold: Option<u32>,

    /// Tunnel implementation to run against
    #[arg(long, value_enum, env = "TUNNEL_BACKEND")]
    backend: Option<Backend>,

    /// Multiplier applied to every sleep
    #[arg(long, env = "TUNNEL_TIME_SCALE")]
    time_scale: Option<f64>,
}

impl Args {
    fn into_config(self) -> Result<SimulationConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => SimulationConfig::load(path)?,
            None => SimulationConfig::default(),
        };

        macro_rules! apply {
            ($($field:ident),+ $(,)?) => {
                $(
                    if let Some(value) = self.$field {
                        config.$field = value;
                    }
                )+
            };
        }

        apply!(
            cars,
            pedestrians,
            car_interval,
            pedestrian_interval,
            car_crossing,
            pedestrian_crossing,
            priority_threshold,
            backend,
            time_scale,
        );

        if self.seed.is_some() {
            config.seed = self.seed;
        }

        config.validate()?;

        Ok(config)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tunnel_simulation::logging::init()?;

    let config = Args::parse().into_config()?;
    let report = tunnel_simulation::run(&config)?;

    println!("{report}");

    if !report.is_clean() {
        return Err(format!(
            "{} snapshots showed more than one class inside the tunnel",
            report.violations.len()
        )
        .into());
    }

    Ok(())
}
