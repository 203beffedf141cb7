use std::{fmt, fs, path::Path, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tunnel_monitor::DEFAULT_PRIORITY_THRESHOLD;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Which tunnel implementation the actors talk to.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Monitor,
    Arbiter,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Monitor => "monitor",
            Self::Arbiter => "arbiter",
        })
    }
}

/// Inclusive range of crossing times, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CrossingRange {
    pub min: f64,
    pub max: f64,
}

impl CrossingRange {
    #[must_use]
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }
}

impl fmt::Display for CrossingRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.min, self.max)
    }
}

/// Parses `MIN..MAX`, in seconds.
impl FromStr for CrossingRange {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::Invalid(format!("Expected MIN..MAX, got {s:?}"));

        let (min, max) = s.split_once("..").ok_or_else(invalid)?;
        let min = min.trim().parse::<f64>().map_err(|_| invalid())?;
        let max = max.trim().parse::<f64>().map_err(|_| invalid())?;

        Ok(Self { min, max })
    }
}

/// Everything the harness needs to drive a run.
///
/// Intervals and crossing times are in seconds and are multiplied by
/// `time_scale` before sleeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    pub cars: u64,
    pub pedestrians: u64,
    /// Mean time between car arrivals.
    pub car_interval: f64,
    /// Mean time between pedestrian arrivals.
    pub pedestrian_interval: f64,
    pub car_crossing: CrossingRange,
    pub pedestrian_crossing: CrossingRange,
    pub seed: Option<u64>,
    pub priority_threshold: u32,
    pub backend: Backend,
    pub time_scale: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            cars: 50,
            pedestrians: 10,
            car_interval: 0.5,
            pedestrian_interval: 5.0,
            car_crossing: CrossingRange::new(0.5, 1.0),
            pedestrian_crossing: CrossingRange::new(10.0, 30.0),
            seed: None,
            priority_threshold: DEFAULT_PRIORITY_THRESHOLD,
            backend: Backend::default(),
            time_scale: 1.0,
        }
    }
}

impl SimulationConfig {
    /// # Errors
    ///
    /// * If the file cannot be read
    /// * If the contents are not a valid config
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        log::debug!("load: reading config from {}", path.display());

        fs::read_to_string(path)?.parse()
    }

    /// Checks ranges and durations.
    ///
    /// # Errors
    ///
    /// * If a crossing range is empty
    /// * If any interval, crossing time or the time scale is negative or
    ///   not finite
    /// * If an interval or the longest crossing time, once scaled, does not
    ///   fit in a [`Duration`]
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn check(name: &str, value: f64) -> Result<(), ConfigError> {
            if value.is_finite() && value >= 0.0 {
                Ok(())
            } else {
                Err(ConfigError::Invalid(format!(
                    "{name} must be a finite, non-negative number, got {value}"
                )))
            }
        }

        check("car_interval", self.car_interval)?;
        check("pedestrian_interval", self.pedestrian_interval)?;
        check("time_scale", self.time_scale)?;

        for (name, range) in [
            ("car_crossing", self.car_crossing),
            ("pedestrian_crossing", self.pedestrian_crossing),
        ] {
            check(name, range.min)?;
            check(name, range.max)?;

            if range.min > range.max {
                return Err(ConfigError::Invalid(format!(
                    "{name} is empty ({range})"
                )));
            }
        }

        for (name, seconds) in [
            ("car_interval", self.car_interval),
            ("pedestrian_interval", self.pedestrian_interval),
            ("car_crossing", self.car_crossing.max),
            ("pedestrian_crossing", self.pedestrian_crossing.max),
        ] {
            if Duration::try_from_secs_f64(seconds * self.time_scale).is_err() {
                return Err(ConfigError::Invalid(format!(
                    "{name} of {seconds}s scaled by {} is out of range",
                    self.time_scale
                )));
            }
        }

        Ok(())
    }

    /// Converts simulated seconds into a wall-clock sleep.
    ///
    /// Saturates at [`Duration::MAX`]. Exponential draws can land far past
    /// their mean.
    #[must_use]
    pub fn scaled(&self, seconds: f64) -> Duration {
        Duration::try_from_secs_f64((seconds * self.time_scale).max(0.0)).unwrap_or(Duration::MAX)
    }
}

impl FromStr for SimulationConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test_log::test]
    fn defaults_are_valid() {
        let config = SimulationConfig::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.priority_threshold, 2);
        assert_eq!(config.backend, Backend::Monitor);
    }

    #[test_log::test]
    fn partial_file_keeps_defaults() {
        let config: SimulationConfig = r#"
            cars = 5
            backend = "arbiter"
            seed = 42

            [pedestrian_crossing]
            min = 1.0
            max = 2.0
        "#
        .parse()
        .unwrap();

        assert_eq!(
            config,
            SimulationConfig {
                cars: 5,
                backend: Backend::Arbiter,
                seed: Some(42),
                pedestrian_crossing: CrossingRange::new(1.0, 2.0),
                ..SimulationConfig::default()
            }
        );
    }

    #[test_log::test]
    fn unknown_fields_are_rejected() {
        let result = "trucks = 3".parse::<SimulationConfig>();

        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test_log::test]
    fn empty_crossing_range_is_rejected() {
        let config = SimulationConfig {
            car_crossing: CrossingRange::new(2.0, 1.0),
            ..SimulationConfig::default()
        };

        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test_log::test]
    fn negative_and_nan_values_are_rejected() {
        let negative = SimulationConfig {
            car_interval: -1.0,
            ..SimulationConfig::default()
        };
        let nan = SimulationConfig {
            time_scale: f64::NAN,
            ..SimulationConfig::default()
        };

        assert!(matches!(negative.validate(), Err(ConfigError::Invalid(_))));
        assert!(matches!(nan.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test_log::test]
    fn durations_too_large_to_sleep_are_rejected() {
        let long_crossing = SimulationConfig {
            car_crossing: CrossingRange::new(1e300, 1e300),
            ..SimulationConfig::default()
        };
        let huge_scale = SimulationConfig {
            time_scale: 1e308,
            ..SimulationConfig::default()
        };

        assert!(matches!(
            long_crossing.validate(),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(huge_scale.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test_log::test]
    fn scaled_saturates_instead_of_panicking() {
        let config = SimulationConfig::default();

        assert_eq!(config.scaled(1e300), Duration::MAX);
        assert_eq!(config.scaled(f64::MAX * 10.0), Duration::MAX);
        assert_eq!(config.scaled(-1.0), Duration::ZERO);
    }

    #[test_log::test]
    fn crossing_range_parses_min_and_max() {
        assert_eq!(
            "0.5..1.5".parse::<CrossingRange>().unwrap(),
            CrossingRange::new(0.5, 1.5)
        );
        assert!("1.5".parse::<CrossingRange>().is_err());
        assert!("a..b".parse::<CrossingRange>().is_err());
    }

    #[test_log::test]
    fn scaled_applies_time_scale() {
        let config = SimulationConfig {
            time_scale: 0.25,
            ..SimulationConfig::default()
        };

        assert_eq!(config.scaled(2.0), Duration::from_millis(500));
    }
}
