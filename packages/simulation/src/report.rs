use std::{fmt, sync::Mutex};

use tunnel_monitor::{ClassCounts, SharedState, TrafficClass};

/// Totals gathered over a simulation run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SimulationReport {
    /// Actors of each class that made it through the tunnel.
    pub crossed: ClassCounts,
    /// Most actors of each class seen inside the tunnel at once.
    pub peak_crossing: ClassCounts,
    /// Snapshots that showed more than one class inside the tunnel.
    pub violations: Vec<SharedState>,
    pub final_state: SharedState,
}

impl SimulationReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}

impl fmt::Display for SimulationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Simulation report")?;
        for (class, crossed) in self.crossed.iter() {
            writeln!(
                f,
                "  {class:<10} crossed={crossed:<4} peak={}",
                self.peak_crossing[class]
            )?;
        }
        writeln!(f, "  operations={}", self.final_state.operations())?;
        write!(f, "  violations={}", self.violations.len())
    }
}

/// Checks the tunnel from the actors' side and accumulates a
/// [`SimulationReport`].
#[derive(Debug, Default)]
pub struct Observer {
    report: Mutex<SimulationReport>,
}

impl Observer {
    /// Records that an actor of `class` just entered, given a snapshot taken
    /// while it is inside.
    ///
    /// # Panics
    ///
    /// * If the report mutex is poisoned
    pub fn entered(&self, class: TrafficClass, snapshot: &SharedState) {
        let mut report = self.report.lock().unwrap();

        report.crossed[class] += 1;
        for (class, crossing) in snapshot.crossing().iter() {
            if crossing > report.peak_crossing[class] {
                report.peak_crossing[class] = crossing;
            }
        }

        if !snapshot.is_exclusive() {
            log::error!("entered: {class} found the tunnel shared: {snapshot:?}");
            report.violations.push(*snapshot);
        }
    }

    /// # Panics
    ///
    /// * If the report mutex is poisoned
    #[must_use]
    pub fn finish(&self, final_state: SharedState) -> SimulationReport {
        let mut report = self.report.lock().unwrap().clone();
        report.final_state = final_state;
        report
    }
}
