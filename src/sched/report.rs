//! Read-only status reporting.
//!
//! The reporter computes utilization and per-process progress without
//! mutating anything, taking locks in the global order (cores → queue →
//! finished). Rendering reproduces the emulator's literal console layout;
//! `report-util` writes the same text to `csopesy-log.txt`.

use serde::{Deserialize, Serialize};

use crate::process::ProcessState;
use crate::sink::OutputSink;

use super::core::SchedCore;

/// One line of the running or finished listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessLine {
    pub name: String,
    /// Start stamp for running processes, end stamp for finished ones.
    pub timestamp: String,
    /// Core index; `None` in the finished listing.
    pub core: Option<usize>,
    pub completed: u64,
    pub total: u64,
}

/// Point-in-time utilization report.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub num_cores: usize,
    pub active_cores: usize,
    /// `active_cores / num_cores`, rounded to an integer percentage.
    pub utilization_pct: u32,
    pub queue_size: usize,
    pub running: Vec<ProcessLine>,
    pub finished: Vec<ProcessLine>,
}

impl SchedCore {
    /// Compute a status report. Pure read side.
    pub fn status_report(&self) -> StatusReport {
        let occupants = self.core_occupants();
        let active_cores = occupants
            .iter()
            .flatten()
            .filter(|p| p.state() == ProcessState::Running)
            .count();
        let running = occupants
            .iter()
            .enumerate()
            .filter_map(|(idx, slot)| {
                slot.as_ref().map(|p| ProcessLine {
                    name: p.name().to_string(),
                    timestamp: p.started_stamp().unwrap_or_default(),
                    core: Some(idx),
                    completed: p.completed_instructions(),
                    total: p.total_instructions(),
                })
            })
            .collect();

        let queue_size = self.queue_len();

        let finished = self
            .finished_processes()
            .iter()
            .map(|p| ProcessLine {
                name: p.name().to_string(),
                timestamp: p.ended_stamp().unwrap_or_default(),
                core: None,
                completed: p.total_instructions(),
                total: p.total_instructions(),
            })
            .collect();

        let num_cores = self.config().num_cpu;
        let utilization_pct =
            ((active_cores as f64 / num_cores as f64) * 100.0).round() as u32;

        StatusReport {
            num_cores,
            active_cores,
            utilization_pct,
            queue_size,
            running,
            finished,
        }
    }
}

impl StatusReport {
    /// Render the literal console layout.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(256);
        out.push_str("--------------------------------------\n");
        out.push_str(&format!("CPU Utilization: {}%\n", self.utilization_pct));
        out.push_str(&format!("Active Cores: {}\n", self.active_cores));
        out.push_str(&format!(
            "Cores Available: {}\n",
            self.num_cores - self.active_cores
        ));
        out.push_str(&format!("Processes in queue: {}\n", self.queue_size));
        out.push_str("--------------------------------------\n");
        out.push_str("Running processes:\n");
        for line in &self.running {
            out.push_str(&format!(
                "{}     ({})     Core: {}     {} / {}\n",
                line.name,
                line.timestamp,
                line.core.unwrap_or_default(),
                line.completed,
                line.total
            ));
        }
        out.push_str("\nFinished processes:\n");
        for line in &self.finished {
            out.push_str(&format!(
                "{}     ({})     Finished     {} / {}\n",
                line.name, line.timestamp, line.completed, line.total
            ));
        }
        out.push_str("--------------------------------------\n");
        out
    }

    /// Write the rendered report through a sink and flush it.
    pub fn write_to(&self, sink: &dyn OutputSink) {
        sink.write_all(self.render().as_bytes());
        sink.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_has_fences_and_counts() {
        let report = StatusReport {
            num_cores: 4,
            active_cores: 3,
            utilization_pct: 75,
            queue_size: 2,
            running: vec![ProcessLine {
                name: "p1".into(),
                timestamp: "01/02/2026 03:04:05PM".into(),
                core: Some(0),
                completed: 12,
                total: 100,
            }],
            finished: vec![ProcessLine {
                name: "p2".into(),
                timestamp: "01/02/2026 03:09:01PM".into(),
                core: None,
                completed: 100,
                total: 100,
            }],
        };
        let text = report.render();
        assert!(text.contains("CPU Utilization: 75%\n"));
        assert!(text.contains("Active Cores: 3\n"));
        assert!(text.contains("Cores Available: 1\n"));
        assert!(text.contains("Processes in queue: 2\n"));
        assert!(text.contains("p1     (01/02/2026 03:04:05PM)     Core: 0     12 / 100\n"));
        assert!(text.contains("p2     (01/02/2026 03:09:01PM)     Finished     100 / 100\n"));
        assert_eq!(text.matches("--------------------------------------\n").count(), 3);
    }
}
