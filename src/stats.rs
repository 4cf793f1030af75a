//! Statistics collection and the end-of-run report.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;

use crate::types::SimTime;

/// Simulator-global statistics shared by every node.
#[derive(Clone, Debug, Default)]
pub struct Stat {
    /// Number of times a node was woken twice in the same cycle. Harmless
    /// (the second wakeup returns immediately) but worth tracking: a large
    /// value means the reschedule collapsing is not doing its job.
    pub double_tick_count: u64,
}

/// Per-run summary emitted at end of simulation.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SimReport {
    /// Simulated time when the run stopped.
    pub final_time: SimTime,
    /// Events processed by the driver.
    pub events_processed: u64,
    /// Flits generated, per source terminal value.
    pub flit_gen_counts: BTreeMap<usize, u64>,
    /// Flits consumed, per destination terminal value.
    pub flit_arrive_counts: BTreeMap<usize, u64>,
    pub double_tick_count: u64,
}

impl SimReport {
    /// Total flits generated across all sources.
    pub fn total_generated(&self) -> u64 {
        self.flit_gen_counts.values().sum()
    }

    /// Total flits consumed across all destinations.
    pub fn total_arrived(&self) -> u64 {
        self.flit_arrive_counts.values().sum()
    }

    /// Exports the report as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Exports per-terminal counters as CSV.
    pub fn to_csv(&self) -> String {
        let mut csv = String::from("terminal,flits_generated,flits_arrived\n");
        for (id, gen) in &self.flit_gen_counts {
            let arrived = self.flit_arrive_counts.get(id).copied().unwrap_or(0);
            csv.push_str(&format!("{},{},{}\n", id, gen, arrived));
        }
        csv
    }

    /// Writes a human-readable summary to a writer.
    pub fn write_summary<W: Write>(&self, mut w: W) -> std::io::Result<()> {
        writeln!(w, "=== Simulation Report ===")?;
        writeln!(w, "Final time: {}", self.final_time)?;
        writeln!(w, "Events processed: {}", self.events_processed)?;
        writeln!(w)?;

        for (id, count) in &self.flit_gen_counts {
            writeln!(w, "S{}: {} flits generated", id, count)?;
        }
        for (id, count) in &self.flit_arrive_counts {
            writeln!(w, "D{}: {} flits arrived", id, count)?;
        }
        writeln!(w)?;
        writeln!(w, "Double ticks: {}", self.double_tick_count)?;
        Ok(())
    }

    /// Returns the summary as a string.
    pub fn summary(&self) -> String {
        let mut buf = Vec::new();
        self.write_summary(&mut buf).expect("write to Vec");
        String::from_utf8(buf).expect("summary is valid UTF-8")
    }
}
