//! Statistics collection and the final report.
//!
//! The kernel keeps a handful of global counters in [`SimStats`]; per-node
//! flit counters live on the nodes themselves and are gathered into a
//! [`Report`] when a run finishes. The report offers a human-readable
//! summary and a JSON export.

use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::types::Cycle;

/// Global counters updated while the simulation runs.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SimStats {
    /// Ticks suppressed because the node already ran this cycle.
    pub double_tick_count: u64,
    /// Cycles a source wanted to inject but had no credit.
    pub source_credit_stall_count: u64,
    /// Switch-allocation requests skipped because the input sat in
    /// credit wait.
    pub sa_credit_stall_count: u64,
}

/// Flits generated by one source.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SourceReport {
    /// Terminal index.
    pub index: usize,
    /// Total flits injected into the network.
    pub flits_generated: u64,
}

/// Flits consumed by one destination.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DestinationReport {
    /// Terminal index.
    pub index: usize,
    /// Total flits consumed.
    pub flits_arrived: u64,
}

/// Final report for a simulation run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Report {
    /// Cycle the run stopped at.
    pub final_cycle: Cycle,
    /// Global kernel counters.
    #[serde(flatten)]
    pub stats: SimStats,
    /// Per-source injection totals.
    pub sources: Vec<SourceReport>,
    /// Per-destination consumption totals.
    pub destinations: Vec<DestinationReport>,
}

impl Report {
    /// Total flits generated across all sources.
    pub fn total_generated(&self) -> u64 {
        self.sources.iter().map(|s| s.flits_generated).sum()
    }

    /// Total flits consumed across all destinations.
    pub fn total_arrived(&self) -> u64 {
        self.destinations.iter().map(|d| d.flits_arrived).sum()
    }

    /// Exports the report as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Writes a human-readable summary.
    pub fn write_summary<W: Write>(&self, mut w: W) -> std::io::Result<()> {
        writeln!(w, "=== Simulation Report ===")?;
        writeln!(w, "Final cycle: {}", self.final_cycle)?;
        writeln!(w, "Double ticks: {}", self.stats.double_tick_count)?;
        writeln!(
            w,
            "Credit stalls: {} source, {} switch",
            self.stats.source_credit_stall_count, self.stats.sa_credit_stall_count
        )?;
        writeln!(w)?;
        for src in &self.sources {
            writeln!(w, "Src {}: {} flits generated", src.index, src.flits_generated)?;
        }
        for dst in &self.destinations {
            writeln!(w, "Dst {}: {} flits arrived", dst.index, dst.flits_arrived)?;
        }
        writeln!(
            w,
            "Total: {} generated, {} arrived",
            self.total_generated(),
            self.total_arrived()
        )?;
        Ok(())
    }

    /// Returns the summary as a string.
    pub fn summary(&self) -> String {
        let mut buf = Vec::new();
        self.write_summary(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }
}
