use serde::{Deserialize, Serialize};

/// Per-cell lattice state at a specific tick, for rasterizers and offline analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatticeSnapshot {
    /// Tick (hours) at which the snapshot was taken.
    pub tick: u32,
    /// Cells per side; arrays below are row-major with `size * size` entries.
    pub size: u32,
    /// `CellState` codes.
    pub states: Vec<u8>,
    /// Production-mode flag: the cell was infected under continuous production.
    pub continuous: Vec<bool>,
    pub virions: Vec<u32>,
    pub dips: Vec<u32>,
    /// Interferon concentration seen by each cell.
    pub ifn: Vec<f32>,
}

/// Aggregate outputs of one tick. Field names are the stable metric names and CSV headers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TickMetrics {
    pub tick: u32,
    pub global_ifn: f64,
    pub global_ifn_per_cell: f64,
    pub max_global_ifn: f64,
    pub total_virions: u64,
    pub total_dips: u64,
    pub pct_dead: f64,
    pub pct_susceptible: f64,
    pub pct_infected: f64,
    pub pct_infected_dip_only: f64,
    pub pct_infected_both: f64,
    pub pct_antiviral: f64,
    pub pct_regrowth: f64,
    pub pct_regrowth_or_antiviral: f64,
    pub pct_uninfected: f64,
    pub plaque_pct: f64,
    pub susceptible_cells: u32,
    pub virion_only_infected: u32,
    pub dip_only_infected: u32,
    pub both_infected: u32,
    pub dead_cells: u32,
    pub antiviral_cells: u32,
    pub regrowth_cells: u32,
    /// Cumulative entries into the antiviral state.
    pub antiviral_entries: u64,
    pub total_dead_from_virion: u64,
    pub total_dead_from_both: u64,
    pub total_random_jump_virions: u64,
    pub total_random_jump_dips: u64,
}

impl TickMetrics {
    /// Looks a metric up by its stable name.
    pub fn get(&self, name: &str) -> Option<f64> {
        let value = match name {
            "tick" => self.tick as f64,
            "global_ifn" => self.global_ifn,
            "global_ifn_per_cell" => self.global_ifn_per_cell,
            "max_global_ifn" => self.max_global_ifn,
            "total_virions" => self.total_virions as f64,
            "total_dips" => self.total_dips as f64,
            "pct_dead" => self.pct_dead,
            "pct_susceptible" => self.pct_susceptible,
            "pct_infected" => self.pct_infected,
            "pct_infected_dip_only" => self.pct_infected_dip_only,
            "pct_infected_both" => self.pct_infected_both,
            "pct_antiviral" => self.pct_antiviral,
            "pct_regrowth" => self.pct_regrowth,
            "pct_regrowth_or_antiviral" => self.pct_regrowth_or_antiviral,
            "pct_uninfected" => self.pct_uninfected,
            "plaque_pct" => self.plaque_pct,
            "susceptible_cells" => self.susceptible_cells as f64,
            "virion_only_infected" => self.virion_only_infected as f64,
            "dip_only_infected" => self.dip_only_infected as f64,
            "both_infected" => self.both_infected as f64,
            "dead_cells" => self.dead_cells as f64,
            "antiviral_cells" => self.antiviral_cells as f64,
            "regrowth_cells" => self.regrowth_cells as f64,
            "antiviral_entries" => self.antiviral_entries as f64,
            "total_dead_from_virion" => self.total_dead_from_virion as f64,
            "total_dead_from_both" => self.total_dead_from_both as f64,
            "total_random_jump_virions" => self.total_random_jump_virions as f64,
            "total_random_jump_dips" => self.total_random_jump_dips as f64,
            _ => return None,
        };
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_are_addressable_by_name() {
        let metrics = TickMetrics { tick: 7, plaque_pct: 12.5, both_infected: 3, ..Default::default() };
        assert_eq!(metrics.get("tick"), Some(7.0));
        assert_eq!(metrics.get("plaque_pct"), Some(12.5));
        assert_eq!(metrics.get("both_infected"), Some(3.0));
        assert_eq!(metrics.get("no_such_metric"), None);
    }
}
