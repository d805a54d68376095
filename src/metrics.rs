use plaque_common::{CellState, TickMetrics};
use rayon::prelude::*;

use crate::ifn::IfnModel;
use crate::lattice::Lattice;
use crate::particles::ParticleKind;
use crate::production::LysisTallies;

/// Cells per state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateCounts {
    pub susceptible: u32,
    pub infected_virion: u32,
    pub infected_dip: u32,
    pub infected_both: u32,
    pub dead: u32,
    pub antiviral: u32,
    pub regrowth: u32,
}

impl StateCounts {
    pub fn tally(states: &[CellState]) -> Self {
        states
            .par_iter()
            .fold(StateCounts::default, |mut counts, &state| {
                match state {
                    CellState::Susceptible => counts.susceptible += 1,
                    CellState::InfectedVirion => counts.infected_virion += 1,
                    CellState::InfectedDip => counts.infected_dip += 1,
                    CellState::InfectedBoth => counts.infected_both += 1,
                    CellState::Dead => counts.dead += 1,
                    CellState::Antiviral => counts.antiviral += 1,
                    CellState::Regrowth => counts.regrowth += 1,
                }
                counts
            })
            .reduce(StateCounts::default, |a, b| StateCounts {
                susceptible: a.susceptible + b.susceptible,
                infected_virion: a.infected_virion + b.infected_virion,
                infected_dip: a.infected_dip + b.infected_dip,
                infected_both: a.infected_both + b.infected_both,
                dead: a.dead + b.dead,
                antiviral: a.antiviral + b.antiviral,
                regrowth: a.regrowth + b.regrowth,
            })
    }

    pub fn infected(&self) -> u32 {
        self.infected_virion + self.infected_dip + self.infected_both
    }
}

/// Run-level counters that feed the per-tick metrics.
#[derive(Debug, Clone, Copy)]
pub struct RunCounters<'a> {
    pub tick: u32,
    pub max_global_ifn: f64,
    pub antiviral_entries: u64,
    pub lysis: &'a LysisTallies,
}

/// Aggregates the committed lattice into one metrics row.
pub fn collect(lattice: &Lattice, ifn: &dyn IfnModel, counters: RunCounters<'_>) -> TickMetrics {
    let counts = StateCounts::tally(&lattice.state);
    let n = lattice.num_cells.max(1) as f64;
    let pct = |count: u32| count as f64 / n * 100.0;
    let global_ifn = ifn.total();

    TickMetrics {
        tick: counters.tick,
        global_ifn,
        global_ifn_per_cell: global_ifn / n,
        max_global_ifn: counters.max_global_ifn,
        total_virions: lattice.particles.total(ParticleKind::Virion),
        total_dips: lattice.particles.total(ParticleKind::Dip),
        pct_dead: pct(counts.dead),
        pct_susceptible: pct(counts.susceptible),
        pct_infected: pct(counts.infected()),
        pct_infected_dip_only: pct(counts.infected_dip),
        pct_infected_both: pct(counts.infected_both),
        pct_antiviral: pct(counts.antiviral),
        pct_regrowth: pct(counts.regrowth),
        pct_regrowth_or_antiviral: pct(counts.regrowth + counts.antiviral),
        pct_uninfected: pct(counts.susceptible + counts.regrowth),
        plaque_pct: pct(counts.dead),
        susceptible_cells: counts.susceptible,
        virion_only_infected: counts.infected_virion,
        dip_only_infected: counts.infected_dip,
        both_infected: counts.infected_both,
        dead_cells: counts.dead,
        antiviral_cells: counts.antiviral,
        regrowth_cells: counts.regrowth,
        antiviral_entries: counters.antiviral_entries,
        total_dead_from_virion: counters.lysis.dead_from_virion,
        total_dead_from_both: counters.lysis.dead_from_both,
        total_random_jump_virions: lattice.particles.incoming.jumped_virions,
        total_random_jump_dips: lattice.particles.incoming.jumped_dips,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ifn::DisabledIfn;
    use plaque_common::SimulationConfig;

    #[test]
    fn counts_partition_the_lattice() {
        let states = [
            CellState::Susceptible,
            CellState::Dead,
            CellState::Dead,
            CellState::InfectedBoth,
            CellState::Regrowth,
            CellState::Antiviral,
        ];
        let counts = StateCounts::tally(&states);
        assert_eq!(counts.dead, 2);
        assert_eq!(counts.infected(), 1);
        assert_eq!(
            counts.susceptible + counts.dead + counts.infected() + counts.antiviral + counts.regrowth,
            6
        );
    }

    #[test]
    fn percentages_use_whole_lattice() {
        let mut config = SimulationConfig::default();
        config.lattice.size = 2;
        let params = config.get_sim_params();
        let mut lattice = Lattice::new(&params);
        lattice.state[0] = CellState::Dead;
        lattice.state[1] = CellState::InfectedVirion;
        let tallies = LysisTallies { dead_from_virion: 1, dead_from_both: 0 };
        let counters = RunCounters { tick: 4, max_global_ifn: 0.0, antiviral_entries: 0, lysis: &tallies };
        let metrics = collect(&lattice, &DisabledIfn, counters);
        assert_eq!(metrics.plaque_pct, 25.0);
        assert_eq!(metrics.pct_infected, 25.0);
        assert_eq!(metrics.pct_uninfected, 50.0);
        assert_eq!(metrics.total_dead_from_virion, 1);
        assert_eq!(metrics.tick, 4);
    }
}
