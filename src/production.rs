use plaque_common::{CellState, SimParams};

use crate::distribution::{ParticleDistributor, Release};
use crate::grid::HexTopology;
use crate::lattice::Lattice;
use crate::sampling::SimRng;

/// Cumulative lysis outcomes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LysisTallies {
    pub dead_from_virion: u64,
    pub dead_from_both: u64,
}

impl LysisTallies {
    fn record(&mut self, state: CellState) {
        match state {
            CellState::InfectedBoth => self.dead_from_both += 1,
            _ => self.dead_from_virion += 1,
        }
    }
}

/// Everything a production model needs besides the lattice.
pub struct ProductionContext<'a> {
    pub topology: &'a HexTopology,
    pub distributor: &'a dyn ParticleDistributor,
    pub params: &'a SimParams,
    pub rng: &'a mut SimRng,
    pub tallies: &'a mut LysisTallies,
}

impl ProductionContext<'_> {
    fn release(&mut self, lattice: &mut Lattice, source: usize, release: Release) {
        if release.is_empty() {
            return;
        }
        self.distributor.distribute(
            source,
            release,
            self.topology,
            self.rng,
            &mut lattice.particles.incoming,
        );
    }
}

/// How a virion-carrying cell turns its infection into particles.
pub trait ProductionModel: Send + Sync {
    /// Advances one virion-only or both-infected cell whose infection clock has
    /// already been ticked.
    fn advance(&self, cell: usize, lattice: &mut Lattice, ctx: &mut ProductionContext<'_>);
}

pub fn build_production_model(params: &SimParams) -> Box<dyn ProductionModel> {
    if params.continuous {
        Box::new(ContinuousProduction)
    } else {
        Box::new(BurstProduction)
    }
}

/// DIP count released by a lysing cell: the burst size inflated by the local
/// DIP:virion ratio. Without local virions the ratio is skipped.
pub fn inflated_dip_burst(burst_size_d: u32, local_virions: u32, local_dips: u32) -> u32 {
    if local_virions == 0 {
        return burst_size_d;
    }
    let extra = burst_size_d as u64 * local_dips as u64 / local_virions as u64;
    (burst_size_d as u64 + extra).min(u32::MAX as u64) as u32
}

/// Particles released by a lysing cell, read from the snapshot.
pub fn burst_release(lattice: &Lattice, cell: usize, params: &SimParams) -> Release {
    let releases_dips = match lattice.state[cell] {
        CellState::InfectedBoth => true,
        CellState::InfectedVirion => params.virion_burst_releases_dips,
        _ => return Release::default(),
    };
    let dips = if releases_dips && params.burst_size_d > 0 {
        inflated_dip_burst(
            params.burst_size_d,
            lattice.particles.virions[cell],
            lattice.particles.dips[cell],
        )
    } else {
        0
    };
    Release { virions: params.burst_size_v, dips }
}

/// Single terminal burst once the drawn lysis threshold has elapsed.
#[derive(Debug, Clone, Copy)]
pub struct BurstProduction;

impl ProductionModel for BurstProduction {
    fn advance(&self, cell: usize, lattice: &mut Lattice, ctx: &mut ProductionContext<'_>) {
        let threshold = lattice.lysis_threshold[cell];
        if threshold <= 0 || lattice.time_since_infection[cell] < threshold {
            return;
        }
        let state = lattice.state[cell];
        let release = burst_release(lattice, cell, ctx.params);
        lattice.kill(cell, ctx.params, ctx.rng);
        ctx.tallies.record(state);
        ctx.release(lattice, cell, release);
    }
}

/// Per-tick release after an incubation period, scaled by growing intracellular
/// genome counts; the cell dies without a burst after the continuous lysis time.
#[derive(Debug, Clone, Copy)]
pub struct ContinuousProduction;

impl ProductionModel for ContinuousProduction {
    fn advance(&self, cell: usize, lattice: &mut Lattice, ctx: &mut ProductionContext<'_>) {
        let params = ctx.params;
        let elapsed = lattice.time_since_infection[cell];
        if elapsed < params.incubation_period as i32 {
            return;
        }
        let state = lattice.state[cell];
        if params.continuous_lysis_time > 0 && elapsed >= params.continuous_lysis_time as i32 {
            lattice.kill(cell, params, ctx.rng);
            ctx.tallies.record(state);
            return;
        }

        let wt = lattice.intra_wt[cell];
        let dvg = lattice.intra_dvg[cell];
        let dips = match state {
            CellState::InfectedBoth => params.continuous_rate_d.saturating_mul(dvg),
            _ if params.virion_burst_releases_dips => {
                params.continuous_rate_d.saturating_mul(dvg.max(1))
            }
            _ => 0,
        };
        let release = Release { virions: params.continuous_rate_v.saturating_mul(wt), dips };
        ctx.release(lattice, cell, release);

        if wt > 0 {
            lattice.intra_wt[cell] = wt + 1;
        }
        if state == CellState::InfectedBoth && dvg > 0 {
            lattice.intra_dvg[cell] = dvg + 1;
        }
    }
}

/// Phase 4: ticks every infection clock and lets the production model act on
/// virion-carrying cells. Cells already transitioned this tick are skipped.
pub fn advance_infected_cells(lattice: &mut Lattice, model: &dyn ProductionModel, ctx: &mut ProductionContext<'_>) {
    for cell in 0..lattice.num_cells {
        if !lattice.is_free(cell) {
            continue;
        }
        let state = lattice.state[cell];
        if state.is_productive() {
            lattice.time_since_infection[cell] += 1;
            model.advance(cell, lattice, ctx);
        } else if state == CellState::InfectedDip {
            lattice.time_since_dip_infection[cell] += 1;
        }
    }
}

/// Commit step: committed DIP-only cells past their clearance threshold recover.
pub fn clear_dip_only_cells(lattice: &mut Lattice) -> u32 {
    let mut cleared = 0;
    for cell in 0..lattice.num_cells {
        if lattice.state[cell] != CellState::InfectedDip {
            continue;
        }
        let threshold = lattice.dip_clearance_threshold[cell];
        if threshold > 0 && lattice.time_since_dip_infection[cell] >= threshold {
            lattice.clear_dip_infection(cell);
            cleared += 1;
        }
    }
    cleared
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::RadiusBurst;
    use crate::particles::ParticleKind;
    use plaque_common::{SimulationConfig, VirionBurstMode};
    use rand::SeedableRng;

    fn make_config() -> SimulationConfig {
        let mut config = SimulationConfig::default();
        config.lattice.size = 15;
        config
    }

    fn total_incoming(lattice: &Lattice) -> (u64, u64) {
        (
            lattice.particles.incoming.virions.iter().map(|&c| c as u64).sum(),
            lattice.particles.incoming.dips.iter().map(|&c| c as u64).sum(),
        )
    }

    fn run_phase(lattice: &mut Lattice, params: &SimParams, model: &dyn ProductionModel) -> LysisTallies {
        let mut rng = SimRng::seed_from_u64(21);
        let topology = HexTopology::new(params, false, &mut rng);
        let mut tallies = LysisTallies::default();
        let mut ctx = ProductionContext {
            topology: &topology,
            distributor: &RadiusBurst,
            params,
            rng: &mut rng,
            tallies: &mut tallies,
        };
        lattice.begin_tick();
        advance_infected_cells(lattice, model, &mut ctx);
        lattice.commit_states();
        tallies
    }

    #[test]
    fn dip_ratio_inflates_burst() {
        assert_eq!(inflated_dip_burst(100, 10, 20), 300);
        assert_eq!(inflated_dip_burst(100, 0, 20), 100);
        assert_eq!(inflated_dip_burst(100, 3, 1), 133);
    }

    #[test]
    fn cell_lyses_when_clock_reaches_threshold() {
        let params = make_config().get_sim_params();
        let mut lattice = Lattice::new(&params);
        let cell = 100;
        lattice.state[cell] = CellState::InfectedVirion;
        lattice.time_since_infection[cell] = 1;
        lattice.lysis_threshold[cell] = 3;

        let tallies = run_phase(&mut lattice, &params, &BurstProduction);
        assert_eq!(lattice.state[cell], CellState::InfectedVirion);
        assert_eq!(tallies, LysisTallies::default());

        let tallies = run_phase(&mut lattice, &params, &BurstProduction);
        assert_eq!(lattice.state[cell], CellState::Dead);
        assert_eq!(tallies.dead_from_virion, 1);
        assert_eq!(total_incoming(&lattice), (50, 0));
        assert!(lattice.regrowth_threshold[cell] >= 1);
    }

    #[test]
    fn virion_burst_mode_controls_dip_release() {
        let mut config = make_config();
        config.infection.virion_burst_mode = VirionBurstMode::Both;
        let params = config.get_sim_params();
        let mut lattice = Lattice::new(&params);
        lattice.state[7] = CellState::InfectedVirion;
        lattice.particles.seed(ParticleKind::Virion, 7, 4);
        lattice.particles.seed(ParticleKind::Dip, 7, 2);
        assert_eq!(burst_release(&lattice, 7, &params), Release { virions: 50, dips: 150 });

        let params = make_config().get_sim_params();
        assert_eq!(burst_release(&lattice, 7, &params), Release { virions: 50, dips: 0 });

        lattice.state[7] = CellState::InfectedBoth;
        assert_eq!(burst_release(&lattice, 7, &params), Release { virions: 50, dips: 150 });
    }

    #[test]
    fn continuous_cell_waits_out_incubation_then_releases() {
        let mut config = make_config();
        config.continuous.enabled = true;
        config.continuous.incubation_period = 2;
        config.continuous.rate_v = 10;
        config.continuous.lysis_time = 0;
        let params = config.get_sim_params();
        let mut lattice = Lattice::new(&params);
        let cell = 112;
        lattice.state[cell] = CellState::InfectedVirion;
        lattice.time_since_infection[cell] = 0;
        lattice.intra_wt[cell] = 3;

        run_phase(&mut lattice, &params, &ContinuousProduction);
        assert_eq!(total_incoming(&lattice), (0, 0));

        run_phase(&mut lattice, &params, &ContinuousProduction);
        assert_eq!(total_incoming(&lattice), (30, 0));
        assert_eq!(lattice.intra_wt[cell], 4);
        assert_eq!(lattice.state[cell], CellState::InfectedVirion);
    }

    #[test]
    fn continuous_cell_dies_without_burst() {
        let mut config = make_config();
        config.continuous.enabled = true;
        config.continuous.incubation_period = 1;
        config.continuous.lysis_time = 4;
        let params = config.get_sim_params();
        let mut lattice = Lattice::new(&params);
        let cell = 60;
        lattice.state[cell] = CellState::InfectedBoth;
        lattice.time_since_infection[cell] = 3;
        lattice.intra_wt[cell] = 5;
        lattice.intra_dvg[cell] = 5;

        let tallies = run_phase(&mut lattice, &params, &ContinuousProduction);
        assert_eq!(lattice.state[cell], CellState::Dead);
        assert_eq!(tallies.dead_from_both, 1);
        assert_eq!(total_incoming(&lattice), (0, 0));
    }

    #[test]
    fn dip_only_cell_recovers_after_clearance() {
        let params = make_config().get_sim_params();
        let mut lattice = Lattice::new(&params);
        lattice.state[9] = CellState::InfectedDip;
        lattice.time_since_dip_infection[9] = 0;
        lattice.dip_clearance_threshold[9] = 2;

        run_phase(&mut lattice, &params, &BurstProduction);
        assert_eq!(clear_dip_only_cells(&mut lattice), 0);
        run_phase(&mut lattice, &params, &BurstProduction);
        assert_eq!(clear_dip_only_cells(&mut lattice), 1);
        assert_eq!(lattice.state[9], CellState::Susceptible);
        assert_eq!(total_incoming(&lattice), (0, 0));
    }
}
