use plaque_common::{CellState, RegrowthRule, SimParams};

use crate::grid::HexTopology;
use crate::lattice::Lattice;
use crate::sampling::{normal, SimRng};

/// Phase 5: dead cells age and are replaced by regrowth cells.
///
/// Under `NeighborState` a dead cell regrows once its age reaches the threshold drawn at
/// death, provided some ring-1 neighbour is susceptible or antiviral in the snapshot.
/// `NeighborTimer` keeps the older rule comparing neighbour elapsed timers with a fresh
/// Normal(mean, std) draw each check.
pub fn resolve_regrowth(
    lattice: &mut Lattice,
    topology: &HexTopology,
    params: &SimParams,
    rng: &mut SimRng,
) -> u32 {
    let mut regrown = 0;
    for cell in 0..lattice.num_cells {
        if lattice.state[cell] != CellState::Dead || !lattice.is_free(cell) {
            continue;
        }
        lattice.time_since_death[cell] += 1;

        let regrows = match params.regrowth_rule {
            RegrowthRule::NeighborState => {
                lattice.time_since_death[cell] >= lattice.regrowth_threshold[cell]
                    && topology
                        .find_first_neighbor(cell, |n| {
                            matches!(lattice.state[n], CellState::Susceptible | CellState::Antiviral)
                        })
                        .is_some()
            }
            RegrowthRule::NeighborTimer => neighbor_timers_elapsed(lattice, topology, cell, params, rng),
        };
        if regrows {
            lattice.regrow(cell);
            regrown += 1;
        }
    }
    regrown
}

fn neighbor_timers_elapsed(
    lattice: &Lattice,
    topology: &HexTopology,
    cell: usize,
    params: &SimParams,
    rng: &mut SimRng,
) -> bool {
    let mut found = false;
    topology.for_each_neighbor(cell, |n| {
        let exposure = lattice.antiviral_exposure[n].max(0);
        let since_susceptible = lattice.time_since_susceptible[n] + exposure;
        let since_regrowth = lattice.time_since_regrowth[n] + exposure;
        let first = normal(rng, params.regrowth_mean, params.regrowth_std);
        let second = normal(rng, params.regrowth_mean, params.regrowth_std);
        found = since_susceptible as f64 > first || since_regrowth as f64 > second;
        !found
    });
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use plaque_common::SimulationConfig;
    use rand::SeedableRng;

    fn make_world(rule: RegrowthRule) -> (Lattice, HexTopology, SimParams, SimRng) {
        let mut config = SimulationConfig::default();
        config.lattice.size = 5;
        config.regrowth.rule = rule;
        config.regrowth.std = 0.0;
        config.regrowth.mean = 3.0;
        let params = config.get_sim_params();
        let mut rng = SimRng::seed_from_u64(8);
        let topology = HexTopology::new(&params, false, &mut rng);
        (Lattice::new(&params), topology, params, rng)
    }

    fn tick(lattice: &mut Lattice, topology: &HexTopology, params: &SimParams, rng: &mut SimRng) -> u32 {
        lattice.begin_tick();
        let regrown = resolve_regrowth(lattice, topology, params, rng);
        lattice.commit_states();
        regrown
    }

    fn kill(lattice: &mut Lattice, cell: usize, params: &SimParams, rng: &mut SimRng) {
        lattice.begin_tick();
        lattice.kill(cell, params, rng);
        lattice.commit_states();
    }

    #[test]
    fn dead_cell_regrows_after_threshold_next_to_living_cell() {
        let (mut lattice, topology, params, mut rng) = make_world(RegrowthRule::NeighborState);
        let cell = topology.center();
        kill(&mut lattice, cell, &params, &mut rng);
        assert_eq!(lattice.regrowth_threshold[cell], 3);

        assert_eq!(tick(&mut lattice, &topology, &params, &mut rng), 0);
        assert_eq!(tick(&mut lattice, &topology, &params, &mut rng), 0);
        assert_eq!(tick(&mut lattice, &topology, &params, &mut rng), 1);
        assert_eq!(lattice.state[cell], CellState::Regrowth);
        assert_eq!(lattice.time_since_regrowth[cell], 0);
    }

    #[test]
    fn surrounded_by_dead_cells_never_regrows() {
        let (mut lattice, topology, params, mut rng) = make_world(RegrowthRule::NeighborState);
        for cell in 0..lattice.num_cells {
            kill(&mut lattice, cell, &params, &mut rng);
        }
        for _ in 0..20 {
            assert_eq!(tick(&mut lattice, &topology, &params, &mut rng), 0);
        }
    }

    #[test]
    fn legacy_rule_follows_neighbour_timers() {
        let (mut lattice, topology, params, mut rng) = make_world(RegrowthRule::NeighborTimer);
        let cell = topology.center();
        kill(&mut lattice, cell, &params, &mut rng);
        for n in 0..lattice.num_cells {
            lattice.time_since_susceptible[n] = 10;
        }
        assert_eq!(tick(&mut lattice, &topology, &params, &mut rng), 1);
    }
}
