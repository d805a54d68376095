use plaque_common::{CellState, SimParams};

use crate::ifn::IfnModel;
use crate::lattice::{Lattice, NO_TIMER};
use crate::sampling::{normal_ticks, SimRng};

/// Phase 3: cells exposed to interferon build up an antiviral response and, once the
/// exposure outlasts their drawn duration, become permanently antiviral.
///
/// Eligible cells are susceptible, regrowth or DIP-only infected cells with positive
/// regional interferon that no earlier phase has touched this tick. The first exposure
/// draws the duration from Normal(TAU, TAU/4). Returns the number of new antiviral cells.
pub fn resolve_antiviral(
    lattice: &mut Lattice,
    ifn: &dyn IfnModel,
    params: &SimParams,
    rng: &mut SimRng,
) -> u32 {
    if params.tau <= 0.0 {
        return 0;
    }
    let mut entered = 0;
    for cell in 0..lattice.num_cells {
        let state = lattice.state[cell];
        if !(state.is_susceptible_like() || state == CellState::InfectedDip) || !lattice.is_free(cell) {
            continue;
        }
        if ifn.regional_average(cell) <= 0.0 {
            continue;
        }
        if lattice.antiviral_duration[cell] == NO_TIMER {
            lattice.antiviral_duration[cell] = normal_ticks(rng, params.tau, params.tau / 4.0, 0);
            lattice.antiviral_exposure[cell] = 0;
        } else if lattice.antiviral_exposure[cell] <= lattice.antiviral_duration[cell] {
            lattice.antiviral_exposure[cell] += 1;
        } else {
            lattice.enter_antiviral(cell);
            entered += 1;
        }
    }
    entered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::HexTopology;
    use crate::ifn::{build_ifn_model, GlobalIfn};
    use plaque_common::{IfnPolicy, SimulationConfig};
    use rand::SeedableRng;

    fn make_params(tau: f64) -> SimParams {
        let mut config = SimulationConfig::default();
        config.lattice.size = 4;
        config.ifn.policy = IfnPolicy::Global;
        config.ifn.tau = tau;
        config.get_sim_params()
    }

    fn exposed_model(params: &SimParams) -> GlobalIfn {
        let topology = HexTopology::new(params, false, &mut SimRng::seed_from_u64(0));
        let mut model = GlobalIfn::new(params);
        model.deposit(0, 160.0, &topology);
        model
    }

    fn tick(lattice: &mut Lattice, ifn: &dyn IfnModel, params: &SimParams, rng: &mut SimRng) -> u32 {
        lattice.begin_tick();
        let entered = resolve_antiviral(lattice, ifn, params, rng);
        lattice.commit_states();
        entered
    }

    #[test]
    fn zero_tau_never_protects() {
        let params = make_params(0.0);
        let ifn = exposed_model(&params);
        let mut lattice = Lattice::new(&params);
        let mut rng = SimRng::seed_from_u64(2);
        for _ in 0..50 {
            assert_eq!(tick(&mut lattice, &ifn, &params, &mut rng), 0);
        }
    }

    #[test]
    fn sustained_exposure_outlasting_duration_protects() {
        let params = make_params(4.0);
        let ifn = exposed_model(&params);
        let mut lattice = Lattice::new(&params);
        let mut rng = SimRng::seed_from_u64(2);
        lattice.state[3] = CellState::InfectedDip;
        lattice.time_since_dip_infection[3] = 0;

        tick(&mut lattice, &ifn, &params, &mut rng);
        let duration = lattice.antiviral_duration[3];
        assert!(duration >= 0);

        let mut ticks = 1;
        while lattice.state[3] != CellState::Antiviral {
            tick(&mut lattice, &ifn, &params, &mut rng);
            ticks += 1;
            assert!(ticks < 100);
        }
        assert_eq!(ticks, duration + 3);
        assert_eq!(lattice.previous_state[3], Some(CellState::InfectedDip));
        assert_eq!(lattice.state[0], CellState::Antiviral);
    }

    #[test]
    fn no_interferon_no_response() {
        let params = make_params(4.0);
        let ifn = build_ifn_model(&params);
        let mut lattice = Lattice::new(&params);
        let mut rng = SimRng::seed_from_u64(2);
        for _ in 0..30 {
            assert_eq!(tick(&mut lattice, ifn.as_ref(), &params, &mut rng), 0);
        }
        assert_eq!(lattice.antiviral_duration[0], NO_TIMER);
    }
}
