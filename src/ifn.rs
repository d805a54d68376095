use plaque_common::{CellState, IfnPolicy, SimParams};
use rayon::prelude::*;

use crate::grid::HexTopology;
use crate::lattice::Lattice;

/// Interferon storage and its spatial read model.
pub trait IfnModel: Send + Sync {
    fn policy(&self) -> IfnPolicy;

    /// Adds interferon produced by `cell` this tick.
    fn deposit(&mut self, cell: usize, amount: f64, topology: &HexTopology);

    /// One tick of exponential decay with the sub-threshold snap to zero.
    fn decay(&mut self);

    /// Recomputes whatever `regional_average` reads.
    fn refresh(&mut self, _topology: &HexTopology) {}

    /// Interferon level a cell responds to.
    fn regional_average(&self, cell: usize) -> f64;

    /// Interferon stored at a cell.
    fn concentration(&self, cell: usize) -> f64;

    fn total(&self) -> f64;
}

pub fn build_ifn_model(params: &SimParams) -> Box<dyn IfnModel> {
    match params.ifn_policy {
        IfnPolicy::Disabled => Box::new(DisabledIfn),
        IfnPolicy::Global => Box::new(GlobalIfn::new(params)),
        IfnPolicy::Local => Box::new(LocalIfn::new(params)),
    }
}

/// Per-tick production of a cell given its snapshot state.
pub fn production_rate(lattice: &Lattice, cell: usize, params: &SimParams) -> f64 {
    match lattice.state[cell] {
        CellState::InfectedVirion => params.baseline_ifn_rate,
        CellState::InfectedBoth => params.both_ifn_rate,
        CellState::InfectedDip if lattice.time_since_dip_infection[cell] > lattice.ifn_onset[cell] => {
            params.dip_only_ifn_rate
        }
        _ => 0.0,
    }
}

/// Phase 1 of a tick: production by infected cells, decay, then regional averages.
pub fn update_field(model: &mut dyn IfnModel, lattice: &Lattice, params: &SimParams, topology: &HexTopology) {
    if model.policy() == IfnPolicy::Disabled {
        return;
    }
    for cell in 0..lattice.num_cells {
        let amount = production_rate(lattice, cell, params);
        if amount > 0.0 {
            model.deposit(cell, amount, topology);
        }
    }
    model.decay();
    model.refresh(topology);
}

#[derive(Debug, Default)]
pub struct DisabledIfn;

impl IfnModel for DisabledIfn {
    fn policy(&self) -> IfnPolicy { IfnPolicy::Disabled }
    fn deposit(&mut self, _cell: usize, _amount: f64, _topology: &HexTopology) {}
    fn decay(&mut self) {}
    fn regional_average(&self, _cell: usize) -> f64 { 0.0 }
    fn concentration(&self, _cell: usize) -> f64 { 0.0 }
    fn total(&self) -> f64 { 0.0 }
}

/// A single well-mixed pool shared evenly by every cell.
#[derive(Debug)]
pub struct GlobalIfn {
    total: f64,
    num_cells: f64,
    decay_factor: Option<f64>,
}

impl GlobalIfn {
    pub fn new(params: &SimParams) -> Self {
        Self {
            total: 0.0,
            num_cells: params.num_cells as f64,
            decay_factor: SimParams::decay_factor(params.ifn_half_life),
        }
    }
}

impl IfnModel for GlobalIfn {
    fn policy(&self) -> IfnPolicy { IfnPolicy::Global }

    fn deposit(&mut self, _cell: usize, amount: f64, _topology: &HexTopology) {
        self.total += amount;
    }

    fn decay(&mut self) {
        // Levels below one unit per cell snap to zero only while decay is on.
        if let Some(factor) = self.decay_factor {
            self.total *= factor;
            if self.total < 1.0 / self.num_cells {
                self.total = 0.0;
            }
        }
    }

    fn regional_average(&self, _cell: usize) -> f64 { self.total / self.num_cells }

    fn concentration(&self, _cell: usize) -> f64 { self.total / self.num_cells }

    fn total(&self) -> f64 { self.total }
}

/// A per-cell field; production spreads over the producer's interferon area and cells
/// respond to the mean over their own area.
#[derive(Debug)]
pub struct LocalIfn {
    concentration: Vec<f64>,
    average: Vec<f64>,
    snap_below: f64,
    decay_factor: Option<f64>,
}

impl LocalIfn {
    pub fn new(params: &SimParams) -> Self {
        Self {
            concentration: vec![0.0; params.num_cells],
            average: vec![0.0; params.num_cells],
            snap_below: 1.0 / params.num_cells as f64,
            decay_factor: SimParams::decay_factor(params.ifn_half_life),
        }
    }
}

impl IfnModel for LocalIfn {
    fn policy(&self) -> IfnPolicy { IfnPolicy::Local }

    fn deposit(&mut self, cell: usize, amount: f64, topology: &HexTopology) {
        let area = topology.ifn_area(cell);
        if area.is_empty() {
            self.concentration[cell] += amount;
            return;
        }
        let share = amount / area.len() as f64;
        for &target in area {
            self.concentration[target as usize] += share;
        }
    }

    fn decay(&mut self) {
        let Some(factor) = self.decay_factor else { return };
        let snap_below = self.snap_below;
        self.concentration.par_iter_mut().for_each(|c| {
            *c *= factor;
            if *c < snap_below {
                *c = 0.0;
            }
        });
    }

    fn refresh(&mut self, topology: &HexTopology) {
        let concentration = &self.concentration;
        self.average.par_iter_mut().enumerate().for_each(|(cell, avg)| {
            let area = topology.ifn_area(cell);
            *avg = if area.is_empty() {
                concentration[cell]
            } else {
                area.iter().map(|&n| concentration[n as usize]).sum::<f64>() / area.len() as f64
            };
        });
    }

    fn regional_average(&self, cell: usize) -> f64 { self.average[cell] }

    fn concentration(&self, cell: usize) -> f64 { self.concentration[cell] }

    // Sequential so the sum is identical across runs.
    fn total(&self) -> f64 { self.concentration.iter().sum() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampling::SimRng;
    use plaque_common::SimulationConfig;
    use rand::SeedableRng;

    fn make_params(policy: IfnPolicy, half_life: f64) -> SimParams {
        let mut config = SimulationConfig::default();
        config.lattice.size = 21;
        config.lattice.ifn_radius = 2;
        config.ifn.policy = policy;
        config.decay.ifn_half_life = half_life;
        config.get_sim_params()
    }

    fn make_topology(params: &SimParams) -> HexTopology {
        HexTopology::new(params, params.ifn_policy == IfnPolicy::Local, &mut SimRng::seed_from_u64(0))
    }

    #[test]
    fn global_pool_halves_after_one_half_life() {
        let params = make_params(IfnPolicy::Global, 4.0);
        let topo = make_topology(&params);
        let mut model = GlobalIfn::new(&params);
        model.deposit(0, 100.0, &topo);
        for _ in 0..4 {
            model.decay();
        }
        assert!((model.total() - 50.0).abs() < 1e-9);
        assert!((model.regional_average(3) - 50.0 / 441.0).abs() < 1e-12);
    }

    #[test]
    fn tiny_levels_snap_to_zero() {
        let params = make_params(IfnPolicy::Global, 4.0);
        let topo = make_topology(&params);
        let mut model = GlobalIfn::new(&params);
        model.deposit(0, 0.5 / 441.0, &topo);
        model.decay();
        assert_eq!(model.total(), 0.0);
    }

    #[test]
    fn local_deposit_spreads_over_area_and_conserves() {
        let params = make_params(IfnPolicy::Local, 0.0);
        let topo = make_topology(&params);
        let mut model = LocalIfn::new(&params);
        let center = topo.center();
        model.deposit(center, 13.0, &topo);
        assert!((model.total() - 13.0).abs() < 1e-9);
        // Radius-2 disk holds 13 cells.
        assert!((model.concentration(center) - 1.0).abs() < 1e-12);
        model.refresh(&topo);
        assert!((model.regional_average(center) - 1.0).abs() < 1e-12);
        assert_eq!(model.regional_average(0), 0.0);
    }

    #[test]
    fn zero_half_life_keeps_local_field() {
        let params = make_params(IfnPolicy::Local, 0.0);
        let topo = make_topology(&params);
        let mut model = LocalIfn::new(&params);
        model.deposit(topo.center(), 26.0, &topo);
        model.decay();
        assert!((model.total() - 26.0).abs() < 1e-9);
    }

    #[test]
    fn zero_half_life_keeps_levels_below_snap_floor() {
        let params = make_params(IfnPolicy::Global, 0.0);
        let topo = make_topology(&params);
        let mut model = GlobalIfn::new(&params);
        let tiny = 0.1 / params.num_cells as f64;
        for _ in 0..3 {
            model.deposit(0, tiny, &topo);
            model.decay();
        }
        assert!((model.total() - 3.0 * tiny).abs() < 1e-15);

        let params = make_params(IfnPolicy::Local, 0.0);
        let topo = make_topology(&params);
        let mut model = LocalIfn::new(&params);
        model.deposit(topo.center(), tiny, &topo);
        model.decay();
        assert!(model.total() > 0.0);
    }

    #[test]
    fn disabled_model_ignores_production() {
        let params = make_params(IfnPolicy::Disabled, 4.0);
        let topo = make_topology(&params);
        let mut lattice = Lattice::new(&params);
        lattice.state[0] = CellState::InfectedBoth;
        let mut model = build_ifn_model(&params);
        update_field(model.as_mut(), &lattice, &params, &topo);
        assert_eq!(model.total(), 0.0);
    }

    #[test]
    fn dip_only_cells_wait_for_onset() {
        let params = make_params(IfnPolicy::Global, 0.0);
        let mut lattice = Lattice::new(&params);
        lattice.state[0] = CellState::InfectedDip;
        lattice.time_since_dip_infection[0] = 2;
        lattice.ifn_onset[0] = 5;
        assert_eq!(production_rate(&lattice, 0, &params), 0.0);
        lattice.time_since_dip_infection[0] = 6;
        assert_eq!(production_rate(&lattice, 0, &params), params.dip_only_ifn_rate);
    }
}
