use plaque_common::{CellState, SimParams};
use rayon::prelude::*;

use crate::particles::ParticleFields;
use crate::sampling::{normal_ticks, SimRng};

/// Value of a timer or threshold that is not running for the cell's current state.
pub const NO_TIMER: i32 = -1;

/// Per-cell simulation state in structure-of-arrays layout.
///
/// `state` is the snapshot every phase reads; transitions are written to `next_state`
/// and become visible only when `commit_states` swaps the buffers at tick end.
#[derive(Debug)]
pub struct Lattice {
    pub num_cells: usize,

    // --- Ping-Pong State Buffers ---
    pub state: Vec<CellState>,
    pub next_state: Vec<CellState>,
    /// Set once a cell has been given a transition this tick; later phases leave it alone.
    pub state_changed: Vec<bool>,
    /// Production-mode flag: infected while continuous production was active.
    pub continuous: Vec<bool>,
    pub previous_state: Vec<Option<CellState>>,

    pub particles: ParticleFields,

    // --- Elapsed-time counters (NO_TIMER when idle) ---
    pub time_since_infection: Vec<i32>,
    pub time_since_dip_infection: Vec<i32>,
    pub time_since_death: Vec<i32>,
    pub time_since_regrowth: Vec<i32>,
    pub time_since_susceptible: Vec<i32>,
    pub time_since_antiviral: Vec<i32>,
    pub antiviral_exposure: Vec<i32>,

    // --- Thresholds drawn on state entry ---
    pub lysis_threshold: Vec<i32>,
    pub dip_clearance_threshold: Vec<i32>,
    pub ifn_onset: Vec<i32>,
    pub antiviral_duration: Vec<i32>,
    pub regrowth_threshold: Vec<i32>,

    // --- Continuous production ---
    pub intra_wt: Vec<u32>,
    pub intra_dvg: Vec<u32>,
}

impl Lattice {
    /// Allocates an all-susceptible lattice for `params`.
    pub fn new(params: &SimParams) -> Self {
        let n = params.num_cells;
        Self {
            num_cells: n,
            state: vec![CellState::Susceptible; n],
            next_state: vec![CellState::Susceptible; n],
            state_changed: vec![false; n],
            continuous: vec![false; n],
            previous_state: vec![None; n],
            particles: ParticleFields::new(n),
            time_since_infection: vec![NO_TIMER; n],
            time_since_dip_infection: vec![NO_TIMER; n],
            time_since_death: vec![NO_TIMER; n],
            time_since_regrowth: vec![NO_TIMER; n],
            // Every cell starts susceptible, so its susceptible clock is already running.
            time_since_susceptible: vec![0; n],
            time_since_antiviral: vec![NO_TIMER; n],
            antiviral_exposure: vec![NO_TIMER; n],
            lysis_threshold: vec![NO_TIMER; n],
            dip_clearance_threshold: vec![NO_TIMER; n],
            ifn_onset: vec![NO_TIMER; n],
            antiviral_duration: vec![NO_TIMER; n],
            regrowth_threshold: vec![NO_TIMER; n],
            intra_wt: vec![0; n],
            intra_dvg: vec![0; n],
        }
    }

    /// Starts a tick: the next buffer begins as a copy of the snapshot.
    pub fn begin_tick(&mut self) {
        self.next_state.copy_from_slice(&self.state);
        self.state_changed.fill(false);
    }

    /// Publishes every transition written this tick.
    pub fn commit_states(&mut self) {
        std::mem::swap(&mut self.state, &mut self.next_state);
    }

    #[inline(always)]
    pub fn is_free(&self, cell: usize) -> bool { !self.state_changed[cell] }

    /// Infects a susceptible or regrowth cell. `intra` seeds the intracellular
    /// (wild-type, defective) genome counts used by continuous production.
    pub fn infect(
        &mut self,
        cell: usize,
        to: CellState,
        intra: (u32, u32),
        params: &SimParams,
        rng: &mut SimRng,
    ) {
        self.time_since_susceptible[cell] = NO_TIMER;
        self.time_since_regrowth[cell] = NO_TIMER;
        match to {
            CellState::InfectedDip => self.start_dip_infection(cell, params, rng),
            _ => self.start_productive_infection(cell, params, rng),
        }
        self.continuous[cell] = params.continuous;
        self.intra_wt[cell] = intra.0;
        self.intra_dvg[cell] = intra.1;
        self.transition(cell, to);
    }

    /// Co-infects a singly infected cell. A DIP-only cell starts its lysis clock here;
    /// a virion-only cell keeps the clock it already has.
    pub fn upgrade_to_both(&mut self, cell: usize, intra: (u32, u32), params: &SimParams, rng: &mut SimRng) {
        if self.state[cell] == CellState::InfectedDip {
            self.clear_dip_timers(cell);
            self.start_productive_infection(cell, params, rng);
            self.intra_wt[cell] = intra.0;
        } else {
            self.intra_dvg[cell] = intra.1;
        }
        self.transition(cell, CellState::InfectedBoth);
    }

    /// Lyses or kills a cell and draws its regrowth threshold.
    pub fn kill(&mut self, cell: usize, params: &SimParams, rng: &mut SimRng) {
        self.time_since_infection[cell] = NO_TIMER;
        self.lysis_threshold[cell] = NO_TIMER;
        self.clear_dip_timers(cell);
        self.intra_wt[cell] = 0;
        self.intra_dvg[cell] = 0;
        self.time_since_death[cell] = 0;
        self.regrowth_threshold[cell] =
            normal_ticks(rng, params.regrowth_mean, params.regrowth_std, 1);
        self.transition(cell, CellState::Dead);
    }

    pub fn enter_antiviral(&mut self, cell: usize) {
        self.previous_state[cell] = Some(self.state[cell]);
        self.time_since_susceptible[cell] = NO_TIMER;
        self.time_since_regrowth[cell] = NO_TIMER;
        self.clear_dip_timers(cell);
        self.antiviral_exposure[cell] = NO_TIMER;
        self.antiviral_duration[cell] = NO_TIMER;
        self.time_since_antiviral[cell] = 0;
        self.transition(cell, CellState::Antiviral);
    }

    pub fn regrow(&mut self, cell: usize) {
        self.time_since_death[cell] = NO_TIMER;
        self.regrowth_threshold[cell] = NO_TIMER;
        self.time_since_regrowth[cell] = 0;
        self.transition(cell, CellState::Regrowth);
    }

    /// Returns a committed DIP-only cell to susceptibility; nothing is released.
    pub fn clear_dip_infection(&mut self, cell: usize) {
        self.clear_dip_timers(cell);
        self.continuous[cell] = false;
        self.intra_dvg[cell] = 0;
        self.time_since_susceptible[cell] = 0;
        self.state[cell] = CellState::Susceptible;
    }

    /// Advances the elapsed counters of susceptible, regrowth and antiviral cells.
    pub fn advance_elapsed(&mut self) {
        self.time_since_susceptible
            .par_iter_mut()
            .zip(self.time_since_regrowth.par_iter_mut())
            .zip(self.time_since_antiviral.par_iter_mut())
            .zip(self.state.par_iter())
            .for_each(|(((sus, regrowth), antiviral), &state)| match state {
                CellState::Susceptible => *sus += 1,
                CellState::Regrowth => *regrowth += 1,
                CellState::Antiviral => *antiviral += 1,
                _ => {}
            });
    }

    fn start_productive_infection(&mut self, cell: usize, params: &SimParams, rng: &mut SimRng) {
        self.time_since_infection[cell] = 0;
        self.lysis_threshold[cell] =
            normal_ticks(rng, params.mean_lysis_time, params.std_lysis_time, 1);
    }

    fn start_dip_infection(&mut self, cell: usize, params: &SimParams, rng: &mut SimRng) {
        self.time_since_dip_infection[cell] = 0;
        self.dip_clearance_threshold[cell] =
            normal_ticks(rng, params.dip_clearance_mean, params.dip_clearance_std, 1);
        self.ifn_onset[cell] = normal_ticks(
            rng,
            params.dip_only_ifn_delay_mean,
            params.dip_only_ifn_delay_std,
            0,
        );
    }

    fn clear_dip_timers(&mut self, cell: usize) {
        self.time_since_dip_infection[cell] = NO_TIMER;
        self.dip_clearance_threshold[cell] = NO_TIMER;
        self.ifn_onset[cell] = NO_TIMER;
    }

    #[inline(always)]
    fn transition(&mut self, cell: usize, to: CellState) {
        self.next_state[cell] = to;
        self.state_changed[cell] = true;
    }
}
