use plaque_common::CellState;
use rayon::prelude::*;

/// Particles released during a tick, held apart from the live counts until commit.
#[derive(Debug, Clone)]
pub struct ParticleSink {
    pub virions: Vec<u32>,
    pub dips: Vec<u32>,
    /// Cumulative particles placed by lattice-wide random jumps.
    pub jumped_virions: u64,
    pub jumped_dips: u64,
}

impl ParticleSink {
    pub fn new(num_cells: usize) -> Self {
        Self {
            virions: vec![0; num_cells],
            dips: vec![0; num_cells],
            jumped_virions: 0,
            jumped_dips: 0,
        }
    }

    #[inline(always)]
    pub fn add(&mut self, kind: ParticleKind, cell: usize, count: u32) {
        let slot = match kind {
            ParticleKind::Virion => &mut self.virions[cell],
            ParticleKind::Dip => &mut self.dips[cell],
        };
        *slot = slot.saturating_add(count);
    }

    #[inline(always)]
    pub fn record_jump(&mut self, kind: ParticleKind, count: u32) {
        match kind {
            ParticleKind::Virion => self.jumped_virions += count as u64,
            ParticleKind::Dip => self.jumped_dips += count as u64,
        }
    }

    pub fn pending(&self) -> u64 {
        self.virions.iter().chain(self.dips.iter()).map(|&c| c as u64).sum()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ParticleKind {
    Virion,
    Dip,
}

/// Extracellular virion and DIP counts per cell.
#[derive(Debug, Clone)]
pub struct ParticleFields {
    pub virions: Vec<u32>,
    pub dips: Vec<u32>,
    pub incoming: ParticleSink,
}

impl ParticleFields {
    pub fn new(num_cells: usize) -> Self {
        Self {
            virions: vec![0; num_cells],
            dips: vec![0; num_cells],
            incoming: ParticleSink::new(num_cells),
        }
    }

    #[inline(always)]
    pub fn count(&self, kind: ParticleKind, cell: usize) -> u32 {
        match kind {
            ParticleKind::Virion => self.virions[cell],
            ParticleKind::Dip => self.dips[cell],
        }
    }

    /// Places particles directly into the live counts (initial conditions only).
    pub fn seed(&mut self, kind: ParticleKind, cell: usize, count: u32) {
        let slot = match kind {
            ParticleKind::Virion => &mut self.virions[cell],
            ParticleKind::Dip => &mut self.dips[cell],
        };
        *slot = slot.saturating_add(count);
    }

    /// Moves this tick's releases into the live counts and empties the sink.
    pub fn merge_incoming(&mut self) {
        merge_into(&mut self.virions, &mut self.incoming.virions);
        merge_into(&mut self.dips, &mut self.incoming.dips);
    }

    /// Applies one tick of exponential decay; `None` leaves that field untouched.
    pub fn decay(&mut self, virion_factor: Option<f64>, dip_factor: Option<f64>) {
        if let Some(factor) = virion_factor {
            decay_counts(&mut self.virions, factor);
        }
        if let Some(factor) = dip_factor {
            decay_counts(&mut self.dips, factor);
        }
    }

    /// Zeroes both fields on every dead cell.
    pub fn clear_dead(&mut self, states: &[CellState]) {
        self.virions
            .par_iter_mut()
            .zip(self.dips.par_iter_mut())
            .zip(states.par_iter())
            .for_each(|((v, d), &state)| {
                if state == CellState::Dead {
                    *v = 0;
                    *d = 0;
                }
            });
    }

    /// Removes particles wherever `remove` says so. Returns (virions, DIPs) removed.
    pub fn remove_where<F>(&mut self, include_dips: bool, remove: F) -> (u64, u64)
    where
        F: Fn(usize) -> bool + Sync,
    {
        let removed_v: u64 = self
            .virions
            .par_iter_mut()
            .enumerate()
            .filter(|(cell, _)| remove(*cell))
            .map(|(_, v)| std::mem::take(v) as u64)
            .sum();
        let removed_d: u64 = if include_dips {
            self.dips
                .par_iter_mut()
                .enumerate()
                .filter(|(cell, _)| remove(*cell))
                .map(|(_, d)| std::mem::take(d) as u64)
                .sum()
        } else {
            0
        };
        (removed_v, removed_d)
    }

    pub fn total(&self, kind: ParticleKind) -> u64 {
        let field = match kind {
            ParticleKind::Virion => &self.virions,
            ParticleKind::Dip => &self.dips,
        };
        field.par_iter().map(|&c| c as u64).sum()
    }
}

fn merge_into(live: &mut [u32], pending: &mut [u32]) {
    live.par_iter_mut().zip(pending.par_iter_mut()).for_each(|(count, add)| {
        *count = count.saturating_add(std::mem::take(add));
    });
}

// Round half up: floor(x + 0.5).
fn decay_counts(counts: &mut [u32], factor: f64) {
    counts.par_iter_mut().for_each(|count| {
        if *count > 0 {
            *count = (*count as f64 * factor + 0.5).floor() as u32;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use plaque_common::SimParams;

    #[test]
    fn one_half_life_halves_the_count() {
        let mut fields = ParticleFields::new(1);
        fields.seed(ParticleKind::Virion, 0, 100);
        fields.decay(SimParams::decay_factor(1.0), None);
        assert_eq!(fields.virions[0], 50);
    }

    #[test]
    fn decay_rounds_half_up() {
        let mut fields = ParticleFields::new(2);
        fields.seed(ParticleKind::Dip, 0, 3);
        fields.seed(ParticleKind::Dip, 1, 1);
        fields.decay(None, SimParams::decay_factor(1.0));
        assert_eq!(fields.dips, vec![2, 1]);
    }

    #[test]
    fn odd_count_halves_after_three_hour_half_life() {
        let mut fields = ParticleFields::new(1);
        fields.seed(ParticleKind::Virion, 0, 101);
        let factor = SimParams::decay_factor(3.0);
        let mut counts = Vec::new();
        for _ in 0..3 {
            fields.decay(factor, None);
            counts.push(fields.virions[0]);
        }
        assert_eq!(counts, vec![80, 63, 50]);
    }

    #[test]
    fn zero_half_life_disables_decay() {
        let mut fields = ParticleFields::new(1);
        fields.seed(ParticleKind::Virion, 0, 7);
        fields.decay(SimParams::decay_factor(0.0), SimParams::decay_factor(0.0));
        assert_eq!(fields.virions[0], 7);
    }

    #[test]
    fn dead_cells_hold_no_particles() {
        let mut fields = ParticleFields::new(3);
        for cell in 0..3 {
            fields.seed(ParticleKind::Virion, cell, 5);
            fields.seed(ParticleKind::Dip, cell, 5);
        }
        let states = [CellState::Susceptible, CellState::Dead, CellState::Antiviral];
        fields.clear_dead(&states);
        assert_eq!(fields.virions, vec![5, 0, 5]);
        assert_eq!(fields.dips, vec![5, 0, 5]);
    }

    #[test]
    fn merge_empties_the_sink() {
        let mut fields = ParticleFields::new(2);
        fields.incoming.add(ParticleKind::Virion, 1, 4);
        fields.incoming.add(ParticleKind::Dip, 0, 2);
        assert_eq!(fields.incoming.pending(), 6);
        fields.merge_incoming();
        assert_eq!(fields.virions, vec![0, 4]);
        assert_eq!(fields.dips, vec![2, 0]);
        assert_eq!(fields.incoming.pending(), 0);
    }

    #[test]
    fn removal_can_spare_dips() {
        let mut fields = ParticleFields::new(2);
        fields.seed(ParticleKind::Virion, 0, 3);
        fields.seed(ParticleKind::Dip, 0, 4);
        fields.seed(ParticleKind::Virion, 1, 9);
        let removed = fields.remove_where(false, |cell| cell == 0);
        assert_eq!(removed, (3, 0));
        assert_eq!(fields.virions, vec![0, 9]);
        assert_eq!(fields.dips[0], 4);
    }
}
