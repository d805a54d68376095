use plaque_common::{CellState, SimParams};

use crate::ifn::IfnModel;
use crate::lattice::Lattice;
use crate::sampling::{chance, SimRng};

/// Infection probability of a single particle of each type.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct InfectionChances {
    pub virion: f64,
    pub dip: f64,
}

/// Per-particle chances at interferon level `ifn`.
pub fn per_particle_chances(params: &SimParams, ifn: f64) -> InfectionChances {
    let dip = params.rho * (-params.alpha * ifn).exp();
    let virion = if params.ifn_inert() {
        params.rho
    } else if params.virions_stimulate_ifn && params.baseline_ifn_rate > 0.0 {
        params.rho * (-params.alpha * ifn / params.baseline_ifn_rate).exp()
    } else {
        dip
    };
    InfectionChances { virion, dip }
}

/// Probability that at least one of `count` independent particles infects.
#[inline(always)]
pub fn aggregate_probability(p: f64, count: u32) -> f64 {
    if count == 0 {
        return 0.0;
    }
    1.0 - (1.0 - p.clamp(0.0, 1.0)).powf(count as f64)
}

// Intracellular genomes delivered by a successful infection; at least the one that infected.
#[inline(always)]
fn delivered(count: u32, p: f64) -> u32 {
    ((count as f64 * p).round() as u32).max(1)
}

/// Phase 2: susceptible and regrowth cells draw independent virion and DIP trials
/// against their local particle counts.
pub fn resolve_new_infections(
    lattice: &mut Lattice,
    ifn: &dyn IfnModel,
    params: &SimParams,
    rng: &mut SimRng,
) -> u32 {
    let mut infected = 0;
    for cell in 0..lattice.num_cells {
        if !lattice.state[cell].is_susceptible_like() || !lattice.is_free(cell) {
            continue;
        }
        let virions = lattice.particles.virions[cell];
        let dips = if params.dip_enabled { lattice.particles.dips[cell] } else { 0 };
        if virions == 0 && dips == 0 {
            continue;
        }

        let chances = per_particle_chances(params, ifn.regional_average(cell));
        let p_v = aggregate_probability(chances.virion, virions);
        let p_d = aggregate_probability(chances.dip, dips);
        let by_virion = virions > 0 && chance(rng, p_v);
        let by_dip = dips > 0 && chance(rng, p_d);

        let to = match (by_virion, by_dip) {
            (true, true) => CellState::InfectedBoth,
            (true, false) => CellState::InfectedVirion,
            (false, true) => CellState::InfectedDip,
            (false, false) => continue,
        };
        let intra = (
            if by_virion { delivered(virions, p_v) } else { 0 },
            if by_dip { delivered(dips, p_d) } else { 0 },
        );
        lattice.infect(cell, to, intra, params, rng);
        infected += 1;
    }
    infected
}

/// Co-infection pass of phase 4: singly infected cells untouched this tick draw the
/// complementary trial and upgrade to both-infected on success.
pub fn resolve_coinfections(
    lattice: &mut Lattice,
    ifn: &dyn IfnModel,
    params: &SimParams,
    rng: &mut SimRng,
) -> u32 {
    let mut upgraded = 0;
    for cell in 0..lattice.num_cells {
        if !lattice.is_free(cell) {
            continue;
        }
        let intra = match lattice.state[cell] {
            CellState::InfectedVirion if params.dip_enabled => {
                let dips = lattice.particles.dips[cell];
                if dips == 0 {
                    continue;
                }
                let chances = per_particle_chances(params, ifn.regional_average(cell));
                let p_d = aggregate_probability(chances.dip, dips);
                if !chance(rng, p_d) {
                    continue;
                }
                (0, delivered(dips, p_d))
            }
            CellState::InfectedDip => {
                let virions = lattice.particles.virions[cell];
                if virions == 0 {
                    continue;
                }
                let chances = per_particle_chances(params, ifn.regional_average(cell));
                let p_v = aggregate_probability(chances.virion, virions);
                if !chance(rng, p_v) {
                    continue;
                }
                (delivered(virions, p_v), 0)
            }
            _ => continue,
        };
        lattice.upgrade_to_both(cell, intra, params, rng);
        upgraded += 1;
    }
    upgraded
}
