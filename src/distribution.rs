use plaque_common::{SimParams, SpreadPolicy};
use rand::distr::weighted::WeightedIndex;
use rand::prelude::*;
use rand::seq::index;

use crate::grid::HexTopology;
use crate::particles::{ParticleKind, ParticleSink};
use crate::sampling::{chance, SimRng};

/// Rings 1, 2 and 3 of the cell-to-cell policy weigh 1 : 1/2 : 1/sqrt(3).
const RING_WEIGHTS: [f64; 3] = [1.0, 0.5, 0.577_350_269_189_625_8];

/// Particles leaving one cell in one event.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Release {
    pub virions: u32,
    pub dips: u32,
}

impl Release {
    pub fn is_empty(&self) -> bool { self.virions == 0 && self.dips == 0 }
}

/// Places a release onto the lattice.
pub trait ParticleDistributor: Send + Sync {
    fn distribute(
        &self,
        source: usize,
        release: Release,
        topology: &HexTopology,
        rng: &mut SimRng,
        sink: &mut ParticleSink,
    );
}

pub fn build_distributor(params: &SimParams) -> Box<dyn ParticleDistributor> {
    match params.spread_policy {
        SpreadPolicy::CellToCell => Box::new(CellToCell::new(params.burst_radius)),
        SpreadPolicy::RadiusBurst => Box::new(RadiusBurst),
        SpreadPolicy::JumpRandomly => Box::new(RandomJump),
        SpreadPolicy::JumpRadius => Box::new(RadiusJump),
        SpreadPolicy::Partition => Box::new(Partition {
            fraction: params.partition_fraction,
            per_event: params.partition_per_event,
            local: CellToCell::new(params.burst_radius),
        }),
    }
}

/// Ring-weighted spread over rings 1..=min(3, burst radius).
#[derive(Debug, Clone)]
pub struct CellToCell {
    rings: u32,
}

impl CellToCell {
    pub fn new(burst_radius: u32) -> Self {
        Self { rings: burst_radius.clamp(1, RING_WEIGHTS.len() as u32) }
    }

    fn spread(
        &self,
        source: usize,
        amount: u32,
        kind: ParticleKind,
        topology: &HexTopology,
        rng: &mut SimRng,
        sink: &mut ParticleSink,
    ) {
        if amount == 0 {
            return;
        }
        let rings: Vec<_> = (1..=self.rings).map(|r| topology.ring(source, r)).collect();
        let weights: Vec<f64> = rings
            .iter()
            .zip(RING_WEIGHTS)
            .map(|(ring, w)| w * ring.len() as f64)
            .collect();
        let mut shares = floor_shares(amount, &weights);
        let assigned: u32 = shares.iter().sum();
        if assigned < amount {
            // Every ring weight is zero only on a 1x1 lattice.
            let Ok(picker) = WeightedIndex::new(&weights) else { return };
            for _ in assigned..amount {
                shares[picker.sample(rng)] += 1;
            }
        }
        for (ring, share) in rings.iter().zip(shares) {
            deal_evenly(ring, share, kind, rng, sink);
        }
    }
}

impl ParticleDistributor for CellToCell {
    fn distribute(&self, source: usize, release: Release, topology: &HexTopology, rng: &mut SimRng, sink: &mut ParticleSink) {
        self.spread(source, release.virions, ParticleKind::Virion, topology, rng, sink);
        self.spread(source, release.dips, ParticleKind::Dip, topology, rng, sink);
    }
}

/// Burst-area spread with weights 1/d^1.5; the delivered total always equals the release.
#[derive(Debug, Clone, Copy)]
pub struct RadiusBurst;

impl RadiusBurst {
    fn spread(&self, source: usize, amount: u32, kind: ParticleKind, topology: &HexTopology, sink: &mut ParticleSink) {
        let area = topology.burst_area(source);
        if amount == 0 || area.is_empty() {
            return;
        }
        let weights: Vec<f64> = area.iter().map(|n| (n.distance as f64).powf(-1.5)).collect();
        let shares = floor_shares(amount, &weights);
        let mut assigned = 0;
        for (n, share) in area.iter().zip(shares) {
            if share > 0 {
                sink.add(kind, n.index as usize, share);
                assigned += share;
            }
        }
        // Residue goes one at a time round the nearest ring.
        let nearest = area[0].distance;
        let closest: Vec<usize> = area
            .iter()
            .take_while(|n| n.distance == nearest)
            .map(|n| n.index as usize)
            .collect();
        for k in 0..(amount - assigned) as usize {
            sink.add(kind, closest[k % closest.len()], 1);
        }
    }
}

impl ParticleDistributor for RadiusBurst {
    fn distribute(&self, source: usize, release: Release, topology: &HexTopology, _rng: &mut SimRng, sink: &mut ParticleSink) {
        self.spread(source, release.virions, ParticleKind::Virion, topology, sink);
        self.spread(source, release.dips, ParticleKind::Dip, topology, sink);
    }
}

/// Every particle lands on an independently uniform lattice cell.
#[derive(Debug, Clone, Copy)]
pub struct RandomJump;

impl RandomJump {
    fn scatter(&self, amount: u32, kind: ParticleKind, topology: &HexTopology, rng: &mut SimRng, sink: &mut ParticleSink) {
        let num_cells = topology.num_cells();
        for _ in 0..amount {
            sink.add(kind, rng.random_range(0..num_cells), 1);
        }
        sink.record_jump(kind, amount);
    }
}

impl ParticleDistributor for RandomJump {
    fn distribute(&self, _source: usize, release: Release, topology: &HexTopology, rng: &mut SimRng, sink: &mut ParticleSink) {
        self.scatter(release.virions, ParticleKind::Virion, topology, rng, sink);
        self.scatter(release.dips, ParticleKind::Dip, topology, rng, sink);
    }
}

/// Every particle lands on a uniform member of the source's jump ring.
#[derive(Debug, Clone, Copy)]
pub struct RadiusJump;

impl ParticleDistributor for RadiusJump {
    fn distribute(&self, source: usize, release: Release, topology: &HexTopology, rng: &mut SimRng, sink: &mut ParticleSink) {
        let targets = topology.jump_targets(source);
        if targets.is_empty() {
            return;
        }
        for (kind, amount) in [(ParticleKind::Virion, release.virions), (ParticleKind::Dip, release.dips)] {
            for _ in 0..amount {
                let target = targets[rng.random_range(0..targets.len())];
                sink.add(kind, target as usize, 1);
            }
        }
    }
}

/// Splits a release between lattice-wide jumps and cell-to-cell spread.
#[derive(Debug, Clone)]
pub struct Partition {
    /// Jumping fraction of each batch, or jump probability of a whole event.
    pub fraction: f64,
    pub per_event: bool,
    pub local: CellToCell,
}

impl ParticleDistributor for Partition {
    fn distribute(&self, source: usize, release: Release, topology: &HexTopology, rng: &mut SimRng, sink: &mut ParticleSink) {
        if self.per_event {
            if chance(rng, self.fraction) {
                RandomJump.distribute(source, release, topology, rng, sink);
            } else {
                self.local.distribute(source, release, topology, rng, sink);
            }
            return;
        }
        let jumping = Release {
            virions: (release.virions as f64 * self.fraction).floor() as u32,
            dips: (release.dips as f64 * self.fraction).floor() as u32,
        };
        let staying = Release {
            virions: release.virions - jumping.virions,
            dips: release.dips - jumping.dips,
        };
        RandomJump.distribute(source, jumping, topology, rng, sink);
        self.local.distribute(source, staying, topology, rng, sink);
    }
}

/// Floor of each proportional share, never summing past `amount`.
pub(crate) fn floor_shares(amount: u32, weights: &[f64]) -> Vec<u32> {
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return vec![0; weights.len()];
    }
    let mut shares: Vec<u32> = weights
        .iter()
        .map(|w| (amount as f64 * w / total).floor() as u32)
        .collect();
    let mut assigned: u32 = shares.iter().sum();
    while assigned > amount {
        if let Some(largest) = shares.iter_mut().max() {
            *largest -= 1;
        }
        assigned -= 1;
    }
    shares
}

/// Even split over `targets`; the remainder goes to a random subset, one each.
fn deal_evenly(targets: &[u32], amount: u32, kind: ParticleKind, rng: &mut SimRng, sink: &mut ParticleSink) {
    if targets.is_empty() || amount == 0 {
        return;
    }
    let len = targets.len() as u32;
    let per = amount / len;
    let remainder = amount % len;
    if per > 0 {
        for &t in targets {
            sink.add(kind, t as usize, per);
        }
    }
    if remainder > 0 {
        for i in index::sample(rng, targets.len(), remainder as usize).iter() {
            sink.add(kind, targets[i] as usize, 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plaque_common::SimulationConfig;

    fn make_world(size: u32, burst_radius: u32) -> (HexTopology, SimParams, SimRng) {
        let mut config = SimulationConfig::default();
        config.lattice.size = size;
        config.lattice.burst_radius = burst_radius;
        let params = config.get_sim_params();
        let mut rng = SimRng::seed_from_u64(17);
        let topo = HexTopology::new(&params, false, &mut rng);
        (topo, params, rng)
    }

    fn delivered(sink: &ParticleSink) -> (u64, u64) {
        (
            sink.virions.iter().map(|&c| c as u64).sum(),
            sink.dips.iter().map(|&c| c as u64).sum(),
        )
    }

    #[test]
    fn cell_to_cell_with_unit_radius_splits_evenly() {
        let (topo, params, mut rng) = make_world(20, 1);
        let mut sink = ParticleSink::new(params.num_cells);
        let center = topo.center();
        CellToCell::new(1).distribute(center, Release { virions: 60, dips: 0 }, &topo, &mut rng, &mut sink);
        for &n in topo.ring(center, 1).iter() {
            assert_eq!(sink.virions[n as usize], 10);
        }
        assert_eq!(delivered(&sink), (60, 0));
    }

    #[test]
    fn cell_to_cell_conserves_and_stays_within_three_rings() {
        let (topo, params, mut rng) = make_world(20, 3);
        let mut sink = ParticleSink::new(params.num_cells);
        let center = topo.center();
        CellToCell::new(3).distribute(center, Release { virions: 50, dips: 137 }, &topo, &mut rng, &mut sink);
        assert_eq!(delivered(&sink), (50, 137));
        for cell in 0..params.num_cells {
            if sink.virions[cell] > 0 || sink.dips[cell] > 0 {
                let d = topo.distance(center, cell);
                assert!((1..=3).contains(&d));
            }
        }
    }

    #[test]
    fn radius_burst_delivers_exact_total_at_the_edge() {
        for radius in 1..=5 {
            let (topo, params, mut rng) = make_world(12, radius);
            for source in [0, topo.center(), params.num_cells - 1] {
                let mut sink = ParticleSink::new(params.num_cells);
                RadiusBurst.distribute(source, Release { virions: 50, dips: 101 }, &topo, &mut rng, &mut sink);
                assert_eq!(delivered(&sink), (50, 101), "radius {} source {}", radius, source);
                assert_eq!(sink.virions[source], 0);
            }
        }
    }

    #[test]
    fn radius_burst_favours_nearer_rings() {
        let (topo, params, mut rng) = make_world(20, 3);
        let mut sink = ParticleSink::new(params.num_cells);
        let center = topo.center();
        RadiusBurst.distribute(center, Release { virions: 1000, dips: 0 }, &topo, &mut rng, &mut sink);
        let near = topo.ring(center, 1)[0] as usize;
        let far = topo.ring(center, 3)[0] as usize;
        assert!(sink.virions[near] > sink.virions[far]);
    }

    #[test]
    fn random_jump_conserves_and_tallies() {
        let (topo, params, mut rng) = make_world(10, 3);
        let mut sink = ParticleSink::new(params.num_cells);
        RandomJump.distribute(0, Release { virions: 40, dips: 7 }, &topo, &mut rng, &mut sink);
        assert_eq!(delivered(&sink), (40, 7));
        assert_eq!((sink.jumped_virions, sink.jumped_dips), (40, 7));
    }

    #[test]
    fn radius_jump_lands_inside_the_ring() {
        let (topo, params, mut rng) = make_world(30, 3);
        let mut sink = ParticleSink::new(params.num_cells);
        let center = topo.center();
        RadiusJump.distribute(center, Release { virions: 200, dips: 0 }, &topo, &mut rng, &mut sink);
        let targets = topo.jump_targets(center);
        let mut total = 0;
        for cell in 0..params.num_cells {
            if sink.virions[cell] > 0 {
                assert!(targets.contains(&(cell as u32)));
                total += sink.virions[cell];
            }
        }
        assert_eq!(total, 200);
        assert_eq!(sink.jumped_virions, 0);
    }

    #[test]
    fn partition_splits_by_fraction() {
        let (topo, params, mut rng) = make_world(20, 3);
        let mut sink = ParticleSink::new(params.num_cells);
        let partition = Partition { fraction: 0.5, per_event: false, local: CellToCell::new(3) };
        partition.distribute(topo.center(), Release { virions: 51, dips: 10 }, &topo, &mut rng, &mut sink);
        assert_eq!(delivered(&sink), (51, 10));
        assert_eq!((sink.jumped_virions, sink.jumped_dips), (25, 5));
    }

    #[test]
    fn per_event_partition_moves_whole_release() {
        let (topo, params, mut rng) = make_world(20, 3);
        let mut sink = ParticleSink::new(params.num_cells);
        let partition = Partition { fraction: 1.0, per_event: true, local: CellToCell::new(3) };
        partition.distribute(topo.center(), Release { virions: 50, dips: 0 }, &topo, &mut rng, &mut sink);
        assert_eq!(sink.jumped_virions, 50);
    }

    #[test]
    fn floor_shares_never_overshoot() {
        let shares = floor_shares(10, &[1.0, 1.0, 1.0]);
        assert_eq!(shares, vec![3, 3, 3]);
        assert_eq!(floor_shares(5, &[0.0, 0.0]), vec![0, 0]);
    }
}
