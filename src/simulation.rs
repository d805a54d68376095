use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use log::{debug, info, trace};
use plaque_common::{
    CellState, IfnPolicy, InitialPlacement, LatticeSnapshot, SimParams, SimulationConfig, TickMetrics,
};
use rand::prelude::*;
use rayon::prelude::*;

use crate::antiviral::resolve_antiviral;
use crate::distribution::{build_distributor, floor_shares, ParticleDistributor};
use crate::grid::HexTopology;
use crate::ifn::{build_ifn_model, update_field, IfnModel};
use crate::infection::{aggregate_probability, per_particle_chances, resolve_coinfections, resolve_new_infections};
use crate::lattice::Lattice;
use crate::metrics::{self, RunCounters};
use crate::particles::ParticleKind;
use crate::production::{
    advance_infected_cells, build_production_model, clear_dip_only_cells, LysisTallies, ProductionContext,
    ProductionModel,
};
use crate::regrowth::resolve_regrowth;
use crate::sampling::SimRng;

/// Owns the lattice and runs the fixed per-tick phase sequence.
///
/// Every phase reads the snapshot taken at the start of the tick; transitions and
/// released particles land in next-tick buffers that are committed together, so the
/// outcome does not depend on the order cells are visited in. All randomness comes
/// from one seeded generator consumed in row-major order.
pub struct Simulation {
    config: SimulationConfig,
    params: SimParams,
    seed: u64,
    topology: HexTopology,
    lattice: Lattice,
    ifn: Box<dyn IfnModel>,
    distributor: Box<dyn ParticleDistributor>,
    production: Box<dyn ProductionModel>,
    rng: SimRng,
    /// Completed ticks (hours).
    current_tick: u32,
    lysis: LysisTallies,
    antiviral_entries: u64,
    max_global_ifn: f64,
    recorded_snapshots: Vec<LatticeSnapshot>,
}

impl Simulation {
    /// Validates the configuration, builds every neighbourhood and places the
    /// initial infection.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        let params = config.get_sim_params();

        let seed = match config.initial_conditions.seed {
            Some(seed) => seed,
            None => {
                let seed: u64 = rand::random();
                info!("No seed configured; using {} (set initial_conditions.seed to reproduce).", seed);
                seed
            }
        };
        let mut rng = SimRng::seed_from_u64(seed);

        let topology = HexTopology::new(&params, params.ifn_policy == IfnPolicy::Local, &mut rng);
        let mut lattice = Lattice::new(&params);
        place_initial_infection(&config, &params, &topology, &mut lattice, &mut rng)?;

        let ifn = build_ifn_model(&params);
        let distributor = build_distributor(&params);
        let production = build_production_model(&params);

        Ok(Self {
            config,
            params,
            seed,
            topology,
            lattice,
            ifn,
            distributor,
            production,
            rng,
            current_tick: 0,
            lysis: LysisTallies::default(),
            antiviral_entries: 0,
            max_global_ifn: 0.0,
            recorded_snapshots: Vec::new(),
        })
    }

    /// Advances the simulation by one tick (one hour) and returns that tick's metrics.
    pub fn step(&mut self) -> TickMetrics {
        self.lattice.begin_tick();

        // --- 1. Interferon production, decay and regional averages ---
        update_field(self.ifn.as_mut(), &self.lattice, &self.params, &self.topology);

        // --- 2. New infections ---
        let infected = resolve_new_infections(&mut self.lattice, self.ifn.as_ref(), &self.params, &mut self.rng);

        // --- 3. Antiviral entry ---
        let protected = resolve_antiviral(&mut self.lattice, self.ifn.as_ref(), &self.params, &mut self.rng);
        self.antiviral_entries += protected as u64;

        // --- 4. Infection clocks, lysis and production, then co-infection ---
        let dead_before = self.lysis.dead_from_virion + self.lysis.dead_from_both;
        {
            let mut ctx = ProductionContext {
                topology: &self.topology,
                distributor: self.distributor.as_ref(),
                params: &self.params,
                rng: &mut self.rng,
                tallies: &mut self.lysis,
            };
            advance_infected_cells(&mut self.lattice, self.production.as_ref(), &mut ctx);
        }
        let lysed = self.lysis.dead_from_virion + self.lysis.dead_from_both - dead_before;
        let upgraded = resolve_coinfections(&mut self.lattice, self.ifn.as_ref(), &self.params, &mut self.rng);

        // --- 5. Regrowth ---
        let regrown = resolve_regrowth(&mut self.lattice, &self.topology, &self.params, &mut self.rng);

        // --- 6. Commit: states, particles, decay, clearing ---
        let released = self.lattice.particles.incoming.pending();
        let cleared = self.commit();

        // --- 7. Advance clock ---
        self.current_tick += 1;
        self.max_global_ifn = self.max_global_ifn.max(self.ifn.total());

        trace!(
            "Tick {}: {} infected, {} upgraded, {} lysed, {} antiviral, {} regrown, {} DIP-cleared, {} particles released.",
            self.current_tick, infected, upgraded, lysed, protected, regrown, cleared, released
        );
        self.metrics()
    }

    /// Publishes this tick's transitions and releases. Returns the number of
    /// DIP-only cells cleared.
    fn commit(&mut self) -> u32 {
        self.lattice.commit_states();

        let particles = &mut self.lattice.particles;
        particles.merge_incoming();
        particles.decay(
            SimParams::decay_factor(self.params.virion_half_life),
            SimParams::decay_factor(self.params.dip_half_life),
        );
        particles.clear_dead(&self.lattice.state);

        let cleared = clear_dip_only_cells(&mut self.lattice);
        self.lattice.advance_elapsed();

        if self.params.removal_tick == Some(self.current_tick + 1) {
            self.remove_particles_below_threshold();
        }
        cleared
    }

    /// Particle-removal experiment: strips particles wherever regional interferon is
    /// below the configured threshold. Cell states are untouched.
    fn remove_particles_below_threshold(&mut self) {
        let ifn = self.ifn.as_ref();
        let threshold = self.params.removal_ifn_threshold;
        let (virions, dips) = self
            .lattice
            .particles
            .remove_where(self.params.removal_includes_dips, |cell| ifn.regional_average(cell) < threshold);
        info!(
            "Removal experiment at tick {}: removed {} virions and {} DIPs below IFN {}.",
            self.current_tick + 1,
            virions,
            dips,
            threshold
        );
    }

    /// Runs until the configured horizon.
    pub fn run(&mut self) -> Vec<TickMetrics> {
        self.run_with_cancel(&AtomicBool::new(false))
    }

    /// Runs until the horizon or until `cancel` is raised; checked between ticks.
    pub fn run_with_cancel(&mut self, cancel: &AtomicBool) -> Vec<TickMetrics> {
        let remaining = self.params.total_ticks.saturating_sub(self.current_tick) as usize;
        let mut rows = Vec::with_capacity(remaining);
        while self.current_tick < self.params.total_ticks {
            if cancel.load(Ordering::Relaxed) {
                info!("Run cancelled after tick {}.", self.current_tick);
                break;
            }
            rows.push(self.step());
        }
        rows
    }

    /// Aggregate outputs of the committed state.
    pub fn metrics(&self) -> TickMetrics {
        metrics::collect(
            &self.lattice,
            self.ifn.as_ref(),
            RunCounters {
                tick: self.current_tick,
                max_global_ifn: self.max_global_ifn,
                antiviral_entries: self.antiviral_entries,
                lysis: &self.lysis,
            },
        )
    }

    /// Per-cell copy of the committed state.
    pub fn snapshot(&self) -> LatticeSnapshot {
        let ifn = self.ifn.as_ref();
        LatticeSnapshot {
            tick: self.current_tick,
            size: self.params.size,
            states: self.lattice.state.iter().map(|s| s.code()).collect(),
            continuous: self.lattice.continuous.clone(),
            virions: self.lattice.particles.virions.clone(),
            dips: self.lattice.particles.dips.clone(),
            ifn: (0..self.lattice.num_cells)
                .into_par_iter()
                .map(|cell| ifn.concentration(cell) as f32)
                .collect(),
        }
    }

    /// Records a snapshot of the current tick.
    pub fn record_snapshot(&mut self) {
        let snapshot = self.snapshot();
        debug!("Recorded snapshot at tick {}.", snapshot.tick);
        self.recorded_snapshots.push(snapshot);
    }

    /// Provides access to the recorded snapshots.
    pub fn get_recorded_snapshots(&self) -> &[LatticeSnapshot] {
        &self.recorded_snapshots
    }

    /// Probabilities that `cell` would be infected by its current virions and DIPs.
    pub fn infection_probability(&self, cell: usize) -> (f64, f64) {
        let chances = per_particle_chances(&self.params, self.ifn.regional_average(cell));
        (
            aggregate_probability(chances.virion, self.lattice.particles.count(ParticleKind::Virion, cell)),
            aggregate_probability(chances.dip, self.lattice.particles.count(ParticleKind::Dip, cell)),
        )
    }

    pub fn params(&self) -> &SimParams { &self.params }

    pub fn config(&self) -> &SimulationConfig { &self.config }

    pub fn seed(&self) -> u64 { self.seed }

    pub fn current_tick(&self) -> u32 { self.current_tick }

    pub fn lattice(&self) -> &Lattice { &self.lattice }

    pub fn topology(&self) -> &HexTopology { &self.topology }

    pub fn ifn(&self) -> &dyn IfnModel { self.ifn.as_ref() }
}

/// Places the initial particles and infected cells. The centre cell is (N/2, N/2).
fn place_initial_infection(
    config: &SimulationConfig,
    params: &SimParams,
    topology: &HexTopology,
    lattice: &mut Lattice,
    rng: &mut SimRng,
) -> Result<()> {
    let initial = &config.initial_conditions;
    let virions = initial.virions;
    let dips = if params.dip_enabled { initial.dips } else { 0 };
    let center = topology.center();

    lattice.begin_tick();
    match initial.placement {
        InitialPlacement::SingleCell => {
            lattice.particles.seed(ParticleKind::Virion, center, virions);
            lattice.particles.seed(ParticleKind::Dip, center, dips);
        }
        InitialPlacement::InfectedCell => {
            let state = match (virions > 0, dips > 0) {
                (true, true) => CellState::InfectedBoth,
                (true, false) => CellState::InfectedVirion,
                (false, true) => CellState::InfectedDip,
                (false, false) => anyhow::bail!("infected_cell placement needs at least one initial particle."),
            };
            lattice.infect(center, state, (virions, dips), params, rng);
            lattice.particles.seed(ParticleKind::Virion, center, virions);
            lattice.particles.seed(ParticleKind::Dip, center, dips);
        }
        InitialPlacement::RandomScatter => {
            for (kind, count) in [(ParticleKind::Virion, virions), (ParticleKind::Dip, dips)] {
                for _ in 0..count {
                    let cell = rng.random_range(0..params.num_cells);
                    lattice.particles.seed(kind, cell, 1);
                }
            }
        }
        InitialPlacement::Hotspot => {
            lattice.infect(center, CellState::InfectedVirion, (virions.max(1), 0), params, rng);
            lattice.particles.seed(ParticleKind::Virion, center, virions);
            if params.dip_enabled {
                place_dip_hotspot(center, dips, topology, lattice, rng);
            }
        }
    }
    lattice.commit_states();

    info!(
        "Initial placement {:?}: {} virions, {} DIPs around cell {:?}.",
        initial.placement,
        virions,
        dips,
        topology.coords(center)
    );
    Ok(())
}

/// Spreads DIPs around a hotspot picked uniformly from the centre's burst area, with
/// weight 1/(d + 0.1) over the hotspot and its rings. Zero `dips` means 20 to 30.
fn place_dip_hotspot(
    center: usize,
    dips: u32,
    topology: &HexTopology,
    lattice: &mut Lattice,
    rng: &mut SimRng,
) {
    let candidates = topology.burst_area(center);
    let hotspot = if candidates.is_empty() {
        center
    } else {
        candidates[rng.random_range(0..candidates.len())].index as usize
    };
    let count = if dips > 0 { dips } else { rng.random_range(20..=30) };

    let mut area: Vec<(usize, u32)> = vec![(hotspot, 0)];
    area.extend(topology.burst_area(hotspot).iter().map(|n| (n.index as usize, n.distance)));
    let weights: Vec<f64> = area.iter().map(|&(_, d)| 1.0 / (d as f64 + 0.1)).collect();
    let shares = floor_shares(count, &weights);
    let mut placed = 0;
    for (&(cell, _), share) in area.iter().zip(shares) {
        lattice.particles.seed(ParticleKind::Dip, cell, share);
        placed += share;
    }
    let mut order: Vec<usize> = area.iter().map(|&(cell, _)| cell).collect();
    order.shuffle(rng);
    for k in 0..(count - placed) as usize {
        lattice.particles.seed(ParticleKind::Dip, order[k % order.len()], 1);
    }
    debug!("DIP hotspot at {:?} holds {} DIPs over {} cells.", topology.coords(hotspot), count, area.len());
}
