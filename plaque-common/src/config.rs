use serde::{Deserialize, Serialize};
use anyhow::Result;
use crate::sim_params::SimParams;
use std::path::Path;

// Lattice geometry and neighbourhood radii
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct LatticeConfig {
    /// Cells per side of the square lattice.
    #[serde(default = "default_size")]
    pub size: u32,
    /// Hex radius of the burst area (rings 1..=burst_radius).
    #[serde(default = "default_burst_radius")]
    pub burst_radius: u32,
    /// Euclidean radius of the interferon neighbourhood in local mode.
    #[serde(default = "default_ifn_radius")]
    pub ifn_radius: u32,
    /// Euclidean radius of the fixed-radius jump ring.
    #[serde(default = "default_jump_radius")]
    pub jump_radius: u32,
}

// One tick is one hour of simulated time.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct TimingConfig {
    #[serde(default = "default_total_ticks")]
    pub total_ticks: u32,
    #[serde(default = "default_record_interval")]
    pub record_interval_ticks: u32,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InitialPlacement {
    /// Particles placed on the centre cell, which stays susceptible.
    SingleCell,
    /// Centre cell starts infected and carries the particles.
    InfectedCell,
    /// Every particle lands on an independently uniform cell.
    RandomScatter,
    /// Virion-infected centre plus a distance-weighted DIP hotspot nearby.
    Hotspot,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct InitialConditions {
    #[serde(default = "default_placement")]
    pub placement: InitialPlacement,
    #[serde(default = "default_initial_virions")]
    pub virions: u32,
    #[serde(default)]
    pub dips: u32,
    /// Seed for the single simulation RNG. Absent means "pick one and log it".
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VirionBurstMode {
    /// Virion-only cells release virions alone.
    #[serde(alias = "virionOnly")]
    VirionOnly,
    /// Virion-only cells also release DIPs.
    Both,
}

// Per-particle infection, lysis and burst parameters
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct InfectionConfig {
    #[serde(default = "default_rho")]
    pub rho: f64,
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    #[serde(default = "default_mean_lysis_time")]
    pub mean_lysis_time: f64,
    #[serde(default = "default_burst_size_v")]
    pub burst_size_v: u32,
    #[serde(default = "default_burst_size_d")]
    pub burst_size_d: u32,
    #[serde(default = "default_true")]
    pub dip_enabled: bool,
    #[serde(default = "default_virion_burst_mode")]
    pub virion_burst_mode: VirionBurstMode,
    #[serde(default = "default_dip_clearance_mean")]
    pub dip_clearance_mean: f64,
    #[serde(default = "default_dip_clearance_std")]
    pub dip_clearance_std: f64,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpreadPolicy {
    /// Rings 1..3 with fixed per-ring weights.
    #[serde(alias = "celltocell")]
    CellToCell,
    /// Burst area with 1/d^1.5 weights, exact conservation.
    RadiusBurst,
    /// Each particle lands on a uniformly random lattice cell.
    #[serde(alias = "jumprandomly")]
    JumpRandomly,
    /// Each particle lands on a uniform cell of the jump ring.
    #[serde(alias = "jumpradius")]
    JumpRadius,
    /// A fraction jumps randomly, the rest spreads cell-to-cell.
    Partition,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SpreadConfig {
    #[serde(default = "default_spread_policy")]
    pub policy: SpreadPolicy,
    /// Fraction of each release that jumps under the partition policy.
    #[serde(default = "default_partition_fraction")]
    pub partition_fraction: f64,
    /// Partition per lysis event instead of per particle batch.
    #[serde(default)]
    pub partition_per_event: bool,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IfnPolicy {
    #[serde(alias = "noIFN", alias = "no_ifn")]
    Disabled,
    Global,
    Local,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct IfnConfig {
    #[serde(default = "default_ifn_policy")]
    pub policy: IfnPolicy,
    /// Antiviral response delay (hours).
    #[serde(default = "default_tau")]
    pub tau: f64,
    /// Multiplier on every interferon production rate.
    #[serde(default = "default_one")]
    pub fold: f64,
    #[serde(default = "default_true")]
    pub virions_stimulate: bool,
    #[serde(default = "default_both_multiplier")]
    pub both_multiplier: f64,
    #[serde(default = "default_dip_only_multiplier")]
    pub dip_only_multiplier: f64,
    #[serde(default = "default_dip_only_delay_mean")]
    pub dip_only_delay_mean: f64,
    #[serde(default = "default_one")]
    pub dip_only_delay_std: f64,
}

// Half-lives in hours. Zero disables the corresponding decay.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct DecayConfig {
    #[serde(default = "default_particle_half_life")]
    pub virion_half_life: f64,
    #[serde(default = "default_particle_half_life")]
    pub dip_half_life: f64,
    #[serde(default = "default_ifn_half_life")]
    pub ifn_half_life: f64,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegrowthRule {
    /// Any ring-1 neighbour is susceptible or antiviral.
    NeighborState,
    /// Legacy neighbour elapsed-timer comparison.
    NeighborTimer,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct RegrowthConfig {
    #[serde(default = "default_regrowth_mean")]
    pub mean: f64,
    #[serde(default = "default_regrowth_std")]
    pub std: f64,
    #[serde(default = "default_regrowth_rule")]
    pub rule: RegrowthRule,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ContinuousConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_rate_v")]
    pub rate_v: u32,
    #[serde(default = "default_rate_d")]
    pub rate_d: u32,
    #[serde(default = "default_incubation")]
    pub incubation_period: u32,
    /// Hours after infection at which a producing cell dies. Zero means never.
    #[serde(default = "default_continuous_lysis_time")]
    pub lysis_time: u32,
}

// Particle-removal experiment
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct RemovalConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_removal_tick")]
    pub at_tick: u32,
    #[serde(default = "default_removal_threshold")]
    pub ifn_threshold: f64,
    #[serde(default = "default_true")]
    pub remove_dips: bool,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Json,
    Bincode,
    #[serde(alias = "msgpack")]
    MessagePack,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_base_filename")]
    pub base_filename: String,
    #[serde(default = "default_true")]
    pub save_metrics: bool,
    #[serde(default)]
    pub save_snapshots: bool,
    #[serde(default = "default_output_format")]
    pub format: OutputFormat,
}

// Main simulation configuration structure, loaded from config.toml.
// Every section may be omitted.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct SimulationConfig {
    #[serde(default)]
    pub lattice: LatticeConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub initial_conditions: InitialConditions,
    #[serde(default)]
    pub infection: InfectionConfig,
    #[serde(default)]
    pub spread: SpreadConfig,
    #[serde(default)]
    pub ifn: IfnConfig,
    #[serde(default)]
    pub decay: DecayConfig,
    #[serde(default)]
    pub regrowth: RegrowthConfig,
    #[serde(default)]
    pub continuous: ContinuousConfig,
    #[serde(default)]
    pub removal: RemovalConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl SimulationConfig {
    /// Loads the simulation configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        let config_str = std::fs::read_to_string(path_ref)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path_ref.display(), e))?;
        Self::from_toml_str(&config_str)
            .map_err(|e| anyhow::anyhow!("Invalid config '{}': {}", path_ref.display(), e))
    }

    /// Parses and validates configuration text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: SimulationConfig = toml::from_str(text)
            .map_err(|e| anyhow::anyhow!("Failed to parse TOML: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects parameter combinations the engine cannot run.
    pub fn validate(&self) -> Result<()> {
        if self.lattice.size == 0 {
            anyhow::bail!("lattice.size must be at least 1.");
        }
        if self.lattice.burst_radius == 0 {
            anyhow::bail!("lattice.burst_radius must be at least 1.");
        }
        if self.spread.policy == SpreadPolicy::JumpRadius && self.lattice.jump_radius == 0 {
            anyhow::bail!("lattice.jump_radius must be at least 1 for the jump_radius policy.");
        }
        if !(0.0..=1.0).contains(&self.infection.rho) {
            anyhow::bail!("infection.rho must lie in [0, 1], got {}.", self.infection.rho);
        }
        if self.infection.alpha < 0.0 {
            anyhow::bail!("infection.alpha must be non-negative.");
        }
        if !(self.infection.mean_lysis_time > 0.0) {
            anyhow::bail!("infection.mean_lysis_time must be positive.");
        }
        if self.infection.dip_clearance_std < 0.0 {
            anyhow::bail!("infection.dip_clearance_std must be non-negative.");
        }
        if !(0.0..=1.0).contains(&self.spread.partition_fraction) {
            anyhow::bail!("spread.partition_fraction must lie in [0, 1].");
        }
        if self.ifn.tau < 0.0 || self.ifn.fold < 0.0 {
            anyhow::bail!("ifn.tau and ifn.fold must be non-negative.");
        }
        if self.ifn.both_multiplier < 0.0 || self.ifn.dip_only_multiplier < 0.0 {
            anyhow::bail!("ifn stimulation multipliers must be non-negative.");
        }
        if self.ifn.dip_only_delay_std < 0.0 {
            anyhow::bail!("ifn.dip_only_delay_std must be non-negative.");
        }
        let decay = &self.decay;
        if decay.virion_half_life < 0.0 || decay.dip_half_life < 0.0 || decay.ifn_half_life < 0.0 {
            anyhow::bail!("decay half-lives must be non-negative (0 disables decay).");
        }
        if self.regrowth.std < 0.0 {
            anyhow::bail!("regrowth.std must be non-negative.");
        }
        if self.removal.ifn_threshold < 0.0 {
            anyhow::bail!("removal.ifn_threshold must be non-negative.");
        }
        Ok(())
    }

    /// Converts the configuration into simulation parameters used at runtime.
    pub fn get_sim_params(&self) -> SimParams {
        let ifn_enabled = self.ifn.policy != IfnPolicy::Disabled;

        // Disabling interferon zeroes every IFN coupling at once.
        let (alpha, tau, fold, ifn_half_life) = if ifn_enabled {
            (self.infection.alpha, self.ifn.tau, self.ifn.fold, self.decay.ifn_half_life)
        } else {
            (0.0, 0.0, 0.0, 0.0)
        };

        let baseline_ifn_rate = if self.ifn.virions_stimulate { fold } else { 0.0 };
        let dip_enabled = self.infection.dip_enabled;

        let size = self.lattice.size;
        SimParams {
            // Lattice
            size,
            num_cells: (size as usize) * (size as usize),
            burst_radius: self.lattice.burst_radius,
            ifn_radius: self.lattice.ifn_radius,
            jump_radius: self.lattice.jump_radius,
            total_ticks: self.timing.total_ticks,
            // Infection
            rho: self.infection.rho,
            alpha,
            mean_lysis_time: self.infection.mean_lysis_time,
            std_lysis_time: self.infection.mean_lysis_time / 4.0,
            burst_size_v: self.infection.burst_size_v,
            burst_size_d: if dip_enabled { self.infection.burst_size_d } else { 0 },
            dip_enabled,
            virion_burst_releases_dips: dip_enabled
                && self.infection.virion_burst_mode == VirionBurstMode::Both,
            dip_clearance_mean: self.infection.dip_clearance_mean,
            dip_clearance_std: self.infection.dip_clearance_std,
            // Spread
            spread_policy: self.spread.policy,
            partition_fraction: self.spread.partition_fraction,
            partition_per_event: self.spread.partition_per_event,
            // Interferon
            ifn_policy: self.ifn.policy,
            tau,
            virions_stimulate_ifn: self.ifn.virions_stimulate,
            baseline_ifn_rate,
            both_ifn_rate: baseline_ifn_rate + self.ifn.both_multiplier * fold,
            dip_only_ifn_rate: if dip_enabled {
                baseline_ifn_rate + self.ifn.dip_only_multiplier * fold
            } else {
                0.0
            },
            dip_only_ifn_delay_mean: self.ifn.dip_only_delay_mean,
            dip_only_ifn_delay_std: self.ifn.dip_only_delay_std,
            // Decay
            virion_half_life: self.decay.virion_half_life,
            dip_half_life: self.decay.dip_half_life,
            ifn_half_life,
            // Regrowth
            regrowth_mean: self.regrowth.mean,
            regrowth_std: self.regrowth.std,
            regrowth_rule: self.regrowth.rule,
            // Continuous production
            continuous: self.continuous.enabled,
            continuous_rate_v: self.continuous.rate_v,
            continuous_rate_d: if dip_enabled { self.continuous.rate_d } else { 0 },
            incubation_period: self.continuous.incubation_period,
            continuous_lysis_time: self.continuous.lysis_time,
            // Removal experiment
            removal_tick: self.removal.enabled.then_some(self.removal.at_tick),
            removal_ifn_threshold: self.removal.ifn_threshold,
            removal_includes_dips: self.removal.remove_dips,
        }
    }
}

impl Default for LatticeConfig {
    fn default() -> Self {
        LatticeConfig {
            size: default_size(),
            burst_radius: default_burst_radius(),
            ifn_radius: default_ifn_radius(),
            jump_radius: default_jump_radius(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        TimingConfig {
            total_ticks: default_total_ticks(),
            record_interval_ticks: default_record_interval(),
        }
    }
}

impl Default for InitialConditions {
    fn default() -> Self {
        InitialConditions {
            placement: default_placement(),
            virions: default_initial_virions(),
            dips: 0,
            seed: None,
        }
    }
}

impl Default for InfectionConfig {
    fn default() -> Self {
        InfectionConfig {
            rho: default_rho(),
            alpha: default_alpha(),
            mean_lysis_time: default_mean_lysis_time(),
            burst_size_v: default_burst_size_v(),
            burst_size_d: default_burst_size_d(),
            dip_enabled: true,
            virion_burst_mode: default_virion_burst_mode(),
            dip_clearance_mean: default_dip_clearance_mean(),
            dip_clearance_std: default_dip_clearance_std(),
        }
    }
}

impl Default for SpreadConfig {
    fn default() -> Self {
        SpreadConfig {
            policy: default_spread_policy(),
            partition_fraction: default_partition_fraction(),
            partition_per_event: false,
        }
    }
}

impl Default for IfnConfig {
    fn default() -> Self {
        IfnConfig {
            policy: default_ifn_policy(),
            tau: default_tau(),
            fold: default_one(),
            virions_stimulate: true,
            both_multiplier: default_both_multiplier(),
            dip_only_multiplier: default_dip_only_multiplier(),
            dip_only_delay_mean: default_dip_only_delay_mean(),
            dip_only_delay_std: default_one(),
        }
    }
}

impl Default for DecayConfig {
    fn default() -> Self {
        DecayConfig {
            virion_half_life: default_particle_half_life(),
            dip_half_life: default_particle_half_life(),
            ifn_half_life: default_ifn_half_life(),
        }
    }
}

impl Default for RegrowthConfig {
    fn default() -> Self {
        RegrowthConfig {
            mean: default_regrowth_mean(),
            std: default_regrowth_std(),
            rule: default_regrowth_rule(),
        }
    }
}

impl Default for ContinuousConfig {
    fn default() -> Self {
        ContinuousConfig {
            enabled: false,
            rate_v: default_rate_v(),
            rate_d: default_rate_d(),
            incubation_period: default_incubation(),
            lysis_time: default_continuous_lysis_time(),
        }
    }
}

impl Default for RemovalConfig {
    fn default() -> Self {
        RemovalConfig {
            enabled: false,
            at_tick: default_removal_tick(),
            ifn_threshold: default_removal_threshold(),
            remove_dips: true,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            base_filename: default_base_filename(),
            save_metrics: true,
            save_snapshots: false,
            format: default_output_format(),
        }
    }
}

fn default_size() -> u32 { 50 }
fn default_burst_radius() -> u32 { 3 }
fn default_ifn_radius() -> u32 { 10 }
fn default_jump_radius() -> u32 { 5 }
fn default_total_ticks() -> u32 { 145 }
fn default_record_interval() -> u32 { 1 }
fn default_placement() -> InitialPlacement { InitialPlacement::InfectedCell }
fn default_initial_virions() -> u32 { 1 }
fn default_rho() -> f64 { 0.026 }
fn default_alpha() -> f64 { 1.0 }
fn default_mean_lysis_time() -> f64 { 12.0 }
fn default_burst_size_v() -> u32 { 50 }
fn default_burst_size_d() -> u32 { 100 }
fn default_virion_burst_mode() -> VirionBurstMode { VirionBurstMode::VirionOnly }
fn default_dip_clearance_mean() -> f64 { 2.0 }
fn default_dip_clearance_std() -> f64 { 1.0 }
fn default_spread_policy() -> SpreadPolicy { SpreadPolicy::CellToCell }
fn default_partition_fraction() -> f64 { 0.5 }
fn default_ifn_policy() -> IfnPolicy { IfnPolicy::Local }
fn default_tau() -> f64 { 12.0 }
fn default_one() -> f64 { 1.0 }
fn default_true() -> bool { true }
fn default_both_multiplier() -> f64 { 10.0 }
fn default_dip_only_multiplier() -> f64 { 5.0 }
fn default_dip_only_delay_mean() -> f64 { 5.0 }
fn default_particle_half_life() -> f64 { 3.2 }
fn default_ifn_half_life() -> f64 { 4.0 }
fn default_regrowth_mean() -> f64 { 24.0 }
fn default_regrowth_std() -> f64 { 6.0 }
fn default_regrowth_rule() -> RegrowthRule { RegrowthRule::NeighborState }
fn default_rate_v() -> u32 { 50 }
fn default_rate_d() -> u32 { 25 }
fn default_incubation() -> u32 { 6 }
fn default_continuous_lysis_time() -> u32 { 20 }
fn default_removal_tick() -> u32 { 72 }
fn default_removal_threshold() -> f64 { 0.1 }
fn default_base_filename() -> String { "plaque".to_string() }
fn default_output_format() -> OutputFormat { OutputFormat::Bincode }
