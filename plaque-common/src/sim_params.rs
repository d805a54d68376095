use serde::{Deserialize, Serialize};
use crate::config::{IfnPolicy, RegrowthRule, SpreadPolicy};

/// Immutable parameters resolved from the configuration and shared by every engine component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimParams {
    // Lattice
    pub size: u32,
    pub num_cells: usize,
    pub burst_radius: u32,
    pub ifn_radius: u32,
    pub jump_radius: u32,
    pub total_ticks: u32,

    // Infection & lysis
    pub rho: f64,
    pub alpha: f64,
    pub mean_lysis_time: f64,
    pub std_lysis_time: f64,
    pub burst_size_v: u32,
    pub burst_size_d: u32, // 0 when DIPs are disabled
    pub dip_enabled: bool,
    pub virion_burst_releases_dips: bool,
    pub dip_clearance_mean: f64,
    pub dip_clearance_std: f64,

    // Spread
    pub spread_policy: SpreadPolicy,
    pub partition_fraction: f64,
    pub partition_per_event: bool,

    // Interferon
    pub ifn_policy: IfnPolicy,
    pub tau: f64,
    pub virions_stimulate_ifn: bool,
    /// Baseline per-tick production R of a virion-infected cell.
    pub baseline_ifn_rate: f64,
    pub both_ifn_rate: f64,
    pub dip_only_ifn_rate: f64,
    pub dip_only_ifn_delay_mean: f64,
    pub dip_only_ifn_delay_std: f64,

    // Decay (hours, 0 = off)
    pub virion_half_life: f64,
    pub dip_half_life: f64,
    pub ifn_half_life: f64,

    // Regrowth
    pub regrowth_mean: f64,
    pub regrowth_std: f64,
    pub regrowth_rule: RegrowthRule,

    // Continuous production
    pub continuous: bool,
    pub continuous_rate_v: u32,
    pub continuous_rate_d: u32,
    pub incubation_period: u32,
    pub continuous_lysis_time: u32,

    // Particle-removal experiment
    pub removal_tick: Option<u32>,
    pub removal_ifn_threshold: f64,
    pub removal_includes_dips: bool,
}

impl SimParams {
    /// True when interferon neither accumulates nor gates infection.
    pub fn ifn_inert(&self) -> bool {
        self.ifn_policy == IfnPolicy::Disabled || self.tau == 0.0
    }

    /// Per-tick multiplicative decay factor for a half-life in hours, `None` when decay is off.
    pub fn decay_factor(half_life: f64) -> Option<f64> {
        (half_life > 0.0).then(|| 0.5f64.powf(1.0 / half_life))
    }
}
