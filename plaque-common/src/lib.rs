pub mod cell_state;
pub mod config;
pub mod sim_params;
pub mod snapshot;

// Re-export key types for easier use by dependent crates
pub use cell_state::CellState;
pub use config::{
    ContinuousConfig, DecayConfig, IfnConfig, IfnPolicy, InfectionConfig, InitialConditions,
    InitialPlacement, LatticeConfig, OutputConfig, OutputFormat, RegrowthConfig, RegrowthRule,
    RemovalConfig, SimulationConfig, SpreadConfig, SpreadPolicy, TimingConfig, VirionBurstMode,
};
pub use sim_params::SimParams;
pub use snapshot::{LatticeSnapshot, TickMetrics};
