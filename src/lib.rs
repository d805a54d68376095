//! Stochastic plaque-growth engine: virus and defective interfering particle (DIP)
//! co-infection on a hexagonal cell lattice with an interferon antiviral response.

pub mod antiviral;
pub mod distribution;
pub mod grid;
pub mod hexmath;
pub mod ifn;
pub mod infection;
pub mod lattice;
pub mod metrics;
pub mod particles;
pub mod production;
pub mod regrowth;
pub mod sampling;
pub mod simulation;

pub use grid::HexTopology;
pub use lattice::Lattice;
pub use simulation::Simulation;

pub use plaque_common::{CellState, LatticeSnapshot, SimParams, SimulationConfig, TickMetrics};
