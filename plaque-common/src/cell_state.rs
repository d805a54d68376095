use serde::{Deserialize, Serialize};

/// Core state of a lattice cell. Discriminants are the codes written to snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum CellState {
    #[default]
    Susceptible = 0,
    InfectedVirion = 1,
    Dead = 2,
    Antiviral = 3,
    Regrowth = 4,
    InfectedDip = 5,
    InfectedBoth = 6,
}

impl CellState {
    /// Can be infected and can enter the antiviral state.
    #[inline(always)]
    pub fn is_susceptible_like(self) -> bool {
        matches!(self, CellState::Susceptible | CellState::Regrowth)
    }

    /// Carries replicating wild-type virus and eventually lyses.
    #[inline(always)]
    pub fn is_productive(self) -> bool {
        matches!(self, CellState::InfectedVirion | CellState::InfectedBoth)
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}
