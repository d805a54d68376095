use std::ops::Sub;

// Cube coordinates of a hex cell. Invariant: q + r + s == 0.
#[derive(Copy, Clone, Default, Debug, PartialEq, Eq, Hash)]
pub struct Cube {
    pub q: i64,
    pub r: i64,
    pub s: i64,
}

impl Cube {
    #[inline(always)]
    pub fn new(q: i64, r: i64) -> Self { Self { q, r, s: -q - r } }

    /// Converts lattice offset coordinates (row `i`, column `j`); `i` is the axis whose
    /// parity shifts neighbouring rows.
    #[inline(always)]
    pub fn from_offset(i: i64, j: i64) -> Self {
        Self::new(i, j - (i + (i & 1)) / 2)
    }

    /// Hex steps from the origin.
    #[inline(always)]
    pub fn length(self) -> u32 {
        self.q.abs().max(self.r.abs()).max(self.s.abs()) as u32
    }

    #[inline(always)]
    pub fn distance(self, other: Self) -> u32 { (self - other).length() }
}

impl Sub for Cube {
    type Output = Cube;
    #[inline(always)]
    fn sub(self, other: Self) -> Self { Self::new(self.q - other.q, self.r - other.r) }
}

/// Hex distance between two cells given in offset coordinates.
#[inline(always)]
pub fn offset_distance(a: (i64, i64), b: (i64, i64)) -> u32 {
    Cube::from_offset(a.0, a.1).distance(Cube::from_offset(b.0, b.1))
}

#[inline(always)]
pub fn euclidean_distance_sq(dx: i64, dy: i64) -> i64 { dx * dx + dy * dy }
