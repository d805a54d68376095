use std::borrow::Cow;

use plaque_common::SimParams;
use rand::seq::SliceRandom;

use crate::hexmath::{euclidean_distance_sq, offset_distance};
use crate::sampling::SimRng;

/// Rings up to this radius are precomputed for every cell.
pub const PRECOMPUTED_RINGS: u32 = 10;

/// A burst-area member with its hex distance from the source cell.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Neighbor {
    pub index: u32,
    pub distance: u32,
}

/// Precomputed neighbourhoods of the bounded (non-wrapping) hex lattice.
///
/// Cells are indexed row-major, `index = i * size + j`. Hex rings and the burst area use
/// hex distance; the interferon area and the jump ring use Euclidean distance on the
/// offset coordinates, so the two metrics disagree near the rim of a neighbourhood.
#[derive(Debug)]
pub struct HexTopology {
    size: u32,
    num_cells: usize,
    // rings[cell * PRECOMPUTED_RINGS + (r - 1)]
    rings: Vec<Vec<u32>>,
    burst_area: Vec<Vec<Neighbor>>,
    ifn_area: Vec<Vec<u32>>,
    jump_offsets: Vec<(i32, i32)>,
}

impl HexTopology {
    /// Builds every neighbourhood for the lattice described by `params`.
    /// The jump-ring offsets are shuffled once with `rng`.
    pub fn new(params: &SimParams, with_ifn_area: bool, rng: &mut SimRng) -> Self {
        let size = params.size;
        let num_cells = params.num_cells;

        let mut rings = Vec::with_capacity(num_cells * PRECOMPUTED_RINGS as usize);
        for cell in 0..num_cells {
            for radius in 1..=PRECOMPUTED_RINGS {
                rings.push(compute_ring(size, cell, radius));
            }
        }

        let mut topology = Self {
            size,
            num_cells,
            rings,
            burst_area: Vec::new(),
            ifn_area: Vec::new(),
            jump_offsets: Vec::new(),
        };

        topology.burst_area = (0..num_cells)
            .map(|cell| topology.collect_burst_area(cell, params.burst_radius))
            .collect();

        if with_ifn_area {
            let offsets = disk_offsets(params.ifn_radius);
            topology.ifn_area = (0..num_cells)
                .map(|cell| topology.translate(cell, &offsets).collect())
                .collect();
        }

        let mut jump_offsets = disk_offsets(params.jump_radius);
        jump_offsets.shuffle(rng);
        topology.jump_offsets = jump_offsets;

        log::debug!(
            "Hex topology built: {}x{} cells, burst radius {}, ifn area {}, {} jump offsets.",
            size,
            size,
            params.burst_radius,
            if with_ifn_area { params.ifn_radius.to_string() } else { "off".to_string() },
            topology.jump_offsets.len()
        );
        topology
    }

    #[inline(always)]
    pub fn size(&self) -> u32 { self.size }

    #[inline(always)]
    pub fn num_cells(&self) -> usize { self.num_cells }

    #[inline(always)]
    pub fn index(&self, i: u32, j: u32) -> usize { (i * self.size + j) as usize }

    #[inline(always)]
    pub fn coords(&self, cell: usize) -> (u32, u32) {
        (cell as u32 / self.size, cell as u32 % self.size)
    }

    pub fn center(&self) -> usize { self.index(self.size / 2, self.size / 2) }

    /// Hex distance between two cells.
    pub fn distance(&self, a: usize, b: usize) -> u32 {
        let (ai, aj) = self.coords(a);
        let (bi, bj) = self.coords(b);
        offset_distance((ai as i64, aj as i64), (bi as i64, bj as i64))
    }

    /// In-bounds cells at exactly hex distance `radius`. Radii beyond the precomputed
    /// range are generated on demand.
    pub fn ring(&self, cell: usize, radius: u32) -> Cow<'_, [u32]> {
        match radius {
            0 => Cow::Owned(vec![cell as u32]),
            r if r <= PRECOMPUTED_RINGS => {
                Cow::Borrowed(self.rings[cell * PRECOMPUTED_RINGS as usize + (r - 1) as usize].as_slice())
            }
            r => Cow::Owned(compute_ring(self.size, cell, r)),
        }
    }

    /// Rings 1..=burst radius of `cell`, nearest first.
    #[inline(always)]
    pub fn burst_area(&self, cell: usize) -> &[Neighbor] { &self.burst_area[cell] }

    /// Euclidean disk of the interferon radius around `cell`, including the cell itself.
    /// Empty when the local interferon model is not in use.
    #[inline(always)]
    pub fn ifn_area(&self, cell: usize) -> &[u32] {
        self.ifn_area.get(cell).map(Vec::as_slice).unwrap_or(&[])
    }

    /// In-bounds targets of the shuffled jump ring translated to `cell`.
    pub fn jump_targets(&self, cell: usize) -> Vec<u32> {
        self.translate(cell, &self.jump_offsets).collect()
    }

    /// Calls `f` for each in-bounds ring-1 neighbour until it returns `false`.
    #[inline(always)]
    pub fn for_each_neighbor<F>(&self, cell: usize, mut f: F)
    where
        F: FnMut(usize) -> bool,
    {
        for &n in self.ring(cell, 1).iter() {
            if !f(n as usize) {
                return;
            }
        }
    }

    /// Returns the first ring-1 neighbour satisfying `f`.
    #[inline(always)]
    pub fn find_first_neighbor<F>(&self, cell: usize, mut f: F) -> Option<usize>
    where
        F: FnMut(usize) -> bool,
    {
        self.ring(cell, 1).iter().map(|&n| n as usize).find(|&n| f(n))
    }

    fn collect_burst_area(&self, cell: usize, burst_radius: u32) -> Vec<Neighbor> {
        (1..=burst_radius)
            .flat_map(|radius| {
                self.ring(cell, radius)
                    .iter()
                    .map(|&index| Neighbor { index, distance: radius })
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    fn translate<'a>(&'a self, cell: usize, offsets: &'a [(i32, i32)]) -> impl Iterator<Item = u32> + 'a {
        let (ci, cj) = self.coords(cell);
        let size = self.size as i64;
        offsets.iter().filter_map(move |&(di, dj)| {
            let i = ci as i64 + di as i64;
            let j = cj as i64 + dj as i64;
            (i >= 0 && i < size && j >= 0 && j < size).then(|| (i * size + j) as u32)
        })
    }
}

fn compute_ring(size: u32, cell: usize, radius: u32) -> Vec<u32> {
    let size_i = size as i64;
    let ci = (cell as u32 / size) as i64;
    let cj = (cell as u32 % size) as i64;
    let r = radius as i64;
    let mut ring = Vec::with_capacity(6 * radius as usize);
    for i in (ci - r).max(0)..=(ci + r).min(size_i - 1) {
        for j in (cj - r).max(0)..=(cj + r).min(size_i - 1) {
            if offset_distance((ci, cj), (i, j)) == radius {
                ring.push((i * size_i + j) as u32);
            }
        }
    }
    ring
}

/// Offsets with `di^2 + dj^2 <= radius^2`, row-major, origin included.
fn disk_offsets(radius: u32) -> Vec<(i32, i32)> {
    let r = radius as i32;
    let limit = (r as i64) * (r as i64);
    let mut offsets = Vec::new();
    for di in -r..=r {
        for dj in -r..=r {
            if euclidean_distance_sq(di as i64, dj as i64) <= limit {
                offsets.push((di, dj));
            }
        }
    }
    offsets
}
