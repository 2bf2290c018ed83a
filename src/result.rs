use std::fmt;

use crate::grid::{CellState, Facing, Grid};

/// The two sticky block materials. Edge-adjacent islands must alternate
/// between them or the flying machines would drag each other along.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Material {
    Slime,
    Honey,
}

/// A placed island: a connected group of 4-12 cells assigned one material,
/// plus the four anchor cells (3-cell stem and a perpendicular corner) that
/// the flying machine latches onto.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Island {
    /// (row, col) coordinates, sorted row-major.
    pub cells: Vec<(usize, usize)>,
    /// The four cells proving the island's L-pattern, sorted row-major.
    pub anchor: [(usize, usize); 4],
    pub material: Material,
}

/// Immutable outcome of solving one face.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolverResult {
    width: usize,
    height: usize,
    facing: Facing,
    placements: ndarray::Array2<Option<Material>>,
    islands: Vec<Island>,
    harvest_covered: usize,
    total_harvest: usize,
    solve_time_ms: u64,
    timed_out: bool,
}

impl SolverResult {
    pub(crate) fn assemble(
        input: &Grid,
        islands: Vec<Island>,
        solve_time_ms: u64,
        timed_out: bool,
    ) -> Self {
        let mut placements =
            ndarray::Array2::from_elem((input.height(), input.width()), None::<Material>);
        let mut harvest_covered = 0;
        for island in &islands {
            for &(row, col) in &island.cells {
                debug_assert!(placements[[row, col]].is_none(), "islands overlap");
                placements[[row, col]] = Some(island.material);
                if input.cell(row, col) == CellState::Harvest {
                    harvest_covered += 1;
                }
            }
        }

        Self {
            width: input.width(),
            height: input.height(),
            facing: input.facing(),
            placements,
            islands,
            harvest_covered,
            total_harvest: input.harvest_count(),
            solve_time_ms,
            timed_out,
        }
    }

    pub(crate) fn empty(input: &Grid) -> Self {
        Self::assemble(input, Vec::new(), 0, false)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn facing(&self) -> Facing {
        self.facing
    }

    pub fn placement(&self, row: usize, col: usize) -> Option<Material> {
        self.placements[[row, col]]
    }

    pub fn islands(&self) -> &[Island] {
        &self.islands
    }

    pub fn harvest_covered(&self) -> usize {
        self.harvest_covered
    }

    pub fn total_harvest(&self) -> usize {
        self.total_harvest
    }

    pub fn coverage_percent(&self) -> f32 {
        if self.total_harvest == 0 {
            return 100.0;
        }
        100.0 * self.harvest_covered as f32 / self.total_harvest as f32
    }

    /// Number of sticky blocks the caller will have to place.
    pub fn block_count(&self) -> usize {
        self.placements.iter().filter(|p| p.is_some()).count()
    }

    pub fn solve_time_ms(&self) -> u64 {
        self.solve_time_ms
    }

    pub fn timed_out(&self) -> bool {
        self.timed_out
    }
}

impl fmt::Display for SolverResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SolverResult[{}x{}, facing={:?}, coverage={:.1}% ({}/{}), blocks={}, time={}ms{}]",
            self.width,
            self.height,
            self.facing,
            self.coverage_percent(),
            self.harvest_covered,
            self.total_harvest,
            self.block_count(),
            self.solve_time_ms,
            if self.timed_out { ", TIMED OUT" } else { "" }
        )
    }
}
