//! Island-placement search for a single face.
//!
//! Finds a set of "islands" (connected groups of 4-12 sticky blocks, each
//! containing an L-shaped anchor for the flying machine) covering as many
//! harvest cells as possible. Constraints:
//! - islands cannot overlap or cover blocked cells
//! - edge-adjacent islands must use different materials
//! - anchors of different islands must never be edge-adjacent
//!
//! Maximizes `harvest_covered - island_count * island_cost` under a
//! wall-clock deadline; the search is an anytime algorithm and returns the
//! best solution found so far when the deadline hits.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::grid::{CellState, Grid};
use crate::result::{Island, Material, SolverResult};

pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;
// Below 1.0, islands covering only a single harvest cell would still look
// "profitable".
pub const MIN_ISLAND_COST: f64 = 1.0;
// Above 12.0 (the maximum island size), even a fully productive island would
// be penalized out of existence.
pub const MAX_ISLAND_COST: f64 = 12.0;

const MIN_ISLAND_SIZE: usize = 4;
const MAX_ISLAND_SIZE: usize = 12;
const MAX_SHAPES_PER_TARGET: usize = 1000;

const DIRECTIONS: [(isize, isize); 4] = [(0, 1), (0, -1), (1, 0), (-1, 0)];

/// Tunables for one solve call.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolverConfig {
    timeout_ms: u64,
    island_cost: f64,
}

impl SolverConfig {
    /// The island cost is clamped to `[MIN_ISLAND_COST, MAX_ISLAND_COST]`.
    pub fn new(timeout_ms: u64, island_cost: f64) -> Self {
        Self {
            timeout_ms,
            island_cost: island_cost.clamp(MIN_ISLAND_COST, MAX_ISLAND_COST),
        }
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    pub fn island_cost(&self) -> f64 {
        self.island_cost
    }
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT_MS, MIN_ISLAND_COST)
    }
}

/// Bitmask over the flattened grid, for O(1) overlap tests between a
/// candidate shape and the cells already claimed by placed islands.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CellMask {
    bits: Vec<u64>,
}

impl CellMask {
    fn new(len: usize) -> Self {
        Self {
            bits: vec![0; (len + 63) / 64],
        }
    }

    fn set(&mut self, idx: usize) {
        self.bits[idx / 64] |= 1 << (idx % 64);
    }

    fn get(&self, idx: usize) -> bool {
        self.bits[idx / 64] >> (idx % 64) & 1 != 0
    }

    fn intersects(&self, other: &Self) -> bool {
        self.bits.iter().zip(&other.bits).any(|(a, b)| a & b != 0)
    }

    fn union_with(&mut self, other: &Self) {
        for (a, b) in self.bits.iter_mut().zip(&other.bits) {
            *a |= b;
        }
    }
}

/// An unplaced candidate island. Cells are flattened `row * cols + col`
/// indices, kept sorted so the sorted vector doubles as the global
/// deduplication key and supports binary-search membership tests.
#[derive(Debug)]
struct Shape {
    cells: Vec<usize>,
    mask: CellMask,
    /// The 4 cells (stem + corner) proving the L-pattern, sorted.
    anchor: [usize; 4],
    harvest_covered: usize,
}

fn step(
    r: usize,
    c: usize,
    dr: isize,
    dc: isize,
    rows: usize,
    cols: usize,
) -> Option<(usize, usize)> {
    let nr = r as isize + dr;
    let nc = c as isize + dc;
    (nr >= 0 && nr < rows as isize && nc >= 0 && nc < cols as isize)
        .then(|| (nr as usize, nc as usize))
}

fn contains(cells: &[usize], idx: usize) -> bool {
    cells.binary_search(&idx).is_ok()
}

/// Looks for an L-pattern: three collinear cells (a stem) plus one cell
/// perpendicular to either stem end (a corner). Returns the first anchor
/// found, scanning cells in sorted order so the choice is deterministic.
fn find_anchor(cells: &[usize], rows: usize, cols: usize) -> Option<[usize; 4]> {
    for &p in cells {
        let (r, c) = (p / cols, p % cols);
        for (dr, dc) in [(0isize, 1isize), (1, 0)] {
            let (Some(prev), Some(next)) =
                (step(r, c, -dr, -dc, rows, cols), step(r, c, dr, dc, rows, cols))
            else {
                continue;
            };
            let prev_idx = prev.0 * cols + prev.1;
            let next_idx = next.0 * cols + next.1;
            if !contains(cells, prev_idx) || !contains(cells, next_idx) {
                continue;
            }
            // Stem found; look for a corner off either end, perpendicular to
            // the stem axis.
            let (qr, qc) = (dc, dr);
            for (er, ec) in [prev, next] {
                for (sr, sc) in [(qr, qc), (-qr, -qc)] {
                    if let Some((cr, cc)) = step(er, ec, sr, sc, rows, cols) {
                        let corner = cr * cols + cc;
                        if contains(cells, corner) {
                            let mut anchor = [prev_idx, p, next_idx, corner];
                            anchor.sort_unstable();
                            return Some(anchor);
                        }
                    }
                }
            }
        }
    }
    None
}

fn cells_adjacent(a: &[usize], b: &[usize], rows: usize, cols: usize) -> bool {
    for &p in a {
        let (r, c) = (p / cols, p % cols);
        for (dr, dc) in DIRECTIONS {
            if let Some((nr, nc)) = step(r, c, dr, dc, rows, cols) {
                if contains(b, nr * cols + nc) {
                    return true;
                }
            }
        }
    }
    false
}

/// Insert `extra` into a sorted cell list, keeping it sorted.
fn grown_by(cells: &[usize], extra: usize) -> Vec<usize> {
    let at = cells.partition_point(|&c| c < extra);
    let mut out = Vec::with_capacity(cells.len() + 1);
    out.extend_from_slice(&cells[..at]);
    out.push(extra);
    out.extend_from_slice(&cells[at..]);
    out
}

/// All candidate shapes, indexed by the harvest cells ("targets") they cover.
struct ShapeCatalog {
    rows: usize,
    cols: usize,
    /// Flattened cell index of each target, in discovery (row-major) order.
    targets: Vec<usize>,
    /// Candidates per target, sorted descending by harvest coverage.
    by_target: Vec<Vec<Rc<Shape>>>,
    /// Target indices sorted by scarcity: targets with the fewest candidates
    /// are branched on first.
    order: Vec<usize>,
}

impl ShapeCatalog {
    fn build(input: &Grid) -> Self {
        let rows = input.height();
        let cols = input.width();

        let mut targets = Vec::new();
        let mut target_of = HashMap::new();
        for r in 0..rows {
            for c in 0..cols {
                if input.cell(r, c) == CellState::Harvest {
                    target_of.insert(r * cols + c, targets.len());
                    targets.push(r * cols + c);
                }
            }
        }

        let mut by_target: Vec<Vec<Rc<Shape>>> = vec![Vec::new(); targets.len()];
        let mut seen_global: HashSet<Vec<usize>> = HashSet::new();

        for &start in &targets {
            // Breadth-first growth from the singleton set: each step adds one
            // reachable non-blocked neighbor. Every grown set of size 4-12
            // with an L-pattern becomes a candidate, recorded once globally
            // and attached to every target it happens to cover.
            let mut queue = VecDeque::new();
            let mut seen_local: HashSet<Vec<usize>> = HashSet::new();
            let initial = vec![start];
            seen_local.insert(initial.clone());
            queue.push_back(initial);

            let mut found = 0;

            while let Some(current) = queue.pop_front() {
                if found >= MAX_SHAPES_PER_TARGET {
                    break;
                }
                if current.len() >= MAX_ISLAND_SIZE {
                    continue;
                }

                let mut frontier = BTreeSet::new();
                for &p in &current {
                    let (r, c) = (p / cols, p % cols);
                    for (dr, dc) in DIRECTIONS {
                        if let Some((nr, nc)) = step(r, c, dr, dc, rows, cols) {
                            let n = nr * cols + nc;
                            if input.cell(nr, nc) != CellState::Blocked && !contains(&current, n) {
                                frontier.insert(n);
                            }
                        }
                    }
                }

                for n in frontier {
                    let grown = grown_by(&current, n);
                    if !seen_local.insert(grown.clone()) {
                        continue;
                    }
                    queue.push_back(grown.clone());

                    if grown.len() < MIN_ISLAND_SIZE || seen_global.contains(&grown) {
                        continue;
                    }
                    let Some(anchor) = find_anchor(&grown, rows, cols) else {
                        continue;
                    };
                    seen_global.insert(grown.clone());

                    let mut mask = CellMask::new(rows * cols);
                    let mut harvest_covered = 0;
                    for &p in &grown {
                        mask.set(p);
                        if input.cell(p / cols, p % cols) == CellState::Harvest {
                            harvest_covered += 1;
                        }
                    }
                    let shape = Rc::new(Shape {
                        cells: grown,
                        mask,
                        anchor,
                        harvest_covered,
                    });
                    for &p in &shape.cells {
                        if let Some(&t) = target_of.get(&p) {
                            by_target[t].push(shape.clone());
                        }
                    }
                    found += 1;
                }
            }
        }

        // Greedy heuristic: try high-coverage candidates first so good
        // solutions (and therefore tight pruning bounds) appear early.
        for candidates in &mut by_target {
            candidates.sort_by(|a, b| b.harvest_covered.cmp(&a.harvest_covered));
        }

        let mut order: Vec<usize> = (0..targets.len()).collect();
        order.sort_by_key(|&t| by_target[t].len());

        log::debug!("found {} unique shapes", seen_global.len());

        Self {
            rows,
            cols,
            targets,
            by_target,
            order,
        }
    }
}

#[derive(Clone)]
struct PlacedIsland {
    shape: Rc<Shape>,
    material: Material,
}

struct Search<'a> {
    catalog: &'a ShapeCatalog,
    island_cost: f64,
    timeout: Duration,
    started: Instant,
    best_score: f64,
    best: Vec<PlacedIsland>,
}

impl Search<'_> {
    fn backtrack(
        &mut self,
        pos: usize,
        occupied: &CellMask,
        placed: &mut Vec<PlacedIsland>,
        harvest: usize,
    ) {
        // Deadline first: an exceeded budget keeps whatever best solution has
        // been recorded so far.
        if self.started.elapsed() > self.timeout {
            return;
        }

        let catalog = self.catalog;

        if pos == catalog.order.len() {
            let score = harvest as f64 - placed.len() as f64 * self.island_cost;
            if score > self.best_score {
                self.best_score = score;
                self.best = placed.clone();
            }
            return;
        }

        let target = catalog.order[pos];
        if occupied.get(catalog.targets[target]) {
            self.backtrack(pos + 1, occupied, placed, harvest);
            return;
        }

        // Optimistic bound: even if every remaining uncovered target were
        // harvested for free, this branch cannot beat the best known score.
        let remaining = catalog.order[pos..]
            .iter()
            .filter(|&&t| !occupied.get(catalog.targets[t]))
            .count();
        let score = harvest as f64 - placed.len() as f64 * self.island_cost;
        if score + remaining as f64 <= self.best_score {
            return;
        }

        for shape in &catalog.by_target[target] {
            if occupied.intersects(&shape.mask) {
                continue;
            }
            let Some(material) = self.admissible_material(shape, placed) else {
                continue;
            };

            let mut claimed = occupied.clone();
            claimed.union_with(&shape.mask);
            placed.push(PlacedIsland {
                shape: shape.clone(),
                material,
            });
            self.backtrack(pos + 1, &claimed, placed, harvest + shape.harvest_covered);
            placed.pop();
        }

        // A target may also stay uncovered.
        self.backtrack(pos + 1, occupied, placed, harvest);
    }

    /// Checks the candidate against every placed island and picks its
    /// material. `None` means the placement is inadmissible: its anchor
    /// touches another anchor, or it touches islands of both materials.
    ///
    /// When neither material is forced the choice falls to slime. This is
    /// deliberate: material is not a branch point, so in a densely packed
    /// region the fixed choice can in principle miss a feasible assignment
    /// that branching over both materials would find.
    fn admissible_material(&self, shape: &Shape, placed: &[PlacedIsland]) -> Option<Material> {
        let (rows, cols) = (self.catalog.rows, self.catalog.cols);
        let mut next_to_slime = false;
        let mut next_to_honey = false;
        for island in placed {
            if cells_adjacent(&shape.anchor, &island.shape.anchor, rows, cols) {
                return None;
            }
            if cells_adjacent(&shape.cells, &island.shape.cells, rows, cols) {
                match island.material {
                    Material::Slime => next_to_slime = true,
                    Material::Honey => next_to_honey = true,
                }
                if next_to_slime && next_to_honey {
                    return None;
                }
            }
        }
        Some(if next_to_slime {
            Material::Honey
        } else {
            Material::Slime
        })
    }
}

/// Solve one face. Never fails: a deadline hit or an unsolvable layout just
/// degrades the result (fewer islands, `timed_out` set).
pub fn solve(input: &Grid, config: &SolverConfig) -> SolverResult {
    let started = Instant::now();

    if input.harvest_count() == 0 {
        log::info!(
            "no harvest cells on the {:?} face, nothing to solve",
            input.facing()
        );
        return SolverResult::empty(input);
    }

    log::info!(
        "solving {}x{} grid with {} harvest cells",
        input.width(),
        input.height(),
        input.harvest_count()
    );

    let catalog = ShapeCatalog::build(input);
    let timeout = Duration::from_millis(config.timeout_ms());

    let mut search = Search {
        catalog: &catalog,
        island_cost: config.island_cost(),
        timeout,
        started,
        best_score: f64::NEG_INFINITY,
        best: Vec::new(),
    };
    let occupied = CellMask::new(catalog.rows * catalog.cols);
    search.backtrack(0, &occupied, &mut Vec::new(), 0);

    let solve_time = started.elapsed();
    let timed_out = solve_time >= timeout;

    let cols = catalog.cols;
    let islands = search
        .best
        .iter()
        .map(|island| Island {
            cells: island
                .shape
                .cells
                .iter()
                .map(|&p| (p / cols, p % cols))
                .collect(),
            anchor: island.shape.anchor.map(|p| (p / cols, p % cols)),
            material: island.material,
        })
        .collect::<Vec<_>>();

    log::info!(
        "solution: {} islands, score={:.2}, took {:?}{}",
        islands.len(),
        search.best_score,
        solve_time,
        if timed_out { " (timed out)" } else { "" }
    );

    SolverResult::assemble(input, islands, solve_time.as_millis() as u64, timed_out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Facing;

    fn cfg(timeout_ms: u64) -> SolverConfig {
        SolverConfig::new(timeout_ms, 1.0)
    }

    fn flatten(cells: &[(usize, usize)], cols: usize) -> Vec<usize> {
        let mut out: Vec<usize> = cells.iter().map(|&(r, c)| r * cols + c).collect();
        out.sort_unstable();
        out
    }

    fn score(result: &SolverResult, island_cost: f64) -> f64 {
        result.harvest_covered() as f64 - result.islands().len() as f64 * island_cost
    }

    /// Checks every structural invariant a returned solution must satisfy.
    fn assert_solution_valid(grid: &Grid, result: &SolverResult) {
        let (rows, cols) = (grid.height(), grid.width());
        let islands = result.islands();

        let mut all_cells = std::collections::HashSet::new();
        for island in islands {
            assert!(
                (MIN_ISLAND_SIZE..=MAX_ISLAND_SIZE).contains(&island.cells.len()),
                "island size {} out of bounds",
                island.cells.len()
            );
            for &(r, c) in &island.cells {
                assert_ne!(
                    grid.cell(r, c),
                    CellState::Blocked,
                    "island covers a blocked cell"
                );
                assert!(all_cells.insert((r, c)), "islands overlap at ({}, {})", r, c);
            }
            for anchor_cell in island.anchor {
                assert!(island.cells.contains(&anchor_cell), "anchor outside island");
            }
            let anchor = flatten(&island.anchor, cols);
            assert!(
                find_anchor(&anchor, rows, cols).is_some(),
                "anchor cells do not form an L-pattern"
            );
            let cells = flatten(&island.cells, cols);
            assert!(
                find_anchor(&cells, rows, cols).is_some(),
                "island has no L-pattern"
            );
        }

        for (i, a) in islands.iter().enumerate() {
            for b in &islands[i + 1..] {
                let a_cells = flatten(&a.cells, cols);
                let b_cells = flatten(&b.cells, cols);
                if cells_adjacent(&a_cells, &b_cells, rows, cols) {
                    assert_ne!(a.material, b.material, "adjacent islands share a material");
                }
                let a_anchor = flatten(&a.anchor, cols);
                let b_anchor = flatten(&b.anchor, cols);
                assert!(
                    !cells_adjacent(&a_anchor, &b_anchor, rows, cols),
                    "anchors of different islands are adjacent"
                );
            }
        }

        assert!(result.harvest_covered() <= result.total_harvest());
        assert!((0.0..=100.0).contains(&result.coverage_percent()));
    }

    #[test]
    fn test_config_clamps_island_cost() {
        assert_eq!(SolverConfig::new(1000, 0.25).island_cost(), MIN_ISLAND_COST);
        assert_eq!(SolverConfig::new(1000, 50.0).island_cost(), MAX_ISLAND_COST);
        assert_eq!(SolverConfig::new(1000, 3.5).island_cost(), 3.5);
        assert_eq!(SolverConfig::default().timeout_ms(), DEFAULT_TIMEOUT_MS);
    }

    #[test]
    fn test_cell_mask() {
        let mut a = CellMask::new(130);
        let mut b = CellMask::new(130);
        a.set(0);
        a.set(64);
        a.set(129);
        b.set(65);

        assert!(a.get(64));
        assert!(!a.get(65));
        assert!(!a.intersects(&b));

        b.set(129);
        assert!(a.intersects(&b));

        let mut c = CellMask::new(130);
        c.union_with(&a);
        assert!(c.get(0) && c.get(64) && c.get(129));
    }

    #[test]
    fn test_find_anchor_l() {
        // PPP
        // P..
        let cells = vec![0, 1, 2, 3];
        assert_eq!(find_anchor(&cells, 2, 3), Some([0, 1, 2, 3]));
    }

    #[test]
    fn test_find_anchor_rejects_t_shape() {
        // .P.
        // PPP
        let cells = vec![1, 3, 4, 5];
        assert_eq!(find_anchor(&cells, 2, 3), None);
    }

    #[test]
    fn test_find_anchor_rejects_line_and_square() {
        // PPPP
        assert_eq!(find_anchor(&[0, 1, 2, 3], 1, 4), None);
        // PP
        // PP
        assert_eq!(find_anchor(&[0, 1, 2, 3], 2, 2), None);
    }

    #[test]
    fn test_cells_adjacent() {
        // 3x3 grid: (0,0) vs (0,1) adjacent, (0,0) vs (1,1) diagonal only.
        assert!(cells_adjacent(&[0], &[1], 3, 3));
        assert!(!cells_adjacent(&[0], &[4], 3, 3));
        // No wrap across row ends: (0,2)=2 and (1,0)=3 are not adjacent.
        assert!(!cells_adjacent(&[2], &[3], 3, 3));
    }

    #[test]
    fn test_solve_no_harvest_cells() {
        let grid = Grid::from_layout("....\n....\n....", Facing::Up).unwrap();
        let result = solve(&grid, &cfg(1000));

        assert!(result.islands().is_empty());
        assert_eq!(result.harvest_covered(), 0);
        assert_eq!(result.coverage_percent(), 100.0);
        assert!(!result.timed_out());
    }

    #[test]
    fn test_solve_isolated_harvest_cell() {
        // No room to grow to the 4-cell minimum: the target stays uncovered.
        let grid = Grid::from_layout(
            "
            ###
            #P#
            ###
            ",
            Facing::North,
        )
        .unwrap();
        let result = solve(&grid, &cfg(1000));

        assert!(result.islands().is_empty());
        assert_eq!(result.harvest_covered(), 0);
        assert_eq!(result.total_harvest(), 1);
        assert_eq!(result.coverage_percent(), 0.0);
    }

    #[test]
    fn test_solve_square_cluster_has_no_anchor() {
        // Four connected cells but no 3-cell stem anywhere.
        let grid = Grid::from_layout("PP\nPP", Facing::Up).unwrap();
        let result = solve(&grid, &cfg(1000));

        assert!(result.islands().is_empty());
        assert_eq!(result.harvest_covered(), 0);
    }

    #[test]
    fn test_solve_exact_l_cluster() {
        // The open region is exactly one L: a single island, fully covered.
        let grid = Grid::from_layout(
            "
            PPP
            P##
            ###
            ",
            Facing::West,
        )
        .unwrap();
        let result = solve(&grid, &cfg(1000));

        assert_eq!(result.islands().len(), 1);
        let island = &result.islands()[0];
        assert_eq!(island.cells, vec![(0, 0), (0, 1), (0, 2), (1, 0)]);
        assert_eq!(island.anchor, [(0, 0), (0, 1), (0, 2), (1, 0)]);
        assert_eq!(island.material, Material::Slime);
        assert_eq!(result.harvest_covered(), 4);
        assert_eq!(result.coverage_percent(), 100.0);
        assert_eq!(result.placement(0, 0), Some(Material::Slime));
        assert_eq!(result.placement(2, 2), None);
        assert_solution_valid(&grid, &result);
    }

    #[test]
    fn test_solve_harvest_block_in_corner() {
        let grid = Grid::from_layout(
            "
            PPPP##
            PPPP##
            PPPP##
            ######
            ######
            ######
            ",
            Facing::East,
        )
        .unwrap();
        let result = solve(&grid, &cfg(1500));

        assert!(!result.islands().is_empty());
        assert!(result.harvest_covered() >= 4);
        assert_solution_valid(&grid, &result);
    }

    #[test]
    fn test_solve_two_separated_clusters() {
        // Two L-shaped harvest clusters far apart on an open grid: both must
        // be covered, by distinct islands.
        let grid = Grid::from_layout(
            "
            ..........
            .PPP......
            .P........
            ..........
            ..........
            ..........
            ..........
            ........P.
            ......PPP.
            ..........
            ",
            Facing::South,
        )
        .unwrap();
        let result = solve(&grid, &cfg(1500));

        assert_eq!(result.islands().len(), 2);
        assert_eq!(result.harvest_covered(), 8);
        assert_eq!(result.total_harvest(), 8);
        assert_solution_valid(&grid, &result);
    }

    #[test]
    fn test_solve_mixed_grid_invariants() {
        let grid = Grid::from_layout(
            "
            PP...#PP
            P....#.P
            .....#..
            ..P.....
            ........
            #P...P..
            #....PP.
            #.......
            ",
            Facing::Down,
        )
        .unwrap();
        let result = solve(&grid, &cfg(1500));

        assert!(result.harvest_covered() > 0);
        assert_solution_valid(&grid, &result);
    }

    #[test]
    fn test_zero_budget_is_degraded_but_valid() {
        let grid = Grid::from_layout(
            "
            PPPP##
            PPPP##
            PPPP##
            ######
            ######
            ######
            ",
            Facing::Up,
        )
        .unwrap();

        let starved = solve(&grid, &cfg(0));
        assert!(starved.timed_out());
        assert_solution_valid(&grid, &starved);

        // Anytime property: a larger budget never scores worse.
        let rested = solve(&grid, &cfg(1500));
        assert!(score(&starved, 1.0) <= score(&rested, 1.0));
        assert_solution_valid(&grid, &rested);
    }
}
