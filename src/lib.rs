//! Solver for sticky-block harvesting layouts on projected geode faces.
//!
//! The caller projects each face of a 3D structure onto a 2D [`Grid`] of
//! blocked/air/harvest cells; [`solve`] finds islands of slime and honey
//! blocks covering as many harvest cells as possible. See the `solver`
//! module for the constraints and the search itself.

pub mod grid;
pub mod result;
pub mod solver;

pub use grid::{CellState, Facing, Grid, GridError};
pub use result::{Island, Material, SolverResult};
pub use solver::{solve, SolverConfig};

/// Solve several independent faces in parallel, one worker thread per face.
/// Each solve owns its entire search state, so no synchronization is needed;
/// results come back in input order.
pub fn solve_all(faces: &[Grid], config: &SolverConfig) -> Vec<SolverResult> {
    log::info!("solving {} face(s) in parallel", faces.len());
    std::thread::scope(|scope| {
        let workers: Vec<_> = faces
            .iter()
            .map(|face| scope.spawn(move || solve(face, config)))
            .collect();
        workers
            .into_iter()
            .map(|worker| worker.join().expect("face solver thread panicked"))
            .collect()
    })
}
