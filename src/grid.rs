use std::fmt;

/// State of a single cell on a projected face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CellState {
    /// Free space the solver may build through.
    Air,
    /// Cell that can never be part of an island.
    Blocked,
    /// Cell the solver tries to cover with an island.
    Harvest,
}

/// Which face of the projected structure this grid came from.
///
/// Purely bookkeeping for the caller; the solver never looks at it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Facing {
    West,
    East,
    North,
    South,
    Up,
    Down,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum GridError {
    #[error("grid dimensions must be positive, got {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },
    #[error("layout row {row} is {found} cells wide, expected {expected}")]
    RaggedLayout {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("unrecognized layout symbol {0:?}")]
    UnknownSymbol(char),
}

/// A 2D face grid, the input to the solver. Addressed as (row, col) with
/// (0, 0) in the top left corner. Immutable once handed to the solver.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grid {
    facing: Facing,
    cells: ndarray::Array2<CellState>,
}

impl Grid {
    /// Create an all-`Air` grid. Rejects empty dimensions.
    pub fn new(width: usize, height: usize, facing: Facing) -> Result<Self, GridError> {
        if width == 0 || height == 0 {
            return Err(GridError::InvalidDimensions { width, height });
        }
        Ok(Self {
            facing,
            cells: ndarray::Array2::from_elem((height, width), CellState::Air),
        })
    }

    /// Wrap an existing cell array. The array is shaped (height, width).
    pub fn from_cells(cells: ndarray::Array2<CellState>, facing: Facing) -> Result<Self, GridError> {
        let (height, width) = cells.dim();
        if width == 0 || height == 0 {
            return Err(GridError::InvalidDimensions { width, height });
        }
        Ok(Self { facing, cells })
    }

    /// Parse the textual face format: one line per row, `.` air, `#` blocked,
    /// `P` harvest. Blank lines are skipped so layouts can be indented in
    /// test sources.
    pub fn from_layout(layout: &str, facing: Facing) -> Result<Self, GridError> {
        let mut cells = Vec::new();
        let mut width = 0;
        let mut height = 0;
        for line in layout.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let row: Vec<CellState> = line
                .chars()
                .map(|ch| match ch {
                    '.' => Ok(CellState::Air),
                    '#' => Ok(CellState::Blocked),
                    'P' => Ok(CellState::Harvest),
                    other => Err(GridError::UnknownSymbol(other)),
                })
                .collect::<Result<_, _>>()?;
            if height == 0 {
                width = row.len();
            } else if row.len() != width {
                return Err(GridError::RaggedLayout {
                    row: height,
                    expected: width,
                    found: row.len(),
                });
            }
            cells.extend(row);
            height += 1;
        }
        if width == 0 || height == 0 {
            return Err(GridError::InvalidDimensions { width, height });
        }
        let cells = ndarray::Array2::from_shape_vec((height, width), cells)
            .expect("row lengths already validated");
        Ok(Self { facing, cells })
    }

    pub fn width(&self) -> usize {
        self.cells.dim().1
    }

    pub fn height(&self) -> usize {
        self.cells.dim().0
    }

    pub fn facing(&self) -> Facing {
        self.facing
    }

    pub fn cell(&self, row: usize, col: usize) -> CellState {
        self.cells[[row, col]]
    }

    /// Used by the projection stage while building the grid; the solver
    /// itself never mutates its input.
    pub fn set(&mut self, row: usize, col: usize, state: CellState) {
        self.cells[[row, col]] = state;
    }

    pub fn count(&self, state: CellState) -> usize {
        self.cells.iter().filter(|&&c| c == state).count()
    }

    pub fn harvest_count(&self) -> usize {
        self.count(CellState::Harvest)
    }

    pub fn blocked_count(&self) -> usize {
        self.count(CellState::Blocked)
    }
}

impl fmt::Display for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Grid[{}x{}, facing={:?}]",
            self.width(),
            self.height(),
            self.facing
        )?;
        for row in self.cells.rows() {
            for cell in row {
                let ch = match cell {
                    CellState::Air => '.',
                    CellState::Blocked => '#',
                    CellState::Harvest => 'P',
                };
                write!(f, "{}", ch)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
