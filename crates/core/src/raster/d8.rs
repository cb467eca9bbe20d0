//! D8 flow-direction coding
//!
//! Directions are held internally as [`Direction`] and written to grids as
//! `u8` codes through a [`DirMap`]. The default map is the ESRI power-of-two
//! scheme:
//! ```text
//!   32  64  128
//!   16   0    1
//!    8   4    2
//! ```
//! `0` marks a cell with no downslope neighbour (pit, flat or edge outlet)
//! and `255` marks no-data.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Code for a valid cell that does not drain to a neighbour
pub const NO_FLOW: u8 = 0;

/// Code for a no-data cell in a direction grid
pub const DIR_NODATA: u8 = 255;

/// One of the eight compass directions, in N, NE, E, SE, S, SW, W, NW order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    N,
    NE,
    E,
    SE,
    S,
    SW,
    W,
    NW,
}

impl Direction {
    /// All directions in dirmap order
    pub const ALL: [Direction; 8] = [
        Direction::N,
        Direction::NE,
        Direction::E,
        Direction::SE,
        Direction::S,
        Direction::SW,
        Direction::W,
        Direction::NW,
    ];

    /// Position of this direction in a dirmap tuple
    pub fn index(self) -> usize {
        self as usize
    }

    /// (row, col) offset of the neighbour in this direction
    pub fn offset(self) -> (isize, isize) {
        match self {
            Direction::N => (-1, 0),
            Direction::NE => (-1, 1),
            Direction::E => (0, 1),
            Direction::SE => (1, 1),
            Direction::S => (1, 0),
            Direction::SW => (1, -1),
            Direction::W => (0, -1),
            Direction::NW => (-1, -1),
        }
    }

    pub fn opposite(self) -> Direction {
        Direction::ALL[(self.index() + 4) % 8]
    }

    pub fn is_diagonal(self) -> bool {
        self.index() % 2 == 1
    }

    /// Length of one step in this direction for cells of size `dx` by `dy`
    pub fn distance(self, dx: f64, dy: f64) -> f64 {
        match self {
            Direction::E | Direction::W => dx,
            Direction::N | Direction::S => dy,
            _ => dx.hypot(dy),
        }
    }

    /// Neighbour of (`row`, `col`) in this direction, if inside a `rows` x `cols` grid
    pub fn step(self, row: usize, col: usize, rows: usize, cols: usize) -> Option<(usize, usize)> {
        let (dr, dc) = self.offset();
        let nr = row as isize + dr;
        let nc = col as isize + dc;
        if nr < 0 || nc < 0 || nr >= rows as isize || nc >= cols as isize {
            None
        } else {
            Some((nr as usize, nc as usize))
        }
    }
}

/// Mapping between directions and the `u8` codes stored in direction grids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "[u8; 8]", into = "[u8; 8]")]
pub struct DirMap {
    codes: [u8; 8],
}

impl DirMap {
    /// ESRI-style codes for N, NE, E, SE, S, SW, W, NW
    pub const ESRI: DirMap = DirMap {
        codes: [64, 128, 1, 2, 4, 8, 16, 32],
    };

    /// Build a map from 8 codes in N, NE, E, SE, S, SW, W, NW order.
    ///
    /// Codes must be distinct and must not collide with [`NO_FLOW`] or
    /// [`DIR_NODATA`].
    pub fn new(codes: [u8; 8]) -> Result<Self> {
        for (i, &code) in codes.iter().enumerate() {
            if code == NO_FLOW || code == DIR_NODATA {
                return Err(Error::InvalidParameter {
                    name: "dirmap",
                    value: format!("{:?}", codes),
                    reason: format!("code {} is reserved", code),
                });
            }
            if codes[..i].contains(&code) {
                return Err(Error::InvalidParameter {
                    name: "dirmap",
                    value: format!("{:?}", codes),
                    reason: format!("code {} appears more than once", code),
                });
            }
        }
        Ok(Self { codes })
    }

    pub fn codes(&self) -> [u8; 8] {
        self.codes
    }

    /// Code written for a direction
    pub fn code(&self, dir: Direction) -> u8 {
        self.codes[dir.index()]
    }

    /// Direction for a code; `None` for `NO_FLOW`, `DIR_NODATA` and unknown codes
    pub fn direction(&self, code: u8) -> Option<Direction> {
        self.codes
            .iter()
            .position(|&c| c == code)
            .map(|i| Direction::ALL[i])
    }

    /// Downstream cell of (`row`, `col`) given its code, if it is inside the grid
    pub fn downstream(
        &self,
        code: u8,
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    ) -> Option<(usize, usize)> {
        self.direction(code)?.step(row, col, rows, cols)
    }

    /// Codes sorted ascending, handy for discrete colour bars
    pub fn sorted_codes(&self) -> [u8; 8] {
        let mut sorted = self.codes;
        sorted.sort_unstable();
        sorted
    }
}

impl Default for DirMap {
    fn default() -> Self {
        Self::ESRI
    }
}

impl TryFrom<[u8; 8]> for DirMap {
    type Error = Error;

    fn try_from(codes: [u8; 8]) -> Result<Self> {
        DirMap::new(codes)
    }
}

impl From<DirMap> for [u8; 8] {
    fn from(map: DirMap) -> Self {
        map.codes
    }
}
