//! Torus grid topology
//!
//! Maps flat worker ranks onto a fixed `torus_height x torus_width` grid and
//! derives the row and column groups that scope collective broadcasts. All
//! functions here are pure; the grid shape never changes during a run.

use crate::error::{Error, Result};

/// Position of a worker in the torus grid
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Coord {
    /// Grid row, in `[0, torus_height)`
    pub row: usize,
    /// Grid column, in `[0, torus_width)`
    pub col: usize,
}

/// Axis along which a group extends
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Axis {
    /// All workers sharing a grid row
    Row,
    /// All workers sharing a grid column
    Col,
}

/// Stable identifier of a communication group
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GroupId {
    /// Whether this is a row or a column group
    pub axis: Axis,
    /// Row or column index of the group
    pub index: usize,
}

/// A set of ranks participating in a collective, in ascending rank order
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Group {
    /// Identifier, stable across all members for the lifetime of a run
    pub id: GroupId,
    /// Member ranks, ascending
    pub ranks: Vec<usize>,
}

impl Group {
    /// Number of members
    pub fn len(&self) -> usize {
        self.ranks.len()
    }

    /// True if the group has no members (never the case for torus groups)
    pub fn is_empty(&self) -> bool {
        self.ranks.is_empty()
    }

    /// True if `rank` is a member
    pub fn contains(&self, rank: usize) -> bool {
        self.ranks.binary_search(&rank).is_ok()
    }
}

/// The 2-D worker grid
#[derive(Clone, Copy, Debug)]
pub struct TorusTopology {
    width: usize,
    height: usize,
}

impl TorusTopology {
    /// Build a topology, failing fast if the grid does not cover `world_size`
    /// workers exactly.
    pub fn new(width: usize, height: usize, world_size: usize) -> Result<Self> {
        if width * height != world_size {
            return Err(Error::InvalidConfiguration {
                param: "torus",
                reason: format!(
                    "grid {}x{} does not match world size {}",
                    width, height, world_size
                ),
            });
        }
        Ok(Self { width, height })
    }

    /// Grid width (number of columns)
    pub fn width(&self) -> usize {
        self.width
    }

    /// Grid height (number of rows)
    pub fn height(&self) -> usize {
        self.height
    }

    /// Coordinate of `rank`. Ranks are laid out row-major, matching the
    /// `rank = row * width + col` convention of the launch layer.
    pub fn rank_to_coord(&self, rank: usize) -> Coord {
        debug_assert!(rank < self.width * self.height);
        Coord {
            row: rank / self.width,
            col: rank % self.width,
        }
    }

    /// Rank at `coord`
    pub fn coord_to_rank(&self, coord: Coord) -> usize {
        debug_assert!(coord.row < self.height && coord.col < self.width);
        coord.row * self.width + coord.col
    }

    /// All ranks sharing grid row `row`
    pub fn row_group(&self, row: usize) -> Group {
        Group {
            id: GroupId {
                axis: Axis::Row,
                index: row,
            },
            ranks: (0..self.width)
                .map(|col| self.coord_to_rank(Coord { row, col }))
                .collect(),
        }
    }

    /// All ranks sharing grid column `col`
    pub fn col_group(&self, col: usize) -> Group {
        Group {
            id: GroupId {
                axis: Axis::Col,
                index: col,
            },
            ranks: (0..self.height)
                .map(|row| self.coord_to_rank(Coord { row, col }))
                .collect(),
        }
    }
}
