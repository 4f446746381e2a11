// Copyright 2024 Entanglement Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::entangler::Error;
use crate::parity::{Direction, StrandType};

/// Row/column coordinates of a lattice position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Coords {
    pub row: u64,
    pub col: u64,
}

impl Coords {
    pub fn new(row: u64, col: u64) -> Self {
        Self { row, col }
    }
}

/// Lattice maps linear positions to a grid of height `s` and back, and finds the neighbors of a
/// position along every strand.
///
/// Positions fill the grid column by column: `(row, col) = (pos % s, pos / s)`. Both axes wrap
/// around. The lattice is window aligned: its column count is always a multiple of the helical
/// period `p`, so wrapping along columns jumps to the first column of the lattice regardless of
/// how many positions are actually occupied.
///   Example:
///    - Lattice with s = 2, p = 2 covering 7 items has 4 columns (two windows of 4 positions).
///      The forward neighbor of column 3 is column 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lattice {
    s: u64,
    p: u64,
    columns: u64,
}

impl Lattice {
    /// Creates a lattice spanning a single window.
    pub fn new(s: u64, p: u64) -> Result<Self, Error> {
        if s == 0 {
            return Err(Error::InvalidEntanglementParameter("s".to_string(), s));
        }
        if p == 0 {
            return Err(Error::InvalidEntanglementParameter("p".to_string(), p));
        }
        // a window must be addressable by a position
        if s.checked_mul(p).is_none() {
            return Err(Error::InvalidEntanglementParameter("p".to_string(), p));
        }
        Ok(Self { s, p, columns: p })
    }

    /// Returns a lattice with the same parameters whose columns hold at least `num_items`
    /// positions. A lattice always spans at least one window.
    pub fn covering(&self, num_items: u64) -> Self {
        let windows = num_items.div_ceil(self.window_size()).max(1);
        Self {
            columns: windows.saturating_mul(self.p),
            ..*self
        }
    }

    pub fn height(&self) -> u64 {
        self.s
    }

    pub fn period(&self) -> u64 {
        self.p
    }

    pub fn num_columns(&self) -> u64 {
        self.columns
    }

    /// Number of positions in one window, `s * p`.
    pub fn window_size(&self) -> u64 {
        self.s * self.p
    }

    /// Number of positions the lattice holds, saturating at `u64::MAX`.
    pub fn capacity(&self) -> u64 {
        self.s.saturating_mul(self.columns)
    }

    pub fn coordinates(&self, pos: u64) -> Coords {
        Coords::new(pos % self.s, pos / self.s)
    }

    /// Turns coordinates into a position, wrapping both axes.
    pub fn position(&self, coords: Coords) -> u64 {
        self.linear(coords.col % self.columns, coords.row % self.s)
    }

    fn linear(&self, col: u64, row: u64) -> u64 {
        (col as u128 * self.s as u128 + row as u128) as u64
    }

    /// Returns the position adjacent to `pos` along `strand`, travelling in `dir`.
    ///
    /// A forward step moves one column right and `strand.to_i64()` rows down; a backward step
    /// undoes it. Rows wrap at `s`, columns wrap at the lattice's column count.
    pub fn neighbor(&self, pos: u64, strand: StrandType, dir: Direction) -> u64 {
        let coords = self.coordinates(pos);
        let step = dir.to_i64();
        let row = mod_int(coords.row as i128 + (step * strand.to_i64()) as i128, self.s);
        let col = mod_int(coords.col as i128 + step as i128, self.columns);
        self.linear(col, row)
    }
}

fn mod_int(int: i128, m: u64) -> u64 {
    int.rem_euclid(m as i128) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinates() {
        let lattice = Lattice::new(3, 3).unwrap();
        assert_eq!(lattice.coordinates(0), Coords::new(0, 0));
        assert_eq!(lattice.coordinates(2), Coords::new(2, 0));
        assert_eq!(lattice.coordinates(4), Coords::new(1, 1));
        assert_eq!(lattice.coordinates(8), Coords::new(2, 2));
        for pos in 0..9 {
            assert_eq!(lattice.position(lattice.coordinates(pos)), pos);
        }
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(matches!(
            Lattice::new(0, 2),
            Err(Error::InvalidEntanglementParameter(name, 0)) if name == "s"
        ));
        assert!(matches!(
            Lattice::new(2, 0),
            Err(Error::InvalidEntanglementParameter(name, 0)) if name == "p"
        ));
    }

    #[test]
    fn test_window_must_fit_in_a_position() {
        assert!(matches!(
            Lattice::new(1 << 33, 1 << 33),
            Err(Error::InvalidEntanglementParameter(name, _)) if name == "p"
        ));
        assert!(Lattice::new(1 << 32, (1 << 32) - 1).is_ok());
    }

    #[test]
    fn test_neighbors_of_a_tall_lattice() {
        let s = 1 << 40;
        let lattice = Lattice::new(s, 2).unwrap();
        // a backward step along the left strand goes one row down and wraps to the last column
        assert_eq!(lattice.neighbor(0, StrandType::Left, Direction::Backward), s + 1);
        assert_eq!(lattice.neighbor(s + 1, StrandType::Left, Direction::Forward), 0);
        assert_eq!(lattice.neighbor(s - 1, StrandType::Right, Direction::Forward), s);

        let widest = Lattice::new(u64::MAX, 1).unwrap();
        assert_eq!(widest.neighbor(0, StrandType::Right, Direction::Forward), 1);
        assert_eq!(widest.neighbor(1, StrandType::Right, Direction::Backward), 0);
        assert_eq!(widest.capacity(), u64::MAX);
    }

    #[test]
    fn test_covering_is_window_aligned() {
        let lattice = Lattice::new(2, 2).unwrap();
        assert_eq!(lattice.covering(0).num_columns(), 2);
        assert_eq!(lattice.covering(4).num_columns(), 2);
        assert_eq!(lattice.covering(5).num_columns(), 4);
        assert_eq!(lattice.covering(7).capacity(), 8);
    }

    #[test]
    fn test_forward_neighbors() {
        let lattice = Lattice::new(3, 3).unwrap();
        let test_cases = vec![
            (4, StrandType::Horizontal, 7, "Standard horizontal move"),
            (4, StrandType::Right, 8, "Standard right move"),
            (4, StrandType::Left, 6, "Standard left move"),
            (2, StrandType::Right, 3, "Wrap right move at the bottom row"),
            (3, StrandType::Left, 8, "Wrap left move at the top row"),
            (7, StrandType::Horizontal, 1, "Wrap horizontally at the last column"),
            (8, StrandType::Right, 0, "Wrap right move at the corner"),
            (6, StrandType::Left, 2, "Wrap left move at the corner"),
        ];

        for (pos, strand, expected, message) in test_cases {
            assert_eq!(
                lattice.neighbor(pos, strand, Direction::Forward),
                expected,
                "{}",
                message
            );
        }
    }

    #[test]
    fn test_backward_neighbors() {
        let lattice = Lattice::new(2, 2).unwrap().covering(8);
        assert_eq!(lattice.neighbor(2, StrandType::Horizontal, Direction::Backward), 0);
        assert_eq!(lattice.neighbor(2, StrandType::Right, Direction::Backward), 1);
        assert_eq!(lattice.neighbor(3, StrandType::Right, Direction::Backward), 0);
        // the first column wraps to the last one
        assert_eq!(lattice.neighbor(0, StrandType::Horizontal, Direction::Backward), 6);
        assert_eq!(lattice.neighbor(1, StrandType::Left, Direction::Backward), 6);
    }

    #[test]
    fn test_neighbor_steps_are_inverse() {
        for (s, p, items) in [(1, 1, 1), (2, 2, 7), (3, 3, 9), (4, 2, 19), (5, 5, 60)] {
            let lattice = Lattice::new(s, p).unwrap().covering(items);
            for pos in 0..lattice.capacity() {
                for strand in StrandType::all() {
                    for dir in [Direction::Forward, Direction::Backward] {
                        let next = lattice.neighbor(pos, strand, dir);
                        assert!(next < lattice.capacity());
                        assert_eq!(
                            lattice.neighbor(next, strand, dir.opposite()),
                            pos,
                            "s={} p={} pos={} strand={:?} dir={:?}",
                            s,
                            p,
                            pos,
                            strand,
                            dir
                        );
                    }
                }
            }
        }
    }
}
