//! Board representation and the capture rules.
//!
//! A [`Board`] is an immutable-by-convention square grid: every rule operation
//! takes `&self` and returns a fresh board, so a board attached to a tree node
//! is never changed afterwards.
//!
//! Rules implemented:
//! - opponent groups left without liberties are captured
//! - a placement that captures nothing and leaves its own group without
//!   liberties removes that group (suicide is permitted)
//!
//! Ko is not checked. A position may repeat.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::position::{Move, Point};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Color {
    Black,
    White,
}

impl Color {
    pub fn opponent(self) -> Color {
        match self {
            Color::Black => Color::White,
            Color::White => Color::Black,
        }
    }

    /// Single-letter form used by SGF and the engine protocol.
    pub fn letter(self) -> char {
        match self {
            Color::Black => 'B',
            Color::White => 'W',
        }
    }

    pub fn from_letter(c: char) -> Option<Color> {
        match c.to_ascii_uppercase() {
            'B' => Some(Color::Black),
            'W' => Some(Color::White),
            _ => None,
        }
    }

    /// Parse `b`, `w`, `black` or `white` (any case).
    pub fn parse(s: &str) -> Option<Color> {
        match s.to_ascii_lowercase().as_str() {
            "b" | "black" => Some(Color::Black),
            "w" | "white" => Some(Color::White),
            _ => None,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// Why a move could not be placed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MoveError {
    #[error("point ({col}, {row}) is outside the {size}x{size} board")]
    OutOfBounds { col: usize, row: usize, size: usize },
    #[error("point ({col}, {row}) is already occupied")]
    Occupied { col: usize, row: usize },
}

/// The board produced by a legal move.
#[derive(Debug, Clone)]
pub struct MoveOutcome {
    pub board: Board,
    /// Opponent stones removed.
    pub captures: usize,
    /// The placed stone's own group was removed.
    pub suicide: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Board {
    pub size: usize,
    cells: Vec<Option<Color>>,
}

impl Board {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            cells: vec![None; size * size],
        }
    }

    fn idx(&self, col: usize, row: usize) -> usize {
        row * self.size + col
    }

    pub fn in_bounds(&self, col: usize, row: usize) -> bool {
        col < self.size && row < self.size
    }

    pub fn get(&self, col: usize, row: usize) -> Option<Color> {
        if !self.in_bounds(col, row) {
            return None;
        }
        self.cells[self.idx(col, row)]
    }

    fn set(&mut self, (col, row): Point, color: Option<Color>) {
        let i = self.idx(col, row);
        self.cells[i] = color;
    }

    /// Number of stones of the given colour on the board.
    pub fn count(&self, color: Color) -> usize {
        self.cells.iter().filter(|c| **c == Some(color)).count()
    }

    /// Iterate over every point of the board, bottom row first.
    pub fn points(&self) -> impl Iterator<Item = Point> + '_ {
        (0..self.size).flat_map(move |row| (0..self.size).map(move |col| (col, row)))
    }

    fn neighbors(&self, col: usize, row: usize) -> impl Iterator<Item = Point> + '_ {
        let s = self.size;
        let mut v = Vec::with_capacity(4);
        if col > 0 {
            v.push((col - 1, row));
        }
        if col + 1 < s {
            v.push((col + 1, row));
        }
        if row > 0 {
            v.push((col, row - 1));
        }
        if row + 1 < s {
            v.push((col, row + 1));
        }
        v.into_iter()
    }

    /// Stones 4-connected to `(col, row)` with the same colour.
    ///
    /// Returns an empty set for an empty or off-board point.
    pub fn group_of(&self, col: usize, row: usize) -> HashSet<Point> {
        let mut group = HashSet::new();
        let Some(color) = self.get(col, row) else {
            return group;
        };
        let mut stack = vec![(col, row)];
        while let Some((c, r)) = stack.pop() {
            if !group.insert((c, r)) {
                continue;
            }
            for (nc, nr) in self.neighbors(c, r) {
                if self.get(nc, nr) == Some(color) && !group.contains(&(nc, nr)) {
                    stack.push((nc, nr));
                }
            }
        }
        group
    }

    /// True if any stone of `group` touches an empty point. Off-board points
    /// in `group` are ignored.
    pub fn has_liberty(&self, group: &HashSet<Point>) -> bool {
        group
            .iter()
            .filter(|&&(c, r)| self.in_bounds(c, r))
            .any(|&(c, r)| {
                self.neighbors(c, r)
                    .any(|(nc, nr)| self.get(nc, nr).is_none())
            })
    }

    /// A move is legal when it is a pass or targets an empty on-board point.
    pub fn is_legal(&self, mv: Move) -> bool {
        self.check(mv).is_ok()
    }

    fn check(&self, mv: Move) -> Result<(), MoveError> {
        match mv {
            Move::Pass => Ok(()),
            Move::Place((col, row)) if !self.in_bounds(col, row) => Err(MoveError::OutOfBounds {
                col,
                row,
                size: self.size,
            }),
            Move::Place((col, row)) if self.get(col, row).is_some() => {
                Err(MoveError::Occupied { col, row })
            }
            Move::Place(_) => Ok(()),
        }
    }

    /// Play `mv` for `color` and return the resulting board.
    ///
    /// `self` is left untouched; an illegal move is reported as an error.
    pub fn apply_move(&self, mv: Move, color: Color) -> Result<MoveOutcome, MoveError> {
        self.check(mv)?;
        let mut board = self.clone();
        let Move::Place((col, row)) = mv else {
            return Ok(MoveOutcome {
                board,
                captures: 0,
                suicide: false,
            });
        };
        board.set((col, row), Some(color));

        let opp = color.opponent();
        let mut captures = 0;
        for (nc, nr) in self.neighbors(col, row) {
            if board.get(nc, nr) != Some(opp) {
                continue;
            }
            let group = board.group_of(nc, nr);
            if !board.has_liberty(&group) {
                captures += group.len();
                for &pt in &group {
                    board.set(pt, None);
                }
            }
        }

        let mut suicide = false;
        if captures == 0 {
            let own = board.group_of(col, row);
            if !board.has_liberty(&own) {
                for &pt in &own {
                    board.set(pt, None);
                }
                suicide = true;
            }
        }

        Ok(MoveOutcome {
            board,
            captures,
            suicide,
        })
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in (0..self.size).rev() {
            for col in 0..self.size {
                let ch = match self.get(col, row) {
                    Some(Color::Black) => 'X',
                    Some(Color::White) => 'O',
                    None => '.',
                };
                write!(f, "{ch} ")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
