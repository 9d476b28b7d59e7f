//! Moves and coordinate transcoding.
//!
//! Points are zero-based `(col, row)` pairs with row 0 at the bottom of the
//! board, so `(0, 0)` is `A1`. Two text forms exist:
//!
//! - GTP: a column letter (A-Z skipping I) followed by the 1-based row number,
//!   e.g. `D4`, or `pass`. This is what the analysis engine speaks.
//! - SGF: two lower-case letters, column first and row counted from the top,
//!   e.g. `dp` for `D4` on 19x19. A pass is empty (`[]`) or `tt` on boards up
//!   to 19x19.

use std::fmt;

use crate::board::Color;
use crate::constants::GTP_COLUMNS;

/// A point on the board as `(col, row)`.
pub type Point = (usize, usize);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Move {
    Pass,
    Place(Point),
}

impl Move {
    pub fn is_pass(self) -> bool {
        matches!(self, Move::Pass)
    }

    pub fn point(self) -> Option<Point> {
        match self {
            Move::Pass => None,
            Move::Place(pt) => Some(pt),
        }
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&str_coord(*self))
    }
}

/// A move together with the colour that played it.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct PlayedMove {
    pub color: Color,
    pub mv: Move,
}

impl PlayedMove {
    pub fn new(color: Color, mv: Move) -> Self {
        Self { color, mv }
    }
}

impl fmt::Display for PlayedMove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.color, self.mv)
    }
}

/// Parse a GTP coordinate such as `D4` or `pass` for a board of `size`.
///
/// Returns `None` for malformed text or a point off the board.
pub fn parse_coord(s: &str, size: usize) -> Option<Move> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("pass") {
        return Some(Move::Pass);
    }

    let mut chars = s.chars();
    let col_char = chars.next()?.to_ascii_uppercase();
    if !col_char.is_ascii_uppercase() {
        return None;
    }
    let col = GTP_COLUMNS.iter().position(|&c| c as char == col_char)?;

    let digits = chars.as_str();
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let number: usize = digits.parse().ok()?;
    if number == 0 || number > size || col >= size {
        return None;
    }

    Some(Move::Place((col, number - 1)))
}

/// Format a move as a GTP coordinate (`D4`, `pass`).
pub fn str_coord(mv: Move) -> String {
    match mv {
        Move::Pass => "pass".into(),
        Move::Place((col, row)) => {
            let c = GTP_COLUMNS.get(col).map_or('?', |&b| b as char);
            format!("{c}{}", row + 1)
        }
    }
}

/// Format a move as SGF letters. A pass is the empty string.
pub fn sgf_coord(mv: Move, size: usize) -> String {
    match mv {
        Move::Pass => String::new(),
        Move::Place((col, row)) => {
            let x = (b'a' + col as u8) as char;
            let y = (b'a' + (size - 1 - row) as u8) as char;
            format!("{x}{y}")
        }
    }
}

/// Parse SGF letters for a board of `size`. Accepts `""` and `tt` as pass.
pub fn parse_sgf_coord(s: &str, size: usize) -> Option<Move> {
    if s.is_empty() || (s == "tt" && size <= 19) {
        return Some(Move::Pass);
    }
    let bytes = s.as_bytes();
    if bytes.len() != 2 {
        return None;
    }
    let letter = |b: u8| b.is_ascii_lowercase().then(|| (b - b'a') as usize);
    let col = letter(bytes[0])?;
    let from_top = letter(bytes[1])?;
    if col >= size || from_top >= size {
        return None;
    }
    Some(Move::Place((col, size - 1 - from_top)))
}
