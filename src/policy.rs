//! Policy grids and nucleus sampling.
//!
//! The engine reports a policy as a flat vector of `N*N + 1` probabilities:
//! the board in row-major order starting from the top row, then the pass
//! probability. [`PolicyData`] re-indexes it to `(col, row)` with row 0 at the
//! bottom so it lines up with [`Move`] coordinates.
//!
//! [`PolicyData::sample`] ranks the candidates and cuts the list with three
//! independent limits (top-k, top-p and min-p). The ranking is a stable sort,
//! so equal probabilities keep board order and results are reproducible.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_MIN_P, DEFAULT_TOP_K, DEFAULT_TOP_P};
use crate::error::{Result, ShapeError};
use crate::position::Move;

#[derive(Debug, Clone, PartialEq)]
pub struct PolicyData {
    data: Vec<f64>,
    size: usize,
    pass_prob: f64,
    max_prob: f64,
}

impl PolicyData {
    pub fn new(data: Vec<f64>) -> Result<Self> {
        let len = data.len();
        let size = (len.saturating_sub(1) as f64).sqrt().round() as usize;
        if len == 0 || size * size + 1 != len {
            return Err(ShapeError::InvalidPolicy { len });
        }
        let pass_prob = data[len - 1];
        let max_prob = data.iter().copied().fold(0.0_f64, f64::max);
        Ok(Self {
            data,
            size,
            pass_prob,
            max_prob,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn pass_prob(&self) -> f64 {
        self.pass_prob
    }

    /// Largest probability, pass included.
    pub fn max_prob(&self) -> f64 {
        self.max_prob
    }

    /// Probability at `(col, row)`, zero off the board.
    pub fn value_at(&self, col: usize, row: usize) -> f64 {
        if col >= self.size || row >= self.size {
            return 0.0;
        }
        self.data[(self.size - 1 - row) * self.size + col]
    }

    /// Board probabilities as `grid[row][col]`, row 0 at the bottom.
    pub fn grid(&self) -> Vec<Vec<f64>> {
        (0..self.size)
            .map(|row| (0..self.size).map(|col| self.value_at(col, row)).collect())
            .collect()
    }

    /// `(probability, probability / max probability)` of a move.
    pub fn at(&self, mv: Move) -> (f64, f64) {
        let prob = match mv {
            Move::Pass => self.pass_prob,
            Move::Place((col, row)) => self.value_at(col, row),
        };
        let relative = if self.max_prob > 0.0 {
            prob / self.max_prob
        } else {
            0.0
        };
        (prob, relative)
    }

    /// Rank the moves with positive probability and cut the list.
    ///
    /// Each move is paired with the value of `secondary` at the same point
    /// (its own probability when no secondary policy is given). The walk stops
    /// at the first of: a candidate below `min_p` times the best probability,
    /// `top_k` candidates taken, cumulative probability reaching `top_p`, or
    /// the end of the list.
    pub fn sample(
        &self,
        params: &SampleParams,
        secondary: Option<&PolicyData>,
    ) -> (Vec<SampledMove>, StopReason) {
        let mut moves = Vec::new();
        for row in 0..self.size {
            for col in 0..self.size {
                let prob = self.value_at(col, row);
                if prob > 0.0 {
                    moves.push(SampledMove {
                        mv: Move::Place((col, row)),
                        prob,
                        secondary: secondary.map_or(prob, |s| s.value_at(col, row)),
                    });
                }
            }
        }
        if self.pass_prob > 0.0 && !params.exclude_pass {
            moves.push(SampledMove {
                mv: Move::Pass,
                prob: self.pass_prob,
                secondary: self.pass_prob,
            });
        }

        // sort_by is stable: ties keep enumeration order
        moves.sort_by(|a, b| b.prob.total_cmp(&a.prob));

        let Some(highest) = moves.first().map(|m| m.prob) else {
            return (Vec::new(), StopReason::All);
        };

        let mut top = Vec::new();
        let mut total = 0.0;
        for (i, m) in moves.into_iter().enumerate() {
            if m.prob < params.min_p * highest {
                return (top, StopReason::MinP);
            }
            total += m.prob;
            top.push(m);
            if i + 1 == params.top_k {
                return (top, StopReason::TopK);
            }
            if total >= params.top_p {
                return (top, StopReason::TopP);
            }
        }
        (top, StopReason::All)
    }
}

/// Cutoffs for [`PolicyData::sample`]. A `top_k` of zero means no limit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SampleParams {
    pub top_k: usize,
    pub top_p: f64,
    pub min_p: f64,
    pub exclude_pass: bool,
}

impl Default for SampleParams {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            top_p: DEFAULT_TOP_P,
            min_p: DEFAULT_MIN_P,
            exclude_pass: true,
        }
    }
}

impl SampleParams {
    /// No cutoffs at all: every positive-probability move is returned.
    pub fn unlimited() -> Self {
        Self {
            top_k: 0,
            top_p: f64::INFINITY,
            min_p: 0.0,
            exclude_pass: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampledMove {
    pub mv: Move,
    pub prob: f64,
    pub secondary: f64,
}

/// Which limit ended a [`PolicyData::sample`] walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    MinP,
    TopK,
    TopP,
    All,
}

impl StopReason {
    pub fn as_str(self) -> &'static str {
        match self {
            StopReason::MinP => "min_p",
            StopReason::TopK => "top_k",
            StopReason::TopP => "top_p",
            StopReason::All => "all",
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pick one sampled move with probability proportional to its policy value.
pub fn choose_weighted(moves: &[SampledMove], rng: &mut fastrand::Rng) -> Option<Move> {
    let total: f64 = moves.iter().map(|m| m.prob).sum();
    if moves.is_empty() || total <= 0.0 {
        return None;
    }
    let mut r = rng.f64() * total;
    for m in moves {
        if r < m.prob {
            return Some(m.mv);
        }
        r -= m.prob;
    }
    moves.last().map(|m| m.mv)
}
