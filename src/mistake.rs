//! Mistake detection for autoplay.
//!
//! [`evaluate`] compares the engine's score lead before and after a move.
//! [`MoveStats`] adds how likely the move was under the player's rank, the
//! target rank and the engine, and [`HaltThresholds`] turns that into a
//! decision to stop autoplay so the player can look at the position.

use serde::{Deserialize, Serialize};

use crate::analysis::{Analysis, AnalysisKey};
use crate::board::Color;
use crate::constants::{
    DEFAULT_MAX_POLICY_PROB, DEFAULT_MISTAKE_SIZE, DEFAULT_TARGET_RANK_PROB,
    MOVE_LIKE_TARGET_EPSILON,
};
use crate::position::Move;
use crate::profiles::HumanProfiles;
use crate::tree::{GameTree, NodeId};

/// Points the mover of `id` lost, positive for a mistake.
///
/// `None` unless both the node and its parent have a default analysis with a
/// score lead. Score leads are from Black's point of view.
pub fn evaluate(tree: &GameTree, id: NodeId) -> Option<f64> {
    let node = tree.node(id)?;
    let mover = node.player()?;
    let lead = tree
        .analysis(id, &AnalysisKey::Default)
        .and_then(Analysis::score_lead)?;
    let parent_lead = tree
        .parent_analysis(id, &AnalysisKey::Default)
        .and_then(Analysis::score_lead)?;
    let diff = lead - parent_lead;
    Some(match mover {
        Color::White => diff,
        Color::Black => -diff,
    })
}

/// Probabilities of a played move under the parent position's analyses.
#[derive(Debug, Clone, PartialEq)]
pub struct MoveStats {
    pub mv: Move,
    pub player_prob: f64,
    pub player_relative: f64,
    pub target_prob: f64,
    pub target_relative: f64,
    pub ai_prob: f64,
    pub ai_relative: f64,
    /// Share of the target rank in `player + target`.
    pub move_like_target: f64,
    pub mistake_size: Option<f64>,
}

impl MoveStats {
    /// `None` at the root or until the parent has all three analyses.
    pub fn collect(tree: &GameTree, id: NodeId, profiles: &HumanProfiles) -> Option<Self> {
        let mv = tree.node(id)?.played?.mv;
        let player = tree.parent_analysis(id, &profiles.player)?;
        let target = tree.parent_analysis(id, &profiles.target)?;
        let ai = tree.parent_analysis(id, &AnalysisKey::Default)?;

        let (player_prob, player_relative) = player.human_policy().at(mv);
        let (target_prob, target_relative) = target.human_policy().at(mv);
        let (ai_prob, ai_relative) = ai.ai_policy().at(mv);
        let move_like_target =
            target_prob / (player_prob + target_prob).max(MOVE_LIKE_TARGET_EPSILON);

        Some(Self {
            mv,
            player_prob,
            player_relative,
            target_prob,
            target_relative,
            ai_prob,
            ai_relative,
            move_like_target,
            mistake_size: evaluate(tree, id),
        })
    }

    pub fn max_prob(&self) -> f64 {
        self.player_prob.max(self.target_prob).max(self.ai_prob)
    }
}

/// When autoplay stops after a move.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HaltThresholds {
    /// Points lost before any other check applies.
    pub mistake_size: f64,
    /// Minimum share of the target rank in `player + target`.
    pub target_rank_prob: f64,
    /// A move this unlikely under every policy is a blunder.
    pub max_policy_prob: f64,
}

impl Default for HaltThresholds {
    fn default() -> Self {
        Self {
            mistake_size: DEFAULT_MISTAKE_SIZE,
            target_rank_prob: DEFAULT_TARGET_RANK_PROB,
            max_policy_prob: DEFAULT_MAX_POLICY_PROB,
        }
    }
}

impl HaltThresholds {
    /// The reason to halt, if any.
    pub fn should_halt(&self, stats: &MoveStats) -> Option<String> {
        let mistake = stats.mistake_size?;
        if mistake <= self.mistake_size {
            return None;
        }
        let max_prob = stats.max_prob();
        if max_prob < self.max_policy_prob {
            return Some(format!(
                "{} lost {mistake:.1} points; max policy {:.2}% < {:.2}%",
                stats.mv,
                max_prob * 100.0,
                self.max_policy_prob * 100.0
            ));
        }
        if stats.move_like_target < self.target_rank_prob {
            return Some(format!(
                "{} lost {mistake:.1} points; target rank likeness {:.1}% < {:.1}%",
                stats.mv,
                stats.move_like_target * 100.0,
                self.target_rank_prob * 100.0
            ));
        }
        None
    }
}
