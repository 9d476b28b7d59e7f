//! Human-strength profiles, rank labels and ruleset names.
//!
//! Rank ids run over [`RANK_RANGE`]: negative ids are kyu ranks (`-3` is
//! `3k`), the rest are dan ranks (`0` is `1d`). Ids at the top of the range
//! map to the professional profile and beyond that to the plain engine.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::analysis::AnalysisKey;
use crate::constants::{
    DEFAULT_OPPONENT_RANK, DEFAULT_PLAYER_RANK, DEFAULT_PRO_YEAR, DEFAULT_TARGET_RANK,
    HUMAN_PROFILE_SYMMETRIES, HUMAN_PROFILE_VISITS, RANK_RANGE,
};

/// `-3` → `3k`, `0` → `1d`.
pub fn rank_from_id(id: i32) -> String {
    if id < 0 {
        format!("{}k", -id)
    } else {
        format!("{}d", id + 1)
    }
}

/// Inverse of [`rank_from_id`]. Accepts `3k`, `3kyu`, `2d`, `2dan` (any case).
pub fn id_from_rank(rank: &str) -> Option<i32> {
    let rank = rank.trim().to_ascii_lowercase();
    let digits_end = rank.find(|c: char| !c.is_ascii_digit())?;
    let (number, suffix) = rank.split_at(digits_end);
    let n: i32 = number.parse().ok()?;
    if n == 0 {
        return None;
    }
    match suffix {
        "k" | "kyu" => Some(-n),
        "d" | "dan" => Some(n - 1),
        _ => None,
    }
}

/// Profile for a rank id; `preaz` selects the pre-AlphaZero rank models.
pub fn human_profile_from_id(id: i32, preaz: bool) -> AnalysisKey {
    if id >= RANK_RANGE.end + 10 {
        return AnalysisKey::Default;
    }
    if id >= RANK_RANGE.end {
        return AnalysisKey::Profile("proyear_2023".into());
    }
    let prefix = if preaz { "preaz_" } else { "rank_" };
    AnalysisKey::Profile(format!("{prefix}{}", rank_from_id(id)))
}

/// Every rank label offered for selection, weakest first.
pub fn rank_labels() -> Vec<String> {
    RANK_RANGE.map(rank_from_id).collect()
}

/// Professional profiles, one every five years.
pub fn pro_profiles() -> Vec<String> {
    (1803..2024).step_by(5).map(|y| format!("proyear_{y}")).collect()
}

/// Engine name for a ruleset abbreviation; unknown names pass through
/// lower-cased.
pub fn ruleset_name(rules: &str) -> String {
    let rules = rules.to_ascii_lowercase();
    match rules.as_str() {
        "jp" => "japanese".into(),
        "cn" => "chinese".into(),
        "ko" => "korean".into(),
        "aga" => "aga".into(),
        "tt" => "tromp-taylor".into(),
        "nz" => "new zealand".into(),
        "stone_scoring" => "stone_scoring".into(),
        _ => rules,
    }
}

/// `overrideSettings` and visit budget for a query under `key`.
///
/// Human profiles only need the policy, so they run a single visit with every
/// root symmetry sampled. The engine's own analysis uses `visits`.
pub fn override_settings(key: &AnalysisKey, visits: u32) -> (Map<String, Value>, u32) {
    match key {
        AnalysisKey::Default => (Map::new(), visits),
        AnalysisKey::Profile(name) => {
            let mut settings = Map::new();
            settings.insert("humanSLProfile".into(), json!(name));
            settings.insert("ignorePreRootHistory".into(), json!(false));
            settings.insert(
                "rootNumSymmetriesToSample".into(),
                json!(HUMAN_PROFILE_SYMMETRIES),
            );
            (settings, HUMAN_PROFILE_VISITS)
        }
    }
}

/// How the sampled opponent is modelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OpponentKind {
    /// Modern rank models.
    Rank,
    /// Pre-AlphaZero rank models.
    Preaz,
    /// Professional players of a given year.
    Pro,
}

/// Rank selections for the human player, their goal, and the opponent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankSettings {
    pub player: String,
    pub target: String,
    pub opponent: String,
    pub opponent_kind: OpponentKind,
    pub pro_year: u32,
}

impl Default for RankSettings {
    fn default() -> Self {
        Self {
            player: DEFAULT_PLAYER_RANK.into(),
            target: DEFAULT_TARGET_RANK.into(),
            opponent: DEFAULT_OPPONENT_RANK.into(),
            opponent_kind: OpponentKind::Rank,
            pro_year: DEFAULT_PRO_YEAR,
        }
    }
}

impl RankSettings {
    /// Resolve the selections to analysis keys. Unreadable ranks fall back to
    /// the engine's own analysis.
    pub fn profiles(&self) -> HumanProfiles {
        let key = |rank: &str, preaz: bool| {
            id_from_rank(rank).map_or(AnalysisKey::Default, |id| human_profile_from_id(id, preaz))
        };
        let opponent = match self.opponent_kind {
            OpponentKind::Rank => key(&self.opponent, false),
            OpponentKind::Preaz => key(&self.opponent, true),
            OpponentKind::Pro => AnalysisKey::Profile(format!("proyear_{}", self.pro_year)),
        };
        HumanProfiles {
            player: key(&self.player, false),
            opponent,
            target: key(&self.target, false),
        }
    }
}

/// The three analysis keys the game loop tracks besides the default one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HumanProfiles {
    pub player: AnalysisKey,
    pub opponent: AnalysisKey,
    pub target: AnalysisKey,
}

impl HumanProfiles {
    /// Default, player, opponent and target keys, without duplicates.
    pub fn keys(&self) -> Vec<AnalysisKey> {
        let mut keys = vec![AnalysisKey::Default];
        for key in [&self.player, &self.opponent, &self.target] {
            if !keys.contains(key) {
                keys.push(key.clone());
            }
        }
        keys
    }
}
