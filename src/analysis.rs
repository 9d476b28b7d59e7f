//! Engine analysis results attached to tree nodes.
//!
//! A node keeps one [`AnalysisState`] per [`AnalysisKey`]: the engine's own
//! analysis under [`AnalysisKey::Default`], and one per human-strength profile
//! (e.g. `rank_3k`) whose policy imitates players of that strength.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ShapeError};
use crate::policy::PolicyData;

/// Which analysis of a node is meant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AnalysisKey {
    /// The engine's unconstrained analysis.
    Default,
    /// Analysis under a named human profile.
    Profile(String),
}

impl AnalysisKey {
    pub fn profile(&self) -> Option<&str> {
        match self {
            AnalysisKey::Default => None,
            AnalysisKey::Profile(name) => Some(name),
        }
    }

    pub fn is_default(&self) -> bool {
        matches!(self, AnalysisKey::Default)
    }
}

impl From<Option<String>> for AnalysisKey {
    fn from(profile: Option<String>) -> Self {
        profile.map_or(AnalysisKey::Default, AnalysisKey::Profile)
    }
}

impl fmt::Display for AnalysisKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisKey::Default => f.write_str("ai"),
            AnalysisKey::Profile(name) => f.write_str(name),
        }
    }
}

/// `rootInfo` of an engine response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootInfo {
    pub score_lead: Option<f64>,
    pub winrate: Option<f64>,
    #[serde(default)]
    pub visits: u32,
}

/// One entry of `moveInfos`, in engine preference order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveInfo {
    /// GTP coordinate or `pass`.
    #[serde(rename = "move")]
    pub mv: String,
    #[serde(default)]
    pub visits: u32,
    pub winrate: Option<f64>,
    pub score_lead: Option<f64>,
    pub prior: Option<f64>,
    pub order: Option<u32>,
    #[serde(default)]
    pub pv: Vec<String>,
}

/// A successful engine response, as read off the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisPayload {
    pub id: String,
    #[serde(default)]
    pub root_info: RootInfo,
    pub policy: Option<Vec<f64>>,
    pub human_policy: Option<Vec<f64>>,
    #[serde(default)]
    pub move_infos: Vec<MoveInfo>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    key: AnalysisKey,
    root_info: RootInfo,
    ai_policy: PolicyData,
    human_policy: Option<PolicyData>,
    move_infos: Vec<MoveInfo>,
}

impl Analysis {
    /// Parse a response received for `key`.
    ///
    /// A profile analysis must carry a `humanPolicy`; the default analysis
    /// uses its `policy` for both.
    pub fn from_payload(key: AnalysisKey, payload: AnalysisPayload) -> Result<Self> {
        let ai_policy = PolicyData::new(payload.policy.ok_or(ShapeError::MissingPolicy)?)?;
        let human_policy = payload.human_policy.map(PolicyData::new).transpose()?;
        if let (AnalysisKey::Profile(profile), None) = (&key, &human_policy) {
            return Err(ShapeError::MissingHumanPolicy {
                profile: profile.clone(),
            });
        }
        Ok(Self {
            key,
            root_info: payload.root_info,
            ai_policy,
            human_policy,
            move_infos: payload.move_infos,
        })
    }

    pub fn key(&self) -> &AnalysisKey {
        &self.key
    }

    pub fn score_lead(&self) -> Option<f64> {
        self.root_info.score_lead
    }

    pub fn win_rate(&self) -> Option<f64> {
        self.root_info.winrate
    }

    pub fn visit_count(&self) -> u32 {
        self.root_info.visits
    }

    pub fn ai_policy(&self) -> &PolicyData {
        &self.ai_policy
    }

    /// Human-profile policy, or the engine policy for the default key.
    pub fn human_policy(&self) -> &PolicyData {
        self.human_policy.as_ref().unwrap_or(&self.ai_policy)
    }

    pub fn ai_moves(&self) -> &[MoveInfo] {
        &self.move_infos
    }

    /// The engine's preferred move, if it reported any.
    pub fn best_move(&self) -> Option<&MoveInfo> {
        self.move_infos.first()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisState {
    /// Requested, no response yet.
    Pending,
    Ready(Analysis),
}

impl AnalysisState {
    pub fn ready(&self) -> Option<&Analysis> {
        match self {
            AnalysisState::Pending => None,
            AnalysisState::Ready(analysis) => Some(analysis),
        }
    }
}
