//! Branching game history.
//!
//! Nodes live in an arena owned by [`GameTree`] and refer to each other by
//! [`NodeId`]. A node's children are owned through the arena; its parent link
//! is just an index. Deleting a subtree frees its slots for good: ids are never
//! reused, so a stale id resolves to `None` instead of to some other node.

use std::collections::HashMap;

use crate::analysis::{Analysis, AnalysisKey, AnalysisState};
use crate::board::{Board, Color, MoveError};
use crate::constants::{DEFAULT_KOMI, DEFAULT_RULES, MAX_BOARD_SIZE};
use crate::error::{Result, ShapeError};
use crate::mistake;
use crate::position::{Move, PlayedMove};

/// Handle to a node of a [`GameTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// One position in the game history.
#[derive(Debug, Clone)]
pub struct GameNode {
    pub id: NodeId,
    pub board: Board,
    /// `None` only at the root.
    pub played: Option<PlayedMove>,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    /// Moves from the root.
    pub depth: usize,
    /// Stones removed by `played`.
    pub captures: usize,
    analyses: HashMap<AnalysisKey, AnalysisState>,
    pub ai_move_requested: bool,
    autoplay_halt_reason: Option<String>,
}

impl GameNode {
    fn new(id: NodeId, board: Board) -> Self {
        Self {
            id,
            board,
            played: None,
            parent: None,
            children: Vec::new(),
            depth: 0,
            captures: 0,
            analyses: HashMap::new(),
            ai_move_requested: false,
            autoplay_halt_reason: None,
        }
    }

    /// Colour that moved into this position.
    pub fn player(&self) -> Option<Color> {
        self.played.map(|p| p.color)
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn is_pass(&self) -> bool {
        self.played.is_some_and(|p| p.mv.is_pass())
    }

    pub fn analysis(&self, key: &AnalysisKey) -> Option<&Analysis> {
        self.analyses.get(key).and_then(AnalysisState::ready)
    }

    pub fn analysis_state(&self, key: &AnalysisKey) -> Option<&AnalysisState> {
        self.analyses.get(key)
    }

    pub fn autoplay_halt_reason(&self) -> Option<&str> {
        self.autoplay_halt_reason.as_deref()
    }
}

/// Game metadata written to and read from SGF root properties.
#[derive(Debug, Clone, PartialEq)]
pub struct GameInfo {
    pub size: usize,
    pub rules: String,
    pub komi: f64,
    pub black_name: Option<String>,
    pub white_name: Option<String>,
}

impl GameInfo {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            rules: DEFAULT_RULES.into(),
            komi: DEFAULT_KOMI,
            black_name: None,
            white_name: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GameTree {
    pub info: GameInfo,
    /// Indexed by `NodeId`. Deleted nodes leave a `None` behind.
    nodes: Vec<Option<GameNode>>,
    root: NodeId,
    current: NodeId,
}

impl GameTree {
    pub fn new(size: usize) -> Result<Self> {
        Self::with_info(GameInfo::new(size))
    }

    pub fn with_info(info: GameInfo) -> Result<Self> {
        if info.size == 0 || info.size > MAX_BOARD_SIZE {
            return Err(ShapeError::InvalidBoardSize {
                size: info.size,
                max: MAX_BOARD_SIZE,
            });
        }
        let root = NodeId(0);
        let board = Board::new(info.size);
        Ok(Self {
            info,
            nodes: vec![Some(GameNode::new(root, board))],
            root,
            current: root,
        })
    }

    pub fn size(&self) -> usize {
        self.info.size
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn current(&self) -> NodeId {
        self.current
    }

    pub fn node(&self, id: NodeId) -> Option<&GameNode> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut GameNode> {
        self.nodes.get_mut(id.0).and_then(Option::as_mut)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    pub fn current_node(&self) -> &GameNode {
        self.nodes[self.current.0]
            .as_ref()
            .expect("current node is always live")
    }

    /// Move `current` to `id`. Returns false for a stale id.
    pub fn set_current(&mut self, id: NodeId) -> bool {
        if self.contains(id) {
            self.current = id;
            true
        } else {
            false
        }
    }

    /// Play `mv` for `color` from the current node and make the result current.
    ///
    /// Replaying a move that already has a child re-enters that child. The
    /// tree is unchanged when the move is illegal.
    pub fn play(&mut self, color: Color, mv: Move) -> Result<NodeId> {
        self.try_play(color, mv)
            .map_err(|source| ShapeError::IllegalMove {
                played: PlayedMove::new(color, mv),
                source,
            })
    }

    /// [`GameTree::play`] reporting the bare rule violation.
    pub fn try_play(&mut self, color: Color, mv: Move) -> std::result::Result<NodeId, MoveError> {
        let played = PlayedMove::new(color, mv);
        let parent_id = self.current;

        let existing = self
            .current_node()
            .children
            .iter()
            .copied()
            .find(|&c| self.node(c).and_then(|n| n.played) == Some(played));
        if let Some(existing) = existing {
            self.current = existing;
            return Ok(existing);
        }

        let parent = self.current_node();
        let outcome = parent.board.apply_move(mv, color)?;

        let id = NodeId(self.nodes.len());
        let mut node = GameNode::new(id, outcome.board);
        node.played = Some(played);
        node.parent = Some(parent_id);
        node.depth = parent.depth + 1;
        node.captures = outcome.captures;

        log::debug!(
            "play {played} at move {} ({} captured{})",
            node.depth,
            outcome.captures,
            if outcome.suicide { ", suicide" } else { "" }
        );

        self.nodes.push(Some(node));
        if let Some(p) = self.node_mut(parent_id) {
            p.children.push(id);
        }
        self.current = id;
        Ok(id)
    }

    /// Step back up to `n` moves, stopping at the root. Returns the steps taken.
    pub fn undo(&mut self, n: usize) -> usize {
        let mut steps = 0;
        while steps < n {
            match self.current_node().parent {
                Some(parent) => self.current = parent,
                None => break,
            }
            steps += 1;
        }
        steps
    }

    /// Step forward up to `n` moves along first children, stopping at a leaf.
    pub fn redo(&mut self, n: usize) -> usize {
        let mut steps = 0;
        while steps < n {
            match self.current_node().children.first() {
                Some(&child) => self.current = child,
                None => break,
            }
            steps += 1;
        }
        steps
    }

    /// Detach `child` from `parent` and free its whole subtree.
    ///
    /// If `current` was inside the subtree it moves to `parent`. Returns false
    /// when `child` is not a live child of `parent`.
    ///
    /// Freed slots stay as `None` and are never handed out again, so a stale
    /// `NodeId` can only ever resolve to nothing. The arena grows with every
    /// node created in a game and is released with the tree.
    pub fn delete_child(&mut self, parent: NodeId, child: NodeId) -> bool {
        let Some(p) = self.node_mut(parent) else {
            return false;
        };
        let Some(pos) = p.children.iter().position(|&c| c == child) else {
            return false;
        };
        p.children.remove(pos);

        let mut stack = vec![child];
        let mut freed = 0;
        while let Some(id) = stack.pop() {
            if let Some(node) = self.nodes.get_mut(id.0).and_then(Option::take) {
                if id == self.current {
                    self.current = parent;
                }
                stack.extend(node.children);
                freed += 1;
            }
        }
        log::debug!("deleted {freed} node(s) below node {}", parent.0);
        true
    }

    /// Nodes from the root down to `id`, inclusive. Empty for a stale id.
    pub fn path_from_root(&self, id: NodeId) -> Vec<NodeId> {
        let mut path = Vec::new();
        let mut cursor = self.node(id);
        while let Some(node) = cursor {
            path.push(node.id);
            cursor = node.parent.and_then(|p| self.node(p));
        }
        path.reverse();
        path
    }

    /// Moves played from the root down to `id`.
    pub fn moves_from_root(&self, id: NodeId) -> Vec<PlayedMove> {
        self.path_from_root(id)
            .into_iter()
            .filter_map(|n| self.node(n).and_then(|node| node.played))
            .collect()
    }

    /// Colour to move at `id`. Black moves first.
    pub fn next_player(&self, id: NodeId) -> Color {
        self.node(id)
            .and_then(GameNode::player)
            .map_or(Color::Black, Color::opponent)
    }

    pub fn move_number(&self) -> usize {
        self.current_node().depth
    }

    /// Two consecutive passes end the game.
    pub fn game_ended(&self, id: NodeId) -> bool {
        let Some(node) = self.node(id) else {
            return false;
        };
        node.is_pass()
            && node
                .parent
                .and_then(|p| self.node(p))
                .is_some_and(GameNode::is_pass)
    }

    /// Last node reached by following first children from `current`.
    pub fn last_node(&self) -> NodeId {
        let mut id = self.current;
        while let Some(&child) = self.node(id).and_then(|n| n.children.first()) {
            id = child;
        }
        id
    }

    pub fn analysis(&self, id: NodeId, key: &AnalysisKey) -> Option<&Analysis> {
        self.node(id).and_then(|n| n.analysis(key))
    }

    pub fn parent_analysis(&self, id: NodeId, key: &AnalysisKey) -> Option<&Analysis> {
        let parent = self.node(id)?.parent?;
        self.analysis(parent, key)
    }

    /// Store a result, keeping whichever analysis has more visits.
    ///
    /// Returns true when the stored analysis changed. A lower visit count
    /// than the stored one leaves it in place; a pending marker is always
    /// replaced.
    pub fn store_analysis(&mut self, id: NodeId, analysis: Analysis) -> bool {
        let Some(node) = self.node_mut(id) else {
            return false;
        };
        let key = analysis.key().clone();
        if let Some(AnalysisState::Ready(stored)) = node.analyses.get(&key) {
            if analysis.visit_count() < stored.visit_count() {
                log::debug!(
                    "keeping {} analysis of node {} ({} visits > {})",
                    key,
                    id.0,
                    stored.visit_count(),
                    analysis.visit_count()
                );
                return false;
            }
        }
        node.analyses.insert(key, AnalysisState::Ready(analysis));
        true
    }

    /// Record that `key` was requested for `id`, unless a result is present.
    pub fn mark_analysis_requested(&mut self, id: NodeId, key: AnalysisKey) {
        if let Some(node) = self.node_mut(id) {
            node.analyses.entry(key).or_insert(AnalysisState::Pending);
        }
    }

    /// Forget a pending request for `key` so it can be made again. A ready
    /// analysis is kept. Returns true when a pending marker was removed.
    pub fn clear_analysis_request(&mut self, id: NodeId, key: &AnalysisKey) -> bool {
        let Some(node) = self.node_mut(id) else {
            return false;
        };
        if matches!(node.analyses.get(key), Some(AnalysisState::Pending)) {
            node.analyses.remove(key);
            return true;
        }
        false
    }

    /// Pending or ready.
    pub fn analysis_requested(&self, id: NodeId, key: &AnalysisKey) -> bool {
        self.node(id)
            .is_some_and(|n| n.analyses.contains_key(key))
    }

    /// Set the halt reason of `id`. Only the first reason sticks.
    pub fn halt_autoplay(&mut self, id: NodeId, reason: impl Into<String>) -> bool {
        match self.node_mut(id) {
            Some(node) if node.autoplay_halt_reason.is_none() => {
                node.autoplay_halt_reason = Some(reason.into());
                true
            }
            _ => false,
        }
    }

    pub fn request_ai_move(&mut self, id: NodeId) {
        if let Some(node) = self.node_mut(id) {
            node.ai_move_requested = true;
        }
    }

    /// Clear and return the explicit move request on `id`.
    pub fn take_ai_move_request(&mut self, id: NodeId) -> bool {
        self.node_mut(id)
            .is_some_and(|n| std::mem::take(&mut n.ai_move_requested))
    }

    /// Move number and default-analysis score lead along the current path.
    pub fn score_history(&self) -> Vec<(usize, Option<f64>)> {
        self.path_from_root(self.current)
            .into_iter()
            .filter_map(|id| self.node(id))
            .map(|n| {
                let lead = n.analysis(&AnalysisKey::Default).and_then(Analysis::score_lead);
                (n.depth, lead)
            })
            .collect()
    }

    /// Points lost by the mover of `id`; see [`mistake::evaluate`].
    pub fn mistake_size(&self, id: NodeId) -> Option<f64> {
        mistake::evaluate(self, id)
    }
}
