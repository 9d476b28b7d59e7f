//! The game controller.
//!
//! [`Game`] is the one place that mutates the [`GameTree`]. Engine replies
//! arrive on the engine's reader thread; their callbacks only post an
//! [`AnalysisEvent`] into the controller's mailbox, and [`Game::process_events`]
//! applies them on the controller's own thread.
//!
//! A typical loop:
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use std::time::Duration;
//! # use shape_go::engine::EngineSession;
//! # use shape_go::game::Game;
//! # use shape_go::position::Move;
//! # use shape_go::settings::Settings;
//! # fn main() -> anyhow::Result<()> {
//! let settings = Settings::default();
//! let engine = EngineSession::spawn(&settings.engine)?;
//! let mut game = Game::new(settings, Arc::new(engine))?;
//! game.make_move(Move::Place((3, 3)))?;
//! game.settle(Duration::from_secs(30));
//! println!("{}", game.tree().current_node().board);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::analysis::{Analysis, AnalysisKey};
use crate::board::Color;
use crate::constants::DEEPER_ANALYSIS_MIN_VISITS;
use crate::engine::{AnalysisBackend, Reply};
use crate::error::{Result, SgfImportError};
use crate::mistake::MoveStats;
use crate::policy::choose_weighted;
use crate::position::{Move, PlayedMove};
use crate::profiles::HumanProfiles;
use crate::settings::Settings;
use crate::sgf;
use crate::tree::{GameInfo, GameTree, NodeId};

/// An engine reply routed back to the controller.
#[derive(Debug)]
pub struct AnalysisEvent {
    /// Tree the query was made for; replies for a replaced tree are dropped.
    pub generation: u64,
    pub node: NodeId,
    pub key: AnalysisKey,
    pub reply: Reply,
}

pub struct Game {
    tree: GameTree,
    settings: Settings,
    backend: Arc<dyn AnalysisBackend>,
    mailbox: Sender<AnalysisEvent>,
    events: Receiver<AnalysisEvent>,
    generation: u64,
    rng: fastrand::Rng,
    status: String,
}

impl Game {
    pub fn new(settings: Settings, backend: Arc<dyn AnalysisBackend>) -> Result<Self> {
        let tree = GameTree::with_info(game_info(&settings, settings.board_size))?;
        let (mailbox, events) = crossbeam_channel::unbounded();
        Ok(Self {
            tree,
            settings,
            backend,
            mailbox,
            events,
            generation: 0,
            rng: fastrand::Rng::new(),
            status: "Ready".into(),
        })
    }

    /// Make move sampling reproducible.
    pub fn seed(&mut self, seed: u64) {
        self.rng = fastrand::Rng::with_seed(seed);
    }

    pub fn tree(&self) -> &GameTree {
        &self.tree
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    /// Last thing worth telling the user.
    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn profiles(&self) -> HumanProfiles {
        self.settings.ranks.profiles()
    }

    pub fn human_to_move(&self) -> bool {
        self.tree.next_player(self.tree.current()) == self.settings.player_color
    }

    fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
        log::debug!("status: {}", self.status);
    }

    /// Request every tracked analysis of `node` that is neither ready nor
    /// pending. Returns true when all of them are ready.
    pub fn ensure_analysis_requested(&mut self, node: NodeId) -> bool {
        let mut all_ready = true;
        for key in self.profiles().keys() {
            if self.tree.analysis(node, &key).is_none() {
                all_ready = false;
                if !self.tree.analysis_requested(node, &key) {
                    self.request_analysis(node, key, None);
                }
            }
        }
        all_ready
    }

    /// Ask the backend to analyze `node` under `key`.
    ///
    /// Skipped when already requested, unless `force_visits` asks for a
    /// deeper default analysis.
    pub fn request_analysis(&mut self, node: NodeId, key: AnalysisKey, force_visits: Option<u32>) {
        if self.tree.analysis_requested(node, &key) && force_visits.is_none() {
            return;
        }
        let visits = force_visits.unwrap_or(self.settings.visits);
        log::debug!("requesting {key} analysis of node {}", node.index());
        self.tree.mark_analysis_requested(node, key.clone());

        let mailbox = self.mailbox.clone();
        let generation = self.generation;
        let event_key = key.clone();
        self.backend.analyze(
            &self.tree,
            node,
            &key,
            visits,
            Box::new(move |reply| {
                let event = AnalysisEvent {
                    generation,
                    node,
                    key: event_key,
                    reply,
                };
                // The controller may be gone; nothing left to update then.
                let _ = mailbox.send(event);
            }),
        );
    }

    /// Re-query the current position's default analysis with twice the
    /// visits it has, and at least [`DEEPER_ANALYSIS_MIN_VISITS`]. The stored
    /// analysis stays until a reply with more visits replaces it. Returns the
    /// visit budget requested.
    pub fn request_deeper_analysis(&mut self) -> u32 {
        let current = self.tree.current();
        let visits = self
            .tree
            .analysis(current, &AnalysisKey::Default)
            .map_or(0, |a| a.visit_count().saturating_mul(2))
            .max(DEEPER_ANALYSIS_MIN_VISITS);
        self.request_analysis(current, AnalysisKey::Default, Some(visits));
        self.set_status(format!("Requested deeper analysis with {visits} visits"));
        visits
    }

    /// Apply every reply received so far. Returns how many were handled.
    pub fn process_events(&mut self) -> usize {
        let events: Vec<AnalysisEvent> = self.events.try_iter().collect();
        let count = events.len();
        for event in events {
            self.handle_event(event);
        }
        count
    }

    fn handle_event(&mut self, event: AnalysisEvent) {
        let AnalysisEvent {
            generation,
            node,
            key,
            reply,
        } = event;
        if generation != self.generation || !self.tree.contains(node) {
            log::debug!("ignoring {key} reply for a node that no longer exists");
            return;
        }

        let payload = match reply {
            Ok(payload) => payload,
            Err(err) if err.is_retryable() => {
                // The move stands; the next update asks again.
                log::warn!("{key} analysis of node {} deferred: {err}", node.index());
                self.tree.clear_analysis_request(node, &key);
                self.set_status(format!("Analysis deferred: {}", err.message));
                return;
            }
            Err(err) if self.tree.analysis(node, &key).is_some() => {
                // A failed deeper query leaves the node and its analysis alone.
                log::error!("deeper {key} analysis failed: {err}");
                self.set_status(format!("Analysis error: {}", err.message));
                return;
            }
            Err(err) => {
                log::error!("analysis error: {err}");
                self.set_status(format!("Analysis error: {}", err.message));
                self.discard_node(node);
                return;
            }
        };

        let analysis = match Analysis::from_payload(key.clone(), payload) {
            Ok(analysis) => analysis,
            Err(err) => {
                log::error!("unusable {key} analysis for node {}: {err}", node.index());
                self.set_status(format!("Unusable analysis: {err}"));
                return;
            }
        };
        self.tree.store_analysis(node, analysis);

        let outstanding = self.backend.num_outstanding_queries();
        if outstanding == 0 {
            self.set_status("Ready");
        } else {
            let at = self
                .tree
                .node(node)
                .and_then(|n| n.played)
                .map_or_else(|| "root".to_string(), |p| p.mv.to_string());
            self.set_status(format!(
                "{key} analysis for {at} received, still working on {outstanding} queries"
            ));
        }
    }

    /// Roll back a node whose analysis failed.
    fn discard_node(&mut self, node: NodeId) {
        if self.tree.current() == node {
            self.tree.undo(1);
        }
        match self.tree.node(node).and_then(|n| n.parent) {
            Some(parent) => {
                let deleted = self.tree.delete_child(parent, node);
                log::info!("deleting node {} after analysis error: {deleted}", node.index());
            }
            None => log::warn!("analysis of the root failed; not retrying"),
        }
    }

    /// Stats of the move that led to the current position.
    pub fn move_stats(&self) -> Option<MoveStats> {
        MoveStats::collect(&self.tree, self.tree.current(), &self.profiles())
    }

    /// One step of the control loop: request missing analyses, then halt
    /// autoplay or let the engine move. Returns the engine's move, if any.
    pub fn update(&mut self) -> Option<NodeId> {
        let current = self.tree.current();
        let all_ready = self.ensure_analysis_requested(current);
        if self.tree.game_ended(current) || !all_ready {
            return None;
        }

        let human_turn = self.human_to_move();
        let requested = self.tree.node(current).is_some_and(|n| n.ai_move_requested);
        if !human_turn && !requested {
            let reason = self
                .move_stats()
                .and_then(|stats| self.settings.halt.should_halt(&stats));
            if let Some(reason) = reason {
                if self.tree.halt_autoplay(current, reason.clone()) {
                    log::info!("halting auto-play: {reason}");
                    self.set_status(format!("Auto-play halted: {reason}"));
                }
                return None;
            }
        }
        self.maybe_make_ai_move(current, human_turn)
    }

    /// Sample and play the engine's move when autoplay wants one at a leaf on
    /// the engine's turn, or when a move was requested explicitly.
    fn maybe_make_ai_move(&mut self, current: NodeId, human_turn: bool) -> Option<NodeId> {
        let node = self.tree.node(current)?;
        let autoplay = node.children.is_empty() && self.settings.auto_play && !human_turn;
        if !autoplay && !node.ai_move_requested {
            return None;
        }
        self.tree.take_ai_move_request(current);

        let profiles = self.profiles();
        let (moves, reason) = self
            .tree
            .analysis(current, &profiles.opponent)?
            .human_policy()
            .sample(&self.settings.sampling, None);
        let best_is_pass = self
            .tree
            .analysis(current, &AnalysisKey::Default)
            .and_then(Analysis::best_move)
            .is_some_and(|info| info.mv.eq_ignore_ascii_case("pass"));

        let mv = if moves.is_empty() {
            log::info!("no valid moves available, passing");
            Move::Pass
        } else if best_is_pass {
            log::info!("passing because it is the best engine move");
            Move::Pass
        } else {
            let mv = choose_weighted(&moves, &mut self.rng).unwrap_or(Move::Pass);
            log::info!(
                "making sampled move {mv} from {} candidates, cut off by {reason}",
                moves.len()
            );
            mv
        };
        match self.make_move(mv) {
            Ok(id) => Some(id),
            Err(err) => {
                log::error!("engine move rejected: {err}");
                None
            }
        }
    }

    /// Play `mv` for the side to move.
    pub fn make_move(&mut self, mv: Move) -> Result<NodeId> {
        let color = self.tree.next_player(self.tree.current());
        let id = self.tree.play(color, mv)?;
        log::info!("{}", PlayedMove::new(color, mv));
        self.ensure_analysis_requested(id);
        Ok(id)
    }

    pub fn undo(&mut self, n: usize) -> usize {
        self.tree.undo(n)
    }

    pub fn redo(&mut self, n: usize) -> usize {
        self.tree.redo(n)
    }

    /// Have the engine move at the current node on the next update, even on
    /// the human's turn or after autoplay halted.
    pub fn request_ai_move(&mut self) {
        let current = self.tree.current();
        self.tree.request_ai_move(current);
        self.set_status("AI move requested");
    }

    pub fn new_game(&mut self, size: usize) -> Result<()> {
        log::info!("new game requested with size {size}");
        self.replace_tree(GameTree::with_info(game_info(&self.settings, size))?);
        Ok(())
    }

    /// Replace the game with an SGF record. The current game is kept when the
    /// record cannot be imported.
    pub fn import_sgf(&mut self, text: &str) -> std::result::Result<(), SgfImportError> {
        let tree = match sgf::import(text) {
            Ok(tree) => tree,
            Err(err) => {
                self.set_status(format!("Failed to import SGF: {err}"));
                return Err(err);
            }
        };
        self.replace_tree(tree);
        for node in self.tree.path_from_root(self.tree.current()) {
            self.ensure_analysis_requested(node);
        }
        self.set_status("SGF imported successfully");
        Ok(())
    }

    /// SGF of the current line, naming the human and the engine's profile.
    pub fn export_sgf(&mut self) -> String {
        self.tree.info.black_name = Some(self.player_name(Color::Black));
        self.tree.info.white_name = Some(self.player_name(Color::White));
        sgf::export(&self.tree)
    }

    fn player_name(&self, color: Color) -> String {
        if color == self.settings.player_color {
            return "Human".into();
        }
        match self.profiles().opponent {
            AnalysisKey::Profile(profile) => format!("AI ({profile})"),
            AnalysisKey::Default => "KataGo".into(),
        }
    }

    fn replace_tree(&mut self, tree: GameTree) {
        self.tree = tree;
        self.generation += 1;
    }

    /// Pump replies and updates until no query is outstanding. Returns false
    /// on timeout.
    pub fn settle(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.process_events();
            self.update();
            if self.backend.num_outstanding_queries() == 0 && self.events.is_empty() {
                return true;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.events.recv_timeout(remaining) {
                Ok(event) => self.handle_event(event),
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => return false,
            }
        }
    }
}

fn game_info(settings: &Settings, size: usize) -> GameInfo {
    GameInfo {
        rules: settings.rules.clone(),
        komi: settings.komi,
        ..GameInfo::new(size)
    }
}
