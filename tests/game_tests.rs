//! Game controller tests
//!
//! A scripted backend holds every query until the test answers it, so each
//! test decides which analyses arrive, in what order and with what content.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::json;

use shape_go::analysis::AnalysisKey;
use shape_go::board::Color;
use shape_go::engine::{AnalysisBackend, Callback, Query, Reply};
use shape_go::error::{AnalysisError, SgfImportError};
use shape_go::game::Game;
use shape_go::position::{Move, PlayedMove, Point};
use shape_go::settings::Settings;

// =============================================================================
// Scripted backend
// =============================================================================

#[derive(Default)]
struct ScriptedBackend {
    inbox: Mutex<Vec<(Query, Callback)>>,
    counter: AtomicU64,
}

impl ScriptedBackend {
    fn take(&self) -> Vec<(Query, Callback)> {
        std::mem::take(&mut *self.inbox.lock().unwrap())
    }

    /// Answer every held query with whatever `script` returns for it.
    fn answer_all(&self, mut script: impl FnMut(&Query) -> Reply) -> usize {
        let queries = self.take();
        let count = queries.len();
        for (query, callback) in queries {
            callback(script(&query));
        }
        count
    }
}

impl AnalysisBackend for ScriptedBackend {
    fn submit(&self, query: Query, callback: Callback) {
        self.inbox.lock().unwrap().push((query, callback));
    }

    fn num_outstanding_queries(&self) -> usize {
        self.inbox.lock().unwrap().len()
    }

    fn next_counter(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }
}

// =============================================================================
// Helper functions
// =============================================================================

const SIZE: usize = 5;

fn setup_game(player_color: Color) -> (Game, Arc<ScriptedBackend>) {
    let settings = Settings {
        board_size: SIZE,
        player_color,
        ..Settings::default()
    };
    let backend = Arc::new(ScriptedBackend::default());
    let mut game = Game::new(settings, backend.clone()).unwrap();
    game.seed(7);
    (game, backend)
}

/// A policy putting all weight on `point`, or on pass for `None`.
fn peaked(point: Option<Point>) -> Vec<f64> {
    let mut policy = vec![0.0; SIZE * SIZE + 1];
    match point {
        Some((col, row)) => policy[(SIZE - 1 - row) * SIZE + col] = 1.0,
        None => policy[SIZE * SIZE] = 1.0,
    }
    policy
}

/// A successful reply with the same policy under every profile.
fn reply(query: &Query, lead: f64, policy: &[f64], best: &str) -> Reply {
    let payload = json!({
        "id": query.id,
        "rootInfo": {"scoreLead": lead, "winrate": 0.5, "visits": query.max_visits},
        "policy": policy,
        "humanPolicy": policy,
        "moveInfos": [{"move": best, "visits": query.max_visits, "order": 0}],
    });
    Ok(serde_json::from_value(payload).unwrap())
}

/// Answer the root's analyses: even game, everyone expects `expected`.
fn answer_root(game: &mut Game, backend: &ScriptedBackend, expected: Point) {
    let root = game.tree().root();
    game.ensure_analysis_requested(root);
    backend.answer_all(|q| reply(q, 0.0, &peaked(Some(expected)), "C3"));
    game.process_events();
}

const C3: Point = (2, 2);
const B2: Point = (1, 1);
const D4: Point = (3, 3);

// =============================================================================
// Autoplay tests
// =============================================================================

#[test]
fn test_engine_answers_a_good_move() {
    let (mut game, backend) = setup_game(Color::Black);
    answer_root(&mut game, &backend, C3);

    game.make_move(Move::Place(C3)).unwrap();
    assert_eq!(
        backend.answer_all(|q| reply(q, 0.0, &peaked(Some(D4)), "D4")),
        4,
        "default, player, opponent and target analyses"
    );
    assert_eq!(game.process_events(), 4);

    let id = game.update().expect("engine should move");
    let node = game.tree().node(id).unwrap();
    assert_eq!(node.played, Some(PlayedMove::new(Color::White, Move::Place(D4))));
    assert!(game.human_to_move());
    assert!(game.tree().node(node.parent.unwrap()).unwrap().autoplay_halt_reason().is_none());
}

#[test]
fn test_engine_waits_for_all_analyses() {
    let (mut game, backend) = setup_game(Color::Black);
    answer_root(&mut game, &backend, C3);
    game.make_move(Move::Place(C3)).unwrap();

    let mut queries = backend.take();
    let (query, callback) = queries.remove(0);
    callback(reply(&query, 0.0, &peaked(Some(D4)), "D4"));
    game.process_events();
    assert_eq!(game.update(), None);

    for (query, callback) in queries {
        callback(reply(&query, 0.0, &peaked(Some(D4)), "D4"));
    }
    game.process_events();
    assert!(game.update().is_some());
}

#[test]
fn test_engine_opens_when_human_plays_white() {
    let (mut game, backend) = setup_game(Color::White);
    assert!(!game.human_to_move());
    answer_root(&mut game, &backend, C3);

    let id = game.update().expect("engine should open");
    assert_eq!(
        game.tree().node(id).unwrap().played,
        Some(PlayedMove::new(Color::Black, Move::Place(C3)))
    );
}

#[test]
fn test_halts_after_unlikely_mistake() {
    let (mut game, backend) = setup_game(Color::Black);
    answer_root(&mut game, &backend, B2);

    // C3 loses three points and no policy expected it.
    let human = game.make_move(Move::Place(C3)).unwrap();
    backend.answer_all(|q| reply(q, -3.0, &peaked(Some(D4)), "D4"));
    game.process_events();

    assert_eq!(game.update(), None);
    let reason = game.tree().node(human).unwrap().autoplay_halt_reason().unwrap().to_string();
    assert!(reason.contains("max policy"), "{reason}");
    assert!(game.status().starts_with("Auto-play halted"));

    let stats = game.move_stats().unwrap();
    assert_eq!(stats.mistake_size, Some(3.0));
    assert_eq!(stats.max_prob(), 0.0);

    // Halting again keeps the first reason and still makes no move.
    assert_eq!(game.update(), None);
    assert_eq!(game.tree().current(), human);

    game.request_ai_move();
    let id = game.update().expect("explicit request overrides the halt");
    assert_eq!(
        game.tree().node(id).unwrap().played,
        Some(PlayedMove::new(Color::White, Move::Place(D4)))
    );
}

#[test]
fn test_small_mistake_does_not_halt() {
    let (mut game, backend) = setup_game(Color::Black);
    answer_root(&mut game, &backend, B2);

    game.make_move(Move::Place(C3)).unwrap();
    backend.answer_all(|q| reply(q, -0.5, &peaked(Some(D4)), "D4"));
    game.process_events();

    assert!(game.update().is_some());
}

#[test]
fn test_auto_play_off_waits_for_request() {
    let (mut game, backend) = setup_game(Color::Black);
    game.settings_mut().auto_play = false;
    answer_root(&mut game, &backend, C3);

    game.make_move(Move::Place(C3)).unwrap();
    backend.answer_all(|q| reply(q, 0.0, &peaked(Some(D4)), "D4"));
    game.process_events();
    assert_eq!(game.update(), None);

    game.request_ai_move();
    assert!(game.update().is_some());
}

#[test]
fn test_engine_passes_when_best_move_is_pass() {
    let (mut game, backend) = setup_game(Color::Black);
    answer_root(&mut game, &backend, C3);

    game.make_move(Move::Place(C3)).unwrap();
    backend.answer_all(|q| reply(q, 0.0, &peaked(Some(D4)), "pass"));
    game.process_events();

    let id = game.update().unwrap();
    assert!(game.tree().node(id).unwrap().is_pass());
}

#[test]
fn test_engine_passes_without_candidates() {
    let (mut game, backend) = setup_game(Color::Black);
    answer_root(&mut game, &backend, C3);

    game.make_move(Move::Place(C3)).unwrap();
    backend.answer_all(|q| reply(q, 0.0, &peaked(None), "D4"));
    game.process_events();

    let id = game.update().unwrap();
    assert!(game.tree().node(id).unwrap().is_pass());
}

#[test]
fn test_no_moves_after_two_passes() {
    let (mut game, backend) = setup_game(Color::Black);
    answer_root(&mut game, &backend, C3);

    game.make_move(Move::Pass).unwrap();
    backend.answer_all(|q| reply(q, 0.0, &peaked(Some(D4)), "pass"));
    game.process_events();
    let id = game.update().unwrap();
    assert!(game.tree().game_ended(id));

    backend.answer_all(|q| reply(q, 0.0, &peaked(Some(D4)), "pass"));
    game.process_events();
    assert_eq!(game.update(), None);
    assert_eq!(game.tree().move_number(), 2);
}

// =============================================================================
// Error handling tests
// =============================================================================

#[test]
fn test_analysis_error_discards_the_move() {
    let (mut game, backend) = setup_game(Color::Black);
    let root = game.tree().root();
    let id = game.make_move(Move::Place(C3)).unwrap();

    let mut queries = backend.take();
    let (query, callback) = queries.remove(0);
    callback(Err(AnalysisError::new(query.id, "Illegal move")));
    game.process_events();

    assert_eq!(game.tree().current(), root);
    assert!(!game.tree().contains(id));
    assert!(game.tree().current_node().children.is_empty());
    assert_eq!(game.status(), "Analysis error: Illegal move");

    // Late replies for the deleted node change nothing.
    for (query, callback) in queries {
        callback(reply(&query, 0.0, &peaked(Some(D4)), "D4"));
    }
    assert_eq!(game.process_events(), 3);
    assert_eq!(game.tree().current(), root);
    assert!(!game.tree().contains(id));
}

#[test]
fn test_deferred_analysis_keeps_the_move_and_asks_again() {
    let (mut game, backend) = setup_game(Color::Black);
    let id = game.make_move(Move::Place(C3)).unwrap();

    // Every query is turned away before reaching the engine.
    let refused = backend.answer_all(|q| {
        Err(AnalysisError::unavailable(q.id.clone(), "query queue is full"))
    });
    assert_eq!(refused, 4);
    game.process_events();

    assert_eq!(game.tree().current(), id);
    assert!(game.tree().contains(id));
    assert!(!game.tree().analysis_requested(id, &AnalysisKey::Default));
    assert_eq!(game.status(), "Analysis deferred: query queue is full");

    assert_eq!(game.update(), None);
    assert_eq!(backend.answer_all(|q| reply(q, 0.0, &peaked(Some(D4)), "D4")), 4);
    game.process_events();
    assert!(game.tree().analysis(id, &AnalysisKey::Default).is_some());
}

#[test]
fn test_write_failure_discards_the_move() {
    let (mut game, backend) = setup_game(Color::Black);
    let root = game.tree().root();
    let id = game.make_move(Move::Place(C3)).unwrap();

    backend.answer_all(|q| Err(AnalysisError::transport(q.id.clone(), "pipe closed")));
    game.process_events();

    assert_eq!(game.tree().current(), root);
    assert!(!game.tree().contains(id));
}

#[test]
fn test_unusable_analysis_keeps_the_move() {
    let (mut game, backend) = setup_game(Color::Black);
    let id = game.make_move(Move::Place(C3)).unwrap();

    // A profile reply without humanPolicy cannot be used.
    backend.answer_all(|q| {
        Ok(serde_json::from_value(json!({"id": q.id, "policy": peaked(Some(D4))})).unwrap())
    });
    game.process_events();

    assert_eq!(game.tree().current(), id);
    assert!(game.tree().analysis(id, &AnalysisKey::Default).is_some());
    assert!(game.status().starts_with("Unusable analysis"));
}

#[test]
fn test_replies_for_replaced_game_are_ignored() {
    let (mut game, backend) = setup_game(Color::Black);
    let root = game.tree().root();
    game.ensure_analysis_requested(root);
    let queries = backend.take();

    game.new_game(SIZE).unwrap();
    for (query, callback) in queries {
        callback(reply(&query, 0.0, &peaked(Some(D4)), "D4"));
    }
    assert_eq!(game.process_events(), 4);

    let root = game.tree().root();
    assert!(game.tree().analysis(root, &AnalysisKey::Default).is_none());
    assert!(!game.tree().analysis_requested(root, &AnalysisKey::Default));
}

// =============================================================================
// Deeper analysis tests
// =============================================================================

#[test]
fn test_deeper_analysis_replaces_the_default() {
    let (mut game, backend) = setup_game(Color::Black);
    let root = game.tree().root();
    answer_root(&mut game, &backend, C3);

    assert_eq!(game.request_deeper_analysis(), 500);
    let queries = backend.take();
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0].0.max_visits, 500);
    assert!(queries[0].0.override_settings.is_empty());
    for (query, callback) in queries {
        callback(reply(&query, 4.0, &peaked(Some(D4)), "D4"));
    }
    game.process_events();

    let analysis = game.tree().analysis(root, &AnalysisKey::Default).unwrap();
    assert_eq!(analysis.visit_count(), 500);
    assert_eq!(analysis.score_lead(), Some(4.0));

    // The next request doubles what is stored.
    assert_eq!(game.request_deeper_analysis(), 1000);
    backend.take();
}

#[test]
fn test_shallow_reply_after_deeper_one_is_ignored() {
    let (mut game, backend) = setup_game(Color::Black);
    let root = game.tree().root();
    game.ensure_analysis_requested(root);
    let mut shallow = backend.take();

    game.request_deeper_analysis();
    backend.answer_all(|q| reply(q, 4.0, &peaked(Some(D4)), "D4"));
    game.process_events();

    // The regular 24-visit default reply arrives late.
    let index = shallow
        .iter()
        .position(|(q, _)| q.override_settings.is_empty())
        .unwrap();
    let (query, callback) = shallow.remove(index);
    assert_eq!(query.max_visits, 24);
    callback(reply(&query, -2.0, &peaked(Some(C3)), "C3"));
    game.process_events();

    let analysis = game.tree().analysis(root, &AnalysisKey::Default).unwrap();
    assert_eq!(analysis.visit_count(), 500);
    assert_eq!(analysis.score_lead(), Some(4.0));
}

#[test]
fn test_failed_deeper_analysis_keeps_the_node() {
    let (mut game, backend) = setup_game(Color::Black);
    answer_root(&mut game, &backend, C3);
    let id = game.make_move(Move::Place(C3)).unwrap();
    backend.answer_all(|q| reply(q, 0.0, &peaked(Some(D4)), "D4"));
    game.process_events();

    game.request_deeper_analysis();
    backend.answer_all(|q| Err(AnalysisError::new(q.id.clone(), "out of memory")));
    game.process_events();

    assert_eq!(game.tree().current(), id);
    assert_eq!(game.tree().analysis(id, &AnalysisKey::Default).unwrap().visit_count(), 24);
    assert_eq!(game.status(), "Analysis error: out of memory");
}

// =============================================================================
// SGF tests
// =============================================================================

#[test]
fn test_failed_import_keeps_the_game() {
    let (mut game, _backend) = setup_game(Color::Black);
    game.make_move(Move::Place(C3)).unwrap();

    let err = game.import_sgf("(;SZ[5];B[cc];W[cc])").unwrap_err();
    assert!(matches!(err, SgfImportError::IllegalMove { index: 2, .. }));
    assert_eq!(game.tree().move_number(), 1);
    assert!(game.status().starts_with("Failed to import SGF"));
}

#[test]
fn test_import_requests_analysis_along_the_line() {
    let (mut game, backend) = setup_game(Color::Black);
    game.import_sgf("(;GM[1]SZ[5];B[cc];W[dd])").unwrap();

    let queries = backend.take();
    assert_eq!(queries.len(), 12);
    for depth in 0..3 {
        assert_eq!(queries.iter().filter(|(q, _)| q.moves.len() == depth).count(), 4);
    }
    assert_eq!(game.tree().move_number(), 2);
    assert_eq!(game.status(), "SGF imported successfully");
}

#[test]
fn test_export_names_the_players() {
    let (mut game, _backend) = setup_game(Color::White);
    let sgf = game.export_sgf();
    assert!(sgf.contains("PB[AI (rank_1k)]"), "{sgf}");
    assert!(sgf.contains("PW[Human]"), "{sgf}");
}
