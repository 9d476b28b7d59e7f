//! Integration tests for shape-go
//!
//! These exercise the rules, the game tree and SGF records together through
//! the public API, without an analysis engine.

use shape_go::analysis::{Analysis, AnalysisKey, AnalysisPayload};
use shape_go::board::Color;
use shape_go::error::SgfImportError;
use shape_go::position::{Move, parse_coord, parse_sgf_coord, sgf_coord, str_coord};
use shape_go::sgf;
use shape_go::tree::GameTree;

// =============================================================================
// Helper functions for setting up test positions
// =============================================================================

/// Play a sequence of GTP moves, alternating colours from Black.
/// "pass" can be used to pass.
fn setup_tree(size: usize, moves: &[&str]) -> GameTree {
    let mut tree = GameTree::new(size).unwrap();
    for mv in moves {
        let color = tree.next_player(tree.current());
        let parsed = parse_coord(mv, size).unwrap_or_else(|| panic!("bad coordinate {mv}"));
        tree.play(color, parsed).unwrap();
    }
    tree
}

/// An analysis of `key` with the given visits and score lead on a 5x5 board.
fn analysis(key: AnalysisKey, visits: u32, lead: f64) -> Analysis {
    let mut policy = vec![1.0 / 25.0; 25];
    policy.push(0.0);
    let payload: AnalysisPayload = serde_json::from_value(serde_json::json!({
        "id": "test",
        "rootInfo": {"scoreLead": lead, "winrate": 0.5, "visits": visits},
        "policy": policy,
        "humanPolicy": policy,
    }))
    .unwrap();
    Analysis::from_payload(key, payload).unwrap()
}

/// White surrounds Black's B2 on four sides and takes it with B3.
const CAPTURE_LINE: &[&str] = &["B2", "A2", "C3", "B1", "D4", "C2", "E5", "B3"];

// =============================================================================
// Coordinate tests
// =============================================================================

#[test]
fn test_gtp_coordinates_skip_i() {
    assert_eq!(parse_coord("H1", 19), Some(Move::Place((7, 0))));
    assert_eq!(parse_coord("J1", 19), Some(Move::Place((8, 0))));
    assert_eq!(parse_coord("I1", 19), None);
    assert_eq!(str_coord(Move::Place((8, 18))), "J19");
}

#[test]
fn test_coordinates_roundtrip_on_all_points() {
    let size = 9;
    for col in 0..size {
        for row in 0..size {
            let mv = Move::Place((col, row));
            assert_eq!(parse_coord(&str_coord(mv), size), Some(mv));
            assert_eq!(parse_sgf_coord(&sgf_coord(mv, size), size), Some(mv));
        }
    }
}

#[test]
fn test_sgf_rows_count_from_top() {
    assert_eq!(sgf_coord(parse_coord("D4", 19).unwrap(), 19), "dp");
    assert_eq!(sgf_coord(parse_coord("A1", 5).unwrap(), 5), "ae");
    assert_eq!(parse_sgf_coord("tt", 19), Some(Move::Pass));
    assert_eq!(parse_sgf_coord("", 9), Some(Move::Pass));
}

// =============================================================================
// Rules tests
// =============================================================================

#[test]
fn test_b2_capture() {
    let tree = setup_tree(5, CAPTURE_LINE);
    let node = tree.current_node();
    assert_eq!(node.captures, 1);
    assert_eq!(node.board.get(1, 1), None, "B2 should be captured");
    assert_eq!(node.board.get(1, 2), Some(Color::White));
    assert_eq!(node.board.count(Color::Black), 3);
    assert_eq!(node.board.count(Color::White), 4);
}

#[test]
fn test_occupied_point_is_rejected_without_change() {
    let mut tree = setup_tree(5, &["C3"]);
    let before = tree.current();
    let err = tree.play(Color::White, Move::Place((2, 2)));
    assert!(err.is_err());
    assert_eq!(tree.current(), before);
    assert!(tree.current_node().children.is_empty());
}

#[test]
fn test_suicide_removes_own_group() {
    // Black surrounds A1; White playing there captures nothing and dies.
    let mut tree = setup_tree(5, &["A2", "pass", "B1", "pass"]);
    let id = tree.play(Color::White, Move::Place((0, 0))).unwrap();
    let node = tree.node(id).unwrap();
    assert_eq!(node.board.get(0, 0), None);
    assert_eq!(node.board.count(Color::White), 0);
    assert_eq!(node.captures, 0);
}

#[test]
fn test_two_passes_end_the_game() {
    let tree = setup_tree(5, &["C3", "pass"]);
    assert!(!tree.game_ended(tree.current()));
    let tree = setup_tree(5, &["C3", "pass", "pass"]);
    assert!(tree.game_ended(tree.current()));
}

// =============================================================================
// Game tree tests
// =============================================================================

#[test]
fn test_branching_keeps_both_lines() {
    let mut tree = setup_tree(5, &["C3", "B2"]);
    tree.undo(1);
    let branch = tree.play(Color::White, Move::Place((3, 3))).unwrap();
    let parent = tree.node(branch).unwrap().parent.unwrap();
    assert_eq!(tree.node(parent).unwrap().children.len(), 2);

    // Replaying an existing move re-enters it.
    tree.undo(1);
    let again = tree.play(Color::White, Move::Place((3, 3))).unwrap();
    assert_eq!(again, branch);
    assert_eq!(tree.node(parent).unwrap().children.len(), 2);
}

#[test]
fn test_undo_redo_follow_first_child() {
    let mut tree = setup_tree(5, CAPTURE_LINE);
    assert_eq!(tree.undo(3), 3);
    assert_eq!(tree.move_number(), 5);
    assert_eq!(tree.redo(10), 3);
    assert_eq!(tree.move_number(), 8);
    assert_eq!(tree.undo(100), 8);
    assert_eq!(tree.current(), tree.root());
    assert_eq!(tree.last_node(), tree.path_from_root(tree.last_node())[8]);
}

#[test]
fn test_delete_child_frees_subtree_and_moves_current() {
    let mut tree = setup_tree(5, &["C3", "B2", "D4"]);
    let path = tree.path_from_root(tree.current());
    let (first, second) = (path[1], path[2]);

    assert!(tree.delete_child(first, second));
    assert_eq!(tree.current(), first);
    assert!(!tree.contains(second));
    assert!(!tree.contains(path[3]));
    assert!(tree.node(first).unwrap().children.is_empty());
    assert!(!tree.delete_child(first, second));
}

#[test]
fn test_analysis_with_fewer_visits_is_ignored() {
    let mut tree = setup_tree(5, &["C3"]);
    let id = tree.current();
    assert!(tree.store_analysis(id, analysis(AnalysisKey::Default, 100, 2.0)));
    assert!(!tree.store_analysis(id, analysis(AnalysisKey::Default, 10, -5.0)));
    assert_eq!(tree.analysis(id, &AnalysisKey::Default).unwrap().score_lead(), Some(2.0));
    assert!(tree.store_analysis(id, analysis(AnalysisKey::Default, 100, 1.0)));
    assert_eq!(tree.analysis(id, &AnalysisKey::Default).unwrap().score_lead(), Some(1.0));
}

#[test]
fn test_mistake_size_from_score_history() {
    let mut tree = setup_tree(5, &["C3", "B2"]);
    let path = tree.path_from_root(tree.current());
    for (&id, lead) in path.iter().zip([0.5, 3.0, 1.0]) {
        tree.store_analysis(id, analysis(AnalysisKey::Default, 24, lead));
    }

    // Black's C3 gained 2.5 for Black; White's B2 won back 2.0.
    assert_eq!(tree.mistake_size(path[1]), Some(-2.5));
    assert_eq!(tree.mistake_size(path[2]), Some(-2.0));
    assert_eq!(tree.mistake_size(path[0]), None);
    assert_eq!(
        tree.score_history(),
        vec![(0, Some(0.5)), (1, Some(3.0)), (2, Some(1.0))]
    );
}

// =============================================================================
// SGF tests
// =============================================================================

#[test]
fn test_sgf_roundtrip_with_pass() {
    let mut tree = setup_tree(5, &["C3", "pass", "B2"]);
    tree.info.black_name = Some("Human".into());
    let text = sgf::export(&tree);
    assert!(text.contains("SZ[5]"));
    assert!(text.contains(";W[]"));
    assert!(text.contains("PB[Human]"));

    let imported = sgf::import(&text).unwrap();
    assert_eq!(imported.size(), 5);
    assert_eq!(imported.moves_from_root(imported.current()), tree.moves_from_root(tree.current()));
    assert_eq!(imported.current_node().board, tree.current_node().board);
    assert_eq!(imported.info.black_name.as_deref(), Some("Human"));
}

#[test]
fn test_sgf_export_only_writes_current_line() {
    let mut tree = setup_tree(5, &["C3", "B2", "D4"]);
    tree.undo(2);
    let text = sgf::export(&tree);
    assert!(text.contains(";B[cc]"));
    assert!(!text.contains("W["));
}

#[test]
fn test_sgf_import_replays_captures() {
    let tree = setup_tree(5, CAPTURE_LINE);
    let imported = sgf::import(&sgf::export(&tree)).unwrap();
    assert_eq!(imported.current_node().captures, 1);
    assert_eq!(imported.current_node().board.get(1, 1), None);
}

#[test]
fn test_sgf_import_errors() {
    assert!(matches!(sgf::import("hello"), Err(SgfImportError::NotSgf)));
    assert!(matches!(
        sgf::import("(;SZ[5];B[cc];W[zz])"),
        Err(SgfImportError::InvalidCoordinate { index: 2, .. })
    ));
    assert!(matches!(
        sgf::import("(;SZ[5];B[cc];W[cc])"),
        Err(SgfImportError::IllegalMove { index: 2, .. })
    ));
    assert!(matches!(
        sgf::import("(;SZ[99])"),
        Err(SgfImportError::InvalidBoardSize { .. })
    ));
}
