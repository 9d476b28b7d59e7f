//! shape-go: play Go with feedback from an external analysis engine.
//!
//! The engine is a separate process speaking line-delimited JSON. This crate
//! keeps the game history as a branching tree of positions, asks the engine
//! to analyze them, and uses the results to pick engine moves that imitate a
//! chosen human strength and to stop autoplay after a player's mistakes.
//!
//! ## Modules
//!
//! - [`board`] - Stones, groups, captures
//! - [`position`] - Moves and GTP/SGF coordinates
//! - [`tree`] - Branching game history with per-node analyses
//! - [`analysis`] - Parsed engine results
//! - [`policy`] - Policy grids and top-k/top-p/min-p sampling
//! - [`engine`] - Engine process and query correlation
//! - [`mistake`] - Score-loss detection and autoplay halting
//! - [`profiles`] - Human-strength profiles and rank labels
//! - [`sgf`] - Game record import and export
//! - [`game`] - The controller tying it together
//! - [`settings`] - JSON settings
//! - [`console`] - Text command loop
//!
//! ## Example
//!
//! ```
//! use shape_go::board::Color;
//! use shape_go::position::{Move, parse_coord};
//! use shape_go::tree::GameTree;
//!
//! let mut tree = GameTree::new(5).unwrap();
//! tree.play(Color::Black, parse_coord("B2", 5).unwrap()).unwrap();
//! tree.play(Color::White, Move::Pass).unwrap();
//!
//! assert_eq!(tree.move_number(), 2);
//! assert_eq!(tree.current_node().board.get(1, 1), Some(Color::Black));
//! println!("{}", shape_go::sgf::export(&tree));
//! ```

pub mod analysis;
pub mod board;
pub mod console;
pub mod constants;
pub mod engine;
pub mod error;
pub mod game;
pub mod mistake;
pub mod policy;
pub mod position;
pub mod profiles;
pub mod settings;
pub mod sgf;
pub mod tree;
