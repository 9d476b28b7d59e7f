//! Text console in the style of the Go Text Protocol.
//!
//! Each line is an optional numeric id, a command and its arguments. Replies
//! are `=id message` on success and `?id message` on failure, followed by a
//! blank line. After every command the console waits for outstanding analyses
//! (and any engine reply move) before answering.
//!
//! ## Commands
//!
//! - `play [color] <vertex>` - play for the side to move
//! - `pass` - pass for the side to move
//! - `undo [n]`, `redo [n]` - navigate the main line
//! - `genmove` - let the engine move now, even after a halt
//! - `showboard` - print the board and status
//! - `stats` - policy statistics of the last move
//! - `halted` - why autoplay stopped here, if it did
//! - `history` - score lead per move
//! - `topmoves` - the engine's best candidates here
//! - `deeper` - analyze the current position with more visits
//! - `savesgf [file]` - write or print the game record
//! - `loadsgf <file>` - replace the game with a record
//! - `boardsize <n>` - start a new game
//! - `name`, `version`, `list_commands`, `known_command <cmd>`, `quit`

use std::fs;
use std::io::{self, BufRead, Write};
use std::time::Duration;

use crate::analysis::AnalysisKey;
use crate::board::Color;
use crate::constants::APP_NAME;
use crate::game::Game;
use crate::position::{Move, parse_coord};

/// The list of known console commands.
const KNOWN_COMMANDS: &[&str] = &[
    "boardsize",
    "deeper",
    "genmove",
    "halted",
    "history",
    "known_command",
    "list_commands",
    "loadsgf",
    "name",
    "pass",
    "play",
    "quit",
    "redo",
    "savesgf",
    "showboard",
    "stats",
    "topmoves",
    "undo",
    "version",
];

/// Candidates listed by `topmoves`.
const TOP_MOVES_SHOWN: usize = 5;

pub struct Console {
    game: Game,
    /// How long to wait for analyses after each command.
    timeout: Duration,
}

impl Console {
    pub fn new(game: Game, timeout: Duration) -> Self {
        Self { game, timeout }
    }

    pub fn game(&self) -> &Game {
        &self.game
    }

    /// Run the command loop on stdin and stdout.
    pub fn run(&mut self) -> io::Result<()> {
        let stdin = io::stdin();
        self.run_with(stdin.lock(), io::stdout())
    }

    pub fn run_with<R: BufRead, W: Write>(&mut self, input: R, mut output: W) -> io::Result<()> {
        // Analyze the starting position; the engine opens if it plays Black.
        self.game.settle(self.timeout);

        for line in input.lines() {
            let line = line?;

            // Skip empty lines and comments
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (id, command_line) = Self::parse_id(line);
            let parts: Vec<&str> = command_line.split_whitespace().collect();
            let Some((command, args)) = parts.split_first() else {
                continue;
            };
            let command = command.to_lowercase();

            let (success, message) = self.execute(&command, args);
            let prefix = if success { '=' } else { '?' };
            let id_str = id.map(|i| i.to_string()).unwrap_or_default();
            writeln!(output, "{prefix}{id_str} {message}\n")?;
            output.flush()?;

            if command == "quit" {
                break;
            }
        }
        Ok(())
    }

    /// Parse an optional numeric command id from the beginning of the line.
    fn parse_id(line: &str) -> (Option<u32>, &str) {
        let trimmed = line.trim();
        let end = trimmed
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(trimmed.len());
        match trimmed[..end].parse::<u32>() {
            Ok(id) => (Some(id), trimmed[end..].trim()),
            Err(_) => (None, trimmed),
        }
    }

    /// Execute a command and return (success, response).
    fn execute(&mut self, command: &str, args: &[&str]) -> (bool, String) {
        match command {
            "name" => (true, APP_NAME.to_string()),

            "version" => (true, env!("CARGO_PKG_VERSION").to_string()),

            "list_commands" => (true, KNOWN_COMMANDS.join("\n")),

            "known_command" => match args.first() {
                Some(cmd) => {
                    let known = KNOWN_COMMANDS.contains(&cmd.to_lowercase().as_str());
                    (true, known.to_string())
                }
                None => (false, "missing argument".to_string()),
            },

            "quit" => (true, String::new()),

            "boardsize" => {
                let Some(arg) = args.first() else {
                    return (false, "missing argument".to_string());
                };
                let Ok(size) = arg.parse::<usize>() else {
                    return (false, "invalid size".to_string());
                };
                match self.game.new_game(size) {
                    Ok(()) => {
                        self.game.settle(self.timeout);
                        (true, String::new())
                    }
                    Err(err) => (false, err.to_string()),
                }
            }

            "play" => {
                let (color, vertex) = match args {
                    [vertex] => (None, *vertex),
                    [color, vertex, ..] => (Color::parse(color), *vertex),
                    [] => return (false, "missing argument".to_string()),
                };
                let to_move = self.game.tree().next_player(self.game.tree().current());
                if color.is_some_and(|c| c != to_move) {
                    return (false, format!("it is {to_move}'s turn"));
                }
                let Some(mv) = parse_coord(vertex, self.game.tree().size()) else {
                    return (false, format!("invalid vertex '{vertex}'"));
                };
                self.play(mv)
            }

            "pass" => self.play(Move::Pass),

            "undo" | "redo" => {
                let n = match args.first().map(|a| a.parse::<usize>()) {
                    None => 1,
                    Some(Ok(n)) => n,
                    Some(Err(_)) => return (false, "invalid count".to_string()),
                };
                let steps = if command == "undo" {
                    self.game.undo(n)
                } else {
                    self.game.redo(n)
                };
                self.game.settle(self.timeout);
                (true, steps.to_string())
            }

            "genmove" => {
                let before = self.game.tree().current();
                self.game.request_ai_move();
                self.game.settle(self.timeout);
                if self.game.tree().current() == before {
                    return (false, self.game.status().to_string());
                }
                (true, self.last_move())
            }

            "showboard" => {
                let tree = self.game.tree();
                let node = tree.current_node();
                (
                    true,
                    format!(
                        "\n{}move {}, {} to play\n{}",
                        node.board,
                        node.depth,
                        tree.next_player(node.id),
                        self.game.status()
                    ),
                )
            }

            "stats" => match self.game.move_stats() {
                Some(stats) => (
                    true,
                    format!(
                        "{}: player {:.2}%, target {:.2}%, ai {:.2}%, like target {:.1}%, lost {}",
                        stats.mv,
                        stats.player_prob * 100.0,
                        stats.target_prob * 100.0,
                        stats.ai_prob * 100.0,
                        stats.move_like_target * 100.0,
                        stats
                            .mistake_size
                            .map_or_else(|| "?".to_string(), |m| format!("{m:.1}"))
                    ),
                ),
                None => (false, "no analysed move here".to_string()),
            },

            "halted" => {
                let reason = self.game.tree().current_node().autoplay_halt_reason();
                (true, reason.unwrap_or("not halted").to_string())
            }

            "history" => {
                let lines: Vec<String> = self
                    .game
                    .tree()
                    .score_history()
                    .into_iter()
                    .map(|(n, lead)| match lead {
                        Some(lead) => format!("{n} {lead:+.1}"),
                        None => format!("{n} ?"),
                    })
                    .collect();
                (true, lines.join("\n"))
            }

            "topmoves" => {
                let tree = self.game.tree();
                let Some(analysis) = tree.analysis(tree.current(), &AnalysisKey::Default) else {
                    return (false, "no analysis here".to_string());
                };
                let lines: Vec<String> = analysis
                    .ai_moves()
                    .iter()
                    .take(TOP_MOVES_SHOWN)
                    .map(|info| {
                        format!(
                            "{} {} {} {}",
                            info.mv,
                            info.winrate
                                .map_or_else(|| "?".to_string(), |w| format!("{:.1}%", w * 100.0)),
                            info.score_lead
                                .map_or_else(|| "?".to_string(), |l| format!("{l:+.1}")),
                            info.visits
                        )
                    })
                    .collect();
                (true, lines.join("\n"))
            }

            "deeper" => {
                let visits = self.game.request_deeper_analysis();
                self.game.settle(self.timeout);
                (true, format!("{visits} visits"))
            }

            "savesgf" => {
                let sgf = self.game.export_sgf();
                match args.first() {
                    None => (true, sgf.trim_end().to_string()),
                    Some(path) => match fs::write(path, &sgf) {
                        Ok(()) => (true, format!("saved to {path}")),
                        Err(err) => (false, format!("cannot write {path}: {err}")),
                    },
                }
            }

            "loadsgf" => {
                let Some(path) = args.first() else {
                    return (false, "missing argument".to_string());
                };
                let text = match fs::read_to_string(path) {
                    Ok(text) => text,
                    Err(err) => return (false, format!("cannot read {path}: {err}")),
                };
                match self.game.import_sgf(&text) {
                    Ok(()) => {
                        self.game.settle(self.timeout);
                        (true, format!("{} moves", self.game.tree().move_number()))
                    }
                    Err(err) => (false, err.to_string()),
                }
            }

            _ => (false, format!("unknown command: {command}")),
        }
    }

    /// Play for the side to move, then let analyses and autoplay run.
    fn play(&mut self, mv: Move) -> (bool, String) {
        let played = match self.game.make_move(mv) {
            Ok(id) => id,
            Err(err) => return (false, err.to_string()),
        };
        self.game.settle(self.timeout);
        if self.game.tree().current() == played {
            (true, String::new())
        } else {
            (true, self.last_move())
        }
    }

    /// The move that led to the current node, as `B D4`.
    fn last_move(&self) -> String {
        self.game
            .tree()
            .current_node()
            .played
            .map(|p| p.to_string())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};

    use super::*;
    use crate::analysis::{AnalysisPayload, MoveInfo, RootInfo};
    use crate::engine::{AnalysisBackend, Callback, Query};
    use crate::position::str_coord;
    use crate::settings::Settings;
    use crate::tree::GameTree;

    /// Answers at once with a flat policy over the empty points. The first
    /// empty point is the engine's only candidate.
    struct FlatBackend {
        counter: AtomicU64,
    }

    impl AnalysisBackend for FlatBackend {
        fn submit(&self, query: Query, callback: Callback) {
            let mut tree = GameTree::new(query.board_x_size).unwrap();
            for [color, vertex] in &query.moves {
                let color = Color::parse(color).unwrap();
                let mv = parse_coord(vertex, tree.size()).unwrap();
                tree.play(color, mv).unwrap();
            }
            let board = &tree.current_node().board;
            let mut policy: Vec<f64> = (0..board.size)
                .rev()
                .flat_map(|row| (0..board.size).map(move |col| (col, row)))
                .map(|(col, row)| if board.get(col, row).is_none() { 1.0 } else { 0.0 })
                .collect();
            policy.push(0.0);
            let best = board
                .points()
                .find(|&(col, row)| board.get(col, row).is_none())
                .map_or(Move::Pass, Move::Place);
            let move_infos = vec![MoveInfo {
                mv: str_coord(best),
                visits: query.max_visits,
                winrate: Some(0.55),
                score_lead: Some(1.5),
                prior: None,
                order: Some(0),
                pv: Vec::new(),
            }];
            let payload = AnalysisPayload {
                id: query.id,
                root_info: RootInfo {
                    score_lead: Some(1.5),
                    winrate: Some(0.55),
                    visits: query.max_visits,
                },
                human_policy: query.override_settings.contains_key("humanSLProfile").then(|| policy.clone()),
                policy: Some(policy),
                move_infos,
            };
            callback(Ok(payload));
        }

        fn num_outstanding_queries(&self) -> usize {
            0
        }

        fn next_counter(&self) -> u64 {
            self.counter.fetch_add(1, Ordering::SeqCst) + 1
        }
    }

    fn console() -> Console {
        let settings = Settings {
            board_size: 5,
            ..Settings::default()
        };
        let backend = Arc::new(FlatBackend {
            counter: AtomicU64::new(0),
        });
        let mut game = Game::new(settings, backend).unwrap();
        game.seed(3);
        Console::new(game, Duration::from_secs(1))
    }

    #[test]
    fn test_parse_id_with_id() {
        let (id, cmd) = Console::parse_id("123 name");
        assert_eq!(id, Some(123));
        assert_eq!(cmd, "name");
    }

    #[test]
    fn test_parse_id_without_id() {
        let (id, cmd) = Console::parse_id("name");
        assert_eq!(id, None);
        assert_eq!(cmd, "name");
    }

    #[test]
    fn test_name_command() {
        let mut console = console();
        let (success, response) = console.execute("name", &[]);
        assert!(success);
        assert_eq!(response, "shape-go");
    }

    #[test]
    fn test_known_command() {
        let mut console = console();
        assert_eq!(console.execute("known_command", &["savesgf"]), (true, "true".into()));
        assert_eq!(console.execute("known_command", &["komi"]), (true, "false".into()));
        assert!(!console.execute("known_command", &[]).0);
    }

    #[test]
    fn test_play_gets_an_engine_reply() {
        let mut console = console();
        let (success, reply) = console.execute("play", &["C3"]);
        assert!(success);
        assert!(reply.starts_with("W "), "{reply}");
        assert_eq!(console.game().tree().move_number(), 2);
    }

    #[test]
    fn test_play_rejects_bad_input() {
        let mut console = console();
        assert!(!console.execute("play", &[]).0);
        assert!(!console.execute("play", &["Z9"]).0);
        assert!(!console.execute("play", &["white", "C3"]).0);
        console.execute("play", &["black", "C3"]);
        assert!(!console.execute("play", &["C3"]).0);
    }

    #[test]
    fn test_undo_and_redo() {
        let mut console = console();
        console.execute("play", &["C3"]);
        assert_eq!(console.execute("undo", &["2"]), (true, "2".into()));
        assert_eq!(console.game().tree().move_number(), 0);
        assert_eq!(console.execute("redo", &[]), (true, "1".into()));
        assert!(!console.execute("undo", &["x"]).0);
    }

    #[test]
    fn test_genmove_on_human_turn() {
        let mut console = console();
        let (success, reply) = console.execute("genmove", &[]);
        assert!(success);
        assert!(reply.starts_with("B "), "{reply}");
    }

    #[test]
    fn test_topmoves_lists_engine_candidates() {
        let mut console = console();
        assert_eq!(console.execute("topmoves", &[]), (false, "no analysis here".into()));

        console.execute("play", &["C3"]);
        let (success, reply) = console.execute("topmoves", &[]);
        assert!(success);
        assert!(reply.ends_with(" 55.0% +1.5 24"), "{reply}");
        assert_eq!(reply.lines().count(), 1);
    }

    #[test]
    fn test_deeper_doubles_the_visits() {
        let mut console = console();
        console.execute("play", &["C3"]);
        let current = console.game().tree().current();
        assert_eq!(console.execute("deeper", &[]), (true, "500 visits".into()));
        assert_eq!(console.execute("deeper", &[]), (true, "1000 visits".into()));

        let tree = console.game().tree();
        assert_eq!(tree.current(), current);
        let analysis = tree.analysis(current, &AnalysisKey::Default).unwrap();
        assert_eq!(analysis.visit_count(), 1000);
    }

    #[test]
    fn test_boardsize_and_savesgf() {
        let mut console = console();
        assert!(console.execute("boardsize", &["9"]).0);
        assert!(!console.execute("boardsize", &["99"]).0);
        assert_eq!(console.game().tree().size(), 9);
        let (success, sgf) = console.execute("savesgf", &[]);
        assert!(success);
        assert!(sgf.contains("SZ[9]PB[Human]PW[AI (rank_1k)]"), "{sgf}");
    }

    #[test]
    fn test_run_with_formats_replies() {
        let mut console = console();
        let mut output = Vec::new();
        console
            .run_with("1 name\n\n# comment\nbogus\nquit\nname\n".as_bytes(), &mut output)
            .unwrap();
        let output = String::from_utf8(output).unwrap();
        assert_eq!(output, "=1 shape-go\n\n? unknown command: bogus\n\n= \n\n");
    }
}
