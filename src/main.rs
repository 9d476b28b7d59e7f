//! shape-go: play Go against an engine that imitates human ranks.
//!
//! ## Usage
//!
//! - `shape-go` - Show an offline demo
//! - `shape-go play` - Play through the text console
//! - `shape-go analyze game.sgf` - Print the score lead of every move
//! - `shape-go demo` - Run the offline demo

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};

use shape_go::analysis::AnalysisKey;
use shape_go::board::Color;
use shape_go::console::Console;
use shape_go::engine::EngineSession;
use shape_go::game::Game;
use shape_go::position::Move;
use shape_go::profiles::OpponentKind;
use shape_go::settings::Settings;
use shape_go::tree::GameTree;

/// shape-go: play Go with feedback from an analysis engine
#[derive(Parser)]
#[command(name = "shape-go")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON settings file
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `shape_go::engine=debug`
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Settings that can be changed from the command line.
#[derive(clap::Args)]
struct Overrides {
    /// Engine executable
    #[arg(long, global = true)]
    engine: Option<String>,
    /// Engine analysis config
    #[arg(long, global = true)]
    engine_config: Option<PathBuf>,
    /// Engine model
    #[arg(long, global = true)]
    model: Option<PathBuf>,
    /// Human-imitation model
    #[arg(long, global = true)]
    human_model: Option<PathBuf>,
    #[arg(long, global = true)]
    board_size: Option<usize>,
    /// Visits for the engine's own analysis
    #[arg(long, global = true)]
    visits: Option<u32>,
    /// Colour you play: black or white
    #[arg(long, global = true)]
    color: Option<String>,
    /// Your rank, e.g. 3k
    #[arg(long, global = true)]
    rank: Option<String>,
    /// Rank you are aiming for
    #[arg(long, global = true)]
    target: Option<String>,
    /// Rank the engine imitates
    #[arg(long, global = true)]
    opponent: Option<String>,
    #[arg(long, global = true, value_enum)]
    opponent_kind: Option<OpponentKind>,
    /// Let the engine move only when asked
    #[arg(long, global = true)]
    no_auto_play: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Play through the text console
    Play {
        /// Seconds to wait for analyses after each command
        #[arg(long, default_value_t = 60)]
        timeout: u64,
    },
    /// Analyze every position of a game record
    Analyze {
        sgf: PathBuf,
        #[arg(long, default_value_t = 600)]
        timeout: u64,
    },
    /// Run an offline demo of the rules engine
    Demo,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
        .init();

    match cli.command {
        Some(Commands::Play { timeout }) => {
            let settings = load_settings(cli.settings.as_deref(), cli.overrides)?;
            let game = start_game(settings)?;
            let mut console = Console::new(game, Duration::from_secs(timeout));
            console.run().context("console I/O failed")?;
        }
        Some(Commands::Analyze { sgf, timeout }) => {
            let settings = load_settings(cli.settings.as_deref(), cli.overrides)?;
            analyze(settings, &sgf, Duration::from_secs(timeout))?;
        }
        Some(Commands::Demo) | None => run_demo()?,
    }
    Ok(())
}

fn load_settings(path: Option<&std::path::Path>, o: Overrides) -> anyhow::Result<Settings> {
    let mut settings = match path {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    if let Some(engine) = o.engine {
        settings.engine.executable = engine;
    }
    settings.engine.config = o.engine_config.or(settings.engine.config);
    settings.engine.model = o.model.or(settings.engine.model);
    settings.engine.human_model = o.human_model.or(settings.engine.human_model);
    if let Some(size) = o.board_size {
        settings.board_size = size;
    }
    if let Some(visits) = o.visits {
        settings.visits = visits;
    }
    if let Some(color) = o.color {
        let Some(color) = Color::parse(&color) else {
            bail!("unknown colour '{color}', expected black or white");
        };
        settings.player_color = color;
    }
    if let Some(rank) = o.rank {
        settings.ranks.player = rank;
    }
    if let Some(target) = o.target {
        settings.ranks.target = target;
    }
    if let Some(opponent) = o.opponent {
        settings.ranks.opponent = opponent;
    }
    if let Some(kind) = o.opponent_kind {
        settings.ranks.opponent_kind = kind;
    }
    if o.no_auto_play {
        settings.auto_play = false;
    }
    settings.validate()?;
    Ok(settings)
}

fn start_game(settings: Settings) -> anyhow::Result<Game> {
    let engine = EngineSession::spawn(&settings.engine).context("could not start the engine")?;
    Ok(Game::new(settings, Arc::new(engine))?)
}

fn analyze(mut settings: Settings, path: &std::path::Path, timeout: Duration) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    settings.auto_play = false;
    let mut game = start_game(settings)?;
    game.import_sgf(&text)
        .with_context(|| format!("failed to import {}", path.display()))?;
    if !game.settle(timeout) {
        log::warn!("timed out with analyses outstanding");
    }

    let tree = game.tree();
    for id in tree.path_from_root(tree.current()) {
        let Some(node) = tree.node(id) else { continue };
        let played = node.played.map_or_else(|| "root".to_string(), |p| p.to_string());
        let lead = tree
            .analysis(id, &AnalysisKey::Default)
            .and_then(|a| a.score_lead())
            .map_or_else(|| "?".to_string(), |l| format!("{l:+.1}"));
        let lost = tree
            .mistake_size(id)
            .map_or_else(String::new, |m| format!("  lost {m:.1}"));
        println!("{:>3} {played:<8} {lead:>6}{lost}", node.depth);
    }
    Ok(())
}

fn run_demo() -> anyhow::Result<()> {
    println!("shape-go: rules engine demo\n");

    // White surrounds Black's B2 and captures it with B3.
    let mut tree = GameTree::new(5)?;
    let moves = [
        (Color::Black, Move::Place((1, 1))),
        (Color::White, Move::Place((0, 1))),
        (Color::Black, Move::Place((2, 2))),
        (Color::White, Move::Place((1, 0))),
        (Color::Black, Move::Place((3, 3))),
        (Color::White, Move::Place((2, 1))),
        (Color::Black, Move::Place((4, 4))),
        (Color::White, Move::Place((1, 2))),
    ];
    for (color, mv) in moves {
        tree.play(color, mv)?;
    }
    let node = tree.current_node();
    println!("{}", node.board);
    println!(
        "last move {} captured {} stone(s)\n",
        node.played.map(|p| p.to_string()).unwrap_or_default(),
        node.captures
    );
    println!("{}", shape_go::sgf::export(&tree));
    Ok(())
}
