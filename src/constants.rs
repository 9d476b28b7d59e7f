//! Default values for the board, the analysis engine, sampling and mistake
//! feedback.
//!
//! Everything here is a default only. The board size is chosen per game and
//! every other value can be overridden through [`crate::settings::Settings`].

// =============================================================================
// Board Geometry
// =============================================================================

/// Board size used when a game or an SGF record does not specify one.
pub const DEFAULT_BOARD_SIZE: usize = 19;

/// Largest board the letter coordinates can address (A..Z without I).
pub const MAX_BOARD_SIZE: usize = 25;

/// Column letters used by GTP coordinates. `I` is skipped.
pub const GTP_COLUMNS: &[u8] = b"ABCDEFGHJKLMNOPQRSTUVWXYZ";

// =============================================================================
// Game Record Defaults
// =============================================================================

/// Ruleset written to new game records.
pub const DEFAULT_RULES: &str = "JP";

/// Komi written to new game records.
pub const DEFAULT_KOMI: f64 = 6.5;

/// Application name written to exported SGF files.
pub const APP_NAME: &str = "shape-go";

// =============================================================================
// Analysis Engine
// =============================================================================

/// Default engine executable, looked up on `PATH`.
pub const DEFAULT_ENGINE: &str = "katago";

/// How long a freshly spawned engine must stay alive to count as started.
pub const ENGINE_STARTUP_GRACE_MS: u64 = 100;

/// Capacity of the outgoing query queue.
pub const QUERY_QUEUE_CAPACITY: usize = 1024;

/// Visit budget for the engine's own analysis.
pub const DEFAULT_VISITS: u32 = 24;

/// Smallest visit budget for a deeper analysis of the current position.
pub const DEEPER_ANALYSIS_MIN_VISITS: u32 = 500;

/// Visit budget for human-profile analyses. Only the policy is used.
pub const HUMAN_PROFILE_VISITS: u32 = 1;

/// Symmetries sampled at the root for human-profile queries (max quality policy).
pub const HUMAN_PROFILE_SYMMETRIES: u32 = 8;

// =============================================================================
// Policy Sampling
// =============================================================================

/// Default number of candidates kept by the sampler.
pub const DEFAULT_TOP_K: usize = 50;

/// Default cumulative probability cutoff.
pub const DEFAULT_TOP_P: f64 = 1.0;

/// Default probability floor, relative to the best candidate.
pub const DEFAULT_MIN_P: f64 = 0.05;

// =============================================================================
// Mistake Feedback
// =============================================================================

/// Score loss (points) above which a move can halt autoplay.
pub const DEFAULT_MISTAKE_SIZE: f64 = 1.0;

/// Halt when the move looks this unlikely for the target rank.
pub const DEFAULT_TARGET_RANK_PROB: f64 = 0.20;

/// Halt when no policy gives the move at least this probability.
pub const DEFAULT_MAX_POLICY_PROB: f64 = 0.01;

/// Floor on the denominator of the target-likeness ratio.
pub const MOVE_LIKE_TARGET_EPSILON: f64 = 1e-10;

// =============================================================================
// Ranks
// =============================================================================

/// Rank ids offered for selection: `-20` is 20k, `0` is 1d, `8` is 9d.
pub const RANK_RANGE: std::ops::Range<i32> = -20..9;

/// Default rank of the human player.
pub const DEFAULT_PLAYER_RANK: &str = "3k";

/// Default rank the human player is aiming for.
pub const DEFAULT_TARGET_RANK: &str = "2d";

/// Default rank of the sampled opponent.
pub const DEFAULT_OPPONENT_RANK: &str = "1k";

/// Default year for the professional opponent profile.
pub const DEFAULT_PRO_YEAR: u32 = 1985;
