//! User settings, stored as JSON.
//!
//! Every field has a default, so a settings file only needs the values that
//! differ. Command-line flags are applied on top by `main.rs`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};

use crate::board::Color;
use crate::constants::{
    DEFAULT_BOARD_SIZE, DEFAULT_ENGINE, DEFAULT_KOMI, DEFAULT_RULES, DEFAULT_VISITS,
    ENGINE_STARTUP_GRACE_MS, MAX_BOARD_SIZE,
};
use crate::mistake::HaltThresholds;
use crate::policy::SampleParams;
use crate::profiles::RankSettings;

/// How to launch the analysis engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineCommand {
    pub executable: String,
    /// Engine mode, the first argument.
    pub subcommand: String,
    pub config: Option<PathBuf>,
    pub model: Option<PathBuf>,
    pub human_model: Option<PathBuf>,
    /// Appended after everything else.
    pub extra_args: Vec<String>,
    /// How long the process must stay up to count as started.
    pub startup_grace_ms: u64,
}

impl Default for EngineCommand {
    fn default() -> Self {
        Self {
            executable: DEFAULT_ENGINE.into(),
            subcommand: "analysis".into(),
            config: None,
            model: None,
            human_model: None,
            extra_args: Vec::new(),
            startup_grace_ms: ENGINE_STARTUP_GRACE_MS,
        }
    }
}

impl EngineCommand {
    pub fn args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if !self.subcommand.is_empty() {
            args.push(self.subcommand.clone());
        }
        let paths = [
            ("-config", &self.config),
            ("-model", &self.model),
            ("-human-model", &self.human_model),
        ];
        for (flag, path) in paths {
            if let Some(path) = path {
                args.push(flag.into());
                args.push(path.display().to_string());
            }
        }
        args.extend(self.extra_args.iter().cloned());
        args
    }

    /// The command line, for logs.
    pub fn display(&self) -> String {
        std::iter::once(self.executable.clone())
            .chain(self.args())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub board_size: usize,
    pub rules: String,
    pub komi: f64,
    /// Colour the human plays.
    pub player_color: Color,
    /// Let the engine answer each human move by itself.
    pub auto_play: bool,
    /// Visits for the engine's own analysis.
    pub visits: u32,
    pub sampling: SampleParams,
    pub halt: HaltThresholds,
    pub ranks: RankSettings,
    pub engine: EngineCommand,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            board_size: DEFAULT_BOARD_SIZE,
            rules: DEFAULT_RULES.into(),
            komi: DEFAULT_KOMI,
            player_color: Color::Black,
            auto_play: true,
            visits: DEFAULT_VISITS,
            sampling: SampleParams::default(),
            halt: HaltThresholds::default(),
            ranks: RankSettings::default(),
            engine: EngineCommand::default(),
        }
    }
}

impl Settings {
    /// Read settings from a JSON file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file {}", path.display()))?;
        let settings: Settings = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse settings file {}", path.display()))?;
        settings.validate()?;
        log::info!("loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize settings")?;
        fs::write(path, json)
            .with_context(|| format!("failed to write settings file {}", path.display()))
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.board_size == 0 || self.board_size > MAX_BOARD_SIZE {
            bail!(
                "board size {} out of range (1-{MAX_BOARD_SIZE})",
                self.board_size
            );
        }
        if self.visits == 0 {
            bail!("visits must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.sampling.min_p) {
            bail!("min_p must be within 0-1, got {}", self.sampling.min_p);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiles::OpponentKind;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.board_size, 19);
        assert_eq!(settings.visits, 24);
        assert_eq!(settings.player_color, Color::Black);
        assert!(settings.auto_play);
        assert_eq!(settings.sampling.top_k, 50);
        assert_eq!(settings.ranks.player, "3k");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let settings: Settings = serde_json::from_str(
            r#"{"board_size": 9, "ranks": {"opponent_kind": "pro", "pro_year": 1913},
                "halt": {"mistake_size": 3.0}, "player_color": "White"}"#,
        )
        .unwrap();
        assert_eq!(settings.board_size, 9);
        assert_eq!(settings.player_color, Color::White);
        assert_eq!(settings.ranks.opponent_kind, OpponentKind::Pro);
        assert_eq!(settings.ranks.pro_year, 1913);
        assert_eq!(settings.ranks.target, "2d");
        assert_eq!(settings.halt.mistake_size, 3.0);
        assert_eq!(settings.halt.target_rank_prob, 0.20);
        assert_eq!(settings.visits, 24);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let settings = Settings {
            board_size: 40,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
        let settings = Settings {
            visits: 0,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_engine_args() {
        let command = EngineCommand {
            config: Some("analysis.cfg".into()),
            human_model: Some("human.bin.gz".into()),
            ..EngineCommand::default()
        };
        assert_eq!(
            command.args(),
            vec!["analysis", "-config", "analysis.cfg", "-human-model", "human.bin.gz"]
        );
        assert_eq!(
            command.display(),
            "katago analysis -config analysis.cfg -human-model human.bin.gz"
        );
    }

    #[test]
    fn test_load_and_save() {
        let path = std::env::temp_dir().join(format!("shape-go-settings-{}.json", std::process::id()));
        let settings = Settings {
            komi: 7.5,
            ..Settings::default()
        };
        settings.save(&path).unwrap();
        let loaded = Settings::load(&path).unwrap();
        let _ = fs::remove_file(&path);
        assert_eq!(loaded, settings);
        assert!(Settings::load(Path::new("/nonexistent/shape-go.json")).is_err());
    }
}
