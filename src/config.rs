//! Configuration loading from TOML.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs. The
//! roster, course and stakes are validated into an explicit
//! [`RoundContext`] and [`Round`] rather than living in globals.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;

use crate::engine::skins::SkinsPolicy;
use crate::engine::snake::SnakeRuleKind;
use crate::engine::Round;
use crate::types::{BetConfiguration, FairwayError, Pairing, RoundContext, Team};

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub round: RoundConfig,
    #[serde(default)]
    pub course: CourseConfig,
    #[serde(default)]
    pub bets: BetConfiguration,
    #[serde(default)]
    pub skins: SkinsConfig,
    #[serde(default)]
    pub snake: SnakeConfig,
    pub players: Vec<PlayerConfig>,
    #[serde(default)]
    pub teams: Vec<Team>,
    #[serde(default)]
    pub pairings: Vec<Pairing>,
    #[serde(default)]
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RoundConfig {
    pub id: String,
    #[serde(default = "default_holes")]
    pub holes: u8,
    /// Path of the JSON score log.
    pub score_feed: String,
    #[serde(default = "default_report_file")]
    pub report_file: String,
    /// Seconds between feed polls; 0 evaluates once and exits.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct CourseConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub pars: Vec<i32>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SkinsConfig {
    #[serde(default)]
    pub policy: SkinsPolicy,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SnakeConfig {
    #[serde(default)]
    pub rule: SnakeRuleKind,
    /// Strokes over par that count as a qualifying event.
    #[serde(default = "default_trigger")]
    pub trigger_over_par: i32,
}

impl Default for SnakeConfig {
    fn default() -> Self {
        Self {
            rule: SnakeRuleKind::default(),
            trigger_over_par: default_trigger(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PlayerConfig {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self { enabled: false, port: 3000 }
    }
}

fn default_holes() -> u8 {
    18
}

fn default_report_file() -> String {
    "fairway_report.json".to_string()
}

fn default_poll_interval() -> u64 {
    30
}

fn default_trigger() -> i32 {
    2
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        Ok(config)
    }

    /// Validate roster, teams and course into the engines' context.
    pub fn round_context(&self) -> Result<RoundContext, FairwayError> {
        let holes = self.round.holes;
        if holes == 0 {
            return Err(FairwayError::Config("round.holes must be at least 1".into()));
        }
        if !self.course.pars.is_empty() && self.course.pars.len() != usize::from(holes) {
            return Err(FairwayError::Config(format!(
                "course.pars lists {} holes but the round has {holes}",
                self.course.pars.len()
            )));
        }

        let mut field = BTreeSet::new();
        for player in &self.players {
            if !field.insert(player.id.clone()) {
                return Err(FairwayError::Config(format!("Duplicate player id: {}", player.id)));
            }
        }
        if field.is_empty() {
            return Err(FairwayError::Config("At least one player is required".into()));
        }

        let mut teams = BTreeMap::new();
        let mut assigned = BTreeSet::new();
        for team in &self.teams {
            if team.players.len() != 2 {
                return Err(FairwayError::Config(format!(
                    "Team {} needs exactly two players, has {}",
                    team.id,
                    team.players.len()
                )));
            }
            for player in &team.players {
                if !field.contains(player) {
                    return Err(FairwayError::Config(format!("Team {} lists unknown player {player}", team.id)));
                }
                if !assigned.insert(player.clone()) {
                    return Err(FairwayError::Config(format!("Player {player} is on more than one team")));
                }
            }
            if teams.insert(team.id.clone(), team.clone()).is_some() {
                return Err(FairwayError::Config(format!("Duplicate team id: {}", team.id)));
            }
        }

        for pairing in &self.pairings {
            for team in [&pairing.team_a, &pairing.team_b] {
                if !teams.contains_key(team) {
                    return Err(FairwayError::Config(format!("Pairing references unknown team {team}")));
                }
            }
            if pairing.team_a == pairing.team_b {
                return Err(FairwayError::Config(format!("Team {} cannot play itself", pairing.team_a)));
            }
        }

        Ok(RoundContext {
            round_id: self.round.id.clone(),
            holes,
            pars: self.course.pars.clone(),
            field,
            teams,
            pairings: self.pairings.clone(),
        })
    }

    /// Build the round with its engines from this configuration.
    pub fn build_round(&self) -> Result<Round, FairwayError> {
        let ctx = self.round_context()?;
        let rule = self.snake.rule.build(self.snake.trigger_over_par);
        if rule.needs_pars() && ctx.pars.is_empty() {
            return Err(FairwayError::MissingPars { rule: rule.name().to_string() });
        }
        Ok(Round::new(ctx, self.bets.clone(), self.skins.policy, rule))
    }
}
