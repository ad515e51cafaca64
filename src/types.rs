//! Shared types for the FAIRWAY settlement engine.
//!
//! Every engine reads the same score facts and emits results built from
//! these types, so they live here rather than in any one engine module.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::RangeInclusive;

pub type PlayerId = String;
pub type TeamId = String;

// ---------------------------------------------------------------------------
// Score facts
// ---------------------------------------------------------------------------

/// A verified score for one player on one hole.
///
/// Corrections are new facts with a later timestamp and the same
/// `(player_id, hole)` key; the feed resolves them last-write-wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoleScore {
    pub round_id: String,
    pub player_id: PlayerId,
    pub hole: u8,
    pub gross: u32,
    /// Gross less handicap strokes received on this hole.
    pub net: i32,
    pub timestamp: DateTime<Utc>,
}

impl fmt::Display for HoleScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} #{}: gross={} net={} @ {}",
            self.player_id,
            self.hole,
            self.gross,
            self.net,
            self.timestamp.format("%H:%M:%S"),
        )
    }
}

impl HoleScore {
    /// Whether two facts carry the same strokes (timestamps ignored).
    pub fn same_strokes(&self, other: &HoleScore) -> bool {
        self.gross == other.gross && self.net == other.net
    }
}

/// Something a finalized bet can be reopened for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ReopenTarget {
    Snake { bracket: Bracket },
    Match { team_a: TeamId, team_b: TeamId },
}

impl fmt::Display for ReopenTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReopenTarget::Snake { bracket } => write!(f, "snake:{bracket}"),
            ReopenTarget::Match { team_a, team_b } => write!(f, "match:{team_a}-v-{team_b}"),
        }
    }
}

/// Explicit, audited request to reopen a finalized snake bracket or a
/// closed match. Never produced by normal score entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReopenRequest {
    pub target: ReopenTarget,
    pub timestamp: DateTime<Utc>,
    pub requested_by: String,
    #[serde(default)]
    pub reason: String,
}

/// One entry in the round's event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ScoreEvent {
    Score(HoleScore),
    Reopen(ReopenRequest),
}

impl ScoreEvent {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            ScoreEvent::Score(s) => s.timestamp,
            ScoreEvent::Reopen(r) => r.timestamp,
        }
    }
}

// ---------------------------------------------------------------------------
// Round context (roster, course, pairings)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    pub players: Vec<PlayerId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pairing {
    pub team_a: TeamId,
    pub team_b: TeamId,
}

impl Pairing {
    pub fn reopen_target(&self) -> ReopenTarget {
        ReopenTarget::Match {
            team_a: self.team_a.clone(),
            team_b: self.team_b.clone(),
        }
    }
}

/// Everything about a round the engines need besides scores and stakes.
/// Built once from configuration and passed in explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundContext {
    pub round_id: String,
    pub holes: u8,
    /// Par per hole, index 0 = hole 1. Empty when the course is unknown.
    pub pars: Vec<i32>,
    pub field: BTreeSet<PlayerId>,
    pub teams: BTreeMap<TeamId, Team>,
    pub pairings: Vec<Pairing>,
}

impl RoundContext {
    pub fn par(&self, hole: u8) -> Option<i32> {
        if hole == 0 {
            return None;
        }
        self.pars.get(usize::from(hole) - 1).copied()
    }

    pub fn is_on_course(&self, hole: u8) -> bool {
        (1..=self.holes).contains(&hole)
    }

    pub fn team_players(&self, team: &str) -> &[PlayerId] {
        self.teams.get(team).map(|t| t.players.as_slice()).unwrap_or(&[])
    }
}

// ---------------------------------------------------------------------------
// Bet configuration
// ---------------------------------------------------------------------------

/// Snake brackets. Front and back nine are disjoint; overall spans both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bracket {
    FrontNine,
    BackNine,
    Overall,
}

impl Bracket {
    pub const ALL: &'static [Bracket] = &[Bracket::FrontNine, Bracket::BackNine, Bracket::Overall];

    /// Holes covered by this bracket on a round of `holes` holes, or `None`
    /// when the round is too short for it (a nine-hole round has no back nine).
    pub fn range(&self, holes: u8) -> Option<RangeInclusive<u8>> {
        let (start, end) = match self {
            Bracket::FrontNine => (1, holes.min(9)),
            Bracket::BackNine => (10, holes.min(18)),
            Bracket::Overall => (1, holes),
        };
        (start <= end).then(|| start..=end)
    }
}

impl fmt::Display for Bracket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bracket::FrontNine => write!(f, "front_nine"),
            Bracket::BackNine => write!(f, "back_nine"),
            Bracket::Overall => write!(f, "overall"),
        }
    }
}

impl std::str::FromStr for Bracket {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "front_nine" | "front" => Ok(Bracket::FrontNine),
            "back_nine" | "back" => Ok(Bracket::BackNine),
            "overall" | "total" => Ok(Bracket::Overall),
            _ => Err(anyhow::anyhow!("Unknown snake bracket: {s}")),
        }
    }
}

/// Stakes for the round. Supplied once; absent amounts mean zero stakes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BetConfiguration {
    #[serde(default)]
    pub skin_base_amount: Option<Decimal>,
    #[serde(default, rename = "snake")]
    pub snake_amounts: BTreeMap<Bracket, Decimal>,
    #[serde(default)]
    pub match_entry_fee: Option<Decimal>,
}

impl BetConfiguration {
    pub fn snake_amount(&self, bracket: Bracket) -> Option<Decimal> {
        self.snake_amounts.get(&bracket).copied()
    }

    /// Whether every bet that can be played this round has an amount.
    pub fn is_fully_staked(&self, holes: u8, has_pairings: bool) -> bool {
        self.skin_base_amount.is_some()
            && Bracket::ALL
                .iter()
                .filter(|b| b.range(holes).is_some())
                .all(|b| self.snake_amounts.contains_key(b))
            && (!has_pairings || self.match_entry_fee.is_some())
    }
}

// ---------------------------------------------------------------------------
// Engine outputs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkinStatus {
    Final,
    /// Computed before the full field posted; superseded as scores arrive.
    Provisional,
    /// Tied on the last hole with nowhere left to carry.
    Unresolved,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkinResult {
    pub hole: u8,
    pub winner_id: Option<PlayerId>,
    pub winner_score: Option<i32>,
    pub pot_amount: Decimal,
    pub is_carryover: bool,
    pub status: SkinStatus,
}

impl fmt::Display for SkinResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.winner_id, self.status) {
            (_, SkinStatus::Unresolved) => {
                write!(f, "#{} UNRESOLVED pot=${:.2}", self.hole, self.pot_amount)
            }
            (Some(w), status) => write!(
                f,
                "#{} {} wins ${:.2} ({:?})",
                self.hole, w, self.pot_amount, status
            ),
            (None, status) => write!(
                f,
                "#{} carry ${:.2} ({:?})",
                self.hole, self.pot_amount, status
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnakeState {
    pub bracket: Bracket,
    /// Name of the qualifying rule that produced this state.
    pub rule: String,
    pub current_holder_id: Option<PlayerId>,
    pub holder_value: Option<i32>,
    /// Hole of the most recent transfer, not of the latest posted score.
    pub last_hole_updated: Option<u8>,
    pub amount: Decimal,
    pub is_final: bool,
}

impl fmt::Display for SnakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] holder={} since #{} ${:.2}{}",
            self.bracket,
            self.rule,
            self.current_holder_id.as_deref().unwrap_or("-"),
            self.last_hole_updated.map(|h| h.to_string()).unwrap_or_else(|| "-".into()),
            self.amount,
            if self.is_final { " FINAL" } else { "" },
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Active,
    Won,
    Lost,
    Halved,
}

impl MatchStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, MatchStatus::Active)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMatchState {
    pub team_id: TeamId,
    pub opponent_id: TeamId,
    pub holes_won: u8,
    pub holes_lost: u8,
    pub holes_halved: u8,
    /// Last hole counted for this match; 0 before the first.
    pub current_hole: u8,
    pub status: MatchStatus,
    pub margin_of_victory: Option<u8>,
}

impl TeamMatchState {
    pub fn new(team_id: &str, opponent_id: &str) -> Self {
        Self {
            team_id: team_id.to_string(),
            opponent_id: opponent_id.to_string(),
            holes_won: 0,
            holes_lost: 0,
            holes_halved: 0,
            current_hole: 0,
            status: MatchStatus::Active,
            margin_of_victory: None,
        }
    }

    pub fn lead(&self) -> i32 {
        i32::from(self.holes_won) - i32::from(self.holes_lost)
    }
}

impl fmt::Display for TeamMatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lead = self.lead();
        let standing = match lead {
            0 => "AS".to_string(),
            l if l > 0 => format!("{l} UP"),
            l => format!("{} DN", -l),
        };
        write!(
            f,
            "{} v {}: {} thru {} (W{}/L{}/H{}) {:?}",
            self.team_id,
            self.opponent_id,
            standing,
            self.current_hole,
            self.holes_won,
            self.holes_lost,
            self.holes_halved,
            self.status,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementLedgerEntry {
    pub player_id: PlayerId,
    pub gross_winnings: Decimal,
    pub gross_losses: Decimal,
    pub net_winnings: Decimal,
    pub skins_net: Decimal,
    pub snake_net: Decimal,
    pub match_net: Decimal,
    /// Some contributing result can still change.
    pub provisional: bool,
}

impl fmt::Display for SettlementLedgerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.net_winnings >= Decimal::ZERO { "+" } else { "" };
        write!(
            f,
            "{}: {sign}{:.2} (won ${:.2} / lost ${:.2}){}",
            self.player_id,
            self.net_winnings,
            self.gross_winnings,
            self.gross_losses,
            if self.provisional { " *" } else { "" },
        )
    }
}

/// Round lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundStatus {
    NotStarted,
    InProgress,
    Completed,
    Settled,
}

impl fmt::Display for RoundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoundStatus::NotStarted => write!(f, "NOT STARTED"),
            RoundStatus::InProgress => write!(f, "IN PROGRESS"),
            RoundStatus::Completed => write!(f, "COMPLETED"),
            RoundStatus::Settled => write!(f, "SETTLED"),
        }
    }
}

// ---------------------------------------------------------------------------
// Issues and errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "bet", content = "bracket")]
pub enum BetKind {
    Skins,
    Snake(Bracket),
    Match,
}

impl fmt::Display for BetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BetKind::Skins => write!(f, "skins"),
            BetKind::Snake(b) => write!(f, "snake ({b})"),
            BetKind::Match => write!(f, "match"),
        }
    }
}

/// Recoverable conditions found while deriving results. Returned alongside
/// the data, never thrown across the engine boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum EngineIssue {
    #[error("No stake configured for {bet}; computed as zero-stakes")]
    MissingConfiguration { bet: BetKind },

    #[error("Score for unknown player {player_id} on hole {hole} dropped")]
    UnknownPlayerReference { player_id: PlayerId, hole: u8 },

    #[error("Score for {player_id} on hole {hole} is off the course; dropped")]
    HoleOutOfRange { player_id: PlayerId, hole: u8 },

    #[error("Hole {hole} has scores but hole {missing} has not been played")]
    InconsistentHoleSequence { hole: u8, missing: u8 },

    #[error("Skin tie on final hole {hole} between {players:?}; ${pot} unresolved")]
    UnresolvedSkinTie { hole: u8, players: Vec<PlayerId>, pot: Decimal },

    #[error("Correction for {player_id} on hole {hole} rejected: {target} is final")]
    ReopenAfterFinal { target: ReopenTarget, player_id: PlayerId, hole: u8 },
}

/// Domain-specific error types for FAIRWAY.
#[derive(Debug, thiserror::Error)]
pub enum FairwayError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown snake rule: {0}")]
    UnknownSnakeRule(String),

    #[error("Snake rule {rule} needs course pars")]
    MissingPars { rule: String },

    #[error("Round cannot be settled while {status}")]
    RoundNotComplete { status: RoundStatus },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
