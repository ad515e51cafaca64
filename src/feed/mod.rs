//! Score feed — the round's event log and the views derived from it.
//!
//! The feed is append-only. Events are replayed in canonical order
//! `(timestamp, arrival sequence)` and scores resolve last-write-wins per
//! `(player, hole)`. Engines never patch state; they rebuild from a view.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::debug;

use crate::types::{
    EngineIssue, HoleScore, PlayerId, ReopenRequest, ReopenTarget, RoundContext, ScoreEvent,
};

// ---------------------------------------------------------------------------
// Source abstraction
// ---------------------------------------------------------------------------

/// Producer of the round's event log (score entry subsystem, file, ...).
#[async_trait]
pub trait ScoreSource: Send + Sync {
    /// Fetch the complete event log as currently known.
    async fn fetch_feed(&self) -> Result<ScoreFeed>;

    /// Source name for logging.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Effective scores at one point of the log, keyed by hole then player.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    holes: BTreeMap<u8, BTreeMap<PlayerId, HoleScore>>,
}

impl Snapshot {
    /// Insert or replace the score for `(player, hole)`.
    pub fn apply(&mut self, score: &HoleScore) {
        self.holes
            .entry(score.hole)
            .or_default()
            .insert(score.player_id.clone(), score.clone());
    }

    /// Whether applying `score` would change the strokes held for its
    /// `(player, hole)`. A first posting counts as a change.
    pub fn differs(&self, score: &HoleScore) -> bool {
        self.score(&score.player_id, score.hole)
            .map_or(true, |held| !held.same_strokes(score))
    }

    pub fn hole(&self, hole: u8) -> Option<&BTreeMap<PlayerId, HoleScore>> {
        self.holes.get(&hole).filter(|scores| !scores.is_empty())
    }

    pub fn score(&self, player: &str, hole: u8) -> Option<&HoleScore> {
        self.holes.get(&hole).and_then(|scores| scores.get(player))
    }

    /// Whether every listed player has a score on `hole`.
    pub fn is_hole_complete<'a>(&self, hole: u8, players: impl IntoIterator<Item = &'a PlayerId>) -> bool {
        match self.holes.get(&hole) {
            Some(scores) => players.into_iter().all(|p| scores.contains_key(p)),
            None => false,
        }
    }

    /// Holes with at least one score, ascending.
    pub fn played_holes(&self) -> impl Iterator<Item = u8> + '_ {
        self.holes
            .iter()
            .filter(|(_, scores)| !scores.is_empty())
            .map(|(hole, _)| *hole)
    }

    /// View restricted to holes `1..=hole`.
    pub fn through(&self, hole: u8) -> Snapshot {
        Snapshot {
            holes: self
                .holes
                .range(..=hole)
                .map(|(h, scores)| (*h, scores.clone()))
                .collect(),
        }
    }

    pub fn score_count(&self) -> usize {
        self.holes.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.score_count() == 0
    }
}

// ---------------------------------------------------------------------------
// Frozen view
// ---------------------------------------------------------------------------

/// A view that stops accepting changes once its bet reaches a terminal
/// condition, plus what was turned away after that point.
#[derive(Debug, Clone, Default)]
pub struct FrozenView {
    pub snapshot: Snapshot,
    /// When the current freeze took effect; `None` if still open.
    pub finalized_at: Option<DateTime<Utc>>,
    pub rejected: Vec<EngineIssue>,
    /// Explicit reopens that took effect for this target.
    pub reopened: Vec<ReopenRequest>,
}

impl FrozenView {
    pub fn is_final(&self) -> bool {
        self.finalized_at.is_some()
    }
}

// ---------------------------------------------------------------------------
// Feed
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
struct Sequenced {
    seq: u64,
    event: ScoreEvent,
}

/// Append-only event log for one round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreFeed {
    round_id: String,
    events: Vec<Sequenced>,
}

impl ScoreFeed {
    pub fn new(round_id: &str) -> Self {
        Self {
            round_id: round_id.to_string(),
            events: Vec::new(),
        }
    }

    /// Build a feed from events in arrival order.
    pub fn from_events(round_id: &str, events: impl IntoIterator<Item = ScoreEvent>) -> Self {
        let mut feed = Self::new(round_id);
        for event in events {
            feed.push(event);
        }
        feed
    }

    /// Append an event; returns its arrival sequence number.
    pub fn push(&mut self, event: ScoreEvent) -> u64 {
        let seq = self.events.len() as u64;
        self.events.push(Sequenced { seq, event });
        seq
    }

    pub fn post(&mut self, score: HoleScore) -> u64 {
        self.push(ScoreEvent::Score(score))
    }

    pub fn round_id(&self) -> &str {
        &self.round_id
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events in arrival order.
    pub fn events(&self) -> impl Iterator<Item = &ScoreEvent> {
        self.events.iter().map(|s| &s.event)
    }

    /// Events sorted by `(timestamp, arrival sequence)`.
    fn canonical(&self) -> Vec<&Sequenced> {
        let mut ordered: Vec<&Sequenced> = self.events.iter().collect();
        ordered.sort_by_key(|s| (s.event.timestamp(), s.seq));
        ordered
    }

    /// Whether a score may enter any view of this round.
    fn admit(&self, score: &HoleScore, ctx: &RoundContext) -> Result<bool, EngineIssue> {
        if score.round_id != ctx.round_id {
            return Ok(false);
        }
        if !ctx.field.contains(&score.player_id) {
            return Err(EngineIssue::UnknownPlayerReference {
                player_id: score.player_id.clone(),
                hole: score.hole,
            });
        }
        if !ctx.is_on_course(score.hole) {
            return Err(EngineIssue::HoleOutOfRange {
                player_id: score.player_id.clone(),
                hole: score.hole,
            });
        }
        Ok(true)
    }

    /// Latest effective scores, plus issues for every dropped score.
    pub fn snapshot(&self, ctx: &RoundContext) -> (Snapshot, Vec<EngineIssue>) {
        let mut snapshot = Snapshot::default();
        let mut issues = Vec::new();

        for entry in self.canonical() {
            let ScoreEvent::Score(score) = &entry.event else {
                continue;
            };
            match self.admit(score, ctx) {
                Ok(true) => {
                    snapshot.apply(score);
                }
                Ok(false) => {
                    debug!(round = %score.round_id, player = %score.player_id, "Score for another round ignored");
                }
                Err(issue) => issues.push(issue),
            }
        }

        (snapshot, issues)
    }

    /// Replay the log for one bet, freezing its view the first time
    /// `is_terminal` holds.
    ///
    /// While frozen, scores that `touches` the bet (judged against the
    /// frozen view) and change it are rejected. A [`ReopenRequest`] for `target` rebuilds the view from all
    /// history up to that point, rejected corrections included, and freezes
    /// again if the bet is still terminal.
    pub fn replay_frozen<T, F>(
        &self,
        ctx: &RoundContext,
        target: &ReopenTarget,
        is_terminal: T,
        touches: F,
    ) -> FrozenView
    where
        T: Fn(&Snapshot) -> bool,
        F: Fn(&Snapshot, &HoleScore) -> bool,
    {
        let mut live = Snapshot::default();
        let mut view = FrozenView::default();
        let mut frozen: Option<Snapshot> = None;

        for entry in self.canonical() {
            match &entry.event {
                ScoreEvent::Score(score) => {
                    if !matches!(self.admit(score, ctx), Ok(true)) {
                        continue;
                    }
                    live.apply(score);

                    match &frozen {
                        Some(locked) => {
                            let changes = touches(locked, score) && locked.differs(score);
                            if changes {
                                debug!(%target, player = %score.player_id, hole = score.hole, "Correction after final rejected");
                                view.rejected.push(EngineIssue::ReopenAfterFinal {
                                    target: target.clone(),
                                    player_id: score.player_id.clone(),
                                    hole: score.hole,
                                });
                            }
                        }
                        None => {
                            if is_terminal(&live) {
                                frozen = Some(live.clone());
                                view.finalized_at = Some(score.timestamp);
                            }
                        }
                    }
                }
                ScoreEvent::Reopen(request) => {
                    if &request.target != target || frozen.is_none() {
                        continue;
                    }
                    view.reopened.push(request.clone());
                    // Rejections up to here are superseded by the reopen.
                    view.rejected.clear();
                    if is_terminal(&live) {
                        frozen = Some(live.clone());
                        view.finalized_at = Some(request.timestamp);
                    } else {
                        frozen = None;
                        view.finalized_at = None;
                    }
                }
            }
        }

        view.snapshot = frozen.unwrap_or(live);
        view
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
