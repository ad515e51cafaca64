//! Core engine — skins, snake and match play, folded into a ledger.
//!
//! `Round` owns the passed-in context and stakes and re-derives a complete
//! `RoundReport` from the feed on every call. Nothing is carried between
//! calls, so the report can be thrown away and rebuilt at any time.

pub mod matchplay;
pub mod settlement;
pub mod skins;
pub mod snake;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

use crate::feed::{ScoreFeed, Snapshot};
use crate::types::{
    BetConfiguration, BetKind, EngineIssue, FairwayError, ReopenRequest, RoundContext, RoundStatus,
    SettlementLedgerEntry, SkinResult, SnakeState, TeamMatchState,
};
use matchplay::MatchEngine;
use settlement::SettlementAggregator;
use skins::{SkinsEngine, SkinsPolicy};
use snake::{SnakeEngine, SnakeRule};

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Everything the presentation layer reads for a round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundReport {
    pub round_id: String,
    pub status: RoundStatus,
    /// Holes every player has posted.
    pub holes_complete: u8,
    pub skins: Vec<SkinResult>,
    pub snakes: Vec<SnakeState>,
    pub matches: Vec<TeamMatchState>,
    pub ledger: Vec<SettlementLedgerEntry>,
    pub escrowed: Decimal,
    /// False when any bet ran at zero stakes; money should not be displayed.
    pub stakes_configured: bool,
    pub issues: Vec<EngineIssue>,
    /// Explicit reopens that took effect.
    pub reopens: Vec<ReopenRequest>,
}

impl RoundReport {
    /// Mark the ledger as settled. Only a completed round can be settled.
    pub fn settle(mut self) -> Result<RoundReport, FairwayError> {
        match self.status {
            RoundStatus::Completed => {
                self.status = RoundStatus::Settled;
                info!(round = %self.round_id, "Round settled");
                Ok(self)
            }
            RoundStatus::Settled => Ok(self),
            status => Err(FairwayError::RoundNotComplete { status }),
        }
    }

    pub fn ledger_entry(&self, player: &str) -> Option<&SettlementLedgerEntry> {
        self.ledger.iter().find(|e| e.player_id == player)
    }
}

impl fmt::Display for RoundReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Round {} — {} (thru {})", self.round_id, self.status, self.holes_complete)?;
        for skin in &self.skins {
            writeln!(f, "  skin  {skin}")?;
        }
        for snake in &self.snakes {
            writeln!(f, "  snake {snake}")?;
        }
        for state in &self.matches {
            writeln!(f, "  match {state}")?;
        }
        for entry in &self.ledger {
            writeln!(f, "  $     {entry}")?;
        }
        if !self.stakes_configured {
            writeln!(f, "  (stakes not fully configured; amounts suppressed)")?;
        }
        for issue in &self.issues {
            writeln!(f, "  !     {issue}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

/// Last report, valid only for the exact feed it was derived from.
///
/// Compared on the whole log: an upstream rewrite that keeps the event
/// count and latest timestamp still invalidates it.
#[derive(Debug, Default)]
pub struct ReportCache {
    last: Option<(ScoreFeed, RoundReport)>,
}

impl ReportCache {
    /// The cached report if it was computed from `feed`.
    pub fn get(&self, feed: &ScoreFeed) -> Option<&RoundReport> {
        match &self.last {
            Some((cached, report)) if cached == feed => Some(report),
            _ => None,
        }
    }

    pub fn store(&mut self, feed: ScoreFeed, report: RoundReport) {
        self.last = Some((feed, report));
    }

    pub fn report(&self) -> Option<&RoundReport> {
        self.last.as_ref().map(|(_, report)| report)
    }
}

// ---------------------------------------------------------------------------
// Round
// ---------------------------------------------------------------------------

pub struct Round {
    ctx: RoundContext,
    bets: BetConfiguration,
    skins: SkinsEngine,
    snake: SnakeEngine,
}

impl Round {
    pub fn new(ctx: RoundContext, bets: BetConfiguration, policy: SkinsPolicy, rule: Box<dyn SnakeRule>) -> Self {
        let skins = SkinsEngine::new(bets.skin_base_amount, policy);
        Self {
            ctx,
            bets,
            skins,
            snake: SnakeEngine::new(rule),
        }
    }

    pub fn context(&self) -> &RoundContext {
        &self.ctx
    }

    pub fn bets(&self) -> &BetConfiguration {
        &self.bets
    }

    /// Derive the full report from the feed.
    pub fn evaluate(&self, feed: &ScoreFeed) -> RoundReport {
        let (snapshot, mut issues) = feed.snapshot(&self.ctx);

        // Independent of one another; each reads only the feed and snapshot.
        let skins = self.skins.compute(&snapshot, &self.ctx);
        let snakes = self.snake.compute(feed, &self.ctx, &self.bets);
        let matches = MatchEngine::compute(feed, &self.ctx);

        let settlement = SettlementAggregator::settle(
            &self.ctx,
            &self.bets,
            &skins.results,
            &snakes.states,
            &matches.states,
        );

        if !self.ctx.pairings.is_empty() && self.bets.match_entry_fee.is_none() {
            issues.push(EngineIssue::MissingConfiguration { bet: BetKind::Match });
        }
        issues.extend(skins.issues);
        issues.extend(snakes.issues);
        issues.extend(matches.issues);

        let mut reopens = snakes.reopened;
        reopens.extend(matches.reopened);

        let holes_complete = self.holes_complete(&snapshot);
        let status = self.status(&snapshot, holes_complete, &snakes.states, &matches.states);

        info!(
            round = %self.ctx.round_id,
            status = %status,
            thru = holes_complete,
            skins = skins.results.len(),
            issues = issues.len(),
            "Round evaluated"
        );

        RoundReport {
            round_id: self.ctx.round_id.clone(),
            status,
            holes_complete,
            skins: skins.results,
            snakes: snakes.states,
            matches: matches.states,
            ledger: settlement.ledger,
            escrowed: settlement.escrowed,
            stakes_configured: self.bets.is_fully_staked(self.ctx.holes, !self.ctx.pairings.is_empty()),
            issues,
            reopens,
        }
    }

    /// Count of holes posted by the whole field, wherever they fall.
    fn holes_complete(&self, snapshot: &Snapshot) -> u8 {
        (1..=self.ctx.holes)
            .filter(|h| snapshot.is_hole_complete(*h, &self.ctx.field))
            .count() as u8
    }

    fn status(&self, snapshot: &Snapshot, holes_complete: u8, snakes: &[SnakeState], matches: &[TeamMatchState]) -> RoundStatus {
        if snapshot.is_empty() {
            RoundStatus::NotStarted
        } else if holes_complete == self.ctx.holes
            && snakes.iter().all(|s| s.is_final)
            && matches.iter().all(|m| m.status.is_terminal())
        {
            RoundStatus::Completed
        } else {
            RoundStatus::InProgress
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::tests::{context, score, with_teams};
    use crate::types::{Bracket, Pairing};
    use rust_decimal_macros::dec;
    use snake::HighNet;
    use std::collections::BTreeMap;

    fn round(holes: u8) -> Round {
        let mut ctx = with_teams(
            context(&["a1", "a2", "b1", "b2"], holes),
            &[("A", ["a1", "a2"]), ("B", ["b1", "b2"])],
        );
        ctx.pairings.push(Pairing { team_a: "A".into(), team_b: "B".into() });
        let mut snake_amounts = BTreeMap::new();
        snake_amounts.insert(Bracket::FrontNine, dec!(4));
        snake_amounts.insert(Bracket::BackNine, dec!(4));
        snake_amounts.insert(Bracket::Overall, dec!(8));
        let bets = BetConfiguration {
            skin_base_amount: Some(dec!(2)),
            snake_amounts,
            match_entry_fee: Some(dec!(10)),
        };
        Round::new(ctx, bets, SkinsPolicy::SettleOnComplete, Box::new(HighNet))
    }

    fn play(holes: u8, upto: u8) -> ScoreFeed {
        let mut feed = ScoreFeed::new("r1");
        let mut minute = 0;
        for hole in 1..=upto.min(holes) {
            for (p, net) in [("a1", 3), ("a2", 5), ("b1", 4), ("b2", 4)] {
                minute += 1;
                feed.post(score(p, hole, net, minute));
            }
        }
        feed
    }

    #[test]
    fn test_not_started() {
        let report = round(18).evaluate(&ScoreFeed::new("r1"));
        assert_eq!(report.status, RoundStatus::NotStarted);
        assert!(report.skins.is_empty());
        assert_eq!(report.ledger.len(), 4);
        assert!(report.settle().is_err());
    }

    #[test]
    fn test_in_progress_then_completed_then_settled() {
        let r = round(9);
        let mid = r.evaluate(&play(9, 4));
        assert_eq!(mid.status, RoundStatus::InProgress);
        assert_eq!(mid.holes_complete, 4);
        assert!(matches!(mid.clone().settle(), Err(FairwayError::RoundNotComplete { .. })));

        let done = r.evaluate(&play(9, 9));
        assert_eq!(done.status, RoundStatus::Completed);
        let settled = done.settle().unwrap();
        assert_eq!(settled.status, RoundStatus::Settled);
        assert_eq!(settled.clone().settle().unwrap().status, RoundStatus::Settled);
    }

    #[test]
    fn test_match_closeout_alone_does_not_complete_round() {
        let r = round(18);
        // A wins every hole: closed out after 10, but holes 11-18 unplayed.
        let report = r.evaluate(&play(18, 10));
        assert!(report.matches.iter().all(|m| m.status.is_terminal()));
        assert_eq!(report.status, RoundStatus::InProgress);
    }

    #[test]
    fn test_report_is_zero_sum() {
        let r = round(18);
        let report = r.evaluate(&play(18, 18));
        assert_eq!(report.status, RoundStatus::Completed);
        let total: Decimal = report.ledger.iter().map(|e| e.net_winnings).sum();
        assert_eq!(total + report.escrowed, Decimal::ZERO);
        // a1 wins every skin outright.
        assert!(report.skins.iter().all(|s| s.winner_id.as_deref() == Some("a1")));
        assert!(report.stakes_configured);
    }

    #[test]
    fn test_missing_match_fee_reported() {
        let mut r = round(9);
        r.bets.match_entry_fee = None;
        let report = r.evaluate(&play(9, 1));
        assert!(report.issues.contains(&EngineIssue::MissingConfiguration { bet: BetKind::Match }));
        assert!(!report.stakes_configured);
    }

    #[test]
    fn test_evaluate_idempotent_bytes() {
        let r = round(18);
        let feed = play(18, 12);
        let a = serde_json::to_string(&r.evaluate(&feed)).unwrap();
        let b = serde_json::to_string(&r.evaluate(&feed)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_cache_hit_on_identical_feed() {
        let r = round(18);
        let feed = play(18, 3);
        let mut cache = ReportCache::default();
        assert!(cache.get(&feed).is_none());

        cache.store(feed.clone(), r.evaluate(&feed));
        assert_eq!(cache.get(&feed), cache.report());
        assert!(cache.get(&play(18, 4)).is_none());
    }

    #[test]
    fn test_cache_misses_rewritten_feed_with_same_shape() {
        // Same event count and latest timestamp, different strokes.
        let mut before = ScoreFeed::new("r1");
        before.post(score("a1", 1, 4, 1));
        before.post(score("a1", 2, 4, 9));
        let mut after = ScoreFeed::new("r1");
        after.post(score("a1", 1, 9, 2));
        after.post(score("a1", 2, 4, 9));

        let r = round(18);
        let mut cache = ReportCache::default();
        cache.store(before.clone(), r.evaluate(&before));
        assert!(cache.get(&before).is_some());
        assert!(cache.get(&after).is_none());
    }

    #[test]
    fn test_engines_run_concurrently_on_shared_snapshot() {
        let r = round(18);
        let feed = play(18, 18);
        let (snapshot, _) = feed.snapshot(r.context());

        let (skins, snakes, matches) = std::thread::scope(|s| {
            let skins = s.spawn(|| r.skins.compute(&snapshot, r.context()));
            let snakes = s.spawn(|| r.snake.compute(&feed, r.context(), r.bets()));
            let matches = s.spawn(|| MatchEngine::compute(&feed, r.context()));
            (skins.join().unwrap(), snakes.join().unwrap(), matches.join().unwrap())
        });

        let report = r.evaluate(&feed);
        assert_eq!(skins.results, report.skins);
        assert_eq!(snakes.states, report.snakes);
        assert_eq!(matches.states, report.matches);
    }
}
