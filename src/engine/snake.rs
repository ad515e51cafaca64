//! Snake — a "worst event" bet held across a bracket of holes.
//!
//! What counts as a qualifying event is a named, pluggable [`SnakeRule`].
//! The holder only changes when a posted score strictly beats the holder's
//! value under the rule; ties never transfer. A bracket freezes once its
//! last hole is posted by the whole field.

use rust_decimal::Decimal;
use serde::Deserialize;
use std::ops::RangeInclusive;
use tracing::debug;

use crate::feed::{ScoreFeed, Snapshot};
use crate::types::{
    BetConfiguration, BetKind, Bracket, EngineIssue, FairwayError, HoleScore, ReopenRequest,
    ReopenTarget, RoundContext, SnakeState,
};

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// Qualifying predicate for the snake.
pub trait SnakeRule: Send + Sync {
    /// Name reported on every [`SnakeState`] this rule produces.
    fn name(&self) -> &'static str;

    /// Value of a posted score under this rule, or `None` when the score is
    /// not a qualifying event and can neither establish nor take the snake.
    fn value(&self, score: &HoleScore, par: Option<i32>) -> Option<i32>;

    /// Whether `candidate` takes the snake from a holder at `holder`.
    fn supersedes(&self, candidate: i32, holder: i32) -> bool {
        candidate > holder
    }

    fn needs_pars(&self) -> bool {
        false
    }
}

/// Highest net score seen so far in the bracket holds the snake.
pub struct HighNet;

impl SnakeRule for HighNet {
    fn name(&self) -> &'static str {
        "high_net"
    }

    fn value(&self, score: &HoleScore, _par: Option<i32>) -> Option<i32> {
        Some(score.net)
    }
}

/// Worst net-over-par blow-up holds the snake, counted only from
/// `trigger` strokes over par.
pub struct NetOverPar {
    pub trigger: i32,
}

impl SnakeRule for NetOverPar {
    fn name(&self) -> &'static str {
        "net_over_par"
    }

    fn value(&self, score: &HoleScore, par: Option<i32>) -> Option<i32> {
        let over = score.net - par?;
        (over >= self.trigger).then_some(over)
    }

    fn needs_pars(&self) -> bool {
        true
    }
}

/// Whoever most recently went `trigger` over par holds the snake.
/// The value is the hole number, so only a later hole takes it.
pub struct LastTrigger {
    pub trigger: i32,
}

impl SnakeRule for LastTrigger {
    fn name(&self) -> &'static str {
        "last_trigger"
    }

    fn value(&self, score: &HoleScore, par: Option<i32>) -> Option<i32> {
        (score.net - par? >= self.trigger).then_some(i32::from(score.hole))
    }

    fn needs_pars(&self) -> bool {
        true
    }
}

/// Rule names accepted in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnakeRuleKind {
    HighNet,
    #[default]
    NetOverPar,
    LastTrigger,
}

impl SnakeRuleKind {
    pub fn build(self, trigger_over_par: i32) -> Box<dyn SnakeRule> {
        match self {
            SnakeRuleKind::HighNet => Box::new(HighNet),
            SnakeRuleKind::NetOverPar => Box::new(NetOverPar { trigger: trigger_over_par }),
            SnakeRuleKind::LastTrigger => Box::new(LastTrigger { trigger: trigger_over_par }),
        }
    }
}

impl std::str::FromStr for SnakeRuleKind {
    type Err = FairwayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "high_net" => Ok(SnakeRuleKind::HighNet),
            "net_over_par" => Ok(SnakeRuleKind::NetOverPar),
            "last_trigger" => Ok(SnakeRuleKind::LastTrigger),
            other => Err(FairwayError::UnknownSnakeRule(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct SnakeOutcome {
    pub states: Vec<SnakeState>,
    pub issues: Vec<EngineIssue>,
    pub reopened: Vec<ReopenRequest>,
}

pub struct SnakeEngine {
    rule: Box<dyn SnakeRule>,
}

impl SnakeEngine {
    pub fn new(rule: Box<dyn SnakeRule>) -> Self {
        Self { rule }
    }

    /// One state per bracket the round is long enough for.
    pub fn compute(&self, feed: &ScoreFeed, ctx: &RoundContext, bets: &BetConfiguration) -> SnakeOutcome {
        let mut outcome = SnakeOutcome::default();

        for bracket in Bracket::ALL {
            let Some(range) = bracket.range(ctx.holes) else {
                continue;
            };
            let last = *range.end();
            let target = ReopenTarget::Snake { bracket: *bracket };

            let view = feed.replay_frozen(
                ctx,
                &target,
                |snap| snap.is_hole_complete(last, &ctx.field),
                |_, score| range.contains(&score.hole),
            );

            let amount = match bets.snake_amount(*bracket) {
                Some(amount) => amount,
                None => {
                    outcome.issues.push(EngineIssue::MissingConfiguration { bet: BetKind::Snake(*bracket) });
                    Decimal::ZERO
                }
            };

            let mut state = self.fold(*bracket, range, &view.snapshot, ctx);
            state.amount = amount;
            state.is_final = view.is_final();

            outcome.issues.extend(view.rejected);
            outcome.reopened.extend(view.reopened);
            outcome.states.push(state);
        }

        outcome
    }

    /// Walk the bracket's holes in order and track the holder.
    pub fn fold(&self, bracket: Bracket, range: RangeInclusive<u8>, snapshot: &Snapshot, ctx: &RoundContext) -> SnakeState {
        let mut state = SnakeState {
            bracket,
            rule: self.rule.name().to_string(),
            current_holder_id: None,
            holder_value: None,
            last_hole_updated: None,
            amount: Decimal::ZERO,
            is_final: false,
        };

        for hole in range {
            let Some(scores) = snapshot.hole(hole) else {
                continue;
            };
            // Posting order within the hole decides who got there first.
            let mut posted: Vec<&HoleScore> = scores.values().collect();
            posted.sort_by(|a, b| (a.timestamp, &a.player_id).cmp(&(b.timestamp, &b.player_id)));

            for score in posted {
                let Some(value) = self.rule.value(score, ctx.par(hole)) else {
                    continue;
                };
                let takes = match state.holder_value {
                    None => true,
                    Some(held) => self.rule.supersedes(value, held),
                };
                if takes && state.current_holder_id.as_deref() != Some(score.player_id.as_str()) {
                    debug!(%bracket, hole, player = %score.player_id, value, "Snake changes hands");
                    state.last_hole_updated = Some(hole);
                }
                if takes {
                    state.current_holder_id = Some(score.player_id.clone());
                    state.holder_value = Some(value);
                }
            }
        }

        state
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
