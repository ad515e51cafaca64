//! Skins — per-hole low net wins the pot, ties carry it forward.
//!
//! Results are a left fold over holes in order, so the result for hole `h`
//! depends only on holes `1..=h`. Correcting hole `k` can change results
//! from `k` onward and never before it.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::feed::Snapshot;
use crate::types::{BetKind, EngineIssue, HoleScore, RoundContext, SkinResult, SkinStatus};

/// When a hole is settled relative to the field posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkinsPolicy {
    /// Score a hole as soon as anyone posts; flagged provisional until the
    /// whole field is in.
    SettleOnArrival,
    /// Score a hole only once every player has posted.
    #[default]
    SettleOnComplete,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SkinsOutcome {
    pub results: Vec<SkinResult>,
    pub issues: Vec<EngineIssue>,
}

impl SkinsOutcome {
    /// Sum of pots actually awarded to a winner.
    pub fn distributed(&self) -> Decimal {
        self.results
            .iter()
            .filter(|r| r.winner_id.is_some())
            .map(|r| r.pot_amount)
            .sum()
    }

    /// Pot stuck on an unresolved final-hole tie, zero if none.
    pub fn stranded(&self) -> Decimal {
        self.results
            .iter()
            .filter(|r| r.status == SkinStatus::Unresolved)
            .map(|r| r.pot_amount)
            .sum()
    }
}

pub struct SkinsEngine {
    base_amount: Option<Decimal>,
    policy: SkinsPolicy,
}

impl SkinsEngine {
    pub fn new(base_amount: Option<Decimal>, policy: SkinsPolicy) -> Self {
        Self { base_amount, policy }
    }

    /// Derive every skin result the snapshot supports.
    pub fn compute(&self, snapshot: &Snapshot, ctx: &RoundContext) -> SkinsOutcome {
        let mut outcome = SkinsOutcome::default();
        let base = match self.base_amount {
            Some(amount) => amount,
            None => {
                outcome.issues.push(EngineIssue::MissingConfiguration { bet: BetKind::Skins });
                Decimal::ZERO
            }
        };

        let mut carry: u32 = 0;
        let mut provisional = false;

        for hole in 1..=ctx.holes {
            let Some(scores) = snapshot.hole(hole) else {
                if let Some(later) = snapshot.played_holes().find(|h| *h > hole) {
                    outcome.issues.push(EngineIssue::InconsistentHoleSequence { hole: later, missing: hole });
                }
                break;
            };

            if !snapshot.is_hole_complete(hole, &ctx.field) {
                match self.policy {
                    SkinsPolicy::SettleOnComplete => {
                        debug!(hole, posted = scores.len(), "Skins waiting on full field");
                        break;
                    }
                    // Everything downstream inherits the uncertainty through the carry.
                    SkinsPolicy::SettleOnArrival => provisional = true,
                }
            }

            let pot = base * Decimal::from(carry + 1);
            let Some(low) = scores.values().map(|s| s.net).min() else {
                break;
            };
            let leaders: Vec<&HoleScore> = scores.values().filter(|s| s.net == low).collect();
            let status = if provisional { SkinStatus::Provisional } else { SkinStatus::Final };

            if let [winner] = leaders.as_slice() {
                debug!(hole, winner = %winner.player_id, net = low, pot = %pot, "Skin won");
                outcome.results.push(SkinResult {
                    hole,
                    winner_id: Some(winner.player_id.clone()),
                    winner_score: Some(low),
                    pot_amount: pot,
                    is_carryover: false,
                    status,
                });
                carry = 0;
            } else if hole == ctx.holes && !provisional {
                let players: Vec<String> = leaders.iter().map(|s| s.player_id.clone()).collect();
                info!(hole, pot = %pot, tied = players.len(), "Final-hole skin tie left unresolved");
                outcome.results.push(SkinResult {
                    hole,
                    winner_id: None,
                    winner_score: None,
                    pot_amount: pot,
                    is_carryover: false,
                    status: SkinStatus::Unresolved,
                });
                outcome.issues.push(EngineIssue::UnresolvedSkinTie { hole, players, pot });
            } else {
                debug!(hole, tied = leaders.len(), pot = %pot, "Skin carried over");
                outcome.results.push(SkinResult {
                    hole,
                    winner_id: None,
                    winner_score: None,
                    pot_amount: pot,
                    is_carryover: true,
                    status,
                });
                carry += 1;
            }
        }

        outcome
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
