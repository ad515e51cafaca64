//! Better-ball match play between paired teams.
//!
//! Each hole counts once all four players in the pairing have posted. The
//! team's better (lowest) net wins, loses or halves the hole. A match closes
//! as soon as the lead exceeds the holes remaining; after that it ignores
//! every later hole and, via the feed's frozen replay, every late correction.

use std::cmp::Ordering;
use tracing::{debug, info, warn};

use crate::feed::{ScoreFeed, Snapshot};
use crate::types::{
    EngineIssue, MatchStatus, Pairing, PlayerId, ReopenRequest, RoundContext, TeamMatchState,
};

#[derive(Debug, Clone, Default)]
pub struct MatchOutcome {
    /// Two mirrored states per pairing, team A first.
    pub states: Vec<TeamMatchState>,
    pub issues: Vec<EngineIssue>,
    pub reopened: Vec<ReopenRequest>,
}

pub struct MatchEngine;

impl MatchEngine {
    pub fn compute(feed: &ScoreFeed, ctx: &RoundContext) -> MatchOutcome {
        let mut outcome = MatchOutcome::default();

        for pairing in &ctx.pairings {
            let team_a = ctx.team_players(&pairing.team_a);
            let team_b = ctx.team_players(&pairing.team_b);
            if team_a.is_empty() || team_b.is_empty() {
                warn!(team_a = %pairing.team_a, team_b = %pairing.team_b, "Pairing references an unknown team; skipped");
                continue;
            }
            let players: Vec<&PlayerId> = team_a.iter().chain(team_b).collect();

            let view = feed.replay_frozen(
                ctx,
                &pairing.reopen_target(),
                |snap| Self::fold(pairing, snap, ctx).0.status.is_terminal(),
                // Holes after the closeout were never part of the result.
                |locked, score| {
                    players.contains(&&score.player_id)
                        && score.hole <= Self::fold(pairing, locked, ctx).0.current_hole
                },
            );

            let (a, b) = Self::fold(pairing, &view.snapshot, ctx);
            if a.status.is_terminal() {
                info!(
                    team = %a.team_id,
                    opponent = %a.opponent_id,
                    status = ?a.status,
                    margin = ?a.margin_of_victory,
                    thru = a.current_hole,
                    "Match decided"
                );
            }

            outcome.states.push(a);
            outcome.states.push(b);
            outcome.issues.extend(view.rejected);
            outcome.reopened.extend(view.reopened);
        }

        outcome
    }

    /// Team's better-ball net on `hole`, `None` until every member posted.
    fn better_ball(snapshot: &Snapshot, team: &[PlayerId], hole: u8) -> Option<i32> {
        team.iter()
            .map(|p| snapshot.score(p, hole).map(|s| s.net))
            .collect::<Option<Vec<i32>>>()?
            .into_iter()
            .min()
    }

    /// Play the pairing hole by hole; returns (team A, team B) states.
    pub fn fold(pairing: &Pairing, snapshot: &Snapshot, ctx: &RoundContext) -> (TeamMatchState, TeamMatchState) {
        let team_a = ctx.team_players(&pairing.team_a);
        let team_b = ctx.team_players(&pairing.team_b);
        let mut a = TeamMatchState::new(&pairing.team_a, &pairing.team_b);

        for hole in 1..=ctx.holes {
            let (Some(score_a), Some(score_b)) = (
                Self::better_ball(snapshot, team_a, hole),
                Self::better_ball(snapshot, team_b, hole),
            ) else {
                break;
            };

            a.current_hole = hole;
            match score_a.cmp(&score_b) {
                Ordering::Less => a.holes_won += 1,
                Ordering::Greater => a.holes_lost += 1,
                Ordering::Equal => a.holes_halved += 1,
            }

            let lead = a.lead();
            let remaining = i32::from(ctx.holes - hole);
            if lead.abs() > remaining {
                a.status = if lead > 0 { MatchStatus::Won } else { MatchStatus::Lost };
                a.margin_of_victory = Some(lead.unsigned_abs() as u8);
                debug!(team = %a.team_id, hole, lead, remaining, "Match closed out");
                break;
            }
            if hole == ctx.holes && lead == 0 {
                a.status = MatchStatus::Halved;
            }
        }

        let b = Self::mirror(&a);
        (a, b)
    }

    fn mirror(a: &TeamMatchState) -> TeamMatchState {
        TeamMatchState {
            team_id: a.opponent_id.clone(),
            opponent_id: a.team_id.clone(),
            holes_won: a.holes_lost,
            holes_lost: a.holes_won,
            holes_halved: a.holes_halved,
            current_hole: a.current_hole,
            status: match a.status {
                MatchStatus::Won => MatchStatus::Lost,
                MatchStatus::Lost => MatchStatus::Won,
                other => other,
            },
            margin_of_victory: a.margin_of_victory,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
