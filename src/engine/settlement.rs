//! Settlement — folds skins, snake and match outcomes into a player ledger.
//!
//! Pure function of the engines' current outputs. Every amount moved is
//! split to the cent with remainder cents going to players in id order, so
//! credits and debits always balance (escrowed match fees aside).

use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::types::{
    BetConfiguration, MatchStatus, PlayerId, RoundContext, SettlementLedgerEntry, SkinResult,
    SkinStatus, SnakeState, TeamMatchState,
};

// ---------------------------------------------------------------------------
// Tally
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bet {
    Skins,
    Snake,
    Match,
}

#[derive(Debug, Clone, Default)]
struct Tally {
    won: Decimal,
    lost: Decimal,
    skins: Decimal,
    snake: Decimal,
    matches: Decimal,
    provisional: bool,
}

impl Tally {
    fn post(&mut self, bet: Bet, amount: Decimal, provisional: bool) {
        if amount >= Decimal::ZERO {
            self.won += amount;
        } else {
            self.lost -= amount;
        }
        match bet {
            Bet::Skins => self.skins += amount,
            Bet::Snake => self.snake += amount,
            Bet::Match => self.matches += amount,
        }
        self.provisional |= provisional;
    }
}

/// Split `amount` into `n` cent-rounded shares that sum to `amount`
/// rounded to the cent. Earlier shares absorb the remainder.
pub fn split_evenly(amount: Decimal, n: usize) -> Vec<Decimal> {
    if n == 0 {
        return Vec::new();
    }
    let amount = amount.round_dp(2);
    let count = Decimal::from(n);
    let share = (amount / count).round_dp_with_strategy(2, RoundingStrategy::ToZero);
    let mut remainder = amount - share * count;
    let cent = Decimal::new(1, 2);

    (0..n)
        .map(|_| {
            if remainder >= cent {
                remainder -= cent;
                share + cent
            } else {
                share
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Aggregator
// ---------------------------------------------------------------------------

/// Ledger plus what is still held back from it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settlement {
    pub ledger: Vec<SettlementLedgerEntry>,
    /// Entry fees collected for matches still in play.
    pub escrowed: Decimal,
}

impl Settlement {
    pub fn entry(&self, player: &str) -> Option<&SettlementLedgerEntry> {
        self.ledger.iter().find(|e| e.player_id == player)
    }

    /// Sum of net winnings; equals `-escrowed` by construction.
    pub fn net_total(&self) -> Decimal {
        self.ledger.iter().map(|e| e.net_winnings).sum()
    }
}

pub struct SettlementAggregator;

impl SettlementAggregator {
    pub fn settle(
        ctx: &RoundContext,
        bets: &BetConfiguration,
        skins: &[SkinResult],
        snakes: &[SnakeState],
        matches: &[TeamMatchState],
    ) -> Settlement {
        let mut tallies: BTreeMap<PlayerId, Tally> =
            ctx.field.iter().map(|p| (p.clone(), Tally::default())).collect();
        let field: Vec<PlayerId> = ctx.field.iter().cloned().collect();

        // Skins: winner collects the pot, the whole field funds it.
        for result in skins {
            let Some(winner) = &result.winner_id else {
                continue;
            };
            let provisional = result.status == SkinStatus::Provisional;
            let pot = result.pot_amount.round_dp(2);
            if let Some(t) = tallies.get_mut(winner) {
                t.post(Bet::Skins, pot, provisional);
            }
            for (player, share) in field.iter().zip(split_evenly(pot, field.len())) {
                if let Some(t) = tallies.get_mut(player) {
                    t.post(Bet::Skins, -share, provisional);
                }
            }
        }

        // Snake: holder pays the bracket amount to everyone else.
        for snake in snakes {
            let Some(holder) = &snake.current_holder_id else {
                continue;
            };
            let others: Vec<&PlayerId> = field.iter().filter(|p| *p != holder).collect();
            if others.is_empty() {
                continue;
            }
            let provisional = !snake.is_final;
            let amount = snake.amount.round_dp(2);
            if let Some(t) = tallies.get_mut(holder) {
                t.post(Bet::Snake, -amount, provisional);
            }
            for (player, share) in others.iter().zip(split_evenly(amount, others.len())) {
                if let Some(t) = tallies.get_mut(*player) {
                    t.post(Bet::Snake, share, provisional);
                }
            }
        }

        // Matches: fees paid on entry, pool to the winners, refunds on a halve.
        let fee = bets.match_entry_fee.unwrap_or(Decimal::ZERO).round_dp(2);
        let mut escrowed = Decimal::ZERO;
        for state in matches {
            let team = ctx.team_players(&state.team_id);
            let opponents = ctx.team_players(&state.opponent_id);
            let provisional = !state.status.is_terminal();

            for player in team {
                if let Some(t) = tallies.get_mut(player) {
                    t.post(Bet::Match, -fee, provisional);
                }
            }

            match state.status {
                MatchStatus::Won => {
                    let pool = fee * Decimal::from(team.len() + opponents.len());
                    for (player, share) in team.iter().zip(split_evenly(pool, team.len())) {
                        if let Some(t) = tallies.get_mut(player) {
                            t.post(Bet::Match, share, false);
                        }
                    }
                }
                MatchStatus::Halved => {
                    for player in team {
                        if let Some(t) = tallies.get_mut(player) {
                            t.post(Bet::Match, fee, false);
                        }
                    }
                }
                MatchStatus::Lost => {}
                MatchStatus::Active => escrowed += fee * Decimal::from(team.len()),
            }
        }

        let ledger: Vec<SettlementLedgerEntry> = tallies
            .into_iter()
            .map(|(player_id, t)| SettlementLedgerEntry {
                player_id,
                gross_winnings: t.won,
                gross_losses: t.lost,
                net_winnings: t.won - t.lost,
                skins_net: t.skins,
                snake_net: t.snake,
                match_net: t.matches,
                provisional: t.provisional,
            })
            .collect();

        for entry in &ledger {
            debug!(player = %entry.player_id, net = %entry.net_winnings, "Ledger entry");
        }
        info!(
            players = ledger.len(),
            escrowed = format!("${:.2}", escrowed),
            "Settlement computed"
        );

        Settlement { ledger, escrowed }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
