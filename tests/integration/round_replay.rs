//! Full-round replay.
//!
//! Feeds a four-ball round hole by hole through the mock source and checks
//! the report at every step: skins carry and pay out, each snake bracket
//! finds its holder, the better-ball match goes to the last hole, and the
//! ledger balances throughout.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use fairway::config::AppConfig;
use fairway::engine::{Round, RoundReport};
use fairway::feed::ScoreSource;
use fairway::types::{
    Bracket, EngineIssue, FairwayError, MatchStatus, ReopenTarget, RoundStatus, ScoreEvent,
    SkinStatus,
};

use crate::mock_feed::{score, MockScoreSource};

const ROUND: &str = "club-r1";
const PLAYERS: [&str; 4] = ["a1", "a2", "b1", "b2"];

const CONFIG: &str = r#"
    [round]
    id = "club-r1"
    holes = 18
    score_feed = "unused.json"

    [course]
    pars = [4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4]

    [bets]
    skin_base_amount = 1.0
    match_entry_fee = 10.0

    [bets.snake]
    front_nine = 3.0
    back_nine = 3.0
    overall = 3.0

    [snake]
    rule = "net_over_par"
    trigger_over_par = 2

    [[players]]
    id = "a1"
    [[players]]
    id = "a2"
    [[players]]
    id = "b1"
    [[players]]
    id = "b2"

    [[teams]]
    id = "A"
    players = ["a1", "a2"]
    [[teams]]
    id = "B"
    players = ["b1", "b2"]

    [[pairings]]
    team_a = "A"
    team_b = "B"
"#;

fn round() -> Round {
    AppConfig::parse(CONFIG).unwrap().build_round().unwrap()
}

/// Net score for every card in the round. Everyone makes par except:
/// a1 birdies 3, b2 birdies 5 while b1 doubles it, a2 makes +3 on 12 and
/// birdies 18.
fn net(player: &str, hole: u8) -> i32 {
    match (player, hole) {
        ("a1", 3) => 3,
        ("b1", 5) => 6,
        ("b2", 5) => 3,
        ("a2", 12) => 7,
        ("a2", 18) => 3,
        _ => 4,
    }
}

fn post_hole(source: &MockScoreSource, hole: u8) {
    for (i, player) in PLAYERS.iter().enumerate() {
        source.post(player, hole, net(player, hole), i64::from(hole) * 10 + i as i64);
    }
}

async fn evaluate(round: &Round, source: &MockScoreSource) -> RoundReport {
    round.evaluate(&source.fetch_feed().await.unwrap())
}

fn net_total(report: &RoundReport) -> Decimal {
    report.ledger.iter().map(|e| e.net_winnings).sum()
}

#[tokio::test]
async fn test_full_round_settles_and_balances() {
    let round = round();
    let source = MockScoreSource::new(ROUND);
    for hole in 1..=18 {
        post_hole(&source, hole);
    }

    let report = evaluate(&round, &source).await;
    assert_eq!(report.status, RoundStatus::Completed);
    assert_eq!(report.holes_complete, 18);
    assert!(report.issues.is_empty(), "unexpected issues: {:?}", report.issues);
    assert!(report.stakes_configured);

    // Skins: 3 on hole 3, 2 on hole 5, the 13-hole carry on 18.
    let won: Vec<(u8, &str, Decimal)> = report
        .skins
        .iter()
        .filter_map(|s| s.winner_id.as_deref().map(|w| (s.hole, w, s.pot_amount)))
        .collect();
    assert_eq!(won, vec![(3, "a1", dec!(3)), (5, "b2", dec!(2)), (18, "a2", dec!(13))]);
    assert_eq!(report.skins.len(), 18);
    assert!(report.skins.iter().all(|s| s.status == SkinStatus::Final));

    // Snake: b1 holds the front, a2's +3 takes the back and overall.
    let holder = |b: Bracket| {
        let s = report.snakes.iter().find(|s| s.bracket == b).unwrap();
        (s.current_holder_id.clone().unwrap(), s.last_hole_updated, s.is_final)
    };
    assert_eq!(holder(Bracket::FrontNine), ("b1".to_string(), Some(5), true));
    assert_eq!(holder(Bracket::BackNine), ("a2".to_string(), Some(12), true));
    assert_eq!(holder(Bracket::Overall), ("a2".to_string(), Some(12), true));

    // Match: one hole each, then A wins 18 to take it 1 up.
    let a = &report.matches[0];
    assert_eq!(a.team_id, "A");
    assert_eq!((a.holes_won, a.holes_lost, a.holes_halved), (2, 1, 15));
    assert_eq!(a.status, MatchStatus::Won);
    assert_eq!(a.margin_of_victory, Some(1));
    assert_eq!(report.matches[1].status, MatchStatus::Lost);

    // Ledger.
    let net_of = |p: &str| report.ledger_entry(p).unwrap().net_winnings;
    assert_eq!(net_of("a1"), dec!(11.5));
    assert_eq!(net_of("a2"), dec!(13.5));
    assert_eq!(net_of("b1"), dec!(-15.5));
    assert_eq!(net_of("b2"), dec!(-9.5));

    let a2 = report.ledger_entry("a2").unwrap();
    assert_eq!(a2.skins_net, dec!(8.5));
    assert_eq!(a2.snake_net, dec!(-5));
    assert_eq!(a2.match_net, dec!(10));
    assert!(!a2.provisional);

    assert_eq!(report.escrowed, Decimal::ZERO);
    assert_eq!(net_total(&report), Decimal::ZERO);

    let settled = report.settle().unwrap();
    assert_eq!(settled.status, RoundStatus::Settled);
}

#[tokio::test]
async fn test_results_only_grow_as_holes_arrive() {
    let round = round();
    let source = MockScoreSource::new(ROUND);
    let mut previous = evaluate(&round, &source).await;
    assert_eq!(previous.status, RoundStatus::NotStarted);

    for hole in 1..=18 {
        post_hole(&source, hole);
        let report = evaluate(&round, &source).await;

        // Settled holes never change as more of the round arrives.
        assert_eq!(&report.skins[..previous.skins.len()], previous.skins.as_slice());
        assert_eq!(net_total(&report) + report.escrowed, Decimal::ZERO);

        if hole < 18 {
            assert_eq!(report.status, RoundStatus::InProgress);
            assert_eq!(report.escrowed, dec!(40));
            assert!(matches!(report.clone().settle(), Err(FairwayError::RoundNotComplete { .. })));
        }
        previous = report;
    }

    assert_eq!(previous.status, RoundStatus::Completed);
}

#[tokio::test]
async fn test_front_nine_snake_is_final_after_nine() {
    let round = round();
    let source = MockScoreSource::new(ROUND);
    for hole in 1..=9 {
        post_hole(&source, hole);
    }
    let report = evaluate(&round, &source).await;

    let front = report.snakes.iter().find(|s| s.bracket == Bracket::FrontNine).unwrap();
    let overall = report.snakes.iter().find(|s| s.bracket == Bracket::Overall).unwrap();
    assert!(front.is_final);
    assert!(!overall.is_final);

    let b1 = report.ledger_entry("b1").unwrap();
    assert!(b1.provisional);
}

#[tokio::test]
async fn test_late_correction_rejected_then_reopened() {
    let round = round();
    let source = MockScoreSource::new(ROUND);
    for hole in 1..=10 {
        post_hole(&source, hole);
    }

    // b2 was actually +3 on hole 2; the front nine is already final.
    source.post("b2", 2, 7, 105);
    let report = evaluate(&round, &source).await;

    let front_target = ReopenTarget::Snake { bracket: Bracket::FrontNine };
    assert!(report.issues.contains(&EngineIssue::ReopenAfterFinal {
        target: front_target.clone(),
        player_id: "b2".into(),
        hole: 2,
    }));
    let snake = |r: &RoundReport, b: Bracket| r.snakes.iter().find(|s| s.bracket == b).cloned().unwrap();
    assert_eq!(snake(&report, Bracket::FrontNine).current_holder_id.as_deref(), Some("b1"));
    // Overall is still open and takes the correction.
    assert_eq!(snake(&report, Bracket::Overall).current_holder_id.as_deref(), Some("b2"));
    assert_eq!(snake(&report, Bracket::Overall).last_hole_updated, Some(2));
    assert_eq!(net_total(&report) + report.escrowed, Decimal::ZERO);

    // The committee reopens the front nine.
    source.reopen(front_target, 106);
    let report = evaluate(&round, &source).await;

    let front = snake(&report, Bracket::FrontNine);
    assert_eq!(front.current_holder_id.as_deref(), Some("b2"));
    assert_eq!(front.last_hole_updated, Some(2));
    assert!(front.is_final);
    assert!(!report.issues.iter().any(|i| matches!(i, EngineIssue::ReopenAfterFinal { .. })));
    assert_eq!(report.reopens.len(), 1);
    assert_eq!(report.reopens[0].requested_by, "committee");
}

#[tokio::test]
async fn test_out_of_order_arrival_uses_latest_timestamp() {
    let round = round();
    let source = MockScoreSource::new(ROUND);
    post_hole(&source, 1);
    // Correction arrives before the original it supersedes.
    source.post("a1", 2, 3, 30);
    source.post("a1", 2, 5, 21);
    for (i, player) in ["a2", "b1", "b2"].iter().enumerate() {
        source.post(player, 2, 4, 22 + i as i64);
    }

    let report = evaluate(&round, &source).await;
    let hole2 = &report.skins[1];
    assert_eq!(hole2.winner_id.as_deref(), Some("a1"));
    assert_eq!(hole2.pot_amount, dec!(2));
}

#[tokio::test]
async fn test_foreign_scores_reported_not_counted() {
    let round = round();
    let source = MockScoreSource::new(ROUND);
    post_hole(&source, 1);
    source.post("zz", 1, 1, 15);
    source.post("a1", 19, 1, 16);
    source.push(ScoreEvent::Score(score("other-round", "a2", 1, 1, 17)));

    let report = evaluate(&round, &source).await;
    assert!(report.issues.contains(&EngineIssue::UnknownPlayerReference { player_id: "zz".into(), hole: 1 }));
    assert!(report.issues.contains(&EngineIssue::HoleOutOfRange { player_id: "a1".into(), hole: 19 }));
    // Hole 1 is all pars: still a carry, the stray scores changed nothing.
    assert!(report.skins[0].is_carryover);
}

#[tokio::test]
async fn test_source_error_keeps_prior_feed_untouched() {
    let round = round();
    let source = MockScoreSource::new(ROUND);
    post_hole(&source, 1);
    let before = evaluate(&round, &source).await;

    source.set_error("entry app offline");
    assert!(source.fetch_feed().await.is_err());

    source.clear_error();
    let after = evaluate(&round, &source).await;
    assert_eq!(before, after);
}
