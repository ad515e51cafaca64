//! Mock score source for integration testing.
//!
//! Provides a deterministic `ScoreSource` whose event log is appended to
//! from test code, all in-memory with no files involved.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::{Arc, Mutex};

use fairway::feed::{ScoreFeed, ScoreSource};
use fairway::types::{HoleScore, ReopenRequest, ReopenTarget, ScoreEvent};

/// Tee time of every mock round.
pub fn tee_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 1, 8, 0, 0).unwrap()
}

pub fn at(minute: i64) -> DateTime<Utc> {
    tee_time() + Duration::minutes(minute)
}

pub fn score(round_id: &str, player: &str, hole: u8, net: i32, minute: i64) -> HoleScore {
    HoleScore {
        round_id: round_id.to_string(),
        player_id: player.to_string(),
        hole,
        gross: (net + 1) as u32,
        net,
        timestamp: at(minute),
    }
}

/// In-memory score log shared between the test and the engine.
pub struct MockScoreSource {
    round_id: String,
    events: Arc<Mutex<Vec<ScoreEvent>>>,
    /// If set, `fetch_feed` returns this error.
    force_error: Arc<Mutex<Option<String>>>,
}

impl MockScoreSource {
    pub fn new(round_id: &str) -> Self {
        Self {
            round_id: round_id.to_string(),
            events: Arc::new(Mutex::new(Vec::new())),
            force_error: Arc::new(Mutex::new(None)),
        }
    }

    pub fn push(&self, event: ScoreEvent) {
        self.events.lock().unwrap().push(event);
    }

    pub fn post(&self, player: &str, hole: u8, net: i32, minute: i64) {
        self.push(ScoreEvent::Score(score(&self.round_id, player, hole, net, minute)));
    }

    pub fn reopen(&self, target: ReopenTarget, minute: i64) {
        self.events.lock().unwrap().push(ScoreEvent::Reopen(ReopenRequest {
            target,
            timestamp: at(minute),
            requested_by: "committee".into(),
            reason: "scorecard correction".into(),
        }));
    }

    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }

    pub fn clear_error(&self) {
        *self.force_error.lock().unwrap() = None;
    }
}

#[async_trait]
impl ScoreSource for MockScoreSource {
    async fn fetch_feed(&self) -> Result<ScoreFeed> {
        if let Some(msg) = self.force_error.lock().unwrap().clone() {
            return Err(anyhow!(msg));
        }
        let events = self.events.lock().unwrap().clone();
        Ok(ScoreFeed::from_events(&self.round_id, events))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_returns_posted_events() {
        let source = MockScoreSource::new("r1");
        source.post("a1", 1, 4, 1);
        source.post("a2", 1, 5, 2);
        let feed = source.fetch_feed().await.unwrap();
        assert_eq!(feed.len(), 2);
        assert_eq!(feed.round_id(), "r1");
    }

    #[tokio::test]
    async fn test_mock_forced_error() {
        let source = MockScoreSource::new("r1");
        source.set_error("entry app offline");
        let err = source.fetch_feed().await.unwrap_err();
        assert!(err.to_string().contains("offline"));

        source.clear_error();
        assert!(source.fetch_feed().await.is_ok());
    }
}
