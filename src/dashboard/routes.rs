//! Dashboard API route handlers.
//!
//! All endpoints return JSON views of the latest `RoundReport`. State is
//! shared via `Arc<DashboardState>`; the poll loop replaces the report after
//! every recompute.

use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::engine::RoundReport;
use crate::types::{
    Bracket, EngineIssue, PlayerId, ReopenRequest, RoundStatus, SettlementLedgerEntry, SkinResult,
    SkinStatus, SnakeState, TeamMatchState,
};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Shared state accessible by all route handlers.
pub struct DashboardState {
    pub round_id: String,
    pub report: RwLock<Option<RoundReport>>,
    pub updated_at: RwLock<Option<DateTime<Utc>>>,
}

impl DashboardState {
    pub fn new(round_id: &str) -> Self {
        Self {
            round_id: round_id.to_string(),
            report: RwLock::new(None),
            updated_at: RwLock::new(None),
        }
    }

    /// Replace the published report.
    pub async fn publish(&self, report: RoundReport) {
        *self.report.write().await = Some(report);
        *self.updated_at.write().await = Some(Utc::now());
    }
}

pub type AppState = Arc<DashboardState>;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub round_id: String,
    pub status: RoundStatus,
    pub holes_complete: u8,
    pub stakes_configured: bool,
    pub issue_count: usize,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Skin result as displayed; `pot_amount` is withheld while stakes are not
/// fully configured.
#[derive(Debug, Clone, Serialize)]
pub struct SkinEntry {
    pub hole: u8,
    pub winner_id: Option<PlayerId>,
    pub winner_score: Option<i32>,
    pub pot_amount: Option<Decimal>,
    pub is_carryover: bool,
    pub status: SkinStatus,
}

impl SkinEntry {
    fn new(result: &SkinResult, show_money: bool) -> Self {
        Self {
            hole: result.hole,
            winner_id: result.winner_id.clone(),
            winner_score: result.winner_score,
            pot_amount: show_money.then_some(result.pot_amount),
            is_carryover: result.is_carryover,
            status: result.status,
        }
    }
}

/// Snake bracket as displayed; `amount` is withheld like skin pots.
#[derive(Debug, Clone, Serialize)]
pub struct SnakeEntry {
    pub bracket: Bracket,
    pub rule: String,
    pub current_holder_id: Option<PlayerId>,
    pub holder_value: Option<i32>,
    pub last_hole_updated: Option<u8>,
    pub amount: Option<Decimal>,
    pub is_final: bool,
}

impl SnakeEntry {
    fn new(state: &SnakeState, show_money: bool) -> Self {
        Self {
            bracket: state.bracket,
            rule: state.rule.clone(),
            current_holder_id: state.current_holder_id.clone(),
            holder_value: state.holder_value,
            last_hole_updated: state.last_hole_updated,
            amount: show_money.then_some(state.amount),
            is_final: state.is_final,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LedgerResponse {
    pub stakes_configured: bool,
    /// Empty while stakes are not fully configured.
    pub entries: Vec<SettlementLedgerEntry>,
    pub escrowed: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct IssuesResponse {
    pub issues: Vec<EngineIssue>,
    pub reopens: Vec<ReopenRequest>,
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /api/status
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let report = state.report.read().await;
    let updated_at = *state.updated_at.read().await;

    Json(match report.as_ref() {
        Some(r) => StatusResponse {
            round_id: r.round_id.clone(),
            status: r.status,
            holes_complete: r.holes_complete,
            stakes_configured: r.stakes_configured,
            issue_count: r.issues.len(),
            updated_at,
        },
        None => StatusResponse {
            round_id: state.round_id.clone(),
            status: RoundStatus::NotStarted,
            holes_complete: 0,
            stakes_configured: false,
            issue_count: 0,
            updated_at,
        },
    })
}

/// GET /api/skins
pub async fn get_skins(State(state): State<AppState>) -> Json<Vec<SkinEntry>> {
    let report = state.report.read().await;
    Json(match report.as_ref() {
        Some(r) => r.skins.iter().map(|s| SkinEntry::new(s, r.stakes_configured)).collect(),
        None => Vec::new(),
    })
}

/// GET /api/snake
pub async fn get_snake(State(state): State<AppState>) -> Json<Vec<SnakeEntry>> {
    let report = state.report.read().await;
    Json(match report.as_ref() {
        Some(r) => r.snakes.iter().map(|s| SnakeEntry::new(s, r.stakes_configured)).collect(),
        None => Vec::new(),
    })
}

/// GET /api/matches
pub async fn get_matches(State(state): State<AppState>) -> Json<Vec<TeamMatchState>> {
    let report = state.report.read().await;
    Json(report.as_ref().map(|r| r.matches.clone()).unwrap_or_default())
}

/// GET /api/ledger
pub async fn get_ledger(State(state): State<AppState>) -> Json<LedgerResponse> {
    let report = state.report.read().await;
    Json(match report.as_ref() {
        Some(r) if r.stakes_configured => LedgerResponse {
            stakes_configured: true,
            entries: r.ledger.clone(),
            escrowed: r.escrowed,
        },
        _ => LedgerResponse {
            stakes_configured: false,
            entries: Vec::new(),
            escrowed: Decimal::ZERO,
        },
    })
}

/// GET /api/issues
pub async fn get_issues(State(state): State<AppState>) -> Json<IssuesResponse> {
    let report = state.report.read().await;
    Json(IssuesResponse {
        issues: report.as_ref().map(|r| r.issues.clone()).unwrap_or_default(),
        reopens: report.as_ref().map(|r| r.reopens.clone()).unwrap_or_default(),
    })
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
