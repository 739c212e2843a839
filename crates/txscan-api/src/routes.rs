//! Route table and handlers.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use txscan_core::types::TransactionRecord;
use txscan_indexer::Indexer;
use txscan_storage::{Granularity, Store, SummaryRow, TimeseriesPoint, TxPageRequest};

use crate::auth::{check_cron_secret, resolve_wallet};
use crate::error::ApiError;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub indexer: Arc<Indexer>,
    pub store: Store,
    pub cron_secret: String,
}

/// Build the full route table.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/index", post(trigger_index))
        .route("/health", get(health))
        .route("/summary", get(summary))
        .route("/all", get(all))
        .route("/timeseries", get(timeseries))
        .route("/txs", get(transactions))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ─── POST /index ─────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct TriggerParams {
    secret: Option<String>,
}

#[derive(Serialize)]
struct TriggerResponse {
    ok: bool,
    inserted: usize,
    last_block_number: u64,
    head_block_number: u64,
    newly_finalized: u64,
    truncated: bool,
}

async fn trigger_index(
    State(state): State<AppState>,
    Query(params): Query<TriggerParams>,
    headers: HeaderMap,
) -> Result<Json<TriggerResponse>, ApiError> {
    check_cron_secret(&state.cron_secret, params.secret.as_deref(), &headers)?;

    let report = state.indexer.run_once().await?;
    Ok(Json(TriggerResponse {
        ok: true,
        inserted: report.transactions_upserted,
        last_block_number: report.last_block_number,
        head_block_number: report.head_block_number,
        newly_finalized: report.newly_finalized,
        truncated: report.truncated,
    }))
}

// ─── GET /health ─────────────────────────────────────────────────────────────

async fn health(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let cursor = state.store.load_cursor().await?;
    Ok(Json(json!({
        "status": "ok",
        "index_cursor": cursor,
    })))
}

// ─── GET /summary ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ScopeParams {
    wallet: Option<String>,
}

async fn summary(
    State(state): State<AppState>,
    Query(params): Query<ScopeParams>,
    headers: HeaderMap,
) -> Result<Json<SummaryRow>, ApiError> {
    let scope = resolve_wallet(params.wallet.as_deref(), &headers)?;
    let row = state.store.summary(scope.as_deref()).await?;
    Ok(Json(row))
}

// ─── GET /all ────────────────────────────────────────────────────────────────

/// The unscoped summary, regardless of any bearer credential. Same shape
/// as `/summary`.
async fn all(State(state): State<AppState>) -> Result<Json<SummaryRow>, ApiError> {
    let row = state.store.summary(None).await?;
    Ok(Json(row))
}

// ─── GET /timeseries ─────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct TimeseriesParams {
    granularity: Option<String>,
    from: Option<String>,
    to: Option<String>,
    wallet: Option<String>,
}

fn parse_rfc3339(name: &str, s: &str) -> Result<DateTime<Utc>, ApiError> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|_| ApiError::BadRequest(format!("{name} is not an RFC 3339 timestamp: {s}")))
}

async fn timeseries(
    State(state): State<AppState>,
    Query(params): Query<TimeseriesParams>,
    headers: HeaderMap,
) -> Result<Json<Vec<TimeseriesPoint>>, ApiError> {
    let scope = resolve_wallet(params.wallet.as_deref(), &headers)?;

    let granularity = match params.granularity.as_deref() {
        None => Granularity::Day,
        Some(s) => Granularity::parse(s).ok_or_else(|| {
            ApiError::BadRequest(format!("unknown granularity: {s} (hour|day|week|month)"))
        })?,
    };
    let from = params
        .from
        .as_deref()
        .map(|s| parse_rfc3339("from", s))
        .transpose()?;
    let to = params
        .to
        .as_deref()
        .map(|s| parse_rfc3339("to", s))
        .transpose()?;

    let points = state
        .store
        .timeseries(granularity, from, to, scope.as_deref())
        .await?;
    Ok(Json(points))
}

// ─── GET /txs ────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct TxParams {
    limit: Option<u32>,
    offset: Option<u32>,
    /// Keyset cursor from a previous page's `next_cursor`.
    cursor: Option<String>,
    wallet: Option<String>,
}

#[derive(Serialize)]
struct TxPage {
    transactions: Vec<TransactionRecord>,
    next_cursor: Option<String>,
}

fn parse_page_cursor(s: &str) -> Result<(u64, String), ApiError> {
    let bad = || ApiError::BadRequest(format!("malformed cursor: {s}"));
    let (block, hash) = s.split_once(':').ok_or_else(bad)?;
    let block = block.parse::<u64>().map_err(|_| bad())?;
    if hash.is_empty() {
        return Err(bad());
    }
    Ok((block, hash.to_string()))
}

async fn transactions(
    State(state): State<AppState>,
    Query(params): Query<TxParams>,
    headers: HeaderMap,
) -> Result<Json<TxPage>, ApiError> {
    let scope = resolve_wallet(params.wallet.as_deref(), &headers)?;
    let after = params
        .cursor
        .as_deref()
        .map(parse_page_cursor)
        .transpose()?;

    let limit = params
        .limit
        .unwrap_or(txscan_storage::queries::DEFAULT_PAGE_SIZE)
        .clamp(1, txscan_storage::queries::MAX_PAGE_SIZE);

    let rows = state
        .store
        .list_transactions(&TxPageRequest {
            limit: Some(limit),
            offset: params.offset,
            wallet: scope,
            after,
        })
        .await?;

    // A full page may have more behind it; expose the keyset cursor.
    let next_cursor = (rows.len() == limit as usize)
        .then(|| rows.last())
        .flatten()
        .map(|t| format!("{}:{}", t.block_number, t.hash));

    Ok(Json(TxPage {
        transactions: rows,
        next_cursor,
    }))
}

// ─── Tests ───────────────────────────────────────────────────────────────────
