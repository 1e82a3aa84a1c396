//! REST handlers for the pipeline trigger and the lead browsing surface.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{ConnectInfo, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use stratosphere_common::{Bucket, Lead, LeadStatus};
use stratosphere_store::LeadFilter;

use crate::AppState;

pub const RATE_LIMIT_PER_HOUR: usize = 10;

/// Check rate limit for an IP. Prunes expired entries and records the new
/// request if allowed.
pub fn check_rate_limit(entries: &mut Vec<Instant>, now: Instant, max_per_hour: usize) -> bool {
    let cutoff = now - std::time::Duration::from_secs(3600);
    entries.retain(|t| *t > cutoff);
    if entries.len() >= max_per_hour {
        return false;
    }
    entries.push(now);
    true
}

fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({"error": message})),
    )
        .into_response()
}

fn internal_error(e: impl std::fmt::Display) -> Response {
    warn!(error = %e, "Request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({"error": "internal error"})),
    )
        .into_response()
}

// --- Pipeline control ---

#[derive(Deserialize, Default)]
pub struct RunRequest {
    pub run_id: Option<String>,
}

pub async fn run_pipeline(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<std::net::SocketAddr>,
    body: Option<Json<RunRequest>>,
) -> Response {
    {
        let mut limiter = state.rate_limiter.lock().await;
        let entries = limiter.entry(addr.ip()).or_default();
        if !check_rate_limit(entries, Instant::now(), RATE_LIMIT_PER_HOUR) {
            return (
                StatusCode::TOO_MANY_REQUESTS,
                Json(serde_json::json!({"error": "Rate limit exceeded: max 10 triggers per hour"})),
            )
                .into_response();
        }
    }

    // Busy is a normal answer, not an error.
    if state.controller.is_busy() {
        return (StatusCode::OK, Json(serde_json::json!({"status": "busy"}))).into_response();
    }

    let run_id = body
        .and_then(|Json(b)| b.run_id)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    info!(run_id = run_id.as_str(), "Pipeline run triggered");
    state
        .store
        .log_line(&run_id, None, "api", "info", &format!("run triggered by {}", addr.ip()))
        .await;

    let controller = state.controller.clone();
    let spawned_run_id = run_id.clone();
    tokio::spawn(async move {
        match controller.run(Some(spawned_run_id.clone())).await {
            Ok(stats) => info!(run_id = spawned_run_id.as_str(), "Run complete. {stats}"),
            Err(e) => warn!(run_id = spawned_run_id.as_str(), error = %e, "Run not started"),
        }
    });

    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({"status": "started", "run_id": run_id})),
    )
        .into_response()
}

pub async fn stop_pipeline(State(state): State<Arc<AppState>>) -> Response {
    state.controller.request_stop();
    Json(serde_json::json!({"status": "stopping"})).into_response()
}

pub async fn pipeline_status(State(state): State<Arc<AppState>>) -> Response {
    Json(state.controller.state().await).into_response()
}

#[derive(Deserialize)]
pub struct LogsQuery {
    pub run_id: Option<String>,
    pub limit: Option<i64>,
}

pub async fn pipeline_logs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LogsQuery>,
) -> Response {
    // Default to the run the controller last reported.
    let run_id = match query.run_id {
        Some(id) => id,
        None => {
            let current = state.controller.state().await;
            match current.run_id {
                Some(id) => id,
                None => return bad_request("no run yet; pass run_id"),
            }
        }
    };
    let limit = query.limit.unwrap_or(100);
    match state.store.recent_logs(&run_id, limit).await {
        Ok(lines) => Json(lines).into_response(),
        Err(e) => internal_error(e),
    }
}

// --- Leads ---

#[derive(Deserialize, Default)]
pub struct LeadsQuery {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
    pub status: Option<String>,
    pub bucket: Option<String>,
    pub run_id: Option<String>,
    pub created_after: Option<DateTime<Utc>>,
}

pub async fn list_leads(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LeadsQuery>,
) -> Response {
    let bucket = match &query.bucket {
        Some(raw) => match Bucket::from_str_loose(raw) {
            Some(b) => Some(b),
            None => return bad_request("unknown bucket"),
        },
        None => None,
    };
    let filter = LeadFilter {
        status: query.status.as_deref().map(LeadStatus::from_str_loose),
        bucket,
        run_id: query.run_id.clone(),
        created_after: query.created_after,
        skip: query.skip.unwrap_or(0),
        limit: query.limit.unwrap_or(50),
    };
    match state.store.query(&filter).await {
        Ok(leads) => Json(leads).into_response(),
        Err(e) => internal_error(e),
    }
}

pub async fn lead_stats(State(state): State<Arc<AppState>>) -> Response {
    match state.store.stats().await {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => internal_error(e),
    }
}

#[derive(Deserialize)]
pub struct UpdateLeadRequest {
    pub status: Option<String>,
    pub bucket: Option<String>,
}

pub async fn update_lead(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateLeadRequest>,
) -> Response {
    if body.status.is_none() && body.bucket.is_none() {
        return bad_request("nothing to update");
    }
    let bucket = match &body.bucket {
        Some(raw) => match Bucket::from_str_loose(raw) {
            Some(b) => Some(b),
            None => return bad_request("unknown bucket"),
        },
        None => None,
    };
    let status = body.status.as_deref().map(LeadStatus::from_str_loose);

    match state.store.set_status_bucket(id, status, bucket).await {
        Ok(Some(lead)) => Json(lead).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "lead not found"})),
        )
            .into_response(),
        Err(e) => internal_error(e),
    }
}

// --- CSV export ---

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn csv_row(lead: &Lead) -> String {
    let cells = [
        lead.id.to_string(),
        lead.project_name.clone(),
        lead.domain.clone().unwrap_or_default(),
        lead.social_handle.clone().unwrap_or_default(),
        lead.telegram_channel.clone().unwrap_or_default(),
        lead.email.clone().unwrap_or_default(),
        lead.status.to_string(),
        lead.score.to_string(),
        lead.bucket.map(|b| b.to_string()).unwrap_or_default(),
        lead.reject_reason.clone().unwrap_or_default(),
        lead.source_counts.to_string(),
        lead.chains.join("|"),
        lead.tags.join("|"),
        lead.icebreaker.clone().unwrap_or_default(),
        lead.created_at.to_rfc3339(),
    ];
    cells
        .iter()
        .map(|c| csv_field(c))
        .collect::<Vec<_>>()
        .join(",")
}

const CSV_HEADER: &str = "id,project_name,domain,social_handle,telegram_channel,email,\
status,score,bucket,reject_reason,source_counts,chains,tags,icebreaker,created_at";

pub async fn export_csv(State(state): State<Arc<AppState>>) -> Response {
    let leads = match state.store.export_rows().await {
        Ok(leads) => leads,
        Err(e) => return internal_error(e),
    };
    let mut csv = String::from(CSV_HEADER);
    csv.push('\n');
    for lead in &leads {
        csv.push_str(&csv_row(lead));
        csv.push('\n');
    }
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"leads.csv\"",
            ),
        ],
        csv,
    )
        .into_response()
}

pub async fn health() -> Response {
    Json(serde_json::json!({"status": "ok"})).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_allows_then_blocks() {
        let mut entries = Vec::new();
        let now = Instant::now();
        for _ in 0..RATE_LIMIT_PER_HOUR {
            assert!(check_rate_limit(&mut entries, now, RATE_LIMIT_PER_HOUR));
        }
        assert!(!check_rate_limit(&mut entries, now, RATE_LIMIT_PER_HOUR));
    }

    #[test]
    fn rate_limit_prunes_old_entries() {
        let now = Instant::now();
        let Some(old) = now.checked_sub(std::time::Duration::from_secs(3601)) else {
            return;
        };
        let mut entries = vec![old; RATE_LIMIT_PER_HOUR];
        assert!(check_rate_limit(&mut entries, now, RATE_LIMIT_PER_HOUR));
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn csv_fields_are_escaped() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }
}
