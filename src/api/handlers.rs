use std::sync::Arc;
use axum::{extract::{State, Query}, http::{StatusCode, header}, Json, response::IntoResponse};
use serde::Deserialize;
use crate::{AppState, db};

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let v = env!("CARGO_PKG_VERSION");
    let d = state.pipeline.gauges().depths();
    let body = serde_json::json!({
        "status": "ok",
        "version": v,
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "queues": { "face": d.face, "avatar": d.avatar }
    });
    (StatusCode::OK, Json(body))
}

pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let d = state.pipeline.gauges().depths();
    let mut text = String::new();
    text.push_str(&format!("faceswap_queue_face {}\n", d.face));
    text.push_str(&format!("faceswap_queue_avatar {}\n", d.avatar));
    text.push_str(&format!("faceswap_uptime_seconds {}\n", state.started_at.elapsed().as_secs()));
    (StatusCode::OK, [(header::CONTENT_TYPE, "text/plain; version=0.0.4")], text)
}

#[derive(Deserialize)]
pub struct LogsQuery {
    page: Option<i64>,
    per_page: Option<i64>,
    level: Option<String>,
    module: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.filter(|s| !s.is_empty())
}

pub async fn list_logs(State(state): State<Arc<AppState>>, Query(q): Query<LogsQuery>) -> impl IntoResponse {
    let page = q.page.filter(|p| *p >= 1).unwrap_or(1);
    // Out-of-range page sizes fall back to the default rather than the nearest bound.
    let per_page = q.per_page.filter(|p| (1..=100).contains(p)).unwrap_or(20);
    let filter = db::query::LogFilter {
        level: non_empty(q.level),
        module: non_empty(q.module),
        start_date: non_empty(q.start_date),
        end_date: non_empty(q.end_date),
    };
    let pool = state.pool.clone();
    let res = tokio::task::spawn_blocking(move || {
        let conn = pool.get().map_err(|e| anyhow::anyhow!("Pool error: {}", e))?;
        db::query::list_logs(&conn, &filter, page, per_page)
    }).await;
    match res {
        Ok(Ok((logs, total))) => (StatusCode::OK, Json(serde_json::json!({
            "logs": logs,
            "total": total,
            "page": page,
            "per_page": per_page
        }))).into_response(),
        Ok(Err(e)) => {
            tracing::error!("Failed to list activity logs: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({ "error": "Failed to get logs" }))).into_response()
        }
        Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({ "error": "Failed to get logs" }))).into_response(),
    }
}
