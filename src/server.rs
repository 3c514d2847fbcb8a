// HTTP boundary: request validation, offloading the analysis, status mapping.
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::error::{AnalysisError, ErrorReport};
use crate::kmeans::ClusterAnalyzer;

pub const MIN_CLUSTERS: i64 = 2;
pub const MAX_CLUSTERS: i64 = 20;

pub fn router(analyzer: Arc<ClusterAnalyzer>) -> Router {
    Router::new()
        .route("/api/kmeans", post(run_kmeans))
        .route("/health", get(health))
        .with_state(analyzer)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

fn bad_request(message: impl Into<String>) -> ErrorReport {
    ErrorReport::new("bad_request", message)
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

/// Pulls `n_clusters` out of the request body and checks it is an integer in range.
pub fn parse_n_clusters(body: &Value) -> Result<usize, ErrorReport> {
    let raw = match body.get("n_clusters") {
        Some(value) if !is_falsy(value) => value,
        _ => return Err(bad_request("missing 'n_clusters'")),
    };

    let n_clusters = match raw {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
    .ok_or_else(|| bad_request("n_clusters must be an integer"))?;

    if !(MIN_CLUSTERS..=MAX_CLUSTERS).contains(&n_clusters) {
        return Err(bad_request(format!("valid range: {MIN_CLUSTERS}-{MAX_CLUSTERS}")));
    }
    Ok(n_clusters as usize)
}

async fn run_kmeans(
    State(analyzer): State<Arc<ClusterAnalyzer>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Response {
    let Json(body) = match payload {
        Ok(body) => body,
        Err(rejection) => {
            debug!(%rejection, "rejected request body");
            return (StatusCode::BAD_REQUEST, Json(bad_request(rejection.body_text()))).into_response();
        }
    };

    let n_clusters = match parse_n_clusters(&body) {
        Ok(n) => n,
        Err(report) => {
            debug!(error = %report.error, "rejected n_clusters");
            return (StatusCode::BAD_REQUEST, Json(report)).into_response();
        }
    };

    info!(n_clusters, "running k-means analysis");
    let outcome = tokio::task::spawn_blocking(move || analyzer.run(n_clusters))
        .await
        .unwrap_or_else(|err| Err(AnalysisError::Internal(err.to_string())));

    match outcome {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(err) => {
            match &err {
                AnalysisError::Internal(_) => error!(kind = err.kind(), %err, "analysis failed"),
                _ => warn!(kind = err.kind(), %err, "analysis failed"),
            }
            (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorReport::from(&err))).into_response()
        }
    }
}
