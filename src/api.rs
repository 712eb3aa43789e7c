//! DB HTTP façade
//!
//! Thin JSON surface over the storage engine, one resource:
//!
//! - `GET /db/{key}` → `200 {"key": ..., "value": ...}` or `404`
//! - `POST /db/{key}` with `{"value": ...}` → `204`, `400` on malformed
//!   JSON, `500` on a storage failure
//!
//! Engine calls block on disk, so handlers bridge onto the blocking thread
//! pool instead of stalling the async runtime.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::datastore::Engine;
use crate::error::RelayError;

/// Body of a successful GET
#[derive(Debug, Serialize)]
struct RecordBody {
    key: String,
    value: String,
}

/// Body of a POST
#[derive(Debug, Deserialize)]
struct PutBody {
    value: String,
}

/// Build the façade router over `engine`
pub fn router(engine: Arc<Engine>) -> Router {
    Router::new()
        .route("/db/:key", get(get_record).post(put_record))
        .with_state(engine)
}

async fn get_record(State(engine): State<Arc<Engine>>, Path(key): Path<String>) -> Response {
    let lookup = {
        let engine = Arc::clone(&engine);
        let key = key.clone();
        tokio::task::spawn_blocking(move || engine.get(&key)).await
    };

    match lookup {
        Ok(Ok(value)) => Json(RecordBody { key, value }).into_response(),
        Ok(Err(RelayError::KeyNotFound)) => {
            (StatusCode::NOT_FOUND, "not found").into_response()
        }
        Ok(Err(e)) => {
            tracing::error!(%key, "get failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
        Err(e) => {
            tracing::error!("read task failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn put_record(
    State(engine): State<Arc<Engine>>,
    Path(key): Path<String>,
    Json(body): Json<PutBody>,
) -> Response {
    let stored =
        tokio::task::spawn_blocking(move || engine.put(&key, &body.value)).await;

    match stored {
        Ok(Ok(())) => StatusCode::NO_CONTENT.into_response(),
        Ok(Err(e)) => {
            tracing::error!("put failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to store value").into_response()
        }
        Err(e) => {
            tracing::error!("write task failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
