// Word handlers
// HTTP handlers for random word selection and dictionary lookups

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use crate::{
    db::WordStore,
    error::ApiError,
    models::{normalize_word, CheckWordRequest, CheckWordResponse, RandomWordResponse},
};

/// Get a random winning word
/// GET /getword
pub async fn get_word<S>(
    State(store): State<Arc<S>>,
) -> Result<impl IntoResponse, ApiError>
where
    S: WordStore + Send + Sync + 'static,
{
    let word = store.random_word().await?;

    debug!("Served random winning word");
    Ok((StatusCode::OK, Json(RandomWordResponse { word })))
}

/// Check whether a guess is in the dictionary
/// POST /checkword
pub async fn check_word<S>(
    State(store): State<Arc<S>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError>
where
    S: WordStore + Send + Sync + 'static,
{
    let Json(body) = payload.map_err(reject_body)?;
    let request = CheckWordRequest::try_from(body).map_err(ApiError::Validation)?;
    let raw = request.validate().map_err(ApiError::Validation)?;

    let word = normalize_word(raw);
    let exists = if word.is_empty() {
        false
    } else {
        store.word_exists(&word).await?
    };

    info!("Checked word '{}': {}", word, exists);
    Ok((StatusCode::OK, Json(CheckWordResponse { message: exists })))
}

/// Oversized bodies keep their 413; every other rejection is bad input.
fn reject_body(rejection: JsonRejection) -> ApiError {
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(rejection.body_text())
    } else {
        ApiError::validation(rejection.body_text())
    }
}
