// Handlers module
// HTTP handlers for the word game API

pub mod words;

use axum::{http::StatusCode, response::IntoResponse, Extension, Json};
use serde_json::json;

use crate::client_ip::ClientIp;

pub const BANNER: &str = "Server is running! Go play the game at https://antmic.github.io/diffly/";

/// Static banner
/// GET /
pub async fn root() -> impl IntoResponse {
    (StatusCode::OK, BANNER)
}

/// Caller address as resolved through the trusted proxies
/// GET /ip
pub async fn client_ip(client_ip: Option<Extension<ClientIp>>) -> impl IntoResponse {
    let body = match client_ip {
        Some(Extension(ClientIp(ip))) => ip.to_string(),
        None => "unknown".to_string(),
    };

    (StatusCode::OK, body)
}

/// Unknown routes
pub async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" })))
}
