//! HTTP surface: the axum router and its handlers.

use crate::config::Config;
use crate::error::ProxyError;
use crate::logging::{RequestRecord, SharedLedger};
use crate::models::{normalize_model, normalize_request};
use crate::proxy;
use crate::tokens::estimate_input_tokens;
use crate::translate::anthropic_types::{
    ErrorResponse, MessagesRequest, TokenCountRequest, TokenCountResponse,
};

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use futures::stream::StreamExt;
use std::convert::Infallible;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub client: reqwest::Client,
    pub ledger: SharedLedger,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/v1/messages", post(handle_messages))
        .route("/v1/messages/count_tokens", post(handle_count_tokens))
        .route("/v1/chat/completions", post(handle_chat_completions))
        .route("/health", get(handle_health))
        .route("/", get(handle_root))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn handle_messages(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(resp) = check_client_key(&state.config, &headers) {
        return resp;
    }

    let mut req: MessagesRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(error = %e, "failed to parse messages request");
            let err = ErrorResponse::invalid_request(format!("Invalid request body: {e}"));
            return (StatusCode::BAD_REQUEST, Json(err)).into_response();
        }
    };

    if let Err(msg) = req.validate() {
        let err = ErrorResponse::invalid_request(msg);
        return (StatusCode::BAD_REQUEST, Json(err)).into_response();
    }

    normalize_request(&mut req, &state.config);

    let is_streaming = req.stream.unwrap_or(false);
    state.ledger.record(
        RequestRecord::new(
            "/v1/messages",
            req.original_model.as_deref().unwrap_or(&req.model),
            &req.model,
        )
        .counts(
            req.messages.len(),
            req.tools.as_ref().map_or(0, Vec::len),
        )
        .streaming(is_streaming),
    );

    if is_streaming {
        handle_streaming(state, &req).await
    } else {
        handle_non_streaming(state, &req).await
    }
}

async fn handle_non_streaming(state: Arc<AppState>, req: &MessagesRequest) -> Response {
    match proxy::proxy_non_streaming(req, &state.config, &state.client).await {
        Ok(resp) => Json(resp).into_response(),
        Err(e) => error_response(&e),
    }
}

async fn handle_streaming(state: Arc<AppState>, req: &MessagesRequest) -> Response {
    let frames = match proxy::proxy_streaming(req, &state.config, &state.client).await {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "streaming setup failed");
            return error_response(&e);
        }
    };

    let event_stream = frames.map(|frame| -> Result<Event, Infallible> {
        let mut event = Event::default();
        if let Some(name) = frame.event {
            event = event.event(name);
        }
        Ok(event.data(frame.data))
    });

    let mut response = Sse::new(event_stream)
        .keep_alive(KeepAlive::default())
        .into_response();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("text/event-stream; charset=utf-8"),
    );
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-cache"),
    );
    response
}

async fn handle_count_tokens(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(resp) = check_client_key(&state.config, &headers) {
        return resp;
    }

    let req: TokenCountRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            let err = ErrorResponse::invalid_request(format!("Invalid request body: {e}"));
            return (StatusCode::BAD_REQUEST, Json(err)).into_response();
        }
    };

    let effective = normalize_model(&req.model, &state.config);
    let input_tokens = estimate_input_tokens(&req);

    state.ledger.record(
        RequestRecord::new("/v1/messages/count_tokens", &req.model, effective).counts(
            req.messages.len(),
            req.tools.as_ref().map_or(0, Vec::len),
        ),
    );

    Json(TokenCountResponse { input_tokens }).into_response()
}

async fn handle_chat_completions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(resp) = check_client_key(&state.config, &headers) {
        return resp;
    }

    match proxy::proxy_chat_completions(body, &state.config, &state.client).await {
        Ok((status, content_type, resp_body)) => Response::builder()
            .status(StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY))
            .header(header::CONTENT_TYPE, content_type)
            .body(Body::from(resp_body))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()),
        Err(e) => {
            tracing::error!(error = %e, "chat completions passthrough failed");
            error_response(&e)
        }
    }
}

async fn handle_health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "openai_api_configured": state.config.openai_api_key.is_some(),
        "anthropic_api_configured": state.config.anthropic_api_key.is_some(),
        "nvidia_nim_api_configured": state.config.nvidia_nim_api_key.is_some(),
    }))
}

async fn handle_root(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": format!("claude-bridge v{}", env!("CARGO_PKG_VERSION")),
        "status": "running",
        "config": {
            "preferred_provider": state.config.preferred_provider.tag(),
            "big_model": state.config.big_model,
            "small_model": state.config.small_model,
            "max_tokens_limit": state.config.max_tokens_limit,
        },
        "endpoints": {
            "messages": "/v1/messages",
            "count_tokens": "/v1/messages/count_tokens",
            "chat_completions": "/v1/chat/completions",
            "health": "/health",
        },
    }))
}

/// When `ANTHROPIC_API_KEY` is configured, inbound requests must present it
/// (either `x-api-key` or a bearer token). Without it, the proxy is open.
fn check_client_key(config: &Config, headers: &HeaderMap) -> Result<(), Response> {
    let Some(ref expected) = config.anthropic_api_key else {
        return Ok(());
    };

    let presented = headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .or_else(|| {
            headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
        });

    if presented == Some(expected.as_str()) {
        Ok(())
    } else {
        tracing::warn!("rejecting request with missing or invalid client API key");
        let err = ErrorResponse::authentication("Invalid API key");
        Err((StatusCode::UNAUTHORIZED, Json(err)).into_response())
    }
}

fn error_response(e: &ProxyError) -> Response {
    let status = StatusCode::from_u16(e.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(e.to_response())).into_response()
}
