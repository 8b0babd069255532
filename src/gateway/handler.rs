//! Gateway request handler
//!
//! Routes report reads, status checks and WebSocket upgrades.

use super::session;
use super::GatewayState;
use crate::error::VigilError;
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::header::{
    HeaderValue, CONNECTION, CONTENT_TYPE, SEC_WEBSOCKET_ACCEPT, SEC_WEBSOCKET_KEY,
    SEC_WEBSOCKET_VERSION, UPGRADE,
};
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::json;
use std::convert::Infallible;
use std::net::SocketAddr;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, error};

/// Handle one gateway request
pub async fn handle_request(
    req: Request<Incoming>,
    peer: SocketAddr,
    state: GatewayState,
) -> std::result::Result<Response<Full<Bytes>>, Infallible> {
    debug!("{} {} from {}", req.method(), req.uri().path(), peer);

    if req.method() != Method::GET {
        return Ok(json_response(
            StatusCode::METHOD_NOT_ALLOWED,
            json!({ "error": "method not allowed" }).to_string(),
        ));
    }

    let response = match req.uri().path() {
        "/ws" => handle_subscribe(req, peer, state),
        "/api/report" => handle_report(&state),
        "/api/status" => handle_status(&state),
        _ => json_response(
            StatusCode::NOT_FOUND,
            json!({ "error": "not found" }).to_string(),
        ),
    };
    Ok(response)
}

/// Serve the latest report, or the read failure as-is
fn handle_report(state: &GatewayState) -> Response<Full<Bytes>> {
    match state.store.load() {
        Ok(report) => match serde_json::to_string(&report) {
            Ok(body) => json_response(StatusCode::OK, body),
            Err(e) => error_response(&VigilError::JsonError(e)),
        },
        Err(e) => error_response(&e),
    }
}

fn handle_status(state: &GatewayState) -> Response<Full<Bytes>> {
    let body = json!({
        "subscribers": state.registry.size(),
        "report_available": state.store.marker().is_some(),
    });
    json_response(StatusCode::OK, body.to_string())
}

/// Complete the WebSocket handshake and hand the upgraded connection to a
/// subscriber session
fn handle_subscribe(
    req: Request<Incoming>,
    peer: SocketAddr,
    state: GatewayState,
) -> Response<Full<Bytes>> {
    let key = match websocket_key(&req) {
        Some(key) => key,
        None => {
            debug!("Rejected non-upgrade request to /ws from {}", peer);
            return json_response(
                StatusCode::BAD_REQUEST,
                json!({ "error": "expected a WebSocket upgrade" }).to_string(),
            );
        }
    };
    let accept = derive_accept_key(key.as_bytes());

    tokio::task::spawn(async move {
        match hyper::upgrade::on(req).await {
            Ok(upgraded) => {
                let io = TokioIo::new(upgraded);
                let ws = WebSocketStream::from_raw_socket(io, Role::Server, None).await;
                session::run(ws, peer, state.registry).await;
            }
            Err(e) => {
                error!("WebSocket upgrade from {} failed: {}", peer, e);
            }
        }
    });

    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
    let headers = response.headers_mut();
    headers.insert(UPGRADE, HeaderValue::from_static("websocket"));
    headers.insert(CONNECTION, HeaderValue::from_static("Upgrade"));
    if let Ok(value) = HeaderValue::from_str(&accept) {
        headers.insert(SEC_WEBSOCKET_ACCEPT, value);
    }
    response
}

/// The client's handshake key, if this is a well-formed version 13 upgrade
fn websocket_key(req: &Request<Incoming>) -> Option<String> {
    let headers = req.headers();

    let wants_upgrade = headers
        .get(CONNECTION)
        .and_then(|v| v.to_str().ok())
        .map(|v| {
            v.split(',')
                .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
        })
        .unwrap_or(false);
    let is_websocket = headers
        .get(UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().eq_ignore_ascii_case("websocket"))
        .unwrap_or(false);
    let version_ok = headers
        .get(SEC_WEBSOCKET_VERSION)
        .map(|v| v.as_bytes() == b"13")
        .unwrap_or(false);

    if !(wants_upgrade && is_websocket && version_ok) {
        return None;
    }

    headers
        .get(SEC_WEBSOCKET_KEY)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn error_response(err: &VigilError) -> Response<Full<Bytes>> {
    let status = match err {
        VigilError::ReportNotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let kind = match err {
        VigilError::ReportNotFound(_) => "not_found",
        VigilError::ReportCorrupt { .. } => "corrupt",
        _ => "internal",
    };
    json_response(
        status,
        json!({ "error": kind, "message": err.to_string() }).to_string(),
    )
}

fn json_response(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}
