//! The viewer-facing HTTP API.
//!
//! Paths and JSON envelopes match the dashboard the relay serves:
//! `{"success": true, ...}` on the happy path, `{"success": false,
//! "error": "..."}` otherwise.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::json;
use uuid::Uuid;

use crate::camera::{CameraDescriptor, Registration};
use crate::error::{Error, RelayError};
use crate::service::CameraService;
use crate::transport::CameraTransport;

use super::sink::ChannelSink;

const NO_CACHE: &str = "no-cache, no-store, must-revalidate";

/// Build the router over a shared service instance.
pub fn router<T: CameraTransport>(service: Arc<CameraService<T>>) -> Router {
    Router::new()
        .route("/health", get(health::<T>))
        .route("/api/camera", post(register_camera::<T>))
        .route("/api/camera/list", get(list_cameras::<T>))
        .route("/api/camera/status", get(all_statuses::<T>))
        .route("/api/camera/:id", delete(unregister_camera::<T>))
        .route("/api/camera/:id/status", get(camera_status::<T>))
        .route("/api/camera/:id/snapshot", get(snapshot::<T>))
        .route("/api/camera/:id/stream", get(stream::<T>))
        .with_state(service)
}

fn error_response(error: Error) -> Response {
    let status = match &error {
        Error::CameraNotFound(_) => StatusCode::NOT_FOUND,
        Error::Config(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(json!({ "success": false, "error": error.to_string() })),
    )
        .into_response()
}

async fn health<T: CameraTransport>(
    State(service): State<Arc<CameraService<T>>>,
) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "uptime": service.uptime().as_secs(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn register_camera<T: CameraTransport>(
    State(service): State<Arc<CameraService<T>>>,
    Json(descriptor): Json<CameraDescriptor>,
) -> Response {
    match service.register_camera(descriptor).await {
        Ok(Registration::Online) => {
            (StatusCode::CREATED, Json(json!({ "success": true }))).into_response()
        }
        Ok(Registration::Unreachable(e)) => (
            StatusCode::CREATED,
            Json(json!({
                "success": true,
                "warning": format!("Camera registered but unreachable: {}", e),
            })),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

async fn unregister_camera<T: CameraTransport>(
    State(service): State<Arc<CameraService<T>>>,
    Path(camera_id): Path<String>,
) -> Response {
    if service.unregister_camera(&camera_id).await {
        Json(json!({ "success": true })).into_response()
    } else {
        error_response(Error::CameraNotFound(camera_id))
    }
}

async fn list_cameras<T: CameraTransport>(
    State(service): State<Arc<CameraService<T>>>,
) -> Json<serde_json::Value> {
    let cameras = service.list_cameras().await;
    Json(json!({ "success": true, "cameras": cameras }))
}

async fn all_statuses<T: CameraTransport>(
    State(service): State<Arc<CameraService<T>>>,
) -> Json<serde_json::Value> {
    let statuses = service.get_all_statuses().await;
    Json(json!({ "success": true, "cameras": statuses }))
}

async fn camera_status<T: CameraTransport>(
    State(service): State<Arc<CameraService<T>>>,
    Path(camera_id): Path<String>,
) -> Response {
    match service.get_status(&camera_id).await {
        Some(status) => Json(json!({ "success": true, "status": status })).into_response(),
        None => error_response(Error::CameraNotFound(camera_id)),
    }
}

async fn snapshot<T: CameraTransport>(
    State(service): State<Arc<CameraService<T>>>,
    Path(camera_id): Path<String>,
) -> Response {
    match service.get_snapshot(&camera_id).await {
        Ok(payload) => (
            [
                (header::CONTENT_TYPE, "image/jpeg"),
                (header::CACHE_CONTROL, NO_CACHE),
            ],
            payload,
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

/// Attach the viewer and return the multipart stream.
///
/// A connect failure on a still-healing relay keeps the response open:
/// the viewer is attached and receives frames once the relay reconnects.
async fn stream<T: CameraTransport>(
    State(service): State<Arc<CameraService<T>>>,
    Path(camera_id): Path<String>,
) -> Response {
    let client_id = Uuid::new_v4().to_string();
    let (sink, pending) = ChannelSink::new();

    match service
        .open_stream(&camera_id, &client_id, Box::new(sink))
        .await
    {
        Ok(()) | Err(Error::Relay(RelayError::Connect { .. })) => {}
        Err(e) => return error_response(e),
    }

    // The preamble was written synchronously during attach.
    let preamble = match pending.preamble.await {
        Ok(preamble) => preamble,
        Err(_) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "error": "stream setup failed" })),
            )
                .into_response()
        }
    };

    tracing::debug!(camera = %camera_id, client = %client_id, "Stream response opened");
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, preamble.content_type)
        .header(header::CACHE_CONTROL, preamble.cache_control)
        .header(header::PRAGMA, "no-cache")
        .header(header::EXPIRES, "0")
        .body(Body::from_stream(pending.body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
