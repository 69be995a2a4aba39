//! Camera relay server
//!
//! Run with: cargo run --example relay_server
//!
//! Configuration via environment variables:
//!   CAMRELAY_BIND          address to listen on (default 0.0.0.0:3000)
//!   CAMERA_STREAM_URL      default camera's MJPEG endpoint (optional)
//!   CAMERA_SNAPSHOT_URL    default camera's still endpoint (optional)
//!   CAMERA_USERNAME        basic-auth user for the default camera
//!   CAMERA_PASSWORD        basic-auth password for the default camera
//!   CAMRELAY_PREWARM       set to 1 to open the upstream at startup
//!
//! ## Viewing
//!
//! Point a browser (or an <img> tag) at the stream endpoint:
//!   http://localhost:3000/api/camera/default/stream
//!
//! Stills and status:
//!   curl http://localhost:3000/api/camera/default/snapshot -o still.jpg
//!   curl http://localhost:3000/api/camera/status

use std::sync::Arc;

use camrelay::camera::CameraDescriptor;
use camrelay::service::CameraService;
use camrelay::transport::HttpCameraTransport;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "camrelay=debug,info".into()),
        )
        .init();

    let bind_addr = std::env::var("CAMRELAY_BIND").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

    let transport = Arc::new(HttpCameraTransport::new()?);
    let service = CameraService::new(transport);

    if let Ok(stream_url) = std::env::var("CAMERA_STREAM_URL") {
        let mut descriptor = CameraDescriptor::new("default", "Default Camera", stream_url);
        if let Ok(snapshot_url) = std::env::var("CAMERA_SNAPSHOT_URL") {
            descriptor = descriptor.snapshot_url(snapshot_url);
        }
        if let Ok(username) = std::env::var("CAMERA_USERNAME") {
            let password = std::env::var("CAMERA_PASSWORD").unwrap_or_default();
            descriptor = descriptor.credentials(username, password);
        }
        match service.register_camera(descriptor).await {
            Ok(outcome) => {
                tracing::info!(?outcome, "Default camera registered");
                if std::env::var("CAMRELAY_PREWARM").as_deref() == Ok("1") {
                    if let Err(e) = service.warm("default").await {
                        tracing::warn!(error = %e, "Pre-warm failed, relay keeps retrying");
                    }
                }
            }
            Err(e) => tracing::error!(error = %e, "Default camera rejected"),
        }
    } else {
        tracing::info!("No CAMERA_STREAM_URL set, register cameras via POST /api/camera");
    }

    let app = camrelay::http::router(Arc::clone(&service));
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "Camera relay listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await?;

    service.shutdown().await;
    Ok(())
}
