mod pages;
mod routes;
mod stream;

use camfeed_common::action::ActionCell;
use camfeed_common::config::Config;
use camfeed_common::shutdown::{Shutdown, ShutdownGuard};
use camfeed_producer::{CameraSource, FrameProducer, SharedFrameBuffer};
use routes::AppState;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {e}", config_path.display());
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    info!(
        host = config.server.host,
        port = config.server.port,
        source = ?config.camera.source,
        frame_count = config.motion.frame_count,
        working_width = config.pipeline.working_width,
        "starting camfeed"
    );

    let source = match CameraSource::open(&config.camera).await {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, url = config.camera.url, "failed to open camera source");
            std::process::exit(1);
        }
    };

    let shutdown = Arc::new(Shutdown::new());
    let action = Arc::new(ActionCell::default());
    let buffer = SharedFrameBuffer::new();

    let producer = FrameProducer::new(
        source,
        &config.pipeline,
        &config.motion,
        Arc::clone(&action),
        buffer.clone(),
    );
    let producer_task = {
        let shutdown = Arc::clone(&shutdown);
        let listener = shutdown.listener();
        // Nothing else can publish frames, so the service goes down with the
        // producer, whether it returns or panics.
        let guard = ShutdownGuard::new(shutdown);
        tokio::spawn(async move {
            let _guard = guard;
            producer.run(listener).await
        })
    };

    {
        let shutdown = Arc::clone(&shutdown);
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("ctrl-c received, shutting down");
                    shutdown.trigger();
                }
                Err(e) => warn!(error = %e, "failed to listen for ctrl-c"),
            }
        });
    }

    let state = Arc::new(AppState {
        action,
        buffer,
        shutdown: shutdown.listener(),
        jpeg_quality: config.stream.jpeg_quality,
    });
    let app = routes::router(state).layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap_or_else(|e| {
        eprintln!("Failed to bind to {addr}: {e}");
        std::process::exit(1);
    });
    info!(addr, "camfeed server listening");

    let mut server_shutdown = shutdown.listener();
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(async move { server_shutdown.wait().await })
        .await
    {
        error!(error = %e, "server error");
    }
    shutdown.trigger();

    match producer_task.await {
        Ok(Ok(())) => info!("camfeed stopped"),
        // Already reported by the producer.
        Ok(Err(_)) => std::process::exit(1),
        Err(e) => {
            error!(error = %e, "frame producer task failed");
            std::process::exit(1);
        }
    }
}
