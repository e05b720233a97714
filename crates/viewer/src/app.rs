use crate::config::ViewerConfig;
use pool::{Pool, WsConnector};
use renderer::{FeedRenderer, ImageSurface};

/// Owns the single pool and one tile per configured camera until ctrl-c.
pub async fn run(config: ViewerConfig) -> anyhow::Result<()> {
    if config.cameras.is_empty() {
        anyhow::bail!("No cameras configured; set VIEWER_CAMERAS to a comma-separated list of ids");
    }

    let pool = Pool::new(config.pool_config(), WsConnector);

    let mut tiles: Vec<FeedRenderer<ImageSurface>> = config
        .cameras
        .iter()
        .map(|camera_id| FeedRenderer::new(config.feed_config(camera_id), ImageSurface::new()))
        .collect();

    for tile in &mut tiles {
        tile.mount(&pool);
    }

    tracing::info!(
        backend = %config.backend_url,
        cameras = tiles.len(),
        endpoints = pool.endpoint_count(),
        "Viewer started"
    );

    let mut interval = tokio::time::interval(config.telemetry_interval());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown requested");
                break;
            }
            _ = interval.tick() => report(&tiles),
        }
    }

    for tile in &mut tiles {
        tile.unmount();
    }

    tracing::info!(endpoints = pool.endpoint_count(), "Viewer stopped");

    Ok(())
}

fn report(tiles: &[FeedRenderer<ImageSurface>]) {
    for tile in tiles {
        let telemetry = tile.telemetry();
        let stale = telemetry.is_stale(tile.config().stale_after());

        tracing::info!(
            camera_id = %telemetry.camera_id,
            status = %telemetry.status_text(),
            detections = telemetry.detection_count,
            tracks = telemetry.track_count,
            received = telemetry.frames_received,
            painted = telemetry.frames_painted,
            dropped = telemetry.frames_dropped,
            stale,
            "Feed telemetry"
        );
    }
}
