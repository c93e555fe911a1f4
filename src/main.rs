use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use tiled_seg_rs::{
    logging, router, AppState, Config, OrtPredictor, SharedPredictor, TiledSegmenter,
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();
    logging::init_tracing(config.verbose)?;
    config.validate()?;

    let predictor: SharedPredictor = {
        let model_config = config.clone();
        Arc::new(
            tokio::task::spawn_blocking(move || {
                OrtPredictor::new(
                    &model_config.model_path,
                    model_config.tile_size,
                    model_config.num_classes,
                    model_config.num_threads,
                    model_config.device_id,
                )
            })
            .await?
            .with_context(|| format!("Failed to load model: {}", config.model_path.display()))?,
        )
    };

    let segmenter = TiledSegmenter::new(predictor, config.tile_size)?
        .with_normalization(config.normalization())
        .with_parallel_tiles(config.parallel_tiles);
    let app = router(AppState::from_config(segmenter, &config));

    let addr = config.bind_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(
        %addr,
        tile_size = config.tile_size,
        num_classes = config.num_classes,
        parallel_tiles = config.parallel_tiles,
        "listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}
