//! Minimal demo binary: connects a `Pipeline` to a spectral sensing device
//! and prints its stats and connection state until interrupted. Plays the
//! role the original's `DroneDetectionSystem.run()` plays, minus the Qt
//! event loop and UI — there is no widget tree in this core, only the
//! ingestion/processing/rendering pipeline it drives.

use std::env;
use std::thread;
use std::time::Duration;

use log::{error, info};

use waterfall_core::{Pipeline, PipelineConfig};

const STATUS_INTERVAL: Duration = Duration::from_millis(500);

fn main() {
    env_logger::init();

    let host = env::args().nth(1).unwrap_or_else(|| "127.0.0.1".to_string());
    let port: u16 = env::args()
        .nth(2)
        .and_then(|s| s.parse().ok())
        .unwrap_or(5000);

    info!("waterfall-pipeline starting, target {host}:{port}");

    let config = PipelineConfig::new(host, port);
    let mut pipeline = match Pipeline::new(config) {
        Ok(pipeline) => pipeline,
        Err(err) => {
            error!("invalid configuration: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = pipeline.connect() {
        error!("failed to connect: {err}");
        std::process::exit(1);
    }

    let state = pipeline.state();
    while state.is_connected() {
        let stats = state.stats();
        info!(
            "frames_processed={} last_batch={} range=[{:.4}, {:.4}] ring={}x{}",
            stats.frames_processed, stats.last_batch_size, stats.min, stats.max, stats.rows, stats.cols
        );
        thread::sleep(STATUS_INTERVAL);
    }

    info!("connection ended");
    pipeline.disconnect();
}
