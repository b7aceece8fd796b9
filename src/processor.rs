//! Processor: drains the Frame Queue in batches, normalizes each batch
//! jointly, and publishes rows/spectrum/stats to the shared `State`.
//!
//! Batching shape per SPEC_FULL.md §4.3: block for one frame with a 1 s
//! timeout, then greedily drain whatever else is already queued without
//! blocking. This mirrors `original_source/Software/data_process.py`
//! `_process_loop` exactly (`queue.get(timeout=1)` then a `get_nowait()` loop),
//! ported onto `FrameQueueConsumer::pop_timeout`/`try_pop`.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::debug;

use crate::frame::Frame;
use crate::queue::FrameQueueConsumer;
use crate::state::State;

/// Block-pop timeout before re-checking the running flag.
const POP_TIMEOUT: Duration = Duration::from_secs(1);

/// Degenerate-range threshold: batches whose (max - min) doesn't clear this
/// emit all zeros instead of dividing by a near-zero span.
const MIN_RANGE: f32 = 1e-10;

/// Length-adjust every frame in the batch to `fft_length`, then jointly
/// min-max normalize the resulting B x N matrix. Returns the normalized rows
/// in input order along with the normalized batch's own min/max (i.e.
/// `np.max`/`np.min` of the *normalized* matrix, per
/// `original_source/Software/data_process.py` `_process_loop`) — ~[0, 1] in
/// the ordinary case, [0, 0] in the degenerate all-zero case.
fn normalize_batch(frames: Vec<Frame>, fft_length: usize) -> (Vec<Vec<f32>>, f32, f32) {
    let rows: Vec<Vec<f32>> = frames
        .into_iter()
        .map(|frame| {
            if frame.len() != fft_length {
                debug!(
                    target: "waterfall::processor",
                    "frame length mismatch: expected {fft_length}, got {}",
                    frame.len()
                );
            }
            frame.fit_to_length(fft_length).samples
        })
        .collect();

    let mut global_min = f32::INFINITY;
    let mut global_max = f32::NEG_INFINITY;
    for row in &rows {
        for &value in row {
            if value < global_min {
                global_min = value;
            }
            if value > global_max {
                global_max = value;
            }
        }
    }

    let normalized: Vec<Vec<f32>> = if global_max - global_min > MIN_RANGE {
        rows.into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|v| (v - global_min) / (global_max - global_min))
                    .collect()
            })
            .collect()
    } else {
        rows.into_iter()
            .map(|row| vec![0.0; row.len()])
            .collect()
    };

    let mut normalized_min = f32::INFINITY;
    let mut normalized_max = f32::NEG_INFINITY;
    for row in &normalized {
        for &value in row {
            if value < normalized_min {
                normalized_min = value;
            }
            if value > normalized_max {
                normalized_max = value;
            }
        }
    }

    (normalized, normalized_min, normalized_max)
}

fn run_loop(state: Arc<State>, consumer: FrameQueueConsumer) {
    let fft_length = state.fft_length();

    while state.processor_running.load(Ordering::SeqCst) {
        let first = match consumer.pop_timeout(POP_TIMEOUT) {
            Some(frame) => frame,
            None => continue,
        };

        let mut batch = vec![first];
        while let Some(frame) = consumer.try_pop() {
            batch.push(frame);
        }

        let batch_size = batch.len();
        let (rows, min, max) = normalize_batch(batch, fft_length);
        debug!(
            target: "waterfall::processor",
            "published batch of {batch_size} frame(s), normalized range [{min:.6e}, {max:.6e}]"
        );
        state.publish_batch(rows, min, max);
    }
}

/// Spawn the processor thread. The caller owns lifecycle: set
/// `state.processor_running` before spawning and join with the §5 timeout (2s)
/// after clearing it.
pub fn spawn(state: Arc<State>, consumer: FrameQueueConsumer) -> JoinHandle<()> {
    state.processor_running.store(true, Ordering::SeqCst);
    thread::spawn(move || run_loop(state, consumer))
}
