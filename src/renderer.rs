//! Renderer: polls the dirty flag, and on each rising edge turns the
//! Waterfall Ring into an RGB image under the jet colormap.
//!
//! Pull-with-flag rather than a bounded channel, per SPEC_FULL.md §9: multiple
//! rows appended between polls coalesce into a single re-render. The
//! flip-then-transpose order is load-bearing (§4.4 step 3-4) — it is what
//! lines the detector's bounding-box coordinates up with the display, and
//! matches `original_source/Software/data_process.py` `_image_conversion_loop`
//! (`np.flipud` then `.T`) exactly.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::debug;

use image::RgbImage;

use crate::state::{Row, State};

/// Poll interval while the ring is clean, per §4.4.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Flip the rows vertically (newest first) and transpose, turning an R x C
/// matrix of rows-oldest-first into a C x R matrix with time horizontal.
fn flip_and_transpose(rows: &[Row]) -> Vec<Row> {
    let r = rows.len();
    if r == 0 {
        return Vec::new();
    }
    let c = rows[0].len();
    let mut out = vec![vec![0.0f32; r]; c];
    for (new_time_idx, row) in rows.iter().rev().enumerate() {
        for (col, &value) in row.iter().enumerate() {
            out[col][new_time_idx] = value;
        }
    }
    out
}

/// Map a flipped/transposed float matrix to contiguous R' x C' x 3 RGB bytes
/// via the colormap, per §4.4 step 5-6.
fn colorize(matrix: &[Row], colormap: &crate::colormap::Colormap) -> Vec<u8> {
    let rows = matrix.len();
    let cols = if rows == 0 { 0 } else { matrix[0].len() };
    let mut bytes = Vec::with_capacity(rows * cols * 3);
    for row in matrix {
        for &value in row {
            let [r, g, b] = colormap.lookup(value);
            bytes.push(r);
            bytes.push(g);
            bytes.push(b);
        }
    }
    bytes
}

fn run_loop(state: Arc<State>) {
    while state.renderer_running.load(Ordering::SeqCst) {
        let ring = match state.take_dirty_ring() {
            Some(ring) => ring,
            None => {
                thread::sleep(POLL_INTERVAL);
                continue;
            }
        };

        let flipped = flip_and_transpose(&ring);
        let bytes = colorize(&flipped, state.colormap());
        debug!(target: "waterfall::renderer", "rendered {}x{} image", flipped.len(), ring.first().map_or(0, Vec::len));
        state.publish_image(bytes);
    }
}

/// Spawn the renderer thread. The caller owns lifecycle: set
/// `state.renderer_running` before spawning and join with the §5 timeout (2s)
/// after clearing it.
pub fn spawn(state: Arc<State>) -> JoinHandle<()> {
    state.renderer_running.store(true, Ordering::SeqCst);
    thread::spawn(move || run_loop(state))
}

/// Wrap a `State::waterfall_image` snapshot as a typed `image::RgbImage`, for
/// callers that want to save it to disk (e.g. `save_png`) rather than consume
/// the raw `rows x cols x 3` byte buffer directly.
///
/// Returns `None` if `bytes.len()` doesn't match `rows * cols * 3`, which can
/// happen if the caller raced a `set_fft_length` resize between reading the
/// dimensions and the image.
pub fn to_rgb_image(bytes: Vec<u8>, rows: usize, cols: usize) -> Option<RgbImage> {
    RgbImage::from_raw(cols as u32, rows as u32, bytes)
}

/// Save a waterfall image snapshot to `path` as a PNG, for debugging and the
/// demo binary. Returns an error if the dimensions don't match the buffer or
/// the encoder fails.
pub fn save_png(
    bytes: Vec<u8>,
    rows: usize,
    cols: usize,
    path: &std::path::Path,
) -> Result<(), crate::error::PipelineError> {
    let image = to_rgb_image(bytes, rows, cols).ok_or_else(|| {
        crate::error::PipelineError::ImageEncode(format!(
            "buffer does not match {rows}x{cols}x3"
        ))
    })?;
    image
        .save(path)
        .map_err(|err| crate::error::PipelineError::ImageEncode(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::colormap::Colormap;

    #[test]
    fn flip_and_transpose_swaps_axes_and_reverses_time() {
        // two rows (oldest first): [0,1] then [2,3]
        let rows = vec![vec![0.0, 1.0], vec![2.0, 3.0]];
        let out = flip_and_transpose(&rows);
        // output is C x R: column 0 becomes row [newest, oldest] = [2.0, 0.0]
        assert_eq!(out, vec![vec![2.0, 0.0], vec![3.0, 1.0]]);
    }

    #[test]
    fn empty_ring_produces_empty_matrix() {
        let out = flip_and_transpose(&[]);
        assert!(out.is_empty());
    }

    #[test]
    fn colorize_maps_extremes_to_colormap_endpoints() {
        let cmap = Colormap::jet();
        let matrix = vec![vec![0.0, 1.0]];
        let bytes = colorize(&matrix, &cmap);
        assert_eq!(&bytes[0..3], &cmap.entry(0)[..]);
        assert_eq!(&bytes[3..6], &cmap.entry(255)[..]);
    }

    #[test]
    fn colorize_output_length_matches_dimensions() {
        let cmap = Colormap::jet();
        let matrix = vec![vec![0.5; 4]; 3];
        let bytes = colorize(&matrix, &cmap);
        assert_eq!(bytes.len(), 3 * 4 * 3);
    }

    #[test]
    fn to_rgb_image_wraps_matching_buffer() {
        let bytes = vec![0u8; 2 * 3 * 3];
        let image = to_rgb_image(bytes, 2, 3).unwrap();
        assert_eq!(image.width(), 3);
        assert_eq!(image.height(), 2);
    }

    #[test]
    fn to_rgb_image_rejects_mismatched_buffer() {
        let bytes = vec![0u8; 5];
        assert!(to_rgb_image(bytes, 2, 3).is_none());
    }
}
