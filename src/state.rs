//! The shared structure of SPEC_FULL.md §4.5: ring, latest spectrum, stats,
//! dirty flag, RGB image, lifecycle flags, configuration, and the
//! connection/parameter-change observer registry.
//!
//! Two locks, each held only for appends/copies/flag toggles, never across I/O:
//! `data` guards the waterfall ring, latest spectrum, stats, and dirty flag;
//! `image` guards the rendered RGB image so the Renderer can take its time
//! without blocking the Processor. This mirrors `bass-aes67`'s split between a
//! lock-free audio path and a `parking_lot::RwLock`-guarded stream registry for
//! the side-channel state — here generalized to an explicit `Arc<State>` handed
//! to each worker at construction instead of a process-global registry.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::colormap::Colormap;
use crate::config::PipelineConfig;

/// A single row of the waterfall: a normalized spectrum, values in [0, 1].
pub type Row = Vec<f32>;

/// A snapshot of the per-batch statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Stats {
    pub frames_processed: u64,
    pub max: f32,
    pub min: f32,
    pub last_batch_size: usize,
    pub rows: usize,
    pub cols: usize,
}

/// R x C ring of normalized spectra. Front is oldest, back is newest.
///
/// Backed by a `VecDeque` rather than a `Vec` so `push` is an O(1)
/// `pop_front`/`push_back` pair instead of an O(R) `remove(0)`, matching the
/// original's `collections.deque(maxlen=...)`.
pub(crate) struct WaterfallRing {
    rows: VecDeque<Row>,
    capacity: usize,
    cols: usize,
}

impl WaterfallRing {
    fn new(size: usize) -> Self {
        Self {
            rows: (0..size).map(|_| vec![0.0; size]).collect(),
            capacity: size,
            cols: size,
        }
    }

    fn resize(&mut self, size: usize) {
        self.rows = (0..size).map(|_| vec![0.0; size]).collect();
        self.capacity = size;
        self.cols = size;
    }

    /// Append a row, displacing the oldest row once the ring is full.
    fn push(&mut self, row: Row) {
        debug_assert_eq!(row.len(), self.cols);
        if self.rows.len() >= self.capacity {
            self.rows.pop_front();
        }
        self.rows.push_back(row);
    }

    fn snapshot(&self) -> Vec<Row> {
        self.rows.iter().cloned().collect()
    }
}

/// Payload carried by a parameter-change notification.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterChange {
    pub group: String,
    pub name: String,
    pub value: f64,
    pub old_value: Option<f64>,
}

type ConnectionCallback = Box<dyn Fn(bool) + Send + Sync>;
type ParameterCallback = Box<dyn Fn(&ParameterChange) + Send + Sync>;

#[derive(Default)]
struct Observers {
    connection: Vec<ConnectionCallback>,
    parameter: Vec<ParameterCallback>,
}

/// The shared artifacts, configuration, and lifecycle flags passed by `Arc` to
/// every worker at construction.
pub struct State {
    data: Mutex<DataInner>,
    image: Mutex<Vec<u8>>,
    pub(crate) reader_running: AtomicBool,
    pub(crate) processor_running: AtomicBool,
    pub(crate) renderer_running: AtomicBool,
    pub(crate) detector_running: AtomicBool,
    config: Mutex<PipelineConfig>,
    colormap: Colormap,
    observers: Mutex<Observers>,
}

struct DataInner {
    ring: WaterfallRing,
    latest_spectrum: Option<Row>,
    stats: Stats,
    dirty: bool,
}

impl State {
    pub fn new(config: PipelineConfig) -> Arc<Self> {
        let size = config.fft_length;
        Arc::new(Self {
            data: Mutex::new(DataInner {
                ring: WaterfallRing::new(size),
                latest_spectrum: None,
                stats: Stats {
                    rows: size,
                    cols: size,
                    ..Default::default()
                },
                dirty: false,
            }),
            image: Mutex::new(vec![0u8; size * size * 3]),
            reader_running: AtomicBool::new(false),
            processor_running: AtomicBool::new(false),
            renderer_running: AtomicBool::new(false),
            detector_running: AtomicBool::new(false),
            config: Mutex::new(config),
            colormap: Colormap::jet(),
            observers: Mutex::new(Observers::default()),
        })
    }

    pub fn colormap(&self) -> &Colormap {
        &self.colormap
    }

    pub fn fft_length(&self) -> usize {
        self.config.lock().fft_length
    }

    pub fn packet_samples(&self) -> usize {
        self.config.lock().packet_samples
    }

    pub fn config_snapshot(&self) -> PipelineConfig {
        self.config.lock().clone()
    }

    pub fn any_worker_running(&self) -> bool {
        self.reader_running.load(Ordering::SeqCst)
            || self.processor_running.load(Ordering::SeqCst)
            || self.renderer_running.load(Ordering::SeqCst)
    }

    pub fn is_connected(&self) -> bool {
        self.reader_running.load(Ordering::SeqCst)
    }

    /// Lifecycle flag for the (out-of-scope) detector collaborator. The core
    /// never spawns a detector thread itself — a caller driving its own
    /// `Detector` loop against `waterfall_image()` snapshots flips this so
    /// `any_worker_running`-style lifecycle checks elsewhere in the host
    /// application can observe it alongside the three workers this crate does
    /// own.
    pub fn set_detector_running(&self, running: bool) {
        self.detector_running.store(running, Ordering::SeqCst);
    }

    pub fn is_detector_running(&self) -> bool {
        self.detector_running.load(Ordering::SeqCst)
    }

    // ==================== publication (Processor) ====================

    /// Append a batch of already-normalized rows, update the latest spectrum
    /// and stats, and raise the dirty flag. All under one lock acquisition so
    /// consumers never see a partial batch.
    pub(crate) fn publish_batch(&self, rows: Vec<Row>, batch_min: f32, batch_max: f32) {
        let mut data = self.data.lock();
        let batch_size = rows.len();
        for row in rows {
            data.latest_spectrum = Some(row.clone());
            data.ring.push(row);
        }
        data.stats.frames_processed += batch_size as u64;
        data.stats.last_batch_size = batch_size;
        data.stats.max = batch_max;
        data.stats.min = batch_min;
        data.stats.rows = data.ring.capacity;
        data.stats.cols = data.ring.cols;
        data.dirty = true;
    }

    // ==================== snapshot accessors (consumers) ====================

    pub fn latest_spectrum(&self) -> Option<Row> {
        self.data.lock().latest_spectrum.clone()
    }

    pub fn waterfall_snapshot(&self) -> Vec<Row> {
        self.data.lock().ring.snapshot()
    }

    pub fn stats(&self) -> Stats {
        self.data.lock().stats
    }

    pub fn waterfall_image(&self) -> Vec<u8> {
        self.image.lock().clone()
    }

    // ==================== renderer ====================

    /// Take the dirty ring snapshot and clear the flag, atomically, per §4.4
    /// step 1-2.
    pub(crate) fn take_dirty_ring(&self) -> Option<Vec<Row>> {
        let mut data = self.data.lock();
        if !data.dirty {
            return None;
        }
        data.dirty = false;
        Some(data.ring.snapshot())
    }

    pub(crate) fn publish_image(&self, bytes: Vec<u8>) {
        *self.image.lock() = bytes;
    }

    // ==================== configuration ====================

    /// Resize the ring and image to N x N zeros. Per §4.5, must only be called
    /// while all workers are stopped.
    pub fn set_fft_length(&self, n: usize) -> Result<(), crate::error::PipelineError> {
        if self.any_worker_running() {
            return Err(crate::error::PipelineError::WorkersRunning);
        }
        {
            let mut config = self.config.lock();
            config.fft_length = n;
            config.validate()?;
        }
        {
            let mut data = self.data.lock();
            data.ring.resize(n);
            data.latest_spectrum = None;
            data.stats = Stats {
                rows: n,
                cols: n,
                ..Default::default()
            };
            data.dirty = false;
        }
        *self.image.lock() = vec![0u8; n * n * 3];
        Ok(())
    }

    pub fn set_parameter(&self, group: &str, name: &str, value: f64) {
        let old_value = {
            let mut config = self.config.lock();
            config.parameters.set(group, name, value)
        };
        let change = ParameterChange {
            group: group.to_string(),
            name: name.to_string(),
            value,
            old_value,
        };
        for callback in &self.observers.lock().parameter {
            callback(&change);
        }
    }

    pub fn get_parameter(&self, group: &str, name: &str, default: f64) -> f64 {
        self.config.lock().parameters.get(group, name, default)
    }

    // ==================== observers ====================

    pub fn on_connection_changed(&self, callback: impl Fn(bool) + Send + Sync + 'static) {
        self.observers.lock().connection.push(Box::new(callback));
    }

    pub fn on_parameter_changed(
        &self,
        callback: impl Fn(&ParameterChange) + Send + Sync + 'static,
    ) {
        self.observers.lock().parameter.push(Box::new(callback));
    }

    /// Flip the reader lifecycle flag and notify connection observers if it
    /// actually changed, mirroring the `communication_thread` setter in
    /// `original_source/Software/state.py`.
    pub(crate) fn set_connected(&self, connected: bool) {
        let previous = self.reader_running.swap(connected, Ordering::SeqCst);
        if previous != connected {
            for callback in &self.observers.lock().connection {
                callback(connected);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;

    fn state_with_size(n: usize) -> Arc<State> {
        State::new(PipelineConfig::new("127.0.0.1", 5000).with_fft_length(n))
    }

    #[test]
    fn fresh_state_has_zeroed_ring_and_image() {
        let state = state_with_size(4);
        let snapshot = state.waterfall_snapshot();
        assert_eq!(snapshot.len(), 4);
        assert!(snapshot.iter().all(|row| row == &vec![0.0; 4]));
        assert_eq!(state.waterfall_image().len(), 4 * 4 * 3);
        assert!(state.latest_spectrum().is_none());
    }

    #[test]
    fn ring_keeps_last_r_rows_in_order() {
        let state = state_with_size(3);
        for i in 0..5u32 {
            let row = vec![i as f32; 3];
            state.publish_batch(vec![row], 0.0, 1.0);
        }
        let snapshot = state.waterfall_snapshot();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot[0], vec![2.0; 3]);
        assert_eq!(snapshot[1], vec![3.0; 3]);
        assert_eq!(snapshot[2], vec![4.0; 3]);
    }

    #[test]
    fn publish_batch_sets_latest_spectrum_to_last_row() {
        let state = state_with_size(2);
        state.publish_batch(vec![vec![0.1, 0.2], vec![0.3, 0.4]], 0.1, 0.4);
        assert_eq!(state.latest_spectrum(), Some(vec![0.3, 0.4]));
    }

    #[test]
    fn set_fft_length_rejects_while_running() {
        let state = state_with_size(4);
        state.reader_running.store(true, Ordering::SeqCst);
        assert!(state.set_fft_length(8).is_err());
    }

    #[test]
    fn set_fft_length_resizes_ring_and_image_to_zeros() {
        let state = state_with_size(4);
        state.publish_batch(vec![vec![1.0; 4]], 0.0, 1.0);
        state.set_fft_length(2).unwrap();
        let snapshot = state.waterfall_snapshot();
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.iter().all(|row| row == &vec![0.0; 2]));
        assert_eq!(state.waterfall_image(), vec![0u8; 2 * 2 * 3]);
    }

    #[test]
    fn set_parameter_notifies_observers_with_old_value() {
        let state = state_with_size(4);
        let seen = Arc::new(Mutex::new(None));
        let seen_clone = seen.clone();
        state.on_parameter_changed(move |change| {
            *seen_clone.lock() = Some(change.clone());
        });
        state.set_parameter("Detection", "conf_threshold", 0.5);
        let change = seen.lock().clone().unwrap();
        assert_eq!(change.group, "Detection");
        assert_eq!(change.value, 0.5);
        assert_eq!(change.old_value, Some(0.25));
    }

    #[test]
    fn detector_running_flag_round_trips() {
        let state = state_with_size(4);
        assert!(!state.is_detector_running());
        state.set_detector_running(true);
        assert!(state.is_detector_running());
    }

    #[test]
    fn connection_observer_fires_only_on_change() {
        let state = state_with_size(4);
        let count = Arc::new(Mutex::new(0));
        let count_clone = count.clone();
        state.on_connection_changed(move |_| {
            *count_clone.lock() += 1;
        });
        state.set_connected(true);
        state.set_connected(true); // no-op, same value
        state.set_connected(false);
        assert_eq!(*count.lock(), 2);
    }
}
