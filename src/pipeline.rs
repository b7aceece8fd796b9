//! Ambient orchestration: constructs the shared `State`, spawns the Reader,
//! Processor and Renderer workers in order on `connect`, and joins them in
//! reverse order with the §5 timeouts on `disconnect`.
//!
//! Grounded on `original_source/Software/main.py` `DroneDetectionSystem`'s
//! `connect_device`/`disconnect_device` for the construction and start/stop
//! sequencing (minus the Qt UI and detector wiring, which stay at the trait/
//! snapshot boundary in `detector.rs` and `state.rs`); the join-with-timeout
//! shutdown shape follows `bass-srt`'s stream structs, which hold a
//! `JoinHandle` per worker thread and join it with a bounded wait on `stop()`.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use log::{info, warn};

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::queue;
use crate::{processor, reader, renderer};
use crate::state::State;

const READER_JOIN_TIMEOUT: Duration = Duration::from_secs(3);
const PROCESSOR_JOIN_TIMEOUT: Duration = Duration::from_secs(2);
const RENDERER_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Join a worker handle, logging (never panicking) if it outlives its budget.
/// Workers are daemon-equivalent: a timed-out join does not block the rest of
/// shutdown, per SPEC_FULL.md §5.
fn join_with_budget(name: &str, handle: JoinHandle<()>, budget: Duration) {
    let (tx, rx) = std::sync::mpsc::channel();
    let waiter = std::thread::spawn(move || {
        let _ = tx.send(handle.join());
    });
    match rx.recv_timeout(budget) {
        Ok(Ok(())) => info!(target: "waterfall::pipeline", "{name} worker joined cleanly"),
        Ok(Err(_)) => warn!(target: "waterfall::pipeline", "{name} worker panicked"),
        Err(_) => warn!(target: "waterfall::pipeline", "{name} worker did not join within {budget:?}"),
    }
    let _ = waiter.join();
}

/// Owns the three long-lived workers and the shared `State` they publish to.
/// A `Pipeline` is connected at most once at a time; reconnecting builds a
/// fresh instance rather than restarting an existing one.
pub struct Pipeline {
    state: Arc<State>,
    reader: Option<JoinHandle<()>>,
    processor: Option<JoinHandle<()>>,
    renderer: Option<JoinHandle<()>>,
}

impl Pipeline {
    /// Construct a pipeline in the disconnected state, with a fresh `State`
    /// built from `config`.
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self {
            state: State::new(config),
            reader: None,
            processor: None,
            renderer: None,
        })
    }

    pub fn state(&self) -> Arc<State> {
        self.state.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    /// Establish the socket connection and start all three workers. One
    /// attempt only — matching `connect_device`'s single gated attempt rather
    /// than a retry loop (§9 open question decision).
    pub fn connect(&mut self) -> Result<(), PipelineError> {
        if self.is_connected() {
            return Err(PipelineError::AlreadyConnected);
        }

        let config = self.state.config_snapshot();
        let (producer, consumer) = queue::bounded();

        // The reader needs its own handle onto the channel to pop the front
        // entry when applying drop-oldest; the processor drains the same
        // channel independently through a clone of the consumer.
        let processor_consumer = consumer.clone();

        let reader_handle = reader::spawn(&config, self.state.clone(), producer, consumer)?;

        let processor_handle = processor::spawn(self.state.clone(), processor_consumer);
        let renderer_handle = renderer::spawn(self.state.clone());

        self.reader = Some(reader_handle);
        self.processor = Some(processor_handle);
        self.renderer = Some(renderer_handle);
        info!(target: "waterfall::pipeline", "pipeline connected to {}:{}", config.host, config.port);
        Ok(())
    }

    /// Stop all workers in reverse startup order (renderer, processor,
    /// reader) and join each with its §5 budget. Idempotent: calling this
    /// while already disconnected is a no-op.
    pub fn disconnect(&mut self) {
        self.state.renderer_running.store(false, Ordering::SeqCst);
        self.state.processor_running.store(false, Ordering::SeqCst);
        self.state.set_connected(false);

        if let Some(handle) = self.renderer.take() {
            join_with_budget("renderer", handle, RENDERER_JOIN_TIMEOUT);
        }
        if let Some(handle) = self.processor.take() {
            join_with_budget("processor", handle, PROCESSOR_JOIN_TIMEOUT);
        }
        if let Some(handle) = self.reader.take() {
            join_with_budget("reader", handle, READER_JOIN_TIMEOUT);
        }
        info!(target: "waterfall::pipeline", "pipeline disconnected");
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if self.reader.is_some() || self.processor.is_some() || self.renderer.is_some() {
            self.disconnect();
        }
    }
}
