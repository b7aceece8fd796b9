//! Wire Reader: owns the socket, resynchronizes on the magic-prefixed framing,
//! reassembles packets into frames, and enqueues them with drop-oldest
//! overflow handling.
//!
//! The framing state machine (`FrameAssembler`) is kept free of any socket or
//! thread concerns so the boundary scenarios in SPEC_FULL.md §8 can be tested
//! by feeding it byte slices directly, the same way `bass-srt/src/protocol/mod.rs`
//! tests its header codec in isolation from the stream it rides over.

use std::io::Read;
use std::net::TcpStream;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, info, warn};
use socket2::Socket;

use crate::config::PipelineConfig;
use crate::frame::Frame;
use crate::protocol::{HEADER_SIZE, MAGIC};
use crate::queue::FrameQueueProducer;
use crate::state::State;

/// Minimum receive-buffer size requested on the socket, per §4.1.
const MIN_RECV_BUFFER: usize = 1024 * 1024;
/// Read timeout used so the loop can periodically check the running flag.
const READ_TIMEOUT: Duration = Duration::from_millis(200);

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct ReaderStats {
    pub packets_received: u64,
    pub frames_emitted: u64,
    pub resyncs: u64,
    pub bytes_skipped_resyncing: u64,
    pub gaps: u64,
    pub frames_discarded_at_reset: u64,
    pub queue_drops: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Desynced or between packets: scanning one byte at a time for the magic.
    Scanning,
    /// Magic found; collecting the remaining 8 header bytes.
    HeaderTail,
    /// Header parsed; collecting the packet's payload bytes.
    Payload,
}

/// The pure framing/reassembly state machine of SPEC_FULL.md §4.1.
///
/// Magic detection always runs as a byte-at-a-time sliding window, whether or
/// not the stream is currently synced: in the common case the very next 4
/// bytes after a packet's payload match immediately, so this degenerates to a
/// direct comparison with no extra cost. A resync is simply the case where
/// more than 4 bytes had to be consumed to find the next match.
pub struct FrameAssembler {
    fft_length: usize,
    frame_size_bytes: usize,
    phase: Phase,
    window: u32,
    window_filled: u8,
    consumed_this_scan: u64,
    synced: bool,
    header_tail: Vec<u8>,
    current_packet_id: u32,
    payload_len: u32,
    payload: Vec<u8>,
    frame_buffer: Vec<u8>,
    expected_packet_id: u32,
    awaiting_reset: bool,
    pub stats: ReaderStats,
}

impl FrameAssembler {
    pub fn new(fft_length: usize) -> Self {
        Self {
            fft_length,
            frame_size_bytes: fft_length * 4,
            phase: Phase::Scanning,
            window: 0,
            window_filled: 0,
            consumed_this_scan: 0,
            synced: false,
            header_tail: Vec::with_capacity(HEADER_SIZE - 4),
            current_packet_id: 0,
            payload_len: 0,
            payload: Vec::new(),
            frame_buffer: Vec::new(),
            expected_packet_id: 0,
            awaiting_reset: true,
            stats: ReaderStats::default(),
        }
    }

    pub fn is_synced(&self) -> bool {
        self.synced
    }

    /// Feed a chunk of freshly-read bytes, returning every frame completed as
    /// a result of processing this chunk, in order.
    pub fn feed(&mut self, data: &[u8]) -> Vec<Frame> {
        let mut frames = Vec::new();
        for &byte in data {
            if let Some(frame) = self.feed_byte(byte) {
                frames.push(frame);
            }
        }
        frames
    }

    fn feed_byte(&mut self, byte: u8) -> Option<Frame> {
        match self.phase {
            Phase::Scanning => {
                self.window = (self.window << 8) | byte as u32;
                self.window_filled = (self.window_filled + 1).min(4);
                self.consumed_this_scan += 1;
                if self.window_filled == 4 && self.window == MAGIC {
                    if self.consumed_this_scan > 4 {
                        let skipped = self.consumed_this_scan - 4;
                        self.stats.resyncs += 1;
                        self.stats.bytes_skipped_resyncing += skipped;
                        warn!(
                            target: "waterfall::reader",
                            "resynchronized after skipping {skipped} byte(s)"
                        );
                        self.frame_buffer.clear();
                        self.awaiting_reset = true;
                        self.synced = false;
                    } else {
                        self.synced = true;
                    }
                    self.phase = Phase::HeaderTail;
                    self.header_tail.clear();
                    self.consumed_this_scan = 0;
                }
                None
            }
            Phase::HeaderTail => {
                self.header_tail.push(byte);
                if self.header_tail.len() == HEADER_SIZE - 4 {
                    self.current_packet_id =
                        u32::from_be_bytes(self.header_tail[0..4].try_into().unwrap());
                    self.payload_len =
                        u32::from_be_bytes(self.header_tail[4..8].try_into().unwrap());
                    self.payload.clear();
                    self.payload.reserve(self.payload_len as usize);
                    if self.payload_len == 0 {
                        self.reset_for_next_magic();
                        return self.complete_packet();
                    }
                    self.phase = Phase::Payload;
                }
                None
            }
            Phase::Payload => {
                self.payload.push(byte);
                if self.payload.len() as u32 == self.payload_len {
                    self.reset_for_next_magic();
                    return self.complete_packet();
                }
                None
            }
        }
    }

    fn reset_for_next_magic(&mut self) {
        self.phase = Phase::Scanning;
        self.window_filled = 0;
        self.window = 0;
        self.consumed_this_scan = 0;
    }

    fn complete_packet(&mut self) -> Option<Frame> {
        self.stats.packets_received += 1;
        let packet_id = self.current_packet_id;
        let payload = std::mem::take(&mut self.payload);

        if packet_id == 0 {
            if !self.frame_buffer.is_empty() {
                debug!(
                    target: "waterfall::reader",
                    "packet_id 0 with {} buffered byte(s); discarding partial frame",
                    self.frame_buffer.len()
                );
                self.stats.frames_discarded_at_reset += 1;
            }
            self.frame_buffer.clear();
            self.frame_buffer.extend_from_slice(&payload);
            self.expected_packet_id = 1;
            self.awaiting_reset = false;
        } else if self.awaiting_reset {
            debug!(target: "waterfall::reader", "ignoring packet_id {packet_id} before next frame start");
        } else if packet_id == self.expected_packet_id {
            self.frame_buffer.extend_from_slice(&payload);
            self.expected_packet_id += 1;
        } else {
            self.stats.gaps += 1;
            warn!(
                target: "waterfall::reader",
                "packet loss: expected packet_id {}, got {}",
                self.expected_packet_id, packet_id
            );
            self.frame_buffer.clear();
            self.awaiting_reset = true;
        }

        if self.frame_buffer.len() == self.frame_size_bytes {
            let samples = crate::protocol::read_payload_floats(&self.frame_buffer);
            self.frame_buffer.clear();
            self.stats.frames_emitted += 1;
            debug_assert_eq!(samples.len(), self.fft_length);
            return Some(Frame::new(samples));
        }
        None
    }
}

/// Run the blocking reader loop against an already-connected stream until
/// `state.reader_running` is cleared or the peer closes the connection.
fn run_loop(
    mut stream: TcpStream,
    state: Arc<State>,
    producer: FrameQueueProducer,
    consumer_peer: crate::queue::FrameQueueConsumer,
    fft_length: usize,
) {
    let mut assembler = FrameAssembler::new(fft_length);
    let mut buf = [0u8; 4096];

    while state.reader_running.load(Ordering::SeqCst) {
        match stream.read(&mut buf) {
            Ok(0) => {
                info!(target: "waterfall::reader", "peer closed connection");
                break;
            }
            Ok(n) => {
                for frame in assembler.feed(&buf[..n]) {
                    if producer.try_push_drop_oldest(&consumer_peer, frame) {
                        assembler.stats.queue_drops += 1;
                    }
                }
            }
            Err(ref e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                continue;
            }
            Err(e) => {
                warn!(target: "waterfall::reader", "read error: {e}");
                break;
            }
        }
    }

    info!(
        target: "waterfall::reader",
        "reader stopped: {} packet(s), {} frame(s), {} resync(s), {} gap(s), {} queue drop(s)",
        assembler.stats.packets_received,
        assembler.stats.frames_emitted,
        assembler.stats.resyncs,
        assembler.stats.gaps,
        assembler.stats.queue_drops,
    );
    state.set_connected(false);
}

/// Establish the connection and spawn the reader thread. Returns the join
/// handle; the caller is responsible for clearing `state.reader_running` and
/// joining with the §5 timeout to request a stop.
///
/// The consumer half of the Frame Queue is only ever used here to pop the
/// oldest entry when applying the drop-oldest overflow policy; the Processor
/// drains the queue through its own handle concurrently, which is safe since
/// `crossbeam::channel` permits multiple consumers sharing one receiver.
pub fn spawn(
    config: &PipelineConfig,
    state: Arc<State>,
    producer: FrameQueueProducer,
    consumer_peer: crate::queue::FrameQueueConsumer,
) -> Result<JoinHandle<()>, crate::error::PipelineError> {
    let socket = Socket::new(socket2::Domain::IPV4, socket2::Type::STREAM, None)?;
    socket.set_recv_buffer_size(MIN_RECV_BUFFER)?;
    let addr: std::net::SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|_| {
            crate::error::PipelineError::Transport(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "invalid host/port",
            ))
        })?;
    socket.connect(&addr.into())?;
    socket.set_read_timeout(Some(READ_TIMEOUT))?;
    let stream: TcpStream = socket.into();

    let fft_length = config.fft_length;
    state.set_connected(true);

    let handle =
        thread::spawn(move || run_loop(stream, state, producer, consumer_peer, fft_length));
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{encode_packet, write_payload_floats};

    fn packets_for(samples: &[f32], packet_samples: usize) -> Vec<u8> {
        crate::protocol::frame_samples_into_packets(samples, packet_samples)
    }

    #[test]
    fn clean_stream_reassembles_one_frame_per_group_of_packets() {
        let samples: Vec<f32> = (0..8).map(|i| i as f32).collect();
        let stream = packets_for(&samples, 4);
        let mut assembler = FrameAssembler::new(8);
        let frames = assembler.feed(&stream);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].samples, samples);
        assert!(assembler.is_synced());
        assert_eq!(assembler.stats.resyncs, 0);
    }

    #[test]
    fn resync_skips_exactly_the_junk_bytes_before_the_first_magic() {
        let samples: Vec<f32> = (0..4).map(|i| i as f32).collect();
        let mut stream = vec![0u8; 37];
        stream.extend(packets_for(&samples, 4));
        let mut assembler = FrameAssembler::new(4);
        let frames = assembler.feed(&stream);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].samples, samples);
        assert_eq!(assembler.stats.resyncs, 1);
        assert_eq!(assembler.stats.bytes_skipped_resyncing, 37);
    }

    #[test]
    fn packet_loss_gap_drops_the_short_frame_and_counts_one_gap() {
        // N/P = 4 packets per frame; send packet_ids 0, 1, 2, 4 (3 missing).
        let mut stream = Vec::new();
        for (id, value) in [(0u32, 1.0f32), (1, 2.0), (2, 3.0), (4, 5.0)] {
            let payload = write_payload_floats(&[value]);
            stream.extend_from_slice(&encode_packet(id, &payload));
        }
        let mut assembler = FrameAssembler::new(4);
        let frames = assembler.feed(&stream);
        assert!(frames.is_empty(), "the gapped frame must never reach the queue");
        assert_eq!(assembler.stats.gaps, 1);
    }

    #[test]
    fn frame_boundary_resets_cleanly_into_the_next_frame() {
        let frame_a: Vec<f32> = (0..4).map(|i| i as f32).collect();
        let frame_b: Vec<f32> = (0..4).map(|i| (i + 10) as f32).collect();
        let mut stream = packets_for(&frame_a, 4);
        stream.extend(packets_for(&frame_b, 4));
        let mut assembler = FrameAssembler::new(4);
        let frames = assembler.feed(&stream);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].samples, frame_a);
        assert_eq!(frames[1].samples, frame_b);
        assert_eq!(assembler.stats.frames_discarded_at_reset, 0);
    }

    #[test]
    fn framing_violation_mid_stream_discards_partial_frame_and_resyncs() {
        let frame_a: Vec<f32> = (0..4).map(|i| i as f32).collect();
        let mut stream = packets_for(&frame_a[..2], 2); // only half a frame, then corruption
        stream.extend_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF, 0x01, 0x02]);
        let frame_b: Vec<f32> = (0..4).map(|i| (i + 20) as f32).collect();
        stream.extend(packets_for(&frame_b, 4));

        let mut assembler = FrameAssembler::new(4);
        let frames = assembler.feed(&stream);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].samples, frame_b);
        assert!(assembler.stats.resyncs >= 1);
    }

    #[test]
    fn spawn_fires_the_connection_observer_with_true() {
        use std::sync::Mutex;

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let acceptor = thread::spawn(move || {
            let _ = listener.accept();
            thread::sleep(Duration::from_millis(100));
        });

        let config = PipelineConfig::new(addr.ip().to_string(), addr.port()).with_fft_length(4);
        let state = State::new(config.clone());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        state.on_connection_changed(move |connected| {
            seen_clone.lock().unwrap().push(connected);
        });

        let (producer, consumer) = crate::queue::bounded();
        let handle = spawn(&config, state.clone(), producer, consumer).unwrap();

        assert_eq!(seen.lock().unwrap().as_slice(), &[true]);

        state.reader_running.store(false, Ordering::SeqCst);
        let _ = handle.join();
        acceptor.join().unwrap();
    }
}
