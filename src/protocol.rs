//! Framed wire protocol: `magic(4B,BE) | packet_id(4B,BE) | payload_length(4B,BE) | payload`.
//!
//! The three header fields are big-endian. The payload is a run of 32-bit
//! floats in the sender's native byte order. The reference sender
//! (`original_source/Software/mock_device.py`) serializes a `numpy.float32`
//! array with `.tobytes()`, which dumps the platform's native representation —
//! little-endian on the reference deployment target. This module therefore
//! decodes payload floats as little-endian; an implementation targeting a
//! big-endian sender must flip `read_payload_floats`/`write_payload_floats`
//! together, never just one of them.

pub const MAGIC: u32 = 0xAABBCCDD;
pub const HEADER_SIZE: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub magic: u32,
    pub packet_id: u32,
    pub payload_length: u32,
}

impl PacketHeader {
    pub fn new(packet_id: u32, payload_length: u32) -> Self {
        Self {
            magic: MAGIC,
            packet_id,
            payload_length,
        }
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.magic.to_be_bytes());
        buf[4..8].copy_from_slice(&self.packet_id.to_be_bytes());
        buf[8..12].copy_from_slice(&self.payload_length.to_be_bytes());
        buf
    }

    /// Decode a header from exactly `HEADER_SIZE` bytes. Does not validate `magic`
    /// — resynchronization (`reader.rs`) is responsible for locating a valid
    /// magic window before ever calling this.
    pub fn decode(data: &[u8; HEADER_SIZE]) -> Self {
        Self {
            magic: u32::from_be_bytes(data[0..4].try_into().unwrap()),
            packet_id: u32::from_be_bytes(data[4..8].try_into().unwrap()),
            payload_length: u32::from_be_bytes(data[8..12].try_into().unwrap()),
        }
    }
}

/// Reinterpret a byte slice as little-endian 32-bit floats.
///
/// `data.len()` must be a multiple of 4; panics otherwise (callers only ever
/// pass exactly `frame_size_bytes()` bytes, which is guaranteed to be a
/// multiple of 4 by construction).
pub fn read_payload_floats(data: &[u8]) -> Vec<f32> {
    assert_eq!(data.len() % 4, 0, "payload length must be a multiple of 4");
    data.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes(chunk.try_into().unwrap()))
        .collect()
}

/// Inverse of `read_payload_floats`, used by tests and fixture builders.
pub fn write_payload_floats(samples: &[f32]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(samples.len() * 4);
    for sample in samples {
        buf.extend_from_slice(&sample.to_le_bytes());
    }
    buf
}

/// Encode one complete packet (header + payload) for tests and fixture senders.
pub fn encode_packet(packet_id: u32, payload: &[u8]) -> Vec<u8> {
    let header = PacketHeader::new(packet_id, payload.len() as u32);
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(payload);
    buf
}

/// Frame a full `[f32; N]` vector into its N/P packets, for building test fixtures
/// and reference senders.
pub fn frame_samples_into_packets(samples: &[f32], packet_samples: usize) -> Vec<u8> {
    let mut stream = Vec::new();
    for (packet_id, chunk) in samples.chunks(packet_samples).enumerate() {
        let payload = write_payload_floats(chunk);
        stream.extend_from_slice(&encode_packet(packet_id as u32, &payload));
    }
    stream
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trip() {
        let header = PacketHeader::new(3, 512);
        let encoded = header.encode();
        let decoded = PacketHeader::decode(&encoded);
        assert_eq!(decoded, header);
        assert_eq!(decoded.magic, MAGIC);
    }

    #[test]
    fn payload_float_round_trip_is_little_endian() {
        let samples = [1.0f32, -2.5, 0.0, 3.14159];
        let bytes = write_payload_floats(&samples);
        // first sample 1.0f32 little-endian is 00 00 80 3F
        assert_eq!(&bytes[0..4], &[0x00, 0x00, 0x80, 0x3F]);
        let round_tripped = read_payload_floats(&bytes);
        assert_eq!(round_tripped, samples);
    }

    #[test]
    fn frame_samples_into_packets_matches_header_fields() {
        let samples: Vec<f32> = (0..512).map(|i| i as f32).collect();
        let stream = frame_samples_into_packets(&samples, 128);
        // 512 / 128 = 4 packets of (12 header + 512 payload) bytes each
        assert_eq!(stream.len(), 4 * (HEADER_SIZE + 128 * 4));
        let header = PacketHeader::decode(stream[0..HEADER_SIZE].try_into().unwrap());
        assert_eq!(header.packet_id, 0);
        assert_eq!(header.payload_length, 512);
    }
}
