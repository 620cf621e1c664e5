//! Frame encoding and the resumable, resynchronizing frame decoder.
//!
//! Layout: `PREAMBLE(3) | TYPE(1) | SIZE(2, LE) | PAYLOAD(SIZE) | CRC(2, LE)`,
//! with the CRC covering everything from the preamble through the payload.

use crate::crc::crc16;
use crate::error::WireError;

pub const PREAMBLE: [u8; 3] = [0x01, 0x02, 0x03];
/// Preamble, type and size.
pub const HEADER_SIZE: usize = PREAMBLE.len() + 1 + 2;
pub const CRC_SIZE: usize = 2;
pub const FRAME_OVERHEAD: usize = HEADER_SIZE + CRC_SIZE;
pub const MAX_PACKET_SIZE: usize = 512;
pub const MAX_PAYLOAD_SIZE: usize = MAX_PACKET_SIZE - FRAME_OVERHEAD;

/// Builds a complete frame around `payload`.
pub fn encode_frame(kind: u8, payload: &[u8]) -> Result<Vec<u8>, WireError> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(WireError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD_SIZE,
        });
    }

    let mut frame = Vec::with_capacity(FRAME_OVERHEAD + payload.len());
    frame.extend_from_slice(&PREAMBLE);
    frame.push(kind);
    frame.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    frame.extend_from_slice(payload);

    let crc = crc16(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());
    Ok(frame)
}

/// A frame that passed its integrity check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: u8,
    pub size: u16,
    pub data: Vec<u8>,
    pub crc: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeState {
    SeekPreamble,
    ReadType,
    ReadSize,
    ReadData,
    ReadCrc,
}

/// Byte-stream decoder that survives frames split across reads.
///
/// State only advances in order. Noise before a preamble is skipped one byte
/// at a time, and a frame whose checksum does not match is dropped silently.
#[derive(Debug)]
pub struct FrameDecoder {
    state: DecodeState,
    window: [u8; PREAMBLE.len()],
    window_len: usize,
    /// Preamble through payload of the frame being assembled.
    buffer: Vec<u8>,
    kind: u8,
    size: u16,
    field: [u8; 2],
    field_len: usize,
    accepted: u64,
    rejected: u64,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        let mut buffer = Vec::with_capacity(MAX_PACKET_SIZE);
        buffer.extend_from_slice(&PREAMBLE);

        Self {
            state: DecodeState::SeekPreamble,
            window: [0; PREAMBLE.len()],
            window_len: 0,
            buffer,
            kind: 0,
            size: 0,
            field: [0; 2],
            field_len: 0,
            accepted: 0,
            rejected: 0,
        }
    }

    pub fn state(&self) -> DecodeState {
        self.state
    }

    /// True when no part of a frame is buffered, so the decoder can be
    /// dropped without losing input.
    pub fn is_idle(&self) -> bool {
        if self.state != DecodeState::SeekPreamble {
            return false;
        }
        let seen = &self.window[PREAMBLE.len() - self.window_len..];
        (1..PREAMBLE.len()).all(|k| k > seen.len() || seen[seen.len() - k..] != PREAMBLE[..k])
    }

    /// Frames that passed the CRC check so far.
    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    /// Frames dropped for a bad CRC or an impossible size.
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    /// Feeds the next chunk of the stream and returns every frame it completed.
    pub fn push(&mut self, input: &[u8]) -> Vec<Frame> {
        let mut frames = Vec::new();
        let mut pos = 0;

        while pos < input.len() {
            match self.state {
                DecodeState::SeekPreamble => {
                    self.window.rotate_left(1);
                    self.window[PREAMBLE.len() - 1] = input[pos];
                    self.window_len = (self.window_len + 1).min(PREAMBLE.len());
                    pos += 1;

                    if self.window_len == PREAMBLE.len() && self.window == PREAMBLE {
                        self.state = DecodeState::ReadType;
                    }
                }
                DecodeState::ReadType => {
                    self.kind = input[pos];
                    self.buffer.push(self.kind);
                    pos += 1;
                    self.state = DecodeState::ReadSize;
                }
                DecodeState::ReadSize => {
                    pos += self.fill_field(&input[pos..]);
                    if self.field_len == self.field.len() {
                        self.size = u16::from_le_bytes(self.field);
                        self.buffer.extend_from_slice(&self.field);
                        self.field_len = 0;

                        if self.size as usize > MAX_PAYLOAD_SIZE {
                            self.rejected += 1;
                            self.reset();
                        } else {
                            self.state = DecodeState::ReadData;
                        }
                    }
                }
                DecodeState::ReadData => {
                    let have = self.buffer.len() - HEADER_SIZE;
                    let wanted = self.size as usize - have;
                    let take = wanted.min(input.len() - pos);
                    self.buffer.extend_from_slice(&input[pos..pos + take]);
                    pos += take;

                    if take == wanted {
                        self.state = DecodeState::ReadCrc;
                    }
                }
                DecodeState::ReadCrc => {
                    pos += self.fill_field(&input[pos..]);
                    if self.field_len == self.field.len() {
                        let crc = u16::from_le_bytes(self.field);
                        if crc == crc16(&self.buffer) {
                            self.accepted += 1;
                            frames.push(Frame {
                                kind: self.kind,
                                size: self.size,
                                data: self.buffer[HEADER_SIZE..].to_vec(),
                                crc,
                            });
                        } else {
                            self.rejected += 1;
                        }
                        self.reset();
                    }
                }
            }
        }

        // A zero-length payload completes without consuming input.
        if self.state == DecodeState::ReadData
            && self.buffer.len() - HEADER_SIZE == self.size as usize
        {
            self.state = DecodeState::ReadCrc;
        }

        frames
    }

    fn fill_field(&mut self, input: &[u8]) -> usize {
        let take = (self.field.len() - self.field_len).min(input.len());
        self.field[self.field_len..self.field_len + take].copy_from_slice(&input[..take]);
        self.field_len += take;
        take
    }

    fn reset(&mut self) {
        self.state = DecodeState::SeekPreamble;
        self.window_len = 0;
        self.buffer.truncate(PREAMBLE.len());
        self.field_len = 0;
        self.kind = 0;
        self.size = 0;
    }
}
