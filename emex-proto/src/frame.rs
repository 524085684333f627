// EmEx: Orchestrator for Emulated Multi-Operator Environments
// Copyright (C) 2023-2024 Tibor Schneider <sctibor@ethz.ch>
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! Length-prefixed framing with partial-read tolerant accumulation.
//!
//! The reader is a small state machine (`NeedLen`, `NeedBody(n)`) driven
//! by byte-slice appends. Short reads never block the caller: feed
//! whatever bytes arrived and collect zero or more complete payloads.

use thiserror::Error;

/// Frames larger than this are a protocol error.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Errors raised by the framing layer.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The peer announced a frame exceeding [`MAX_FRAME_LEN`].
    #[error("frame length {0} exceeds the {MAX_FRAME_LEN} byte limit")]
    Oversized(usize),
    /// A payload failed to decode.
    #[error("cannot decode message: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Wrap a payload in the universal envelope.
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// Encode a message into a complete frame.
pub fn encode_message<T: serde::Serialize>(message: &T) -> Result<Vec<u8>, FrameError> {
    Ok(encode_frame(&serde_json::to_vec(message)?))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadState {
    NeedLen,
    NeedBody(usize),
}

/// Accumulates bytes until at least 4 length bytes and then the announced
/// payload bytes are present, yielding each complete payload in order.
#[derive(Debug)]
pub struct FrameReader {
    buffer: Vec<u8>,
    state: ReadState,
}

impl Default for FrameReader {
    fn default() -> Self {
        Self {
            buffer: Vec::new(),
            state: ReadState::NeedLen,
        }
    }
}

impl FrameReader {
    /// Create an empty reader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append received bytes and collect every payload that completed.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Vec<u8>>, FrameError> {
        self.buffer.extend_from_slice(data);

        let mut payloads = Vec::new();

        loop {
            match self.state {
                ReadState::NeedLen => {
                    if self.buffer.len() < 4 {
                        break;
                    }
                    let len =
                        u32::from_be_bytes([self.buffer[0], self.buffer[1], self.buffer[2], self.buffer[3]])
                            as usize;
                    if len > MAX_FRAME_LEN {
                        return Err(FrameError::Oversized(len));
                    }
                    self.buffer.drain(..4);
                    self.state = ReadState::NeedBody(len);
                }
                ReadState::NeedBody(len) => {
                    if self.buffer.len() < len {
                        break;
                    }
                    payloads.push(self.buffer.drain(..len).collect());
                    self.state = ReadState::NeedLen;
                }
            }
        }

        Ok(payloads)
    }

    /// The number of buffered bytes not yet forming a complete frame.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn frame_round_trip() {
        let payload = b"hello emoe".to_vec();
        let frame = encode_frame(&payload);

        let mut reader = FrameReader::new();
        assert_eq!(reader.push(&frame).unwrap(), vec![payload]);
        assert_eq!(reader.pending(), 0);
    }

    #[test]
    fn partial_reads_are_tolerated() {
        let payload: Vec<u8> = (0..=255).collect();
        let frame = encode_frame(&payload);

        // feed the frame one byte at a time
        let mut reader = FrameReader::new();
        let mut collected = Vec::new();
        for byte in &frame {
            collected.extend(reader.push(std::slice::from_ref(byte)).unwrap());
        }

        assert_eq!(collected, vec![payload]);
    }

    #[test]
    fn back_to_back_frames_in_one_read() {
        let a = b"first".to_vec();
        let b = b"second".to_vec();
        let mut bytes = encode_frame(&a);
        bytes.extend(encode_frame(&b));
        // plus a partial third frame
        bytes.extend([0, 0, 0, 9, b'x']);

        let mut reader = FrameReader::new();
        assert_eq!(reader.push(&bytes).unwrap(), vec![a, b]);
        assert_eq!(reader.pending(), 1);
    }

    #[test]
    fn oversized_frames_are_rejected() {
        let mut reader = FrameReader::new();
        let announce = (MAX_FRAME_LEN as u32 + 1).to_be_bytes();
        assert!(reader.push(&announce).is_err());
    }
}
