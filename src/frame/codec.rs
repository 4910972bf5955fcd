//! Framed packet codec. A frame is sync header (eight whole bytes, each
//! 0 or 1), one length byte, the payload, and an XOR checksum byte; bytes
//! travel LSB first. The decoder locks onto frame starts in an unsegmented
//! bit stream and keeps itself aligned across drop-outs.

use std::collections::VecDeque;
use tracing::{debug, trace};

use super::bits::{bits_to_byte, bytes_to_bits, xor_checksum};
use crate::error::{LinkError, Result};
use crate::utils::consts::{BIT_BUFFER_CAP, FRAME_OVERHEAD_BYTES, MAX_PAYLOAD_BYTES, SYNC_HEADER};

const SYNC_BITS: usize = SYNC_HEADER.len() * 8;

/// Frame a payload as wire bytes: sync + length + payload + checksum.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() > MAX_PAYLOAD_BYTES {
        return Err(LinkError::PayloadTooLarge(payload.len()));
    }

    let mut bytes = Vec::with_capacity(FRAME_OVERHEAD_BYTES + payload.len());
    bytes.extend_from_slice(&SYNC_HEADER);
    bytes.push(payload.len() as u8);
    bytes.extend_from_slice(payload);
    bytes.push(xor_checksum(payload));
    Ok(bytes)
}

/// Frame a payload and expand it to transmit bits.
pub fn encode_frame_bits(payload: &[u8]) -> Result<Vec<u8>> {
    Ok(bytes_to_bits(&encode_frame(payload)?))
}

enum Step {
    Emitted(Vec<u8>),
    Advanced,
    NeedMore,
}

/// Streaming decoder. Feed it bits as the detector produces them; it
/// emits payloads as soon as whole valid frames are present and resumes
/// from the remainder.
pub struct FrameDecoder {
    bits: VecDeque<u8>,
    cap: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::with_capacity(BIT_BUFFER_CAP)
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            bits: VecDeque::with_capacity(cap),
            cap,
        }
    }

    pub fn buffered_bits(&self) -> usize {
        self.bits.len()
    }

    /// Append received bits and return every payload that completed.
    pub fn push_bits(&mut self, incoming: &[u8]) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();

        for &bit in incoming {
            self.bits.push_back(bit & 1);

            if self.bits.len() > self.cap {
                // Salvage anything decodable before discarding history.
                self.drain_frames(&mut frames);
                if self.bits.len() > self.cap {
                    // Drop the oldest half, rounded to whole bytes so the
                    // remaining stream keeps its alignment candidates.
                    let drop = ((self.bits.len() / 2) / 8 * 8).max(8);
                    self.bits.drain(..drop);
                    debug!("bit buffer full, dropped {} oldest bits", drop);
                }
            }
        }

        self.drain_frames(&mut frames);
        frames
    }

    pub fn reset(&mut self) {
        self.bits.clear();
    }

    fn drain_frames(&mut self, frames: &mut Vec<Vec<u8>>) {
        loop {
            match self.step() {
                Step::Emitted(payload) => frames.push(payload),
                Step::Advanced => continue,
                Step::NeedMore => break,
            }
        }
    }

    /// One decode attempt at the head of the buffer. Candidate frame
    /// starts are byte-aligned; every rejection advances exactly one byte.
    fn step(&mut self) -> Step {
        if self.bits.len() < SYNC_BITS {
            return Step::NeedMore;
        }

        let synced = SYNC_HEADER
            .iter()
            .enumerate()
            .all(|(i, &expected)| self.byte_at(i) == expected);

        if !synced {
            // A short buffer may still grow into an aligned header.
            if self.bits.len() < SYNC_BITS + 16 {
                return Step::NeedMore;
            }
            self.advance_byte();
            return Step::Advanced;
        }

        if self.bits.len() < SYNC_BITS + 8 {
            return Step::NeedMore;
        }

        let len = self.byte_at(SYNC_HEADER.len()) as usize;
        if len > MAX_PAYLOAD_BYTES {
            trace!("false sync: claimed length {}", len);
            self.advance_byte();
            return Step::Advanced;
        }

        let total_bits = (FRAME_OVERHEAD_BYTES + len) * 8;
        if self.bits.len() < total_bits {
            return Step::NeedMore;
        }

        let payload: Vec<u8> = (0..len)
            .map(|i| self.byte_at(SYNC_HEADER.len() + 1 + i))
            .collect();
        let checksum = self.byte_at(SYNC_HEADER.len() + 1 + len);

        if xor_checksum(&payload) != checksum {
            debug!("frame checksum mismatch, re-searching");
            self.advance_byte();
            return Step::Advanced;
        }

        self.bits.drain(..total_bits);
        trace!("frame decoded: {} payload bytes", payload.len());
        Step::Emitted(payload)
    }

    fn byte_at(&self, byte_index: usize) -> u8 {
        let start = byte_index * 8;
        let bits: Vec<u8> = (start..start + 8).map(|i| self.bits[i]).collect();
        bits_to_byte(&bits)
    }

    fn advance_byte(&mut self) {
        self.bits.drain(..8);
    }
}
