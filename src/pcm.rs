//! Raw PCM byte conversion
//!
//! Turns the byte chunks handed out by a source into planar `f32` samples,
//! the layout the AAC encoder consumes. Interleaved input may split a frame
//! across chunks; the trailing partial frame is carried to the next call.

use crate::error::{ConverterError, Result};
use crate::format::{ByteOrder, FormatDescriptor, SampleEncoding};

pub struct PcmConverter {
    format: FormatDescriptor,
    carry: Vec<u8>,
}

impl PcmConverter {
    pub fn new(format: FormatDescriptor) -> Self {
        Self {
            format,
            carry: Vec::with_capacity(format.bytes_per_frame()),
        }
    }

    /// Convert `bytes` and append the samples to `planes`, one `Vec` per channel.
    ///
    /// Returns the number of frames appended.
    pub fn convert(&mut self, bytes: &[u8], planes: &mut [Vec<f32>]) -> Result<usize> {
        let channels = self.format.channel_count as usize;
        if planes.len() != channels {
            return Err(ConverterError::format(format!(
                "expected {} output planes, got {}",
                channels,
                planes.len()
            )));
        }

        if self.format.interleaved {
            self.convert_interleaved(bytes, planes)
        } else {
            self.convert_planar(bytes, planes)
        }
    }

    /// Bytes of an incomplete frame waiting for the next chunk.
    pub fn pending_bytes(&self) -> usize {
        self.carry.len()
    }

    /// Drop any carried partial frame, e.g. after the source seeks.
    pub fn reset(&mut self) {
        self.carry.clear();
    }

    fn convert_interleaved(&mut self, bytes: &[u8], planes: &mut [Vec<f32>]) -> Result<usize> {
        let frame_bytes = self.format.bytes_per_frame();
        let sample_bytes = self.format.bytes_per_sample();
        let mut frames = 0;
        let mut input = bytes;

        // Complete a frame left over from the previous chunk first
        if !self.carry.is_empty() {
            let need = frame_bytes - self.carry.len();
            let take = need.min(input.len());
            self.carry.extend_from_slice(&input[..take]);
            input = &input[take..];
            if self.carry.len() < frame_bytes {
                return Ok(0);
            }
            for (ch, plane) in planes.iter_mut().enumerate() {
                let at = ch * sample_bytes;
                plane.push(self.decode(&self.carry[at..at + sample_bytes]));
            }
            self.carry.clear();
            frames += 1;
        }

        let whole = input.len() / frame_bytes;
        for plane in planes.iter_mut() {
            plane.reserve(whole);
        }
        for frame in input.chunks_exact(frame_bytes) {
            for (ch, plane) in planes.iter_mut().enumerate() {
                let at = ch * sample_bytes;
                plane.push(self.decode(&frame[at..at + sample_bytes]));
            }
        }
        frames += whole;

        self.carry.extend_from_slice(&input[whole * frame_bytes..]);
        Ok(frames)
    }

    fn convert_planar(&mut self, bytes: &[u8], planes: &mut [Vec<f32>]) -> Result<usize> {
        let frame_bytes = self.format.bytes_per_frame();
        let sample_bytes = self.format.bytes_per_sample();
        if bytes.len() % frame_bytes != 0 {
            return Err(ConverterError::format(format!(
                "non-interleaved chunk of {} bytes is not a whole number of {}-byte frames",
                bytes.len(),
                frame_bytes
            )));
        }

        let frames = bytes.len() / frame_bytes;
        let plane_bytes = frames * sample_bytes;
        for (ch, plane) in planes.iter_mut().enumerate() {
            let src = &bytes[ch * plane_bytes..(ch + 1) * plane_bytes];
            plane.extend(src.chunks_exact(sample_bytes).map(|s| self.decode(s)));
        }
        Ok(frames)
    }

    fn decode(&self, s: &[u8]) -> f32 {
        decode_sample(s, self.format.encoding, self.format.byte_order)
    }
}

/// Decode one sample into the `[-1.0, 1.0]` range.
fn decode_sample(s: &[u8], encoding: SampleEncoding, order: ByteOrder) -> f32 {
    let big = order == ByteOrder::Big;
    match (encoding, s.len()) {
        (SampleEncoding::SignedInteger, 1) => (s[0] as f32 - 128.0) / 128.0,
        (SampleEncoding::SignedInteger, 2) => {
            let b = [s[0], s[1]];
            let v = if big { i16::from_be_bytes(b) } else { i16::from_le_bytes(b) };
            v as f32 / 32768.0
        }
        (SampleEncoding::SignedInteger, 3) => {
            let (hi, mid, lo) = if big { (s[0], s[1], s[2]) } else { (s[2], s[1], s[0]) };
            // Place in the top 24 bits so the shift sign-extends
            let v = i32::from_be_bytes([hi, mid, lo, 0]) >> 8;
            v as f32 / 8_388_608.0
        }
        (SampleEncoding::SignedInteger, 4) => {
            let b = [s[0], s[1], s[2], s[3]];
            let v = if big { i32::from_be_bytes(b) } else { i32::from_le_bytes(b) };
            (v as f64 / 2_147_483_648.0) as f32
        }
        (SampleEncoding::Float, 4) => {
            let b = [s[0], s[1], s[2], s[3]];
            if big { f32::from_be_bytes(b) } else { f32::from_le_bytes(b) }
        }
        (SampleEncoding::Float, 8) => {
            let b = [s[0], s[1], s[2], s[3], s[4], s[5], s[6], s[7]];
            let v = if big { f64::from_be_bytes(b) } else { f64::from_le_bytes(b) };
            v as f32
        }
        // Widths are checked by FormatDescriptor::validate
        _ => 0.0,
    }
}
