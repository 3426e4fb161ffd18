//!
//! Transform codec capability.
//!
//! The container and sampling code never look inside a compressed blob. They
//! drive a codec through these traits only: initialize a decoder from a blob,
//! seek it to a time, have it write every bone of that time into a
//! `TrackWriter`, and compress a batch of raw tracks into a new blob.
//!

use glam::{Quat, Vec3};

use crate::base::AnimError;
use crate::track::{CompressionSettings, RawTrack};

/// Opaque compressed transform tracks, as produced by a `TransformCodec`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CompressedBlob(Vec<u8>);

impl CompressedBlob {
    pub fn new(bytes: Vec<u8>) -> CompressedBlob {
        CompressedBlob(bytes)
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for CompressedBlob {
    fn from(bytes: Vec<u8>) -> CompressedBlob {
        CompressedBlob(bytes)
    }
}

/// How a seek time between two samples is resolved.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum RoundingPolicy {
    /// Interpolates between the two surrounding samples.
    #[default]
    None,
    /// Uses the sample before the seek time.
    Floor,
    /// Uses the sample after the seek time.
    Ceil,
    /// Uses the closest sample.
    Nearest,
}

/// Receives the decoded sub-tracks of one sample time, addressed by bone index.
pub trait TrackWriter {
    fn write_rotation(&mut self, track_index: u32, rotation: Quat);
    fn write_translation(&mut self, track_index: u32, translation: Vec3);
    fn write_scale(&mut self, track_index: u32, scale: Vec3);
}

/// Decoder bound to one compressed blob.
pub trait TransformDecoder {
    /// Samples per second.
    fn sample_rate(&self) -> f32;

    /// Clip duration in seconds.
    fn duration(&self) -> f32;

    /// Samples per track.
    fn num_samples(&self) -> u32;

    /// Number of bone tracks.
    fn bone_count(&self) -> u32;

    /// Moves the decoder to `time`, clamped to `[0, duration]`.
    fn seek(&mut self, time: f32, rounding: RoundingPolicy);

    /// Writes rotation, translation and scale of every bone at the current seek time.
    fn decode_into(&self, writer: &mut dyn TrackWriter);
}

/// Transform track compressor/decompressor.
pub trait TransformCodec {
    type Decoder: TransformDecoder;

    /// Parses a blob. Fails with `CodecInitFailure` if the blob is rejected.
    fn initialize(&self, blob: &CompressedBlob) -> Result<Self::Decoder, AnimError>;

    /// Compresses a batch of tracks into one blob. Fails with `CompressFailure`.
    fn compress(&self, tracks: &[RawTrack], settings: &CompressionSettings) -> Result<CompressedBlob, AnimError>;
}
