//!
//! Dense time x bone grid of rigid transforms.
//!
//! A `SampleMatrix` is filled from a transform decoder one frame at a time, or
//! split into per-bone `RawTrack`s for compression.
//!

use glam::{Quat, Vec3};

use crate::base::{try_alloc, AnimError};
use crate::codec::{RoundingPolicy, TrackWriter, TransformDecoder};
use crate::track::{CompressionSettings, RawTrack};
use crate::transform::RigidTransform;

/// Time in seconds of frame `frame`, never past `duration`.
#[inline]
pub fn sample_time(frame: u32, sample_rate: f32, duration: f32) -> f32 {
    f32::min(frame as f32 / sample_rate, duration)
}

/// Frame-major transform matrix: frame `f`, bone `b` lives at `f * bone_count + b`.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleMatrix {
    duration: f32,
    frame_count: u32,
    bone_count: u32,
    transforms: Vec<RigidTransform>,
}

impl SampleMatrix {
    /// Builds a matrix from frame-major transforms.
    /// `transforms` must hold exactly `frame_count * bone_count` entries.
    pub fn new(
        duration: f32,
        frame_count: u32,
        bone_count: u32,
        transforms: Vec<RigidTransform>,
    ) -> Result<SampleMatrix, AnimError> {
        let expected = (frame_count as usize).checked_mul(bone_count as usize);
        if expected != Some(transforms.len()) {
            return Err(AnimError::InvalidArgument(format!(
                "{} transforms for {} frames of {} bones",
                transforms.len(),
                frame_count,
                bone_count
            )));
        }
        Ok(SampleMatrix {
            duration,
            frame_count,
            bone_count,
            transforms,
        })
    }

    /// Samples every frame of `decoder` into a new matrix.
    ///
    /// Frame `i` is taken at `min(i / sample_rate, duration)` without rounding.
    /// Every bone of every frame must receive a rotation, a translation and a
    /// scale, otherwise `IncompleteSample` is returned.
    pub fn from_decoder<D: TransformDecoder + ?Sized>(decoder: &mut D) -> Result<SampleMatrix, AnimError> {
        let duration = decoder.duration();
        let sample_rate = decoder.sample_rate();
        let frame_count = decoder.num_samples();
        let bone_count = decoder.bone_count();

        let total = (frame_count as usize)
            .checked_mul(bone_count as usize)
            .ok_or(AnimError::AllocationFailure(usize::MAX))?;
        let mut transforms = try_alloc(total)?;
        let mut buffer = FrameBuffer::new(bone_count)?;

        for frame in 0..frame_count {
            buffer.reset();
            decoder.seek(sample_time(frame, sample_rate, duration), RoundingPolicy::None);
            decoder.decode_into(&mut buffer);
            transforms.extend_from_slice(buffer.complete(frame)?);
        }

        Ok(SampleMatrix {
            duration,
            frame_count,
            bone_count,
            transforms,
        })
    }

    #[inline]
    pub fn duration(&self) -> f32 {
        self.duration
    }

    #[inline]
    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }

    #[inline]
    pub fn bone_count(&self) -> u32 {
        self.bone_count
    }

    /// `(frame_count - 1) / duration`. Not finite for single frame or zero length clips.
    #[inline]
    pub fn sample_rate(&self) -> f32 {
        self.frame_count.saturating_sub(1) as f32 / self.duration
    }

    /// All transforms, frame-major.
    #[inline]
    pub fn transforms(&self) -> &[RigidTransform] {
        &self.transforms
    }

    /// Transforms of one frame, in bone order.
    pub fn frame(&self, frame: u32) -> Option<&[RigidTransform]> {
        if frame >= self.frame_count {
            return None;
        }
        let start = frame as usize * self.bone_count as usize;
        self.transforms.get(start..start + self.bone_count as usize)
    }

    pub fn get(&self, frame: u32, bone: u32) -> Option<&RigidTransform> {
        if bone >= self.bone_count {
            return None;
        }
        self.frame(frame).map(|f| &f[bone as usize])
    }

    /// Time-ordered samples of one bone.
    pub fn bone_samples(&self, bone: u32) -> impl Iterator<Item = &RigidTransform> + '_ {
        let take = if bone < self.bone_count { self.frame_count as usize } else { 0 };
        self.transforms
            .iter()
            .skip(bone as usize)
            .step_by(self.bone_count.max(1) as usize)
            .take(take)
    }

    /// Splits the matrix into one track per bone, bone `b` written back to output index `b`.
    pub fn to_raw_tracks(&self, settings: &CompressionSettings) -> Result<Vec<RawTrack>, AnimError> {
        let sample_rate = self.sample_rate();
        let mut tracks = try_alloc(self.bone_count as usize)?;
        for bone in 0..self.bone_count {
            let mut samples = try_alloc(self.frame_count as usize)?;
            samples.extend(self.bone_samples(bone).copied());
            tracks.push(RawTrack::new(settings.describe(bone), sample_rate, samples));
        }
        Ok(tracks)
    }
}

const ROTATION: u8 = 0b001;
const TRANSLATION: u8 = 0b010;
const SCALE: u8 = 0b100;
const COMPLETE: u8 = ROTATION | TRANSLATION | SCALE;

/// Transforms of a single frame, as written by a decoder.
#[derive(Debug)]
pub struct FrameBuffer {
    transforms: Vec<RigidTransform>,
    written: Vec<u8>,
    // First track index written past `bone_count`.
    stray: Option<u32>,
}

impl FrameBuffer {
    pub fn new(bone_count: u32) -> Result<FrameBuffer, AnimError> {
        let mut transforms = try_alloc(bone_count as usize)?;
        transforms.resize(bone_count as usize, RigidTransform::IDENTITY);
        let mut written = try_alloc(bone_count as usize)?;
        written.resize(bone_count as usize, 0);
        Ok(FrameBuffer {
            transforms,
            written,
            stray: None,
        })
    }

    #[inline]
    pub fn bone_count(&self) -> usize {
        self.transforms.len()
    }

    /// Forgets the previous frame.
    pub fn reset(&mut self) {
        self.transforms.fill(RigidTransform::IDENTITY);
        self.written.fill(0);
        self.stray = None;
    }

    /// Returns the frame if every bone got all its components and nothing was
    /// written outside of them.
    pub fn complete(&self, frame: u32) -> Result<&[RigidTransform], AnimError> {
        if let Some(track_index) = self.stray {
            return Err(AnimError::InvalidArgument(format!(
                "frame {} wrote track {} of a {} bone buffer",
                frame,
                track_index,
                self.bone_count()
            )));
        }
        match self.written.iter().position(|w| *w != COMPLETE) {
            Some(bone) => Err(AnimError::IncompleteSample {
                frame,
                bone: bone as u32,
            }),
            None => Ok(&self.transforms),
        }
    }

    #[inline]
    fn slot(&mut self, track_index: u32, flag: u8) -> Option<&mut RigidTransform> {
        let index = track_index as usize;
        let Some(written) = self.written.get_mut(index) else {
            self.stray.get_or_insert(track_index);
            return None;
        };
        *written |= flag;
        self.transforms.get_mut(index)
    }
}

impl TrackWriter for FrameBuffer {
    fn write_rotation(&mut self, track_index: u32, rotation: Quat) {
        if let Some(t) = self.slot(track_index, ROTATION) {
            t.rotation = rotation;
        }
    }

    fn write_translation(&mut self, track_index: u32, translation: Vec3) {
        if let Some(t) = self.slot(track_index, TRANSLATION) {
            t.translation = translation;
        }
    }

    fn write_scale(&mut self, track_index: u32, scale: Vec3) {
        if let Some(t) = self.slot(track_index, SCALE) {
            t.scale = scale;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Decoder whose bone `b` at time `t` sits at translation `(t, b, 0)`.
    struct StubDecoder {
        sample_rate: f32,
        num_samples: u32,
        bone_count: u32,
        skip_scale_of: Option<u32>,
        time: f32,
        seeks: Vec<f32>,
    }

    impl StubDecoder {
        fn new(sample_rate: f32, num_samples: u32, bone_count: u32) -> StubDecoder {
            StubDecoder {
                sample_rate,
                num_samples,
                bone_count,
                skip_scale_of: None,
                time: 0.0,
                seeks: Vec::new(),
            }
        }
    }

    impl TransformDecoder for StubDecoder {
        fn sample_rate(&self) -> f32 {
            self.sample_rate
        }

        fn duration(&self) -> f32 {
            (self.num_samples - 1) as f32 / self.sample_rate
        }

        fn num_samples(&self) -> u32 {
            self.num_samples
        }

        fn bone_count(&self) -> u32 {
            self.bone_count
        }

        fn seek(&mut self, time: f32, rounding: RoundingPolicy) {
            assert_eq!(rounding, RoundingPolicy::None);
            self.time = time;
            self.seeks.push(time);
        }

        fn decode_into(&self, writer: &mut dyn TrackWriter) {
            for bone in 0..self.bone_count {
                writer.write_rotation(bone, Quat::IDENTITY);
                writer.write_translation(bone, Vec3::new(self.time, bone as f32, 0.0));
                if self.skip_scale_of != Some(bone) {
                    writer.write_scale(bone, Vec3::splat(2.0));
                }
            }
        }
    }

    #[test]
    fn test_sample_time() {
        assert_eq!(sample_time(0, 30.0, 1.0), 0.0);
        assert_eq!(sample_time(15, 30.0, 1.0), 0.5);
        assert_eq!(sample_time(30, 30.0, 1.0), 1.0);
        assert_eq!(sample_time(31, 30.0, 1.0), 1.0);

        let rate = 2.0 / 0.3;
        for frame in 0..3 {
            assert!(sample_time(frame, rate, 0.3) <= 0.3);
        }
    }

    #[test]
    fn test_from_decoder() {
        let mut decoder = StubDecoder::new(10.0, 4, 3);
        let matrix = SampleMatrix::from_decoder(&mut decoder).unwrap();
        assert_eq!(matrix.frame_count(), 4);
        assert_eq!(matrix.bone_count(), 3);
        assert!((matrix.duration() - 0.3).abs() < 1e-6);
        assert_eq!(matrix.transforms().len(), 12);
        assert_eq!(decoder.seeks.len(), 4);
        assert!(decoder.seeks.iter().all(|t| *t <= matrix.duration()));

        let t = matrix.get(2, 1).unwrap();
        assert!((t.translation.x - 0.2).abs() < 1e-6);
        assert_eq!(t.translation.y, 1.0);
        assert_eq!(t.scale, Vec3::splat(2.0));
        assert!(matrix.get(4, 0).is_none());
        assert!(matrix.get(0, 3).is_none());
    }

    #[test]
    fn test_from_decoder_incomplete() {
        let mut decoder = StubDecoder::new(10.0, 4, 3);
        decoder.skip_scale_of = Some(2);
        let err = SampleMatrix::from_decoder(&mut decoder).unwrap_err();
        assert!(matches!(err, AnimError::IncompleteSample { frame: 0, bone: 2 }));
    }

    #[test]
    fn test_frame_buffer_reset() {
        let mut buffer = FrameBuffer::new(2).unwrap();
        for bone in 0..2 {
            buffer.write_rotation(bone, Quat::IDENTITY);
            buffer.write_translation(bone, Vec3::X);
            buffer.write_scale(bone, Vec3::ONE);
        }
        assert_eq!(buffer.complete(0).unwrap()[1].translation, Vec3::X);

        buffer.reset();
        buffer.write_rotation(0, Quat::IDENTITY);
        buffer.write_translation(0, Vec3::Y);
        buffer.write_scale(0, Vec3::ONE);
        let err = buffer.complete(7).unwrap_err();
        assert!(matches!(err, AnimError::IncompleteSample { frame: 7, bone: 1 }));
    }

    #[test]
    fn test_frame_buffer_out_of_range() {
        let mut buffer = FrameBuffer::new(2).unwrap();
        for bone in 0..2 {
            buffer.write_rotation(bone, Quat::IDENTITY);
            buffer.write_translation(bone, Vec3::X);
            buffer.write_scale(bone, Vec3::ONE);
        }
        buffer.write_scale(5, Vec3::ZERO);
        buffer.write_rotation(9, Quat::IDENTITY);
        let err = buffer.complete(3).unwrap_err();
        assert!(err.is_invalid_argument());
        assert_eq!(err.to_string(), "Invalid argument: frame 3 wrote track 5 of a 2 bone buffer");

        buffer.reset();
        for bone in 0..2 {
            buffer.write_rotation(bone, Quat::IDENTITY);
            buffer.write_translation(bone, Vec3::Y);
            buffer.write_scale(bone, Vec3::ONE);
        }
        assert_eq!(buffer.complete(4).unwrap()[0].translation, Vec3::Y);
    }

    #[test]
    fn test_matrix_new() {
        assert!(SampleMatrix::new(1.0, 2, 3, vec![RigidTransform::IDENTITY; 6]).is_ok());
        let err = SampleMatrix::new(1.0, 2, 3, vec![RigidTransform::IDENTITY; 5]).unwrap_err();
        assert!(err.is_invalid_argument());
        let empty = SampleMatrix::new(0.0, 0, 0, vec![]).unwrap();
        assert!(empty.frame(0).is_none());
        assert_eq!(empty.bone_samples(0).count(), 0);
    }

    #[test]
    fn test_to_raw_tracks() {
        let transforms = (0..3)
            .flat_map(|frame| {
                (0..2).map(move |bone| {
                    RigidTransform::new(Quat::IDENTITY, Vec3::new(frame as f32, bone as f32, 0.0), Vec3::ONE)
                })
            })
            .collect();
        let matrix = SampleMatrix::new(0.5, 3, 2, transforms).unwrap();
        assert_eq!(matrix.sample_rate(), 4.0);

        let settings = CompressionSettings {
            precision: 0.01,
            ..Default::default()
        };
        let tracks = matrix.to_raw_tracks(&settings).unwrap();
        assert_eq!(tracks.len(), 2);
        for (bone, track) in tracks.iter().enumerate() {
            assert_eq!(track.description().output_index, bone as u32);
            assert_eq!(track.description().precision, 0.01);
            assert_eq!(track.description().shell_distance, 3.0);
            assert_eq!(track.sample_rate(), 4.0);
            let xs: Vec<f32> = track.samples().iter().map(|s| s.translation.x).collect();
            assert_eq!(xs, vec![0.0, 1.0, 2.0]);
            assert!(track.samples().iter().all(|s| s.translation.y == bone as f32));
        }
    }
}
