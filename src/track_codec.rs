//!
//! Built-in transform codec.
//!
//! Every bone track is split into rotation, translation and scale sub-tracks.
//! Each sub-track is stored in the cheapest format whose measured error stays
//! within the track tolerance: a single constant value, range-reduced 16-bit
//! keys, or raw floats.
//!
//! Blob layout, little-endian:
//!
//! | offset | field |
//! |---|---|
//! | 0x00 | u32 blob size, this field included |
//! | 0x04 | `"QVVT"` |
//! | 0x08 | u16 version, u16 reserved |
//! | 0x0C | u32 track count |
//! | 0x10 | u32 samples per track |
//! | 0x14 | f32 sample rate |
//! | 0x18 | per track: u32 output index, u8 rotation/translation/scale formats, u8 reserved |
//! | ... | per track: rotation, translation then scale data |
//!

use glam::{Quat, Vec3};
use static_assertions::const_assert_eq;
use std::collections::HashSet;

use crate::base::{try_alloc, AnimError};
use crate::codec::{CompressedBlob, RoundingPolicy, TrackWriter, TransformCodec, TransformDecoder};
use crate::cursor::{ByteCursor, ByteWriter};
use crate::quantize::{Float3Key, Float3Range, QuaternionKey};
use crate::track::{CompressionLevel, CompressionSettings, RawTrack, TrackValue};

/// Blob tag following the size field.
pub const BLOB_TAG: [u8; 4] = *b"QVVT";

/// Blob format version.
pub const BLOB_VERSION: u16 = 1;

/// Size of the fixed blob header.
pub const BLOB_HEADER_SIZE: usize = 0x18;

const TRACK_DESC_SIZE: usize = 8;

const_assert_eq!(BLOB_HEADER_SIZE, 4 + 4 + 2 + 2 + 4 + 4 + 4);

/// Storage format of one sub-track.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentFormat {
    Constant = 0,
    Quantized = 1,
    Raw = 2,
}

impl ComponentFormat {
    pub fn from_u8(value: u8) -> Option<ComponentFormat> {
        match value {
            0 => Some(ComponentFormat::Constant),
            1 => Some(ComponentFormat::Quantized),
            2 => Some(ComponentFormat::Raw),
            _ => None,
        }
    }
}

/// Sub-track value with a binary representation in the blob.
trait Component: TrackValue {
    const RAW_SIZE: usize;
    const KEY_SIZE: usize;
    const RANGE_SIZE: usize;

    fn put(&self, writer: &mut ByteWriter);
    fn get(cursor: &mut ByteCursor) -> Result<Self, AnimError>;

    /// Writes the quantized form of `values`.
    fn quantize(values: &[Self], writer: &mut ByteWriter);
    /// Reads back `count` values written by `quantize`.
    fn dequantize(cursor: &mut ByteCursor, count: usize) -> Result<Vec<Self>, AnimError>;
}

impl Component for Quat {
    const RAW_SIZE: usize = 16;
    const KEY_SIZE: usize = 6;
    const RANGE_SIZE: usize = 0;

    fn put(&self, writer: &mut ByteWriter) {
        self.to_array().iter().for_each(|v| writer.put_f32(*v));
    }

    fn get(cursor: &mut ByteCursor) -> Result<Quat, AnimError> {
        Ok(Quat::from_xyzw(
            cursor.read_f32()?,
            cursor.read_f32()?,
            cursor.read_f32()?,
            cursor.read_f32()?,
        ))
    }

    fn quantize(values: &[Quat], writer: &mut ByteWriter) {
        values.iter().for_each(|v| QuaternionKey::compress(*v).write(writer));
    }

    fn dequantize(cursor: &mut ByteCursor, count: usize) -> Result<Vec<Quat>, AnimError> {
        ensure_remaining(cursor, count, Self::KEY_SIZE)?;
        let mut values = try_alloc(count)?;
        for _ in 0..count {
            values.push(QuaternionKey::read(cursor)?.decompress());
        }
        Ok(values)
    }
}

impl Component for Vec3 {
    const RAW_SIZE: usize = 12;
    const KEY_SIZE: usize = 6;
    const RANGE_SIZE: usize = 24;

    fn put(&self, writer: &mut ByteWriter) {
        self.to_array().iter().for_each(|v| writer.put_f32(*v));
    }

    fn get(cursor: &mut ByteCursor) -> Result<Vec3, AnimError> {
        Ok(Vec3::new(cursor.read_f32()?, cursor.read_f32()?, cursor.read_f32()?))
    }

    fn quantize(values: &[Vec3], writer: &mut ByteWriter) {
        let range = Float3Range::from_values(values).unwrap_or_default();
        range.write(writer);
        values.iter().for_each(|v| Float3Key::compress(*v, &range).write(writer));
    }

    fn dequantize(cursor: &mut ByteCursor, count: usize) -> Result<Vec<Vec3>, AnimError> {
        let range = Float3Range::read(cursor)?;
        ensure_remaining(cursor, count, Self::KEY_SIZE)?;
        let mut values = try_alloc(count)?;
        for _ in 0..count {
            values.push(Float3Key::read(cursor)?.decompress(&range));
        }
        Ok(values)
    }
}

fn ensure_remaining(cursor: &ByteCursor, count: usize, size: usize) -> Result<(), AnimError> {
    let needed = count.checked_mul(size);
    match needed {
        Some(needed) if needed <= cursor.remaining() => Ok(()),
        _ => Err(AnimError::malformed(format!(
            "{} keys of {} bytes do not fit in the {} bytes left at 0x{:X}",
            count,
            size,
            cursor.remaining(),
            cursor.position()
        ))),
    }
}

fn max_error<V: TrackValue>(values: &[V], decoded: impl Fn(usize) -> V) -> f32 {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| V::error(*v, decoded(i)))
        .fold(0.0, f32::max)
}

/// Writes the cheapest representation of `values` within `tolerance` and returns its format.
fn encode_component<V: Component>(
    values: &[V],
    tolerance: f32,
    level: CompressionLevel,
    writer: &mut ByteWriter,
) -> ComponentFormat {
    let first = values[0];
    if max_error(values, |_| first) <= tolerance {
        first.put(writer);
        return ComponentFormat::Constant;
    }

    if level == CompressionLevel::Highest {
        let mut quantized = ByteWriter::with_capacity(V::RANGE_SIZE + values.len() * V::KEY_SIZE);
        V::quantize(values, &mut quantized);
        if let Ok(decoded) = V::dequantize(&mut ByteCursor::new(quantized.as_slice()), values.len()) {
            if max_error(values, |i| decoded[i]) <= tolerance {
                writer.put_bytes(quantized.as_slice());
                return ComponentFormat::Quantized;
            }
        }
    }

    tracing::trace!(kind = V::name(), samples = values.len(), "stored raw");
    values.iter().for_each(|v| v.put(writer));
    ComponentFormat::Raw
}

/// Decoded sub-track samples.
#[derive(Debug, Clone, PartialEq)]
enum Channel<V: TrackValue> {
    Constant(V),
    Samples(Vec<V>),
}

impl<V: Component> Channel<V> {
    fn decode(format: ComponentFormat, cursor: &mut ByteCursor, count: usize) -> Result<Channel<V>, AnimError> {
        match format {
            ComponentFormat::Constant => Ok(Channel::Constant(V::get(cursor)?)),
            ComponentFormat::Quantized => Ok(Channel::Samples(V::dequantize(cursor, count)?)),
            ComponentFormat::Raw => {
                ensure_remaining(cursor, count, V::RAW_SIZE)?;
                let mut values = try_alloc(count)?;
                for _ in 0..count {
                    values.push(V::get(cursor)?);
                }
                Ok(Channel::Samples(values))
            }
        }
    }

    #[inline]
    fn sample(&self, key0: usize, key1: usize, alpha: f32) -> V {
        match self {
            Channel::Constant(value) => *value,
            Channel::Samples(values) => {
                if alpha <= 0.0 {
                    values[key0]
                } else if alpha >= 1.0 {
                    values[key1]
                } else {
                    V::lerp(values[key0], values[key1], alpha)
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct DecodedTrack {
    output_index: u32,
    rotation: Channel<Quat>,
    translation: Channel<Vec3>,
    scale: Channel<Vec3>,
}

/// Decoder state of a `QvvCodec` blob.
#[derive(Debug, Clone)]
pub struct QvvDecoder {
    sample_rate: f32,
    num_samples: u32,
    tracks: Vec<DecodedTrack>,
    key0: usize,
    key1: usize,
    alpha: f32,
}

impl QvvDecoder {
    fn parse(bytes: &[u8]) -> Result<QvvDecoder, AnimError> {
        let mut cursor = ByteCursor::new(bytes);
        let size = cursor.read_u32()? as usize;
        if size < BLOB_HEADER_SIZE {
            return Err(AnimError::malformed(format!("blob size {} smaller than its header", size)));
        }
        if size > bytes.len() {
            return Err(AnimError::malformed(format!(
                "blob size {} exceeds the {} bytes available",
                size,
                bytes.len()
            )));
        }
        let mut cursor = ByteCursor::new(&bytes[..size]);
        cursor.seek(4)?;

        if cursor.read_array::<4>()? != BLOB_TAG {
            return Err(AnimError::malformed("invalid blob tag"));
        }
        let version = cursor.read_u16()?;
        if version != BLOB_VERSION {
            return Err(AnimError::malformed(format!("unsupported blob version {}", version)));
        }
        let _reserved = cursor.read_u16()?;

        let num_tracks = cursor.read_u32()?;
        let num_samples = cursor.read_u32()?;
        let sample_rate = cursor.read_f32()?;
        if num_tracks == 0 {
            return Err(AnimError::malformed("blob has no tracks"));
        }
        if num_samples == 0 {
            return Err(AnimError::malformed("blob has no samples"));
        }
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            return Err(AnimError::malformed(format!("invalid sample rate {}", sample_rate)));
        }
        ensure_remaining(&cursor, num_tracks as usize, TRACK_DESC_SIZE)?;

        let mut descs = try_alloc(num_tracks as usize)?;
        let mut seen = HashSet::with_capacity(num_tracks as usize);
        for track in 0..num_tracks {
            let output_index = cursor.read_u32()?;
            if output_index >= num_tracks || !seen.insert(output_index) {
                return Err(AnimError::malformed(format!(
                    "track {} has invalid output index {}",
                    track, output_index
                )));
            }
            let mut formats = [ComponentFormat::Constant; 3];
            for format in formats.iter_mut() {
                let raw = cursor.read_u8()?;
                *format = ComponentFormat::from_u8(raw)
                    .ok_or_else(|| AnimError::malformed(format!("track {} has unknown format {}", track, raw)))?;
            }
            let _reserved = cursor.read_u8()?;
            descs.push((output_index, formats));
        }

        let count = num_samples as usize;
        let mut tracks = try_alloc(num_tracks as usize)?;
        for (output_index, formats) in descs {
            tracks.push(DecodedTrack {
                output_index,
                rotation: Channel::decode(formats[0], &mut cursor, count)?,
                translation: Channel::decode(formats[1], &mut cursor, count)?,
                scale: Channel::decode(formats[2], &mut cursor, count)?,
            });
        }
        if cursor.remaining() != 0 {
            return Err(AnimError::malformed(format!("{} unread bytes at blob end", cursor.remaining())));
        }

        Ok(QvvDecoder {
            sample_rate,
            num_samples,
            tracks,
            key0: 0,
            key1: 0,
            alpha: 0.0,
        })
    }
}

impl TransformDecoder for QvvDecoder {
    #[inline]
    fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    fn duration(&self) -> f32 {
        if self.num_samples < 2 {
            return 0.0;
        }
        (self.num_samples - 1) as f32 / self.sample_rate
    }

    #[inline]
    fn num_samples(&self) -> u32 {
        self.num_samples
    }

    #[inline]
    fn bone_count(&self) -> u32 {
        self.tracks.len() as u32
    }

    fn seek(&mut self, time: f32, rounding: RoundingPolicy) {
        let last = self.num_samples as usize - 1;
        let time = if time.is_nan() { 0.0 } else { time.clamp(0.0, self.duration()) };
        let position = time * self.sample_rate;

        self.key0 = (position.floor() as usize).min(last);
        self.key1 = (self.key0 + 1).min(last);
        let alpha = if self.key0 == self.key1 {
            0.0
        } else {
            (position - self.key0 as f32).clamp(0.0, 1.0)
        };
        self.alpha = match rounding {
            RoundingPolicy::None => alpha,
            RoundingPolicy::Floor => 0.0,
            RoundingPolicy::Ceil if alpha > 0.0 => 1.0,
            RoundingPolicy::Ceil => 0.0,
            RoundingPolicy::Nearest => alpha.round(),
        };
    }

    fn decode_into(&self, writer: &mut dyn TrackWriter) {
        let (key0, key1, alpha) = (self.key0, self.key1, self.alpha);
        for track in &self.tracks {
            writer.write_rotation(track.output_index, track.rotation.sample(key0, key1, alpha));
            writer.write_translation(track.output_index, track.translation.sample(key0, key1, alpha));
            writer.write_scale(track.output_index, track.scale.sample(key0, key1, alpha));
        }
    }
}

/// Built-in codec for rotation/translation/scale transform tracks.
#[derive(Debug, Default, Clone, Copy)]
pub struct QvvCodec;

impl QvvCodec {
    pub fn new() -> QvvCodec {
        QvvCodec
    }

    fn validate_batch(tracks: &[RawTrack]) -> Result<(usize, f32), AnimError> {
        let first = tracks
            .first()
            .ok_or_else(|| AnimError::CompressFailure("no tracks to compress".into()))?;
        if u32::try_from(tracks.len()).is_err() {
            return Err(AnimError::CompressFailure(format!("too many tracks: {}", tracks.len())));
        }
        let num_samples = first.num_samples();
        if u32::try_from(num_samples).is_err() {
            return Err(AnimError::CompressFailure(format!("too many samples: {}", num_samples)));
        }
        let sample_rate = first.sample_rate();

        let mut seen = HashSet::with_capacity(tracks.len());
        for track in tracks {
            track.validate()?;
            let index = track.description().output_index;
            if track.num_samples() != num_samples {
                return Err(AnimError::CompressFailure(format!(
                    "track {} has {} samples, expected {}",
                    index,
                    track.num_samples(),
                    num_samples
                )));
            }
            if track.sample_rate() != sample_rate {
                return Err(AnimError::CompressFailure(format!(
                    "track {} has sample rate {}, expected {}",
                    index,
                    track.sample_rate(),
                    sample_rate
                )));
            }
            if index as usize >= tracks.len() || !seen.insert(index) {
                return Err(AnimError::CompressFailure(format!("invalid output index {}", index)));
            }
        }
        Ok((num_samples, sample_rate))
    }
}

impl TransformCodec for QvvCodec {
    type Decoder = QvvDecoder;

    fn initialize(&self, blob: &CompressedBlob) -> Result<QvvDecoder, AnimError> {
        QvvDecoder::parse(blob.as_bytes()).map_err(|err| match err {
            AnimError::MalformedContainer(msg) => AnimError::CodecInitFailure(msg),
            other => other,
        })
    }

    fn compress(&self, tracks: &[RawTrack], settings: &CompressionSettings) -> Result<CompressedBlob, AnimError> {
        let (num_samples, sample_rate) = Self::validate_batch(tracks)?;

        let mut writer = ByteWriter::with_capacity(BLOB_HEADER_SIZE + tracks.len() * TRACK_DESC_SIZE);
        writer.put_u32(0);
        writer.put_bytes(&BLOB_TAG);
        writer.put_u16(BLOB_VERSION);
        writer.put_u16(0);
        writer.put_u32(tracks.len() as u32);
        writer.put_u32(num_samples as u32);
        writer.put_f32(sample_rate);

        let desc_start = writer.len();
        writer.put_zeros(tracks.len() * TRACK_DESC_SIZE);

        let mut rotations = Vec::with_capacity(num_samples);
        let mut translations = Vec::with_capacity(num_samples);
        let mut scales = Vec::with_capacity(num_samples);
        let mut format_counts = [0usize; 3];
        let mut descs = Vec::with_capacity(tracks.len());

        for track in tracks {
            let desc = track.description();
            rotations.clear();
            translations.clear();
            scales.clear();
            for sample in track.samples() {
                rotations.push(sample.rotation);
                translations.push(sample.translation);
                scales.push(sample.scale);
            }

            let formats = [
                encode_component(&rotations, desc.tolerance(true), settings.level, &mut writer),
                encode_component(&translations, desc.tolerance(false), settings.level, &mut writer),
                encode_component(&scales, desc.tolerance(true), settings.level, &mut writer),
            ];
            formats.iter().for_each(|f| format_counts[*f as usize] += 1);
            descs.push((desc.output_index, formats));
        }

        let mut blob = writer.into_inner();
        for (i, (output_index, formats)) in descs.into_iter().enumerate() {
            let pos = desc_start + i * TRACK_DESC_SIZE;
            blob[pos..pos + 4].copy_from_slice(&output_index.to_le_bytes());
            for (j, format) in formats.iter().enumerate() {
                blob[pos + 4 + j] = *format as u8;
            }
        }
        let size = u32::try_from(blob.len())
            .map_err(|_| AnimError::CompressFailure(format!("blob too large: {} bytes", blob.len())))?;
        blob[0..4].copy_from_slice(&size.to_le_bytes());

        tracing::debug!(
            tracks = tracks.len(),
            samples = num_samples,
            constant = format_counts[ComponentFormat::Constant as usize],
            quantized = format_counts[ComponentFormat::Quantized as usize],
            raw = format_counts[ComponentFormat::Raw as usize],
            size = blob.len(),
            "track batch compressed"
        );
        Ok(CompressedBlob::new(blob))
    }
}
