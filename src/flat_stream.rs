//!
//! Flat transform stream.
//!
//! Engine independent dump of a `SampleMatrix`, native byte order, no padding:
//! `duration` f32, `frame_count` u32, `bone_count` u32, then every transform
//! frame-major as rotation xyzw, translation xyz, scale xyz.
//!

use glam::{Quat, Vec3};
use static_assertions::const_assert_eq;
use std::io::{Cursor, Read, Write};

use crate::base::{try_alloc, AnimError};
use crate::sample_matrix::SampleMatrix;
use crate::transform::{RigidTransform, TRANSFORM_SIZE};

/// Size of the stream header.
pub const FLAT_HEADER_SIZE: usize = 12;

const_assert_eq!(FLAT_HEADER_SIZE, 4 + 4 + 4);

/// Byte size of a stream holding `frame_count * bone_count` transforms.
pub fn flat_stream_len(frame_count: u32, bone_count: u32) -> Option<usize> {
    (frame_count as usize)
        .checked_mul(bone_count as usize)?
        .checked_mul(TRANSFORM_SIZE)?
        .checked_add(FLAT_HEADER_SIZE)
}

/// Reads native-endian values from a flat stream.
pub struct FlatReader<R: Read> {
    read: R,
}

impl<R: Read> FlatReader<R> {
    pub fn new(read: R) -> FlatReader<R> {
        FlatReader { read }
    }

    /// Reads `T` from the stream.
    pub fn read<T: FlatRead<T>>(&mut self) -> Result<T, AnimError> {
        T::read(self)
    }
}

impl<'t> FlatReader<Cursor<&'t [u8]>> {
    pub fn from_slice(buf: &'t [u8]) -> FlatReader<Cursor<&'t [u8]>> {
        FlatReader::new(Cursor::new(buf))
    }
}

/// Implements `FlatRead` to read `T` from a `FlatReader`.
pub trait FlatRead<T> {
    fn read<R: Read>(reader: &mut FlatReader<R>) -> Result<T, AnimError>;
}

/// Implements `FlatWrite` to write `T` in stream order.
pub trait FlatWrite {
    fn write<W: Write>(&self, write: &mut W) -> Result<(), AnimError>;
}

macro_rules! primitive_flat {
    ($type:ty) => {
        impl FlatRead<$type> for $type {
            #[inline]
            fn read<R: Read>(reader: &mut FlatReader<R>) -> Result<$type, AnimError> {
                let mut buf = [0u8; std::mem::size_of::<$type>()];
                reader.read.read_exact(&mut buf)?;
                Ok(<$type>::from_ne_bytes(buf))
            }
        }

        impl FlatWrite for $type {
            #[inline]
            fn write<W: Write>(&self, write: &mut W) -> Result<(), AnimError> {
                write.write_all(&self.to_ne_bytes())?;
                Ok(())
            }
        }
    };
}

primitive_flat!(u32);
primitive_flat!(f32);

impl FlatRead<RigidTransform> for RigidTransform {
    #[inline]
    fn read<R: Read>(reader: &mut FlatReader<R>) -> Result<RigidTransform, AnimError> {
        let rotation = Quat::from_xyzw(f32::read(reader)?, f32::read(reader)?, f32::read(reader)?, f32::read(reader)?);
        let translation = Vec3::new(f32::read(reader)?, f32::read(reader)?, f32::read(reader)?);
        let scale = Vec3::new(f32::read(reader)?, f32::read(reader)?, f32::read(reader)?);
        Ok(RigidTransform::new(rotation, translation, scale))
    }
}

impl FlatWrite for RigidTransform {
    #[inline]
    fn write<W: Write>(&self, write: &mut W) -> Result<(), AnimError> {
        let mut buf = [0u8; TRANSFORM_SIZE];
        for (chunk, value) in buf.chunks_exact_mut(4).zip(self.to_array()) {
            chunk.copy_from_slice(&value.to_ne_bytes());
        }
        write.write_all(&buf)?;
        Ok(())
    }
}

/// Parses a whole flat stream.
///
/// The length is checked against the header before anything is allocated.
/// Bytes past the declared matrix are ignored.
pub fn read_flat_stream(bytes: &[u8]) -> Result<SampleMatrix, AnimError> {
    if bytes.len() < FLAT_HEADER_SIZE {
        return Err(AnimError::TruncatedStream {
            expected: FLAT_HEADER_SIZE,
            actual: bytes.len(),
        });
    }

    let mut reader = FlatReader::from_slice(bytes);
    let duration: f32 = reader.read()?;
    let frame_count: u32 = reader.read()?;
    let bone_count: u32 = reader.read()?;

    let expected = flat_stream_len(frame_count, bone_count).ok_or(AnimError::TruncatedStream {
        expected: usize::MAX,
        actual: bytes.len(),
    })?;
    if bytes.len() < expected {
        return Err(AnimError::TruncatedStream {
            expected,
            actual: bytes.len(),
        });
    }
    if bytes.len() > expected {
        tracing::warn!(
            trailing = bytes.len() - expected,
            "ignoring bytes past the end of the transform matrix"
        );
    }

    let count = frame_count as usize * bone_count as usize;
    let mut transforms = try_alloc(count)?;
    for _ in 0..count {
        transforms.push(reader.read::<RigidTransform>()?);
    }
    SampleMatrix::new(duration, frame_count, bone_count, transforms)
}

/// Serializes `matrix` as a flat stream.
pub fn write_flat_stream<W: Write>(matrix: &SampleMatrix, write: &mut W) -> Result<(), AnimError> {
    matrix.duration().write(write)?;
    matrix.frame_count().write(write)?;
    matrix.bone_count().write(write)?;
    for transform in matrix.transforms() {
        transform.write(write)?;
    }
    Ok(())
}
