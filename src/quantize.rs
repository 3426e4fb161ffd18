//!
//! Quantized key formats used by the built-in track codec.
//!

use glam::{Quat, Vec3, Vec4};

use crate::base::AnimError;
use crate::cursor::{ByteCursor, ByteWriter};

/// Quaternion key, smallest-three encoded on 48 bits.
///
/// Bits 0-1 hold the index of the dropped (largest) component, bit 2 its sign,
/// then the three remaining components follow on 15 bits each.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct QuaternionKey([u16; 3]);

impl QuaternionKey {
    const SCALE: f32 = core::f32::consts::SQRT_2 / 32767.0;
    const OFFSET: f32 = -core::f32::consts::SQRT_2 / 2.0;

    pub const fn new(value: [u16; 3]) -> QuaternionKey {
        QuaternionKey(value)
    }

    #[inline]
    pub fn raw(&self) -> [u16; 3] {
        self.0
    }

    pub fn compress(quat: Quat) -> QuaternionKey {
        let cpnt = Vec4::from(quat).to_array();
        let mut largest = 0;
        for i in 1..4 {
            if cpnt[i].abs() > cpnt[largest].abs() {
                largest = i;
            }
        }
        let sign = (cpnt[largest] < 0.0) as u16;

        let mut value = [0u32; 3];
        let mut slot = 0;
        for (i, c) in cpnt.iter().enumerate() {
            if i == largest {
                continue;
            }
            let quantized = ((c - Self::OFFSET) / Self::SCALE).round();
            value[slot] = quantized.clamp(0.0, 32767.0) as u32;
            slot += 1;
        }

        let packed = value[0] | (value[1] << 15);
        QuaternionKey([
            (largest as u16) | (sign << 2) | (((packed & 0x1FFF) as u16) << 3),
            (packed >> 13) as u16,
            ((value[1] >> 14) as u16) | ((value[2] as u16) << 1),
        ])
    }

    #[inline]
    fn unpack(&self) -> (u16, u16, [u32; 3]) {
        let packed: u32 = ((self.0[0] as u32) >> 3) | ((self.0[1] as u32) << 13) | ((self.0[2] as u32) << 29);
        let biggest = self.0[0] & 0x3;
        let sign = (self.0[0] >> 2) & 0x1;
        let value = [packed & 0x7fff, (packed >> 15) & 0x7fff, (self.0[2] as u32) >> 1];
        (biggest, sign, value)
    }

    #[inline]
    pub fn decompress(&self) -> Quat {
        const MAPPING: [[usize; 4]; 4] = [[0, 0, 1, 2], [0, 0, 1, 2], [0, 1, 0, 2], [0, 1, 2, 0]];

        let (largest, sign, value) = self.unpack();
        let mask = &MAPPING[largest as usize];
        let cmp_keys = [value[mask[0]], value[mask[1]], value[mask[2]], value[mask[3]]];

        let mut cpnt = Vec4::new(
            Self::SCALE * (cmp_keys[0] as f32) + Self::OFFSET,
            Self::SCALE * (cmp_keys[1] as f32) + Self::OFFSET,
            Self::SCALE * (cmp_keys[2] as f32) + Self::OFFSET,
            Self::SCALE * (cmp_keys[3] as f32) + Self::OFFSET,
        );
        cpnt[largest as usize] = 0.0;

        let dot = cpnt.dot(cpnt);
        let ww0 = f32::max(0.0, 1f32 - dot);
        let w0 = ww0.sqrt();
        let restored = if sign == 0 { w0 } else { -w0 };
        cpnt[largest as usize] = restored;
        Quat::from_vec4(cpnt)
    }

    pub fn write(&self, writer: &mut ByteWriter) {
        self.0.iter().for_each(|v| writer.put_u16(*v));
    }

    pub fn read(cursor: &mut ByteCursor) -> Result<QuaternionKey, AnimError> {
        Ok(QuaternionKey([cursor.read_u16()?, cursor.read_u16()?, cursor.read_u16()?]))
    }
}

/// Value range of a vector sub-track, used to normalize its samples before quantization.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Float3Range {
    pub min: Vec3,
    pub extent: Vec3,
}

impl Float3Range {
    /// Smallest range holding every value. `None` for an empty slice.
    pub fn from_values(values: &[Vec3]) -> Option<Float3Range> {
        let first = *values.first()?;
        let (min, max) = values
            .iter()
            .fold((first, first), |(min, max), v| (min.min(*v), max.max(*v)));
        Some(Float3Range { min, extent: max - min })
    }

    pub fn write(&self, writer: &mut ByteWriter) {
        self.min.to_array().iter().for_each(|v| writer.put_f32(*v));
        self.extent.to_array().iter().for_each(|v| writer.put_f32(*v));
    }

    pub fn read(cursor: &mut ByteCursor) -> Result<Float3Range, AnimError> {
        let min = Vec3::new(cursor.read_f32()?, cursor.read_f32()?, cursor.read_f32()?);
        let extent = Vec3::new(cursor.read_f32()?, cursor.read_f32()?, cursor.read_f32()?);
        Ok(Float3Range { min, extent })
    }
}

/// Float3 key, each channel normalized in its track range on 16 bits.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Float3Key([u16; 3]);

impl Float3Key {
    pub const fn new(value: [u16; 3]) -> Float3Key {
        Float3Key(value)
    }

    #[inline]
    pub fn raw(&self) -> [u16; 3] {
        self.0
    }

    pub fn compress(value: Vec3, range: &Float3Range) -> Float3Key {
        let mut out = [0u16; 3];
        for (i, key) in out.iter_mut().enumerate() {
            if range.extent[i] > 0.0 {
                let normalized = (value[i] - range.min[i]) / range.extent[i];
                *key = (normalized * 65535.0).round().clamp(0.0, 65535.0) as u16;
            }
        }
        Float3Key(out)
    }

    #[inline]
    pub fn decompress(&self, range: &Float3Range) -> Vec3 {
        let normalized = Vec3::new(self.0[0] as f32, self.0[1] as f32, self.0[2] as f32) / 65535.0;
        range.min + normalized * range.extent
    }

    pub fn write(&self, writer: &mut ByteWriter) {
        self.0.iter().for_each(|v| writer.put_u16(*v));
    }

    pub fn read(cursor: &mut ByteCursor) -> Result<Float3Key, AnimError> {
        Ok(Float3Key([cursor.read_u16()?, cursor.read_u16()?, cursor.read_u16()?]))
    }
}
