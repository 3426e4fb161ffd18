//!
//! Chunked animation container.
//!
//! The container wraps one compressed blob in a `BINA` file header, a single
//! `DATA` chunk and a `NAXP` animation header. It never interprets the blob
//! beyond its leading length word.
//!
//! | offset | field |
//! |---|---|
//! | 0x00 | `"BINA210L"`, total size, chunk count |
//! | 0x10 | `"DATA"`, data size, data size - 0x34, reserved words |
//! | 0x40 | `"NAXP"`, reserved words, duration, sample count, bone count |
//! | 0x64 | relative blob offset (at 0x68), offset to end (at 0x70) |
//! | 0x80 | blob, zero padding |
//! | end - 0xC | footer |
//!

use static_assertions::const_assert_eq;
use std::io::Write;

use crate::base::{padding_len, try_alloc, AnimError};
use crate::codec::CompressedBlob;
use crate::cursor::{ByteCursor, ByteWriter};

pub const BINA_MAGIC: [u8; 8] = *b"BINA210L";
pub const DATA_MAGIC: [u8; 4] = *b"DATA";
pub const NAXP_MAGIC: [u8; 4] = *b"NAXP";

/// Offset of the `DATA` chunk.
pub const DATA_CHUNK_OFFSET: usize = 0x10;
/// Offset of the `NAXP` header.
pub const NAXP_OFFSET: usize = 0x40;
/// Offset of the blob, also the size of everything before it.
pub const BLOB_OFFSET: usize = 0x80;
/// Size of the footer.
pub const FOOTER_SIZE: usize = 0xC;
/// Trailer following the blob in header-stripped files.
pub const BLOB_ONLY_TRAILER: usize = 0x34;
/// Distance from the chunk data offset to the blob length word.
pub const BLOB_LENGTH_DISTANCE: usize = 0x40;
/// Blob offset stored in the header, relative to the `NAXP` header.
pub const RELATIVE_BLOB_OFFSET: u32 = (BLOB_OFFSET - NAXP_OFFSET) as u32;
/// Default position of the chunk data offset word.
pub const DEFAULT_TABLE_OFFSET: usize = 0x68;

pub const FOOTER: [u32; 3] = [0xFFFF_FFFF, 0, 0x0042_4644];

const DATA_RESERVED: [u32; 3] = [0, 4, 0x18];
const NAXP_RESERVED: [u32; 5] = [512, 2048, 0, 24, 0];

const_assert_eq!(BLOB_OFFSET, NAXP_OFFSET + 0x40);
const_assert_eq!(DEFAULT_TABLE_OFFSET, NAXP_OFFSET + 0x28);
const_assert_eq!(RELATIVE_BLOB_OFFSET as usize, BLOB_LENGTH_DISTANCE);
const_assert_eq!(FOOTER_SIZE, 3 * 4);

/// Extracts the blob of a complete container.
///
/// The u32 at `table_offset` is the chunk data offset; the blob starts
/// 0x40 bytes after it and its first word is its own length.
pub fn extract_wrapped_blob(bytes: &[u8], table_offset: usize) -> Result<CompressedBlob, AnimError> {
    let mut cursor = ByteCursor::new(bytes);
    let chunk_data_offset = cursor.peek_u32_at(table_offset)? as usize;
    let blob_start = chunk_data_offset
        .checked_add(BLOB_LENGTH_DISTANCE)
        .ok_or_else(|| AnimError::malformed(format!("chunk data offset 0x{:X} overflows", chunk_data_offset)))?;
    let length = cursor.peek_u32_at(blob_start)? as usize;

    cursor.seek(blob_start)?;
    copy_blob(cursor.read_bytes(length)?)
}

/// Extracts the blob of a header-stripped file: the blob sits at 0x80 and is
/// followed by a 0x34 byte trailer.
pub fn extract_blob_only(bytes: &[u8]) -> Result<CompressedBlob, AnimError> {
    if bytes.len() < BLOB_OFFSET + BLOB_ONLY_TRAILER {
        return Err(AnimError::malformed(format!(
            "file of 0x{:X} bytes is shorter than 0x{:X}",
            bytes.len(),
            BLOB_OFFSET + BLOB_ONLY_TRAILER
        )));
    }
    copy_blob(&bytes[BLOB_OFFSET..bytes.len() - BLOB_ONLY_TRAILER])
}

fn copy_blob(bytes: &[u8]) -> Result<CompressedBlob, AnimError> {
    let mut blob = try_alloc(bytes.len())?;
    blob.extend_from_slice(bytes);
    Ok(CompressedBlob::new(blob))
}

/// Logical view of a container header.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContainerDescriptor {
    pub total_size: u32,
    pub chunk_count: u32,
    pub data_size: u32,
    /// `data_size - 0x34`.
    pub data_size_minus_header: u32,
    pub duration: f32,
    pub sample_count: u32,
    pub bone_count: u32,
    /// Blob offset relative to the `NAXP` header.
    pub blob_offset: u32,
    /// Distance from the `DATA` chunk to the footer.
    pub offset_to_end: u32,
    pub blob_len: u32,
    pub padding: u32,
    pub footer: [u32; 3],
}

impl ContainerDescriptor {
    /// Computes the descriptor of a container holding a `blob_len` byte blob.
    pub fn for_blob(
        blob_len: usize,
        duration: f32,
        sample_count: u32,
        bone_count: u32,
    ) -> Result<ContainerDescriptor, AnimError> {
        let padding = padding_len(blob_len);
        let total = blob_len
            .checked_add(BLOB_OFFSET + padding + FOOTER_SIZE)
            .and_then(|total| u32::try_from(total).ok())
            .ok_or_else(|| AnimError::InvalidArgument(format!("blob of {} bytes is too large", blob_len)))?;

        let data_size = total - DATA_CHUNK_OFFSET as u32;
        Ok(ContainerDescriptor {
            total_size: total,
            chunk_count: 1,
            data_size,
            data_size_minus_header: data_size - 0x34,
            duration,
            sample_count,
            bone_count,
            blob_offset: RELATIVE_BLOB_OFFSET,
            offset_to_end: data_size - FOOTER_SIZE as u32,
            blob_len: blob_len as u32,
            padding: padding as u32,
            footer: FOOTER,
        })
    }

    /// Reads a container header back. The blob length comes from the blob's own
    /// length word, the padding from `offset_to_end`.
    pub fn parse(bytes: &[u8]) -> Result<ContainerDescriptor, AnimError> {
        let mut cursor = ByteCursor::new(bytes);
        expect_magic(&mut cursor, &BINA_MAGIC)?;
        let total_size = cursor.read_u32()?;
        let chunk_count = cursor.read_u32()?;

        expect_magic(&mut cursor, &DATA_MAGIC)?;
        let data_size = cursor.read_u32()?;
        let data_size_minus_header = cursor.read_u32()?;

        cursor.seek(NAXP_OFFSET)?;
        expect_magic(&mut cursor, &NAXP_MAGIC)?;
        cursor.seek(0x58)?;
        let duration = cursor.read_f32()?;
        let sample_count = cursor.read_u32()?;
        let bone_count = cursor.read_u32()?;
        let blob_offset = cursor.peek_u32_at(0x68)?;
        let offset_to_end = cursor.peek_u32_at(0x70)?;

        let blob_len = cursor.peek_u32_at(NAXP_OFFSET + blob_offset as usize)?;
        let padding = offset_to_end
            .checked_sub(blob_len)
            .and_then(|rest| rest.checked_sub((BLOB_OFFSET - DATA_CHUNK_OFFSET) as u32))
            .ok_or_else(|| {
                AnimError::malformed(format!(
                    "offset to end 0x{:X} smaller than blob of 0x{:X} bytes",
                    offset_to_end, blob_len
                ))
            })?;

        cursor.seek(DATA_CHUNK_OFFSET + offset_to_end as usize)?;
        let footer = [cursor.read_u32()?, cursor.read_u32()?, cursor.read_u32()?];

        Ok(ContainerDescriptor {
            total_size,
            chunk_count,
            data_size,
            data_size_minus_header,
            duration,
            sample_count,
            bone_count,
            blob_offset,
            offset_to_end,
            blob_len,
            padding,
            footer,
        })
    }

    /// Checks every size field against `bytes`, the whole container file.
    pub fn validate(&self, bytes: &[u8]) -> Result<(), AnimError> {
        let expected = ContainerDescriptor::for_blob(self.blob_len as usize, self.duration, self.sample_count, self.bone_count)?;
        let actual_len = file_size_field(bytes.len())?;
        let checks: [(&str, u32, u32); 8] = [
            ("total size", self.total_size, actual_len),
            ("total size", self.total_size, expected.total_size),
            ("chunk count", self.chunk_count, expected.chunk_count),
            ("data size", self.data_size, expected.data_size),
            ("data size - 0x34", self.data_size_minus_header, expected.data_size_minus_header),
            ("blob offset", self.blob_offset, expected.blob_offset),
            ("offset to end", self.offset_to_end, expected.offset_to_end),
            ("padding", self.padding, expected.padding),
        ];
        for (name, found, wanted) in checks {
            if found != wanted {
                return Err(AnimError::malformed(format!("{} is 0x{:X}, expected 0x{:X}", name, found, wanted)));
            }
        }
        if bytes.len() != self.file_len() {
            return Err(AnimError::malformed(format!(
                "file is 0x{:X} bytes, expected 0x{:X}",
                bytes.len(),
                self.file_len()
            )));
        }
        if self.footer != FOOTER {
            return Err(AnimError::malformed(format!("unexpected footer {:X?}", self.footer)));
        }
        let pad_start = BLOB_OFFSET + self.blob_len as usize;
        if bytes[pad_start..pad_start + self.padding as usize].iter().any(|b| *b != 0) {
            return Err(AnimError::malformed("non-zero padding"));
        }
        Ok(())
    }

    /// `(sample_count - 1) / duration`.
    pub fn sample_rate(&self) -> f32 {
        self.sample_count.saturating_sub(1) as f32 / self.duration
    }

    /// Byte length of the whole container.
    pub fn file_len(&self) -> usize {
        BLOB_OFFSET + self.blob_len as usize + self.padding as usize + FOOTER_SIZE
    }

    fn write_header(&self, writer: &mut ByteWriter) {
        writer.put_bytes(&BINA_MAGIC);
        writer.put_u32(self.total_size);
        writer.put_u32(self.chunk_count);

        writer.put_bytes(&DATA_MAGIC);
        writer.put_u32(self.data_size);
        writer.put_u32(self.data_size_minus_header);
        DATA_RESERVED.iter().for_each(|v| writer.put_u32(*v));
        writer.put_zeros(6 * 4);

        writer.put_bytes(&NAXP_MAGIC);
        NAXP_RESERVED.iter().for_each(|v| writer.put_u32(*v));
        writer.put_f32(self.duration);
        writer.put_u32(self.sample_count);
        writer.put_u32(self.bone_count);
        writer.put_u32(0);
        writer.put_u32(self.blob_offset);
        writer.put_u32(0);
        writer.put_u32(self.offset_to_end);
        writer.put_zeros(3 * 4);
    }
}

/// Container size fields are u32; longer files cannot be described by them.
fn file_size_field(len: usize) -> Result<u32, AnimError> {
    u32::try_from(len).map_err(|_| AnimError::malformed(format!("file of 0x{:X} bytes overflows the size fields", len)))
}

fn expect_magic(cursor: &mut ByteCursor, magic: &[u8]) -> Result<(), AnimError> {
    let at = cursor.position();
    let found = cursor.read_bytes(magic.len())?;
    if found != magic {
        return Err(AnimError::malformed(format!(
            "expected {:?} at 0x{:X}, found {:?}",
            String::from_utf8_lossy(magic),
            at,
            String::from_utf8_lossy(found)
        )));
    }
    Ok(())
}

/// Writes a complete container around `blob`.
pub fn write_container<W: Write>(
    write: &mut W,
    blob: &CompressedBlob,
    duration: f32,
    sample_count: u32,
    bone_count: u32,
) -> Result<ContainerDescriptor, AnimError> {
    let desc = ContainerDescriptor::for_blob(blob.len(), duration, sample_count, bone_count)?;

    let mut header = ByteWriter::with_capacity(BLOB_OFFSET);
    desc.write_header(&mut header);
    debug_assert_eq!(header.len(), BLOB_OFFSET);

    let mut tail = ByteWriter::with_capacity(desc.padding as usize + FOOTER_SIZE);
    tail.put_zeros(desc.padding as usize);
    desc.footer.iter().for_each(|v| tail.put_u32(*v));

    write.write_all(header.as_slice())?;
    write.write_all(blob.as_bytes())?;
    write.write_all(tail.as_slice())?;
    Ok(desc)
}

/// Builds a complete container in memory.
pub fn build_container(
    blob: &CompressedBlob,
    duration: f32,
    sample_count: u32,
    bone_count: u32,
) -> Result<Vec<u8>, AnimError> {
    let mut bytes: Vec<u8> = try_alloc(blob.len().saturating_add(BLOB_OFFSET + 16 + FOOTER_SIZE))?;
    write_container(&mut bytes, blob, duration, sample_count, bone_count)?;
    Ok(bytes)
}
