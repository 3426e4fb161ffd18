//!
//! Decode and encode paths between containers and flat transform streams.
//!
//! Decode: read container, extract blob, initialize codec, sample every frame,
//! write the flat stream. Encode: read flat stream, split it into per-bone
//! tracks, compress them in one batch, wrap the blob in a container.
//!
//! Output files are only created once their whole content is known, and are
//! written to a temporary file next to the destination that replaces it only
//! after the last byte is flushed.
//!

use std::ffi::OsStr;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::base::AnimError;
use crate::codec::TransformCodec;
use crate::container::{
    extract_blob_only, extract_wrapped_blob, write_container, ContainerDescriptor, DEFAULT_TABLE_OFFSET,
};
use crate::flat_stream::{read_flat_stream, write_flat_stream};
use crate::sample_matrix::SampleMatrix;
use crate::track::CompressionSettings;
use crate::track_codec::QvvCodec;

/// Container suffix, stripped in preference to `PXD_SUFFIX`.
pub const CONTAINER_SUFFIX: &str = ".anm.pxd";
pub const PXD_SUFFIX: &str = ".pxd";
pub const FLAT_SUFFIX: &str = ".outanim";

/// Conversion direction, picked from the input file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Container to flat stream.
    Decode,
    /// Flat stream to container.
    Encode,
}

impl Operation {
    /// `pxd` decodes, `outanim` encodes. Anything else, including a missing
    /// extension, is `None`.
    pub fn from_path(path: &Path) -> Option<Operation> {
        match path.extension()?.to_str()? {
            "pxd" => Some(Operation::Decode),
            "outanim" => Some(Operation::Encode),
            _ => None,
        }
    }

    /// Output path for `input`.
    pub fn output_path(&self, input: &Path) -> PathBuf {
        match self {
            Operation::Decode => decoded_output_path(input),
            Operation::Encode => encoded_output_path(input),
        }
    }
}

/// `x.anm.pxd` or `x.pxd` becomes `x.outanim`.
pub fn decoded_output_path(input: &Path) -> PathBuf {
    replace_suffix(input, &[CONTAINER_SUFFIX, PXD_SUFFIX], FLAT_SUFFIX)
}

/// `x.outanim` becomes `x.anm.pxd`.
pub fn encoded_output_path(input: &Path) -> PathBuf {
    replace_suffix(input, &[FLAT_SUFFIX], CONTAINER_SUFFIX)
}

fn replace_suffix(input: &Path, suffixes: &[&str], replacement: &str) -> PathBuf {
    let name = match input.file_name() {
        Some(name) => name,
        None => return input.with_extension(&replacement[1..]),
    };
    let stem = suffixes
        .iter()
        .find_map(|suffix| strip_suffix(name, suffix))
        .unwrap_or(name);
    let mut file_name = stem.to_os_string();
    file_name.push(replacement);
    input.with_file_name(file_name)
}

/// Strips a dotted suffix such as `.anm.pxd` one extension at a time, so
/// names that are not UTF-8 are handled too.
fn strip_suffix<'a>(name: &'a OsStr, suffix: &str) -> Option<&'a OsStr> {
    let mut stem = Path::new(name);
    for extension in suffix.rsplit('.').filter(|e| !e.is_empty()) {
        if stem.extension()? != extension {
            return None;
        }
        stem = Path::new(stem.file_stem()?);
    }
    Some(stem.as_os_str())
}

/// Where the blob sits in a `.pxd` input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerLayout {
    /// Complete container, the chunk data offset is read at `table_offset`.
    Wrapped { table_offset: usize },
    /// Header-stripped file, blob at 0x80 followed by a 0x34 byte trailer.
    BlobOnly,
}

impl Default for ContainerLayout {
    fn default() -> ContainerLayout {
        ContainerLayout::Wrapped {
            table_offset: DEFAULT_TABLE_OFFSET,
        }
    }
}

/// Runs both conversion paths with one codec.
#[derive(Debug, Clone)]
pub struct Converter<C: TransformCodec> {
    codec: C,
    layout: ContainerLayout,
    settings: CompressionSettings,
}

impl Default for Converter<QvvCodec> {
    fn default() -> Converter<QvvCodec> {
        Converter::new(QvvCodec::new())
    }
}

impl<C: TransformCodec> Converter<C> {
    pub fn new(codec: C) -> Converter<C> {
        Converter {
            codec,
            layout: ContainerLayout::default(),
            settings: CompressionSettings::default(),
        }
    }

    pub fn with_layout(mut self, layout: ContainerLayout) -> Converter<C> {
        self.layout = layout;
        self
    }

    pub fn with_settings(mut self, settings: CompressionSettings) -> Converter<C> {
        self.settings = settings;
        self
    }

    #[inline]
    pub fn layout(&self) -> ContainerLayout {
        self.layout
    }

    #[inline]
    pub fn settings(&self) -> &CompressionSettings {
        &self.settings
    }

    /// Decodes a `.pxd` file image into its sample matrix.
    pub fn decode_bytes(&self, bytes: &[u8]) -> Result<SampleMatrix, AnimError> {
        let blob = match self.layout {
            ContainerLayout::Wrapped { table_offset } => {
                match ContainerDescriptor::parse(bytes) {
                    Ok(desc) => tracing::debug!(?desc, "container header"),
                    Err(err) => tracing::debug!(%err, "container header not parsed"),
                }
                extract_wrapped_blob(bytes, table_offset)?
            }
            ContainerLayout::BlobOnly => extract_blob_only(bytes)?,
        };
        tracing::info!(size = blob.len(), "extracted blob");

        let mut decoder = self.codec.initialize(&blob)?;
        let matrix = SampleMatrix::from_decoder(&mut decoder)?;
        tracing::info!(
            frames = matrix.frame_count(),
            bones = matrix.bone_count(),
            duration = matrix.duration(),
            "sampled transforms"
        );
        Ok(matrix)
    }

    /// Compresses `matrix` and wraps the blob in a container.
    pub fn encode_matrix(&self, matrix: &SampleMatrix) -> Result<Vec<u8>, AnimError> {
        let tracks = matrix.to_raw_tracks(&self.settings)?;
        tracing::info!(
            tracks = tracks.len(),
            sample_rate = matrix.sample_rate(),
            "compressing tracks"
        );
        let blob = self.codec.compress(&tracks, &self.settings)?;
        tracing::info!(size = blob.len(), "compressed blob");

        let mut bytes = Vec::new();
        let desc = write_container(
            &mut bytes,
            &blob,
            matrix.duration(),
            matrix.frame_count(),
            matrix.bone_count(),
        )?;
        tracing::debug!(?desc, "container header");
        Ok(bytes)
    }

    /// Decodes `input` and writes the flat stream next to it. Returns the output path.
    pub fn decode_file(&self, input: &Path) -> Result<PathBuf, AnimError> {
        let bytes = read_input(input)?;
        tracing::info!(path = %input.display(), size = bytes.len(), "read container");
        let matrix = self.decode_bytes(&bytes)?;

        let output = decoded_output_path(input);
        write_output(&output, |write| write_flat_stream(&matrix, write))?;
        tracing::info!(path = %output.display(), "wrote flat stream");
        Ok(output)
    }

    /// Encodes `input` and writes the container next to it. Returns the output path.
    pub fn encode_file(&self, input: &Path) -> Result<PathBuf, AnimError> {
        let bytes = read_input(input)?;
        tracing::info!(path = %input.display(), size = bytes.len(), "read flat stream");
        let matrix = read_flat_stream(&bytes)?;
        let container = self.encode_matrix(&matrix)?;

        let output = encoded_output_path(input);
        write_output(&output, |write| Ok(write.write_all(&container)?))?;
        tracing::info!(path = %output.display(), size = container.len(), "wrote container");
        Ok(output)
    }

    /// Runs `operation` on `input`.
    pub fn run(&self, operation: Operation, input: &Path) -> Result<PathBuf, AnimError> {
        match operation {
            Operation::Decode => self.decode_file(input),
            Operation::Encode => self.encode_file(input),
        }
    }
}

/// Any failure to open or read the input is reported as `FileNotFound`.
fn read_input(path: &Path) -> Result<Vec<u8>, AnimError> {
    fs::read(path).map_err(|err| {
        tracing::debug!(path = %path.display(), kind = ?err.kind(), "input not readable");
        AnimError::FileNotFound(path.to_path_buf())
    })
}

/// Streams `output` into a temporary file in the same directory and renames it
/// over `output` once `write` and the final flush succeeded. On failure the
/// temporary file is removed and `output` is left as it was.
fn write_output<F>(output: &Path, write: F) -> Result<(), AnimError>
where
    F: FnOnce(&mut BufWriter<&mut File>) -> Result<(), AnimError>,
{
    let dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temp = NamedTempFile::new_in(dir)?;
    {
        let mut buffered = BufWriter::new(temp.as_file_mut());
        write(&mut buffered)?;
        buffered.flush()?;
    }
    temp.persist(output).map_err(|err| AnimError::from(err.error))?;
    Ok(())
}

/// Decodes a complete container with the built-in codec.
pub fn decode_container_bytes(bytes: &[u8], table_offset: usize) -> Result<SampleMatrix, AnimError> {
    Converter::new(QvvCodec::new())
        .with_layout(ContainerLayout::Wrapped { table_offset })
        .decode_bytes(bytes)
}

/// Decodes a header-stripped file with the built-in codec.
pub fn decode_blob_bytes(bytes: &[u8]) -> Result<SampleMatrix, AnimError> {
    Converter::new(QvvCodec::new())
        .with_layout(ContainerLayout::BlobOnly)
        .decode_bytes(bytes)
}

/// Encodes a matrix into a container with the built-in codec.
pub fn encode_matrix(matrix: &SampleMatrix, settings: &CompressionSettings) -> Result<Vec<u8>, AnimError> {
    Converter::new(QvvCodec::new()).with_settings(*settings).encode_matrix(matrix)
}
