mod base;
mod codec;
mod container;
mod cursor;
mod flat_stream;
mod pipeline;
mod quantize;
mod sample_matrix;
mod track;
mod track_codec;
mod transform;

pub use base::*;
pub use codec::{CompressedBlob, RoundingPolicy, TrackWriter, TransformCodec, TransformDecoder};
pub use container::{
    build_container, extract_blob_only, extract_wrapped_blob, write_container, ContainerDescriptor, BLOB_OFFSET,
    BLOB_ONLY_TRAILER, DEFAULT_TABLE_OFFSET, FOOTER, FOOTER_SIZE,
};
pub use cursor::{ByteCursor, ByteWriter};
pub use flat_stream::{flat_stream_len, read_flat_stream, write_flat_stream, FlatRead, FlatReader, FlatWrite, FLAT_HEADER_SIZE};
pub use pipeline::{
    decode_blob_bytes, decode_container_bytes, decoded_output_path, encode_matrix, encoded_output_path, ContainerLayout,
    Converter, Operation,
};
pub use quantize::{Float3Key, Float3Range, QuaternionKey};
pub use sample_matrix::{sample_time, FrameBuffer, SampleMatrix};
pub use track::{
    CompressionLevel, CompressionSettings, RawTrack, TrackDescription, TrackValue, DEFAULT_PRECISION,
    DEFAULT_SHELL_DISTANCE,
};
pub use track_codec::{ComponentFormat, QvvCodec, QvvDecoder, BLOB_HEADER_SIZE, BLOB_TAG, BLOB_VERSION};
pub use transform::{quat_angle, RigidTransform, TRANSFORM_SIZE};
