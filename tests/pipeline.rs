use pxanim::*;
use std::fs;
use tempfile::tempdir;

mod common;

#[test]
fn test_roundtrip_within_precision() {
    for (seed, frames, bones, duration) in [(1, 31, 4, 1.0), (2, 46, 12, 1.5), (3, 2, 1, 0.1), (4, 121, 3, 2.0)] {
        let source = common::random_matrix(seed, frames, bones, duration);
        let container = encode_matrix(&source, &CompressionSettings::default()).unwrap();
        let decoded = decode_container_bytes(&container, DEFAULT_TABLE_OFFSET).unwrap();
        common::assert_matrix_near(&source, &decoded, 0.001, 0.001);
    }
}

#[test]
fn test_roundtrip_lowest_level() {
    let source = common::random_matrix(5, 20, 6, 0.8);
    let highest = encode_matrix(&source, &CompressionSettings::default()).unwrap();
    let settings = CompressionSettings {
        level: CompressionLevel::Lowest,
        ..Default::default()
    };
    let lowest = encode_matrix(&source, &settings).unwrap();
    assert!(lowest.len() > highest.len());

    let decoded = decode_container_bytes(&lowest, DEFAULT_TABLE_OFFSET).unwrap();
    common::assert_matrix_near(&source, &decoded, 1e-5, 1e-4);
}

#[test]
fn test_container_consistency() {
    for bones in 1..=8 {
        let source = common::random_matrix(10 + bones as u64, 9, bones, 0.25);
        let container = encode_matrix(&source, &CompressionSettings::default()).unwrap();

        let desc = ContainerDescriptor::parse(&container).unwrap();
        desc.validate(&container).unwrap();
        assert_eq!(desc.total_size as usize, container.len());
        assert_eq!(desc.data_size as usize, container.len() - 0x10);
        assert_eq!(desc.data_size_minus_header, desc.data_size - 0x34);
        assert_eq!(desc.offset_to_end as usize, desc.blob_len as usize + 0x70 + desc.padding as usize);
        assert_eq!(desc.padding as usize, 16 - desc.blob_len as usize % 16);
        assert_eq!(desc.sample_count, 9);
        assert_eq!(desc.bone_count, bones);
        assert_eq!(desc.duration, 0.25);
        assert!((desc.sample_rate() - 32.0).abs() < 1e-4);

        let pad_start = BLOB_OFFSET + desc.blob_len as usize;
        assert!(container[pad_start..pad_start + desc.padding as usize].iter().all(|b| *b == 0));
        assert_eq!(container.len() % 16, FOOTER_SIZE);
    }
}

#[test]
fn test_blob_only_matches_wrapped() {
    let source = common::random_matrix(20, 25, 5, 0.75);
    let container = encode_matrix(&source, &CompressionSettings::default()).unwrap();
    let stripped = common::blob_only_file(&container);

    let wrapped = decode_container_bytes(&container, DEFAULT_TABLE_OFFSET).unwrap();
    let blob_only = decode_blob_bytes(&stripped).unwrap();
    assert_eq!(wrapped, blob_only);
}

#[test]
fn test_decode_errors() {
    let source = common::random_matrix(30, 5, 2, 0.5);
    let container = encode_matrix(&source, &CompressionSettings::default()).unwrap();

    let err = decode_container_bytes(&container[..0x60], DEFAULT_TABLE_OFFSET).unwrap_err();
    assert!(err.is_malformed_container());

    let err = decode_container_bytes(&container[..container.len() / 2], DEFAULT_TABLE_OFFSET).unwrap_err();
    assert!(err.is_malformed_container());

    let mut bad = container.clone();
    bad[BLOB_OFFSET + 4] = b'?';
    let err = decode_container_bytes(&bad, DEFAULT_TABLE_OFFSET).unwrap_err();
    assert!(err.is_codec_init_failure());

    let err = decode_blob_bytes(&container[..0xB0]).unwrap_err();
    assert!(err.is_malformed_container());

    // A full container read as header-stripped loses the end of its blob.
    let err = decode_blob_bytes(&container).unwrap_err();
    assert!(err.is_codec_init_failure());
}

#[test]
fn test_last_frame_time() {
    for (frames, duration) in [(2, 0.1), (31, 1.0), (46, 1.5), (7, 0.3333)] {
        let source = common::random_matrix(40, frames, 1, duration);
        let container = encode_matrix(&source, &CompressionSettings::default()).unwrap();
        let blob = extract_wrapped_blob(&container, DEFAULT_TABLE_OFFSET).unwrap();
        let decoder = QvvCodec::new().initialize(&blob).unwrap();
        let last = sample_time(frames - 1, decoder.sample_rate(), decoder.duration());
        assert!(last <= decoder.duration());
        assert!((decoder.duration() - duration).abs() < 1e-5);
    }
}

#[test]
fn test_file_roundtrip() {
    let dir = tempdir().unwrap();
    let flat_path = dir.path().join("walk.outanim");
    let source = common::random_matrix(50, 16, 3, 0.5);
    let mut flat = Vec::new();
    write_flat_stream(&source, &mut flat).unwrap();
    fs::write(&flat_path, &flat).unwrap();

    let converter = Converter::new(QvvCodec::new());
    let container_path = converter.run(Operation::Encode, &flat_path).unwrap();
    assert_eq!(container_path, dir.path().join("walk.anm.pxd"));
    let container = fs::read(&container_path).unwrap();
    ContainerDescriptor::parse(&container).unwrap().validate(&container).unwrap();

    fs::remove_file(&flat_path).unwrap();
    let output = converter.run(Operation::Decode, &container_path).unwrap();
    assert_eq!(output, flat_path);
    let decoded = read_flat_stream(&fs::read(&output).unwrap()).unwrap();
    common::assert_matrix_near(&source, &decoded, 0.001, 0.001);
}

#[test]
fn test_file_errors_leave_no_output() {
    let dir = tempdir().unwrap();
    let flat_path = dir.path().join("broken.outanim");
    let source = common::random_matrix(60, 4, 2, 0.2);
    let mut flat = Vec::new();
    write_flat_stream(&source, &mut flat).unwrap();
    fs::write(&flat_path, &flat[..flat.len() - 4]).unwrap();

    let converter = Converter::new(QvvCodec::new());
    let err = converter.encode_file(&flat_path).unwrap_err();
    assert!(matches!(
        err,
        AnimError::TruncatedStream {
            expected: 332,
            actual: 328
        }
    ));
    assert!(!dir.path().join("broken.anm.pxd").exists());

    let container_path = dir.path().join("bad.anm.pxd");
    fs::write(&container_path, [0u8; 0x40]).unwrap();
    let err = converter.decode_file(&container_path).unwrap_err();
    assert!(err.is_malformed_container());
    assert!(!dir.path().join("bad.outanim").exists());

    let err = converter.decode_file(&dir.path().join("missing.pxd")).unwrap_err();
    assert!(err.is_file_not_found());
}

/// Codec that stores every sample as raw floats and refuses to compress on demand.
mod raw_codec {
    use pxanim::*;

    pub struct RawCodec {
        pub refuse: bool,
    }

    pub struct RawDecoder {
        sample_rate: f32,
        samples: Vec<Vec<RigidTransform>>,
        frame: usize,
    }

    impl TransformDecoder for RawDecoder {
        fn sample_rate(&self) -> f32 {
            self.sample_rate
        }

        fn duration(&self) -> f32 {
            (self.num_samples() - 1) as f32 / self.sample_rate
        }

        fn num_samples(&self) -> u32 {
            self.samples.first().map(|s| s.len()).unwrap_or(0) as u32
        }

        fn bone_count(&self) -> u32 {
            self.samples.len() as u32
        }

        fn seek(&mut self, time: f32, _rounding: RoundingPolicy) {
            self.frame = (time * self.sample_rate).round() as usize;
        }

        fn decode_into(&self, writer: &mut dyn TrackWriter) {
            for (bone, samples) in self.samples.iter().enumerate() {
                let t = samples[self.frame];
                writer.write_rotation(bone as u32, t.rotation);
                writer.write_translation(bone as u32, t.translation);
                writer.write_scale(bone as u32, t.scale);
            }
        }
    }

    impl TransformCodec for RawCodec {
        type Decoder = RawDecoder;

        fn initialize(&self, blob: &CompressedBlob) -> Result<RawDecoder, AnimError> {
            let mut cursor = ByteCursor::new(blob.as_bytes());
            let _size = cursor.read_u32()?;
            let sample_rate = cursor.read_f32()?;
            let bones = cursor.read_u32()?;
            let frames = cursor.read_u32()?;
            let mut samples = Vec::new();
            for _ in 0..bones {
                let mut track = Vec::new();
                for _ in 0..frames {
                    let mut values = [0.0; 10];
                    for v in values.iter_mut() {
                        *v = cursor.read_f32()?;
                    }
                    track.push(RigidTransform::from_array(values));
                }
                samples.push(track);
            }
            Ok(RawDecoder {
                sample_rate,
                samples,
                frame: 0,
            })
        }

        fn compress(&self, tracks: &[RawTrack], _settings: &CompressionSettings) -> Result<CompressedBlob, AnimError> {
            if self.refuse {
                return Err(AnimError::CompressFailure("raw codec refused the batch".into()));
            }
            let mut writer = ByteWriter::new();
            writer.put_u32(0);
            writer.put_f32(tracks[0].sample_rate());
            writer.put_u32(tracks.len() as u32);
            writer.put_u32(tracks[0].num_samples() as u32);
            for track in tracks {
                for sample in track.samples() {
                    sample.to_array().iter().for_each(|v| writer.put_f32(*v));
                }
            }
            let size = writer.len() as u32;
            writer.patch_u32(0, size);
            Ok(CompressedBlob::new(writer.into_inner()))
        }
    }
}

#[test]
fn test_custom_codec() {
    let source = common::random_matrix(70, 10, 3, 0.9);
    let converter = Converter::new(raw_codec::RawCodec { refuse: false });
    let container = converter.encode_matrix(&source).unwrap();
    ContainerDescriptor::parse(&container).unwrap().validate(&container).unwrap();

    let decoded = converter.decode_bytes(&container).unwrap();
    assert_eq!(decoded.transforms(), source.transforms());

    let refusing = Converter::new(raw_codec::RawCodec { refuse: true });
    let err = refusing.encode_matrix(&source).unwrap_err();
    assert_eq!(err.to_string(), "Failed to compress anim: raw codec refused the batch");
}
