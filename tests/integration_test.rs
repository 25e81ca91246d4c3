use arstream::archive::{list, pack_dir, unpack};
use arstream::{
    encode_header, ArError, Decoder, DecoderOptions, Encoder, EncoderOptions, EntryReader, Header,
    MAGIC,
};
use proptest::prelude::*;
use std::fs;
use std::io::{Cursor, Read};

type Decoded = Vec<(Header, Vec<u8>)>;

/// Decode `bytes` fed in chunks whose sizes cycle through `sizes`, draining
/// every entry reader after each step.
fn decode_chunked(bytes: &[u8], sizes: &[usize], opts: DecoderOptions) -> Result<Decoded, ArError> {
    fn drain(open: &mut [(Header, EntryReader, Vec<u8>)]) {
        for (_, reader, data) in open.iter_mut() {
            reader.drain_to(data).unwrap();
        }
    }

    let mut dec = Decoder::with_options(opts);
    let mut open: Vec<(Header, EntryReader, Vec<u8>)> = Vec::new();
    let mut rest = bytes;
    for &size in sizes.iter().cycle() {
        if rest.is_empty() {
            break;
        }
        let (chunk, tail) = rest.split_at(size.clamp(1, rest.len()));
        rest = tail;
        for entry in dec.consume(chunk)? {
            let (header, reader) = entry.into_parts();
            open.push((header, reader, Vec::new()));
        }
        drain(&mut open);
        while dec.is_paused() {
            for entry in dec.resume()? {
                let (header, reader) = entry.into_parts();
                open.push((header, reader, Vec::new()));
            }
            drain(&mut open);
        }
    }
    for entry in dec.finish()? {
        let (header, reader) = entry.into_parts();
        open.push((header, reader, Vec::new()));
    }
    drain(&mut open);

    Ok(open
        .into_iter()
        .map(|(header, reader, data)| {
            assert!(reader.is_finished(), "entry {} left open", header.name);
            (header, data)
        })
        .collect())
}

fn encode(files: &[(&str, &[u8], u64)]) -> Vec<u8> {
    let mut enc = Encoder::new(Vec::new()).unwrap();
    for (name, data, mtime) in files {
        enc.add_file(*data, name, data.len() as u64, Some(*mtime)).unwrap();
    }
    enc.into_inner().unwrap()
}

fn noise(len: usize) -> Vec<u8> {
    let mut state = 0x2545_f491_u32;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            state as u8
        })
        .collect()
}

#[test]
fn test_round_trip() {
    let random = noise(1000);
    let bytes = encode(&[("a.txt", b"hello", 1_600_000_000), ("b.bin", &random[..], 1_700_000_000)]);

    let decoded = decode_chunked(&bytes, &[usize::MAX], DecoderOptions::default()).unwrap();
    assert_eq!(decoded.len(), 2);

    assert_eq!(decoded[0].0.name, "a.txt");
    assert_eq!(decoded[0].0.size, 5);
    assert_eq!(decoded[0].0.mtime, 1_600_000_000);
    assert_eq!(decoded[0].1, b"hello");

    assert_eq!(decoded[1].0.name, "b.bin");
    assert_eq!(decoded[1].0.size, 1000);
    assert_eq!(decoded[1].0.mtime, 1_700_000_000);
    assert_eq!(decoded[1].1, random);
}

#[test]
fn test_one_byte_chunks_match_single_chunk() {
    let random = noise(1000);
    let bytes = encode(&[
        ("a.txt", b"hello", 0),
        ("empty", b"", 1),
        ("b.bin", &random[..], 2),
        ("odd", b"123", 3),
    ]);

    let whole = decode_chunked(&bytes, &[usize::MAX], DecoderOptions::default()).unwrap();
    let bytewise = decode_chunked(&bytes, &[1], DecoderOptions::default()).unwrap();
    assert_eq!(whole.len(), 4);
    assert_eq!(whole, bytewise);
}

#[test]
fn test_signature_rejection() {
    let mut bytes = encode(&[("a.txt", b"hello", 0)]);
    bytes[2] = b'A';

    for sizes in [&[usize::MAX][..], &[1][..]] {
        let mut dec = Decoder::new();
        let mut entries = 0;
        let mut error = None;
        for chunk in bytes.chunks(sizes[0].min(bytes.len())) {
            match dec.consume(chunk) {
                Ok(found) => entries += found.len(),
                Err(e) => {
                    error = Some(e);
                    break;
                }
            }
        }
        assert_eq!(entries, 0);
        assert!(matches!(error, Some(ArError::InvalidSignature { .. })), "{error:?}");
    }
}

#[test]
fn test_resync_skips_inserted_bytes() {
    let mut bytes = MAGIC.to_vec();
    bytes.extend_from_slice(&encode_header("first", 0, 3));
    bytes.extend_from_slice(b"abc");
    // A damaged header: right length, bad size field.
    let mut broken = encode_header("broken", 0, 0);
    broken[48..58].copy_from_slice(b"size?     ");
    bytes.extend_from_slice(&broken);
    bytes.extend_from_slice(b"\0\0 stray padding \0");
    bytes.extend_from_slice(&encode_header("second", 9, 4));
    bytes.extend_from_slice(b"wxyz");

    for sizes in [&[usize::MAX][..], &[1][..], &[5, 61, 2][..]] {
        let decoded = decode_chunked(&bytes, sizes, DecoderOptions::default()).unwrap();
        assert_eq!(
            decoded,
            vec![
                (Header::new("first", 0, 3), b"abc".to_vec()),
                (Header::new("second", 9, 4), b"wxyz".to_vec()),
            ]
        );
    }
}

#[test]
fn test_zero_length_entry() {
    let bytes = encode(&[("nothing", b"", 5)]);
    let mut dec = Decoder::new();
    let mut entries = dec.consume(&bytes).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].header.size, 0);
    assert!(entries[0].data.is_finished());
    assert_eq!(entries[0].data.read(&mut [0u8; 8]).unwrap(), 0);
}

#[test]
fn test_writer_mutual_exclusion() {
    let mut enc = Encoder::new(Vec::new()).unwrap();
    enc.begin_file("first.txt", 6, Some(10)).unwrap();
    enc.write_data(b"fir").unwrap();

    let locked = enc.add_file(&b"intruder"[..], "second.txt", 8, Some(11));
    assert!(matches!(locked, Err(ArError::WriteLocked)));

    enc.write_data(b"st!").unwrap();
    enc.end_file().unwrap();
    enc.add_bytes("second.txt", b"after", Some(12)).unwrap();
    let bytes = enc.into_inner().unwrap();

    let decoded = decode_chunked(&bytes, &[usize::MAX], DecoderOptions::default()).unwrap();
    assert_eq!(
        decoded,
        vec![
            (Header::new("first.txt", 10, 6), b"first!".to_vec()),
            (Header::new("second.txt", 12, 5), b"after".to_vec()),
        ]
    );
}

#[test]
fn test_short_source_reads_back_truncated() {
    let mut enc = Encoder::new(Vec::new()).unwrap();
    enc.add_file(&b"abc"[..], "short", 10, Some(0)).unwrap();
    let bytes = enc.into_inner().unwrap();

    let mut dec = Decoder::new();
    let mut entries = dec.consume(&bytes).unwrap();
    assert!(dec.finish().unwrap().is_empty());
    assert_eq!(dec.summary().truncated, 1);

    let mut data = Vec::new();
    let err = entries[0].data.read_to_end(&mut data).unwrap_err();
    assert_eq!(data, b"abc");
    assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
}

#[test]
fn test_pack_dir_and_unpack() {
    let src = tempfile::tempdir().unwrap();
    fs::write(src.path().join("alpha.txt"), b"Alpha file contents").unwrap();
    fs::write(src.path().join("beta.bin"), noise(5000)).unwrap();
    fs::write(src.path().join("empty"), b"").unwrap();
    fs::create_dir(src.path().join("nested")).unwrap();
    fs::write(src.path().join("nested").join("skipped.txt"), b"not packed").unwrap();

    let mut enc = pack_dir(src.path(), Vec::new(), EncoderOptions::default()).unwrap();
    enc.close().unwrap();
    assert_eq!(enc.files(), 3);
    let bytes = enc.into_inner().unwrap();

    let headers = list(Cursor::new(&bytes), &DecoderOptions::default()).unwrap();
    let names: Vec<_> = headers.iter().map(|h| h.name.as_str()).collect();
    assert_eq!(names, ["alpha.txt", "beta.bin", "empty"]);
    assert!(headers.iter().all(|h| h.mode == 644));

    let dest = tempfile::tempdir().unwrap();
    let opts = DecoderOptions { entry_buffer: 512, read_chunk: 4096 };
    let summary = unpack(Cursor::new(&bytes), dest.path(), &opts).unwrap();
    assert_eq!(summary.entries, 3);
    assert_eq!(summary.bytes_skipped, 0);
    for name in ["alpha.txt", "beta.bin", "empty"] {
        assert_eq!(
            fs::read(dest.path().join(name)).unwrap(),
            fs::read(src.path().join(name)).unwrap(),
            "{name}"
        );
    }
    assert!(!dest.path().join("skipped.txt").exists());
}

#[test]
fn test_pack_dir_setup_errors() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing");
    let file = dir.path().join("file.txt");
    fs::write(&file, b"x").unwrap();

    let mut sink = Vec::new();
    assert!(matches!(
        pack_dir(&missing, &mut sink, EncoderOptions::default()),
        Err(ArError::Setup(_))
    ));
    assert!(matches!(
        pack_dir(&file, &mut sink, EncoderOptions::default()),
        Err(ArError::Setup(_))
    ));
    assert!(sink.is_empty(), "nothing is written before the path is checked");
}

#[test]
fn test_unpack_truncated_archive() {
    let mut bytes = encode(&[("whole", b"12345", 0), ("cut", b"0123456789", 0)]);
    bytes.truncate(bytes.len() - 5);

    let dest = tempfile::tempdir().unwrap();
    let err = unpack(Cursor::new(bytes), dest.path(), &DecoderOptions::default()).unwrap_err();
    assert!(matches!(err, ArError::Truncated { ref name, missing: 5 } if name == "cut"));
    assert_eq!(fs::read(dest.path().join("whole")).unwrap(), b"12345");
}

proptest! {
    #[test]
    fn prop_chunking_does_not_change_output(
        files in prop::collection::vec(("[a-z]{1,16}", prop::collection::vec(any::<u8>(), 0..300)), 0..6),
        sizes in prop::collection::vec(1usize..90, 1..12),
        entry_buffer in 1usize..64,
    ) {
        let mut enc = Encoder::new(Vec::new()).unwrap();
        for (name, data) in &files {
            enc.add_bytes(name, data, Some(0)).unwrap();
        }
        let bytes = enc.into_inner().unwrap();

        let whole = decode_chunked(&bytes, &[usize::MAX], DecoderOptions::default()).unwrap();
        let opts = DecoderOptions { entry_buffer, ..Default::default() };
        let chunked = decode_chunked(&bytes, &sizes, opts).unwrap();
        prop_assert_eq!(&whole, &chunked);

        let expected: Decoded = files
            .iter()
            .map(|(name, data)| (Header::new(name.clone(), 0, data.len() as u64), data.clone()))
            .collect();
        prop_assert_eq!(whole, expected);
    }
}
