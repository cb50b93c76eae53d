use gsla::{
    decode_frame, decode_stream, encode_delta_frame, encode_initial_frame, gsla_info,
    opcode::{Opcode, BANK_SIZE, MAX_DICTIONARY_OFFSET},
    CanvasGeometry, DecodeError, Decoder, Encoder, EncoderSettings, FrameEncoder, GslaError,
    Terminator,
};
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Follow a stream the way the player does, checking that no command straddles a bank.
/// Returns the commands and the position just past the terminator.
fn walk(file: &[u8], start: usize) -> (Vec<Opcode>, usize) {
    let mut ops = Vec::new();
    let mut pos = start;

    loop {
        let op = Opcode::parse(file, pos).unwrap();
        let len = op.wire_len();
        assert_eq!(
            pos / BANK_SIZE,
            (pos + len - 1) / BANK_SIZE,
            "{} at {:06x} crosses a bank",
            op,
            pos
        );
        ops.push(op);

        match op {
            Opcode::BankSkip => pos = (pos / BANK_SIZE + 1) * BANK_SIZE,
            Opcode::EndOfFrame | Opcode::EndOfAnimation => return (ops, pos + len),
            _ => pos += len,
        }
    }
}

fn random_frame(rng: &mut StdRng, len: usize) -> Vec<u8> {
    let mut frame = vec![0u8; len];
    rng.fill(&mut frame[..]);
    frame
}

/// Runs of random colors with some noise, closer to real artwork than pure noise
fn painted_frame(rng: &mut StdRng, len: usize) -> Vec<u8> {
    let mut frame = Vec::with_capacity(len);
    while frame.len() < len {
        let run = rng.gen_range(1..64);
        let color: u8 = rng.gen_range(0..16);
        frame.extend(std::iter::repeat(color * 0x11).take(run));
        if rng.gen_bool(0.2) {
            frame.push(rng.gen());
        }
    }
    frame.truncate(len);
    frame
}

fn decode_initial(stream: &[u8], len: usize) -> Vec<u8> {
    let mut canvas = vec![0u8; len];
    let end = decode_stream(stream, &mut canvas).unwrap();
    assert_eq!(end.terminator, Terminator::EndOfAnimation);
    assert_eq!(end.consumed, stream.len());
    canvas
}

fn decode_delta(stream: &[u8], prior: &[u8]) -> Vec<u8> {
    let mut canvas = prior.to_vec();
    let end = decode_stream(stream, &mut canvas).unwrap();
    assert_eq!(end.terminator, Terminator::EndOfFrame);
    assert_eq!(end.consumed, stream.len());
    canvas
}

#[test]
fn decode_fixture() {
    let file = include_bytes!("loop.gsla");
    let animation = Decoder::for_bytes(file).decode().unwrap();

    assert_eq!(animation.width_bytes(), 4);
    assert_eq!(animation.height(), 2);
    assert_eq!(animation.frame_count(), 3);
    assert_eq!(
        animation.frames(),
        &[vec![5u8; 8], vec![5, 5, 7, 8, 5, 5, 5, 5]]
    );
    assert_eq!(animation.ring_frame(), Some(&[5u8; 8][..]));
}

#[test]
fn fixture_chunk_table() {
    let info = gsla_info(include_bytes!("loop.gsla")).unwrap();
    let tags: Vec<&str> = info.chunks.iter().map(|c| c.tag_str()).collect();

    assert_eq!(tags, ["INIT", "NOTE", "ANIM"]);
    assert!(info.header.has_ring_frame());
    assert_eq!(info.header.frame_size, 8);
}

#[test]
fn decode_bad_file() {
    let bad_file = include_bytes!("bad-stream.gsla");

    match Decoder::for_bytes(bad_file).decode() {
        Ok(result) => {
            eprintln!("{:?}", result);
            panic!("Expected error when decoding bad file");
        }
        Err(err) => {
            eprintln!("{}", err);
            assert!(matches!(
                err,
                GslaError::Frame {
                    frame: 1,
                    source: DecodeError::ReservedOpcode {
                        offset: 63,
                        word: 0x0004
                    }
                }
            ));
        }
    };
}

#[test]
fn corrupt_fixtures_are_rejected() {
    let file = include_bytes!("loop.gsla").to_vec();

    // INIT copy of 8 bytes after a 1 byte literal
    let mut bad = file.clone();
    bad[31] = 0x0E;
    assert!(matches!(
        Decoder::for_bytes(&bad).decode(),
        Err(GslaError::Frame {
            frame: 0,
            source: DecodeError::CanvasOverrun { cursor: 1, len: 8, .. }
        })
    ));

    // INIT ending with end of frame
    let mut bad = file.clone();
    bad[35] = 0x02;
    assert!(matches!(
        Decoder::for_bytes(&bad).decode(),
        Err(GslaError::UnexpectedTerminator { frame: 0, .. })
    ));

    let mut bad = file.clone();
    bad[20] = b'X';
    assert!(matches!(
        Decoder::for_bytes(&bad).decode(),
        Err(GslaError::MissingChunk("INIT"))
    ));

    let mut bad = file.clone();
    bad.truncate(60);
    assert!(matches!(
        Decoder::for_bytes(&bad).decode(),
        Err(GslaError::LengthMismatch {
            expected: 73,
            actual: 60
        })
    ));

    // one frame more than the ANIM chunk holds
    let mut bad = file.clone();
    bad[16] = 4;
    assert!(matches!(
        Decoder::for_bytes(&bad).decode(),
        Err(GslaError::UnexpectedTerminator { frame: 2, .. })
    ));

    // far more frames than the file has room for
    let mut bad = file.clone();
    bad[16..20].copy_from_slice(&[0xFF; 4]);
    assert!(matches!(
        Decoder::for_bytes(&bad).decode(),
        Err(GslaError::BadFrameCount(u32::MAX))
    ));

    // INIT copy of 6 bytes leaves the last canvas byte unwritten
    let mut bad = file.clone();
    bad[31] = 0x0A;
    assert!(matches!(
        Decoder::for_bytes(&bad).decode(),
        Err(GslaError::BadChunk { offset: 20, .. })
    ));

    // a spare word after the final end of animation
    let mut bad = file;
    bad.extend_from_slice(&[0x02, 0x00]);
    bad[4] = 75;
    bad[53] = 0x1A;
    assert!(matches!(
        Decoder::for_bytes(&bad).decode(),
        Err(GslaError::BadChunk { offset: 49, .. })
    ));
}

#[test]
fn still_image_with_huge_frame_count() {
    let mut file = Encoder::for_frames(&[[1u8, 2, 3, 4]]).encode_to_vec().unwrap();
    file[16..20].copy_from_slice(&[0xFF; 4]);

    match Decoder::for_bytes(&file).decode() {
        Ok(result) => panic!("Expected error, decoded {} frames", result.frame_count()),
        Err(err) => assert!(matches!(err, GslaError::BadFrameCount(0xFFFF_FFFF))),
    }
}

#[test]
fn initial_frame_scenario() {
    let stream = encode_initial_frame(&[0, 0, 0, 0]).unwrap();
    let (ops, end) = walk(&stream, 0);

    assert_eq!(ops, [Opcode::Literal(4), Opcode::EndOfAnimation]);
    assert_eq!(end, stream.len());
    assert_eq!(decode_initial(&stream, 4), [0, 0, 0, 0]);
}

#[test]
fn identical_frames_encode_to_end_of_frame() {
    assert_eq!(encode_delta_frame(&[1, 2, 3, 4], &[1, 2, 3, 4]).unwrap(), [0x02, 0x00]);

    let mut rng = StdRng::seed_from_u64(7);
    let frame = random_frame(&mut rng, 3000);
    let stream = encode_delta_frame(&frame, &frame).unwrap();

    assert_eq!(stream, [0x02, 0x00]);
    assert_eq!(decode_delta(&stream, &frame), frame);
}

#[test]
fn changed_tail_scenario() {
    let prior = [0u8; 8];
    let next = [0, 0, 0, 0, 9, 9, 9, 9];
    let stream = encode_delta_frame(&next, &prior).unwrap();

    assert_eq!(decode_delta(&stream, &prior), next);
}

#[test]
fn single_color_compresses_to_copies() {
    let canvas = vec![0x11u8; 32000];
    let stream = encode_initial_frame(&canvas).unwrap();
    let (ops, _) = walk(&stream, 0);

    assert!(stream.len() < 16, "{} bytes", stream.len());
    assert_eq!(ops[0], Opcode::Literal(1));
    assert!(ops[1..ops.len() - 1]
        .iter()
        .all(|op| matches!(op, Opcode::Copy { .. })));
    assert_eq!(decode_initial(&stream, canvas.len()), canvas);
}

#[test]
fn repeating_pattern_compresses() {
    let canvas: Vec<u8> = (0..16000).map(|i| [0x12, 0x34, 0x56][i % 3]).collect();
    let stream = encode_initial_frame(&canvas).unwrap();

    assert!(stream.len() < 32, "{} bytes", stream.len());
    assert_eq!(decode_initial(&stream, canvas.len()), canvas);
}

#[test]
fn initial_round_trip() {
    let mut rng = StdRng::seed_from_u64(0x6517);

    for &len in &[1, 2, 3, 5, 17, 255, 1024, 4001] {
        let noise = random_frame(&mut rng, len);
        let stream = encode_initial_frame(&noise).unwrap();
        assert_eq!(decode_initial(&stream, len), noise, "noise of {} bytes", len);

        let painted = painted_frame(&mut rng, len);
        let stream = encode_initial_frame(&painted).unwrap();
        assert_eq!(decode_initial(&stream, len), painted, "painting of {} bytes", len);
    }
}

#[test]
fn delta_round_trip() {
    let mut rng = StdRng::seed_from_u64(0xDE17A);

    for _ in 0..20 {
        let len = rng.gen_range(1..3000);
        let prior = painted_frame(&mut rng, len);

        // scattered edits, with gaps around the tolerance
        let mut sparse = prior.clone();
        for _ in 0..rng.gen_range(0..40) {
            let at = rng.gen_range(0..len);
            sparse[at] = rng.gen();
        }
        let stream = encode_delta_frame(&sparse, &prior).unwrap();
        assert_eq!(decode_delta(&stream, &prior), sparse);

        let repainted = painted_frame(&mut rng, len);
        let stream = encode_delta_frame(&repainted, &prior).unwrap();
        assert_eq!(decode_delta(&stream, &prior), repainted);

        let noise = random_frame(&mut rng, len);
        let stream = encode_delta_frame(&noise, &prior).unwrap();
        assert_eq!(decode_delta(&stream, &prior), noise);
    }
}

#[test]
fn moved_content_is_copied_from_the_prior_frame() {
    let mut rng = StdRng::seed_from_u64(3);
    let prior = random_frame(&mut rng, 2048);
    let mut next = prior.clone();
    // scroll the second half up by 100 bytes
    next.copy_within(1124..2048, 1024);

    let stream = encode_delta_frame(&next, &prior).unwrap();
    let (ops, _) = walk(&stream, 0);

    assert!(ops.iter().any(|op| matches!(op, Opcode::Copy { .. })));
    assert!(stream.len() < 100, "{} bytes", stream.len());
    assert_eq!(decode_delta(&stream, &prior), next);
}

#[test]
fn gap_tolerance_changes_the_stream_not_the_frame() {
    let prior = vec![0u8; 64];
    let mut next = prior.clone();
    for i in (0..64).step_by(3) {
        next[i] = 0xAA;
    }

    let tight = FrameEncoder::new(EncoderSettings::new(0, 4, 4096));
    let loose = FrameEncoder::default();
    let a = tight
        .encode(&next, Some(&prior[..]), 0, Terminator::EndOfFrame)
        .unwrap();
    let b = loose
        .encode(&next, Some(&prior[..]), 0, Terminator::EndOfFrame)
        .unwrap();

    assert_ne!(a, b);
    assert!(walk(&a, 0).0.iter().any(|op| matches!(op, Opcode::Skip(_))));
    assert!(!walk(&b, 0).0.iter().any(|op| matches!(op, Opcode::Skip(_))));
    assert_eq!(decode_delta(&a, &prior), next);
    assert_eq!(decode_delta(&b, &prior), next);
}

#[test]
fn streams_respect_bank_boundaries() {
    let mut rng = StdRng::seed_from_u64(0xBA4C);
    let encoder = FrameEncoder::default();
    let mut skips = 0;

    for offset in (BANK_SIZE - 40..BANK_SIZE).filter(|o| BANK_SIZE - o != 1) {
        let pixels = random_frame(&mut rng, 96);
        let stream = encoder
            .encode(&pixels, None, offset, Terminator::EndOfAnimation)
            .unwrap();

        // place the stream where it will sit in the file
        let mut file = vec![0xEE; offset];
        file.extend_from_slice(&stream);

        let (ops, end) = walk(&file, offset);
        assert_eq!(end, file.len());
        skips += ops.iter().filter(|&&op| op == Opcode::BankSkip).count();

        let mut canvas = vec![0u8; pixels.len()];
        decode_frame(&file, offset, &mut canvas).unwrap();
        assert_eq!(canvas, pixels);
    }
    assert!(skips > 0);
}

#[test]
fn streams_cannot_start_one_byte_before_a_bank() {
    let result = FrameEncoder::default().encode(&[1, 2], None, BANK_SIZE - 1, Terminator::EndOfFrame);
    assert!(matches!(result, Err(GslaError::UnalignedStream(_))));
}

#[test]
fn animation_across_banks() {
    let mut rng = StdRng::seed_from_u64(0xA141);
    let frames: Vec<Vec<u8>> = (0..40).map(|_| random_frame(&mut rng, 2048)).collect();

    let file = Encoder::for_frames(&frames)
        .geometry(CanvasGeometry::new(64, 32))
        .encode_to_vec()
        .unwrap();
    assert!(file.len() > BANK_SIZE);

    let info = gsla_info(&file).unwrap();
    assert_eq!(info.header.frame_count, 41);

    // every stream in the file keeps to its banks
    let init = info.chunk(b"INIT").unwrap();
    walk(&file, init.data_offset());
    let anim = info.chunk(b"ANIM").unwrap();
    let mut pos = anim.data_offset();
    let mut skips = 0;
    for frame in 1..41 {
        let (ops, end) = walk(&file, pos);
        let last = if frame == 40 {
            Opcode::EndOfAnimation
        } else {
            Opcode::EndOfFrame
        };
        assert_eq!(ops.last(), Some(&last));
        skips += ops.iter().filter(|&&op| op == Opcode::BankSkip).count();
        pos = end;
    }
    assert_eq!(pos, anim.end());
    assert!(skips > 0);

    let animation = Decoder::for_bytes(&file).decode().unwrap();
    assert_eq!(animation.frames(), &frames[..]);
    assert_eq!(animation.ring_frame(), Some(&frames[0][..]));
}

#[test]
fn full_bank_canvas_round_trip() {
    let mut rng = StdRng::seed_from_u64(0xF000);
    // only the top of the canvas, past the furthest copy source, is noisy
    let mut prior = vec![0u8; 0x10000];
    rng.fill(&mut prior[0xE000..]);
    let mut next = prior.clone();
    next.copy_within(0xF000..0xF400, 0);

    let stream = encode_delta_frame(&next, &prior).unwrap();
    assert_eq!(decode_delta(&stream, &prior), next);

    let frames = [prior, next];
    let file = Encoder::for_frames(&frames).encode_to_vec().unwrap();
    assert_eq!(&file[14..16], &[0, 0]);

    let info = gsla_info(&file).unwrap();
    let mut streams = vec![walk(&stream, 0).0, walk(&file, info.chunk(b"INIT").unwrap().data_offset()).0];
    let mut pos = info.chunk(b"ANIM").unwrap().data_offset();
    for _ in 0..2 {
        let (ops, end) = walk(&file, pos);
        streams.push(ops);
        pos = end;
    }
    for op in streams.iter().flatten() {
        if let Opcode::Copy { offset, .. } = *op {
            assert!(offset <= MAX_DICTIONARY_OFFSET, "{}", op);
        }
    }

    let animation = Decoder::for_bytes(&file).decode().unwrap();
    assert_eq!(animation.frame_size(), 0x10000);
    assert_eq!((animation.width_bytes(), animation.height()), (256, 256));
    assert_eq!(animation.frames(), &frames[..]);
    assert_eq!(animation.ring_frame(), Some(&frames[0][..]));
}

#[test]
fn ring_frame_is_optional() {
    let mut rng = StdRng::seed_from_u64(11);
    let frames: Vec<Vec<u8>> = (0..3).map(|_| painted_frame(&mut rng, 4000)).collect();

    let file = Encoder::for_frames(&frames)
        .settings(EncoderSettings::default().without_ring_frame())
        .encode_to_vec()
        .unwrap();
    let animation = Decoder::for_bytes(&file).decode().unwrap();

    assert!(!animation.has_ring_frame());
    assert_eq!(animation.frame_count(), 3);
    assert_eq!(animation.ring_frame(), None);
    assert_eq!(animation.into_frames(), frames);
}

#[test]
fn single_frame_is_a_still_image() {
    let frame = vec![0x42u8; 32000];
    let file = Encoder::for_frames(&[&frame]).encode_to_vec().unwrap();

    let info = gsla_info(&file).unwrap();
    assert_eq!(info.header.frame_count, 1);
    assert!(!info.header.has_ring_frame());
    assert!(info.chunk(b"ANIM").is_none());
    assert_eq!(info.header.geometry, CanvasGeometry::SUPER_HIRES);

    let animation = Decoder::for_bytes(&file).decode().unwrap();
    assert_eq!(animation.frames(), &[frame]);
}

#[test]
fn save_and_load() {
    let mut rng = StdRng::seed_from_u64(5);
    let frames: Vec<Vec<u8>> = (0..4).map(|_| painted_frame(&mut rng, 6000)).collect();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("painted.gsla");
    gsla::save(&path, &frames).unwrap();

    let animation = gsla::load(&path).unwrap();
    assert_eq!((animation.width_bytes(), animation.height()), (6000, 1));
    assert_eq!(animation.frames(), &frames[..]);
    assert_eq!(animation.canvas(4), Some(&frames[0][..]));

    let mut log = Vec::new();
    {
        let mut decoder = Decoder::for_file(&path).unwrap();
        assert_eq!(decoder.header().unwrap().frame_count, 5);
        decoder.with_logging(&mut log).decode().unwrap();
    }
    assert!(String::from_utf8(log).unwrap().contains("Frame 4"));
}

#[test]
fn encoder_rejects_bad_input() {
    let none: [Vec<u8>; 0] = [];
    assert!(matches!(
        Encoder::for_frames(&none).encode_to_vec(),
        Err(GslaError::NoFrames)
    ));

    let uneven = [vec![0u8; 16], vec![0u8; 15]];
    assert!(matches!(
        Encoder::for_frames(&uneven).encode_to_vec(),
        Err(GslaError::FrameSizeMismatch {
            expected: 16,
            actual: 15
        })
    ));

    let frames = [vec![0u8; 16]];
    assert!(matches!(
        Encoder::for_frames(&frames)
            .geometry(CanvasGeometry::new(5, 3))
            .encode_to_vec(),
        Err(GslaError::BadGeometry { .. })
    ));

    assert!(matches!(
        encode_delta_frame(&[1, 2, 3], &[1, 2]),
        Err(GslaError::FrameSizeMismatch { .. })
    ));

    let mut small = [0u8; 4];
    let result = FrameEncoder::default().encode_into(
        &[1, 2, 3, 4],
        None,
        0,
        Terminator::EndOfAnimation,
        &mut small,
    );
    assert!(matches!(
        result,
        Err(GslaError::OutputBufferTooSmall {
            needed: 8,
            available: 4
        })
    ));

    let mut roomy = [0u8; 16];
    let written = FrameEncoder::default()
        .encode_into(&[1, 2, 3, 4], None, 0, Terminator::EndOfAnimation, &mut roomy)
        .unwrap();
    assert_eq!(&roomy[..written], &[0x07, 0x00, 1, 2, 3, 4, 0x06, 0x00]);
}
