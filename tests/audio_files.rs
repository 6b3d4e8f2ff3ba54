mod common;

use common::{Fixture, REFERENCE, SAMPLE_RATE};
use offline_stt::EngineError;
use std::io::BufWriter;

#[test]
fn higher_rate_file_is_resampled() {
    let fixture = Fixture::new();
    let path = fixture.write_wav(
        "reference_32k.wav",
        common::synthesize_at(REFERENCE, SAMPLE_RATE * 2),
        SAMPLE_RATE * 2,
    );

    let session = fixture.session();
    assert_eq!(session.process_file(&path).unwrap(), REFERENCE);
}

#[test]
fn out_of_band_content_is_filtered_when_resampling() {
    let fixture = Fixture::new();
    let rate = SAMPLE_RATE * 3;
    // 12 kHz is above the model's 8 kHz Nyquist; folded back it would land on the 4 kHz "Q" tone
    let hiss: Vec<i16> = (0..rate as usize)
        .map(|n| (6000.0 * (2.0 * std::f32::consts::PI * 12000.0 * n as f32 / rate as f32).sin()) as i16)
        .collect();
    let mixed: Vec<i16> = common::synthesize_at("WE ARE GLAD", rate)
        .iter()
        .zip(hiss.iter().cycle())
        .map(|(&speech, &noise)| speech.saturating_add(noise))
        .collect();
    let path = fixture.write_wav("hiss_48k.wav", mixed, rate);

    assert_eq!(fixture.session().process_file(&path).unwrap(), "WE ARE GLAD");
}

#[test]
fn lower_rate_file_is_rejected() {
    let fixture = Fixture::new();
    let half: Vec<i16> = fixture.samples.iter().step_by(2).copied().collect();
    let path = fixture.write_wav("reference_8k.wav", half, SAMPLE_RATE / 2);

    let err = fixture.session().process_file(&path).unwrap_err();
    assert!(matches!(err, EngineError::InvalidAudioFormat(_)));
}

#[test]
fn stereo_file_is_rejected() {
    let fixture = Fixture::new();
    let path = fixture.path("stereo.wav");
    let interleaved: Vec<i16> = fixture.samples.iter().flat_map(|&s| [s, s]).collect();
    let header = wav::Header::new(wav::header::WAV_FORMAT_PCM, 2, SAMPLE_RATE, 16);
    let mut writer = BufWriter::new(std::fs::File::create(&path).unwrap());
    wav::write(header, &wav::BitDepth::Sixteen(interleaved), &mut writer).unwrap();
    drop(writer);

    let err = fixture.session().process_file(&path).unwrap_err();
    assert!(matches!(err, EngineError::InvalidAudioFormat(_)));
}

#[test]
fn missing_file_is_reported() {
    let fixture = Fixture::new();
    let path = fixture.path("missing.wav");

    let err = fixture.session().process_file(&path).unwrap_err();
    assert!(matches!(err, EngineError::FileNotFound(ref p) if *p == path));
    assert!(err.is_input_error());
}

#[test]
fn compressed_extension_is_unsupported() {
    let fixture = Fixture::new();
    let path = fixture.path("utterance.mp3");
    std::fs::write(&path, b"ID3\x03\x00\x00\x00").unwrap();

    let err = fixture.session().process_file(&path).unwrap_err();
    match err {
        EngineError::UnsupportedFileFormat(message) => {
            assert_eq!(message, "Specified file with extension '.mp3' is not supported")
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn garbage_wav_is_unsupported() {
    let fixture = Fixture::new();
    let path = fixture.path("noise.wav");
    std::fs::write(&path, vec![0x5Au8; 256]).unwrap();

    let err = fixture.session().process_file(&path).unwrap_err();
    assert!(matches!(err, EngineError::UnsupportedFileFormat(_)));
}

#[test]
fn float_wav_decodes() {
    let fixture = Fixture::new();
    let path = fixture.path("float.wav");
    let floats: Vec<f32> = fixture.samples.iter().map(|&s| s as f32 / i16::MAX as f32).collect();
    let header = wav::Header::new(wav::header::WAV_FORMAT_IEEE_FLOAT, 1, SAMPLE_RATE, 32);
    let mut writer = BufWriter::new(std::fs::File::create(&path).unwrap());
    wav::write(header, &wav::BitDepth::ThirtyTwoFloat(floats), &mut writer).unwrap();
    drop(writer);

    assert_eq!(fixture.session().process_file(&path).unwrap(), REFERENCE);
}
