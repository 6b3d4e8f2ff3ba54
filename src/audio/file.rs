//! # Audio File Input
//!
//! Reads an uncompressed RIFF/WAVE file for `process_file`, converting any
//! supported sample encoding to 16-bit PCM at the model rate.
//!
//! ## Accepted input:
//! - **Container**: RIFF/WAVE (`.wav`, `.wave`, or no extension)
//! - **Encoding**: 8/16/24-bit integer PCM or 32-bit float
//! - **Channels**: mono only
//! - **Sample rate**: equal to or greater than the model rate (higher rates are resampled)

use crate::audio::processor::{i16_to_f32, PcmBuffer};
use crate::error::{EngineError, EngineResult};
use rubato::{Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Extensions that are readable by this module.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["wav", "wave"];

/// Compressed formats that are commonly thrown at the engine but need a
/// decoder this crate does not carry.
const COMPRESSED_EXTENSIONS: &[&str] = &["flac", "mp3", "ogg", "opus", "vorbis", "webm", "m4a", "aac"];

/// Input frames per resampler call.
const RESAMPLE_CHUNK: usize = 1024;

/// Read a WAV file and bring it to `target_rate`.
///
/// ## Errors:
/// - **FileNotFound**: nothing exists at `path`
/// - **UnsupportedFileFormat**: compressed extension, or the bytes are not a readable RIFF/WAVE
/// - **InvalidAudioFormat**: more than one channel, or a rate below `target_rate`
pub fn read_wav_file(path: &Path, target_rate: u32) -> EngineResult<PcmBuffer> {
    if !path.is_file() {
        return Err(EngineError::FileNotFound(path.to_path_buf()));
    }

    if let Some(extension) = path.extension().and_then(|e| e.to_str()) {
        if COMPRESSED_EXTENSIONS.contains(&extension.to_lowercase().as_str()) {
            return Err(EngineError::UnsupportedFileFormat(format!(
                "Specified file with extension '.{}' is not supported",
                extension
            )));
        }
    }

    let file = File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            EngineError::FileNotFound(path.to_path_buf())
        } else {
            EngineError::UnsupportedFileFormat(format!("cannot read '{}': {}", path.display(), e))
        }
    })?;

    let mut reader = BufReader::new(file);
    let (header, data) = wav::read(&mut reader).map_err(|e| {
        EngineError::UnsupportedFileFormat(format!(
            "'{}' is not a readable WAV file: {}",
            path.display(),
            e
        ))
    })?;

    if header.channel_count != 1 {
        return Err(EngineError::InvalidAudioFormat(format!(
            "expected mono audio, got {} channels",
            header.channel_count
        )));
    }

    let samples = to_i16(data)?;
    let source_rate = header.sampling_rate;

    if source_rate < target_rate {
        return Err(EngineError::InvalidAudioFormat(format!(
            "file sample rate {} Hz is below the required {} Hz",
            source_rate, target_rate
        )));
    }

    if source_rate > target_rate {
        tracing::debug!(source_rate, target_rate, "resampling audio file");
        return Ok(PcmBuffer::new(resample(&samples, source_rate, target_rate)?, target_rate));
    }

    Ok(PcmBuffer::new(samples, source_rate))
}

/// Write a mono 16-bit PCM WAV file.
pub fn write_wav_file(path: &Path, audio: &PcmBuffer) -> EngineResult<()> {
    let file = File::create(path).map_err(|e| {
        EngineError::InvalidAudioFormat(format!("cannot create '{}': {}", path.display(), e))
    })?;
    let mut writer = BufWriter::new(file);

    let header = wav::Header::new(wav::header::WAV_FORMAT_PCM, 1, audio.sample_rate(), 16);
    let data = wav::BitDepth::Sixteen(audio.samples().to_vec());
    wav::write(header, &data, &mut writer)
        .and_then(|_| writer.flush())
        .map_err(|e| {
            EngineError::InvalidAudioFormat(format!("cannot write '{}': {}", path.display(), e))
        })
}

fn to_i16(data: wav::BitDepth) -> EngineResult<Vec<i16>> {
    let samples = match data {
        wav::BitDepth::Eight(samples) => samples
            .into_iter()
            .map(|s| ((s as i16) - 128) << 8)
            .collect(),
        wav::BitDepth::Sixteen(samples) => samples,
        wav::BitDepth::TwentyFour(samples) => samples.into_iter().map(|s| (s >> 8) as i16).collect(),
        wav::BitDepth::ThirtyTwoFloat(samples) => samples
            .into_iter()
            .map(|s| (s.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16)
            .collect(),
        wav::BitDepth::Empty => {
            return Err(EngineError::UnsupportedFileFormat(
                "WAV file has no sample data".to_string(),
            ))
        }
    };
    Ok(samples)
}

/// Band-limited downsampling with a windowed sinc filter.
///
/// Output has `ceil(len * target / source)` samples, aligned with the input:
/// the filter's group delay is trimmed from the front and the tail is
/// flushed with zeros.
pub fn resample(samples: &[i16], source_rate: u32, target_rate: u32) -> EngineResult<Vec<i16>> {
    if source_rate == target_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let ratio = f64::from(target_rate) / f64::from(source_rate);
    let resample_error = |reason: String| {
        EngineError::InvalidAudioFormat(format!(
            "cannot resample {} Hz to {} Hz: {}",
            source_rate, target_rate, reason
        ))
    };

    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, RESAMPLE_CHUNK, 1)
        .map_err(|e| resample_error(e.to_string()))?;

    let input: Vec<f32> = samples.iter().map(|&s| i16_to_f32(s)).collect();
    let delay = resampler.output_delay();
    let output_len = (samples.len() as f64 * ratio).ceil() as usize;
    let mut output = Vec::with_capacity(delay + output_len + RESAMPLE_CHUNK);

    for chunk in input.chunks(RESAMPLE_CHUNK) {
        let wave_in = [chunk];
        let block = if chunk.len() == RESAMPLE_CHUNK {
            resampler.process(&wave_in[..], None)
        } else {
            resampler.process_partial(Some(&wave_in[..]), None)
        }
        .map_err(|e| resample_error(e.to_string()))?;
        if let Some(channel) = block.first() {
            output.extend_from_slice(channel);
        }
    }

    while output.len() < delay + output_len {
        let block = resampler
            .process_partial(None::<&[Vec<f32>]>, None)
            .map_err(|e| resample_error(e.to_string()))?;
        match block.first() {
            Some(channel) if !channel.is_empty() => output.extend_from_slice(channel),
            _ => break,
        }
    }
    output.resize(delay + output_len, 0.0);

    Ok(output[delay..]
        .iter()
        .map(|&s| (s * 32768.0).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp(samples: Vec<i16>, rate: u32) -> tempfile::NamedTempFile {
        let file = tempfile::Builder::new().suffix(".wav").tempfile().unwrap();
        write_wav_file(file.path(), &PcmBuffer::new(samples, rate)).unwrap();
        file
    }

    #[test]
    fn test_roundtrip_at_target_rate() {
        let samples: Vec<i16> = (0..1000).map(|i| (i * 7 % 2000 - 1000) as i16).collect();
        let file = write_temp(samples.clone(), 16000);
        let audio = read_wav_file(file.path(), 16000).unwrap();
        assert_eq!(audio.sample_rate(), 16000);
        assert_eq!(audio.samples(), samples.as_slice());
    }

    #[test]
    fn test_higher_rate_is_resampled() {
        let file = write_temp(vec![1000; 3200], 32000);
        let audio = read_wav_file(file.path(), 16000).unwrap();
        assert_eq!(audio.sample_rate(), 16000);
        assert_eq!(audio.len(), 1600);
        // edges see the zero history and flush of the filter
        assert!(audio.samples()[200..1400].iter().all(|&s| (s - 1000).abs() <= 10));
    }

    #[test]
    fn test_lower_rate_rejected() {
        let file = write_temp(vec![0; 800], 8000);
        let err = read_wav_file(file.path(), 16000).unwrap_err();
        assert!(matches!(err, EngineError::InvalidAudioFormat(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = read_wav_file(Path::new("/no/such/audio.wav"), 16000).unwrap_err();
        assert!(matches!(err, EngineError::FileNotFound(_)));
    }

    #[test]
    fn test_compressed_extension_rejected() {
        let file = tempfile::Builder::new().suffix(".mp3").tempfile().unwrap();
        std::fs::write(file.path(), b"ID3\x03\x00").unwrap();
        let err = read_wav_file(file.path(), 16000).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unsupported file format: Specified file with extension '.mp3' is not supported"
        );
    }

    #[test]
    fn test_garbage_bytes_rejected() {
        let file = tempfile::Builder::new().suffix(".wav").tempfile().unwrap();
        std::fs::write(file.path(), b"definitely not a riff container").unwrap();
        let err = read_wav_file(file.path(), 16000).unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedFileFormat(_)));
    }

    #[test]
    fn test_resample_identity_and_length() {
        let samples = vec![1, 2, 3, 4];
        assert_eq!(resample(&samples, 16000, 16000).unwrap(), samples);
        assert_eq!(resample(&[0; 480], 48000, 16000).unwrap().len(), 160);
        assert_eq!(resample(&[0; 5000], 44100, 16000).unwrap().len(), 1815);
    }

    fn sine(freq: f32, rate: u32, n: usize) -> Vec<i16> {
        (0..n)
            .map(|i| (10000.0 * (2.0 * std::f32::consts::PI * freq * i as f32 / rate as f32).sin()).round() as i16)
            .collect()
    }

    fn rms(samples: &[i16]) -> f64 {
        (samples.iter().map(|&s| (s as f64).powi(2)).sum::<f64>() / samples.len() as f64).sqrt()
    }

    #[test]
    fn test_resample_removes_content_above_target_nyquist() {
        // 12 kHz sits above the 8 kHz Nyquist of the 16 kHz output and must not fold back to 4 kHz
        let out = resample(&sine(12000.0, 48000, 48000), 48000, 16000).unwrap();
        assert_eq!(out.len(), 16000);
        assert!(rms(&out[1000..15000]) < 100.0, "alias rms {}", rms(&out[1000..15000]));
    }

    #[test]
    fn test_resample_keeps_in_band_tone() {
        let out = resample(&sine(1000.0, 48000, 48000), 48000, 16000).unwrap();
        assert!((rms(&out[1000..15000]) - 7071.0).abs() < 100.0);
    }
}
