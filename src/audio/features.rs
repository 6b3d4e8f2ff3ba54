//! Log-mel feature extraction
//!
//! # Algorithm
//!
//! 1. Scale 16-bit samples to [-1, 1) and zero-pad to at least one window
//! 2. Pre-emphasis over the whole utterance
//! 3. Cut overlapping frames of `frame_length` every `hop_length` samples
//! 4. Optional DC removal, then window (Hann, Hamming or Povey)
//! 5. Zero-padded FFT, power spectrum
//! 6. Triangular mel filterbank and natural log with a floor
//!
//! Frame count is `1 + (max(len, frame_length) - frame_length) / hop_length`.
//! Everything except the per-call scratch buffers is precomputed, so one
//! extractor is shared by all concurrent decodes.

use crate::audio::processor::{i16_to_f32, AudioProcessor, PcmBuffer};
use crate::error::{EngineError, EngineResult};
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;
use std::fmt;
use std::sync::Arc;

/// Analysis window applied to every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowKind {
    Hann,
    Hamming,
    /// Hann raised to 0.85, as used by Kaldi-trained models
    Povey,
}

/// Frontend parameters. Stored in the model header because a model only
/// works with the features it was trained on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrontendConfig {
    pub sample_rate: u32,
    /// Samples per analysis window (400 = 25 ms at 16 kHz)
    pub frame_length: usize,
    /// Samples between window starts (160 = 10 ms at 16 kHz)
    pub hop_length: usize,
    pub n_fft: usize,
    pub n_mels: usize,
    pub f_min: f32,
    /// Upper filterbank edge, defaults to Nyquist
    pub f_max: Option<f32>,
    pub pre_emphasis: f32,
    pub window: WindowKind,
    pub remove_dc: bool,
    pub log_floor: f32,
}

impl Default for FrontendConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            frame_length: 400,
            hop_length: 160,
            n_fft: 512,
            n_mels: 80,
            f_min: 20.0,
            f_max: None,
            pre_emphasis: 0.97,
            window: WindowKind::Hann,
            remove_dc: false,
            log_floor: 1e-10,
        }
    }
}

impl FrontendConfig {
    pub fn validate(&self) -> EngineResult<()> {
        let invalid = |msg: String| Err(EngineError::InvalidModel(format!("frontend: {}", msg)));

        if self.sample_rate == 0 {
            return invalid("sample_rate must be positive".into());
        }
        if self.frame_length == 0 || self.hop_length == 0 {
            return invalid("frame_length and hop_length must be positive".into());
        }
        if self.n_fft < self.frame_length {
            return invalid(format!(
                "n_fft ({}) must be at least frame_length ({})",
                self.n_fft, self.frame_length
            ));
        }
        if self.n_mels == 0 {
            return invalid("n_mels must be positive".into());
        }
        let nyquist = self.sample_rate as f32 / 2.0;
        let f_max = self.upper_edge();
        if !(self.f_min >= 0.0 && self.f_min < f_max && f_max <= nyquist) {
            return invalid(format!(
                "filterbank range {}..{} Hz is invalid for {} Hz audio",
                self.f_min, f_max, self.sample_rate
            ));
        }
        if !(0.0..1.0).contains(&self.pre_emphasis) {
            return invalid("pre_emphasis must be in [0, 1)".into());
        }
        if !(self.log_floor > 0.0 && self.log_floor.is_finite()) {
            return invalid("log_floor must be positive".into());
        }
        Ok(())
    }

    /// Number of frames produced for `n_samples` samples (at least one).
    pub fn frame_count(&self, n_samples: usize) -> usize {
        let padded = n_samples.max(self.frame_length);
        1 + (padded - self.frame_length) / self.hop_length
    }

    fn upper_edge(&self) -> f32 {
        self.f_max.unwrap_or(self.sample_rate as f32 / 2.0)
    }
}

/// Row-major `n_frames x dim` feature matrix for one utterance.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureFrames {
    data: Vec<f32>,
    n_frames: usize,
    dim: usize,
}

impl FeatureFrames {
    pub fn new(data: Vec<f32>, n_frames: usize, dim: usize) -> EngineResult<Self> {
        if data.len() != n_frames * dim {
            return Err(EngineError::ModelInferenceError(format!(
                "feature matrix has {} values, expected {} x {}",
                data.len(),
                n_frames,
                dim
            )));
        }
        Ok(Self {
            data,
            n_frames,
            dim,
        })
    }

    pub fn n_frames(&self) -> usize {
        self.n_frames
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn frame(&self, index: usize) -> &[f32] {
        &self.data[index * self.dim..(index + 1) * self.dim]
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }
}

/// Precomputed window, filterbank and FFT plan for one [`FrontendConfig`].
pub struct FeatureExtractor {
    config: FrontendConfig,
    processor: AudioProcessor,
    window: Vec<f32>,
    /// `n_mels x n_freqs`, row-major
    filters: Vec<f32>,
    n_freqs: usize,
    fft: Arc<dyn Fft<f32>>,
}

impl fmt::Debug for FeatureExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureExtractor")
            .field("config", &self.config)
            .field("n_freqs", &self.n_freqs)
            .finish()
    }
}

impl FeatureExtractor {
    pub fn new(config: FrontendConfig) -> EngineResult<Self> {
        config.validate()?;

        let n_freqs = config.n_fft / 2 + 1;
        let window = make_window(config.window, config.frame_length);
        let filters = mel_filterbank(&config, n_freqs);
        let fft = FftPlanner::new().plan_fft_forward(config.n_fft);

        Ok(Self {
            processor: AudioProcessor::new(config.sample_rate),
            config,
            window,
            filters,
            n_freqs,
            fft,
        })
    }

    pub fn config(&self) -> &FrontendConfig {
        &self.config
    }

    /// Feature dimension (number of mel bands).
    pub fn dim(&self) -> usize {
        self.config.n_mels
    }

    /// Validate the buffer against the model rate, then extract features.
    pub fn extract(&self, audio: &PcmBuffer) -> EngineResult<FeatureFrames> {
        self.processor.validate(audio)?;
        self.extract_samples(audio.samples())
    }

    /// Extract features from samples already known to be at the model rate.
    pub fn extract_samples(&self, samples: &[i16]) -> EngineResult<FeatureFrames> {
        if samples.is_empty() {
            return Err(EngineError::EmptyInput);
        }

        let cfg = &self.config;
        let n_frames = cfg.frame_count(samples.len());
        let padded_len = samples.len().max(cfg.frame_length);

        let mut signal: Vec<f32> = samples.iter().map(|&s| i16_to_f32(s)).collect();
        signal.resize(padded_len, 0.0);

        if cfg.pre_emphasis > 0.0 {
            for i in (1..signal.len()).rev() {
                signal[i] -= cfg.pre_emphasis * signal[i - 1];
            }
        }

        let mut buffer = vec![Complex::new(0.0_f32, 0.0); cfg.n_fft];
        let mut scratch = vec![Complex::new(0.0_f32, 0.0); self.fft.get_inplace_scratch_len()];
        let mut power = vec![0.0_f32; self.n_freqs];
        let mut data = Vec::with_capacity(n_frames * cfg.n_mels);

        for frame_idx in 0..n_frames {
            let start = frame_idx * cfg.hop_length;
            let frame = &signal[start..start + cfg.frame_length];

            let dc = if cfg.remove_dc {
                frame.iter().sum::<f32>() / frame.len() as f32
            } else {
                0.0
            };

            for (i, slot) in buffer.iter_mut().enumerate() {
                *slot = if i < cfg.frame_length {
                    Complex::new((frame[i] - dc) * self.window[i], 0.0)
                } else {
                    Complex::new(0.0, 0.0)
                };
            }

            self.fft.process_with_scratch(&mut buffer, &mut scratch);

            for (p, c) in power.iter_mut().zip(buffer.iter()) {
                *p = c.norm_sqr();
            }

            for mel_idx in 0..cfg.n_mels {
                let row = &self.filters[mel_idx * self.n_freqs..(mel_idx + 1) * self.n_freqs];
                let energy: f32 = row.iter().zip(power.iter()).map(|(w, p)| w * p).sum();
                data.push(energy.max(cfg.log_floor).ln());
            }
        }

        FeatureFrames::new(data, n_frames, cfg.n_mels)
    }
}

/// Convert frequency in Hz to the HTK mel scale: `2595 * log10(1 + f/700)`
#[inline]
pub fn hz_to_mel(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

#[inline]
pub fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10.0_f32.powf(mel / 2595.0) - 1.0)
}

fn make_window(kind: WindowKind, size: usize) -> Vec<f32> {
    if size == 1 {
        return vec![1.0];
    }
    let denom = (size - 1) as f32;
    (0..size)
        .map(|n| {
            let phase = 2.0 * PI * n as f32 / denom;
            match kind {
                WindowKind::Hann => 0.5 - 0.5 * phase.cos(),
                WindowKind::Hamming => 0.54 - 0.46 * phase.cos(),
                WindowKind::Povey => (0.5 - 0.5 * phase.cos()).powf(0.85),
            }
        })
        .collect()
}

/// Triangular filters evenly spaced on the mel scale, evaluated at every FFT bin.
fn mel_filterbank(config: &FrontendConfig, n_freqs: usize) -> Vec<f32> {
    let n_mels = config.n_mels;
    let mel_lo = hz_to_mel(config.f_min);
    let mel_hi = hz_to_mel(config.upper_edge());
    let step = (mel_hi - mel_lo) / (n_mels + 1) as f32;
    let bin_hz = config.sample_rate as f32 / config.n_fft as f32;

    let mut filters = vec![0.0_f32; n_mels * n_freqs];
    for m in 0..n_mels {
        let left = mel_lo + step * m as f32;
        let center = left + step;
        let right = center + step;

        for k in 0..n_freqs {
            let mel = hz_to_mel(k as f32 * bin_hz);
            let weight = if mel > left && mel <= center {
                (mel - left) / (center - left)
            } else if mel > center && mel < right {
                (right - mel) / (right - center)
            } else {
                0.0
            };
            filters[m * n_freqs + k] = weight;
        }
    }
    filters
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(freq: f32, amplitude: f32, n: usize, rate: u32) -> Vec<i16> {
        (0..n)
            .map(|i| (amplitude * (2.0 * PI * freq * i as f32 / rate as f32).sin()).round() as i16)
            .collect()
    }

    fn small_config() -> FrontendConfig {
        FrontendConfig {
            n_mels: 40,
            ..FrontendConfig::default()
        }
    }

    #[test]
    fn test_frame_count() {
        let cfg = FrontendConfig::default();
        assert_eq!(cfg.frame_count(1), 1);
        assert_eq!(cfg.frame_count(400), 1);
        assert_eq!(cfg.frame_count(559), 1);
        assert_eq!(cfg.frame_count(560), 2);
        assert_eq!(cfg.frame_count(16000), 98);
    }

    #[test]
    fn test_mel_scale_roundtrip() {
        for hz in [0.0_f32, 300.0, 1000.0, 4000.0, 7900.0] {
            assert!((mel_to_hz(hz_to_mel(hz)) - hz).abs() < 0.5);
        }
        assert!(hz_to_mel(1000.0) > hz_to_mel(500.0));
    }

    #[test]
    fn test_filters_nonnegative_and_bounded() {
        let cfg = small_config();
        let filters = mel_filterbank(&cfg, cfg.n_fft / 2 + 1);
        assert!(filters.iter().all(|&w| (0.0..=1.0).contains(&w)));
        // every band covers at least one FFT bin
        for row in filters.chunks(cfg.n_fft / 2 + 1) {
            assert!(row.iter().any(|&w| w > 0.0));
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let cfg = FrontendConfig {
            n_fft: 256,
            ..FrontendConfig::default()
        };
        assert!(matches!(FeatureExtractor::new(cfg), Err(EngineError::InvalidModel(_))));

        let cfg = FrontendConfig {
            f_max: Some(12000.0),
            ..FrontendConfig::default()
        };
        assert!(FeatureExtractor::new(cfg).is_err());
    }

    #[test]
    fn test_empty_and_rate_mismatch() {
        let extractor = FeatureExtractor::new(small_config()).unwrap();
        assert!(matches!(
            extractor.extract(&PcmBuffer::new(Vec::new(), 16000)),
            Err(EngineError::EmptyInput)
        ));
        assert!(matches!(
            extractor.extract(&PcmBuffer::new(vec![0; 1600], 8000)),
            Err(EngineError::InvalidAudioFormat(_))
        ));
    }

    #[test]
    fn test_short_input_yields_one_frame() {
        let extractor = FeatureExtractor::new(small_config()).unwrap();
        let frames = extractor.extract_samples(&[100, -100, 50]).unwrap();
        assert_eq!(frames.n_frames(), 1);
        assert_eq!(frames.dim(), 40);
    }

    #[test]
    fn test_silence_hits_floor() {
        let cfg = small_config();
        let floor = cfg.log_floor.ln();
        let extractor = FeatureExtractor::new(cfg).unwrap();
        let frames = extractor.extract_samples(&vec![0; 1600]).unwrap();
        assert!(frames.as_slice().iter().all(|&v| (v - floor).abs() < 1e-6));
    }

    #[test]
    fn test_tone_energy_is_localized() {
        let cfg = small_config();
        let extractor = FeatureExtractor::new(cfg.clone()).unwrap();
        let frames = extractor.extract_samples(&tone(1000.0, 8000.0, 4000, 16000)).unwrap();
        let frame = frames.frame(frames.n_frames() / 2);

        let peak = frame
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();

        let mel_lo = hz_to_mel(cfg.f_min);
        let step = (hz_to_mel(8000.0) - mel_lo) / (cfg.n_mels + 1) as f32;
        let center_hz = mel_to_hz(mel_lo + step * (peak + 1) as f32);
        assert!((center_hz - 1000.0).abs() < 150.0, "peak band centred at {} Hz", center_hz);
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let extractor = FeatureExtractor::new(small_config()).unwrap();
        let samples = tone(440.0, 5000.0, 8000, 16000);
        let a = extractor.extract_samples(&samples).unwrap();
        let b = extractor.extract_samples(&samples).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_periodic_frames_are_identical() {
        // 400 Hz repeats every 40 samples, so every hop sees the same waveform.
        let extractor = FeatureExtractor::new(small_config()).unwrap();
        let period = tone(400.0, 8000.0, 40, 16000);
        let samples: Vec<i16> = period.iter().copied().cycle().take(3200).collect();
        let frames = extractor.extract_samples(&samples).unwrap();
        assert_eq!(frames.frame(3), frames.frame(7));
    }
}
