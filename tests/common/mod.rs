//! Synthetic reference model and audio.
//!
//! Every symbol is coded as a pure tone at `400 + 200 * id` Hz. All tone
//! frequencies are multiples of 100 Hz, so each tone repeats exactly every
//! 160 samples (one hop) and every steady-state frame of a tone yields the
//! same features. The acoustic network is a single linear layer scoring each
//! frame by its squared distance to the per-symbol template features, which
//! makes the frame-level argmax exact and the decode fully predictable.

#![allow(dead_code)]

use candle_core::{Device, Tensor};
use offline_stt::audio::file::write_wav_file;
use offline_stt::audio::{FeatureExtractor, FrontendConfig, PcmBuffer};
use offline_stt::transcription::{
    AcousticConfig, Bigram, LanguageModelSpec, ModelArtifact, ModelHeader, PostProcessConfig,
};
use offline_stt::Session;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const ACCESS_KEY: &str = "c3luLXJlZmVyZW5jZS1hY2Nlc3Mta2V5";

pub const REFERENCE: &str =
    "MR QUILTER IS THE APOSTLE OF THE MIDDLE CLASSES AND WE ARE GLAD TO WELCOME HIS GOSPEL";

pub const SAMPLE_RATE: u32 = 16000;
const AMPLITUDE: f32 = 8000.0;
const PERIOD: usize = 160;

/// Samples per character tone and per blank gap after it.
const SYMBOL_SAMPLES: usize = 5 * PERIOD;
const GAP_SAMPLES: usize = 4 * PERIOD;
const EDGE_SAMPLES: usize = 10 * PERIOD;

/// Softmax temperature of the template scorer.
const TEMPERATURE: f32 = 50.0;

pub const BLANK: usize = 0;
pub const BOUNDARY: usize = 1;

pub fn symbols() -> Vec<String> {
    let mut symbols = vec!["<blank>".to_string(), "|".to_string()];
    symbols.extend(('A'..='Z').map(|c| c.to_string()));
    symbols.push("'".to_string());
    symbols
}

pub fn symbol_id(c: char) -> usize {
    symbols()
        .iter()
        .position(|s| *s == c.to_string())
        .unwrap_or_else(|| panic!("no symbol for {:?}", c))
}

pub fn frontend() -> FrontendConfig {
    FrontendConfig {
        sample_rate: SAMPLE_RATE,
        frame_length: 400,
        hop_length: 160,
        n_fft: 512,
        n_mels: 80,
        pre_emphasis: 0.97,
        ..FrontendConfig::default()
    }
}

/// `n_samples` of the tone coding `symbol`, starting at phase zero.
pub fn tone(symbol: usize, n_samples: usize) -> Vec<i16> {
    tone_at(symbol, n_samples, SAMPLE_RATE)
}

/// Same tone sampled at `sample_rate`, which must be a multiple of 100 Hz.
pub fn tone_at(symbol: usize, n_samples: usize, sample_rate: u32) -> Vec<i16> {
    let frequency = 400.0 + 200.0 * symbol as f32;
    let period_len = sample_rate as usize / 100;
    let period: Vec<i16> = (0..period_len)
        .map(|n| {
            let phase = 2.0 * std::f32::consts::PI * frequency * n as f32 / sample_rate as f32;
            (AMPLITUDE * phase.sin()).round() as i16
        })
        .collect();
    period.iter().copied().cycle().take(n_samples).collect()
}

/// Waveform whose decode is `text` (uppercase words separated by single spaces).
pub fn synthesize(text: &str) -> Vec<i16> {
    synthesize_at(text, SAMPLE_RATE)
}

/// [`synthesize`] at another rate, with every segment lasting as long in seconds.
pub fn synthesize_at(text: &str, sample_rate: u32) -> Vec<i16> {
    let scaled = |n: usize| n * sample_rate as usize / SAMPLE_RATE as usize;
    let segment = |symbol: usize, n: usize| tone_at(symbol, scaled(n), sample_rate);

    let mut samples = segment(BLANK, EDGE_SAMPLES);
    for (index, word) in text.split(' ').enumerate() {
        if index > 0 {
            samples.extend(segment(BOUNDARY, SYMBOL_SAMPLES));
            samples.extend(segment(BLANK, GAP_SAMPLES));
        }
        for c in word.chars() {
            samples.extend(segment(symbol_id(c), SYMBOL_SAMPLES));
            samples.extend(segment(BLANK, GAP_SAMPLES));
        }
    }
    samples.extend(segment(BLANK, EDGE_SAMPLES));
    samples
}

/// Safetensors bytes for the template scorer.
pub fn weights() -> Vec<u8> {
    let extractor = FeatureExtractor::new(frontend()).unwrap();
    let n_symbols = symbols().len();
    let dim = extractor.dim();

    let mut weight = Vec::with_capacity(n_symbols * dim);
    let mut bias = Vec::with_capacity(n_symbols);
    for symbol in 0..n_symbols {
        let frames = extractor.extract_samples(&tone(symbol, 16 * PERIOD)).unwrap();
        let template = frames.frame(6);
        weight.extend(template.iter().map(|m| 2.0 * m / TEMPERATURE));
        bias.push(-template.iter().map(|m| m * m).sum::<f32>() / TEMPERATURE);
    }

    let mut tensors = HashMap::new();
    tensors.insert(
        "output.weight".to_string(),
        Tensor::from_vec(weight, (n_symbols, dim), &Device::Cpu).unwrap(),
    );
    tensors.insert(
        "output.bias".to_string(),
        Tensor::from_vec(bias, n_symbols, &Device::Cpu).unwrap(),
    );

    let file = tempfile::NamedTempFile::new().unwrap();
    candle_core::safetensors::save(&tensors, file.path()).unwrap();
    std::fs::read(file.path()).unwrap()
}

pub fn reference_words() -> Vec<&'static str> {
    let mut words: Vec<&str> = REFERENCE.split(' ').collect();
    words.sort_unstable();
    words.dedup();
    words
}

pub fn language_model(words: &[&str]) -> LanguageModelSpec {
    let mut spec = LanguageModelSpec::default();
    for word in words {
        spec.words.insert(word.to_string(), -2.0);
    }
    spec.word_bigrams.push(Bigram {
        prev: "THE".into(),
        next: "MIDDLE".into(),
        log_prob: -0.5,
    });
    spec.word_bigrams.push(Bigram {
        prev: "MIDDLE".into(),
        next: "CLASSES".into(),
        log_prob: -0.5,
    });
    spec
}

pub fn header() -> ModelHeader {
    ModelHeader {
        name: "tone-reference".into(),
        version: "1.0.0".into(),
        description: Some("tone-coded reference model".into()),
        frontend: frontend(),
        acoustic: AcousticConfig::default(),
        symbols: symbols(),
        language_model: language_model(&reference_words()),
        postprocess: PostProcessConfig::default(),
        license: None,
    }
}

/// A temporary directory holding a model artifact and the reference WAV.
pub struct Fixture {
    dir: TempDir,
    pub model_path: PathBuf,
    pub wav_path: PathBuf,
    pub samples: Vec<i16>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_header(|_| {})
    }

    pub fn with_header(edit: impl FnOnce(&mut ModelHeader)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut model_header = header();
        edit(&mut model_header);

        let model_path = dir.path().join("reference.sttm");
        ModelArtifact::new(model_header, weights())
            .write_to_path(&model_path)
            .unwrap();

        let samples = synthesize(REFERENCE);
        let wav_path = dir.path().join("reference.wav");
        write_wav_file(&wav_path, &PcmBuffer::new(samples.clone(), SAMPLE_RATE)).unwrap();

        Self {
            dir,
            model_path,
            wav_path,
            samples,
        }
    }

    pub fn session(&self) -> Session {
        Session::create(&self.model_path, ACCESS_KEY).unwrap()
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn write_wav(&self, name: &str, samples: Vec<i16>, sample_rate: u32) -> PathBuf {
        let path = self.path(name);
        write_wav_file(&path, &PcmBuffer::new(samples, sample_rate)).unwrap();
        path
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }
}
