//! # Model Loading
//!
//! Turns a model artifact into the read-only components a session decodes
//! with, and runs the full pipeline for one utterance.
//!
//! ## Loading Process:
//! 1. Check the access key's format
//! 2. Read and verify the artifact container (lengths, checksum, header)
//! 3. Authorize the key against the model's license terms
//! 4. Build the frontend, symbol inventory, lexicon and language model
//! 5. Load the acoustic weights on the configured device
//!
//! Any failure leaves nothing behind; a model is either fully loaded or
//! not loaded at all.
//!
//! ## Thread Safety:
//! Nothing in a `LoadedModel` is mutated after loading. Every decode
//! allocates its own frames, score matrix and beam.

use crate::audio::{AudioProcessor, FeatureExtractor, PcmBuffer};
use crate::config::{ComputeConfig, DecoderConfig};
use crate::device::{self, DevicePreference};
use crate::error::{EngineError, EngineResult};
use crate::transcription::acoustic::AcousticScorer;
use crate::transcription::artifact::{ModelArtifact, ModelHeader};
use crate::transcription::decoder::{BeamSearchDecoder, DecodeOutput};
use crate::transcription::lexicon::LanguageModel;
use crate::transcription::license;
use crate::transcription::postprocess::TranscriptRenderer;
use crate::transcription::symbols::SymbolInventory;
use chrono::Utc;
use serde::Serialize;
use std::path::Path;
use std::time::Instant;

/// Descriptive information about a loaded model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelInfo {
    pub name: String,
    pub version: String,
    pub description: Option<String>,
    pub sample_rate: u32,
    pub n_symbols: usize,
    pub lexicon_size: usize,
    pub weights_bytes: usize,
    pub device: String,
}

/// Result of decoding one utterance, with timing metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transcription {
    /// The transcribed text
    pub text: String,

    /// Combined acoustic and language model log score of the chosen path
    pub score: f32,

    /// Feature frames the utterance produced
    pub frame_count: usize,

    /// Duration of audio processed (seconds)
    pub audio_duration: f64,

    /// Time taken for transcription (milliseconds)
    pub processing_time_ms: u64,

    /// Model used for transcription
    pub model_name: String,
}

pub struct LoadedModel {
    info: ModelInfo,
    audio: AudioProcessor,
    extractor: FeatureExtractor,
    scorer: AcousticScorer,
    symbols: SymbolInventory,
    lm: LanguageModel,
    renderer: TranscriptRenderer,
}

impl LoadedModel {
    /// Load and authorize a model file.
    ///
    /// ## Returns:
    /// - **Ok(LoadedModel)**: ready for decoding
    /// - **Err(InvalidCredentials)**: key malformed, not issued for this model, or expired
    /// - **Err(InvalidModel)**: missing, corrupted or inconsistent artifact
    pub fn load(path: &Path, access_key: &str, compute: &ComputeConfig) -> EngineResult<Self> {
        license::check_format(access_key)?;

        let start_time = Instant::now();
        tracing::info!(path = %path.display(), "loading model");

        let artifact = ModelArtifact::read_from_path(path)?;
        let model = Self::from_artifact(artifact, access_key, compute)?;

        tracing::info!(
            name = %model.info.name,
            version = %model.info.version,
            symbols = model.info.n_symbols,
            lexicon = model.info.lexicon_size,
            device = %model.info.device,
            "model loaded in {:.2}s",
            start_time.elapsed().as_secs_f64()
        );
        Ok(model)
    }

    pub fn from_artifact(artifact: ModelArtifact, access_key: &str, compute: &ComputeConfig) -> EngineResult<Self> {
        let ModelArtifact { header, weights } = artifact;
        license::verify(access_key, header.license.as_ref(), Utc::now())?;

        let preference: DevicePreference = compute.device.parse()?;
        let device = device::select(preference);

        let extractor = FeatureExtractor::new(header.frontend.clone())?;
        let symbols = SymbolInventory::new(&header.symbols)?;
        let lm = LanguageModel::new(&header.language_model, &symbols)?;
        let weights_bytes = weights.len();
        let scorer = AcousticScorer::load(
            &header.acoustic,
            extractor.dim(),
            symbols.len(),
            weights,
            &device,
            compute.chunk_frames,
        )?;
        let renderer = TranscriptRenderer::new(&header.postprocess);

        let info = Self::describe(&header, &symbols, &lm, weights_bytes, device::label(&device));

        Ok(Self {
            info,
            audio: AudioProcessor::new(header.frontend.sample_rate),
            extractor,
            scorer,
            symbols,
            lm,
            renderer,
        })
    }

    fn describe(
        header: &ModelHeader,
        symbols: &SymbolInventory,
        lm: &LanguageModel,
        weights_bytes: usize,
        device: &str,
    ) -> ModelInfo {
        ModelInfo {
            name: header.name.clone(),
            version: header.version.clone(),
            description: header.description.clone(),
            sample_rate: header.frontend.sample_rate,
            n_symbols: symbols.len(),
            lexicon_size: lm.lexicon_size(),
            weights_bytes,
            device: device.to_string(),
        }
    }

    pub fn info(&self) -> &ModelInfo {
        &self.info
    }

    pub fn sample_rate(&self) -> u32 {
        self.audio.sample_rate()
    }

    pub fn symbols(&self) -> &SymbolInventory {
        &self.symbols
    }

    /// Decode a buffer whose rate has to match the model's.
    pub fn transcribe(&self, audio: &PcmBuffer, decoder: &DecoderConfig) -> EngineResult<Transcription> {
        self.audio.validate(audio)?;
        self.transcribe_samples(audio.samples(), decoder)
    }

    /// Decode samples already known to be at the model's rate.
    pub fn transcribe_samples(&self, samples: &[i16], decoder: &DecoderConfig) -> EngineResult<Transcription> {
        if samples.is_empty() {
            return Err(EngineError::EmptyInput);
        }
        let start_time = Instant::now();
        let audio_duration = samples.len() as f64 / self.sample_rate() as f64;

        let frames = self.extractor.extract_samples(samples)?;
        let scores = self.scorer.score(&frames)?;
        let output: DecodeOutput = BeamSearchDecoder::new(decoder, &self.lm, &self.symbols).decode(&scores)?;
        let text = self.renderer.render(&output.symbols, &self.symbols);

        let processing_time_ms = start_time.elapsed().as_millis() as u64;
        tracing::debug!(
            frames = frames.n_frames(),
            beam_width = decoder.beam_width,
            score = output.score,
            "decoded {:.2}s audio -> {} chars in {}ms",
            audio_duration,
            text.len(),
            processing_time_ms
        );

        Ok(Transcription {
            text,
            score: output.score,
            frame_count: frames.n_frames(),
            audio_duration,
            processing_time_ms,
            model_name: self.info.name.clone(),
        })
    }
}

impl std::fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModel").field("info", &self.info).finish_non_exhaustive()
    }
}
