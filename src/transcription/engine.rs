//! # Engine Session
//!
//! A session owns exactly one loaded model for its whole lifetime: created
//! once, used for any number of decodes, destroyed explicitly (or dropped).
//!
//! ## Thread Safety:
//! The model sits behind an `RwLock`. Decodes take the read side, so any
//! number of them run in parallel against the same session. `destroy` takes
//! the write side: it blocks until in-flight decodes complete and only then
//! releases the model. Every call after that fails with `SessionClosed`.
//!
//! ## Example:
//! ```no_run
//! use offline_stt::Session;
//!
//! let session = Session::create("models/en.sttm", "bXktYWNjZXNzLWtleQ==")?;
//! let text = session.process_file("utterance.wav")?;
//! println!("{}", text);
//! session.destroy()?;
//! # Ok::<(), offline_stt::EngineError>(())
//! ```

use crate::audio::file::read_wav_file;
use crate::audio::PcmBuffer;
use crate::config::{DecoderConfig, EngineConfig};
use crate::error::{EngineError, EngineResult};
use crate::transcription::model::{LoadedModel, ModelInfo, Transcription};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock};
use uuid::Uuid;

/// Version of the engine build.
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// The capability set a speech-to-text session exposes.
pub trait SpeechToText: Send + Sync {
    /// Decode one complete utterance of PCM at the model's sample rate.
    fn process(&self, pcm: &[i16]) -> EngineResult<String>;

    /// Decode the audio stored in a WAV file.
    fn process_file(&self, path: &Path) -> EngineResult<String>;

    fn version(&self) -> EngineResult<String>;
}

/// Running totals across a session's decodes.
#[derive(Debug, Default)]
struct SessionMetrics {
    total_requests: u64,
    failed_requests: u64,
    total_audio_duration: f64,
    total_processing_time: u64,
}

/// Performance statistics for a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStats {
    pub total_requests: u64,
    pub failed_requests: u64,
    pub total_audio_seconds: f64,
    pub average_processing_time_ms: u64,
    /// Ratio of audio time to processing time (>1.0 = faster than real time)
    pub throughput_factor: f64,
}

pub struct Session {
    id: Uuid,
    model: RwLock<Option<LoadedModel>>,
    decoder: DecoderConfig,
    metrics: Mutex<SessionMetrics>,
}

impl Session {
    /// Load the model at `model_path` with default configuration.
    ///
    /// ## Returns:
    /// - **Ok(Session)**: model loaded and authorized
    /// - **Err(InvalidCredentials)**: key rejected
    /// - **Err(InvalidModel)**: model missing or malformed
    pub fn create(model_path: impl AsRef<Path>, access_key: &str) -> EngineResult<Self> {
        Self::builder().model_path(model_path).access_key(access_key).build()
    }

    pub fn builder() -> SessionBuilder {
        SessionBuilder::default()
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn decoder_config(&self) -> &DecoderConfig {
        &self.decoder
    }

    /// Engine build identifier. Stable for the life of the session.
    pub fn version(&self) -> EngineResult<String> {
        self.with_model(|_| Ok(ENGINE_VERSION.to_string()))
    }

    /// Sample rate every input must be at.
    pub fn sample_rate(&self) -> EngineResult<u32> {
        self.with_model(|model| Ok(model.sample_rate()))
    }

    pub fn model_info(&self) -> EngineResult<ModelInfo> {
        self.with_model(|model| Ok(model.info().clone()))
    }

    /// Decode samples assumed to be at the model's sample rate.
    pub fn process(&self, pcm: &[i16]) -> EngineResult<String> {
        self.decode(|model| model.transcribe_samples(pcm, &self.decoder))
            .map(|result| result.text)
    }

    /// Decode a buffer, rejecting it when its rate differs from the model's.
    pub fn process_pcm(&self, audio: &PcmBuffer) -> EngineResult<String> {
        self.transcribe(audio).map(|result| result.text)
    }

    /// Like [`Session::process_pcm`] but returns the score and timing metadata too.
    pub fn transcribe(&self, audio: &PcmBuffer) -> EngineResult<Transcription> {
        self.decode(|model| model.transcribe(audio, &self.decoder))
    }

    /// Decode a mono WAV file. Files above the model's rate are resampled,
    /// files below it are rejected.
    pub fn process_file(&self, path: impl AsRef<Path>) -> EngineResult<String> {
        self.transcribe_file(path).map(|result| result.text)
    }

    pub fn transcribe_file(&self, path: impl AsRef<Path>) -> EngineResult<Transcription> {
        let path = path.as_ref();
        self.decode(|model| {
            let audio = read_wav_file(path, model.sample_rate())?;
            model.transcribe(&audio, &self.decoder)
        })
    }

    /// Release the model. Waits for in-flight decodes to finish first.
    pub fn destroy(&self) -> EngineResult<()> {
        let mut guard = self.model.write().unwrap_or_else(PoisonError::into_inner);
        match guard.take() {
            Some(model) => {
                tracing::info!(session = %self.id, model = %model.info().name, "session destroyed");
                drop(model);
                Ok(())
            }
            None => Err(EngineError::SessionClosed),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.model.read().unwrap_or_else(PoisonError::into_inner).is_none()
    }

    pub fn stats(&self) -> SessionStats {
        let metrics = self.metrics.lock().unwrap_or_else(PoisonError::into_inner);
        SessionStats {
            total_requests: metrics.total_requests,
            failed_requests: metrics.failed_requests,
            total_audio_seconds: metrics.total_audio_duration,
            average_processing_time_ms: if metrics.total_requests > 0 {
                metrics.total_processing_time / metrics.total_requests
            } else {
                0
            },
            throughput_factor: if metrics.total_processing_time > 0 {
                (metrics.total_audio_duration * 1000.0) / metrics.total_processing_time as f64
            } else {
                0.0
            },
        }
    }

    fn with_model<T>(&self, f: impl FnOnce(&LoadedModel) -> EngineResult<T>) -> EngineResult<T> {
        let guard = self.model.read().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(model) => f(model),
            None => Err(EngineError::SessionClosed),
        }
    }

    fn decode(&self, f: impl FnOnce(&LoadedModel) -> EngineResult<Transcription>) -> EngineResult<Transcription> {
        let span = tracing::debug_span!("decode", session = %self.id);
        let _entered = span.enter();

        let result = self.with_model(f);
        if !matches!(result, Err(EngineError::SessionClosed)) {
            self.record(&result);
        }
        result
    }

    fn record(&self, result: &EngineResult<Transcription>) {
        let mut metrics = self.metrics.lock().unwrap_or_else(PoisonError::into_inner);
        metrics.total_requests += 1;
        match result {
            Ok(transcription) => {
                metrics.total_audio_duration += transcription.audio_duration;
                metrics.total_processing_time += transcription.processing_time_ms;
            }
            Err(_) => metrics.failed_requests += 1,
        }
    }
}

impl SpeechToText for Session {
    fn process(&self, pcm: &[i16]) -> EngineResult<String> {
        Session::process(self, pcm)
    }

    fn process_file(&self, path: &Path) -> EngineResult<String> {
        Session::process_file(self, path)
    }

    fn version(&self) -> EngineResult<String> {
        Session::version(self)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .field("decoder", &self.decoder)
            .finish()
    }
}

/// Collects everything a session needs before loading the model.
#[derive(Debug, Clone, Default)]
pub struct SessionBuilder {
    access_key: Option<String>,
    model_path: Option<PathBuf>,
    config: EngineConfig,
}

impl SessionBuilder {
    pub fn access_key(mut self, access_key: impl Into<String>) -> Self {
        self.access_key = Some(access_key.into());
        self
    }

    pub fn model_path(mut self, path: impl AsRef<Path>) -> Self {
        self.model_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Replace the whole engine configuration, e.g. one from [`EngineConfig::load`].
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn decoder(mut self, decoder: DecoderConfig) -> Self {
        self.config.decoder = decoder;
        self
    }

    pub fn device(mut self, device: impl Into<String>) -> Self {
        self.config.compute.device = device.into();
        self
    }

    pub fn build(self) -> EngineResult<Session> {
        let access_key = self
            .access_key
            .ok_or_else(|| EngineError::InvalidCredentials("AccessKey must be provided".into()))?;
        let model_path = self
            .model_path
            .ok_or_else(|| EngineError::InvalidModel("model path must be provided".into()))?;
        self.config.validate()?;

        let model = LoadedModel::load(&model_path, &access_key, &self.config.compute)?;
        let id = Uuid::new_v4();
        tracing::info!(session = %id, model = %model.info().name, "session created");

        Ok(Session {
            id,
            model: RwLock::new(Some(model)),
            decoder: self.config.decoder,
            metrics: Mutex::new(SessionMetrics::default()),
        })
    }
}
