//! # Offline Speech-to-Text Engine
//!
//! Converts one complete utterance of 16-bit PCM audio into a text
//! transcript, entirely on the local machine.
//!
//! ## Pipeline:
//! samples → log-mel features → acoustic scores → beam search (lexicon and
//! language model) → symbol sequence → transcript text
//!
//! ## Module Layout:
//! - **audio**: PCM buffers, validation, feature extraction and WAV reading
//! - **transcription**: acoustic model, language model, decoder, post-processing,
//!   model artifacts and the [`Session`] API
//! - **config**: engine configuration (TOML file + environment variables)
//! - **device**: compute device selection for acoustic inference
//! - **error**: the [`EngineError`] type every operation returns
//! - **logging**: optional `tracing` subscriber setup

pub mod audio;
pub mod config;
pub mod device;
pub mod error;
pub mod logging;
pub mod transcription;

pub use audio::PcmBuffer;
pub use config::{ComputeConfig, DecoderConfig, EngineConfig};
pub use device::DevicePreference;
pub use error::{EngineError, EngineResult, ErrorKind};
pub use transcription::{ModelInfo, Session, SessionBuilder, SpeechToText, Transcription, ENGINE_VERSION};
