//! # Audio Frontend
//!
//! Turns one complete utterance of PCM into feature frames for the acoustic
//! scorer.
//!
//! ## Key Components:
//! - **Audio Processor**: `PcmBuffer` plus sample-rate/length validation
//! - **Feature Extractor**: pre-emphasis, windowing, FFT, log-mel filterbank
//! - **File Reader**: container parsing and rate conversion for `process_file`
//!
//! ## Audio Format Requirements:
//! - **Sample Rate**: model-defined (16 kHz for the shipped models)
//! - **Bit Depth**: 16-bit PCM
//! - **Channels**: Mono (1 channel)

pub mod features;
pub mod processor;
pub mod file;

pub use features::{FeatureExtractor, FeatureFrames, FrontendConfig, WindowKind};
pub use processor::{AudioProcessor, PcmBuffer};
