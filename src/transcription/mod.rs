//! # Transcription Module
//!
//! Everything between feature frames and transcript text, plus the session
//! that owns a loaded model.
//!
//! ## Key Components:
//! - **Acoustic Scorer**: feed-forward network over spliced frames (Candle)
//! - **Symbol Inventory**: blank, word boundaries, pieces, punctuation, silence
//! - **Language Model / Lexicon**: prefix trie, word n-grams, symbol bigrams
//! - **Decoder**: CTC prefix beam search with bounded top-K pruning
//! - **Post-Processor**: pieces to words, casing and spacing
//! - **Model Artifact**: self-contained `.sttm` container with checksum
//! - **Engine Session**: create / process / process_file / version / destroy

pub mod acoustic;
pub mod artifact;
pub mod checksum;
pub mod decoder;
pub mod engine;
pub mod lexicon;
pub mod license;
pub mod model;
pub mod postprocess;
pub mod symbols;

pub use acoustic::{AcousticConfig, Activation};
pub use artifact::{ModelArtifact, ModelHeader};
pub use engine::{Session, SessionBuilder, SessionStats, SpeechToText, ENGINE_VERSION};
pub use lexicon::{Bigram, LanguageModelSpec};
pub use license::LicenseTerms;
pub use model::{ModelInfo, Transcription};
pub use postprocess::{Casing, PostProcessConfig};
