//! # Error Handling
//!
//! This module defines the engine's error type. Every failure carries a
//! distinguishable variant so callers can branch (re-prompt for audio,
//! re-provision a model, abort).
//!
//! ## Error Categories:
//! - **Input**: caller-correctable audio/file problems, never retried internally
//! - **Authorization**: the access key was rejected, terminal for the session
//! - **Model**: the artifact is unusable or inference produced garbage
//! - **Decoding**: the beam search reached a dead end
//! - **Lifecycle**: the session was already destroyed
//! - **Configuration**: engine settings failed to load or validate
//!
//! ## Propagation:
//! Errors are returned synchronously to the caller of the failing
//! operation. The engine never logs an error and carries on.

use std::fmt;
use std::path::PathBuf;

/// Engine error type.
///
/// ## Usage Example:
/// ```rust
/// use offline_stt::EngineError;
///
/// let err = EngineError::InvalidAudioFormat("expected 16000 Hz, got 8000 Hz".to_string());
/// assert_eq!(err.kind(), offline_stt::ErrorKind::Input);
/// ```
#[derive(Debug)]
pub enum EngineError {
    /// Sample rate, channel layout or sample encoding is not what the model expects
    InvalidAudioFormat(String),

    /// The sample buffer has zero length
    EmptyInput,

    /// The audio container could not be read (wrong extension, not RIFF/WAVE, compressed codec)
    UnsupportedFileFormat(String),

    /// An audio or model file does not exist
    FileNotFound(PathBuf),

    /// The access key was empty, malformed, mismatched or expired
    InvalidCredentials(String),

    /// The model artifact is corrupt, truncated or internally inconsistent
    InvalidModel(String),

    /// The acoustic model failed during inference
    ModelInferenceError(String),

    /// Beam search ended with no surviving hypothesis
    DecodingFailure(String),

    /// The session has been destroyed
    SessionClosed,

    /// Configuration file or environment variable problems
    ConfigError(String),
}

/// Coarse error category, useful for deciding how to react to a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Input,
    Authorization,
    Model,
    Decoding,
    Lifecycle,
    Configuration,
}

impl EngineError {
    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::InvalidAudioFormat(_)
            | EngineError::EmptyInput
            | EngineError::UnsupportedFileFormat(_)
            | EngineError::FileNotFound(_) => ErrorKind::Input,
            EngineError::InvalidCredentials(_) => ErrorKind::Authorization,
            EngineError::InvalidModel(_) | EngineError::ModelInferenceError(_) => ErrorKind::Model,
            EngineError::DecodingFailure(_) => ErrorKind::Decoding,
            EngineError::SessionClosed => ErrorKind::Lifecycle,
            EngineError::ConfigError(_) => ErrorKind::Configuration,
        }
    }

    /// Whether a caller can fix the failure by changing the input.
    pub fn is_input_error(&self) -> bool {
        self.kind() == ErrorKind::Input
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::InvalidAudioFormat(msg) => write!(f, "Invalid audio format: {}", msg),
            EngineError::EmptyInput => write!(f, "Audio data must not be empty"),
            EngineError::UnsupportedFileFormat(msg) => write!(f, "Unsupported file format: {}", msg),
            EngineError::FileNotFound(path) => {
                write!(f, "Specified file could not be found at '{}'", path.display())
            }
            EngineError::InvalidCredentials(msg) => write!(f, "Invalid credentials: {}", msg),
            EngineError::InvalidModel(msg) => write!(f, "Invalid model: {}", msg),
            EngineError::ModelInferenceError(msg) => write!(f, "Model inference error: {}", msg),
            EngineError::DecodingFailure(msg) => write!(f, "Decoding failure: {}", msg),
            EngineError::SessionClosed => {
                write!(f, "Session has not been initialized or has already been destroyed")
            }
            EngineError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for EngineError {}

/// Tensor failures surface during inference; load-time callers remap them to
/// `InvalidModel` explicitly.
impl From<candle_core::Error> for EngineError {
    fn from(err: candle_core::Error) -> Self {
        EngineError::ModelInferenceError(err.to_string())
    }
}

/// Only the model header is JSON, so a parse failure means a bad artifact.
impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::InvalidModel(format!("model header is not valid JSON: {}", err))
    }
}

impl From<config::ConfigError> for EngineError {
    fn from(err: config::ConfigError) -> Self {
        EngineError::ConfigError(err.to_string())
    }
}

/// Shorthand for `Result<T, EngineError>`.
pub type EngineResult<T> = Result<T, EngineError>;
