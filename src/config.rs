//! # Configuration Management
//!
//! Engine settings are loaded from multiple sources:
//! - Default values (built into the code)
//! - An optional TOML file (`stt.toml` in the working directory, or an explicit path)
//! - Environment variables with the `STT` prefix
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Environment variables (`STT_DECODER__BEAM_WIDTH`, `STT_COMPUTE__DEVICE`, ...)
//! 2. Configuration file
//! 3. Default values (defined in the Default impls)
//!
//! Nested keys are separated by a double underscore because field names
//! themselves contain single underscores.

use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Complete engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub decoder: DecoderConfig,
    pub compute: ComputeConfig,
}

/// Beam search tuning.
///
/// ## Fields:
/// - `beam_width`: number of hypotheses kept after every frame (K)
/// - `lm_weight`: multiplier applied to language model log-probabilities
/// - `word_insertion_bonus`: added once per completed word, counteracts the LM's short-output bias
/// - `symbol_prune_margin`: extension symbols scoring this far below the frame's best are skipped
/// - `strict_lexicon`: only allow symbol sequences that spell lexicon words
///
/// ## Trade-offs:
/// A wider beam explores more of the search space at a linear cost in decode time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    pub beam_width: usize,
    pub lm_weight: f32,
    pub word_insertion_bonus: f32,
    pub symbol_prune_margin: f32,
    pub strict_lexicon: bool,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            beam_width: 16,
            lm_weight: 0.5,
            word_insertion_bonus: 0.0,
            symbol_prune_margin: 20.0,
            strict_lexicon: false,
        }
    }
}

/// Where and how the acoustic model runs.
///
/// ## Fields:
/// - `device`: "auto", "cpu", "cuda" or "metal" (falls back to CPU when unavailable)
/// - `chunk_frames`: frames pushed through the network per forward pass, bounds peak memory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComputeConfig {
    pub device: String,
    pub chunk_frames: usize,
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self {
            device: "cpu".to_string(),
            chunk_frames: 512,
        }
    }
}

impl EngineConfig {
    /// Load configuration from defaults, `stt.toml` (if present) and `STT_*` variables.
    pub fn load() -> EngineResult<Self> {
        Self::build(config::File::with_name("stt").required(false))
    }

    /// Same as [`EngineConfig::load`] but reads an explicit TOML file, which must exist.
    pub fn load_from(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(EngineError::FileNotFound(path.to_path_buf()));
        }
        Self::build(config::File::from(path).format(config::FileFormat::Toml))
    }

    fn build<S>(file: S) -> EngineResult<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let settings = config::Config::builder()
            .add_source(config::Config::try_from(&EngineConfig::default())?)
            .add_source(file)
            .add_source(
                config::Environment::with_prefix("STT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: EngineConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    pub fn validate(&self) -> EngineResult<()> {
        let decoder = &self.decoder;
        if decoder.beam_width == 0 {
            return Err(EngineError::ConfigError("beam_width must be greater than 0".into()));
        }
        if !decoder.lm_weight.is_finite() || decoder.lm_weight < 0.0 {
            return Err(EngineError::ConfigError(
                "lm_weight must be a finite, non-negative number".into(),
            ));
        }
        if !decoder.word_insertion_bonus.is_finite() {
            return Err(EngineError::ConfigError("word_insertion_bonus must be finite".into()));
        }
        if decoder.symbol_prune_margin.is_nan() || decoder.symbol_prune_margin <= 0.0 {
            return Err(EngineError::ConfigError(
                "symbol_prune_margin must be greater than 0".into(),
            ));
        }
        if self.compute.chunk_frames == 0 {
            return Err(EngineError::ConfigError("chunk_frames must be greater than 0".into()));
        }
        self.compute.device.parse::<crate::device::DevicePreference>()?;
        Ok(())
    }

    /// Render the configuration as TOML, e.g. to write a starter `stt.toml`.
    pub fn to_toml_string(&self) -> EngineResult<String> {
        toml::to_string_pretty(self).map_err(|e| EngineError::ConfigError(e.to_string()))
    }

    /// Apply a partial update such as `{"decoder": {"beam_width": 32}}`.
    ///
    /// Only the provided fields change; the result is validated and the
    /// previous values are restored if validation fails.
    pub fn update_from_json(&mut self, json_str: &str) -> EngineResult<()> {
        let partial: serde_json::Value = serde_json::from_str(json_str)
            .map_err(|e| EngineError::ConfigError(format!("JSON parsing error: {}", e)))?;
        let previous = self.clone();

        if let Some(decoder) = partial.get("decoder") {
            if let Some(width) = decoder.get("beam_width").and_then(|v| v.as_u64()) {
                self.decoder.beam_width = width as usize;
            }
            if let Some(weight) = decoder.get("lm_weight").and_then(|v| v.as_f64()) {
                self.decoder.lm_weight = weight as f32;
            }
            if let Some(bonus) = decoder.get("word_insertion_bonus").and_then(|v| v.as_f64()) {
                self.decoder.word_insertion_bonus = bonus as f32;
            }
            if let Some(margin) = decoder.get("symbol_prune_margin").and_then(|v| v.as_f64()) {
                self.decoder.symbol_prune_margin = margin as f32;
            }
            if let Some(strict) = decoder.get("strict_lexicon").and_then(|v| v.as_bool()) {
                self.decoder.strict_lexicon = strict;
            }
        }

        if let Some(compute) = partial.get("compute") {
            if let Some(device) = compute.get("device").and_then(|v| v.as_str()) {
                self.compute.device = device.to_string();
            }
            if let Some(chunk) = compute.get("chunk_frames").and_then(|v| v.as_u64()) {
                self.compute.chunk_frames = chunk as usize;
            }
        }

        if let Err(e) = self.validate() {
            *self = previous;
            return Err(e);
        }
        Ok(())
    }
}
